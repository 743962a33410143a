//! Recursive threat scanner over structured request data.
//!
//! Strings are tested against the value signatures, object keys against the
//! key signatures, and arrays/objects recurse. The first match anywhere
//! stops the walk. Exempt paths are compared exactly, before any scanning.

use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::security::signatures::{self, Signature, SignatureTarget};

/// Signature name reported when the depth guard trips.
pub const DEPTH_EXCEEDED: &str = "max_depth_exceeded";

/// Where and what matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreatMatch {
    pub signature: &'static str,
    pub field: String,
}

impl fmt::Display for ThreatMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.signature, self.field)
    }
}

#[derive(Clone)]
pub struct ThreatScanner {
    value_signatures: Vec<Arc<dyn Signature>>,
    key_signatures: Vec<Arc<dyn Signature>>,
    exempt_paths: HashSet<String>,
    max_depth: usize,
}

impl ThreatScanner {
    pub fn new(signatures: Vec<Arc<dyn Signature>>, max_depth: usize) -> Self {
        let (value_signatures, key_signatures): (Vec<_>, Vec<_>) = signatures
            .into_iter()
            .partition(|s| s.target() == SignatureTarget::Value);
        Self {
            value_signatures,
            key_signatures,
            exempt_paths: HashSet::new(),
            max_depth,
        }
    }

    /// Scanner with every built-in signature.
    pub fn full(max_depth: usize) -> Self {
        Self::new(signatures::full(), max_depth)
    }

    /// Scanner with the SQL/NoSQL signatures only.
    pub fn sql_nosql(max_depth: usize) -> Self {
        Self::new(signatures::sql_nosql(), max_depth)
    }

    pub fn with_exempt_paths<I, S>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exempt_paths.extend(paths.into_iter().map(Into::into));
        self
    }

    pub fn is_exempt(&self, path: &str) -> bool {
        self.exempt_paths.contains(path)
    }

    /// Walk `payload`, naming fields relative to `root`.
    pub fn scan(&self, root: &str, payload: &Value) -> Result<(), ThreatMatch> {
        let mut field = root.to_string();
        self.walk(payload, &mut field, 0)
    }

    pub fn is_malicious(&self, payload: &Value) -> bool {
        self.scan("", payload).is_err()
    }

    /// Test a raw string (query string or body text) with the value signatures.
    pub fn scan_text(&self, field: &str, text: &str) -> Result<(), ThreatMatch> {
        match self.match_value(text) {
            Some(signature) => Err(ThreatMatch {
                signature,
                field: field.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Test a request path. The raw form is checked first so encoded
    /// traversal still matches, then every percent-decoded segment and the
    /// decoded whole, which is what a path extractor hands to the handler.
    pub fn scan_path(&self, path: &str) -> Result<(), ThreatMatch> {
        self.scan_text("path", path)?;
        if !path.contains('%') {
            return Ok(());
        }

        for (index, segment) in path.split('/').skip(1).enumerate() {
            if segment.contains('%') {
                self.scan_text(&format!("path[{index}]"), &percent_decode(segment))?;
            }
        }
        self.scan_text("path", &percent_decode(path))
    }

    fn match_value(&self, text: &str) -> Option<&'static str> {
        self.value_signatures
            .iter()
            .find(|s| s.test(text))
            .map(|s| s.name())
    }

    fn match_key(&self, key: &str) -> Option<&'static str> {
        self.key_signatures
            .iter()
            .find(|s| s.test(key))
            .map(|s| s.name())
    }

    fn walk(&self, value: &Value, field: &mut String, depth: usize) -> Result<(), ThreatMatch> {
        if depth > self.max_depth {
            return Err(ThreatMatch {
                signature: DEPTH_EXCEEDED,
                field: field.clone(),
            });
        }

        match value {
            Value::String(s) => self.scan_text(field, s),
            Value::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    let len = field.len();
                    field.push_str(&format!("[{i}]"));
                    let result = self.walk(item, field, depth + 1);
                    field.truncate(len);
                    result?;
                }
                Ok(())
            }
            Value::Object(map) => {
                for (key, item) in map {
                    let len = field.len();
                    if !field.is_empty() {
                        field.push('.');
                    }
                    field.push_str(key);

                    let result = match self.match_key(key) {
                        Some(signature) => Err(ThreatMatch {
                            signature,
                            field: field.clone(),
                        }),
                        None => self.walk(item, field, depth + 1),
                    };
                    field.truncate(len);
                    result?;
                }
                Ok(())
            }
            Value::Null | Value::Bool(_) | Value::Number(_) => Ok(()),
        }
    }
}

fn percent_decode(raw: &str) -> String {
    String::from_utf8_lossy(&urlencoding::decode_binary(raw.as_bytes())).into_owned()
}

impl fmt::Debug for ThreatScanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreatScanner")
            .field("value_signatures", &self.value_signatures.len())
            .field("key_signatures", &self.key_signatures.len())
            .field("exempt_paths", &self.exempt_paths)
            .field("max_depth", &self.max_depth)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn scanner() -> ThreatScanner {
        ThreatScanner::full(32)
    }

    #[test]
    fn test_nested_match_reports_field_path() {
        let payload = json!({
            "name": "Stove",
            "variants": [
                {"sku": "A1"},
                {"sku": "B2", "note": "<script>alert(1)</script>"}
            ]
        });
        let err = scanner().scan("body", &payload).unwrap_err();
        assert_eq!(err.signature, "script_tag");
        assert_eq!(err.field, "body.variants[1].note");
    }

    #[test]
    fn test_common_attack_strings() {
        let s = scanner();
        for attack in ["<script>alert(1)</script>", "' OR '1'='1", "../../etc/passwd"] {
            assert!(s.is_malicious(&json!({ "q": attack })), "{attack}");
            assert!(s.is_malicious(&json!([attack])), "{attack}");
        }
        assert!(!s.is_malicious(&json!({
            "name": "Cast Iron Wood Stove",
            "description": "Heats rooms up to 80 square meters",
            "price": 1299,
            "tags": ["wood", "stove", null, true]
        })));
    }

    #[test]
    fn test_operator_key_detected() {
        let err = scanner()
            .scan("body", &json!({"email": "a@b.c", "password": {"$ne": null}}))
            .unwrap_err();
        assert_eq!(err.signature, "nosql_operator_key");
        assert_eq!(err.field, "body.password.$ne");
    }

    #[test]
    fn test_depth_guard() {
        let mut value = json!("leaf");
        for _ in 0..10 {
            value = json!([value]);
        }
        let shallow = ThreatScanner::full(4);
        assert_eq!(
            shallow.scan("body", &value).unwrap_err().signature,
            DEPTH_EXCEEDED
        );
        assert!(ThreatScanner::full(16).scan("body", &value).is_ok());
    }

    #[test]
    fn test_exempt_paths_are_exact() {
        let s = scanner().with_exempt_paths(["/api/analytics/events"]);
        assert!(s.is_exempt("/api/analytics/events"));
        assert!(!s.is_exempt("/api/analytics/events/1"));
        assert!(!s.is_exempt("/api/analytics"));
    }

    #[test]
    fn test_catalogue_text_passes() {
        let s = scanner();
        for description in [
            "Select finish from the list",
            "Flue liner OD 32mm; ID 25mm",
            "Pet guard, dog & cat safe",
        ] {
            assert!(s.scan("body", &json!({ "description": description })).is_ok(), "{description}");
        }
    }

    #[test]
    fn test_encoded_path_segments() {
        let s = scanner();
        let err = s
            .scan_path("/api/products/%3Cscript%3Ealert(1)%3C%2Fscript%3E")
            .unwrap_err();
        assert_eq!(err.signature, "script_tag");
        assert_eq!(err.field, "path[2]");

        let err = s.scan_path("/api/orders/1'%20OR%20'1'='1").unwrap_err();
        assert_eq!(err.signature, "sql_tautology");

        // Raw form still catches encoded traversal
        let err = s.scan_path("/files/%2e%2e%2fetc%2fpasswd").unwrap_err();
        assert_eq!(err.signature, "path_traversal_encoded");

        assert!(s.scan_path("/api/products/wood-stove%20xl").is_ok());
        assert!(s.scan_path("/api/products/42").is_ok());
    }

    #[test]
    fn test_scan_text() {
        let s = ThreatScanner::sql_nosql(8);
        assert!(s.scan_text("query", "id=1' OR '1'='1").is_err());
        assert!(s.scan_text("query", "page=2&sort=price").is_ok());
    }
}
