//! Cross-origin admission.
//!
//! # Design Decisions
//! - Exact entries are checked before any pattern; first match wins
//! - A request without an `Origin` header is allowed (same-origin or
//!   non-browser clients cannot be told apart, and cannot spoof the header
//!   usefully)
//! - Localhost origins are admitted only in development

use regex::Regex;
use url::Url;

use crate::config::{CorsConfig, Environment};

/// One admission rule.
#[derive(Debug, Clone)]
pub enum OriginRule {
    Exact(String),
    Pattern(Regex),
}

impl OriginRule {
    pub fn matches(&self, origin: &str) -> bool {
        match self {
            OriginRule::Exact(allowed) => allowed == origin,
            OriginRule::Pattern(re) => re.is_match(origin),
        }
    }
}

/// Ordered, immutable origin allowlist.
#[derive(Debug, Clone)]
pub struct OriginValidator {
    rules: Vec<OriginRule>,
    allow_localhost: bool,
}

impl OriginValidator {
    pub fn new(rules: Vec<OriginRule>, allow_localhost: bool) -> Self {
        // Exact entries first, relative order otherwise preserved
        let (mut ordered, patterns): (Vec<_>, Vec<_>) = rules
            .into_iter()
            .partition(|r| matches!(r, OriginRule::Exact(_)));
        ordered.extend(patterns);
        Self {
            rules: ordered,
            allow_localhost,
        }
    }

    /// Build from config. Patterns that fail to compile are skipped with an
    /// error log; `validate_config` refuses them before startup.
    pub fn from_config(config: &CorsConfig, environment: Environment) -> Self {
        let mut rules: Vec<OriginRule> = config
            .allowed_origins
            .iter()
            .map(|o| OriginRule::Exact(o.trim_end_matches('/').to_string()))
            .collect();

        for pattern in &config.allowed_patterns {
            match Regex::new(pattern) {
                Ok(re) => rules.push(OriginRule::Pattern(re)),
                Err(e) => tracing::error!(pattern = %pattern, error = %e, "Skipping invalid origin pattern"),
            }
        }

        let allow_localhost =
            config.allow_localhost_in_development && environment == Environment::Development;
        Self::new(rules, allow_localhost)
    }

    pub fn rules(&self) -> &[OriginRule] {
        &self.rules
    }

    pub fn is_allowed(&self, origin: Option<&str>) -> bool {
        let origin = match origin {
            None => return true,
            Some(o) => o,
        };

        if self.rules.iter().any(|rule| rule.matches(origin)) {
            return true;
        }
        self.allow_localhost && is_localhost(origin)
    }
}

fn is_localhost(origin: &str) -> bool {
    let url = match Url::parse(origin) {
        Ok(url) => url,
        Err(_) => return false,
    };
    if !matches!(url.scheme(), "http" | "https") {
        return false;
    }
    matches!(
        url.host_str(),
        Some("localhost") | Some("127.0.0.1") | Some("[::1]")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator(env: Environment) -> OriginValidator {
        OriginValidator::from_config(&CorsConfig::default(), env)
    }

    #[test]
    fn test_exact_match_allowed() {
        let v = validator(Environment::Production);
        assert!(v.is_allowed(Some("https://hearthandflame.example")));
    }

    #[test]
    fn test_pattern_match_allowed() {
        let v = validator(Environment::Production);
        assert!(v.is_allowed(Some("https://shop.hearthandflame.example")));
        assert!(!v.is_allowed(Some("https://shop.hearthandflame.example.evil.io")));
    }

    #[test]
    fn test_unknown_origin_rejected() {
        let v = validator(Environment::Production);
        assert!(!v.is_allowed(Some("https://evil.example")));
        assert!(!v.is_allowed(Some("null")));
    }

    #[test]
    fn test_missing_origin_allowed() {
        assert!(validator(Environment::Production).is_allowed(None));
    }

    #[test]
    fn test_localhost_only_in_development() {
        let dev = validator(Environment::Development);
        let prod = validator(Environment::Production);
        for origin in ["http://localhost:3000", "http://127.0.0.1:5173", "http://[::1]:8080"] {
            assert!(dev.is_allowed(Some(origin)), "{origin}");
            assert!(!prod.is_allowed(Some(origin)), "{origin}");
        }
        assert!(!dev.is_allowed(Some("http://localhost.evil.io")));
    }

    #[test]
    fn test_exact_rules_ordered_first() {
        let v = OriginValidator::new(
            vec![
                OriginRule::Pattern(Regex::new("^https://a").unwrap()),
                OriginRule::Exact("https://b".into()),
            ],
            false,
        );
        assert!(matches!(v.rules()[0], OriginRule::Exact(_)));
    }
}
