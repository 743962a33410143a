//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Reject development placeholder secrets in production
//! - Validate value ranges (windows > 0, ceilings > 0)
//! - Compile origin patterns once so bad regexes fail at startup
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GuardConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;

use argon2::Params;
use regex::Regex;

use crate::config::schema::{
    GuardConfig, TierConfig, DEV_ACCESS_SECRET, DEV_REFRESH_SECRET,
};

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &GuardConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let auth = &config.auth;
    if auth.access_secret.is_empty() {
        errors.push(ValidationError::new("auth.access_secret", "must not be empty"));
    }
    if auth.refresh_secret.is_empty() {
        errors.push(ValidationError::new("auth.refresh_secret", "must not be empty"));
    }
    if !auth.access_secret.is_empty() && auth.access_secret == auth.refresh_secret {
        errors.push(ValidationError::new(
            "auth.refresh_secret",
            "must differ from auth.access_secret",
        ));
    }
    if config.is_production()
        && (auth.access_secret == DEV_ACCESS_SECRET || auth.refresh_secret == DEV_REFRESH_SECRET)
    {
        errors.push(ValidationError::new(
            "auth",
            "development placeholder secrets are not allowed in production",
        ));
    }
    if auth.access_ttl_secs == 0 {
        errors.push(ValidationError::new("auth.access_ttl_secs", "must be greater than 0"));
    }
    if auth.refresh_ttl_secs <= auth.access_ttl_secs {
        errors.push(ValidationError::new(
            "auth.refresh_ttl_secs",
            "must be longer than auth.access_ttl_secs",
        ));
    }
    if let Err(e) = Params::new(
        auth.hash_memory_kib,
        auth.hash_iterations,
        auth.hash_parallelism,
        None,
    ) {
        errors.push(ValidationError::new("auth.hash_*", format!("invalid Argon2 parameters: {e}")));
    }

    for (i, pattern) in config.cors.allowed_patterns.iter().enumerate() {
        if let Err(e) = Regex::new(pattern) {
            errors.push(ValidationError::new(
                format!("cors.allowed_patterns[{i}]"),
                format!("invalid pattern: {e}"),
            ));
        }
    }

    let tiers = [
        ("auth", &config.rate_limit.auth),
        ("api", &config.rate_limit.api),
        ("strict", &config.rate_limit.strict),
        ("admin", &config.rate_limit.admin),
    ];
    for (name, tier) in tiers {
        validate_tier(name, tier, &mut errors);
    }

    if config.throttle.window_secs == 0 {
        errors.push(ValidationError::new("throttle.window_secs", "must be greater than 0"));
    }
    if config.throttle.max_delay_ms < config.throttle.delay_ms {
        errors.push(ValidationError::new(
            "throttle.max_delay_ms",
            "must be at least throttle.delay_ms",
        ));
    }

    if config.limits.max_body_bytes == 0 {
        errors.push(ValidationError::new("limits.max_body_bytes", "must be greater than 0"));
    }
    if config.limits.max_file_bytes > config.limits.max_body_bytes {
        errors.push(ValidationError::new(
            "limits.max_file_bytes",
            "must not exceed limits.max_body_bytes",
        ));
    }
    if config.scanner.max_depth == 0 {
        errors.push(ValidationError::new("scanner.max_depth", "must be greater than 0"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_tier(name: &str, tier: &TierConfig, errors: &mut Vec<ValidationError>) {
    if tier.window_secs == 0 {
        errors.push(ValidationError::new(
            format!("rate_limit.{name}.window_secs"),
            "must be greater than 0",
        ));
    }
    if tier.max_development == 0 || tier.max_production == 0 {
        errors.push(ValidationError::new(
            format!("rate_limit.{name}"),
            "ceilings must be greater than 0",
        ));
    }
    if tier.skip_successful && tier.skip_failed {
        errors.push(ValidationError::new(
            format!("rate_limit.{name}"),
            "skip_successful and skip_failed cannot both be set",
        ));
    }
}
