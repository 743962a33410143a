//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the guard.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Placeholder secrets shipped with the default config. Rejected in production.
pub const DEV_ACCESS_SECRET: &str = "dev-access-secret-change-me";
pub const DEV_REFRESH_SECRET: &str = "dev-refresh-secret-change-me";

/// Root configuration for the security pipeline.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GuardConfig {
    /// Deployment mode. Changes tier ceilings and the localhost CORS allowance.
    pub environment: Environment,

    /// Listener configuration (bind address, proxy trust).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Token and password hashing settings.
    pub auth: AuthConfig,

    /// Cross-origin allowlist.
    pub cors: CorsConfig,

    /// Tiered rate limiting.
    pub rate_limit: RateLimitConfig,

    /// Progressive slow-down for clients above a soft threshold.
    pub throttle: ThrottleConfig,

    /// Body, upload and content-type limits.
    pub limits: LimitsConfig,

    /// Threat scanner settings.
    pub scanner: ScannerConfig,

    /// Hidden form fields that only bots fill in.
    pub honeypot: HoneypotConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl GuardConfig {
    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }
}

/// Deployment mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    /// Parse the value of an `APP_ENV`-style variable. Anything that is not
    /// production is treated as development.
    pub fn from_env_value(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Take the client IP from the first `X-Forwarded-For` entry.
    /// Only enable behind a proxy that overwrites the header.
    pub trust_proxy: bool,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            trust_proxy: false,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Token issuing and password hashing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC secret for access tokens.
    pub access_secret: String,

    /// HMAC secret for refresh tokens. Must differ from the access secret.
    pub refresh_secret: String,

    /// Access token lifetime in seconds.
    pub access_ttl_secs: u64,

    /// Refresh token lifetime in seconds.
    pub refresh_ttl_secs: u64,

    /// `iss` claim written into and required from every token.
    pub issuer: String,

    /// Argon2 memory cost in KiB.
    pub hash_memory_kib: u32,

    /// Argon2 iterations (the work factor raised as hardware improves).
    pub hash_iterations: u32,

    /// Argon2 lanes.
    pub hash_parallelism: u32,

    /// Deadline for the user-record lookup during refresh, in milliseconds.
    pub lookup_timeout_ms: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            access_secret: DEV_ACCESS_SECRET.to_string(),
            refresh_secret: DEV_REFRESH_SECRET.to_string(),
            access_ttl_secs: 60 * 60,
            refresh_ttl_secs: 7 * 24 * 60 * 60,
            issuer: "hearth-guard".to_string(),
            hash_memory_kib: 19_456,
            hash_iterations: 2,
            hash_parallelism: 1,
            lookup_timeout_ms: 2_000,
        }
    }
}

impl AuthConfig {
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }
}

/// Cross-origin allowlist configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Origins allowed by exact string match.
    pub allowed_origins: Vec<String>,

    /// Regular expressions evaluated after the exact matches, in order.
    pub allowed_patterns: Vec<String>,

    /// Allow any localhost origin outside production.
    pub allow_localhost_in_development: bool,

    /// `Access-Control-Max-Age` for preflight responses, in seconds.
    pub preflight_max_age_secs: u64,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![
                "https://hearthandflame.example".to_string(),
                "https://admin.hearthandflame.example".to_string(),
            ],
            allowed_patterns: vec![r"^https://[a-z0-9-]+\.hearthandflame\.example$".to_string()],
            allow_localhost_in_development: true,
            preflight_max_age_secs: 600,
        }
    }
}

/// How a tier derives the counter key from a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum KeyStrategy {
    /// Client IP only.
    #[default]
    ClientIp,
    /// Client IP and request path, so each route has its own budget.
    ClientIpAndPath,
}

/// One rate-limit tier.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TierConfig {
    /// Window length in seconds.
    pub window_secs: u64,

    /// Ceiling outside production.
    pub max_development: u32,

    /// Ceiling in production.
    pub max_production: u32,

    /// Do not count requests that end with a status below 400.
    #[serde(default)]
    pub skip_successful: bool,

    /// Do not count requests that end with a status of 400 or above.
    #[serde(default)]
    pub skip_failed: bool,

    #[serde(default)]
    pub key: KeyStrategy,

    /// Path prefixes that bypass counting outside production.
    #[serde(default)]
    pub skip_paths_in_development: Vec<String>,
}

impl TierConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    pub fn max_for(&self, environment: Environment) -> u32 {
        match environment {
            Environment::Production => self.max_production,
            Environment::Development => self.max_development,
        }
    }
}

/// Rate limiting configuration, one table per tier.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable tier limiters on the route groups.
    pub enabled: bool,

    /// Login and token endpoints. Counts failures only.
    pub auth: TierConfig,

    /// General API traffic.
    pub api: TierConfig,

    /// Sensitive one-off operations.
    pub strict: TierConfig,

    /// Administrative endpoints.
    pub admin: TierConfig,

    /// Interval between sweeps of expired windows, in seconds.
    pub cleanup_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auth: TierConfig {
                window_secs: 15 * 60,
                max_development: 5,
                max_production: 5,
                skip_successful: true,
                skip_failed: false,
                key: KeyStrategy::ClientIp,
                skip_paths_in_development: Vec::new(),
            },
            api: TierConfig {
                window_secs: 15 * 60,
                max_development: 1000,
                max_production: 100,
                skip_successful: false,
                skip_failed: false,
                key: KeyStrategy::ClientIp,
                skip_paths_in_development: vec!["/api/analytics".to_string()],
            },
            strict: TierConfig {
                window_secs: 60 * 60,
                max_development: 3,
                max_production: 3,
                skip_successful: false,
                skip_failed: false,
                key: KeyStrategy::ClientIpAndPath,
                skip_paths_in_development: Vec::new(),
            },
            admin: TierConfig {
                window_secs: 60,
                max_development: 60,
                max_production: 60,
                skip_successful: false,
                skip_failed: false,
                key: KeyStrategy::ClientIp,
                skip_paths_in_development: Vec::new(),
            },
            cleanup_interval_secs: 60,
        }
    }
}

/// Progressive slow-down configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ThrottleConfig {
    pub enabled: bool,

    /// Window length in seconds.
    pub window_secs: u64,

    /// Requests allowed at full speed per window.
    pub delay_after: u32,

    /// Delay added for each request past `delay_after`, in milliseconds.
    pub delay_ms: u64,

    /// Upper bound on the delay for one request, in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            window_secs: 15 * 60,
            delay_after: 50,
            delay_ms: 500,
            max_delay_ms: 20_000,
        }
    }
}

/// Body, upload and content-type limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Maximum size of a single uploaded file in bytes.
    pub max_file_bytes: usize,

    /// MIME types accepted for uploaded files.
    pub allowed_mime_types: Vec<String>,

    /// Content types accepted for POST/PUT/PATCH requests with a body.
    pub allowed_content_types: Vec<String>,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: 10 * 1024 * 1024,
            max_file_bytes: 5 * 1024 * 1024,
            allowed_mime_types: vec![
                "image/jpeg".to_string(),
                "image/png".to_string(),
                "image/webp".to_string(),
                "image/gif".to_string(),
                "application/pdf".to_string(),
            ],
            allowed_content_types: vec![
                "application/json".to_string(),
                "multipart/form-data".to_string(),
                "application/x-www-form-urlencoded".to_string(),
            ],
        }
    }
}

/// Threat scanner configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScannerConfig {
    /// Paths exempt from the full signature scan (exact match).
    pub exempt_paths: Vec<String>,

    /// Paths exempt from the SQL/NoSQL second pass (exact match).
    pub second_pass_exempt_paths: Vec<String>,

    /// Deepest nesting accepted in a scanned payload.
    pub max_depth: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            exempt_paths: vec!["/api/analytics/events".to_string()],
            second_pass_exempt_paths: vec!["/api/analytics/events".to_string()],
            max_depth: 32,
        }
    }
}

/// Honeypot configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HoneypotConfig {
    /// Form fields hidden from humans.
    pub fields: Vec<String>,
}

impl Default for HoneypotConfig {
    fn default() -> Self {
        Self {
            fields: vec!["_gotcha".to_string(), "honeypot".to_string()],
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Output format. Defaults to JSON in production and pretty otherwise.
    pub log_format: Option<LogFormat>,

    /// Requests slower than this are recorded as security events.
    pub slow_request_ms: u64,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: None,
            slow_request_ms: 3_000,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
