//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → loader.rs (environment overrides: mode, secrets, bind address)
//!     → validation.rs (semantic checks)
//!     → GuardConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; policies are built once at startup
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Production vs. development is the only policy switch read from the environment

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_from_env, ConfigError};
pub use schema::{
    AuthConfig, CorsConfig, Environment, GuardConfig, HoneypotConfig, KeyStrategy,
    LimitsConfig, ListenerConfig, LogFormat, ObservabilityConfig, RateLimitConfig,
    ScannerConfig, ThrottleConfig, TierConfig, TimeoutConfig,
};
