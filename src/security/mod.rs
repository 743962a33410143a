//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Fixed chain (pipeline/):
//!     → headers.rs + origin.rs (security headers, CORS admission)
//!     → limits.rs (body ceiling)
//!     → scanner.rs + signatures.rs (threat scan)
//!     → tagging.rs (route and brute-force tags)
//!     → scanner.rs (SQL/NoSQL second pass)
//!     → honeypot.rs
//!     → upload.rs (multipart files)
//!     → limits.rs (content-type)
//!
//! Per route group:
//!     → rate_limit.rs (tier limiter) → throttle.rs (progressive delay)
//! ```
//!
//! # Design Decisions
//! - Fail closed: a check that cannot decide rejects
//! - Rejections never say which signature or rule matched
//! - Limiter and throttle state lives behind `CounterStore`

pub mod headers;
pub mod honeypot;
pub mod limits;
pub mod origin;
pub mod rate_limit;
pub mod scanner;
pub mod signatures;
pub mod store;
pub mod tagging;
pub mod throttle;
pub mod upload;

pub use origin::{OriginRule, OriginValidator};
pub use rate_limit::{rate_limit_middleware, Decision, Policy, RateLimiter, Tier};
pub use scanner::{ThreatMatch, ThreatScanner};
pub use store::{CounterStore, InMemoryCounterStore};
pub use tagging::SecurityTags;
pub use throttle::{throttle_middleware, ProgressiveThrottle};
