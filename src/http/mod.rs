//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (request ID, trace span, timeout)
//!     → pipeline/ (fixed security chain)
//!     → server.rs route group (tier limiter → throttle → auth guards)
//!     → handler
//!     → response.rs (rejection bodies)
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{ClientIp, X_REQUEST_ID};
pub use response::{ApiSuccess, ErrorCode, Rejection};
pub use server::{AppState, HttpServer, TierLimiters};
