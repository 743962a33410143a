//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Pipeline stages and tier limiters produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, histograms)
//!     → audit.rs (security events → sink)
//!
//! Consumers:
//!     → Log aggregation (stdout, JSON in production)
//!     → Metrics endpoint (Prometheus scrape)
//!     → `security_audit` log target
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID flows through all log lines via the trace layer span
//! - Audit events are fire-and-forget and never change a request's outcome

pub mod audit;
pub mod logging;
pub mod metrics;

pub use audit::{AuditLogger, AuditSink, EventOutcome, MemoryAuditSink, SecurityEvent, SecurityEventKind};
