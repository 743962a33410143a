//! Security audit events.
//!
//! # Responsibilities
//! - Define the security event record
//! - Deliver events to a pluggable sink
//! - Never influence the outcome of the request that produced the event
//!
//! # Design Decisions
//! - Write-only from the pipeline's perspective; nothing reads events back
//! - Sinks are infallible: a sink that cannot deliver drops the event
//! - Default sink is the `security_audit` tracing target

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::observability::metrics;

/// Category of a security event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventKind {
    AuthFailure,
    AdminAccess,
    SlowRequest,
    AttackDetected,
    OriginRejected,
    RateLimitExceeded,
    PolicyViolation,
    HoneypotTriggered,
    RequestRejected,
}

impl SecurityEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityEventKind::AuthFailure => "auth_failure",
            SecurityEventKind::AdminAccess => "admin_access",
            SecurityEventKind::SlowRequest => "slow_request",
            SecurityEventKind::AttackDetected => "attack_detected",
            SecurityEventKind::OriginRejected => "origin_rejected",
            SecurityEventKind::RateLimitExceeded => "rate_limit_exceeded",
            SecurityEventKind::PolicyViolation => "policy_violation",
            SecurityEventKind::HoneypotTriggered => "honeypot_triggered",
            SecurityEventKind::RequestRejected => "request_rejected",
        }
    }
}

impl fmt::Display for SecurityEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to the request that produced the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOutcome {
    Allowed,
    Rejected,
    Deceived,
}

/// One security-relevant observation.
#[derive(Debug, Clone, Serialize)]
pub struct SecurityEvent {
    pub timestamp: DateTime<Utc>,
    pub kind: SecurityEventKind,
    pub client_key: String,
    pub method: String,
    pub route: String,
    pub outcome: EventOutcome,
    pub detail: String,
}

impl SecurityEvent {
    pub fn new(
        kind: SecurityEventKind,
        client_key: impl Into<String>,
        method: impl Into<String>,
        route: impl Into<String>,
        outcome: EventOutcome,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
            client_key: client_key.into(),
            method: method.into(),
            route: route.into(),
            outcome,
            detail: detail.into(),
        }
    }
}

/// Destination for security events.
pub trait AuditSink: Send + Sync {
    fn record(&self, event: &SecurityEvent);
}

/// Emits events on the `security_audit` tracing target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &SecurityEvent) {
        match event.outcome {
            EventOutcome::Allowed => tracing::info!(
                target: "security_audit",
                kind = %event.kind,
                client = %event.client_key,
                method = %event.method,
                route = %event.route,
                timestamp = %event.timestamp.to_rfc3339(),
                detail = %event.detail,
                "Security event"
            ),
            EventOutcome::Rejected | EventOutcome::Deceived => tracing::warn!(
                target: "security_audit",
                kind = %event.kind,
                client = %event.client_key,
                method = %event.method,
                route = %event.route,
                outcome = ?event.outcome,
                timestamp = %event.timestamp.to_rfc3339(),
                detail = %event.detail,
                "Security event"
            ),
        }
    }
}

/// Keeps events in memory. Used by tests and the CLI.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<SecurityEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<SecurityEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn count(&self, kind: SecurityEventKind) -> usize {
        self.events().iter().filter(|e| e.kind == kind).count()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: &SecurityEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

/// Shared handle the pipeline stages write through.
#[derive(Clone)]
pub struct AuditLogger {
    sink: Arc<dyn AuditSink>,
}

impl AuditLogger {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Record an event. Fire-and-forget.
    pub fn record(&self, event: SecurityEvent) {
        metrics::record_security_event(event.kind.as_str());
        self.sink.record(&event);
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new(Arc::new(TracingAuditSink))
    }
}

impl fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditLogger").finish_non_exhaustive()
    }
}
