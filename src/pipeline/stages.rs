//! The ten fixed stages, in chain order.

use async_trait::async_trait;
use axum::{
    http::{header, Method, StatusCode},
    response::Response,
};
use serde_json::Value;
use std::time::Duration;

use crate::config::LimitsConfig;
use crate::http::response::{ErrorCode, Rejection};
use crate::observability::audit::{AuditLogger, EventOutcome, SecurityEvent, SecurityEventKind};
use crate::observability::metrics;
use crate::pipeline::stage::{
    decode_pairs, pairs_to_object, InboundRequest, RequestContext, Stage, StageOutcome,
};
use crate::security::headers;
use crate::security::honeypot::{self, Honeypot};
use crate::security::limits;
use crate::security::origin::OriginValidator;
use crate::security::scanner::{ThreatMatch, ThreatScanner};
use crate::security::tagging::SecurityTags;
use crate::security::upload;

fn event(
    request: &InboundRequest,
    kind: SecurityEventKind,
    outcome: EventOutcome,
    detail: impl Into<String>,
) -> SecurityEvent {
    SecurityEvent::new(
        kind,
        request.client_ip.as_str(),
        request.method().as_str(),
        request.path(),
        outcome,
        detail,
    )
}

// 1. Transport security

/// Security headers on the way out, origin admission on the way in.
pub struct TransportStage {
    pub validator: OriginValidator,
    pub production: bool,
    pub preflight_max_age_secs: u64,
    pub audit: AuditLogger,
}

#[async_trait]
impl Stage for TransportStage {
    fn name(&self) -> &'static str {
        "transport"
    }

    async fn process(&self, request: &mut InboundRequest) -> StageOutcome {
        let origin = request.origin();
        if !self.validator.is_allowed(origin) {
            let origin = origin.unwrap_or_default().to_string();
            tracing::warn!(origin = %origin, client = %request.client_ip.as_str(), "Origin not allowed");
            self.audit.record(event(
                request,
                SecurityEventKind::OriginRejected,
                EventOutcome::Rejected,
                format!("origin={origin}"),
            ));
            return StageOutcome::Reject(Rejection::new(
                StatusCode::FORBIDDEN,
                ErrorCode::OriginNotAllowed,
                "Origin not allowed",
            ));
        }

        if request.origin().is_some() && is_preflight(request) {
            return StageOutcome::Respond(headers::preflight_response(self.preflight_max_age_secs));
        }
        StageOutcome::Continue
    }

    fn on_response(&self, context: &RequestContext, response: &mut Response) {
        let headers = response.headers_mut();
        headers::apply_security_headers(headers, self.production);

        let admitted = context
            .origin
            .as_ref()
            .filter(|o| self.validator.is_allowed(o.to_str().ok()));
        if let Some(origin) = admitted {
            headers::apply_cors_headers(headers, origin);
        }
    }
}

fn is_preflight(request: &InboundRequest) -> bool {
    request.method() == Method::OPTIONS
        && request
            .headers()
            .contains_key(header::ACCESS_CONTROL_REQUEST_METHOD)
}

// 2. Body ceiling and parsing

pub struct BodyStage {
    pub max_body_bytes: usize,
}

#[async_trait]
impl Stage for BodyStage {
    fn name(&self) -> &'static str {
        "body_limit"
    }

    async fn process(&self, request: &mut InboundRequest) -> StageOutcome {
        let body = match request.take_body() {
            Some(body) => body,
            None => return StageOutcome::Continue,
        };
        let declared = limits::declared_length(request.headers());
        let bytes = match limits::read_body(declared, body, self.max_body_bytes).await {
            Ok(bytes) => bytes,
            Err(e) => return StageOutcome::Reject(e.to_rejection()),
        };
        request.raw_body = bytes;
        if request.raw_body.is_empty() {
            return StageOutcome::Continue;
        }

        let media = limits::media_type(request.headers()).unwrap_or_default();
        match media.as_str() {
            "application/json" => match serde_json::from_slice::<Value>(&request.raw_body) {
                Ok(value) => request.body = value,
                Err(e) => {
                    tracing::debug!(error = %e, "Rejecting malformed JSON body");
                    return StageOutcome::Reject(Rejection::new(
                        StatusCode::BAD_REQUEST,
                        ErrorCode::InvalidJson,
                        "Malformed JSON body",
                    ));
                }
            },
            "application/x-www-form-urlencoded" => {
                request.body = pairs_to_object(decode_pairs(&request.raw_body));
            }
            "multipart/form-data" => {
                let content_type = request
                    .headers()
                    .get(header::CONTENT_TYPE)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default()
                    .to_string();
                let raw = request.raw_body.clone();
                match upload::parse_multipart(&content_type, raw).await {
                    Ok(form) => {
                        request.body = Value::Object(form.fields);
                        request.files = form.files;
                    }
                    Err(rejection) => return StageOutcome::Reject(rejection),
                }
            }
            // Left unparsed; content-type enforcement decides later
            _ => {}
        }
        StageOutcome::Continue
    }
}

// 3. Threat scan

pub struct ScannerStage {
    pub scanner: ThreatScanner,
    pub audit: AuditLogger,
}

impl ScannerStage {
    fn scan(&self, request: &InboundRequest) -> Result<(), ThreatMatch> {
        self.scanner.scan_path(request.path())?;
        self.scanner.scan("query", &request.query)?;
        self.scanner.scan("body", &request.body)?;
        for file in &request.files {
            self.scanner.scan_text("files.filename", &file.filename)?;
        }
        Ok(())
    }
}

#[async_trait]
impl Stage for ScannerStage {
    fn name(&self) -> &'static str {
        "threat_scan"
    }

    async fn process(&self, request: &mut InboundRequest) -> StageOutcome {
        if self.scanner.is_exempt(request.path()) {
            return StageOutcome::Continue;
        }
        match self.scan(request) {
            Ok(()) => StageOutcome::Continue,
            Err(found) => {
                tracing::warn!(
                    client = %request.client_ip.as_str(),
                    path = %request.path(),
                    field = %found.field,
                    signature = found.signature,
                    "Malicious input detected"
                );
                self.audit.record(event(
                    request,
                    SecurityEventKind::AttackDetected,
                    EventOutcome::Rejected,
                    format!("field={} signature={}", found.field, found.signature),
                ));
                StageOutcome::Reject(Rejection::malicious_input())
            }
        }
    }
}

// 4. Audit observation

/// Logs every request on the way in; emits the post-response audit events.
pub struct AuditStage {
    pub audit: AuditLogger,
    pub slow_request: Duration,
}

#[async_trait]
impl Stage for AuditStage {
    fn name(&self) -> &'static str {
        "audit"
    }

    async fn process(&self, request: &mut InboundRequest) -> StageOutcome {
        tracing::debug!(
            method = %request.method(),
            path = %request.path(),
            client = %request.client_ip.as_str(),
            "Inbound request"
        );
        StageOutcome::Continue
    }

    fn on_response(&self, context: &RequestContext, response: &mut Response) {
        let status = response.status();
        let elapsed = context.started.elapsed();
        let record = |kind, outcome, detail: String| {
            self.audit.record(SecurityEvent::new(
                kind,
                context.client_ip.as_str(),
                context.method.as_str(),
                context.path.as_str(),
                outcome,
                detail,
            ));
        };

        if elapsed >= self.slow_request {
            record(
                SecurityEventKind::SlowRequest,
                EventOutcome::Allowed,
                format!("elapsed_ms={} status={}", elapsed.as_millis(), status.as_u16()),
            );
        }

        let identity_failure =
            status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN;
        if identity_failure && (context.tags.auth_route || context.tags.admin_route) {
            record(
                SecurityEventKind::AuthFailure,
                EventOutcome::Rejected,
                format!("status={}", status.as_u16()),
            );
        } else if context.tags.admin_route && status.is_success() {
            record(
                SecurityEventKind::AdminAccess,
                EventOutcome::Allowed,
                format!("status={}", status.as_u16()),
            );
        }
    }
}

// 5. Route tagging

pub struct TaggingStage;

#[async_trait]
impl Stage for TaggingStage {
    fn name(&self) -> &'static str {
        "tagging"
    }

    async fn process(&self, request: &mut InboundRequest) -> StageOutcome {
        request.tags = SecurityTags::for_route(request.path());
        StageOutcome::Continue
    }
}

// 6. SQL/NoSQL second pass

pub struct SecondPassStage {
    pub scanner: ThreatScanner,
    pub audit: AuditLogger,
}

impl SecondPassStage {
    fn scan(&self, request: &InboundRequest) -> Result<(), ThreatMatch> {
        self.scanner.scan_path(request.path())?;
        let raw_query = request.raw_query();
        if !raw_query.is_empty() {
            self.scanner.scan_text("query", raw_query)?;
            let decoded: Vec<String> = decode_pairs(raw_query.as_bytes())
                .into_iter()
                .map(|(k, v)| format!("{k}={v}"))
                .collect();
            self.scanner.scan_text("query", &decoded.join("&"))?;
        }
        if !request.raw_body.is_empty() && request.files.is_empty() {
            self.scanner
                .scan_text("body", &String::from_utf8_lossy(&request.raw_body))?;
        }
        if let Value::Object(_) = request.body {
            self.scanner.scan("body", &request.body)?;
        }
        Ok(())
    }
}

#[async_trait]
impl Stage for SecondPassStage {
    fn name(&self) -> &'static str {
        "sql_nosql_check"
    }

    async fn process(&self, request: &mut InboundRequest) -> StageOutcome {
        if self.scanner.is_exempt(request.path()) {
            return StageOutcome::Continue;
        }
        match self.scan(request) {
            Ok(()) => StageOutcome::Continue,
            Err(found) => {
                tracing::warn!(
                    client = %request.client_ip.as_str(),
                    path = %request.path(),
                    field = %found.field,
                    signature = found.signature,
                    "Injection pattern detected on second pass"
                );
                self.audit.record(event(
                    request,
                    SecurityEventKind::AttackDetected,
                    EventOutcome::Rejected,
                    format!("second_pass field={} signature={}", found.field, found.signature),
                ));
                StageOutcome::Reject(Rejection::malicious_input())
            }
        }
    }
}

// 7. Brute-force tagging

pub struct BruteForceStage;

#[async_trait]
impl Stage for BruteForceStage {
    fn name(&self) -> &'static str {
        "brute_force_tagging"
    }

    async fn process(&self, request: &mut InboundRequest) -> StageOutcome {
        let method = request.method().clone();
        let path = request.path().to_string();
        request.tags.mark_brute_force(&method, &path);
        if request.tags.brute_force_candidate {
            tracing::debug!(client = %request.client_ip.as_str(), path = %path, "Credential submission");
        }
        StageOutcome::Continue
    }
}

// 8. Honeypot

pub struct HoneypotStage {
    pub honeypot: Honeypot,
    pub audit: AuditLogger,
}

#[async_trait]
impl Stage for HoneypotStage {
    fn name(&self) -> &'static str {
        "honeypot"
    }

    async fn process(&self, request: &mut InboundRequest) -> StageOutcome {
        let field = match self.honeypot.tripped_field(&request.body) {
            Some(field) => field.to_string(),
            None => return StageOutcome::Continue,
        };
        tracing::info!(client = %request.client_ip.as_str(), field = %field, "Honeypot field filled");
        metrics::record_honeypot_trip();
        self.audit.record(event(
            request,
            SecurityEventKind::HoneypotTriggered,
            EventOutcome::Deceived,
            format!("field={field}"),
        ));
        StageOutcome::Respond(honeypot::decoy_response())
    }
}

// 9. Upload validation

pub struct UploadStage {
    pub limits: LimitsConfig,
    pub audit: AuditLogger,
}

#[async_trait]
impl Stage for UploadStage {
    fn name(&self) -> &'static str {
        "upload_validation"
    }

    async fn process(&self, request: &mut InboundRequest) -> StageOutcome {
        if request.files.is_empty() {
            return StageOutcome::Continue;
        }
        match upload::validate_files(&request.files, &self.limits) {
            Ok(()) => StageOutcome::Continue,
            Err(rejection) => {
                let names: Vec<&str> = request.files.iter().map(|f| f.filename.as_str()).collect();
                self.audit.record(event(
                    request,
                    SecurityEventKind::PolicyViolation,
                    EventOutcome::Rejected,
                    format!("upload code={} files={}", rejection.code, names.join(",")),
                ));
                StageOutcome::Reject(rejection)
            }
        }
    }
}

// 10. Content-type enforcement

pub struct ContentTypeStage {
    pub allowed: Vec<String>,
}

#[async_trait]
impl Stage for ContentTypeStage {
    fn name(&self) -> &'static str {
        "content_type"
    }

    async fn process(&self, request: &mut InboundRequest) -> StageOutcome {
        match limits::check_content_type(
            request.method(),
            request.headers(),
            request.raw_body.len(),
            &self.allowed,
        ) {
            Ok(()) => StageOutcome::Continue,
            Err(rejection) => StageOutcome::Reject(rejection),
        }
    }
}
