//! Request security pipeline.
//!
//! # Data Flow
//! ```text
//! Request
//!     → resolve client IP
//!     → stages 1..10 in fixed order (first Reject/Respond ends the chain)
//!     → handler (only if every stage continued)
//!     → on_response hooks of executed stages, last executed first
//!     → Response
//! ```
//!
//! # Design Decisions
//! - The chain is an ordered list of stage objects composed once at startup
//! - A request is in-flight, rejected or passed; rejected is terminal
//! - Every rejection is recorded with the stage name and code
//! - Tier limiters are not part of the chain; they sit on route groups

pub mod builder;
pub mod stage;
pub mod stages;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::http::request::resolve_client_ip;
use crate::observability::audit::{EventOutcome, SecurityEvent, SecurityEventKind};
use crate::observability::metrics;

pub use builder::{Pipeline, PipelineBuilder};
pub use stage::{InboundRequest, RequestContext, Stage, StageOutcome};

/// Run the fixed chain in front of every route.
pub async fn pipeline_middleware(
    State(pipeline): State<Arc<Pipeline>>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let client_ip = resolve_client_ip(&request, pipeline.trust_proxy());
    let mut inbound = InboundRequest::new(request, client_ip);

    let mut executed = 0;
    let mut terminal = None;
    for stage in pipeline.stages() {
        executed += 1;
        match stage.process(&mut inbound).await {
            StageOutcome::Continue => {}
            StageOutcome::Reject(rejection) => {
                tracing::info!(
                    stage = stage.name(),
                    code = %rejection.code,
                    status = rejection.status.as_u16(),
                    client = %inbound.client_ip.as_str(),
                    path = %inbound.path(),
                    "Request rejected"
                );
                metrics::record_stage_rejection(stage.name(), rejection.code.as_str());
                pipeline.audit().record(SecurityEvent::new(
                    SecurityEventKind::RequestRejected,
                    inbound.client_ip.as_str(),
                    inbound.method().as_str(),
                    inbound.path(),
                    EventOutcome::Rejected,
                    format!("stage={} code={}", stage.name(), rejection.code),
                ));
                terminal = Some(rejection.into_response());
                break;
            }
            StageOutcome::Respond(response) => {
                terminal = Some(response);
                break;
            }
        }
    }

    let context = inbound.context();
    let mut response = match terminal {
        Some(response) => response,
        None => next.run(inbound.into_request()).await,
    };

    for stage in pipeline.stages()[..executed].iter().rev() {
        stage.on_response(&context, &mut response);
    }
    response
}
