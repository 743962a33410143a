//! HTTP server setup.
//!
//! # Responsibilities
//! - Build the shared security components once from config
//! - Compose route groups, each with its own tier limiter and throttle
//! - Wrap the whole router in the fixed pipeline and the tower-http layers
//! - Serve with connect info and graceful shutdown
//! - Purge expired limiter windows in the background

use axum::{
    http::StatusCode,
    middleware::{from_fn, from_fn_with_state},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use crate::auth::{self, AuthError, AuthService, CredentialHasher, TokenIssuer, UserStore};
use crate::config::GuardConfig;
use crate::http::request::{propagate_request_id_layer, set_request_id_layer};
use crate::lifecycle::shutdown::{self, Shutdown};
use crate::observability::audit::AuditLogger;
use crate::pipeline::{pipeline_middleware, Pipeline, PipelineBuilder};
use crate::security::rate_limit::{rate_limit_middleware, Policy, RateLimiter, Tier};
use crate::security::throttle::{throttle_middleware, ProgressiveThrottle};

/// One limiter per tier. Tiers never share counters.
#[derive(Debug, Clone)]
pub struct TierLimiters {
    pub auth: Arc<RateLimiter>,
    pub api: Arc<RateLimiter>,
    pub strict: Arc<RateLimiter>,
    pub admin: Arc<RateLimiter>,
}

impl TierLimiters {
    pub fn from_config(config: &GuardConfig, audit: &AuditLogger) -> Self {
        let env = config.environment;
        let tiers = &config.rate_limit;
        let build = |tier, table| {
            Arc::new(RateLimiter::new(tier, Policy::from_tier(table, env), audit.clone()))
        };
        Self {
            auth: build(Tier::Auth, &tiers.auth),
            api: build(Tier::Api, &tiers.api),
            strict: build(Tier::Strict, &tiers.strict),
            admin: build(Tier::Admin, &tiers.admin),
        }
    }

    pub fn all(&self) -> [&Arc<RateLimiter>; 4] {
        [&self.auth, &self.api, &self.strict, &self.admin]
    }
}

/// Shared security components.
#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Arc<GuardConfig>,
    pub audit: AuditLogger,
    pub pipeline: Arc<Pipeline>,
    pub auth: Arc<AuthService>,
    pub limiters: TierLimiters,
    pub throttle: Arc<ProgressiveThrottle>,
}

impl AppState {
    pub fn new(
        config: GuardConfig,
        store: Arc<dyn UserStore>,
        audit: AuditLogger,
    ) -> Result<Self, AuthError> {
        let hasher = Arc::new(CredentialHasher::new(&config.auth)?);
        let issuer = Arc::new(TokenIssuer::new(&config.auth));
        let auth = Arc::new(AuthService::new(
            store,
            hasher,
            issuer,
            config.auth.lookup_timeout(),
        ));
        let pipeline = Arc::new(PipelineBuilder::from_config(&config, audit.clone()).build());
        let limiters = TierLimiters::from_config(&config, &audit);
        let throttle = Arc::new(ProgressiveThrottle::new(&config.throttle));

        Ok(Self {
            config: Arc::new(config),
            audit,
            pipeline,
            auth,
            limiters,
            throttle,
        })
    }
}

/// HTTP server for the guard.
pub struct HttpServer {
    state: AppState,
    api_routes: Option<Router>,
    sensitive_routes: Option<Router>,
}

impl HttpServer {
    pub fn new(config: GuardConfig, store: Arc<dyn UserStore>) -> Result<Self, AuthError> {
        Self::with_audit(config, store, AuditLogger::default())
    }

    pub fn with_audit(
        config: GuardConfig,
        store: Arc<dyn UserStore>,
        audit: AuditLogger,
    ) -> Result<Self, AuthError> {
        Ok(Self {
            state: AppState::new(config, store, audit)?,
            api_routes: None,
            sensitive_routes: None,
        })
    }

    /// Host routes behind the api tier.
    pub fn with_api_routes(mut self, routes: Router) -> Self {
        self.api_routes = Some(routes);
        self
    }

    /// Host routes behind the strict tier.
    pub fn with_sensitive_routes(mut self, routes: Router) -> Self {
        self.sensitive_routes = Some(routes);
        self
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Wrap `routes` in a tier limiter and the throttle, per config.
    fn limited(&self, routes: Router, limiter: &Arc<RateLimiter>) -> Router {
        let config = &self.state.config;
        let mut routes = routes;
        if config.throttle.enabled {
            routes = routes.layer(from_fn_with_state(
                self.state.throttle.clone(),
                throttle_middleware,
            ));
        }
        if config.rate_limit.enabled {
            routes = routes.layer(from_fn_with_state(limiter.clone(), rate_limit_middleware));
        }
        routes
    }

    /// Build the full router with all middleware layers.
    pub fn router(&self) -> Router {
        let state = &self.state;
        let limiters = &state.limiters;
        let issuer = state.auth.issuer().clone();

        let auth = self.limited(auth::auth_routes(state.auth.clone()), &limiters.auth);

        let admin = Router::new()
            .route("/api/admin/session", get(auth::handlers::session))
            .layer(from_fn(auth::middleware::require_admin))
            .layer(from_fn_with_state(issuer, auth::middleware::require_auth));
        let admin = self.limited(admin, &limiters.admin);

        let mut app = Router::new()
            .route("/health", get(health))
            .merge(auth)
            .merge(admin);

        if let Some(api) = &self.api_routes {
            app = app.merge(self.limited(api.clone(), &limiters.api));
        }
        if let Some(sensitive) = &self.sensitive_routes {
            app = app.merge(self.limited(sensitive.clone(), &limiters.strict));
        }

        app.fallback(not_found)
            .layer(from_fn_with_state(state.pipeline.clone(), pipeline_middleware))
            .layer(TimeoutLayer::new(Duration::from_secs(state.config.timeouts.request_secs)))
            .layer(propagate_request_id_layer())
            .layer(TraceLayer::new_for_http())
            .layer(set_request_id_layer())
    }

    /// Periodically drop expired windows from every counter store.
    pub fn spawn_cleanup(&self, shutdown: &Shutdown) -> tokio::task::JoinHandle<()> {
        let limiters = self.state.limiters.clone();
        let throttle = self.state.throttle.clone();
        let period = Duration::from_secs(self.state.config.rate_limit.cleanup_interval_secs.max(1));
        let stop = shutdown::wait(shutdown.subscribe());

        tokio::spawn(async move {
            tokio::pin!(stop);
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = &mut stop => break,
                    _ = ticker.tick() => {
                        let mut purged = 0;
                        for limiter in limiters.all() {
                            purged += limiter.store().purge_expired(limiter.policy().window);
                        }
                        purged += throttle.store().purge_expired(throttle.window());
                        if purged > 0 {
                            tracing::debug!(purged, "Expired rate-limit windows purged");
                        }
                    }
                }
            }
        })
    }

    /// Serve on `listener` until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, shutdown: Shutdown) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(
            address = %addr,
            environment = ?self.state.config.environment,
            "HTTP server starting"
        );

        let cleanup = self.spawn_cleanup(&shutdown);
        let app = self.router().into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown::wait(shutdown.subscribe()))
            .await?;

        shutdown.trigger();
        if let Err(e) = cleanup.await {
            tracing::warn!(error = %e, "Cleanup task ended abnormally");
        }
        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "success": false, "message": "Not found" })),
    )
}
