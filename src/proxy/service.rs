//! Gateway HTTP service
//!
//! The `ProxyService` wires the scheduler, the usage ledger and the
//! permission checks into an axum router.
//!
//! ## Service Lifecycle
//!
//! ```rust,ignore
//! use tollbooth::proxy::{ProxyConfig, ProxyService};
//!
//! // 1. Create the service around a started scheduler
//! let service = ProxyService::new(scheduler, ProxyConfig::default())
//!     .with_ledger(ledger)
//!     .with_feature_passwords(passwords);
//!
//! // 2. Convert to an Axum router
//! let router = service.into_router();
//!
//! // 3. Serve with Axum
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, router).await?;
//! ```
//!
//! ## Middleware order (outermost first)
//!
//! request ID, logging, identity, body limit, then the admin guard on the
//! queue routes only.

use crate::infrastructure::log_messages::database as log_msg;
use crate::ledger::UsageLedger;
use crate::proxy::admin;
use crate::proxy::auth::{SessionResolver, StaticSessionResolver};
use crate::proxy::handler::chat_completions;
use crate::proxy::headers::paths;
use crate::proxy::middleware::{
    admin_permission_middleware, identity_middleware, logging_middleware, request_id_middleware,
};
use crate::proxy::permissions::FeaturePasswords;
use crate::proxy::types::ProxyConfig;
use crate::scheduler::RequestScheduler;
use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    middleware::{from_fn, from_fn_with_state},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::warn;

/// Shared state of every gateway route
#[derive(Clone)]
pub struct GatewayState {
    pub scheduler: RequestScheduler,
    /// Absent when billing is disabled
    pub ledger: Option<UsageLedger>,
    pub passwords: Arc<FeaturePasswords>,
    pub config: Arc<ProxyConfig>,
}

/// Main gateway service
pub struct ProxyService {
    state: GatewayState,
    resolver: Arc<dyn SessionResolver>,
}

impl ProxyService {
    pub fn new(scheduler: RequestScheduler, config: ProxyConfig) -> Self {
        Self {
            state: GatewayState {
                scheduler,
                ledger: None,
                passwords: Arc::new(FeaturePasswords::disabled()),
                config: Arc::new(config),
            },
            resolver: Arc::new(StaticSessionResolver::new()),
        }
    }

    pub fn with_ledger(mut self, ledger: UsageLedger) -> Self {
        self.state.ledger = Some(ledger);
        self
    }

    pub fn with_feature_passwords(mut self, passwords: FeaturePasswords) -> Self {
        self.state.passwords = Arc::new(passwords);
        self
    }

    pub fn with_session_resolver(mut self, resolver: Arc<dyn SessionResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn state(&self) -> &GatewayState {
        &self.state
    }

    /// Create an Axum router for the gateway with middleware
    pub fn into_router(self) -> Router {
        let body_limit = *self.state.config.max_request_size.as_ref();

        let admin = Router::new()
            .route(paths::QUEUE_STATUS, get(admin::queue_status))
            .route(paths::QUEUE_CONCURRENCY, post(admin::set_concurrency))
            .route(paths::QUEUE_ACTIVITY, post(admin::set_activity))
            .route(paths::QUEUE_INTERVALS, post(admin::update_intervals))
            .route_layer(from_fn_with_state(
                Arc::clone(&self.state.passwords),
                admin_permission_middleware,
            ));

        Router::new()
            .route(paths::CHAT_COMPLETIONS, post(chat_completions))
            .route(paths::CHAT_COMPLETIONS_ALIAS, post(chat_completions))
            .route(paths::HEALTH, get(health_handler))
            .merge(admin)
            .with_state(self.state)
            .layer(DefaultBodyLimit::disable())
            .layer(RequestBodyLimitLayer::new(body_limit))
            .layer(from_fn_with_state(self.resolver, identity_middleware))
            .layer(from_fn(logging_middleware))
            .layer(from_fn(request_id_middleware))
    }
}

/// Health check handler
///
/// Reports the ledger backend as well; a failing ledger makes the gateway
/// unhealthy because billed requests cannot be served.
async fn health_handler(State(state): State<GatewayState>) -> impl IntoResponse {
    let Some(ledger) = state.ledger.as_ref() else {
        return (StatusCode::OK, Json(json!({ "status": "ok", "ledger": "disabled" })));
    };

    match ledger.store().health_check().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok", "ledger": "ok" }))),
        Err(error) => {
            warn!(%error, "{}", log_msg::HEALTH_CHECK_FAILED);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unhealthy", "ledger": error.to_string() })),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{InMemoryLedgerStore, PricingResolver};
    use crate::proxy::headers::{X_FEATURE_PASSWORD, X_REQUEST_ID};
    use crate::scheduler::{
        Delivery, Outcome, RequestExecutor, RequestOptions, SchedulerConfig, SchedulerError,
    };
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::Value;
    use tower::ServiceExt;

    struct Unreachable;

    #[async_trait]
    impl RequestExecutor for Unreachable {
        async fn execute(
            &self,
            _options: RequestOptions,
            _delivery: Delivery,
        ) -> Result<Outcome, SchedulerError> {
            Err(SchedulerError::Aborted)
        }
    }

    fn service() -> ProxyService {
        let scheduler = RequestScheduler::new(Arc::new(Unreachable), SchedulerConfig::default());
        ProxyService::new(scheduler, ProxyConfig::default())
    }

    async fn json_body(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn health_reports_the_ledger() {
        let ledger = UsageLedger::new(
            Arc::new(InMemoryLedgerStore::new()),
            PricingResolver::default(),
        );
        let router = service().with_ledger(ledger).into_router();

        let response = router
            .oneshot(Request::get(paths::HEALTH).body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key(X_REQUEST_ID));
        let body = json_body(response).await;
        assert_eq!(body["ledger"], "ok");
    }

    #[tokio::test]
    async fn queue_routes_require_the_admin_password() {
        let router = service()
            .with_feature_passwords(FeaturePasswords::parse("ops:admin-queue", true))
            .into_router();

        let denied = router
            .clone()
            .oneshot(Request::get(paths::QUEUE_STATUS).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);

        let allowed = router
            .oneshot(
                Request::get(paths::QUEUE_STATUS)
                    .header(X_FEATURE_PASSWORD, "ops")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(allowed.status(), StatusCode::OK);
        let body = json_body(allowed).await;
        assert_eq!(body["queueSize"], 0);
        assert_eq!(body["concurrencyLimit"], 1);
    }

    #[tokio::test]
    async fn queue_routes_are_closed_without_configured_passwords() {
        let scheduler = RequestScheduler::new(Arc::new(Unreachable), SchedulerConfig::default());
        let router = ProxyService::new(scheduler.clone(), ProxyConfig::default()).into_router();

        let response = router
            .oneshot(
                Request::post(paths::QUEUE_CONCURRENCY)
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"limit":500}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(json_body(response).await["error"]["code"], "invalid_feature_password");
        assert_eq!(scheduler.status().concurrency_limit, 1);
    }

    #[tokio::test]
    async fn tuning_endpoints_apply_and_report() {
        let router = service()
            .with_feature_passwords(FeaturePasswords::parse("ops:admin-queue", true))
            .into_router();

        let response = router
            .clone()
            .oneshot(
                Request::post(paths::QUEUE_CONCURRENCY)
                    .header("content-type", "application/json")
                    .header(X_FEATURE_PASSWORD, "ops")
                    .body(Body::from(r#"{"limit":4}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(json_body(response).await["concurrencyLimit"], 4);

        let response = router
            .oneshot(
                Request::post(paths::QUEUE_INTERVALS)
                    .header("content-type", "application/json")
                    .header(X_FEATURE_PASSWORD, "ops")
                    .body(Body::from(r#"{"minMs":1,"maxMs":90000}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        let body = json_body(response).await;
        assert_eq!(body["intervalSettings"]["minMs"], 10);
        assert_eq!(body["intervalSettings"]["maxMs"], 90000);
    }

    #[tokio::test]
    async fn oversized_bodies_are_rejected() {
        let config = ProxyConfig {
            max_request_size: crate::proxy::types::RequestSizeLimit::try_new(16).unwrap(),
            ..ProxyConfig::default()
        };
        let scheduler = RequestScheduler::new(Arc::new(Unreachable), SchedulerConfig::default());
        let router = ProxyService::new(scheduler, config).into_router();

        let response = router
            .oneshot(
                Request::post(paths::CHAT_COMPLETIONS)
                    .header("content-type", "application/json")
                    .body(Body::from(
                        r#"{"model":"gpt-4o","messages":[{"role":"user","content":"hello there"}]}"#,
                    ))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
