//! HTTP surface: shared state, router assembly and the route handlers.

pub mod admin;
pub mod donations;
pub mod donors;
pub mod health;
pub mod receipts;
pub mod status;
pub mod webhooks;

use crate::config::{AdminConfig, ReconciliationConfig};
use crate::database::repository::{DonationStore, ReceiptStore};
use crate::error::{AppError, AppResult, ValidationError};
use crate::health::HealthChecker;
use crate::middleware::admin_auth::{require_admin_token, AdminGuard};
use crate::middleware::error::get_request_id_from_headers;
use crate::middleware::logging::{request_logging_middleware, UuidRequestId};
use crate::payments::provider::PaymentGateway;
use crate::services::admin_dashboard::AdminDashboardService;
use crate::services::donation_orchestrator::DonationOrchestrator;
use crate::services::donor_lookup::DonorLookupService;
use crate::services::reconciliation::ReconciliationService;
use crate::services::webhook_processor::WebhookProcessor;
use crate::workers::reconciliation_poller::PollerRegistry;
use axum::{
    body::Bytes,
    http::{header, HeaderMap, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tracing::warn;

/// Collaborators the application is assembled from.
pub struct AppDependencies {
    pub gateway: Arc<dyn PaymentGateway>,
    pub store: Arc<dyn DonationStore>,
    pub receipts: Arc<dyn ReceiptStore>,
    pub reconciliation: ReconciliationConfig,
    pub admin: AdminConfig,
    pub receipts_base_url: Option<String>,
    pub shutdown_rx: watch::Receiver<bool>,
}

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<DonationOrchestrator>,
    pub reconciler: Arc<ReconciliationService>,
    pub poller: Arc<PollerRegistry>,
    pub donors: Arc<DonorLookupService>,
    pub dashboard: Arc<AdminDashboardService>,
    pub webhooks: Arc<WebhookProcessor>,
    pub receipts: Arc<dyn ReceiptStore>,
    pub receipts_base_url: Option<Arc<str>>,
    pub admin_guard: AdminGuard,
    pub health_checker: HealthChecker,
}

impl AppState {
    pub fn new(deps: AppDependencies) -> AppResult<Self> {
        let reconciler = Arc::new(ReconciliationService::new(
            deps.gateway.clone(),
            deps.store.clone(),
        ));
        let poller = Arc::new(PollerRegistry::new(
            reconciler.clone(),
            deps.reconciliation.clone(),
            deps.shutdown_rx,
        ));

        let mut orchestrator = DonationOrchestrator::new(deps.gateway.clone(), deps.store.clone());
        if deps.reconciliation.auto_start {
            orchestrator = orchestrator.with_poller(poller.clone());
        }

        let webhooks = WebhookProcessor::new(deps.gateway.clone(), reconciler.clone())
            .with_poller(poller.clone());

        Ok(Self {
            orchestrator: Arc::new(orchestrator),
            reconciler,
            poller: poller.clone(),
            donors: Arc::new(DonorLookupService::new(deps.store.clone())),
            dashboard: Arc::new(AdminDashboardService::new(deps.store.clone(), &deps.admin)?),
            webhooks: Arc::new(webhooks),
            receipts: deps.receipts,
            receipts_base_url: deps.receipts_base_url.map(Arc::from),
            admin_guard: AdminGuard::new(deps.admin.api_token),
            health_checker: HealthChecker::new(deps.store, deps.gateway.name()).with_poller(poller),
        })
    }
}

/// Assemble every route with request-id, logging and CORS layers.
pub fn build_router(state: AppState, cors_allowed_origins: &[String]) -> Router {
    let admin_routes = Router::new()
        .route("/api/admin/donations", get(admin::list_donations))
        .route("/api/admin/stats", get(admin::stats))
        .route("/api/admin/donations/cleanup", post(admin::cleanup))
        .route_layer(axum::middleware::from_fn_with_state(
            state.admin_guard.clone(),
            require_admin_token,
        ));

    Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .route("/health/live", get(health::liveness))
        .route("/api/donate", post(donations::donate))
        .route(
            "/api/donations/{id}/watch",
            post(donations::start_watch).delete(donations::stop_watch),
        )
        .route("/api/check-status", post(status::check_status))
        .route("/api/check-donor", post(donors::check_donor))
        .route("/api/history", post(donors::history))
        .route("/api/webhooks/{provider}", post(webhooks::handle_webhook))
        .route("/c/{short_id}", get(receipts::redirect_to_receipt))
        .merge(admin_routes)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                .layer(axum::middleware::from_fn(request_logging_middleware))
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(cors_layer(cors_allowed_origins)),
        )
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match origin.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = %origin, "ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

/// Attach the request id of the current request to an error.
pub(crate) fn tag(error: AppError, headers: &HeaderMap) -> AppError {
    match get_request_id_from_headers(headers) {
        Some(request_id) => error.with_request_id(request_id),
        None => error,
    }
}

/// Parse a JSON request body; an empty body reads as `{}`.
pub(crate) fn parse_json_body(body: &Bytes) -> AppResult<JsonValue> {
    if body.iter().all(|b| b.is_ascii_whitespace()) {
        return Ok(JsonValue::Object(Default::default()));
    }
    serde_json::from_slice(body).map_err(|e| {
        AppError::validation(ValidationError::InvalidField {
            field: "body".to_string(),
            reason: format!("JSON inválido: {}", e),
        })
    })
}

/// String or number id field, as sent by the donation form.
pub(crate) fn id_field(body: &JsonValue, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| match body.get(*name) {
        Some(JsonValue::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(JsonValue::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
