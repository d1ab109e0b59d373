pub mod handlers;
pub mod middleware;
pub mod state;

use std::sync::Arc;

use axum::{
    http::HeaderMap,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::{config::Settings, service::ServiceContext};
use state::AppState;

pub fn create_app(services: Arc<ServiceContext>, settings: Arc<Settings>) -> Router {
    let app_state = AppState::new(services, settings);

    Router::new()
        // Root and health endpoints
        .route("/", get(handlers::root::root))
        .route("/health", get(handlers::root::health_check))
        // Public API surface
        .nest("/api", api_routes())
        // Admin surface
        .nest("/admin", admin_routes(app_state.clone()))
        .with_state(app_state)
        // Middleware
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive()) // Configure properly for production
        .layer(TraceLayer::new_for_http())
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/members", post(handlers::members::register))
        .route("/orders", post(handlers::payments::create_order))
        .route("/orders/:id/status", get(handlers::payments::order_status))
        .route("/payments/webhook", post(handlers::payments::webhook))
        .route("/renewals/verify", get(handlers::renewals::verify))
        .route("/renewals", post(handlers::renewals::submit))
}

fn admin_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/stats", get(handlers::admin::stats))
        .route("/sweep", post(handlers::admin::run_sweep))
        .route("/pricing", get(handlers::admin::get_pricing))
        .route("/pricing", put(handlers::admin::set_price))
        .route("/members", get(handlers::members::list))
        .route("/members/:id", get(handlers::members::get))
        .route("/members/:id", put(handlers::members::update))
        .route("/members/:id", delete(handlers::members::delete))
        .route("/members/:id/ledger", get(handlers::members::ledger))
        .route("/members/:id/renewals", get(handlers::members::renewal_history))
        .route(
            "/members/:id/payment/confirm",
            post(handlers::payments::confirm_payment),
        )
        .route(
            "/members/:id/payment/reject",
            post(handlers::payments::reject_payment),
        )
        .route(
            "/members/:id/renewal/token",
            post(handlers::renewals::issue_token),
        )
        .route(
            "/members/:id/renewal/approve",
            post(handlers::renewals::approve),
        )
        .route(
            "/members/:id/renewal/reject",
            post(handlers::renewals::reject),
        )
        .route("/renewals/legacy", post(handlers::renewals::submit_legacy))
        .layer(axum::middleware::from_fn_with_state(
            state,
            middleware::auth::require_admin,
        ))
}

/// Caller identity for admission control: the first `x-forwarded-for`
/// hop when present. Deployments terminate TLS in front of the service,
/// so the peer address alone would collapse every caller into one key.
pub(crate) fn client_key(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
