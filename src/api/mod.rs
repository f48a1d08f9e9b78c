//! HTTP surface: routes and middleware.

use crate::handlers::{self, AppState};
use crate::webhook_handler;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

/// Builds the application router.
pub fn router(state: Arc<AppState>) -> Router {
    let clt_routes = Router::new()
        // Consult reconciliation
        .route("/clt/consult", post(handlers::create_consult))
        .route("/clt/consult/find", post(handlers::find_consult))
        .route("/clt/consult/authorize", post(handlers::authorize_consult))
        .route("/clt/consult/margem", post(handlers::consult_margin))
        // Provider passthroughs
        .route("/clt/taxas", get(handlers::simulation_configs))
        .route("/clt/simular", post(handlers::simulate))
        .route("/clt/proposta", post(handlers::create_proposal))
        .route("/clt/operacoes", get(handlers::list_operations))
        // Provider callbacks
        .route("/clt/webhook", post(webhook_handler::provider_webhook))
        // Request size limit: 5MB max payload
        .layer(ServiceBuilder::new().layer(RequestBodyLimitLayer::new(5 * 1024 * 1024)));

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .merge(clt_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
