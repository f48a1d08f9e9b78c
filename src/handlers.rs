use crate::config::Config;
use crate::errors::AppError;
use crate::models::{
    AuthorizationResult, AuthorizeRequest, ConsultOutcome, ConsultRequest, LookupRequest,
    MarginResult, ReusedConsult,
};
use crate::provider_client::{build_http_client, ProviderClient};
use crate::reconciler::ConsultReconciler;
use crate::token_provider::TokenProvider;
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Shared application state injected into handlers.
///
/// Holds configuration and clients only; there is no per-request state and no
/// token cache.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Consignment API client used by the passthrough endpoints.
    pub provider: ProviderClient,
    /// Consult creation, recovery and lookup.
    pub reconciler: ConsultReconciler,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, AppError> {
        let http = build_http_client(Duration::from_secs(config.http_timeout_secs))?;
        let tokens = TokenProvider::new(&config, http.clone());
        let provider = ProviderClient::new(http, config.v8_base_url.clone(), tokens);
        let reconciler = ConsultReconciler::new(provider.clone(), &config);

        Ok(Self {
            config,
            provider,
            reconciler,
        })
    }
}

/// GET /
pub async fn root() -> &'static str {
    "API ONLINE"
}

/// Health check endpoint.
pub async fn health() -> (StatusCode, Json<Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "v8-clt-proxy",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// POST /clt/consult
///
/// Creates a consult, or returns the existing one with `reused: true` when the
/// provider reports a duplicate for the document.
pub async fn create_consult(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ConsultRequest>, JsonRejection>,
) -> Result<Json<ConsultOutcome>, AppError> {
    let Json(request) = payload?;
    let document_number = request.document_number.clone();
    tracing::info!("POST /clt/consult - document: {}", document_number);

    let outcome = state.reconciler.create_or_reuse_consult(request).await?;
    tracing::info!(
        "POST /clt/consult - document {} answered with {} consult",
        document_number,
        if outcome.is_reused() { "an existing" } else { "a new" }
    );
    Ok(Json(outcome))
}

/// POST /clt/consult/find
pub async fn find_consult(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LookupRequest>, JsonRejection>,
) -> Result<Json<ReusedConsult>, AppError> {
    let Json(request) = payload?;
    tracing::info!(
        "POST /clt/consult/find - document: {}",
        request.document_number
    );

    let found = state.reconciler.find_consult(&request).await?;
    Ok(Json(found))
}

/// POST /clt/consult/authorize
pub async fn authorize_consult(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<AuthorizeRequest>, JsonRejection>,
) -> Result<Json<AuthorizationResult>, AppError> {
    let Json(request) = payload?;
    tracing::info!(
        "POST /clt/consult/authorize - consult: {:?}",
        request.consult_id
    );

    let result = state
        .reconciler
        .resend_authorization(request.consult_id.as_deref())
        .await?;
    Ok(Json(result))
}

/// POST /clt/consult/margem
pub async fn consult_margin(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LookupRequest>, JsonRejection>,
) -> Result<Json<MarginResult>, AppError> {
    let Json(request) = payload?;
    tracing::info!(
        "POST /clt/consult/margem - document: {}",
        request.document_number
    );

    let margin = state.reconciler.get_margin(&request).await?;
    Ok(Json(margin))
}

/// GET /clt/taxas
///
/// Upstream failures answer 500 here, unlike the other passthroughs.
pub async fn simulation_configs(State(state): State<Arc<AppState>>) -> Response {
    match state.provider.simulation_configs().await {
        Ok(body) => Json(body).into_response(),
        Err(e) => e.into_response_with(StatusCode::INTERNAL_SERVER_ERROR),
    }
}

/// POST /clt/simular
pub async fn simulate(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(body) = payload?;
    Ok(Json(state.provider.simulate(&body).await?))
}

/// POST /clt/proposta
pub async fn create_proposal(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, AppError> {
    let Json(body) = payload?;
    Ok(Json(state.provider.create_operation(&body).await?))
}

/// GET /clt/operacoes
pub async fn list_operations(
    State(state): State<Arc<AppState>>,
    Query(query): Query<Vec<(String, String)>>,
) -> Result<Json<Value>, AppError> {
    Ok(Json(state.provider.list_operations_raw(&query).await?))
}
