use crate::webhook_models::ProviderWebhook;
use axum::{body::Bytes, http::StatusCode};

/// Provider webhook.
///
/// Logs the callback and acknowledges it. Bodies that are not JSON are logged
/// as text; the provider always gets a 200.
pub async fn provider_webhook(body: Bytes) -> StatusCode {
    match serde_json::from_slice::<ProviderWebhook>(&body) {
        Ok(event) => {
            tracing::info!(
                "WEBHOOK CLT: type={:?} consult={:?} operation={:?} status={:?}",
                event.event_type,
                event.consult_id,
                event.operation_id,
                event.status
            );
            tracing::debug!("WEBHOOK CLT payload: {}", event.raw);
        }
        Err(_) => {
            tracing::info!("WEBHOOK CLT (raw): {}", String::from_utf8_lossy(&body));
        }
    }

    StatusCode::OK
}
