use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Callback sent by the provider when a consult or operation changes.
///
/// Only the fields worth logging are typed; everything else stays in `raw`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderWebhook {
    /// Event type (e.g., "consult.status_changed").
    #[serde(default, rename = "type")]
    pub event_type: Option<String>,

    #[serde(default)]
    pub consult_id: Option<String>,

    #[serde(default)]
    pub operation_id: Option<String>,

    #[serde(default)]
    pub status: Option<String>,

    /// Raw data for any additional fields
    #[serde(flatten)]
    pub raw: Value,
}
