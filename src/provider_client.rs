use crate::errors::AppError;
use crate::models::{ConsultPayload, ConsultRecord, ListingPage, OperationRecord, SearchFilter};
use crate::token_provider::{Credential, TokenProvider};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// Builds the HTTP client shared by the token provider and the consignment
/// client. Every outbound call is bounded by `timeout`.
pub fn build_http_client(timeout: Duration) -> Result<Client, AppError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| AppError::InternalError(format!("Failed to create HTTP client: {}", e)))
}

/// Client for the provider's private-consignment API.
///
/// Each call acquires its own credential first; tokens are never shared
/// between calls, even within one inbound request.
#[derive(Clone)]
pub struct ProviderClient {
    client: Client,
    base_url: String,
    tokens: TokenProvider,
}

impl ProviderClient {
    pub fn new(client: Client, base_url: String, tokens: TokenProvider) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            tokens,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/private-consignment/{}", self.base_url, path)
    }

    /// `consult/{id}/authorize`, with the id percent-encoded as one path segment.
    fn authorize_url(&self, consult_id: &str) -> Result<Url, AppError> {
        let mut url = Url::parse(&self.url("consult"))
            .map_err(|e| AppError::InternalError(format!("invalid provider base URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| AppError::InternalError("provider base URL cannot carry a path".to_string()))?
            .push(consult_id)
            .push("authorize");
        Ok(url)
    }

    /// Creates a consult for the borrower in `payload`.
    pub async fn create_consult(&self, payload: &ConsultPayload) -> Result<Value, AppError> {
        let token = self.tokens.acquire_token().await?;
        tracing::info!(
            "Creating consult for document {}",
            payload.borrower_document_number
        );

        let request = self.client.post(self.url("consult")).json(payload);
        read_json(send(request, &token, "consult creation").await?, "consult creation").await
    }

    /// Lists consults matching `filter`.
    pub async fn list_consults(&self, filter: &SearchFilter) -> Result<Vec<ConsultRecord>, AppError> {
        let token = self.tokens.acquire_token().await?;
        tracing::info!(
            "Searching consults for document {} (page {}, limit {}, {} .. {})",
            filter.document_number,
            filter.page,
            filter.limit,
            filter.start,
            filter.end
        );

        let request = self
            .client
            .get(self.url("consult"))
            .query(&filter.query_pairs());
        let page: ListingPage<ConsultRecord> =
            read_typed(send(request, &token, "consult search").await?, "consult search").await?;

        tracing::info!(
            "Consult search returned {} record(s) for document {}",
            page.data.len(),
            filter.document_number
        );
        Ok(page.data)
    }

    /// Resends the consent link for a consult. The provider may answer with an
    /// empty body, reported as `None`.
    pub async fn authorize_consult(&self, consult_id: &str) -> Result<Option<Value>, AppError> {
        let url = self.authorize_url(consult_id)?;
        let token = self.tokens.acquire_token().await?;
        tracing::info!("Resending authorization for consult {}", consult_id);

        let request = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_LENGTH, "0");
        let body = read_json(
            send(request, &token, "consult authorization").await?,
            "consult authorization",
        )
        .await?;

        Ok((!body.is_null()).then_some(body))
    }

    pub async fn simulation_configs(&self) -> Result<Value, AppError> {
        let token = self.tokens.acquire_token().await?;
        let request = self.client.get(self.url("simulation/configs"));
        read_json(send(request, &token, "simulation configs").await?, "simulation configs").await
    }

    pub async fn simulate<T: Serialize + ?Sized>(&self, body: &T) -> Result<Value, AppError> {
        let token = self.tokens.acquire_token().await?;
        let request = self.client.post(self.url("simulation")).json(body);
        read_json(send(request, &token, "simulation").await?, "simulation").await
    }

    pub async fn create_operation<T: Serialize + ?Sized>(&self, body: &T) -> Result<Value, AppError> {
        let token = self.tokens.acquire_token().await?;
        let request = self.client.post(self.url("operation")).json(body);
        read_json(send(request, &token, "operation creation").await?, "operation creation").await
    }

    /// Lists operations with the caller's query forwarded verbatim.
    pub async fn list_operations_raw(&self, query: &[(String, String)]) -> Result<Value, AppError> {
        let token = self.tokens.acquire_token().await?;
        let request = self.client.get(self.url("operation")).query(query);
        read_json(send(request, &token, "operation listing").await?, "operation listing").await
    }

    /// Lists operations for the borrower in `filter`.
    pub async fn list_operations(
        &self,
        filter: &SearchFilter,
    ) -> Result<Vec<OperationRecord>, AppError> {
        let token = self.tokens.acquire_token().await?;
        tracing::info!(
            "Searching operations for document {} (page {}, limit {})",
            filter.document_number,
            filter.page,
            filter.limit
        );

        let request = self
            .client
            .get(self.url("operation"))
            .query(&filter.query_pairs());
        let page: ListingPage<OperationRecord> = read_typed(
            send(request, &token, "operation listing").await?,
            "operation listing",
        )
        .await?;

        Ok(page.data)
    }
}

async fn send(
    request: RequestBuilder,
    token: &Credential,
    operation: &str,
) -> Result<Response, AppError> {
    request
        .bearer_auth(token.as_str())
        .send()
        .await
        .map_err(|e| AppError::transport(format!("{} request failed: {}", operation, e)))
}

/// Reads a JSON body, turning non-2xx responses into `AppError::Provider` with
/// the provider's structured payload attached when it sent one.
async fn read_json(response: Response, operation: &str) -> Result<Value, AppError> {
    let status = response.status();
    let bytes = response.bytes().await.map_err(|e| {
        AppError::transport(format!("failed to read {} response: {}", operation, e))
    })?;

    if !status.is_success() {
        let body = serde_json::from_slice::<Value>(&bytes).ok();
        return Err(AppError::Provider {
            upstream_status: Some(status.as_u16()),
            body,
            message: format!(
                "{} returned {}: {}",
                operation,
                status,
                String::from_utf8_lossy(&bytes)
            ),
        });
    }

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }

    serde_json::from_slice(&bytes).map_err(|e| AppError::Provider {
        upstream_status: Some(status.as_u16()),
        body: None,
        message: format!("failed to parse {} response: {}", operation, e),
    })
}

async fn read_typed<T: DeserializeOwned>(response: Response, operation: &str) -> Result<T, AppError> {
    let value = read_json(response, operation).await?;
    serde_json::from_value(value).map_err(|e| AppError::Provider {
        upstream_status: None,
        body: None,
        message: format!("unexpected {} response shape: {}", operation, e),
    })
}
