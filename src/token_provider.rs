use crate::config::Config;
use crate::errors::AppError;
use reqwest::Client;
use serde::Deserialize;
use std::fmt;

/// Bearer token issued by the provider's OAuth authority.
///
/// Scoped to a single outbound call and never cached.
#[derive(Clone)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential([REDACTED])")
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Acquires provider credentials through the OAuth password grant.
#[derive(Clone)]
pub struct TokenProvider {
    client: Client,
    auth_url: String,
    client_id: String,
    audience: String,
    username: String,
    password: String,
}

impl TokenProvider {
    pub fn new(config: &Config, client: Client) -> Self {
        Self {
            client,
            auth_url: config.v8_auth_url.clone(),
            client_id: config.v8_client_id.clone(),
            audience: config.v8_audience.clone(),
            username: config.v8_user.clone(),
            password: config.v8_pass.clone(),
        }
    }

    /// Requests a fresh token. One network call per invocation, no retries.
    pub async fn acquire_token(&self) -> Result<Credential, AppError> {
        let form = [
            ("grant_type", "password"),
            ("client_id", self.client_id.as_str()),
            ("audience", self.audience.as_str()),
            ("username", self.username.as_str()),
            ("password", self.password.as_str()),
            ("scope", "offline_access"),
        ];

        tracing::debug!("Requesting provider token from {}", self.auth_url);

        let response = self
            .client
            .post(&self.auth_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| AppError::AuthFailure(format!("token request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::AuthFailure(format!(
                "auth server returned {}: {}",
                status, error_text
            )));
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            AppError::AuthFailure(format!("failed to parse token response: {}", e))
        })?;

        let access_token = token
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::AuthFailure("token response missing access_token".into()))?;

        tracing::debug!("Provider token acquired (expires_in: {:?})", token.expires_in);
        Ok(Credential::new(access_token))
    }
}
