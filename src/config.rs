use serde::Deserialize;

use crate::lookup::LookupStrategy;

const DEFAULT_AUTH_URL: &str = "https://auth.v8sistema.com/oauth/token";
const DEFAULT_AUDIENCE: &str = "https://bff.v8sistema.com";
const DEFAULT_BASE_URL: &str = "https://bff.v8sistema.com";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    pub v8_client_id: String,
    pub v8_user: String,
    pub v8_pass: String,
    pub v8_auth_url: String,
    pub v8_audience: String,
    pub v8_base_url: String,
    /// Tag sent as `provedor` on every consult search.
    pub v8_provedor: String,
    pub lookup_strategy: LookupStrategy,
    pub consult_lookback_days: i64,
    pub http_timeout_secs: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self {
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "10000".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("PORT must be a valid number between 1-65535"))?,
            v8_client_id: required("V8_CLIENT_ID")?,
            v8_user: required("V8_USER")?,
            v8_pass: required("V8_PASS")?,
            v8_auth_url: url_or_default("V8_AUTH_URL", DEFAULT_AUTH_URL)?,
            v8_audience: std::env::var("V8_AUDIENCE")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_AUDIENCE.to_string()),
            v8_base_url: url_or_default("V8_BASE_URL", DEFAULT_BASE_URL)?
                .trim_end_matches('/')
                .to_string(),
            v8_provedor: std::env::var("V8_PROVEDOR")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| "QI".to_string()),
            lookup_strategy: std::env::var("V8_LOOKUP_STRATEGY")
                .unwrap_or_else(|_| "consult".to_string())
                .parse()?,
            consult_lookback_days: std::env::var("CONSULT_LOOKBACK_DAYS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .ok()
                .filter(|days: &i64| *days > 0)
                .ok_or_else(|| {
                    anyhow::anyhow!("CONSULT_LOOKBACK_DAYS must be a positive number of days")
                })?,
            http_timeout_secs: std::env::var("HTTP_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .ok()
                .filter(|secs: &u64| *secs > 0)
                .ok_or_else(|| anyhow::anyhow!("HTTP_TIMEOUT_SECS must be a positive number"))?,
        };

        // Credentials are never logged
        tracing::debug!("V8 auth URL: {}", config.v8_auth_url);
        tracing::debug!("V8 base URL: {}", config.v8_base_url);
        tracing::debug!(
            "Lookup strategy: {:?}, provedor: {}, lookback: {} days",
            config.lookup_strategy,
            config.v8_provedor,
            config.consult_lookback_days
        );
        tracing::debug!("Server Port: {}", config.port);

        Ok(config)
    }
}

fn required(name: &str) -> anyhow::Result<String> {
    std::env::var(name)
        .map_err(|_| anyhow::anyhow!("{} environment variable required", name))
        .and_then(|value| {
            if value.trim().is_empty() {
                anyhow::bail!("{} cannot be empty", name);
            }
            Ok(value)
        })
}

fn url_or_default(name: &str, default: &str) -> anyhow::Result<String> {
    let value = std::env::var(name)
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| default.to_string());

    if !value.starts_with("http://") && !value.starts_with("https://") {
        anyhow::bail!("{} must start with http:// or https://", name);
    }
    url::Url::parse(&value).map_err(|e| anyhow::anyhow!("{} is not a valid URL: {}", name, e))?;

    Ok(value)
}
