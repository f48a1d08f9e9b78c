//! Shared fixtures: a config pointing at a wiremock server that plays both the
//! OAuth authority and the consignment API.
#![allow(dead_code)]

use serde_json::json;
use v8_clt_proxy::config::Config;
use v8_clt_proxy::lookup::LookupStrategy;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const CPF: &str = "11144477735";
pub const DUPLICATE_TYPE: &str = "consult_already_exists_by_user_and_document_number";

pub fn test_config(server: &MockServer, lookup_strategy: LookupStrategy) -> Config {
    Config {
        port: 0,
        v8_client_id: "client-id".to_string(),
        v8_user: "user@example.com".to_string(),
        v8_pass: "secret".to_string(),
        v8_auth_url: format!("{}/oauth/token", server.uri()),
        v8_audience: "https://bff.v8sistema.com".to_string(),
        v8_base_url: server.uri(),
        v8_provedor: "QI".to_string(),
        lookup_strategy,
        consult_lookback_days: 30,
        http_timeout_secs: 5,
    }
}

/// Token endpoint that accepts the password grant `times` times.
pub async fn mount_token(server: &MockServer, times: u64) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=password"))
        .and(body_string_contains("scope=offline_access"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "test-token",
            "token_type": "Bearer",
            "expires_in": 3600
        })))
        .expect(times)
        .mount(server)
        .await;
}

pub fn consult_request_body() -> serde_json::Value {
    json!({
        "document_number": CPF,
        "gender": "female",
        "birth_date": "1990-05-17",
        "name": "Maria Souza",
        "email": "maria@example.com",
        "phone_number": "987654321",
        "area_code": "11"
    })
}
