/// Consult reconciliation against a mocked provider
/// Covers creation, duplicate recovery, find, authorization resend and margin lookup
mod common;

use common::{consult_request_body, mount_token, test_config, CPF, DUPLICATE_TYPE};
use serde_json::json;
use v8_clt_proxy::errors::AppError;
use v8_clt_proxy::handlers::AppState;
use v8_clt_proxy::lookup::LookupStrategy;
use v8_clt_proxy::models::{ConsultOutcome, ConsultRequest, ConsultStatus, LookupRequest};
use v8_clt_proxy::reconciler::{CONSULT_NOT_FOUND_MESSAGE, MARGIN_NOT_FOUND_MESSAGE};
use wiremock::matchers::{bearer_token, body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn consult_request() -> ConsultRequest {
    serde_json::from_value(consult_request_body()).unwrap()
}

fn lookup(document: &str) -> LookupRequest {
    LookupRequest {
        document_number: document.to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_create_consult_returns_provider_body() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;

    let created = json!({ "id": "new-consult", "status": "WAITING_CONSENT" });
    Mock::given(method("POST"))
        .and(path("/private-consignment/consult"))
        .and(bearer_token("test-token"))
        .and(body_json(json!({
            "borrowerDocumentNumber": CPF,
            "gender": "female",
            "birthDate": "1990-05-17",
            "signerName": "Maria Souza",
            "signerEmail": "maria@example.com",
            "signerPhone": {
                "phoneNumber": "987654321",
                "countryCode": "55",
                "areaCode": "11"
            }
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(&created))
        .expect(1)
        .mount(&server)
        .await;

    let state = AppState::new(test_config(&server, LookupStrategy::ConsultSearch)).unwrap();
    let outcome = state
        .reconciler
        .create_or_reuse_consult(consult_request())
        .await
        .unwrap();

    assert!(!outcome.is_reused());
    assert_eq!(outcome, ConsultOutcome::Created(created));
}

#[tokio::test]
async fn test_duplicate_consult_is_recovered_with_fresh_token() {
    let server = MockServer::start().await;
    // One token for the create call, a second one for the recovery search
    mount_token(&server, 2).await;

    Mock::given(method("POST"))
        .and(path("/private-consignment/consult"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "type": DUPLICATE_TYPE,
            "title": "Consult already exists"
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/private-consignment/consult"))
        .and(query_param("search", CPF))
        .and(query_param("provedor", "QI"))
        .and(query_param("page", "1"))
        .and(query_param("limit", "50"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "id": "abc123", "documentNumber": CPF, "status": "WAITING_CONSENT" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let state = AppState::new(test_config(&server, LookupStrategy::ConsultSearch)).unwrap();
    let outcome = state
        .reconciler
        .create_or_reuse_consult(consult_request())
        .await
        .unwrap();

    assert_eq!(
        serde_json::to_value(&outcome).unwrap(),
        json!({ "consultId": "abc123", "status": "WAITING_CONSENT", "reused": true })
    );
}

#[tokio::test]
async fn test_repeated_create_reuses_original_id() {
    let server = MockServer::start().await;
    mount_token(&server, 3).await;

    // First call creates, every later call is reported as a duplicate
    Mock::given(method("POST"))
        .and(path("/private-consignment/consult"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "id": "abc123", "status": "WAITING_CONSENT" })),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/private-consignment/consult"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "type": DUPLICATE_TYPE })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/private-consignment/consult"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "id": "abc123", "documentNumber": CPF, "status": "CONSENT_APPROVED" }]
        })))
        .mount(&server)
        .await;

    let state = AppState::new(test_config(&server, LookupStrategy::ConsultSearch)).unwrap();

    let first = state
        .reconciler
        .create_or_reuse_consult(consult_request())
        .await
        .unwrap();
    let ConsultOutcome::Created(body) = first else {
        panic!("first call should create");
    };
    let original_id = body["id"].as_str().unwrap().to_string();

    let second = state
        .reconciler
        .create_or_reuse_consult(consult_request())
        .await
        .unwrap();
    let ConsultOutcome::Reused(reused) = second else {
        panic!("second call should reuse");
    };
    assert!(reused.reused);
    assert_eq!(reused.consult_id, original_id);
    assert_eq!(reused.status, ConsultStatus::ConsentApproved);
}

#[tokio::test]
async fn test_duplicate_without_record_is_distinct_error() {
    let server = MockServer::start().await;
    mount_token(&server, 2).await;

    Mock::given(method("POST"))
        .and(path("/private-consignment/consult"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "type": DUPLICATE_TYPE })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/private-consignment/consult"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .mount(&server)
        .await;

    let state = AppState::new(test_config(&server, LookupStrategy::ConsultSearch)).unwrap();
    let err = state
        .reconciler
        .create_or_reuse_consult(consult_request())
        .await
        .unwrap_err();

    match err {
        AppError::DuplicateUnresolved { document_number } => assert_eq!(document_number, CPF),
        other => panic!("expected DuplicateUnresolved, got {:?}", other),
    }
}

#[tokio::test]
async fn test_other_provider_errors_skip_recovery() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;

    let provider_error = json!({ "type": "invalid_birth_date", "detail": "birthDate is invalid" });
    Mock::given(method("POST"))
        .and(path("/private-consignment/consult"))
        .respond_with(ResponseTemplate::new(422).set_body_json(&provider_error))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/private-consignment/consult"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .expect(0)
        .mount(&server)
        .await;

    let state = AppState::new(test_config(&server, LookupStrategy::ConsultSearch)).unwrap();
    let err = state
        .reconciler
        .create_or_reuse_consult(consult_request())
        .await
        .unwrap_err();

    match err {
        AppError::Provider {
            upstream_status,
            body,
            ..
        } => {
            assert_eq!(upstream_status, Some(422));
            assert_eq!(body, Some(provider_error));
        }
        other => panic!("expected Provider error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_duplicate_recovered_through_operation_listing() {
    let server = MockServer::start().await;
    mount_token(&server, 2).await;

    Mock::given(method("POST"))
        .and(path("/private-consignment/consult"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "type": DUPLICATE_TYPE })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/private-consignment/operation"))
        .and(query_param("search", CPF))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {
                    "consultId": "someone-else",
                    "status": "SUCCESS",
                    "borrower": { "documentNumber": "99999999999" }
                },
                {
                    "consultId": "op-consult-1",
                    "status": "WAITING_CONSULT",
                    "borrower": { "documentNumber": "111.444.777-35" }
                }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let state = AppState::new(test_config(&server, LookupStrategy::OperationListing)).unwrap();
    let outcome = state
        .reconciler
        .create_or_reuse_consult(consult_request())
        .await
        .unwrap();

    let ConsultOutcome::Reused(reused) = outcome else {
        panic!("expected reuse");
    };
    assert_eq!(reused.consult_id, "op-consult-1");
    assert_eq!(reused.status, ConsultStatus::WaitingConsult);
}

#[tokio::test]
async fn test_find_consult_returns_first_record() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;

    Mock::given(method("GET"))
        .and(path("/private-consignment/consult"))
        .and(query_param("search", CPF))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                { "id": "first", "documentNumber": CPF, "status": "SUCCESS" },
                { "id": "second", "documentNumber": CPF, "status": "FAILED" }
            ]
        })))
        .mount(&server)
        .await;

    let state = AppState::new(test_config(&server, LookupStrategy::ConsultSearch)).unwrap();
    let request = LookupRequest {
        page: Some(2),
        ..lookup("111.444.777-35")
    };
    let found = state.reconciler.find_consult(&request).await.unwrap();

    assert_eq!(found.consult_id, "first");
    assert_eq!(found.status, ConsultStatus::Success);
    assert!(found.reused);
}

#[tokio::test]
async fn test_find_consult_without_records_is_not_found() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;

    Mock::given(method("GET"))
        .and(path("/private-consignment/consult"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .mount(&server)
        .await;

    let state = AppState::new(test_config(&server, LookupStrategy::ConsultSearch)).unwrap();
    let err = state.reconciler.find_consult(&lookup(CPF)).await.unwrap_err();

    match err {
        AppError::NotFound(message) => assert_eq!(message, CONSULT_NOT_FOUND_MESSAGE),
        other => panic!("expected NotFound, got {:?}", other),
    }
}

#[tokio::test]
async fn test_resend_authorization_without_id_makes_no_calls() {
    let server = MockServer::start().await;
    mount_token(&server, 0).await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let state = AppState::new(test_config(&server, LookupStrategy::ConsultSearch)).unwrap();

    for consult_id in [None, Some(""), Some("   ")] {
        let err = state
            .reconciler
            .resend_authorization(consult_id)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)), "{:?}", consult_id);
    }
}

#[tokio::test]
async fn test_resend_authorization_defaults_to_waiting_consent() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;

    Mock::given(method("POST"))
        .and(path("/private-consignment/consult/abc123/authorize"))
        .and(bearer_token("test-token"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let state = AppState::new(test_config(&server, LookupStrategy::ConsultSearch)).unwrap();
    let result = state
        .reconciler
        .resend_authorization(Some("abc123"))
        .await
        .unwrap();

    assert_eq!(result.consult_id, "abc123");
    assert_eq!(result.status, ConsultStatus::WaitingConsent);
}

#[tokio::test]
async fn test_resend_authorization_uses_provider_status() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;

    Mock::given(method("POST"))
        .and(path("/private-consignment/consult/abc123/authorize"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "status": "CONSENT_APPROVED" })),
        )
        .mount(&server)
        .await;

    let state = AppState::new(test_config(&server, LookupStrategy::ConsultSearch)).unwrap();
    let result = state
        .reconciler
        .resend_authorization(Some("abc123"))
        .await
        .unwrap();

    assert_eq!(result.status, ConsultStatus::ConsentApproved);
}

#[tokio::test]
async fn test_margin_requires_exact_document_match() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;

    Mock::given(method("GET"))
        .and(path("/private-consignment/consult"))
        .and(query_param("search", CPF))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                { "id": "fuzzy", "documentNumber": "111444777350", "status": "SUCCESS", "availableMarginValue": 9999 },
                { "id": "no-document", "status": "SUCCESS" },
                { "id": "exact", "documentNumber": "111.444.777-35", "status": "SUCCESS", "availableMarginValue": 1520.75 }
            ]
        })))
        .mount(&server)
        .await;

    let state = AppState::new(test_config(&server, LookupStrategy::ConsultSearch)).unwrap();
    let margin = state.reconciler.get_margin(&lookup(CPF)).await.unwrap();

    assert_eq!(margin.consult_id, "exact");
    assert_eq!(margin.status, ConsultStatus::Success);
    assert_eq!(margin.status_translated, ConsultStatus::Success.translate());
    assert_eq!(margin.available_margin_value, Some(1520.75));
}

#[tokio::test]
async fn test_records_without_id_are_skipped() {
    let server = MockServer::start().await;
    mount_token(&server, 3).await;

    Mock::given(method("POST"))
        .and(path("/private-consignment/consult"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "type": DUPLICATE_TYPE })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/private-consignment/consult"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                { "documentNumber": CPF, "status": "FAILED", "availableMarginValue": 1 },
                { "id": null, "documentNumber": CPF, "status": "FAILED" },
                { "id": 7781, "documentNumber": CPF, "status": "SUCCESS", "availableMarginValue": 640 }
            ]
        })))
        .expect(2)
        .mount(&server)
        .await;

    let state = AppState::new(test_config(&server, LookupStrategy::ConsultSearch)).unwrap();

    let outcome = state
        .reconciler
        .create_or_reuse_consult(consult_request())
        .await
        .unwrap();
    match outcome {
        ConsultOutcome::Reused(reused) => {
            assert_eq!(reused.consult_id, "7781");
            assert_eq!(reused.status, ConsultStatus::Success);
        }
        other => panic!("expected a reused consult, got {:?}", other),
    }

    let margin = state.reconciler.get_margin(&lookup(CPF)).await.unwrap();
    assert_eq!(margin.consult_id, "7781");
    assert_eq!(margin.available_margin_value, Some(640.0));
}

#[tokio::test]
async fn test_resend_authorization_rejects_malformed_id_without_calls() {
    let server = MockServer::start().await;
    mount_token(&server, 0).await;

    let state = AppState::new(test_config(&server, LookupStrategy::ConsultSearch)).unwrap();
    let err = state
        .reconciler
        .resend_authorization(Some("x/../../operation"))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Validation(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_margin_translates_unknown_status() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;

    Mock::given(method("GET"))
        .and(path("/private-consignment/consult"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "id": "c1", "documentNumber": CPF, "status": "ARCHIVED" }]
        })))
        .mount(&server)
        .await;

    let state = AppState::new(test_config(&server, LookupStrategy::ConsultSearch)).unwrap();
    let margin = state.reconciler.get_margin(&lookup(CPF)).await.unwrap();

    assert_eq!(margin.status.as_str(), "ARCHIVED");
    assert_eq!(margin.status_translated, "unknown status");
    assert_eq!(margin.available_margin_value, None);
}

#[tokio::test]
async fn test_margin_without_records_is_not_found() {
    let server = MockServer::start().await;
    mount_token(&server, 1).await;

    Mock::given(method("GET"))
        .and(path("/private-consignment/consult"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
        .mount(&server)
        .await;

    let state = AppState::new(test_config(&server, LookupStrategy::ConsultSearch)).unwrap();
    let err = state.reconciler.get_margin(&lookup(CPF)).await.unwrap_err();

    match err {
        AppError::NotFound(message) => assert_eq!(message, MARGIN_NOT_FOUND_MESSAGE),
        other => panic!("expected NotFound, got {:?}", other),
    }
}

#[tokio::test]
async fn test_rejected_token_is_auth_failure() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({ "error": "invalid_grant" })),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/private-consignment/consult"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let state = AppState::new(test_config(&server, LookupStrategy::ConsultSearch)).unwrap();
    let err = state
        .reconciler
        .create_or_reuse_consult(consult_request())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::AuthFailure(_)), "{:?}", err);
}

#[tokio::test]
async fn test_concurrent_requests_each_acquire_a_token() {
    let server = MockServer::start().await;
    mount_token(&server, 10).await;

    Mock::given(method("GET"))
        .and(path("/private-consignment/consult"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "id": "abc123", "documentNumber": CPF, "status": "SUCCESS" }]
        })))
        .expect(10)
        .mount(&server)
        .await;

    let state = AppState::new(test_config(&server, LookupStrategy::ConsultSearch)).unwrap();

    let mut handles = vec![];
    for _ in 0..10 {
        let reconciler = state.reconciler.clone();
        handles.push(tokio::spawn(async move {
            reconciler.find_consult(&lookup(CPF)).await
        }));
    }

    for handle in handles {
        let found = handle.await.unwrap().unwrap();
        assert_eq!(found.consult_id, "abc123");
    }
}
