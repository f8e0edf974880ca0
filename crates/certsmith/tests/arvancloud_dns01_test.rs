//! Integration tests for the ArvanCloud DNS-01 provider
//!
//! Runs the provider against a wiremock server standing in for the
//! ArvanCloud CDN API.

use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use certsmith::acme::{dns01_record, ChallengeDescriptor, ChallengeKind, ChallengeProvider};
use certsmith::{ArvanCloudProvider, ChallengeOrchestrator, NoCheck, ProviderError};

const API_KEY: &str = "apikey test-key";
const KEY_AUTH: &str = "token-1.thumbprint";
const RECORDS_PATH: &str = "/domains/example.com/dns-records";

fn provider(server: &MockServer, extra: &[(&str, &str)]) -> ArvanCloudProvider {
    let mut vars = vec![("ARVANCLOUD_API_KEY".to_string(), API_KEY.to_string())];
    vars.extend(extra.iter().map(|(k, v)| (k.to_string(), v.to_string())));

    ArvanCloudProvider::from_vars(vars)
        .unwrap()
        .with_base_url(&server.uri())
}

fn txt_value() -> String {
    dns01_record("example.com", KEY_AUTH).1
}

fn txt_record(id: &str, value: &str) -> serde_json::Value {
    json!({
        "id": id,
        "type": "txt",
        "name": "_acme-challenge",
        "value": { "text": value },
        "ttl": 600
    })
}

async fn mount_search(server: &MockServer, records: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(RECORDS_PATH))
        .and(query_param("search", "acme-challenge"))
        .and(header("Authorization", API_KEY))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": records })))
        .mount(server)
        .await;
}

// ============================================================================
// Present
// ============================================================================

mod present {
    use super::*;

    #[tokio::test]
    async fn test_creates_txt_record() {
        let mock_server = MockServer::start().await;
        mount_search(&mock_server, json!([])).await;

        Mock::given(method("POST"))
            .and(path(RECORDS_PATH))
            .and(header("Authorization", API_KEY))
            .and(body_partial_json(json!({
                "type": "txt",
                "name": "_acme-challenge",
                "value": { "text": txt_value() },
                "ttl": 600
            })))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(json!({ "data": txt_record("rec-1", &txt_value()) })),
            )
            .expect(1)
            .mount(&mock_server)
            .await;

        provider(&mock_server, &[])
            .present("example.com", "token-1", KEY_AUTH)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_wildcard_uses_base_zone() {
        let mock_server = MockServer::start().await;
        mount_search(&mock_server, json!([])).await;

        Mock::given(method("POST"))
            .and(path(RECORDS_PATH))
            .and(body_partial_json(json!({ "name": "_acme-challenge" })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "data": {} })))
            .expect(1)
            .mount(&mock_server)
            .await;

        provider(&mock_server, &[])
            .present("*.example.com", "token-1", KEY_AUTH)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_is_idempotent() {
        let mock_server = MockServer::start().await;
        mount_search(&mock_server, json!([txt_record("rec-1", &txt_value())])).await;

        Mock::given(method("POST"))
            .and(path(RECORDS_PATH))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&mock_server)
            .await;

        provider(&mock_server, &[])
            .present("example.com", "token-1", KEY_AUTH)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_configured_ttl_is_sent() {
        let mock_server = MockServer::start().await;
        mount_search(&mock_server, json!([])).await;

        Mock::given(method("POST"))
            .and(path(RECORDS_PATH))
            .and(body_partial_json(json!({ "ttl": 900 })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "data": {} })))
            .expect(1)
            .mount(&mock_server)
            .await;

        provider(&mock_server, &[("ARVANCLOUD_TTL", "900")])
            .present("example.com", "token-1", KEY_AUTH)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_creation_failure_names_record() {
        let mock_server = MockServer::start().await;
        mount_search(&mock_server, json!([])).await;

        Mock::given(method("POST"))
            .and(path(RECORDS_PATH))
            .respond_with(ResponseTemplate::new(422).set_body_string("invalid record"))
            .mount(&mock_server)
            .await;

        let err = provider(&mock_server, &[])
            .present("example.com", "token-1", KEY_AUTH)
            .await
            .unwrap_err();

        match err {
            ProviderError::RecordCreation {
                record_name,
                message,
            } => {
                assert_eq!(record_name, "_acme-challenge.example.com.");
                assert!(message.contains("example.com"));
                assert!(message.contains("invalid record"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_unauthorized() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(RECORDS_PATH))
            .respond_with(ResponseTemplate::new(401))
            .mount(&mock_server)
            .await;

        let err = provider(&mock_server, &[])
            .present("example.com", "token-1", KEY_AUTH)
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::Authentication(_)));
    }
}

// ============================================================================
// Clean-up
// ============================================================================

mod clean_up {
    use super::*;

    #[tokio::test]
    async fn test_deletes_matching_record_by_id() {
        let mock_server = MockServer::start().await;
        mount_search(
            &mock_server,
            json!([
                txt_record("rec-other", "value-of-another-renewal"),
                txt_record("rec-1", &txt_value())
            ]),
        )
        .await;

        Mock::given(method("DELETE"))
            .and(path(format!("{}/rec-1", RECORDS_PATH)))
            .and(header("Authorization", API_KEY))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("DELETE"))
            .and(path(format!("{}/rec-other", RECORDS_PATH)))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        provider(&mock_server, &[])
            .clean_up("example.com", "token-1", KEY_AUTH)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_follows_search_pages() {
        let mock_server = MockServer::start().await;
        let next = format!(
            "{}{}?search=acme-challenge&page=2",
            mock_server.uri(),
            RECORDS_PATH
        );

        Mock::given(method("GET"))
            .and(path(RECORDS_PATH))
            .and(query_param("page", "2"))
            .and(header("Authorization", API_KEY))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [txt_record("rec-1", &txt_value())],
                "links": { "next": null }
            })))
            .with_priority(1)
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path(RECORDS_PATH))
            .and(query_param("search", "acme-challenge"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [txt_record("rec-other", "value-of-another-renewal")],
                "links": { "next": next }
            })))
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("DELETE"))
            .and(path(format!("{}/rec-1", RECORDS_PATH)))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        provider(&mock_server, &[])
            .clean_up("example.com", "token-1", KEY_AUTH)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_missing_record_is_already_clean() {
        let mock_server = MockServer::start().await;
        mount_search(&mock_server, json!([])).await;

        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        provider(&mock_server, &[])
            .clean_up("example.com", "token-1", KEY_AUTH)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_delete_not_found_is_already_clean() {
        let mock_server = MockServer::start().await;
        mount_search(&mock_server, json!([txt_record("rec-1", &txt_value())])).await;

        Mock::given(method("DELETE"))
            .and(path(format!("{}/rec-1", RECORDS_PATH)))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&mock_server)
            .await;

        provider(&mock_server, &[])
            .clean_up("example.com", "token-1", KEY_AUTH)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_delete_failure_is_reported() {
        let mock_server = MockServer::start().await;
        mount_search(&mock_server, json!([txt_record("rec-1", &txt_value())])).await;

        Mock::given(method("DELETE"))
            .and(path(format!("{}/rec-1", RECORDS_PATH)))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let err = provider(&mock_server, &[])
            .clean_up("example.com", "token-1", KEY_AUTH)
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::RecordDeletion { ref record_id, .. } if record_id == "rec-1"));
    }
}

// ============================================================================
// Configuration
// ============================================================================

mod configuration {
    use super::*;

    #[tokio::test]
    async fn test_ttl_below_floor_fails_before_any_request() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let err = ArvanCloudProvider::from_vars(vec![
            ("ARVANCLOUD_API_KEY".to_string(), API_KEY.to_string()),
            ("ARVANCLOUD_TTL".to_string(), "599".to_string()),
        ])
        .unwrap_err();

        assert!(matches!(err, ProviderError::Configuration(_)));
        assert!(err.to_string().contains("600"));
    }

    #[test]
    fn test_polling_bounds_must_be_ordered() {
        let err = ArvanCloudProvider::from_vars(vec![
            ("ARVANCLOUD_API_KEY".to_string(), API_KEY.to_string()),
            ("ARVANCLOUD_PROPAGATION_TIMEOUT".to_string(), "5".to_string()),
            ("ARVANCLOUD_POLLING_INTERVAL".to_string(), "10".to_string()),
        ])
        .unwrap_err();

        assert!(matches!(err, ProviderError::Configuration(_)));
    }
}

// ============================================================================
// Orchestration
// ============================================================================

mod orchestration {
    use super::*;

    fn challenge(domain: &str) -> ChallengeDescriptor {
        ChallengeDescriptor {
            domain: domain.to_string(),
            token: "token-1".to_string(),
            key_authorization: KEY_AUTH.to_string(),
            kind: ChallengeKind::Dns01,
            url: format!("https://acme.test/chall/{}", domain),
        }
    }

    #[tokio::test]
    async fn test_present_then_clean_up_restores_zone() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(RECORDS_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": [] })))
            .up_to_n_times(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path(RECORDS_PATH))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({ "data": {} })))
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path(RECORDS_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "data": [txt_record("rec-1", &txt_value())] })),
            )
            .mount(&mock_server)
            .await;

        Mock::given(method("DELETE"))
            .and(path(format!("{}/rec-1", RECORDS_PATH)))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&mock_server)
            .await;

        let orchestrator =
            ChallengeOrchestrator::new(Arc::new(provider(&mock_server, &[])), Arc::new(NoCheck));
        let challenges = vec![challenge("example.com")];

        orchestrator.prepare(&challenges).await.unwrap();
        let failures = orchestrator.clean_up_all(&challenges).await;

        assert!(failures.is_empty());
    }
}
