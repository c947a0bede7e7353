//! Integration tests for `Client::get`/`annotate` against a mock API
//! server, covering the optimistic-concurrency retry and conflict-detection
//! behavior of the ANNOTATE loop.

use std::collections::BTreeMap;

use kuryr_k8s_client::{AuthConfig, Client, Config};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(server: &MockServer) -> Config {
    Config::new(
        server.uri().parse().unwrap(),
        AuthConfig::Bearer {
            token_file: std::path::PathBuf::from("/dev/null"),
        },
    )
}

#[tokio::test]
async fn get_decodes_the_resource_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/namespaces/default/services/web"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "metadata": {"name": "web", "resourceVersion": "10"}
        })))
        .mount(&server)
        .await;

    let client = Client::new(config_for(&server)).unwrap();
    let obj = client
        .get("/api/v1/namespaces/default/services/web")
        .await
        .unwrap();
    assert_eq!(obj["metadata"]["name"], "web");
}

#[tokio::test]
async fn get_maps_404_to_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404).set_body_string("{}"))
        .mount(&server)
        .await;

    let client = Client::new(config_for(&server)).unwrap();
    let err = client.get("/missing").await.unwrap_err();
    assert!(matches!(err, kuryr_k8s_client::ClientError::NotFound { .. }));
}

#[tokio::test]
async fn annotate_succeeds_on_first_try_with_no_conflict() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/api/v1/namespaces/default/endpoints/web"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "metadata": {
                "resourceVersion": "11",
                "annotations": {"kuryr.lbaas.spec": "v1"}
            }
        })))
        .mount(&server)
        .await;

    let client = Client::new(config_for(&server)).unwrap();
    let mut annotations = BTreeMap::new();
    annotations.insert(
        "kuryr.lbaas.spec".to_string(),
        Some(serde_json::Value::String("v1".to_string())),
    );

    let result = client
        .annotate(
            "/api/v1/namespaces/default/endpoints/web",
            &annotations,
            Some("10"),
        )
        .await
        .unwrap();
    assert_eq!(result["kuryr.lbaas.spec"], "v1");
}

#[tokio::test]
async fn annotate_retries_after_conflict_when_values_already_match() {
    let server = MockServer::start().await;

    // First PATCH loses the optimistic-concurrency race.
    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(409).set_body_string("conflict"))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    // The re-GET shows a concurrent writer already applied the exact value
    // this call wanted, just under a newer resourceVersion.
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "metadata": {
                "resourceVersion": "12",
                "annotations": {"kuryr.lbaas.spec": "v1"}
            }
        })))
        .mount(&server)
        .await;

    // The retried PATCH (carrying resourceVersion 12) succeeds.
    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "metadata": {
                "resourceVersion": "13",
                "annotations": {"kuryr.lbaas.spec": "v1"}
            }
        })))
        .mount(&server)
        .await;

    let client = Client::new(config_for(&server)).unwrap();
    let mut annotations = BTreeMap::new();
    annotations.insert(
        "kuryr.lbaas.spec".to_string(),
        Some(serde_json::Value::String("v1".to_string())),
    );

    let result = client
        .annotate(
            "/api/v1/namespaces/default/endpoints/web",
            &annotations,
            Some("10"),
        )
        .await
        .unwrap();
    assert_eq!(result["kuryr.lbaas.spec"], "v1");
}

#[tokio::test]
async fn annotate_fails_when_conflicting_writer_set_a_different_value() {
    let server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .respond_with(ResponseTemplate::new(409).set_body_string("conflict"))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "metadata": {
                "resourceVersion": "12",
                "annotations": {"kuryr.lbaas.spec": "v2-from-someone-else"}
            }
        })))
        .mount(&server)
        .await;

    let client = Client::new(config_for(&server)).unwrap();
    let mut annotations = BTreeMap::new();
    annotations.insert(
        "kuryr.lbaas.spec".to_string(),
        Some(serde_json::Value::String("v1".to_string())),
    );

    let err = client
        .annotate(
            "/api/v1/namespaces/default/endpoints/web",
            &annotations,
            Some("10"),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        kuryr_k8s_client::ClientError::AnnotateConflict { .. }
    ));
}
