// ABOUTME: Integration tests for the GraphQL change feed client
// ABOUTME: Runs GraphQlChangeFeed against a mock media API

use asset_change_poller::changes::{
    ChangeBatch, ChangeFeed, ChangePoller, ChangeRecord, ChangeType, Checkpoint, CycleOutcome,
    FeedError, FingerprintCache,
};
use asset_change_poller::config::{FeedConfig, PollerConfig};
use asset_change_poller::remote::GraphQlChangeFeed;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn feed_for(server: &MockServer, api_key: Option<&str>) -> GraphQlChangeFeed {
    let mut config = FeedConfig::new(format!("{}/graphql", server.uri()));
    config.api_key = api_key.map(str::to_string);
    config.timeout = Duration::from_secs(5);
    GraphQlChangeFeed::new(config).unwrap()
}

fn batch_body() -> serde_json::Value {
    json!({
        "data": {
            "changedAssets": {
                "lastModified": 1700000100,
                "changes": [
                    {"assetId": "a1", "lastModified": 1700000050, "type": "ASSET_CREATED"},
                    {"assetId": "a2", "lastModified": 1700000100, "type": "ASSET_REMOVED"}
                ]
            }
        }
    })
}

#[tokio::test]
async fn test_baseline_poll_sends_null_since() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_partial_json(json!({"variables": {"since": null}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(batch_body()))
        .expect(1)
        .mount(&server)
        .await;

    let batch = feed_for(&server, None).poll(Checkpoint::UNSET).await.unwrap();

    assert_eq!(batch.last_modified, Some(1700000100));
    assert_eq!(
        batch.changes,
        vec![
            ChangeRecord::new("a1", 1700000050, ChangeType::Created),
            ChangeRecord::new("a2", 1700000100, ChangeType::Removed),
        ]
    );
}

#[tokio::test]
async fn test_poll_sends_checkpoint_and_api_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(header("x-api-key", "secret-key"))
        .and(body_partial_json(json!({"variables": {"since": 1234}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"changedAssets": {"lastModified": null, "changes": []}}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let batch = feed_for(&server, Some("secret-key"))
        .poll(Checkpoint::at(1234))
        .await
        .unwrap();

    assert_eq!(batch, ChangeBatch::empty(None));
}

#[tokio::test]
async fn test_server_error_maps_to_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&server)
        .await;

    let err = feed_for(&server, None)
        .poll(Checkpoint::UNSET)
        .await
        .unwrap_err();

    assert_eq!(
        err,
        FeedError::Status {
            status: 502,
            body: "bad gateway".to_string()
        }
    );
}

#[tokio::test]
async fn test_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = feed_for(&server, Some("wrong"))
        .poll(Checkpoint::UNSET)
        .await
        .unwrap_err();

    assert_eq!(err, FeedError::Unauthorized);
}

#[tokio::test]
async fn test_graphql_errors_fail_the_poll() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": null,
            "errors": [{"message": "Cannot query field \"changedAssets\""}]
        })))
        .mount(&server)
        .await;

    let err = feed_for(&server, None)
        .poll(Checkpoint::UNSET)
        .await
        .unwrap_err();

    assert!(matches!(err, FeedError::Query(ref messages) if messages.len() == 1));
}

#[tokio::test]
async fn test_missing_last_modified_is_malformed() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"changedAssets": {"changes": []}}
        })))
        .mount(&server)
        .await;

    let err = feed_for(&server, None)
        .poll(Checkpoint::UNSET)
        .await
        .unwrap_err();

    assert!(matches!(err, FeedError::Malformed(_)));
}

#[tokio::test]
async fn test_unreachable_endpoint_is_transport_error() {
    let feed = GraphQlChangeFeed::new(FeedConfig::new("http://127.0.0.1:1/graphql")).unwrap();

    let err = feed.poll(Checkpoint::UNSET).await.unwrap_err();

    assert!(matches!(err, FeedError::Transport(_)));
}

/// Full cycle against the mock: self-caused change suppressed, foreign change
/// forwarded, checkpoint taken from the batch.
#[tokio::test]
async fn test_poller_against_mock_api() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(batch_body()))
        .mount(&server)
        .await;

    let cache = FingerprintCache::new();
    cache.record("a1", 1700000050);
    let config = PollerConfig {
        poll_interval: Duration::from_millis(5000),
        state_path: None,
    };
    let mut poller = ChangePoller::new(feed_for(&server, None), cache, config);

    let outcome = poller.poll_once().await;

    assert_eq!(
        outcome,
        CycleOutcome::Published {
            received: 2,
            forwarded: 1
        }
    );
    assert_eq!(
        *poller.published(),
        vec![ChangeRecord::new("a2", 1700000100, ChangeType::Removed)]
    );
    assert_eq!(poller.checkpoint(), Checkpoint::at(1700000100));
}
