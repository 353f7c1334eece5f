//! Tests for the HTTP relay transport against a mock relay.

use crate::mock_infrastructure::{honest_trio, RelayMockBuilder};
use concord_core::{
    transport::{HttpClientConfig, HttpTransport, Transport},
    types::{Subrequest, WireRequest},
    RelayError,
};
use futures_util::StreamExt;
use serde_json::json;
use std::{sync::Arc, time::Duration};

fn transport(relay: &RelayMockBuilder) -> HttpTransport {
    let config = HttpClientConfig { max_retries: 0, ..Default::default() };
    HttpTransport::new(relay.url(), config, Duration::from_secs(2)).expect("http transport")
}

fn request(ids: &[&str]) -> Arc<WireRequest> {
    Arc::new(WireRequest {
        id: "5001".to_string(),
        provider_ids: vec![],
        quorum: 3,
        rpc: ids
            .iter()
            .enumerate()
            .map(|(i, id)| Subrequest {
                id: (*id).to_string(),
                nonce: 7000 + i as u64,
                jsonrpc: "2.0".into(),
                method: "eth_blockNumber".to_string(),
                params: vec![],
            })
            .collect(),
        dkey: "test-dkey".to_string(),
        network: "ethereum".to_string(),
    })
}

#[tokio::test]
async fn test_items_replayed_as_stream() {
    let mut relay = RelayMockBuilder::new().await;
    relay.mock_providers(honest_trio(&json!("0x1"))).await;

    let results: Vec<_> = transport(&relay).submit(request(&["1", "2"])).collect().await;

    assert_eq!(results.len(), 6);
    for result in &results {
        let item = result.as_ref().expect("item");
        assert_eq!(item.request_id, "5001");
        assert_eq!(item.payload(), Some(&json!("0x1")));
        assert!(!item.reply().expect("result body").signature.is_empty());
    }
    relay.assert_all_called();
}

#[tokio::test]
async fn test_relay_error_surfaces() {
    let mut relay = RelayMockBuilder::new().await;
    relay.mock_relay_error(3, "invalid dkey").await;

    let results: Vec<_> = transport(&relay).submit(request(&["1"])).collect().await;

    assert_eq!(results.len(), 1);
    match &results[0] {
        Err(RelayError::Relay { code, message }) => {
            assert_eq!(*code, 3);
            assert_eq!(message, "invalid dkey");
        }
        other => panic!("expected relay error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_response_for_other_request_rejected() {
    let mut relay = RelayMockBuilder::new().await;
    relay.mock_wrong_request_id().await;

    let mut stream = transport(&relay).submit(request(&["1"]));
    let err = stream.next().await.expect("one item").unwrap_err();

    assert_eq!(err.to_string(), "Invalid response: Response id and request id are not equal");
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn test_server_error_status() {
    let mut relay = RelayMockBuilder::new().await;
    relay.mock_status(503).await;

    let mut stream = transport(&relay).submit(request(&["1"]));
    let err = stream.next().await.expect("one item").unwrap_err();

    assert!(matches!(err, RelayError::HttpError(503, _)), "unexpected error: {err}");
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_unreachable_relay() {
    let config = HttpClientConfig { max_retries: 0, connect_timeout_ms: 500, ..Default::default() };
    let transport =
        HttpTransport::new("http://127.0.0.1:1", config, Duration::from_secs(1)).unwrap();

    let mut stream = transport.submit(request(&["1"]));
    let err = stream.next().await.expect("one item").unwrap_err();
    assert!(err.is_transient(), "unexpected error: {err}");
}
