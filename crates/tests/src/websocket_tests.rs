//! Tests for the WebSocket relay transport
//!
//! Covers multiplexing of concurrent calls over one connection, relay error envelopes,
//! connection loss and the call deadline.

use crate::mock_infrastructure::{
    client_config, honest_trio, key_table, Behavior, MockRelayWsServer, ScriptedProvider,
};
use concord_core::{
    transport::{Transport, WsTransport},
    JsonRpcRequest, RelayClient, RelayError,
};
use futures_util::StreamExt;
use serde_json::json;
use std::{sync::Arc, time::Duration};

async fn ws_client(
    server: &MockRelayWsServer,
    providers: &[ScriptedProvider],
    quorum_of: u32,
    quorum_from: u32,
    timeout_ms: u64,
) -> (RelayClient, WsTransport) {
    let transport = WsTransport::connect(&server.url()).await.expect("connect to mock relay");
    let mut config = client_config("http://127.0.0.1:1", quorum_of, quorum_from);
    config.timeout_ms = timeout_ms;

    let client = RelayClient::new(config, Arc::new(transport.clone()), key_table(providers))
        .expect("valid config");
    (client, transport)
}

#[tokio::test]
async fn test_ws_call_reaches_consensus() {
    let providers = honest_trio(&json!("0x100001"));
    let server = MockRelayWsServer::new(providers.clone()).await.unwrap();
    let (client, transport) = ws_client(&server, &providers, 3, 3, 2000).await;

    let response = client
        .call(JsonRpcRequest::new("eth_blockNumber", vec![]))
        .await
        .expect("call should succeed");

    assert_eq!(response.result, Some(json!("0x100001")));
    assert_eq!(transport.pending_calls(), 0, "finished call must be deregistered");

    let received = server.wait_for_requests(1, Duration::from_secs(1)).await;
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].quorum, 3);
    assert_eq!(received[0].dkey, "test-dkey");
    assert_eq!(received[0].network, "ethereum");
}

#[tokio::test]
async fn test_ws_concurrent_calls_are_multiplexed() {
    let providers = honest_trio(&json!("0xbeef"));
    let server = MockRelayWsServer::new(providers.clone()).await.unwrap();
    let (client, _transport) = ws_client(&server, &providers, 2, 3, 2000).await;
    let client = Arc::new(client);

    let mut handles = Vec::new();
    for i in 0..8 {
        let client = Arc::clone(&client);
        handles.push(tokio::spawn(async move {
            client
                .call(JsonRpcRequest::new("eth_getBalance", vec![json!("0x0"), json!("latest")])
                    .with_id(json!(i)))
                .await
        }));
    }

    for (i, handle) in handles.into_iter().enumerate() {
        let response = handle.await.expect("task should not panic").expect("call succeeds");
        assert_eq!(response.id, json!(i));
        assert_eq!(response.result, Some(json!("0xbeef")));
    }

    let received = server.wait_for_requests(8, Duration::from_secs(1)).await;
    assert_eq!(received.len(), 8);
}

#[tokio::test]
async fn test_silent_relay_times_out() {
    let providers = vec![
        ScriptedProvider::new("p2p-01", 11, Behavior::Silent),
        ScriptedProvider::new("attestant", 12, Behavior::Silent),
    ];
    let server = MockRelayWsServer::new(providers.clone()).await.unwrap();
    let (client, transport) = ws_client(&server, &providers, 1, 1, 50).await;

    let started = std::time::Instant::now();
    let err = client.call(JsonRpcRequest::new("eth_blockNumber", vec![])).await.unwrap_err();

    match &err {
        RelayError::Timeout { timeout_ms, reason } => {
            assert_eq!(*timeout_ms, 50);
            assert_eq!(reason, "request took too long to complete");
        }
        other => panic!("expected timeout, got {other:?}"),
    }
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(transport.pending_calls(), 0, "timed out call must be deregistered");
}

#[tokio::test]
async fn test_error_envelope_fails_only_its_call() {
    let providers = vec![ScriptedProvider::new("p2p-01", 11, Behavior::Silent)];
    let server = MockRelayWsServer::new(providers.clone()).await.unwrap();
    let transport = WsTransport::connect(&server.url()).await.unwrap();

    let rejected = concord_core::types::WireRequest {
        id: "900".to_string(),
        provider_ids: vec![],
        quorum: 1,
        rpc: vec![],
        dkey: "bad".to_string(),
        network: "ethereum".to_string(),
    };
    let mut other = rejected.clone();
    other.id = "901".to_string();

    let mut rejected_call = transport.submit(Arc::new(rejected));
    let _other_call = transport.submit(Arc::new(other));
    server.wait_for_requests(2, Duration::from_secs(1)).await;

    server
        .enqueue_text(json!({"request_id": "900", "error": {"code": 3, "message": "invalid dkey"}}).to_string())
        .await;

    match tokio::time::timeout(Duration::from_secs(1), rejected_call.next()).await {
        Ok(Some(Err(RelayError::Relay { code, message }))) => {
            assert_eq!(code, 3);
            assert_eq!(message, "invalid dkey");
        }
        other => panic!("expected relay error, got {other:?}"),
    }
    assert_eq!(transport.pending_calls(), 1);
}

#[tokio::test]
async fn test_connection_loss_fails_pending_calls() {
    let providers = vec![ScriptedProvider::new("p2p-01", 11, Behavior::Silent)];
    let server = MockRelayWsServer::new(providers.clone()).await.unwrap();
    let (client, transport) = ws_client(&server, &providers, 1, 1, 2000).await;

    let call = tokio::spawn(async move {
        client.call(JsonRpcRequest::new("eth_blockNumber", vec![])).await
    });
    server.wait_for_requests(1, Duration::from_secs(1)).await;
    server.send_close().await;

    let err = call.await.expect("task should not panic").unwrap_err();
    assert!(matches!(err, RelayError::ConnectionClosed), "unexpected error: {err}");
    assert_eq!(err.to_string(), "Connection closed unexpectedly with error");

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(transport.is_closed());
}

#[tokio::test]
async fn test_requested_close_rejects_new_calls() {
    let providers = honest_trio(&json!("0x1"));
    let server = MockRelayWsServer::new(providers.clone()).await.unwrap();
    let (client, transport) = ws_client(&server, &providers, 1, 1, 2000).await;

    transport.close();
    transport.close();
    assert!(transport.is_closed());

    let err = client.call(JsonRpcRequest::new("eth_blockNumber", vec![])).await.unwrap_err();
    assert!(matches!(err, RelayError::ConnectionClosed));
}
