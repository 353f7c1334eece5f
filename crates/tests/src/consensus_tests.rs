//! End-to-end quorum tests over the HTTP relay protocol.
//!
//! Each test scripts the providers behind a mock relay and checks what a caller of
//! [`RelayClient`] gets back.

use crate::mock_infrastructure::{
    client_config, honest_trio, key_table, Behavior, RelayMockBuilder, ScriptedProvider,
};
use concord_core::{
    config::AppConfig, transport::HttpTransport, types::JsonRpcError, JsonRpcRequest,
    RelayClient, RelayError,
};
use serde_json::json;
use std::{sync::Arc, time::Duration};

async fn client_for(
    relay: &RelayMockBuilder,
    providers: &[ScriptedProvider],
    quorum_of: u32,
    quorum_from: u32,
) -> RelayClient {
    let config = client_config(&relay.url(), quorum_of, quorum_from);
    let transport = HttpTransport::new(
        relay.url(),
        concord_core::transport::HttpClientConfig { max_retries: 0, ..Default::default() },
        Duration::from_secs(2),
    )
    .expect("http transport");
    RelayClient::new(config, Arc::new(transport), key_table(providers)).expect("valid config")
}

fn block_number() -> JsonRpcRequest {
    JsonRpcRequest::new("eth_blockNumber", vec![])
}

#[tokio::test]
async fn test_three_agreeing_providers() {
    let providers = honest_trio(&json!("0x100001"));
    let mut relay = RelayMockBuilder::new().await;
    relay.mock_providers(providers.clone()).await;

    let client = client_for(&relay, &providers, 3, 3).await;
    let response = client.call(block_number()).await.expect("call should succeed");

    assert_eq!(response.result, Some(json!("0x100001")));
    assert_eq!(response.id, json!(1));
    assert!(response.error.is_none());
    relay.assert_all_called();
}

#[tokio::test]
async fn test_dissenting_provider_outvoted() {
    let providers = vec![
        ScriptedProvider::new("p2p-01", 11, Behavior::Answer(json!("0x100001"))),
        ScriptedProvider::new("attestant", 12, Behavior::Answer(json!("0x100002"))),
        ScriptedProvider::new("p-ops", 13, Behavior::Answer(json!("0x100001"))),
    ];
    let mut relay = RelayMockBuilder::new().await;
    relay.mock_providers(providers.clone()).await;

    let client = client_for(&relay, &providers, 2, 3).await;
    let response = client.call(block_number()).await.expect("two of three agree");

    assert_eq!(response.result, Some(json!("0x100001")));
}

#[tokio::test]
async fn test_dissenting_provider_breaks_unanimity() {
    let providers = vec![
        ScriptedProvider::new("p2p-01", 11, Behavior::Answer(json!("0x100001"))),
        ScriptedProvider::new("attestant", 12, Behavior::Answer(json!("0x100002"))),
        ScriptedProvider::new("p-ops", 13, Behavior::Answer(json!("0x100001"))),
    ];
    let mut relay = RelayMockBuilder::new().await;
    relay.mock_providers(providers.clone()).await;

    let client = client_for(&relay, &providers, 3, 3).await;
    let err = client.call(block_number()).await.unwrap_err();

    assert!(matches!(err, RelayError::Consensus(_)), "unexpected error: {err}");
    let message = err.to_string();
    assert!(message.contains("Unable to reach consensus."), "{message}");
    assert!(message.contains("Expected consensus of 3:"), "{message}");
    assert!(message.contains(r#"Received 2 replies with payload "0x100001""#), "{message}");
    assert!(message.contains(r#"Received 1 replies with payload "0x100002""#), "{message}");
}

#[tokio::test]
async fn test_bad_signature_does_not_count() {
    let providers = vec![
        ScriptedProvider::new("p2p-01", 11, Behavior::Answer(json!("0x100001"))),
        ScriptedProvider::new("attestant", 12, Behavior::BadSignature(json!("0x100001"))),
    ];
    let mut relay = RelayMockBuilder::new().await;
    relay.mock_providers(providers.clone()).await;

    let client = client_for(&relay, &providers, 2, 2).await;
    let err = client.call(block_number()).await.unwrap_err();

    assert!(err.is_consensus_failure(), "unexpected error: {err}");
    assert!(err.to_string().contains("Received 1 replies"), "{err}");
}

#[tokio::test]
async fn test_unsigned_and_unknown_providers_filtered() {
    let mut providers = honest_trio(&json!("0x5"));
    let trusted = key_table(&providers[..2]);
    providers.push(ScriptedProvider::new("stranger", 21, Behavior::Unsigned(json!("0x6"))));

    let mut relay = RelayMockBuilder::new().await;
    relay.mock_providers(providers.clone()).await;

    let config = client_config(&relay.url(), 2, 4);
    let transport =
        HttpTransport::new(relay.url(), Default::default(), Duration::from_secs(2)).unwrap();
    let client = RelayClient::new(config, Arc::new(transport), trusted).unwrap();

    let response = client.call(block_number()).await.expect("two trusted providers agree");
    assert_eq!(response.result, Some(json!("0x5")));
}

#[tokio::test]
async fn test_skip_signature_check_accepts_bad_signatures() {
    let providers = vec![
        ScriptedProvider::new("p2p-01", 11, Behavior::BadSignature(json!("0x7"))),
        ScriptedProvider::new("attestant", 12, Behavior::Unsigned(json!("0x7"))),
    ];
    let mut relay = RelayMockBuilder::new().await;
    relay.mock_providers(providers).await;

    let mut config = client_config(&relay.url(), 2, 2);
    config.skip_signature_check = true;
    let transport =
        HttpTransport::new(relay.url(), Default::default(), Duration::from_secs(2)).unwrap();
    let client = RelayClient::new(config, Arc::new(transport), Default::default()).unwrap();

    let response = client.call(block_number()).await.expect("signatures are not checked");
    assert_eq!(response.result, Some(json!("0x7")));
}

#[tokio::test]
async fn test_total_failure_fails_call() {
    let providers = vec![
        ScriptedProvider::new("p2p-01", 11, Behavior::Answer(json!("0x1"))),
        ScriptedProvider::new("attestant", 12, Behavior::TotalFailure("upstream gone".into())),
    ];
    let mut relay = RelayMockBuilder::new().await;
    relay.mock_providers(providers.clone()).await;

    let client = client_for(&relay, &providers, 1, 2).await;
    let err = client.call(block_number()).await.unwrap_err();

    match err {
        RelayError::ProviderFailure { provider_id, message, .. } => {
            assert_eq!(provider_id, "attestant");
            assert_eq!(message, "upstream gone");
        }
        other => panic!("expected provider failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_agreed_error_result_becomes_error_response() {
    let providers = vec![
        ScriptedProvider::new("p2p-01", 11, Behavior::ErrorResult(3, "execution reverted".into())),
        ScriptedProvider::new("p-ops", 13, Behavior::ErrorResult(3, "execution reverted".into())),
    ];
    let mut relay = RelayMockBuilder::new().await;
    relay.mock_providers(providers.clone()).await;

    let client = client_for(&relay, &providers, 2, 2).await;
    let response = client
        .call(JsonRpcRequest::new("eth_call", vec![json!({"to": "0x0"}), json!("latest")]))
        .await
        .expect("agreed error result is a response, not a failure");

    assert!(response.result.is_none());
    assert_eq!(
        response.error,
        Some(JsonRpcError { code: 3, message: "execution reverted".to_string() })
    );
}

#[tokio::test]
async fn test_batch_responses_in_request_order() {
    let providers = honest_trio(&json!({"number": "0x10", "hash": "0xab"}));
    let mut relay = RelayMockBuilder::new().await;
    relay.mock_providers(providers.clone()).await;

    let client = client_for(&relay, &providers, 2, 3).await;
    let responses = client
        .call_multi(vec![
            JsonRpcRequest::new("eth_getBlockByNumber", vec![json!("0x10"), json!(false)])
                .with_id(json!("first")),
            JsonRpcRequest::new("eth_getBlockByNumber", vec![json!("0x11"), json!(false)]),
            JsonRpcRequest::new("eth_getBlockByNumber", vec![json!("0x12"), json!(false)])
                .with_id(json!(99)),
        ])
        .await
        .expect("batch should succeed");

    let ids: Vec<_> = responses.iter().map(|r| r.id.clone()).collect();
    assert_eq!(ids, vec![json!("first"), json!(2), json!(99)]);
    for response in &responses {
        assert_eq!(response.result, Some(json!({"number": "0x10", "hash": "0xab"})));
    }
}

#[tokio::test]
async fn test_client_from_config_uses_configured_keys() {
    let providers = honest_trio(&json!("0x42"));
    let mut relay = RelayMockBuilder::new().await;
    relay.mock_providers(providers.clone()).await;

    let mut app = AppConfig::default();
    app.client = client_config(&relay.url(), 3, 3);
    app.http.max_retries = 0;
    for scripted in &providers {
        app.keys.insert(scripted.provider.id.clone(), scripted.provider.public_key_hex());
    }
    assert!(app.validate().is_ok());

    let client = RelayClient::from_config(&app).await.expect("client builds");
    let response = client.call(block_number()).await.expect("configured keys verify");
    assert_eq!(response.result, Some(json!("0x42")));
}

#[tokio::test]
async fn test_builtin_keys_reject_scripted_providers() {
    let providers = honest_trio(&json!("0x42"));
    let mut relay = RelayMockBuilder::new().await;
    relay.mock_providers(providers).await;

    let mut app = AppConfig::default();
    app.client = client_config(&relay.url(), 1, 1);

    let client = RelayClient::from_config(&app).await.expect("client builds");
    let err = client.call(block_number()).await.unwrap_err();
    assert!(err.is_consensus_failure(), "unexpected error: {err}");
}
