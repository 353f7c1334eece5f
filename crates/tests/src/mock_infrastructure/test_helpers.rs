//! Test Helper Functions and Utilities
//!
//! Deterministic signing providers and scripted relay answers.

use concord_core::{
    config::ClientConfig,
    crypto::signed_message,
    keys::PublicKeyTable,
    types::{FailureKind, ProviderFailure, ProviderReply, ReplyBody, ReplyItem, WireRequest},
};
use p256::ecdsa::{signature::Signer, Signature, SigningKey};
use serde_json::{json, Value};

/// A provider with a deterministic P-256 key derived from `seed`.
#[derive(Clone)]
pub struct MockProvider {
    pub id: String,
    key: SigningKey,
}

impl MockProvider {
    /// # Panics
    ///
    /// Panics if `seed` is 0, which is not a valid secret scalar.
    #[must_use]
    pub fn new(id: &str, seed: u8) -> Self {
        let secret = [seed; 32];
        let key = SigningKey::from_bytes((&secret).into()).expect("seed must be non-zero");
        Self { id: id.to_string(), key }
    }

    #[must_use]
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.key.verifying_key().to_encoded_point(false).as_bytes())
    }

    /// Hex DER signature over the relay's signed message for `payload`.
    #[must_use]
    pub fn sign(&self, nonce: u64, upstream_id: &str, payload: &Value) -> String {
        let message = signed_message(nonce, upstream_id, payload);
        let signature: Signature = self.key.sign(message.as_bytes());
        hex::encode(signature.to_der().as_bytes())
    }

    fn upstream_id(&self) -> String {
        format!("{}-node", self.id)
    }
}

/// How a scripted provider answers.
#[derive(Clone, Debug)]
pub enum Behavior {
    /// Correctly signed result.
    Answer(Value),
    /// Result whose signature covers a different payload.
    BadSignature(Value),
    /// Result with no signature at all.
    Unsigned(Value),
    /// Unsigned provider-level error result (`ok == false`) carrying the error as payload.
    ErrorResult(i32, String),
    /// One total failure for the whole request.
    TotalFailure(String),
    /// Never answers.
    Silent,
}

#[derive(Clone)]
pub struct ScriptedProvider {
    pub provider: MockProvider,
    pub behavior: Behavior,
}

impl ScriptedProvider {
    #[must_use]
    pub fn new(id: &str, seed: u8, behavior: Behavior) -> Self {
        Self { provider: MockProvider::new(id, seed), behavior }
    }
}

/// Three honest providers that all answer `payload`.
#[must_use]
pub fn honest_trio(payload: &Value) -> Vec<ScriptedProvider> {
    vec![
        ScriptedProvider::new("p2p-01", 11, Behavior::Answer(payload.clone())),
        ScriptedProvider::new("attestant", 12, Behavior::Answer(payload.clone())),
        ScriptedProvider::new("p-ops", 13, Behavior::Answer(payload.clone())),
    ]
}

/// Key table holding every scripted provider's key.
///
/// # Panics
///
/// Panics if a generated key is rejected, which would be a bug in the helper.
#[must_use]
pub fn key_table(providers: &[ScriptedProvider]) -> PublicKeyTable {
    let mut table = PublicKeyTable::empty();
    for scripted in providers {
        table
            .insert(&scripted.provider.id, &scripted.provider.public_key_hex())
            .expect("generated key is valid");
    }
    table
}

fn result_item(request: &WireRequest, provider: &MockProvider, reply: ProviderReply) -> ReplyItem {
    ReplyItem {
        id: Some(reply.id.clone()),
        request_id: request.id.clone(),
        provider_id: provider.id.clone(),
        body: ReplyBody::Result(reply),
    }
}

fn signed_reply(
    request: &WireRequest,
    provider: &MockProvider,
    sub_id: &str,
    payload: &Value,
    signed_over: Option<&Value>,
) -> ReplyItem {
    let nonce = request.nonce_for(sub_id).unwrap_or_default();
    let upstream_id = provider.upstream_id();
    let signature =
        signed_over.map(|value| provider.sign(nonce, &upstream_id, value)).unwrap_or_default();

    let reply = ProviderReply {
        id: sub_id.to_string(),
        upstream_id,
        payload: Some(payload.clone()),
        signature,
        nonce,
        ok: true,
        error: String::new(),
        error_code: 0,
    };
    result_item(request, provider, reply)
}

/// Reply items every scripted provider sends for `request`, as relay JSON.
#[must_use]
pub fn reply_items(request: &WireRequest, providers: &[ScriptedProvider]) -> Vec<Value> {
    let mut items = Vec::new();
    for scripted in providers {
        let provider = &scripted.provider;
        match &scripted.behavior {
            Behavior::Silent => {}
            Behavior::TotalFailure(message) => items.push(ReplyItem {
                id: None,
                request_id: request.id.clone(),
                provider_id: provider.id.clone(),
                body: ReplyBody::Error(ProviderFailure {
                    kind: FailureKind::Total,
                    code: 1,
                    message: message.clone(),
                    item_ids: Vec::new(),
                }),
            }),
            behavior => {
                for sub in &request.rpc {
                    let item = match behavior {
                        Behavior::Answer(payload) => {
                            signed_reply(request, provider, &sub.id, payload, Some(payload))
                        }
                        Behavior::BadSignature(payload) => signed_reply(
                            request,
                            provider,
                            &sub.id,
                            payload,
                            Some(&json!("forged")),
                        ),
                        Behavior::Unsigned(payload) => {
                            signed_reply(request, provider, &sub.id, payload, None)
                        }
                        Behavior::ErrorResult(code, message) => {
                            let reply = ProviderReply {
                                id: sub.id.clone(),
                                upstream_id: provider.upstream_id(),
                                payload: Some(json!({"code": code, "message": message})),
                                signature: String::new(),
                                nonce: sub.nonce,
                                ok: false,
                                error: message.clone(),
                                error_code: *code,
                            };
                            result_item(request, provider, reply)
                        }
                        Behavior::Silent | Behavior::TotalFailure(_) => continue,
                    };
                    items.push(item);
                }
            }
        }
    }

    items
        .into_iter()
        .map(|item| serde_json::to_value(item).unwrap_or(Value::Null))
        .collect()
}

/// Client settings pointing at a mock relay.
#[must_use]
pub fn client_config(url: &str, quorum_of: u32, quorum_from: u32) -> ClientConfig {
    ClientConfig {
        url: url.to_string(),
        api_key: "test-dkey".to_string(),
        quorum_of: Some(quorum_of),
        quorum_from: Some(quorum_from),
        timeout_ms: 2000,
        ..Default::default()
    }
}
