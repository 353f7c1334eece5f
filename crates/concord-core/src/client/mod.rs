//! Call orchestration.
//!
//! [`RelayClient`] turns a batch of JSON-RPC requests into one [`WireRequest`], runs the
//! transport's reply stream through the [`crate::pipeline`] and maps the winning replies
//! back to the caller's ids. A call either returns a response for every request or fails
//! with exactly one [`RelayError`].

pub mod ids;

pub use ids::IdGenerator;

use crate::{
    config::{AppConfig, ClientConfig, TransportKind},
    errors::RelayError,
    keys::PublicKeyTable,
    pipeline::{verified_replies, PipelineSettings},
    transport::{HttpTransport, Transport, WsTransport},
    types::{
        JsonRpcRequest, JsonRpcResponse, ReplyBody, ReplyItem, Subrequest, WireRequest,
        JSONRPC_VERSION_COW,
    },
};
use arc_swap::ArcSwap;
use futures_util::StreamExt;
use serde_json::Value;
use std::{collections::HashMap, sync::Arc, time::Instant};
use tracing::{debug, warn};

/// Where a subrequest came from in the caller's batch.
struct CallerSlot {
    position: usize,
    id: Value,
}

/// Quorum-verified JSON-RPC client for a relay.
///
/// Cheap to share behind an `Arc`; concurrent calls only share the key table and the id
/// counters.
pub struct RelayClient {
    transport: Arc<dyn Transport>,
    /// Swapped wholesale by [`RelayClient::update_keys`]; in-flight calls keep the table
    /// they started with.
    keys: ArcSwap<PublicKeyTable>,
    ids: IdGenerator,
    config: ClientConfig,
    settings: PipelineSettings,
}

impl RelayClient {
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] if `config` does not validate.
    pub fn new(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        keys: PublicKeyTable,
    ) -> Result<Self, RelayError> {
        config.validate().map_err(RelayError::Config)?;

        let settings = PipelineSettings {
            quorum_of: config.quorum_of(),
            quorum_from: config.quorum_from(),
            timeout: config.timeout(),
            skip_signature_check: config.skip_signature_check,
        };
        if settings.skip_signature_check {
            warn!("signature checks disabled, replies are trusted on agreement alone");
        }

        Ok(Self {
            transport,
            keys: ArcSwap::from_pointee(keys),
            ids: IdGenerator::new(),
            config,
            settings,
        })
    }

    /// Builds a client and its transport from loaded configuration.
    ///
    /// # Errors
    ///
    /// - [`RelayError::Config`] for invalid settings or keys
    /// - [`RelayError::ConnectionFailed`] if the WebSocket transport cannot connect
    pub async fn from_config(app: &AppConfig) -> Result<Self, RelayError> {
        let keys = PublicKeyTable::builtin_with(&app.keys)
            .map_err(|e| RelayError::Config(format!("invalid public key: {e}")))?;

        let transport: Arc<dyn Transport> = match app.client.transport {
            TransportKind::Http => Arc::new(HttpTransport::new(
                app.client.url.clone(),
                app.http.clone(),
                app.client.timeout(),
            )?),
            TransportKind::Websocket => {
                let ws_url = app.client.ws_url.as_deref().ok_or_else(|| {
                    RelayError::Config("WebSocket transport requires ws_url".to_string())
                })?;
                Arc::new(WsTransport::connect(ws_url).await?)
            }
        };

        Self::new(app.client.clone(), transport, keys)
    }

    /// Replaces the id generator, e.g. with a seeded one.
    #[must_use]
    pub fn with_id_generator(mut self, ids: IdGenerator) -> Self {
        self.ids = ids;
        self
    }

    /// Installs a new key table for calls started from now on.
    pub fn update_keys(&self, keys: PublicKeyTable) {
        self.keys.store(Arc::new(keys));
    }

    #[must_use]
    pub fn keys(&self) -> Arc<PublicKeyTable> {
        self.keys.load_full()
    }

    #[must_use]
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Performs a single verified call.
    ///
    /// # Errors
    ///
    /// See [`RelayClient::call_multi`].
    pub async fn call(&self, request: JsonRpcRequest) -> Result<JsonRpcResponse, RelayError> {
        let mut responses = self.call_multi(vec![request]).await?;
        responses.pop().ok_or(RelayError::PartialResults { missing: Vec::new() })
    }

    /// Performs a batch of verified calls through one relay request.
    ///
    /// Responses come back in request order, keyed by the caller's ids (or the 1-based
    /// position in the batch for requests without one). A provider-level error result
    /// that reached consensus becomes a JSON-RPC error response, not a call failure.
    ///
    /// # Errors
    ///
    /// Fails as a whole with the first unrecoverable condition: total provider failure,
    /// timeout, consensus failure, incomplete results, or a transport/relay error.
    pub async fn call_multi(
        &self,
        requests: Vec<JsonRpcRequest>,
    ) -> Result<Vec<JsonRpcResponse>, RelayError> {
        if requests.is_empty() {
            return Err(RelayError::InvalidRequest("empty batch".to_string()));
        }

        let started = Instant::now();
        let (wire, slots) = self.build_request(requests);
        debug!(
            request_id = %wire.id,
            subrequests = wire.rpc.len(),
            quorum_of = self.settings.quorum_of,
            quorum_from = self.settings.quorum_from,
            "relay call started"
        );

        let result = self.execute(Arc::clone(&wire), slots).await;

        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.as_str(),
        };
        crate::metrics::record_call(outcome, started.elapsed());
        match &result {
            Ok(_) => debug!(request_id = %wire.id, "relay call succeeded"),
            Err(e) => warn!(request_id = %wire.id, error = %e, "relay call failed"),
        }
        result
    }

    fn build_request(
        &self,
        requests: Vec<JsonRpcRequest>,
    ) -> (Arc<WireRequest>, HashMap<String, CallerSlot>) {
        let mut slots = HashMap::with_capacity(requests.len());
        let rpc = requests
            .into_iter()
            .enumerate()
            .map(|(position, request)| {
                let id = self.ids.next_id().to_string();
                let caller_id = request.id.unwrap_or_else(|| Value::from(position + 1));
                slots.insert(id.clone(), CallerSlot { position, id: caller_id });
                Subrequest {
                    id,
                    nonce: self.ids.next_nonce(),
                    jsonrpc: JSONRPC_VERSION_COW,
                    method: request.method,
                    params: request.params,
                }
            })
            .collect();

        let wire = WireRequest {
            id: self.ids.next_request_id().to_string(),
            provider_ids: self.config.provider_ids.clone(),
            quorum: self.settings.quorum_from,
            rpc,
            dkey: self.config.api_key.clone(),
            network: self.config.network.clone(),
        };
        (Arc::new(wire), slots)
    }

    async fn execute(
        &self,
        wire: Arc<WireRequest>,
        mut slots: HashMap<String, CallerSlot>,
    ) -> Result<Vec<JsonRpcResponse>, RelayError> {
        let upstream = self.transport.submit(Arc::clone(&wire));
        let mut replies =
            verified_replies(upstream, Arc::clone(&wire), &self.settings, self.keys.load_full());

        let mut responses: Vec<Option<JsonRpcResponse>> = vec![None; wire.rpc.len()];
        while let Some(item) = replies.next().await {
            let item = item?;
            let Some(slot) = item.id.as_deref().and_then(|id| slots.remove(id)) else {
                continue;
            };
            responses[slot.position] = Some(to_response(item, slot.id));
        }

        let missing: Vec<String> = slots.into_keys().collect();
        if !missing.is_empty() {
            return Err(RelayError::PartialResults { missing });
        }
        Ok(responses.into_iter().flatten().collect())
    }
}

/// Converts an agreed reply into the caller-facing response.
fn to_response(item: ReplyItem, caller_id: Value) -> JsonRpcResponse {
    match item.body {
        ReplyBody::Result(reply) if reply.ok => {
            JsonRpcResponse::success(reply.payload.unwrap_or(Value::Null), caller_id)
        }
        ReplyBody::Result(reply) => JsonRpcResponse::error(reply.error_code, reply.error, caller_id),
        ReplyBody::Error(failure) => JsonRpcResponse::error(failure.code, failure.message, caller_id),
    }
}
