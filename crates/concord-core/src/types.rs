//! Wire and caller-facing type definitions.
//!
//! # Type Categories
//!
//! ## JSON-RPC Protocol Types
//! - [`JsonRpcRequest`], [`JsonRpcResponse`], [`JsonRpcError`]: what callers hand in and get back
//!
//! ## Relay Protocol Types
//! - [`Subrequest`], [`WireRequest`]: the single batched request sent to the relay
//! - [`ReplyItem`], [`ReplyBody`], [`ProviderReply`], [`ProviderFailure`]: one answer unit
//!   streamed back by the relay
//!
//! Internal ids and nonces live only in the relay types. Caller ids are carried on the
//! JSON-RPC types and never reach the wire.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::borrow::Cow;

/// JSON-RPC protocol version constant.
pub const JSONRPC_VERSION: &str = "2.0";

/// Pre-allocated `Cow` for the JSON-RPC version.
pub const JSONRPC_VERSION_COW: Cow<'static, str> = Cow::Borrowed(JSONRPC_VERSION);

/// JSON-RPC 2.0 request as supplied by a caller.
///
/// `id` is optional: when absent the response is keyed by the request's 1-based position
/// in the batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default = "default_jsonrpc")]
    pub jsonrpc: Cow<'static, str>,
    pub method: String,
    #[serde(default)]
    pub params: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
}

fn default_jsonrpc() -> Cow<'static, str> {
    JSONRPC_VERSION_COW
}

impl JsonRpcRequest {
    #[must_use]
    pub fn new(method: impl Into<String>, params: Vec<Value>) -> Self {
        Self { jsonrpc: JSONRPC_VERSION_COW, method: method.into(), params, id: None }
    }

    /// Sets the caller id echoed back on the response.
    #[must_use]
    pub fn with_id(mut self, id: Value) -> Self {
        self.id = Some(id);
        self
    }
}

/// JSON-RPC 2.0 response.
///
/// Contains either a `result` or an `error`, never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: Cow<'static, str>,
    pub id: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    #[must_use]
    pub fn success(result: Value, id: Value) -> Self {
        Self { jsonrpc: JSONRPC_VERSION_COW, id, result: Some(result), error: None }
    }

    #[must_use]
    pub fn error(code: i32, message: String, id: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION_COW,
            id,
            result: None,
            error: Some(JsonRpcError { code, message }),
        }
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}

/// One call inside a [`WireRequest`], addressed by a process-local id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subrequest {
    pub id: String,
    pub nonce: u64,
    pub jsonrpc: Cow<'static, str>,
    pub method: String,
    pub params: Vec<Value>,
}

/// The batched request sent to the relay.
///
/// `quorum` is the liveness threshold: how many providers must answer each subrequest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireRequest {
    pub id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provider_ids: Vec<String>,
    pub quorum: u32,
    pub rpc: Vec<Subrequest>,
    pub dkey: String,
    pub network: String,
}

impl WireRequest {
    /// Nonce issued for the subrequest with the given id.
    #[must_use]
    pub fn nonce_for(&self, id: &str) -> Option<u64> {
        self.rpc.iter().find(|sub| sub.id == id).map(|sub| sub.nonce)
    }

    /// Iterates over the subrequest ids in request order.
    pub fn subrequest_ids(&self) -> impl Iterator<Item = &str> {
        self.rpc.iter().map(|sub| sub.id.as_str())
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.rpc.iter().any(|sub| sub.id == id)
    }
}

/// How much of a request a provider failure affects.
///
/// On the wire the kind is a number: `0` for total, `1` for partial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum FailureKind {
    /// The provider connection is unusable for the whole request.
    Total,
    /// Only the listed subrequest ids are affected.
    Partial,
}

impl TryFrom<u8> for FailureKind {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Total),
            1 => Ok(Self::Partial),
            other => Err(format!("unknown failure kind {other}")),
        }
    }
}

impl From<FailureKind> for u8 {
    fn from(kind: FailureKind) -> Self {
        match kind {
            FailureKind::Total => 0,
            FailureKind::Partial => 1,
        }
    }
}

/// A provider's answer to one subrequest.
///
/// `ok == false` marks a provider-level error result: `error` and `error_code` describe it and
/// the payload is unsigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderReply {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub upstream_id: String,
    /// `None` when the field was absent, `Some(Value::Null)` for an explicit `null`.
    #[serde(default, deserialize_with = "deserialize_some", skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default)]
    pub signature: String,
    #[serde(default)]
    pub nonce: u64,
    pub ok: bool,
    #[serde(default)]
    pub error: String,
    #[serde(default, rename = "errorCode")]
    pub error_code: i32,
}

/// A provider or transport failure reported in place of a reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderFailure {
    pub kind: FailureKind,
    #[serde(default)]
    pub code: i32,
    pub message: String,
    #[serde(default)]
    pub item_ids: Vec<String>,
}

/// Exactly one of a reply or a failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyBody {
    Result(ProviderReply),
    Error(ProviderFailure),
}

/// One answer unit streamed back by the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyItem {
    /// Subrequest id this item answers. Absent on some failure shapes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub request_id: String,
    pub provider_id: String,
    #[serde(flatten)]
    pub body: ReplyBody,
}

impl ReplyItem {
    #[must_use]
    pub fn reply(&self) -> Option<&ProviderReply> {
        match &self.body {
            ReplyBody::Result(reply) => Some(reply),
            ReplyBody::Error(_) => None,
        }
    }

    #[must_use]
    pub fn failure(&self) -> Option<&ProviderFailure> {
        match &self.body {
            ReplyBody::Error(failure) => Some(failure),
            ReplyBody::Result(_) => None,
        }
    }

    /// The reply payload, if this item carries a reply with one.
    #[must_use]
    pub fn payload(&self) -> Option<&Value> {
        self.reply().and_then(|reply| reply.payload.as_ref())
    }
}

/// Deserializes a present field (including `null`) as `Some`.
fn deserialize_some<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}
