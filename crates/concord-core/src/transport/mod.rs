//! Relay transports.
//!
//! A transport turns one [`WireRequest`] into the raw [`ReplyStream`] the pipeline consumes.
//! It makes no promises about ordering, duplicates or latency. Dropping the returned stream
//! must release whatever the transport holds for that request.
//!
//! - [`HttpTransport`]: one POST per call, replies replayed from the response body
//! - [`WsTransport`]: one persistent connection multiplexing concurrent calls by request id

pub mod http;
pub mod http_client;
pub mod websocket;

pub use http::HttpTransport;
pub use http_client::{HttpClient, HttpClientConfig};
pub use websocket::WsTransport;

use crate::{errors::RelayError, pipeline::ReplyStream, types::WireRequest};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Source of reply items for wire requests.
pub trait Transport: Send + Sync {
    /// Sends `request` and returns the stream of its reply items.
    fn submit(&self, request: Arc<WireRequest>) -> ReplyStream;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn submit(&self, request: Arc<WireRequest>) -> ReplyStream {
        (**self).submit(request)
    }
}

/// Error object the relay returns when it rejects a request as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayErrorBody {
    #[serde(default)]
    pub code: i32,
    pub message: String,
}

impl From<RelayErrorBody> for RelayError {
    fn from(body: RelayErrorBody) -> Self {
        RelayError::Relay { code: body.code, message: body.message }
    }
}
