//! Request/response relay transport over HTTP.
//!
//! The relay answers a POSTed wire request with every provider reply at once:
//!
//! ```json
//! { "result": { "id": "<request id>", "items": [ /* reply items */ ] } }
//! { "error": { "code": 3, "message": "invalid dkey" } }
//! ```

use super::{HttpClient, HttpClientConfig, RelayErrorBody, Transport};
use crate::{
    errors::RelayError,
    pipeline::ReplyStream,
    types::{ReplyItem, WireRequest},
};
use futures_util::{stream, StreamExt};
use serde::Deserialize;
use std::{sync::Arc, time::Duration};
use tracing::debug;

#[derive(Debug, Deserialize)]
struct RelayResponse {
    #[serde(default)]
    result: Option<RelayBatch>,
    #[serde(default)]
    error: Option<RelayErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RelayBatch {
    id: String,
    #[serde(default)]
    items: Vec<ReplyItem>,
}

/// Parses a relay response body into the reply items for `request`.
///
/// # Errors
///
/// - [`RelayError::Relay`] if the relay rejected the request
/// - [`RelayError::InvalidResponse`] if the body is malformed or answers another request
pub fn parse_response(request: &WireRequest, body: &[u8]) -> Result<Vec<ReplyItem>, RelayError> {
    let response: RelayResponse = serde_json::from_slice(body)
        .map_err(|e| RelayError::InvalidResponse(format!("malformed relay response: {e}")))?;

    if let Some(error) = response.error {
        return Err(error.into());
    }
    let batch = response
        .result
        .ok_or_else(|| RelayError::InvalidResponse("relay response has no result".to_string()))?;

    if batch.id != request.id {
        return Err(RelayError::InvalidResponse(
            "Response id and request id are not equal".to_string(),
        ));
    }
    Ok(batch.items)
}

/// Relay transport that issues one HTTP POST per call.
///
/// Dropping a call's stream before the response arrives drops the request future, which
/// aborts the HTTP request and frees its connection slot.
#[derive(Clone)]
pub struct HttpTransport {
    client: Arc<HttpClient>,
    url: Arc<str>,
    request_timeout: Duration,
}

impl HttpTransport {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        url: impl Into<String>,
        config: HttpClientConfig,
        request_timeout: Duration,
    ) -> Result<Self, RelayError> {
        Ok(Self {
            client: Arc::new(HttpClient::with_config(config)?),
            url: Arc::from(url.into()),
            request_timeout,
        })
    }

    async fn execute(
        client: Arc<HttpClient>,
        url: Arc<str>,
        timeout: Duration,
        request: Arc<WireRequest>,
    ) -> Result<Vec<ReplyItem>, RelayError> {
        let body = serde_json::to_vec(&*request)
            .map_err(|e| RelayError::InvalidRequest(format!("failed to encode request: {e}")))?;

        debug!(request_id = %request.id, subrequests = request.rpc.len(), "posting relay request");
        let bytes = client.post_json(&url, bytes::Bytes::from(body), timeout).await?;
        let items = parse_response(&request, &bytes)?;
        debug!(request_id = %request.id, items = items.len(), "relay response received");
        Ok(items)
    }
}

impl Transport for HttpTransport {
    fn submit(&self, request: Arc<WireRequest>) -> ReplyStream {
        let response = Self::execute(
            Arc::clone(&self.client),
            Arc::clone(&self.url),
            self.request_timeout,
            request,
        );

        stream::once(response)
            .flat_map(|result| {
                let items: Vec<Result<ReplyItem, RelayError>> = match result {
                    Ok(items) => items.into_iter().map(Ok).collect(),
                    Err(e) => vec![Err(e)],
                };
                stream::iter(items)
            })
            .boxed()
    }
}
