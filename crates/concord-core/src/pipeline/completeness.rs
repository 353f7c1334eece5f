//! Last check before results reach the caller: every subrequest produced a result.

use super::ReplyStream;
use crate::{
    errors::RelayError,
    types::{ReplyItem, WireRequest},
};
use futures_util::{Stream, StreamExt};
use std::{
    collections::HashSet,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tracing::{debug, error};

/// Stream adapter that fails with [`RelayError::PartialResults`] if the upstream completes
/// without a result for every subrequest.
pub struct Completeness {
    inner: Option<ReplyStream>,
    request: Arc<WireRequest>,
    fulfilled: HashSet<String>,
}

impl Completeness {
    #[must_use]
    pub fn new(upstream: ReplyStream, request: Arc<WireRequest>) -> Self {
        Self { inner: Some(upstream), request, fulfilled: HashSet::new() }
    }

    fn missing(&self) -> Vec<String> {
        self.request
            .subrequest_ids()
            .filter(|id| !self.fulfilled.contains(*id))
            .map(str::to_string)
            .collect()
    }
}

impl Stream for Completeness {
    type Item = Result<ReplyItem, RelayError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            let Some(inner) = this.inner.as_mut() else {
                return Poll::Ready(None);
            };

            match inner.poll_next_unpin(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(Ok(item))) => {
                    match item.id.as_deref() {
                        Some(id) if this.request.contains(id) => {
                            this.fulfilled.insert(id.to_string());
                            return Poll::Ready(Some(Ok(item)));
                        }
                        id => debug!(id = ?id, "dropping result for unexpected id"),
                    }
                }
                Poll::Ready(Some(Err(e))) => {
                    this.inner = None;
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    this.inner = None;
                    let missing = this.missing();
                    if missing.is_empty() {
                        return Poll::Ready(None);
                    }
                    error!(
                        request_id = %this.request.id,
                        missing = ?missing,
                        "stream completed without results for every subrequest"
                    );
                    return Poll::Ready(Some(Err(RelayError::PartialResults { missing })));
                }
            }
        }
    }
}
