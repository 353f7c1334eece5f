//! Deduplication and liveness tracking for the raw relay stream.
//!
//! The relay fans a request out to every addressed provider and streams their answers back
//! unordered, possibly redelivered. This stage forwards each `(provider, subrequest)` answer
//! at most once, fails the call on a total provider failure, and completes as soon as every
//! subrequest has been answered by `quorum` distinct providers.
//!
//! The liveness threshold bounds how long the call waits. Whether the answers agree is
//! decided later by [`super::consensus`].

use super::ReplyStream;
use crate::{
    errors::RelayError,
    types::{FailureKind, ReplyBody, ReplyItem, WireRequest},
};
use futures_util::{Stream, StreamExt};
use std::{
    collections::{HashMap, HashSet},
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tracing::debug;

enum Verdict {
    Forward(ReplyItem),
    Skip,
    Fail(RelayError),
}

/// Stream adapter that deduplicates replies and completes once every subrequest has been
/// answered by enough providers.
///
/// The upstream is dropped as soon as this stage terminates, which releases the transport
/// (HTTP request, WebSocket registration) without waiting for the consumer to go away.
pub struct Finalization {
    inner: Option<ReplyStream>,
    request: Arc<WireRequest>,
    quorum: usize,
    /// subrequest id -> providers that answered it, including via partial failures
    answered: HashMap<String, HashSet<String>>,
    /// (provider id, subrequest id) pairs already forwarded
    forwarded: HashSet<(String, String)>,
}

impl Finalization {
    /// Wraps `upstream`. A `quorum` of zero is treated as one.
    #[must_use]
    pub fn new(upstream: ReplyStream, request: Arc<WireRequest>, quorum: u32) -> Self {
        let answered =
            request.subrequest_ids().map(|id| (id.to_string(), HashSet::new())).collect();
        let inner = if request.rpc.is_empty() { None } else { Some(upstream) };

        Self {
            inner,
            request,
            quorum: quorum.max(1) as usize,
            answered,
            forwarded: HashSet::new(),
        }
    }

    fn accept(&mut self, item: ReplyItem) -> Verdict {
        if item.request_id != self.request.id {
            debug!(
                request_id = %self.request.id,
                item_request_id = %item.request_id,
                provider_id = %item.provider_id,
                "dropping reply for another request"
            );
            return Verdict::Skip;
        }

        match &item.body {
            ReplyBody::Error(failure) if failure.kind == FailureKind::Total => {
                Verdict::Fail(RelayError::ProviderFailure {
                    provider_id: item.provider_id.clone(),
                    code: failure.code,
                    message: failure.message.clone(),
                })
            }
            ReplyBody::Error(failure) => {
                for id in &failure.item_ids {
                    if let Some(providers) = self.answered.get_mut(id) {
                        providers.insert(item.provider_id.clone());
                    }
                }
                Verdict::Forward(item)
            }
            ReplyBody::Result(_) => {
                let Some(id) = item.id.as_deref() else {
                    debug!(provider_id = %item.provider_id, "dropping reply without id");
                    return Verdict::Skip;
                };
                let Some(providers) = self.answered.get_mut(id) else {
                    debug!(provider_id = %item.provider_id, id = %id, "dropping reply for unknown id");
                    return Verdict::Skip;
                };
                providers.insert(item.provider_id.clone());

                if !self.forwarded.insert((item.provider_id.clone(), id.to_string())) {
                    debug!(provider_id = %item.provider_id, id = %id, "dropping duplicate reply");
                    return Verdict::Skip;
                }
                Verdict::Forward(item)
            }
        }
    }

    fn is_satisfied(&self) -> bool {
        self.answered.values().all(|providers| providers.len() >= self.quorum)
    }

    fn finish(&mut self) {
        self.inner = None;
    }
}

impl Stream for Finalization {
    type Item = Result<ReplyItem, RelayError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            let Some(inner) = this.inner.as_mut() else {
                return Poll::Ready(None);
            };

            let item = match inner.poll_next_unpin(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(None) => {
                    this.finish();
                    return Poll::Ready(None);
                }
                Poll::Ready(Some(Err(e))) => {
                    this.finish();
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(Some(Ok(item))) => item,
            };

            match this.accept(item) {
                Verdict::Skip => {}
                Verdict::Fail(e) => {
                    this.finish();
                    return Poll::Ready(Some(Err(e)));
                }
                Verdict::Forward(item) => {
                    if this.is_satisfied() {
                        debug!(request_id = %this.request.id, "all subrequests reached quorum");
                        this.finish();
                    }
                    return Poll::Ready(Some(Ok(item)));
                }
            }
        }
    }
}
