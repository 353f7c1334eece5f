//! Quorum of agreement over provider payloads.
//!
//! Replies are bucketed per subrequest by the canonical form of their payload. The first
//! bucket to collect `quorum` replies decides the subrequest and its first reply is emitted
//! downstream. Anything arriving for a decided subrequest is absorbed silently.
//!
//! # Failure report
//!
//! If the upstream ends with undecided subrequests, the stage fails with one
//! [`RelayError::Consensus`] that lists, per undecided id, how many providers returned each
//! distinct payload:
//!
//! ```text
//! Unable to reach consensus.
//! For request 12:
//! Expected consensus of 2:
//! Received 1 replies with payload "0x100001"
//! Received 1 replies with payload "0x100002"
//! ```
//!
//! Partial provider failures recorded against undecided ids are appended after
//! `. Errors occured: `.

use super::ReplyStream;
use crate::{
    errors::RelayError,
    types::{FailureKind, ReplyBody, ReplyItem, WireRequest},
    utils::canonical_string,
};
use futures_util::{Stream, StreamExt};
use std::{
    collections::{HashMap, HashSet},
    fmt::Write,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tracing::debug;

/// Replies that share one canonical payload.
#[derive(Debug)]
struct Bucket {
    canonical: String,
    first: ReplyItem,
    count: usize,
}

enum Outcome {
    Emit(ReplyItem),
    Absorb,
    Fail(RelayError),
}

/// Stream adapter that emits exactly one agreed reply per subrequest.
pub struct Consensus {
    inner: Option<ReplyStream>,
    request: Arc<WireRequest>,
    quorum: usize,
    /// subrequest id -> buckets in order of first appearance
    buckets: HashMap<String, Vec<Bucket>>,
    decided: HashSet<String>,
    partial_errors: HashMap<String, Vec<String>>,
}

impl Consensus {
    /// Wraps `upstream`. A `quorum` of zero is treated as one.
    #[must_use]
    pub fn new(upstream: ReplyStream, request: Arc<WireRequest>, quorum: u32) -> Self {
        Self {
            inner: Some(upstream),
            request,
            quorum: quorum.max(1) as usize,
            buckets: HashMap::new(),
            decided: HashSet::new(),
            partial_errors: HashMap::new(),
        }
    }

    fn accept(&mut self, item: ReplyItem) -> Outcome {
        let reply = match &item.body {
            ReplyBody::Error(failure) if failure.kind == FailureKind::Total => {
                return Outcome::Fail(RelayError::ProviderFailure {
                    provider_id: item.provider_id.clone(),
                    code: failure.code,
                    message: failure.message.clone(),
                });
            }
            ReplyBody::Error(failure) => {
                let message = if failure.message.is_empty() {
                    "Unknown partial error"
                } else {
                    failure.message.as_str()
                };
                for id in &failure.item_ids {
                    self.partial_errors
                        .entry(id.clone())
                        .or_default()
                        .push(format!("Item id {id}: {message}"));
                }
                return Outcome::Absorb;
            }
            ReplyBody::Result(reply) => reply,
        };

        let (Some(id), Some(payload)) = (item.id.as_deref(), reply.payload.as_ref()) else {
            return Outcome::Absorb;
        };
        if !self.request.contains(id) {
            return Outcome::Absorb;
        }

        let canonical = canonical_string(payload);
        let buckets = self.buckets.entry(id.to_string()).or_default();
        let bucket = match buckets.iter().position(|b| b.canonical == canonical) {
            Some(index) => &mut buckets[index],
            None => {
                buckets.push(Bucket { canonical, first: item.clone(), count: 0 });
                let last = buckets.len() - 1;
                &mut buckets[last]
            }
        };
        bucket.count += 1;

        if bucket.count >= self.quorum && !self.decided.contains(id) {
            debug!(
                request_id = %self.request.id,
                id = %id,
                replies = bucket.count,
                "consensus reached"
            );
            let winner = bucket.first.clone();
            self.decided.insert(id.to_string());
            return Outcome::Emit(winner);
        }
        Outcome::Absorb
    }

    fn undecided(&self) -> Vec<&str> {
        self.request.subrequest_ids().filter(|id| !self.decided.contains(*id)).collect()
    }

    fn failure_report(&self, undecided: &[&str]) -> String {
        let reasons: Vec<String> = undecided
            .iter()
            .map(|id| {
                let detail = match self.buckets.get(*id) {
                    Some(buckets) if !buckets.is_empty() => {
                        let mut detail = format!("Expected consensus of {}:", self.quorum);
                        for bucket in buckets {
                            let _ = write!(
                                detail,
                                "\nReceived {} replies with payload {}",
                                bucket.count, bucket.canonical
                            );
                        }
                        detail
                    }
                    _ => "No responses received".to_string(),
                };
                format!("For request {id}:\n{detail}")
            })
            .collect();

        let mut message = format!("Unable to reach consensus.\n{}", reasons.join("\n\n"));

        let partial: Vec<String> = undecided
            .iter()
            .filter_map(|id| {
                self.partial_errors
                    .get(*id)
                    .map(|errors| format!("id {id}: {}", errors.join(", ")))
            })
            .collect();
        if !partial.is_empty() {
            let _ = write!(message, ". Errors occured: {}", partial.join(", "));
        }
        message
    }

    fn complete(&mut self) -> Option<RelayError> {
        self.inner = None;
        let undecided = self.undecided();
        if undecided.is_empty() {
            return None;
        }
        let report = self.failure_report(&undecided);
        crate::metrics::record_consensus_failure(undecided.len());
        Some(RelayError::Consensus(report))
    }
}

impl Stream for Consensus {
    type Item = Result<ReplyItem, RelayError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            let Some(inner) = this.inner.as_mut() else {
                return Poll::Ready(None);
            };

            match inner.poll_next_unpin(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(Ok(item))) => match this.accept(item) {
                    Outcome::Emit(winner) => return Poll::Ready(Some(Ok(winner))),
                    Outcome::Absorb => {}
                    Outcome::Fail(e) => {
                        this.inner = None;
                        return Poll::Ready(Some(Err(e)));
                    }
                },
                Poll::Ready(Some(Err(e))) => {
                    this.inner = None;
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => return Poll::Ready(this.complete().map(Err)),
            }
        }
    }
}
