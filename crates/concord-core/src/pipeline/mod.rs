//! # Reply pipeline
//!
//! Turns the raw, unordered stream of provider replies for one [`WireRequest`] into at most
//! one trusted reply per subrequest:
//!
//! ```text
//!   transport ──► Finalization ──► Timeout ──► SignatureCheck ──► Consensus ──► Completeness ──► caller
//!                 dedupe,           deadline    drop unverified    quorum of      every id
//!                 total failures,               replies            agreement      answered
//!                 liveness quorum
//! ```
//!
//! Each stage is a [`Stream`](futures_util::Stream) adapter that owns its upstream and its
//! per-call state. Nothing is shared between calls. Stage logic runs synchronously inside
//! `poll_next`; the only places a call waits are the transport and the deadline timer.
//!
//! ## Cancellation
//!
//! Dropping the outermost stream drops every stage, the timer and finally the transport
//! stream, whose own drop releases the network resources. A stage that terminates early
//! (quorum reached, failure) drops its upstream right away.
//!
//! ## Errors
//!
//! The first error produced by any stage ends the pipeline; nothing downstream of it runs
//! for that call.

pub mod completeness;
pub mod consensus;
pub mod finalization;
pub mod signatures;
pub mod timeout;


pub use completeness::Completeness;
pub use consensus::Consensus;
pub use finalization::Finalization;
pub use signatures::{verify_reply, SignatureCheck};
pub use timeout::Timeout;

use crate::{
    errors::RelayError,
    keys::PublicKeyTable,
    types::{ReplyItem, WireRequest},
};
use futures_util::{stream::BoxStream, StreamExt};
use std::{sync::Arc, time::Duration};

/// Stream of reply items for one wire request.
pub type ReplyStream = BoxStream<'static, Result<ReplyItem, RelayError>>;

/// Context attached to the timeout error of a call.
pub const TIMEOUT_REASON: &str = "request took too long to complete";

/// Per-call knobs of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    /// Identical payloads needed to decide a subrequest.
    pub quorum_of: u32,
    /// Distinct providers that must answer every subrequest before the stream completes.
    pub quorum_from: u32,
    pub timeout: Duration,
    pub skip_signature_check: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            quorum_of: 1,
            quorum_from: 1,
            timeout: Duration::from_millis(5000),
            skip_signature_check: false,
        }
    }
}

/// Composes the full pipeline over `upstream`.
#[must_use]
pub fn verified_replies(
    upstream: ReplyStream,
    request: Arc<WireRequest>,
    settings: &PipelineSettings,
    keys: Arc<PublicKeyTable>,
) -> ReplyStream {
    let counted = upstream
        .inspect(|result| {
            if let Ok(item) = result {
                crate::metrics::record_reply_item(&item.provider_id);
            }
        })
        .boxed();

    let stream = Finalization::new(counted, Arc::clone(&request), settings.quorum_from).boxed();
    let stream = Timeout::new(stream, settings.timeout, TIMEOUT_REASON).boxed();
    let stream = if settings.skip_signature_check {
        stream
    } else {
        SignatureCheck::new(stream, Arc::clone(&request), keys).boxed()
    };
    let stream = Consensus::new(stream, Arc::clone(&request), settings.quorum_of).boxed();
    Completeness::new(stream, request).boxed()
}
