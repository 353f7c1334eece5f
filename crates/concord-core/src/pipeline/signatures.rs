//! Signature gate: drops replies that cannot be authenticated.

use super::ReplyStream;
use crate::{
    crypto::signed_message,
    errors::RelayError,
    keys::PublicKeyTable,
    types::{ReplyBody, ReplyItem, WireRequest},
};
use futures_util::{Stream, StreamExt};
use std::{
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};
use tracing::{debug, warn};

/// Decides whether one reply was produced by the provider it claims.
///
/// Provider-level error results (`ok == false`) are unsigned and always pass. Failure
/// items are not replies and are not checked here; see [`SignatureCheck`].
#[must_use]
pub fn verify_reply(item: &ReplyItem, request: &WireRequest, keys: &PublicKeyTable) -> bool {
    let ReplyBody::Result(reply) = &item.body else {
        return true;
    };

    let Some(nonce) = item.id.as_deref().and_then(|id| request.nonce_for(id)) else {
        debug!(provider_id = %item.provider_id, "no nonce issued for reply id");
        return false;
    };

    if !reply.ok {
        return true;
    }

    let Some(payload) = reply.payload.as_ref() else {
        warn!(provider_id = %item.provider_id, id = ?item.id, "reply has no payload to verify");
        return false;
    };

    if reply.signature.is_empty() {
        warn!(
            provider_id = %item.provider_id,
            upstream_id = %reply.upstream_id,
            "payload should be signed but has no signature"
        );
        return false;
    }

    let Some(key) = keys.get(&item.provider_id) else {
        warn!(provider_id = %item.provider_id, "no public key for provider");
        return false;
    };

    let message = signed_message(nonce, &reply.upstream_id, payload);
    match key.verify_hex(message.as_bytes(), &reply.signature) {
        Ok(()) => true,
        Err(e) => {
            debug!(
                provider_id = %item.provider_id,
                upstream_id = %reply.upstream_id,
                error = %e,
                "signature rejected"
            );
            false
        }
    }
}

/// Stream adapter that filters out replies failing [`verify_reply`].
///
/// Failure items (total or partial) pass through unchanged so later stages can account
/// for them.
pub struct SignatureCheck {
    inner: Option<ReplyStream>,
    request: Arc<WireRequest>,
    keys: Arc<PublicKeyTable>,
}

impl SignatureCheck {
    #[must_use]
    pub fn new(upstream: ReplyStream, request: Arc<WireRequest>, keys: Arc<PublicKeyTable>) -> Self {
        Self { inner: Some(upstream), request, keys }
    }
}

impl Stream for SignatureCheck {
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
                    if verify_reply(&item, &this.request, &this.keys) {
                        return Poll::Ready(Some(Ok(item)));
                    }
                    crate::metrics::record_signature_rejected(&item.provider_id);
                }
                Poll::Ready(Some(Err(e))) => {
                    this.inner = None;
                    return Poll::Ready(Some(Err(e)));
                }
                Poll::Ready(None) => {
                    this.inner = None;
                    return Poll::Ready(None);
                }
            }
        }
    }
}
