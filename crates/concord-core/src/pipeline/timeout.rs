//! Wall-clock deadline for a whole call.

use super::ReplyStream;
use crate::{errors::RelayError, types::ReplyItem};
use futures_util::{Stream, StreamExt};
use std::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
    time::Duration,
};
use tokio::time::Sleep;

/// Races the upstream against a deadline.
///
/// The timer is armed on the first poll, not on construction, so a pipeline built ahead of
/// time does not burn its budget. Items that are ready when the deadline fires still win:
/// the upstream is always polled before the timer.
///
/// Dropping the stage drops the timer with it; nothing fires after the call has ended.
pub struct Timeout {
    inner: Option<ReplyStream>,
    duration: Duration,
    reason: String,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl Timeout {
    #[must_use]
    pub fn new(upstream: ReplyStream, duration: Duration, reason: impl Into<String>) -> Self {
        Self { inner: Some(upstream), duration, reason: reason.into(), sleep: None }
    }

    fn finish(&mut self) {
        self.inner = None;
        self.sleep = None;
    }

    fn timeout_ms(&self) -> u64 {
        u64::try_from(self.duration.as_millis()).unwrap_or(u64::MAX)
    }

    fn timeout_error(&self) -> RelayError {
        RelayError::Timeout { timeout_ms: self.timeout_ms(), reason: self.reason.clone() }
    }
}

impl Stream for Timeout {
    type Item = Result<ReplyItem, RelayError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(None);
        };

        match inner.poll_next_unpin(cx) {
            Poll::Ready(Some(Ok(item))) => return Poll::Ready(Some(Ok(item))),
            Poll::Ready(Some(Err(e))) => {
                this.finish();
                return Poll::Ready(Some(Err(e)));
            }
            Poll::Ready(None) => {
                this.finish();
                return Poll::Ready(None);
            }
            Poll::Pending => {}
        }

        let duration = this.duration;
        let sleep = this.sleep.get_or_insert_with(|| Box::pin(tokio::time::sleep(duration)));
        if sleep.as_mut().poll(cx).is_ready() {
            let err = this.timeout_error();
            tracing::debug!(timeout_ms = this.timeout_ms(), "call deadline elapsed");
            this.finish();
            return Poll::Ready(Some(Err(err)));
        }

        Poll::Pending
    }
}

#[cfg(test)]
impl Timeout {
    fn is_armed(&self) -> bool {
        self.sleep.is_some()
    }
}
