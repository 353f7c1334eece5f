//! # Metrics
//!
//! Counters and histograms recorded through the `metrics` facade. The library never
//! installs a recorder; without one every call here is a no-op. Embedders that want the
//! numbers install an exporter of their choice.
//!
//! | Metric | Type | Labels |
//! |--------|------|--------|
//! | `concord_calls_total` | counter | `outcome` |
//! | `concord_call_duration_seconds` | histogram | `outcome` |
//! | `concord_reply_items_total` | counter | `provider` |
//! | `concord_signature_rejections_total` | counter | `provider` |
//! | `concord_consensus_failures_total` | counter | |
//! | `concord_undecided_subrequests_total` | counter | |
//!
//! Provider ids are interned so labels don't allocate once a provider has been seen.

use metrics::{counter, histogram};
use std::{borrow::Cow, sync::OnceLock, time::Duration};

// Provider ids come from relay replies; the set is bounded by the relay's provider list.
static PROVIDER_NAME_POOL: OnceLock<dashmap::DashMap<String, &'static str>> = OnceLock::new();

#[inline]
fn provider_to_static(provider: &str) -> Cow<'static, str> {
    let pool = PROVIDER_NAME_POOL.get_or_init(dashmap::DashMap::new);

    if let Some(interned) = pool.get(provider) {
        return Cow::Borrowed(*interned);
    }

    let owned = provider.to_string();
    let leaked: &'static str = Box::leak(owned.clone().into_boxed_str());
    pool.insert(owned, leaked);
    Cow::Borrowed(leaked)
}

/// Records a finished call. `outcome` is `"success"` or a [`crate::RelayError::as_str`] label.
pub fn record_call(outcome: &'static str, elapsed: Duration) {
    counter!("concord_calls_total", "outcome" => outcome).increment(1);
    histogram!("concord_call_duration_seconds", "outcome" => outcome).record(elapsed.as_secs_f64());
}

pub fn record_reply_item(provider_id: &str) {
    counter!("concord_reply_items_total", "provider" => provider_to_static(provider_id))
        .increment(1);
}

pub fn record_signature_rejected(provider_id: &str) {
    counter!("concord_signature_rejections_total", "provider" => provider_to_static(provider_id))
        .increment(1);
}

pub fn record_consensus_failure(undecided: usize) {
    counter!("concord_consensus_failures_total").increment(1);
    counter!("concord_undecided_subrequests_total").increment(undecided as u64);
}
