use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};

/// Upper bound (exclusive) of the random counter seed, the largest safe integer range
/// JSON consumers handle exactly.
const SEED_BOUND: u64 = 1 << 52;

/// Process-local counters for subrequest ids, nonces and wire request ids.
///
/// Each counter is pre-incremented, so the first value handed out is `seed + 1`. Values are
/// unique for the lifetime of the generator even under concurrent calls.
#[derive(Debug)]
pub struct IdGenerator {
    next_id: AtomicU64,
    next_nonce: AtomicU64,
    next_request_id: AtomicU64,
}

impl IdGenerator {
    /// Counters seeded independently at random.
    #[must_use]
    pub fn new() -> Self {
        let mut rng = rand::thread_rng();
        Self {
            next_id: AtomicU64::new(rng.gen_range(0..SEED_BOUND)),
            next_nonce: AtomicU64::new(rng.gen_range(0..SEED_BOUND)),
            next_request_id: AtomicU64::new(rng.gen_range(0..SEED_BOUND)),
        }
    }

    /// All three counters start from `seed`.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            next_id: AtomicU64::new(seed),
            next_nonce: AtomicU64::new(seed),
            next_request_id: AtomicU64::new(seed),
        }
    }

    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn next_nonce(&self) -> u64 {
        self.next_nonce.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn next_request_id(&self) -> u64 {
        self.next_request_id.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
