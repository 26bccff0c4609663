//! Retry-after jitter: spreads out synchronized retries across denied
//! callers by adding a uniformly sampled delay on top of the true
//! `retry_after`.

use rand::Rng;

/// Adds a uniform sample in `[0, jitter_max_ms / 1000]` seconds to
/// `retry_after` when `enabled`. A `jitter_max_ms` of `0` is a no-op even
/// when `enabled` is true.
pub fn apply(retry_after: f64, enabled: bool, jitter_max_ms: u64) -> f64 {
    apply_with_rng(&mut rand::thread_rng(), retry_after, enabled, jitter_max_ms)
}

pub fn apply_with_rng<R: Rng + ?Sized>(
    rng: &mut R,
    retry_after: f64,
    enabled: bool,
    jitter_max_ms: u64,
) -> f64 {
    if !enabled || jitter_max_ms == 0 || retry_after <= 0.0 {
        return retry_after;
    }
    let max_secs = jitter_max_ms as f64 / 1000.0;
    retry_after + rng.gen_range(0.0..=max_secs)
}
