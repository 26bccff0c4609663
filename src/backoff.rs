//! Fixed retry backoff for the wire client. The policy is three attempts at
//! 50ms, 150ms, 400ms — not a generic formula, so it's just a lookup table
//! rather than a parameterized curve.

use std::time::Duration;

pub const MAX_ATTEMPTS: usize = 3;

const DELAYS_MS: [u64; MAX_ATTEMPTS] = [50, 150, 400];

/// Delay to sleep after the `attempt`-th failed try (1-indexed) before
/// retrying. Panics if `attempt` is 0 or exceeds `MAX_ATTEMPTS`, since
/// callers only ever consult this between a failed attempt and the next.
pub fn delay_for(attempt: usize) -> Duration {
    Duration::from_millis(DELAYS_MS[attempt - 1])
}
