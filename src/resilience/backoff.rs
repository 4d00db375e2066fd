//! Poll interval jitter.

use std::time::Duration;
use rand::Rng;

/// Randomize `base` to `base/2 + U[0, base)`.
///
/// Spreads the polls of a large client population so they do not hit the
/// config source in lockstep.
pub fn jittered_interval(base: Duration) -> Duration {
    let base_nanos = base.as_nanos().min(u64::MAX as u128) as u64;
    if base_nanos == 0 {
        return Duration::ZERO;
    }

    let jitter = rand::thread_rng().gen_range(0..base_nanos);
    Duration::from_nanos((base_nanos / 2).saturating_add(jitter))
}
