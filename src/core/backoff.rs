use std::time::Duration;

use rand::Rng;

pub const MAX_ATTEMPTS: usize = 3;
const BASE_DELAY_MS: u64 = 800;

/// Exponential backoff with jitter so concurrent pipelines don't hammer a
/// recovering service in lockstep.
pub fn backoff(attempt: usize) -> Duration {
    let jitter: u64 = rand::rng().random_range(0..200);
    let ms = BASE_DELAY_MS * 2_u64.pow(attempt as u32) + jitter;
    Duration::from_millis(ms)
}
