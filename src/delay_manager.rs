use std::time::Duration;
use std::thread;
use rand::Rng;
use log::{debug, info};

/// Random pause in `[min, max]` between APNs. Zero disables it.
pub fn random_request_delay(min: Duration, max: Duration) {
    if max.is_zero() {
        return;
    }
    let (min_ms, max_ms) = delay_bounds_ms(min, max);
    let mut rng = rand::thread_rng();
    let delay_ms = rng.gen_range(min_ms..=max_ms);
    info!("Waiting for {} ms (Request Delay)...", delay_ms);
    thread::sleep(Duration::from_millis(delay_ms));
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Inclusive millisecond range for the pause; `max` is raised to `min` if lower.
fn delay_bounds_ms(min: Duration, max: Duration) -> (u64, u64) {
    let min_ms = millis(min);
    (min_ms, millis(max).max(min_ms))
}

/// Backoff before retry number `attempt` (1-based): base, 2*base, 4*base, ...
pub fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(16);
    base.saturating_mul(1u32 << exp)
}

pub fn retry_backoff(base: Duration, attempt: u32) {
    let delay = backoff_delay(base, attempt);
    if delay.is_zero() {
        return;
    }
    debug!("Backing off {} ms before retry {}", delay.as_millis(), attempt);
    thread::sleep(delay);
}
