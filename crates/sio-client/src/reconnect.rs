use std::time::Duration;

use crate::config::ClientConfig;

/// The jitter seam (§9, "JSON pluggability"-style seam for the reconnect
/// supervisor): a deterministic source lets scenario 4 of spec.md §8 be
/// reproduced in a test without patching the global RNG.
pub trait JitterSource: Send + Sync + 'static {
    /// One value in `[0, 1)`, matching `random.random()` in the system this
    /// spec was distilled from.
    fn next(&self) -> f64;
}

/// The default jitter source, backed by `rand`.
#[derive(Debug, Default)]
pub struct RandomJitter;

impl JitterSource for RandomJitter {
    fn next(&self) -> f64 {
        rand::random::<f64>()
    }
}

/// A fixed sequence of jitter values, cycling once exhausted. Used by tests
/// that need to pin `random()`'s output (§8 scenario 4).
pub struct FixedJitter {
    values: Vec<f64>,
    cursor: std::sync::atomic::AtomicUsize,
}

impl FixedJitter {
    pub fn new(values: impl Into<Vec<f64>>) -> Self {
        Self {
            values: values.into(),
            cursor: std::sync::atomic::AtomicUsize::new(0),
        }
    }
}

impl JitterSource for FixedJitter {
    fn next(&self) -> f64 {
        let i = self.cursor.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        self.values[i % self.values.len()]
    }
}

/// The delay to sleep before reconnect attempt number `attempt` (1-based).
///
/// §4.4's pseudocode describes the jitter as multiplicative
/// (`delay *= 1 + randomization_factor * (2*random() - 1)`), but that reading
/// does not reproduce §8 scenario 4's worked example (sleeps `1.5, 1.5, 4.0`
/// for `random()` returning `[1, 0, 0.5]`) once the exponential base exceeds
/// 1 second — `2 * (1 + 0.5*(2*0-1)) == 1.0`, not `1.5`. The jitter term is
/// additive and independent of the base's magnitude, matching the original
/// implementation's `_handle_reconnect` (see DESIGN.md):
///
/// ```text
/// base  = min(reconnection_delay * 2^(attempt-1), reconnection_delay_max)
/// delay = base + randomization_factor * (2*random() - 1)
/// ```
pub(crate) fn backoff_delay(config: &ClientConfig, attempt: u32, jitter: &dyn JitterSource) -> Duration {
    let base = config.reconnection_delay.as_secs_f64() * 2f64.powi(attempt.saturating_sub(1) as i32);
    let capped = base.min(config.reconnection_delay_max.as_secs_f64());
    let r = jitter.next();
    let jitter_term = config.randomization_factor * (2.0 * r - 1.0);
    Duration::from_secs_f64((capped + jitter_term).max(0.0))
}
