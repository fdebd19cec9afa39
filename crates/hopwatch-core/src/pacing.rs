use crate::config::PacingConfig;
use std::time::Duration;

/// Compute the delay before the next round from the aggregate loss.
///
/// High loss lengthens the delay (capped at `max_delay`), low loss shortens
/// it (floored at `min_delay`).  Without any data the base delay is used.
#[must_use]
pub fn adaptive_delay(loss_pct: Option<f64>, config: &PacingConfig) -> Duration {
    match loss_pct {
        Some(loss) if loss > config.high_loss_threshold => {
            config.base_delay.mul_f64(1.5).min(config.max_delay)
        }
        Some(loss) if loss < config.low_loss_threshold => {
            config.base_delay.mul_f64(0.75).max(config.min_delay)
        }
        _ => config.base_delay,
    }
}
