//! Exponential backoff for waiting on a ComfyUI instance.
//!
//! A worker container usually starts before the ComfyUI server inside it
//! is listening.  [`wait_until_ready`] keeps probing `/system_stats` with
//! increasing delays until the server answers or the
//! [`CancellationToken`] is triggered.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::api::ComfyUIApi;

/// Tunable parameters for the exponential-backoff strategy.
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Upper bound on the delay between attempts.
    pub max_delay: Duration,
    /// Factor by which the delay grows after each failure.
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

/// Calculate the next backoff delay from the current delay and config.
///
/// The result is clamped to [`BackoffConfig::max_delay`].
pub fn next_delay(current: Duration, config: &BackoffConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

/// Probe the instance until it answers.
///
/// Returns `true` once `/system_stats` succeeds, or `false` if `cancel`
/// fires first.
pub async fn wait_until_ready(
    api: &ComfyUIApi,
    config: &BackoffConfig,
    cancel: &CancellationToken,
) -> bool {
    let mut delay = config.initial_delay;
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("ComfyUI readiness wait cancelled");
                return false;
            }
            result = api.system_stats() => {
                match result {
                    Ok(_) => {
                        tracing::info!(attempt, api_url = api.api_url(), "ComfyUI is ready");
                        return true;
                    }
                    Err(e) => {
                        tracing::info!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "ComfyUI not ready yet",
                        );
                    }
                }
            }
        }

        // Wait before the next attempt, respecting cancellation.
        tokio::select! {
            _ = cancel.cancelled() => return false,
            _ = tokio::time::sleep(delay) => {}
        }

        delay = next_delay(delay, config);
    }
}
