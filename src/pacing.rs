use crate::config::Config;
use rand::{rng, Rng};
use std::time::Duration;

/// Politeness pacing for outbound requests. The delays bound request rate;
/// they are a policy parameter, not a correctness requirement.
#[derive(Debug, Clone)]
pub struct Pacing {
    min_ms: u64,
    max_ms: u64,
    long_every: usize,
    long_ms: u64,
}

impl Pacing {
    pub fn from_config(config: &Config) -> Self {
        Self {
            min_ms: config.min_delay_ms,
            max_ms: config.max_delay_ms,
            long_every: config.long_pause_every.max(1),
            long_ms: config.long_pause_ms,
        }
    }

    #[cfg(test)]
    pub fn none() -> Self {
        Self {
            min_ms: 0,
            max_ms: 0,
            long_every: usize::MAX,
            long_ms: 0,
        }
    }

    /// Sleep for a jittered interval within the configured range.
    pub async fn jitter(&self) {
        let ms = self.pick(self.min_ms, self.max_ms);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    /// Jittered pause before the idx-th request in a batch. Every N-th
    /// request takes a longer break to look less mechanical.
    pub async fn pause_before(&self, idx: usize) {
        let ms = if idx > 0 && idx % self.long_every == 0 {
            self.pick(self.long_ms, self.long_ms + self.max_ms)
        } else {
            self.pick(self.min_ms, self.max_ms)
        };
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    fn pick(&self, min: u64, max: u64) -> u64 {
        if max <= min {
            min
        } else {
            rng().random_range(min..=max)
        }
    }
}
