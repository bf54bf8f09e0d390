// ABOUTME: Deterministic wait policy for retries
// ABOUTME: Escalating ladder for rate limits, fixed delays for everything else

use crate::config::{LadderExhaustion, RetryConfig};
use std::time::Duration;

/// Why the orchestrator is about to wait before refetching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryCause {
    RateLimited,
    VerificationFailed,
    TransportError,
}

#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    ladder: Vec<Duration>,
    on_exhausted: LadderExhaustion,
    verification_delay: Duration,
    transport_delay: Duration,
}

impl BackoffPolicy {
    pub fn new(config: &RetryConfig) -> Self {
        BackoffPolicy {
            ladder: config.rate_limit_backoff_ladder.clone(),
            on_exhausted: config.on_ladder_exhausted,
            verification_delay: config.verification_retry_delay,
            transport_delay: config.transport_retry_delay,
        }
    }

    /// Wait before the next fetch after the `attempt`-th (1-based) failure of
    /// this cause. Rate-limit attempts past the ladder clamp to its last step.
    pub fn delay_for(&self, attempt: u32, cause: RetryCause) -> Duration {
        match cause {
            RetryCause::RateLimited => {
                let idx = (attempt.max(1) as usize - 1).min(self.ladder.len().saturating_sub(1));
                self.ladder.get(idx).copied().unwrap_or_default()
            }
            RetryCause::VerificationFailed => self.verification_delay,
            RetryCause::TransportError => self.transport_delay,
        }
    }

    /// Whether the `attempt`-th consecutive rate limit may still be waited out.
    pub fn allows_rate_limit_retry(&self, attempt: u32) -> bool {
        match self.on_exhausted {
            LadderExhaustion::RepeatLast => true,
            LadderExhaustion::Fail => (attempt as usize) <= self.ladder.len(),
        }
    }
}
