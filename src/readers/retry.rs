//! Retry with capped exponential backoff.
//!
//! Each fetch walks an explicit state machine:
//!
//! ```text
//! Pending --ok--------------------------> Succeeded
//! Pending --transient, attempts left----> Backoff(delay) --sleep--> Pending
//! Pending --transient, none left--------> Exhausted
//! Pending --permanent-------------------> Rejected
//! ```
//!
//! Sleeping goes through the [`Sleeper`] trait so tests can drive the loop
//! without waiting.

use async_trait::async_trait;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use tracing::warn;

use crate::config::IngestConfig;

/// Classifies an error as worth retrying or not
pub trait Transience {
    fn is_transient(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptState {
    Pending,
    Succeeded,
    Backoff { delay: Duration },
    Exhausted,
    Rejected,
}

impl AttemptState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AttemptState::Succeeded | AttemptState::Exhausted | AttemptState::Rejected
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&IngestConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    pub fn from_config(config: &IngestConfig) -> Self {
        Self::new(config.max_attempts, config.base_delay(), config.max_delay())
    }

    /// Delay after the given failed attempt (1-based): base * 2^(attempt-1), capped
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Next state after `attempt` finished with `result`
    pub fn transition<T, E: Transience>(
        &self,
        attempt: u32,
        result: &std::result::Result<T, E>,
    ) -> AttemptState {
        match result {
            Ok(_) => AttemptState::Succeeded,
            Err(e) if !e.is_transient() => AttemptState::Rejected,
            Err(_) if attempt >= self.max_attempts => AttemptState::Exhausted,
            Err(_) => AttemptState::Backoff {
                delay: self.delay_for(attempt),
            },
        }
    }

    /// Drive `operation` until it succeeds, is rejected, or runs out of attempts.
    ///
    /// `operation` receives the 1-based attempt number.
    pub async fn run<T, E, F, Fut>(&self, sleeper: &dyn Sleeper, mut operation: F) -> RetryOutcome<T, E>
    where
        E: Transience + std::fmt::Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        let mut state = RetryState::new();

        loop {
            let result = operation(state.attempt()).await;

            match state.record(self, &result) {
                AttemptState::Backoff { delay } => {
                    if let Err(e) = &result {
                        warn!(
                            "Attempt {}/{} failed ({}), retrying in {:?}",
                            state.attempt(),
                            self.max_attempts,
                            e,
                            delay
                        );
                    }
                    sleeper.sleep(delay).await;
                    state.resume();
                }
                final_state => {
                    return RetryOutcome {
                        result,
                        attempts: state.attempt(),
                        final_state,
                    }
                }
            }
        }
    }
}

/// Per-fetch position in the retry state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryState {
    attempt: u32,
    phase: AttemptState,
}

impl Default for RetryState {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryState {
    pub fn new() -> Self {
        Self {
            attempt: 1,
            phase: AttemptState::Pending,
        }
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn phase(&self) -> AttemptState {
        self.phase
    }

    /// Record the result of the pending attempt
    pub fn record<T, E: Transience>(
        &mut self,
        policy: &RetryPolicy,
        result: &std::result::Result<T, E>,
    ) -> AttemptState {
        self.phase = policy.transition(self.attempt, result);
        self.phase
    }

    /// Leave backoff and make the next attempt pending
    pub fn resume(&mut self) {
        if let AttemptState::Backoff { .. } = self.phase {
            self.attempt += 1;
            self.phase = AttemptState::Pending;
        }
    }
}

#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    pub result: std::result::Result<T, E>,
    pub attempts: u32,
    pub final_state: AttemptState,
}

#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Records requested delays and returns immediately
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    delays: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delays(&self) -> Vec<Duration> {
        match self.delays.lock() {
            Ok(delays) => delays.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        match self.delays.lock() {
            Ok(mut delays) => delays.push(duration),
            Err(poisoned) => poisoned.into_inner().push(duration),
        }
    }
}
