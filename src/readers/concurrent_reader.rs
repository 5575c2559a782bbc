use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::IngestConfig;
use crate::error::Result;
use crate::models::{Capital, IngestionFailure, IngestionOutcome};
use crate::readers::retry::{RetryPolicy, Sleeper, TokioSleeper};
use crate::readers::weather_reader::{FetchError, WeatherSource};
use crate::utils::constants::{DEFAULT_REQUEST_TIMEOUT_MS, DEFAULT_WORKERS};
use crate::utils::progress::ProgressReporter;

type CapitalQueue = Arc<Mutex<VecDeque<Capital>>>;

/// Fetches current weather for many capitals with a fixed pool of workers.
///
/// Workers pull capitals from a shared queue, so at most `workers` fetches
/// are in flight. Each fetch is retried per the [`RetryPolicy`] and every
/// capital produces exactly one outcome; failures never abort the batch.
pub struct WeatherIngestor {
    source: Arc<dyn WeatherSource>,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
    workers: usize,
    request_timeout: Duration,
}

impl WeatherIngestor {
    pub fn new(source: Arc<dyn WeatherSource>) -> Self {
        Self {
            source,
            policy: RetryPolicy::default(),
            sleeper: Arc::new(TokioSleeper),
            workers: DEFAULT_WORKERS,
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
        }
    }

    pub fn from_config(source: Arc<dyn WeatherSource>, config: &IngestConfig) -> Self {
        Self::new(source)
            .with_workers(config.workers)
            .with_retry_policy(RetryPolicy::from_config(config))
            .with_request_timeout(config.request_timeout())
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// One outcome per input capital; order is not significant
    pub async fn fetch(
        &self,
        capitals: Vec<Capital>,
        progress: Option<&ProgressReporter>,
    ) -> Result<Vec<IngestionOutcome>> {
        let total = capitals.len();
        if total == 0 {
            return Ok(Vec::new());
        }

        let worker_count = self.workers.min(total);
        info!(
            "Fetching weather for {} capitals with {} workers",
            total, worker_count
        );
        if let Some(progress) = progress {
            progress.set_length(total as u64);
        }

        let queue: CapitalQueue = Arc::new(Mutex::new(capitals.into_iter().collect()));
        let (sender, mut receiver) = mpsc::channel::<IngestionOutcome>(worker_count * 2);

        let mut workers = JoinSet::new();
        for worker_id in 0..worker_count {
            let queue = Arc::clone(&queue);
            let sender = sender.clone();
            let source = Arc::clone(&self.source);
            let sleeper = Arc::clone(&self.sleeper);
            let policy = self.policy;
            let timeout = self.request_timeout;

            workers.spawn(async move {
                while let Some(capital) = next_capital(&queue) {
                    let outcome =
                        fetch_with_retry(source.as_ref(), sleeper.as_ref(), &policy, timeout, capital)
                            .await;
                    if sender.send(outcome).await.is_err() {
                        break;
                    }
                }
                debug!("Worker {} finished", worker_id);
            });
        }
        drop(sender);

        // Single collector: the only place outcomes and progress are touched
        let mut outcomes = Vec::with_capacity(total);
        while let Some(outcome) = receiver.recv().await {
            if let Some(progress) = progress {
                progress.increment(1);
            }
            outcomes.push(outcome);
        }

        while let Some(joined) = workers.join_next().await {
            joined?;
        }

        Ok(outcomes)
    }
}

fn next_capital(queue: &CapitalQueue) -> Option<Capital> {
    match queue.lock() {
        Ok(mut queue) => queue.pop_front(),
        Err(poisoned) => poisoned.into_inner().pop_front(),
    }
}

async fn fetch_with_retry(
    source: &dyn WeatherSource,
    sleeper: &dyn Sleeper,
    policy: &RetryPolicy,
    timeout: Duration,
    capital: Capital,
) -> IngestionOutcome {
    let target = &capital;
    let outcome = policy
        .run(sleeper, move |_| async move {
            match tokio::time::timeout(timeout, source.current_weather(target)).await {
                Ok(result) => result,
                Err(_) => Err(FetchError::timeout()),
            }
        })
        .await;

    match outcome.result {
        Ok(observation) => {
            debug!(
                "Fetched {} after {} attempt(s)",
                capital.display_name(),
                outcome.attempts
            );
            IngestionOutcome::Success(observation)
        }
        Err(e) => {
            warn!(
                "Giving up on {} after {} attempt(s): {}",
                capital.display_name(),
                outcome.attempts,
                e
            );
            IngestionOutcome::Failure(IngestionFailure::new(
                &capital,
                e.cause,
                e.message,
                outcome.attempts,
            ))
        }
    }
}
