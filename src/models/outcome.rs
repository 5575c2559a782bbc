use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::{Capital, WeatherObservation};

/// Why a capital's fetch ended without an observation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "status", rename_all = "snake_case")]
pub enum FailureCause {
    HttpStatus(u16),
    Timeout,
    Connection,
    InvalidRequest,
    InvalidResponse,
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCause::HttpStatus(status) => write!(f, "HTTP {}", status),
            FailureCause::Timeout => write!(f, "timeout"),
            FailureCause::Connection => write!(f, "connection failure"),
            FailureCause::InvalidRequest => write!(f, "invalid request"),
            FailureCause::InvalidResponse => write!(f, "invalid response"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionFailure {
    pub capital_key: String,
    pub country_name: String,
    pub capital_name: String,
    pub reason: String,
    pub cause: FailureCause,
    pub attempts: u32,
}

impl IngestionFailure {
    pub fn new(capital: &Capital, cause: FailureCause, reason: String, attempts: u32) -> Self {
        Self {
            capital_key: capital.key().to_string(),
            country_name: capital.country_name.clone(),
            capital_name: capital.capital_name.clone(),
            reason,
            cause,
            attempts,
        }
    }
}

/// Result of fetching one capital: exactly one per capital per run
#[derive(Debug, Clone, PartialEq)]
pub enum IngestionOutcome {
    Success(WeatherObservation),
    Failure(IngestionFailure),
}

impl IngestionOutcome {
    pub fn capital_key(&self) -> &str {
        match self {
            IngestionOutcome::Success(observation) => &observation.capital_key,
            IngestionOutcome::Failure(failure) => &failure.capital_key,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, IngestionOutcome::Success(_))
    }
}

/// Success/failure tallies for one ingestion run
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct IngestionSummary {
    pub total: usize,
    pub successes: usize,
    pub failures: usize,
    pub transient_failures: usize,
}

impl IngestionSummary {
    pub fn from_outcomes(outcomes: &[IngestionOutcome]) -> Self {
        let mut summary = Self {
            total: outcomes.len(),
            ..Self::default()
        };

        for outcome in outcomes {
            match outcome {
                IngestionOutcome::Success(_) => summary.successes += 1,
                IngestionOutcome::Failure(failure) => {
                    summary.failures += 1;
                    if failure.attempts > 1 {
                        summary.transient_failures += 1;
                    }
                }
            }
        }

        summary
    }

    pub fn success_fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.successes as f64 / self.total as f64
        }
    }

    /// A run with no successes, or below the configured floor, is a failed run
    pub fn meets_floor(&self, floor: f64) -> bool {
        self.successes > 0 && self.success_fraction() >= floor
    }

    pub fn summary(&self) -> String {
        format!(
            "{} capitals: {} succeeded, {} failed ({} after retries), success rate {:.1}%",
            self.total,
            self.successes,
            self.failures,
            self.transient_failures,
            self.success_fraction() * 100.0
        )
    }
}
