use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::DirectoryConfig;
use crate::error::{ProcessingError, Result};
use crate::models::{Capital, FailureCause};
use crate::readers::retry::{RetryPolicy, Sleeper, TokioSleeper};
use crate::readers::weather_reader::FetchError;
use crate::utils::coordinates::parse_latlng;

/// Capital names the weather API does not resolve as spelled by the directory
const CAPITAL_NAME_CORRECTIONS: &[(&str, &str)] = &[
    ("Papeetē", "Papeete"),
    ("St. Peter Port", "Saint-Pierre-Port"),
];

pub fn normalize_capital_name(name: &str) -> String {
    let trimmed = name.trim();
    CAPITAL_NAME_CORRECTIONS
        .iter()
        .find(|(from, _)| *from == trimmed)
        .map_or_else(|| trimmed.to_string(), |(_, to)| to.to_string())
}

/// Source of the capital list for a run
#[async_trait]
pub trait CapitalDirectory: Send + Sync {
    /// Capitals ordered by country code, one per code
    async fn resolve(&self) -> Result<Vec<Capital>>;
}

#[derive(Debug, Deserialize)]
struct CountryEntry {
    name: Option<CountryName>,
    cca2: Option<String>,
    #[serde(default)]
    capital: Vec<String>,
    #[serde(rename = "capitalInfo")]
    capital_info: Option<CapitalInfo>,
}

#[derive(Debug, Deserialize)]
struct CountryName {
    common: String,
}

#[derive(Debug, Deserialize)]
struct CapitalInfo {
    latlng: Option<Vec<f64>>,
}

fn malformed(entry: &str, reason: impl Into<String>) -> ProcessingError {
    ProcessingError::MalformedEntry {
        entry: entry.to_string(),
        reason: reason.into(),
    }
}

/// One directory entry: `Ok(None)` for countries without a capital
fn parse_entry(value: serde_json::Value) -> Result<Option<Capital>> {
    let label = value
        .pointer("/name/common")
        .and_then(|v| v.as_str())
        .unwrap_or("<unnamed>")
        .to_string();

    let entry: CountryEntry =
        serde_json::from_value(value).map_err(|e| malformed(&label, e.to_string()))?;

    let capital_name = match entry.capital.first() {
        Some(name) if !name.trim().is_empty() => normalize_capital_name(name),
        Some(_) => return Err(malformed(&label, "empty capital name")),
        None => return Ok(None),
    };

    let country_code = entry
        .cca2
        .filter(|code| !code.trim().is_empty())
        .ok_or_else(|| malformed(&label, "missing country code"))?;
    let country_name = entry
        .name
        .map(|n| n.common)
        .ok_or_else(|| malformed(&label, "missing country name"))?;

    let latlng = entry
        .capital_info
        .and_then(|info| info.latlng)
        .ok_or_else(|| malformed(&label, "missing capital coordinates"))?;
    let (latitude, longitude) =
        parse_latlng(&latlng).map_err(|e| malformed(&label, e.to_string()))?;

    Ok(Some(Capital::new(
        country_code.trim().to_string(),
        country_name,
        capital_name,
        latitude,
        longitude,
    )))
}

/// Parse a REST Countries document into capitals.
///
/// Malformed entries are logged and skipped; only an undecodable document
/// is an error.
pub fn parse_countries(body: &str) -> Result<Vec<Capital>> {
    let entries: Vec<serde_json::Value> = serde_json::from_str(body)?;
    let total = entries.len();

    let mut capitals = Vec::with_capacity(total);
    let mut malformed_count = 0;
    for value in entries {
        match parse_entry(value) {
            Ok(Some(capital)) => capitals.push(capital),
            Ok(None) => {}
            Err(e) => {
                malformed_count += 1;
                warn!("Skipping directory entry: {}", e);
            }
        }
    }

    let capitals = finalize_capitals(capitals);
    info!(
        "Resolved {} capitals from {} directory entries ({} malformed)",
        capitals.len(),
        total,
        malformed_count
    );
    Ok(capitals)
}

/// Drop repeated country codes (first wins) and order by code
pub fn finalize_capitals(capitals: Vec<Capital>) -> Vec<Capital> {
    let mut seen = HashSet::new();
    let mut unique: Vec<Capital> = capitals
        .into_iter()
        .filter(|capital| {
            let fresh = seen.insert(capital.country_code.clone());
            if !fresh {
                warn!(
                    "Duplicate country code {}; skipping {}",
                    capital.country_code, capital.capital_name
                );
            }
            fresh
        })
        .collect();

    unique.sort_by(|a, b| a.country_code.cmp(&b.country_code));
    unique
}

/// Directory backed by the REST Countries API
pub struct RestCountriesDirectory {
    client: Client,
    url: String,
    policy: RetryPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl RestCountriesDirectory {
    pub fn new(url: &str, policy: RetryPolicy) -> Self {
        Self {
            client: Client::new(),
            url: url.to_string(),
            policy,
            sleeper: Arc::new(TokioSleeper),
        }
    }

    pub fn from_config(config: &DirectoryConfig, policy: RetryPolicy) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ProcessingError::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            ..Self::new(&config.url, policy)
        })
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    async fn fetch_document(&self) -> std::result::Result<String, FetchError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::new(FailureCause::Timeout, e.to_string())
                } else {
                    FetchError::new(FailureCause::Connection, e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::new(
                FailureCause::HttpStatus(status.as_u16()),
                format!("directory returned {}", status),
            ));
        }

        response
            .text()
            .await
            .map_err(|e| FetchError::new(FailureCause::Connection, e.to_string()))
    }
}

#[async_trait]
impl CapitalDirectory for RestCountriesDirectory {
    async fn resolve(&self) -> Result<Vec<Capital>> {
        info!("Fetching capital directory from {}", self.url);

        let outcome = self
            .policy
            .run(self.sleeper.as_ref(), |_| self.fetch_document())
            .await;

        let body = outcome
            .result
            .map_err(|e| ProcessingError::DirectoryUnavailable {
                url: self.url.clone(),
                reason: format!("{} after {} attempt(s)", e, outcome.attempts),
            })?;

        parse_countries(&body).map_err(|e| ProcessingError::DirectoryUnavailable {
            url: self.url.clone(),
            reason: format!("unparseable document: {}", e),
        })
    }
}

/// Fixed capital list, for tests and pinned deployments
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    capitals: Vec<Capital>,
}

impl StaticDirectory {
    pub fn new(capitals: Vec<Capital>) -> Self {
        Self { capitals }
    }
}

#[async_trait]
impl CapitalDirectory for StaticDirectory {
    async fn resolve(&self) -> Result<Vec<Capital>> {
        Ok(finalize_capitals(self.capitals.clone()))
    }
}
