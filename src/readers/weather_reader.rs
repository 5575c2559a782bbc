use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::fmt;
use tracing::debug;

use crate::config::IngestConfig;
use crate::error::{ProcessingError, Result};
use crate::models::{Capital, FailureCause, WeatherObservation};
use crate::readers::retry::Transience;
use crate::utils::coordinates::validate_coordinates;
use crate::utils::TemperatureUnit;

/// A single failed fetch attempt. Never leaves the ingestor: it ends up as
/// the cause and reason of an `IngestionFailure`.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchError {
    pub cause: FailureCause,
    pub message: String,
}

impl FetchError {
    pub fn new(cause: FailureCause, message: impl Into<String>) -> Self {
        Self {
            cause,
            message: message.into(),
        }
    }

    pub fn timeout() -> Self {
        Self::new(FailureCause::Timeout, "request timed out")
    }

    fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::new(FailureCause::Timeout, error.to_string())
        } else if let Some(status) = error.status() {
            Self::new(FailureCause::HttpStatus(status.as_u16()), error.to_string())
        } else {
            Self::new(FailureCause::Connection, error.to_string())
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.cause, self.message)
    }
}

impl std::error::Error for FetchError {}

impl Transience for FetchError {
    /// 429, 5xx, timeouts and connection failures are worth retrying
    fn is_transient(&self) -> bool {
        match self.cause {
            FailureCause::HttpStatus(status) => status == 429 || (500..600).contains(&status),
            FailureCause::Timeout | FailureCause::Connection => true,
            FailureCause::InvalidRequest | FailureCause::InvalidResponse => false,
        }
    }
}

/// Source of current conditions for a capital (or an arbitrary location)
#[async_trait]
pub trait WeatherSource: Send + Sync {
    async fn current_weather(
        &self,
        capital: &Capital,
    ) -> std::result::Result<WeatherObservation, FetchError>;
}

// OpenWeather current-weather response, only the parts we keep
#[derive(Debug, Deserialize)]
struct CurrentWeatherResponse {
    #[serde(default)]
    weather: Vec<ConditionBlock>,
    main: MainBlock,
    #[serde(default)]
    wind: Option<WindBlock>,
    #[serde(default)]
    clouds: Option<CloudsBlock>,
    #[serde(default)]
    visibility: Option<f64>,
    dt: i64,
    #[serde(default)]
    timezone: i32,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    sys: Option<SysBlock>,
}

#[derive(Debug, Deserialize)]
struct ConditionBlock {
    main: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct MainBlock {
    temp: f64,
    feels_like: Option<f64>,
    temp_min: Option<f64>,
    temp_max: Option<f64>,
    pressure: f64,
    humidity: f64,
    sea_level: Option<f64>,
    grnd_level: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct WindBlock {
    speed: f64,
    deg: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct CloudsBlock {
    all: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct SysBlock {
    country: Option<String>,
    sunrise: Option<i64>,
    sunset: Option<i64>,
}

/// Unix seconds to UTC; zero means the upstream had no value
fn unix_time(seconds: Option<i64>) -> Option<DateTime<Utc>> {
    seconds
        .filter(|&s| s > 0)
        .and_then(|s| DateTime::from_timestamp(s, 0))
}

/// Decode an OpenWeather current-weather body into an observation for `capital`.
///
/// Coordinates come from the request target so the capital's identity is
/// stable across runs. Targets outside the directory (empty names) take
/// their names from the response.
pub fn parse_weather_response(
    capital: &Capital,
    body: &str,
    unit: TemperatureUnit,
) -> std::result::Result<WeatherObservation, FetchError> {
    let response: CurrentWeatherResponse = serde_json::from_str(body)
        .map_err(|e| FetchError::new(FailureCause::InvalidResponse, e.to_string()))?;

    let observed_at = DateTime::from_timestamp(response.dt, 0).ok_or_else(|| {
        FetchError::new(
            FailureCause::InvalidResponse,
            format!("timestamp {} out of range", response.dt),
        )
    })?;

    let (weather_condition, weather_description) = response
        .weather
        .into_iter()
        .next()
        .map(|c| (c.main, c.description))
        .unwrap_or_default();

    let capital_name = if capital.capital_name.is_empty() {
        response.name.unwrap_or_default()
    } else {
        capital.capital_name.clone()
    };
    let (sys_country, sunrise, sunset) = match response.sys {
        Some(sys) => (sys.country, unix_time(sys.sunrise), unix_time(sys.sunset)),
        None => (None, None, None),
    };
    let country_name = if capital.country_name.is_empty() {
        sys_country.unwrap_or_default()
    } else {
        capital.country_name.clone()
    };

    Ok(WeatherObservation {
        capital_key: capital.key().to_string(),
        country_name,
        capital_name,
        latitude: capital.latitude,
        longitude: capital.longitude,
        temperature: response.main.temp,
        feels_like: response.main.feels_like,
        temp_min: response.main.temp_min,
        temp_max: response.main.temp_max,
        humidity: response.main.humidity,
        pressure: response.main.pressure,
        sea_level: response.main.sea_level,
        grnd_level: response.main.grnd_level,
        wind_speed: response.wind.as_ref().map_or(0.0, |w| w.speed),
        wind_direction: response.wind.and_then(|w| w.deg),
        cloud_cover: response.clouds.and_then(|c| c.all),
        visibility: response.visibility,
        weather_condition,
        weather_description,
        sunrise,
        sunset,
        timezone_offset: response.timezone,
        observed_at,
        temperature_unit: unit,
    })
}

/// Client for the OpenWeather current-weather endpoint
#[derive(Debug, Clone)]
pub struct OpenWeatherClient {
    client: Client,
    api_url: String,
    api_key: String,
    language: String,
    units: String,
    unit: TemperatureUnit,
}

impl OpenWeatherClient {
    pub fn new(api_url: &str, api_key: &str) -> Self {
        Self {
            client: Client::new(),
            api_url: api_url.to_string(),
            api_key: api_key.to_string(),
            language: "en".to_string(),
            units: "standard".to_string(),
            unit: TemperatureUnit::Kelvin,
        }
    }

    pub fn from_config(config: &IngestConfig) -> Result<Self> {
        let unit = TemperatureUnit::from_api_units(&config.units).ok_or_else(|| {
            ProcessingError::Config(format!("Unsupported units '{}'", config.units))
        })?;

        Ok(Self {
            units: config.units.clone(),
            unit,
            ..Self::new(&config.api_url, &config.api_key)
        }
        .with_language(&config.language))
    }

    pub fn with_language(mut self, language: &str) -> Self {
        self.language = language.to_string();
        self
    }
}

#[async_trait]
impl WeatherSource for OpenWeatherClient {
    async fn current_weather(
        &self,
        capital: &Capital,
    ) -> std::result::Result<WeatherObservation, FetchError> {
        validate_coordinates(capital.latitude, capital.longitude)
            .map_err(|e| FetchError::new(FailureCause::InvalidRequest, e.to_string()))?;

        debug!("Requesting current weather for {}", capital.display_name());

        let response = self
            .client
            .get(&self.api_url)
            .query(&[
                ("lat", capital.latitude.to_string()),
                ("lon", capital.longitude.to_string()),
                ("appid", self.api_key.clone()),
                ("lang", self.language.clone()),
                ("units", self.units.clone()),
            ])
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::new(
                FailureCause::HttpStatus(status.as_u16()),
                format!(
                    "upstream returned {}",
                    status.canonical_reason().unwrap_or("an error status")
                ),
            ));
        }

        let body = response.text().await.map_err(FetchError::from_reqwest)?;
        parse_weather_response(capital, &body, self.unit)
    }
}
