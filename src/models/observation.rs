use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::units::TemperatureUnit;

/// One successful weather reading for a capital, as returned by the upstream API.
///
/// Serialized field order is the raw tier's column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherObservation {
    pub capital_key: String,
    pub country_name: String,
    pub capital_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub temperature: f64,
    pub feels_like: Option<f64>,
    pub temp_min: Option<f64>,
    pub temp_max: Option<f64>,
    pub humidity: f64,
    pub pressure: f64,
    pub sea_level: Option<f64>,
    pub grnd_level: Option<f64>,
    pub wind_speed: f64,
    pub wind_direction: Option<f64>,
    pub cloud_cover: Option<f64>,
    /// Metres
    pub visibility: Option<f64>,
    pub weather_condition: String,
    pub weather_description: String,
    pub sunrise: Option<DateTime<Utc>>,
    pub sunset: Option<DateTime<Utc>>,
    /// Seconds east of UTC at the observed location
    pub timezone_offset: i32,
    pub observed_at: DateTime<Utc>,
    pub temperature_unit: TemperatureUnit,
}

/// A raw-tier row as read back from storage.
///
/// Every value may be missing or damaged: raw batches can come from older
/// runs or from manual uploads, so nothing is trusted until staging
/// validation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawRecord {
    pub capital_key: Option<String>,
    #[serde(default)]
    pub country_name: Option<String>,
    #[serde(default)]
    pub capital_name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub temperature: Option<f64>,
    #[serde(default)]
    pub feels_like: Option<f64>,
    #[serde(default)]
    pub temp_min: Option<f64>,
    #[serde(default)]
    pub temp_max: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
    #[serde(default)]
    pub sea_level: Option<f64>,
    #[serde(default)]
    pub grnd_level: Option<f64>,
    pub wind_speed: Option<f64>,
    #[serde(default)]
    pub wind_direction: Option<f64>,
    #[serde(default)]
    pub cloud_cover: Option<f64>,
    #[serde(default)]
    pub visibility: Option<f64>,
    #[serde(default)]
    pub weather_condition: Option<String>,
    #[serde(default)]
    pub weather_description: Option<String>,
    #[serde(default)]
    pub sunrise: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sunset: Option<DateTime<Utc>>,
    #[serde(default)]
    pub timezone_offset: Option<i32>,
    pub observed_at: Option<DateTime<Utc>>,
    /// Absent in batches written before units were recorded; those are Kelvin
    #[serde(default)]
    pub temperature_unit: Option<TemperatureUnit>,
}

impl RawRecord {
    pub fn unit(&self) -> TemperatureUnit {
        self.temperature_unit.unwrap_or(TemperatureUnit::Kelvin)
    }
}

impl From<WeatherObservation> for RawRecord {
    fn from(observation: WeatherObservation) -> Self {
        Self {
            capital_key: Some(observation.capital_key),
            country_name: Some(observation.country_name),
            capital_name: Some(observation.capital_name),
            latitude: Some(observation.latitude),
            longitude: Some(observation.longitude),
            temperature: Some(observation.temperature),
            feels_like: observation.feels_like,
            temp_min: observation.temp_min,
            temp_max: observation.temp_max,
            humidity: Some(observation.humidity),
            pressure: Some(observation.pressure),
            sea_level: observation.sea_level,
            grnd_level: observation.grnd_level,
            wind_speed: Some(observation.wind_speed),
            wind_direction: observation.wind_direction,
            cloud_cover: observation.cloud_cover,
            visibility: observation.visibility,
            weather_condition: Some(observation.weather_condition),
            weather_description: Some(observation.weather_description),
            sunrise: observation.sunrise,
            sunset: observation.sunset,
            timezone_offset: Some(observation.timezone_offset),
            observed_at: Some(observation.observed_at),
            temperature_unit: Some(observation.temperature_unit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_raw_record_defaults_to_kelvin() {
        let record = RawRecord::default();
        assert_eq!(record.unit(), TemperatureUnit::Kelvin);

        let record = RawRecord {
            temperature_unit: Some(TemperatureUnit::Celsius),
            ..RawRecord::default()
        };
        assert_eq!(record.unit(), TemperatureUnit::Celsius);
    }

    #[test]
    fn test_observation_into_raw_record() {
        let observation = WeatherObservation {
            capital_key: "JP".to_string(),
            country_name: "Japan".to_string(),
            capital_name: "Tokyo".to_string(),
            latitude: 35.68,
            longitude: 139.69,
            temperature: 290.0,
            feels_like: None,
            temp_min: Some(288.0),
            temp_max: Some(292.0),
            humidity: 60.0,
            pressure: 1012.0,
            sea_level: Some(1012.0),
            grnd_level: Some(1010.0),
            wind_speed: 3.5,
            wind_direction: Some(180.0),
            cloud_cover: None,
            visibility: Some(10_000.0),
            weather_condition: "Clouds".to_string(),
            weather_description: "broken clouds".to_string(),
            sunrise: Some(Utc.with_ymd_and_hms(2024, 3, 31, 20, 30, 0).unwrap()),
            sunset: Some(Utc.with_ymd_and_hms(2024, 4, 1, 9, 0, 0).unwrap()),
            timezone_offset: 32_400,
            observed_at: Utc.with_ymd_and_hms(2024, 4, 1, 3, 0, 0).unwrap(),
            temperature_unit: TemperatureUnit::Kelvin,
        };

        let record = RawRecord::from(observation);
        assert_eq!(record.capital_key.as_deref(), Some("JP"));
        assert_eq!(record.humidity, Some(60.0));
        assert_eq!(record.feels_like, None);
        assert_eq!(record.timezone_offset, Some(32_400));
        assert_eq!(record.grnd_level, Some(1010.0));
        assert_eq!(record.visibility, Some(10_000.0));
        assert_eq!(
            record.sunset,
            Some(Utc.with_ymd_and_hms(2024, 4, 1, 9, 0, 0).unwrap())
        );
    }
}
