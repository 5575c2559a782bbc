use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemperatureCategory {
    VeryCold, // below 0°C
    Cold,     // 0-10°C
    Moderate, // 10-25°C
    Hot,      // 25°C and above
}

impl TemperatureCategory {
    pub fn from_celsius(temperature: f64) -> Self {
        if temperature < 0.0 {
            TemperatureCategory::VeryCold
        } else if temperature < 10.0 {
            TemperatureCategory::Cold
        } else if temperature < 25.0 {
            TemperatureCategory::Moderate
        } else {
            TemperatureCategory::Hot
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Season {
    Spring,
    Summer,
    Autumn,
    Winter,
}

impl Season {
    /// Astronomical season from local day-of-year, flipped for the southern hemisphere
    pub fn for_day(day_of_year: u32, latitude: f64) -> Self {
        let northern = match day_of_year {
            80..=171 => Season::Spring,
            172..=263 => Season::Summer,
            264..=354 => Season::Autumn,
            _ => Season::Winter,
        };

        if latitude > 0.0 {
            northern
        } else {
            northern.opposite()
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Season::Spring => Season::Autumn,
            Season::Summer => Season::Winter,
            Season::Autumn => Season::Spring,
            Season::Winter => Season::Summer,
        }
    }
}

/// Hours between sunrise and sunset, when both are known and in order
pub fn daylight_duration(sunrise: Option<DateTime<Utc>>, sunset: Option<DateTime<Utc>>) -> Option<f64> {
    match (sunrise, sunset) {
        (Some(rise), Some(set)) if set > rise => Some((set - rise).num_seconds() as f64 / 3600.0),
        _ => None,
    }
}

/// Apparent temperature index combining heat, humidity and wind chill
pub fn thermal_comfort_index(temperature: f64, humidity: f64, wind_speed: f64) -> f64 {
    temperature - 0.55 * (1.0 - humidity / 100.0) * (temperature - 14.5) - 0.2 * wind_speed
}

/// A cleaned, Celsius-normalized row of the staging dataset.
///
/// Range attributes are the plausibility bounds a raw row must satisfy to
/// survive staging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct StagingRecord {
    #[validate(length(min = 1))]
    pub capital_key: String,

    pub country_name: String,

    pub capital_name: String,

    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,

    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,

    #[validate(range(min = -100.0, max = 65.0))]
    pub temperature: f64,

    pub feels_like: Option<f64>,

    pub temp_min: Option<f64>,

    pub temp_max: Option<f64>,

    #[validate(range(min = 0.0, max = 100.0))]
    pub humidity: f64,

    #[validate(range(min = 800.0, max = 1100.0))]
    pub pressure: f64,

    pub sea_level_pressure: Option<f64>,

    pub ground_level_pressure: Option<f64>,

    #[validate(range(min = 0.0, max = 115.0))]
    pub wind_speed: f64,

    pub wind_direction: Option<f64>,

    #[validate(range(min = 0.0, max = 100.0))]
    pub cloud_cover: Option<f64>,

    pub visibility: Option<f64>,

    pub weather_condition: String,

    pub weather_description: String,

    pub sunrise: Option<DateTime<Utc>>,

    pub sunset: Option<DateTime<Utc>>,

    pub observed_at: DateTime<Utc>,

    pub local_time: NaiveDateTime,

    pub temperature_difference: Option<f64>,

    /// Hours of daylight
    pub daylight_duration: Option<f64>,

    pub thermal_comfort_index: f64,

    pub temperature_category: TemperatureCategory,

    pub season: Season,
}

/// Measured values of a staging row before derived columns are computed
#[derive(Debug, Clone, PartialEq)]
pub struct StagingValues {
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
    pub sea_level_pressure: Option<f64>,
    pub ground_level_pressure: Option<f64>,
    pub wind_speed: f64,
    pub wind_direction: Option<f64>,
    pub cloud_cover: Option<f64>,
    pub visibility: Option<f64>,
    pub weather_condition: String,
    pub weather_description: String,
    pub sunrise: Option<DateTime<Utc>>,
    pub sunset: Option<DateTime<Utc>>,
    pub observed_at: DateTime<Utc>,
    pub timezone_offset: i32,
}

impl StagingRecord {
    /// Compute the derived columns. `None` when the observation time shifted
    /// by the timezone offset falls outside the representable range.
    pub fn from_values(values: StagingValues) -> Option<Self> {
        let local_time = values
            .observed_at
            .naive_utc()
            .checked_add_signed(chrono::Duration::seconds(i64::from(values.timezone_offset)))?;
        let temperature_difference = match (values.temp_min, values.temp_max) {
            (Some(min), Some(max)) => Some(max - min),
            _ => None,
        };

        Some(Self {
            daylight_duration: daylight_duration(values.sunrise, values.sunset),
            thermal_comfort_index: thermal_comfort_index(
                values.temperature,
                values.humidity,
                values.wind_speed,
            ),
            temperature_category: TemperatureCategory::from_celsius(values.temperature),
            season: Season::for_day(local_time.ordinal(), values.latitude),
            local_time,
            temperature_difference,
            capital_key: values.capital_key,
            country_name: values.country_name,
            capital_name: values.capital_name,
            latitude: values.latitude,
            longitude: values.longitude,
            temperature: values.temperature,
            feels_like: values.feels_like,
            temp_min: values.temp_min,
            temp_max: values.temp_max,
            humidity: values.humidity,
            pressure: values.pressure,
            sea_level_pressure: values.sea_level_pressure,
            ground_level_pressure: values.ground_level_pressure,
            wind_speed: values.wind_speed,
            wind_direction: values.wind_direction,
            cloud_cover: values.cloud_cover,
            visibility: values.visibility,
            weather_condition: values.weather_condition,
            weather_description: values.weather_description,
            sunrise: values.sunrise,
            sunset: values.sunset,
            observed_at: values.observed_at,
        })
    }

    /// Clustering features in fixed order: temperature, humidity, pressure, wind speed
    pub fn features(&self) -> [f64; 4] {
        [self.temperature, self.humidity, self.pressure, self.wind_speed]
    }
}
