use crate::utils::constants::KELVIN_OFFSET;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Temperature unit an upstream value was reported in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TemperatureUnit {
    #[serde(rename = "K")]
    Kelvin,
    #[serde(rename = "C")]
    Celsius,
}

impl TemperatureUnit {
    /// OpenWeather `units` parameter value to its temperature unit
    pub fn from_api_units(units: &str) -> Option<Self> {
        match units {
            "standard" => Some(TemperatureUnit::Kelvin),
            "metric" => Some(TemperatureUnit::Celsius),
            _ => None,
        }
    }

    pub fn to_celsius(self, value: f64) -> f64 {
        match self {
            TemperatureUnit::Kelvin => value - KELVIN_OFFSET,
            TemperatureUnit::Celsius => value,
        }
    }
}

impl fmt::Display for TemperatureUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemperatureUnit::Kelvin => write!(f, "K"),
            TemperatureUnit::Celsius => write!(f, "C"),
        }
    }
}
