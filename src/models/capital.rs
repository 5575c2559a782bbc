use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::utils::coordinates::location_key;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Capital {
    #[validate(length(min = 1))]
    pub country_code: String,

    pub country_name: String,

    pub capital_name: String,

    #[validate(range(min = -90.0, max = 90.0))]
    pub latitude: f64,

    #[validate(range(min = -180.0, max = 180.0))]
    pub longitude: f64,
}

impl Capital {
    pub fn new(
        country_code: String,
        country_name: String,
        capital_name: String,
        latitude: f64,
        longitude: f64,
    ) -> Self {
        Self {
            country_code,
            country_name,
            capital_name,
            latitude,
            longitude,
        }
    }

    /// An observation target at arbitrary coordinates, outside the directory
    pub fn at_location(latitude: f64, longitude: f64) -> Self {
        Self {
            country_code: location_key(latitude, longitude),
            country_name: String::new(),
            capital_name: String::new(),
            latitude,
            longitude,
        }
    }

    /// Uniqueness key used across all tiers
    pub fn key(&self) -> &str {
        &self.country_code
    }

    pub fn display_name(&self) -> String {
        if self.capital_name.is_empty() {
            self.country_code.clone()
        } else {
            format!("{} ({})", self.capital_name, self.country_code)
        }
    }
}
