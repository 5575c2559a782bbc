use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Season, StagingRecord, TemperatureCategory};

/// Name given to clusters with no members
pub const UNKNOWN_CLUSTER: &str = "Unknown Cluster";

/// Descriptive name for a cluster from its centroid (original feature units),
/// e.g. "Hot & Dry" or "Freezing & Humid"
pub fn cluster_name(centroid: &[f64; 4]) -> String {
    let thermal = match TemperatureCategory::from_celsius(centroid[0]) {
        TemperatureCategory::VeryCold => "Freezing",
        TemperatureCategory::Cold => "Cool",
        TemperatureCategory::Moderate => "Warm",
        TemperatureCategory::Hot => "Hot",
    };
    let moisture = if centroid[1] < 40.0 {
        "Dry"
    } else if centroid[1] < 70.0 {
        "Mild"
    } else {
        "Humid"
    };
    format!("{} & {}", thermal, moisture)
}

/// Cluster label, its name and 2-D projection coordinates for one staging row
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterAssignment {
    pub cluster_id: usize,
    pub cluster_name: String,
    pub projection_x: f64,
    pub projection_y: f64,
}

/// A staging row extended with its cluster assignment.
///
/// Kept flat (no nested staging record) so the CSV header is one line of
/// plain column names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CuratedRecord {
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
    pub local_time: NaiveDateTime,
    pub temperature_difference: Option<f64>,
    pub daylight_duration: Option<f64>,
    pub thermal_comfort_index: f64,
    pub temperature_category: TemperatureCategory,
    pub season: Season,
    pub cluster_id: usize,
    pub cluster_name: String,
    pub projection_x: f64,
    pub projection_y: f64,
}

impl CuratedRecord {
    pub fn new(record: StagingRecord, assignment: ClusterAssignment) -> Self {
        Self {
            capital_key: record.capital_key,
            country_name: record.country_name,
            capital_name: record.capital_name,
            latitude: record.latitude,
            longitude: record.longitude,
            temperature: record.temperature,
            feels_like: record.feels_like,
            temp_min: record.temp_min,
            temp_max: record.temp_max,
            humidity: record.humidity,
            pressure: record.pressure,
            sea_level_pressure: record.sea_level_pressure,
            ground_level_pressure: record.ground_level_pressure,
            wind_speed: record.wind_speed,
            wind_direction: record.wind_direction,
            cloud_cover: record.cloud_cover,
            visibility: record.visibility,
            weather_condition: record.weather_condition,
            weather_description: record.weather_description,
            sunrise: record.sunrise,
            sunset: record.sunset,
            observed_at: record.observed_at,
            local_time: record.local_time,
            temperature_difference: record.temperature_difference,
            daylight_duration: record.daylight_duration,
            thermal_comfort_index: record.thermal_comfort_index,
            temperature_category: record.temperature_category,
            season: record.season,
            cluster_id: assignment.cluster_id,
            cluster_name: assignment.cluster_name,
            projection_x: assignment.projection_x,
            projection_y: assignment.projection_y,
        }
    }
}

/// Per-cluster statistics reported after a clustering run
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterProfile {
    pub cluster_id: usize,
    pub name: String,
    pub size: usize,
    /// Centroid in original feature units: temperature, humidity, pressure, wind speed
    pub centroid: [f64; 4],
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClusteringSummary {
    pub rows: usize,
    pub k: usize,
    pub inertia: f64,
    pub silhouette: Option<f64>,
    pub profiles: Vec<ClusterProfile>,
}

impl ClusteringSummary {
    pub fn summary(&self) -> String {
        let mut summary = String::new();

        summary.push_str("=== Clustering Summary ===\n");
        summary.push_str(&format!("Rows: {}, Clusters: {}\n", self.rows, self.k));
        summary.push_str(&format!("Inertia: {:.4}\n", self.inertia));
        match self.silhouette {
            Some(score) => summary.push_str(&format!("Silhouette: {:.4}\n", score)),
            None => summary.push_str("Silhouette: n/a\n"),
        }

        for profile in &self.profiles {
            summary.push_str(&format!(
                "  Cluster {} ({}): {} rows, temp {:.1}°C, humidity {:.0}%, pressure {:.0} hPa, wind {:.1} m/s\n",
                profile.cluster_id,
                profile.name,
                profile.size,
                profile.centroid[0],
                profile.centroid[1],
                profile.centroid[2],
                profile.centroid[3]
            ));
        }

        summary
    }
}
