use csv::{ReaderBuilder, WriterBuilder};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::{ProcessingError, Result};

/// Raw tier columns, in `WeatherObservation` field order
pub const RAW_COLUMNS: &[&str] = &[
    "capital_key",
    "country_name",
    "capital_name",
    "latitude",
    "longitude",
    "temperature",
    "feels_like",
    "temp_min",
    "temp_max",
    "humidity",
    "pressure",
    "sea_level",
    "grnd_level",
    "wind_speed",
    "wind_direction",
    "cloud_cover",
    "visibility",
    "weather_condition",
    "weather_description",
    "sunrise",
    "sunset",
    "timezone_offset",
    "observed_at",
    "temperature_unit",
];

/// Staging columns, in `StagingRecord` field order
pub const STAGING_COLUMNS: &[&str] = &[
    "capital_key",
    "country_name",
    "capital_name",
    "latitude",
    "longitude",
    "temperature",
    "feels_like",
    "temp_min",
    "temp_max",
    "humidity",
    "pressure",
    "sea_level_pressure",
    "ground_level_pressure",
    "wind_speed",
    "wind_direction",
    "cloud_cover",
    "visibility",
    "weather_condition",
    "weather_description",
    "sunrise",
    "sunset",
    "observed_at",
    "local_time",
    "temperature_difference",
    "daylight_duration",
    "thermal_comfort_index",
    "temperature_category",
    "season",
];

/// Curated columns: staging columns plus the cluster assignment
pub const CURATED_COLUMNS: &[&str] = &[
    "capital_key",
    "country_name",
    "capital_name",
    "latitude",
    "longitude",
    "temperature",
    "feels_like",
    "temp_min",
    "temp_max",
    "humidity",
    "pressure",
    "sea_level_pressure",
    "ground_level_pressure",
    "wind_speed",
    "wind_direction",
    "cloud_cover",
    "visibility",
    "weather_condition",
    "weather_description",
    "sunrise",
    "sunset",
    "observed_at",
    "local_time",
    "temperature_difference",
    "daylight_duration",
    "thermal_comfort_index",
    "temperature_category",
    "season",
    "cluster_id",
    "cluster_name",
    "projection_x",
    "projection_y",
];

/// Serialize records to CSV. The header is written even when there are no rows.
pub fn encode_records<T: Serialize>(records: &[T], header: &[&str]) -> Result<Vec<u8>> {
    let mut writer = WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    writer.write_record(header)?;
    for record in records {
        writer.serialize(record)?;
    }

    writer
        .into_inner()
        .map_err(|e| ProcessingError::InvalidFormat(format!("CSV buffer flush failed: {}", e)))
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRows<T> {
    pub rows: Vec<T>,
    pub undecodable: usize,
}

/// Decode CSV rows by header name, counting rows that fail to decode instead
/// of failing the whole object
pub fn decode_records<T: DeserializeOwned>(bytes: &[u8]) -> Result<DecodedRows<T>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    // A missing or broken header makes every row meaningless
    reader.headers()?;

    let mut rows = Vec::new();
    let mut undecodable = 0;
    for (index, result) in reader.deserialize::<T>().enumerate() {
        match result {
            Ok(row) => rows.push(row),
            Err(e) => {
                undecodable += 1;
                debug!("Row {} could not be decoded: {}", index + 1, e);
            }
        }
    }

    Ok(DecodedRows { rows, undecodable })
}

/// Decode CSV rows, failing on the first bad row
pub fn decode_all<T: DeserializeOwned>(bytes: &[u8]) -> Result<Vec<T>> {
    let mut reader = ReaderBuilder::new().has_headers(true).from_reader(bytes);
    reader
        .deserialize::<T>()
        .map(|row| row.map_err(ProcessingError::from))
        .collect()
}
