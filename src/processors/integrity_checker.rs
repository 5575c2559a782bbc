use std::collections::BTreeMap;
use validator::Validate;

use crate::models::{RawRecord, StagingRecord, StagingValues};

/// Counts gathered while turning raw rows into staging rows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntegrityReport {
    pub batches_read: usize,
    pub rows_read: usize,
    pub undecodable_rows: usize,
    /// Decoded rows rejected by validation, each counted once
    pub rows_dropped: usize,
    /// Rows dropped because a required value was absent, by field
    pub missing_values: BTreeMap<String, usize>,
    /// Values outside their plausible range, by field. A row failing several
    /// bounds appears under each of them.
    pub out_of_range: BTreeMap<String, usize>,
    pub duplicates_removed: usize,
    pub rows_written: usize,
}

impl IntegrityReport {
    fn drop_missing(&mut self, field: &str) {
        self.rows_dropped += 1;
        *self.missing_values.entry(field.to_string()).or_insert(0) += 1;
    }

    fn drop_out_of_range<S: AsRef<str>>(&mut self, fields: impl IntoIterator<Item = S>) {
        self.rows_dropped += 1;
        for field in fields {
            *self.out_of_range.entry(field.as_ref().to_string()).or_insert(0) += 1;
        }
    }

    /// Fold another partial report (from one batch) into this one
    pub fn merge(&mut self, other: IntegrityReport) {
        self.batches_read += other.batches_read;
        self.rows_read += other.rows_read;
        self.undecodable_rows += other.undecodable_rows;
        self.rows_dropped += other.rows_dropped;
        for (field, count) in other.missing_values {
            *self.missing_values.entry(field).or_insert(0) += count;
        }
        for (field, count) in other.out_of_range {
            *self.out_of_range.entry(field).or_insert(0) += count;
        }
        self.duplicates_removed += other.duplicates_removed;
        self.rows_written += other.rows_written;
    }
}

pub struct IntegrityChecker;

impl Default for IntegrityChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl IntegrityChecker {
    pub fn new() -> Self {
        Self
    }

    /// Normalize a raw row to Celsius, derive its columns and validate it.
    ///
    /// Returns `None` (and records why) when the row cannot enter staging.
    /// A dropped row counts once in `rows_dropped`; it is charged to its
    /// first missing field, but to every field that is out of range.
    pub fn check_row(&self, raw: RawRecord, report: &mut IntegrityReport) -> Option<StagingRecord> {
        let unit = raw.unit();

        macro_rules! required {
            ($field:ident) => {
                match raw.$field {
                    Some(value) => value,
                    None => {
                        report.drop_missing(stringify!($field));
                        return None;
                    }
                }
            };
        }

        let capital_key = match raw.capital_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => key.to_string(),
            _ => {
                report.drop_missing("capital_key");
                return None;
            }
        };
        let latitude = required!(latitude);
        let longitude = required!(longitude);
        let temperature = required!(temperature);
        let humidity = required!(humidity);
        let pressure = required!(pressure);
        let wind_speed = required!(wind_speed);
        let observed_at = required!(observed_at);

        // Non-finite values slip past range checks; treat them as out of range
        let non_finite: Vec<&str> = [
            ("latitude", latitude),
            ("longitude", longitude),
            ("temperature", temperature),
            ("humidity", humidity),
            ("pressure", pressure),
            ("wind_speed", wind_speed),
        ]
        .iter()
        .filter(|(_, value)| !value.is_finite())
        .map(|(field, _)| *field)
        .collect();
        if !non_finite.is_empty() {
            report.drop_out_of_range(non_finite);
            return None;
        }

        let values = StagingValues {
            capital_key,
            country_name: raw.country_name.unwrap_or_default(),
            capital_name: raw.capital_name.unwrap_or_default(),
            latitude,
            longitude,
            temperature: unit.to_celsius(temperature),
            feels_like: raw.feels_like.map(|t| unit.to_celsius(t)),
            temp_min: raw.temp_min.map(|t| unit.to_celsius(t)),
            temp_max: raw.temp_max.map(|t| unit.to_celsius(t)),
            humidity,
            pressure,
            sea_level_pressure: raw.sea_level,
            ground_level_pressure: raw.grnd_level,
            wind_speed,
            wind_direction: raw.wind_direction,
            cloud_cover: raw.cloud_cover,
            visibility: raw.visibility,
            weather_condition: raw.weather_condition.unwrap_or_default(),
            weather_description: raw.weather_description.unwrap_or_default(),
            sunrise: raw.sunrise,
            sunset: raw.sunset,
            observed_at,
            timezone_offset: raw.timezone_offset.unwrap_or(0),
        };

        // Local time beyond the calendar range
        let Some(record) = StagingRecord::from_values(values) else {
            report.drop_out_of_range(["observed_at"]);
            return None;
        };

        match record.validate() {
            Ok(()) => Some(record),
            Err(errors) => {
                let fields: Vec<String> =
                    errors.field_errors().keys().map(|field| field.to_string()).collect();
                report.drop_out_of_range(fields);
                None
            }
        }
    }

    pub fn generate_summary(&self, report: &IntegrityReport) -> String {
        let mut summary = String::new();

        summary.push_str("=== Staging Integrity Report ===\n");
        summary.push_str(&format!("Raw Batches Read: {}\n", report.batches_read));
        summary.push_str(&format!("Rows Read: {}\n", report.rows_read));
        summary.push_str(&format!("Undecodable Rows: {}\n", report.undecodable_rows));
        summary.push_str(&format!("Rows Dropped: {}\n", report.rows_dropped));

        for (field, count) in &report.missing_values {
            summary.push_str(&format!("  missing {}: {}\n", field, count));
        }
        for (field, count) in &report.out_of_range {
            summary.push_str(&format!("  out of range {}: {}\n", field, count));
        }

        summary.push_str(&format!(
            "Duplicates Removed: {}\n",
            report.duplicates_removed
        ));
        summary.push_str(&format!("Rows Written: {}\n", report.rows_written));

        summary
    }
}
