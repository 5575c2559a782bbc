use crate::utils::constants::{
    CSV_EXTENSION, FAILURE_SIDECAR_PREFIX, JSON_EXTENSION, RAW_BATCH_PREFIX, USER_INPUT_PREFIX,
};
use chrono::{DateTime, Utc};

/// ISO-8601 basic format with milliseconds; sorts lexicographically in time order
const KEY_TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.3fZ";

pub fn key_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.format(KEY_TIMESTAMP_FORMAT).to_string()
}

/// Generate the raw batch key: weather_data_{timestamp}.csv
pub fn raw_batch_key(prefix: &str, timestamp: DateTime<Utc>) -> String {
    format!("{}{}{}", prefix, key_timestamp(timestamp), CSV_EXTENSION)
}

/// Generate the failure sidecar key: ingest_failures_{timestamp}.json
pub fn failure_sidecar_key(timestamp: DateTime<Utc>) -> String {
    format!(
        "{}{}{}",
        FAILURE_SIDECAR_PREFIX,
        key_timestamp(timestamp),
        JSON_EXTENSION
    )
}

/// Whether a raw-tier key holds observation rows (as opposed to sidecars or uploads)
pub fn is_raw_batch_key(key: &str) -> bool {
    (key.starts_with(RAW_BATCH_PREFIX) || key.starts_with(USER_INPUT_PREFIX))
        && key.ends_with(CSV_EXTENSION)
}

/// Timestamp portion of a raw batch key, used to order batches across prefixes
pub fn batch_timestamp(key: &str) -> Option<&str> {
    let stem = key.strip_suffix(CSV_EXTENSION)?;
    stem.strip_prefix(RAW_BATCH_PREFIX)
        .or_else(|| stem.strip_prefix(USER_INPUT_PREFIX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn timestamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 6, 0, 0).unwrap()
    }

    #[test]
    fn test_raw_batch_key() {
        let key = raw_batch_key(RAW_BATCH_PREFIX, timestamp());
        assert_eq!(key, "weather_data_20240101T060000.000Z.csv");
        assert!(is_raw_batch_key(&key));
        assert_eq!(batch_timestamp(&key), Some("20240101T060000.000Z"));
    }

    #[test]
    fn test_failure_sidecar_is_not_a_batch() {
        let key = failure_sidecar_key(timestamp());
        assert_eq!(key, "ingest_failures_20240101T060000.000Z.json");
        assert!(!is_raw_batch_key(&key));
        assert!(!is_raw_batch_key("notes.csv"));
        assert!(is_raw_batch_key("user_input_data_20240101T060000.000Z.csv"));
    }

    #[test]
    fn test_keys_sort_chronologically() {
        let earlier = raw_batch_key(RAW_BATCH_PREFIX, timestamp());
        let later = raw_batch_key(
            RAW_BATCH_PREFIX,
            timestamp() + chrono::Duration::milliseconds(1),
        );
        let next_day = raw_batch_key(RAW_BATCH_PREFIX, timestamp() + chrono::Duration::days(1));
        assert!(earlier < later);
        assert!(later < next_day);
    }
}
