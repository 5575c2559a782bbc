use crate::error::{ProcessingError, Result};

/// Validate a latitude/longitude pair against geographic bounds
pub fn validate_coordinates(latitude: f64, longitude: f64) -> Result<()> {
    if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
        return Err(ProcessingError::InvalidCoordinate(format!(
            "Latitude {} is outside [-90, 90]",
            latitude
        )));
    }

    if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
        return Err(ProcessingError::InvalidCoordinate(format!(
            "Longitude {} is outside [-180, 180]",
            longitude
        )));
    }

    Ok(())
}

/// Parse a `[lat, lon]` pair as delivered by the country directory
pub fn parse_latlng(values: &[f64]) -> Result<(f64, f64)> {
    match values {
        [lat, lon] => {
            validate_coordinates(*lat, *lon)?;
            Ok((*lat, *lon))
        }
        _ => Err(ProcessingError::InvalidCoordinate(format!(
            "Expected [lat, lon], got {} values",
            values.len()
        ))),
    }
}

/// Stable key for an observation taken at arbitrary coordinates
pub fn location_key(latitude: f64, longitude: f64) -> String {
    format!("LOC_{:.4}_{:.4}", latitude, longitude)
}
