pub mod constants;
pub mod coordinates;
pub mod filename;
pub mod progress;
pub mod units;

pub use constants::*;
pub use coordinates::{location_key, validate_coordinates};
pub use filename::{batch_timestamp, failure_sidecar_key, is_raw_batch_key, raw_batch_key};
pub use progress::ProgressReporter;
pub use units::TemperatureUnit;
