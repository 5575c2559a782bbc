pub mod capital;
pub mod cluster;
pub mod observation;
pub mod outcome;
pub mod staging;

pub use capital::Capital;
pub use cluster::{
    cluster_name, ClusterAssignment, ClusterProfile, ClusteringSummary, CuratedRecord,
    UNKNOWN_CLUSTER,
};
pub use observation::{RawRecord, WeatherObservation};
pub use outcome::{FailureCause, IngestionFailure, IngestionOutcome, IngestionSummary};
pub use staging::{
    daylight_duration, Season, StagingRecord, StagingValues, TemperatureCategory,
};
