pub mod data_merger;
pub mod integrity_checker;
pub mod staging_transformer;

pub use data_merger::{BatchRow, DataMerger};
pub use integrity_checker::{IntegrityChecker, IntegrityReport};
pub use staging_transformer::{StagingOutput, StagingTransformer};
