pub mod csv_codec;
pub mod raw_writer;

pub use csv_codec::{decode_all, decode_records, encode_records, DecodedRows};
pub use raw_writer::{RawBatchId, RawTierWriter};
