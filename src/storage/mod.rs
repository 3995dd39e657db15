//! On-disk block format
//!
//! - **types**: core data structures (Time, TimeRange, Sample, Value)
//! - **codec**: pure decoder for one block region
//!
//! The codec operates on bytes the caller has already read; file access and
//! block location live in the `index` and `query` layers.

pub mod codec;
pub mod types;

pub use codec::{decode_block, record_width, DataBlock, BLOCK_MAGIC, BLOCK_VERSION};
pub use types::{
    severity_name, BlockRef, FieldType, Sample, Time, TimeRange, Value, SEVERITY_ARCHIVE_DISABLED,
    SEVERITY_ARCHIVE_OFF, SEVERITY_DISCONNECTED, SEVERITY_INFO_MASK,
};
