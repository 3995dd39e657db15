//! # carchive
//!
//! Read/query engine for channel-archiver time-series archives: an on-disk
//! index maps named channels to interval trees of append-only data blocks,
//! and a query layer resolves arbitrary time ranges across many channels
//! into decoded, metadata-annotated samples.
//!
//! ## Modules
//!
//! - [`storage`]: sample types and the pure block codec
//! - [`index`]: the index artifact: catalog, channel tables, interval trees
//! - [`query`]: batch `get_data` with per-channel failure isolation
//! - [`config`]: engine tunables
//! - [`error`]: the error taxonomy
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use carchive::{Catalog, QueryEngine, QueryOptions, Time};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let catalog = Arc::new(Catalog::open("/archive/index.cai")?);
//!
//!     // Find channels by pattern
//!     let channels = catalog.list(Some("ARIDI.*BPM1"))?;
//!
//!     // Query the last minute; end defaults to now
//!     let engine = QueryEngine::new(Arc::clone(&catalog));
//!     let start = Time::from_secs(Time::now().secs - 60);
//!     let options = QueryOptions::new().units().status();
//!     let results = engine.get_data(&channels, start, None, &options).await;
//!
//!     for result in &results {
//!         match &result.error {
//!             None => println!("{}: {} samples", result.channel, result.samples.len()),
//!             Some(e) => println!("{}: {} ({} partial samples)",
//!                 result.channel, e, result.samples.len()),
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod index;
pub mod query;
pub mod storage;

// Re-export top-level types for convenience
pub use config::EngineConfig;
pub use error::{ArchiveError, ArchiveResult};
pub use index::{Catalog, ChannelEntry, RTreeReader};
pub use query::{ChannelResult, FilePool, QueryEngine, QueryOptions, SourceInfo};
pub use storage::{
    decode_block, severity_name, BlockRef, DataBlock, FieldType, Sample, Time, TimeRange, Value,
};
