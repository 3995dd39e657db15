//! Query engine
//!
//! - **options**: per-query knobs (units, status, info, deadline)
//! - **pool**: bounded block-file handle pool
//! - **engine**: batch `get_data` with per-channel failure isolation

pub mod engine;
pub mod options;
pub mod pool;

pub use engine::{ChannelResult, QueryEngine, SourceInfo};
pub use options::QueryOptions;
pub use pool::FilePool;
