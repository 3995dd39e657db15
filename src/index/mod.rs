//! Index structures
//!
//! - **format**: byte layout of the index artifact (header, tables, nodes)
//! - **rtree**: pruned interval-tree traversal over the mapped artifact
//! - **catalog**: the opened handle mapping channel names to tree roots
//!
//! ```text
//! Query: "ARIDI01:BPM1, last hour"
//!        ↓
//! Catalog: resolve name → tree root offset
//!        ↓
//! RTree: prune + descend → ordered BlockRefs
//!        ↓
//! Read only the overlapping block regions
//! ```

pub mod catalog;
pub mod format;
pub mod rtree;

pub use catalog::{Catalog, ChannelEntry};
pub use format::{
    BranchChild, ChannelRecord, IndexHeader, NodeRecord, HEADER_SIZE, INDEX_MAGIC, INDEX_VERSION,
    MAX_FANOUT, NO_ROOT,
};
pub use rtree::RTreeReader;
