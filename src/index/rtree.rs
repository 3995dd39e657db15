//! Interval tree traversal
//!
//! Walks a channel's on-disk tree and yields the block references whose time
//! ranges intersect a query range, ascending in time. Each call is a fresh
//! traversal; there is no shared cursor state, so one reader can serve many
//! concurrent queries over the same mapped index.
//!
//! Work is O(log n) for the descent plus O(k) for the k overlapping leaf
//! blocks: any subtree whose declared range misses the query is pruned
//! without being read.

use crate::error::{ArchiveError, ArchiveResult};
use crate::index::format::{self, NodeRecord, NO_ROOT};
use crate::storage::types::{BlockRef, TimeRange};
use std::collections::HashSet;

/// Read-only view of one channel's interval tree inside the index data
#[derive(Debug, Clone, Copy)]
pub struct RTreeReader<'a> {
    data: &'a [u8],
    root: u64,
}

impl<'a> RTreeReader<'a> {
    /// View the tree rooted at `root` within the mapped index bytes
    pub fn new(data: &'a [u8], root: u64) -> Self {
        Self { data, root }
    }

    /// Channel has no data at all
    pub fn is_empty(&self) -> bool {
        self.root == NO_ROOT
    }

    /// Collect the block references overlapping `range`, ascending by start
    /// time. An empty tree or a range outside all data yields an empty
    /// vector, not an error.
    pub fn query(&self, range: &TimeRange) -> ArchiveResult<Vec<BlockRef>> {
        let mut refs = Vec::new();
        if self.root == NO_ROOT {
            return Ok(refs);
        }

        // (offset, range the parent declared for this child)
        let mut stack: Vec<(u64, Option<TimeRange>)> = vec![(self.root, None)];
        let mut visited = HashSet::new();

        while let Some((offset, declared_by_parent)) = stack.pop() {
            if !visited.insert(offset) {
                return Err(ArchiveError::index(offset, "cycle in tree structure"));
            }
            let node = format::parse_node(self.data, offset)?;

            // The node's own bounding range must honor what its parent
            // declared for it; a mismatch means one of them lies.
            if let Some(expected) = declared_by_parent {
                if !expected.contains_range(&node.range()) {
                    return Err(ArchiveError::index(
                        offset,
                        format!(
                            "node range [{}, {}) escapes parent's declaration [{}, {})",
                            node.range().start,
                            node.range().end,
                            expected.start,
                            expected.end
                        ),
                    ));
                }
            }

            match node {
                NodeRecord::Branch { children, .. } => {
                    // Reverse push keeps the ascending visit order
                    for child in children
                        .iter()
                        .rev()
                        .filter(|c| c.range.overlaps(range))
                    {
                        stack.push((child.node_offset, Some(child.range)));
                    }
                }
                NodeRecord::Leaf {
                    refs: leaf_refs, ..
                } => {
                    refs.extend(leaf_refs.into_iter().filter(|r| r.range.overlaps(range)));
                }
            }
        }

        Ok(refs)
    }
}
