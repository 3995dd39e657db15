//! Index artifact layout
//!
//! A single read-only file addressing every channel's interval tree:
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ HEADER (64 bytes)                           │
//! │   magic: [u8; 4] = "CAIX"                   │
//! │   version: u16                              │
//! │   channel_count: u32                        │
//! │   file_count: u32                           │
//! │   file_table_offset: u64                    │
//! │   channel_table_offset: u64                 │
//! │   reserved: [u8; 30]                        │
//! │   checksum: u32                             │
//! ├─────────────────────────────────────────────┤
//! │ FILE TABLE                                  │
//! │   file_count × (u16 len + path bytes)       │
//! │   table_crc: u32                            │
//! ├─────────────────────────────────────────────┤
//! │ CHANNEL TABLE                               │
//! │   channel_count × (name, unit, description, │
//! │                    root_offset: u64)        │
//! │   table_crc: u32                            │
//! ├─────────────────────────────────────────────┤
//! │ NODE RECORDS (addressed by offset)          │
//! │   kind: u8 (0 = leaf, 1 = branch)           │
//! │   child_count: u16                          │
//! │   start, end: (i64 secs, u32 nanos) each    │
//! │   children (branch: range + node offset;    │
//! │             leaf: range + file/offset/len)  │
//! │   node_crc: u32                             │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! Header/table failures surface at catalog open; node failures surface as
//! `IndexCorrupt` during a single channel's traversal.

use crate::error::{ArchiveError, ArchiveResult};
use crate::storage::types::{BlockRef, Time, TimeRange};

/// Magic bytes identifying an index artifact
pub const INDEX_MAGIC: [u8; 4] = *b"CAIX";

/// Current index format version
pub const INDEX_VERSION: u16 = 1;

/// Index header size in bytes
pub const HEADER_SIZE: usize = 64;

/// Maximum children per tree node; bounds height and guards against
/// runaway counts from corrupt records
pub const MAX_FANOUT: usize = 64;

/// A root offset of zero marks a channel with no data
pub const NO_ROOT: u64 = 0;

/// Parsed index header
#[derive(Debug, Clone)]
pub struct IndexHeader {
    pub version: u16,
    pub channel_count: u32,
    pub file_count: u32,
    pub file_table_offset: u64,
    pub channel_table_offset: u64,
}

/// One channel-table entry
#[derive(Debug, Clone)]
pub struct ChannelRecord {
    pub name: String,
    pub unit: String,
    pub description: String,
    /// Offset of the channel's tree root; [`NO_ROOT`] when empty
    pub root_offset: u64,
}

/// A branch child: declared range plus the child node's offset
#[derive(Debug, Clone, Copy)]
pub struct BranchChild {
    pub range: TimeRange,
    pub node_offset: u64,
}

/// One parsed tree node
#[derive(Debug, Clone)]
pub enum NodeRecord {
    Branch {
        range: TimeRange,
        children: Vec<BranchChild>,
    },
    Leaf {
        range: TimeRange,
        refs: Vec<BlockRef>,
    },
}

impl NodeRecord {
    pub fn range(&self) -> TimeRange {
        match self {
            NodeRecord::Branch { range, .. } => *range,
            NodeRecord::Leaf { range, .. } => *range,
        }
    }
}

/// Minimal bounds-checked reader; callers map the plain-string failure into
/// the error kind appropriate for their layer.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn at(buf: &'a [u8], pos: usize) -> Result<Self, String> {
        if pos > buf.len() {
            return Err(format!("offset {} outside index data", pos));
        }
        Ok(Self { buf, pos })
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], String> {
        if self.buf.len() - self.pos < n {
            return Err(format!("unexpected end of index data at offset {}", self.pos));
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8, String> {
        Ok(self.take(1)?[0])
    }

    fn read_u16(&mut self) -> Result<u16, String> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn read_u32(&mut self) -> Result<u32, String> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_u64(&mut self) -> Result<u64, String> {
        let b = self.take(8)?;
        Ok(u64::from_le_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    fn read_i64(&mut self) -> Result<i64, String> {
        Ok(self.read_u64()? as i64)
    }

    fn read_time(&mut self) -> Result<Time, String> {
        let secs = self.read_i64()?;
        let nanos = self.read_u32()?;
        if nanos >= 1_000_000_000 {
            return Err(format!("nanoseconds out of range: {}", nanos));
        }
        Ok(Time { secs, nanos })
    }

    fn read_range(&mut self) -> Result<TimeRange, String> {
        let start = self.read_time()?;
        let end = self.read_time()?;
        TimeRange::try_new(start, end).ok_or_else(|| "empty time range".to_string())
    }

    fn read_string(&mut self) -> Result<String, String> {
        let len = self.read_u16()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| "invalid UTF-8 in index string".to_string())
    }
}

/// Parse and verify the 64-byte index header
pub fn parse_header(buf: &[u8]) -> Result<IndexHeader, String> {
    if buf.len() < HEADER_SIZE {
        return Err(format!("file too short for header: {} bytes", buf.len()));
    }
    let stored_crc = u32::from_le_bytes([buf[60], buf[61], buf[62], buf[63]]);
    let computed_crc = crc32fast::hash(&buf[..60]);
    if stored_crc != computed_crc {
        return Err("header checksum mismatch".to_string());
    }
    if buf[0..4] != INDEX_MAGIC {
        return Err("bad index magic".to_string());
    }
    let version = u16::from_le_bytes([buf[4], buf[5]]);
    if version != INDEX_VERSION {
        return Err(format!("unsupported index version: {}", version));
    }
    let channel_count = u32::from_le_bytes([buf[6], buf[7], buf[8], buf[9]]);
    let file_count = u32::from_le_bytes([buf[10], buf[11], buf[12], buf[13]]);
    let file_table_offset = u64::from_le_bytes([
        buf[14], buf[15], buf[16], buf[17], buf[18], buf[19], buf[20], buf[21],
    ]);
    let channel_table_offset = u64::from_le_bytes([
        buf[22], buf[23], buf[24], buf[25], buf[26], buf[27], buf[28], buf[29],
    ]);

    Ok(IndexHeader {
        version,
        channel_count,
        file_count,
        file_table_offset,
        channel_table_offset,
    })
}

/// Parse the data-file table; entry order defines each block's `file_id`
pub fn parse_file_table(buf: &[u8], header: &IndexHeader) -> Result<Vec<String>, String> {
    let start = header.file_table_offset as usize;
    let mut r = Reader::at(buf, start)?;
    // The count is header-declared; cap the reserve so a corrupt value
    // cannot force a huge allocation before the reads run out of data
    let mut files = Vec::with_capacity((header.file_count as usize).min(1024));
    for _ in 0..header.file_count {
        files.push(r.read_string()?);
    }
    let table_end = r.pos;
    let stored_crc = r.read_u32()?;
    let computed_crc = crc32fast::hash(&buf[start..table_end]);
    if stored_crc != computed_crc {
        return Err("file table checksum mismatch".to_string());
    }
    Ok(files)
}

/// Parse the channel table
pub fn parse_channel_table(buf: &[u8], header: &IndexHeader) -> Result<Vec<ChannelRecord>, String> {
    let start = header.channel_table_offset as usize;
    let mut r = Reader::at(buf, start)?;
    let mut channels = Vec::with_capacity((header.channel_count as usize).min(4096));
    for _ in 0..header.channel_count {
        let name = r.read_string()?;
        let unit = r.read_string()?;
        let description = r.read_string()?;
        let root_offset = r.read_u64()?;
        if name.is_empty() {
            return Err("empty channel name".to_string());
        }
        if root_offset != NO_ROOT && root_offset as usize >= buf.len() {
            return Err(format!(
                "channel '{}' root offset {} outside index data",
                name, root_offset
            ));
        }
        channels.push(ChannelRecord {
            name,
            unit,
            description,
            root_offset,
        });
    }
    let table_end = r.pos;
    let stored_crc = r.read_u32()?;
    let computed_crc = crc32fast::hash(&buf[start..table_end]);
    if stored_crc != computed_crc {
        return Err("channel table checksum mismatch".to_string());
    }
    Ok(channels)
}

/// Parse one tree node at `offset`, verifying its checksum, fan-out bound,
/// and child ordering/containment against the node's own declared range.
pub fn parse_node(buf: &[u8], offset: u64) -> ArchiveResult<NodeRecord> {
    let corrupt = |reason: String| ArchiveError::index(offset, reason);

    let mut r = Reader::at(buf, offset as usize).map_err(|e| corrupt(e))?;
    let kind = r.read_u8().map_err(&corrupt)?;
    let child_count = r.read_u16().map_err(&corrupt)? as usize;
    if child_count > MAX_FANOUT {
        return Err(corrupt(format!("fan-out {} exceeds limit", child_count)));
    }
    let range = r.read_range().map_err(&corrupt)?;

    let node = match kind {
        0 => {
            let mut refs = Vec::with_capacity(child_count);
            for _ in 0..child_count {
                let child_range = r.read_range().map_err(&corrupt)?;
                let file_id = r.read_u32().map_err(&corrupt)?;
                let block_offset = r.read_u64().map_err(&corrupt)?;
                let length = r.read_u32().map_err(&corrupt)?;
                refs.push(BlockRef {
                    file_id,
                    offset: block_offset,
                    length,
                    range: child_range,
                });
            }
            validate_children(&range, refs.iter().map(|c| c.range)).map_err(&corrupt)?;
            NodeRecord::Leaf { range, refs }
        }
        1 => {
            let mut children = Vec::with_capacity(child_count);
            for _ in 0..child_count {
                let child_range = r.read_range().map_err(&corrupt)?;
                let node_offset = r.read_u64().map_err(&corrupt)?;
                if node_offset as usize >= buf.len() {
                    return Err(corrupt(format!(
                        "child node offset {} outside index data",
                        node_offset
                    )));
                }
                children.push(BranchChild {
                    range: child_range,
                    node_offset,
                });
            }
            validate_children(&range, children.iter().map(|c| c.range)).map_err(&corrupt)?;
            NodeRecord::Branch { range, children }
        }
        other => return Err(corrupt(format!("unknown node kind: {}", other))),
    };

    let record_end = r.pos;
    let stored_crc = r.read_u32().map_err(&corrupt)?;
    let computed_crc = crc32fast::hash(&buf[offset as usize..record_end]);
    if stored_crc != computed_crc {
        return Err(corrupt("node checksum mismatch".to_string()));
    }

    Ok(node)
}

/// Children must be ordered, pairwise disjoint, and inside the parent range
fn validate_children(
    parent: &TimeRange,
    ranges: impl Iterator<Item = TimeRange>,
) -> Result<(), String> {
    let mut prev_end: Option<Time> = None;
    for range in ranges {
        if !parent.contains_range(&range) {
            return Err(format!(
                "child range [{}, {}) escapes parent [{}, {})",
                range.start, range.end, parent.start, parent.end
            ));
        }
        if let Some(prev) = prev_end {
            if range.start < prev {
                return Err("child ranges out of order or overlapping".to_string());
            }
        }
        prev_end = Some(range.end);
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::testenc::*;
    use super::*;

    fn secs_range(start: i64, end: i64) -> TimeRange {
        TimeRange::new(Time::from_secs(start), Time::from_secs(end))
    }

    fn block_ref(start: i64, end: i64, offset: u64) -> BlockRef {
        BlockRef {
            file_id: 0,
            offset,
            length: 128,
            range: secs_range(start, end),
        }
    }

    #[test]
    fn test_leaf_roundtrip() {
        let mut buf = vec![0u8; 16]; // nodes never live at offset 0
        let refs = vec![block_ref(0, 10, 0), block_ref(10, 20, 128)];
        let offset = push_leaf(&mut buf, secs_range(0, 20), &refs);

        match parse_node(&buf, offset).unwrap() {
            NodeRecord::Leaf { range, refs: parsed } => {
                assert_eq!(range, secs_range(0, 20));
                assert_eq!(parsed, refs);
            }
            other => panic!("expected leaf, got {:?}", other),
        }
    }

    #[test]
    fn test_branch_roundtrip() {
        let mut buf = vec![0u8; 16];
        let leaf = push_leaf(&mut buf, secs_range(0, 10), &[block_ref(0, 10, 0)]);
        let children = vec![BranchChild {
            range: secs_range(0, 10),
            node_offset: leaf,
        }];
        let offset = push_branch(&mut buf, secs_range(0, 10), &children);

        match parse_node(&buf, offset).unwrap() {
            NodeRecord::Branch { range, children } => {
                assert_eq!(range, secs_range(0, 10));
                assert_eq!(children.len(), 1);
                assert_eq!(children[0].node_offset, leaf);
            }
            other => panic!("expected branch, got {:?}", other),
        }
    }

    #[test]
    fn test_node_crc_detects_flip() {
        let mut buf = vec![0u8; 16];
        let offset = push_leaf(&mut buf, secs_range(0, 10), &[block_ref(0, 10, 0)]);
        buf[offset as usize + 5] ^= 0xff;
        let err = parse_node(&buf, offset).unwrap_err();
        assert!(matches!(err, ArchiveError::IndexCorrupt { .. }));
    }

    #[test]
    fn test_child_escaping_parent_rejected() {
        let mut buf = vec![0u8; 16];
        // child [5, 25) escapes parent [0, 20)
        let offset = push_leaf(&mut buf, secs_range(0, 20), &[block_ref(5, 25, 0)]);
        let err = parse_node(&buf, offset).unwrap_err();
        match err {
            ArchiveError::IndexCorrupt { node_offset, reason } => {
                assert_eq!(node_offset, offset);
                assert!(reason.contains("escapes parent"), "got: {}", reason);
            }
            other => panic!("expected IndexCorrupt, got {:?}", other),
        }
    }

    #[test]
    fn test_overlapping_children_rejected() {
        let mut buf = vec![0u8; 16];
        let offset = push_leaf(
            &mut buf,
            secs_range(0, 30),
            &[block_ref(0, 15, 0), block_ref(10, 30, 128)],
        );
        let err = parse_node(&buf, offset).unwrap_err();
        assert!(matches!(err, ArchiveError::IndexCorrupt { .. }));
    }

    #[test]
    fn test_absurd_table_counts_fail_without_reserving() {
        // A corrupt header can declare billions of entries; parsing must run
        // out of data cleanly instead of allocating for the declared count
        let header = IndexHeader {
            version: INDEX_VERSION,
            channel_count: u32::MAX,
            file_count: u32::MAX,
            file_table_offset: HEADER_SIZE as u64,
            channel_table_offset: HEADER_SIZE as u64,
        };
        let buf = vec![0u8; HEADER_SIZE + 32];
        assert!(parse_file_table(&buf, &header).is_err());
        assert!(parse_channel_table(&buf, &header).is_err());
    }

    #[test]
    fn test_node_offset_outside_data() {
        let buf = vec![0u8; 16];
        let err = parse_node(&buf, 4096).unwrap_err();
        assert!(matches!(err, ArchiveError::IndexCorrupt { .. }));
    }

    #[test]
    fn test_unknown_node_kind() {
        let mut buf = vec![0u8; 16];
        let offset = push_leaf(&mut buf, secs_range(0, 10), &[]);
        buf[offset as usize] = 7;
        // Fix the crc so only the kind byte is wrong
        let end = buf.len() - 4;
        let crc = crc32fast::hash(&buf[offset as usize..end]);
        let crc_pos = end;
        buf[crc_pos..].copy_from_slice(&crc.to_le_bytes());
        let err = parse_node(&buf, offset).unwrap_err();
        match err {
            ArchiveError::IndexCorrupt { reason, .. } => {
                assert!(reason.contains("unknown node kind"), "got: {}", reason)
            }
            other => panic!("expected IndexCorrupt, got {:?}", other),
        }
    }
}
