//! Fixture archives for integration tests
//!
//! Writes complete on-disk archives (index artifact plus block files) with
//! known ground-truth samples, so tests can open them through the public
//! API. Layout mirrors what the crate's readers expect; corruption tests
//! flip bytes at the recorded placements afterwards.

#![allow(dead_code)]

use carchive::{FieldType, Sample, Time, TimeRange, Value};
use std::path::{Path, PathBuf};

/// Install a subscriber once so `RUST_LOG=carchive=debug cargo test` shows
/// engine logs
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Index header size (mirrors the reader)
const HEADER_SIZE: usize = 64;
/// Tree fan-out used by the fixture writer; small enough that a handful of
/// blocks already produces a branch level
const FAN: usize = 8;

/// One block's worth of samples for a fixture channel
pub struct BlockFixture {
    pub field_type: FieldType,
    pub element_count: u16,
    pub samples: Vec<Sample>,
    pub unit: String,
    pub status_dict: Vec<String>,
    /// Header range; derived from the samples when `None`
    pub declared: Option<TimeRange>,
}

impl BlockFixture {
    /// Scalar double block from (secs, value) pairs
    pub fn scalars(points: &[(i64, f64)]) -> Self {
        Self {
            field_type: FieldType::Double,
            element_count: 1,
            samples: points
                .iter()
                .map(|&(secs, v)| Sample::new(Time::from_secs(secs), Value::Double(v)))
                .collect(),
            unit: String::new(),
            status_dict: Vec::new(),
            declared: None,
        }
    }

    pub fn with_unit(mut self, unit: &str) -> Self {
        self.unit = unit.to_string();
        self
    }

    pub fn with_status_dict(mut self, dict: &[&str]) -> Self {
        self.status_dict = dict.iter().map(|s| s.to_string()).collect();
        self
    }

    fn range(&self) -> TimeRange {
        if let Some(declared) = self.declared {
            return declared;
        }
        let first = self.samples.first().map(|s| s.time).unwrap_or(Time::from_secs(0));
        let last = self.samples.last().map(|s| s.time).unwrap_or(Time::from_secs(0));
        TimeRange::new(first, last.next())
    }
}

struct ChannelFixture {
    name: String,
    unit: String,
    description: String,
    blocks: Vec<BlockFixture>,
}

/// A written fixture archive plus the placements tests need for surgery
pub struct FixtureArchive {
    pub index_path: PathBuf,
    pub data_path: PathBuf,
    /// (channel, offset, length) of every block region in the data file,
    /// in the order the blocks were added
    pub placements: Vec<(String, u64, u32)>,
    /// Offset of the first tree node in the index file
    pub node_region_start: u64,
}

impl FixtureArchive {
    /// Flip one byte inside the given block region of the data file
    pub fn corrupt_block(&self, placement_idx: usize, byte: u64) {
        let (_, offset, _) = self.placements[placement_idx];
        flip_byte(&self.data_path, offset + byte);
    }

    /// Flip one byte inside the index's node region
    pub fn corrupt_first_node(&self) {
        flip_byte(&self.index_path, self.node_region_start + 3);
    }
}

fn flip_byte(path: &Path, offset: u64) {
    let mut bytes = std::fs::read(path).unwrap();
    bytes[offset as usize] ^= 0xff;
    std::fs::write(path, bytes).unwrap();
}

/// Builds an archive under a directory
pub struct ArchiveBuilder {
    dir: PathBuf,
    channels: Vec<ChannelFixture>,
}

impl ArchiveBuilder {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            channels: Vec::new(),
        }
    }

    pub fn channel(
        &mut self,
        name: &str,
        unit: &str,
        description: &str,
        blocks: Vec<BlockFixture>,
    ) -> &mut Self {
        self.channels.push(ChannelFixture {
            name: name.to_string(),
            unit: unit.to_string(),
            description: description.to_string(),
            blocks,
        });
        self
    }

    /// Channel present in the catalog with no data behind it
    pub fn empty_channel(&mut self, name: &str) -> &mut Self {
        self.channel(name, "", "", Vec::new())
    }

    pub fn write(&self) -> FixtureArchive {
        let data_name = "data_0.cab";
        let mut data = Vec::new();
        let mut placements = Vec::new();
        // (channel idx) -> leaf refs (range, offset, length)
        let mut channel_refs: Vec<Vec<(TimeRange, u64, u32)>> = Vec::new();

        for channel in &self.channels {
            let mut refs = Vec::new();
            for block in &channel.blocks {
                let offset = data.len() as u64;
                let bytes = encode_block(&channel.name, block);
                let length = bytes.len() as u32;
                data.extend_from_slice(&bytes);
                placements.push((channel.name.clone(), offset, length));
                refs.push((block.range(), offset, length));
            }
            channel_refs.push(refs);
        }

        // File table
        let mut file_table = Vec::new();
        push_string(&mut file_table, data_name);
        let ft_crc = crc32fast::hash(&file_table);

        // Channel-table length is knowable before the roots are: the root
        // field is fixed width
        let ct_len: usize = self
            .channels
            .iter()
            .map(|c| 2 + c.name.len() + 2 + c.unit.len() + 2 + c.description.len() + 8)
            .sum();

        let node_base = (HEADER_SIZE + file_table.len() + 4 + ct_len + 4) as u64;
        let mut nodes = Vec::new();
        let mut roots = Vec::new();
        for refs in &channel_refs {
            roots.push(build_tree(&mut nodes, node_base, refs));
        }

        // Channel table with resolved roots
        let mut channel_table = Vec::new();
        for (channel, root) in self.channels.iter().zip(&roots) {
            push_string(&mut channel_table, &channel.name);
            push_string(&mut channel_table, &channel.unit);
            push_string(&mut channel_table, &channel.description);
            channel_table.extend_from_slice(&root.to_le_bytes());
        }
        assert_eq!(channel_table.len(), ct_len);
        let ct_crc = crc32fast::hash(&channel_table);

        let mut header = [0u8; HEADER_SIZE];
        header[0..4].copy_from_slice(b"CAIX");
        header[4..6].copy_from_slice(&1u16.to_le_bytes());
        header[6..10].copy_from_slice(&(self.channels.len() as u32).to_le_bytes());
        header[10..14].copy_from_slice(&1u32.to_le_bytes());
        header[14..22].copy_from_slice(&(HEADER_SIZE as u64).to_le_bytes());
        let ct_offset = (HEADER_SIZE + file_table.len() + 4) as u64;
        header[22..30].copy_from_slice(&ct_offset.to_le_bytes());
        let crc = crc32fast::hash(&header[..60]);
        header[60..64].copy_from_slice(&crc.to_le_bytes());

        let mut index = Vec::new();
        index.extend_from_slice(&header);
        index.extend_from_slice(&file_table);
        index.extend_from_slice(&ft_crc.to_le_bytes());
        index.extend_from_slice(&channel_table);
        index.extend_from_slice(&ct_crc.to_le_bytes());
        assert_eq!(index.len() as u64, node_base);
        index.extend_from_slice(&nodes);

        std::fs::create_dir_all(&self.dir).unwrap();
        let index_path = self.dir.join("index.cai");
        let data_path = self.dir.join(data_name);
        std::fs::write(&index_path, index).unwrap();
        std::fs::write(&data_path, data).unwrap();

        FixtureArchive {
            index_path,
            data_path,
            placements,
            node_region_start: node_base,
        }
    }
}

/// Build one channel's tree bottom-up; returns the root offset (0 = empty)
fn build_tree(nodes: &mut Vec<u8>, base: u64, refs: &[(TimeRange, u64, u32)]) -> u64 {
    if refs.is_empty() {
        return 0;
    }

    // Leaf level
    let mut level: Vec<(TimeRange, u64)> = Vec::new();
    for chunk in refs.chunks(FAN) {
        let range = span(chunk.iter().map(|(r, _, _)| *r));
        let offset = base + nodes.len() as u64;
        nodes.push(0u8);
        nodes.extend_from_slice(&(chunk.len() as u16).to_le_bytes());
        push_range(nodes, range);
        for (r, block_offset, length) in chunk {
            push_range(nodes, *r);
            nodes.extend_from_slice(&0u32.to_le_bytes()); // file_id
            nodes.extend_from_slice(&block_offset.to_le_bytes());
            nodes.extend_from_slice(&length.to_le_bytes());
        }
        let crc = crc32fast::hash(&nodes[(offset - base) as usize..]);
        nodes.extend_from_slice(&crc.to_le_bytes());
        level.push((range, offset));
    }

    // Branch levels until a single root remains
    while level.len() > 1 {
        let mut next = Vec::new();
        for chunk in level.chunks(FAN) {
            let range = span(chunk.iter().map(|(r, _)| *r));
            let offset = base + nodes.len() as u64;
            nodes.push(1u8);
            nodes.extend_from_slice(&(chunk.len() as u16).to_le_bytes());
            push_range(nodes, range);
            for (r, child_offset) in chunk {
                push_range(nodes, *r);
                nodes.extend_from_slice(&child_offset.to_le_bytes());
            }
            let crc = crc32fast::hash(&nodes[(offset - base) as usize..]);
            nodes.extend_from_slice(&crc.to_le_bytes());
            next.push((range, offset));
        }
        level = next;
    }

    level[0].1
}

fn span(mut ranges: impl Iterator<Item = TimeRange>) -> TimeRange {
    let first = ranges.next().expect("chunk is never empty");
    ranges.fold(first, |acc, r| {
        TimeRange::new(acc.start.min(r.start), acc.end.max(r.end))
    })
}

fn encode_block(name: &str, block: &BlockFixture) -> Vec<u8> {
    let declared = block.range();
    let mut buf = Vec::new();
    buf.extend_from_slice(b"CABL");
    buf.extend_from_slice(&1u16.to_le_bytes());
    push_string(&mut buf, name);
    buf.push(block.field_type as u8);
    buf.extend_from_slice(&block.element_count.to_le_bytes());
    buf.extend_from_slice(&(block.samples.len() as u32).to_le_bytes());
    push_time(&mut buf, declared.start);
    push_time(&mut buf, declared.end);
    push_string(&mut buf, &block.unit);
    buf.extend_from_slice(&(block.status_dict.len() as u16).to_le_bytes());
    for s in &block.status_dict {
        push_string(&mut buf, s);
    }
    let crc = crc32fast::hash(&buf);
    buf.extend_from_slice(&crc.to_le_bytes());

    for sample in &block.samples {
        push_time(&mut buf, sample.time);
        buf.extend_from_slice(&sample.status.to_le_bytes());
        buf.extend_from_slice(&sample.severity.to_le_bytes());
        match &sample.value {
            Value::Double(v) => buf.extend_from_slice(&v.to_le_bytes()),
            Value::DoubleArray(vs) => {
                for v in vs {
                    buf.extend_from_slice(&v.to_le_bytes());
                }
            }
            Value::Int(v) => buf.extend_from_slice(&v.to_le_bytes()),
            Value::IntArray(vs) => {
                for v in vs {
                    buf.extend_from_slice(&v.to_le_bytes());
                }
            }
            Value::Enum(v) => buf.extend_from_slice(&v.to_le_bytes()),
            Value::Str(v) => {
                let mut cell = [0u8; 40];
                cell[..v.len()].copy_from_slice(v.as_bytes());
                buf.extend_from_slice(&cell);
            }
        }
    }
    buf
}

fn push_string(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u16).to_le_bytes());
    buf.extend_from_slice(s.as_bytes());
}

fn push_time(buf: &mut Vec<u8>, t: Time) {
    buf.extend_from_slice(&t.secs.to_le_bytes());
    buf.extend_from_slice(&t.nanos.to_le_bytes());
}

fn push_range(buf: &mut Vec<u8>, r: TimeRange) {
    push_time(buf, r.start);
    push_time(buf, r.end);
}
