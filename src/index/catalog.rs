//! Channel catalog
//!
//! The opened handle over one archive: a memory-mapped index artifact plus
//! the channel and data-file tables parsed out of it at open time. The
//! catalog is immutable after `open`, so any number of threads can resolve
//! channels and traverse trees against one `Arc<Catalog>` without locking.
//!
//! `open` either yields a fully usable catalog or fails with
//! `ArchiveUnavailable`; there is no half-opened state for later calls to
//! trip over.

use crate::error::{ArchiveError, ArchiveResult};
use crate::index::format::{self, ChannelRecord, NO_ROOT};
use crate::index::rtree::RTreeReader;
use memmap2::Mmap;
use std::collections::HashMap;
use std::fs::File;
use std::path::{Path, PathBuf};

/// One cataloged channel
#[derive(Debug, Clone)]
pub struct ChannelEntry {
    /// Unique channel name
    pub name: String,
    /// Unit label from the channel table; block headers may override it
    pub unit: Option<String>,
    /// Free-form description
    pub description: Option<String>,
    /// Tree root offset; `NO_ROOT` for a channel with no data
    root_offset: u64,
}

impl ChannelEntry {
    fn from_record(record: ChannelRecord) -> Self {
        Self {
            name: record.name,
            unit: (!record.unit.is_empty()).then_some(record.unit),
            description: (!record.description.is_empty()).then_some(record.description),
            root_offset: record.root_offset,
        }
    }

    /// Channel is cataloged but holds no samples
    pub fn is_empty(&self) -> bool {
        self.root_offset == NO_ROOT
    }
}

/// An opened archive catalog
pub struct Catalog {
    path: PathBuf,
    /// Directory the data-file table paths are relative to
    dir: PathBuf,
    mmap: Mmap,
    channels: Vec<ChannelEntry>,
    by_name: HashMap<String, usize>,
    files: Vec<PathBuf>,
}

impl Catalog {
    /// Open an index artifact. Fails with `ArchiveUnavailable` when the path
    /// is missing or unreadable, or the header/tables are incompatible.
    pub fn open(path: impl AsRef<Path>) -> ArchiveResult<Self> {
        let path = path.as_ref().to_path_buf();
        let unavailable = |reason: String| ArchiveError::ArchiveUnavailable {
            path: path.clone(),
            reason,
        };

        let file = File::open(&path).map_err(|e| unavailable(e.to_string()))?;
        // Safety: the artifact is opened read-only and treated as immutable
        // for the catalog's lifetime; every parse is bounds-checked.
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| unavailable(e.to_string()))?;

        let header = format::parse_header(&mmap).map_err(&unavailable)?;
        let file_names = format::parse_file_table(&mmap, &header).map_err(&unavailable)?;
        let records = format::parse_channel_table(&mmap, &header).map_err(&unavailable)?;

        let dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let files = file_names.iter().map(|name| dir.join(name)).collect();

        let mut channels = Vec::with_capacity(records.len());
        let mut by_name = HashMap::with_capacity(records.len());
        for record in records {
            if by_name.contains_key(&record.name) {
                return Err(unavailable(format!(
                    "duplicate channel name '{}'",
                    record.name
                )));
            }
            by_name.insert(record.name.clone(), channels.len());
            channels.push(ChannelEntry::from_record(record));
        }

        tracing::info!(
            path = %path.display(),
            channels = channels.len(),
            data_files = file_names.len(),
            "opened archive index"
        );

        Ok(Self {
            path,
            dir,
            mmap,
            channels,
            by_name,
            files,
        })
    }

    /// Path of the index artifact this catalog was opened from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up a channel by exact name
    pub fn resolve(&self, name: &str) -> ArchiveResult<&ChannelEntry> {
        self.by_name
            .get(name)
            .map(|&i| &self.channels[i])
            .ok_or_else(|| ArchiveError::ChannelNotFound(name.to_string()))
    }

    /// List channel names matching `pattern` (a regular expression searched
    /// against the full name), sorted. `None` lists every channel.
    pub fn list(&self, pattern: Option<&str>) -> ArchiveResult<Vec<String>> {
        let regex = match pattern {
            Some(p) => Some(regex::Regex::new(p).map_err(|e| ArchiveError::InvalidPattern {
                pattern: p.to_string(),
                reason: e.to_string(),
            })?),
            None => None,
        };

        let mut names: Vec<String> = self
            .channels
            .iter()
            .filter(|c| regex.as_ref().map(|r| r.is_match(&c.name)).unwrap_or(true))
            .map(|c| c.name.clone())
            .collect();
        names.sort();
        Ok(names)
    }

    /// All cataloged channels, table order
    pub fn channels(&self) -> &[ChannelEntry] {
        &self.channels
    }

    /// Interval-tree view for a resolved channel
    pub fn rtree(&self, entry: &ChannelEntry) -> RTreeReader<'_> {
        RTreeReader::new(&self.mmap, entry.root_offset)
    }

    /// Absolute path of a block file by id from the file table
    pub fn block_file(&self, file_id: u32) -> ArchiveResult<&Path> {
        self.files
            .get(file_id as usize)
            .map(PathBuf::as_path)
            .ok_or_else(|| {
                ArchiveError::block(0, format!("file id {} outside data-file table", file_id))
            })
    }

    /// Directory containing the index and its block files
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("path", &self.path)
            .field("channels", &self.channels.len())
            .field("files", &self.files.len())
            .finish()
    }
}
