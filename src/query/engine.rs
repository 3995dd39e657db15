//! Query engine
//!
//! Resolves a batch of channel names against one opened catalog, walks each
//! channel's interval tree, decodes the overlapping blocks, and returns
//! per-channel results in request order.
//!
//! # Execution pipeline
//!
//! ```text
//! names → resolve → tree query → block read → decode → clip → collate
//! ```
//!
//! Failure isolation is the contract: a missing channel, a corrupt node, or
//! a corrupt block degrades that channel's entry (keeping any samples
//! decoded before the fault) and never disturbs its siblings. Only an
//! unopenable catalog or an invalid pattern stops a query before it starts,
//! and both of those are surfaced by [`Catalog`](crate::index::Catalog)
//! rather than here.

use crate::config::EngineConfig;
use crate::error::ArchiveError;
use crate::index::Catalog;
use crate::query::options::QueryOptions;
use crate::query::pool::FilePool;
use crate::storage::codec;
use crate::storage::types::{Sample, Time, TimeRange};
use futures_util::future::join_all;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;

/// Source metadata attached when `include_info` is set
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceInfo {
    /// Index artifact the data came from
    pub archive: PathBuf,
    /// Channel description from the catalog
    pub description: Option<String>,
    /// Blocks decoded for this result
    pub blocks_read: u64,
    /// Archiver bookkeeping records (disconnect, archive off) dropped
    pub info_samples_dropped: u64,
}

/// Result for one requested channel: a sample sequence, optionally degraded
/// by a per-channel error. A degraded result keeps everything decoded
/// before the fault.
#[derive(Debug)]
pub struct ChannelResult {
    /// The requested channel name
    pub channel: String,
    /// Samples inside `[start, end)`, strictly time-ordered
    pub samples: Vec<Sample>,
    /// Unit label (`include_units`); block header wins over the catalog
    pub unit: Option<String>,
    /// Status/enum-state dictionary (`include_status`)
    pub status_labels: Option<Vec<String>>,
    /// Source metadata (`include_info`)
    pub info: Option<SourceInfo>,
    /// Why the result is incomplete, when it is
    pub error: Option<ArchiveError>,
}

impl ChannelResult {
    fn new(channel: String) -> Self {
        Self {
            channel,
            samples: Vec::new(),
            unit: None,
            status_labels: None,
            info: None,
            error: None,
        }
    }

    /// No fault was recorded for this channel
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    /// A fault was recorded but some samples survived
    pub fn is_partial(&self) -> bool {
        self.error.is_some() && !self.samples.is_empty()
    }
}

/// The query engine: shared catalog, pooled block-file handles, bounded
/// per-query channel fan-out. Safe to share across tasks; all state is
/// read-only or internally synchronized.
pub struct QueryEngine {
    catalog: Arc<Catalog>,
    pool: Arc<FilePool>,
    channel_slots: Arc<Semaphore>,
    config: EngineConfig,
}

impl QueryEngine {
    /// Engine with default configuration
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self::with_config(catalog, EngineConfig::default())
    }

    pub fn with_config(catalog: Arc<Catalog>, config: EngineConfig) -> Self {
        Self {
            catalog,
            pool: Arc::new(FilePool::new(config.max_open_files)),
            channel_slots: Arc::new(Semaphore::new(config.channel_parallelism.max(1))),
            config,
        }
    }

    /// The catalog this engine queries
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    /// Fetch samples in `[start, end)` for each named channel.
    ///
    /// `end` defaults to "now", captured once so every channel in the batch
    /// shares an identical upper bound. Results come back in request order;
    /// channels are processed concurrently up to the configured fan-out.
    pub async fn get_data(
        &self,
        channels: &[String],
        start: Time,
        end: Option<Time>,
        options: &QueryOptions,
    ) -> Vec<ChannelResult> {
        let end = end.unwrap_or_else(Time::now);
        // start >= end is a legal degenerate query: every channel is empty
        let range = TimeRange::try_new(start, end);

        let deadline = options
            .deadline
            .or_else(|| self.config.default_deadline())
            .map(|d| Instant::now() + d);

        let tasks: Vec<_> = channels
            .iter()
            .map(|name| {
                let catalog = Arc::clone(&self.catalog);
                let pool = Arc::clone(&self.pool);
                let slots = Arc::clone(&self.channel_slots);
                let name = name.clone();
                let options = options.clone();
                tokio::spawn(async move {
                    let _slot = slots.acquire().await.ok();
                    query_channel(catalog, pool, name, range, options, deadline).await
                })
            })
            .collect();

        // join_all preserves task order, which is request order
        join_all(tasks)
            .await
            .into_iter()
            .zip(channels)
            .map(|(joined, name)| {
                joined.unwrap_or_else(|e| {
                    let mut result = ChannelResult::new(name.clone());
                    result.error = Some(ArchiveError::Io(std::io::Error::other(format!(
                        "channel task failed: {}",
                        e
                    ))));
                    result
                })
            })
            .collect()
    }
}

/// Fetch one channel. Every fault is recorded on the result and the partial
/// samples collected so far are kept.
async fn query_channel(
    catalog: Arc<Catalog>,
    pool: Arc<FilePool>,
    name: String,
    range: Option<TimeRange>,
    options: QueryOptions,
    deadline: Option<Instant>,
) -> ChannelResult {
    let mut result = ChannelResult::new(name.clone());

    let entry = match catalog.resolve(&name) {
        Ok(entry) => entry,
        Err(e) => {
            tracing::warn!(channel = %name, error = %e, "channel resolution failed");
            result.error = Some(e);
            return result;
        }
    };

    if options.include_units {
        result.unit = entry.unit.clone();
    }
    let mut blocks_read = 0u64;
    let mut info_dropped = 0u64;

    let range = match range {
        Some(range) => range,
        None => {
            finish(&mut result, &catalog, entry, &options, blocks_read, info_dropped);
            return result;
        }
    };

    let refs = match catalog.rtree(entry).query(&range) {
        Ok(refs) => refs,
        Err(e) => {
            tracing::warn!(channel = %name, error = %e, "index traversal failed");
            result.error = Some(e);
            finish(&mut result, &catalog, entry, &options, blocks_read, info_dropped);
            return result;
        }
    };

    let mut collected: Vec<Sample> = Vec::new();
    for block_ref in refs {
        if let Some(dl) = deadline {
            if Instant::now() >= dl {
                tracing::warn!(channel = %name, "deadline exceeded, returning partial data");
                result.error = Some(ArchiveError::DeadlineExceeded);
                break;
            }
        }

        let read = match catalog.block_file(block_ref.file_id) {
            Ok(path) => pool.read(path, block_ref.offset, block_ref.length).await,
            Err(e) => Err(e),
        };
        let bytes = match read {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(channel = %name, error = %e, "block read failed");
                result.error = Some(e);
                break;
            }
        };

        let block = match codec::decode_block(&bytes, Some(&name)) {
            Ok(block) => block,
            Err(e) => {
                tracing::warn!(channel = %name, error = %e, "block decode failed");
                result.error = Some(e);
                break;
            }
        };

        // The index promised this region covers block_ref.range; a header
        // declaring anything outside it means one of the two is corrupt.
        if !block_ref.range.contains_range(&block.declared) {
            result.error = Some(ArchiveError::block(
                block_ref.offset as usize,
                "block's declared range disagrees with its index entry",
            ));
            break;
        }

        if options.include_units && !block.unit.is_empty() {
            result.unit = Some(block.unit.clone());
        }
        if options.include_status
            && result.status_labels.is_none()
            && !block.status_dict.is_empty()
        {
            result.status_labels = Some(block.status_dict.clone());
        }

        for sample in block.samples {
            if sample.is_info() {
                info_dropped += 1;
                continue;
            }
            if range.contains(sample.time) {
                collected.push(sample);
            }
        }
        blocks_read += 1;
    }

    result.samples = collate(collected);
    finish(&mut result, &catalog, entry, &options, blocks_read, info_dropped);
    result
}

fn finish(
    result: &mut ChannelResult,
    catalog: &Catalog,
    entry: &crate::index::ChannelEntry,
    options: &QueryOptions,
    blocks_read: u64,
    info_samples_dropped: u64,
) {
    if options.include_info {
        result.info = Some(SourceInfo {
            archive: catalog.path().to_path_buf(),
            description: entry.description.clone(),
            blocks_read,
            info_samples_dropped,
        });
    }
}

/// Sort samples into time order and collapse duplicate timestamps.
///
/// The sort is stable, so samples from a later block stay behind samples
/// from an earlier one at the same instant; keeping the last of each run
/// implements last-write-wins for overlapping rebuilds and collapses exact
/// re-reads to a single copy.
pub(crate) fn collate(mut samples: Vec<Sample>) -> Vec<Sample> {
    samples.sort_by_key(|s| s.time);
    let mut collated: Vec<Sample> = Vec::with_capacity(samples.len());
    for sample in samples {
        if let Some(last) = collated.last_mut() {
            if last.time == sample.time {
                *last = sample;
                continue;
            }
        }
        collated.push(sample);
    }
    collated
}
