//! Block-file handle pool
//!
//! Block reads go through a shared pool that caches open handles across
//! queries and bounds how many reads are in flight at once. Hitting the
//! bound queues the request behind a semaphore instead of failing, which
//! keeps a wide fan-out from exhausting the host's descriptor limit.
//!
//! Reads are positional (`read_exact_at`), so one shared handle serves any
//! number of concurrent readers without a seek cursor to protect; the cache
//! mutex only guards the map and is never held across an open or a read.
//! The read itself runs on the blocking pool, keeping syscalls off the
//! async worker threads.

use crate::error::{ArchiveError, ArchiveResult};
use std::collections::HashMap;
use std::fs::File;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;

/// Bounded pool of open block-file handles
pub struct FilePool {
    permits: Semaphore,
    handles: Mutex<HashMap<PathBuf, Arc<File>>>,
    capacity: usize,
}

impl FilePool {
    /// Pool allowing at most `capacity` reads in flight concurrently
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            permits: Semaphore::new(capacity),
            handles: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    /// Read `length` bytes at `offset` from `path`, waiting for a pool slot
    /// if every one is busy. A region running past the end of the file
    /// reports `BlockCorrupt`: the index pointed at bytes that don't exist.
    pub async fn read(&self, path: &Path, offset: u64, length: u32) -> ArchiveResult<Vec<u8>> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| other_io("file pool closed"))?;

        let file = self.handle_for(path)?;
        tokio::task::spawn_blocking(move || {
            let mut buf = vec![0u8; length as usize];
            file.read_exact_at(&mut buf, offset)?;
            Ok(buf)
        })
        .await
        .map_err(|e| other_io(&format!("block read task failed: {}", e)))?
        .map_err(|e: std::io::Error| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                ArchiveError::block(
                    offset as usize,
                    format!("block region of {} bytes extends past end of file", length),
                )
            } else {
                ArchiveError::Io(e)
            }
        })
    }

    fn handle_for(&self, path: &Path) -> ArchiveResult<Arc<File>> {
        if let Some(handle) = self
            .handles
            .lock()
            .map_err(|_| other_io("file pool poisoned"))?
            .get(path)
        {
            return Ok(Arc::clone(handle));
        }

        // Open outside the lock; concurrent misses may race to open the
        // same file, and whichever inserts last wins the cache slot.
        let file = Arc::new(File::open(path)?);

        let mut handles = self
            .handles
            .lock()
            .map_err(|_| other_io("file pool poisoned"))?;
        if let Some(handle) = handles.get(path) {
            return Ok(Arc::clone(handle));
        }
        // Cache is full: drop an arbitrary cached handle before inserting.
        // In-flight reads keep their own Arc, so nothing is yanked mid-read.
        if handles.len() >= self.capacity {
            if let Some(evict) = handles.keys().next().cloned() {
                tracing::debug!(path = %evict.display(), "evicting cached block-file handle");
                handles.remove(&evict);
            }
        }
        handles.insert(path.to_path_buf(), Arc::clone(&file));
        Ok(file)
    }

    /// Number of currently cached handles
    pub fn cached(&self) -> usize {
        self.handles.lock().map(|h| h.len()).unwrap_or(0)
    }
}

fn other_io(msg: &str) -> ArchiveError {
    ArchiveError::Io(std::io::Error::other(msg.to_string()))
}
