//! The store façade: lifecycle, the write funnel, and the read path.

use crate::error::{Result, StoreError};
use crate::index::{self, FileId, Meta};
use crate::layout::Layout;
use crate::record;
use crate::writer::{self, WriteRequest, Writer};
use crate::{compaction, recovery};
use std::fs::{self, File};
use std::io::{BufReader, Seek, SeekFrom};
use std::path::Path;
use std::sync::mpsc::{self, SyncSender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::JoinHandle;
use tracing::{debug, error};

/// Default segment size bound: 10 MiB.
pub const DEFAULT_MAX_SEGMENT_SIZE: u64 = 10 * 1024 * 1024;

/// Default depth of the writer's request queue.
pub const DEFAULT_QUEUE_DEPTH: usize = 100;

/// Tunables for a store instance.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Soft ceiling on the current log: a write that would push it past this
    /// bound rotates the log into a segment first. A single record larger
    /// than the bound is still written, so segments can exceed it by at most
    /// one record.
    pub max_segment_size: u64,
    /// Bound on queued writes; submitters block while the queue is full.
    pub queue_depth: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_segment_size: DEFAULT_MAX_SEGMENT_SIZE,
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
}

impl StoreConfig {
    /// Creates a configuration with custom settings.
    pub fn new(max_segment_size: u64, queue_depth: usize) -> Self {
        Self {
            max_segment_size,
            queue_depth,
        }
    }
}

/// An open store bound to one directory.
///
/// The store owns the writer task, its request queue, the current log
/// handle, and the index; segment files are shared read-only artifacts that
/// readers open on demand. The handle is not clonable; wrap it in an
/// [`Arc`] to share it between threads.
pub struct Store {
    layout: Layout,
    meta: Arc<RwLock<Meta>>,
    requests: Mutex<Option<SyncSender<WriteRequest>>>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl Store {
    /// Opens the store in `dir` with the default configuration (10 MiB
    /// segments).
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        Self::with_config(dir, StoreConfig::default())
    }

    /// Opens the store in `dir`: creates the directory if missing, sweeps
    /// merge residue, rebuilds the index from disk, and starts the writer.
    ///
    /// # Errors
    ///
    /// Fails when the directory is inaccessible or any log file ends in a
    /// partial frame ([`StoreError::Corruption`]).
    pub fn with_config(dir: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        let layout = Layout::new(dir);
        layout.ensure_dir()?;
        layout.remove_stale_temp_files()?;

        let out = writer::open_current(&layout)?;
        let recovered = recovery::recover(&layout)?;

        let meta = Arc::new(RwLock::new(Meta {
            keydir: recovered.keydir,
            segments: recovered.segments,
        }));

        let writer = Writer::new(
            layout.clone(),
            out,
            recovered.current_offset,
            config.max_segment_size,
            Arc::clone(&meta),
        );
        let (requests, queue) = mpsc::sync_channel(config.queue_depth);
        let handle = std::thread::Builder::new()
            .name("fennec-writer".to_string())
            .spawn(move || writer.run(queue))
            .map_err(|err| StoreError::io("spawn writer", layout.dir(), err))?;

        debug!("opened store at {}", layout.dir().display());

        Ok(Store {
            layout,
            meta,
            requests: Mutex::new(Some(requests)),
            writer: Mutex::new(Some(handle)),
        })
    }

    /// Writes a key/value pair.
    ///
    /// Blocks while the request queue is full and until the writer reports
    /// the outcome; on return the record is in the OS buffer and visible to
    /// every subsequently started `get`.
    pub fn put(&self, key: &str, value: &str) -> Result<()> {
        let sender = match &*lock(&self.requests) {
            Some(sender) => sender.clone(),
            None => return Err(StoreError::Closed),
        };

        let (reply, outcome) = mpsc::sync_channel(1);
        sender
            .send(WriteRequest {
                key: key.to_string(),
                value: value.to_string(),
                reply,
            })
            .map_err(|_| StoreError::Closed)?;

        outcome.recv().map_err(|_| StoreError::Closed)?
    }

    /// Looks up the latest value for `key`.
    ///
    /// Snapshots the locator and the segment list under the shared lock,
    /// then reads without it. When the locator is stale because its file was
    /// rotated or compacted away mid-read, the segments are probed newest to
    /// oldest at the same offset; a probe only counts when the decoded
    /// record carries the requested key.
    pub fn get(&self, key: &str) -> Result<String> {
        let (locator, segments) = {
            let meta = index::read_meta(&self.meta);
            (meta.keydir.get(key), meta.segments.clone())
        };

        let locator = match locator {
            Some(locator) => locator,
            None => return Err(StoreError::NotFound),
        };

        let primary = match locator.file {
            FileId::Current => self.layout.current_path(),
            FileId::Segment(id) => self.layout.segment_path(id),
        };
        if let Some(value) = read_record_at(&primary, locator.offset, key) {
            return Ok(value);
        }

        for &id in segments.iter().rev() {
            if let Some(value) = read_record_at(&self.layout.segment_path(id), locator.offset, key)
            {
                return Ok(value);
            }
        }

        Err(StoreError::NotFound)
    }

    /// Removes `key` from the index, so later `get`s return
    /// [`StoreError::NotFound`]. Removing an absent key succeeds.
    ///
    /// The log itself is untouched: no tombstone is written, so the key
    /// reappears with its last value once the index is rebuilt from the log,
    /// by a segment merge or by recovery on the next open.
    pub fn delete(&self, key: &str) -> Result<()> {
        let mut meta = index::write_meta(&self.meta);
        meta.keydir.remove(key);
        Ok(())
    }

    /// Returns the byte size of the current log. Closed segments are not
    /// counted.
    pub fn size(&self) -> Result<u64> {
        let path = self.layout.current_path();
        let metadata = fs::metadata(&path).map_err(|err| StoreError::io("stat", path, err))?;
        Ok(metadata.len())
    }

    /// Folds all closed segments into a single new segment holding the
    /// latest value per key; a no-op below two segments. Blocks writes for
    /// the duration; concurrent reads proceed best-effort.
    pub fn merge_segments(&self) -> Result<()> {
        compaction::merge_segments(&self.layout, &self.meta)
    }

    /// Signals shutdown, lets the writer drain every queued request, and
    /// joins it; the writer closes the current log on exit. Idempotent.
    /// `put`s submitted from here on fail with [`StoreError::Closed`].
    pub fn close(&self) -> Result<()> {
        drop(lock(&self.requests).take());

        let handle = lock(&self.writer).take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("writer thread panicked during shutdown");
            }
        }
        Ok(())
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        // Best effort to drain queued writes, as close() would.
        let _ = self.close();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Best-effort read of one record frame at `offset`. `None` when the file
/// is gone, the frame does not decode, or the decoded key is not the one
/// asked for.
fn read_record_at(path: &Path, offset: u64, key: &str) -> Option<String> {
    let handle = File::open(path).ok()?;
    let mut reader = BufReader::new(handle);
    reader.seek(SeekFrom::Start(offset)).ok()?;
    match record::decode_from(&mut reader) {
        Ok(Some((record, _))) if record.key == key => Some(record.value),
        _ => None,
    }
}
