//! Directory layout: the current log, closed segments, merge temporaries.
//!
//! One store owns one directory. The mutable log keeps a fixed well-known
//! name; closed segments carry a nanosecond-timestamp suffix so that sorting
//! by the numeric suffix equals chronological order, across process
//! lifetimes included.

use crate::error::{Result, StoreError};
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::warn;

/// Well-known name of the mutable current log file.
pub const CURRENT_FILE: &str = "current-data";

/// Name prefix of immutable closed segment files.
pub const SEGMENT_PREFIX: &str = "segment-";

/// Name prefix of in-progress merge output files.
pub const TEMP_MERGE_PREFIX: &str = "temp-merged-";

/// Numeric suffix of a segment file: a nanosecond wall-clock timestamp.
pub type SegmentId = u64;

/// Provides filesystem paths inside one store directory.
#[derive(Debug, Clone)]
pub struct Layout {
    dir: PathBuf,
}

impl Layout {
    /// Creates a layout rooted at `dir`. Nothing is touched on disk.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Returns the store directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the path of the current log file.
    pub fn current_path(&self) -> PathBuf {
        self.dir.join(CURRENT_FILE)
    }

    /// Returns the path of the segment with the given suffix.
    pub fn segment_path(&self, id: SegmentId) -> PathBuf {
        self.dir.join(format!("{}{}", SEGMENT_PREFIX, id))
    }

    /// Returns the path of a merge temporary with the given suffix.
    pub fn temp_merge_path(&self, id: SegmentId) -> PathBuf {
        self.dir.join(format!("{}{}", TEMP_MERGE_PREFIX, id))
    }

    /// Parses `segment-<id>` into its numeric suffix.
    pub fn parse_segment_name(name: &str) -> Option<SegmentId> {
        name.strip_prefix(SEGMENT_PREFIX)?.parse::<u64>().ok()
    }

    /// Lists segment suffixes in the directory, ascending (oldest first).
    pub fn list_segments(&self) -> Result<Vec<SegmentId>> {
        let entries =
            fs::read_dir(&self.dir).map_err(|err| StoreError::io("read dir", &self.dir, err))?;

        let mut ids = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| StoreError::io("read dir", &self.dir, err))?;
            let file_name = entry.file_name();
            let name = match file_name.to_str() {
                Some(name) => name,
                None => continue,
            };
            if let Some(id) = Self::parse_segment_name(name) {
                ids.push(id);
            }
        }

        ids.sort_unstable();
        Ok(ids)
    }

    /// Removes `temp-merged-*` residue left behind by a merge that crashed
    /// before its rename.
    pub fn remove_stale_temp_files(&self) -> Result<()> {
        let entries =
            fs::read_dir(&self.dir).map_err(|err| StoreError::io("read dir", &self.dir, err))?;

        for entry in entries {
            let entry = entry.map_err(|err| StoreError::io("read dir", &self.dir, err))?;
            let file_name = entry.file_name();
            let name = match file_name.to_str() {
                Some(name) => name,
                None => continue,
            };
            if name.starts_with(TEMP_MERGE_PREFIX) {
                let path = entry.path();
                if let Err(err) = fs::remove_file(&path) {
                    warn!("failed to remove stale merge file {}: {:?}", path.display(), err);
                }
            }
        }

        Ok(())
    }

    /// Creates the store directory (mode 0o755) if missing.
    pub fn ensure_dir(&self) -> Result<()> {
        let mut builder = fs::DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o755);
        }
        builder
            .create(&self.dir)
            .map_err(|err| StoreError::io("create dir", &self.dir, err))
    }
}

/// Allocates the next segment suffix: the current wall clock, waiting a tick
/// whenever the clock has not advanced past `last`.
pub(crate) fn next_segment_id(last: Option<SegmentId>) -> SegmentId {
    loop {
        let now = unix_nanos();
        match last {
            Some(prev) if now <= prev => thread::sleep(Duration::from_nanos(100)),
            _ => return now,
        }
    }
}

/// Nanoseconds since the Unix epoch.
pub(crate) fn unix_nanos() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
