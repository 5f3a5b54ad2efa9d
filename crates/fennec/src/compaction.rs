//! Offline compaction: fold every closed segment into one.

use crate::error::{Result, StoreError};
use crate::index::{self, FileId, Locator, Meta};
use crate::layout::{self, Layout, SegmentId};
use crate::record;
use crate::recovery;
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::RwLock;
use tracing::{debug, warn};

/// Rewrites all closed segments into a single new segment holding the latest
/// value per key, and atomically swaps it in. The current log is untouched.
///
/// Holds the metadata lock exclusively for the whole operation: concurrent
/// `put`s queue up behind it and reads fall through the stale-locator probe.
/// With fewer than two segments this is a no-op.
pub(crate) fn merge_segments(layout: &Layout, meta: &RwLock<Meta>) -> Result<()> {
    let mut meta = index::write_meta(meta);
    if meta.segments.len() < 2 {
        return Ok(());
    }

    let temp_path = layout.temp_merge_path(layout::unix_nanos());
    let offsets = match write_merged(layout, &meta.segments, &temp_path) {
        Ok(offsets) => offsets,
        Err(err) => {
            remove_temp(&temp_path);
            return Err(err);
        }
    };

    let new_id = layout::next_segment_id(meta.segments.last().copied());
    let segment_path = layout.segment_path(new_id);
    if let Err(err) = fs::rename(&temp_path, &segment_path) {
        remove_temp(&temp_path);
        return Err(StoreError::io("rename", temp_path, err));
    }

    // The rename above is the commit point. Everything below is cleanup and
    // index refresh; interrupted, the next open reaches the same state
    // because the new segment sorts after the leftovers.
    for &id in &meta.segments {
        let path = layout.segment_path(id);
        if let Err(err) = fs::remove_file(&path) {
            warn!("failed to remove merged segment {}: {:?}", path.display(), err);
        }
    }

    let folded = std::mem::replace(&mut meta.segments, vec![new_id]);

    // Records in the current log are strictly newer than anything the merge
    // saw, so their keys must keep current-log locators. The log itself is
    // the authority on which keys those are: an index entry still saying
    // "current" may in truth point into a rotated-away segment. The writer
    // is locked out for the duration, so the walk sees only whole frames.
    let mut current_keys: HashMap<String, u64> = HashMap::new();
    recovery::walk_file(&layout.current_path(), |record, offset| {
        current_keys.insert(record.key, offset);
    })?;

    for (key, offset) in offsets {
        if !current_keys.contains_key(&key) {
            meta.keydir.insert(
                key,
                Locator {
                    file: FileId::Segment(new_id),
                    offset,
                },
            );
        }
    }
    for (key, offset) in current_keys {
        meta.keydir.insert(
            key,
            Locator {
                file: FileId::Current,
                offset,
            },
        );
    }

    debug!(
        "merged {} segments into {}",
        folded.len(),
        segment_path.display()
    );
    Ok(())
}

/// Folds `segments` (oldest to newest) into the latest value per key,
/// streams those pairs into `temp_path`, fsyncs it, and returns each key's
/// frame offset there.
fn write_merged(
    layout: &Layout,
    segments: &[SegmentId],
    temp_path: &Path,
) -> Result<BTreeMap<String, u64>> {
    let mut latest: BTreeMap<String, String> = BTreeMap::new();
    for &id in segments {
        recovery::walk_file(&layout.segment_path(id), |record, _| {
            latest.insert(record.key, record.value);
        })?;
    }

    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut out = options
        .open(temp_path)
        .map_err(|err| StoreError::io("create", temp_path, err))?;

    let mut offsets = BTreeMap::new();
    let mut offset = 0u64;
    for (key, value) in &latest {
        let frame = record::encode(key, value)?;
        out.write_all(&frame)
            .map_err(|err| StoreError::io("write", temp_path, err))?;
        offsets.insert(key.clone(), offset);
        offset += frame.len() as u64;
    }

    out.sync_all()
        .map_err(|err| StoreError::io("sync", temp_path, err))?;
    Ok(offsets)
}

/// Best-effort removal of a merge temporary whose commit never happened.
fn remove_temp(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => warn!("failed to remove {}: {:?}", path.display(), err),
    }
}
