//! Index reconstruction at open time.

use crate::error::{Result, StoreError};
use crate::index::{FileId, KeyDir, Locator};
use crate::layout::{Layout, SegmentId};
use crate::record::{self, DecodeError, Record};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::debug;

/// Everything recovery learns from the directory.
#[derive(Debug)]
pub(crate) struct Recovered {
    pub keydir: KeyDir,
    pub segments: Vec<SegmentId>,
    pub current_offset: u64,
}

/// Walks the segments in ascending suffix order, then the current log, and
/// returns the reconstructed index.
///
/// Later files overwrite earlier entries and the index is never reset
/// between files; the processing order is the whole of what makes "latest
/// record wins" hold.
pub(crate) fn recover(layout: &Layout) -> Result<Recovered> {
    let segments = layout.list_segments()?;
    let mut keydir = KeyDir::new();

    for &id in &segments {
        walk_file(&layout.segment_path(id), |record, offset| {
            keydir.insert(
                record.key,
                Locator {
                    file: FileId::Segment(id),
                    offset,
                },
            );
        })?;
    }

    let current_offset = walk_file(&layout.current_path(), |record, offset| {
        keydir.insert(
            record.key,
            Locator {
                file: FileId::Current,
                offset,
            },
        );
    })?;

    debug!(
        "recovered {} keys from {} segments plus the current log",
        keydir.len(),
        segments.len()
    );

    Ok(Recovered {
        keydir,
        segments,
        current_offset,
    })
}

/// Replays one file record by record, handing each frame and its starting
/// offset to `visit`; returns the offset one past the last complete frame.
///
/// A clean end of file terminates the walk; a nonzero partial tail is a
/// corruption error naming the file.
pub(crate) fn walk_file(path: &Path, mut visit: impl FnMut(Record, u64)) -> Result<u64> {
    let handle = File::open(path).map_err(|err| StoreError::io("open", path, err))?;
    let mut reader = BufReader::new(handle);
    let mut offset = 0u64;

    loop {
        match record::decode_from(&mut reader) {
            Ok(Some((record, consumed))) => {
                visit(record, offset);
                offset += consumed;
            }
            Ok(None) => return Ok(offset),
            Err(DecodeError::Io(err)) => return Err(StoreError::io("read", path, err)),
            Err(_) => return Err(StoreError::corruption(path)),
        }
    }
}
