//! The serialised write path.
//!
//! A single dedicated thread owns the current log handle and the append
//! offset. Callers funnel writes through a bounded request queue; the thread
//! serves one request at a time, which is what gives writes their total
//! order, and reports each outcome on the request's reply channel.

use crate::error::{Result, StoreError};
use crate::index::{self, FileId, Locator, Meta};
use crate::layout::{self, Layout};
use crate::record;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::sync::mpsc::{Receiver, SyncSender};
use std::sync::{Arc, RwLock};
use tracing::debug;

/// A queued write plus the channel its outcome is reported on.
pub(crate) struct WriteRequest {
    pub key: String,
    pub value: String,
    pub reply: SyncSender<Result<()>>,
}

/// Opens the current log for appending, creating it if missing (mode 0o600).
pub(crate) fn open_current(layout: &Layout) -> Result<File> {
    let path = layout.current_path();
    let mut options = OpenOptions::new();
    options.create(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options
        .open(&path)
        .map_err(|err| StoreError::io("open", path, err))
}

/// State owned by the writer thread.
pub(crate) struct Writer {
    layout: Layout,
    out: File,
    offset: u64,
    max_segment_size: u64,
    meta: Arc<RwLock<Meta>>,
}

impl Writer {
    pub fn new(
        layout: Layout,
        out: File,
        offset: u64,
        max_segment_size: u64,
        meta: Arc<RwLock<Meta>>,
    ) -> Self {
        Self {
            layout,
            out,
            offset,
            max_segment_size,
            meta,
        }
    }

    /// Serves queued requests until every sender is gone and the queue has
    /// drained, then exits, closing the current log.
    pub fn run(mut self, requests: Receiver<WriteRequest>) {
        while let Ok(request) = requests.recv() {
            let outcome = self.append(&request.key, &request.value);
            // The submitter may have stopped waiting; that is its business.
            let _ = request.reply.send(outcome);
        }
        debug!("writer drained, closing current log");
    }

    /// Appends one record, rotating the current log first when the frame
    /// would push it past the segment size bound.
    ///
    /// The metadata lock is held for the whole append, so a merge never
    /// observes a half-written frame in the current log. An encode failure
    /// changes nothing; a failed write leaves the offset untouched, so a
    /// torn tail on disk is caught by the next recovery.
    fn append(&mut self, key: &str, value: &str) -> Result<()> {
        let frame = record::encode(key, value)?;

        let size = self
            .out
            .metadata()
            .map_err(|err| StoreError::io("stat", self.layout.current_path(), err))?
            .len();

        let meta_lock = Arc::clone(&self.meta);
        let mut meta = index::write_meta(&meta_lock);

        // A frame larger than the bound still goes into an empty current
        // log; every segment holds at least one record.
        if size > 0 && size + frame.len() as u64 > self.max_segment_size {
            self.rotate(&mut meta)?;
        }

        let offset = self.offset;
        self.out
            .write_all(&frame)
            .map_err(|err| StoreError::io("write", self.layout.current_path(), err))?;

        meta.keydir.insert(
            key.to_string(),
            Locator {
                file: FileId::Current,
                offset,
            },
        );
        drop(meta);

        self.offset = offset + frame.len() as u64;
        Ok(())
    }

    /// Renames the current log to a fresh segment and starts an empty one.
    ///
    /// Index entries pointing into the rotated file are left alone: rename
    /// preserves offsets, and readers reach the renamed segment through the
    /// newest-first probe until a merge or the next open straightens the
    /// index.
    fn rotate(&mut self, meta: &mut Meta) -> Result<()> {
        let current = self.layout.current_path();

        let id = layout::next_segment_id(meta.segments.last().copied());
        let segment = self.layout.segment_path(id);
        fs::rename(&current, &segment).map_err(|err| StoreError::io("rename", current, err))?;
        meta.segments.push(id);

        self.out = open_current(&self.layout)?;
        self.offset = 0;

        debug!("rotated current log into {}", segment.display());
        Ok(())
    }
}
