//! In-memory key → locator index.

use crate::layout::SegmentId;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Identity of the file a locator points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileId {
    /// The mutable current log.
    Current,
    /// A closed segment with the given numeric suffix.
    Segment(SegmentId),
}

/// Addresses a single record: which file, and the byte offset of its frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Locator {
    /// File holding the authoritative record for the key.
    pub file: FileId,
    /// Byte offset at which the record frame begins.
    pub offset: u64,
}

/// The index over every live key, updated on each successful write and
/// rebuilt from disk on open.
#[derive(Debug, Default)]
pub struct KeyDir {
    entries: HashMap<String, Locator>,
}

impl KeyDir {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the locator of the latest record for `key`.
    pub fn get(&self, key: &str) -> Option<Locator> {
        self.entries.get(key).copied()
    }

    /// Points `key` at a new authoritative record.
    pub fn insert(&mut self, key: String, locator: Locator) {
        self.entries.insert(key, locator);
    }

    /// Drops the entry for `key`, returning its last locator.
    pub fn remove(&mut self, key: &str) -> Option<Locator> {
        self.entries.remove(key)
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index holds no keys.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Metadata shared between the writer, readers, and the compactor: the index
/// plus the ordered list of closed segments (ascending, oldest first).
#[derive(Debug, Default)]
pub(crate) struct Meta {
    pub keydir: KeyDir,
    pub segments: Vec<SegmentId>,
}

// Poisoning is ignored: no operation leaves the map or the segment list
// half-updated across a panic point.

pub(crate) fn read_meta(meta: &RwLock<Meta>) -> RwLockReadGuard<'_, Meta> {
    meta.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write_meta(meta: &RwLock<Meta>) -> RwLockWriteGuard<'_, Meta> {
    meta.write().unwrap_or_else(PoisonError::into_inner)
}
