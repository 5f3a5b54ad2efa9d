//! Fennec - an embedded log-structured key/value store.
//!
//! An append-only engine bound to one directory: records land in a mutable
//! `current-data` log, the log rotates into immutable `segment-*` files once
//! a write would push it past a size bound, an in-memory [`KeyDir`] maps
//! every key to the file and byte offset of its latest record, and
//! [`Store::merge_segments`] folds the closed segments back into one that
//! keeps only the latest value per key.
//!
//! # Components
//!
//! - [`Store`]: lifecycle, the serialised write funnel, and the read path
//! - [`record`]: the self-delimited on-disk record frame
//! - [`KeyDir`]: key → (file, offset) index, rebuilt from disk on open
//!
//! # Example
//!
//! ```rust,ignore
//! use fennec_store::Store;
//!
//! let store = Store::open("/path/to/data")?;
//! store.put("k1", "v1")?;
//! assert_eq!(store.get("k1")?, "v1");
//! store.merge_segments()?;
//! store.close()?;
//! ```

#![deny(missing_docs)]

pub mod error;
pub mod index;
pub mod layout;
pub mod record;
pub mod store;

mod compaction;
mod recovery;
mod writer;

pub use error::{Result, StoreError};
pub use index::{FileId, KeyDir, Locator};
pub use layout::SegmentId;
pub use record::Record;
pub use store::{Store, StoreConfig, DEFAULT_MAX_SEGMENT_SIZE, DEFAULT_QUEUE_DEPTH};
