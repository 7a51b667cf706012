//! Index an ordered key space with capacity-bounded, independently pageable segments.
//!
//! [Index] maps keys to any number of values. Entries live in segments that hold at most
//! `capacity` entries each, and every segment caches the smallest and largest key it stores (a
//! block-range summary). The index keeps its live segments in a directory ordered by minimum key.
//!
//! # Placement
//!
//! A new entry is appended to the segment with the greatest minimum key not exceeding the new
//! key (or to the first segment, if the new key is smaller than every minimum). When a segment
//! overflows, it is replaced by two segments: entries at even positions go to the first and
//! entries at odd positions go to the second. This keeps both halves near half capacity
//! regardless of key distribution (including long runs of equal keys), at the cost of allowing
//! the key ranges of different segments to overlap.
//!
//! # Lookups
//!
//! Because summaries may overlap, lookups never descend a single path. [Index::search] and
//! [Index::look_up_range] scan every segment whose summary could hold a match, in directory order,
//! and then stably sort the gathered entries by key. Values sharing a key are therefore returned
//! in a deterministic order: by segment (directory order), then by position within the segment.
//!
//! # Retirement
//!
//! A segment is removed from the directory as soon as a deletion leaves it empty. Non-empty
//! segments are never merged.
//!
//! # Concurrency
//!
//! Every segment is guarded by its own lock and the directory by a read-write lock. Writers
//! targeting different segments do not block each other beyond a brief directory read, and a
//! split replaces the old segment with both halves in a single directory edit, so readers observe
//! either the pre-split or the post-split segments (never a mix).
//!
//! # Paging
//!
//! [Index::checkpoint] copies every segment (under its lock) into a [Snapshot] and
//! [Index::restore] rebuilds an identical index from them. Serializing snapshots is left to the
//! caller.
//!
//! # Status
//!
//! `commonware-brin` is **ALPHA** software and is not yet recommended for production use. Developers should
//! expect breaking changes and occasional instability.
//!
//! # Example
//!
//! ```rust
//! use commonware_runtime::{deterministic, Runner};
//! use commonware_brin::{Config, Index};
//!
//! let executor = deterministic::Runner::default();
//! executor.start(|context| async move {
//!     // Create an index with (at most) 2 entries per segment
//!     let index = Index::init(context, Config { capacity: 2 }).unwrap();
//!
//!     // Add values (the third insertion splits the first segment)
//!     index.put(1u64, "a");
//!     index.put(2u64, "b");
//!     index.put(3u64, "c");
//!     assert_eq!(index.segments(), 2);
//!
//!     // Look up a single key
//!     assert_eq!(index.search(&2), vec!["b"]);
//!
//!     // Look up a range (ordered by key)
//!     assert_eq!(index.look_up_range(Some(&2), None).unwrap(), vec!["b", "c"]);
//!
//!     // Remove a value
//!     assert!(index.delete(&2, &"b"));
//!     assert!(index.search(&2).is_empty());
//! });
//! ```

mod segment;
mod storage;
pub use storage::{Index, Snapshot};
use thiserror::Error;

/// Errors that can occur when interacting with an [Index].
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid capacity: {0}")]
    InvalidCapacity(usize),
    #[error("invalid range: low bound exceeds high bound")]
    InvalidRange,
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),
}

/// Configuration for an [Index].
#[derive(Clone, Debug)]
pub struct Config {
    /// The maximum number of entries a segment may hold (must be at least 1).
    pub capacity: usize,
}
