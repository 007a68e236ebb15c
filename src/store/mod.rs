//! Bucket sources a retrieval reads from.
//!
//! Both traits are point-in-time reads. Retrieval never mutates a store or an
//! accumulator; appending and flushing happen on a separate path.

mod memory;

pub use memory::{BufferedAccumulator, MemoryBucketStore};

use crate::condition::{CompiledCondition, MatchingEvent};
use crate::event::{EventChunk, Row};

/// Durable per-granularity table of finalized buckets.
pub trait BucketStore: Send + Sync {
    /// Rows matching `condition`. No match is an empty chunk, not an error.
    fn find(
        &self,
        matching: &MatchingEvent<'_>,
        condition: &dyn CompiledCondition,
    ) -> anyhow::Result<EventChunk>;
}

/// Live per-granularity accumulator of buckets that have not been flushed yet.
pub trait BucketAccumulator: Send + Sync {
    /// Timestamp of the oldest buffered bucket, `None` when nothing is buffered.
    fn oldest_buffered_timestamp(&self) -> Option<i64>;

    /// Snapshot of the buffered partial buckets.
    fn buffered_rows(&self) -> Vec<Row>;
}
