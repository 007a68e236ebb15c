use super::{BucketAccumulator, BucketStore};
use crate::condition::{CompiledCondition, MatchingEvent};
use crate::event::{EventChunk, Row};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

/// In-process bucket table.
#[derive(Debug, Default)]
pub struct MemoryBucketStore {
    rows: RwLock<Vec<Row>>,
    lookups: AtomicU64,
}

impl MemoryBucketStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, row: Row) {
        self.rows
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(row);
    }

    pub fn extend<I: IntoIterator<Item = Row>>(&self, rows: I) {
        self.rows
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(rows);
    }

    pub fn len(&self) -> usize {
        self.rows.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `find` calls served.
    pub fn lookups(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }
}

impl From<Vec<Row>> for MemoryBucketStore {
    fn from(rows: Vec<Row>) -> Self {
        Self {
            rows: RwLock::new(rows),
            lookups: AtomicU64::new(0),
        }
    }
}

impl BucketStore for MemoryBucketStore {
    fn find(
        &self,
        matching: &MatchingEvent<'_>,
        condition: &dyn CompiledCondition,
    ) -> anyhow::Result<EventChunk> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        let snapshot: EventChunk = self
            .rows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .into();
        Ok(condition.apply(snapshot, matching)?)
    }
}

/// In-process accumulator holding partial buckets until they are flushed.
#[derive(Debug, Default)]
pub struct BufferedAccumulator {
    rows: RwLock<Vec<Row>>,
    snapshots: AtomicU64,
}

impl BufferedAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, row: Row) {
        self.rows
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(row);
    }

    pub fn extend<I: IntoIterator<Item = Row>>(&self, rows: I) {
        self.rows
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(rows);
    }

    /// Remove and return every bucket older than `cutoff_ms`.
    pub fn flush_before(&self, cutoff_ms: i64) -> Vec<Row> {
        let mut rows = self.rows.write().unwrap_or_else(PoisonError::into_inner);
        let (flushed, kept) = rows
            .drain(..)
            .partition(|row: &Row| row.timestamp_ms < cutoff_ms);
        *rows = kept;
        flushed
    }

    pub fn len(&self) -> usize {
        self.rows.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of `buffered_rows` snapshots taken.
    pub fn snapshots(&self) -> u64 {
        self.snapshots.load(Ordering::Relaxed)
    }
}

impl BucketAccumulator for BufferedAccumulator {
    fn oldest_buffered_timestamp(&self) -> Option<i64> {
        self.rows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|row| row.timestamp_ms)
            .min()
    }

    fn buffered_rows(&self) -> Vec<Row> {
        self.snapshots.fetch_add(1, Ordering::Relaxed);
        self.rows
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
