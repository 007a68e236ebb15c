//! Group keys and slot grouping.

use super::pipeline::{AggregatePipeline, PartialBucket};
use crate::error::Result;
use crate::event::{EventChunk, Row, Value};
use crate::granularity::Granularity;
use std::collections::HashMap;
use std::fmt;
use time::UtcOffset;

const KEY_DELIMITER: &str = ":::";
const KEY_TAG: char = '\u{1}';
const KEY_NULL: &str = "\u{0}";

/// Identity of a group within one time slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct GroupKey(String);

impl GroupKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Derives the group key of a bucket row.
pub trait GroupKeyGenerator: Send + Sync {
    fn key_of(&self, row: &Row) -> GroupKey;
}

impl<F> GroupKeyGenerator for F
where
    F: Fn(&Row) -> GroupKey + Send + Sync,
{
    fn key_of(&self, row: &Row) -> GroupKey {
        self(row)
    }
}

/// Keys rows by the values of a fixed set of columns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnKeyGenerator {
    columns: Vec<usize>,
}

impl ColumnKeyGenerator {
    pub fn new(columns: Vec<usize>) -> Self {
        Self { columns }
    }

    /// Aggregation without group-by: every row shares one key per slot.
    pub fn ungrouped() -> Self {
        Self::default()
    }
}

impl GroupKeyGenerator for ColumnKeyGenerator {
    fn key_of(&self, row: &Row) -> GroupKey {
        let parts: Vec<String> = self
            .columns
            .iter()
            .map(|index| key_part(row.get(*index).unwrap_or(&Value::Null)))
            .collect();
        GroupKey(parts.join(KEY_DELIMITER))
    }
}

/// Strings are used verbatim; other values are tagged so that `Int(1)` and
/// `Str("1")`, or `Null` and `Str("null")`, never share a key.
fn key_part(value: &Value) -> String {
    match value {
        Value::Str(text) => text.clone(),
        Value::Null => KEY_NULL.to_string(),
        other => format!("{KEY_TAG}{other}"),
    }
}

/// Folds rows into one bucket per `(slot, group key)`, in first-seen order.
pub(crate) struct SlotGrouper<'a> {
    granularity: Granularity,
    offset: UtcOffset,
    pipeline: &'a AggregatePipeline,
    key_generator: &'a dyn GroupKeyGenerator,
    index: HashMap<(i64, GroupKey), usize>,
    buckets: Vec<PartialBucket>,
}

impl<'a> SlotGrouper<'a> {
    pub(crate) fn new(
        granularity: Granularity,
        offset: UtcOffset,
        pipeline: &'a AggregatePipeline,
        key_generator: &'a dyn GroupKeyGenerator,
    ) -> Self {
        Self {
            granularity,
            offset,
            pipeline,
            key_generator,
            index: HashMap::new(),
            buckets: Vec::new(),
        }
    }

    pub(crate) fn slot_of(&self, row: &Row) -> Result<i64> {
        self.granularity.bucket_start(row.timestamp_ms, self.offset)
    }

    pub(crate) fn add(&mut self, row: &Row) -> Result<()> {
        let slot = self.slot_of(row)?;
        self.add_at(slot, row)
    }

    pub(crate) fn add_at(&mut self, slot: i64, row: &Row) -> Result<()> {
        let key = (slot, self.key_generator.key_of(row));
        let position = match self.index.get(&key) {
            Some(position) => *position,
            None => {
                self.buckets.push(self.pipeline.start(slot));
                self.index.insert(key, self.buckets.len() - 1);
                self.buckets.len() - 1
            }
        };
        self.pipeline.fold(&mut self.buckets[position], row)
    }

    pub(crate) fn finish(self) -> EventChunk {
        self.buckets.into_iter().map(PartialBucket::finish).collect()
    }
}
