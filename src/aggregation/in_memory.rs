//! Synthesis of requested-granularity buckets from unflushed in-memory data.

use super::group::{GroupKeyGenerator, SlotGrouper};
use super::pipeline::AggregatePipeline;
use crate::error::Result;
use crate::event::EventChunk;
use crate::granularity::Granularity;
use crate::store::BucketAccumulator;
use time::UtcOffset;

/// Rolls the buffered partial buckets of the requested granularity and every
/// finer one up into buckets shaped like the requested granularity's table.
pub struct InMemoryAggregator<'a> {
    per: Granularity,
    offset: UtcOffset,
    oldest_unflushed_ms: Option<i64>,
    pipeline: &'a AggregatePipeline,
    key_generator: &'a dyn GroupKeyGenerator,
}

impl<'a> InMemoryAggregator<'a> {
    pub fn new(
        per: Granularity,
        offset: UtcOffset,
        oldest_unflushed_ms: Option<i64>,
        pipeline: &'a AggregatePipeline,
        key_generator: &'a dyn GroupKeyGenerator,
    ) -> Self {
        Self {
            per,
            offset,
            oldest_unflushed_ms,
            pipeline,
            key_generator,
        }
    }

    /// Aggregate the buffers of `sources`, typically the requested granularity
    /// down to the finest configured one.
    ///
    /// Slots that start before the oldest unflushed slot are already persisted
    /// and are skipped. Without a known oldest timestamp every buffered row counts.
    pub fn aggregate<'s, I>(&self, sources: I) -> Result<EventChunk>
    where
        I: IntoIterator<Item = (Granularity, &'s dyn BucketAccumulator)>,
    {
        let floor = self
            .oldest_unflushed_ms
            .map(|oldest| self.per.bucket_start(oldest, self.offset))
            .transpose()?;

        let mut grouper = SlotGrouper::new(self.per, self.offset, self.pipeline, self.key_generator);
        for (granularity, accumulator) in sources {
            if granularity > self.per {
                continue;
            }
            let rows = accumulator.buffered_rows();
            log::trace!("in-memory {granularity}: {} buffered buckets", rows.len());
            for row in &rows {
                let slot = grouper.slot_of(row)?;
                if floor.map_or(true, |floor| slot >= floor) {
                    grouper.add_at(slot, row)?;
                }
            }
        }
        Ok(grouper.finish())
    }
}
