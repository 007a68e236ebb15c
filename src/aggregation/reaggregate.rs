//! Collapsing overlapping bucket coverage.
//!
//! In distributed mode, or with externally timestamped streams, the merged
//! chunk can hold several rows for the same slot: coarse persisted buckets next
//! to finer persisted or in-memory ones. Regrouping by `(slot, group key)` at
//! the requested granularity folds them into one row each.

use super::group::{GroupKeyGenerator, SlotGrouper};
use super::pipeline::AggregatePipeline;
use crate::error::Result;
use crate::event::EventChunk;
use crate::granularity::Granularity;
use time::UtcOffset;

pub struct OverlapAggregator<'a> {
    per: Granularity,
    offset: UtcOffset,
    pipeline: &'a AggregatePipeline,
    key_generator: &'a dyn GroupKeyGenerator,
}

impl<'a> OverlapAggregator<'a> {
    pub fn new(
        per: Granularity,
        offset: UtcOffset,
        pipeline: &'a AggregatePipeline,
        key_generator: &'a dyn GroupKeyGenerator,
    ) -> Self {
        Self {
            per,
            offset,
            pipeline,
            key_generator,
        }
    }

    pub fn aggregate(&self, chunk: EventChunk) -> Result<EventChunk> {
        let mut grouper = SlotGrouper::new(self.per, self.offset, self.pipeline, self.key_generator);
        for row in &chunk {
            grouper.add(row)?;
        }
        Ok(grouper.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregation::group::ColumnKeyGenerator;
    use crate::aggregation::pipeline::BaseAggregator;
    use crate::event::{Row, Value};

    const MINUTE: i64 = 60_000;

    fn pipeline() -> AggregatePipeline {
        AggregatePipeline::new(vec![
            BaseAggregator::GroupBy,
            BaseAggregator::Sum,
            BaseAggregator::Count,
            BaseAggregator::Max,
        ])
    }

    fn bucket(ts: i64, symbol: &str, sum: i64, count: i64, max: i64) -> Row {
        Row::new(
            ts,
            vec![
                Value::from(symbol),
                Value::Int(sum),
                Value::Int(count),
                Value::Int(max),
            ],
        )
    }

    #[test]
    fn test_collapses_mixed_granularity_rows() {
        // A partially flushed minute bucket and two second buckets of the same minute.
        let minute_row = bucket(11 * MINUTE, "IBM", 30, 3, 15);
        let second_a = bucket(11 * MINUTE + 40_000, "IBM", 8, 2, 6);
        let second_b = bucket(11 * MINUTE + 41_000, "IBM", 20, 1, 20);

        let pipeline = pipeline();
        let generator = ColumnKeyGenerator::new(vec![0]);
        let aggregator =
            OverlapAggregator::new(Granularity::Minutes, UtcOffset::UTC, &pipeline, &generator);
        let chunk: EventChunk = vec![minute_row.clone(), second_a.clone(), second_b.clone()].into();
        let collapsed = aggregator.aggregate(chunk).unwrap();

        assert_eq!(collapsed.len(), 1);
        let direct = pipeline
            .reduce(11 * MINUTE, [&minute_row, &second_a, &second_b])
            .unwrap();
        assert_eq!(collapsed.rows()[0], direct);
        assert_eq!(collapsed.rows()[0], bucket(11 * MINUTE, "IBM", 58, 6, 20));
    }

    #[test]
    fn test_late_row_does_not_override_last() {
        // The persisted minute already saw 11:50; a late raw row for 11:10 is merged after it.
        let pipeline = AggregatePipeline::new(vec![BaseAggregator::GroupBy, BaseAggregator::Last]);
        let persisted = Row::new(
            11 * MINUTE,
            vec![Value::from("IBM"), Value::from("close"), Value::Int(11 * MINUTE + 50_000)],
        );
        let late = Row::new(
            11 * MINUTE + 10_000,
            vec![Value::from("IBM"), Value::from("late"), Value::Null],
        );

        let generator = ColumnKeyGenerator::new(vec![0]);
        let aggregator =
            OverlapAggregator::new(Granularity::Minutes, UtcOffset::UTC, &pipeline, &generator);
        let collapsed = aggregator
            .aggregate(vec![persisted, late].into())
            .unwrap()
            .into_rows();

        assert_eq!(collapsed.len(), 1);
        assert_eq!(
            collapsed[0].values,
            vec![Value::from("IBM"), Value::from("close"), Value::Int(11 * MINUTE + 50_000)]
        );
    }

    #[test]
    fn test_keeps_distinct_slots_and_groups() {
        let pipeline = pipeline();
        let generator = ColumnKeyGenerator::new(vec![0]);
        let aggregator =
            OverlapAggregator::new(Granularity::Minutes, UtcOffset::UTC, &pipeline, &generator);
        let chunk: EventChunk = vec![
            bucket(9 * MINUTE, "IBM", 1, 1, 1),
            bucket(10 * MINUTE, "IBM", 2, 1, 2),
            bucket(10 * MINUTE, "WSO2", 3, 1, 3),
        ]
        .into();
        let collapsed = aggregator.aggregate(chunk.clone()).unwrap();
        assert_eq!(collapsed, chunk);
    }

    #[test]
    fn test_empty_chunk() {
        let pipeline = pipeline();
        let generator = ColumnKeyGenerator::ungrouped();
        let aggregator =
            OverlapAggregator::new(Granularity::Days, UtcOffset::UTC, &pipeline, &generator);
        assert!(aggregator.aggregate(EventChunk::new()).unwrap().is_empty());
    }
}
