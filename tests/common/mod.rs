#![allow(dead_code)]

use std::sync::Arc;
use strata::aggregation::{AggregatePipeline, BaseAggregator, ColumnKeyGenerator};
use strata::clock::FixedClock;
use strata::expression::{Attribute, BucketTimestamp, OutputExpression, RunningSum};
use strata::store::{BufferedAccumulator, MemoryBucketStore};
use strata::{AggregationConfig, AggregationRuntime, Granularity, GranularityLevel, Row, Value};

pub const SECOND: i64 = 1_000;
pub const MINUTE: i64 = 60_000;

/// `[symbol, sum(price), count]`
pub fn pipeline() -> AggregatePipeline {
    AggregatePipeline::new(vec![
        BaseAggregator::GroupBy,
        BaseAggregator::Sum,
        BaseAggregator::Count,
    ])
}

pub fn bucket(ts: i64, symbol: &str, sum: i64, count: i64) -> Row {
    Row::new(ts, vec![Value::from(symbol), Value::Int(sum), Value::Int(count)])
}

/// Stores and accumulators of the seconds/minutes/hours test aggregation.
#[derive(Default)]
pub struct Tables {
    pub seconds: Arc<MemoryBucketStore>,
    pub minutes: Arc<MemoryBucketStore>,
    pub hours: Arc<MemoryBucketStore>,
    pub seconds_buffer: Arc<BufferedAccumulator>,
    pub minutes_buffer: Arc<BufferedAccumulator>,
    pub hours_buffer: Arc<BufferedAccumulator>,
}

impl Tables {
    pub fn runtime(&self, config: AggregationConfig, now_ms: i64) -> AggregationRuntime {
        let level = |store: &Arc<MemoryBucketStore>, buffer: &Arc<BufferedAccumulator>| {
            GranularityLevel::new(
                store.clone(),
                buffer.clone(),
                Arc::new(ColumnKeyGenerator::new(vec![0])),
                pipeline(),
            )
        };
        AggregationRuntime::builder(config)
            .clock(Arc::new(FixedClock(now_ms)))
            .level(Granularity::Seconds, level(&self.seconds, &self.seconds_buffer))
            .level(Granularity::Minutes, level(&self.minutes, &self.minutes_buffer))
            .level(Granularity::Hours, level(&self.hours, &self.hours_buffer))
            .build()
            .expect("runtime")
    }
}

pub fn config() -> AggregationConfig {
    AggregationConfig::new(
        "trades",
        vec![Granularity::Seconds, Granularity::Minutes, Granularity::Hours],
    )
}

/// `[timestamp, symbol, sum, running sum]`
pub fn outputs() -> Vec<Box<dyn OutputExpression>> {
    vec![
        Box::new(BucketTimestamp),
        Box::new(Attribute(0)),
        Box::new(Attribute(1)),
        Box::new(RunningSum::new(1)),
    ]
}

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
