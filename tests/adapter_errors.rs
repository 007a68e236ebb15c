mod common;

use common::*;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use strata::aggregation::ColumnKeyGenerator;
use strata::clock::FixedClock;
use strata::condition::{CompiledCondition, MatchingEvent};
use strata::expression::{PerExpression, WithinExpression};
use strata::store::{BucketStore, BufferedAccumulator, MemoryBucketStore};
use strata::{
    AggregationRuntime, CompiledAggregateQuery, Error, EventChunk, Granularity, GranularityLevel,
    QueryEvent, Topology, Value,
};

/// A store whose backend is unreachable.
#[derive(Default)]
struct OfflineStore {
    calls: AtomicU64,
}

impl BucketStore for OfflineStore {
    fn find(
        &self,
        _matching: &MatchingEvent<'_>,
        _condition: &dyn CompiledCondition,
    ) -> anyhow::Result<EventChunk> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Err(anyhow::anyhow!("bucket table trades_minutes is offline"))
    }
}

/// A condition rejecting every candidate row as malformed.
struct RejectRows;

impl CompiledCondition for RejectRows {
    fn apply(&self, candidates: EventChunk, _matching: &MatchingEvent<'_>) -> strata::Result<EventChunk> {
        match candidates.rows().first() {
            Some(row) => Err(Error::MalformedRow {
                expected: 3,
                actual: row.width(),
            }),
            None => Ok(candidates),
        }
    }
}

fn level(store: Arc<dyn BucketStore>, buffer: Arc<BufferedAccumulator>) -> GranularityLevel {
    GranularityLevel::new(
        store,
        buffer,
        Arc::new(ColumnKeyGenerator::new(vec![0])),
        pipeline(),
    )
}

fn runtime(
    topology: Topology,
    seconds: Arc<dyn BucketStore>,
    minutes: Arc<dyn BucketStore>,
    seconds_buffer: Arc<BufferedAccumulator>,
) -> AggregationRuntime {
    let config = strata::AggregationConfig::new(
        "trades",
        vec![Granularity::Seconds, Granularity::Minutes],
    )
    .with_topology(topology);
    AggregationRuntime::builder(config)
        .clock(Arc::new(FixedClock(11 * MINUTE + 30 * SECOND)))
        .level(Granularity::Seconds, level(seconds, seconds_buffer))
        .level(Granularity::Minutes, level(minutes, Arc::new(BufferedAccumulator::new())))
        .build()
        .expect("runtime")
}

fn query() -> CompiledAggregateQuery {
    CompiledAggregateQuery::builder(
        WithinExpression::Fixed {
            start_ms: 9 * MINUTE,
            end_ms: 12 * MINUTE,
        },
        PerExpression::Fixed("minutes".into()),
    )
    .build()
}

fn request() -> QueryEvent {
    QueryEvent::new(0, vec![Value::Null])
}

#[test]
fn requested_level_failure_is_passed_through() {
    init_logging();
    let offline = Arc::new(OfflineStore::default());
    let buffer = Arc::new(BufferedAccumulator::new());
    buffer.push(bucket(11 * MINUTE + SECOND, "IBM", 5, 1));
    let runtime = runtime(
        Topology::SingleNode,
        Arc::new(MemoryBucketStore::new()),
        offline.clone(),
        buffer.clone(),
    );

    let err = query()
        .find(&request(), &runtime, &mut outputs())
        .expect_err("offline store");

    assert!(matches!(err, Error::Adapter(_)), "{err:?}");
    assert_eq!(err.to_string(), "bucket table trades_minutes is offline");
    assert!(!err.is_query_error());
    assert_eq!(offline.calls.load(Ordering::Relaxed), 1);
    assert_eq!(buffer.snapshots(), 0);
}

#[test]
fn finer_level_failure_aborts_distributed_retrieval() {
    let minutes = Arc::new(MemoryBucketStore::from(vec![
        bucket(9 * MINUTE, "IBM", 90, 1),
        bucket(10 * MINUTE, "IBM", 100, 1),
    ]));
    let offline = Arc::new(OfflineStore::default());
    let buffer = Arc::new(BufferedAccumulator::new());
    buffer.push(bucket(11 * MINUTE, "IBM", 1, 1));
    let runtime = runtime(Topology::Distributed, offline.clone(), minutes.clone(), buffer);

    let result = query().find(&request(), &runtime, &mut outputs());

    let err = result.expect_err("finer store offline");
    assert!(matches!(err, Error::Adapter(_)), "{err:?}");
    assert_eq!(err.to_string(), "bucket table trades_minutes is offline");
    assert_eq!(minutes.lookups(), 1);
    assert_eq!(offline.calls.load(Ordering::Relaxed), 1);
}

#[test]
fn condition_errors_keep_their_kind() {
    let minutes = Arc::new(MemoryBucketStore::from(vec![bucket(9 * MINUTE, "IBM", 90, 1)]));
    let runtime = runtime(
        Topology::SingleNode,
        Arc::new(MemoryBucketStore::new()),
        minutes,
        Arc::new(BufferedAccumulator::new()),
    );
    let query = CompiledAggregateQuery::builder(
        WithinExpression::Fixed {
            start_ms: 9 * MINUTE,
            end_ms: 12 * MINUTE,
        },
        PerExpression::Fixed("minutes".into()),
    )
    .within_table(Granularity::Minutes, RejectRows)
    .build();

    let err = query
        .find(&request(), &runtime, &mut outputs())
        .expect_err("rejected rows");
    assert!(
        matches!(err, Error::MalformedRow { expected: 3, actual: 3 }),
        "{err:?}"
    );
}
