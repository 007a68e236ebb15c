//! Incremental aggregate retrieval.
//!
//! A [`CompiledAggregateQuery`] answers one query event against an
//! [`AggregationRuntime`]: it reads the persisted buckets of the requested
//! granularity, covers the not-yet-flushed tail either from the in-memory
//! accumulators (single node) or from finer persisted tables (distributed),
//! collapses overlapping coverage when it can occur, projects the buckets
//! through the output expressions and applies the on-condition.

pub mod projection;
pub mod runtime;

pub use projection::{project, reset_outputs};
pub use runtime::{AggregationRuntime, AggregationRuntimeBuilder, GranularityLevel};

use crate::aggregation::{InMemoryAggregator, OverlapAggregator};
use crate::condition::{CompiledCondition, MatchingEvent, OnCondition, RangeCondition};
use crate::error::{Error, Result};
use crate::event::{EventChunk, QueryEvent, TimeRange};
use crate::expression::{OutputExpression, PerExpression, WithinExpression};
use crate::granularity::{Granularity, GranularityMap};
use crate::store::BucketAccumulator;
use log::{debug, trace};

/// A retrieval compiled once and executed per query event.
///
/// Holds no per-call state, so one instance can serve concurrent calls as long
/// as each caller brings its own output expressions.
pub struct CompiledAggregateQuery {
    within: WithinExpression,
    per: PerExpression,
    within_table: GranularityMap<Box<dyn CompiledCondition>>,
    lower_granularity: GranularityMap<Box<dyn CompiledCondition>>,
    in_memory: Box<dyn CompiledCondition>,
    on: Box<dyn CompiledCondition>,
}

impl CompiledAggregateQuery {
    pub fn builder(within: WithinExpression, per: PerExpression) -> CompiledAggregateQueryBuilder {
        CompiledAggregateQueryBuilder {
            within,
            per,
            within_table: GranularityMap::new(),
            lower_granularity: GranularityMap::new(),
            in_memory: None,
            on: None,
        }
    }

    /// Run the retrieval for `event`.
    ///
    /// The time range and requested granularity are validated before any store
    /// is touched. `outputs` are reset once at the end of projection.
    pub fn find(
        &self,
        event: &QueryEvent,
        runtime: &AggregationRuntime,
        outputs: &mut [Box<dyn OutputExpression>],
    ) -> Result<EventChunk> {
        let range = self.within.evaluate(event)?;
        let per = Granularity::normalize(&self.per.evaluate(event)?)?;
        let level = runtime.level(per)?;

        let config = runtime.config();
        let distributed = config.is_distributed();
        let external = config.external_timestamps;

        let mut matching = MatchingEvent::new(event, range);
        if distributed {
            matching.lower_bounds = lower_granularity_bounds(runtime, per)?;
        }

        let mut merged = level
            .store
            .find(&matching, condition_for(&self.within_table, per)?)
            .map_err(from_adapter)?;
        trace!("persisted {per}: {} buckets", merged.len());

        let oldest = oldest_in_memory_timestamp(runtime, per);
        let gap = external || requires_gap_fetch(oldest, &range);
        debug!(
            "retrieving {per} for '{}' within [{}, {}): oldest={oldest:?} gap={gap} distributed={distributed} external={external}",
            runtime.id(),
            range.start_ms,
            range.end_ms
        );

        if gap {
            if distributed {
                for (granularity, finer) in runtime.levels().finer_than(per) {
                    let condition = condition_for(&self.lower_granularity, granularity)?;
                    let rows = finer
                        .store
                        .find(&matching, condition)
                        .map_err(from_adapter)?;
                    trace!("persisted {granularity} below {per}: {} buckets", rows.len());
                    merged.append(rows);
                }
            } else {
                let synthesized = InMemoryAggregator::new(
                    per,
                    runtime.offset(),
                    oldest,
                    &level.pipeline,
                    level.key_generator.as_ref(),
                )
                .aggregate(runtime.levels().down_from(per).map(
                    |(granularity, lvl)| -> (Granularity, &dyn BucketAccumulator) {
                        (granularity, lvl.accumulator.as_ref())
                    },
                ))?;
                let synthesized = self.in_memory.apply(synthesized, &matching)?;
                trace!("in-memory {per}: {} buckets", synthesized.len());
                merged.append(synthesized);
            }
        }

        let buckets = if distributed || external {
            debug!("re-aggregating {} merged rows at {per}", merged.len());
            OverlapAggregator::new(
                per,
                runtime.offset(),
                &level.pipeline,
                level.key_generator.as_ref(),
            )
            .aggregate(merged)?
        } else {
            merged
        };

        let projected = project(buckets, outputs, level.pipeline.width());
        self.on.apply(projected, &matching)
    }
}

impl std::fmt::Debug for CompiledAggregateQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledAggregateQuery")
            .field("within", &self.within)
            .field("per", &self.per)
            .finish_non_exhaustive()
    }
}

pub struct CompiledAggregateQueryBuilder {
    within: WithinExpression,
    per: PerExpression,
    within_table: GranularityMap<Box<dyn CompiledCondition>>,
    lower_granularity: GranularityMap<Box<dyn CompiledCondition>>,
    in_memory: Option<Box<dyn CompiledCondition>>,
    on: Option<Box<dyn CompiledCondition>>,
}

impl CompiledAggregateQueryBuilder {
    /// Condition for the persisted lookup at `granularity` when it is the requested one.
    pub fn within_table(
        mut self,
        granularity: Granularity,
        condition: impl CompiledCondition + 'static,
    ) -> Self {
        self.within_table.insert(granularity, Box::new(condition));
        self
    }

    /// Condition for the distributed lookup at `granularity` below the requested one.
    pub fn lower_granularity(
        mut self,
        granularity: Granularity,
        condition: impl CompiledCondition + 'static,
    ) -> Self {
        self.lower_granularity.insert(granularity, Box::new(condition));
        self
    }

    pub fn in_memory(mut self, condition: impl CompiledCondition + 'static) -> Self {
        self.in_memory = Some(Box::new(condition));
        self
    }

    pub fn on(mut self, condition: impl CompiledCondition + 'static) -> Self {
        self.on = Some(Box::new(condition));
        self
    }

    /// Fill every stage left unset with its plain range or match-all condition.
    pub fn build(mut self) -> CompiledAggregateQuery {
        for granularity in Granularity::ALL {
            if !self.within_table.contains(granularity) {
                self.within_table
                    .insert(granularity, Box::new(RangeCondition::within()));
            }
            if !self.lower_granularity.contains(granularity) {
                self.lower_granularity.insert(
                    granularity,
                    Box::new(RangeCondition::lower_granularity(granularity)),
                );
            }
        }
        CompiledAggregateQuery {
            within: self.within,
            per: self.per,
            within_table: self.within_table,
            lower_granularity: self.lower_granularity,
            in_memory: self
                .in_memory
                .unwrap_or_else(|| Box::new(RangeCondition::within())),
            on: self.on.unwrap_or_else(|| Box::new(OnCondition::all())),
        }
    }
}

fn condition_for(
    conditions: &GranularityMap<Box<dyn CompiledCondition>>,
    granularity: Granularity,
) -> Result<&dyn CompiledCondition> {
    conditions
        .get(granularity)
        .map(|condition| condition.as_ref())
        .ok_or_else(|| Error::Config(format!("no compiled condition for {granularity}")))
}

/// Classify an adapter failure.
///
/// Errors raised by this crate's conditions while an adapter ran keep their
/// kind; anything else is an adapter failure, passed through unchanged.
fn from_adapter(err: anyhow::Error) -> Error {
    match err.downcast::<Error>() {
        Ok(err) => err,
        Err(err) => Error::Adapter(err),
    }
}

/// First buffered timestamp found scanning from `per` down to the finest granularity.
pub fn oldest_in_memory_timestamp(runtime: &AggregationRuntime, per: Granularity) -> Option<i64> {
    runtime
        .levels()
        .down_from(per)
        .find_map(|(_, level)| level.accumulator.oldest_buffered_timestamp())
}

/// Whether the range reaches into data that has not been flushed yet.
pub fn requires_gap_fetch(oldest: Option<i64>, range: &TimeRange) -> bool {
    oldest.map_or(false, |oldest| range.end_ms > oldest)
}

/// Lower bound per granularity finer than `per`: the start of the current slot
/// of the next coarser configured granularity.
pub fn lower_granularity_bounds(
    runtime: &AggregationRuntime,
    per: Granularity,
) -> Result<GranularityMap<i64>> {
    let now = runtime.clock().now_ms();
    let levels = runtime.levels();
    let mut bounds = GranularityMap::new();
    for granularity in levels.keys().filter(|granularity| *granularity < per) {
        let coarser = levels.next_coarser(granularity).unwrap_or(per);
        bounds.insert(granularity, coarser.bucket_start(now, runtime.offset())?);
    }
    Ok(bounds)
}
