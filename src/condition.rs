//! Compiled conditions.
//!
//! Every filter a retrieval runs (persisted range lookups, the in-memory range
//! filter, and the final on-condition) goes through [`CompiledCondition`]. The
//! orchestrator picks which instance to run by pipeline stage.

use crate::error::Result;
use crate::event::{EventChunk, QueryEvent, Row, TimeRange};
use crate::granularity::{Granularity, GranularityMap};
use std::fmt;
use std::sync::Arc;

/// Row-level predicate evaluated against the query event.
pub type RowPredicate = Arc<dyn Fn(&Row, &QueryEvent) -> bool + Send + Sync>;

/// The query event together with the bounds resolved for this retrieval.
#[derive(Debug, Clone)]
pub struct MatchingEvent<'a> {
    pub event: &'a QueryEvent,
    pub range: TimeRange,
    /// Lower timestamp bound per finer granularity, populated in distributed mode only.
    pub lower_bounds: GranularityMap<i64>,
}

impl<'a> MatchingEvent<'a> {
    pub fn new(event: &'a QueryEvent, range: TimeRange) -> Self {
        Self {
            event,
            range,
            lower_bounds: GranularityMap::new(),
        }
    }

    pub fn lower_bound(&self, granularity: Granularity) -> Option<i64> {
        self.lower_bounds.get(granularity).copied()
    }
}

/// A pre-built filter or join.
pub trait CompiledCondition: Send + Sync {
    /// Return the candidate rows that satisfy the condition, in their original order.
    fn apply(&self, candidates: EventChunk, matching: &MatchingEvent<'_>) -> Result<EventChunk>;
}

/// Keeps rows whose timestamp lies within the retrieval's time range.
///
/// A lower-granularity range additionally drops rows older than the bound
/// populated for its granularity.
#[derive(Clone, Default)]
pub struct RangeCondition {
    lower_bound: Option<Granularity>,
    predicate: Option<RowPredicate>,
}

impl RangeCondition {
    pub fn within() -> Self {
        Self::default()
    }

    pub fn lower_granularity(granularity: Granularity) -> Self {
        Self {
            lower_bound: Some(granularity),
            predicate: None,
        }
    }

    /// Add a group/attribute predicate that must also hold.
    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Row, &QueryEvent) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    fn matches(&self, row: &Row, matching: &MatchingEvent<'_>) -> bool {
        if !matching.range.contains(row.timestamp_ms) {
            return false;
        }
        if let Some(bound) = self.lower_bound.and_then(|g| matching.lower_bound(g)) {
            if row.timestamp_ms < bound {
                return false;
            }
        }
        self.predicate
            .as_ref()
            .map_or(true, |predicate| predicate(row, matching.event))
    }
}

impl CompiledCondition for RangeCondition {
    fn apply(&self, mut candidates: EventChunk, matching: &MatchingEvent<'_>) -> Result<EventChunk> {
        candidates.retain(|row| self.matches(row, matching));
        Ok(candidates)
    }
}

impl fmt::Debug for RangeCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RangeCondition")
            .field("lower_bound", &self.lower_bound)
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}

/// Post-aggregation filter/join against the query event.
#[derive(Clone, Default)]
pub struct OnCondition {
    predicate: Option<RowPredicate>,
}

impl OnCondition {
    /// Matches every projected row.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&Row, &QueryEvent) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Some(Arc::new(predicate)),
        }
    }
}

impl CompiledCondition for OnCondition {
    fn apply(&self, mut candidates: EventChunk, matching: &MatchingEvent<'_>) -> Result<EventChunk> {
        if let Some(predicate) = &self.predicate {
            candidates.retain(|row| predicate(row, matching.event));
        }
        Ok(candidates)
    }
}

impl fmt::Debug for OnCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnCondition")
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}
