//! Per-aggregation collaborators a retrieval borrows.

use crate::aggregation::{AggregatePipeline, GroupKeyGenerator};
use crate::clock::{Clock, SystemClock};
use crate::config::AggregationConfig;
use crate::error::{Error, Result};
use crate::granularity::{Granularity, GranularityMap};
use crate::store::{BucketAccumulator, BucketStore};
use std::sync::Arc;
use time::UtcOffset;

/// Everything kept for one retained granularity.
#[derive(Clone)]
pub struct GranularityLevel {
    pub store: Arc<dyn BucketStore>,
    pub accumulator: Arc<dyn BucketAccumulator>,
    pub key_generator: Arc<dyn GroupKeyGenerator>,
    pub pipeline: AggregatePipeline,
}

impl GranularityLevel {
    pub fn new(
        store: Arc<dyn BucketStore>,
        accumulator: Arc<dyn BucketAccumulator>,
        key_generator: Arc<dyn GroupKeyGenerator>,
        pipeline: AggregatePipeline,
    ) -> Self {
        Self {
            store,
            accumulator,
            key_generator,
            pipeline,
        }
    }
}

/// A configured aggregation: its config, clock and one level per granularity.
///
/// Read-only once built, so it can be shared across concurrent retrievals.
pub struct AggregationRuntime {
    config: AggregationConfig,
    offset: UtcOffset,
    levels: GranularityMap<GranularityLevel>,
    clock: Arc<dyn Clock>,
}

impl AggregationRuntime {
    pub fn builder(config: AggregationConfig) -> AggregationRuntimeBuilder {
        AggregationRuntimeBuilder {
            config,
            levels: GranularityMap::new(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn config(&self) -> &AggregationConfig {
        &self.config
    }

    pub fn offset(&self) -> UtcOffset {
        self.offset
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn levels(&self) -> &GranularityMap<GranularityLevel> {
        &self.levels
    }

    /// The level for `granularity`, or `UnsupportedGranularity` if it is not retained.
    pub fn level(&self, granularity: Granularity) -> Result<&GranularityLevel> {
        self.levels
            .get(granularity)
            .ok_or_else(|| Error::UnsupportedGranularity {
                granularity,
                aggregation: self.config.id.clone(),
            })
    }
}

pub struct AggregationRuntimeBuilder {
    config: AggregationConfig,
    levels: GranularityMap<GranularityLevel>,
    clock: Arc<dyn Clock>,
}

impl AggregationRuntimeBuilder {
    pub fn level(mut self, granularity: Granularity, level: GranularityLevel) -> Self {
        self.levels.insert(granularity, level);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Validate the config and check there is exactly one level per retained granularity.
    pub fn build(self) -> Result<AggregationRuntime> {
        self.config.validate()?;

        for granularity in &self.config.granularities {
            if !self.levels.contains(*granularity) {
                return Err(Error::Config(format!(
                    "aggregation '{}' retains {} but no level was supplied",
                    self.config.id, granularity
                )));
            }
        }
        for granularity in self.levels.keys() {
            if !self.config.granularities.contains(&granularity) {
                return Err(Error::Config(format!(
                    "aggregation '{}' was given a {} level it does not retain",
                    self.config.id, granularity
                )));
            }
        }

        Ok(AggregationRuntime {
            offset: self.config.offset()?,
            config: self.config,
            levels: self.levels,
            clock: self.clock,
        })
    }
}
