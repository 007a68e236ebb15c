//! Incremental aggregate retrieval over multi-granularity time buckets.
//!
//! An aggregation keeps one persisted table and one in-memory accumulator per
//! configured granularity (seconds through years). Retrieval merges the
//! persisted buckets of the requested granularity with the data that has not
//! been flushed yet, without double counting at the boundary, and projects the
//! result through the query's output expressions.

pub mod aggregation;
pub mod clock;
pub mod condition;
pub mod config;
pub mod error;
pub mod event;
pub mod expression;
pub mod granularity;
pub mod retrieval;
pub mod store;

pub use config::{AggregationConfig, Topology};
pub use error::{Error, Result};
pub use event::{EventChunk, QueryEvent, Row, TimeRange, Value};
pub use granularity::{Granularity, GranularityMap};
pub use retrieval::{AggregationRuntime, CompiledAggregateQuery, GranularityLevel};
