//! Bucket aggregation used at retrieval time.
//!
//! - [`AggregatePipeline`]: column-wise reduction of partial buckets
//! - [`GroupKeyGenerator`]: group identity of a bucket row
//! - [`InMemoryAggregator`]: buckets synthesized from unflushed accumulators
//! - [`OverlapAggregator`]: collapse of overlapping coverage by `(slot, group key)`

pub mod group;
pub mod in_memory;
pub mod pipeline;
pub mod reaggregate;

pub use group::{ColumnKeyGenerator, GroupKey, GroupKeyGenerator};
pub use in_memory::InMemoryAggregator;
pub use pipeline::{AggregatePipeline, BaseAggregator, PartialBucket};
pub use reaggregate::OverlapAggregator;
