//! Projection of bucket rows into the query's output schema.

use crate::event::{EventChunk, Row};
use crate::expression::OutputExpression;

/// Evaluate `outputs` over every bucket row, then reset them.
///
/// Each projected row keeps its bucket's timestamp. The reset pass runs
/// unconditionally, also when `buckets` is empty.
pub fn project(
    buckets: EventChunk,
    outputs: &mut [Box<dyn OutputExpression>],
    marker_width: usize,
) -> EventChunk {
    let mut projected = EventChunk::with_capacity(buckets.len());
    for bucket in &buckets {
        let values = outputs.iter_mut().map(|output| output.execute(bucket)).collect();
        projected.push(Row::new(bucket.timestamp_ms, values));
    }
    reset_outputs(outputs, marker_width);
    projected
}

/// Feed the reset marker to every output expression once.
pub fn reset_outputs(outputs: &mut [Box<dyn OutputExpression>], marker_width: usize) {
    let marker = Row::reset_marker(marker_width);
    for output in outputs.iter_mut() {
        output.execute(&marker);
    }
}
