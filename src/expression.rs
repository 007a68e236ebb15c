//! Expressions evaluated by a retrieval.
//!
//! `WithinExpression` and `PerExpression` resolve the time range and requested
//! granularity from the query event. Output expressions map bucket rows into
//! the query's output schema.

use crate::aggregation::pipeline::add_values;
use crate::error::{Error, Result};
use crate::event::{QueryEvent, Row, TimeRange, Value};
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};

/// Resolves the `[start, end)` range of a retrieval.
#[derive(Debug, Clone, PartialEq)]
pub enum WithinExpression {
    Fixed { start_ms: i64, end_ms: i64 },
    /// Indices of the start and end attributes in the query event.
    Attributes { start: usize, end: usize },
}

impl WithinExpression {
    pub fn evaluate(&self, event: &QueryEvent) -> Result<TimeRange> {
        let (start_ms, end_ms) = match self {
            WithinExpression::Fixed { start_ms, end_ms } => (*start_ms, *end_ms),
            WithinExpression::Attributes { start, end } => {
                let start = attribute_timestamp(event, *start)?;
                let end = attribute_timestamp(event, *end)?;
                (start, end)
            }
        };
        if start_ms > end_ms {
            return Err(Error::InvalidTimeRange { start_ms, end_ms });
        }
        Ok(TimeRange::new(start_ms, end_ms))
    }
}

fn attribute_timestamp(event: &QueryEvent, index: usize) -> Result<i64> {
    match event.get(index) {
        None | Some(Value::Null) => Err(Error::MissingTimeRange),
        Some(Value::Str(text)) => parse_timestamp(text),
        Some(value) => value
            .as_i64()
            .ok_or_else(|| Error::InvalidTimestamp(value.to_string())),
    }
}

/// Parse `yyyy-MM-dd HH:mm:ss` with an optional ` +HH:MM` suffix into epoch millis.
pub fn parse_timestamp(text: &str) -> Result<i64> {
    let text = text.trim();
    let with_offset = format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second] [offset_hour sign:mandatory]:[offset_minute]"
    );
    let plain = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

    let parsed = OffsetDateTime::parse(text, with_offset).or_else(|_| {
        PrimitiveDateTime::parse(text, plain).map(PrimitiveDateTime::assume_utc)
    });
    match parsed {
        Ok(datetime) => Ok((datetime.unix_timestamp_nanos() / 1_000_000) as i64),
        Err(_) => Err(Error::InvalidTimestamp(text.to_string())),
    }
}

/// Resolves the requested granularity token.
#[derive(Debug, Clone, PartialEq)]
pub enum PerExpression {
    Fixed(String),
    /// Index of the token attribute in the query event.
    Attribute(usize),
}

impl PerExpression {
    pub fn evaluate(&self, event: &QueryEvent) -> Result<String> {
        match self {
            PerExpression::Fixed(token) => Ok(token.clone()),
            PerExpression::Attribute(index) => match event.get(*index) {
                None | Some(Value::Null) => Err(Error::InvalidGranularity {
                    token: Value::Null.to_string(),
                    expected: crate::granularity::Granularity::accepted(),
                }),
                Some(value) => Ok(value.to_string()),
            },
        }
    }
}

/// Maps a bucket row to one output attribute.
///
/// Stateful implementations must return to their initial state when they see a
/// row for which [`Row::is_reset`] holds.
pub trait OutputExpression: Send {
    fn execute(&mut self, row: &Row) -> Value;
}

/// The bucket's slot start.
#[derive(Debug, Clone, Copy, Default)]
pub struct BucketTimestamp;

impl OutputExpression for BucketTimestamp {
    fn execute(&mut self, row: &Row) -> Value {
        if row.is_reset() {
            return Value::Null;
        }
        Value::Int(row.timestamp_ms)
    }
}

/// Copies one internal attribute.
#[derive(Debug, Clone, Copy)]
pub struct Attribute(pub usize);

impl OutputExpression for Attribute {
    fn execute(&mut self, row: &Row) -> Value {
        row.get(self.0).cloned().unwrap_or_default()
    }
}

/// `sum / count` over two partial-aggregate columns.
#[derive(Debug, Clone, Copy)]
pub struct Average {
    pub sum: usize,
    pub count: usize,
}

impl OutputExpression for Average {
    fn execute(&mut self, row: &Row) -> Value {
        let sum = row.get(self.sum).and_then(Value::as_f64);
        let count = row.get(self.count).and_then(Value::as_f64);
        match (sum, count) {
            (Some(sum), Some(count)) if count > 0.0 => Value::Float(sum / count),
            _ => Value::Null,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Constant(pub Value);

impl OutputExpression for Constant {
    fn execute(&mut self, _row: &Row) -> Value {
        self.0.clone()
    }
}

/// Cumulative sum of a column across the rows of one retrieval.
#[derive(Debug, Clone)]
pub struct RunningSum {
    column: usize,
    total: Value,
}

impl RunningSum {
    pub fn new(column: usize) -> Self {
        Self {
            column,
            total: Value::Null,
        }
    }

    pub fn total(&self) -> &Value {
        &self.total
    }
}

impl OutputExpression for RunningSum {
    fn execute(&mut self, row: &Row) -> Value {
        if row.is_reset() {
            self.total = Value::Null;
            return Value::Null;
        }
        if let Some(value) = row.get(self.column) {
            self.total = add_values(&self.total, value);
        }
        self.total.clone()
    }
}
