//! Rows and chunks flowing through a retrieval.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A single attribute value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(v) => Some(*v as f64),
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Ordering between comparable values; numbers compare across int/float.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            _ => self.as_f64()?.partial_cmp(&other.as_f64()?),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(v) => f.write_str(v),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

/// Marks whether a row carries data or is the end-of-retrieval reset marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowKind {
    #[default]
    Current,
    Reset,
}

/// A timestamped, fixed-width attribute vector.
///
/// Bucket rows hold the internal schema (group-by columns followed by partial
/// aggregates); projected rows hold the query's output schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub timestamp_ms: i64,
    pub values: Vec<Value>,
    pub kind: RowKind,
}

impl Row {
    pub fn new(timestamp_ms: i64, values: Vec<Value>) -> Self {
        Self {
            timestamp_ms,
            values,
            kind: RowKind::Current,
        }
    }

    /// The synthetic marker fed to output expressions after the last row.
    pub fn reset_marker(width: usize) -> Self {
        Self {
            timestamp_ms: 0,
            values: vec![Value::Null; width],
            kind: RowKind::Reset,
        }
    }

    pub fn is_reset(&self) -> bool {
        self.kind == RowKind::Reset
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn width(&self) -> usize {
        self.values.len()
    }
}

/// Ordered working buffer owned by a single retrieval.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventChunk {
    rows: Vec<Row>,
}

impl EventChunk {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            rows: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, row: Row) {
        self.rows.push(row);
    }

    /// Move every row of `other` to the end of this chunk.
    pub fn append(&mut self, other: EventChunk) {
        self.rows.extend(other.rows);
    }

    pub fn retain<F>(&mut self, keep: F)
    where
        F: FnMut(&Row) -> bool,
    {
        self.rows.retain(keep);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Row> {
        self.rows.iter()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }
}

impl From<Vec<Row>> for EventChunk {
    fn from(rows: Vec<Row>) -> Self {
        Self { rows }
    }
}

impl FromIterator<Row> for EventChunk {
    fn from_iter<I: IntoIterator<Item = Row>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for EventChunk {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a EventChunk {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

/// The event a retrieval is matched against (the on-demand query or join side).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryEvent {
    pub timestamp_ms: i64,
    pub values: Vec<Value>,
}

impl QueryEvent {
    pub fn new(timestamp_ms: i64, values: Vec<Value>) -> Self {
        Self {
            timestamp_ms,
            values,
        }
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }
}

/// Half-open `[start_ms, end_ms)` interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start_ms: i64,
    pub end_ms: i64,
}

impl TimeRange {
    pub fn new(start_ms: i64, end_ms: i64) -> Self {
        Self { start_ms, end_ms }
    }

    pub fn contains(&self, timestamp_ms: i64) -> bool {
        timestamp_ms >= self.start_ms && timestamp_ms < self.end_ms
    }
}
