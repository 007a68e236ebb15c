//! Reduction of partial buckets.

use crate::error::{Error, Result};
use crate::event::{Row, Value};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// How one internal column combines across partial buckets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseAggregator {
    /// Group-by attribute; keeps the first non-null value.
    GroupBy,
    Sum,
    Count,
    Min,
    Max,
    /// Value carried by the most recent row.
    Last,
    /// Event time of the most recent row folded into the bucket.
    ///
    /// A reduced bucket row is stamped with its slot start, so `Last` compares
    /// partials by this column instead of the row timestamp.
    LastTimestamp,
}

/// Column-wise reducers for one internal bucket schema.
///
/// A schema with a `Last` column always carries a `LastTimestamp` column;
/// [`AggregatePipeline::new`] appends one when it is missing. Raw rows may
/// leave it null, their own timestamp is used instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<BaseAggregator>", into = "Vec<BaseAggregator>")]
pub struct AggregatePipeline {
    columns: Vec<BaseAggregator>,
}

impl From<Vec<BaseAggregator>> for AggregatePipeline {
    fn from(columns: Vec<BaseAggregator>) -> Self {
        Self::new(columns)
    }
}

impl From<AggregatePipeline> for Vec<BaseAggregator> {
    fn from(pipeline: AggregatePipeline) -> Self {
        pipeline.columns
    }
}

impl AggregatePipeline {
    pub fn new(mut columns: Vec<BaseAggregator>) -> Self {
        if columns.contains(&BaseAggregator::Last)
            && !columns.contains(&BaseAggregator::LastTimestamp)
        {
            columns.push(BaseAggregator::LastTimestamp);
        }
        Self { columns }
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn columns(&self) -> &[BaseAggregator] {
        &self.columns
    }

    /// Start an empty bucket for `slot_ms`.
    pub fn start(&self, slot_ms: i64) -> PartialBucket {
        PartialBucket {
            slot_ms,
            values: vec![Value::Null; self.columns.len()],
            last_seen_ms: None,
        }
    }

    /// Fold one partial row into `bucket`.
    pub fn fold(&self, bucket: &mut PartialBucket, row: &Row) -> Result<()> {
        if row.width() != self.columns.len() {
            return Err(Error::MalformedRow {
                expected: self.columns.len(),
                actual: row.width(),
            });
        }

        let event_ms = self.event_time(row);
        let newest = bucket.last_seen_ms.map_or(true, |seen| event_ms >= seen);

        for ((aggregator, acc), value) in self
            .columns
            .iter()
            .zip(bucket.values.iter_mut())
            .zip(row.values.iter())
        {
            match aggregator {
                BaseAggregator::GroupBy => {
                    if acc.is_null() {
                        *acc = value.clone();
                    }
                }
                BaseAggregator::Sum | BaseAggregator::Count => *acc = add_values(acc, value),
                BaseAggregator::Min => {
                    if replaces(acc, value, Ordering::Less) {
                        *acc = value.clone();
                    }
                }
                BaseAggregator::Max => {
                    if replaces(acc, value, Ordering::Greater) {
                        *acc = value.clone();
                    }
                }
                BaseAggregator::Last => {
                    if newest && !value.is_null() {
                        *acc = value.clone();
                    }
                }
                BaseAggregator::LastTimestamp => {
                    if newest {
                        *acc = Value::Int(event_ms);
                    }
                }
            }
        }

        if newest {
            bucket.last_seen_ms = Some(event_ms);
        }
        Ok(())
    }

    /// Event time of `row`: its `LastTimestamp` value, or its timestamp for raw rows.
    fn event_time(&self, row: &Row) -> i64 {
        self.columns
            .iter()
            .position(|column| *column == BaseAggregator::LastTimestamp)
            .and_then(|index| row.get(index))
            .and_then(Value::as_i64)
            .unwrap_or(row.timestamp_ms)
    }

    /// Reduce `rows` into a single bucket at `slot_ms`.
    pub fn reduce<'r, I>(&self, slot_ms: i64, rows: I) -> Result<Row>
    where
        I: IntoIterator<Item = &'r Row>,
    {
        let mut bucket = self.start(slot_ms);
        for row in rows {
            self.fold(&mut bucket, row)?;
        }
        Ok(bucket.finish())
    }
}

/// A bucket being reduced.
#[derive(Debug, Clone, PartialEq)]
pub struct PartialBucket {
    slot_ms: i64,
    values: Vec<Value>,
    last_seen_ms: Option<i64>,
}

impl PartialBucket {
    pub fn slot_ms(&self) -> i64 {
        self.slot_ms
    }

    pub fn finish(self) -> Row {
        Row::new(self.slot_ms, self.values)
    }
}

fn replaces(current: &Value, candidate: &Value, wanted: Ordering) -> bool {
    if candidate.is_null() {
        return false;
    }
    current.is_null() || candidate.compare(current) == Some(wanted)
}

/// Numeric addition treating null as the identity.
///
/// Integer sums stay integral until they overflow.
pub fn add_values(a: &Value, b: &Value) -> Value {
    match (a, b) {
        (Value::Null, other) | (other, Value::Null) => other.clone(),
        (Value::Int(x), Value::Int(y)) => x
            .checked_add(*y)
            .map(Value::Int)
            .unwrap_or(Value::Float(*x as f64 + *y as f64)),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => Value::Float(x + y),
            _ => a.clone(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pipeline() -> AggregatePipeline {
        AggregatePipeline::new(vec![
            BaseAggregator::GroupBy,
            BaseAggregator::Sum,
            BaseAggregator::Count,
            BaseAggregator::Min,
            BaseAggregator::Max,
            BaseAggregator::Last,
        ])
    }

    /// A raw row; the trailing `LastTimestamp` column is left null.
    fn row(ts: i64, sum: Value, count: i64, min: f64, max: f64, last: impl Into<Value>) -> Row {
        Row::new(
            ts,
            vec![
                Value::from("IBM"),
                sum,
                Value::Int(count),
                Value::Float(min),
                Value::Float(max),
                last.into(),
                Value::Null,
            ],
        )
    }

    #[test]
    fn test_last_appends_timestamp_column() {
        let p = pipeline();
        assert_eq!(p.width(), 7);
        assert_eq!(p.columns()[6], BaseAggregator::LastTimestamp);

        let explicit = AggregatePipeline::new(vec![
            BaseAggregator::LastTimestamp,
            BaseAggregator::Last,
        ]);
        assert_eq!(explicit.width(), 2);
        assert_eq!(AggregatePipeline::new(vec![BaseAggregator::Sum]).width(), 1);
    }

    #[test]
    fn test_pipeline_json_is_column_list() {
        let json = serde_json::to_string(&AggregatePipeline::new(vec![BaseAggregator::Sum]))
            .unwrap();
        assert_eq!(json, r#"["sum"]"#);

        let loaded: AggregatePipeline = serde_json::from_str(r#"["group_by", "last"]"#).unwrap();
        assert_eq!(
            loaded.columns(),
            &[
                BaseAggregator::GroupBy,
                BaseAggregator::Last,
                BaseAggregator::LastTimestamp
            ]
        );
    }

    #[test]
    fn test_reduce_partials() {
        let rows = vec![
            row(2_000, Value::Int(10), 2, 3.0, 7.0, "b"),
            row(1_000, Value::Float(2.5), 1, 1.5, 2.5, "a"),
            row(3_000, Value::Null, 4, 4.0, 9.0, "c"),
        ];
        let reduced = pipeline().reduce(0, &rows).unwrap();

        assert_eq!(reduced.timestamp_ms, 0);
        assert_eq!(
            reduced.values,
            vec![
                Value::from("IBM"),
                Value::Float(12.5),
                Value::Int(7),
                Value::Float(1.5),
                Value::Float(9.0),
                Value::from("c"),
                Value::Int(3_000),
            ]
        );
    }

    #[test]
    fn test_last_keeps_later_arrival_on_tie() {
        let rows = vec![
            row(5, Value::Int(1), 1, 1.0, 1.0, "first"),
            row(5, Value::Int(1), 1, 1.0, 1.0, "second"),
            row(4, Value::Int(1), 1, 1.0, 1.0, "older"),
        ];
        let reduced = pipeline().reduce(0, &rows).unwrap();
        assert_eq!(reduced.values[5], Value::from("second"));
    }

    #[test]
    fn test_last_survives_two_stage_reduce() {
        let p = pipeline();
        let late = row(5, Value::Int(1), 1, 1.0, 1.0, "late");
        let early = row(1, Value::Int(1), 1, 1.0, 1.0, "early");

        let left = p.reduce(0, [&late]).unwrap();
        let right = p.reduce(0, [&early]).unwrap();
        let merged = p.reduce(0, [&left, &right]).unwrap();
        let direct = p.reduce(0, [&late, &early]).unwrap();

        assert_eq!(merged.values, direct.values);
        assert_eq!(merged.values[5], Value::from("late"));
        assert_eq!(merged.values[6], Value::Int(5));
    }

    #[test]
    fn test_reduce_matches_union() {
        // Partials arrive newest first, every row carries a distinct last value.
        let rows: Vec<Row> = (0..6)
            .map(|i| row(i, Value::Int(i), 1, i as f64, i as f64, format!("v{i}")))
            .collect();
        let p = pipeline();
        let newer = p.reduce(0, &rows[3..]).unwrap();
        let older = p.reduce(0, &rows[..3]).unwrap();
        let merged = p.reduce(0, [&newer, &older]).unwrap();
        let direct = p.reduce(0, &rows).unwrap();
        assert_eq!(merged.values, direct.values);
        assert_eq!(merged.values[5], Value::from("v5"));
    }

    #[test]
    fn test_width_mismatch() {
        let err = pipeline()
            .reduce(0, &[Row::new(0, vec![Value::Int(1)])])
            .unwrap_err();
        assert!(matches!(err, Error::MalformedRow { expected: 7, actual: 1 }));
    }

    #[test]
    fn test_add_values_overflow_promotes() {
        assert_eq!(
            add_values(&Value::Int(i64::MAX), &Value::Int(1)),
            Value::Float(i64::MAX as f64 + 1.0)
        );
        assert_eq!(add_values(&Value::Null, &Value::Int(3)), Value::Int(3));
    }
}
