use crate::granularity::Granularity;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("start and end times for within duration cannot be retrieved")]
    MissingTimeRange,
    #[error("invalid time range: start {start_ms} is after end {end_ms}")]
    InvalidTimeRange { start_ms: i64, end_ms: i64 },
    #[error("per value '{token}' is not a valid granularity, expected one of {expected}")]
    InvalidGranularity { token: String, expected: String },
    #[error(
        "aggregate values for {granularity} granularity cannot be provided since aggregation \
         '{aggregation}' does not contain {granularity} duration"
    )]
    UnsupportedGranularity {
        granularity: Granularity,
        aggregation: String,
    },
    #[error("malformed bucket row: expected {expected} attributes, found {actual}")]
    MalformedRow { expected: usize, actual: usize },
    #[error("timestamp {0} is outside the supported calendar range")]
    TimestampOutOfRange(i64),
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Adapter(anyhow::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// True for the failures raised by validating the query itself, before any lookup.
    pub fn is_query_error(&self) -> bool {
        matches!(
            self,
            Error::MissingTimeRange
                | Error::InvalidTimeRange { .. }
                | Error::InvalidGranularity { .. }
                | Error::UnsupportedGranularity { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
