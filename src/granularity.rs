//! Granularity ladder.
//!
//! Supported time units ordered finest to coarsest, slot arithmetic for each
//! unit, and an ordinal-indexed map for per-granularity collaborators.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::{Date, Month, OffsetDateTime, UtcOffset};

const SECOND_MS: i64 = 1_000;
const MINUTE_MS: i64 = 60 * SECOND_MS;
const HOUR_MS: i64 = 60 * MINUTE_MS;
const DAY_MS: i64 = 24 * HOUR_MS;

/// A time-bucketing unit. Variant order is the ladder order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Seconds,
    Minutes,
    Hours,
    Days,
    Months,
    Years,
}

impl Granularity {
    /// Every ladder value, finest first.
    pub const ALL: [Granularity; 6] = [
        Granularity::Seconds,
        Granularity::Minutes,
        Granularity::Hours,
        Granularity::Days,
        Granularity::Months,
        Granularity::Years,
    ];

    pub fn ordinal(self) -> usize {
        self as usize
    }

    pub fn from_ordinal(ordinal: usize) -> Option<Self> {
        Self::ALL.get(ordinal).copied()
    }

    /// Normalize a free-form duration token such as `"min"`, `"Hours"` or `" day "`.
    pub fn normalize(token: &str) -> Result<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "sec" | "second" | "seconds" => Ok(Granularity::Seconds),
            "min" | "minute" | "minutes" => Ok(Granularity::Minutes),
            "hour" | "hours" => Ok(Granularity::Hours),
            "day" | "days" => Ok(Granularity::Days),
            "month" | "months" => Ok(Granularity::Months),
            "year" | "years" => Ok(Granularity::Years),
            _ => Err(Error::InvalidGranularity {
                token: token.to_string(),
                expected: Self::accepted(),
            }),
        }
    }

    /// Comma separated list of the ladder, used in validation messages.
    pub fn accepted() -> String {
        Self::ALL
            .iter()
            .map(|granularity| granularity.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Width of one slot for the fixed-width units.
    pub fn fixed_width_ms(self) -> Option<i64> {
        match self {
            Granularity::Seconds => Some(SECOND_MS),
            Granularity::Minutes => Some(MINUTE_MS),
            Granularity::Hours => Some(HOUR_MS),
            Granularity::Days => Some(DAY_MS),
            Granularity::Months | Granularity::Years => None,
        }
    }

    /// Start of the slot containing `timestamp_ms`, evaluated in local time at `offset`.
    pub fn bucket_start(self, timestamp_ms: i64, offset: UtcOffset) -> Result<i64> {
        let out_of_range = || Error::TimestampOutOfRange(timestamp_ms);
        let offset_ms = i64::from(offset.whole_seconds()) * SECOND_MS;
        let local_ms = timestamp_ms.checked_add(offset_ms).ok_or_else(out_of_range)?;

        if let Some(width) = self.fixed_width_ms() {
            return local_ms
                .checked_sub(local_ms.rem_euclid(width))
                .and_then(|start| start.checked_sub(offset_ms))
                .ok_or_else(out_of_range);
        }

        let local = OffsetDateTime::from_unix_timestamp_nanos(i128::from(local_ms) * 1_000_000)
            .map_err(|_| out_of_range())?;
        let (year, month) = match self {
            Granularity::Years => (local.year(), Month::January),
            _ => (local.year(), local.month()),
        };
        let first_day = Date::from_calendar_date(year, month, 1)
            .map_err(|_| out_of_range())?;
        let start_nanos = first_day.midnight().assume_utc().unix_timestamp_nanos();
        i64::try_from(start_nanos / 1_000_000)
            .ok()
            .and_then(|start| start.checked_sub(offset_ms))
            .ok_or_else(out_of_range)
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Granularity::Seconds => "SECONDS",
            Granularity::Minutes => "MINUTES",
            Granularity::Hours => "HOURS",
            Granularity::Days => "DAYS",
            Granularity::Months => "MONTHS",
            Granularity::Years => "YEARS",
        };
        f.write_str(name)
    }
}

impl FromStr for Granularity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::normalize(s)
    }
}

/// Parse a fixed UTC offset.
///
/// Accepts `UTC`, `Z`, `+HH:MM`, `+HHMM` and `+HH` (and the negative forms).
pub fn parse_utc_offset(s: &str) -> Result<UtcOffset> {
    let s = s.trim();
    if s.eq_ignore_ascii_case("utc") || s.eq_ignore_ascii_case("z") || s.is_empty() {
        return Ok(UtcOffset::UTC);
    }

    let invalid = || Error::Config(format!("invalid utc offset: {s}"));
    let sign = match s.as_bytes()[0] {
        b'+' => 1,
        b'-' => -1,
        _ => return Err(invalid()),
    };
    let digits: String = s[1..].chars().filter(|c| *c != ':').collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    let (hours, minutes) = match digits.len() {
        2 => (digits.parse::<i32>().map_err(|_| invalid())?, 0),
        4 => (
            digits[..2].parse::<i32>().map_err(|_| invalid())?,
            digits[2..].parse::<i32>().map_err(|_| invalid())?,
        ),
        _ => return Err(invalid()),
    };
    if minutes >= 60 {
        return Err(invalid());
    }
    UtcOffset::from_whole_seconds(sign * (hours * 3600 + minutes * 60)).map_err(|_| invalid())
}

/// Per-granularity slots indexed by ladder ordinal.
///
/// Built once when an aggregation is set up and only read during retrieval.
#[derive(Debug, Clone)]
pub struct GranularityMap<T> {
    slots: [Option<T>; 6],
}

impl<T> Default for GranularityMap<T> {
    fn default() -> Self {
        Self {
            slots: [(); 6].map(|_| None),
        }
    }
}

impl<T> GranularityMap<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, granularity: Granularity, value: T) -> Option<T> {
        self.slots[granularity.ordinal()].replace(value)
    }

    pub fn get(&self, granularity: Granularity) -> Option<&T> {
        self.slots[granularity.ordinal()].as_ref()
    }

    pub fn contains(&self, granularity: Granularity) -> bool {
        self.slots[granularity.ordinal()].is_some()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured entries, finest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (Granularity, &T)> + '_ {
        Granularity::ALL
            .into_iter()
            .zip(self.slots.iter())
            .filter_map(|(granularity, slot)| slot.as_ref().map(|value| (granularity, value)))
    }

    pub fn keys(&self) -> impl DoubleEndedIterator<Item = Granularity> + '_ {
        self.iter().map(|(granularity, _)| granularity)
    }

    pub fn finest(&self) -> Option<Granularity> {
        self.keys().next()
    }

    /// Position of `granularity` among the configured entries.
    pub fn index_of(&self, granularity: Granularity) -> Option<usize> {
        self.keys().position(|key| key == granularity)
    }

    /// Configured entries strictly finer than `granularity`, finest first.
    pub fn finer_than(
        &self,
        granularity: Granularity,
    ) -> impl DoubleEndedIterator<Item = (Granularity, &T)> + '_ {
        self.iter().filter(move |(key, _)| *key < granularity)
    }

    /// Configured entries from `granularity` down to the finest one.
    pub fn down_from(&self, granularity: Granularity) -> impl Iterator<Item = (Granularity, &T)> + '_ {
        self.iter().rev().filter(move |(key, _)| *key <= granularity)
    }

    /// The closest configured granularity coarser than `granularity`.
    pub fn next_coarser(&self, granularity: Granularity) -> Option<Granularity> {
        self.keys().find(|key| *key > granularity)
    }
}

impl<T> FromIterator<(Granularity, T)> for GranularityMap<T> {
    fn from_iter<I: IntoIterator<Item = (Granularity, T)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (granularity, value) in iter {
            map.insert(granularity, value);
        }
        map
    }
}
