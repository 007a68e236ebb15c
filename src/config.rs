//! Aggregation configuration.
//!
//! Defines the identity, retained granularities and deployment topology of an
//! aggregation, with JSON persistence.

use crate::error::{Error, Result};
use crate::granularity::{parse_utc_offset, Granularity};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use time::UtcOffset;

/// Deployment topology of an aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topology {
    /// In-memory accumulators on this node hold every unflushed bucket.
    #[default]
    SingleNode,
    /// No trustworthy local buffer; unflushed gaps are read from finer persisted tables.
    Distributed,
}

/// Configuration for one aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Aggregation identifier, reported in validation errors.
    pub id: String,

    /// Granularities the aggregation retains.
    pub granularities: Vec<Granularity>,

    /// Default: single node
    #[serde(default)]
    pub topology: Topology,

    /// Event time is supplied by the data rather than derived from arrival.
    /// Default: false
    #[serde(default)]
    pub external_timestamps: bool,

    /// Fixed offset used to align day, month and year slots.
    /// Default: "UTC"
    #[serde(default = "default_utc_offset")]
    pub utc_offset: String,
}

fn default_utc_offset() -> String {
    "UTC".to_string()
}

impl AggregationConfig {
    pub fn new(id: impl Into<String>, granularities: Vec<Granularity>) -> Self {
        Self {
            id: id.into(),
            granularities,
            topology: Topology::default(),
            external_timestamps: false,
            utc_offset: default_utc_offset(),
        }
    }

    pub fn with_topology(mut self, topology: Topology) -> Self {
        self.topology = topology;
        self
    }

    pub fn with_external_timestamps(mut self, external: bool) -> Self {
        self.external_timestamps = external;
        self
    }

    pub fn with_utc_offset(mut self, offset: impl Into<String>) -> Self {
        self.utc_offset = offset.into();
        self
    }

    pub fn is_distributed(&self) -> bool {
        self.topology == Topology::Distributed
    }

    pub fn offset(&self) -> Result<UtcOffset> {
        parse_utc_offset(&self.utc_offset)
    }

    /// Check the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::Config("aggregation id must not be empty".to_string()));
        }
        if self.granularities.is_empty() {
            return Err(Error::Config(format!(
                "aggregation '{}' retains no granularities",
                self.id
            )));
        }
        let mut seen = [false; Granularity::ALL.len()];
        for granularity in &self.granularities {
            if std::mem::replace(&mut seen[granularity.ordinal()], true) {
                return Err(Error::Config(format!(
                    "aggregation '{}' lists {} more than once",
                    self.id, granularity
                )));
            }
        }
        self.offset()?;
        Ok(())
    }

    /// Save the configuration as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Load and validate a configuration from JSON.
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        let config: AggregationConfig = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }
}
