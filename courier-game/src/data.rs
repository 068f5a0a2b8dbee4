//! Feed parsing, run parameters and load errors
use serde::de::{DeserializeOwned, Error as _};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::courier::CourierConfig;
use crate::grid::{GridError, MapFeed};
use crate::weather::WeatherConfigError;

/// Parse a feed that is either bare or wrapped in a `{"data": ...}` envelope.
///
/// # Errors
///
/// Returns the serde error when the JSON is malformed or does not match `T`.
pub fn parse_feed<T: DeserializeOwned>(json: &str) -> Result<T, serde_json::Error> {
    let value: Value = serde_json::from_str(json)?;
    serde_json::from_value(unwrap_envelope(value))
}

fn unwrap_envelope(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}

/// Raw job records from a feed: a bare array, `{"jobs": [...]}`, or either inside `data`.
///
/// Records stay as loose JSON so a malformed one can be skipped without losing the rest.
///
/// # Errors
///
/// Returns the serde error when the JSON is malformed or holds no job array.
pub fn parse_job_feed(json: &str) -> Result<Vec<Value>, serde_json::Error> {
    let value: Value = parse_feed(json)?;
    match value {
        Value::Array(records) => Ok(records),
        Value::Object(mut map) => match map.remove("jobs") {
            Some(Value::Array(records)) => Ok(records),
            _ => Err(serde_json::Error::custom("job feed has no `jobs` array")),
        },
        _ => Err(serde_json::Error::custom("job feed must be an array")),
    }
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to parse {what}: {source}")]
    Json {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("no map data available; the simulation cannot start")]
    MissingMap,
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error(transparent)]
    Weather(#[from] WeatherConfigError),
    #[error("run start time {0:?} is not a timestamp")]
    Clock(String),
}

/// Parameters for one simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default = "RunConfig::default_max_time")]
    pub max_time: f64,
    /// Income goal; zero disables the victory condition.
    #[serde(default)]
    pub goal: f64,
    #[serde(default = "RunConfig::default_random_jobs")]
    pub random_jobs: usize,
    #[serde(default)]
    pub courier: CourierConfig,
    /// Overrides the per-difficulty AI decision interval.
    #[serde(default)]
    pub decision_interval: Option<f64>,
    #[serde(default = "RunConfig::default_undo_depth")]
    pub undo_depth: usize,
}

impl RunConfig {
    const fn default_max_time() -> f64 {
        900.0
    }

    const fn default_random_jobs() -> usize {
        10
    }

    const fn default_undo_depth() -> usize {
        20
    }

    #[must_use]
    pub fn default_config() -> Self {
        Self::default()
    }

    /// Take `max_time` and `goal` from a map feed when it declares them.
    #[must_use]
    pub fn with_map_overrides(mut self, feed: &MapFeed) -> Self {
        if let Some(max_time) = feed.max_time.filter(|t| t.is_finite() && *t > 0.0) {
            self.max_time = max_time;
        }
        if let Some(goal) = feed.goal.filter(|g| g.is_finite() && *g >= 0.0) {
            self.goal = goal;
        }
        self
    }

    /// # Errors
    ///
    /// Returns a message naming the first out-of-range field.
    pub fn validate(&self) -> Result<(), String> {
        if !self.max_time.is_finite() || self.max_time <= 0.0 {
            return Err(format!("max_time must be positive (got {})", self.max_time));
        }
        if !self.goal.is_finite() || self.goal < 0.0 {
            return Err(format!("goal must be non-negative (got {})", self.goal));
        }
        if let Some(interval) = self.decision_interval
            && (!interval.is_finite() || interval <= 0.0)
        {
            return Err(format!("decision_interval must be positive (got {interval})"));
        }
        self.courier.validate()
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_time: Self::default_max_time(),
            goal: 0.0,
            random_jobs: Self::default_random_jobs(),
            courier: CourierConfig::default(),
            decision_interval: None,
            undo_depth: Self::default_undo_depth(),
        }
    }
}
