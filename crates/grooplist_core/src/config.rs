//! Core runtime configuration.
//!
//! # Responsibility
//! - Hold tunables for proximity, positioning and list reconciliation.
//! - Reject invalid values at configuration time, never at call time.
//!
//! # Invariants
//! - A validated config always has a positive finite threshold, non-zero
//!   positioning timings, and a store catalog with unique, valid entries.

use crate::model::geo::{default_store_catalog, GeoError, PointOfInterest};
use crate::proximity::distance::DistanceUnit;
use crate::proximity::notifier::{ProximityConfig, DEFAULT_PROXIMITY_THRESHOLD};
use crate::service::location_service::PositionOptions;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

pub const DEFAULT_SAMPLE_INTERVAL_MS: u64 = 120_000;
pub const DEFAULT_POSITION_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_MAX_SAMPLE_AGE_MS: u64 = 300_000;
pub const DEFAULT_PENDING_MATCH_WINDOW_MS: u64 = 30_000;

#[derive(Debug)]
pub enum ConfigError {
    InvalidThreshold(f64),
    ZeroDuration(&'static str),
    InvalidStore { id: String, source: GeoError },
    DuplicateStoreId(String),
    Parse(serde_json::Error),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidThreshold(value) => {
                write!(f, "proximity threshold must be positive and finite, got {value}")
            }
            Self::ZeroDuration(field) => write!(f, "`{field}` must be greater than zero"),
            Self::InvalidStore { id, source } => write!(f, "store `{id}`: {source}"),
            Self::DuplicateStoreId(id) => write!(f, "store id `{id}` appears more than once"),
            Self::Parse(err) => write!(f, "invalid config json: {err}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidStore { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value)
    }
}

/// Tunables for one core instance. Missing JSON fields take defaults.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub proximity_threshold: f64,
    pub distance_unit: DistanceUnit,
    /// Interval between positioning samples while tracking is enabled.
    pub sample_interval_ms: u64,
    pub position_timeout_ms: u64,
    /// Oldest cached sensor fix the sensor may return.
    pub max_sample_age_ms: u64,
    /// Maximum client-time skew for matching a pending item to a document.
    pub pending_match_window_ms: u64,
    pub stores: Vec<PointOfInterest>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            proximity_threshold: DEFAULT_PROXIMITY_THRESHOLD,
            distance_unit: DistanceUnit::Miles,
            sample_interval_ms: DEFAULT_SAMPLE_INTERVAL_MS,
            position_timeout_ms: DEFAULT_POSITION_TIMEOUT_MS,
            max_sample_age_ms: DEFAULT_MAX_SAMPLE_AGE_MS,
            pending_match_window_ms: DEFAULT_PENDING_MATCH_WINDOW_MS,
            stores: default_store_catalog(),
        }
    }
}

impl CoreConfig {
    /// Parses a JSON override document and validates the result.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.proximity()?;
        for (field, value) in [
            ("sample_interval_ms", self.sample_interval_ms),
            ("position_timeout_ms", self.position_timeout_ms),
            ("max_sample_age_ms", self.max_sample_age_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::ZeroDuration(field));
            }
        }

        let mut seen = BTreeSet::new();
        for store in &self.stores {
            store.validate().map_err(|source| ConfigError::InvalidStore {
                id: store.id.clone(),
                source,
            })?;
            if !seen.insert(store.id.as_str()) {
                return Err(ConfigError::DuplicateStoreId(store.id.clone()));
            }
        }
        Ok(())
    }

    pub fn proximity(&self) -> Result<ProximityConfig, ConfigError> {
        ProximityConfig::new(self.proximity_threshold, self.distance_unit)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn pending_match_window_ms(&self) -> i64 {
        i64::try_from(self.pending_match_window_ms).unwrap_or(i64::MAX)
    }

    pub fn position_options(&self) -> PositionOptions {
        PositionOptions {
            high_accuracy: true,
            timeout: Duration::from_millis(self.position_timeout_ms),
            max_staleness: Duration::from_millis(self.max_sample_age_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, CoreConfig};
    use std::time::Duration;

    #[test]
    fn default_config_is_valid_and_matches_positioning_contract() {
        let config = CoreConfig::default();
        config.validate().unwrap();
        let options = config.position_options();
        assert_eq!(options.timeout, Duration::from_secs(10));
        assert_eq!(options.max_staleness, Duration::from_secs(300));
        assert_eq!(config.sample_interval(), Duration::from_secs(120));
        assert_eq!(config.proximity().unwrap().threshold(), 0.5);
    }

    #[test]
    fn from_json_applies_overrides_and_keeps_defaults() {
        let config =
            CoreConfig::from_json(r#"{"proximity_threshold": 0.8, "distance_unit": "kilometers"}"#)
                .unwrap();
        assert_eq!(config.proximity_threshold, 0.8);
        assert_eq!(config.stores.len(), 4);
    }

    #[test]
    fn from_json_rejects_zero_threshold() {
        let err = CoreConfig::from_json(r#"{"proximity_threshold": 0}"#).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidThreshold(_)));
    }

    #[test]
    fn duplicate_store_ids_are_rejected() {
        let mut config = CoreConfig::default();
        let first = config.stores[0].clone();
        config.stores.push(first);
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateStoreId(id) if id == "1"));
    }
}
