//! Geographic value types shared by distance and proximity logic.
//!
//! # Responsibility
//! - Define `Location` samples and static `PointOfInterest` records.
//! - Reject non-finite or out-of-range coordinates at construction time.
//!
//! # Invariants
//! - Every constructed value has finite latitude in `[-90, 90]` and
//!   longitude in `[-180, 180]`.
//! - `PointOfInterest` values are immutable reference data.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Coordinate validation failures.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GeoError {
    /// Latitude or longitude is NaN or infinite.
    NonFinite { latitude: f64, longitude: f64 },
    /// Latitude or longitude lies outside the valid degree range.
    OutOfRange { latitude: f64, longitude: f64 },
}

impl Display for GeoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonFinite {
                latitude,
                longitude,
            } => write!(f, "coordinate is not finite: ({latitude}, {longitude})"),
            Self::OutOfRange {
                latitude,
                longitude,
            } => write!(f, "coordinate out of range: ({latitude}, {longitude})"),
        }
    }
}

impl Error for GeoError {}

/// Validates one latitude/longitude pair.
pub fn validate_coordinates(latitude: f64, longitude: f64) -> Result<(), GeoError> {
    if !latitude.is_finite() || !longitude.is_finite() {
        return Err(GeoError::NonFinite {
            latitude,
            longitude,
        });
    }
    if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
        return Err(GeoError::OutOfRange {
            latitude,
            longitude,
        });
    }
    Ok(())
}

/// One positioning sample. Overwritten on each successful sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    /// Unix epoch milliseconds when the sensor produced the sample.
    pub captured_at_ms: i64,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64, captured_at_ms: i64) -> Result<Self, GeoError> {
        validate_coordinates(latitude, longitude)?;
        Ok(Self {
            latitude,
            longitude,
            captured_at_ms,
        })
    }

    /// Age of this sample relative to `now_ms`, clamped at zero.
    pub fn age_ms(&self, now_ms: i64) -> i64 {
        now_ms.saturating_sub(self.captured_at_ms).max(0)
    }
}

/// Static reference point, e.g. a grocery store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointOfInterest {
    pub id: String,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub address: String,
}

impl PointOfInterest {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        latitude: f64,
        longitude: f64,
        address: impl Into<String>,
    ) -> Result<Self, GeoError> {
        validate_coordinates(latitude, longitude)?;
        Ok(Self {
            id: id.into(),
            name: name.into(),
            latitude,
            longitude,
            address: address.into(),
        })
    }

    /// A point of interest at the exact coordinates of `location`.
    pub fn at(id: impl Into<String>, name: impl Into<String>, location: &Location) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            latitude: location.latitude,
            longitude: location.longitude,
            address: String::new(),
        }
    }

    /// Validates coordinates of a value built through serde or struct literal.
    pub fn validate(&self) -> Result<(), GeoError> {
        validate_coordinates(self.latitude, self.longitude)
    }
}

/// Built-in store catalog used when no catalog is configured.
pub fn default_store_catalog() -> Vec<PointOfInterest> {
    vec![
        PointOfInterest {
            id: "1".to_string(),
            name: "Whole Foods Market".to_string(),
            latitude: 37.7749,
            longitude: -122.4194,
            address: "123 Market St, San Francisco, CA".to_string(),
        },
        PointOfInterest {
            id: "2".to_string(),
            name: "Safeway".to_string(),
            latitude: 37.7849,
            longitude: -122.4094,
            address: "456 Mission St, San Francisco, CA".to_string(),
        },
        PointOfInterest {
            id: "3".to_string(),
            name: "Trader Joe's".to_string(),
            latitude: 37.7649,
            longitude: -122.4294,
            address: "789 Castro St, San Francisco, CA".to_string(),
        },
        PointOfInterest {
            id: "4".to_string(),
            name: "Target".to_string(),
            latitude: 37.7549,
            longitude: -122.4394,
            address: "321 Valencia St, San Francisco, CA".to_string(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::{default_store_catalog, GeoError, Location};
    use std::collections::BTreeSet;

    #[test]
    fn location_rejects_non_finite_coordinates() {
        let err = Location::new(f64::NAN, 1.0, 0).unwrap_err();
        assert!(matches!(err, GeoError::NonFinite { .. }));
        let err = Location::new(1.0, f64::INFINITY, 0).unwrap_err();
        assert!(matches!(err, GeoError::NonFinite { .. }));
    }

    #[test]
    fn location_rejects_out_of_range_latitude() {
        let err = Location::new(91.0, 0.0, 0).unwrap_err();
        assert!(matches!(err, GeoError::OutOfRange { .. }));
    }

    #[test]
    fn default_catalog_has_unique_valid_ids() {
        let catalog = default_store_catalog();
        assert_eq!(catalog.len(), 4);
        for store in &catalog {
            store.validate().unwrap();
        }
        let ids = catalog.iter().map(|s| s.id.as_str()).collect::<BTreeSet<_>>();
        assert_eq!(ids.len(), 4);
    }

    #[test]
    fn age_saturates_for_extreme_capture_times() {
        let ancient = Location::new(0.0, 0.0, i64::MIN).unwrap();
        assert_eq!(ancient.age_ms(1_000), i64::MAX);
        let future = Location::new(0.0, 0.0, i64::MAX).unwrap();
        assert_eq!(future.age_ms(-1_000), 0);
    }
}
