//! Haversine distance evaluation.

use crate::model::geo::{Location, PointOfInterest};
use serde::{Deserialize, Serialize};

/// Earth mean radius in miles.
pub const EARTH_RADIUS_MILES: f64 = 3959.0;
/// Earth mean radius in kilometers.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceUnit {
    #[default]
    Miles,
    Kilometers,
}

impl DistanceUnit {
    pub fn earth_radius(self) -> f64 {
        match self {
            Self::Miles => EARTH_RADIUS_MILES,
            Self::Kilometers => EARTH_RADIUS_KM,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Miles => "mi",
            Self::Kilometers => "km",
        }
    }
}

/// Great-circle distance between two coordinate pairs given in degrees.
///
/// Inputs must be finite; callers validate through `Location::new` or
/// `PointOfInterest::validate`.
pub fn haversine(lat1: f64, lng1: f64, lat2: f64, lng2: f64, unit: DistanceUnit) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lng = (lng2 - lng1).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    // Rounding can push `h` a hair past 1 for antipodal points.
    let h = h.clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    unit.earth_radius() * c
}

/// Distance from a location sample to a point of interest.
pub fn distance(location: &Location, poi: &PointOfInterest, unit: DistanceUnit) -> f64 {
    haversine(
        location.latitude,
        location.longitude,
        poi.latitude,
        poi.longitude,
        unit,
    )
}

#[cfg(test)]
mod tests {
    use super::{haversine, DistanceUnit};

    #[test]
    fn antipodal_points_are_half_circumference() {
        let d = haversine(0.0, 0.0, 0.0, 180.0, DistanceUnit::Kilometers);
        let expected = std::f64::consts::PI * super::EARTH_RADIUS_KM;
        assert!((d - expected).abs() < 1e-6);
    }

    #[test]
    fn one_degree_of_latitude_is_about_69_miles() {
        let d = haversine(10.0, 20.0, 11.0, 20.0, DistanceUnit::Miles);
        assert!((d - 69.09).abs() < 0.05, "got {d}");
    }
}
