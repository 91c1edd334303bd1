use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single position fix reported by a location source.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LocationFix {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub altitude: f64,
    /// Horizontal accuracy radius in meters.
    #[serde(default)]
    pub accuracy: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl LocationFix {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude: 0.0,
            accuracy: 0.0,
            timestamp: None,
        }
    }

    /// True when latitude and longitude are both finite.
    pub fn has_finite_coordinates(&self) -> bool {
        self.latitude.is_finite() && self.longitude.is_finite()
    }

    /// True when every numeric field is finite.
    pub fn is_finite(&self) -> bool {
        self.has_finite_coordinates() && self.altitude.is_finite() && self.accuracy.is_finite()
    }
}

/// Truncate toward zero to seven decimal places (about 1cm at the equator).
pub fn truncate_coordinate(value: f64) -> f64 {
    const SCALE: f64 = 10_000_000.0;
    (value * SCALE).trunc() / SCALE
}

/// Wrap a longitude into [-180, 180].
pub fn wrap_longitude(lng: f64) -> f64 {
    if (-180.0..=180.0).contains(&lng) {
        return lng;
    }
    let wrapped = (lng + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == -180.0 && lng > 0.0 {
        180.0
    } else {
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finite_checks() {
        assert!(LocationFix::new(38.9, -77.0).is_finite());

        let nan_lat = LocationFix::new(f64::NAN, 12.0);
        assert!(!nan_lat.has_finite_coordinates());
        assert!(!nan_lat.is_finite());

        let mut inf_alt = LocationFix::new(1.0, 2.0);
        inf_alt.altitude = f64::INFINITY;
        assert!(inf_alt.has_finite_coordinates());
        assert!(!inf_alt.is_finite());
    }

    #[test]
    fn truncation_rounds_toward_zero() {
        assert_eq!(truncate_coordinate(38.123456789), 38.1234567);
        assert_eq!(truncate_coordinate(-77.987654321), -77.9876543);
        assert_eq!(truncate_coordinate(12.0), 12.0);
    }

    #[test]
    fn wrap_longitude_keeps_valid_values() {
        assert_eq!(wrap_longitude(0.0), 0.0);
        assert_eq!(wrap_longitude(-180.0), -180.0);
        assert_eq!(wrap_longitude(180.0), 180.0);
        assert_eq!(wrap_longitude(-77.5), -77.5);
    }

    #[test]
    fn wrap_longitude_wraps_out_of_range() {
        assert_eq!(wrap_longitude(190.0), -170.0);
        assert_eq!(wrap_longitude(-190.0), 170.0);
        assert_eq!(wrap_longitude(540.0), 180.0);
        assert_eq!(wrap_longitude(360.0), 0.0);
    }

    #[test]
    fn deserializes_with_defaults() {
        let fix: LocationFix = serde_json::from_str(r#"{"latitude":1.5,"longitude":2.5}"#).unwrap();
        assert_eq!(fix.altitude, 0.0);
        assert_eq!(fix.accuracy, 0.0);
        assert!(fix.timestamp.is_none());
    }
}
