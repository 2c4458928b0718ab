use std::f64::consts::PI;

/// Normalize `longitude` into `[reference - π, reference + π)`.
pub fn normalize_longitude(longitude: f64, reference: f64) -> f64 {
    reference - PI + (longitude - reference + PI).rem_euclid(2.0 * PI)
}

/// Geodetic point whose longitude is normalized around a reference.
///
/// Keeping all longitudes within one turn of a common reference keeps
/// longitude differences well defined when a line-of-sight crosses the
/// ±180° antimeridian between adjacent tiles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedGeodeticPoint {
    latitude: f64,
    longitude: f64,
    altitude: f64,
}

impl NormalizedGeodeticPoint {
    pub fn new(latitude: f64, longitude: f64, altitude: f64, lon_reference: f64) -> Self {
        Self {
            latitude,
            longitude: normalize_longitude(longitude, lon_reference),
            altitude,
        }
    }

    /// Geodetic latitude in radians.
    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    /// Geodetic longitude in radians, normalized around the construction
    /// reference.
    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Altitude above the ellipsoid in meters.
    pub fn altitude(&self) -> f64 {
        self.altitude
    }
}
