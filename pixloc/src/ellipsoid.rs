use crate::error::PixlocError;
use demtree::{normalize_longitude, NormalizedGeodeticPoint};
use nalgebra::Vector3;

/// Oblate ellipsoid of revolution in its body-fixed frame.
#[derive(Debug, Clone, Copy)]
pub struct Ellipsoid {
    /// Equatorial radius, meters.
    ae: f64,
    /// Flattening.
    f: f64,
    /// First eccentricity squared.
    e2: f64,
    /// Polar radius, meters.
    b: f64,
}

impl Ellipsoid {
    pub fn new(equatorial_radius: f64, flattening: f64) -> Self {
        Self {
            ae: equatorial_radius,
            f: flattening,
            e2: flattening * (2.0 - flattening),
            b: equatorial_radius * (1.0 - flattening),
        }
    }

    pub fn wgs84() -> Self {
        Self::new(6_378_137.0, 1.0 / 298.257_223_563)
    }

    pub fn equatorial_radius(&self) -> f64 {
        self.ae
    }

    pub fn flattening(&self) -> f64 {
        self.f
    }

    /// Prime vertical radius of curvature at a latitude.
    fn prime_vertical_radius(&self, latitude: f64) -> f64 {
        let sin_lat = latitude.sin();
        self.ae / (1.0 - self.e2 * sin_lat * sin_lat).sqrt()
    }

    /// Meridian radius of curvature at a latitude.
    fn meridian_radius(&self, latitude: f64) -> f64 {
        let sin_lat = latitude.sin();
        let w2 = 1.0 - self.e2 * sin_lat * sin_lat;
        self.ae * (1.0 - self.e2) / (w2 * w2.sqrt())
    }

    /// Body-frame Cartesian coordinates of a geodetic point.
    pub fn cartesian(&self, point: &NormalizedGeodeticPoint) -> Vector3<f64> {
        let (sin_lat, cos_lat) = point.latitude().sin_cos();
        let (sin_lon, cos_lon) = point.longitude().sin_cos();
        let n = self.prime_vertical_radius(point.latitude());
        let r = (n + point.altitude()) * cos_lat;
        Vector3::new(
            r * cos_lon,
            r * sin_lon,
            (n * (1.0 - self.e2) + point.altitude()) * sin_lat,
        )
    }

    /// Geodetic coordinates of a body-frame Cartesian point, with the
    /// longitude normalized around `lon_reference`.
    ///
    /// Fixed-point iteration on the latitude; converges below a
    /// micrometer in 5 iterations for points from ground level up to
    /// high orbits.
    pub fn geodetic(&self, point: &Vector3<f64>, lon_reference: f64) -> NormalizedGeodeticPoint {
        let rho = (point.x * point.x + point.y * point.y).sqrt();
        let longitude = if rho == 0.0 && point.z == 0.0 {
            0.0
        } else {
            point.y.atan2(point.x)
        };

        if rho < 1e-9 {
            // polar axis
            let latitude = if point.z >= 0.0 {
                std::f64::consts::FRAC_PI_2
            } else {
                -std::f64::consts::FRAC_PI_2
            };
            return NormalizedGeodeticPoint::new(
                latitude,
                longitude,
                point.z.abs() - self.b,
                lon_reference,
            );
        }

        let mut latitude = point.z.atan2(rho * (1.0 - self.e2));
        for _ in 0..5 {
            let sin_lat = latitude.sin();
            let n = self.prime_vertical_radius(latitude);
            latitude = (point.z + n * self.e2 * sin_lat).atan2(rho);
        }
        let n = self.prime_vertical_radius(latitude);
        let cos_lat = latitude.cos();
        let altitude = if cos_lat.abs() > 1e-6 {
            rho / cos_lat - n
        } else {
            point.z.abs() - self.b
        };
        NormalizedGeodeticPoint::new(latitude, longitude, altitude, lon_reference)
    }

    /// Point where a line of sight crosses the surface at constant
    /// geodetic altitude.
    ///
    /// Both crossings of the altitude shell solve the equation; the one
    /// closest to `position` along the line is returned, regardless of
    /// whether it lies ahead of or behind the position.
    pub fn point_at_altitude(
        &self,
        position: &Vector3<f64>,
        los: &Vector3<f64>,
        altitude: f64,
    ) -> Result<Vector3<f64>, PixlocError> {
        // scale z so the altitude shell becomes a sphere
        let scale = (self.ae + altitude) / (self.b + altitude);
        let scaled_p = Vector3::new(position.x, position.y, scale * position.z);
        let scaled_l = Vector3::new(los.x, los.y, scale * los.z);
        let r = self.ae + altitude;

        let a = scaled_l.norm_squared();
        let b = 2.0 * scaled_p.dot(&scaled_l);
        let c = scaled_p.norm_squared() - r * r;
        let discriminant = b * b - 4.0 * a * c;
        if discriminant < 0.0 {
            return Err(PixlocError::LineOfSightNeverCrossesAltitude { altitude });
        }
        let root = discriminant.sqrt();
        let k1 = (-b - root) / (2.0 * a);
        let k2 = (-b + root) / (2.0 * a);
        let k = if k1.abs() <= k2.abs() { k1 } else { k2 };
        Ok(position + los * k)
    }

    /// Point where a line of sight crosses a meridian plane.
    pub fn point_at_longitude(
        &self,
        position: &Vector3<f64>,
        los: &Vector3<f64>,
        longitude: f64,
    ) -> Result<Vector3<f64>, PixlocError> {
        let (sin_lon, cos_lon) = longitude.sin_cos();
        let normal = Vector3::new(-sin_lon, cos_lon, 0.0);
        let d = los.dot(&normal);
        if d.abs() < 1e-12 {
            return Err(PixlocError::LineOfSightNeverCrossesLongitude { longitude });
        }
        let k = -position.dot(&normal) / d;
        Ok(position + los * k)
    }

    /// Point where a line of sight crosses the cone of constant geodetic
    /// latitude, picking the solution closest to `close_reference`.
    pub fn point_at_latitude(
        &self,
        position: &Vector3<f64>,
        los: &Vector3<f64>,
        latitude: f64,
        close_reference: &Vector3<f64>,
    ) -> Result<Vector3<f64>, PixlocError> {
        let sin_lat = latitude.sin();
        let cos_lat = latitude.cos();
        // all surface normals at this latitude cross the polar axis here
        let apex_z = -self.prime_vertical_radius(latitude) * self.e2 * sin_lat;

        // cone: cos²φ (z - z_a)² - sin²φ (x² + y²) = 0, quadratic in k
        let cos2 = cos_lat * cos_lat;
        let sin2 = sin_lat * sin_lat;
        let pz = position.z - apex_z;
        let a = cos2 * los.z * los.z - sin2 * (los.x * los.x + los.y * los.y);
        let b = 2.0 * (cos2 * pz * los.z - sin2 * (position.x * los.x + position.y * los.y));
        let c = cos2 * pz * pz - sin2 * (position.x * position.x + position.y * position.y);

        let mut candidates: [Option<f64>; 2] = [None, None];
        let scale = a.abs().max(b.abs()).max(c.abs());
        if scale == 0.0 {
            return Err(PixlocError::LineOfSightNeverCrossesLatitude { latitude });
        }
        if a.abs() < 1e-15 * scale {
            if b.abs() >= 1e-15 * scale {
                candidates[0] = Some(-c / b);
            }
        } else {
            let discriminant = b * b - 4.0 * a * c;
            if discriminant >= 0.0 {
                let root = discriminant.sqrt();
                let q = -0.5 * (b + b.signum() * root);
                candidates[0] = Some(q / a);
                if q != 0.0 {
                    candidates[1] = Some(c / q);
                }
            }
        }

        // the cone has two nappes, keep solutions on the correct one
        let mut best: Option<Vector3<f64>> = None;
        let mut best_distance = f64::INFINITY;
        for k in candidates.into_iter().flatten() {
            let p = position + los * k;
            if sin_lat != 0.0 && (p.z - apex_z).signum() != sin_lat.signum() {
                continue;
            }
            let distance = (p - close_reference).norm_squared();
            if distance < best_distance {
                best_distance = distance;
                best = Some(p);
            }
        }
        best.ok_or(PixlocError::LineOfSightNeverCrossesLatitude { latitude })
    }

    /// Express a Cartesian direction as geodetic coordinate rates per
    /// meter along the direction.
    pub fn convert_los(&self, point: &NormalizedGeodeticPoint, los: &Vector3<f64>) -> Vector3<f64> {
        let (sin_lat, cos_lat) = point.latitude().sin_cos();
        let (sin_lon, cos_lon) = point.longitude().sin_cos();
        let east = Vector3::new(-sin_lon, cos_lon, 0.0);
        let north = Vector3::new(-sin_lat * cos_lon, -sin_lat * sin_lon, cos_lat);
        let zenith = Vector3::new(cos_lat * cos_lon, cos_lat * sin_lon, sin_lat);

        let m = self.meridian_radius(point.latitude());
        let n = self.prime_vertical_radius(point.latitude());
        let h = point.altitude();
        Vector3::new(
            los.dot(&north) / (m + h),
            los.dot(&east) / ((n + h) * cos_lat),
            los.dot(&zenith),
        )
    }

    /// Geodetic-space segment from one point to another, with the
    /// longitude difference normalized into one turn.
    pub fn geodetic_los(
        &self,
        from: &NormalizedGeodeticPoint,
        to: &NormalizedGeodeticPoint,
    ) -> Vector3<f64> {
        Vector3::new(
            to.latitude() - from.latitude(),
            normalize_longitude(to.longitude() - from.longitude(), 0.0),
            to.altitude() - from.altitude(),
        )
    }

    /// Geodetic point where the line of sight pierces the zero-altitude
    /// surface.
    pub fn point_on_ground(
        &self,
        position: &Vector3<f64>,
        los: &Vector3<f64>,
        center_longitude: f64,
    ) -> Result<NormalizedGeodeticPoint, PixlocError> {
        let cartesian = self.point_at_altitude(position, los, 0.0)?;
        Ok(self.geodetic(&cartesian, center_longitude))
    }
}
