use crate::{
    ellipsoid::Ellipsoid,
    error::PixlocError,
    intersection::IntersectionAlgorithm,
    meanplane::MeanPlaneCrossing,
    pixelcross::PixelCrossing,
    sensor::LineSensor,
    time::Date,
    trajectory::TrajectoryProvider,
    transform::RigidTransform,
    SPEED_OF_LIGHT,
};
use demtree::NormalizedGeodeticPoint;
use nalgebra::{DMatrix, Vector3};
use std::collections::HashMap;
use std::f64::consts::FRAC_PI_2;

/// Fractional image coordinates of a ground point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorPixel {
    pub line: f64,
    pub pixel: f64,
}

/// Hook correcting terrain intersections for atmospheric bending of the
/// line of sight.
pub trait AtmosphericRefraction {
    fn apply_correction(
        &mut self,
        ellipsoid: &Ellipsoid,
        position: &Vector3<f64>,
        los: &Vector3<f64>,
        raw: &NormalizedGeodeticPoint,
        algorithm: &mut dyn IntersectionAlgorithm,
    ) -> Result<NormalizedGeodeticPoint, PixlocError>;
}

/// Geolocation engine tying sensors, trajectory and terrain together.
///
/// Direct location maps image coordinates to a ground point, inverse
/// location maps a ground point back to image coordinates. Inverse
/// location keeps one mean-plane crossing solver per sensor, warm
/// started across calls, so batches of nearby points converge in very
/// few geometry evaluations.
pub struct Locator<T: TrajectoryProvider> {
    ellipsoid: Ellipsoid,
    trajectory: T,
    algorithm: Box<dyn IntersectionAlgorithm>,
    sensors: HashMap<String, LineSensor>,
    crossings: HashMap<String, MeanPlaneCrossing>,
    light_time: bool,
    aberration: bool,
    refraction: Option<Box<dyn AtmosphericRefraction>>,
    max_eval: usize,
    line_accuracy: f64,
    pixel_accuracy: f64,
}

impl<T: TrajectoryProvider> Locator<T> {
    pub fn new(ellipsoid: Ellipsoid, trajectory: T, algorithm: Box<dyn IntersectionAlgorithm>) -> Self {
        Self {
            ellipsoid,
            trajectory,
            algorithm,
            sensors: HashMap::new(),
            crossings: HashMap::new(),
            light_time: true,
            aberration: true,
            refraction: None,
            max_eval: 50,
            line_accuracy: 1e-4,
            pixel_accuracy: 1e-5,
        }
    }

    /// Enable or disable the light time correction (on by default).
    pub fn with_light_time(mut self, enabled: bool) -> Self {
        self.light_time = enabled;
        self
    }

    /// Enable or disable the aberration of light correction (on by
    /// default).
    pub fn with_aberration(mut self, enabled: bool) -> Self {
        self.aberration = enabled;
        self
    }

    pub fn with_refraction(mut self, refraction: Box<dyn AtmosphericRefraction>) -> Self {
        self.refraction = Some(refraction);
        self
    }

    pub fn with_search_settings(
        mut self,
        max_eval: usize,
        line_accuracy: f64,
        pixel_accuracy: f64,
    ) -> Self {
        self.max_eval = max_eval;
        self.line_accuracy = line_accuracy;
        self.pixel_accuracy = pixel_accuracy;
        self
    }

    pub fn add_sensor(&mut self, sensor: LineSensor) {
        self.sensors.insert(sensor.name().to_string(), sensor);
    }

    pub fn sensor(&self, name: &str) -> Option<&LineSensor> {
        self.sensors.get(name)
    }

    pub fn ellipsoid(&self) -> &Ellipsoid {
        &self.ellipsoid
    }

    /// Terrain elevation under a point, in meters.
    pub fn elevation(&mut self, latitude: f64, longitude: f64) -> Result<f64, PixlocError> {
        self.algorithm.get_elevation(latitude, longitude)
    }

    /// Change a viewing model parameter of one sensor.
    ///
    /// The sensor's cached crossing solver is dropped, its mean plane is
    /// no longer valid for the new geometry.
    pub fn set_parameter(
        &mut self,
        sensor_name: &str,
        parameter: &str,
        value: f64,
    ) -> Result<(), PixlocError> {
        let sensor = self
            .sensors
            .get_mut(sensor_name)
            .ok_or_else(|| PixlocError::UnknownSensor(sensor_name.to_string()))?;
        if !sensor.set_parameter(parameter, value) {
            return Err(PixlocError::UnknownParameter(parameter.to_string()));
        }
        self.crossings.remove(sensor_name);
        Ok(())
    }

    /// Acquisition date of one line of one sensor.
    pub fn line_datation(&self, sensor_name: &str, line: f64) -> Result<Date, PixlocError> {
        let sensor = self
            .sensors
            .get(sensor_name)
            .ok_or_else(|| PixlocError::UnknownSensor(sensor_name.to_string()))?;
        Ok(sensor.date(line))
    }

    /// Ground point seen by one pixel at a given date.
    pub fn date_location(
        &mut self,
        sensor_name: &str,
        date: Date,
        pixel: f64,
    ) -> Result<NormalizedGeodeticPoint, PixlocError> {
        let line = self
            .sensors
            .get(sensor_name)
            .ok_or_else(|| PixlocError::UnknownSensor(sensor_name.to_string()))?
            .line(date);
        self.direct_location(sensor_name, line, pixel)
    }

    /// Ground point seen by one pixel of one line.
    pub fn direct_location(
        &mut self,
        sensor_name: &str,
        line: f64,
        pixel: f64,
    ) -> Result<NormalizedGeodeticPoint, PixlocError> {
        let sensor = self
            .sensors
            .get(sensor_name)
            .ok_or_else(|| PixlocError::UnknownSensor(sensor_name.to_string()))?;
        let date = sensor.date(line);
        let sc_to_inert = self.trajectory.sc_to_inertial(date)?;
        let body_to_inert = self.trajectory.body_to_inertial(date)?;

        let p_inert = sc_to_inert.apply_point(sensor.position());
        let mut l_inert = sc_to_inert.apply_vector(&sensor.interpolated_los(pixel));
        if self.aberration {
            // the observed direction composes the geometric one with the
            // spacecraft velocity, undo the composition
            l_inert = (l_inert * SPEED_OF_LIGHT - sc_to_inert.velocity).normalize();
        }
        self.ground_point(&body_to_inert, &p_inert, &l_inert)
    }

    /// Ground points seen by every pixel of one line.
    ///
    /// Shares the frame transforms across the whole line, so locating a
    /// full line is much cheaper than one call per pixel.
    pub fn direct_location_line(
        &mut self,
        sensor_name: &str,
        line: f64,
    ) -> Result<Vec<NormalizedGeodeticPoint>, PixlocError> {
        let (body_to_inert, p_inert, l_inerts) = {
            let sensor = self
                .sensors
                .get(sensor_name)
                .ok_or_else(|| PixlocError::UnknownSensor(sensor_name.to_string()))?;
            let date = sensor.date(line);
            let sc_to_inert = self.trajectory.sc_to_inertial(date)?;
            let body_to_inert = self.trajectory.body_to_inertial(date)?;
            let p_inert = sc_to_inert.apply_point(sensor.position());
            let l_inerts: Vec<Vector3<f64>> = (0..sensor.pixel_count())
                .map(|p| {
                    let v = sc_to_inert.apply_vector(&sensor.los(p));
                    if self.aberration {
                        (v * SPEED_OF_LIGHT - sc_to_inert.velocity).normalize()
                    } else {
                        v
                    }
                })
                .collect();
            (body_to_inert, p_inert, l_inerts)
        };

        let mut points = Vec::with_capacity(l_inerts.len());
        for l_inert in &l_inerts {
            points.push(self.ground_point(&body_to_inert, &p_inert, l_inert)?);
        }
        Ok(points)
    }

    fn ground_point(
        &mut self,
        body_to_inert: &RigidTransform,
        p_inert: &Vector3<f64>,
        l_inert: &Vector3<f64>,
    ) -> Result<NormalizedGeodeticPoint, PixlocError> {
        let inert_to_body = body_to_inert.inverse();
        let p_body = inert_to_body.apply_point(p_inert);
        let l_body = inert_to_body.apply_vector(l_inert);

        let (position, los) = if self.light_time {
            // single correction using the uncorrected travel distance
            let uncorrected = self.algorithm.intersection(&self.ellipsoid, &p_body, &l_body)?;
            let delta_t = (self.ellipsoid.cartesian(&uncorrected) - p_body).norm() / SPEED_OF_LIGHT;
            let shifted = body_to_inert.shifted_by(-delta_t).inverse();
            (shifted.apply_point(p_inert), shifted.apply_vector(l_inert))
        } else {
            (p_body, l_body)
        };

        let raw = self.algorithm.intersection(&self.ellipsoid, &position, &los)?;
        let refined = self
            .algorithm
            .refine_intersection(&self.ellipsoid, &position, &los, &raw)?
            .unwrap_or(raw);

        match self.refraction.as_mut() {
            Some(refraction) => refraction.apply_correction(
                &self.ellipsoid,
                &position,
                &los,
                &refined,
                self.algorithm.as_mut(),
            ),
            None => Ok(refined),
        }
    }

    /// Image coordinates at which a ground point is seen, or `None` when
    /// the point never enters the swath between the given lines.
    pub fn inverse_location(
        &mut self,
        sensor_name: &str,
        point: &NormalizedGeodeticPoint,
        min_line: f64,
        max_line: f64,
    ) -> Result<Option<SensorPixel>, PixlocError> {
        let sensor = self
            .sensors
            .get(sensor_name)
            .ok_or_else(|| PixlocError::UnknownSensor(sensor_name.to_string()))?;

        let recreate = match self.crossings.get(sensor_name) {
            Some(c) => c.min_line() != min_line || c.max_line() != max_line,
            None => true,
        };
        if recreate {
            self.crossings.insert(
                sensor_name.to_string(),
                MeanPlaneCrossing::new(
                    sensor,
                    min_line,
                    max_line,
                    self.light_time,
                    self.aberration,
                    self.max_eval,
                    self.line_accuracy,
                ),
            );
        }
        let crossing = self.crossings.get_mut(sensor_name).unwrap();

        let target = self.ellipsoid.cartesian(point);
        let result = crossing.find(sensor, &self.trajectory, &target, point)?;

        let coarse = match PixelCrossing::new(
            sensor,
            crossing.mean_plane_normal(),
            &result.target_direction,
            self.max_eval,
            self.pixel_accuracy,
        )
        .find()
        {
            Some(pixel) => pixel,
            None => return Ok(None),
        };

        // fix the line from the out-of-plane angle in the local frame of
        // the two pixels bracketing the coarse solution, then measure the
        // pixel as an angular fraction in that same frame
        let low = (coarse.floor() as i64).clamp(0, sensor.pixel_count() as i64 - 2) as usize;
        let low_los = sensor.los(low);
        let high_los = sensor.los(low + 1);
        let local_z = low_los.cross(&high_los).normalize();

        let dir = result.target_direction;
        let dir_der = result.target_direction_derivative;
        let cos_beta = dir.dot(&local_z);
        let beta = cos_beta.acos();
        let beta_der = -dir_der.dot(&local_z) / (1.0 - cos_beta * cos_beta).sqrt();
        let delta_line = (FRAC_PI_2 - beta) / beta_der;
        let fixed_line = result.line + delta_line;
        let fixed_direction = (dir + dir_der * delta_line).normalize();

        let fixed_x = low_los;
        let fixed_z = fixed_x.cross(&high_los);
        let fixed_y = fixed_z.cross(&fixed_x);
        let pixel_width = high_los.dot(&fixed_y).atan2(high_los.dot(&fixed_x));
        let alpha = fixed_direction
            .dot(&fixed_y)
            .atan2(fixed_direction.dot(&fixed_x));

        Ok(Some(SensorPixel {
            line: fixed_line,
            pixel: low as f64 + alpha / pixel_width,
        }))
    }

    /// Partial derivatives of the inverse location of `point` with
    /// respect to the named viewing parameters, by central finite
    /// differences with each driver's scale as step.
    ///
    /// Returns the unperturbed location and a 2 x n matrix with the line
    /// derivatives on the first row and the pixel derivatives on the
    /// second.
    pub fn inverse_location_jacobian(
        &mut self,
        sensor_name: &str,
        point: &NormalizedGeodeticPoint,
        min_line: f64,
        max_line: f64,
        parameters: &[&str],
    ) -> Result<(SensorPixel, DMatrix<f64>), PixlocError> {
        let center = self
            .inverse_location(sensor_name, point, min_line, max_line)?
            .ok_or(PixlocError::TargetOutsideSwath)?;

        let mut jacobian = DMatrix::zeros(2, parameters.len());
        for (j, &name) in parameters.iter().enumerate() {
            let (value, scale) = {
                let sensor = self
                    .sensors
                    .get(sensor_name)
                    .ok_or_else(|| PixlocError::UnknownSensor(sensor_name.to_string()))?;
                let driver = sensor
                    .parameter(name)
                    .ok_or_else(|| PixlocError::UnknownParameter(name.to_string()))?;
                (driver.value, driver.scale)
            };

            self.set_parameter(sensor_name, name, value + scale)?;
            let plus = self
                .inverse_location(sensor_name, point, min_line, max_line)?
                .ok_or(PixlocError::TargetOutsideSwath);
            self.set_parameter(sensor_name, name, value - scale)?;
            let minus = self
                .inverse_location(sensor_name, point, min_line, max_line)?
                .ok_or(PixlocError::TargetOutsideSwath);
            self.set_parameter(sensor_name, name, value)?;
            let (plus, minus) = (plus?, minus?);

            jacobian[(0, j)] = (plus.line - minus.line) / (2.0 * scale);
            jacobian[(1, j)] = (plus.pixel - minus.pixel) / (2.0 * scale);
        }
        Ok((center, jacobian))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        intersection::ConstantElevationAlgorithm,
        sensor::{LinearDatation, LosTable, LosTransform, ParameterDriver},
        time::Date,
        trajectory::{sample_from_state, SampledTrajectory},
    };
    use approx::assert_relative_eq;
    use chrono::TimeZone;
    use nalgebra::{Rotation3, Unit, UnitQuaternion};

    fn epoch() -> Date {
        chrono::Utc.with_ymd_and_hms(2012, 1, 1, 0, 0, 0).unwrap()
    }

    fn test_sensor(with_roll: bool) -> LineSensor {
        let raw = (0..2001)
            .map(|p| {
                let angle = 0.085 * (2.0 * p as f64 / 2000.0 - 1.0);
                Vector3::new(0.0, -angle.sin(), angle.cos())
            })
            .collect();
        let mut table = LosTable::new(raw);
        if with_roll {
            table = table.with_transform(LosTransform::FixedRotation {
                driver: ParameterDriver::new("roll", 0.0, 1e-4),
                axis: Unit::new_normalize(Vector3::new(1.0, 0.0, 0.0)),
            });
        }
        LineSensor::new(
            "line",
            Vector3::new(1.5, 0.0, 0.0),
            LinearDatation {
                reference_date: epoch(),
                reference_line: 0.0,
                rate: 1000.0,
            },
            table,
        )
    }

    /// Straight equatorial pass, boresight toward -X.
    fn test_trajectory() -> SampledTrajectory {
        let attitude = UnitQuaternion::from_rotation_matrix(&Rotation3::from_basis_unchecked(&[
            Vector3::new(0.0, -1.0, 0.0),
            Vector3::new(0.0, 0.0, 1.0),
            Vector3::new(-1.0, 0.0, 0.0),
        ]));
        let samples = (0..=10)
            .map(|k| {
                sample_from_state(
                    UnitQuaternion::identity(),
                    Vector3::zeros(),
                    Vector3::new(7_200_000.0, 7000.0 * k as f64, 0.0),
                    Vector3::new(0.0, 7000.0, 0.0),
                    attitude,
                    Vector3::zeros(),
                )
            })
            .collect();
        SampledTrajectory::new(epoch(), 1.0, samples)
    }

    fn test_locator(with_roll: bool) -> Locator<SampledTrajectory> {
        let mut locator = Locator::new(
            Ellipsoid::wgs84(),
            test_trajectory(),
            Box::new(ConstantElevationAlgorithm::new(0.0)),
        )
        .with_light_time(false)
        .with_aberration(false);
        locator.add_sensor(test_sensor(with_roll));
        locator
    }

    #[test]
    fn test_direct_location_nadir() {
        let mut locator = test_locator(false);
        let found = locator.direct_location("line", 5000.0, 1000.0).unwrap();
        assert!(found.altitude().abs() < 1e-6);
        assert_relative_eq!(found.latitude(), 0.0, epsilon = 1e-9);
        // ground point below the sensor, which trails the spacecraft
        // center of mass by 1.5 m
        let cartesian = locator.ellipsoid().cartesian(&found);
        assert_relative_eq!(cartesian.y, 5.0 * 7000.0 - 1.5, epsilon = 1e-5);
    }

    #[test]
    fn test_direct_then_inverse() {
        let mut locator = test_locator(false);
        for &(line, pixel) in &[(5000.0, 700.25), (2400.5, 1500.0), (7300.0, 40.0)] {
            let ground = locator.direct_location("line", line, pixel).unwrap();
            let found = locator
                .inverse_location("line", &ground, 0.0, 10_000.0)
                .unwrap()
                .unwrap();
            assert_relative_eq!(found.line, line, epsilon = 1e-3);
            assert_relative_eq!(found.pixel, pixel, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_direct_location_line_matches_per_pixel() {
        let mut locator = test_locator(false);
        let points = locator.direct_location_line("line", 5000.0).unwrap();
        assert_eq!(points.len(), 2001);
        for &p in &[0usize, 731, 1000, 2000] {
            let single = locator.direct_location("line", 5000.0, p as f64).unwrap();
            assert_relative_eq!(points[p].latitude(), single.latitude(), epsilon = 1e-12);
            assert_relative_eq!(points[p].longitude(), single.longitude(), epsilon = 1e-12);
            assert_relative_eq!(points[p].altitude(), single.altitude(), epsilon = 1e-6);
        }
    }

    #[test]
    fn test_date_location_matches_direct() {
        let mut locator = test_locator(false);
        let date = locator.line_datation("line", 5000.0).unwrap();
        let by_date = locator.date_location("line", date, 1000.0).unwrap();
        let by_line = locator.direct_location("line", 5000.0, 1000.0).unwrap();
        assert_relative_eq!(by_date.latitude(), by_line.latitude(), epsilon = 1e-12);
        assert_relative_eq!(by_date.longitude(), by_line.longitude(), epsilon = 1e-12);
    }

    #[test]
    fn test_inverse_location_outside_swath() {
        let mut locator = test_locator(false);
        // far off cross-track, at a latitude the swath never reaches
        let point = NormalizedGeodeticPoint::new(0.05, 5.5e-3, 0.0, 0.0);
        assert!(locator
            .inverse_location("line", &point, 0.0, 10_000.0)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_unknown_sensor() {
        let mut locator = test_locator(false);
        assert!(matches!(
            locator.direct_location("other", 100.0, 100.0),
            Err(PixlocError::UnknownSensor(_))
        ));
        let point = NormalizedGeodeticPoint::new(0.0, 0.0, 0.0, 0.0);
        assert!(matches!(
            locator.inverse_location("other", &point, 0.0, 100.0),
            Err(PixlocError::UnknownSensor(_))
        ));
    }

    #[test]
    fn test_set_parameter_moves_pixels() {
        let mut locator = test_locator(true);
        let ground = locator.direct_location("line", 5000.0, 600.0).unwrap();
        let before = locator
            .inverse_location("line", &ground, 0.0, 10_000.0)
            .unwrap()
            .unwrap();

        locator.set_parameter("line", "roll", 1e-3).unwrap();
        let after = locator
            .inverse_location("line", &ground, 0.0, 10_000.0)
            .unwrap()
            .unwrap();

        // one pixel subtends 0.17 rad / 2000, a 1 mrad roll moves the
        // image by about twelve pixels
        assert!((after.pixel - before.pixel).abs() > 5.0);
        assert_relative_eq!(after.line, before.line, epsilon = 0.5);

        assert!(matches!(
            locator.set_parameter("line", "pitch", 0.0),
            Err(PixlocError::UnknownParameter(_))
        ));
    }

    #[test]
    fn test_inverse_location_jacobian() {
        let mut locator = test_locator(true);
        let ground = locator.direct_location("line", 5000.0, 600.0).unwrap();
        let (center, jacobian) = locator
            .inverse_location_jacobian("line", &ground, 0.0, 10_000.0, &["roll"])
            .unwrap();

        assert_relative_eq!(center.line, 5000.0, epsilon = 1e-3);
        assert_relative_eq!(center.pixel, 600.0, epsilon = 1e-3);

        // rolling by the pixel pitch shifts the image by one pixel
        let pixels_per_radian = 2000.0 / 0.17;
        assert_relative_eq!(
            jacobian[(1, 0)],
            -pixels_per_radian,
            max_relative = 0.02
        );
        assert!(jacobian[(0, 0)].abs() < pixels_per_radian * 0.02);
    }

    #[test]
    fn test_jacobian_unknown_parameter() {
        let mut locator = test_locator(true);
        let ground = locator.direct_location("line", 5000.0, 600.0).unwrap();
        assert!(matches!(
            locator.inverse_location_jacobian("line", &ground, 0.0, 10_000.0, &["yaw"]),
            Err(PixlocError::UnknownParameter(_))
        ));
    }
}
