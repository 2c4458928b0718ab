use crate::{math::bracketed_root, sensor::LineSensor};
use nalgebra::Vector3;
use std::f64::consts::FRAC_PI_2;

/// Pixels probed beyond each end of the detector, so targets imaged
/// near the swath edges still bracket.
const MARGIN: f64 = 10.0;

/// Solver refining a mean-plane crossing into a fractional pixel index.
pub struct PixelCrossing<'a> {
    sensor: &'a LineSensor,
    cross: Vector3<f64>,
    max_eval: usize,
    accuracy: f64,
}

impl<'a> PixelCrossing<'a> {
    /// `target_direction` is the direction to the target in the
    /// spacecraft frame at the crossing line.
    pub fn new(
        sensor: &'a LineSensor,
        mean_plane_normal: &Vector3<f64>,
        target_direction: &Vector3<f64>,
        max_eval: usize,
        accuracy: f64,
    ) -> Self {
        Self {
            sensor,
            cross: mean_plane_normal.cross(target_direction).normalize(),
            max_eval,
            accuracy,
        }
    }

    /// Fractional pixel whose line of sight matches the target
    /// direction, or `None` when the target falls outside the swath.
    pub fn find(&self) -> Option<f64> {
        let lo = -MARGIN;
        let hi = (self.sensor.pixel_count() - 1) as f64 + MARGIN;
        bracketed_root(
            |x| {
                self.sensor
                    .interpolated_los(x)
                    .angle(&self.cross)
                    - FRAC_PI_2
            },
            lo,
            hi,
            0.5 * (lo + hi),
            self.max_eval,
            self.accuracy,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::PixelCrossing;
    use crate::sensor::{LinearDatation, LineSensor, LosTable};
    use approx::assert_relative_eq;
    use chrono::TimeZone;
    use nalgebra::Vector3;

    fn test_sensor() -> LineSensor {
        let los = (0..1000)
            .map(|p| {
                let angle = 0.08 * (2.0 * p as f64 / 999.0 - 1.0);
                Vector3::new(0.0, -angle.sin(), angle.cos())
            })
            .collect();
        LineSensor::new(
            "test",
            Vector3::zeros(),
            LinearDatation {
                reference_date: chrono::Utc.with_ymd_and_hms(2012, 1, 1, 0, 0, 0).unwrap(),
                reference_line: 0.0,
                rate: 1000.0,
            },
            LosTable::new(los),
        )
    }

    #[test]
    fn test_recovers_fractional_pixel() {
        let sensor = test_sensor();
        let normal = Vector3::new(1.0, 0.0, 0.0);
        for &pixel in &[0.0, 12.75, 500.0, 617.3, 998.9] {
            let direction = sensor.interpolated_los(pixel);
            let crossing = PixelCrossing::new(&sensor, &normal, &direction, 50, 1e-9);
            let found = crossing.find().unwrap();
            assert_relative_eq!(found, pixel, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_near_edge_within_margin() {
        let sensor = test_sensor();
        let normal = Vector3::new(1.0, 0.0, 0.0);
        // extrapolated direction a few pixels past the detector end
        let direction = sensor.interpolated_los(1004.0);
        let crossing = PixelCrossing::new(&sensor, &normal, &direction, 50, 1e-9);
        let found = crossing.find().unwrap();
        assert_relative_eq!(found, 1004.0, epsilon = 1e-5);
    }

    #[test]
    fn test_outside_swath() {
        let sensor = test_sensor();
        let normal = Vector3::new(1.0, 0.0, 0.0);
        // direction far beyond the margin on the negative side
        let direction = Vector3::new(0.0, 0.12f64.sin(), 0.12f64.cos());
        let crossing = PixelCrossing::new(&sensor, &normal, &direction, 50, 1e-9);
        assert!(crossing.find().is_none());
    }
}
