use crate::{
    dual::{Dual, DualVector3},
    error::PixlocError,
    math::bracketed_root,
    sensor::LineSensor,
    time::Date,
    trajectory::TrajectoryProvider,
    SPEED_OF_LIGHT,
};
use demtree::NormalizedGeodeticPoint;
use log::debug;
use nalgebra::{DMatrix, DVector, Vector3};
use std::f64::consts::FRAC_PI_2;

/// Most recent crossings kept for warm-starting subsequent calls.
const CACHED_RESULTS: usize = 6;

/// Outcome of a mean-plane crossing search.
#[derive(Debug, Clone, Copy)]
pub struct CrossingResult {
    pub date: Date,
    /// Fractional line at which the target crosses the mean plane.
    pub line: f64,
    /// Target point in body frame, meters.
    pub target: Vector3<f64>,
    /// Unit direction to the target in the spacecraft frame.
    pub target_direction: Vector3<f64>,
    /// Derivative of the direction with respect to the line number.
    pub target_direction_derivative: Vector3<f64>,
}

#[derive(Debug, Clone, Copy)]
struct CachedResult {
    line: f64,
    latitude: f64,
    longitude: f64,
    altitude: f64,
}

/// Solver locating the line at which a ground point crosses a sensor's
/// mean viewing plane.
///
/// Each evaluation needs a body and a spacecraft transform lookup, so
/// the iteration is tuned to converge in two or three evaluations: one
/// Newton step from a warm-started guess, then inverse cubic
/// interpolation through the two latest samples.
pub struct MeanPlaneCrossing {
    min_line: f64,
    max_line: f64,
    max_eval: usize,
    accuracy: f64,
    light_time: bool,
    aberration: bool,
    mean_plane_normal: Vector3<f64>,
    cached: Vec<CachedResult>,
    evaluations: usize,
}

impl MeanPlaneCrossing {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        sensor: &LineSensor,
        min_line: f64,
        max_line: f64,
        light_time: bool,
        aberration: bool,
        max_eval: usize,
        accuracy: f64,
    ) -> Self {
        Self {
            min_line,
            max_line,
            max_eval,
            accuracy,
            light_time,
            aberration,
            mean_plane_normal: compute_mean_plane_normal(sensor),
            cached: Vec::with_capacity(CACHED_RESULTS),
            evaluations: 0,
        }
    }

    pub fn min_line(&self) -> f64 {
        self.min_line
    }

    pub fn max_line(&self) -> f64 {
        self.max_line
    }

    pub fn accuracy(&self) -> f64 {
        self.accuracy
    }

    /// Unit normal of the mean viewing plane, in the spacecraft frame.
    pub fn mean_plane_normal(&self) -> &Vector3<f64> {
        &self.mean_plane_normal
    }

    /// Total geometry evaluations performed since construction.
    pub fn evaluations(&self) -> usize {
        self.evaluations
    }

    /// Find the line at which `target` crosses the mean viewing plane.
    ///
    /// `target` is the point in body frame, `target_geodetic` the same
    /// point in geodetic coordinates (used by the warm-start model).
    pub fn find<T: TrajectoryProvider>(
        &mut self,
        sensor: &LineSensor,
        trajectory: &T,
        target: &Vector3<f64>,
        target_geodetic: &NormalizedGeodeticPoint,
    ) -> Result<CrossingResult, PixlocError> {
        let mut crossing_line = self.guess_start_line(target_geodetic);
        let mut history: Vec<f64> = Vec::with_capacity(self.max_eval);
        let mut previous: Option<(f64, f64, f64)> = None;
        let mut at_min = false;
        let mut at_max = false;

        for _ in 0..self.max_eval {
            history.push(crossing_line);
            let (direction, beta) =
                self.evaluate_line(crossing_line, sensor, trajectory, target)?;

            let new_line = match previous {
                // simple Newton step on the first evaluation
                None => crossing_line + (FRAC_PI_2 - beta.value) / beta.derivative,
                // then inverse cubic interpolation through the two most
                // recent (line, angle, slope) samples
                Some((l0, a0, d0)) => {
                    let l1 = crossing_line;
                    let a1 = beta.value - FRAC_PI_2;
                    let a1_m_a0 = a1 - a0;
                    let cubic = ((l0 * (a1 - 3.0 * a0) - a0 * a1_m_a0 / d0) * a1 * a1
                        + (l1 * (3.0 * a1 - a0) - a1 * a1_m_a0 / beta.derivative) * a0 * a0)
                        / (a1_m_a0 * a1_m_a0 * a1_m_a0);
                    if cubic.is_finite() {
                        cubic
                    } else {
                        l1 + (FRAC_PI_2 - beta.value) / beta.derivative
                    }
                }
            };

            if (new_line - crossing_line).abs() <= self.accuracy {
                // converged, no extra evaluation spent verifying
                let result = CrossingResult {
                    date: sensor.date(new_line),
                    line: new_line,
                    target: *target,
                    target_direction: direction.value,
                    target_direction_derivative: direction.derivative,
                };
                self.cache_result(new_line, target_geodetic);
                return Ok(result);
            }
            previous = Some((crossing_line, beta.value - FRAC_PI_2, beta.derivative));

            // estimates revisiting an earlier point mean the iteration
            // is cycling, hand over to the bracketing solver
            let cycling = history[..history.len() - 1]
                .iter()
                .any(|&l| (l - new_line).abs() <= 1.0);
            if cycling {
                debug!("mean-plane iteration cycling near line {new_line}, switching to slow find");
                return self.slow_find(sensor, trajectory, target, target_geodetic, new_line);
            }

            if new_line < self.min_line {
                if at_min {
                    return Err(self.out_of_range());
                }
                at_min = true;
                crossing_line = self.min_line;
            } else if new_line > self.max_line {
                if at_max {
                    return Err(self.out_of_range());
                }
                at_max = true;
                crossing_line = self.max_line;
            } else {
                at_min = false;
                at_max = false;
                crossing_line = new_line;
            }
        }
        Err(self.out_of_range())
    }

    /// Direction to the target in the spacecraft frame, and the angle to
    /// the mean plane normal, both with derivatives w.r.t. line number.
    pub(crate) fn evaluate_line<T: TrajectoryProvider>(
        &mut self,
        line: f64,
        sensor: &LineSensor,
        trajectory: &T,
        target: &Vector3<f64>,
    ) -> Result<(DualVector3, Dual), PixlocError> {
        self.evaluations += 1;
        let date = sensor.date(line);
        let body_to_inert = trajectory.body_to_inertial(date)?;
        let sc_to_inert = trajectory.sc_to_inertial(date)?;

        let p_inert = sc_to_inert.apply_point_dual(sensor.position());
        let t_inert = if self.light_time {
            // single correction using the uncorrected travel distance
            let uncorrected = body_to_inert.apply_point(target);
            let delta_t = (uncorrected - p_inert.value).norm() / SPEED_OF_LIGHT;
            body_to_inert.shifted_by(-delta_t).apply_point_dual(target)
        } else {
            body_to_inert.apply_point_dual(target)
        };

        let l_inert = (t_inert - p_inert).normalized();
        let observed = if self.aberration {
            // classical velocity composition, spacecraft velocity taken
            // as locally constant
            (l_inert * SPEED_OF_LIGHT + DualVector3::constant(sc_to_inert.velocity)).normalized()
        } else {
            l_inert
        };

        let mut direction = sc_to_inert.inverse().apply_vector_dual(&observed);
        // chain rule from time to line number
        direction.derivative /= sensor.rate();

        let beta = direction.angle_to(&self.mean_plane_normal);
        Ok((direction, beta))
    }

    fn guess_start_line(&self, target: &NormalizedGeodeticPoint) -> f64 {
        let midline = 0.5 * (self.min_line + self.max_line);
        if self.cached.len() < 4 {
            return midline;
        }

        // linear model: line = c0 + c1 lat + c2 lon + c3 alt
        let n = self.cached.len();
        let m = DMatrix::from_fn(n, 4, |i, j| match j {
            0 => 1.0,
            1 => self.cached[i].latitude,
            2 => self.cached[i].longitude,
            _ => self.cached[i].altitude,
        });
        let rhs = DVector::from_fn(n, |i, _| self.cached[i].line);
        match m.svd(true, true).solve(&rhs, 1e-11) {
            Ok(c) => {
                let guess = c[0]
                    + c[1] * target.latitude()
                    + c[2] * target.longitude()
                    + c[3] * target.altitude();
                if guess >= self.min_line && guess <= self.max_line {
                    guess
                } else {
                    midline
                }
            }
            Err(_) => midline,
        }
    }

    fn cache_result(&mut self, line: f64, target: &NormalizedGeodeticPoint) {
        if self.cached.iter().any(|c| (c.line - line).abs() <= self.accuracy) {
            return;
        }
        self.cached.insert(
            0,
            CachedResult {
                line,
                latitude: target.latitude(),
                longitude: target.longitude(),
                altitude: target.altitude(),
            },
        );
        self.cached.truncate(CACHED_RESULTS);
    }

    /// Robust fallback: bracketing root search over the whole interval.
    fn slow_find<T: TrajectoryProvider>(
        &mut self,
        sensor: &LineSensor,
        trajectory: &T,
        target: &Vector3<f64>,
        target_geodetic: &NormalizedGeodeticPoint,
        seed: f64,
    ) -> Result<CrossingResult, PixlocError> {
        let (min_line, max_line) = (self.min_line, self.max_line);
        let (max_eval, accuracy) = (self.max_eval, self.accuracy);
        let root = bracketed_root(
            |line| match self.evaluate_line(line, sensor, trajectory, target) {
                Ok((_, beta)) => beta.value - FRAC_PI_2,
                // transform failures poison the bracket search
                Err(_) => f64::NAN,
            },
            min_line,
            max_line,
            seed,
            max_eval,
            accuracy,
        )
        .ok_or_else(|| self.out_of_range())?;

        let (direction, _) = self.evaluate_line(root, sensor, trajectory, target)?;
        let result = CrossingResult {
            date: sensor.date(root),
            line: root,
            target: *target,
            target_direction: direction.value,
            target_direction_derivative: direction.derivative,
        };
        self.cache_result(root, target_geodetic);
        Ok(result)
    }

    fn out_of_range(&self) -> PixlocError {
        PixlocError::OutOfLineRange {
            min_line: self.min_line,
            max_line: self.max_line,
        }
    }
}

/// Best-fit normal of the plane through the origin closest to all pixel
/// viewing directions.
///
/// The matrix holds every direction and its negation, so the fitted
/// plane is forced through the origin; the left singular vector with
/// smallest singular value is the normal. Its sign is fixed so that
/// traversing pixels in increasing index order is counter-clockwise
/// around the normal.
fn compute_mean_plane_normal(sensor: &LineSensor) -> Vector3<f64> {
    let n = sensor.pixel_count();
    let los: Vec<Vector3<f64>> = (0..n).map(|p| sensor.los(p)).collect();
    let mut m = DMatrix::zeros(3, 2 * n);
    for (j, v) in los.iter().enumerate() {
        m.set_column(j, v);
        m.set_column(n + j, &-v);
    }

    let svd = m.svd(true, false);
    let u = svd.u.as_ref().unwrap();
    let mut smallest = 0;
    for (i, &value) in svd.singular_values.iter().enumerate() {
        if value < svd.singular_values[smallest] {
            smallest = i;
        }
    }
    let normal =
        Vector3::new(u[(0, smallest)], u[(1, smallest)], u[(2, smallest)]).normalize();

    if normal.dot(&los[0].cross(&los[n - 1])) >= 0.0 {
        normal
    } else {
        -normal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        ellipsoid::Ellipsoid,
        sensor::{LinearDatation, LosTable},
        trajectory::{sample_from_state, SampledTrajectory},
    };
    use approx::assert_relative_eq;
    use chrono::TimeZone;
    use nalgebra::{Rotation3, UnitQuaternion};

    fn epoch() -> Date {
        chrono::Utc.with_ymd_and_hms(2012, 1, 1, 0, 0, 0).unwrap()
    }

    /// Cross-track fan of `n` pixels spanning ±`half_angle` around +Z.
    fn fan_los(n: usize, half_angle: f64, noise: f64) -> Vec<Vector3<f64>> {
        let mut state = 0x2545_f491_4f6c_dd1du64;
        let mut rand = move || {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            (state >> 11) as f64 / (1u64 << 53) as f64 * 2.0 - 1.0
        };
        (0..n)
            .map(|p| {
                let angle = half_angle * (2.0 * p as f64 / (n - 1) as f64 - 1.0);
                Vector3::new(
                    noise * rand(),
                    -(angle + noise * rand()).sin(),
                    angle.cos(),
                )
            })
            .collect()
    }

    fn test_sensor(noise: f64) -> LineSensor {
        LineSensor::new(
            "test",
            Vector3::new(1.5, 0.0, 0.0),
            LinearDatation {
                reference_date: epoch(),
                reference_line: 0.0,
                rate: 1000.0,
            },
            LosTable::new(fan_los(2001, 0.085, noise)),
        )
    }

    /// Straight-line pass over the equator: the spacecraft flies along
    /// +Y at constant altitude, boresight toward -X (nadir).
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

    /// Ground point directly below the spacecraft at the given line.
    fn target_under_line(line: f64) -> Vector3<f64> {
        let position = Vector3::new(7_200_000.0, 7.0 * line, 0.0);
        Ellipsoid::wgs84()
            .point_at_altitude(&position, &Vector3::new(-1.0, 0.0, 0.0), 0.0)
            .unwrap()
    }

    fn solver(sensor: &LineSensor) -> MeanPlaneCrossing {
        MeanPlaneCrossing::new(sensor, 0.0, 10_000.0, false, false, 50, 1e-4)
    }

    #[test]
    fn test_mean_plane_normal_noiseless() {
        let sensor = test_sensor(0.0);
        let solver = solver(&sensor);
        let normal = solver.mean_plane_normal();
        assert_relative_eq!(*normal, Vector3::new(1.0, 0.0, 0.0), epsilon = 1e-15);
        // orientation convention
        assert!(normal.dot(&sensor.los(0).cross(&sensor.los(2000))) >= 0.0);
    }

    #[test]
    fn test_mean_plane_normal_noisy() {
        let sensor = test_sensor(1e-5);
        let solver = solver(&sensor);
        let error = solver
            .mean_plane_normal()
            .angle(&Vector3::new(1.0, 0.0, 0.0));
        assert!(error < 1e-6, "normal error {error}");
    }

    #[test]
    fn test_crossing_converges_in_few_evaluations() {
        let sensor = test_sensor(0.0);
        let trajectory = test_trajectory();
        let mut solver = solver(&sensor);

        let target = target_under_line(5400.0);
        let target_geodetic = Ellipsoid::wgs84().geodetic(&target, 0.0);
        let result = solver
            .find(&sensor, &trajectory, &target, &target_geodetic)
            .unwrap();

        assert_relative_eq!(result.line, 5400.0, epsilon = 1e-3);
        assert!(solver.evaluations() <= 3, "{} evaluations", solver.evaluations());

        // the returned direction is orthogonal to the plane normal
        let beta = result.target_direction.angle(solver.mean_plane_normal());
        assert_relative_eq!(beta, FRAC_PI_2, epsilon = 1e-6);
        assert_relative_eq!(
            crate::time::seconds_between(epoch(), result.date),
            5.4,
            epsilon = 1e-6
        );
    }

    #[test]
    fn test_warm_start_from_cache() {
        let sensor = test_sensor(0.0);
        let trajectory = test_trajectory();
        let ellipsoid = Ellipsoid::wgs84();
        let mut solver = solver(&sensor);

        for line in [4000.0, 4500.0, 5000.0, 5500.0] {
            let target = target_under_line(line);
            let geodetic = ellipsoid.geodetic(&target, 0.0);
            solver.find(&sensor, &trajectory, &target, &geodetic).unwrap();
        }

        // with four cached crossings the fitted guess is nearly exact
        let before = solver.evaluations();
        let target = target_under_line(5200.0);
        let geodetic = ellipsoid.geodetic(&target, 0.0);
        let result = solver.find(&sensor, &trajectory, &target, &geodetic).unwrap();
        assert_relative_eq!(result.line, 5200.0, epsilon = 1e-3);
        assert!(solver.evaluations() - before <= 2);
    }

    #[test]
    fn test_target_beyond_line_range() {
        let sensor = test_sensor(0.0);
        let trajectory = test_trajectory();
        let mut solver = MeanPlaneCrossing::new(&sensor, 0.0, 8_000.0, false, false, 50, 1e-4);

        // sub-satellite point of a line far past the searchable range
        let target = target_under_line(40_000.0);
        let geodetic = Ellipsoid::wgs84().geodetic(&target, 0.0);
        assert!(matches!(
            solver.find(&sensor, &trajectory, &target, &geodetic),
            Err(PixlocError::OutOfLineRange { .. })
        ));
    }
}
