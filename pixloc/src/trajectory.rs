use crate::{
    error::PixlocError,
    time::{seconds_between, Date},
    transform::RigidTransform,
};
use nalgebra::{UnitQuaternion, Vector3};

/// Source of body and spacecraft frame transforms over a time range.
///
/// `body_to_inertial` maps Earth-fixed coordinates to the inertial frame
/// and `sc_to_inertial` maps spacecraft coordinates to the inertial
/// frame, both at the requested date.
pub trait TrajectoryProvider {
    fn min_date(&self) -> Date;
    fn max_date(&self) -> Date;
    fn body_to_inertial(&self, date: Date) -> Result<RigidTransform, PixlocError>;
    fn sc_to_inertial(&self, date: Date) -> Result<RigidTransform, PixlocError>;
}

/// One trajectory sample.
#[derive(Debug, Clone, Copy)]
pub struct TrajectorySample {
    pub body_to_inertial: RigidTransform,
    pub sc_to_inertial: RigidTransform,
}

/// Trajectory interpolated from uniformly spaced samples.
///
/// Translation, velocity and spin interpolate linearly; rotations use
/// quaternion slerp. Good enough for the sub-second spacing ephemerides
/// are usually sampled at.
pub struct SampledTrajectory {
    start: Date,
    step: f64,
    samples: Vec<TrajectorySample>,
}

impl SampledTrajectory {
    pub fn new(start: Date, step: f64, samples: Vec<TrajectorySample>) -> Self {
        assert!(step > 0.0, "sample step must be positive");
        assert!(samples.len() >= 2, "at least two samples required");
        Self { start, step, samples }
    }

    fn interpolate<F>(&self, date: Date, select: F) -> Result<RigidTransform, PixlocError>
    where
        F: Fn(&TrajectorySample) -> &RigidTransform,
    {
        let t = seconds_between(self.start, date) / self.step;
        if t < 0.0 || t > (self.samples.len() - 1) as f64 {
            return Err(PixlocError::OutOfTimeRange {
                date,
                min: self.min_date(),
                max: self.max_date(),
            });
        }
        let index = (t.floor() as usize).min(self.samples.len() - 2);
        let alpha = t - index as f64;
        let before = select(&self.samples[index]);
        let after = select(&self.samples[index + 1]);

        let rotation = before
            .rotation
            .try_slerp(&after.rotation, alpha, 1e-12)
            .unwrap_or(before.rotation);
        Ok(RigidTransform {
            rotation,
            translation: before.translation.lerp(&after.translation, alpha),
            spin: before.spin.lerp(&after.spin, alpha),
            velocity: before.velocity.lerp(&after.velocity, alpha),
        })
    }
}

impl TrajectoryProvider for SampledTrajectory {
    fn min_date(&self) -> Date {
        self.start
    }

    fn max_date(&self) -> Date {
        crate::time::shifted(self.start, self.step * (self.samples.len() - 1) as f64)
    }

    fn body_to_inertial(&self, date: Date) -> Result<RigidTransform, PixlocError> {
        self.interpolate(date, |s| &s.body_to_inertial)
    }

    fn sc_to_inertial(&self, date: Date) -> Result<RigidTransform, PixlocError> {
        self.interpolate(date, |s| &s.sc_to_inertial)
    }
}

/// Build a sample from position/velocity and attitude/spin state vectors.
pub fn sample_from_state(
    body_rotation: UnitQuaternion<f64>,
    body_spin: Vector3<f64>,
    sc_position: Vector3<f64>,
    sc_velocity: Vector3<f64>,
    sc_attitude: UnitQuaternion<f64>,
    sc_spin: Vector3<f64>,
) -> TrajectorySample {
    TrajectorySample {
        body_to_inertial: RigidTransform {
            rotation: body_rotation,
            translation: Vector3::zeros(),
            spin: body_spin,
            velocity: Vector3::zeros(),
        },
        sc_to_inertial: RigidTransform {
            rotation: sc_attitude,
            translation: sc_position,
            spin: sc_spin,
            velocity: sc_velocity,
        },
    }
}
