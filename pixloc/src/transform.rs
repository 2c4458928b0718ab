use crate::dual::DualVector3;
use nalgebra::{UnitQuaternion, Vector3};

/// Rigid transform between two frames, with first-order motion.
///
/// Maps a point from frame A to frame B as `x_B = q · x_A + t`. The
/// velocity `v` is dt/dt and the spin `omega` is the instantaneous
/// rotation rate of frame A seen from frame B, expressed in B.
#[derive(Debug, Clone, Copy)]
pub struct RigidTransform {
    pub rotation: UnitQuaternion<f64>,
    pub translation: Vector3<f64>,
    pub spin: Vector3<f64>,
    pub velocity: Vector3<f64>,
}

impl RigidTransform {
    pub fn identity() -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation: Vector3::zeros(),
            spin: Vector3::zeros(),
            velocity: Vector3::zeros(),
        }
    }

    pub fn apply_point(&self, p: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * p + self.translation
    }

    pub fn apply_vector(&self, v: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * v
    }

    /// Transform a point fixed in frame A, tracking its apparent velocity
    /// in frame B.
    pub fn apply_point_dual(&self, p: &Vector3<f64>) -> DualVector3 {
        let rotated = self.rotation * p;
        DualVector3::new(
            rotated + self.translation,
            self.spin.cross(&rotated) + self.velocity,
        )
    }

    /// Transform a direction and its derivative.
    pub fn apply_vector_dual(&self, v: &DualVector3) -> DualVector3 {
        let rotated = self.rotation * v.value;
        DualVector3::new(
            rotated,
            self.rotation * v.derivative + self.spin.cross(&rotated),
        )
    }

    /// Inverse transform, mapping frame B back to frame A.
    pub fn inverse(&self) -> Self {
        let rotation = self.rotation.inverse();
        let translation = -(rotation * self.translation);
        let spin = -(rotation * self.spin);
        Self {
            rotation,
            translation,
            spin,
            velocity: spin.cross(&translation) - rotation * self.velocity,
        }
    }

    /// First-order extrapolation of the transform by `dt` seconds.
    pub fn shifted_by(&self, dt: f64) -> Self {
        Self {
            rotation: UnitQuaternion::from_scaled_axis(self.spin * dt) * self.rotation,
            translation: self.translation + self.velocity * dt,
            spin: self.spin,
            velocity: self.velocity,
        }
    }

    /// Composition applying `self` first, then `outer`.
    pub fn compose(&self, outer: &Self) -> Self {
        Self {
            rotation: outer.rotation * self.rotation,
            translation: outer.apply_point(&self.translation),
            spin: outer.spin + outer.rotation * self.spin,
            velocity: outer.velocity
                + outer.rotation * self.velocity
                + outer.spin.cross(&(outer.rotation * self.translation)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::RigidTransform;
    use approx::assert_relative_eq;
    use nalgebra::{UnitQuaternion, Vector3};

    fn sample() -> RigidTransform {
        RigidTransform {
            rotation: UnitQuaternion::from_scaled_axis(Vector3::new(0.1, -0.2, 0.3)),
            translation: Vector3::new(10.0, -5.0, 2.0),
            spin: Vector3::new(0.01, 0.02, -0.03),
            velocity: Vector3::new(1.0, 2.0, 3.0),
        }
    }

    #[test]
    fn test_inverse_round_trip() {
        let t = sample();
        let inv = t.inverse();
        let p = Vector3::new(3.0, -7.0, 11.0);
        assert_relative_eq!(inv.apply_point(&t.apply_point(&p)), p, epsilon = 1e-12);

        let composed = t.compose(&inv);
        assert_relative_eq!(composed.translation, Vector3::zeros(), epsilon = 1e-12);
        assert_relative_eq!(composed.rotation.angle(), 0.0, epsilon = 1e-12);
        assert_relative_eq!(composed.spin, Vector3::zeros(), epsilon = 1e-12);
        assert_relative_eq!(composed.velocity, Vector3::zeros(), epsilon = 1e-12);
    }

    #[test]
    fn test_point_velocity_matches_shift() {
        // derivative reported by apply_point_dual matches the finite
        // difference of the shifted transform
        let t = sample();
        let p = Vector3::new(3.0, -7.0, 11.0);
        let dual = t.apply_point_dual(&p);
        let h = 1e-7;
        let numerical =
            (t.shifted_by(h).apply_point(&p) - t.shifted_by(-h).apply_point(&p)) / (2.0 * h);
        assert_relative_eq!(dual.value, t.apply_point(&p), epsilon = 1e-12);
        assert_relative_eq!(dual.derivative, numerical, epsilon = 1e-6);
    }

    #[test]
    fn test_vector_derivative_matches_shift() {
        let t = sample();
        let v = crate::dual::DualVector3::constant(Vector3::new(0.0, 0.0, 1.0));
        let dual = t.apply_vector_dual(&v);
        let h = 1e-7;
        let numerical =
            (t.shifted_by(h).apply_vector(&v.value) - t.shifted_by(-h).apply_vector(&v.value))
                / (2.0 * h);
        assert_relative_eq!(dual.derivative, numerical, epsilon = 1e-6);
    }

    #[test]
    fn test_inverse_velocity_consistent() {
        // a point fixed in B seen from A moves opposite to a point fixed
        // in A seen from B, transported through the rotation
        let t = sample();
        let inv = t.inverse();
        let p_a = Vector3::new(1.0, 2.0, 3.0);
        let p_b = t.apply_point(&p_a);
        let v_in_b = t.apply_point_dual(&p_a).derivative;
        let v_in_a = inv.apply_point_dual(&p_b).derivative;
        assert_relative_eq!(v_in_a, -(inv.rotation * v_in_b), epsilon = 1e-12);
    }
}
