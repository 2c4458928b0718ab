use nalgebra::Vector3;
use std::ops::{Add, Mul, Neg, Sub};

/// Scalar carrying its first derivative with respect to time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dual {
    pub value: f64,
    pub derivative: f64,
}

impl Dual {
    pub fn new(value: f64, derivative: f64) -> Self {
        Self { value, derivative }
    }

    pub fn constant(value: f64) -> Self {
        Self { value, derivative: 0.0 }
    }
}

/// 3-vector carrying its first derivative with respect to time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DualVector3 {
    pub value: Vector3<f64>,
    pub derivative: Vector3<f64>,
}

impl DualVector3 {
    pub fn new(value: Vector3<f64>, derivative: Vector3<f64>) -> Self {
        Self { value, derivative }
    }

    pub fn constant(value: Vector3<f64>) -> Self {
        Self { value, derivative: Vector3::zeros() }
    }

    /// Unit vector along `self`, with the matching derivative.
    ///
    /// d(v/|v|)/dt = v'/|v| - v (v·v')/|v|³
    pub fn normalized(&self) -> Self {
        let n = self.value.norm();
        let v_dot = self.value.dot(&self.derivative);
        Self {
            value: self.value / n,
            derivative: self.derivative / n - self.value * (v_dot / (n * n * n)),
        }
    }

    /// Angle between `self` and a fixed vector `w`, with derivative.
    ///
    /// Uses atan2 of the cross and dot products, which stays accurate for
    /// angles near 0 and π where acos loses precision.
    pub fn angle_to(&self, w: &Vector3<f64>) -> Dual {
        let u = self.value;
        let du = self.derivative;
        let cross = u.cross(w);
        let s = cross.norm();
        let c = u.dot(w);
        let angle = s.atan2(c);
        let ds = cross.dot(&du.cross(w)) / s;
        let dc = du.dot(w);
        let squared = u.norm_squared() * w.norm_squared();
        Dual::new(angle, (c * ds - s * dc) / squared)
    }
}

impl Add for DualVector3 {
    type Output = DualVector3;

    fn add(self, rhs: DualVector3) -> DualVector3 {
        DualVector3::new(self.value + rhs.value, self.derivative + rhs.derivative)
    }
}

impl Sub for DualVector3 {
    type Output = DualVector3;

    fn sub(self, rhs: DualVector3) -> DualVector3 {
        DualVector3::new(self.value - rhs.value, self.derivative - rhs.derivative)
    }
}

impl Mul<f64> for DualVector3 {
    type Output = DualVector3;

    fn mul(self, rhs: f64) -> DualVector3 {
        DualVector3::new(self.value * rhs, self.derivative * rhs)
    }
}

impl Neg for DualVector3 {
    type Output = DualVector3;

    fn neg(self) -> DualVector3 {
        DualVector3::new(-self.value, -self.derivative)
    }
}

#[cfg(test)]
mod tests {
    use super::DualVector3;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    /// Rotating unit vector u(t) = (cos ωt, sin ωt, 0) at t = t0.
    fn rotating(omega: f64, t0: f64) -> DualVector3 {
        let (s, c) = (omega * t0).sin_cos();
        DualVector3::new(
            Vector3::new(c, s, 0.0),
            Vector3::new(-omega * s, omega * c, 0.0),
        )
    }

    #[test]
    fn test_normalized_derivative() {
        // v(t) = (1 + t, 2t, 3), numerical check of d(v/|v|)/dt at t = 0.2
        let v = |t: f64| Vector3::new(1.0 + t, 2.0 * t, 3.0);
        let t0 = 0.2;
        let dual = DualVector3::new(v(t0), Vector3::new(1.0, 2.0, 0.0)).normalized();
        let h = 1e-6;
        let numerical = (v(t0 + h).normalize() - v(t0 - h).normalize()) / (2.0 * h);
        assert_relative_eq!(dual.derivative, numerical, epsilon = 1e-8);
        assert_relative_eq!(dual.value.norm(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_angle_derivative() {
        // u rotates at ω in the x-y plane, w fixed on x: dθ/dt = ω
        let w = Vector3::new(2.0, 0.0, 0.0);
        let u = rotating(0.3, 1.0);
        let angle = u.angle_to(&w);
        assert_relative_eq!(angle.value, 0.3, epsilon = 1e-12);
        assert_relative_eq!(angle.derivative, 0.3, epsilon = 1e-12);
    }

    #[test]
    fn test_angle_near_right_angle() {
        let w = Vector3::new(0.0, 1.0, 0.0);
        let u = rotating(0.5, 0.0);
        let angle = u.angle_to(&w);
        assert_relative_eq!(angle.value, std::f64::consts::FRAC_PI_2, epsilon = 1e-12);
        assert_relative_eq!(angle.derivative, -0.5, epsilon = 1e-12);
    }
}
