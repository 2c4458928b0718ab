use crate::time::{seconds_between, shifted, Date};
use nalgebra::{Rotation3, Unit, Vector3};

/// Adjustable scalar parameter of a viewing model.
///
/// `scale` is the natural magnitude of the parameter, used as the step
/// when estimating partial derivatives by finite differences.
#[derive(Debug, Clone)]
pub struct ParameterDriver {
    pub name: String,
    pub value: f64,
    pub scale: f64,
}

impl ParameterDriver {
    pub fn new(name: impl Into<String>, value: f64, scale: f64) -> Self {
        Self { name: name.into(), value, scale }
    }
}

/// Parametric adjustment applied to every raw line-of-sight vector.
#[derive(Debug, Clone)]
pub enum LosTransform {
    /// Rotation of the whole viewing frame around a fixed axis, by the
    /// driver value in radians.
    FixedRotation {
        driver: ParameterDriver,
        axis: Unit<Vector3<f64>>,
    },
    /// Scaling of the boresight component by the driver value, which
    /// widens or narrows the apparent field of view.
    Homothety { driver: ParameterDriver },
}

impl LosTransform {
    fn apply(&self, los: &Vector3<f64>) -> Vector3<f64> {
        match self {
            LosTransform::FixedRotation { driver, axis } => {
                Rotation3::from_axis_angle(axis, driver.value) * los
            }
            LosTransform::Homothety { driver } => {
                Vector3::new(los.x, los.y, driver.value * los.z)
            }
        }
    }

    fn driver(&self) -> &ParameterDriver {
        match self {
            LosTransform::FixedRotation { driver, .. } => driver,
            LosTransform::Homothety { driver } => driver,
        }
    }

    fn driver_mut(&mut self) -> &mut ParameterDriver {
        match self {
            LosTransform::FixedRotation { driver, .. } => driver,
            LosTransform::Homothety { driver } => driver,
        }
    }
}

/// Table of line-of-sight directions across the sensor, one per pixel,
/// with a chain of adjustable transforms applied on top.
#[derive(Debug, Clone)]
pub struct LosTable {
    raw: Vec<Vector3<f64>>,
    transforms: Vec<LosTransform>,
}

impl LosTable {
    pub fn new(raw: Vec<Vector3<f64>>) -> Self {
        assert!(raw.len() >= 2, "a line sensor needs at least two pixels");
        Self {
            raw: raw.into_iter().map(|v| v.normalize()).collect(),
            transforms: Vec::new(),
        }
    }

    pub fn with_transform(mut self, transform: LosTransform) -> Self {
        self.transforms.push(transform);
        self
    }

    pub fn pixel_count(&self) -> usize {
        self.raw.len()
    }

    /// Line of sight of one pixel, with all transforms applied.
    pub fn los(&self, pixel: usize) -> Vector3<f64> {
        let mut v = self.raw[pixel];
        for transform in &self.transforms {
            v = transform.apply(&v);
        }
        v.normalize()
    }

    /// Line of sight at a fractional pixel coordinate.
    ///
    /// Interpolates linearly between adjacent pixels and extrapolates
    /// along the end segments beyond the physical detector, so root
    /// finders can probe slightly outside the swath.
    pub fn interpolated_los(&self, x: f64) -> Vector3<f64> {
        let i = (x.floor() as i64).clamp(0, self.raw.len() as i64 - 2) as usize;
        let alpha = x - i as f64;
        let l0 = self.los(i);
        let l1 = self.los(i + 1);
        (l0 + (l1 - l0) * alpha).normalize()
    }

    pub fn parameter_names(&self) -> Vec<String> {
        self.transforms
            .iter()
            .map(|t| t.driver().name.clone())
            .collect()
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterDriver> {
        self.transforms
            .iter()
            .map(|t| t.driver())
            .find(|d| d.name == name)
    }

    /// Set a driver value; false when no driver carries the name.
    pub fn set_parameter(&mut self, name: &str, value: f64) -> bool {
        for transform in &mut self.transforms {
            let driver = transform.driver_mut();
            if driver.name == name {
                driver.value = value;
                return true;
            }
        }
        false
    }
}

/// Linear model tying acquisition line numbers to dates.
#[derive(Debug, Clone, Copy)]
pub struct LinearDatation {
    pub reference_date: Date,
    pub reference_line: f64,
    /// Lines per second.
    pub rate: f64,
}

impl LinearDatation {
    pub fn date(&self, line: f64) -> Date {
        shifted(self.reference_date, (line - self.reference_line) / self.rate)
    }

    pub fn line(&self, date: Date) -> f64 {
        self.reference_line + self.rate * seconds_between(self.reference_date, date)
    }
}

/// Push-broom line sensor: a row of pixels scanned by platform motion.
#[derive(Debug, Clone)]
pub struct LineSensor {
    name: String,
    /// Sensor position in the spacecraft frame.
    position: Vector3<f64>,
    datation: LinearDatation,
    los: LosTable,
}

impl LineSensor {
    pub fn new(
        name: impl Into<String>,
        position: Vector3<f64>,
        datation: LinearDatation,
        los: LosTable,
    ) -> Self {
        Self { name: name.into(), position, datation, los }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn position(&self) -> &Vector3<f64> {
        &self.position
    }

    pub fn pixel_count(&self) -> usize {
        self.los.pixel_count()
    }

    pub fn date(&self, line: f64) -> Date {
        self.datation.date(line)
    }

    pub fn line(&self, date: Date) -> f64 {
        self.datation.line(date)
    }

    pub fn rate(&self) -> f64 {
        self.datation.rate
    }

    pub fn los(&self, pixel: usize) -> Vector3<f64> {
        self.los.los(pixel)
    }

    pub fn interpolated_los(&self, x: f64) -> Vector3<f64> {
        self.los.interpolated_los(x)
    }

    pub fn parameter_names(&self) -> Vec<String> {
        self.los.parameter_names()
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterDriver> {
        self.los.parameter(name)
    }

    pub fn set_parameter(&mut self, name: &str, value: f64) -> bool {
        self.los.set_parameter(name, value)
    }
}
