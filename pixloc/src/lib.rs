//! Geolocation for push-broom line-scan imagery.
//!
//! Maps image coordinates of a scanning line sensor to ground points on
//! a digital elevation model (direct location) and ground points back to
//! fractional image coordinates (inverse location). The terrain lives in
//! the companion `demtree` crate, which provides min/max tree tiles and
//! their cache.
//!
//! Positions are meters, angles radians, dates UTC. The body frame is
//! Earth-fixed, the spacecraft frame is attached to the platform, and a
//! [`trajectory::TrajectoryProvider`] ties both to a common inertial
//! frame over the acquisition time range.

pub mod dual;
pub mod ellipsoid;
pub mod error;
pub mod intersection;
pub mod locator;
mod math;
pub mod meanplane;
pub mod pixelcross;
pub mod sensor;
pub mod time;
pub mod trajectory;
pub mod transform;

pub use ellipsoid::Ellipsoid;
pub use error::PixlocError;
pub use intersection::{
    BasicScanAlgorithm, ConstantElevationAlgorithm, DuvenhageAlgorithm, IntersectionAlgorithm,
};
pub use locator::{AtmosphericRefraction, Locator, SensorPixel};
pub use sensor::{LinearDatation, LineSensor, LosTable, LosTransform, ParameterDriver};
pub use trajectory::{sample_from_state, SampledTrajectory, TrajectoryProvider};
pub use transform::RigidTransform;

/// Speed of light in vacuum, m/s.
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;
