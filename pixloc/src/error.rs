use crate::time::Date;
use demtree::DemError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PixlocError {
    #[error("crossing line outside sensor range [{min_line}, {max_line}]")]
    OutOfLineRange { min_line: f64, max_line: f64 },

    #[error("date {date} outside trajectory range [{min}, {max}]")]
    OutOfTimeRange { date: Date, min: Date, max: Date },

    #[error("DEM entry point is behind the spacecraft")]
    DemEntryPointIsBehindSpacecraft,

    #[error("line of sight never crosses altitude {altitude} m")]
    LineOfSightNeverCrossesAltitude { altitude: f64 },

    #[error("line of sight never crosses latitude {latitude} rad")]
    LineOfSightNeverCrossesLatitude { latitude: f64 },

    #[error("line of sight never crosses longitude {longitude} rad")]
    LineOfSightNeverCrossesLongitude { longitude: f64 },

    #[error("unknown sensor {0}")]
    UnknownSensor(String),

    #[error("unknown parameter {0}")]
    UnknownParameter(String),

    #[error("target point maps outside the sensor swath")]
    TargetOutsideSwath,

    #[error(transparent)]
    Dem(#[from] DemError),
}
