use thiserror::Error;

#[derive(Error, Debug)]
pub enum DemError {
    #[error("tile geometry has not been set")]
    MissingGeometry,

    #[error("loaded tile does not cover latitude {latitude} rad, longitude {longitude} rad")]
    NotCovering { latitude: f64, longitude: f64 },

    #[error("tile loading failed: {0}")]
    Loader(String),

    #[error("{0}")]
    Io(#[from] std::io::Error),
}
