//! Digital Elevation Model tiles with min/max tree acceleration.
//!
//! A [`Tile`] is a rectangular elevation raster addressed by geodetic
//! latitude and longitude (radians). [`MinMaxTreeTile`] augments a tile
//! with a hierarchical min/max elevation summary that answers "is there
//! any terrain above altitude H in this sub-rectangle" in O(1) per level,
//! which is what lets ray/DEM intersection skip empty space. [`TileCache`]
//! keeps a bounded number of tiles resident and loads missing ones on
//! demand through an injected [`TileUpdater`] callback.

mod cache;
mod error;
mod geodetic;
mod minmax;
mod tile;

pub use crate::{
    cache::{TileCache, TileUpdater},
    error::DemError,
    geodetic::{normalize_longitude, NormalizedGeodeticPoint},
    minmax::MinMaxTreeTile,
    tile::{Location, Tile, UpdatableTile},
};
