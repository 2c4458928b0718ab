use crate::{DemError, MinMaxTreeTile};
use log::debug;
use std::sync::Arc;

/// Callback filling a freshly created tile with geometry and elevations.
///
/// Implementations typically read a DEM file covering the requested
/// point, but any elevation source works; tests use synthetic surfaces.
pub trait TileUpdater {
    fn update_tile(
        &self,
        latitude: f64,
        longitude: f64,
        tile: &mut MinMaxTreeTile,
    ) -> Result<(), DemError>;
}

impl<F> TileUpdater for F
where
    F: Fn(f64, f64, &mut MinMaxTreeTile) -> Result<(), DemError>,
{
    fn update_tile(
        &self,
        latitude: f64,
        longitude: f64,
        tile: &mut MinMaxTreeTile,
    ) -> Result<(), DemError> {
        self(latitude, longitude, tile)
    }
}

/// Bounded cache of min/max tree tiles, most recently used first.
///
/// Tile counts stay small (the algorithm walks at most a handful of
/// adjacent tiles per ray) so a linear scan beats a hash map here.
pub struct TileCache<U: TileUpdater> {
    updater: U,
    capacity: usize,
    tiles: Vec<Arc<MinMaxTreeTile>>,
}

impl<U: TileUpdater> TileCache<U> {
    pub fn new(updater: U, capacity: usize) -> Self {
        assert!(capacity > 0, "tile cache capacity must be positive");
        Self {
            updater,
            capacity,
            tiles: Vec::with_capacity(capacity),
        }
    }

    /// Tile covering the given geodetic point, loading it on a miss.
    pub fn get_tile(
        &mut self,
        latitude: f64,
        longitude: f64,
    ) -> Result<Arc<MinMaxTreeTile>, DemError> {
        if let Some(pos) = self.tiles.iter().position(|t| t.covers(latitude, longitude)) {
            let tile = self.tiles.remove(pos);
            self.tiles.insert(0, Arc::clone(&tile));
            return Ok(tile);
        }

        let mut tile = MinMaxTreeTile::new();
        self.updater.update_tile(latitude, longitude, &mut tile)?;
        tile.tile_update_completed()?;

        if !tile.covers(latitude, longitude) {
            // updater contract violation, surface it as an error so the
            // caller does not loop forever reloading the same tile
            return Err(DemError::NotCovering { latitude, longitude });
        }

        debug!(
            "loaded tile [{:.6}, {:.6}] x [{:.6}, {:.6}] rad, {} resident",
            tile.minimum_latitude(),
            tile.maximum_latitude(),
            tile.minimum_longitude(),
            tile.maximum_longitude(),
            self.tiles.len() + 1
        );

        let tile = Arc::new(tile);
        self.tiles.insert(0, Arc::clone(&tile));
        self.tiles.truncate(self.capacity);
        Ok(tile)
    }
}
