mod duvenhage;

pub use duvenhage::DuvenhageAlgorithm;

use crate::{ellipsoid::Ellipsoid, error::PixlocError};
use demtree::{NormalizedGeodeticPoint, TileCache, TileUpdater};
use nalgebra::Vector3;

/// Strategy for intersecting a line of sight with the terrain.
///
/// All positions and directions are in the body-fixed frame, geodetic
/// results carry a longitude normalized near the intersected tile.
pub trait IntersectionAlgorithm {
    /// First intersection of the line of sight with the terrain.
    fn intersection(
        &mut self,
        ellipsoid: &Ellipsoid,
        position: &Vector3<f64>,
        los: &Vector3<f64>,
    ) -> Result<NormalizedGeodeticPoint, PixlocError>;

    /// Refine an intersection from a close guess, without searching.
    fn refine_intersection(
        &mut self,
        ellipsoid: &Ellipsoid,
        position: &Vector3<f64>,
        los: &Vector3<f64>,
        close_guess: &NormalizedGeodeticPoint,
    ) -> Result<Option<NormalizedGeodeticPoint>, PixlocError>;

    /// Terrain elevation at a point, in meters.
    fn get_elevation(&mut self, latitude: f64, longitude: f64) -> Result<f64, PixlocError>;
}

/// Algorithm ignoring the DEM entirely: the terrain is the ellipsoid
/// shifted to a constant elevation. Useful for quick-look processing and
/// as a reference in tests.
pub struct ConstantElevationAlgorithm {
    elevation: f64,
}

impl ConstantElevationAlgorithm {
    pub fn new(elevation: f64) -> Self {
        Self { elevation }
    }
}

impl IntersectionAlgorithm for ConstantElevationAlgorithm {
    fn intersection(
        &mut self,
        ellipsoid: &Ellipsoid,
        position: &Vector3<f64>,
        los: &Vector3<f64>,
    ) -> Result<NormalizedGeodeticPoint, PixlocError> {
        let p = ellipsoid.point_at_altitude(position, los, self.elevation)?;
        Ok(ellipsoid.geodetic(&p, 0.0))
    }

    fn refine_intersection(
        &mut self,
        ellipsoid: &Ellipsoid,
        position: &Vector3<f64>,
        los: &Vector3<f64>,
        close_guess: &NormalizedGeodeticPoint,
    ) -> Result<Option<NormalizedGeodeticPoint>, PixlocError> {
        let p = ellipsoid.point_at_altitude(position, los, self.elevation)?;
        Ok(Some(ellipsoid.geodetic(&p, close_guess.longitude())))
    }

    fn get_elevation(&mut self, _latitude: f64, _longitude: f64) -> Result<f64, PixlocError> {
        Ok(self.elevation)
    }
}

/// Brute-force algorithm scanning every cell the line of sight may
/// traverse in its tile. Quadratic and slow, kept as an independent
/// reference implementation for validating the fast algorithm.
pub struct BasicScanAlgorithm<U: TileUpdater> {
    cache: TileCache<U>,
}

impl<U: TileUpdater> BasicScanAlgorithm<U> {
    pub fn new(updater: U, max_cached_tiles: usize) -> Self {
        Self {
            cache: TileCache::new(updater, max_cached_tiles),
        }
    }
}

impl<U: TileUpdater> IntersectionAlgorithm for BasicScanAlgorithm<U> {
    fn intersection(
        &mut self,
        ellipsoid: &Ellipsoid,
        position: &Vector3<f64>,
        los: &Vector3<f64>,
    ) -> Result<NormalizedGeodeticPoint, PixlocError> {
        let ground = ellipsoid.point_on_ground(position, los, 0.0)?;
        let tile = self
            .cache
            .get_tile(ground.latitude(), ground.longitude())?;

        // segment covering the whole elevation range of the tile
        let entry_p = ellipsoid.point_at_altitude(position, los, tile.max_elevation() + 1.0)?;
        let exit_p = ellipsoid.point_at_altitude(position, los, tile.min_elevation() - 1.0)?;
        let entry = ellipsoid.geodetic(&entry_p, tile.minimum_longitude());
        let exit = ellipsoid.geodetic(&exit_p, tile.minimum_longitude());
        let dp = ellipsoid.geodetic_los(&entry, &exit);

        // scan every cell in the rectangle spanned by the segment
        let i_min = tile
            .latitude_cell_index(entry.latitude())
            .min(tile.latitude_cell_index(exit.latitude()));
        let i_max = tile
            .latitude_cell_index(entry.latitude())
            .max(tile.latitude_cell_index(exit.latitude()));
        let j_min = tile
            .longitude_cell_index(entry.longitude())
            .min(tile.longitude_cell_index(exit.longitude()));
        let j_max = tile
            .longitude_cell_index(entry.longitude())
            .max(tile.longitude_cell_index(exit.longitude()));

        let mut best: Option<NormalizedGeodeticPoint> = None;
        let mut best_distance = f64::INFINITY;
        for i in i_min..=i_max {
            for j in j_min..=j_max {
                if let Some(candidate) = tile.cell_intersection(&entry, &dp, i, j) {
                    // the surface patch extends beyond its cell, reject
                    // crossings landing in a different cell
                    if tile.latitude_cell_index(candidate.latitude()) != i
                        || tile.longitude_cell_index(candidate.longitude()) != j
                    {
                        continue;
                    }
                    let distance =
                        (ellipsoid.cartesian(&candidate) - position).norm_squared();
                    if distance < best_distance {
                        best_distance = distance;
                        best = Some(candidate);
                    }
                }
            }
        }
        best.ok_or(PixlocError::LineOfSightNeverCrossesAltitude {
            altitude: tile.min_elevation(),
        })
    }

    fn refine_intersection(
        &mut self,
        ellipsoid: &Ellipsoid,
        position: &Vector3<f64>,
        los: &Vector3<f64>,
        close_guess: &NormalizedGeodeticPoint,
    ) -> Result<Option<NormalizedGeodeticPoint>, PixlocError> {
        let tile = self
            .cache
            .get_tile(close_guess.latitude(), close_guess.longitude())?;
        let entry_p = ellipsoid.point_at_altitude(position, los, tile.max_elevation() + 1.0)?;
        let exit_p = ellipsoid.point_at_altitude(position, los, tile.min_elevation() - 1.0)?;
        let entry = ellipsoid.geodetic(&entry_p, tile.minimum_longitude());
        let exit = ellipsoid.geodetic(&exit_p, tile.minimum_longitude());
        let dp = ellipsoid.geodetic_los(&entry, &exit);
        Ok(tile.cell_intersection(
            &entry,
            &dp,
            tile.latitude_cell_index(close_guess.latitude()),
            tile.longitude_cell_index(close_guess.longitude()),
        ))
    }

    fn get_elevation(&mut self, latitude: f64, longitude: f64) -> Result<f64, PixlocError> {
        let tile = self.cache.get_tile(latitude, longitude)?;
        Ok(tile.interpolate_elevation(latitude, longitude))
    }
}
