use crate::{ellipsoid::Ellipsoid, error::PixlocError, intersection::IntersectionAlgorithm};
use demtree::{Location, MinMaxTreeTile, NormalizedGeodeticPoint, TileCache, TileUpdater};
use log::debug;
use nalgebra::Vector3;

/// Forward nudge, in meters, used to step across tile borders and keep
/// shell crossings strictly off the terrain envelope.
const STEP: f64 = 0.01;

/// Recursion bound; geometry guarantees far shallower nesting, so
/// exceeding it means a contract violation somewhere upstream.
const MAX_RECURSION: usize = 30;

/// Ray exit point from a tile, with a flag telling whether the ray left
/// through a side (and may continue in a neighboring tile) or through
/// the bottom.
struct LimitPoint {
    point: NormalizedGeodeticPoint,
    side: bool,
}

/// Min/max KD-tree terrain intersection.
///
/// Walks the line of sight tile by tile; inside each tile, recursively
/// narrows the search using the min/max elevation tree so whole
/// sub-rectangles provably above the ray are skipped without looking at
/// individual cells.
///
/// `flat_body` reproduces a legacy mode that treats geodetic space as
/// linear when computing sub-tile boundary crossings; it is kept for
/// bit-compatibility with older processing chains and is less accurate.
pub struct DuvenhageAlgorithm<U: TileUpdater> {
    cache: TileCache<U>,
    flat_body: bool,
    cell_checks: usize,
}

impl<U: TileUpdater> DuvenhageAlgorithm<U> {
    pub fn new(updater: U, max_cached_tiles: usize, flat_body: bool) -> Self {
        Self {
            cache: TileCache::new(updater, max_cached_tiles),
            flat_body,
            cell_checks: 0,
        }
    }

    /// Number of exact cell intersections attempted so far. Exposed for
    /// instrumentation; the pruning efficiency of the tree shows up here
    /// rather than in timings.
    pub fn cell_checks(&self) -> usize {
        self.cell_checks
    }

    fn find_exit(
        &mut self,
        tile: &MinMaxTreeTile,
        ellipsoid: &Ellipsoid,
        position: &Vector3<f64>,
        los: &Vector3<f64>,
    ) -> Result<LimitPoint, PixlocError> {
        // cast the ray just below the lowest terrain of the tile
        let exit_p = ellipsoid.point_at_altitude(position, los, tile.min_elevation() - STEP)?;
        let exit_gp = ellipsoid.geodetic(&exit_p, tile.minimum_longitude());

        let lat_min = tile.minimum_latitude();
        let lat_max = tile.maximum_latitude();
        let lon_min = tile.minimum_longitude();
        let lon_max = tile.maximum_longitude();

        let side = |p: Vector3<f64>| LimitPoint {
            point: ellipsoid.geodetic(&p, lon_min),
            side: true,
        };

        match tile.locate(exit_gp.latitude(), exit_gp.longitude()) {
            Location::HasInterpolationNeighbors => Ok(LimitPoint {
                point: exit_gp,
                side: false,
            }),
            Location::South => {
                Ok(side(ellipsoid.point_at_latitude(position, los, lat_min, &exit_p)?))
            }
            Location::North => {
                Ok(side(ellipsoid.point_at_latitude(position, los, lat_max, &exit_p)?))
            }
            Location::West => Ok(side(ellipsoid.point_at_longitude(position, los, lon_min)?)),
            Location::East => Ok(side(ellipsoid.point_at_longitude(position, los, lon_max)?)),
            Location::SouthWest => Ok(side(select_closest(
                ellipsoid.point_at_latitude(position, los, lat_min, &exit_p)?,
                ellipsoid.point_at_longitude(position, los, lon_min)?,
                position,
            ))),
            Location::SouthEast => Ok(side(select_closest(
                ellipsoid.point_at_latitude(position, los, lat_min, &exit_p)?,
                ellipsoid.point_at_longitude(position, los, lon_max)?,
                position,
            ))),
            Location::NorthWest => Ok(side(select_closest(
                ellipsoid.point_at_latitude(position, los, lat_max, &exit_p)?,
                ellipsoid.point_at_longitude(position, los, lon_min)?,
                position,
            ))),
            Location::NorthEast => Ok(side(select_closest(
                ellipsoid.point_at_latitude(position, los, lat_max, &exit_p)?,
                ellipsoid.point_at_longitude(position, los, lon_max)?,
                position,
            ))),
        }
    }

    /// Narrow the search between entry and exit down to single cells.
    #[allow(clippy::too_many_arguments)]
    fn recurse_intersection(
        &mut self,
        depth: usize,
        ellipsoid: &Ellipsoid,
        position: &Vector3<f64>,
        los: &Vector3<f64>,
        tile: &MinMaxTreeTile,
        entry: &NormalizedGeodeticPoint,
        entry_lat: usize,
        entry_lon: usize,
        exit: &NormalizedGeodeticPoint,
        exit_lat: usize,
        exit_lon: usize,
    ) -> Option<NormalizedGeodeticPoint> {
        assert!(
            depth <= MAX_RECURSION,
            "tile narrowing did not terminate within {MAX_RECURSION} levels"
        );

        if entry_lat == exit_lat && entry_lon == exit_lon {
            // single cell, solve exactly
            self.cell_checks += 1;
            let dp = ellipsoid.geodetic_los(entry, exit);
            let mut intersection = tile.cell_intersection(entry, &dp, entry_lat, entry_lon);
            if let Some(found) = intersection {
                // project back on the 3D ray to absorb the curvature
                // neglected by the geodetic-space segment
                let delta = ellipsoid.cartesian(&found) - position;
                let s = delta.dot(los) / los.norm_squared();
                let projected = ellipsoid.geodetic(&(position + los * s), found.longitude());
                let dp2 = ellipsoid.geodetic_los(&projected, exit);
                if let Some(improved) =
                    tile.cell_intersection(&projected, &dp2, entry_lat, entry_lon)
                {
                    intersection = Some(improved);
                }
            }
            return intersection;
        }

        let level = tile.get_merge_level(entry_lat, entry_lon, exit_lat, exit_lon);
        if level >= 0 && exit.altitude() >= tile.get_max_elevation(exit_lat, exit_lon, level as usize)
        {
            // whole segment provably above terrain
            return None;
        }

        // split the segment at the boundaries between level+1 sub-tiles,
        // visiting the pieces in ray order
        let next_level = (level + 1) as usize;
        let mut previous = *entry;
        let mut previous_lat = entry_lat;
        let mut previous_lon = entry_lon;

        if tile.is_column_merging(next_level) {
            let ascending = entry_lon <= exit_lon;
            for crossing_lon in tile.get_crossed_boundary_columns(entry_lon, exit_lon, next_level) {
                let longitude = tile.longitude_at_index(crossing_lon);
                let crossing =
                    self.longitude_crossing(ellipsoid, position, los, tile, entry, exit, longitude);
                let crossing_lat =
                    clamp_between(tile.latitude_cell_index(crossing.latitude()), entry_lat, exit_lat);
                // the boundary index separates the two neighboring cells
                let (before, after) = if ascending {
                    (crossing_lon - 1, crossing_lon)
                } else {
                    (crossing_lon, crossing_lon - 1)
                };
                if before != previous_lon || crossing_lat != previous_lat {
                    let found = self.recurse_intersection(
                        depth + 1, ellipsoid, position, los, tile,
                        &previous, previous_lat, previous_lon,
                        &crossing, crossing_lat, before,
                    );
                    if found.is_some() {
                        return found;
                    }
                }
                previous = crossing;
                previous_lat = crossing_lat;
                previous_lon = after;
            }
        } else {
            let ascending = entry_lat <= exit_lat;
            for crossing_lat in tile.get_crossed_boundary_rows(entry_lat, exit_lat, next_level) {
                let latitude = tile.latitude_at_index(crossing_lat);
                let crossing =
                    self.latitude_crossing(ellipsoid, position, los, tile, entry, exit, latitude);
                let crossing_lon =
                    clamp_between(tile.longitude_cell_index(crossing.longitude()), entry_lon, exit_lon);
                let (before, after) = if ascending {
                    (crossing_lat - 1, crossing_lat)
                } else {
                    (crossing_lat, crossing_lat - 1)
                };
                if before != previous_lat || crossing_lon != previous_lon {
                    let found = self.recurse_intersection(
                        depth + 1, ellipsoid, position, los, tile,
                        &previous, previous_lat, previous_lon,
                        &crossing, before, crossing_lon,
                    );
                    if found.is_some() {
                        return found;
                    }
                }
                previous = crossing;
                previous_lat = after;
                previous_lon = crossing_lon;
            }
        }

        self.recurse_intersection(
            depth + 1, ellipsoid, position, los, tile,
            &previous, previous_lat, previous_lon,
            exit, exit_lat, exit_lon,
        )
    }

    /// Ray point at a meridian boundary, with a geodetic-linear fallback.
    #[allow(clippy::too_many_arguments)]
    fn longitude_crossing(
        &self,
        ellipsoid: &Ellipsoid,
        position: &Vector3<f64>,
        los: &Vector3<f64>,
        tile: &MinMaxTreeTile,
        entry: &NormalizedGeodeticPoint,
        exit: &NormalizedGeodeticPoint,
        longitude: f64,
    ) -> NormalizedGeodeticPoint {
        if !self.flat_body {
            // rays nearly parallel to the meridian plane fail here and
            // fall through to the linear approximation
            if let Ok(p) = ellipsoid.point_at_longitude(position, los, longitude) {
                return ellipsoid.geodetic(&p, tile.minimum_longitude());
            }
        }
        let d = exit.longitude() - entry.longitude();
        let c_entry = (exit.longitude() - longitude) / d;
        let c_exit = (longitude - entry.longitude()) / d;
        NormalizedGeodeticPoint::new(
            c_entry * entry.latitude() + c_exit * exit.latitude(),
            longitude,
            c_entry * entry.altitude() + c_exit * exit.altitude(),
            tile.minimum_longitude(),
        )
    }

    /// Ray point at a parallel boundary, with a geodetic-linear fallback.
    #[allow(clippy::too_many_arguments)]
    fn latitude_crossing(
        &self,
        ellipsoid: &Ellipsoid,
        position: &Vector3<f64>,
        los: &Vector3<f64>,
        tile: &MinMaxTreeTile,
        entry: &NormalizedGeodeticPoint,
        exit: &NormalizedGeodeticPoint,
        latitude: f64,
    ) -> NormalizedGeodeticPoint {
        if !self.flat_body {
            let close = ellipsoid.cartesian(entry);
            if let Ok(p) = ellipsoid.point_at_latitude(position, los, latitude, &close) {
                return ellipsoid.geodetic(&p, tile.minimum_longitude());
            }
        }
        let d = exit.latitude() - entry.latitude();
        let c_entry = (exit.latitude() - latitude) / d;
        let c_exit = (latitude - entry.latitude()) / d;
        NormalizedGeodeticPoint::new(
            latitude,
            c_entry * entry.longitude() + c_exit * exit.longitude(),
            c_entry * entry.altitude() + c_exit * exit.altitude(),
            tile.minimum_longitude(),
        )
    }
}

impl<U: TileUpdater> IntersectionAlgorithm for DuvenhageAlgorithm<U> {
    fn intersection(
        &mut self,
        ellipsoid: &Ellipsoid,
        position: &Vector3<f64>,
        los: &Vector3<f64>,
    ) -> Result<NormalizedGeodeticPoint, PixlocError> {
        // locate the tile below the ellipsoid-level crossing, then climb
        // back up the terrain envelope to find the true entry point
        let ground = ellipsoid.point_on_ground(position, los, 0.0)?;
        let mut tile = self.cache.get_tile(ground.latitude(), ground.longitude())?;
        let mut h_max = tile.max_elevation();
        let mut current;
        loop {
            let entry_p = ellipsoid.point_at_altitude(position, los, h_max + STEP)?;
            if (entry_p - position).dot(los) < 0.0 {
                return Err(PixlocError::DemEntryPointIsBehindSpacecraft);
            }
            let entry = ellipsoid.geodetic(&entry_p, tile.minimum_longitude());
            if tile.covers(entry.latitude(), entry.longitude()) {
                current = entry;
                break;
            }
            debug!("entry point in another tile, switching");
            tile = self.cache.get_tile(entry.latitude(), entry.longitude())?;
            h_max = h_max.max(tile.max_elevation());
        }

        loop {
            let exit = self.find_exit(&tile, ellipsoid, position, los)?;
            let found = self.recurse_intersection(
                0, ellipsoid, position, los, &tile,
                &current,
                tile.latitude_cell_index(current.latitude()),
                tile.longitude_cell_index(current.longitude()),
                &exit.point,
                tile.latitude_cell_index(exit.point.latitude()),
                tile.longitude_cell_index(exit.point.longitude()),
            );
            if let Some(intersection) = found {
                return Ok(intersection);
            }
            assert!(
                exit.side,
                "ray left the terrain envelope through the tile bottom without intersecting"
            );

            // move slightly past the exit, into the next tile
            let forward = ellipsoid.cartesian(&exit.point) + los.normalize() * STEP;
            current = ellipsoid.geodetic(&forward, tile.minimum_longitude());
            tile = self.cache.get_tile(current.latitude(), current.longitude())?;
            if tile.interpolate_elevation(current.latitude(), current.longitude())
                >= current.altitude()
            {
                // the ray grazed the terrain during the forward step
                return Ok(current);
            }
        }
    }

    fn refine_intersection(
        &mut self,
        ellipsoid: &Ellipsoid,
        position: &Vector3<f64>,
        los: &Vector3<f64>,
        close_guess: &NormalizedGeodeticPoint,
    ) -> Result<Option<NormalizedGeodeticPoint>, PixlocError> {
        if self.flat_body {
            // the reference segment must span the whole tile elevation
            // range, even though the close guess is better; legacy chains
            // depend on this exact construction
            let tile = self
                .cache
                .get_tile(close_guess.latitude(), close_guess.longitude())?;
            let entry_p = ellipsoid.point_at_altitude(position, los, tile.max_elevation())?;
            let exit_p = ellipsoid.point_at_altitude(position, los, tile.min_elevation())?;
            let entry = ellipsoid.geodetic(&entry_p, tile.minimum_longitude());
            let exit = ellipsoid.geodetic(&exit_p, tile.minimum_longitude());
            let dp = ellipsoid.geodetic_los(&entry, &exit);
            Ok(tile.cell_intersection(
                &entry,
                &dp,
                tile.latitude_cell_index(close_guess.latitude()),
                tile.longitude_cell_index(close_guess.longitude()),
            ))
        } else {
            let delta = ellipsoid.cartesian(close_guess) - position;
            let s = delta.dot(los) / los.norm_squared();
            let projected = ellipsoid.geodetic(&(position + los * s), close_guess.longitude());
            let tile = self
                .cache
                .get_tile(projected.latitude(), projected.longitude())?;

            // short segment bracketing the guess by about a cell diagonal
            let d = (tile.latitude_step() + tile.longitude_step()) * ellipsoid.equatorial_radius();
            let step = los * (d / los.norm());
            let p_before = ellipsoid.geodetic(&(position + los * s - step), projected.longitude());
            let p_after = ellipsoid.geodetic(&(position + los * s + step), projected.longitude());
            let dp = ellipsoid.geodetic_los(&p_before, &p_after);
            Ok(tile.cell_intersection(
                &p_before,
                &dp,
                tile.latitude_cell_index(projected.latitude()),
                tile.longitude_cell_index(projected.longitude()),
            ))
        }
    }

    fn get_elevation(&mut self, latitude: f64, longitude: f64) -> Result<f64, PixlocError> {
        let tile = self.cache.get_tile(latitude, longitude)?;
        Ok(tile.interpolate_elevation(latitude, longitude))
    }
}

fn select_closest(a: Vector3<f64>, b: Vector3<f64>, position: &Vector3<f64>) -> Vector3<f64> {
    if (a - position).norm_squared() <= (b - position).norm_squared() {
        a
    } else {
        b
    }
}

fn clamp_between(value: usize, a: usize, b: usize) -> usize {
    value.clamp(a.min(b), a.max(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intersection::BasicScanAlgorithm;
    use approx::assert_relative_eq;
    use demtree::UpdatableTile;

    const TILE_CELLS: usize = 32;
    const STEP_RAD: f64 = 1e-4;
    const TILE_EXTENT: f64 = TILE_CELLS as f64 * STEP_RAD;

    /// Updater building synthetic tiles from an elevation function of
    /// absolute latitude/longitude, snapped to a global tile grid.
    fn updater<F>(
        elevation: F,
    ) -> impl Fn(f64, f64, &mut MinMaxTreeTile) -> Result<(), demtree::DemError>
    where
        F: Fn(f64, f64) -> f64,
    {
        move |latitude, longitude, tile| {
            let lat0 = (latitude / TILE_EXTENT).floor() * TILE_EXTENT;
            let lon0 = (longitude / TILE_EXTENT).floor() * TILE_EXTENT;
            // posts overlap on shared tile edges, the elevation function
            // keeps them consistent
            tile.set_geometry(lat0, lon0, STEP_RAD, STEP_RAD, TILE_CELLS + 1, TILE_CELLS + 1);
            for i in 0..=TILE_CELLS {
                for j in 0..=TILE_CELLS {
                    tile.set_elevation(
                        i,
                        j,
                        elevation(lat0 + i as f64 * STEP_RAD, lon0 + j as f64 * STEP_RAD),
                    );
                }
            }
            Ok(())
        }
    }

    fn geodetic(lat: f64, lon: f64, alt: f64) -> NormalizedGeodeticPoint {
        NormalizedGeodeticPoint::new(lat, lon, alt, lon)
    }

    /// Ray through two geodetic anchor points, with the position pulled
    /// far back along the line.
    fn ray(
        ellipsoid: &Ellipsoid,
        from: &NormalizedGeodeticPoint,
        to: &NormalizedGeodeticPoint,
    ) -> (Vector3<f64>, Vector3<f64>) {
        let a = ellipsoid.cartesian(from);
        let b = ellipsoid.cartesian(to);
        let los = (b - a).normalize();
        (a - los * 1.0e6, los)
    }

    #[test]
    fn test_flat_terrain_matches_ellipsoid_crossing() {
        let ellipsoid = Ellipsoid::wgs84();
        let mut algorithm = DuvenhageAlgorithm::new(updater(|_, _| 0.0), 8, false);

        let (position, los) = ray(
            &ellipsoid,
            &geodetic(0.0016, 0.0004, 900.0),
            &geodetic(0.0016, 0.0018, 0.0),
        );
        let found = algorithm.intersection(&ellipsoid, &position, &los).unwrap();
        let expected = ellipsoid.point_on_ground(&position, &los, 0.0).unwrap();
        assert_relative_eq!(found.latitude(), expected.latitude(), epsilon = 5e-8);
        assert_relative_eq!(found.longitude(), expected.longitude(), epsilon = 5e-8);
        assert!(found.altitude().abs() < 1e-2);
    }

    #[test]
    fn test_pruning_skips_cells() {
        let ellipsoid = Ellipsoid::wgs84();
        // a wall far north of the ray path raises the tile envelope
        let wall = |lat: f64, _lon: f64| if lat >= 0.0028 { 500.0 } else { 0.0 };
        let mut algorithm = DuvenhageAlgorithm::new(updater(wall), 8, false);

        // shallow descent over about twenty flat cells
        let (position, los) = ray(
            &ellipsoid,
            &geodetic(0.0016, 0.0005, 450.0),
            &geodetic(0.0016, 0.0025, 0.0),
        );
        let found = algorithm.intersection(&ellipsoid, &position, &los).unwrap();
        let expected = ellipsoid.point_on_ground(&position, &los, 0.0).unwrap();
        assert_relative_eq!(found.longitude(), expected.longitude(), epsilon = 5e-8);
        assert!(found.altitude().abs() < 1e-2);

        // the min/max tree must reject the flat stretch wholesale instead
        // of checking every crossed cell
        assert!(algorithm.cell_checks() >= 1);
        assert!(
            algorithm.cell_checks() <= 8,
            "{} cell checks",
            algorithm.cell_checks()
        );
    }

    #[test]
    fn test_hill_matches_basic_scan() {
        let ellipsoid = Ellipsoid::wgs84();
        let hill = |lat: f64, lon: f64| {
            let d_lat = (lat - 0.0016) / 4e-4;
            let d_lon = (lon - 0.0016) / 4e-4;
            600.0 * (-(d_lat * d_lat + d_lon * d_lon)).exp()
        };
        let mut fast = DuvenhageAlgorithm::new(updater(hill), 8, false);
        let mut reference = BasicScanAlgorithm::new(updater(hill), 8);

        let (position, los) = ray(
            &ellipsoid,
            &geodetic(0.0016, 0.0002, 800.0),
            &geodetic(0.0016, 0.0020, 0.0),
        );
        let found = fast.intersection(&ellipsoid, &position, &los).unwrap();
        let expected = reference.intersection(&ellipsoid, &position, &los).unwrap();
        // the reference scan works on a geodetic-linear chord of the whole
        // tile segment and does not reproject on the ray, so a few meters
        // of disagreement are expected
        assert_relative_eq!(found.latitude(), expected.latitude(), epsilon = 2e-6);
        assert_relative_eq!(found.longitude(), expected.longitude(), epsilon = 2e-6);
        assert_relative_eq!(found.altitude(), expected.altitude(), epsilon = 3.0);
        // the ray must hit the western flank, before the crest
        assert!(found.longitude() < 0.0016);
        assert!(found.altitude() > 10.0);
    }

    #[test]
    fn test_tile_transition() {
        let ellipsoid = Ellipsoid::wgs84();
        // flat terrain, with a mountain in the eastern part of the second
        // tile lifting that tile's envelope
        let terrain = |_lat: f64, lon: f64| {
            if lon >= TILE_EXTENT + 24.0 * STEP_RAD && lon < 2.0 * TILE_EXTENT {
                2000.0
            } else {
                0.0
            }
        };
        let mut algorithm = DuvenhageAlgorithm::new(updater(terrain), 8, false);

        // descends through the first tile and lands early in the second,
        // well before the mountain
        let boundary = TILE_EXTENT;
        let (position, los) = ray(
            &ellipsoid,
            &geodetic(0.0016, boundary - 8.0 * STEP_RAD, 2000.0),
            &geodetic(0.0016, boundary, 1000.0),
        );
        let found = algorithm.intersection(&ellipsoid, &position, &los).unwrap();
        let expected = ellipsoid.point_on_ground(&position, &los, 0.0).unwrap();
        assert_relative_eq!(found.longitude(), expected.longitude(), epsilon = 1e-6);
        assert!(found.longitude() > boundary);
        assert!(found.longitude() < boundary + 20.0 * STEP_RAD);
        assert!(found.altitude().abs() < 0.5);
    }

    #[test]
    fn test_entry_point_behind() {
        let ellipsoid = Ellipsoid::wgs84();
        let mut algorithm = DuvenhageAlgorithm::new(updater(|_, _| 300.0), 8, false);

        // looking up from above the terrain envelope
        let origin = geodetic(0.0016, 0.0016, 400.0);
        let position = ellipsoid.cartesian(&origin);
        let los = position.normalize();
        assert!(matches!(
            algorithm.intersection(&ellipsoid, &position, &los),
            Err(PixlocError::DemEntryPointIsBehindSpacecraft)
        ));
    }

    #[test]
    fn test_refine_intersection() {
        let ellipsoid = Ellipsoid::wgs84();
        let slope = |lat: f64, lon: f64| 2000.0 * (lat + lon);
        let mut algorithm = DuvenhageAlgorithm::new(updater(slope), 8, false);

        let (position, los) = ray(
            &ellipsoid,
            &geodetic(0.0012, 0.0004, 600.0),
            &geodetic(0.0018, 0.0020, 0.0),
        );
        let found = algorithm.intersection(&ellipsoid, &position, &los).unwrap();

        // refine from a slightly degraded guess
        let guess = NormalizedGeodeticPoint::new(
            found.latitude() + 2.0e-6,
            found.longitude() - 2.0e-6,
            found.altitude() + 5.0,
            found.longitude(),
        );
        let refined = algorithm
            .refine_intersection(&ellipsoid, &position, &los, &guess)
            .unwrap()
            .unwrap();
        assert_relative_eq!(refined.latitude(), found.latitude(), epsilon = 5e-7);
        assert_relative_eq!(refined.longitude(), found.longitude(), epsilon = 5e-7);
        assert_relative_eq!(refined.altitude(), found.altitude(), epsilon = 0.1);
    }

    #[test]
    fn test_flat_body_stays_close() {
        let ellipsoid = Ellipsoid::wgs84();
        let hill = |lat: f64, lon: f64| {
            let d_lat = (lat - 0.0016) / 4e-4;
            let d_lon = (lon - 0.0016) / 4e-4;
            600.0 * (-(d_lat * d_lat + d_lon * d_lon)).exp()
        };
        let mut curved = DuvenhageAlgorithm::new(updater(hill), 8, false);
        let mut flat = DuvenhageAlgorithm::new(updater(hill), 8, true);

        let (position, los) = ray(
            &ellipsoid,
            &geodetic(0.0016, 0.0002, 800.0),
            &geodetic(0.0016, 0.0020, 0.0),
        );
        let a = curved.intersection(&ellipsoid, &position, &los).unwrap();
        let b = flat.intersection(&ellipsoid, &position, &los).unwrap();
        assert_relative_eq!(a.latitude(), b.latitude(), epsilon = 1e-6);
        assert_relative_eq!(a.longitude(), b.longitude(), epsilon = 1e-6);
        assert_relative_eq!(a.altitude(), b.altitude(), epsilon = 5.0);
    }

    #[test]
    fn test_get_elevation() {
        let mut algorithm =
            DuvenhageAlgorithm::new(updater(|lat, lon| 1000.0 * (lat + 2.0 * lon) / STEP_RAD), 8, false);
        // bilinear interpolation reproduces the plane exactly, and
        // repeated lookups are bit-identical
        let first = algorithm.get_elevation(0.00123, 0.00217).unwrap();
        assert_relative_eq!(first, 1000.0 * (0.00123 + 2.0 * 0.00217) / STEP_RAD, epsilon = 1e-6);
        for _ in 0..5 {
            let again = algorithm.get_elevation(0.00123, 0.00217).unwrap();
            assert_eq!(first.to_bits(), again.to_bits());
        }
    }
}
