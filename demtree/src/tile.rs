use crate::{DemError, NormalizedGeodeticPoint};
use nalgebra::Vector3;

/// Position of a point relative to a tile's interpolation grid.
///
/// A point "has interpolation neighbors" when the four cell corners
/// needed for bilinear interpolation all carry data, i.e. when the point
/// falls strictly inside the raster's last row and column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    SouthWest,
    West,
    NorthWest,
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    HasInterpolationNeighbors,
}

/// Mutable view handed to tile loaders.
pub trait UpdatableTile {
    /// Set the tile raster geometry. Latitude increases with row index,
    /// longitude with column index; angles are in radians.
    fn set_geometry(
        &mut self,
        min_latitude: f64,
        min_longitude: f64,
        latitude_step: f64,
        longitude_step: f64,
        latitude_rows: usize,
        longitude_columns: usize,
    );

    /// Set one elevation sample, in meters.
    fn set_elevation(&mut self, latitude_index: usize, longitude_index: usize, elevation: f64);
}

/// A rectangular DEM raster.
#[derive(Debug, Clone, Default)]
pub struct Tile {
    min_latitude: f64,
    min_longitude: f64,
    latitude_step: f64,
    longitude_step: f64,
    latitude_rows: usize,
    longitude_columns: usize,
    min_elevation: f64,
    max_elevation: f64,
    elevations: Vec<f64>,
}

impl UpdatableTile for Tile {
    fn set_geometry(
        &mut self,
        min_latitude: f64,
        min_longitude: f64,
        latitude_step: f64,
        longitude_step: f64,
        latitude_rows: usize,
        longitude_columns: usize,
    ) {
        self.min_latitude = min_latitude;
        self.min_longitude = min_longitude;
        self.latitude_step = latitude_step;
        self.longitude_step = longitude_step;
        self.latitude_rows = latitude_rows;
        self.longitude_columns = longitude_columns;
        self.elevations = vec![0.0; latitude_rows * longitude_columns];
    }

    fn set_elevation(&mut self, latitude_index: usize, longitude_index: usize, elevation: f64) {
        assert!(
            latitude_index < self.latitude_rows && longitude_index < self.longitude_columns,
            "elevation index ({latitude_index}, {longitude_index}) outside tile grid"
        );
        self.elevations[latitude_index * self.longitude_columns + longitude_index] = elevation;
    }
}

impl Tile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the geometry and freeze global min/max elevations. Must
    /// be called once all elevations have been set.
    pub fn tile_update_completed(&mut self) -> Result<(), DemError> {
        if self.latitude_rows == 0 || self.longitude_columns == 0 {
            return Err(DemError::MissingGeometry);
        }
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for &e in &self.elevations {
            min = min.min(e);
            max = max.max(e);
        }
        self.min_elevation = min;
        self.max_elevation = max;
        Ok(())
    }

    pub fn minimum_latitude(&self) -> f64 {
        self.min_latitude
    }

    pub fn minimum_longitude(&self) -> f64 {
        self.min_longitude
    }

    /// Latitude of the last (northernmost) sample row.
    pub fn maximum_latitude(&self) -> f64 {
        self.latitude_at_index(self.latitude_rows.saturating_sub(1))
    }

    /// Longitude of the last (easternmost) sample column.
    pub fn maximum_longitude(&self) -> f64 {
        self.longitude_at_index(self.longitude_columns.saturating_sub(1))
    }

    pub fn latitude_step(&self) -> f64 {
        self.latitude_step
    }

    pub fn longitude_step(&self) -> f64 {
        self.longitude_step
    }

    pub fn latitude_rows(&self) -> usize {
        self.latitude_rows
    }

    pub fn longitude_columns(&self) -> usize {
        self.longitude_columns
    }

    /// Lowest elevation sample in the tile, in meters.
    pub fn min_elevation(&self) -> f64 {
        self.min_elevation
    }

    /// Highest elevation sample in the tile, in meters.
    pub fn max_elevation(&self) -> f64 {
        self.max_elevation
    }

    pub fn latitude_at_index(&self, latitude_index: usize) -> f64 {
        self.min_latitude + latitude_index as f64 * self.latitude_step
    }

    pub fn longitude_at_index(&self, longitude_index: usize) -> f64 {
        self.min_longitude + longitude_index as f64 * self.longitude_step
    }

    /// Raw elevation sample at grid indices.
    pub fn elevation_at_indices(&self, latitude_index: usize, longitude_index: usize) -> f64 {
        assert!(
            latitude_index < self.latitude_rows && longitude_index < self.longitude_columns,
            "elevation index ({latitude_index}, {longitude_index}) outside tile grid"
        );
        self.elevations[latitude_index * self.longitude_columns + longitude_index]
    }

    /// Floor row index for a latitude; may be outside `[0, rows)`.
    pub fn floor_latitude_index(&self, latitude: f64) -> i64 {
        ((latitude - self.min_latitude) / self.latitude_step).floor() as i64
    }

    /// Floor column index for a longitude; may be outside `[0, columns)`.
    pub fn floor_longitude_index(&self, longitude: f64) -> i64 {
        ((longitude - self.min_longitude) / self.longitude_step).floor() as i64
    }

    /// Floor row index clamped into the raster.
    pub fn latitude_cell_index(&self, latitude: f64) -> usize {
        self.floor_latitude_index(latitude)
            .clamp(0, self.latitude_rows as i64 - 1) as usize
    }

    /// Floor column index clamped into the raster.
    pub fn longitude_cell_index(&self, longitude: f64) -> usize {
        self.floor_longitude_index(longitude)
            .clamp(0, self.longitude_columns as i64 - 1) as usize
    }

    /// Classify a point against the interpolation grid.
    pub fn locate(&self, latitude: f64, longitude: f64) -> Location {
        let lat_index = self.floor_latitude_index(latitude);
        let lon_index = self.floor_longitude_index(longitude);
        let last_row = self.latitude_rows as i64 - 2;
        let last_col = self.longitude_columns as i64 - 2;
        if lat_index < 0 {
            if lon_index < 0 {
                Location::SouthWest
            } else if lon_index <= last_col {
                Location::South
            } else {
                Location::SouthEast
            }
        } else if lat_index <= last_row {
            if lon_index < 0 {
                Location::West
            } else if lon_index <= last_col {
                Location::HasInterpolationNeighbors
            } else {
                Location::East
            }
        } else if lon_index < 0 {
            Location::NorthWest
        } else if lon_index <= last_col {
            Location::North
        } else {
            Location::NorthEast
        }
    }

    /// True when the point can be bilinearly interpolated in this tile.
    pub fn covers(&self, latitude: f64, longitude: f64) -> bool {
        self.locate(latitude, longitude) == Location::HasInterpolationNeighbors
    }

    /// Bilinear elevation interpolation.
    ///
    /// Pure function of the frozen tile state. Interpolating outside the
    /// tile is a programming error and panics.
    pub fn interpolate_elevation(&self, latitude: f64, longitude: f64) -> f64 {
        let lat_pos = (latitude - self.min_latitude) / self.latitude_step;
        let lon_pos = (longitude - self.min_longitude) / self.longitude_step;
        assert!(
            (-1e-9..=(self.latitude_rows as f64 - 1.0) + 1e-9).contains(&lat_pos)
                && (-1e-9..=(self.longitude_columns as f64 - 1.0) + 1e-9).contains(&lon_pos),
            "interpolation point outside tile"
        );

        let i = (lat_pos.floor() as i64).clamp(0, self.latitude_rows as i64 - 2) as usize;
        let j = (lon_pos.floor() as i64).clamp(0, self.longitude_columns as i64 - 2) as usize;
        let dv = lat_pos - i as f64;
        let du = lon_pos - j as f64;

        let z00 = self.elevation_at_indices(i, j);
        let z10 = self.elevation_at_indices(i, j + 1);
        let z01 = self.elevation_at_indices(i + 1, j);
        let z11 = self.elevation_at_indices(i + 1, j + 1);
        (z00 * (1.0 - du) + z10 * du) * (1.0 - dv) + (z01 * (1.0 - du) + z11 * du) * dv
    }

    /// Exact intersection of a line segment with the bilinear elevation
    /// surface of one raw cell.
    ///
    /// `p` is the segment start and `dp` the segment direction in geodetic
    /// space `(Δlatitude, Δlongitude, Δaltitude)`; the parameter along the
    /// segment is searched within `[0, 1]`. Returns the first crossing
    /// along the segment, or `None` if the segment stays clear of the
    /// surface patch.
    pub fn cell_intersection(
        &self,
        p: &NormalizedGeodeticPoint,
        dp: &Vector3<f64>,
        latitude_index: usize,
        longitude_index: usize,
    ) -> Option<NormalizedGeodeticPoint> {
        let i = latitude_index.min(self.latitude_rows - 2);
        let j = longitude_index.min(self.longitude_columns - 2);

        let z00 = self.elevation_at_indices(i, j);
        let z10 = self.elevation_at_indices(i, j + 1);
        let z01 = self.elevation_at_indices(i + 1, j);
        let z11 = self.elevation_at_indices(i + 1, j + 1);

        // surface: z(u, v) = z00 + a·u + b·v + c·u·v
        // with u along longitude and v along latitude, in cell fractions
        let a = z10 - z00;
        let b = z01 - z00;
        let c = z00 - z10 - z01 + z11;

        let u0 = (p.longitude() - self.longitude_at_index(j)) / self.longitude_step;
        let v0 = (p.latitude() - self.latitude_at_index(i)) / self.latitude_step;
        let du = dp.y / self.longitude_step;
        let dv = dp.x / self.latitude_step;

        // altitude above surface along the segment is quadratic in t
        let qa = -c * du * dv;
        let qb = dp.z - a * du - b * dv - c * (u0 * dv + v0 * du);
        let qc = p.altitude() - (z00 + a * u0 + b * v0 + c * u0 * v0);

        const TOLERANCE: f64 = 1e-10;
        let t = smallest_root_in_unit_interval(qa, qb, qc, TOLERANCE)?;
        Some(NormalizedGeodeticPoint::new(
            p.latitude() + t * dp.x,
            p.longitude() + t * dp.y,
            p.altitude() + t * dp.z,
            p.longitude(),
        ))
    }
}

/// Smallest root of `qa·t² + qb·t + qc = 0` within `[-tol, 1 + tol]`,
/// clamped to `[0, 1]`.
fn smallest_root_in_unit_interval(qa: f64, qb: f64, qc: f64, tol: f64) -> Option<f64> {
    let scale = qa.abs().max(qb.abs()).max(qc.abs());
    if scale == 0.0 {
        // segment lies exactly on the surface
        return Some(0.0);
    }
    let accept = |t: f64| -> Option<f64> {
        if (-tol..=1.0 + tol).contains(&t) {
            Some(t.clamp(0.0, 1.0))
        } else {
            None
        }
    };
    if qa.abs() < 1e-15 * scale {
        if qb.abs() < 1e-15 * scale {
            return None;
        }
        return accept(-qc / qb);
    }
    let discriminant = qb * qb - 4.0 * qa * qc;
    if discriminant < 0.0 {
        return None;
    }
    // numerically stable quadratic roots
    let q = -0.5 * (qb + qb.signum() * discriminant.sqrt());
    let (t1, t2) = if q == 0.0 {
        (0.0, 0.0)
    } else {
        (q / qa, qc / q)
    };
    let (lo, hi) = if t1 <= t2 { (t1, t2) } else { (t2, t1) };
    accept(lo).or_else(|| accept(hi))
}
