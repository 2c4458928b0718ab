use crate::{tile::UpdatableTile, DemError, Tile};
use std::ops::Deref;

/// One stored merge level of the min/max tree.
///
/// Spans are expressed in raw cells; `start` is the offset of the level's
/// cells inside the flat tree arrays.
#[derive(Debug, Clone, Copy)]
struct TreeLevel {
    row_span: usize,
    col_span: usize,
    row_cells: usize,
    col_cells: usize,
    start: usize,
    /// True when this level was produced by merging column pairs of the
    /// next finer level.
    column_merge: bool,
}

/// DEM tile augmented with a hierarchical min/max elevation tree.
///
/// The tree merges raw cells pairwise, level after level, always along
/// the axis currently holding more cells so sub-rectangles trend toward
/// square. Level 0 is the coarsest stored level and `levels() - 1` the
/// finest; the trivial whole-tile root is not stored (the global min/max
/// are available on the tile itself). All elevations are merged with
/// elementwise min and max, so
/// `get_max_elevation(i, j, level) < h` proves no terrain in the level's
/// sub-rectangle around `(i, j)` reaches altitude `h`.
#[derive(Debug, Clone, Default)]
pub struct MinMaxTreeTile {
    tile: Tile,
    levels: Vec<TreeLevel>,
    /// Axis merged when collapsing level 0 into the unstored root.
    root_column_merge: bool,
    min_tree: Vec<f64>,
    max_tree: Vec<f64>,
}

impl Deref for MinMaxTreeTile {
    type Target = Tile;

    fn deref(&self) -> &Tile {
        &self.tile
    }
}

impl UpdatableTile for MinMaxTreeTile {
    fn set_geometry(
        &mut self,
        min_latitude: f64,
        min_longitude: f64,
        latitude_step: f64,
        longitude_step: f64,
        latitude_rows: usize,
        longitude_columns: usize,
    ) {
        self.tile.set_geometry(
            min_latitude,
            min_longitude,
            latitude_step,
            longitude_step,
            latitude_rows,
            longitude_columns,
        );
    }

    fn set_elevation(&mut self, latitude_index: usize, longitude_index: usize, elevation: f64) {
        self.tile.set_elevation(latitude_index, longitude_index, elevation);
    }
}

impl MinMaxTreeTile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Freeze the tile and build the min/max tree bottom-up.
    pub fn tile_update_completed(&mut self) -> Result<(), DemError> {
        self.tile.tile_update_completed()?;
        self.build_levels();
        self.build_trees();
        Ok(())
    }

    /// Number of stored merge levels.
    pub fn levels(&self) -> usize {
        self.levels.len()
    }

    /// Offset of a level inside the flat tree arrays.
    pub fn start(&self, level: usize) -> usize {
        self.levels[level].start
    }

    /// Minimum elevation of the level's sub-rectangle containing raw cell
    /// `(row, col)`.
    pub fn get_min_elevation(&self, row: usize, col: usize, level: usize) -> f64 {
        self.min_tree[self.tree_index(row, col, level)]
    }

    /// Maximum elevation of the level's sub-rectangle containing raw cell
    /// `(row, col)`.
    pub fn get_max_elevation(&self, row: usize, col: usize, level: usize) -> f64 {
        self.max_tree[self.tree_index(row, col, level)]
    }

    /// Deepest level at which both raw cells fall in the same
    /// sub-rectangle, or -1 if they differ even at level 0.
    pub fn get_merge_level(&self, row1: usize, col1: usize, row2: usize, col2: usize) -> i32 {
        let mut merged = -1;
        for (k, level) in self.levels.iter().enumerate() {
            if row1 / level.row_span == row2 / level.row_span
                && col1 / level.col_span == col2 / level.col_span
            {
                merged = k as i32;
            } else {
                // sub-rectangles are nested, finer levels cannot merge
                // cells a coarser level separates
                break;
            }
        }
        merged
    }

    /// True when sub-tiles of `level` sit side by side along columns
    /// inside their parent sub-tile of `level - 1`.
    ///
    /// `level` may be `levels()`, designating the raw cell grid.
    pub fn is_column_merging(&self, level: usize) -> bool {
        assert!(level <= self.levels.len(), "level {level} outside tree");
        if level == 0 {
            self.root_column_merge
        } else {
            self.levels[level - 1].column_merge
        }
    }

    /// Row indices of the level's sub-tile boundaries crossed when going
    /// from `row1` to `row2`, ordered from `row1` toward `row2`.
    ///
    /// `level` may be `levels()`, designating the raw cell grid.
    pub fn get_crossed_boundary_rows(&self, row1: usize, row2: usize, level: usize) -> Vec<usize> {
        crossed_boundaries(row1, row2, self.level_row_span(level))
    }

    /// Column indices of the level's sub-tile boundaries crossed when
    /// going from `col1` to `col2`, ordered from `col1` toward `col2`.
    ///
    /// `level` may be `levels()`, designating the raw cell grid.
    pub fn get_crossed_boundary_columns(&self, col1: usize, col2: usize, level: usize) -> Vec<usize> {
        crossed_boundaries(col1, col2, self.level_col_span(level))
    }

    fn level_row_span(&self, level: usize) -> usize {
        assert!(level <= self.levels.len(), "level {level} outside tree");
        if level == self.levels.len() {
            1
        } else {
            self.levels[level].row_span
        }
    }

    fn level_col_span(&self, level: usize) -> usize {
        assert!(level <= self.levels.len(), "level {level} outside tree");
        if level == self.levels.len() {
            1
        } else {
            self.levels[level].col_span
        }
    }

    fn tree_index(&self, row: usize, col: usize, level: usize) -> usize {
        assert!(level < self.levels.len(), "level {level} outside tree");
        assert!(
            row < self.tile.latitude_rows() && col < self.tile.longitude_columns(),
            "cell ({row}, {col}) outside tile grid"
        );
        let l = &self.levels[level];
        l.start + (row / l.row_span) * l.col_cells + col / l.col_span
    }

    fn build_levels(&mut self) {
        self.levels.clear();
        let mut rows = self.tile.latitude_rows();
        let mut cols = self.tile.longitude_columns();
        let mut row_span = 1;
        let mut col_span = 1;

        // finest stage first, coarsest last (including the 1x1 root)
        let mut stages = Vec::new();
        while rows * cols > 1 {
            let column_merge = cols >= rows;
            if column_merge {
                cols = (cols + 1) / 2;
                col_span *= 2;
            } else {
                rows = (rows + 1) / 2;
                row_span *= 2;
            }
            stages.push(TreeLevel {
                row_span,
                col_span,
                row_cells: rows,
                col_cells: cols,
                start: 0,
                column_merge,
            });
        }

        match stages.pop() {
            Some(root) => self.root_column_merge = root.column_merge,
            None => self.root_column_merge = false,
        }

        self.levels = stages.into_iter().rev().collect();
        let mut offset = 0;
        for level in &mut self.levels {
            level.start = offset;
            offset += level.row_cells * level.col_cells;
        }
    }

    fn build_trees(&mut self) {
        let size = self
            .levels
            .last()
            .map(|l| l.start + l.row_cells * l.col_cells)
            .unwrap_or(0);
        self.min_tree = vec![f64::INFINITY; size];
        self.max_tree = vec![f64::NEG_INFINITY; size];
        if self.levels.is_empty() {
            return;
        }

        // finest level directly from the raw elevations
        let finest = self.levels.len() - 1;
        let rows = self.tile.latitude_rows();
        let cols = self.tile.longitude_columns();
        for i in 0..rows {
            for j in 0..cols {
                let e = self.tile.elevation_at_indices(i, j);
                let idx = self.tree_index(i, j, finest);
                self.min_tree[idx] = self.min_tree[idx].min(e);
                self.max_tree[idx] = self.max_tree[idx].max(e);
            }
        }

        // then each coarser level from the next finer one
        for k in (0..finest).rev() {
            let fine = self.levels[k + 1];
            let coarse = self.levels[k];
            for r in 0..fine.row_cells {
                for c in 0..fine.col_cells {
                    let (cr, cc) = if coarse.column_merge {
                        (r, c / 2)
                    } else {
                        (r / 2, c)
                    };
                    let src = fine.start + r * fine.col_cells + c;
                    let dst = coarse.start + cr * coarse.col_cells + cc;
                    self.min_tree[dst] = self.min_tree[dst].min(self.min_tree[src]);
                    self.max_tree[dst] = self.max_tree[dst].max(self.max_tree[src]);
                }
            }
        }
    }
}

/// Multiples of `span` in `(min(i1, i2), max(i1, i2)]`, ordered from `i1`
/// toward `i2`.
fn crossed_boundaries(i1: usize, i2: usize, span: usize) -> Vec<usize> {
    let mut boundaries = Vec::new();
    if i1 <= i2 {
        let mut m = span * (i1 / span + 1);
        while m <= i2 {
            boundaries.push(m);
            m += span;
        }
    } else {
        let mut m = span * (i1 / span);
        while m > i2 {
            boundaries.push(m);
            m -= span;
        }
    }
    boundaries
}
