//! Partitioning of a pixel grid into tiles

use erosgis_core::{Error, PixelGrid, Result};

/// A tile: a window of the request grid at integer pixel offsets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    /// Position in row-major tiling order; merges follow it
    pub index: usize,
    /// Row offset in the request grid
    pub row_offset: usize,
    /// Column offset in the request grid
    pub col_offset: usize,
    /// Number of rows in this tile
    pub rows: usize,
    /// Number of columns in this tile
    pub cols: usize,
}

impl Tile {
    pub fn pixel_count(&self) -> u64 {
        self.rows as u64 * self.cols as u64
    }

    /// The tile's own grid within `grid`
    pub fn grid(&self, grid: &PixelGrid) -> PixelGrid {
        grid.window(self.row_offset, self.col_offset, self.rows, self.cols)
    }

    /// Convert tile-local coordinates to request grid coordinates
    pub fn to_source_coords(&self, local_row: usize, local_col: usize) -> (usize, usize) {
        (self.row_offset + local_row, self.col_offset + local_col)
    }
}

/// Side of the largest square tile within `tile_budget` pixels
pub fn tile_side(tile_budget: u64) -> Result<usize> {
    if tile_budget == 0 {
        return Err(Error::InvalidParameter {
            name: "tile_budget",
            value: "0".into(),
            reason: "a tile must hold at least one pixel".into(),
        });
    }
    Ok(((tile_budget as f64).sqrt().floor() as usize).max(1))
}

/// Iterator over square tiles covering a grid exactly.
///
/// Tiles on the last row and column are clipped to the grid; interiors never
/// overlap.
#[derive(Debug, Clone)]
pub struct TileIterator {
    total_rows: usize,
    total_cols: usize,
    side: usize,
    current_row: usize,
    current_col: usize,
    index: usize,
}

impl TileIterator {
    pub fn new(total_rows: usize, total_cols: usize, side: usize) -> Self {
        Self {
            total_rows,
            total_cols,
            side: side.max(1),
            current_row: 0,
            current_col: 0,
            index: 0,
        }
    }

    /// Tiles of `grid` within `tile_budget` pixels each
    pub fn for_grid(grid: &PixelGrid, tile_budget: u64) -> Result<Self> {
        Ok(Self::new(grid.rows, grid.cols, tile_side(tile_budget)?))
    }
}

impl Iterator for TileIterator {
    type Item = Tile;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current_row >= self.total_rows || self.total_cols == 0 {
            return None;
        }

        let tile = Tile {
            index: self.index,
            row_offset: self.current_row,
            col_offset: self.current_col,
            rows: self.side.min(self.total_rows - self.current_row),
            cols: self.side.min(self.total_cols - self.current_col),
        };

        self.index += 1;
        self.current_col += self.side;
        if self.current_col >= self.total_cols {
            self.current_col = 0;
            self.current_row += self.side;
        }

        Some(tile)
    }
}
