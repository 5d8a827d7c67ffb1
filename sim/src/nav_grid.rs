//! Navigation grids - static walkability sampled from obstacle geometry.
//!
//! A grid covers a rectangular world region split into square cells. Each
//! cell is marked walkable once, at build time, by asking the host's
//! obstacle query whether a box slightly smaller than the cell overlaps
//! anything. Grids never change afterwards; levels with several areas keep
//! one grid per [`Timeline`].

use crate::components::{Position, Timeline};
use crate::config::NavConfig;
use crate::error::{SimError, SimResult};
use bevy_ecs::prelude::*;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Fraction of the cell covered by the overlap probe box.
const PROBE_FILL: f32 = 0.9;

// ============================================================================
// OBSTACLES
// ============================================================================

/// "Is this world-space box occupied by a static obstacle?"
///
/// The only capability grid building needs from the host's collision system.
pub trait ObstacleQuery: Send + Sync {
    /// `half_extent` is half the side length of an axis-aligned square box
    /// centered on `center`.
    fn overlaps_box(&self, center: Position, half_extent: f32) -> bool;
}

impl<F> ObstacleQuery for F
where
    F: Fn(Position, f32) -> bool + Send + Sync,
{
    fn overlaps_box(&self, center: Position, half_extent: f32) -> bool {
        self(center, half_extent)
    }
}

/// Empty level: everything is walkable.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoObstacles;

impl ObstacleQuery for NoObstacles {
    fn overlaps_box(&self, _center: Position, _half_extent: f32) -> bool {
        false
    }
}

/// Axis-aligned solid rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ObstacleBox {
    pub min_x: f32,
    pub min_y: f32,
    pub max_x: f32,
    pub max_y: f32,
}

impl ObstacleBox {
    pub fn new(min_x: f32, min_y: f32, max_x: f32, max_y: f32) -> Self {
        Self {
            min_x: min_x.min(max_x),
            min_y: min_y.min(max_y),
            max_x: min_x.max(max_x),
            max_y: min_y.max(max_y),
        }
    }

    /// Touching edges do not count as overlap.
    pub fn overlaps(&self, center: Position, half_extent: f32) -> bool {
        center.x - half_extent < self.max_x
            && center.x + half_extent > self.min_x
            && center.y - half_extent < self.max_y
            && center.y + half_extent > self.min_y
    }
}

/// A static obstacle layer made of rectangles.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BoxObstacles {
    pub boxes: Vec<ObstacleBox>,
}

impl BoxObstacles {
    pub fn new(boxes: Vec<ObstacleBox>) -> Self {
        Self { boxes }
    }

    pub fn push(&mut self, obstacle: ObstacleBox) {
        self.boxes.push(obstacle);
    }
}

impl ObstacleQuery for BoxObstacles {
    fn overlaps_box(&self, center: Position, half_extent: f32) -> bool {
        self.boxes.iter().any(|b| b.overlaps(center, half_extent))
    }
}

// ============================================================================
// CELLS & GRID
// ============================================================================

/// Integer coordinates of a cell within its grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellCoord {
    pub x: usize,
    pub y: usize,
}

impl CellCoord {
    pub fn new(x: usize, y: usize) -> Self {
        Self { x, y }
    }
}

/// A single cell in a navigation grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    pub coord: CellCoord,
    /// Fixed when the grid is built.
    pub walkable: bool,
    /// World-space center of the cell.
    pub world_position: Position,
}

/// Immutable walkability grid over a rectangular world region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavGrid {
    /// Width of the grid in cells.
    pub width: usize,
    /// Height of the grid in cells.
    pub height: usize,
    /// Size of each cell in world units.
    pub cell_size: f32,
    /// World-space center of the covered region.
    pub center: Position,
    /// World position of the bottom-left corner of cell (0, 0).
    pub origin: Position,
    /// Grid cells (row-major order).
    cells: Vec<Cell>,
}

impl NavGrid {
    /// Sample `obstacles` at every cell of a `width` x `height` world region
    /// centered on `center`.
    ///
    /// The cell count per axis is the extent divided by `cell_size`,
    /// truncated. Building twice from the same inputs gives identical grids.
    pub fn build<Q>(
        center: Position,
        width: f32,
        height: f32,
        cell_size: f32,
        obstacles: &Q,
    ) -> SimResult<Self>
    where
        Q: ObstacleQuery + ?Sized,
    {
        if !(cell_size.is_finite() && cell_size > 0.0) {
            return Err(SimError::InvalidGrid(format!(
                "cell size must be positive, got {cell_size}"
            )));
        }
        if !(center.x.is_finite() && center.y.is_finite()) {
            return Err(SimError::InvalidGrid("grid center must be finite".to_string()));
        }

        let cols = (width / cell_size) as usize;
        let rows = (height / cell_size) as usize;
        if cols == 0 || rows == 0 {
            return Err(SimError::InvalidGrid(format!(
                "{width}x{height} area holds no {cell_size}-sized cells"
            )));
        }

        let origin = Position::new(
            center.x - cols as f32 * 0.5 * cell_size,
            center.y - rows as f32 * 0.5 * cell_size,
        );
        let half_extent = cell_size * PROBE_FILL * 0.5;

        let make_cell = |index: usize| {
            let coord = CellCoord::new(index % cols, index / cols);
            let world_position = Position::new(
                origin.x + (coord.x as f32 + 0.5) * cell_size,
                origin.y + (coord.y as f32 + 0.5) * cell_size,
            );
            Cell {
                coord,
                walkable: !obstacles.overlaps_box(world_position, half_extent),
                world_position,
            }
        };

        #[cfg(feature = "parallel")]
        let cells: Vec<Cell> = {
            use rayon::prelude::*;
            (0..cols * rows).into_par_iter().map(make_cell).collect()
        };
        #[cfg(not(feature = "parallel"))]
        let cells: Vec<Cell> = (0..cols * rows).map(make_cell).collect();

        let grid = Self {
            width: cols,
            height: rows,
            cell_size,
            center,
            origin,
            cells,
        };

        debug!(
            "Built {}x{} nav grid at ({:.1}, {:.1}): {} walkable cells",
            cols,
            rows,
            center.x,
            center.y,
            grid.walkable_count()
        );
        if grid.walkable_count() == 0 {
            warn!("Nav grid at ({:.1}, {:.1}) has no walkable cells", center.x, center.y);
        }

        Ok(grid)
    }

    /// Build a grid from the shared dimensions in `config`.
    pub fn from_config<Q>(config: &NavConfig, timeline: Timeline, obstacles: &Q) -> SimResult<Self>
    where
        Q: ObstacleQuery + ?Sized,
    {
        let (cx, cy) = config.center_for(timeline);
        Self::build(
            Position::new(cx, cy),
            config.width,
            config.height,
            config.cell_size,
            obstacles,
        )
    }

    /// Get the cell index for grid coordinates.
    pub(crate) fn index_of(&self, coord: CellCoord) -> Option<usize> {
        if coord.x < self.width && coord.y < self.height {
            Some(coord.y * self.width + coord.x)
        } else {
            None
        }
    }

    /// Get a cell by grid coordinates.
    pub fn cell(&self, coord: CellCoord) -> Option<&Cell> {
        self.index_of(coord).map(|i| &self.cells[i])
    }

    pub(crate) fn cell_by_index(&self, index: usize) -> &Cell {
        &self.cells[index]
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn is_walkable(&self, coord: CellCoord) -> bool {
        self.cell(coord).map(|c| c.walkable).unwrap_or(false)
    }

    pub fn walkable_count(&self) -> usize {
        self.cells.iter().filter(|c| c.walkable).count()
    }

    /// Map a world position to a cell, clamping to the border for points
    /// outside the grid.
    ///
    /// Position is interpolated linearly across the grid extent and rounded
    /// to the nearest index, so this never fails for finite input.
    pub fn cell_at(&self, world_pos: Position) -> Cell {
        let extent_x = self.width as f32 * self.cell_size;
        let extent_y = self.height as f32 * self.cell_size;

        let percent_x = ((world_pos.x - self.origin.x) / extent_x).clamp(0.0, 1.0);
        let percent_y = ((world_pos.y - self.origin.y) / extent_y).clamp(0.0, 1.0);

        let x = (((self.width - 1) as f32) * percent_x).round() as usize;
        let y = (((self.height - 1) as f32) * percent_y).round() as usize;

        self.cells[y.min(self.height - 1) * self.width + x.min(self.width - 1)]
    }

    /// The walkable cell whose center is nearest to `world_pos`.
    ///
    /// Scans every cell; the first cell in row-major order wins ties.
    /// Returns `None` only when the grid has no walkable cells.
    pub fn closest_walkable_cell(&self, world_pos: Position) -> Option<Cell> {
        let mut best: Option<(f32, Cell)> = None;
        for cell in self.cells.iter().filter(|c| c.walkable) {
            let dist = world_pos.distance_to(&cell.world_position);
            match best {
                Some((best_dist, _)) if dist >= best_dist => {}
                _ => best = Some((dist, *cell)),
            }
        }
        best.map(|(_, cell)| cell)
    }

    /// In-bounds 8-connected neighbors of a cell, walkable or not.
    pub fn neighbors(&self, coord: CellCoord) -> impl Iterator<Item = CellCoord> + '_ {
        let (w, h) = (self.width as isize, self.height as isize);
        let (cx, cy) = (coord.x as isize, coord.y as isize);
        (-1isize..=1)
            .flat_map(|dx| (-1isize..=1).map(move |dy| (dx, dy)))
            .filter(|&(dx, dy)| dx != 0 || dy != 0)
            .map(move |(dx, dy)| (cx + dx, cy + dy))
            .filter(move |&(x, y)| x >= 0 && x < w && y >= 0 && y < h)
            .map(|(x, y)| CellCoord::new(x as usize, y as usize))
    }
}

/// Resource holding one grid per timeline.
#[derive(Resource, Debug, Clone, Default)]
pub struct NavGrids {
    grids: HashMap<Timeline, NavGrid>,
}

impl NavGrids {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the grid for `timeline`.
    pub fn insert(&mut self, timeline: Timeline, grid: NavGrid) {
        self.grids.insert(timeline, grid);
    }

    pub fn get(&self, timeline: Timeline) -> Option<&NavGrid> {
        self.grids.get(&timeline)
    }

    pub fn len(&self) -> usize {
        self.grids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grids.is_empty()
    }
}

/// Walkability dump for debug overlays.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavGridSnapshot {
    pub timeline: Timeline,
    pub width: usize,
    pub height: usize,
    pub cell_size: f32,
    pub origin_x: f32,
    pub origin_y: f32,
    /// Row-major walkability flags.
    pub walkable: Vec<bool>,
}

impl NavGridSnapshot {
    pub fn from_grid(timeline: Timeline, grid: &NavGrid) -> Self {
        Self {
            timeline,
            width: grid.width,
            height: grid.height,
            cell_size: grid.cell_size,
            origin_x: grid.origin.x,
            origin_y: grid.origin.y,
            walkable: grid.cells.iter().map(|c| c.walkable).collect(),
        }
    }
}
