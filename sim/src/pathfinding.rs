//! A* search over a [`NavGrid`].
//!
//! Movement is 8-directional with integer costs: 10 for an orthogonal step
//! and 14 for a diagonal one. The heuristic is the matching diagonal
//! distance, which is admissible and consistent for this cost model.
//!
//! Search state (g/h costs, came-from links) lives in a scratch arena indexed
//! by cell index instead of on the cells themselves, so repeated searches on
//! the same grid never see stale values.
//!
//! The open set is a plain vector scanned linearly for the best candidate.
//! That is fine for the tens-by-tens grids this game uses.

use crate::components::Position;
use crate::nav_grid::{Cell, CellCoord, NavGrid};
use log::debug;
use serde::{Deserialize, Serialize};

/// Cost of a horizontal or vertical step.
pub const ORTHOGONAL_COST: u32 = 10;

/// Cost of a diagonal step (10 * sqrt(2), rounded).
pub const DIAGONAL_COST: u32 = 14;

/// Octile distance between two cells in the 10/14 cost model.
pub fn diagonal_distance(a: CellCoord, b: CellCoord) -> u32 {
    let dx = a.x.abs_diff(b.x) as u32;
    let dy = a.y.abs_diff(b.y) as u32;
    DIAGONAL_COST * dx.min(dy) + ORTHOGONAL_COST * (dx.max(dy) - dx.min(dy))
}

/// Ordered cells from (excluded) start to (included) goal.
///
/// An empty path means "no path", "no destination" or "already there";
/// followers treat all three the same way.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Path {
    cells: Vec<Cell>,
}

impl Path {
    pub fn new(cells: Vec<Cell>) -> Self {
        Self { cells }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Cell> {
        self.cells.get(index)
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter()
    }

    pub fn goal(&self) -> Option<&Cell> {
        self.cells.last()
    }

    pub fn contains(&self, coord: CellCoord) -> bool {
        self.cells.iter().any(|c| c.coord == coord)
    }

    /// Total step cost of walking this path starting from `start`.
    pub fn cost_from(&self, start: CellCoord) -> u32 {
        let mut prev = start;
        let mut total = 0;
        for cell in &self.cells {
            total += diagonal_distance(prev, cell.coord);
            prev = cell.coord;
        }
        total
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeState {
    Unvisited,
    Open,
    Closed,
}

/// Per-search bookkeeping, one slot per grid cell.
#[derive(Debug, Default)]
struct SearchScratch {
    g_cost: Vec<u32>,
    h_cost: Vec<u32>,
    came_from: Vec<Option<usize>>,
    state: Vec<NodeState>,
    /// Frontier in insertion order.
    open: Vec<usize>,
}

impl SearchScratch {
    fn reset(&mut self, cell_count: usize) {
        self.g_cost.clear();
        self.g_cost.resize(cell_count, 0);
        self.h_cost.clear();
        self.h_cost.resize(cell_count, 0);
        self.came_from.clear();
        self.came_from.resize(cell_count, None);
        self.state.clear();
        self.state.resize(cell_count, NodeState::Unvisited);
        self.open.clear();
    }

    #[inline]
    fn f_cost(&self, index: usize) -> u32 {
        self.g_cost[index] + self.h_cost[index]
    }

    /// Position in `open` of the cell with the lowest f cost, ties broken
    /// by lowest h cost, then by insertion order.
    fn best_open(&self) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (slot, &index) in self.open.iter().enumerate() {
            match best {
                None => best = Some(slot),
                Some(b) => {
                    let current = self.open[b];
                    let (f, bf) = (self.f_cost(index), self.f_cost(current));
                    if f < bf || (f == bf && self.h_cost[index] < self.h_cost[current]) {
                        best = Some(slot);
                    }
                }
            }
        }
        best
    }
}

/// Reusable A* searcher.
///
/// Keeps its scratch buffers between calls to avoid reallocating for every
/// destination request.
#[derive(Debug, Default)]
pub struct PathFinder {
    scratch: SearchScratch,
}

impl PathFinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Path between two world positions.
    ///
    /// Both ends are snapped to their nearest walkable cell. Returns an empty
    /// path when the grid has no walkable cells, the goal is unreachable, or
    /// both ends snap to the same cell.
    pub fn find_path(&mut self, grid: &NavGrid, start: Position, goal: Position) -> Path {
        let (Some(start_cell), Some(goal_cell)) = (
            grid.closest_walkable_cell(start),
            grid.closest_walkable_cell(goal),
        ) else {
            debug!("No walkable cells to path between; returning empty path");
            return Path::empty();
        };

        self.find_path_between(grid, start_cell.coord, goal_cell.coord)
    }

    /// Path between two cells of `grid`.
    pub fn find_path_between(&mut self, grid: &NavGrid, start: CellCoord, goal: CellCoord) -> Path {
        let (Some(start_idx), Some(goal_idx)) = (grid.index_of(start), grid.index_of(goal)) else {
            return Path::empty();
        };
        if !grid.cell_by_index(start_idx).walkable || !grid.cell_by_index(goal_idx).walkable {
            return Path::empty();
        }

        let scratch = &mut self.scratch;
        scratch.reset(grid.len());
        scratch.h_cost[start_idx] = diagonal_distance(start, goal);
        scratch.state[start_idx] = NodeState::Open;
        scratch.open.push(start_idx);

        while let Some(slot) = scratch.best_open() {
            let current_idx = scratch.open.remove(slot);
            scratch.state[current_idx] = NodeState::Closed;

            if current_idx == goal_idx {
                return Self::retrace(grid, scratch, start_idx, goal_idx);
            }

            let current = grid.cell_by_index(current_idx).coord;
            for neighbor in grid.neighbors(current) {
                let Some(n_idx) = grid.index_of(neighbor) else {
                    continue;
                };
                if !grid.cell_by_index(n_idx).walkable || scratch.state[n_idx] == NodeState::Closed
                {
                    continue;
                }

                let tentative = scratch.g_cost[current_idx] + diagonal_distance(current, neighbor);
                let in_open = scratch.state[n_idx] == NodeState::Open;
                if tentative < scratch.g_cost[n_idx] || !in_open {
                    scratch.g_cost[n_idx] = tentative;
                    scratch.h_cost[n_idx] = diagonal_distance(neighbor, goal);
                    scratch.came_from[n_idx] = Some(current_idx);

                    if !in_open {
                        scratch.state[n_idx] = NodeState::Open;
                        scratch.open.push(n_idx);
                    }
                }
            }
        }

        debug!(
            "No path from ({}, {}) to ({}, {})",
            start.x, start.y, goal.x, goal.y
        );
        Path::empty()
    }

    fn retrace(grid: &NavGrid, scratch: &SearchScratch, start_idx: usize, goal_idx: usize) -> Path {
        let mut cells = Vec::new();
        let mut current = goal_idx;
        while current != start_idx {
            cells.push(*grid.cell_by_index(current));
            match scratch.came_from[current] {
                Some(prev) => current = prev,
                None => break,
            }
        }
        cells.reverse();
        Path::new(cells)
    }
}

/// One-shot search with a fresh [`PathFinder`].
pub fn find_path(grid: &NavGrid, start: Position, goal: Position) -> Path {
    PathFinder::new().find_path(grid, start, goal)
}
