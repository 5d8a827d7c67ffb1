//! Tempo - Simulation Core
//!
//! A deterministic, fixed-timestep simulation for a top-down shooter where
//! time only flows as fast as the players move. Covers grid navigation
//! (A* over static walkability grids), path following, and derivation of the
//! global timescale. Uses `bevy_ecs` for the entity-component-system
//! architecture.

pub mod api;
pub mod components;
pub mod config;
pub mod error;
pub mod nav_grid;
pub mod pathfinding;
pub mod profiler;
pub mod systems;
pub mod world;

pub use api::SimWorld;
pub use components::*;
pub use config::{FollowerConfig, NavConfig, SimConfig, TimescaleConfig};
pub use error::{SimError, SimResult};
pub use nav_grid::{
    BoxObstacles, Cell, CellCoord, NavGrid, NavGridSnapshot, NavGrids, NoObstacles, ObstacleBox,
    ObstacleQuery,
};
pub use pathfinding::{find_path, Path, PathFinder};
pub use systems::*;
pub use world::Snapshot;
