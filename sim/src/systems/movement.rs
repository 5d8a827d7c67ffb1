//! Movement systems - resolve destination requests and follow paths.

use crate::components::*;
use crate::nav_grid::NavGrids;
use crate::pathfinding::{Path, PathFinder};
use crate::systems::timescale::GameTime;
use bevy_ecs::prelude::*;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

/// Resource containing the fixed tick duration in seconds (unscaled).
#[derive(Resource, Default)]
pub struct DeltaTime(pub f32);

/// Walks an agent along a [`Path`] with eased acceleration.
///
/// The progress index only ever grows and never passes the end of the path.
/// Speed builds up while a path is being followed and drops to zero once
/// the path runs out.
#[derive(Component, Debug, Clone, Serialize, Deserialize)]
pub struct PathFollower {
    path: Path,
    index: usize,
    eased_speed: f32,
    /// Top speed in world units per second.
    pub max_speed: f32,
    /// Speed gained per second of following.
    pub acceleration: f32,
}

impl PathFollower {
    pub fn new(max_speed: f32, acceleration: f32) -> Self {
        Self {
            path: Path::empty(),
            index: 0,
            eased_speed: 0.0,
            max_speed,
            acceleration,
        }
    }

    /// Replace the current path and restart from its first cell.
    pub fn set_path(&mut self, path: Path) {
        self.path = path;
        self.index = 0;
    }

    /// Drop the current path. The next step reports no movement.
    pub fn clear_path(&mut self) {
        self.path = Path::empty();
        self.index = 0;
    }

    /// Stop dead (e.g. after taking a hit) but keep the path.
    pub fn reset_speed(&mut self) {
        self.eased_speed = 0.0;
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Index of the cell currently being walked toward.
    pub fn progress(&self) -> usize {
        self.index
    }

    pub fn eased_speed(&self) -> f32 {
        self.eased_speed
    }

    pub fn is_following(&self) -> bool {
        self.index < self.path.len()
    }

    /// Cells left to visit, including the current target.
    pub fn remaining(&self) -> usize {
        self.path.len().saturating_sub(self.index)
    }

    pub fn current_target(&self) -> Option<Position> {
        self.path.get(self.index).map(|c| c.world_position)
    }

    /// Advance `position` toward the current target cell.
    ///
    /// Moves by at most `eased_speed * timescale * dt` and never past the
    /// target. Reaching the target (within [`POSITION_EPSILON`]) snaps onto
    /// it and moves on to the next cell. Returns the direction of travel.
    pub fn step(&mut self, position: &mut Position, dt: f32, timescale: f32) -> MovementDirection {
        let Some(target) = self.current_target() else {
            self.eased_speed = 0.0;
            return MovementDirection::ZERO;
        };

        let direction = MovementDirection::towards(*position, target);

        self.eased_speed = (self.eased_speed + dt * self.acceleration).clamp(0.0, self.max_speed);
        let max_step = self.eased_speed * timescale * dt;
        *position = position.move_towards(target, max_step);

        if position.distance_to(&target) <= POSITION_EPSILON {
            *position = target;
            self.index += 1;
        }

        direction
    }
}

impl Default for PathFollower {
    fn default() -> Self {
        let config = crate::config::FollowerConfig::default();
        Self::new(config.max_speed, config.acceleration)
    }
}

/// Destination request for a navigating agent, consumed on the next tick.
#[derive(Component, Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum PathRequest {
    /// Plan a path from the agent's current position to this point.
    MoveTo { x: f32, y: f32 },
    /// Stop following any path.
    Clear,
}

/// System that turns pending [`PathRequest`]s into follower paths.
///
/// Start and goal are snapped to the nearest walkable cells of the grid for
/// the agent's timeline. Requests are consumed whether or not a path exists.
pub fn path_request_system(
    mut commands: Commands,
    grids: Res<NavGrids>,
    mut finder: Local<PathFinder>,
    mut query: Query<(Entity, &PathRequest, &Position, &Timeline, &mut PathFollower)>,
) {
    for (entity, request, pos, timeline, mut follower) in query.iter_mut() {
        match *request {
            PathRequest::MoveTo { x, y } => match grids.get(*timeline) {
                Some(grid) => {
                    let path = finder.find_path(grid, *pos, Position::new(x, y));
                    if path.is_empty() {
                        debug!("{:?}: no path to ({:.1}, {:.1})", entity, x, y);
                    }
                    follower.set_path(path);
                }
                None => {
                    warn!("No nav grid for timeline {}", timeline.as_str());
                    follower.clear_path();
                }
            },
            PathRequest::Clear => follower.clear_path(),
        }
        commands.entity(entity).remove::<PathRequest>();
    }
}

/// System that advances every follower along its path, scaled by game time.
pub fn path_follow_system(
    dt: Res<DeltaTime>,
    game_time: Res<GameTime>,
    mut query: Query<(&mut Position, &mut PathFollower, &mut MovementDirection)>,
) {
    let delta = dt.0;
    let timescale = game_time.timescale();
    for (mut pos, mut follower, mut direction) in query.iter_mut() {
        let mut next = *pos;
        *direction = follower.step(&mut next, delta, timescale);
        if next != *pos {
            *pos = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nav_grid::{NavGrid, NoObstacles};
    use crate::pathfinding::find_path;

    fn straight_path() -> Path {
        // Unit cells centered on (0.5, 0.5) .. (4.5, 0.5).
        let grid = NavGrid::build(Position::new(2.5, 0.5), 5.0, 1.0, 1.0, &NoObstacles).unwrap();
        find_path(&grid, Position::new(0.5, 0.5), Position::new(4.5, 0.5))
    }

    #[test]
    fn test_speed_eases_toward_max() {
        let mut follower = PathFollower::new(3.0, 5.0);
        follower.set_path(straight_path());
        let mut pos = Position::new(0.5, 0.5);

        follower.step(&mut pos, 0.1, 1.0);
        assert!((follower.eased_speed() - 0.5).abs() < 1e-5);
        assert!((pos.x - 0.55).abs() < 1e-5);

        for _ in 0..20 {
            follower.step(&mut pos, 0.1, 1.0);
        }
        assert!(follower.eased_speed() <= 3.0);
    }

    #[test]
    fn test_reaches_goal_and_stops() {
        let mut follower = PathFollower::new(3.0, 5.0);
        let path = straight_path();
        let len = path.len();
        follower.set_path(path);
        let mut pos = Position::new(0.5, 0.5);

        let mut last_dir = MovementDirection::ZERO;
        for _ in 0..500 {
            last_dir = follower.step(&mut pos, 0.05, 1.0);
            assert!(follower.progress() <= len);
        }

        assert_eq!(pos, Position::new(4.5, 0.5));
        assert_eq!(follower.progress(), len);
        assert!(!follower.is_following());
        assert!(last_dir.is_zero());
        assert_eq!(follower.eased_speed(), 0.0);
    }

    #[test]
    fn test_direction_is_normalized() {
        let mut follower = PathFollower::new(3.0, 5.0);
        follower.set_path(straight_path());
        let mut pos = Position::new(0.5, 0.5);
        let dir = follower.step(&mut pos, 0.1, 1.0);
        assert!((dir.x - 1.0).abs() < 1e-5);
        assert_eq!(dir.y, 0.0);
    }

    #[test]
    fn test_zero_timescale_freezes_position() {
        let mut follower = PathFollower::new(3.0, 5.0);
        follower.set_path(straight_path());
        let mut pos = Position::new(0.5, 0.5);
        for _ in 0..10 {
            follower.step(&mut pos, 0.1, 0.0);
        }
        assert_eq!(pos, Position::new(0.5, 0.5));
        assert_eq!(follower.progress(), 0);
    }

    #[test]
    fn test_clear_path_reports_no_movement() {
        let mut follower = PathFollower::new(3.0, 5.0);
        follower.set_path(straight_path());
        let mut pos = Position::new(0.5, 0.5);
        follower.step(&mut pos, 0.1, 1.0);

        follower.clear_path();
        let before = pos;
        let dir = follower.step(&mut pos, 0.1, 1.0);
        assert!(dir.is_zero());
        assert_eq!(pos, before);
        assert_eq!(follower.eased_speed(), 0.0);
    }

    #[test]
    fn test_reset_speed_keeps_path() {
        let mut follower = PathFollower::new(3.0, 5.0);
        follower.set_path(straight_path());
        let mut pos = Position::new(0.5, 0.5);
        for _ in 0..5 {
            follower.step(&mut pos, 0.1, 1.0);
        }

        follower.reset_speed();
        assert_eq!(follower.eased_speed(), 0.0);
        assert!(follower.is_following());
    }

    #[test]
    fn test_set_path_mid_traversal_restarts_progress() {
        let mut follower = PathFollower::new(3.0, 5.0);
        follower.set_path(straight_path());
        let mut pos = Position::new(0.5, 0.5);
        for _ in 0..30 {
            follower.step(&mut pos, 0.1, 1.0);
        }
        assert!(follower.progress() > 0);

        follower.set_path(straight_path());
        assert_eq!(follower.progress(), 0);
    }

    #[test]
    fn test_path_follow_system_uses_game_time() {
        let mut world = World::new();
        world.insert_resource(DeltaTime(1.0));
        world.insert_resource(GameTime::with_timescale(0.5));

        let mut follower = PathFollower::new(1.0, 10.0);
        follower.set_path(straight_path());
        let entity = world
            .spawn((Position::new(0.5, 0.5), follower, MovementDirection::ZERO))
            .id();

        let mut schedule = Schedule::default();
        schedule.add_systems(path_follow_system);
        schedule.run(&mut world);

        // Speed clamps to 1.0, half timescale: half a unit per second.
        let pos = world.get::<Position>(entity).unwrap();
        assert!((pos.x - 1.0).abs() < 1e-5);
        let dir = world.get::<MovementDirection>(entity).unwrap();
        assert!((dir.x - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_path_request_system_consumes_requests() {
        let mut world = World::new();
        let mut grids = NavGrids::new();
        grids.insert(
            Timeline::Present,
            NavGrid::build(Position::new(2.5, 2.5), 5.0, 5.0, 1.0, &NoObstacles).unwrap(),
        );
        world.insert_resource(grids);

        let entity = world
            .spawn((
                Position::new(0.5, 0.5),
                Timeline::Present,
                PathFollower::default(),
                PathRequest::MoveTo { x: 4.5, y: 4.5 },
            ))
            .id();

        let mut schedule = Schedule::default();
        schedule.add_systems(path_request_system);
        schedule.run(&mut world);

        assert!(world.get::<PathRequest>(entity).is_none());
        let follower = world.get::<PathFollower>(entity).unwrap();
        assert_eq!(follower.path().len(), 4);

        world.entity_mut(entity).insert(PathRequest::Clear);
        schedule.run(&mut world);
        assert!(world.get::<PathFollower>(entity).unwrap().path().is_empty());
    }

    #[test]
    fn test_path_request_without_grid_clears_path() {
        let mut world = World::new();
        world.insert_resource(NavGrids::new());

        let mut follower = PathFollower::default();
        follower.set_path(straight_path());
        let entity = world
            .spawn((
                Position::new(0.5, 0.5),
                Timeline::Future,
                follower,
                PathRequest::MoveTo { x: 1.0, y: 1.0 },
            ))
            .id();

        let mut schedule = Schedule::default();
        schedule.add_systems(path_request_system);
        schedule.run(&mut world);

        assert!(world.get::<PathFollower>(entity).unwrap().path().is_empty());
    }
}
