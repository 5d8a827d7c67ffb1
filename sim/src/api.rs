//! Public API for the simulation.
//!
//! This module provides the main interface for the host engine (or any other
//! client) to drive the simulation.
//!
//! ## Fixed Timestep
//!
//! The simulation uses a fixed timestep internally (default 50 Hz). When
//! `step(dt)` is called, the simulation accumulates time and runs fixed
//! updates as needed, so the derived timescale and all movement are
//! independent of the host's frame rate.
//!
//! ## Tick Stages
//!
//! Each fixed update runs three stages in order:
//! 1. `timescale` - sample player movement, publish `GameTime`
//! 2. `path_requests` - resolve pending destination requests into paths
//! 3. `path_follow` - advance followers, scaled by `GameTime`

use crate::components::*;
use crate::config::SimConfig;
use crate::error::{SimError, SimResult};
use crate::nav_grid::{
    BoxObstacles, NavGrid, NavGridSnapshot, NavGrids, NoObstacles, ObstacleBox, ObstacleQuery,
};
use crate::profiler::Profiler;
use crate::systems::*;
use crate::world::Snapshot;
use bevy_ecs::prelude::*;
use log::{debug, info, warn};

fn stage<M>(systems: impl IntoSystemConfigs<M>) -> Schedule {
    let mut schedule = Schedule::default();
    schedule.add_systems(systems);
    schedule
}

/// The main simulation world container.
///
/// Holds the ECS world and tick stages, providing a clean API for:
/// - Building navigation grids
/// - Spawning players and enemies
/// - Stepping the simulation forward
/// - Issuing destination requests
/// - Reading the timescale and state snapshots
pub struct SimWorld {
    world: World,
    config: SimConfig,
    stages: Vec<(&'static str, Schedule)>,
    tick: u64,
    time: f32,
    /// Accumulated time for fixed timestep.
    time_accumulator: f32,
    profiler: Option<Profiler>,
}

impl SimWorld {
    /// Create a new empty simulation world with the default configuration.
    pub fn new() -> Self {
        Self::from_valid_config(SimConfig::default())
    }

    /// Create a new simulation world with custom configuration.
    pub fn with_config(config: SimConfig) -> SimResult<Self> {
        config.validate()?;
        Ok(Self::from_valid_config(config))
    }

    fn from_valid_config(config: SimConfig) -> Self {
        let mut world = World::new();

        world.insert_resource(DeltaTime(config.fixed_timestep));
        world.insert_resource(GameTime::default());
        world.insert_resource(TimescaleController::new(config.timescale.clone()));
        world.insert_resource(NavGrids::new());
        world.insert_resource(config.clone());

        let stages = vec![
            ("timescale", stage(timescale_system)),
            ("path_requests", stage(path_request_system)),
            ("path_follow", stage(path_follow_system)),
        ];

        info!(
            "Simulation created: {:.0} Hz, {:?} timescale policy",
            1.0 / config.fixed_timestep,
            config.timescale.policy
        );

        Self {
            world,
            config,
            stages,
            tick: 0,
            time: 0.0,
            time_accumulator: 0.0,
            profiler: None,
        }
    }

    /// Create a small demo level: a walled present-timeline arena, an open
    /// future-timeline arena, two players and three enemies.
    pub fn new_default_test_world() -> Self {
        let mut sim = Self::new();

        // Two wall segments leave a gap in the middle of the arena.
        let walls = BoxObstacles::new(vec![
            ObstacleBox::new(-1.0, -7.5, 1.0, -1.0),
            ObstacleBox::new(-1.0, 1.0, 1.0, 7.5),
        ]);
        // Defaults are valid, so building from them cannot fail.
        if let Ok(grid) = NavGrid::from_config(&sim.config.nav, Timeline::Present, &walls) {
            sim.insert_nav_grid(Timeline::Present, grid);
        }
        if let Ok(grid) = NavGrid::from_config(&sim.config.nav, Timeline::Future, &NoObstacles) {
            sim.insert_nav_grid(Timeline::Future, grid);
        }

        sim.spawn_player(1, -6.0, 0.0);
        sim.spawn_player(2, -6.0, 3.0);

        sim.spawn_enemy(100, 7.5, 5.5, Timeline::Present);
        sim.spawn_enemy(101, 7.5, -5.5, Timeline::Present);
        sim.spawn_enemy(200, 4.5, 0.5, Timeline::Future);

        sim
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Navigation grids
    // ------------------------------------------------------------------

    /// Sample `obstacles` into the grid for `timeline`, using the configured
    /// grid dimensions. Replaces any existing grid for that timeline.
    pub fn build_nav_grid<Q>(&mut self, timeline: Timeline, obstacles: &Q) -> SimResult<()>
    where
        Q: ObstacleQuery + ?Sized,
    {
        let grid = NavGrid::from_config(&self.config.nav, timeline, obstacles)?;
        self.insert_nav_grid(timeline, grid);
        Ok(())
    }

    /// Install a prebuilt grid for `timeline`.
    pub fn insert_nav_grid(&mut self, timeline: Timeline, grid: NavGrid) {
        debug!(
            "Installing {}x{} nav grid for {}",
            grid.width,
            grid.height,
            timeline.as_str()
        );
        if let Some(mut grids) = self.world.get_resource_mut::<NavGrids>() {
            grids.insert(timeline, grid);
        }
    }

    pub fn nav_grid(&self, timeline: Timeline) -> Option<&NavGrid> {
        self.world.get_resource::<NavGrids>()?.get(timeline)
    }

    /// Walkability dump of the grid for `timeline`, for debug overlays.
    pub fn nav_grid_snapshot(&self, timeline: Timeline) -> Option<NavGridSnapshot> {
        self.nav_grid(timeline)
            .map(|grid| NavGridSnapshot::from_grid(timeline, grid))
    }

    // ------------------------------------------------------------------
    // Agents
    // ------------------------------------------------------------------

    /// Spawn a player. Its movement drives the timescale.
    pub fn spawn_player(&mut self, id: u32, x: f32, y: f32) -> Entity {
        debug!("Spawning player {} at ({:.1}, {:.1})", id, x, y);
        self.world.spawn(PlayerBundle::new(id, x, y)).id()
    }

    /// Spawn a grid-navigating enemy on `timeline`.
    pub fn spawn_enemy(&mut self, id: u32, x: f32, y: f32, timeline: Timeline) -> Entity {
        debug!(
            "Spawning enemy {} at ({:.1}, {:.1}) on {}",
            id,
            x,
            y,
            timeline.as_str()
        );
        let follower = PathFollower::new(
            self.config.follower.max_speed,
            self.config.follower.acceleration,
        );
        self.world
            .spawn(EnemyBundle::new(id, x, y, timeline, follower))
            .id()
    }

    fn find_entity(&mut self, id: u32) -> SimResult<Entity> {
        let mut query = self.world.query::<(Entity, &AgentId)>();
        query
            .iter(&self.world)
            .find(|(_, agent)| agent.0 == id)
            .map(|(e, _)| e)
            .ok_or(SimError::UnknownAgent(id))
    }

    fn find_navigator(&mut self, id: u32) -> SimResult<Entity> {
        let entity = self.find_entity(id)?;
        if self.world.get::<PathFollower>(entity).is_some() {
            Ok(entity)
        } else {
            Err(SimError::NotNavigating(id))
        }
    }

    /// Remove an agent. Players disappear from timescale tracking on the
    /// next tick.
    pub fn despawn_agent(&mut self, id: u32) -> SimResult<()> {
        let entity = self.find_entity(id)?;
        self.world.despawn(entity);
        debug!("Despawned agent {}", id);
        Ok(())
    }

    /// Move a player. Players are driven by input outside the simulation.
    pub fn set_player_position(&mut self, id: u32, x: f32, y: f32) -> SimResult<()> {
        let entity = self.find_entity(id)?;
        if self.world.get::<PlayerControlled>(entity).is_none() {
            return Err(SimError::UnknownAgent(id));
        }
        if let Some(mut pos) = self.world.get_mut::<Position>(entity) {
            *pos = Position::new(x, y);
        }
        Ok(())
    }

    /// Ask an enemy to navigate to a world position, starting next tick.
    pub fn set_destination(&mut self, id: u32, x: f32, y: f32) -> SimResult<()> {
        let entity = self.find_navigator(id)?;
        self.world
            .entity_mut(entity)
            .insert(PathRequest::MoveTo { x, y });
        Ok(())
    }

    /// Ask an enemy to stop following its path, starting next tick.
    pub fn clear_destination(&mut self, id: u32) -> SimResult<()> {
        let entity = self.find_navigator(id)?;
        self.world.entity_mut(entity).insert(PathRequest::Clear);
        Ok(())
    }

    /// Drop an enemy's speed to zero without discarding its path.
    pub fn reset_agent_speed(&mut self, id: u32) -> SimResult<()> {
        let entity = self.find_navigator(id)?;
        if let Some(mut follower) = self.world.get_mut::<PathFollower>(entity) {
            follower.reset_speed();
        }
        Ok(())
    }

    pub fn agent_position(&mut self, id: u32) -> Option<Position> {
        let entity = self.find_entity(id).ok()?;
        self.world.get::<Position>(entity).copied()
    }

    pub fn movement_direction(&mut self, id: u32) -> Option<MovementDirection> {
        let entity = self.find_entity(id).ok()?;
        self.world.get::<MovementDirection>(entity).copied()
    }

    // ------------------------------------------------------------------
    // Time
    // ------------------------------------------------------------------

    /// The published timescale in effect for the current tick.
    pub fn timescale(&self) -> f32 {
        self.game_time().timescale()
    }

    pub fn game_time(&self) -> GameTime {
        self.world
            .get_resource::<GameTime>()
            .copied()
            .unwrap_or_default()
    }

    /// Keep time flowing for `duration` seconds under the motion-gate policy.
    pub fn force_time_resume(&mut self, duration: f32) {
        if let Some(mut controller) = self.world.get_resource_mut::<TimescaleController>() {
            controller.force_resume(duration);
        }
    }

    /// Step the simulation forward by `dt` seconds of frame time.
    ///
    /// Uses fixed timestep internally - accumulates time and runs fixed
    /// updates as needed.
    pub fn step(&mut self, dt: f32) {
        if !dt.is_finite() || dt <= 0.0 {
            return;
        }

        let fixed_dt = self.config.fixed_timestep;
        self.time_accumulator += dt;

        while self.time_accumulator >= fixed_dt {
            self.fixed_update(fixed_dt);
            self.time_accumulator -= fixed_dt;
        }
    }

    /// Run a single fixed timestep update.
    fn fixed_update(&mut self, dt: f32) {
        if let Some(mut dt_res) = self.world.get_resource_mut::<DeltaTime>() {
            dt_res.0 = dt;
        }

        for (name, schedule) in self.stages.iter_mut() {
            match self.profiler.as_mut() {
                Some(profiler) => profiler.time_section(*name, || schedule.run(&mut self.world)),
                None => schedule.run(&mut self.world),
            }
        }
        if let Some(profiler) = self.profiler.as_mut() {
            profiler.tick();
        }

        self.tick += 1;
        self.time += dt;
    }

    /// Get the current tick number.
    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    /// Get the elapsed (unscaled) simulation time.
    pub fn current_time(&self) -> f32 {
        self.time
    }

    // ------------------------------------------------------------------
    // Snapshots & diagnostics
    // ------------------------------------------------------------------

    /// Get a snapshot of the current simulation state.
    pub fn snapshot(&mut self) -> Snapshot {
        Snapshot::from_world(&mut self.world, self.tick, self.time)
    }

    /// Get the snapshot as a JSON string (`"{}"` if encoding fails).
    pub fn snapshot_json(&mut self) -> String {
        match snapshot_to_json_string(&self.snapshot()) {
            Ok(json) => json,
            Err(e) => {
                warn!("Failed to serialize snapshot at tick {}: {}", self.tick, e);
                "{}".to_string()
            }
        }
    }

    /// Walkability dump of the grid for `timeline` as JSON.
    pub fn nav_grid_json(&self, timeline: Timeline) -> Option<String> {
        let dump = self.nav_grid_snapshot(timeline)?;
        match nav_grid_to_json_string(&dump) {
            Ok(json) => Some(json),
            Err(e) => {
                warn!("Failed to serialize {} nav grid: {}", timeline.as_str(), e);
                None
            }
        }
    }

    /// Start timing each tick stage.
    pub fn enable_profiling(&mut self) {
        if self.profiler.is_none() {
            self.profiler = Some(Profiler::new());
        }
    }

    pub fn profiler(&self) -> Option<&Profiler> {
        self.profiler.as_ref()
    }

    /// Get direct access to the ECS world (for advanced usage).
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Get mutable access to the ECS world (for advanced usage).
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }
}

impl Default for SimWorld {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One fixed tick per `step(0.5)`; fractions of 0.5 stay exact.
    fn half_second_config() -> SimConfig {
        SimConfig {
            fixed_timestep: 0.5,
            ..Default::default()
        }
    }

    #[test]
    fn test_new_world() {
        let sim = SimWorld::new();
        assert_eq!(sim.current_tick(), 0);
        assert_eq!(sim.timescale(), 1.0);
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = SimConfig {
            fixed_timestep: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            SimWorld::with_config(config),
            Err(SimError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_default_test_world() {
        let mut sim = SimWorld::new_default_test_world();
        let snapshot = sim.snapshot();
        assert_eq!(snapshot.agents.len(), 5);
        assert!(sim.nav_grid(Timeline::Present).is_some());
        assert!(sim.nav_grid(Timeline::Future).is_some());

        let present = sim.nav_grid(Timeline::Present).unwrap();
        assert!(present.walkable_count() < present.len());
    }

    #[test]
    fn test_step_accumulates_fixed_ticks() {
        let mut sim = SimWorld::with_config(half_second_config()).unwrap();
        sim.step(0.25);
        assert_eq!(sim.current_tick(), 0);
        sim.step(0.25);
        assert_eq!(sim.current_tick(), 1);
        sim.step(1.0);
        assert_eq!(sim.current_tick(), 3);
        assert_eq!(sim.current_time(), 1.5);
    }

    #[test]
    fn test_ignores_bad_frame_time() {
        let mut sim = SimWorld::new();
        sim.step(-1.0);
        sim.step(f32::NAN);
        assert_eq!(sim.current_tick(), 0);
    }

    #[test]
    fn test_player_movement_drives_timescale() {
        let mut sim = SimWorld::with_config(half_second_config()).unwrap();
        sim.spawn_player(1, 0.0, 0.0);

        sim.step(0.5);
        assert_eq!(sim.timescale(), 0.1);

        sim.set_player_position(1, 2.5, 0.0).unwrap();
        sim.step(0.5);
        assert_eq!(sim.timescale(), 1.0);

        sim.step(0.5);
        assert_eq!(sim.timescale(), 0.1);
    }

    #[test]
    fn test_unknown_agents_are_reported() {
        let mut sim = SimWorld::new();
        sim.spawn_player(1, 0.0, 0.0);

        assert!(matches!(sim.set_destination(9, 0.0, 0.0), Err(SimError::UnknownAgent(9))));
        assert!(matches!(sim.set_destination(1, 0.0, 0.0), Err(SimError::NotNavigating(1))));
        assert!(matches!(sim.despawn_agent(9), Err(SimError::UnknownAgent(9))));
        assert!(sim.agent_position(9).is_none());
    }

    #[test]
    fn test_enemy_cannot_be_moved_as_player() {
        let mut sim = SimWorld::new();
        sim.spawn_enemy(5, 0.0, 0.0, Timeline::Present);
        assert!(sim.set_player_position(5, 1.0, 1.0).is_err());
    }

    #[test]
    fn test_despawned_player_stops_driving_time() {
        let mut sim = SimWorld::with_config(half_second_config()).unwrap();
        sim.spawn_player(1, 0.0, 0.0);
        sim.step(0.5);
        sim.despawn_agent(1).unwrap();
        sim.step(0.5);
        assert_eq!(sim.timescale(), 0.1);
        assert_eq!(sim.world().resource::<TimescaleController>().tracked_count(), 0);
    }

    #[test]
    fn test_profiling_records_stages() {
        let mut sim = SimWorld::with_config(half_second_config()).unwrap();
        sim.enable_profiling();
        sim.step(1.0);

        let profiler = sim.profiler().unwrap();
        assert_eq!(profiler.tick_count(), 2);
        for stage in ["timescale", "path_requests", "path_follow"] {
            assert_eq!(profiler.get_section(stage).unwrap().call_count, 2);
        }
    }

    #[test]
    fn test_snapshot_json() {
        let mut sim = SimWorld::new_default_test_world();
        sim.step(0.02);
        let json = sim.snapshot_json();
        assert!(json.contains("Enemy"));

        let restored = snapshot_from_json_string(&json).unwrap();
        assert_eq!(restored.tick, 1);
        assert_eq!(restored.agents.len(), 5);
        assert_eq!(restored.agent(200).unwrap().timeline, "Future");
    }

    #[test]
    fn test_nav_grid_json() {
        let mut sim = SimWorld::new();
        assert!(sim.nav_grid_json(Timeline::Future).is_none());

        sim.build_nav_grid(Timeline::Future, &NoObstacles).unwrap();
        let json = sim.nav_grid_json(Timeline::Future).unwrap();
        let dump = nav_grid_from_json_string(&json).unwrap();
        assert_eq!(dump.timeline, Timeline::Future);
        assert_eq!(dump.walkable.len(), 20 * 15);
        assert!(dump.walkable.iter().all(|w| *w));
    }

    #[test]
    fn test_nav_grid_snapshot() {
        let sim = SimWorld::new_default_test_world();
        let snapshot = sim.nav_grid_snapshot(Timeline::Present).unwrap();
        assert_eq!(snapshot.walkable.len(), 20 * 15);
        assert!(snapshot.walkable.iter().any(|w| !w));
    }
}
