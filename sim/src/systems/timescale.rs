//! Timescale system - derives how fast game time flows from player movement.
//!
//! Every fixed tick the controller measures how far each player moved since
//! the previous tick and turns the fastest one into a single published
//! scalar, [`GameTime`]. Bullets, cooldowns, animation, audio pitch and
//! enemy movement all read that value; nothing outside this module writes it.
//!
//! Two policies exist and are never mixed:
//!
//! - [`TimescalePolicy::SpeedRatio`] (default): `clamp(speed / reference,
//!   min_timescale, 1)`. A pure function of the latest sample.
//! - [`TimescalePolicy::MotionGate`]: time runs at exactly 1 while anyone is
//!   moving and snaps to exactly 0 once everyone has been still for longer
//!   than the grace period.

use crate::components::{PlayerControlled, Position};
use crate::config::TimescaleConfig;
use crate::systems::movement::DeltaTime;
use bevy_ecs::prelude::*;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Upper bound of the published timescale.
pub const MAX_TIMESCALE: f32 = 1.0;

/// Speed (units/s) below which the motion gate treats a player as still.
pub const DEFAULT_MOTION_EPSILON: f32 = 0.01;

fn default_motion_epsilon() -> f32 {
    DEFAULT_MOTION_EPSILON
}

/// How player speed is turned into a timescale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimescalePolicy {
    /// Continuous mapping of the fastest player's speed into
    /// `[min_timescale, 1]`.
    #[default]
    SpeedRatio,
    /// Binary flow: 1 while anyone moves, 0 after `grace_period` seconds of
    /// stillness.
    MotionGate {
        grace_period: f32,
        #[serde(default = "default_motion_epsilon")]
        motion_epsilon: f32,
    },
}

/// The published game timescale. Read-only outside this module.
#[derive(Resource, Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GameTime {
    timescale: f32,
}

impl Default for GameTime {
    fn default() -> Self {
        Self {
            timescale: MAX_TIMESCALE,
        }
    }
}

impl GameTime {
    /// Fixed value in `[0, 1]`, for hosts and tests that drive consumers
    /// without a controller.
    pub fn with_timescale(timescale: f32) -> Self {
        Self {
            timescale: timescale.clamp(0.0, MAX_TIMESCALE),
        }
    }

    pub fn timescale(&self) -> f32 {
        self.timescale
    }

    /// Scale an unscaled duration (e.g. a cooldown tick) by game time.
    pub fn scaled(&self, dt: f32) -> f32 {
        dt * self.timescale
    }

    pub fn is_time_flowing(&self) -> bool {
        self.timescale > 0.0
    }

    fn publish(&mut self, timescale: f32) {
        self.timescale = timescale;
    }
}

/// Tracks player positions between ticks and derives the timescale.
#[derive(Resource, Debug)]
pub struct TimescaleController {
    config: TimescaleConfig,
    /// Last sampled position per tracked player.
    tracked: HashMap<Entity, Position>,
    /// Fastest player speed seen in the latest sample.
    highest_speed: f32,
    /// Time spent sampling, for the startup delay.
    elapsed: f32,
    /// Motion gate: seconds since anyone last moved. Negative while a
    /// forced resume is running.
    since_motion: f32,
    /// Motion gate: forced-flow duration to apply at the next sample.
    pending_resume: f32,
    /// Motion gate: whether time was flowing after the latest sample.
    flowing: bool,
    timescale: f32,
}

impl Default for TimescaleController {
    fn default() -> Self {
        Self::new(TimescaleConfig::default())
    }
}

impl TimescaleController {
    pub fn new(config: TimescaleConfig) -> Self {
        Self {
            config,
            tracked: HashMap::new(),
            highest_speed: 0.0,
            elapsed: 0.0,
            since_motion: 0.0,
            pending_resume: 0.0,
            flowing: true,
            timescale: MAX_TIMESCALE,
        }
    }

    pub fn config(&self) -> &TimescaleConfig {
        &self.config
    }

    /// Number of players currently tracked.
    pub fn tracked_count(&self) -> usize {
        self.tracked.len()
    }

    /// Fastest player speed from the latest sample, in units per second.
    pub fn highest_speed(&self) -> f32 {
        self.highest_speed
    }

    /// Timescale derived by the latest sample.
    pub fn timescale(&self) -> f32 {
        self.timescale
    }

    /// Keep time flowing for `duration` seconds regardless of movement
    /// (e.g. while a shot is in flight), followed by the usual grace
    /// period. Only affects the motion gate.
    pub fn force_resume(&mut self, duration: f32) {
        if duration.is_finite() && duration > 0.0 {
            self.pending_resume = self.pending_resume.max(duration);
        }
    }

    /// Feed one fixed tick of player positions and derive the new timescale.
    ///
    /// Players not seen before are registered at their current position and
    /// contribute zero speed this tick. Players missing from `agents` are
    /// dropped.
    pub fn sample<I>(&mut self, agents: I, dt: f32) -> f32
    where
        I: IntoIterator<Item = (Entity, Position)>,
    {
        let mut highest = 0.0_f32;
        let mut current = HashMap::with_capacity(self.tracked.len());

        for (entity, pos) in agents {
            match self.tracked.get(&entity) {
                Some(last) if dt > 0.0 => {
                    highest = highest.max(last.distance_to(&pos) / dt);
                }
                Some(_) => {}
                None => debug!("Tracking player {:?}", entity),
            }
            current.insert(entity, pos);
        }

        let pruned = self
            .tracked
            .keys()
            .filter(|e| !current.contains_key(e))
            .count();
        if pruned > 0 {
            debug!("Stopped tracking {} player(s)", pruned);
        }

        self.tracked = current;
        self.highest_speed = highest;
        self.elapsed += dt.max(0.0);

        self.timescale = match self.config.policy {
            TimescalePolicy::SpeedRatio => self.speed_ratio(),
            TimescalePolicy::MotionGate {
                grace_period,
                motion_epsilon,
            } => self.motion_gate(dt, grace_period, motion_epsilon),
        };
        self.timescale
    }

    fn speed_ratio(&self) -> f32 {
        if self.elapsed < self.config.startup_delay {
            return MAX_TIMESCALE;
        }
        let ratio = self.highest_speed / self.config.max_reference_speed;
        if ratio.is_nan() {
            return self.config.min_timescale;
        }
        ratio.clamp(self.config.min_timescale, MAX_TIMESCALE)
    }

    fn motion_gate(&mut self, dt: f32, grace_period: f32, motion_epsilon: f32) -> f32 {
        let dt = dt.max(0.0);
        if self.highest_speed > motion_epsilon {
            self.since_motion = self.since_motion.min(0.0);
        } else {
            self.since_motion += dt;
        }
        if self.pending_resume > 0.0 {
            self.since_motion = self.since_motion.min(-self.pending_resume);
            self.pending_resume = 0.0;
        }

        let warming_up = self.elapsed < self.config.startup_delay;
        let flowing = warming_up || self.since_motion < grace_period;
        if flowing != self.flowing {
            if flowing {
                info!("Time resumed");
            } else {
                info!("Time stopped: all players still");
            }
            self.flowing = flowing;
        }

        if flowing {
            MAX_TIMESCALE
        } else {
            0.0
        }
    }
}

/// System that samples player positions and publishes [`GameTime`].
///
/// Uses the fixed tick duration so the result does not depend on frame rate.
pub fn timescale_system(
    dt: Res<DeltaTime>,
    mut controller: ResMut<TimescaleController>,
    mut game_time: ResMut<GameTime>,
    players: Query<(Entity, &Position), With<PlayerControlled>>,
) {
    let timescale = controller.sample(players.iter().map(|(e, p)| (e, *p)), dt.0);
    game_time.publish(timescale);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(n: u32) -> Entity {
        Entity::from_raw(n)
    }

    fn ratio_controller(min: f32) -> TimescaleController {
        TimescaleController::new(TimescaleConfig {
            min_timescale: min,
            ..Default::default()
        })
    }

    fn gate_controller(grace: f32) -> TimescaleController {
        TimescaleController::new(TimescaleConfig {
            policy: TimescalePolicy::MotionGate {
                grace_period: grace,
                motion_epsilon: DEFAULT_MOTION_EPSILON,
            },
            ..Default::default()
        })
    }

    #[test]
    fn test_no_players_sits_at_floor() {
        let mut controller = ratio_controller(0.1);
        assert_eq!(controller.sample(std::iter::empty(), 0.5), 0.1);

        let mut zero_floor = ratio_controller(0.0);
        assert_eq!(zero_floor.sample(std::iter::empty(), 0.5), 0.0);
    }

    #[test]
    fn test_resting_player_sits_at_floor() {
        let mut controller = ratio_controller(0.1);
        let p = Position::new(3.0, 4.0);
        controller.sample([(entity(1), p)], 0.5);
        assert_eq!(controller.sample([(entity(1), p)], 0.5), 0.1);
        assert_eq!(controller.sample([(entity(1), p)], 0.5), 0.1);
    }

    #[test]
    fn test_reference_speed_maps_to_one() {
        let mut controller = ratio_controller(0.1);
        controller.sample([(entity(1), Position::new(0.0, 0.0))], 0.5);
        // 2.5 units in 0.5s = 5 units/s = the default reference speed.
        let ts = controller.sample([(entity(1), Position::new(2.5, 0.0))], 0.5);
        assert_eq!(ts, 1.0);
        assert_eq!(controller.highest_speed(), 5.0);
    }

    #[test]
    fn test_large_jump_clamps_to_one() {
        let mut controller = ratio_controller(0.1);
        controller.sample([(entity(1), Position::new(0.0, 0.0))], 0.5);
        let ts = controller.sample([(entity(1), Position::new(500.0, 0.0))], 0.5);
        assert_eq!(ts, 1.0);
    }

    #[test]
    fn test_half_speed_is_half_timescale() {
        let mut controller = ratio_controller(0.1);
        controller.sample([(entity(1), Position::new(0.0, 0.0))], 0.5);
        let ts = controller.sample([(entity(1), Position::new(0.0, 1.25))], 0.5);
        assert_eq!(ts, 0.5);
    }

    #[test]
    fn test_fastest_player_wins() {
        let mut controller = ratio_controller(0.0);
        controller.sample(
            [(entity(1), Position::new(0.0, 0.0)), (entity(2), Position::new(10.0, 0.0))],
            0.5,
        );
        let ts = controller.sample(
            [(entity(1), Position::new(0.25, 0.0)), (entity(2), Position::new(11.25, 0.0))],
            0.5,
        );
        assert_eq!(ts, 0.5);
    }

    #[test]
    fn test_new_player_does_not_spike() {
        let mut controller = ratio_controller(0.1);
        controller.sample([(entity(1), Position::new(0.0, 0.0))], 0.5);
        // Player 2 appears far away: first sample contributes nothing.
        let ts = controller.sample(
            [(entity(1), Position::new(0.0, 0.0)), (entity(2), Position::new(90.0, 90.0))],
            0.5,
        );
        assert_eq!(ts, 0.1);
        assert_eq!(controller.tracked_count(), 2);
    }

    #[test]
    fn test_missing_players_are_pruned() {
        let mut controller = ratio_controller(0.1);
        controller.sample(
            [(entity(1), Position::new(0.0, 0.0)), (entity(2), Position::new(1.0, 1.0))],
            0.5,
        );
        controller.sample([(entity(2), Position::new(1.0, 1.0))], 0.5);
        assert_eq!(controller.tracked_count(), 1);

        // Re-appearing counts as new, so no spike from the old position.
        let ts = controller.sample([(entity(1), Position::new(100.0, 0.0))], 0.5);
        assert_eq!(ts, 0.1);
    }

    #[test]
    fn test_stays_within_bounds_for_arbitrary_motion() {
        let mut controller = ratio_controller(0.1);
        let mut x = 0.0_f32;
        for i in 0..200u32 {
            x += ((i * 7919) % 13) as f32 * 0.37 - 1.5;
            let players: Vec<_> = (0..(i % 4))
                .map(|n| (entity(n), Position::new(x * n as f32, -x)))
                .collect();
            let ts = controller.sample(players, 1.0 / 50.0);
            assert!((0.1..=1.0).contains(&ts), "tick {i}: {ts}");
        }
    }

    #[test]
    fn test_startup_delay_runs_full_speed() {
        let mut controller = TimescaleController::new(TimescaleConfig {
            startup_delay: 1.0,
            ..Default::default()
        });
        let p = Position::new(0.0, 0.0);
        assert_eq!(controller.sample([(entity(1), p)], 0.5), 1.0);
        assert_eq!(controller.sample([(entity(1), p)], 0.25), 1.0);
        assert_eq!(controller.sample([(entity(1), p)], 0.25), 0.1);
    }

    #[test]
    fn test_motion_gate_stops_after_grace() {
        let mut controller = gate_controller(0.5);
        let p = Position::new(0.0, 0.0);
        assert_eq!(controller.sample([(entity(1), p)], 0.25), 1.0);
        assert_eq!(controller.sample([(entity(1), p)], 0.25), 0.0);

        let moved = Position::new(0.5, 0.0);
        assert_eq!(controller.sample([(entity(1), moved)], 0.25), 1.0);
    }

    #[test]
    fn test_motion_gate_force_resume() {
        let mut controller = gate_controller(0.5);
        let p = Position::new(0.0, 0.0);
        assert_eq!(controller.sample([(entity(1), p)], 0.25), 1.0);
        assert_eq!(controller.sample([(entity(1), p)], 0.25), 0.0);
        assert_eq!(controller.sample([(entity(1), p)], 0.25), 0.0);

        // Forced window of 0.5s, then the 0.5s grace period on top.
        controller.force_resume(0.5);
        let seq: Vec<f32> = (0..5)
            .map(|_| controller.sample([(entity(1), p)], 0.25))
            .collect();
        assert_eq!(seq, [1.0, 1.0, 1.0, 1.0, 0.0]);
    }

    #[test]
    fn test_motion_during_forced_resume_keeps_window() {
        let mut controller = gate_controller(0.25);
        let p = Position::new(0.0, 0.0);
        controller.sample([(entity(1), p)], 0.25);
        controller.sample([(entity(1), p)], 0.25);

        controller.force_resume(0.5);
        let moved = Position::new(1.0, 0.0);
        assert_eq!(controller.sample([(entity(1), moved)], 0.25), 1.0);
        assert_eq!(controller.sample([(entity(1), moved)], 0.25), 1.0);
        assert_eq!(controller.sample([(entity(1), moved)], 0.25), 1.0);
        assert_eq!(controller.sample([(entity(1), moved)], 0.25), 0.0);
    }

    #[test]
    fn test_timescale_system_publishes_game_time() {
        let mut world = World::new();
        world.insert_resource(DeltaTime(0.5));
        world.insert_resource(ratio_controller(0.1));
        world.insert_resource(GameTime::default());
        let player = world.spawn((Position::new(0.0, 0.0), PlayerControlled)).id();
        // Non-player movement is ignored.
        let bystander = world.spawn(Position::new(0.0, 0.0)).id();

        let mut schedule = Schedule::default();
        schedule.add_systems(timescale_system);

        schedule.run(&mut world);
        assert_eq!(world.resource::<GameTime>().timescale(), 0.1);

        world.get_mut::<Position>(bystander).unwrap().x = 100.0;
        world.get_mut::<Position>(player).unwrap().x = 1.25;
        schedule.run(&mut world);
        assert_eq!(world.resource::<GameTime>().timescale(), 0.5);
    }

    #[test]
    fn test_game_time_helpers() {
        let time = GameTime::with_timescale(0.25);
        assert_eq!(time.scaled(2.0), 0.5);
        assert!(time.is_time_flowing());
        assert!(!GameTime::with_timescale(0.0).is_time_flowing());
        assert_eq!(GameTime::with_timescale(7.0).timescale(), 1.0);
    }
}
