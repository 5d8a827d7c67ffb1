//! Simulation snapshot types.
//!
//! The `Snapshot` struct provides a serializable view of the simulation state
//! that the host engine reads back for rendering, animation and audio.

use crate::components::*;
use crate::systems::movement::PathFollower;
use crate::systems::timescale::GameTime;
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

/// Snapshot of a single agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSnapshot {
    pub id: u32,
    pub kind: String,
    pub timeline: String,
    pub x: f32,
    pub y: f32,
    /// Normalized movement direction (zero when idle).
    pub dir_x: f32,
    pub dir_y: f32,
    /// Eased path-following speed before time scaling.
    pub speed: f32,
    /// Path cells left to visit.
    pub path_remaining: usize,
}

/// Complete simulation state snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    /// Current simulation tick.
    pub tick: u64,
    /// Elapsed simulation time in seconds (unscaled).
    pub time: f32,
    /// Published game timescale.
    pub timescale: f32,
    /// All agents, sorted by id.
    pub agents: Vec<AgentSnapshot>,
}

impl Snapshot {
    /// Create a snapshot from the ECS world.
    pub fn from_world(world: &mut World, tick: u64, time: f32) -> Self {
        let timescale = world
            .get_resource::<GameTime>()
            .map(|t| t.timescale())
            .unwrap_or(1.0);

        let mut query = world.query::<(
            &AgentId,
            &Position,
            Option<&Timeline>,
            Option<&MovementDirection>,
            Option<&PathFollower>,
            Has<PlayerControlled>,
        )>();

        let mut agents: Vec<AgentSnapshot> = query
            .iter(world)
            .map(|(id, pos, timeline, dir, follower, is_player)| {
                let dir = dir.copied().unwrap_or_default();
                AgentSnapshot {
                    id: id.0,
                    kind: if is_player { "Player" } else { "Enemy" }.to_string(),
                    timeline: timeline.copied().unwrap_or_default().as_str().to_string(),
                    x: pos.x,
                    y: pos.y,
                    dir_x: dir.x,
                    dir_y: dir.y,
                    speed: follower.map(|f| f.eased_speed()).unwrap_or(0.0),
                    path_remaining: follower.map(|f| f.remaining()).unwrap_or(0),
                }
            })
            .collect();
        agents.sort_by_key(|a| a.id);

        Self {
            tick,
            time,
            timescale,
            agents,
        }
    }

    pub fn agent(&self, id: u32) -> Option<&AgentSnapshot> {
        self.agents.iter().find(|a| a.id == id)
    }

    /// Serialize snapshot to pretty JSON string.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
