//! ECS Components for the tempo simulation.
//!
//! Components are pure data containers attached to entities.
//! All game logic lives in systems that query these components.

use crate::systems::movement::PathFollower;
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

/// Distance below which two positions are treated as the same point.
pub const POSITION_EPSILON: f32 = 1e-4;

// ============================================================================
// SPATIAL COMPONENTS
// ============================================================================

/// 2D position in world space (x = east/west, y = north/south).
#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance_to(&self, other: &Position) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Step toward `target` by at most `max_delta`, landing exactly on it
    /// when it is closer than that.
    pub fn move_towards(&self, target: Position, max_delta: f32) -> Position {
        let dx = target.x - self.x;
        let dy = target.y - self.y;
        let dist = (dx * dx + dy * dy).sqrt();

        if dist == 0.0 || (max_delta >= 0.0 && dist <= max_delta) {
            return target;
        }

        Position {
            x: self.x + dx / dist * max_delta,
            y: self.y + dy / dist * max_delta,
        }
    }
}

/// Normalized direction an agent is currently moving in (zero when idle).
///
/// Read by animation and AI controllers to pick facing and movement states.
#[derive(Component, Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MovementDirection {
    pub x: f32,
    pub y: f32,
}

impl MovementDirection {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    /// Unit vector from `from` toward `to`, or zero if they coincide.
    pub fn towards(from: Position, to: Position) -> Self {
        let dx = to.x - from.x;
        let dy = to.y - from.y;
        let mag = (dx * dx + dy * dy).sqrt();
        if mag < POSITION_EPSILON {
            Self::ZERO
        } else {
            Self {
                x: dx / mag,
                y: dy / mag,
            }
        }
    }

    pub fn magnitude(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }

    /// -1, 0 or 1 depending on the vertical component, ignoring jitter.
    pub fn vertical_sign(&self) -> i32 {
        const THRESHOLD: f32 = 0.01;
        if self.y > THRESHOLD {
            1
        } else if self.y < -THRESHOLD {
            -1
        } else {
            0
        }
    }
}

// ============================================================================
// IDENTITY COMPONENTS
// ============================================================================

/// Host-assigned identifier for an agent.
#[derive(Component, Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(pub u32);

/// Which navigation grid variant an agent lives on.
#[derive(
    Component, Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
pub enum Timeline {
    #[default]
    Present,
    Future,
}

impl Timeline {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeline::Present => "Present",
            Timeline::Future => "Future",
        }
    }
}

/// Marker for player-controlled agents. Their movement drives the timescale.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct PlayerControlled;

/// Marker for AI-controlled agents that navigate the grid.
#[derive(Component, Debug, Clone, Copy, Default)]
pub struct EnemyControlled;

// ============================================================================
// BUNDLES
// ============================================================================

/// Bundle for spawning a player agent. Its position is written by the host.
#[derive(Bundle)]
pub struct PlayerBundle {
    pub id: AgentId,
    pub position: Position,
    pub marker: PlayerControlled,
}

impl PlayerBundle {
    pub fn new(id: u32, x: f32, y: f32) -> Self {
        Self {
            id: AgentId(id),
            position: Position::new(x, y),
            marker: PlayerControlled,
        }
    }
}

/// Bundle for spawning a grid-navigating enemy agent.
#[derive(Bundle)]
pub struct EnemyBundle {
    pub id: AgentId,
    pub position: Position,
    pub timeline: Timeline,
    pub follower: PathFollower,
    pub direction: MovementDirection,
    pub marker: EnemyControlled,
}

impl EnemyBundle {
    pub fn new(id: u32, x: f32, y: f32, timeline: Timeline, follower: PathFollower) -> Self {
        Self {
            id: AgentId(id),
            position: Position::new(x, y),
            timeline,
            follower,
            direction: MovementDirection::ZERO,
            marker: EnemyControlled,
        }
    }
}
