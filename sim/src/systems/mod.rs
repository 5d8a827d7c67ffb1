//! ECS Systems for the tempo simulation.
//!
//! Systems contain the game logic that operates on components. They run
//! once per fixed tick, in this order:
//!
//! 1. `timescale_system` - samples player movement and publishes `GameTime`
//! 2. `path_request_system` - turns destination requests into paths
//! 3. `path_follow_system` - moves followers along their paths, scaled by
//!    `GameTime`

pub mod movement;
pub mod serialization;
pub mod timescale;

pub use movement::*;
pub use serialization::*;
pub use timescale::*;
