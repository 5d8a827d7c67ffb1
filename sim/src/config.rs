//! Simulation configuration.
//!
//! `SimConfig` is inserted into the ECS world as a resource and can be loaded
//! from a JSON file. Missing fields fall back to their defaults:
//!
//! ```json
//! {
//!   "fixed_timestep": 0.02,
//!   "nav": { "width": 20.0, "height": 15.0, "cell_size": 1.0 },
//!   "timescale": { "policy": { "kind": "speed_ratio" }, "min_timescale": 0.1 }
//! }
//! ```

use crate::components::Timeline;
use crate::error::{SimError, SimResult};
use crate::systems::timescale::{TimescalePolicy, MAX_TIMESCALE};
use bevy_ecs::prelude::*;
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration for a simulation world.
#[derive(Resource, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Fixed timestep in seconds (e.g., 1/50 = 0.02 for 50 Hz).
    pub fixed_timestep: f32,
    pub nav: NavConfig,
    pub follower: FollowerConfig,
    pub timescale: TimescaleConfig,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            fixed_timestep: 1.0 / 50.0, // 50 Hz
            nav: NavConfig::default(),
            follower: FollowerConfig::default(),
            timescale: TimescaleConfig::default(),
        }
    }
}

/// Dimensions of the navigation grids, shared by every timeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavConfig {
    /// Width of the covered area in world units.
    pub width: f32,
    /// Height of the covered area in world units.
    pub height: f32,
    /// Side length of one cell in world units.
    pub cell_size: f32,
    /// World-space center of the present-timeline area.
    pub present_center: (f32, f32),
    /// World-space center of the future-timeline area.
    pub future_center: (f32, f32),
}

impl NavConfig {
    pub fn center_for(&self, timeline: Timeline) -> (f32, f32) {
        match timeline {
            Timeline::Present => self.present_center,
            Timeline::Future => self.future_center,
        }
    }
}

impl Default for NavConfig {
    fn default() -> Self {
        Self {
            width: 20.0,
            height: 15.0,
            cell_size: 1.0,
            present_center: (0.0, 0.0),
            future_center: (0.0, 0.0),
        }
    }
}

/// Movement tuning applied to newly spawned path followers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FollowerConfig {
    /// Top speed in world units per second.
    pub max_speed: f32,
    /// Speed gained per second while following a path.
    pub acceleration: f32,
}

impl Default for FollowerConfig {
    fn default() -> Self {
        Self {
            max_speed: 3.0,
            acceleration: 5.0,
        }
    }
}

/// Timescale derivation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimescaleConfig {
    pub policy: TimescalePolicy,
    /// Player speed (units/s) that maps to full timescale.
    pub max_reference_speed: f32,
    /// Floor of the speed-ratio policy. The motion gate always stops at 0.
    pub min_timescale: f32,
    /// Seconds after startup during which time runs at full speed.
    pub startup_delay: f32,
}

impl Default for TimescaleConfig {
    fn default() -> Self {
        Self {
            policy: TimescalePolicy::default(),
            max_reference_speed: 5.0,
            min_timescale: 0.1,
            startup_delay: 0.0,
        }
    }
}

fn positive(name: &str, value: f32) -> SimResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(SimError::InvalidConfig(format!(
            "{name} must be positive and finite, got {value}"
        )))
    }
}

impl SimConfig {
    /// Parse a JSON config and validate it.
    pub fn from_json_str(json: &str) -> SimResult<Self> {
        let config: SimConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> SimResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&text)?;
        info!("Loaded simulation config from {:?}", path);
        Ok(config)
    }

    pub fn validate(&self) -> SimResult<()> {
        positive("fixed_timestep", self.fixed_timestep)?;

        positive("nav.cell_size", self.nav.cell_size)?;
        positive("nav.width", self.nav.width)?;
        positive("nav.height", self.nav.height)?;
        if self.nav.width < self.nav.cell_size || self.nav.height < self.nav.cell_size {
            return Err(SimError::InvalidConfig(
                "nav area must be at least one cell in each direction".to_string(),
            ));
        }

        positive("follower.max_speed", self.follower.max_speed)?;
        positive("follower.acceleration", self.follower.acceleration)?;

        let ts = &self.timescale;
        positive("timescale.max_reference_speed", ts.max_reference_speed)?;
        if !(0.0..=MAX_TIMESCALE).contains(&ts.min_timescale) {
            return Err(SimError::InvalidConfig(format!(
                "timescale.min_timescale must be within [0, {MAX_TIMESCALE}], got {}",
                ts.min_timescale
            )));
        }
        if !ts.startup_delay.is_finite() || ts.startup_delay < 0.0 {
            return Err(SimError::InvalidConfig(format!(
                "timescale.startup_delay must be non-negative, got {}",
                ts.startup_delay
            )));
        }
        if let TimescalePolicy::MotionGate {
            grace_period,
            motion_epsilon,
        } = ts.policy
        {
            if !grace_period.is_finite() || grace_period < 0.0 {
                return Err(SimError::InvalidConfig(format!(
                    "motion gate grace_period must be non-negative, got {grace_period}"
                )));
            }
            if !motion_epsilon.is_finite() || motion_epsilon < 0.0 {
                return Err(SimError::InvalidConfig(format!(
                    "motion gate motion_epsilon must be non-negative, got {motion_epsilon}"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(SimConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = SimConfig::from_json_str(
            r#"{ "fixed_timestep": 0.5, "timescale": { "min_timescale": 0.0 } }"#,
        )
        .unwrap();

        assert_eq!(config.fixed_timestep, 0.5);
        assert_eq!(config.timescale.min_timescale, 0.0);
        assert_eq!(config.timescale.max_reference_speed, 5.0);
        assert_eq!(config.nav, NavConfig::default());
    }

    #[test]
    fn test_motion_gate_policy_from_json() {
        let config = SimConfig::from_json_str(
            r#"{ "timescale": { "policy": { "kind": "motion_gate", "grace_period": 0.25 } } }"#,
        )
        .unwrap();

        match config.timescale.policy {
            TimescalePolicy::MotionGate { grace_period, .. } => assert_eq!(grace_period, 0.25),
            other => panic!("unexpected policy {other:?}"),
        }
    }

    #[test]
    fn test_rejects_out_of_range_floor() {
        let err = SimConfig::from_json_str(r#"{ "timescale": { "min_timescale": 1.5 } }"#)
            .unwrap_err();
        assert!(matches!(err, SimError::InvalidConfig(_)));
    }

    #[test]
    fn test_rejects_zero_cell_size() {
        let err = SimConfig::from_json_str(r#"{ "nav": { "cell_size": 0.0 } }"#).unwrap_err();
        assert!(matches!(err, SimError::InvalidConfig(_)));
    }

    #[test]
    fn test_malformed_json_is_reported() {
        let err = SimConfig::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, SimError::Json(_)));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = SimConfig::load("/definitely/not/here/tempo.json").unwrap_err();
        assert!(matches!(err, SimError::Io(_)));
    }
}
