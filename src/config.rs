//! Server configuration.
//!
//! One explicit config value threaded through constructors – no process
//! globals. Per-type overrides (e.g. the mind class for a given NPC type)
//! live in the `minds` table.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Metabolism rates shared by every character.
#[derive(Debug, Clone)]
pub struct MetabolismRates {
    pub food_consumption: f64,
    pub energy_consumption: f64,
    pub energy_gain: f64,
    pub energy_loss: f64,
    pub weight_gain: f64,
    pub weight_consumption: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base period of self-scheduled ticks, in seconds.
    pub basic_tick: f64,
    /// Speed cap for pedestrian movement, world units per second.
    pub base_velocity: f64,
    /// Refuse account creation when set.
    pub restricted: bool,
    /// Food units converted to status per metabolism tick.
    pub food_consumption: f64,
    /// Status spent per metabolism tick.
    pub energy_consumption: f64,
    /// Status recovered when burning weight.
    pub energy_gain: f64,
    /// Status spent when converting surplus energy to weight.
    pub energy_loss: f64,
    /// Weight gained from surplus energy.
    pub weight_gain: f64,
    /// Weight burned when energy runs out.
    pub weight_consumption: f64,
    /// Per-type mind class overrides (type name → mind class).
    #[serde(default)]
    pub minds: HashMap<String, String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            basic_tick: 3.0,
            base_velocity: 1.5,
            restricted: false,
            food_consumption: 0.1,
            energy_consumption: 0.1,
            energy_gain: 0.5,
            energy_loss: 0.1,
            weight_gain: 0.5,
            weight_consumption: 0.1,
            minds: HashMap::new(),
        }
    }
}

impl ServerConfig {
    /// The mind class configured for a ruleset type, if any.
    pub fn mind_class_for(&self, etype: &str) -> Option<String> {
        self.minds.get(etype).cloned()
    }

    pub fn metabolism_rates(&self) -> MetabolismRates {
        MetabolismRates {
            food_consumption: self.food_consumption,
            energy_consumption: self.energy_consumption,
            energy_gain: self.energy_gain,
            energy_loss: self.energy_loss,
            weight_gain: self.weight_gain,
            weight_consumption: self.weight_consumption,
        }
    }
}
