//! Session attributes and driver configuration.

use serde::{Deserialize, Serialize};

use crate::constants::*;
use crate::error::SimError;
use crate::types::PlayerId;

/// Line-of-sight mode handed to the LOS subsystem at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LosSetting {
    /// Standard vision: unexplored terrain is hidden.
    #[default]
    Normal,
    /// Whole map starts explored.
    Explored,
    /// Everything is visible at all times.
    AllVisible,
}

/// Everything a session needs to know at `initialize`.
///
/// All peers of one game must use identical attributes; the seed in
/// particular drives every randomized order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameAttributes {
    /// Random stream seed.
    pub seed: u64,
    pub num_players: u32,
    /// Owner used for foundations placed without a selected builder.
    pub local_player: PlayerId,
    /// Terrain vertices per map side; map size = vertices × `CELL_SIZE`.
    pub vertices_per_side: u32,
    pub los_setting: LosSetting,
    pub fog_of_war: bool,
    pub screenshot_mode: bool,
}

impl Default for GameAttributes {
    fn default() -> Self {
        Self {
            seed: 0,
            num_players: 2,
            local_player: PlayerId(1),
            vertices_per_side: DEFAULT_VERTICES_PER_SIDE,
            los_setting: LosSetting::default(),
            fog_of_war: true,
            screenshot_mode: false,
        }
    }
}

impl GameAttributes {
    pub fn from_json(json: &str) -> Result<Self, SimError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Side length of the playable square in world units.
    pub fn map_size(&self) -> f32 {
        self.vertices_per_side as f32 * CELL_SIZE
    }
}

/// Simulation driver timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub turn_length_ms: u32,
    /// Optional cap on turns run in one frame. When set and reached, the
    /// rest of the backlog is dropped. `None` runs every turn that is due.
    pub max_turns_per_frame: Option<u32>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            turn_length_ms: DEFAULT_TURN_LENGTH_MS,
            max_turns_per_frame: None,
        }
    }
}

impl SimConfig {
    pub fn validate(&self) -> Result<(), SimError> {
        if self.turn_length_ms == 0 {
            return Err(SimError::InvalidTurnLength);
        }
        if self.max_turns_per_frame == Some(0) {
            return Err(SimError::InvalidTurnBudget);
        }
        Ok(())
    }
}
