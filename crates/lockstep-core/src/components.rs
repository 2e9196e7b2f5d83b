//! ECS components for simulation entities.
//!
//! Components are plain data. Order consumption, movement and
//! interpolation live in the simulation crate.

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_WALK_SPEED, RUN_SPEED_MULTIPLIER};
use crate::types::{EntityRef, PlayerId};

/// Player that owns an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner(pub PlayerId);

/// Ground position of a mobile unit, kept for the last two turns so the
/// visual layer can blend between them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Motion {
    /// Position at the end of the previous turn.
    pub previous: Vec2,
    /// Position at the end of the latest turn.
    pub current: Vec2,
    /// Interpolated position for the current render frame.
    pub render: Vec2,
    /// World units per second.
    pub walk_speed: f32,
    /// Set while executing legs that came from a `Run` order.
    pub running: bool,
    /// Other end of the patrol route, once a patrol has started.
    pub patrol_origin: Option<Vec2>,
}

impl Motion {
    pub fn at(position: Vec2) -> Self {
        Self {
            previous: position,
            current: position,
            render: position,
            walk_speed: DEFAULT_WALK_SPEED,
            running: false,
            patrol_origin: None,
        }
    }

    /// Speed for the leg being executed.
    pub fn speed(&self) -> f32 {
        if self.running {
            self.walk_speed * RUN_SPEED_MULTIPLIER
        } else {
            self.walk_speed
        }
    }
}

/// Visual representation: player colour and animation clock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    pub player_id: Option<PlayerId>,
    /// Seconds of animation played so far.
    pub anim_time: f32,
}

/// A group formation: an anchor position and relative slot offsets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Formation {
    pub position: Vec2,
    pub slots: Vec<Vec2>,
}

impl Formation {
    /// Offset of `slot` relative to the formation anchor. Unknown slots sit
    /// on the anchor.
    pub fn slot_position(&self, slot: usize) -> Vec2 {
        self.slots.get(slot).copied().unwrap_or(Vec2::ZERO)
    }
}

/// Membership of a unit in a formation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormationMember {
    pub formation: EntityRef,
    pub slot: usize,
}

/// A placed, not-yet-built structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Foundation {
    pub template: String,
    pub position: Vec3,
    /// Radians.
    pub angle: f32,
    pub initialized: bool,
}
