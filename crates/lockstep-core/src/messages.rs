//! Network command messages delivered to the simulation.
//!
//! Every message names the entities it commands and whether the resulting
//! order is queued behind pending orders or replaces them.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::types::EntityRef;

/// Move-style payload. Target coordinates are integer world units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionCommand {
    pub entities: Vec<EntityRef>,
    #[serde(default)]
    pub queued: bool,
    pub target_x: i32,
    pub target_y: i32,
}

impl PositionCommand {
    pub fn target(&self) -> Vec2 {
        Vec2::new(self.target_x as f32, self.target_y as f32)
    }
}

/// Entity + action code payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityActionCommand {
    pub entities: Vec<EntityRef>,
    #[serde(default)]
    pub queued: bool,
    pub target: EntityRef,
    pub action: i32,
}

/// Production request payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProduceCommand {
    pub entities: Vec<EntityRef>,
    #[serde(default)]
    pub queued: bool,
    pub name: String,
    pub produce_type: i32,
}

/// Foundation placement. Position and angle are fixed-point
/// (see [`crate::constants::NET_FIXED_POINT_SCALE`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceObjectCommand {
    pub entities: Vec<EntityRef>,
    #[serde(default)]
    pub queued: bool,
    pub template: String,
    pub x: i32,
    pub y: i32,
    pub z: i32,
    pub angle: i32,
}

/// All command kinds the network layer can deliver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NetMessage {
    Goto(PositionCommand),
    Run(PositionCommand),
    Patrol(PositionCommand),
    FormationGoto(PositionCommand),
    AddWaypoint(PositionCommand),
    Generic(EntityActionCommand),
    FormationGeneric(EntityActionCommand),
    NotifyRequest(EntityActionCommand),
    Produce(ProduceCommand),
    PlaceObject(PlaceObjectCommand),
}

impl NetMessage {
    /// Entities the message commands, in the order they must be processed.
    pub fn entities(&self) -> &[EntityRef] {
        match self {
            NetMessage::Goto(m)
            | NetMessage::Run(m)
            | NetMessage::Patrol(m)
            | NetMessage::FormationGoto(m)
            | NetMessage::AddWaypoint(m) => &m.entities,
            NetMessage::Generic(m)
            | NetMessage::FormationGeneric(m)
            | NetMessage::NotifyRequest(m) => &m.entities,
            NetMessage::Produce(m) => &m.entities,
            NetMessage::PlaceObject(m) => &m.entities,
        }
    }

    pub fn is_queued(&self) -> bool {
        match self {
            NetMessage::Goto(m)
            | NetMessage::Run(m)
            | NetMessage::Patrol(m)
            | NetMessage::FormationGoto(m)
            | NetMessage::AddWaypoint(m) => m.queued,
            NetMessage::Generic(m)
            | NetMessage::FormationGeneric(m)
            | NetMessage::NotifyRequest(m) => m.queued,
            NetMessage::Produce(m) => m.queued,
            NetMessage::PlaceObject(m) => m.queued,
        }
    }

    /// Short name for logs.
    pub fn kind_name(&self) -> &'static str {
        match self {
            NetMessage::Goto(_) => "goto",
            NetMessage::Run(_) => "run",
            NetMessage::Patrol(_) => "patrol",
            NetMessage::FormationGoto(_) => "formation_goto",
            NetMessage::AddWaypoint(_) => "add_waypoint",
            NetMessage::Generic(_) => "generic",
            NetMessage::FormationGeneric(_) => "formation_generic",
            NetMessage::NotifyRequest(_) => "notify_request",
            NetMessage::Produce(_) => "produce",
            NetMessage::PlaceObject(_) => "place_object",
        }
    }
}
