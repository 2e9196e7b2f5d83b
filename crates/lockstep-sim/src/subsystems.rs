//! Seams to the collaborators the turn loop drives but does not implement.
//!
//! Line of sight, territory, pathfinding, projectiles and the startup script
//! are invoked through these traits. The headless implementations here keep
//! the simulation runnable without a renderer or script engine.

use glam::Vec2;
use tracing::debug;

use lockstep_core::attributes::LosSetting;
use lockstep_core::error::SimError;

use crate::world::EntityStore;

/// Computes a route as a list of straight-line legs ending at `to`.
pub trait Pathfinder {
    fn find_path(&self, from: Vec2, to: Vec2) -> Vec<Vec2>;
}

/// Per-turn projectile simulation plus per-frame interpolation.
pub trait ProjectileSystem {
    fn update_all(&mut self, turn_length_ms: u32);
    fn interpolate_all(&mut self, offset: f32);
}

/// Line-of-sight bookkeeping, refreshed once per turn.
pub trait LosSystem {
    fn initialize(&mut self, setting: LosSetting, fog_of_war: bool);
    fn update(&mut self, entities: &EntityStore);
}

/// Territory borders, computed once at session start.
pub trait TerritorySystem {
    fn initialize(&mut self, entities: &EntityStore);
}

/// Game startup script. An error here is fatal for the session.
pub trait StartupHook {
    fn run(&mut self, entities: &mut EntityStore) -> Result<(), SimError>;
}

/// Routes directly to the goal in a single leg.
#[derive(Debug, Clone, Copy, Default)]
pub struct StraightLinePathfinder;

impl Pathfinder for StraightLinePathfinder {
    fn find_path(&self, _from: Vec2, to: Vec2) -> Vec<Vec2> {
        vec![to]
    }
}

/// LOS stand-in for headless runs: records its setting and counts updates.
#[derive(Debug, Clone, Default)]
pub struct HeadlessLos {
    pub setting: LosSetting,
    pub fog_of_war: bool,
    pub updates: u64,
}

impl LosSystem for HeadlessLos {
    fn initialize(&mut self, setting: LosSetting, fog_of_war: bool) {
        debug!(?setting, fog_of_war, "los initialized");
        self.setting = setting;
        self.fog_of_war = fog_of_war;
        self.updates = 0;
    }

    fn update(&mut self, _entities: &EntityStore) {
        self.updates += 1;
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HeadlessTerritory;

impl TerritorySystem for HeadlessTerritory {
    fn initialize(&mut self, entities: &EntityStore) {
        debug!(entities = entities.len(), "territory initialized");
    }
}
