//! Demo map population, run as the session's startup hook.

use glam::Vec2;
use tracing::info;

use lockstep_core::error::SimError;
use lockstep_core::types::PlayerId;
use lockstep_sim::subsystems::StartupHook;
use lockstep_sim::world::{entity_ref, EntityStore, FoundationTemplate};

/// Units placed per player.
pub const UNITS_PER_PLAYER: usize = 5;

/// Spacing between units of one player's starting line.
const UNIT_SPACING: f32 = 3.0;

/// Foundation templates every demo session knows.
pub const TEMPLATES: [(&str, f32); 3] = [("house", 4.0), ("barracks", 8.0), ("tower", 3.0)];

/// Places each player's units in a line around a start point on a circle
/// about the map centre; player 1's units also form a line formation.
#[derive(Debug, Clone)]
pub struct DemoScenario {
    num_players: u32,
}

impl DemoScenario {
    pub fn new(num_players: u32) -> Self {
        Self { num_players }
    }

    /// Start point of `player` (1-based).
    pub fn start_point(&self, player: u32, map_size: f32) -> Vec2 {
        let centre = Vec2::splat(map_size / 2.0);
        let players = self.num_players.max(1) as f32;
        let angle = (player - 1) as f32 / players * std::f32::consts::TAU;
        centre + Vec2::new(angle.cos(), angle.sin()) * map_size * 0.3
    }
}

impl StartupHook for DemoScenario {
    fn run(&mut self, entities: &mut EntityStore) -> Result<(), SimError> {
        if self.num_players == 0 {
            return Err(SimError::Startup("a session needs at least one player".into()));
        }
        for (name, footprint_radius) in TEMPLATES {
            entities.register_template(name, FoundationTemplate { footprint_radius });
        }

        let map_size = entities.map_size();
        for player in 1..=self.num_players {
            let start = self.start_point(player, map_size);
            let slots: Vec<Vec2> = (0..UNITS_PER_PLAYER)
                .map(|i| Vec2::new(i as f32 * UNIT_SPACING, 0.0))
                .collect();
            let formation = (player == 1).then(|| entities.spawn_formation(start, slots.clone()));

            let mut refs = Vec::with_capacity(UNITS_PER_PLAYER);
            for (slot, offset) in slots.iter().enumerate() {
                let unit = entities.spawn_unit(start + *offset, PlayerId(player));
                if let Some(formation) = formation {
                    entities
                        .join_formation(unit, formation, slot)
                        .map_err(|err| SimError::Startup(err.to_string()))?;
                }
                refs.push(entity_ref(unit).0.to_string());
            }
            info!(player, units = %refs.join(","), x = start.x, y = start.y, "player placed");
        }
        Ok(())
    }
}
