//! Linear-flight projectiles.

use glam::Vec3;
use tracing::trace;

use crate::subsystems::ProjectileSystem;

#[derive(Debug, Clone, PartialEq)]
pub struct Projectile {
    pub id: u32,
    pub previous: Vec3,
    pub current: Vec3,
    pub render: Vec3,
    /// World units per second.
    pub velocity: Vec3,
    pub remaining_ms: u32,
}

#[derive(Debug, Default)]
pub struct ProjectileManager {
    next_id: u32,
    projectiles: Vec<Projectile>,
}

impl ProjectileManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire a projectile that flies for `lifetime_ms` then disappears.
    pub fn launch(&mut self, origin: Vec3, velocity: Vec3, lifetime_ms: u32) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        self.projectiles.push(Projectile {
            id,
            previous: origin,
            current: origin,
            render: origin,
            velocity,
            remaining_ms: lifetime_ms,
        });
        id
    }

    pub fn get(&self, id: u32) -> Option<&Projectile> {
        self.projectiles.iter().find(|p| p.id == id)
    }

    pub fn len(&self) -> usize {
        self.projectiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.projectiles.is_empty()
    }
}

impl ProjectileSystem for ProjectileManager {
    fn update_all(&mut self, turn_length_ms: u32) {
        let dt = turn_length_ms as f32 / 1000.0;
        for projectile in &mut self.projectiles {
            projectile.previous = projectile.current;
            projectile.current += projectile.velocity * dt;
            projectile.remaining_ms = projectile.remaining_ms.saturating_sub(turn_length_ms);
        }
        let before = self.projectiles.len();
        self.projectiles.retain(|p| p.remaining_ms > 0);
        let expired = before - self.projectiles.len();
        if expired > 0 {
            trace!(expired, "projectiles expired");
        }
    }

    fn interpolate_all(&mut self, offset: f32) {
        for projectile in &mut self.projectiles {
            projectile.render = projectile.previous.lerp(projectile.current, offset);
        }
    }
}
