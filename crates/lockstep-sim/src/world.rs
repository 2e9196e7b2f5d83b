//! Entity store: the hecs world plus the entity-level operations orders need.
//!
//! Handles are generational. A handle to a destroyed entity resolves to
//! [`EntityError::NotFound`] instead of aliasing whatever reused its slot.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use glam::{Vec2, Vec3};
use hecs::{Entity, World};
use thiserror::Error;
use tracing::{debug, warn};

use lockstep_core::components::{Actor, Formation, FormationMember, Foundation, Motion, Owner};
use lockstep_core::constants::{ARRIVAL_EPSILON, CELL_SIZE, DEFAULT_VERTICES_PER_SIDE};
use lockstep_core::orders::{Order, OrderKind, OrderQueue};
use lockstep_core::types::{EntityRef, PlayerId};

use crate::hashing::FnvHasher;
use crate::subsystems::{Pathfinder, StraightLinePathfinder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EntityError {
    #[error("entity {0} does not exist")]
    NotFound(EntityRef),
    #[error("entity {0} cannot take orders")]
    NoOrderQueue(EntityRef),
}

/// Blueprint a foundation is built from.
#[derive(Debug, Clone, PartialEq)]
pub struct FoundationTemplate {
    /// Ground radius; the whole footprint must lie on the map.
    pub footprint_radius: f32,
}

/// Wire form of a live handle.
pub fn entity_ref(entity: Entity) -> EntityRef {
    EntityRef(entity.to_bits().get())
}

/// All simulation entities and their order queues.
pub struct EntityStore {
    world: World,
    templates: HashMap<String, FoundationTemplate>,
    pathfinder: Box<dyn Pathfinder>,
    vertices_per_side: u32,
    screenshot_mode: bool,
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityStore {
    pub fn new() -> Self {
        Self {
            world: World::new(),
            templates: HashMap::new(),
            pathfinder: Box::new(StraightLinePathfinder),
            vertices_per_side: DEFAULT_VERTICES_PER_SIDE,
            screenshot_mode: false,
        }
    }

    pub fn set_pathfinder(&mut self, pathfinder: Box<dyn Pathfinder>) {
        self.pathfinder = pathfinder;
    }

    /// Apply map dimensions and mode flags from the session attributes.
    pub fn configure(&mut self, vertices_per_side: u32, screenshot_mode: bool) {
        self.vertices_per_side = vertices_per_side;
        self.screenshot_mode = screenshot_mode;
    }

    /// Side length of the playable square in world units.
    pub fn map_size(&self) -> f32 {
        self.vertices_per_side as f32 * CELL_SIZE
    }

    /// Screenshot mode freezes units in place; orders still queue.
    pub fn screenshot_mode(&self) -> bool {
        self.screenshot_mode
    }

    pub fn register_template(&mut self, name: impl Into<String>, template: FoundationTemplate) {
        self.templates.insert(name.into(), template);
    }

    /// Read-only access to the underlying ECS world.
    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn len(&self) -> usize {
        self.world.len() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.world.len() == 0
    }

    // ---- Spawning ----

    /// Spawn a mobile unit owned by `owner`.
    pub fn spawn_unit(&mut self, position: Vec2, owner: PlayerId) -> Entity {
        self.world.spawn((
            Owner(owner),
            Motion::at(position),
            OrderQueue::new(),
            Actor {
                player_id: Some(owner),
                anim_time: 0.0,
            },
        ))
    }

    pub fn spawn_formation(&mut self, position: Vec2, slots: Vec<Vec2>) -> Entity {
        self.world.spawn((Formation { position, slots },))
    }

    pub fn join_formation(
        &mut self,
        unit: Entity,
        formation: Entity,
        slot: usize,
    ) -> Result<(), EntityError> {
        self.world
            .insert_one(
                unit,
                FormationMember {
                    formation: entity_ref(formation),
                    slot,
                },
            )
            .map_err(|_| EntityError::NotFound(entity_ref(unit)))
    }

    pub fn despawn(&mut self, entity: Entity) -> Result<(), EntityError> {
        self.world
            .despawn(entity)
            .map_err(|_| EntityError::NotFound(entity_ref(entity)))
    }

    // ---- Handles ----

    /// Turn a wire reference into a live handle.
    pub fn resolve(&self, reference: EntityRef) -> Result<Entity, EntityError> {
        Entity::from_bits(reference.0)
            .filter(|entity| self.world.contains(*entity))
            .ok_or(EntityError::NotFound(reference))
    }

    pub fn contains(&self, entity: Entity) -> bool {
        self.world.contains(entity)
    }

    // ---- Orders ----

    /// Run `f` against the entity's order queue.
    pub fn with_orders<R>(
        &mut self,
        entity: Entity,
        f: impl FnOnce(&mut OrderQueue) -> R,
    ) -> Result<R, EntityError> {
        if !self.world.contains(entity) {
            return Err(EntityError::NotFound(entity_ref(entity)));
        }
        let mut queue = self
            .world
            .get::<&mut OrderQueue>(entity)
            .map_err(|_| EntityError::NoOrderQueue(entity_ref(entity)))?;
        Ok(f(&mut *queue))
    }

    pub fn push_order(&mut self, entity: Entity, order: Order) -> Result<(), EntityError> {
        self.with_orders(entity, |queue| queue.push(order))
    }

    pub fn clear_orders(&mut self, entity: Entity) -> Result<(), EntityError> {
        self.with_orders(entity, OrderQueue::clear)
    }

    /// Push `order`, first clearing pending orders unless `queued`.
    pub fn issue_order(
        &mut self,
        entity: Entity,
        order: Order,
        queued: bool,
    ) -> Result<(), EntityError> {
        self.with_orders(entity, |queue| queue.issue(order, queued))
    }

    /// Snapshot of the entity's pending orders, oldest first.
    pub fn orders(&self, entity: Entity) -> Result<Vec<Order>, EntityError> {
        if !self.world.contains(entity) {
            return Err(EntityError::NotFound(entity_ref(entity)));
        }
        self.world
            .get::<&OrderQueue>(entity)
            .map(|queue| queue.iter().cloned().collect())
            .map_err(|_| EntityError::NoOrderQueue(entity_ref(entity)))
    }

    // ---- Component lookups ----

    pub fn owner(&self, entity: Entity) -> Option<PlayerId> {
        self.world.get::<&Owner>(entity).ok().map(|owner| owner.0)
    }

    pub fn formation_member(&self, entity: Entity) -> Option<FormationMember> {
        self.world.get::<&FormationMember>(entity).ok().map(|m| *m)
    }

    pub fn formation(&self, formation: Entity) -> Option<Formation> {
        self.world.get::<&Formation>(formation).ok().map(|f| (*f).clone())
    }

    /// Simulated position at the end of the latest turn.
    pub fn position(&self, entity: Entity) -> Option<Vec2> {
        self.world.get::<&Motion>(entity).ok().map(|m| m.current)
    }

    /// Position blended for the current render frame.
    pub fn render_position(&self, entity: Entity) -> Option<Vec2> {
        self.world.get::<&Motion>(entity).ok().map(|m| m.render)
    }

    pub fn actor(&self, entity: Entity) -> Option<Actor> {
        self.world.get::<&Actor>(entity).ok().map(|a| *a)
    }

    pub fn foundation(&self, entity: Entity) -> Option<Foundation> {
        self.world.get::<&Foundation>(entity).ok().map(|f| (*f).clone())
    }

    // ---- Construction ----

    /// Spawn an uninitialized foundation. `angle` is in radians.
    pub fn create_foundation(
        &mut self,
        template: &str,
        player: PlayerId,
        position: Vec3,
        angle: f32,
    ) -> Entity {
        self.world.spawn((
            Foundation {
                template: template.to_string(),
                position,
                angle,
                initialized: false,
            },
            Owner(player),
            Actor::default(),
        ))
    }

    /// Colour the entity's visual representation for `player`.
    pub fn set_actor_player(&mut self, entity: Entity, player: PlayerId) -> Result<(), EntityError> {
        let mut actor = self
            .world
            .get::<&mut Actor>(entity)
            .map_err(|_| EntityError::NotFound(entity_ref(entity)))?;
        actor.player_id = Some(player);
        Ok(())
    }

    /// Bring an entity into play. Only foundations can fail: their template
    /// must be registered and their footprint must lie on the map.
    pub fn initialize(&mut self, entity: Entity) -> bool {
        if !self.world.contains(entity) {
            return false;
        }
        let map_size = self.map_size();
        let Ok(mut foundation) = self.world.get::<&mut Foundation>(entity) else {
            return true;
        };
        if foundation.initialized {
            return true;
        }
        let Some(template) = self.templates.get(&foundation.template) else {
            warn!(template = %foundation.template, "unknown foundation template");
            return false;
        };
        // Ground plane is x/z; y is height.
        let r = template.footprint_radius;
        let p = foundation.position;
        let on_map = p.x - r >= 0.0 && p.z - r >= 0.0 && p.x + r <= map_size && p.z + r <= map_size;
        if !on_map {
            warn!(
                template = %foundation.template,
                x = p.x,
                z = p.z,
                "foundation footprint leaves the map"
            );
            return false;
        }
        foundation.initialized = true;
        true
    }

    /// Initialize every pending foundation. Returns how many failed.
    pub fn initialize_all(&mut self) -> usize {
        let mut pending: Vec<Entity> = self
            .world
            .query::<&Foundation>()
            .iter()
            .filter(|(_, f)| !f.initialized)
            .map(|(entity, _)| entity)
            .collect();
        pending.sort_by_key(|entity| entity.to_bits());
        pending
            .into_iter()
            .filter(|entity| !self.initialize(*entity))
            .count()
    }

    // ---- Per-turn / per-frame updates ----

    /// Advance every unit by one turn, consuming orders from the front of
    /// its queue.
    pub fn update_all(&mut self, turn_length_ms: u32) {
        if self.screenshot_mode {
            return;
        }
        let dt = turn_length_ms as f32 / 1000.0;
        let pathfinder = self.pathfinder.as_ref();
        for (entity, (queue, motion)) in self.world.query_mut::<(&mut OrderQueue, &mut Motion)>() {
            motion.previous = motion.current;
            execute_orders(entity, queue, motion, pathfinder, dt);
        }
    }

    /// Blend render positions between the last two turns.
    pub fn interpolate_all(&mut self, offset: f32) {
        for (_entity, motion) in self.world.query_mut::<&mut Motion>() {
            motion.render = motion.previous.lerp(motion.current, offset);
        }
    }

    /// Advance actor animation clocks by real frame time.
    pub fn animate(&mut self, frame_time: f32) {
        for (_entity, actor) in self.world.query_mut::<&mut Actor>() {
            actor.anim_time += frame_time;
        }
    }

    /// Hash of simulated state (positions, queues, foundations), independent
    /// of archetype iteration order. Equal on every peer that applied the
    /// same command stream.
    pub fn state_hash(&self) -> u64 {
        let mut hasher = FnvHasher::new();

        let mut units: Vec<(u64, Vec2, Vec<Order>)> = self
            .world
            .query::<(&Motion, &OrderQueue)>()
            .iter()
            .map(|(entity, (motion, queue))| {
                (entity.to_bits().get(), motion.current, queue.iter().cloned().collect())
            })
            .collect();
        units.sort_by_key(|(bits, _, _)| *bits);
        for (bits, position, orders) in &units {
            bits.hash(&mut hasher);
            position.x.to_bits().hash(&mut hasher);
            position.y.to_bits().hash(&mut hasher);
            for order in orders {
                hash_order(order, &mut hasher);
            }
        }

        let mut foundations: Vec<(u64, String, bool)> = self
            .world
            .query::<&Foundation>()
            .iter()
            .map(|(entity, f)| (entity.to_bits().get(), f.template.clone(), f.initialized))
            .collect();
        foundations.sort_by_key(|(bits, _, _)| *bits);
        foundations.hash(&mut hasher);

        hasher.finish()
    }
}

fn hash_order(order: &Order, hasher: &mut FnvHasher) {
    order.kind.hash(hasher);
    if let Some(target) = order.target_location {
        target.x.to_bits().hash(hasher);
        target.y.to_bits().hash(hasher);
    }
    order.target_entity.hash(hasher);
    order.action.hash(hasher);
    order.produce_name.hash(hasher);
    order.produce_type.hash(hasher);
    order.new_object.hash(hasher);
}

/// Consume the front of one unit's queue for a turn of `dt` seconds.
fn execute_orders(
    entity: Entity,
    queue: &mut OrderQueue,
    motion: &mut Motion,
    pathfinder: &dyn Pathfinder,
    dt: f32,
) {
    let mut remaining = dt;
    while let Some(front) = queue.front() {
        let kind = front.kind;
        let target = front.target_location;
        match kind {
            OrderKind::Goto | OrderKind::Run => {
                queue.pop_front();
                let Some(target) = target else {
                    continue;
                };
                motion.running = kind == OrderKind::Run;
                motion.patrol_origin = None;
                queue.push_front(Order::path_end_marker());
                for leg in pathfinder.find_path(motion.current, target).into_iter().rev() {
                    queue.push_front(Order::at(OrderKind::GotoNoPathing, leg));
                }
            }
            OrderKind::GotoNoPathing => {
                let target = target.unwrap_or(motion.current);
                if !step_toward(motion, target, &mut remaining) {
                    return;
                }
                queue.pop_front();
            }
            OrderKind::PathEndMarker => {
                queue.pop_front();
                motion.running = false;
            }
            OrderKind::Patrol => {
                let target = target.unwrap_or(motion.current);
                let origin = *motion.patrol_origin.get_or_insert(motion.current);
                motion.running = false;
                if !step_toward(motion, target, &mut remaining) {
                    return;
                }
                queue.pop_front();
                motion.patrol_origin = Some(target);
                queue.push(Order::at(OrderKind::Patrol, origin));
                return;
            }
            OrderKind::Generic
            | OrderKind::NotifyRequest
            | OrderKind::Produce
            | OrderKind::StartConstruction => {
                queue.pop_front();
                debug!(entity = ?entity, ?kind, "order handed to entity behaviour");
                return;
            }
        }
    }
    motion.running = false;
}

/// Move toward `target` using up to `remaining` seconds. Returns true once
/// the target is reached, leaving the unused time in `remaining`.
fn step_toward(motion: &mut Motion, target: Vec2, remaining: &mut f32) -> bool {
    let to_target = target - motion.current;
    let distance = to_target.length();
    if distance <= ARRIVAL_EPSILON {
        motion.current = target;
        return true;
    }
    let speed = motion.speed();
    if speed <= 0.0 || *remaining <= 0.0 {
        return false;
    }
    let reach = speed * *remaining;
    if reach >= distance {
        motion.current = target;
        *remaining -= distance / speed;
        true
    } else {
        motion.current += to_target * (reach / distance);
        *remaining = 0.0;
        false
    }
}
