//! Order dispatch: turns network command messages into typed orders on the
//! commanded entities.
//!
//! Every entity of a command is handled independently. A stale handle or an
//! entity that cannot take the order is logged and skipped; its siblings
//! still receive theirs.

use glam::{Vec2, Vec3};
use hecs::Entity;
use tracing::{debug, warn};

use lockstep_core::components::Formation;
use lockstep_core::constants::{FORMATION_UP, GROUP_SPREAD_FACTOR, NET_FIXED_POINT_SCALE};
use lockstep_core::messages::{NetMessage, PlaceObjectCommand};
use lockstep_core::orders::{Order, OrderKind};
use lockstep_core::types::{EntityRef, PlayerId};

use crate::random::SimRng;
use crate::world::{entity_ref, EntityStore};

/// Mutable state a dispatch call may touch.
pub struct DispatchContext<'a> {
    pub entities: &'a mut EntityStore,
    pub rng: &'a mut SimRng,
    /// Owner for foundations placed with no builder selected.
    pub local_player: PlayerId,
}

/// Apply one network message. All order side effects happen before this
/// returns. Every client participates in every message, so the mask is
/// returned unchanged.
pub fn translate_message(
    ctx: &mut DispatchContext<'_>,
    message: &NetMessage,
    client_mask: u32,
) -> u32 {
    let queued = message.is_queued();
    match message {
        NetMessage::Goto(cmd) => randomize_locations(
            ctx,
            Order::at(OrderKind::Goto, cmd.target()),
            &cmd.entities,
            queued,
        ),
        NetMessage::Run(cmd) => randomize_locations(
            ctx,
            Order::at(OrderKind::Run, cmd.target()),
            &cmd.entities,
            queued,
        ),
        NetMessage::Patrol(cmd) => randomize_locations(
            ctx,
            Order::at(OrderKind::Patrol, cmd.target()),
            &cmd.entities,
            queued,
        ),
        NetMessage::FormationGoto(cmd) => formation_locations(
            ctx,
            Order::at(OrderKind::Goto, cmd.target()),
            &cmd.entities,
            queued,
        ),
        NetMessage::AddWaypoint(cmd) => add_waypoint(ctx, cmd.target(), &cmd.entities),
        NetMessage::Generic(cmd) | NetMessage::FormationGeneric(cmd) => queue_order(
            ctx,
            Order::on_entity(OrderKind::Generic, cmd.target, cmd.action),
            &cmd.entities,
            queued,
        ),
        NetMessage::NotifyRequest(cmd) => queue_order(
            ctx,
            Order::on_entity(OrderKind::NotifyRequest, cmd.target, cmd.action),
            &cmd.entities,
            queued,
        ),
        NetMessage::Produce(cmd) => queue_order(
            ctx,
            Order::produce(cmd.name.clone(), cmd.produce_type),
            &cmd.entities,
            queued,
        ),
        NetMessage::PlaceObject(cmd) => place_object(ctx, cmd),
    }
    client_mask
}

/// Send each entity to its own random point near the target so a group
/// does not converge on a single spot. The spread radius is
/// `2·sqrt(n − 1)` for a group of `n`; destinations are clamped to the map.
///
/// One disk sample is drawn per live entity in message order, so the
/// outcome depends on that order.
pub fn randomize_locations(
    ctx: &mut DispatchContext<'_>,
    order: Order,
    entities: &[EntityRef],
    queued: bool,
) {
    let Some(target) = order.target_location else {
        return queue_order(ctx, order, entities, queued);
    };
    let radius = GROUP_SPREAD_FACTOR * (entities.len() as f32 - 1.0).sqrt();
    let map_size = ctx.entities.map_size();

    for &reference in entities {
        let Some(entity) = resolve(ctx.entities, reference) else {
            continue;
        };
        let offset = sample_unit_disk(ctx.rng);
        let mut randomized = order.clone();
        randomized.target_location = Some(clamp_to_map(target + offset * radius, map_size));
        issue(ctx.entities, entity, randomized, queued);
    }
}

/// Place each member of the first entity's formation at its slot around
/// the target, with the formation turned to face the direction of travel.
///
/// Groups without a formation fall back to [`randomize_locations`].
pub fn formation_locations(
    ctx: &mut DispatchContext<'_>,
    order: Order,
    entities: &[EntityRef],
    queued: bool,
) {
    let Some(formation) = entities
        .first()
        .and_then(|first| group_formation(ctx.entities, *first))
    else {
        warn!("formation move for a group with no formation; dispersing instead");
        return randomize_locations(ctx, order, entities, queued);
    };
    let target = order.target_location.unwrap_or(formation.position);
    let (cos, sin) = formation_rotation(target - formation.position, Vec2::from(FORMATION_UP));
    let map_size = ctx.entities.map_size();

    for &reference in entities {
        let Some(entity) = resolve(ctx.entities, reference) else {
            continue;
        };
        let slot = ctx
            .entities
            .formation_member(entity)
            .map(|member| formation.slot_position(member.slot))
            .unwrap_or(Vec2::ZERO);
        let rotated = Vec2::new(slot.x * cos - slot.y * sin, slot.x * sin + slot.y * cos);
        let mut placed = order.clone();
        placed.target_location = Some(clamp_to_map(target + rotated, map_size));
        issue(ctx.entities, entity, placed, queued);
    }
}

/// Rotation `(cos, sin)` that turns `up` toward `delta`.
///
/// The sine is derived from `acos` of the dot product, so it is never
/// negative: mirrored deltas left and right of `up` rotate the same way,
/// and a delta exactly opposite `up` rotates by half a turn. A zero delta
/// leaves slots unrotated.
pub fn formation_rotation(delta: Vec2, up: Vec2) -> (f32, f32) {
    let direction = delta.try_normalize().unwrap_or(up);
    let cos = direction.dot(up).clamp(-1.0, 1.0);
    let sin = cos.acos().sin();
    (cos, sin)
}

/// Push a copy of `order` onto every live entity, no randomization.
pub fn queue_order(
    ctx: &mut DispatchContext<'_>,
    order: Order,
    entities: &[EntityRef],
    queued: bool,
) {
    for &reference in entities {
        if let Some(entity) = resolve(ctx.entities, reference) {
            issue(ctx.entities, entity, order.clone(), queued);
        }
    }
}

/// Extend the route an entity is already following.
///
/// Each queue is scanned from the newest order backward, O(queue length).
/// A path end marker turns the waypoint into a `Goto`; a patrol leg turns
/// it into another patrol leg. Whichever is found first wins. An entity
/// with neither is not moving: the waypoint is dropped for it with a
/// warning.
pub fn add_waypoint(ctx: &mut DispatchContext<'_>, target: Vec2, entities: &[EntityRef]) {
    for &reference in entities {
        let Some(entity) = resolve(ctx.entities, reference) else {
            continue;
        };
        let appended = ctx.entities.with_orders(entity, |queue| {
            let mut kind = None;
            for order in queue.iter_recent() {
                match order.kind {
                    OrderKind::PathEndMarker => {
                        kind = Some(OrderKind::Goto);
                        break;
                    }
                    OrderKind::Patrol => {
                        kind = Some(OrderKind::Patrol);
                        break;
                    }
                    _ => {}
                }
            }
            if let Some(kind) = kind {
                queue.push(Order::at(kind, target));
            }
            kind
        });
        match appended {
            Ok(Some(kind)) => debug!(entity = %reference, ?kind, "waypoint appended"),
            Ok(None) => warn!(
                entity = %reference,
                "got an add-waypoint command for an entity that isn't moving"
            ),
            Err(err) => debug!(%err, "waypoint not delivered"),
        }
    }
}

/// Place a foundation and, once it has initialized, send the commanded
/// entities to build it.
///
/// The owner is the first commanded entity's player, or the local player
/// when no builder is selected. Position and angle arrive fixed-point. If
/// the foundation fails to initialize no builder is touched; the
/// uninitialized foundation is left for the caller.
pub fn place_object(ctx: &mut DispatchContext<'_>, cmd: &PlaceObjectCommand) {
    let player = cmd
        .entities
        .first()
        .and_then(|first| ctx.entities.resolve(*first).ok())
        .and_then(|builder| ctx.entities.owner(builder))
        .unwrap_or(ctx.local_player);

    let position = Vec3::new(cmd.x as f32, cmd.y as f32, cmd.z as f32) / NET_FIXED_POINT_SCALE;
    let angle = cmd.angle as f32 / NET_FIXED_POINT_SCALE;

    let foundation = ctx
        .entities
        .create_foundation(&cmd.template, player, position, angle);
    if let Err(err) = ctx.entities.set_actor_player(foundation, player) {
        warn!(%err, "foundation has no actor");
    }

    if !ctx.entities.initialize(foundation) {
        warn!(
            template = %cmd.template,
            %player,
            "foundation failed to initialize; no construction ordered"
        );
        return;
    }

    debug!(template = %cmd.template, %player, foundation = ?foundation, "foundation placed");
    queue_order(
        ctx,
        Order::start_construction(entity_ref(foundation)),
        &cmd.entities,
        cmd.queued,
    );
}

/// Uniform point in the unit disk by rejection sampling.
pub fn sample_unit_disk(rng: &mut SimRng) -> Vec2 {
    loop {
        let x = rng.next_float() * 2.0 - 1.0;
        let y = rng.next_float() * 2.0 - 1.0;
        if x * x + y * y <= 1.0 {
            return Vec2::new(x, y);
        }
    }
}

pub fn clamp_to_map(point: Vec2, map_size: f32) -> Vec2 {
    Vec2::new(point.x.clamp(0.0, map_size), point.y.clamp(0.0, map_size))
}

fn group_formation(entities: &EntityStore, first: EntityRef) -> Option<Formation> {
    let leader = entities.resolve(first).ok()?;
    let member = entities.formation_member(leader)?;
    let formation = entities.resolve(member.formation).ok()?;
    entities.formation(formation)
}

fn resolve(entities: &EntityStore, reference: EntityRef) -> Option<Entity> {
    match entities.resolve(reference) {
        Ok(entity) => Some(entity),
        Err(err) => {
            debug!(%err, "skipping unreachable entity");
            None
        }
    }
}

fn issue(entities: &mut EntityStore, entity: Entity, order: Order, queued: bool) {
    if let Err(err) = entities.issue_order(entity, order, queued) {
        debug!(%err, "order not delivered");
    }
}
