//! Typed unit orders and the per-entity order queue.

use std::collections::VecDeque;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::types::EntityRef;

/// What an order asks the entity to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderKind {
    /// Walk to `target_location`; expanded into a path when it reaches the front.
    Goto,
    /// Like `Goto` but at run speed.
    Run,
    /// Walk to `target_location`, then keep walking back and forth.
    Patrol,
    /// A single straight-line leg produced by path expansion.
    GotoNoPathing,
    /// Entity-targeted action (`target_entity` + `action`).
    Generic,
    /// Ask `target_entity` to be notified with `action`.
    NotifyRequest,
    /// Train or research `produce_name` of `produce_type`.
    Produce,
    /// Go and build `new_object`.
    StartConstruction,
    /// Sentinel placed after the legs of an expanded path.
    PathEndMarker,
}

/// A unit command. Only the fields relevant to `kind` are meaningful.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub kind: OrderKind,
    pub target_location: Option<Vec2>,
    pub target_entity: Option<EntityRef>,
    pub action: Option<i32>,
    pub produce_name: Option<String>,
    pub produce_type: Option<i32>,
    pub new_object: Option<EntityRef>,
}

impl Order {
    pub fn new(kind: OrderKind) -> Self {
        Self {
            kind,
            target_location: None,
            target_entity: None,
            action: None,
            produce_name: None,
            produce_type: None,
            new_object: None,
        }
    }

    /// Positional order (Goto, Run, Patrol, GotoNoPathing).
    pub fn at(kind: OrderKind, target: Vec2) -> Self {
        Self {
            target_location: Some(target),
            ..Self::new(kind)
        }
    }

    /// Entity-targeted order (Generic, NotifyRequest).
    pub fn on_entity(kind: OrderKind, target: EntityRef, action: i32) -> Self {
        Self {
            target_entity: Some(target),
            action: Some(action),
            ..Self::new(kind)
        }
    }

    pub fn produce(name: impl Into<String>, produce_type: i32) -> Self {
        Self {
            produce_name: Some(name.into()),
            produce_type: Some(produce_type),
            ..Self::new(OrderKind::Produce)
        }
    }

    pub fn start_construction(new_object: EntityRef) -> Self {
        Self {
            new_object: Some(new_object),
            ..Self::new(OrderKind::StartConstruction)
        }
    }

    pub fn path_end_marker() -> Self {
        Self::new(OrderKind::PathEndMarker)
    }
}

/// Per-entity FIFO of pending orders.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrderQueue {
    orders: VecDeque<Order>,
}

impl OrderQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an order to be executed after everything already pending.
    pub fn push(&mut self, order: Order) {
        self.orders.push_back(order);
    }

    /// Insert an order ahead of everything pending.
    pub fn push_front(&mut self, order: Order) {
        self.orders.push_front(order);
    }

    pub fn clear(&mut self) {
        self.orders.clear();
    }

    /// Append when `queued`, otherwise drop everything pending first.
    pub fn issue(&mut self, order: Order, queued: bool) {
        if !queued {
            self.orders.clear();
        }
        self.orders.push_back(order);
    }

    pub fn front(&self) -> Option<&Order> {
        self.orders.front()
    }

    pub fn pop_front(&mut self) -> Option<Order> {
        self.orders.pop_front()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Oldest first.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Order> {
        self.orders.iter()
    }

    /// Most recently added first.
    pub fn iter_recent(&self) -> impl Iterator<Item = &Order> {
        self.orders.iter().rev()
    }
}
