//! Lock-step simulation engine.
//!
//! Owns the hecs ECS world, buffers network commands into fixed-length
//! turns, turns them into per-entity orders and interpolates between turns
//! for rendering. Every peer fed the same command stream and seed computes
//! the same state.

pub mod dispatch;
pub mod engine;
pub mod hashing;
pub mod projectiles;
pub mod random;
pub mod scheduler;
pub mod subsystems;
pub mod turn_manager;
pub mod world;

pub use engine::{FrameReport, Simulation};
pub use lockstep_core as core;

#[cfg(test)]
mod tests;
