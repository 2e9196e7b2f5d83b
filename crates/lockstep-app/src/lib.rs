//! Headless host for the lock-step simulation.
//!
//! Runs the simulation on a dedicated game loop thread, feeds it commands
//! from a channel or a scripted command file, and reports the final state
//! hash so runs on different machines can be compared.

pub mod game_loop;
pub mod replay;
pub mod scenario;
pub mod state;

pub use lockstep_core as core;
