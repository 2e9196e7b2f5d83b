//! Core types and definitions for the lockstep simulation.
//!
//! This crate defines the vocabulary shared across all other crates:
//! entity references, orders, network messages, session attributes,
//! components, constants and errors. It has no dependency on the ECS
//! or any runtime framework.

pub mod attributes;
pub mod components;
pub mod constants;
pub mod error;
pub mod messages;
pub mod orders;
pub mod types;
