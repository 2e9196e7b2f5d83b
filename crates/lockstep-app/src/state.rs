//! State shared between the host's main thread and the game loop thread.

use std::sync::{Arc, Mutex};

use lockstep_core::messages::NetMessage;
use lockstep_core::types::ClientId;

/// Commands sent to the game loop thread.
#[derive(Debug)]
pub enum GameLoopCommand {
    /// A command issued on this machine; applies on the next turn.
    Local(NetMessage),
    /// A command relayed from a peer into the given turn batch.
    Remote {
        batch: usize,
        client: ClientId,
        message: NetMessage,
    },
    /// Shut down the game loop thread gracefully.
    Shutdown,
}

/// Progress published by the game loop after every frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopStatus {
    pub frame: u64,
    pub turn: u64,
    pub state_hash: u64,
    pub interpolation_offset: f32,
}

/// Latest status, `None` until the first frame has run.
pub type SharedStatus = Arc<Mutex<Option<LoopStatus>>>;

pub fn shared_status() -> SharedStatus {
    Arc::new(Mutex::new(None))
}
