//! Turn manager: buffers network commands into fixed-length turns and
//! replays each turn's batch in receipt order.

use std::collections::VecDeque;

use tracing::{debug, trace};

use lockstep_core::constants::{ALL_CLIENTS, LOCAL_COMMAND_BATCH, TURN_PIPELINE_DEPTH};
use lockstep_core::error::SimError;
use lockstep_core::messages::NetMessage;
use lockstep_core::types::ClientId;

/// Where the manager is in its turn cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TurnPhase {
    /// No turn has started since `initialize`.
    #[default]
    Idle,
    /// Commands are buffered for a coming turn.
    Accumulating,
    /// A new turn has been opened and its batch is ready to apply.
    TurnReady,
    /// The current batch is being translated into orders.
    Applying,
}

/// A buffered command with the clients it applies to.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferedMessage {
    pub client: ClientId,
    pub message: NetMessage,
    pub client_mask: u32,
}

/// Commands scheduled for one turn.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Turn {
    pub turn_number: u64,
    pub turn_length_ms: u32,
    pub messages: Vec<BufferedMessage>,
}

/// Batches commands into turns. Index 0 of the pipeline is the turn being
/// applied; later indices are future turns.
#[derive(Debug)]
pub struct TurnManager {
    turn_number: u64,
    turn_length_ms: u32,
    num_players: u32,
    phase: TurnPhase,
    batches: VecDeque<Turn>,
}

impl TurnManager {
    pub fn new(turn_length_ms: u32) -> Self {
        let mut manager = Self {
            turn_number: 0,
            turn_length_ms,
            num_players: 0,
            phase: TurnPhase::Idle,
            batches: VecDeque::with_capacity(TURN_PIPELINE_DEPTH),
        };
        manager.reset_pipeline();
        manager
    }

    /// Start a session: turn counter back to zero, all buffered commands
    /// discarded.
    pub fn initialize(&mut self, num_players: u32) {
        self.turn_number = 0;
        self.num_players = num_players;
        self.phase = TurnPhase::Idle;
        self.reset_pipeline();
        debug!(num_players, "turn manager initialized");
    }

    pub fn turn_number(&self) -> u64 {
        self.turn_number
    }

    pub fn turn_length(&self) -> u32 {
        self.turn_length_ms
    }

    pub fn num_players(&self) -> u32 {
        self.num_players
    }

    pub fn phase(&self) -> TurnPhase {
        self.phase
    }

    /// Turn at pipeline index `batch`, if in range.
    pub fn batch(&self, batch: usize) -> Option<&Turn> {
        self.batches.get(batch)
    }

    /// Queue a command issued on this machine. It applies on the next turn.
    pub fn queue_local_command(&mut self, message: NetMessage) {
        // LOCAL_COMMAND_BATCH is always inside the pipeline.
        if let Err(err) = self.queue_message(LOCAL_COMMAND_BATCH, ClientId::LOCAL, message) {
            debug!(%err, "local command dropped");
        }
    }

    /// Queue a command received from `client` into pipeline slot `batch`.
    pub fn queue_message(
        &mut self,
        batch: usize,
        client: ClientId,
        message: NetMessage,
    ) -> Result<(), SimError> {
        let client_mask = self.message_mask(&message, ALL_CLIENTS);
        let turn = self
            .batches
            .get_mut(batch)
            .ok_or(SimError::BatchOutOfRange {
                batch,
                depth: TURN_PIPELINE_DEPTH,
            })?;
        trace!(batch, %client, kind = message.kind_name(), "command buffered");
        turn.messages.push(BufferedMessage {
            client,
            message,
            client_mask,
        });
        if self.phase == TurnPhase::Idle {
            self.phase = TurnPhase::Accumulating;
        }
        Ok(())
    }

    /// Open the next turn: the applied batch is discarded and every later
    /// batch moves one slot closer.
    pub fn new_turn(&mut self) {
        self.turn_number += 1;
        self.batches.pop_front();
        self.batches.push_back(Turn {
            turn_number: self.turn_number + TURN_PIPELINE_DEPTH as u64 - 1,
            turn_length_ms: self.turn_length_ms,
            messages: Vec::new(),
        });
        if let Some(current) = self.batches.front_mut() {
            current.turn_number = self.turn_number;
        }
        self.phase = TurnPhase::TurnReady;
    }

    /// Feed every command in `batch` to `translate`, oldest first. The
    /// returned mask replaces the message's mask. Returns how many commands
    /// were processed.
    pub fn iterate_batch<F>(&mut self, batch: usize, mut translate: F) -> Result<usize, SimError>
    where
        F: FnMut(&NetMessage, u32) -> u32,
    {
        let turn = self
            .batches
            .get_mut(batch)
            .ok_or(SimError::BatchOutOfRange {
                batch,
                depth: TURN_PIPELINE_DEPTH,
            })?;
        self.phase = TurnPhase::Applying;
        for buffered in turn.messages.iter_mut() {
            buffered.client_mask = translate(&buffered.message, buffered.client_mask);
        }
        let applied = turn.messages.len();
        self.phase = if self.has_pending() {
            TurnPhase::Accumulating
        } else {
            TurnPhase::Idle
        };
        Ok(applied)
    }

    /// Clients a message applies to. Every client takes part in every
    /// command.
    pub fn message_mask(&self, _message: &NetMessage, _old_mask: u32) -> u32 {
        ALL_CLIENTS
    }

    /// Whether any later turn already holds commands.
    fn has_pending(&self) -> bool {
        self.batches.iter().skip(1).any(|turn| !turn.messages.is_empty())
    }

    fn reset_pipeline(&mut self) {
        self.batches.clear();
        for offset in 0..TURN_PIPELINE_DEPTH as u64 {
            self.batches.push_back(Turn {
                turn_number: self.turn_number + offset,
                turn_length_ms: self.turn_length_ms,
                messages: Vec::new(),
            });
        }
    }
}
