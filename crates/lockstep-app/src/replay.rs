//! Scripted command feeds.
//!
//! A script is a JSON array of `{ "frame": n, "client": c, "message": {...} }`
//! entries. Each message is queued at the start of frame `n`; entries for
//! the same frame keep their file order.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use lockstep_core::messages::NetMessage;
use lockstep_core::types::ClientId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptedCommand {
    pub frame: u64,
    /// Sending client; defaults to this machine.
    #[serde(default)]
    pub client: ClientId,
    pub message: NetMessage,
}

#[derive(Debug, Clone, Default)]
pub struct CommandScript {
    commands: Vec<ScriptedCommand>,
    cursor: usize,
}

impl CommandScript {
    pub fn new(mut commands: Vec<ScriptedCommand>) -> Self {
        // Stable: same-frame entries stay in file order.
        commands.sort_by_key(|command| command.frame);
        Self {
            commands,
            cursor: 0,
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let commands: Vec<ScriptedCommand> =
            serde_json::from_str(json).context("malformed command script")?;
        Ok(Self::new(commands))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading command script {}", path.display()))?;
        Self::from_json(&json).with_context(|| format!("loading {}", path.display()))
    }

    /// Take every command scheduled at or before `frame` that has not been
    /// taken yet.
    pub fn due(&mut self, frame: u64) -> &[ScriptedCommand] {
        let start = self.cursor;
        while self
            .commands
            .get(self.cursor)
            .is_some_and(|command| command.frame <= frame)
        {
            self.cursor += 1;
        }
        &self.commands[start..self.cursor]
    }

    /// Commands not yet taken.
    pub fn remaining(&self) -> usize {
        self.commands.len() - self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
