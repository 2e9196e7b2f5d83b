//! Game loop thread: feeds real (or fixed) frame times into the simulation.
//!
//! The simulation is created inside this thread so it never has to cross a
//! thread boundary. Commands arrive via an `mpsc` channel and are drained at
//! the start of every frame, before scripted commands for that frame.

use std::sync::mpsc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use lockstep_core::attributes::{GameAttributes, SimConfig};
use lockstep_core::constants::LOCAL_COMMAND_BATCH;
use lockstep_core::types::ClientId;
use lockstep_sim::Simulation;

use crate::replay::CommandScript;
use crate::scenario::DemoScenario;
use crate::state::{GameLoopCommand, LoopStatus, SharedStatus};

/// How frame times are produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FrameClock {
    /// Measure elapsed wall time and sleep to hold `frame`. Stops after
    /// `max_frames` if given, otherwise on shutdown.
    RealTime {
        frame: Duration,
        max_frames: Option<u64>,
    },
    /// Report exactly `frame` every frame and run `frames` frames as fast as
    /// possible. Runs are reproducible.
    Fixed { frame: Duration, frames: u64 },
}

/// Everything the loop needs to start a session.
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub config: SimConfig,
    pub attributes: GameAttributes,
    pub clock: FrameClock,
    pub script: CommandScript,
}

/// Final state of a finished session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopSummary {
    pub frames: u64,
    pub turns: u64,
    pub state_hash: u64,
}

/// Spawns the game loop in a new thread.
///
/// Returns the command sender and the handle to join for the summary.
pub fn spawn_game_loop(
    settings: LoopSettings,
    status: SharedStatus,
) -> Result<(mpsc::Sender<GameLoopCommand>, JoinHandle<Result<LoopSummary>>)> {
    let (cmd_tx, cmd_rx) = mpsc::channel::<GameLoopCommand>();

    let handle = std::thread::Builder::new()
        .name("lockstep-game-loop".into())
        .spawn(move || run_game_loop(settings, cmd_rx, &status))
        .context("failed to spawn game loop thread")?;

    Ok((cmd_tx, handle))
}

/// The game loop. Runs until the clock's frame limit, a Shutdown command or
/// channel disconnect.
pub fn run_game_loop(
    settings: LoopSettings,
    cmd_rx: mpsc::Receiver<GameLoopCommand>,
    status: &SharedStatus,
) -> Result<LoopSummary> {
    let LoopSettings {
        config,
        attributes,
        clock,
        mut script,
    } = settings;

    let mut sim = Simulation::new(config)?
        .with_startup_hook(Box::new(DemoScenario::new(attributes.num_players)));
    sim.initialize(attributes)
        .context("session startup failed")?;

    let (nominal_frame, frame_limit) = match clock {
        FrameClock::RealTime { frame, max_frames } => (frame, max_frames),
        FrameClock::Fixed { frame, frames } => (frame, Some(frames)),
    };
    let mut frame: u64 = 0;
    let mut last_frame = Instant::now();
    let mut next_frame_time = last_frame + nominal_frame;

    'frames: while frame_limit.map_or(true, |limit| frame < limit) {
        // 1. Drain all pending commands
        loop {
            match cmd_rx.try_recv() {
                Ok(GameLoopCommand::Local(message)) => sim.queue_local_command(message),
                Ok(GameLoopCommand::Remote {
                    batch,
                    client,
                    message,
                }) => {
                    if let Err(err) = sim.queue_remote_command(batch, client, message) {
                        warn!(%err, %client, "remote command dropped");
                    }
                }
                Ok(GameLoopCommand::Shutdown) => break 'frames,
                Err(mpsc::TryRecvError::Empty) => break,
                // A fixed run is self-contained; only a live session needs
                // its feed.
                Err(mpsc::TryRecvError::Disconnected) => {
                    if matches!(clock, FrameClock::RealTime { .. }) {
                        break 'frames;
                    }
                    break;
                }
            }
        }

        // 2. Scripted commands for this frame
        for scripted in script.due(frame) {
            if scripted.client == ClientId::LOCAL {
                sim.queue_local_command(scripted.message.clone());
            } else if let Err(err) =
                sim.queue_remote_command(LOCAL_COMMAND_BATCH, scripted.client, scripted.message.clone())
            {
                warn!(%err, client = %scripted.client, "scripted command dropped");
            }
        }

        // 3. Advance
        let frame_time = match clock {
            FrameClock::Fixed { frame, .. } => frame.as_secs_f64(),
            FrameClock::RealTime { .. } => {
                let now = Instant::now();
                let elapsed = now - last_frame;
                last_frame = now;
                elapsed.as_secs_f64()
            }
        };
        let report = sim.update(frame_time);
        if report.turns_run > 0 {
            debug!(frame, turns = report.turns_run, turn = sim.turn_number(), "frame");
        }

        // 4. Publish status for the host
        if let Ok(mut lock) = status.lock() {
            *lock = Some(LoopStatus {
                frame,
                turn: sim.turn_number(),
                state_hash: sim.state_hash(),
                interpolation_offset: report.interpolation_offset,
            });
        }
        frame += 1;

        // 5. Sleep until next frame
        if let FrameClock::RealTime { frame: duration, .. } = clock {
            let now = Instant::now();
            if next_frame_time > now {
                std::thread::sleep(next_frame_time - now);
            } else if now - next_frame_time > duration * 2 {
                // Too far behind; the simulation drops its own backlog.
                next_frame_time = now;
            }
            next_frame_time += duration;
        }
    }

    let summary = LoopSummary {
        frames: frame,
        turns: sim.turn_number(),
        state_hash: sim.state_hash(),
    };
    if script.remaining() > 0 {
        warn!(unsent = script.remaining(), "session ended before every scripted command was sent");
    }
    info!(
        frames = summary.frames,
        turns = summary.turns,
        state_hash = %format!("{:016x}", summary.state_hash),
        "session finished"
    );
    Ok(summary)
}
