use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;

use lockstep_app::game_loop::{spawn_game_loop, FrameClock, LoopSettings};
use lockstep_app::replay::CommandScript;
use lockstep_app::state::shared_status;
use lockstep_core::attributes::{GameAttributes, SimConfig};
use lockstep_core::constants::DEFAULT_TURN_LENGTH_MS;

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless lock-step simulation host", long_about = None)]
struct Args {
    /// Game attributes JSON file
    #[arg(long)]
    attributes: Option<PathBuf>,

    /// Scripted commands: JSON array of {frame, client, message}
    #[arg(long)]
    commands: Option<PathBuf>,

    /// Run exactly this many frames of --frame-ms each, unthrottled, then exit
    #[arg(long)]
    fixed_frames: Option<u64>,

    /// Frame duration in milliseconds
    #[arg(long, default_value_t = 16)]
    frame_ms: u64,

    /// Real-time run length in frames; required unless --fixed-frames is given
    #[arg(long)]
    max_frames: Option<u64>,

    /// Override the random seed from the attributes file
    #[arg(long)]
    seed: Option<u64>,

    /// Simulation turn length in milliseconds
    #[arg(long, default_value_t = DEFAULT_TURN_LENGTH_MS)]
    turn_ms: u32,

    /// Cap on turns per frame; past it the backlog is dropped
    #[arg(long)]
    max_turns_per_frame: Option<u32>,
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }
}

fn load_attributes(args: &Args) -> Result<GameAttributes> {
    let mut attributes = match &args.attributes {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading attributes {}", path.display()))?;
            GameAttributes::from_json(&json)
                .with_context(|| format!("parsing attributes {}", path.display()))?
        }
        None => GameAttributes::default(),
    };
    if let Some(seed) = args.seed {
        attributes.seed = seed;
    }
    Ok(attributes)
}

/// Picks the frame clock. A real-time run must have a frame limit: the loop
/// keeps running while `main` holds its command sender.
fn frame_clock(args: &Args) -> Result<FrameClock> {
    let frame = Duration::from_millis(args.frame_ms);
    match (args.fixed_frames, args.max_frames) {
        (Some(frames), _) => Ok(FrameClock::Fixed { frame, frames }),
        (None, Some(max_frames)) => Ok(FrameClock::RealTime {
            frame,
            max_frames: Some(max_frames),
        }),
        (None, None) => bail!("a real-time run needs --max-frames (or use --fixed-frames)"),
    }
}

fn main() -> Result<()> {
    // Load .env locally; safe to ignore when not present.
    let _ = dotenvy::dotenv();
    init_tracing();
    let args = Args::parse();

    let attributes = load_attributes(&args)?;
    let script = match &args.commands {
        Some(path) => CommandScript::load(path)?,
        None => CommandScript::default(),
    };
    let clock = frame_clock(&args)?;
    let config = SimConfig {
        turn_length_ms: args.turn_ms,
        max_turns_per_frame: args.max_turns_per_frame,
    };
    config.validate()?;

    tracing::info!(
        seed = attributes.seed,
        players = attributes.num_players,
        turn_ms = config.turn_length_ms,
        ?clock,
        "starting session"
    );

    let settings = LoopSettings {
        config,
        attributes,
        clock,
        script,
    };
    let (cmd_tx, handle) = spawn_game_loop(settings, shared_status())?;
    let summary = handle
        .join()
        .map_err(|_| anyhow!("game loop thread panicked"))??;
    drop(cmd_tx);

    println!("{:016x}", summary.state_hash);
    Ok(())
}
