//! Simulation driver.
//!
//! `Simulation` owns every piece of session state: the entity store, the
//! random stream, the turn manager, the scheduler and the subsystem seams.
//! Each render frame feeds real elapsed time into a fixed-timestep
//! accumulator; whole turns are simulated from it and whatever remains
//! becomes the interpolation offset for rendering. Completely headless.

use glam::Vec2;
use tracing::{debug, debug_span, error, info, warn};

use lockstep_core::attributes::{GameAttributes, SimConfig};
use lockstep_core::error::SimError;
use lockstep_core::messages::NetMessage;
use lockstep_core::types::{ClientId, PlayerId};

use crate::dispatch::{translate_message, DispatchContext};
use crate::hashing::FnvHasher;
use crate::projectiles::ProjectileManager;
use crate::random::SimRng;
use crate::scheduler::TaskScheduler;
use crate::subsystems::{
    HeadlessLos, HeadlessTerritory, LosSystem, Pathfinder, ProjectileSystem, StartupHook,
    TerritorySystem,
};
use crate::turn_manager::TurnManager;
use crate::world::EntityStore;

/// What one call to [`Simulation::update`] did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    pub turns_run: u32,
    /// Frame time handed to interpolation, in seconds. Less than the input
    /// when a backlog was dropped.
    pub frame_time: f64,
    /// Blend factor between the previous and current turn, in `[0, 1]`.
    pub interpolation_offset: f32,
    /// Accumulated time discarded because the turn cap was reached, in
    /// seconds.
    pub dropped: f64,
}

/// One lock-step session.
pub struct Simulation {
    config: SimConfig,
    attributes: GameAttributes,
    rng: SimRng,
    entities: EntityStore,
    turn_manager: TurnManager,
    scheduler: TaskScheduler,
    projectiles: Box<dyn ProjectileSystem>,
    los: Box<dyn LosSystem>,
    territory: Box<dyn TerritorySystem>,
    startup: Option<Box<dyn StartupHook>>,
    /// Accumulated time in microseconds. Negative means the next turn is
    /// not due yet.
    delta_us: i64,
}

impl Simulation {
    /// Create a session with headless subsystems. Call [`initialize`]
    /// before the first frame.
    ///
    /// [`initialize`]: Simulation::initialize
    pub fn new(config: SimConfig) -> Result<Self, SimError> {
        config.validate()?;
        let turn_us = turn_us(&config);
        Ok(Self {
            turn_manager: TurnManager::new(config.turn_length_ms),
            config,
            attributes: GameAttributes::default(),
            rng: SimRng::default(),
            entities: EntityStore::new(),
            scheduler: TaskScheduler::new(),
            projectiles: Box::new(ProjectileManager::new()),
            los: Box::new(HeadlessLos::default()),
            territory: Box::new(HeadlessTerritory),
            startup: None,
            delta_us: -turn_us,
        })
    }

    pub fn with_projectiles(mut self, projectiles: Box<dyn ProjectileSystem>) -> Self {
        self.projectiles = projectiles;
        self
    }

    pub fn with_los(mut self, los: Box<dyn LosSystem>) -> Self {
        self.los = los;
        self
    }

    pub fn with_territory(mut self, territory: Box<dyn TerritorySystem>) -> Self {
        self.territory = territory;
        self
    }

    pub fn with_pathfinder(mut self, pathfinder: Box<dyn Pathfinder>) -> Self {
        self.entities.set_pathfinder(pathfinder);
        self
    }

    /// Script run once during `initialize`, typically to populate the map.
    pub fn with_startup_hook(mut self, hook: Box<dyn StartupHook>) -> Self {
        self.startup = Some(hook);
        self
    }

    /// Start the session described by `attributes`.
    ///
    /// A failing startup hook aborts initialization; the session must not
    /// be run afterwards.
    pub fn initialize(&mut self, attributes: GameAttributes) -> Result<(), SimError> {
        self.rng.seed(attributes.seed);
        self.entities
            .configure(attributes.vertices_per_side, attributes.screenshot_mode);
        self.turn_manager.initialize(attributes.num_players);
        self.delta_us = -turn_us(&self.config);

        if let Some(hook) = self.startup.as_mut() {
            if let Err(err) = hook.run(&mut self.entities) {
                error!(%err, "startup hook failed");
                return Err(err);
            }
        }

        let failed = self.entities.initialize_all();
        if failed > 0 {
            warn!(failed, "entities failed to initialize");
        }
        self.los
            .initialize(attributes.los_setting, attributes.fog_of_war);
        self.territory.initialize(&self.entities);

        info!(
            seed = attributes.seed,
            players = attributes.num_players,
            map_size = attributes.map_size(),
            entities = self.entities.len(),
            "simulation initialized"
        );
        self.attributes = attributes;
        Ok(())
    }

    /// Advance by one render frame of `frame_time` seconds.
    ///
    /// Runs every turn that has come due. With a `max_turns_per_frame` cap,
    /// a frame that reaches the cap drops the rest of its backlog instead of
    /// carrying it into the next frame.
    pub fn update(&mut self, frame_time: f64) -> FrameReport {
        let turn_us = turn_us(&self.config);
        let mut frame_us = seconds_to_us(frame_time);
        self.delta_us += frame_us;

        let budget = self.config.max_turns_per_frame.unwrap_or(u32::MAX);
        let mut turns_run = 0;
        while self.delta_us >= 0 && frame_us > 0 && turns_run < budget {
            self.simulate();
            self.delta_us -= turn_us;
            turns_run += 1;
        }

        let mut dropped_us = 0;
        if self.delta_us >= 0 {
            dropped_us = self.delta_us;
            frame_us -= self.delta_us;
            self.delta_us = 0;
            debug!(dropped_us, "turn cap reached; dropping backlog");
        }

        let offset = self.delta_us as f32 / turn_us as f32 + 1.0;
        let frame_time = us_to_seconds(frame_us);
        self.interpolate(frame_time as f32, offset);

        FrameReport {
            turns_run,
            frame_time,
            interpolation_offset: offset,
            dropped: us_to_seconds(dropped_us),
        }
    }

    /// Run one turn: subsystems first, then the commands buffered for it.
    fn simulate(&mut self) {
        let turn = self.turn_manager.turn_number() + 1;
        let span = debug_span!("turn", turn);
        let _enter = span.enter();

        let turn_length = self.turn_manager.turn_length();
        self.scheduler.update(turn_length, &mut self.entities);
        self.entities.update_all(turn_length);
        self.projectiles.update_all(turn_length);
        self.los.update(&self.entities);

        self.turn_manager.new_turn();
        let mut ctx = DispatchContext {
            entities: &mut self.entities,
            rng: &mut self.rng,
            local_player: self.attributes.local_player,
        };
        match self
            .turn_manager
            .iterate_batch(0, |message, mask| translate_message(&mut ctx, message, mask))
        {
            Ok(0) => {}
            Ok(applied) => debug!(applied, "commands applied"),
            Err(err) => error!(%err, "turn batch unavailable"),
        }
    }

    fn interpolate(&mut self, frame_time: f32, offset: f32) {
        self.entities.animate(frame_time);
        self.entities.interpolate_all(offset);
        self.projectiles.interpolate_all(offset);
    }

    /// Queue a command from this machine for the next turn.
    pub fn queue_local_command(&mut self, message: NetMessage) {
        self.turn_manager.queue_local_command(message);
    }

    /// Queue a command received from a peer into pipeline slot `batch`.
    pub fn queue_remote_command(
        &mut self,
        batch: usize,
        client: ClientId,
        message: NetMessage,
    ) -> Result<(), SimError> {
        self.turn_manager.queue_message(batch, client, message)
    }

    /// Draw from the session's random stream.
    pub fn rand_int(&mut self, max: u32) -> u32 {
        self.rng.next_int(max)
    }

    pub fn rand_float(&mut self) -> f32 {
        self.rng.next_float()
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn attributes(&self) -> &GameAttributes {
        &self.attributes
    }

    pub fn local_player(&self) -> PlayerId {
        self.attributes.local_player
    }

    pub fn map_size(&self) -> f32 {
        self.entities.map_size()
    }

    pub fn turn_number(&self) -> u64 {
        self.turn_manager.turn_number()
    }

    pub fn turn_manager(&self) -> &TurnManager {
        &self.turn_manager
    }

    /// Accumulator in seconds.
    pub fn delta_time(&self) -> f64 {
        us_to_seconds(self.delta_us)
    }

    pub fn entities(&self) -> &EntityStore {
        &self.entities
    }

    pub fn entities_mut(&mut self) -> &mut EntityStore {
        &mut self.entities
    }

    pub fn scheduler_mut(&mut self) -> &mut TaskScheduler {
        &mut self.scheduler
    }

    /// Render position of an entity after the latest interpolation.
    pub fn render_position(&self, entity: hecs::Entity) -> Option<Vec2> {
        self.entities.render_position(entity)
    }

    /// Hash of turn number and entity state. Peers fed the same command
    /// stream report the same value at the same turn.
    pub fn state_hash(&self) -> u64 {
        use std::hash::{Hash, Hasher};
        let mut hasher = FnvHasher::new();
        self.turn_manager.turn_number().hash(&mut hasher);
        self.entities.state_hash().hash(&mut hasher);
        hasher.finish()
    }
}

fn turn_us(config: &SimConfig) -> i64 {
    i64::from(config.turn_length_ms) * 1000
}

/// Negative and non-finite frame times count as zero.
fn seconds_to_us(seconds: f64) -> i64 {
    if seconds.is_finite() && seconds > 0.0 {
        (seconds * 1_000_000.0).round() as i64
    } else {
        0
    }
}

fn us_to_seconds(us: i64) -> f64 {
    us as f64 / 1_000_000.0
}
