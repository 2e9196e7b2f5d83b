//! Simulation constants and tuning parameters.

// --- Turn timing ---

/// Default length of one simulation turn (milliseconds).
pub const DEFAULT_TURN_LENGTH_MS: u32 = 200;

/// Number of turn batches buffered by the turn manager: the turn being
/// applied plus the two following it.
pub const TURN_PIPELINE_DEPTH: usize = 3;

/// Batch index local commands are queued into (the next turn).
pub const LOCAL_COMMAND_BATCH: usize = 1;

/// Client mask selecting every connected client.
pub const ALL_CLIENTS: u32 = 0xFFFF_FFFF;

// --- World geometry ---

/// Side length of one terrain cell in world units.
pub const CELL_SIZE: f32 = 4.0;

/// Terrain vertices per map side when the attributes do not say otherwise.
pub const DEFAULT_VERTICES_PER_SIDE: u32 = 129;

/// Network placement coordinates are fixed-point with this scale.
pub const NET_FIXED_POINT_SCALE: f32 = 1000.0;

// --- Group orders ---

/// Dispersion radius per sqrt(group size - 1) for randomized group moves.
pub const GROUP_SPREAD_FACTOR: f32 = 2.0;

/// Reference "up" axis used to orient formations.
pub const FORMATION_UP: [f32; 2] = [0.0, 1.0];

// --- Units ---

/// Default walking speed (world units per second).
pub const DEFAULT_WALK_SPEED: f32 = 8.0;

/// Run speed as a multiple of walk speed.
pub const RUN_SPEED_MULTIPLIER: f32 = 1.75;

/// Distance below which a unit counts as having reached a waypoint.
pub const ARRIVAL_EPSILON: f32 = 0.01;
