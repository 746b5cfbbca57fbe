//! Tank Combat - entity simulation and collision core
//!
//! Core modules:
//! - `sim`: Simulation (entities, spatial grid, collisions, AI, scheduler)
//! - `net`: Network message types and inbound reconciliation
//! - `platform`: Narrow interfaces to rendering, assets, effects and transport
//! - `session`: Frame driver that owns a game state and its sinks
//! - `settings`: Data-driven rules and tuning

pub mod net;
pub mod platform;
pub mod session;
pub mod settings;
pub mod sim;

pub use session::Session;
pub use settings::{Difficulty, Settings};

/// Game configuration constants
pub mod consts {
    /// Broad-phase cell size in logical units
    pub const GRID_SIZE: f32 = 64.0;
    /// Largest frame delta accepted by the scheduler (seconds)
    pub const MAX_FRAME_DT: f32 = 1.0 / 15.0;
    /// Frames shorter than this are skipped (seconds)
    pub const MIN_FRAME_DT: f32 = 0.001;

    /// Default arena dimensions
    pub const ARENA_WIDTH: f32 = 800.0;
    pub const ARENA_HEIGHT: f32 = 600.0;

    /// Tank defaults
    pub const TANK_SIZE: f32 = 32.0;
    pub const TANK_SPEED: f32 = 80.0;
    pub const TANK_FIRE_RATE_MS: f64 = 500.0;
    pub const TANK_BULLET_SPEED: f32 = 200.0;
    pub const BARREL_LENGTH: f32 = 20.0;

    /// Entity defaults
    pub const ENTITY_SPEED: f32 = 100.0;
    pub const DEFAULT_FRICTION: f32 = 0.9;

    /// Bullet defaults
    pub const BULLET_SIZE: f32 = 8.0;
    pub const BULLET_MAX_DISTANCE: f32 = 600.0;
    pub const BOUNCE_DAMPING: f32 = 0.9;

    /// Status effects
    pub const FREEZE_DURATION_MS: f64 = 3000.0;
    pub const HIT_INVULNERABILITY_MS: f64 = 500.0;

    /// Static props
    pub const BASE_SIZE: f32 = 48.0;
    pub const BASE_SHIELD_HEALTH: i32 = 3;
    pub const CAR_SIZE: f32 = 32.0;
    pub const POWERUP_SIZE: f32 = 24.0;
    pub const POWERUP_LIFETIME_MS: f64 = 20_000.0;
    pub const POWERUP_SCORE: u32 = 200;
}
