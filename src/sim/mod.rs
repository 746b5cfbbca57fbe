//! Deterministic simulation module
//!
//! All gameplay logic lives here. This module must be pure and deterministic:
//! - Sim clock only, advanced by the clamped frame delta
//! - Seeded RNG only
//! - Stable iteration order (by entity ID)
//! - No rendering or platform dependencies

pub mod aabb;
pub mod ai;
pub mod bullet;
pub mod collision;
pub mod combat;
pub mod enemy;
pub mod entity;
pub mod events;
pub mod freeze;
pub mod grid;
pub mod player;
pub mod powerup;
pub mod scheduler;
pub mod spawner;
pub mod state;
pub mod tank;
pub mod tick;

pub use aabb::Aabb;
pub use ai::{AiController, AiState};
pub use bullet::{Bullet, BulletKind, BulletVariant};
pub use collision::{CollisionStats, CollisionSystem, RayHit};
pub use enemy::{Enemy, EnemyType, FlameStream};
pub use entity::{DamageOutcome, Direction, Entity, EntityId, EntityKind, Layer, LayerMask, WallKind};
pub use events::{EffectKind, ExplosionKind, GameEvent};
pub use grid::SpatialGrid;
pub use player::{Controls, Player, WeaponMode};
pub use powerup::PowerUpKind;
pub use scheduler::{FrameClock, FramePlan};
pub use spawner::SpawnDirector;
pub use state::{GamePhase, GameState, NetIdentity};
pub use tank::{BulletSpec, Tank, TankPowerUp, TankRole};
pub use tick::{STAGE_CLEAR_DELAY_MS, TickInput, tick};
