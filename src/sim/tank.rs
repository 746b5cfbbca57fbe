//! Tank movement, fire control and power-up timers
//!
//! Shared by players and enemies. A tank owns at most one live bullet at a
//! time: the `active_bullet` slot must be empty (or hold a dead bullet) before
//! it may fire again.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::bullet::BulletKind;
use super::enemy::Enemy;
use super::entity::{Direction, Entity, EntityId};
use super::freeze::{FreezeEffect, update_freeze};
use super::player::Player;
use crate::consts::*;

/// Player or enemy specialization of a tank
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TankRole {
    Player(Player),
    Enemy(Enemy),
}

/// When a timed effect ends
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Expiry {
    At(f64),
    /// Lasts until the tank dies
    UntilDeath,
}

impl Expiry {
    /// Negative durations mean "until death"
    pub fn after(now_ms: f64, duration_ms: f64) -> Self {
        if duration_ms < 0.0 {
            Expiry::UntilDeath
        } else {
            Expiry::At(now_ms + duration_ms)
        }
    }

    pub fn expired(self, now_ms: f64) -> bool {
        match self {
            Expiry::At(end) => now_ms >= end,
            Expiry::UntilDeath => false,
        }
    }
}

/// Timed tank power-ups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TankPowerUp {
    RapidFire,
    Piercing,
    Shield,
    Speed,
    Freeze,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TankPowerUps {
    pub rapid_fire: Option<Expiry>,
    pub piercing: Option<Expiry>,
    pub shield: Option<Expiry>,
    pub speed: Option<Expiry>,
    pub freeze: Option<Expiry>,
}

impl TankPowerUps {
    fn slot(&mut self, kind: TankPowerUp) -> &mut Option<Expiry> {
        match kind {
            TankPowerUp::RapidFire => &mut self.rapid_fire,
            TankPowerUp::Piercing => &mut self.piercing,
            TankPowerUp::Shield => &mut self.shield,
            TankPowerUp::Speed => &mut self.speed,
            TankPowerUp::Freeze => &mut self.freeze,
        }
    }

    pub fn activate(&mut self, kind: TankPowerUp, now_ms: f64, duration_ms: f64) {
        *self.slot(kind) = Some(Expiry::after(now_ms, duration_ms));
    }

    pub fn is_active(&self, kind: TankPowerUp, now_ms: f64) -> bool {
        let slot = match kind {
            TankPowerUp::RapidFire => self.rapid_fire,
            TankPowerUp::Piercing => self.piercing,
            TankPowerUp::Shield => self.shield,
            TankPowerUp::Speed => self.speed,
            TankPowerUp::Freeze => self.freeze,
        };
        slot.is_some_and(|e| !e.expired(now_ms))
    }

    /// A live shield soaks one hit and is used up
    pub fn consume_shield(&mut self, now_ms: f64) -> bool {
        if self.is_active(TankPowerUp::Shield, now_ms) {
            self.shield = None;
            true
        } else {
            false
        }
    }

    /// Drop every expired timer
    pub fn expire(&mut self, now_ms: f64) {
        for slot in [
            &mut self.rapid_fire,
            &mut self.piercing,
            &mut self.shield,
            &mut self.speed,
            &mut self.freeze,
        ] {
            if slot.is_some_and(|e| e.expired(now_ms)) {
                *slot = None;
            }
        }
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Descriptor consumed by the bullet factory
#[derive(Debug, Clone, PartialEq)]
pub struct BulletSpec {
    /// Spawn point (bullet center)
    pub position: Vec2,
    pub direction: Direction,
    pub speed: f32,
    pub damage: i32,
    pub owner: Option<EntityId>,
    pub kind: BulletKind,
    pub piercing: bool,
    pub explosion_radius: Option<f32>,
    /// Side length of the square hitbox
    pub size: f32,
    pub max_bounces: u32,
}

/// Tank component of an entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tank {
    pub direction: Direction,
    pub facing: Direction,
    pub move_dir: Vec2,
    pub fire_rate_ms: f64,
    pub base_fire_rate_ms: f64,
    pub base_speed: f32,
    pub last_fire_ms: Option<f64>,
    pub bullet_speed: f32,
    pub bullet_damage: i32,
    pub can_fire: bool,
    pub active_bullet: Option<EntityId>,
    pub barrel_length: f32,
    pub frozen: Option<FreezeEffect>,
    pub powerups: TankPowerUps,
    pub role: TankRole,
}

impl Tank {
    pub fn new(role: TankRole) -> Self {
        Self {
            direction: Direction::Up,
            facing: Direction::Up,
            move_dir: Vec2::ZERO,
            fire_rate_ms: TANK_FIRE_RATE_MS,
            base_fire_rate_ms: TANK_FIRE_RATE_MS,
            base_speed: TANK_SPEED,
            last_fire_ms: None,
            bullet_speed: TANK_BULLET_SPEED,
            bullet_damage: 1,
            can_fire: true,
            active_bullet: None,
            barrel_length: BARREL_LENGTH,
            frozen: None,
            powerups: TankPowerUps::default(),
            role,
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.is_some()
    }

    pub fn cooldown_elapsed(&self, now_ms: f64) -> bool {
        self.last_fire_ms.is_none_or(|last| now_ms - last > self.fire_rate_ms)
    }

    /// Fire gate. A slot holding a dead bullet is released first.
    pub fn can_fire_bullet(&mut self, now_ms: f64, bullet_alive: impl Fn(EntityId) -> bool) -> bool {
        if self.active_bullet.is_some_and(|id| !bullet_alive(id)) {
            self.active_bullet = None;
        }
        self.can_fire && !self.is_frozen() && self.active_bullet.is_none() && self.cooldown_elapsed(now_ms)
    }

    /// Release the slot if it holds `bullet`
    pub fn release_bullet(&mut self, bullet: EntityId) {
        if self.active_bullet == Some(bullet) {
            self.active_bullet = None;
        }
    }

    /// Kind of bullet this tank currently shoots
    pub fn bullet_kind(&self, now_ms: f64) -> BulletKind {
        match &self.role {
            TankRole::Player(p) => p.bullet_kind(),
            TankRole::Enemy(e) => {
                if self.powerups.is_active(TankPowerUp::Freeze, now_ms) {
                    BulletKind::Freeze
                } else {
                    e.bullet_kind
                }
            }
        }
    }

    pub fn set_facing(&mut self, dir: Direction) {
        self.direction = dir;
        self.facing = dir;
    }
}

/// Fire if the gate allows it. The caller spawns the bullet and records it in
/// the tank's slot.
pub fn fire(entity: &mut Entity, now_ms: f64, bullet_alive: impl Fn(EntityId) -> bool) -> Option<BulletSpec> {
    if !entity.alive {
        return None;
    }
    let id = entity.id;
    let center = entity.center();
    let tank = entity.tank_mut()?;
    if !tank.can_fire_bullet(now_ms, bullet_alive) {
        return None;
    }

    tank.last_fire_ms = Some(now_ms);
    let kind = tank.bullet_kind(now_ms);
    let explosion_radius = match &tank.role {
        TankRole::Enemy(e) => e.explosion_radius,
        TankRole::Player(_) => None,
    };
    Some(BulletSpec {
        position: center + tank.facing.vector() * tank.barrel_length,
        direction: tank.facing,
        speed: tank.bullet_speed,
        damage: tank.bullet_damage,
        owner: Some(id),
        kind,
        piercing: tank.powerups.is_active(TankPowerUp::Piercing, now_ms),
        explosion_radius,
        size: kind.size(explosion_radius.is_some()),
        max_bounces: 0,
    })
}

/// Turn the requested move direction into velocity. Frozen tanks stand still.
pub fn update_movement(entity: &mut Entity) {
    let speed = entity.speed;
    let Some(tank) = entity.tank_mut() else {
        return;
    };

    if tank.is_frozen() || tank.move_dir == Vec2::ZERO {
        entity.vel = Vec2::ZERO;
        return;
    }

    let dir = Direction::from_vector(tank.move_dir);
    tank.set_facing(dir);
    let vel = tank.move_dir.normalize_or_zero() * speed;
    entity.vel = vel;
    entity.rotation = dir.rotation();
}

/// Expire timers and recompute stats derived from power-ups. Returns true
/// when a freeze wore off on this call.
pub fn update_status(entity: &mut Entity, now_ms: f64) -> bool {
    let thawed = update_freeze(entity, now_ms);
    let Some(tank) = entity.tank_mut() else {
        return thawed;
    };
    tank.powerups.expire(now_ms);
    if tank.is_frozen() {
        return thawed;
    }

    let rapid = tank.powerups.is_active(TankPowerUp::RapidFire, now_ms);
    let fast = tank.powerups.is_active(TankPowerUp::Speed, now_ms);
    tank.fire_rate_ms = if rapid {
        tank.base_fire_rate_ms / 3.0
    } else {
        tank.base_fire_rate_ms
    };
    let speed = if fast { tank.base_speed * 1.5 } else { tank.base_speed };
    entity.speed = speed;
    thawed
}
