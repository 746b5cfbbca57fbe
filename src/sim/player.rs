//! Player tanks
//!
//! Players read a plain control struct each tick, respawn at their spawn
//! point after losing a life and carry one exclusive weapon mode.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::bullet::BulletKind;
use super::entity::{Direction, Entity, EntityId, EntityKind, Layer, LayerMask};
use super::powerup::PowerUpKind;
use super::tank::{self, BulletSpec, Expiry, Tank, TankPowerUp, TankRole};
use crate::consts::*;

pub const PLAYER_LIVES: i32 = 4;
pub const PLAYER_SPEED: f32 = 90.0;
pub const PLAYER_FIRE_RATE_MS: f64 = 400.0;
pub const RESPAWN_DURATION_MS: f64 = 3000.0;
pub const SPAWN_INVULNERABILITY_MS: f64 = 2000.0;

pub const LASER_DAMAGE_INTERVAL_MS: f64 = 750.0;
pub const LASER_MAX_DURATION_MS: f64 = 5000.0;
pub const LASER_COOLDOWN_MS: f64 = 3000.0;
pub const LASER_MAX_DISTANCE: f32 = 800.0;
pub const LASER_MIN_ACTIVE_MS: f64 = 300.0;
pub const LASER_RESTART_DEBOUNCE_MS: f64 = 250.0;

const RAPID_FIRE_MS: f64 = 15_000.0;
const SHIELD_MS: f64 = 10_000.0;
const SPEED_MS: f64 = 12_000.0;

/// Per-tick control state from whatever input device drives the player
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Controls {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
    pub fire: bool,
}

impl Controls {
    /// Single cardinal move vector. With several keys held the priority is
    /// up, down, left, right.
    pub fn move_vector(&self) -> Vec2 {
        if self.up {
            Direction::Up.vector()
        } else if self.down {
            Direction::Down.vector()
        } else if self.left {
            Direction::Left.vector()
        } else if self.right {
            Direction::Right.vector()
        } else {
            Vec2::ZERO
        }
    }
}

/// Exclusive weapon mode
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum WeaponMode {
    #[default]
    Normal,
    Freeze(Expiry),
    Flame(Expiry),
    Laser,
}

/// What the laser did on this update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaserUpdate {
    Idle,
    Firing,
    /// Beam is on and a damage tick is due now
    Tick,
    Stopped,
}

/// Held-beam weapon timers
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LaserState {
    pub enabled: bool,
    pub active: bool,
    pub end_ms: f64,
    pub cooldown_end_ms: f64,
    pub last_damage_ms: Option<f64>,
    pub recently_stopped_ms: Option<f64>,
}

impl LaserState {
    pub fn update(&mut self, fire_held: bool, now_ms: f64) -> LaserUpdate {
        if !self.enabled {
            return LaserUpdate::Idle;
        }

        let debounced = self
            .recently_stopped_ms
            .is_none_or(|t| now_ms - t > LASER_RESTART_DEBOUNCE_MS);
        if !self.active && fire_held && now_ms >= self.cooldown_end_ms && debounced {
            self.active = true;
            self.end_ms = now_ms + LASER_MAX_DURATION_MS;
            self.last_damage_ms = None;
        }

        if !self.active {
            return LaserUpdate::Idle;
        }

        let elapsed = now_ms - (self.end_ms - LASER_MAX_DURATION_MS);
        if now_ms >= self.end_ms || (!fire_held && elapsed >= LASER_MIN_ACTIVE_MS) {
            self.stop(now_ms);
            return LaserUpdate::Stopped;
        }

        if self
            .last_damage_ms
            .is_none_or(|t| now_ms - t >= LASER_DAMAGE_INTERVAL_MS)
        {
            self.last_damage_ms = Some(now_ms);
            return LaserUpdate::Tick;
        }
        LaserUpdate::Firing
    }

    fn stop(&mut self, now_ms: f64) {
        self.active = false;
        self.cooldown_end_ms = now_ms + LASER_COOLDOWN_MS;
        self.recently_stopped_ms = Some(now_ms);
    }

    /// True when holding fire would start a beam right now
    pub fn ready(&self, now_ms: f64) -> bool {
        self.enabled && now_ms >= self.cooldown_end_ms
    }
}

/// Player component of a tank
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub index: u8,
    pub lives: i32,
    pub score: u32,
    pub respawning: bool,
    pub respawn_at_ms: f64,
    pub invulnerable_until: Option<f64>,
    /// Star pickup: immune until death
    pub invincible: bool,
    pub spawn_point: Vec2,
    pub controls: Controls,
    pub weapon: WeaponMode,
    pub laser: LaserState,
}

impl Player {
    pub fn new(index: u8, spawn_point: Vec2) -> Self {
        Self {
            index,
            lives: PLAYER_LIVES,
            score: 0,
            respawning: false,
            respawn_at_ms: 0.0,
            invulnerable_until: None,
            invincible: false,
            spawn_point,
            controls: Controls::default(),
            weapon: WeaponMode::Normal,
            laser: LaserState::default(),
        }
    }

    pub fn is_invulnerable(&self, now_ms: f64) -> bool {
        self.invincible || self.invulnerable_until.is_some_and(|t| now_ms < t)
    }

    pub fn grant_invulnerability(&mut self, now_ms: f64, duration_ms: f64) {
        let until = now_ms + duration_ms;
        self.invulnerable_until = Some(self.invulnerable_until.map_or(until, |t| t.max(until)));
    }

    pub fn add_score(&mut self, points: u32) {
        self.score = self.score.saturating_add(points);
    }

    pub fn bullet_kind(&self) -> BulletKind {
        match self.weapon {
            WeaponMode::Freeze(_) => BulletKind::Freeze,
            WeaponMode::Flame(_) => BulletKind::Flame,
            WeaponMode::Normal | WeaponMode::Laser => BulletKind::Normal,
        }
    }

    /// Drop timed weapon modes once they run out
    fn expire_weapon(&mut self, now_ms: f64) {
        if let WeaponMode::Freeze(e) | WeaponMode::Flame(e) = self.weapon {
            if e.expired(now_ms) {
                log::debug!("Player {} weapon mode expired", self.index + 1);
                self.weapon = WeaponMode::Normal;
            }
        }
    }

    fn set_weapon(&mut self, mode: WeaponMode) {
        if !matches!(mode, WeaponMode::Laser) {
            self.laser.enabled = false;
            self.laser.active = false;
        }
        self.weapon = mode;
    }

    fn reset_power_ups(&mut self) {
        self.weapon = WeaponMode::Normal;
        self.laser = LaserState::default();
        self.invincible = false;
    }
}

/// Player layer mask, optionally reacting to other players' bullets
pub fn player_mask(friendly_fire: bool) -> LayerMask {
    let mut mask = LayerMask::of(&[Layer::Wall, Layer::Enemy, Layer::EnemyBullet, Layer::PowerUp]);
    mask.set(Layer::PlayerBullet, friendly_fire);
    mask
}

/// Player factory
pub fn spawn_player(id: EntityId, pos: Vec2, index: u8) -> Entity {
    let mut tank = Tank::new(TankRole::Player(Player::new(index, pos)));
    tank.base_speed = PLAYER_SPEED;
    tank.fire_rate_ms = PLAYER_FIRE_RATE_MS;
    tank.base_fire_rate_ms = PLAYER_FIRE_RATE_MS;

    let mut entity = Entity::new(
        id,
        pos,
        Vec2::splat(TANK_SIZE),
        Layer::Player,
        player_mask(false),
        EntityKind::Tank(Box::new(tank)),
    );
    entity.speed = PLAYER_SPEED;
    entity.rotation = Direction::Up.rotation();
    entity
}

/// Grant a pickup. Weapon modes replace each other; buffs stack.
pub fn activate_power_up(entity: &mut Entity, kind: PowerUpKind, now_ms: f64) {
    let Some(tank) = entity.tank_mut() else {
        return;
    };
    let TankRole::Player(player) = &mut tank.role else {
        return;
    };

    match kind {
        PowerUpKind::Freeze => player.set_weapon(WeaponMode::Freeze(Expiry::UntilDeath)),
        PowerUpKind::Flame => player.set_weapon(WeaponMode::Flame(Expiry::UntilDeath)),
        PowerUpKind::Laser => {
            player.set_weapon(WeaponMode::Laser);
            player.laser.enabled = true;
            player.laser.cooldown_end_ms = 0.0;
        }
        PowerUpKind::Star => player.invincible = true,
        PowerUpKind::RapidFire => tank.powerups.activate(TankPowerUp::RapidFire, now_ms, RAPID_FIRE_MS),
        PowerUpKind::Shield => player.grant_invulnerability(now_ms, SHIELD_MS),
        PowerUpKind::Speed => tank.powerups.activate(TankPowerUp::Speed, now_ms, SPEED_MS),
    }
    log::info!("Player {} activated {:?}", entity.id, kind);
}

/// Outcome of a player update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerStep {
    Active,
    Respawning,
    Respawned,
    /// Out of lives
    Eliminated,
}

/// Per-frame player update: respawn timer, timers, input and movement
pub fn update_player(entity: &mut Entity, dt: f32, now_ms: f64) -> PlayerStep {
    let Some(player) = entity.player_mut() else {
        return PlayerStep::Active;
    };

    if player.respawning {
        if now_ms < player.respawn_at_ms {
            return PlayerStep::Respawning;
        }
        return if complete_respawn(entity, now_ms) {
            PlayerStep::Respawned
        } else {
            PlayerStep::Eliminated
        };
    }

    player.expire_weapon(now_ms);
    let move_dir = player.controls.move_vector();

    tank::update_status(entity, now_ms);
    if let Some(tank) = entity.tank_mut() {
        tank.move_dir = move_dir;
    }
    tank::update_movement(entity);
    entity.integrate(dt);
    PlayerStep::Active
}

/// Lose a life, hide the tank and move it back to its spawn point
pub fn start_respawn(entity: &mut Entity, now_ms: f64) {
    let id = entity.id;
    let Some(tank) = entity.tank_mut() else {
        return;
    };
    tank.powerups.clear();
    tank.move_dir = Vec2::ZERO;
    tank.set_facing(Direction::Up);
    let TankRole::Player(player) = &mut tank.role else {
        return;
    };

    player.lives -= 1;
    player.respawning = true;
    player.respawn_at_ms = now_ms + RESPAWN_DURATION_MS;
    player.reset_power_ups();
    let spawn = player.spawn_point;
    log::info!("Player {} down, {} lives left", id, player.lives);

    entity.visible = false;
    entity.solid = false;
    entity.pos = spawn;
    entity.vel = Vec2::ZERO;
    entity.rotation = Direction::Up.rotation();
}

/// Finish the respawn. Returns false (and kills the entity) when no lives
/// remain.
pub fn complete_respawn(entity: &mut Entity, now_ms: f64) -> bool {
    let Some(player) = entity.player_mut() else {
        return false;
    };
    player.respawning = false;

    if player.lives <= 0 {
        log::info!("Player {} is out of lives", player.index + 1);
        entity.alive = false;
        return false;
    }

    player.grant_invulnerability(now_ms, SPAWN_INVULNERABILITY_MS);
    entity.visible = true;
    entity.solid = true;
    entity.health = entity.max_health;
    true
}

/// Try to shoot a bullet. Laser mode suppresses bullets while the beam is
/// running or ready to start.
pub fn attempt_fire(entity: &mut Entity, now_ms: f64, bullet_alive: impl Fn(EntityId) -> bool) -> Option<BulletSpec> {
    let player = entity.player()?;
    if player.respawning || !player.controls.fire || player.laser.active {
        return None;
    }
    if player.laser.ready(now_ms) {
        return None;
    }
    tank::fire(entity, now_ms, bullet_alive)
}

/// Advance the laser state machine from the held fire button
pub fn update_laser(entity: &mut Entity, now_ms: f64) -> LaserUpdate {
    if !entity.alive {
        return LaserUpdate::Idle;
    }
    match entity.player_mut() {
        Some(p) if !p.respawning => {
            let fire = p.controls.fire;
            p.laser.update(fire, now_ms)
        }
        _ => LaserUpdate::Idle,
    }
}
