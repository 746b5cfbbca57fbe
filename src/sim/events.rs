//! Events raised by the simulation
//!
//! The sim never talks to audio or rendering directly. It queues events on
//! the game state and the session drains them into the platform sinks once
//! per frame.

use glam::Vec2;

use super::enemy::EnemyType;
use super::entity::EntityId;
use super::powerup::PowerUpKind;
use super::state::GamePhase;

/// Short visual effect at a point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectKind {
    BulletHit,
    Impact,
    FreezeImpact,
    IceBreak,
    PowerUpCollect,
    LaserHit,
    Flame,
    Respawn,
}

impl EffectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EffectKind::BulletHit => "bulletHit",
            EffectKind::Impact => "impact",
            EffectKind::FreezeImpact => "freeze_impact",
            EffectKind::IceBreak => "ice_break",
            EffectKind::PowerUpCollect => "powerupCollect",
            EffectKind::LaserHit => "laserHit",
            EffectKind::Flame => "flame",
            EffectKind::Respawn => "respawn",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExplosionKind {
    /// Destroyed prop or tank
    Destroy,
    /// Explosive shell detonation
    Missile,
    /// Boss death blast
    Boss,
}

impl ExplosionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExplosionKind::Destroy => "destroy",
            ExplosionKind::Missile => "missile",
            ExplosionKind::Boss => "boss",
        }
    }
}

/// Something the outside world may want to show, play or record
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    Effect {
        kind: EffectKind,
        pos: Vec2,
    },
    Explosion {
        pos: Vec2,
        kind: ExplosionKind,
        scale: f32,
    },
    ScreenShake {
        intensity: f32,
        duration_ms: f64,
    },
    Sound {
        name: &'static str,
        volume: f32,
    },
    EnemyKilled {
        id: EntityId,
        enemy_type: EnemyType,
        by: Option<EntityId>,
    },
    PlayerDown {
        id: EntityId,
        lives: i32,
    },
    PlayerEliminated {
        id: EntityId,
    },
    BaseDestroyed {
        id: EntityId,
    },
    PowerUpCollected {
        player: EntityId,
        kind: PowerUpKind,
    },
    PhaseChanged {
        phase: GamePhase,
    },
}

impl GameEvent {
    pub fn effect(kind: EffectKind, pos: Vec2) -> Self {
        GameEvent::Effect { kind, pos }
    }

    pub fn sound(name: &'static str, volume: f32) -> Self {
        GameEvent::Sound { name, volume }
    }

    pub fn shake(intensity: f32, duration_ms: f64) -> Self {
        GameEvent::ScreenShake { intensity, duration_ms }
    }
}
