//! Freeze status effect
//!
//! A frozen tank cannot move or fire. The effect caches the tank's speed and
//! fire capability when applied and restores them exactly once at expiry.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::entity::Entity;

/// Active freeze on a tank
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreezeEffect {
    pub started_ms: f64,
    pub duration_ms: f64,
    original_speed: f32,
    original_can_fire: bool,
}

impl FreezeEffect {
    pub fn remaining_ms(&self, now_ms: f64) -> f64 {
        (self.started_ms + self.duration_ms - now_ms).max(0.0)
    }

    pub fn expired(&self, now_ms: f64) -> bool {
        now_ms - self.started_ms >= self.duration_ms
    }
}

/// Freeze a tank. Players are immune and an already frozen tank keeps its
/// original cached values. Returns true when the effect was applied.
pub fn apply_freeze(entity: &mut Entity, now_ms: f64, duration_ms: f64) -> bool {
    if !entity.alive || entity.is_player() {
        return false;
    }
    let speed = entity.speed;
    let Some(tank) = entity.tank_mut() else {
        return false;
    };
    if tank.frozen.is_some() {
        return false;
    }

    tank.frozen = Some(FreezeEffect {
        started_ms: now_ms,
        duration_ms,
        original_speed: speed,
        original_can_fire: tank.can_fire,
    });
    tank.can_fire = false;
    tank.move_dir = Vec2::ZERO;
    entity.speed = 0.0;
    entity.vel = Vec2::ZERO;
    log::debug!("Tank {} frozen for {}ms", entity.id, duration_ms);
    true
}

/// Expire the freeze if its time is up. Returns true on the tick it thaws.
pub fn update_freeze(entity: &mut Entity, now_ms: f64) -> bool {
    let Some(tank) = entity.tank_mut() else {
        return false;
    };
    if !tank.frozen.as_ref().is_some_and(|f| f.expired(now_ms)) {
        return false;
    }
    let Some(effect) = tank.frozen.take() else {
        return false;
    };

    tank.can_fire = effect.original_can_fire;
    entity.speed = effect.original_speed;
    log::debug!("Tank {} thawed", entity.id);
    true
}

#[inline]
pub fn is_frozen(entity: &Entity) -> bool {
    entity.tank().is_some_and(|t| t.frozen.is_some())
}
