//! Collectible pickups
//!
//! Pickups sit in the collision grid like any solid entity but have no
//! built-in response. Players pick them up through the collision hook.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::entity::{Entity, EntityId, EntityKind, Layer, LayerMask};
use crate::consts::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PowerUpKind {
    Freeze,
    Flame,
    Laser,
    /// Invincibility until death
    Star,
    RapidFire,
    Shield,
    Speed,
}

impl PowerUpKind {
    /// Kinds the spawn director may drop
    pub const DROPS: [PowerUpKind; 2] = [PowerUpKind::Freeze, PowerUpKind::Laser];

    pub fn sprite_name(self) -> &'static str {
        match self {
            PowerUpKind::Freeze => "freeze",
            PowerUpKind::Flame => "flame",
            PowerUpKind::Laser => "laser",
            PowerUpKind::Star => "star",
            PowerUpKind::RapidFire => "rapid_fire",
            PowerUpKind::Shield => "shield",
            PowerUpKind::Speed => "speed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerUp {
    pub kind: PowerUpKind,
    pub spawned_ms: f64,
    pub lifetime_ms: f64,
    pub collected: bool,
}

impl PowerUp {
    pub fn expired(&self, now_ms: f64) -> bool {
        now_ms - self.spawned_ms >= self.lifetime_ms
    }
}

/// Pickup factory
pub fn new_power_up(id: EntityId, pos: Vec2, kind: PowerUpKind, now_ms: f64) -> Entity {
    let mut entity = Entity::new(
        id,
        pos,
        Vec2::splat(POWERUP_SIZE),
        Layer::PowerUp,
        LayerMask::of(&[Layer::Player]),
        EntityKind::PowerUp(PowerUp {
            kind,
            spawned_ms: now_ms,
            lifetime_ms: POWERUP_LIFETIME_MS,
            collected: false,
        }),
    );
    entity.friction = None;
    entity
}

/// Retire the pickup once its lifetime runs out
pub fn update_power_up(entity: &mut Entity, now_ms: f64) {
    if entity.power_up().is_some_and(|p| p.expired(now_ms)) {
        entity.destroy();
    }
}

/// Mark the pickup collected. Returns its kind the first time only.
pub fn collect(entity: &mut Entity) -> Option<PowerUpKind> {
    if !entity.alive {
        return None;
    }
    let pickup = entity.power_up_mut()?;
    if pickup.collected {
        return None;
    }
    pickup.collected = true;
    let kind = pickup.kind;
    entity.destroy();
    Some(kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_up_only_reacts_to_players() {
        let p = new_power_up(1, Vec2::ZERO, PowerUpKind::Laser, 0.0);
        assert!(p.solid);
        assert!(!p.mask.contains(Layer::PlayerBullet));
        assert_eq!(p.layer, Layer::PowerUp);
        assert!(p.mask.contains(Layer::Player));
    }

    #[test]
    fn test_power_up_expires() {
        let mut p = new_power_up(1, Vec2::ZERO, PowerUpKind::Freeze, 1000.0);
        update_power_up(&mut p, 1000.0 + POWERUP_LIFETIME_MS - 1.0);
        assert!(p.alive);
        update_power_up(&mut p, 1000.0 + POWERUP_LIFETIME_MS);
        assert!(!p.alive);
    }

    #[test]
    fn test_collect_only_once() {
        let mut p = new_power_up(1, Vec2::ZERO, PowerUpKind::Freeze, 0.0);
        assert_eq!(collect(&mut p), Some(PowerUpKind::Freeze));
        assert_eq!(collect(&mut p), None);
        assert!(!p.alive);
    }
}
