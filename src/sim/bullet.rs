//! Projectile lifecycle
//!
//! Bullets fly in a straight line without friction, track how far they have
//! travelled and die at their maximum range. Walls either absorb them or,
//! with bounce budget left, reflect them.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::entity::{Direction, Entity, EntityId, EntityKind, Layer, LayerMask};
use super::tank::BulletSpec;
use crate::consts::*;

/// Visual/behavioural bullet type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BulletKind {
    #[default]
    Normal,
    /// Freezes non-player tanks on hit
    Freeze,
    Flame,
    /// Boss shell, explodes on impact
    Missile,
    Fireball,
    Flamethrower,
}

impl BulletKind {
    /// Side length of the bullet's square hitbox
    pub fn size(self, explosive: bool) -> f32 {
        match self {
            BulletKind::Missile if explosive => 64.0,
            BulletKind::Missile => 16.0,
            BulletKind::Fireball => 12.0,
            _ => BULLET_SIZE,
        }
    }

    pub fn sprite_name(self) -> &'static str {
        match self {
            BulletKind::Normal => "bullet",
            BulletKind::Freeze => "bullet_freeze",
            BulletKind::Flame => "bullet_flame",
            BulletKind::Missile => "missile",
            BulletKind::Fireball => "fireball",
            BulletKind::Flamethrower => "flame",
        }
    }

    pub fn sound_name(self) -> &'static str {
        match self {
            BulletKind::Missile => "missile",
            BulletKind::Fireball | BulletKind::Flame | BulletKind::Flamethrower => "flame",
            BulletKind::Freeze => "freeze",
            BulletKind::Normal => "shoot",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BulletKind::Normal => "normal",
            BulletKind::Freeze => "freeze",
            BulletKind::Flame => "flame",
            BulletKind::Missile => "missile",
            BulletKind::Fireball => "fireball",
            BulletKind::Flamethrower => "flamethrower",
        }
    }
}

/// Preset bullet factories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulletVariant {
    Standard,
    Rapid,
    Heavy,
    Piercing,
    Bouncing,
}

impl BulletVariant {
    /// Build a spec for this preset
    pub fn spec(self, position: Vec2, direction: Direction, owner: Option<EntityId>) -> BulletSpec {
        let (speed, damage, size, piercing, max_bounces) = match self {
            BulletVariant::Standard => (200.0, 1, BULLET_SIZE, false, 0),
            BulletVariant::Rapid => (250.0, 1, 3.0, false, 0),
            BulletVariant::Heavy => (150.0, 2, 6.0, false, 0),
            BulletVariant::Piercing => (180.0, 1, BULLET_SIZE, true, 0),
            BulletVariant::Bouncing => (160.0, 1, BULLET_SIZE, false, 2),
        };
        BulletSpec {
            position,
            direction,
            speed,
            damage,
            owner,
            kind: BulletKind::Normal,
            piercing,
            explosion_radius: None,
            size,
            max_bounces,
        }
    }
}

/// Bullet component of an entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bullet {
    pub direction: Vec2,
    pub speed: f32,
    pub damage: i32,
    /// Weak handle to the firing tank
    pub owner: Option<EntityId>,
    pub owner_is_player: bool,
    pub traveled: f32,
    pub max_distance: f32,
    pub piercing: bool,
    pub bounces: u32,
    pub max_bounces: u32,
    pub explosion_radius: Option<f32>,
    pub kind: BulletKind,
    /// Targets a piercing bullet already damaged
    #[serde(default)]
    pub pierced: Vec<EntityId>,
}

impl Bullet {
    pub fn can_bounce(&self) -> bool {
        self.max_bounces > 0 && self.bounces < self.max_bounces
    }

    pub fn is_explosive(&self) -> bool {
        self.explosion_radius.is_some()
    }
}

/// Layer and mask for a bullet fired by a player or by anything else
pub fn bullet_layers(owner_is_player: bool) -> (Layer, LayerMask) {
    if owner_is_player {
        (Layer::PlayerBullet, LayerMask::of(&[Layer::Enemy, Layer::Wall]))
    } else {
        (Layer::EnemyBullet, LayerMask::of(&[Layer::Player, Layer::Wall]))
    }
}

/// Bullet factory. The descriptor's position is the bullet's center.
pub fn new_bullet(id: EntityId, spec: &BulletSpec, owner_is_player: bool) -> Entity {
    let size = Vec2::splat(spec.size);
    let (layer, mask) = bullet_layers(owner_is_player);
    let direction = spec.direction.vector();

    let mut entity = Entity::new(
        id,
        spec.position - size * 0.5,
        size,
        layer,
        mask,
        EntityKind::Bullet(Bullet {
            direction,
            speed: spec.speed,
            damage: spec.damage,
            owner: spec.owner,
            owner_is_player,
            traveled: 0.0,
            max_distance: BULLET_MAX_DISTANCE,
            piercing: spec.piercing,
            bounces: 0,
            max_bounces: spec.max_bounces,
            explosion_radius: spec.explosion_radius,
            kind: spec.kind,
            pierced: Vec::new(),
        }),
    );
    entity.vel = direction * spec.speed;
    entity.speed = spec.speed;
    entity.friction = None;
    entity.rotation = spec.direction.rotation();
    entity
}

/// Move a bullet and retire it at maximum range
pub fn update_bullet(entity: &mut Entity, dt: f32) {
    if !entity.alive {
        return;
    }
    let step = entity.vel * dt;
    entity.pos += step;

    let Some(bullet) = entity.bullet_mut() else {
        return;
    };
    bullet.traveled += step.length();
    if bullet.traveled >= bullet.max_distance {
        entity.destroy();
    }
}

/// Reflect off a wall along the axis with the larger center offset
pub fn bounce(entity: &mut Entity, wall_center: Vec2) {
    let delta = entity.center() - wall_center;
    if delta.x.abs() > delta.y.abs() {
        entity.vel.x = -entity.vel.x;
    } else {
        entity.vel.y = -entity.vel.y;
    }
    entity.vel *= BOUNCE_DAMPING;

    let vel = entity.vel;
    if let Some(bullet) = entity.bullet_mut() {
        bullet.bounces += 1;
        bullet.direction = vel.normalize_or_zero();
        bullet.speed = vel.length();
    }
}

/// Area damage with linear falloff. Zero at or beyond the radius.
pub fn explosion_falloff(distance: f32, radius: f32, peak: f32) -> i32 {
    if radius <= 0.0 || distance >= radius {
        return 0;
    }
    ((1.0 - distance / radius) * peak).ceil() as i32
}
