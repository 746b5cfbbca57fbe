//! Enemy tanks
//!
//! Each enemy type is a row in a stats table. Bosses fire explosive missiles
//! and blow up on death; the flamethrower boss sprays a short-range stream
//! instead of shooting bullets.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::ai::AiController;
use super::bullet::BulletKind;
use super::entity::{Direction, Entity, EntityId, EntityKind, Layer, LayerMask};
use super::tank::{Tank, TankRole};
use crate::settings::Difficulty;

/// Flamethrower stream reach
pub const FLAME_DISTANCE: f32 = 200.0;
pub const FLAME_SEGMENTS: usize = 8;
pub const FLAME_BURST_MS: f64 = 1500.0;
/// Chance per AI tick that a burst ends early
pub const FLAME_STOP_CHANCE: f64 = 0.02;
pub const FLAME_DAMAGE: i32 = 1;

pub const BOSS_BLAST_RADIUS: f32 = 80.0;
pub const BOSS_BLAST_PEAK: f32 = 2.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EnemyType {
    Basic,
    Fast,
    Heavy,
    Sniper,
    Boss,
    Flame,
    Flamethrower,
}

/// Per-type tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnemyStats {
    pub speed: f32,
    pub health: i32,
    pub fire_rate_ms: f64,
    pub size: f32,
    pub detection_range: f32,
    pub attack_range: f32,
    pub bullet_kind: BulletKind,
    pub explosion_radius: Option<f32>,
}

impl EnemyType {
    pub const ALL: [EnemyType; 7] = [
        EnemyType::Basic,
        EnemyType::Fast,
        EnemyType::Heavy,
        EnemyType::Sniper,
        EnemyType::Boss,
        EnemyType::Flame,
        EnemyType::Flamethrower,
    ];

    pub fn stats(self) -> EnemyStats {
        let (speed, health, fire_rate_ms, size, detection_range, attack_range) = match self {
            EnemyType::Basic => (80.0, 2, 2200.0, 32.0, 200.0, 150.0),
            EnemyType::Fast => (110.0, 2, 1800.0, 32.0, 200.0, 150.0),
            EnemyType::Heavy => (60.0, 3, 2500.0, 40.0, 200.0, 150.0),
            EnemyType::Sniper => (70.0, 2, 3000.0, 32.0, 250.0, 200.0),
            EnemyType::Boss => (50.0, 6, 2000.0, 64.0, 250.0, 180.0),
            EnemyType::Flame => (75.0, 2, 1500.0, 36.0, 200.0, 160.0),
            EnemyType::Flamethrower => (35.0, 6, 3000.0, 96.0, 350.0, 220.0),
        };
        let (bullet_kind, explosion_radius) = match self {
            EnemyType::Boss => (BulletKind::Missile, Some(BOSS_BLAST_RADIUS)),
            EnemyType::Flame => (BulletKind::Fireball, None),
            EnemyType::Flamethrower => (BulletKind::Flamethrower, None),
            _ => (BulletKind::Normal, None),
        };
        EnemyStats {
            speed,
            health,
            fire_rate_ms,
            size,
            detection_range,
            attack_range,
            bullet_kind,
            explosion_radius,
        }
    }

    /// Boss-class enemies use the boss health override
    pub fn is_boss(self) -> bool {
        matches!(self, EnemyType::Boss | EnemyType::Flamethrower)
    }

    /// Points for a kill
    pub fn kill_score(self) -> u32 {
        let multiplier = match self {
            EnemyType::Heavy => 3,
            EnemyType::Sniper => 2,
            _ => 1,
        };
        100 * multiplier
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EnemyType::Basic => "basic",
            EnemyType::Fast => "fast",
            EnemyType::Heavy => "heavy",
            EnemyType::Sniper => "sniper",
            EnemyType::Boss => "boss",
            EnemyType::Flame => "flame",
            EnemyType::Flamethrower => "flamethrower",
        }
    }

    pub fn sprite_name(self) -> &'static str {
        match self {
            EnemyType::Boss => "boss",
            EnemyType::Flamethrower => "flamethrower_boss",
            EnemyType::Flame => "enemy_flame",
            _ => "enemy",
        }
    }
}

/// One piece of a flame stream, centered on `pos`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlameSegment {
    pub pos: Vec2,
    pub size: f32,
}

/// Flamethrower burst state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlameStream {
    pub active: bool,
    pub started_ms: f64,
    pub direction: Vec2,
    pub segments: Vec<FlameSegment>,
}

impl FlameStream {
    pub fn start(&mut self, now_ms: f64, direction: Vec2) {
        self.active = true;
        self.started_ms = now_ms;
        self.direction = direction;
        self.segments.clear();
    }

    pub fn stop(&mut self) {
        self.active = false;
        self.segments.clear();
    }

    pub fn burst_over(&self, now_ms: f64) -> bool {
        now_ms - self.started_ms >= FLAME_BURST_MS
    }

    /// Lay the segments out from the tank's front edge toward `direction`
    pub fn aim(&mut self, tank_center: Vec2, tank_size: Vec2, direction: Vec2) {
        self.direction = direction;
        let radius = tank_size.max_element() / 2.0;
        let start = tank_center + direction * (radius + 10.0);
        let step = FLAME_DISTANCE / FLAME_SEGMENTS as f32;
        self.segments = (0..FLAME_SEGMENTS)
            .map(|i| FlameSegment {
                pos: start + direction * step * (i + 1) as f32,
                size: 32.0 + 4.0 * i as f32,
            })
            .collect();
    }
}

/// Enemy component of a tank
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Enemy {
    pub enemy_type: EnemyType,
    pub ai: AiController,
    pub bullet_kind: BulletKind,
    pub explosion_radius: Option<f32>,
    #[serde(default)]
    pub flame: FlameStream,
}

impl Enemy {
    pub fn new(enemy_type: EnemyType) -> Self {
        let stats = enemy_type.stats();
        Self {
            enemy_type,
            ai: AiController::new(stats.detection_range, stats.attack_range),
            bullet_kind: stats.bullet_kind,
            explosion_radius: stats.explosion_radius,
            flame: FlameStream::default(),
        }
    }

    pub fn uses_flamethrower(&self) -> bool {
        self.enemy_type == EnemyType::Flamethrower
    }
}

/// Enemy layer mask, optionally reacting to other enemies' bullets
pub fn enemy_mask(friendly_fire: bool) -> LayerMask {
    let mut mask = LayerMask::of(&[Layer::Wall, Layer::Player, Layer::PlayerBullet]);
    mask.set(Layer::EnemyBullet, friendly_fire);
    mask
}

/// Enemy factory using the type's base stats
pub fn spawn_enemy(id: EntityId, pos: Vec2, enemy_type: EnemyType) -> Entity {
    let stats = enemy_type.stats();
    let mut tank = Tank::new(TankRole::Enemy(Enemy::new(enemy_type)));
    tank.base_speed = stats.speed;
    tank.fire_rate_ms = stats.fire_rate_ms;
    tank.base_fire_rate_ms = stats.fire_rate_ms;
    tank.set_facing(Direction::Down);

    let mut entity = Entity::new(
        id,
        pos,
        Vec2::splat(stats.size),
        Layer::Enemy,
        enemy_mask(false),
        EntityKind::Tank(Box::new(tank)),
    )
    .with_health(stats.health);
    entity.speed = stats.speed;
    entity.rotation = Direction::Down.rotation();
    entity
}

/// Replace the type's health with the difficulty override
pub fn apply_difficulty(entity: &mut Entity, difficulty: Difficulty) {
    let Some(enemy) = entity.enemy() else {
        return;
    };
    let health = if enemy.enemy_type.is_boss() {
        difficulty.boss_health()
    } else {
        difficulty.ai_health()
    };
    log::debug!(
        "{} health {} -> {} ({})",
        enemy.enemy_type.as_str(),
        entity.health,
        health,
        difficulty.as_str()
    );
    entity.health = health;
    entity.max_health = health;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_table() {
        let boss = spawn_enemy(1, Vec2::ZERO, EnemyType::Boss);
        assert_eq!(boss.size, Vec2::splat(64.0));
        assert_eq!(boss.health, 6);
        let e = boss.enemy().expect("enemy");
        assert_eq!(e.bullet_kind, BulletKind::Missile);
        assert_eq!(e.explosion_radius, Some(80.0));
        assert_eq!(e.ai.attack_range, 180.0);

        let sniper = spawn_enemy(2, Vec2::ZERO, EnemyType::Sniper);
        assert_eq!(sniper.enemy().map(|e| e.ai.detection_range), Some(250.0));
        assert_eq!(sniper.tank().map(|t| t.fire_rate_ms), Some(3000.0));
    }

    #[test]
    fn test_enemy_mask_friendly_fire() {
        assert!(enemy_mask(false).contains(Layer::PlayerBullet));
        assert!(!enemy_mask(false).contains(Layer::EnemyBullet));
        assert!(enemy_mask(true).contains(Layer::EnemyBullet));
    }

    #[test]
    fn test_difficulty_overrides_health() {
        let mut heavy = spawn_enemy(1, Vec2::ZERO, EnemyType::Heavy);
        apply_difficulty(&mut heavy, Difficulty::Easy);
        assert_eq!((heavy.health, heavy.max_health), (1, 1));

        let mut boss = spawn_enemy(2, Vec2::ZERO, EnemyType::Flamethrower);
        apply_difficulty(&mut boss, Difficulty::Hard);
        assert_eq!(boss.health, 8);
    }

    #[test]
    fn test_kill_score() {
        assert_eq!(EnemyType::Heavy.kill_score(), 300);
        assert_eq!(EnemyType::Sniper.kill_score(), 200);
        assert_eq!(EnemyType::Boss.kill_score(), 100);
    }

    #[test]
    fn test_flame_segments_grow_outward() {
        let mut flame = FlameStream::default();
        flame.aim(Vec2::new(100.0, 100.0), Vec2::splat(96.0), Vec2::X);
        assert_eq!(flame.segments.len(), FLAME_SEGMENTS);
        assert_eq!(flame.segments[0].pos, Vec2::new(100.0 + 58.0 + 25.0, 100.0));
        assert_eq!(flame.segments[7].size, 60.0);
        assert!(flame.segments.windows(2).all(|w| w[1].pos.x > w[0].pos.x));
    }
}
