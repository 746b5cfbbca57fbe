//! Collision detection and response
//!
//! Broad phase comes from the spatial grid; this module runs the narrow
//! phase and the per-pair handlers. Two passes share one grid rebuild:
//! - critical: any pair with a tank, bullet or base, every frame
//! - non-critical: everything else, on throttled frames
//!
//! Handlers only flip flags, move entities and queue events. Deaths are
//! turned into explosions, score and network messages afterwards by
//! `GameState::process_deaths`.

use glam::Vec2;
use rand::Rng;

use super::aabb::Aabb;
use super::bullet::{BulletKind, bounce};
use super::entity::{Entity, EntityId, layers_interact};
use super::events::{EffectKind, GameEvent};
use super::freeze::apply_freeze;
use super::grid::SpatialGrid;
use super::player::activate_power_up;
use super::powerup::collect;
use super::state::GameState;
use crate::consts::*;

/// Which slice of the candidate pairs a pass covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    Critical,
    NonCritical,
}

impl Pass {
    fn accepts(self, a: &Entity, b: &Entity) -> bool {
        let critical = a.is_critical() || b.is_critical();
        match self {
            Pass::Critical => critical,
            Pass::NonCritical => !critical,
        }
    }
}

/// Per-tick counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollisionStats {
    pub critical_pairs: usize,
    pub non_critical_pairs: usize,
    /// Pairs that passed the narrow phase and were resolved
    pub contacts: usize,
}

/// First entity hit by a ray
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub index: usize,
    pub id: EntityId,
    pub distance: f32,
}

#[derive(Debug, Clone, Default)]
pub struct CollisionSystem {
    grid: SpatialGrid,
    pub stats: CollisionStats,
}

impl CollisionSystem {
    pub fn new(cell_size: f32) -> Self {
        Self {
            grid: SpatialGrid::new(cell_size),
            stats: CollisionStats::default(),
        }
    }

    pub fn grid(&self) -> &SpatialGrid {
        &self.grid
    }

    /// Rebuild the broad phase from current positions
    pub fn refresh(&mut self, entities: &[Entity]) {
        self.grid.rebuild(entities);
    }

    /// Rebuild the grid and resolve this frame's collisions
    pub fn update(&mut self, state: &mut GameState, run_non_critical: bool) {
        self.stats = CollisionStats::default();
        self.grid.rebuild(&state.entities);

        self.stats.critical_pairs = self.run_pass(state, Pass::Critical);
        if run_non_critical {
            self.stats.non_critical_pairs = self.run_pass(state, Pass::NonCritical);
        }
    }

    fn run_pass(&mut self, state: &mut GameState, pass: Pass) -> usize {
        let pairs = {
            let entities = &state.entities;
            self.grid
                .candidate_pairs(|a, b| pass.accepts(&entities[a], &entities[b]))
        };
        for &(a, b) in &pairs {
            if check_pair(state, a, b) {
                self.stats.contacts += 1;
            }
        }
        pairs.len()
    }

    /// Cast a segment through the grid. `accept` filters candidate
    /// entities; the closest accepted hit wins. The grid must be fresh.
    pub fn raycast(
        &self,
        entities: &[Entity],
        start: Vec2,
        direction: Vec2,
        max_distance: f32,
        mut accept: impl FnMut(&Entity) -> bool,
    ) -> Option<RayHit> {
        let end = start + direction.normalize_or_zero() * max_distance;
        let swept = Aabb::new(start.min(end), start.max(end));

        self.grid
            .query(&swept)
            .into_iter()
            .filter_map(|index| {
                let entity = entities.get(index)?;
                if !entity.alive || !accept(entity) {
                    return None;
                }
                let t = entity.bounds().segment_entry(start, end)?;
                Some(RayHit {
                    index,
                    id: entity.id,
                    distance: t * max_distance,
                })
            })
            .min_by(|a, b| a.distance.total_cmp(&b.distance))
    }
}

/// Narrow phase for one candidate pair. Returns true when the pair touched
/// and was resolved.
pub fn check_pair(state: &mut GameState, a: usize, b: usize) -> bool {
    {
        let (ea, eb) = (&state.entities[a], &state.entities[b]);
        if !ea.alive || !eb.alive || !ea.solid || !eb.solid {
            return false;
        }
        if !layers_interact(ea, eb) {
            return false;
        }
        if !ea.bounds().intersects(&eb.bounds()) {
            return false;
        }
    }

    resolve(state, a, b);
    on_collision(state, a, b);
    on_collision(state, b, a);
    true
}

/// Two distinct mutable borrows into the arena
fn pair_mut(entities: &mut [Entity], a: usize, b: usize) -> (&mut Entity, &mut Entity) {
    debug_assert_ne!(a, b);
    if a < b {
        let (lo, hi) = entities.split_at_mut(b);
        (&mut lo[a], &mut hi[0])
    } else {
        let (lo, hi) = entities.split_at_mut(a);
        (&mut hi[0], &mut lo[b])
    }
}

/// Dispatch by pair type, first match wins
fn resolve(state: &mut GameState, a: usize, b: usize) {
    let (ea, eb) = (&state.entities[a], &state.entities[b]);

    if ea.is_bullet() != eb.is_bullet() {
        let (bullet, other) = if ea.is_bullet() { (a, b) } else { (b, a) };
        let target = &state.entities[other];
        if target.is_tank() {
            bullet_vs_tank(state, bullet, other);
        } else if target.is_wall() {
            bullet_vs_wall(state, bullet, other);
        } else if target.is_base() {
            bullet_vs_base(state, bullet, other);
        }
    } else if ea.is_tank() && eb.is_tank() {
        tank_vs_tank(state, a, b);
    } else if ea.is_wall() != eb.is_wall() {
        let (mover, wall) = if eb.is_wall() { (a, b) } else { (b, a) };
        push_out(state, mover, wall);
    } else if ea.is_base() != eb.is_base() {
        let (mover, base) = if eb.is_base() { (a, b) } else { (b, a) };
        push_out(state, mover, base);
    }
}

/// Generic hook run for each side of a resolved pair
fn on_collision(state: &mut GameState, me: usize, other: usize) {
    let now = state.now_ms;
    let (pickup, toucher) = pair_mut(&mut state.entities, me, other);
    if pickup.power_up().is_none() || !toucher.is_player() || toucher.is_respawning() {
        return;
    }
    let Some(kind) = collect(pickup) else {
        return;
    };
    let pos = pickup.center();

    activate_power_up(toucher, kind, now);
    if let Some(player) = toucher.player_mut() {
        player.add_score(POWERUP_SCORE);
    }
    let player = toucher.id;
    state.emit(GameEvent::effect(EffectKind::PowerUpCollect, pos));
    state.emit(GameEvent::sound("powerup", 0.6));
    state.emit(GameEvent::PowerUpCollected { player, kind });
}

fn bullet_vs_tank(state: &mut GameState, bullet_index: usize, tank_index: usize) {
    let now = state.now_ms;
    let (bullet_e, tank_e) = (&state.entities[bullet_index], &state.entities[tank_index]);
    let Some(bullet) = bullet_e.bullet() else {
        return;
    };

    if bullet.owner == Some(tank_e.id) {
        return;
    }
    if bullet.owner_is_player && tank_e.is_player() && !state.settings.friendly_fire_players {
        return;
    }
    if !bullet.owner_is_player && tank_e.is_enemy() && !state.settings.friendly_fire_enemies {
        return;
    }
    // A piercing shot damages each target once
    if bullet.pierced.contains(&tank_e.id) {
        return;
    }

    let (damage, kind, piercing, owner) = (bullet.damage, bullet.kind, bullet.piercing, bullet.owner);
    let (bullet_id, tank_id) = (bullet_e.id, tank_e.id);
    let hit_pos = bullet_e.center();
    let tank_pos = tank_e.center();

    if kind == BulletKind::Freeze && apply_freeze(&mut state.entities[tank_index], now, FREEZE_DURATION_MS) {
        state.emit(GameEvent::effect(EffectKind::FreezeImpact, tank_pos));
        state.emit(GameEvent::sound("freeze", 0.5));
    }

    let outcome = state.damage(tank_index, damage, owner);
    state.emit(GameEvent::effect(EffectKind::BulletHit, hit_pos));
    log::debug!("Bullet {} hit tank {}: {:?}", bullet_id, tank_id, outcome);

    let bullet_e = &mut state.entities[bullet_index];
    if !piercing {
        bullet_e.destroy();
    } else if let Some(bullet) = bullet_e.bullet_mut() {
        bullet.pierced.push(tank_id);
    }
}

fn bullet_vs_wall(state: &mut GameState, bullet_index: usize, wall_index: usize) {
    let Some(bullet) = state.entities[bullet_index].bullet() else {
        return;
    };
    let (damage, owner, can_bounce) = (bullet.damage, bullet.owner, bullet.can_bounce());
    let hit_pos = state.entities[bullet_index].center();

    if state.entities[wall_index].is_destructible_wall() {
        state.damage(wall_index, damage, owner);
    }

    let wall_bounds = state.entities[wall_index].bounds();
    let bullet_e = &mut state.entities[bullet_index];
    if can_bounce {
        bounce(bullet_e, wall_bounds.center());
        separate(bullet_e, &wall_bounds);
    } else {
        bullet_e.destroy();
    }
    state.emit(GameEvent::effect(EffectKind::Impact, hit_pos));
}

fn bullet_vs_base(state: &mut GameState, bullet_index: usize, base_index: usize) {
    let Some(bullet) = state.entities[bullet_index].bullet() else {
        return;
    };
    let (damage, owner) = (bullet.damage, bullet.owner);
    let hit_pos = state.entities[bullet_index].center();

    let outcome = state.damage(base_index, damage, owner);
    log::debug!("Base {} hit: {:?}", state.entities[base_index].id, outcome);
    state.entities[bullet_index].destroy();
    state.emit(GameEvent::effect(EffectKind::Impact, hit_pos));
}

/// Push two overlapping tanks apart and damp them
fn tank_vs_tank(state: &mut GameState, a: usize, b: usize) {
    let (ta, tb) = pair_mut(&mut state.entities, a, b);
    let mut delta = ta.center() - tb.center();
    let distance = delta.length();
    if distance <= f32::EPSILON {
        delta = Vec2::new(state.rng.random::<f32>() - 0.5, state.rng.random::<f32>() - 0.5);
    }
    let normal = delta.normalize_or(Vec2::X);

    let overlap = ((ta.size.x + tb.size.x) / 2.0 + 1.0 - distance).max(1.0);
    let push = normal * overlap * 0.5;
    ta.pos += push;
    tb.pos -= push;
    ta.vel *= 0.5;
    tb.vel *= 0.5;
}

/// Move `mover` out of an obstacle along the shallowest axis
fn push_out(state: &mut GameState, mover: usize, obstacle: usize) {
    let (m, o) = pair_mut(&mut state.entities, mover, obstacle);
    separate(m, &o.bounds());
}

/// Minimum translation out of `wall`, clamping velocity on that axis only
pub fn separate(entity: &mut Entity, wall: &Aabb) {
    let bounds = entity.bounds();
    let overlap_left = bounds.right() - wall.left();
    let overlap_right = wall.right() - bounds.left();
    let overlap_top = bounds.bottom() - wall.top();
    let overlap_bottom = wall.bottom() - bounds.top();

    let min = overlap_left.min(overlap_right).min(overlap_top).min(overlap_bottom);
    if min == overlap_left {
        entity.pos.x = wall.left() - entity.size.x;
        entity.vel.x = entity.vel.x.min(0.0);
    } else if min == overlap_right {
        entity.pos.x = wall.right();
        entity.vel.x = entity.vel.x.max(0.0);
    } else if min == overlap_top {
        entity.pos.y = wall.top() - entity.size.y;
        entity.vel.y = entity.vel.y.min(0.0);
    } else {
        entity.pos.y = wall.bottom();
        entity.vel.y = entity.vel.y.max(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;
    use crate::sim::bullet::BulletVariant;
    use crate::sim::enemy::EnemyType;
    use crate::sim::entity::{Direction, Layer, LayerMask};
    use crate::sim::powerup::PowerUpKind;
    use crate::sim::tank::BulletSpec;

    fn quiet_settings() -> Settings {
        let mut settings = Settings::default();
        settings.ai.dodge_chance = 0.0;
        settings
    }

    fn bullet_from(state: &mut GameState, owner: EntityId, center: Vec2, direction: Direction) -> EntityId {
        let spec = BulletVariant::Standard.spec(center, direction, Some(owner));
        state.spawn_bullet(&spec)
    }

    #[test]
    fn test_separate_pushes_left_and_clamps_velocity() {
        let mut state = GameState::new(1, quiet_settings());
        let player = state.spawn_player(Vec2::new(100.0, 100.0), 0);
        let wall = state.spawn_wall(Vec2::new(116.0, 100.0), Vec2::splat(32.0), false);
        if let Some(p) = state.get_mut(player) {
            p.vel = Vec2::new(90.0, 0.0);
        }

        let mut system = CollisionSystem::new(GRID_SIZE);
        system.update(&mut state, true);

        let p = state.get(player).expect("player");
        let w = state.get(wall).expect("wall");
        assert!(p.bounds().right() <= w.bounds().left());
        assert!(p.vel.x <= 0.0);
        assert_eq!(p.pos.y, 100.0);
    }

    #[test]
    fn test_one_sided_mask_still_collides() {
        let mut state = GameState::new(1, quiet_settings());
        let player = state.spawn_player(Vec2::new(100.0, 100.0), 0);
        let wall = state.spawn_wall(Vec2::new(120.0, 100.0), Vec2::splat(32.0), false);
        // Only the wall reacts to the player
        if let Some(p) = state.get_mut(player) {
            p.mask = LayerMask::EMPTY;
        }
        if let Some(w) = state.get_mut(wall) {
            w.mask = LayerMask::of(&[Layer::Player]);
        }

        let mut system = CollisionSystem::new(GRID_SIZE);
        system.update(&mut state, true);
        assert_eq!(system.stats.contacts, 1);
        assert!(state.get(player).is_some_and(|p| p.bounds().right() <= 120.0));
    }

    #[test]
    fn test_pair_sharing_cells_is_resolved_once() {
        let mut state = GameState::new(1, quiet_settings());
        // Both straddle the (0,0)-(1,1) cell corner
        let a = state.spawn_enemy(Vec2::new(40.0, 40.0), EnemyType::Basic);
        let b = state.spawn_enemy(Vec2::new(50.0, 50.0), EnemyType::Basic);
        // Enemy masks do not include Enemy, so make them interact
        for id in [a, b] {
            if let Some(e) = state.get_mut(id) {
                e.mask.insert(Layer::Enemy);
            }
        }

        let mut system = CollisionSystem::new(GRID_SIZE);
        system.update(&mut state, true);
        assert_eq!(system.stats.critical_pairs, 1);
        assert_eq!(system.stats.contacts, 1);
        let (ea, eb) = (state.get(a).expect("a"), state.get(b).expect("b"));
        assert!(ea.center().distance(eb.center()) > Vec2::new(10.0, 10.0).length());
    }

    #[test]
    fn test_bullet_damages_enemy_and_credits_owner() {
        let mut state = GameState::new(1, quiet_settings());
        let player = state.spawn_player(Vec2::new(100.0, 100.0), 0);
        let enemy = state.spawn_enemy(Vec2::new(200.0, 100.0), EnemyType::Basic);
        let health = state.get(enemy).map(|e| e.health).unwrap_or_default();
        let bullet = bullet_from(&mut state, player, Vec2::new(205.0, 116.0), Direction::Right);

        let mut system = CollisionSystem::new(GRID_SIZE);
        system.update(&mut state, false);

        let e = state.get(enemy).expect("enemy");
        assert_eq!(e.health, health - 1);
        assert_eq!(e.last_hit_by, Some(player));
        assert!(!state.is_alive(bullet));
        assert!(state
            .events
            .iter()
            .any(|ev| matches!(ev, GameEvent::Effect { kind: EffectKind::BulletHit, .. })));
    }

    #[test]
    fn test_bullet_never_hits_its_owner() {
        let mut state = GameState::new(1, quiet_settings());
        let enemy = state.spawn_enemy(Vec2::new(100.0, 100.0), EnemyType::Basic);
        let bullet = bullet_from(&mut state, enemy, Vec2::new(116.0, 116.0), Direction::Right);
        // Let the owner react to its own layer so the pair reaches the handler
        if let Some(e) = state.get_mut(enemy) {
            e.mask.insert(Layer::EnemyBullet);
        }

        let mut system = CollisionSystem::new(GRID_SIZE);
        system.update(&mut state, false);
        assert!(state.is_alive(bullet));
        assert_eq!(state.get(enemy).map(|e| e.health), Some(2));
    }

    #[test]
    fn test_player_bullets_spare_players_without_friendly_fire() {
        let mut state = GameState::new(1, quiet_settings());
        let shooter = state.spawn_player(Vec2::new(0.0, 0.0), 0);
        let other = state.spawn_player(Vec2::new(200.0, 200.0), 1);
        let bullet = bullet_from(&mut state, shooter, Vec2::new(216.0, 216.0), Direction::Right);
        // Force the pair past the mask filter
        if let Some(o) = state.get_mut(other) {
            o.mask.insert(Layer::PlayerBullet);
        }

        let mut system = CollisionSystem::new(GRID_SIZE);
        system.update(&mut state, false);
        assert!(state.is_alive(bullet));
        assert_eq!(state.get(other).map(|p| p.health), Some(1));
    }

    #[test]
    fn test_freeze_bullet_freezes_enemy() {
        let mut state = GameState::new(1, quiet_settings());
        let player = state.spawn_player(Vec2::new(0.0, 0.0), 0);
        let enemy = state.spawn_enemy(Vec2::new(200.0, 100.0), EnemyType::Heavy);
        let spec = BulletSpec {
            kind: BulletKind::Freeze,
            ..BulletVariant::Standard.spec(Vec2::new(210.0, 120.0), Direction::Right, Some(player))
        };
        state.spawn_bullet(&spec);

        let mut system = CollisionSystem::new(GRID_SIZE);
        system.update(&mut state, false);
        let e = state.get(enemy).expect("enemy");
        assert!(e.tank().is_some_and(|t| t.is_frozen()));
        assert!(state
            .events
            .iter()
            .any(|ev| matches!(ev, GameEvent::Effect { kind: EffectKind::FreezeImpact, .. })));
    }

    #[test]
    fn test_piercing_bullet_hits_each_target_once() {
        let mut state = GameState::new(1, quiet_settings());
        let player = state.spawn_player(Vec2::new(0.0, 0.0), 0);
        let enemy = state.spawn_enemy(Vec2::new(200.0, 100.0), EnemyType::Heavy);
        let spec = BulletVariant::Piercing.spec(Vec2::new(210.0, 120.0), Direction::Right, Some(player));
        let bullet = state.spawn_bullet(&spec);

        let mut system = CollisionSystem::new(GRID_SIZE);
        system.update(&mut state, false);
        system.update(&mut state, false);

        assert!(state.is_alive(bullet));
        assert_eq!(state.get(enemy).map(|e| e.health), Some(1));
        assert_eq!(state.get(bullet).and_then(|b| b.bullet()).map(|b| b.pierced.clone()), Some(vec![enemy]));
    }

    #[test]
    fn test_bullet_destroys_car_and_dies() {
        let mut state = GameState::new(1, quiet_settings());
        let player = state.spawn_player(Vec2::new(0.0, 0.0), 0);
        let car = state.spawn_car(Vec2::new(300.0, 300.0));
        let bullet = bullet_from(&mut state, player, Vec2::new(302.0, 316.0), Direction::Right);

        let mut system = CollisionSystem::new(GRID_SIZE);
        system.update(&mut state, false);
        assert!(!state.is_alive(car));
        assert!(!state.is_alive(bullet));
        assert_eq!(state.get(car).and_then(|c| c.last_hit_by), Some(player));
    }

    #[test]
    fn test_bouncing_bullet_reflects_off_wall() {
        let mut state = GameState::new(1, quiet_settings());
        let player = state.spawn_player(Vec2::new(0.0, 0.0), 0);
        state.spawn_wall(Vec2::new(300.0, 300.0), Vec2::splat(32.0), false);
        let spec = BulletVariant::Bouncing.spec(Vec2::new(300.0, 316.0), Direction::Right, Some(player));
        let bullet = state.spawn_bullet(&spec);

        let mut system = CollisionSystem::new(GRID_SIZE);
        system.update(&mut state, false);
        let b = state.get(bullet).expect("bullet");
        assert!(b.alive);
        assert!(b.vel.x < 0.0);
        assert!(b.bounds().right() <= 300.0);
        assert_eq!(b.bullet().map(|x| x.bounces), Some(1));
    }

    #[test]
    fn test_base_blocks_tanks_and_takes_bullets() {
        let mut state = GameState::new(1, quiet_settings());
        let base = state.spawn_base(Vec2::new(400.0, 500.0), false);
        let enemy = state.spawn_enemy(Vec2::new(380.0, 500.0), EnemyType::Basic);
        // Tanks only react to bases through the base's mask
        if let Some(b) = state.get_mut(base) {
            b.mask.insert(Layer::Enemy);
        }

        let mut system = CollisionSystem::new(GRID_SIZE);
        system.update(&mut state, false);
        assert!(state.get(enemy).is_some_and(|e| e.bounds().right() <= 400.0));

        let shooter = state.spawn_enemy(Vec2::new(0.0, 0.0), EnemyType::Basic);
        bullet_from(&mut state, shooter, Vec2::new(424.0, 530.0), Direction::Down);
        system.update(&mut state, false);
        assert!(!state.is_alive(base));
    }

    #[test]
    fn test_player_collects_power_up() {
        let mut state = GameState::new(1, quiet_settings());
        let player = state.spawn_player(Vec2::new(100.0, 100.0), 0);
        let pickup = state.spawn_power_up(Vec2::new(104.0, 104.0), PowerUpKind::Laser);

        let mut system = CollisionSystem::new(GRID_SIZE);
        system.update(&mut state, true);
        assert!(!state.is_alive(pickup));
        let p = state.get(player).and_then(|e| e.player()).expect("player");
        assert!(p.laser.enabled);
        assert_eq!(p.score, POWERUP_SCORE);
    }

    #[test]
    fn test_raycast_returns_closest_hit() {
        let mut state = GameState::new(1, quiet_settings());
        let near = state.spawn_wall(Vec2::new(100.0, 0.0), Vec2::splat(32.0), false);
        state.spawn_wall(Vec2::new(300.0, 0.0), Vec2::splat(32.0), false);

        let mut system = CollisionSystem::new(GRID_SIZE);
        system.refresh(&state.entities);
        let hit = system
            .raycast(&state.entities, Vec2::new(0.0, 16.0), Vec2::X, 800.0, |e| e.is_wall())
            .expect("hit");
        assert_eq!(hit.id, near);
        assert!((hit.distance - 100.0).abs() < 1e-3);

        let miss = system.raycast(&state.entities, Vec2::new(0.0, 100.0), Vec2::X, 800.0, |_| true);
        assert!(miss.is_none());
    }
}
