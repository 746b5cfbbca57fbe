//! Damage, deaths and the continuous weapons
//!
//! Collision handlers and weapons only apply damage and flip `alive`. The
//! consequences of a death (explosions, score, kill counts, network
//! messages) are applied once per entity by `GameState::process_deaths`.

use glam::Vec2;
use rand::Rng;

use super::ai::plan_shot;
use super::bullet::explosion_falloff;
use super::collision::CollisionSystem;
use super::enemy::{BOSS_BLAST_PEAK, BOSS_BLAST_RADIUS, EnemyType, FLAME_DAMAGE, FLAME_STOP_CHANCE};
use super::entity::{DamageOutcome, Entity, EntityId, EntityKind, WallKind};
use super::events::{EffectKind, ExplosionKind, GameEvent};
use super::freeze::is_frozen;
use super::player::LASER_MAX_DISTANCE;
use super::state::{GamePhase, GameState};
use super::tank::{TankRole, fire};
use crate::net::NetMessage;

/// Explosive shells hit harder than their direct damage
const EXPLOSIVE_PEAK_FACTOR: f32 = 1.5;

/// Death side effects, decided before any mutation
#[derive(Debug, Clone, Copy)]
enum Death {
    Bullet {
        owner: Option<EntityId>,
        explosion: Option<(f32, f32)>,
    },
    Enemy {
        enemy_type: EnemyType,
    },
    Player,
    Car,
    Base,
    Other,
}

impl Death {
    fn of(entity: &Entity) -> Self {
        match &entity.kind {
            EntityKind::Bullet(b) => Death::Bullet {
                owner: b.owner,
                explosion: b
                    .explosion_radius
                    .map(|radius| (radius, b.damage as f32 * EXPLOSIVE_PEAK_FACTOR)),
            },
            EntityKind::Tank(tank) => match &tank.role {
                TankRole::Enemy(e) => Death::Enemy {
                    enemy_type: e.enemy_type,
                },
                TankRole::Player(_) => Death::Player,
            },
            EntityKind::Wall(w) if w.kind == WallKind::Car => Death::Car,
            EntityKind::Base(_) => Death::Base,
            _ => Death::Other,
        }
    }
}

impl GameState {
    /// Damage the entity at `index` and credit `source`. Players losing a
    /// life are announced here.
    pub fn damage(&mut self, index: usize, amount: i32, source: Option<EntityId>) -> DamageOutcome {
        let now = self.now_ms;
        let Some(entity) = self.entities.get_mut(index) else {
            return DamageOutcome::Ignored;
        };
        let center = entity.center();
        let outcome = entity.take_damage(amount, now);
        if outcome.landed() && source.is_some() {
            entity.last_hit_by = source;
        }

        if outcome == DamageOutcome::Downed {
            let id = entity.id;
            let lives = entity.player().map_or(0, |p| p.lives);
            self.emit(GameEvent::Explosion {
                pos: center,
                kind: ExplosionKind::Destroy,
                scale: 1.0,
            });
            self.emit(GameEvent::sound("explosion", 0.7));
            self.emit(GameEvent::PlayerDown { id, lives });
        }
        outcome
    }

    /// Linear-falloff blast. Entities computing zero damage are untouched.
    /// Returns how many entities were hit.
    pub fn apply_area_damage(
        &mut self,
        center: Vec2,
        radius: f32,
        peak: f32,
        source: Option<EntityId>,
        affects: impl Fn(&Entity) -> bool,
    ) -> usize {
        let targets: Vec<(usize, i32)> = self
            .entities
            .iter()
            .enumerate()
            .filter(|(_, e)| e.alive && Some(e.id) != source && affects(e))
            .filter_map(|(index, e)| {
                let amount = explosion_falloff(e.center().distance(center), radius, peak);
                (amount > 0).then_some((index, amount))
            })
            .collect();

        for &(index, amount) in &targets {
            self.damage(index, amount, source);
        }
        targets.len()
    }

    /// Apply death consequences for every entity that died since the last
    /// call. Blasts can kill more entities, so this loops until settled.
    pub fn process_deaths(&mut self) -> usize {
        let mut handled = 0;
        loop {
            let pending: Vec<usize> = self
                .entities
                .iter()
                .enumerate()
                .filter(|(_, e)| !e.alive && !e.death_handled)
                .map(|(index, _)| index)
                .collect();
            if pending.is_empty() {
                return handled;
            }
            for index in pending {
                self.entities[index].death_handled = true;
                self.on_death(index);
                handled += 1;
            }
        }
    }

    fn on_death(&mut self, index: usize) {
        let entity = &self.entities[index];
        let (id, center, last_hit_by) = (entity.id, entity.center(), entity.last_hit_by);

        match Death::of(entity) {
            Death::Bullet { owner, explosion } => {
                if let Some(owner_index) = owner.and_then(|o| self.index_of(o)) {
                    if let Some(tank) = self.entities[owner_index].tank_mut() {
                        tank.release_bullet(id);
                    }
                }
                if let Some((radius, peak)) = explosion {
                    self.emit(GameEvent::Explosion {
                        pos: center,
                        kind: ExplosionKind::Missile,
                        scale: radius / 40.0,
                    });
                    self.emit(GameEvent::shake(8.0, 400.0));
                    self.emit(GameEvent::sound("explosion", 0.8));
                    let hit = self.apply_area_damage(center, radius, peak, owner, |e| {
                        e.is_tank() || e.is_destructible_wall()
                    });
                    log::debug!("Shell {} exploded, {} caught in blast", id, hit);
                }
            }
            Death::Enemy { enemy_type } => self.on_enemy_killed(id, enemy_type, center, last_hit_by),
            Death::Player => {
                log::info!("Player {} eliminated", id);
                self.emit(GameEvent::PlayerEliminated { id });
            }
            Death::Car => {
                self.emit(GameEvent::Explosion {
                    pos: center,
                    kind: ExplosionKind::Destroy,
                    scale: 1.2,
                });
                self.emit(GameEvent::shake(5.0, 300.0));
                self.emit(GameEvent::sound("explosion", 0.6));
                if self.net.is_some() {
                    self.outbox.push(NetMessage::DestructibleDestroyed {
                        id,
                        kind: "car".to_string(),
                    });
                }
            }
            Death::Base => {
                log::info!("Base {} destroyed", id);
                self.emit(GameEvent::Explosion {
                    pos: center,
                    kind: ExplosionKind::Boss,
                    scale: 2.0,
                });
                self.emit(GameEvent::shake(12.0, 800.0));
                self.emit(GameEvent::BaseDestroyed { id });
                self.set_phase(GamePhase::GameOver);
            }
            Death::Other => {}
        }
    }

    fn on_enemy_killed(&mut self, id: EntityId, enemy_type: EnemyType, center: Vec2, by: Option<EntityId>) {
        self.kills += 1;
        if let Some(killer) = by.and_then(|k| self.index_of(k)) {
            if let Some(player) = self.entities[killer].player_mut() {
                player.add_score(enemy_type.kill_score());
            }
        }
        log::debug!("{} enemy {} killed by {:?}", enemy_type.as_str(), id, by);

        if enemy_type == EnemyType::Boss {
            self.emit(GameEvent::Explosion {
                pos: center,
                kind: ExplosionKind::Boss,
                scale: 2.0,
            });
            self.emit(GameEvent::shake(10.0, 500.0));
            self.apply_area_damage(center, BOSS_BLAST_RADIUS, BOSS_BLAST_PEAK, Some(id), |e| {
                e.is_tank() || e.is_car()
            });
        } else {
            self.emit(GameEvent::Explosion {
                pos: center,
                kind: ExplosionKind::Destroy,
                scale: 1.0,
            });
        }
        self.emit(GameEvent::sound("explosion", 0.7));
        self.emit(GameEvent::EnemyKilled { id, enemy_type, by });
        if self.net.is_some() {
            self.outbox.push(NetMessage::EnemyKilled { enemy_id: id });
        }
    }
}

/// Bullet-firing enemies: shoot along the dominant axis when the gate allows
pub fn enemy_fire(state: &mut GameState, index: usize) -> Option<EntityId> {
    let now = state.now_ms;
    let plan = plan_shot(&state.entities, index, &state.settings.ai, now)?;
    let slot_alive = state.entities[index]
        .tank()
        .and_then(|t| t.active_bullet)
        .is_some_and(|b| state.is_alive(b));

    let entity = &mut state.entities[index];
    if let Some(tank) = entity.tank_mut() {
        tank.set_facing(plan.facing);
    }
    entity.rotation = plan.facing.rotation();
    let spec = fire(entity, now, |_| slot_alive)?;
    Some(state.spawn_bullet(&spec))
}

/// Flamethrower burst, run once per AI tick: start, aim, burn, stop
pub fn update_flamethrower(state: &mut GameState, index: usize) {
    let now = state.now_ms;
    let Some(me) = state.entities.get(index).filter(|e| e.alive) else {
        return;
    };
    let Some(enemy) = me.enemy().filter(|e| e.uses_flamethrower()) else {
        return;
    };
    let (id, center, size, frozen) = (me.id, me.center(), me.size, is_frozen(me));
    let active = enemy.flame.active;
    let target = enemy
        .ai
        .target
        .and_then(|t| state.get(t))
        .filter(|t| t.alive && !t.is_respawning())
        .map(Entity::center);

    if frozen {
        if active {
            stop_flame(&mut state.entities[index], now);
        }
        return;
    }

    if !active {
        let Some(plan) = plan_shot(&state.entities, index, &state.settings.ai, now) else {
            return;
        };
        let entity = &mut state.entities[index];
        if let Some(tank) = entity.tank_mut() {
            tank.set_facing(plan.facing);
            tank.last_fire_ms = Some(now);
        }
        entity.rotation = plan.facing.rotation();
        if let Some(enemy) = entity.enemy_mut() {
            enemy.flame.start(now, plan.aim);
        }
        log::debug!("Flamethrower {} ignited", id);
        state.emit(GameEvent::sound("flame", 0.6));
    } else {
        let burst_over = state.entities[index]
            .enemy()
            .is_some_and(|e| e.flame.burst_over(now));
        if burst_over || state.rng.random_bool(FLAME_STOP_CHANCE) {
            stop_flame(&mut state.entities[index], now);
            return;
        }
    }

    // Aim at the target, or keep the current heading if it is gone
    let entity = &mut state.entities[index];
    let Some(enemy) = entity.enemy_mut() else {
        return;
    };
    let direction = target
        .map(|t| (t - center).normalize_or(enemy.flame.direction))
        .unwrap_or(enemy.flame.direction);
    enemy.flame.aim(center, size, direction);
    let segments = enemy.flame.segments.clone();

    let burned: Vec<usize> = state
        .entities
        .iter()
        .enumerate()
        .filter(|(_, e)| e.alive && e.is_player() && !e.is_respawning())
        .filter(|(_, e)| {
            let c = e.center();
            segments.iter().any(|s| c.distance(s.pos) < s.size / 2.0)
        })
        .map(|(i, _)| i)
        .collect();

    for player in burned {
        let pos = state.entities[player].center();
        state.damage(player, FLAME_DAMAGE, Some(id));
        state.emit(GameEvent::effect(EffectKind::Flame, pos));
    }
}

fn stop_flame(entity: &mut Entity, now_ms: f64) {
    if let Some(enemy) = entity.enemy_mut() {
        enemy.flame.stop();
    }
    // The cooldown restarts when the burst ends
    if let Some(tank) = entity.tank_mut() {
        tank.last_fire_ms = Some(now_ms);
    }
}

/// One laser damage tick for the player at `index`. Returns the entity the
/// beam stopped on, if any.
pub fn laser_tick(state: &mut GameState, collisions: &mut CollisionSystem, index: usize) -> Option<EntityId> {
    let me = state.entities.get(index)?;
    let tank = me.tank()?;
    let direction = tank.facing.vector();
    let start = me.center() + direction * tank.barrel_length;
    let me_id = me.id;
    let friendly_fire = state.settings.friendly_fire_players;

    collisions.refresh(&state.entities);
    let hit = collisions.raycast(&state.entities, start, direction, LASER_MAX_DISTANCE, |e| {
        if e.id == me_id || e.is_respawning() {
            return false;
        }
        if e.is_player() {
            return friendly_fire;
        }
        e.is_tank() || e.is_wall() || e.is_base()
    })?;

    let target = &state.entities[hit.index];
    // Players and solid scenery only stop the beam
    let damages = target.is_enemy() || target.is_destructible_wall();
    let pos = start + direction * hit.distance;
    if damages {
        state.damage(hit.index, 1, Some(me_id));
    }
    state.emit(GameEvent::effect(EffectKind::LaserHit, pos));
    log::debug!("Laser from {} hit {} at {:.0}", me_id, hit.id, hit.distance);
    Some(hit.id)
}
