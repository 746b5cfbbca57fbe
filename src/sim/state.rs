//! Game state and entity arena
//!
//! All simulation state lives here and is passed around by `&mut`. Entities
//! sit in one dense `Vec` ordered by id:
//! - new entities are appended with a fresh, larger id
//! - dead entities stay as tombstones until `cleanup`
//! - handles are resolved by binary search on id

use std::collections::BTreeMap;

use glam::Vec2;
use rand::SeedableRng;
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use super::aabb::Aabb;
use super::bullet::new_bullet;
use super::enemy::{EnemyType, apply_difficulty, enemy_mask, spawn_enemy};
use super::entity::{Base, Entity, EntityId, EntityKind, Layer, LayerMask, Wall, WallKind};
use super::events::GameEvent;
use super::player::{Controls, player_mask, spawn_player};
use super::powerup::{PowerUpKind, new_power_up};
use super::spawner::SpawnDirector;
use super::tank::BulletSpec;
use crate::consts::*;
use crate::net::{BulletFired, NetMessage, RemotePlayer};
use crate::settings::Settings;

/// Current phase of gameplay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GamePhase {
    Playing,
    /// Enough kills for this stage
    StageClear,
    /// Base lost or every player eliminated
    GameOver,
}

/// This peer's identity in a networked game
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetIdentity {
    pub local_player_id: String,
    pub is_host: bool,
}

fn fresh_rng() -> Pcg32 {
    Pcg32::seed_from_u64(0)
}

/// Complete simulation state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameState {
    /// Run seed for reproducibility
    pub seed: u64,
    pub settings: Settings,
    pub phase: GamePhase,
    /// Sim time of the last phase change
    #[serde(default)]
    pub phase_started_ms: f64,
    /// Current stage (1-based)
    pub stage: u32,
    /// Frames simulated so far
    pub frame: u64,
    /// Simulation clock, advanced only by tick deltas
    pub now_ms: f64,
    /// Entity arena, ordered by id
    pub entities: Vec<Entity>,
    /// Enemies killed this stage
    pub kills: u32,
    pub spawner: SpawnDirector,
    /// Set when playing over the network
    pub net: Option<NetIdentity>,
    /// Visual-only shadows of other peers' players
    pub remote_players: BTreeMap<String, RemotePlayer>,
    /// Events raised since the last drain
    #[serde(skip)]
    pub events: Vec<GameEvent>,
    /// Network messages waiting for the next flush
    #[serde(skip)]
    pub outbox: Vec<NetMessage>,
    /// Entities added since the last drain
    #[serde(skip)]
    pub spawned: Vec<EntityId>,
    /// Entities removed by cleanup since the last drain
    #[serde(skip)]
    pub removed: Vec<EntityId>,
    #[serde(skip, default = "fresh_rng")]
    pub rng: Pcg32,
    next_id: EntityId,
}

impl GameState {
    /// Create an empty arena with the given seed
    pub fn new(seed: u64, settings: Settings) -> Self {
        Self {
            seed,
            spawner: SpawnDirector::new(1),
            settings,
            phase: GamePhase::Playing,
            phase_started_ms: 0.0,
            stage: 1,
            frame: 0,
            now_ms: 0.0,
            entities: Vec::new(),
            kills: 0,
            net: None,
            remote_players: BTreeMap::new(),
            events: Vec::new(),
            outbox: Vec::new(),
            spawned: Vec::new(),
            removed: Vec::new(),
            rng: Pcg32::seed_from_u64(seed),
            next_id: 1,
        }
    }

    /// Allocate a new entity ID
    pub fn next_entity_id(&mut self) -> EntityId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub fn arena(&self) -> Aabb {
        Aabb::new(
            Vec2::ZERO,
            Vec2::new(self.settings.arena_width, self.settings.arena_height),
        )
    }

    /// Append an entity. Its id must be newer than every id in the arena.
    pub fn insert(&mut self, entity: Entity) -> EntityId {
        debug_assert!(self.entities.last().is_none_or(|last| last.id < entity.id));
        let id = entity.id;
        self.entities.push(entity);
        self.spawned.push(id);
        id
    }

    pub fn index_of(&self, id: EntityId) -> Option<usize> {
        self.entities.binary_search_by_key(&id, |e| e.id).ok()
    }

    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.index_of(id).map(|i| &self.entities[i])
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        let index = self.index_of(id)?;
        self.entities.get_mut(index)
    }

    pub fn is_alive(&self, id: EntityId) -> bool {
        self.get(id).is_some_and(|e| e.alive)
    }

    pub fn emit(&mut self, event: GameEvent) {
        self.events.push(event);
    }

    pub fn players(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter().filter(|e| e.is_player())
    }

    pub fn enemies(&self) -> impl Iterator<Item = &Entity> {
        self.entities.iter().filter(|e| e.alive && e.is_enemy())
    }

    /// Arena index of the player with this slot index
    pub fn player_index(&self, slot: u8) -> Option<usize> {
        self.entities
            .iter()
            .position(|e| e.player().is_some_and(|p| p.index == slot))
    }

    /// Feed input for one player slot
    pub fn set_controls(&mut self, slot: u8, controls: Controls) {
        let Some(index) = self.player_index(slot) else {
            return;
        };
        if let Some(player) = self.entities[index].player_mut() {
            player.controls = controls;
        }
    }

    // === Spawn factories ===

    pub fn spawn_player(&mut self, pos: Vec2, slot: u8) -> EntityId {
        let id = self.next_entity_id();
        let mut entity = spawn_player(id, pos, slot);
        entity.mask = player_mask(self.settings.friendly_fire_players);
        if let Some((fire_rate_ms, bullet_speed)) = self.settings.player_gun() {
            if let Some(tank) = entity.tank_mut() {
                tank.fire_rate_ms = fire_rate_ms;
                tank.base_fire_rate_ms = fire_rate_ms;
                tank.bullet_speed = bullet_speed;
            }
        }
        log::info!("Player {} spawned at ({:.0}, {:.0})", slot + 1, pos.x, pos.y);
        self.insert(entity)
    }

    pub fn spawn_enemy(&mut self, pos: Vec2, enemy_type: EnemyType) -> EntityId {
        let id = self.next_entity_id();
        let mut entity = spawn_enemy(id, pos, enemy_type);
        apply_difficulty(&mut entity, self.settings.difficulty);
        entity.mask = enemy_mask(self.settings.friendly_fire_enemies);
        log::debug!("Spawned {} enemy {}", enemy_type.as_str(), id);
        self.insert(entity)
    }

    /// Plain level geometry
    pub fn spawn_wall(&mut self, pos: Vec2, size: Vec2, destructible: bool) -> EntityId {
        let id = self.next_entity_id();
        let mut entity = Entity::new(
            id,
            pos,
            size,
            Layer::Wall,
            LayerMask::of(&[Layer::Tank, Layer::Bullet]),
            EntityKind::Wall(Wall {
                kind: WallKind::Barrier,
                destructible,
            }),
        );
        entity.friction = None;
        self.insert(entity)
    }

    /// Destructible parked car
    pub fn spawn_car(&mut self, pos: Vec2) -> EntityId {
        let id = self.next_entity_id();
        let entity = Entity::new(
            id,
            pos,
            Vec2::splat(CAR_SIZE),
            Layer::Wall,
            LayerMask::of(&[Layer::Player, Layer::Enemy, Layer::PlayerBullet, Layer::EnemyBullet]),
            EntityKind::Wall(Wall {
                kind: WallKind::Car,
                destructible: true,
            }),
        );
        self.insert(entity)
    }

    pub fn spawn_base(&mut self, pos: Vec2, shielded: bool) -> EntityId {
        let id = self.next_entity_id();
        let mut base = Base::default();
        if shielded {
            base.activate_shield();
        }
        let mut entity = Entity::new(
            id,
            pos,
            Vec2::splat(BASE_SIZE),
            Layer::Base,
            LayerMask::of(&[Layer::EnemyBullet]),
            EntityKind::Base(base),
        );
        entity.friction = None;
        self.insert(entity)
    }

    pub fn spawn_power_up(&mut self, pos: Vec2, kind: PowerUpKind) -> EntityId {
        let id = self.next_entity_id();
        let entity = new_power_up(id, pos, kind, self.now_ms);
        log::debug!("Power-up {:?} dropped at ({:.0}, {:.0})", kind, pos.x, pos.y);
        self.insert(entity)
    }

    /// Non-interactive scenery
    pub fn spawn_decoration(&mut self, pos: Vec2, size: Vec2) -> EntityId {
        let id = self.next_entity_id();
        let mut entity = Entity::new(
            id,
            pos,
            size,
            Layer::Decoration,
            LayerMask::EMPTY,
            EntityKind::Decoration,
        );
        entity.solid = false;
        entity.friction = None;
        self.insert(entity)
    }

    /// Create a bullet from a fire spec and claim the owner's slot. Shots by
    /// the local player are queued for the network.
    pub fn spawn_bullet(&mut self, spec: &BulletSpec) -> EntityId {
        let owner = spec.owner.and_then(|id| self.index_of(id));
        let owner_is_player = owner.is_some_and(|i| self.entities[i].is_player());
        let local_shot = owner.is_some_and(|i| self.entities[i].player().is_some_and(|p| p.index == 0));

        let id = self.next_entity_id();
        let bullet = new_bullet(id, spec, owner_is_player);
        if let Some(tank) = owner.and_then(|i| self.entities.get_mut(i)).and_then(Entity::tank_mut) {
            tank.active_bullet = Some(id);
        }

        if local_shot {
            if let Some(net) = &self.net {
                self.outbox.push(NetMessage::BulletFired(BulletFired::from_bullet(
                    &net.local_player_id,
                    &bullet,
                )));
            }
        }
        self.emit(GameEvent::sound(spec.kind.sound_name(), 0.5));
        self.insert(bullet)
    }

    /// Re-derive tank masks after the friendly-fire settings change
    pub fn apply_friendly_fire(&mut self) {
        let (players, enemies) = (
            self.settings.friendly_fire_players,
            self.settings.friendly_fire_enemies,
        );
        for entity in &mut self.entities {
            if entity.is_player() {
                entity.mask = player_mask(players);
            } else if entity.is_enemy() {
                entity.mask = enemy_mask(enemies);
            }
        }
    }

    // === Housekeeping ===

    /// Clear handles that point at dead or removed entities. Returns how
    /// many were cleared.
    pub fn reconcile_references(&mut self) -> usize {
        let live: Vec<EntityId> = self.entities.iter().filter(|e| e.alive).map(|e| e.id).collect();
        let is_live = |id: EntityId| live.binary_search(&id).is_ok();

        let mut cleared = 0;
        for entity in &mut self.entities {
            let Some(tank) = entity.tank_mut() else {
                continue;
            };
            if tank.active_bullet.is_some_and(|id| !is_live(id)) {
                tank.active_bullet = None;
                cleared += 1;
            }
            if let Some(enemy) = entity.enemy_mut() {
                if enemy.ai.target.is_some_and(|id| !is_live(id)) {
                    enemy.ai.target = None;
                    cleared += 1;
                }
            }
        }
        if cleared > 0 {
            log::debug!("Reconciled {} stale references", cleared);
        }
        cleared
    }

    /// Drop dead entities whose death has been processed. Order is kept,
    /// so the arena stays sorted by id.
    pub fn cleanup(&mut self) -> usize {
        let before = self.entities.len();
        let removed = &mut self.removed;
        self.entities.retain(|e| {
            let keep = e.alive || !e.death_handled;
            if !keep {
                removed.push(e.id);
            }
            keep
        });
        before - self.entities.len()
    }

    /// Live pickups currently on the field
    pub fn active_power_ups(&self) -> usize {
        self.entities
            .iter()
            .filter(|e| e.alive && e.power_up().is_some())
            .count()
    }

    /// Change phase and announce it
    pub fn set_phase(&mut self, phase: GamePhase) {
        if self.phase != phase {
            log::info!("Phase {:?} -> {:?} (stage {})", self.phase, phase, self.stage);
            self.phase = phase;
            self.phase_started_ms = self.now_ms;
            self.emit(GameEvent::PhaseChanged { phase });
        }
    }

    /// Start the next stage: enemies and pickups go, players stay
    pub fn advance_stage(&mut self) {
        self.stage += 1;
        self.kills = 0;
        self.spawner = SpawnDirector::new(self.stage);
        for entity in &mut self.entities {
            if entity.is_enemy() || entity.is_bullet() || entity.power_up().is_some() {
                entity.destroy();
                entity.death_handled = true;
            }
        }
        self.set_phase(GamePhase::Playing);
    }
}
