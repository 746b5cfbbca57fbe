//! Platform abstraction layer
//!
//! The simulation never touches a canvas, an audio device or a socket. The
//! session hands its output to these sinks:
//! - `AssetProvider`: resolves sprite and sound names to opaque handles
//! - `RenderSink`: entity add/remove notifications and the per-frame draw
//! - `EffectSink`: particles, explosions, screen shake and sounds
//! - `NetworkSink`: outbound peer messages
//! - `UiSink`: HUD refreshes
//!
//! `Null*` sinks discard everything; the `Recording*` sinks keep what they
//! receive for tests and headless runs.

use std::collections::BTreeMap;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::net::{BulletFired, NetMessage, PlayerUpdate};
use crate::sim::entity::{Entity, EntityId, EntityKind, WallKind};
use crate::sim::events::{EffectKind, ExplosionKind, GameEvent};
use crate::sim::state::{GamePhase, GameState};

/// Opaque image handle stored on entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ImageHandle(pub u32);

/// Opaque sound handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SoundHandle(pub u32);

pub trait AssetProvider {
    fn image(&self, name: &str) -> Option<ImageHandle>;
    fn sound(&self, name: &str) -> Option<SoundHandle>;
}

pub trait RenderSink {
    fn add_entity(&mut self, entity: &Entity);
    fn remove_entity(&mut self, id: EntityId);
    fn draw(&mut self, state: &GameState);
}

/// Extra knobs for a particle effect
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectOptions {
    pub scale: f32,
}

impl Default for EffectOptions {
    fn default() -> Self {
        Self { scale: 1.0 }
    }
}

pub trait EffectSink {
    fn create_effect(&mut self, kind: EffectKind, pos: Vec2, options: EffectOptions);
    fn create_explosion(&mut self, x: f32, y: f32, kind: ExplosionKind, scale: f32);
    fn add_screen_shake(&mut self, intensity: f32, duration_ms: f64);
    fn play_sound(&mut self, name: &str, volume: f32);

    /// Route a sim event to the matching call. Gameplay notifications with no
    /// audiovisual side are logged.
    fn handle_event(&mut self, event: &GameEvent) {
        match event {
            GameEvent::Effect { kind, pos } => self.create_effect(*kind, *pos, EffectOptions::default()),
            GameEvent::Explosion { pos, kind, scale } => self.create_explosion(pos.x, pos.y, *kind, *scale),
            GameEvent::ScreenShake {
                intensity,
                duration_ms,
            } => self.add_screen_shake(*intensity, *duration_ms),
            GameEvent::Sound { name, volume } => self.play_sound(name, *volume),
            other => log::debug!("Game event: {:?}", other),
        }
    }
}

pub trait NetworkSink {
    fn send_bullet_fired(&mut self, bullet: &BulletFired);
    fn send_enemy_killed(&mut self, enemy_id: EntityId);
    fn send_destructible_destroyed(&mut self, id: EntityId, kind: &str);
    fn send_player_update(&mut self, update: &PlayerUpdate);

    fn send_player_hit(&mut self, _player_id: &str, _damage: i32) {}

    /// Route a queued message to the matching call
    fn send(&mut self, message: &NetMessage) {
        match message {
            NetMessage::PlayerJoin(update) | NetMessage::PlayerUpdate(update) => self.send_player_update(update),
            NetMessage::BulletFired(bullet) => self.send_bullet_fired(bullet),
            NetMessage::EnemyKilled { enemy_id } => self.send_enemy_killed(*enemy_id),
            NetMessage::DestructibleDestroyed { id, kind } => self.send_destructible_destroyed(*id, kind),
            NetMessage::PlayerHit { player_id, damage } => self.send_player_hit(player_id, *damage),
        }
    }
}

pub trait UiSink {
    fn update_hud(&mut self, hud: &HudSnapshot);
}

/// What the HUD shows: the local player's lives and score plus stage progress
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HudSnapshot {
    pub stage: u32,
    pub lives: i32,
    pub score: u32,
    pub kills: u32,
    pub enemies_to_win: u32,
    pub remaining: u32,
    pub phase: GamePhase,
}

impl HudSnapshot {
    pub fn from_state(state: &GameState) -> Self {
        let player = state
            .player_index(0)
            .and_then(|i| state.entities[i].player());
        Self {
            stage: state.stage,
            lives: player.map_or(0, |p| p.lives),
            score: player.map_or(0, |p| p.score),
            kills: state.kills,
            enemies_to_win: state.settings.enemies_to_win,
            remaining: state.settings.enemies_to_win.saturating_sub(state.kills),
            phase: state.phase,
        }
    }
}

/// Asset name for an entity's sprite
pub fn sprite_name(entity: &Entity) -> Option<&'static str> {
    match &entity.kind {
        EntityKind::Tank(_) => {
            if let Some(player) = entity.player() {
                return Some(if player.index == 0 { "player1" } else { "player2" });
            }
            entity.enemy().map(|e| e.enemy_type.sprite_name())
        }
        EntityKind::Bullet(bullet) => Some(bullet.kind.sprite_name()),
        EntityKind::Wall(wall) => Some(match wall.kind {
            WallKind::Barrier => "wall_box",
            WallKind::Car => "car",
        }),
        EntityKind::Base(_) => Some("base"),
        EntityKind::PowerUp(power_up) => Some(power_up.kind.sprite_name()),
        EntityKind::Decoration => None,
    }
}

// === Name tables ===

/// In-memory asset table. Handles are handed out in registration order.
#[derive(Debug, Clone, Default)]
pub struct AssetTable {
    images: BTreeMap<String, ImageHandle>,
    sounds: BTreeMap<String, SoundHandle>,
}

impl AssetTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_image(&mut self, name: &str) -> ImageHandle {
        let next = ImageHandle(self.images.len() as u32);
        *self.images.entry(name.to_string()).or_insert(next)
    }

    pub fn register_sound(&mut self, name: &str) -> SoundHandle {
        let next = SoundHandle(self.sounds.len() as u32);
        *self.sounds.entry(name.to_string()).or_insert(next)
    }
}

impl AssetProvider for AssetTable {
    fn image(&self, name: &str) -> Option<ImageHandle> {
        self.images.get(name).copied()
    }

    fn sound(&self, name: &str) -> Option<SoundHandle> {
        self.sounds.get(name).copied()
    }
}

// === Null sinks ===

#[derive(Debug, Clone, Copy, Default)]
pub struct NullAssets;

impl AssetProvider for NullAssets {
    fn image(&self, _name: &str) -> Option<ImageHandle> {
        None
    }

    fn sound(&self, _name: &str) -> Option<SoundHandle> {
        None
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullRenderer;

impl RenderSink for NullRenderer {
    fn add_entity(&mut self, _entity: &Entity) {}
    fn remove_entity(&mut self, _id: EntityId) {}
    fn draw(&mut self, _state: &GameState) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullEffects;

impl EffectSink for NullEffects {
    fn create_effect(&mut self, _kind: EffectKind, _pos: Vec2, _options: EffectOptions) {}
    fn create_explosion(&mut self, _x: f32, _y: f32, _kind: ExplosionKind, _scale: f32) {}
    fn add_screen_shake(&mut self, _intensity: f32, _duration_ms: f64) {}
    fn play_sound(&mut self, _name: &str, _volume: f32) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullNetwork;

impl NetworkSink for NullNetwork {
    fn send_bullet_fired(&mut self, _bullet: &BulletFired) {}
    fn send_enemy_killed(&mut self, _enemy_id: EntityId) {}
    fn send_destructible_destroyed(&mut self, _id: EntityId, _kind: &str) {}
    fn send_player_update(&mut self, _update: &PlayerUpdate) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullUi;

impl UiSink for NullUi {
    fn update_hud(&mut self, _hud: &HudSnapshot) {}
}

// === Recording sinks ===

#[derive(Debug, Clone, Default)]
pub struct RecordingEffects {
    pub effects: Vec<(EffectKind, Vec2)>,
    pub explosions: Vec<(Vec2, ExplosionKind, f32)>,
    pub shakes: Vec<(f32, f64)>,
    pub sounds: Vec<String>,
}

impl EffectSink for RecordingEffects {
    fn create_effect(&mut self, kind: EffectKind, pos: Vec2, _options: EffectOptions) {
        self.effects.push((kind, pos));
    }

    fn create_explosion(&mut self, x: f32, y: f32, kind: ExplosionKind, scale: f32) {
        self.explosions.push((Vec2::new(x, y), kind, scale));
    }

    fn add_screen_shake(&mut self, intensity: f32, duration_ms: f64) {
        self.shakes.push((intensity, duration_ms));
    }

    fn play_sound(&mut self, name: &str, _volume: f32) {
        self.sounds.push(name.to_string());
    }
}

/// Keeps every message it is asked to send
#[derive(Debug, Clone, Default)]
pub struct RecordingNetwork {
    pub sent: Vec<NetMessage>,
}

impl NetworkSink for RecordingNetwork {
    fn send_bullet_fired(&mut self, bullet: &BulletFired) {
        self.sent.push(NetMessage::BulletFired(bullet.clone()));
    }

    fn send_enemy_killed(&mut self, enemy_id: EntityId) {
        self.sent.push(NetMessage::EnemyKilled { enemy_id });
    }

    fn send_destructible_destroyed(&mut self, id: EntityId, kind: &str) {
        self.sent.push(NetMessage::DestructibleDestroyed {
            id,
            kind: kind.to_string(),
        });
    }

    fn send_player_update(&mut self, update: &PlayerUpdate) {
        self.sent.push(NetMessage::PlayerUpdate(update.clone()));
    }
}

/// Tracks which entities the renderer currently knows about
#[derive(Debug, Clone, Default)]
pub struct RecordingRenderer {
    pub live: BTreeMap<EntityId, Option<ImageHandle>>,
    pub frames: u64,
}

impl RenderSink for RecordingRenderer {
    fn add_entity(&mut self, entity: &Entity) {
        self.live.insert(entity.id, entity.sprite);
    }

    fn remove_entity(&mut self, id: EntityId) {
        self.live.remove(&id);
    }

    fn draw(&mut self, _state: &GameState) {
        self.frames += 1;
    }
}

#[derive(Debug, Clone, Default)]
pub struct RecordingUi {
    pub last: Option<HudSnapshot>,
    pub updates: usize,
}

impl UiSink for RecordingUi {
    fn update_hud(&mut self, hud: &HudSnapshot) {
        self.last = Some(hud.clone());
        self.updates += 1;
    }
}
