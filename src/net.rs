//! Network bridge
//!
//! Wire messages are JSON objects tagged by a camelCase `type` field, e.g.
//! `{"type":"bulletFired","playerId":"p2","x":10,"y":20,...}`. Inbound
//! messages are decoded and applied to the game state; outbound messages are
//! queued on `GameState::outbox` and flushed by the session.
//!
//! Missing fields fall back to defaults on decode. Remote players are kept as
//! plain records, never as entities, so they stay out of the collision grid.

use std::fmt;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::sim::bullet::{BulletKind, new_bullet};
use crate::sim::entity::{Direction, Entity, EntityId, Layer};
use crate::sim::events::{ExplosionKind, GameEvent};
use crate::sim::state::GameState;
use crate::sim::tank::BulletSpec;

/// Health shown for a remote player we have not heard a value for
const REMOTE_DEFAULT_HEALTH: i32 = 100;
/// Lives shown for a remote player we have not heard a value for
const REMOTE_DEFAULT_LIVES: i32 = 4;
/// Position change that warrants a new player update
const UPDATE_POSITION_THRESHOLD: f32 = 2.0;
const UPDATE_DIRECTION_THRESHOLD: f32 = 0.1;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NetVec {
    pub x: f32,
    pub y: f32,
}

impl From<Vec2> for NetVec {
    fn from(v: Vec2) -> Self {
        Self { x: v.x, y: v.y }
    }
}

impl From<NetVec> for Vec2 {
    fn from(v: NetVec) -> Self {
        Vec2::new(v.x, v.y)
    }
}

fn default_bullet_speed() -> f32 {
    crate::consts::TANK_BULLET_SPEED
}

fn default_damage() -> i32 {
    1
}

fn default_destructible_kind() -> String {
    "car".to_string()
}

/// A shot fired by some peer's local player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulletFired {
    #[serde(default)]
    pub player_id: String,
    /// Bullet center
    pub x: f32,
    pub y: f32,
    pub direction: NetVec,
    #[serde(default = "default_bullet_speed")]
    pub speed: f32,
    #[serde(default = "default_damage")]
    pub damage: i32,
}

impl BulletFired {
    pub fn from_bullet(player_id: &str, entity: &Entity) -> Self {
        let center = entity.center();
        let (direction, speed, damage) = entity
            .bullet()
            .map(|b| (b.direction, b.speed, b.damage))
            .unwrap_or((Vec2::NEG_Y, entity.speed, default_damage()));
        Self {
            player_id: player_id.to_string(),
            x: center.x,
            y: center.y,
            direction: direction.into(),
            speed,
            damage,
        }
    }
}

/// Position and status of a peer's player. Every field except the id may be
/// missing; missing fields keep their previous value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerUpdate {
    #[serde(default)]
    pub player_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f32>,
    /// Hull rotation in radians
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lives: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alive: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub respawning: Option<bool>,
}

impl PlayerUpdate {
    /// Snapshot of a local player, rounded the way it goes on the wire
    pub fn from_player(player_id: &str, entity: &Entity) -> Self {
        let round = |v: f32, scale: f32| (v * scale).round() / scale;
        let player = entity.player();
        Self {
            player_id: player_id.to_string(),
            x: Some(round(entity.pos.x, 10.0)),
            y: Some(round(entity.pos.y, 10.0)),
            direction: Some(round(entity.rotation, 100.0)),
            health: Some(entity.health),
            lives: player.map(|p| p.lives),
            alive: Some(entity.alive),
            respawning: player.map(|p| p.respawning),
        }
    }

    /// True when this update is worth sending after `last`
    pub fn differs_from(&self, last: &PlayerUpdate) -> bool {
        let moved = |a: Option<f32>, b: Option<f32>, threshold: f32| match (a, b) {
            (Some(a), Some(b)) => (a - b).abs() > threshold,
            (a, b) => a.is_some() != b.is_some(),
        };
        moved(self.x, last.x, UPDATE_POSITION_THRESHOLD)
            || moved(self.y, last.y, UPDATE_POSITION_THRESHOLD)
            || moved(self.direction, last.direction, UPDATE_DIRECTION_THRESHOLD)
            || self.health != last.health
            || self.alive != last.alive
            || self.respawning != last.respawning
    }
}

/// Visual-only record of a peer's player
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemotePlayer {
    pub id: String,
    pub pos: Vec2,
    pub rotation: f32,
    pub health: i32,
    pub lives: i32,
    pub alive: bool,
    pub respawning: bool,
    /// Sim time of the last update
    pub last_update_ms: f64,
}

impl RemotePlayer {
    fn new(id: &str, update: &PlayerUpdate, now_ms: f64) -> Self {
        Self {
            id: id.to_string(),
            pos: Vec2::new(update.x.unwrap_or(0.0), update.y.unwrap_or(0.0)),
            rotation: update.direction.unwrap_or(0.0),
            health: update.health.unwrap_or(REMOTE_DEFAULT_HEALTH),
            lives: update.lives.unwrap_or(REMOTE_DEFAULT_LIVES),
            alive: update.alive.unwrap_or(true),
            respawning: update.respawning.unwrap_or(false),
            last_update_ms: now_ms,
        }
    }

    fn apply(&mut self, update: &PlayerUpdate, now_ms: f64) {
        self.pos.x = update.x.unwrap_or(self.pos.x);
        self.pos.y = update.y.unwrap_or(self.pos.y);
        self.rotation = update.direction.unwrap_or(self.rotation);
        self.health = update.health.unwrap_or(self.health);
        self.lives = update.lives.unwrap_or(self.lives);
        self.alive = update.alive.unwrap_or(self.alive);
        self.respawning = update.respawning.unwrap_or(self.respawning);
        self.last_update_ms = now_ms;
    }
}

/// Every message exchanged between peers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NetMessage {
    PlayerJoin(PlayerUpdate),
    PlayerUpdate(PlayerUpdate),
    BulletFired(BulletFired),
    #[serde(rename_all = "camelCase")]
    EnemyKilled { enemy_id: EntityId },
    DestructibleDestroyed {
        #[serde(alias = "carId")]
        id: EntityId,
        #[serde(default = "default_destructible_kind")]
        kind: String,
    },
    #[serde(rename_all = "camelCase")]
    PlayerHit {
        player_id: String,
        #[serde(default = "default_damage")]
        damage: i32,
    },
}

/// Failure decoding or encoding a network message
#[derive(Debug)]
pub enum NetError {
    Decode(serde_json::Error),
    Encode(serde_json::Error),
}

impl fmt::Display for NetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Decode(err) => write!(f, "malformed network message: {err}"),
            Self::Encode(err) => write!(f, "failed to encode network message: {err}"),
        }
    }
}

impl std::error::Error for NetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Decode(err) | Self::Encode(err) => Some(err),
        }
    }
}

impl NetMessage {
    pub fn decode(json: &str) -> Result<Self, NetError> {
        serde_json::from_str(json).map_err(NetError::Decode)
    }

    pub fn encode(&self) -> Result<String, NetError> {
        serde_json::to_string(self).map_err(NetError::Encode)
    }
}

/// Decode an inbound message and apply it. Malformed payloads are logged and
/// leave the state untouched.
pub fn handle_message(state: &mut GameState, json: &str) -> Result<NetMessage, NetError> {
    let message = NetMessage::decode(json).inspect_err(|err| log::warn!("Ignoring {err}"))?;
    apply_message(state, &message);
    Ok(message)
}

/// Apply an already decoded message
pub fn apply_message(state: &mut GameState, message: &NetMessage) {
    match message {
        NetMessage::PlayerJoin(update) | NetMessage::PlayerUpdate(update) => {
            state.update_or_create_remote_player(&update.player_id, update);
        }
        NetMessage::BulletFired(fired) => {
            state.create_bullet_from_network(fired);
        }
        NetMessage::EnemyKilled { enemy_id } => {
            if state.get(*enemy_id).is_some_and(|e| e.alive && e.is_enemy()) {
                state.remove_remotely_destroyed(*enemy_id);
                state.kills += 1;
            }
        }
        NetMessage::DestructibleDestroyed { id, kind } => {
            if state.get(*id).is_some_and(|e| e.alive && e.is_destructible_wall()) {
                log::debug!("Peer destroyed {kind} {id}");
                state.remove_remotely_destroyed(*id);
            }
        }
        NetMessage::PlayerHit { player_id, damage } => {
            let ours = state.net.as_ref().is_some_and(|n| n.local_player_id == *player_id);
            if let Some(index) = state.player_index(0).filter(|_| ours) {
                if state.entities[index].alive {
                    state.damage(index, *damage, None);
                }
            }
        }
    }
}

impl GameState {
    /// Mirror a peer's shot. The bullet has no owner so it never collides
    /// with the shadow of the peer that fired it.
    pub fn create_bullet_from_network(&mut self, fired: &BulletFired) -> Option<EntityId> {
        if self.net.as_ref().is_some_and(|n| n.local_player_id == fired.player_id) {
            return None;
        }

        let spec = BulletSpec {
            position: Vec2::new(fired.x, fired.y),
            direction: Direction::from_vector(fired.direction.into()),
            speed: fired.speed,
            damage: fired.damage,
            owner: None,
            kind: BulletKind::Normal,
            piercing: false,
            explosion_radius: None,
            size: BulletKind::Normal.size(false),
            max_bounces: 0,
        };
        let id = self.next_entity_id();
        let mut bullet = new_bullet(id, &spec, true);
        if self.settings.friendly_fire_players {
            bullet.mask.insert(Layer::Player);
        }
        log::debug!("Network bullet {} from {}", id, fired.player_id);
        self.emit(GameEvent::sound("shoot", 0.3));
        Some(self.insert(bullet))
    }

    /// Create or refresh the shadow of a peer's player. Updates about our
    /// own player are ignored.
    pub fn update_or_create_remote_player(&mut self, player_id: &str, update: &PlayerUpdate) {
        if player_id.is_empty() || self.net.as_ref().is_some_and(|n| n.local_player_id == player_id) {
            return;
        }
        let now = self.now_ms;
        match self.remote_players.get_mut(player_id) {
            Some(remote) => remote.apply(update, now),
            None => {
                log::info!("Remote player {player_id} joined");
                self.remote_players
                    .insert(player_id.to_string(), RemotePlayer::new(player_id, update, now));
            }
        }
    }

    /// Kill an entity a peer already destroyed, without local side effects
    /// that would echo back over the network
    fn remove_remotely_destroyed(&mut self, id: EntityId) {
        let Some(entity) = self.get_mut(id) else {
            return;
        };
        let pos = entity.center();
        entity.destroy();
        entity.death_handled = true;
        self.emit(GameEvent::Explosion {
            pos,
            kind: ExplosionKind::Destroy,
            scale: 1.0,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;
    use crate::sim::enemy::EnemyType;
    use crate::sim::state::NetIdentity;

    fn networked() -> GameState {
        let mut state = GameState::new(9, Settings::default());
        state.net = Some(NetIdentity {
            local_player_id: "me".to_string(),
            is_host: true,
        });
        state
    }

    #[test]
    fn test_wire_format_is_tagged_camel_case() {
        let json = NetMessage::EnemyKilled { enemy_id: 7 }.encode().expect("encode");
        assert_eq!(json, r#"{"type":"enemyKilled","enemyId":7}"#);

        let json = r#"{"type":"bulletFired","playerId":"p2","x":10,"y":20,"direction":{"x":1,"y":0},"speed":300,"damage":2}"#;
        match NetMessage::decode(json).expect("decode") {
            NetMessage::BulletFired(b) => {
                assert_eq!(b.player_id, "p2");
                assert_eq!(b.direction, NetVec { x: 1.0, y: 0.0 });
                assert_eq!(b.damage, 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_malformed_payload_leaves_state_alone() {
        let mut state = networked();
        assert!(matches!(handle_message(&mut state, "{not json"), Err(NetError::Decode(_))));
        assert!(handle_message(&mut state, r#"{"type":"teleport"}"#).is_err());
        assert!(state.entities.is_empty());
        assert!(state.remote_players.is_empty());
    }

    #[test]
    fn test_network_bullet_has_no_owner() {
        let mut state = networked();
        let json = r#"{"type":"bulletFired","playerId":"p2","x":100,"y":100,"direction":{"x":0,"y":-1}}"#;
        handle_message(&mut state, json).expect("valid");

        let bullet = state.entities.iter().find(|e| e.is_bullet()).expect("bullet");
        assert_eq!(bullet.layer, Layer::PlayerBullet);
        assert_eq!(bullet.center(), Vec2::new(100.0, 100.0));
        let b = bullet.bullet().expect("bullet component");
        assert_eq!(b.owner, None);
        assert_eq!(b.speed, crate::consts::TANK_BULLET_SPEED);
        assert_eq!(b.damage, 1);
        assert!(!bullet.mask.contains(Layer::Player));
    }

    #[test]
    fn test_own_bullet_echo_is_ignored() {
        let mut state = networked();
        let fired = BulletFired {
            player_id: "me".to_string(),
            x: 0.0,
            y: 0.0,
            direction: NetVec { x: 1.0, y: 0.0 },
            speed: 200.0,
            damage: 1,
        };
        assert_eq!(state.create_bullet_from_network(&fired), None);
        assert!(state.entities.is_empty());
    }

    #[test]
    fn test_friendly_fire_network_bullets_hit_players() {
        let mut state = networked();
        state.settings.friendly_fire_players = true;
        let fired = BulletFired {
            player_id: "p2".to_string(),
            x: 50.0,
            y: 50.0,
            direction: NetVec { x: 0.0, y: 1.0 },
            speed: 200.0,
            damage: 1,
        };
        let id = state.create_bullet_from_network(&fired).expect("created");
        assert!(state.get(id).is_some_and(|e| e.mask.contains(Layer::Player)));
    }

    #[test]
    fn test_remote_player_defaults_and_partial_updates() {
        let mut state = networked();
        handle_message(&mut state, r#"{"type":"playerJoin","playerId":"p2","x":10,"y":20}"#).expect("join");
        let remote = &state.remote_players["p2"];
        assert_eq!(remote.pos, Vec2::new(10.0, 20.0));
        assert_eq!(remote.health, 100);
        assert_eq!(remote.lives, 4);
        assert!(remote.alive);

        handle_message(&mut state, r#"{"type":"playerUpdate","playerId":"p2","x":30,"health":50}"#)
            .expect("update");
        let remote = &state.remote_players["p2"];
        assert_eq!(remote.pos, Vec2::new(30.0, 20.0));
        assert_eq!(remote.health, 50);
        assert_eq!(remote.lives, 4);

        handle_message(&mut state, r#"{"type":"playerUpdate","playerId":"me","x":1,"y":1}"#).expect("own");
        assert!(!state.remote_players.contains_key("me"));
        assert!(state.entities.is_empty());
    }

    #[test]
    fn test_remote_enemy_kill_does_not_echo() {
        let mut state = networked();
        let enemy = state.spawn_enemy(Vec2::new(100.0, 100.0), EnemyType::Basic);
        apply_message(&mut state, &NetMessage::EnemyKilled { enemy_id: enemy });
        state.process_deaths();

        assert!(!state.is_alive(enemy));
        assert_eq!(state.kills, 1);
        assert!(state.outbox.is_empty());

        // A second notice for the same enemy changes nothing
        apply_message(&mut state, &NetMessage::EnemyKilled { enemy_id: enemy });
        assert_eq!(state.kills, 1);
    }

    #[test]
    fn test_destructible_accepts_legacy_car_id() {
        let mut state = networked();
        let car = state.spawn_car(Vec2::new(200.0, 200.0));
        let message = handle_message(&mut state, &format!(r#"{{"type":"destructibleDestroyed","carId":{car}}}"#))
            .expect("decode");
        assert_eq!(
            message,
            NetMessage::DestructibleDestroyed {
                id: car,
                kind: "car".to_string()
            }
        );
        assert!(!state.is_alive(car));
    }

    #[test]
    fn test_player_hit_only_damages_the_named_player() {
        let mut state = networked();
        let me = state.spawn_player(Vec2::new(100.0, 100.0), 0);
        let hurt = |state: &GameState| {
            state
                .events
                .iter()
                .any(|e| matches!(e, GameEvent::PlayerDown { .. }))
                || state.get(me).is_some_and(|e| e.health < e.max_health)
        };

        handle_message(&mut state, r#"{"type":"playerHit","playerId":"p2","damage":1}"#).expect("hit");
        assert!(!hurt(&state));

        handle_message(&mut state, r#"{"type":"playerHit","playerId":"me","damage":1}"#).expect("hit");
        assert!(hurt(&state));
    }

    #[test]
    fn test_player_update_change_threshold() {
        let last = PlayerUpdate {
            x: Some(100.0),
            y: Some(100.0),
            direction: Some(0.0),
            health: Some(3),
            ..Default::default()
        };
        let nudged = PlayerUpdate {
            x: Some(101.5),
            ..last.clone()
        };
        assert!(!nudged.differs_from(&last));
        let moved = PlayerUpdate {
            x: Some(103.0),
            ..last.clone()
        };
        assert!(moved.differs_from(&last));
        let hurt = PlayerUpdate {
            health: Some(2),
            ..last.clone()
        };
        assert!(hurt.differs_from(&last));
    }
}
