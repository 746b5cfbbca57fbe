//! Base simulation entity
//!
//! Every object in the arena is an `Entity`: a rectangle with velocity,
//! health, lifecycle flags and a collision layer/mask. Behaviour specific to
//! tanks, bullets, walls and pickups hangs off the `kind` tag.

use std::f32::consts::PI;
use std::fmt;

use glam::Vec2;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::aabb::Aabb;
use super::bullet::Bullet;
use super::powerup::PowerUp;
use super::tank::{Tank, TankRole};
use crate::consts::*;
use crate::platform::ImageHandle;

/// Stable entity handle. Ids grow monotonically and are never reused.
pub type EntityId = u32;

/// Collision category of an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Layer {
    Tank,
    Player,
    Enemy,
    Bullet,
    PlayerBullet,
    EnemyBullet,
    Wall,
    Base,
    #[serde(rename = "powerup")]
    PowerUp,
    Decoration,
}

impl Layer {
    pub const ALL: [Layer; 10] = [
        Layer::Tank,
        Layer::Player,
        Layer::Enemy,
        Layer::Bullet,
        Layer::PlayerBullet,
        Layer::EnemyBullet,
        Layer::Wall,
        Layer::Base,
        Layer::PowerUp,
        Layer::Decoration,
    ];

    #[inline]
    const fn bit(self) -> u16 {
        1 << (self as u16)
    }

    pub fn is_bullet(self) -> bool {
        matches!(self, Layer::Bullet | Layer::PlayerBullet | Layer::EnemyBullet)
    }
}

/// Set of layers an entity reacts to
#[derive(Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerMask(u16);

impl LayerMask {
    pub const EMPTY: LayerMask = LayerMask(0);

    pub const fn of(layers: &[Layer]) -> Self {
        let mut bits = 0u16;
        let mut i = 0;
        while i < layers.len() {
            bits |= layers[i].bit();
            i += 1;
        }
        LayerMask(bits)
    }

    #[inline]
    pub fn contains(self, layer: Layer) -> bool {
        self.0 & layer.bit() != 0
    }

    pub fn insert(&mut self, layer: Layer) {
        self.0 |= layer.bit();
    }

    pub fn remove(&mut self, layer: Layer) {
        self.0 &= !layer.bit();
    }

    pub fn set(&mut self, layer: Layer, on: bool) {
        if on {
            self.insert(layer);
        } else {
            self.remove(layer);
        }
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Layer> {
        Layer::ALL.into_iter().filter(move |l| self.contains(*l))
    }
}

impl fmt::Debug for LayerMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl FromIterator<Layer> for LayerMask {
    fn from_iter<I: IntoIterator<Item = Layer>>(iter: I) -> Self {
        let mut mask = LayerMask::EMPTY;
        for layer in iter {
            mask.insert(layer);
        }
        mask
    }
}

/// Cardinal direction (0 = up, 1 = right, 2 = down, 3 = left)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    Up,
    Right,
    Down,
    Left,
}

impl Direction {
    pub const ALL: [Direction; 4] = [Direction::Up, Direction::Right, Direction::Down, Direction::Left];

    pub fn index(self) -> u8 {
        self as u8
    }

    /// Wraps out-of-range values instead of failing
    pub fn from_index(i: u8) -> Self {
        Self::ALL[(i % 4) as usize]
    }

    /// Dominant-axis direction of a vector. The zero vector maps to `Up`.
    pub fn from_vector(v: Vec2) -> Self {
        if v.x.abs() > v.y.abs() {
            if v.x > 0.0 { Direction::Right } else { Direction::Left }
        } else if v.y > 0.0 {
            Direction::Down
        } else {
            Direction::Up
        }
    }

    /// Unit vector in screen space (y down)
    pub fn vector(self) -> Vec2 {
        match self {
            Direction::Up => Vec2::new(0.0, -1.0),
            Direction::Right => Vec2::new(1.0, 0.0),
            Direction::Down => Vec2::new(0.0, 1.0),
            Direction::Left => Vec2::new(-1.0, 0.0),
        }
    }

    /// Sprite rotation for this facing. Tank art points down at rotation 0.
    pub fn rotation(self) -> f32 {
        match self {
            Direction::Up => PI,
            Direction::Right => 3.0 * PI / 2.0,
            Direction::Down => 0.0,
            Direction::Left => PI / 2.0,
        }
    }

    pub fn opposite(self) -> Self {
        Self::from_index(self.index() + 2)
    }

    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self::ALL[rng.random_range(0..4)]
    }
}

/// Static obstacle flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WallKind {
    /// Level geometry
    Barrier,
    /// Destructible parked car
    Car,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wall {
    pub kind: WallKind,
    pub destructible: bool,
}

/// The base players defend
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Base {
    pub shield_active: bool,
    pub shield_health: i32,
    pub destroyed: bool,
}

impl Base {
    pub fn activate_shield(&mut self) {
        self.shield_active = true;
        self.shield_health = BASE_SHIELD_HEALTH;
    }

    /// Let the shield soak a hit. Returns true when the shield took it.
    pub fn absorb(&mut self, amount: i32) -> bool {
        if !self.shield_active {
            return false;
        }
        self.shield_health -= amount;
        if self.shield_health <= 0 {
            self.shield_health = 0;
            self.shield_active = false;
        }
        true
    }
}

/// Behaviour tag selecting what an entity is
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EntityKind {
    Tank(Box<Tank>),
    Bullet(Bullet),
    Wall(Wall),
    Base(Base),
    PowerUp(PowerUp),
    Decoration,
}

/// Result of applying damage to an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DamageOutcome {
    /// Dead, invulnerable or indestructible target
    Ignored,
    /// A shield soaked the hit
    Absorbed,
    /// Health dropped but the entity lives
    Damaged,
    /// A player lost a life and is respawning
    Downed,
    /// The entity was destroyed
    Killed,
}

impl DamageOutcome {
    pub fn landed(self) -> bool {
        matches!(self, DamageOutcome::Damaged | DamageOutcome::Downed | DamageOutcome::Killed)
    }
}

/// A simulated object in the arena
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    /// Top-left corner
    pub pos: Vec2,
    pub vel: Vec2,
    pub size: Vec2,
    pub rotation: f32,
    pub speed: f32,
    pub health: i32,
    pub max_health: i32,
    pub alive: bool,
    pub visible: bool,
    pub solid: bool,
    pub layer: Layer,
    pub mask: LayerMask,
    /// Velocity multiplier applied after each integration step
    pub friction: Option<f32>,
    #[serde(default)]
    pub sprite: Option<ImageHandle>,
    /// Last entity whose damage landed on this one
    #[serde(default)]
    pub last_hit_by: Option<EntityId>,
    /// Death side effects already emitted
    #[serde(skip)]
    pub(crate) death_handled: bool,
    pub kind: EntityKind,
}

impl Entity {
    pub fn new(id: EntityId, pos: Vec2, size: Vec2, layer: Layer, mask: LayerMask, kind: EntityKind) -> Self {
        Self {
            id,
            pos,
            vel: Vec2::ZERO,
            size,
            rotation: 0.0,
            speed: ENTITY_SPEED,
            health: 1,
            max_health: 1,
            alive: true,
            visible: true,
            solid: true,
            layer,
            mask,
            friction: Some(DEFAULT_FRICTION),
            sprite: None,
            last_hit_by: None,
            death_handled: false,
            kind,
        }
    }

    pub fn with_health(mut self, health: i32) -> Self {
        self.health = health;
        self.max_health = health;
        self
    }

    #[inline]
    pub fn bounds(&self) -> Aabb {
        Aabb::from_pos_size(self.pos, self.size)
    }

    #[inline]
    pub fn center(&self) -> Vec2 {
        self.pos + self.size * 0.5
    }

    pub fn set_center(&mut self, center: Vec2) {
        self.pos = center - self.size * 0.5;
    }

    pub fn distance_to(&self, other: &Entity) -> f32 {
        self.center().distance(other.center())
    }

    /// Advance position by velocity, then apply friction
    pub fn integrate(&mut self, dt: f32) {
        self.pos += self.vel * dt;
        if let Some(friction) = self.friction {
            self.vel *= friction;
        }
    }

    /// Keep the entity inside the arena rectangle
    pub fn clamp_to(&mut self, arena: &Aabb) {
        self.pos.x = self.pos.x.clamp(arena.min.x, (arena.max.x - self.size.x).max(arena.min.x));
        self.pos.y = self.pos.y.clamp(arena.min.y, (arena.max.y - self.size.y).max(arena.min.y));
    }

    /// True once the entity is completely outside the arena
    pub fn is_outside(&self, arena: &Aabb) -> bool {
        !self.bounds().intersects(arena)
    }

    pub fn heal(&mut self, amount: i32) {
        self.health = (self.health + amount).min(self.max_health);
    }

    /// Mark the entity dead. Removal happens at the next cleanup.
    pub fn destroy(&mut self) {
        self.alive = false;
        if let EntityKind::Wall(_) = self.kind {
            self.solid = false;
            self.visible = false;
        }
    }

    /// Apply damage, honouring shields, invulnerability and respawn rules
    pub fn take_damage(&mut self, amount: i32, now_ms: f64) -> DamageOutcome {
        if !self.alive || amount <= 0 {
            return DamageOutcome::Ignored;
        }

        match &mut self.kind {
            EntityKind::Tank(tank) => {
                if let TankRole::Player(player) = &tank.role {
                    if player.respawning || player.is_invulnerable(now_ms) {
                        return DamageOutcome::Ignored;
                    }
                }
                if tank.powerups.consume_shield(now_ms) {
                    return DamageOutcome::Absorbed;
                }
            }
            EntityKind::Wall(wall) if !wall.destructible => return DamageOutcome::Ignored,
            EntityKind::Base(base) => {
                if base.destroyed {
                    return DamageOutcome::Ignored;
                }
                if base.absorb(amount) {
                    return DamageOutcome::Absorbed;
                }
            }
            _ => {}
        }

        self.health -= amount;
        if self.health > 0 {
            if let Some(player) = self.player_mut() {
                player.grant_invulnerability(now_ms, HIT_INVULNERABILITY_MS);
            }
            return DamageOutcome::Damaged;
        }

        self.health = 0;
        if self.is_player() {
            super::player::start_respawn(self, now_ms);
            return DamageOutcome::Downed;
        }
        if let EntityKind::Base(base) = &mut self.kind {
            base.destroyed = true;
        }
        self.destroy();
        DamageOutcome::Killed
    }

    // === Kind accessors ===

    pub fn tank(&self) -> Option<&Tank> {
        match &self.kind {
            EntityKind::Tank(t) => Some(t),
            _ => None,
        }
    }

    pub fn tank_mut(&mut self) -> Option<&mut Tank> {
        match &mut self.kind {
            EntityKind::Tank(t) => Some(t),
            _ => None,
        }
    }

    pub fn player(&self) -> Option<&super::player::Player> {
        match &self.tank()?.role {
            TankRole::Player(p) => Some(p),
            TankRole::Enemy(_) => None,
        }
    }

    pub fn player_mut(&mut self) -> Option<&mut super::player::Player> {
        match &mut self.tank_mut()?.role {
            TankRole::Player(p) => Some(p),
            TankRole::Enemy(_) => None,
        }
    }

    pub fn enemy(&self) -> Option<&super::enemy::Enemy> {
        match &self.tank()?.role {
            TankRole::Enemy(e) => Some(e),
            TankRole::Player(_) => None,
        }
    }

    pub fn enemy_mut(&mut self) -> Option<&mut super::enemy::Enemy> {
        match &mut self.tank_mut()?.role {
            TankRole::Enemy(e) => Some(e),
            TankRole::Player(_) => None,
        }
    }

    pub fn bullet(&self) -> Option<&Bullet> {
        match &self.kind {
            EntityKind::Bullet(b) => Some(b),
            _ => None,
        }
    }

    pub fn bullet_mut(&mut self) -> Option<&mut Bullet> {
        match &mut self.kind {
            EntityKind::Bullet(b) => Some(b),
            _ => None,
        }
    }

    pub fn wall(&self) -> Option<&Wall> {
        match &self.kind {
            EntityKind::Wall(w) => Some(w),
            _ => None,
        }
    }

    pub fn power_up(&self) -> Option<&PowerUp> {
        match &self.kind {
            EntityKind::PowerUp(p) => Some(p),
            _ => None,
        }
    }

    pub fn power_up_mut(&mut self) -> Option<&mut PowerUp> {
        match &mut self.kind {
            EntityKind::PowerUp(p) => Some(p),
            _ => None,
        }
    }

    #[inline]
    pub fn is_tank(&self) -> bool {
        matches!(self.kind, EntityKind::Tank(_))
    }

    #[inline]
    pub fn is_player(&self) -> bool {
        self.player().is_some()
    }

    #[inline]
    pub fn is_enemy(&self) -> bool {
        self.enemy().is_some()
    }

    #[inline]
    pub fn is_bullet(&self) -> bool {
        matches!(self.kind, EntityKind::Bullet(_))
    }

    #[inline]
    pub fn is_wall(&self) -> bool {
        matches!(self.kind, EntityKind::Wall(_))
    }

    #[inline]
    pub fn is_base(&self) -> bool {
        matches!(self.kind, EntityKind::Base(_))
    }

    pub fn is_destructible_wall(&self) -> bool {
        matches!(&self.kind, EntityKind::Wall(w) if w.destructible)
    }

    pub fn is_car(&self) -> bool {
        matches!(&self.kind, EntityKind::Wall(w) if w.kind == WallKind::Car)
    }

    /// Tanks, bullets and bases are checked on every frame
    pub fn is_critical(&self) -> bool {
        matches!(
            self.kind,
            EntityKind::Tank(_) | EntityKind::Bullet(_) | EntityKind::Base(_)
        )
    }

    /// Player that is out of the fight (respawning)
    pub fn is_respawning(&self) -> bool {
        self.player().is_some_and(|p| p.respawning)
    }
}

/// Symmetric layer/mask filter: either side reacting is enough
#[inline]
pub fn layers_interact(a: &Entity, b: &Entity) -> bool {
    a.mask.contains(b.layer) || b.mask.contains(a.layer)
}
