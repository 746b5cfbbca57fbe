//! Enemy behaviour state machine
//!
//! AI runs against an immutable [`WorldView`] over the arena. The controller
//! is cloned out of its tank, updated, and written back afterwards so the
//! entity slice is never borrowed mutably during a query.
//!
//! States:
//! - `Patrol`: wander in a random cardinal direction
//! - `Chase`: close in along the dominant axis
//! - `Attack`: hold range and shoot when lined up
//! - `Retreat`: back off while badly hurt
//! - `Dodge`: a short random sidestep

use glam::Vec2;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::aabb::Aabb;
use super::entity::{Direction, Entity, EntityId, Layer};
use super::freeze::is_frozen;
use crate::settings::AiTuning;

const PATROL_MIN_MS: f64 = 2000.0;
const PATROL_SPREAD_MS: f64 = 3000.0;
const STRAFE_CHANCE: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AiState {
    #[default]
    Patrol,
    Chase,
    Attack,
    Retreat,
    Dodge,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiController {
    pub state: AiState,
    /// Weak handle; may point at a dead or removed entity
    pub target: Option<EntityId>,
    pub detection_range: f32,
    pub attack_range: f32,
    /// Direction the controller last asked for
    pub heading: Vec2,
    pub last_turn_ms: Option<f64>,
    pub turn_interval_ms: f64,
    pub dodge_direction: Option<Direction>,
    pub dodge_started_ms: f64,
    /// Frame of the most recent think
    #[serde(default)]
    pub last_think_frame: u64,
}

impl AiController {
    pub fn new(detection_range: f32, attack_range: f32) -> Self {
        Self {
            state: AiState::Patrol,
            target: None,
            detection_range,
            attack_range,
            heading: Vec2::ZERO,
            last_turn_ms: None,
            turn_interval_ms: PATROL_MIN_MS,
            dodge_direction: None,
            dodge_started_ms: 0.0,
            last_think_frame: 0,
        }
    }

    /// Evaluate the transition table once
    pub fn update_state<R: Rng + ?Sized>(
        &mut self,
        me: &Entity,
        target: Option<&Entity>,
        world: &WorldView,
        rng: &mut R,
        now_ms: f64,
    ) {
        let Some(target) = target.filter(|t| t.alive && !t.is_respawning()) else {
            self.state = AiState::Patrol;
            self.dodge_direction = None;
            return;
        };

        if self.state != AiState::Dodge && rng.random_bool(world.tuning.dodge_chance.clamp(0.0, 1.0)) {
            self.state = AiState::Dodge;
            self.dodge_direction = Some(Direction::random(rng));
            self.dodge_started_ms = now_ms;
            return;
        }

        let d = me.distance_to(target);
        let detection = self.detection_range;
        let attack = self.attack_range;
        let can_see = world.can_see(me, target, detection);

        let next = match self.state {
            AiState::Patrol if d <= detection * 1.5 || can_see => AiState::Chase,
            AiState::Chase if d <= attack * 1.2 || world.cardinal_line_of_sight(me, target) => AiState::Attack,
            AiState::Chase if d > detection * 2.0 && !can_see => AiState::Patrol,
            AiState::Attack if d > attack * 1.8 && !can_see => AiState::Chase,
            AiState::Attack if me.health as f32 <= me.max_health as f32 * 0.2 && d < 50.0 => AiState::Retreat,
            AiState::Retreat if d > detection * 1.2 => AiState::Patrol,
            AiState::Retreat if me.health as f32 > me.max_health as f32 * 0.5 => AiState::Chase,
            AiState::Dodge if now_ms - self.dodge_started_ms > world.tuning.dodge_duration_ms => {
                self.dodge_direction = None;
                if d <= attack { AiState::Attack } else { AiState::Chase }
            }
            state => state,
        };
        if next != self.state {
            log::trace!("Enemy {} {:?} -> {:?}", me.id, self.state, next);
            self.state = next;
        }
    }

    /// Cardinal move request for the current state
    pub fn steer<R: Rng + ?Sized>(
        &mut self,
        me: &Entity,
        target: Option<&Entity>,
        flamethrower: bool,
        rng: &mut R,
        now_ms: f64,
    ) -> Vec2 {
        let here = me.center();
        let target = target.map(Entity::center);
        let toward = |t: Vec2| Direction::from_vector(t - here).vector();
        let away = |t: Vec2| Direction::from_vector(here - t).vector();

        let dir = match (self.state, target) {
            (AiState::Patrol, _) => self.patrol(rng, now_ms),
            (AiState::Dodge, _) => self
                .dodge_direction
                .get_or_insert_with(|| Direction::random(rng))
                .vector(),
            (_, None) => Vec2::ZERO,
            (AiState::Chase, Some(t)) => toward(t),
            (AiState::Retreat, Some(t)) => away(t),
            (AiState::Attack, Some(t)) => {
                let d = here.distance(t);
                if flamethrower {
                    if d > self.attack_range * 1.2 {
                        toward(t)
                    } else if d < self.attack_range * 0.4 {
                        away(t)
                    } else {
                        Vec2::ZERO
                    }
                } else if d < self.attack_range * 0.6 {
                    away(t)
                } else if d > self.attack_range {
                    toward(t)
                } else if rng.random_bool(STRAFE_CHANCE) {
                    Direction::random(rng).vector()
                } else {
                    Vec2::ZERO
                }
            }
        };
        self.heading = dir;
        dir
    }

    fn patrol<R: Rng + ?Sized>(&mut self, rng: &mut R, now_ms: f64) -> Vec2 {
        let due = self
            .last_turn_ms
            .is_none_or(|t| now_ms - t > self.turn_interval_ms);
        if due {
            self.last_turn_ms = Some(now_ms);
            self.turn_interval_ms = PATROL_MIN_MS + rng.random::<f64>() * PATROL_SPREAD_MS;
            return Direction::random(rng).vector();
        }
        self.heading
    }
}

/// Read-only view of the arena for AI queries
pub struct WorldView<'a> {
    entities: &'a [Entity],
    pub tuning: &'a AiTuning,
}

impl<'a> WorldView<'a> {
    pub fn new(entities: &'a [Entity], tuning: &'a AiTuning) -> Self {
        Self { entities, tuning }
    }

    /// Resolve a handle. The arena is ordered by id.
    pub fn get(&self, id: EntityId) -> Option<&'a Entity> {
        let index = self.entities.binary_search_by_key(&id, |e| e.id).ok()?;
        self.entities.get(index)
    }

    pub fn entities(&self) -> &'a [Entity] {
        self.entities
    }

    fn live_walls(&self, ignore: Option<EntityId>) -> Vec<Aabb> {
        self.entities
            .iter()
            .filter(|e| e.alive && e.solid && e.is_wall() && Some(e.id) != ignore)
            .map(Entity::bounds)
            .collect()
    }

    /// Sample the segment every `los_step` units; any point inside a live
    /// wall blocks the view. `ignore` excludes one wall (a targeted car).
    pub fn line_of_sight(&self, from: Vec2, to: Vec2, ignore: Option<EntityId>) -> bool {
        let delta = to - from;
        let length = delta.length();
        let step = self.tuning.los_step.max(1.0);
        if length <= step {
            return true;
        }
        let walls = self.live_walls(ignore);
        let samples = (length / step).ceil() as usize;
        (1..samples).all(|i| {
            let p = from + delta * (i as f32 / samples as f32);
            !walls.iter().any(|w| w.contains_point(p))
        })
    }

    /// Roughly on the same row or column, with nothing in between
    pub fn cardinal_line_of_sight(&self, me: &Entity, target: &Entity) -> bool {
        let tol = self.tuning.los_tolerance;
        let delta = target.center() - me.center();
        let (dx, dy) = (delta.x.abs(), delta.y.abs());
        let aligned = (dy <= tol && dx > tol) || (dx <= tol && dy > tol);
        aligned && self.line_of_sight(me.center(), target.center(), Some(target.id))
    }

    pub fn can_see(&self, me: &Entity, target: &Entity, detection_range: f32) -> bool {
        me.distance_to(target) <= detection_range * 1.2
            && self.line_of_sight(me.center(), target.center(), Some(target.id))
    }

    /// No solid obstacle between the two centers. Bullets and decorations
    /// do not block.
    pub fn clear_shot(&self, me: &Entity, target: &Entity) -> bool {
        let (start, end) = (me.center(), target.center());
        !self.entities.iter().any(|e| {
            e.alive
                && e.solid
                && e.id != me.id
                && e.id != target.id
                && !e.layer.is_bullet()
                && e.layer != Layer::Decoration
                && e.bounds().intersects_segment(start, end)
        })
    }

    fn is_shootable(&self, me: &Entity, candidate: &Entity, attack_range: f32) -> bool {
        candidate.alive
            && !candidate.is_respawning()
            && me.distance_to(candidate) <= attack_range
            && self.cardinal_line_of_sight(me, candidate)
            && self.clear_shot(me, candidate)
    }

    /// Pick what to shoot at: the current target, then any other player,
    /// then the closest lined-up car in range.
    pub fn find_valid_target(&self, me: &Entity, ai: &AiController) -> Option<EntityId> {
        if let Some(target) = ai.target.and_then(|id| self.get(id)) {
            if target.is_player() && self.is_shootable(me, target, ai.attack_range) {
                return Some(target.id);
            }
        }

        if let Some(player) = self
            .entities
            .iter()
            .filter(|e| e.is_player() && Some(e.id) != ai.target)
            .find(|e| self.is_shootable(me, e, ai.attack_range))
        {
            return Some(player.id);
        }

        self.entities
            .iter()
            .filter(|e| e.is_car() && e.is_destructible_wall())
            .filter(|car| self.is_shootable(me, car, ai.attack_range))
            .min_by(|a, b| me.distance_to(a).total_cmp(&me.distance_to(b)))
            .map(|car| car.id)
    }

    /// Nearest live player that is not respawning
    pub fn nearest_player(&self, me: &Entity) -> Option<EntityId> {
        self.entities
            .iter()
            .filter(|e| e.alive && e.is_player() && !e.is_respawning())
            .min_by(|a, b| me.distance_to(a).total_cmp(&me.distance_to(b)))
            .map(|e| e.id)
    }
}

/// Run one AI think for the enemy at `index` and apply its move request
pub fn think<R: Rng + ?Sized>(
    entities: &mut [Entity],
    index: usize,
    tuning: &AiTuning,
    rng: &mut R,
    now_ms: f64,
    frame: u64,
) {
    let Some(me) = entities.get(index).filter(|e| e.alive) else {
        return;
    };
    let Some(enemy) = me.enemy() else {
        return;
    };
    let mut ai = enemy.ai.clone();
    let flamethrower = enemy.uses_flamethrower();
    let frozen = is_frozen(me);

    let move_dir = {
        let world = WorldView::new(entities, tuning);
        let me = &entities[index];
        let target = ai.target.and_then(|id| world.get(id));
        ai.update_state(me, target, &world, rng, now_ms);
        ai.steer(me, target, flamethrower, rng, now_ms)
    };
    ai.last_think_frame = frame;

    let me = &mut entities[index];
    if let Some(tank) = me.tank_mut() {
        if !frozen {
            tank.move_dir = move_dir;
        }
    }
    if let Some(enemy) = me.enemy_mut() {
        enemy.ai = ai;
    }
}

/// Point the enemy at the nearest eligible player
pub fn retarget(entities: &mut [Entity], index: usize, tuning: &AiTuning) {
    let target = {
        let world = WorldView::new(entities, tuning);
        match entities.get(index) {
            Some(me) if me.alive => world.nearest_player(me),
            _ => return,
        }
    };
    if let Some(enemy) = entities[index].enemy_mut() {
        enemy.ai.target = target;
    }
}

/// What an enemy wants to shoot this frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShotPlan {
    pub target: EntityId,
    /// Cardinal aim along the dominant axis
    pub facing: Direction,
    /// Exact direction to the target
    pub aim: Vec2,
}

/// Firing gate for enemies: attack state, not frozen, cooldown elapsed and a
/// valid target
pub fn plan_shot(entities: &[Entity], index: usize, tuning: &AiTuning, now_ms: f64) -> Option<ShotPlan> {
    let me = entities.get(index).filter(|e| e.alive)?;
    let enemy = me.enemy()?;
    let tank = me.tank()?;
    if is_frozen(me) || enemy.ai.state != AiState::Attack || !tank.cooldown_elapsed(now_ms) {
        return None;
    }

    let world = WorldView::new(entities, tuning);
    let target_id = world.find_valid_target(me, &enemy.ai)?;
    let target = world.get(target_id)?;
    let delta = target.center() - me.center();
    Some(ShotPlan {
        target: target_id,
        facing: Direction::from_vector(delta),
        aim: delta.normalize_or(Vec2::X),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::enemy::{EnemyType, spawn_enemy};
    use crate::sim::entity::{EntityKind, LayerMask, Wall, WallKind};
    use crate::sim::player::spawn_player;
    use crate::sim::powerup::{PowerUpKind, new_power_up};
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    fn tuning() -> AiTuning {
        AiTuning {
            dodge_chance: 0.0,
            ..AiTuning::default()
        }
    }

    fn wall(id: EntityId, x: f32, y: f32) -> Entity {
        Entity::new(
            id,
            Vec2::new(x, y),
            Vec2::splat(32.0),
            Layer::Wall,
            LayerMask::of(&[Layer::Tank, Layer::Bullet]),
            EntityKind::Wall(Wall {
                kind: WallKind::Barrier,
                destructible: false,
            }),
        )
    }

    fn state_of(e: &Entity) -> AiState {
        e.enemy().map(|e| e.ai.state).unwrap_or_default()
    }

    fn set_target(e: &mut Entity, target: EntityId, state: AiState) {
        if let Some(enemy) = e.enemy_mut() {
            enemy.ai.target = Some(target);
            enemy.ai.state = state;
        }
    }

    #[test]
    fn test_patrol_to_chase_when_close() {
        let tuning = tuning();
        let mut rng = Pcg32::seed_from_u64(1);
        let mut enemy = spawn_enemy(1, Vec2::new(100.0, 100.0), EnemyType::Basic);
        let player = spawn_player(2, Vec2::new(350.0, 100.0), 0);
        set_target(&mut enemy, 2, AiState::Patrol);

        let mut entities = vec![enemy, player];
        think(&mut entities, 0, &tuning, &mut rng, 0.0, 3);
        // 250 units away, detection 200 * 1.5 = 300
        assert_eq!(state_of(&entities[0]), AiState::Chase);
        assert_eq!(entities[0].enemy().map(|e| e.ai.last_think_frame), Some(3));
    }

    #[test]
    fn test_far_hidden_target_returns_to_patrol() {
        let tuning = tuning();
        let mut rng = Pcg32::seed_from_u64(1);
        let mut enemy = spawn_enemy(1, Vec2::new(0.0, 0.0), EnemyType::Basic);
        let player = spawn_player(3, Vec2::new(600.0, 0.0), 0);
        set_target(&mut enemy, 3, AiState::Chase);
        // Wall on the line between them
        let mut entities = vec![enemy, wall(2, 300.0, 0.0), player];

        think(&mut entities, 0, &tuning, &mut rng, 0.0, 3);
        assert_eq!(state_of(&entities[0]), AiState::Patrol);
    }

    #[test]
    fn test_missing_target_forces_patrol() {
        let tuning = tuning();
        let mut rng = Pcg32::seed_from_u64(1);
        let mut enemy = spawn_enemy(1, Vec2::ZERO, EnemyType::Basic);
        set_target(&mut enemy, 42, AiState::Attack);
        let mut entities = vec![enemy];

        think(&mut entities, 0, &tuning, &mut rng, 0.0, 3);
        assert_eq!(state_of(&entities[0]), AiState::Patrol);
    }

    #[test]
    fn test_chase_moves_along_dominant_axis() {
        let tuning = tuning();
        let mut rng = Pcg32::seed_from_u64(1);
        let mut enemy = spawn_enemy(1, Vec2::new(100.0, 100.0), EnemyType::Basic);
        // Far enough to stay in chase, offset mostly on x
        let player = spawn_player(2, Vec2::new(400.0, 150.0), 0);
        set_target(&mut enemy, 2, AiState::Chase);
        let mut entities = vec![enemy, player];

        think(&mut entities, 0, &tuning, &mut rng, 0.0, 3);
        assert_eq!(state_of(&entities[0]), AiState::Chase);
        assert_eq!(entities[0].tank().map(|t| t.move_dir), Some(Vec2::X));
    }

    #[test]
    fn test_line_of_sight_blocked_by_wall() {
        let tuning = tuning();
        let entities = vec![wall(1, 100.0, 0.0)];
        let world = WorldView::new(&entities, &tuning);
        assert!(!world.line_of_sight(Vec2::new(0.0, 16.0), Vec2::new(300.0, 16.0), None));
        assert!(world.line_of_sight(Vec2::new(0.0, 100.0), Vec2::new(300.0, 100.0), None));
        // Ignoring the wall clears the view
        assert!(world.line_of_sight(Vec2::new(0.0, 16.0), Vec2::new(300.0, 16.0), Some(1)));
    }

    #[test]
    fn test_cardinal_line_of_sight_tolerance() {
        let tuning = tuning();
        let me = spawn_enemy(1, Vec2::new(0.0, 0.0), EnemyType::Basic);
        let aligned = spawn_player(2, Vec2::new(150.0, 10.0), 0);
        let diagonal = spawn_player(3, Vec2::new(150.0, 60.0), 1);
        let entities = vec![me.clone(), aligned.clone(), diagonal.clone()];
        let world = WorldView::new(&entities, &tuning);

        assert!(world.cardinal_line_of_sight(&me, &aligned));
        assert!(!world.cardinal_line_of_sight(&me, &diagonal));
    }

    #[test]
    fn test_clear_shot_ignores_bullets_but_not_walls() {
        let tuning = tuning();
        let me = spawn_enemy(1, Vec2::new(0.0, 0.0), EnemyType::Basic);
        let target = spawn_player(3, Vec2::new(200.0, 0.0), 0);
        let entities = vec![me.clone(), wall(2, 100.0, 0.0), target.clone()];
        let world = WorldView::new(&entities, &tuning);
        assert!(!world.clear_shot(&me, &target));

        let entities = vec![me.clone(), target.clone()];
        let world = WorldView::new(&entities, &tuning);
        assert!(world.clear_shot(&me, &target));
    }

    #[test]
    fn test_plan_shot_requires_attack_state() {
        let tuning = tuning();
        let mut enemy = spawn_enemy(1, Vec2::new(100.0, 100.0), EnemyType::Basic);
        let player = spawn_player(2, Vec2::new(220.0, 100.0), 0);
        set_target(&mut enemy, 2, AiState::Chase);
        let mut entities = vec![enemy, player];
        assert_eq!(plan_shot(&entities, 0, &tuning, 5000.0), None);

        set_target(&mut entities[0], 2, AiState::Attack);
        let plan = plan_shot(&entities, 0, &tuning, 5000.0).expect("lined up shot");
        assert_eq!(plan.target, 2);
        assert_eq!(plan.facing, Direction::Right);
    }

    fn car(id: EntityId, x: f32, y: f32) -> Entity {
        Entity::new(
            id,
            Vec2::new(x, y),
            Vec2::splat(32.0),
            Layer::Wall,
            LayerMask::of(&[Layer::Tank, Layer::Bullet]),
            EntityKind::Wall(Wall {
                kind: WallKind::Car,
                destructible: true,
            }),
        )
    }

    #[test]
    fn test_plan_shot_skips_diagonal_car() {
        let tuning = tuning();
        let mut enemy = spawn_enemy(1, Vec2::new(100.0, 100.0), EnemyType::Basic);
        if let Some(e) = enemy.enemy_mut() {
            e.ai.state = AiState::Attack;
        }
        let entities = vec![enemy, car(2, 180.0, 180.0)];
        assert_eq!(plan_shot(&entities, 0, &tuning, 5000.0), None);
    }

    #[test]
    fn test_plan_shot_takes_aligned_car() {
        let tuning = tuning();
        let mut enemy = spawn_enemy(1, Vec2::new(100.0, 100.0), EnemyType::Basic);
        if let Some(e) = enemy.enemy_mut() {
            e.ai.state = AiState::Attack;
        }
        let entities = vec![enemy.clone(), car(3, 200.0, 100.0)];
        let plan = plan_shot(&entities, 0, &tuning, 5000.0).expect("car in line");
        assert_eq!(plan.target, 3);
        assert_eq!(plan.facing, Direction::Right);

        // A wall between them spoils the shot
        let entities = vec![enemy, wall(2, 150.0, 100.0), car(3, 230.0, 100.0)];
        assert_eq!(plan_shot(&entities, 0, &tuning, 5000.0), None);
    }

    #[test]
    fn test_pickups_block_a_clear_shot() {
        let tuning = tuning();
        let me = spawn_enemy(1, Vec2::new(0.0, 0.0), EnemyType::Basic);
        let target = spawn_player(3, Vec2::new(200.0, 0.0), 0);
        let pickup = new_power_up(2, Vec2::new(100.0, 4.0), PowerUpKind::Freeze, 0.0);
        assert!(pickup.solid);
        let entities = vec![me.clone(), pickup, target.clone()];
        let world = WorldView::new(&entities, &tuning);
        assert!(!world.clear_shot(&me, &target));
    }

    #[test]
    fn test_retarget_picks_nearest_player() {
        let tuning = tuning();
        let enemy = spawn_enemy(1, Vec2::new(0.0, 0.0), EnemyType::Basic);
        let far = spawn_player(2, Vec2::new(500.0, 0.0), 0);
        let near = spawn_player(3, Vec2::new(100.0, 0.0), 1);
        let mut entities = vec![enemy, far, near];

        retarget(&mut entities, 0, &tuning);
        assert_eq!(entities[0].enemy().and_then(|e| e.ai.target), Some(3));
    }

    #[test]
    fn test_dodge_expires_into_attack_or_chase() {
        let tuning = tuning();
        let mut rng = Pcg32::seed_from_u64(9);
        let mut enemy = spawn_enemy(1, Vec2::new(100.0, 100.0), EnemyType::Basic);
        let player = spawn_player(2, Vec2::new(200.0, 100.0), 0);
        set_target(&mut enemy, 2, AiState::Dodge);
        if let Some(e) = enemy.enemy_mut() {
            e.ai.dodge_started_ms = 0.0;
            e.ai.dodge_direction = Some(Direction::Left);
        }
        let mut entities = vec![enemy, player];

        think(&mut entities, 0, &tuning, &mut rng, 500.0, 3);
        assert_eq!(state_of(&entities[0]), AiState::Dodge);
        assert_eq!(entities[0].tank().map(|t| t.move_dir), Some(Vec2::NEG_X));

        think(&mut entities, 0, &tuning, &mut rng, 1001.0, 6);
        assert_eq!(state_of(&entities[0]), AiState::Attack);
    }
}
