//! Per-frame simulation tick
//!
//! Advances the game state by one frame in a fixed order: players, bullets,
//! AI, physics, firing, collisions, deaths, then the throttled housekeeping
//! passes. Only the sim clock is read, so equal seeds and inputs replay
//! identically.

use super::ai::{retarget, think};
use super::bullet::update_bullet;
use super::collision::CollisionSystem;
use super::combat::{enemy_fire, laser_tick, update_flamethrower};
use super::events::{EffectKind, GameEvent};
use super::player::{Controls, LaserUpdate, PlayerStep, attempt_fire, update_laser, update_player};
use super::powerup::update_power_up;
use super::scheduler::{FramePlan, clamp_dt};
use super::spawner::{check_conditions, update_spawning};
use super::state::{GamePhase, GameState};
use super::tank::{update_movement, update_status};

/// Pause on the stage clear screen before the next stage starts
pub const STAGE_CLEAR_DELAY_MS: f64 = 7000.0;

/// Input commands for a single tick
#[derive(Debug, Clone, Default)]
pub struct TickInput {
    /// Controls per player slot; missing slots keep their last controls
    pub controls: Vec<Controls>,
}

impl TickInput {
    pub fn single(controls: Controls) -> Self {
        Self {
            controls: vec![controls],
        }
    }
}

/// Advance the game by one frame. Returns the frame's throttle plan, or
/// `None` when the frame was skipped.
pub fn tick(
    state: &mut GameState,
    collisions: &mut CollisionSystem,
    input: &TickInput,
    dt: f32,
) -> Option<FramePlan> {
    let dt = clamp_dt(dt)?;

    match state.phase {
        GamePhase::GameOver => return None,
        GamePhase::StageClear => {
            state.now_ms += dt as f64 * 1000.0;
            if state.now_ms - state.phase_started_ms >= STAGE_CLEAR_DELAY_MS {
                state.advance_stage();
            }
            return None;
        }
        GamePhase::Playing => {}
    }

    state.frame += 1;
    state.now_ms += dt as f64 * 1000.0;
    let plan = FramePlan::for_frame(state.frame, &state.settings.cadence);

    for (slot, controls) in input.controls.iter().enumerate() {
        state.set_controls(slot as u8, *controls);
    }

    update_players(state, dt);
    update_bullets(state, dt);
    update_enemies(state, &plan, dt);

    if plan.physics {
        update_physics(state, dt * state.settings.cadence.physics as f32);
    }

    handle_firing(state, collisions, &plan);

    if plan.stale_refs {
        state.reconcile_references();
    }

    for entity in &mut state.entities {
        update_power_up(entity, state.now_ms);
    }

    collisions.update(state, plan.non_critical_collisions);
    state.process_deaths();

    if plan.spawn {
        update_spawning(state, dt * state.settings.cadence.spawn as f32);
    }
    if plan.conditions {
        check_conditions(state);
    }
    if plan.cleanup {
        let removed = state.cleanup();
        if removed > 0 {
            log::debug!("Frame {}: cleaned up {} entities", state.frame, removed);
        }
    }

    Some(plan)
}

fn update_players(state: &mut GameState, dt: f32) {
    let now = state.now_ms;
    let arena = state.arena();

    for index in 0..state.entities.len() {
        let entity = &mut state.entities[index];
        if !entity.alive || !entity.is_player() {
            continue;
        }

        match update_player(entity, dt, now) {
            PlayerStep::Respawned => {
                let pos = entity.center();
                log::info!("Player {} respawned", entity.id);
                state.emit(GameEvent::effect(EffectKind::Respawn, pos));
                continue;
            }
            PlayerStep::Respawning | PlayerStep::Eliminated => continue,
            PlayerStep::Active => {}
        }
        entity.clamp_to(&arena);
    }
}

fn update_bullets(state: &mut GameState, dt: f32) {
    let arena = state.arena();
    for entity in &mut state.entities {
        if !entity.alive || !entity.is_bullet() {
            continue;
        }
        update_bullet(entity, dt);
        if entity.alive && entity.is_outside(&arena) {
            entity.destroy();
        }
    }
}

/// Status timers every frame; thinking and movement on AI frames
fn update_enemies(state: &mut GameState, plan: &FramePlan, dt: f32) {
    let now = state.now_ms;
    let arena = state.arena();
    let ai_dt = dt * state.settings.cadence.ai as f32;

    for index in 0..state.entities.len() {
        let entity = &mut state.entities[index];
        if !entity.alive || !entity.is_enemy() {
            continue;
        }

        if update_status(entity, now) {
            let pos = entity.center();
            state.emit(GameEvent::effect(EffectKind::IceBreak, pos));
        }
        if plan.retarget {
            retarget(&mut state.entities, index, &state.settings.ai);
        }
        if !plan.ai {
            continue;
        }

        think(
            &mut state.entities,
            index,
            &state.settings.ai,
            &mut state.rng,
            now,
            state.frame,
        );
        let entity = &mut state.entities[index];
        update_movement(entity);
        entity.integrate(ai_dt);
        entity.clamp_to(&arena);
    }
}

/// Walls and cars drift only if something gave them velocity
fn update_physics(state: &mut GameState, dt: f32) {
    for entity in &mut state.entities {
        if entity.alive && entity.is_wall() {
            entity.integrate(dt);
        }
    }
}

/// Player bullets and laser ticks, enemy shots and flamethrower streams
fn handle_firing(state: &mut GameState, collisions: &mut CollisionSystem, plan: &FramePlan) {
    let now = state.now_ms;

    for index in 0..state.entities.len() {
        let entity = &state.entities[index];
        if !entity.alive {
            continue;
        }

        if entity.is_player() {
            match update_laser(&mut state.entities[index], now) {
                LaserUpdate::Tick => {
                    state.emit(GameEvent::sound("laser", 0.4));
                    laser_tick(state, collisions, index);
                }
                LaserUpdate::Stopped => log::debug!("Player {} laser stopped", state.entities[index].id),
                LaserUpdate::Idle | LaserUpdate::Firing => {}
            }

            let entity = &state.entities[index];
            let slot_alive = entity
                .tank()
                .and_then(|t| t.active_bullet)
                .is_some_and(|b| state.is_alive(b));
            if let Some(spec) = attempt_fire(&mut state.entities[index], now, |_| slot_alive) {
                state.spawn_bullet(&spec);
            }
        } else if let Some(flamethrower) = entity.enemy().map(|e| e.uses_flamethrower()) {
            if flamethrower {
                if plan.ai {
                    update_flamethrower(state, index);
                }
            } else {
                enemy_fire(state, index);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::GRID_SIZE;
    use crate::settings::Settings;
    use crate::sim::enemy::EnemyType;
    use crate::sim::entity::EntityId;
    use glam::Vec2;

    const DT: f32 = 1.0 / 60.0;

    fn quiet_state(seed: u64) -> GameState {
        let mut settings = Settings::default();
        settings.ai.dodge_chance = 0.0;
        settings.max_enemies = 0;
        GameState::new(seed, settings)
    }

    fn think_frame(state: &GameState, id: EntityId) -> Option<u64> {
        state.get(id).and_then(|e| e.enemy()).map(|e| e.ai.last_think_frame)
    }

    #[test]
    fn test_ai_throttled_to_every_third_frame() {
        let mut state = quiet_state(1);
        let mut collisions = CollisionSystem::new(GRID_SIZE);
        let enemy = state.spawn_enemy(Vec2::new(300.0, 100.0), EnemyType::Basic);
        let input = TickInput::default();

        let mut thought = Vec::new();
        for _ in 0..10 {
            let before = think_frame(&state, enemy);
            tick(&mut state, &mut collisions, &input, DT);
            if think_frame(&state, enemy) != before {
                thought.push(state.frame);
            }
        }
        assert_eq!(thought, vec![3, 6, 9]);
    }

    #[test]
    fn test_tiny_frames_are_skipped() {
        let mut state = quiet_state(1);
        let mut collisions = CollisionSystem::new(GRID_SIZE);
        assert!(tick(&mut state, &mut collisions, &TickInput::default(), 0.0005).is_none());
        assert_eq!(state.frame, 0);
        assert_eq!(state.now_ms, 0.0);

        tick(&mut state, &mut collisions, &TickInput::default(), 1.0);
        assert_eq!(state.frame, 1);
        assert!((state.now_ms - 1000.0 / 15.0).abs() < 1e-3);
    }

    #[test]
    fn test_player_never_has_two_live_bullets() {
        let mut state = quiet_state(2);
        let mut collisions = CollisionSystem::new(GRID_SIZE);
        let player = state.spawn_player(Vec2::new(384.0, 500.0), 0);
        let input = TickInput::single(Controls {
            fire: true,
            ..Default::default()
        });

        let mut fired = 0;
        for _ in 0..300 {
            tick(&mut state, &mut collisions, &input, DT);
            let live = state
                .entities
                .iter()
                .filter(|e| e.alive && e.bullet().is_some_and(|b| b.owner == Some(player)))
                .count();
            assert!(live <= 1);
            let spawned: Vec<EntityId> = state.spawned.drain(..).collect();
            fired += spawned
                .iter()
                .filter(|id| state.get(**id).is_some_and(|e| e.is_bullet()))
                .count();
        }
        // Bullets fly off the top of the arena and the slot frees up
        assert!(fired >= 2);
    }

    #[test]
    fn test_bullet_leaving_arena_is_destroyed() {
        let mut state = quiet_state(3);
        let mut collisions = CollisionSystem::new(GRID_SIZE);
        let player = state.spawn_player(Vec2::new(384.0, 4.0), 0);
        let input = TickInput::single(Controls {
            fire: true,
            ..Default::default()
        });
        tick(&mut state, &mut collisions, &input, DT);
        let bullet = state.get(player).and_then(|e| e.tank()).and_then(|t| t.active_bullet);
        let bullet = bullet.expect("fired");

        for _ in 0..10 {
            tick(&mut state, &mut collisions, &TickInput::default(), DT);
        }
        assert!(!state.is_alive(bullet));
    }

    #[test]
    fn test_players_held_inside_arena() {
        let mut state = quiet_state(4);
        let mut collisions = CollisionSystem::new(GRID_SIZE);
        let player = state.spawn_player(Vec2::new(2.0, 300.0), 0);
        let input = TickInput::single(Controls {
            left: true,
            ..Default::default()
        });
        for _ in 0..30 {
            tick(&mut state, &mut collisions, &input, DT);
        }
        assert_eq!(state.get(player).map(|e| e.pos.x), Some(0.0));
    }

    #[test]
    fn test_same_seed_same_game() {
        fn run(seed: u64) -> String {
            let mut settings = Settings::default();
            settings.ai.dodge_chance = 0.2;
            let mut state = GameState::new(seed, settings);
            let mut collisions = CollisionSystem::new(GRID_SIZE);
            state.spawn_player(Vec2::new(384.0, 520.0), 0);
            state.spawn_wall(Vec2::new(300.0, 300.0), Vec2::new(200.0, 16.0), false);
            let input = TickInput::single(Controls {
                fire: true,
                left: true,
                ..Default::default()
            });
            for _ in 0..600 {
                tick(&mut state, &mut collisions, &input, DT);
            }
            serde_json::to_string(&state.entities).expect("serialize")
        }
        assert_eq!(run(42), run(42));
    }

    #[test]
    fn test_stage_clear_advances_after_delay() {
        let mut state = quiet_state(5);
        let mut collisions = CollisionSystem::new(GRID_SIZE);
        state.spawn_player(Vec2::new(384.0, 520.0), 0);
        state.kills = state.settings.enemies_to_win;

        for _ in 0..30 {
            tick(&mut state, &mut collisions, &TickInput::default(), DT);
        }
        assert_eq!(state.phase, GamePhase::StageClear);

        let frames = (STAGE_CLEAR_DELAY_MS / 1000.0 / DT as f64).ceil() as usize + 1;
        for _ in 0..frames {
            tick(&mut state, &mut collisions, &TickInput::default(), DT);
        }
        assert_eq!(state.phase, GamePhase::Playing);
        assert_eq!(state.stage, 2);
        assert_eq!(state.kills, 0);
    }

    #[test]
    fn test_frozen_enemy_thaws_with_ice_break() {
        let mut state = quiet_state(6);
        let mut collisions = CollisionSystem::new(GRID_SIZE);
        let enemy = state.spawn_enemy(Vec2::new(300.0, 100.0), EnemyType::Basic);
        if let Some(e) = state.get_mut(enemy) {
            crate::sim::freeze::apply_freeze(e, 0.0, 100.0);
        }
        for _ in 0..10 {
            tick(&mut state, &mut collisions, &TickInput::default(), DT);
        }
        assert!(state.get(enemy).and_then(|e| e.tank()).is_some_and(|t| !t.is_frozen()));
        assert!(state
            .events
            .iter()
            .any(|e| matches!(e, GameEvent::Effect { kind: EffectKind::IceBreak, .. })));
    }
}
