//! Enemy waves, pickup drops and stage conditions
//!
//! The director is plain data on `GameState`. Spawning runs on the throttled
//! spawn cadence; win/lose checks run on the conditions cadence.

use glam::Vec2;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::enemy::EnemyType;
use super::entity::EntityId;
use super::powerup::PowerUpKind;
use super::state::{GamePhase, GameState};

/// Fixed spawn markers, used in order before random positions
const SPAWN_MARKERS: [Vec2; 5] = [
    Vec2::new(150.0, 150.0),
    Vec2::new(400.0, 150.0),
    Vec2::new(600.0, 150.0),
    Vec2::new(150.0, 300.0),
    Vec2::new(600.0, 300.0),
];

/// Markers filled when a stage starts
const OPENING_WAVE: usize = 3;
const MIN_SPAWN_DELAY_MS: f64 = 2000.0;
/// Keeps spawned tanks off the arena edge
const SPAWN_MARGIN: f32 = 40.0;

/// Per-stage spawn bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpawnDirector {
    pub spawn_timer_ms: f64,
    /// Only the stage boss may be on the field
    pub boss_phase: bool,
    pub next_marker: usize,
    /// Markers still owed to the opening wave
    pub opening_wave: usize,
    pub next_power_up_ms: Option<f64>,
    stage: u32,
}

impl SpawnDirector {
    pub fn new(stage: u32) -> Self {
        Self {
            spawn_timer_ms: 0.0,
            boss_phase: false,
            next_marker: 0,
            opening_wave: OPENING_WAVE,
            next_power_up_ms: None,
            stage,
        }
    }

    /// Delay between spawns; later stages spawn faster
    pub fn spawn_delay_ms(&self, base_delay_ms: f64) -> f64 {
        if self.stage <= 1 {
            base_delay_ms
        } else {
            (5000.0 - self.stage as f64 * 500.0).max(MIN_SPAWN_DELAY_MS)
        }
    }

    pub fn enemy_cap(&self, max_enemies: usize) -> usize {
        if self.boss_phase { 1 } else { max_enemies }
    }
}

/// Live enemies of one type
fn count_of(state: &GameState, enemy_type: EnemyType) -> usize {
    state
        .enemies()
        .filter(|e| e.enemy().is_some_and(|x| x.enemy_type == enemy_type))
        .count()
}

/// Pick the next enemy type for the current stage, or `None` when the
/// stage boss holds the field
pub fn choose_enemy_type(state: &mut GameState) -> Option<EnemyType> {
    use EnemyType::*;

    let progress = state.kills as f64 / state.settings.enemies_to_win.max(1) as f64;
    let bosses = count_of(state, Boss);
    let flamethrowers = count_of(state, Flamethrower);
    let flames = count_of(state, Flame);

    let pool: &[EnemyType] = match state.stage {
        1 => {
            if bosses < 2 && progress >= 0.5 && state.rng.random_bool(0.15) {
                &[Boss]
            } else {
                &[Basic, Fast, Heavy]
            }
        }
        2 => {
            if progress >= 0.8 && !state.spawner.boss_phase && flamethrowers == 0 {
                log::info!("Boss phase on stage {}", state.stage);
                state.spawner.boss_phase = true;
            }
            if state.spawner.boss_phase {
                if flamethrowers > 0 {
                    return None;
                }
                &[Flamethrower]
            } else if flames < 4 {
                &[Flame, Flame, Basic]
            } else {
                &[Basic, Fast]
            }
        }
        3 => {
            let roll: f64 = state.rng.random();
            if progress >= 0.75 && flamethrowers < 1 && roll < 0.1 {
                &[Flamethrower]
            } else if progress >= 0.5 && bosses < 1 && roll < 0.15 {
                &[Boss]
            } else {
                &[Basic, Fast, Heavy, Flame]
            }
        }
        _ => {
            if progress >= 0.8 && flamethrowers < 1 {
                state.spawner.boss_phase = true;
                &[Flamethrower]
            } else {
                &[Heavy, Heavy, Basic, Fast]
            }
        }
    };
    Some(pool[state.rng.random_range(0..pool.len())])
}

/// Where the next enemy appears: the fixed markers first, then a random
/// point in the upper half of the arena
fn next_spawn_point(state: &mut GameState) -> Vec2 {
    let arena = state.arena();
    let point = match SPAWN_MARKERS.get(state.spawner.next_marker) {
        Some(&marker) => {
            state.spawner.next_marker += 1;
            marker
        }
        None => {
            let w = arena.width();
            let half_h = arena.height() * 0.5;
            Vec2::new(
                60.0 + state.rng.random::<f32>() * (w - 120.0).max(0.0),
                40.0 + state.rng.random::<f32>() * (half_h - 80.0).max(0.0),
            )
        }
    };
    let max = (arena.max - Vec2::splat(SPAWN_MARGIN)).max(arena.min);
    point.clamp(arena.min, max)
}

/// Spawn one enemy if the stage allows it
pub fn spawn_wave_enemy(state: &mut GameState) -> Option<EntityId> {
    let enemy_type = choose_enemy_type(state)?;
    let pos = next_spawn_point(state);
    let id = state.spawn_enemy(pos, enemy_type);

    // Start hunting right away
    let index = state.index_of(id)?;
    super::ai::retarget(&mut state.entities, index, &state.settings.ai);
    log::debug!(
        "Stage {}: spawned {} ({} of {} killed)",
        state.stage,
        enemy_type.as_str(),
        state.kills,
        state.settings.enemies_to_win
    );
    Some(id)
}

/// Throttled spawn pass. `dt` is in seconds and already scaled by the
/// spawn cadence.
pub fn update_spawning(state: &mut GameState, dt: f32) {
    if state.phase != GamePhase::Playing {
        return;
    }
    // Remote peers mirror the host's enemies
    if state.net.as_ref().is_some_and(|n| !n.is_host) {
        return;
    }

    update_power_up_drops(state);

    let alive = state.enemies().count();
    state.spawner.spawn_timer_ms += dt as f64 * 1000.0;

    if state.spawner.opening_wave > 0 {
        state.spawner.opening_wave -= 1;
        if alive < state.spawner.enemy_cap(state.settings.max_enemies) {
            spawn_wave_enemy(state);
        }
        return;
    }

    if state.spawner.boss_phase && alive > 0 {
        return;
    }

    let delay = state.spawner.spawn_delay_ms(state.settings.enemy_spawn_delay_ms);
    if state.spawner.spawn_timer_ms >= delay
        && alive < state.spawner.enemy_cap(state.settings.max_enemies)
        && state.kills < state.settings.enemies_to_win
    {
        spawn_wave_enemy(state);
        state.spawner.spawn_timer_ms = 0.0;
    }
}

/// Drop a freeze or laser pickup every interval, one on the field at a time
pub fn update_power_up_drops(state: &mut GameState) -> Option<EntityId> {
    let now = state.now_ms;
    let interval = state.settings.power_up_interval_ms;
    let due = *state.spawner.next_power_up_ms.get_or_insert(now + interval);
    if now < due {
        return None;
    }
    state.spawner.next_power_up_ms = Some(now + interval);
    if state.active_power_ups() > 0 {
        return None;
    }

    let arena = state.arena();
    let pos = Vec2::new(
        60.0 + state.rng.random::<f32>() * (arena.width() - 120.0).max(0.0),
        60.0 + state.rng.random::<f32>() * (arena.height() - 120.0).max(0.0),
    );
    let kind = PowerUpKind::DROPS[state.rng.random_range(0..PowerUpKind::DROPS.len())];
    Some(state.spawn_power_up(pos, kind))
}

/// Win/lose check. Every player out of lives ends the game; enough kills
/// clear the stage.
pub fn check_conditions(state: &mut GameState) -> GamePhase {
    if state.phase != GamePhase::Playing {
        return state.phase;
    }

    let (any_players, all_out) = {
        let mut players = state.players().peekable();
        (players.peek().is_some(), players.all(|p| !p.alive))
    };
    if any_players && all_out {
        log::info!("All players defeated on stage {}", state.stage);
        state.set_phase(GamePhase::GameOver);
    } else if state.kills >= state.settings.enemies_to_win {
        log::info!("Stage {} cleared with {} kills", state.stage, state.kills);
        state.set_phase(GamePhase::StageClear);
    }
    state.phase
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::Settings;
    use crate::sim::state::NetIdentity;

    fn state() -> GameState {
        GameState::new(11, Settings::default())
    }

    #[test]
    fn test_opening_wave_uses_markers() {
        let mut state = state();
        for _ in 0..OPENING_WAVE {
            update_spawning(&mut state, 0.05);
        }
        let positions: Vec<Vec2> = state.enemies().map(|e| e.pos).collect();
        assert_eq!(positions, SPAWN_MARKERS[..OPENING_WAVE].to_vec());
    }

    #[test]
    fn test_spawning_waits_for_delay_and_cap() {
        let mut state = state();
        state.spawner.opening_wave = 0;

        update_spawning(&mut state, 1.0);
        assert_eq!(state.enemies().count(), 0);
        update_spawning(&mut state, 2.0);
        assert_eq!(state.enemies().count(), 1);
        assert_eq!(state.spawner.spawn_timer_ms, 0.0);

        state.settings.max_enemies = 1;
        update_spawning(&mut state, 5.0);
        assert_eq!(state.enemies().count(), 1);
    }

    #[test]
    fn test_no_spawns_after_enough_kills() {
        let mut state = state();
        state.spawner.opening_wave = 0;
        state.kills = state.settings.enemies_to_win;
        update_spawning(&mut state, 10.0);
        assert_eq!(state.enemies().count(), 0);
    }

    #[test]
    fn test_remote_peer_never_spawns() {
        let mut state = state();
        state.net = Some(NetIdentity {
            local_player_id: "guest".to_string(),
            is_host: false,
        });
        update_spawning(&mut state, 10.0);
        assert_eq!(state.enemies().count(), 0);
    }

    #[test]
    fn test_stage_two_boss_phase() {
        let mut state = state();
        state.stage = 2;
        state.spawner = SpawnDirector::new(2);
        state.kills = 16;

        assert_eq!(choose_enemy_type(&mut state), Some(EnemyType::Flamethrower));
        assert!(state.spawner.boss_phase);
        assert_eq!(state.spawner.enemy_cap(4), 1);

        state.spawn_enemy(Vec2::new(300.0, 100.0), EnemyType::Flamethrower);
        assert_eq!(choose_enemy_type(&mut state), None);
    }

    #[test]
    fn test_stage_one_pool_before_halfway() {
        let mut state = state();
        for _ in 0..50 {
            let t = choose_enemy_type(&mut state).expect("type");
            assert!(matches!(t, EnemyType::Basic | EnemyType::Fast | EnemyType::Heavy));
        }
    }

    #[test]
    fn test_spawn_delay_shrinks_with_stage() {
        assert_eq!(SpawnDirector::new(1).spawn_delay_ms(3000.0), 3000.0);
        assert_eq!(SpawnDirector::new(2).spawn_delay_ms(3000.0), 4000.0);
        assert_eq!(SpawnDirector::new(9).spawn_delay_ms(3000.0), MIN_SPAWN_DELAY_MS);
    }

    #[test]
    fn test_power_up_drops_one_at_a_time() {
        let mut state = state();
        assert!(update_power_up_drops(&mut state).is_none());

        state.now_ms = state.settings.power_up_interval_ms;
        let first = update_power_up_drops(&mut state);
        assert!(first.is_some());
        let kind = first.and_then(|id| state.get(id)).and_then(|e| e.power_up()).map(|p| p.kind);
        assert!(matches!(kind, Some(PowerUpKind::Freeze | PowerUpKind::Laser)));

        // Still on the field at the next interval: no second drop
        state.now_ms *= 2.0;
        assert!(update_power_up_drops(&mut state).is_none());
        assert_eq!(state.active_power_ups(), 1);
    }

    #[test]
    fn test_conditions() {
        let mut state = state();
        let player = state.spawn_player(Vec2::new(100.0, 500.0), 0);
        assert_eq!(check_conditions(&mut state), GamePhase::Playing);

        state.kills = state.settings.enemies_to_win;
        assert_eq!(check_conditions(&mut state), GamePhase::StageClear);

        let mut state2 = GameState::new(1, Settings::default());
        let p = state2.spawn_player(Vec2::new(100.0, 500.0), 0);
        if let Some(e) = state2.get_mut(p) {
            e.alive = false;
        }
        assert_eq!(check_conditions(&mut state2), GamePhase::GameOver);
        assert!(state.is_alive(player));
    }
}
