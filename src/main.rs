//! Tank Combat headless runner
//!
//! Plays a scripted game without a window and logs what happened. Pass a
//! settings JSON path as the first argument to override the defaults, and a
//! seed as the second.
//!
//! Run with `RUST_LOG=info cargo run` to see the game log.

use glam::Vec2;
use tank_combat::consts::{ARENA_HEIGHT, ARENA_WIDTH, BASE_SIZE, TANK_SIZE};
use tank_combat::platform::{HudSnapshot, NullAssets, NullNetwork, NullRenderer, NullUi, RecordingEffects};
use tank_combat::session::Platform;
use tank_combat::sim::{Controls, GamePhase, GameState, TickInput};
use tank_combat::{Session, Settings};

/// Frame length the runner pretends the display refreshes at
const FRAME_MS: f64 = 1000.0 / 60.0;
/// Give up after this many frames of sim time (five minutes)
const MAX_FRAMES: u32 = 60 * 60 * 5;

fn build_stage(state: &mut GameState) {
    let center_x = ARENA_WIDTH / 2.0;

    // Base and its sandbag ring
    let base_pos = Vec2::new(center_x - BASE_SIZE / 2.0, ARENA_HEIGHT - BASE_SIZE);
    state.spawn_base(base_pos, true);
    state.spawn_wall(Vec2::new(base_pos.x - 16.0, base_pos.y - 16.0), Vec2::new(BASE_SIZE + 32.0, 16.0), true);
    state.spawn_wall(Vec2::new(base_pos.x - 16.0, base_pos.y), Vec2::new(16.0, BASE_SIZE), true);
    state.spawn_wall(Vec2::new(base_pos.x + BASE_SIZE, base_pos.y), Vec2::new(16.0, BASE_SIZE), true);

    // Mid-field cover
    state.spawn_wall(Vec2::new(200.0, 260.0), Vec2::new(120.0, 24.0), false);
    state.spawn_wall(Vec2::new(480.0, 260.0), Vec2::new(120.0, 24.0), false);
    state.spawn_car(Vec2::new(120.0, 420.0));
    state.spawn_car(Vec2::new(640.0, 420.0));
    state.spawn_decoration(Vec2::new(40.0, 40.0), Vec2::splat(24.0));

    state.spawn_player(Vec2::new(center_x - 140.0, ARENA_HEIGHT - TANK_SIZE - 8.0), 0);
}

/// Sweep left and right, firing the whole time
fn scripted_controls(frame: u32) -> Controls {
    let leg = (frame / 120) % 4;
    Controls {
        left: leg == 0,
        up: leg == 1,
        right: leg == 2,
        down: leg == 3,
        fire: true,
    }
}

fn main() {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let settings = match args.next() {
        Some(path) => Settings::load_or_default(path),
        None => Settings::default(),
    };
    let seed = args.next().and_then(|s| s.parse().ok()).unwrap_or(0x5EED);

    log::info!(
        "Tank Combat (headless) starting: seed {seed}, difficulty {}",
        settings.difficulty.as_str()
    );

    let mut state = GameState::new(seed, settings);
    build_stage(&mut state);

    let platform = Platform {
        assets: NullAssets,
        renderer: NullRenderer,
        effects: RecordingEffects::default(),
        network: NullNetwork,
        ui: NullUi,
    };
    let mut session = Session::new(state, platform);

    let mut frames = 0;
    while frames < MAX_FRAMES && session.state.phase != GamePhase::GameOver {
        session.input = TickInput::single(scripted_controls(frames));
        session.frame(frames as f64 * FRAME_MS);
        frames += 1;
    }

    let hud = HudSnapshot::from_state(&session.state);
    let effects = &session.platform.effects;
    log::info!(
        "Finished after {} frames: stage {}, score {}, lives {}, kills {}/{}, phase {:?}",
        session.state.frame,
        hud.stage,
        hud.score,
        hud.lives,
        hud.kills,
        hud.enemies_to_win,
        hud.phase
    );
    log::info!(
        "{} explosions, {} effects, {} sounds, {} recovered panics",
        effects.explosions.len(),
        effects.effects.len(),
        effects.sounds.len(),
        session.panics
    );
}
