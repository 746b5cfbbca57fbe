//! Frame driver
//!
//! A `Session` owns the game state, the collision system and the platform
//! sinks. Each frame it turns a timestamp into a clamped delta, ticks the
//! simulation, then drains what the tick produced: new and removed entities
//! go to the renderer, events to the effect sink, queued messages to the
//! network sink on network frames and a HUD snapshot to the UI on UI frames.
//!
//! A panic inside the tick or the draw call is logged and the next frame
//! carries on.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use crate::net::PlayerUpdate;
use crate::platform::{
    AssetProvider, EffectSink, HudSnapshot, NetworkSink, NullAssets, NullEffects, NullNetwork, NullRenderer,
    NullUi, RenderSink, UiSink, sprite_name,
};
use crate::sim::collision::CollisionSystem;
use crate::sim::events::GameEvent;
use crate::sim::scheduler::{FrameClock, FramePlan};
use crate::sim::state::GameState;
use crate::sim::tick::{TickInput, tick};

/// The outside world as seen by a session
#[derive(Debug, Default)]
pub struct Platform<A, R, E, N, U> {
    pub assets: A,
    pub renderer: R,
    pub effects: E,
    pub network: N,
    pub ui: U,
}

impl Platform<NullAssets, NullRenderer, NullEffects, NullNetwork, NullUi> {
    pub fn headless() -> Self {
        Self::default()
    }
}

pub struct Session<A = NullAssets, R = NullRenderer, E = NullEffects, N = NullNetwork, U = NullUi> {
    pub state: GameState,
    pub collisions: CollisionSystem,
    pub platform: Platform<A, R, E, N, U>,
    pub input: TickInput,
    clock: FrameClock,
    last_player_update: Option<PlayerUpdate>,
    /// Frames lost to a recovered panic
    pub panics: u32,
}

impl Session {
    /// Session with every sink discarding its output
    pub fn headless(state: GameState) -> Self {
        Self::new(state, Platform::headless())
    }
}

impl<A, R, E, N, U> Session<A, R, E, N, U>
where
    A: AssetProvider,
    R: RenderSink,
    E: EffectSink,
    N: NetworkSink,
    U: UiSink,
{
    pub fn new(state: GameState, platform: Platform<A, R, E, N, U>) -> Self {
        let collisions = CollisionSystem::new(state.settings.grid_size);
        let mut session = Self {
            state,
            collisions,
            platform,
            input: TickInput::default(),
            clock: FrameClock::new(),
            last_player_update: None,
            panics: 0,
        };
        // Entities placed before the session existed
        session.sync_entities();
        session
    }

    /// Run one animation frame at wall-clock time `now_ms`. The first call
    /// only primes the clock.
    pub fn frame(&mut self, now_ms: f64) -> Option<FramePlan> {
        let plan = match self.clock.advance(now_ms) {
            Some(dt) => self.step(dt),
            None => None,
        };
        self.render();
        plan
    }

    /// Tick the simulation by `dt` seconds and flush its output
    pub fn step(&mut self, dt: f32) -> Option<FramePlan> {
        let state = &mut self.state;
        let collisions = &mut self.collisions;
        let input = &self.input;
        let plan = match panic::catch_unwind(AssertUnwindSafe(|| tick(state, collisions, input, dt))) {
            Ok(plan) => plan,
            Err(payload) => {
                self.panics += 1;
                log::error!("Update panicked on frame {}: {}", self.state.frame, panic_message(&*payload));
                None
            }
        };
        self.flush(plan);
        plan
    }

    pub fn render(&mut self) {
        let renderer = &mut self.platform.renderer;
        let state = &self.state;
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| renderer.draw(state))) {
            self.panics += 1;
            log::error!("Render panicked on frame {}: {}", self.state.frame, panic_message(&*payload));
        }
    }

    /// Forget the last timestamp, e.g. after the tab was hidden
    pub fn pause_clock(&mut self) {
        self.clock.reset();
    }

    fn flush(&mut self, plan: Option<FramePlan>) {
        self.sync_entities();

        let mut phase_changed = false;
        for event in self.state.events.drain(..) {
            phase_changed |= matches!(event, GameEvent::PhaseChanged { .. });
            self.platform.effects.handle_event(&event);
        }

        let plan = plan.unwrap_or_default();
        if plan.network {
            self.flush_network();
        }
        if plan.ui || phase_changed {
            self.platform.ui.update_hud(&HudSnapshot::from_state(&self.state));
        }
    }

    /// Give new entities a sprite and tell the renderer about arrivals and
    /// departures
    fn sync_entities(&mut self) {
        for id in std::mem::take(&mut self.state.spawned) {
            let Some(index) = self.state.index_of(id) else {
                continue;
            };
            let entity = &mut self.state.entities[index];
            entity.sprite = sprite_name(entity).and_then(|name| self.platform.assets.image(name));
            self.platform.renderer.add_entity(entity);
        }
        for id in self.state.removed.drain(..) {
            self.platform.renderer.remove_entity(id);
        }
    }

    fn flush_network(&mut self) {
        let Some(net) = &self.state.net else {
            self.state.outbox.clear();
            return;
        };

        if let Some(index) = self.state.player_index(0) {
            let update = PlayerUpdate::from_player(&net.local_player_id, &self.state.entities[index]);
            let changed = self
                .last_player_update
                .as_ref()
                .is_none_or(|last| update.differs_from(last));
            if changed {
                self.platform.network.send_player_update(&update);
                self.last_player_update = Some(update);
            }
        }

        for message in self.state.outbox.drain(..) {
            self.platform.network.send(&message);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}
