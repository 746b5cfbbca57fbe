//! Frame throttling
//!
//! Expensive passes run on a fixed subset of frames. A pass with period `n`
//! runs when `frame % n == 0`, so with the default cadence AI runs on frames
//! 3, 6, 9 and never on 1, 2, 4 or 5.

use crate::consts::{MAX_FRAME_DT, MIN_FRAME_DT};
use crate::settings::Cadence;

/// Which throttled passes run on a given frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FramePlan {
    pub ai: bool,
    pub retarget: bool,
    pub physics: bool,
    pub non_critical_collisions: bool,
    pub stale_refs: bool,
    pub spawn: bool,
    pub conditions: bool,
    pub cleanup: bool,
    pub ui: bool,
    pub network: bool,
}

#[inline]
fn due(frame: u64, period: u64) -> bool {
    frame % period.max(1) == 0
}

impl FramePlan {
    pub fn for_frame(frame: u64, cadence: &Cadence) -> Self {
        Self {
            ai: due(frame, cadence.ai),
            retarget: due(frame, cadence.retarget),
            physics: due(frame, cadence.physics),
            non_critical_collisions: due(frame, cadence.non_critical_collisions),
            stale_refs: due(frame, cadence.stale_refs),
            spawn: due(frame, cadence.spawn),
            conditions: due(frame, cadence.conditions),
            cleanup: due(frame, cadence.cleanup),
            ui: due(frame, cadence.ui),
            network: due(frame, cadence.network),
        }
    }
}

/// Turns wall-clock timestamps into clamped frame deltas
#[derive(Debug, Clone, Default)]
pub struct FrameClock {
    last_ms: Option<f64>,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delta in seconds since the previous call, capped at 1/15 s. `None`
    /// on the first call and for frames shorter than a millisecond.
    pub fn advance(&mut self, now_ms: f64) -> Option<f32> {
        let last = self.last_ms.replace(now_ms)?;
        clamp_dt(((now_ms - last) / 1000.0) as f32)
    }

    pub fn reset(&mut self) {
        self.last_ms = None;
    }
}

/// Cap long frames and drop degenerate ones
pub fn clamp_dt(dt: f32) -> Option<f32> {
    let dt = dt.min(MAX_FRAME_DT);
    (dt >= MIN_FRAME_DT).then_some(dt)
}
