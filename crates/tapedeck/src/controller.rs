//! Playback controller.
//!
//! Every operation takes the session lock, does one read-modify-write on the chain and
//! releases the lock before returning. Out-of-range requests are clamped; nothing here
//! returns an error to the caller.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::decode::StreamFormat;
use crate::effects::MIN_SPEED;
use crate::session::{SharedChain, lock_chain};
use crate::status::StatusSnapshot;

/// Thread-safe handle for mutating playback state. Cheap to clone.
#[derive(Clone)]
pub struct Controller {
    chain: SharedChain,
    format: StreamFormat,
    finished: Arc<AtomicBool>,
}

impl Controller {
    pub(crate) fn new(chain: SharedChain, format: StreamFormat, finished: Arc<AtomicBool>) -> Self {
        Self {
            chain,
            format,
            finished,
        }
    }

    pub fn toggle_pause(&self) {
        let mut chain = lock_chain(&self.chain);
        let state = chain.state_mut();
        state.paused = !state.paused;
        tracing::debug!(paused = state.paused, "toggle pause");
    }

    /// Add `delta` to the volume exponent. No ceiling or floor.
    pub fn adjust_volume(&self, delta: f64) {
        if !delta.is_finite() {
            return;
        }
        let mut chain = lock_chain(&self.chain);
        let state = chain.state_mut();
        state.volume += delta;
        tracing::debug!(volume = state.volume, "volume");
    }

    pub fn increase_volume(&self, amount: f64) {
        self.adjust_volume(amount);
    }

    pub fn decrease_volume(&self, amount: f64) {
        self.adjust_volume(-amount);
    }

    pub fn set_silent(&self, silent: bool) {
        lock_chain(&self.chain).state_mut().silent = silent;
    }

    pub fn toggle_silent(&self) {
        let mut chain = lock_chain(&self.chain);
        let state = chain.state_mut();
        state.silent = !state.silent;
        tracing::debug!(silent = state.silent, "toggle silent");
    }

    /// Add `delta` to the speed ratio, clamping the result to at least [`MIN_SPEED`].
    pub fn adjust_speed(&self, delta: f64) {
        let mut chain = lock_chain(&self.chain);
        let state = chain.state_mut();
        let target = state.speed() + delta;
        if target.is_nan() || target == f64::INFINITY {
            tracing::debug!(delta, "ignoring speed change");
            return;
        }
        let clamped = target.max(MIN_SPEED);
        if let Err(e) = state.set_speed(clamped) {
            tracing::warn!("speed change rejected: {e}");
            return;
        }
        tracing::debug!(speed = clamped, "speed");
    }

    pub fn increase_speed(&self, ratio: f64) {
        self.adjust_speed(ratio);
    }

    pub fn decrease_speed(&self, ratio: f64) {
        self.adjust_speed(-ratio);
    }

    /// Move the play position by `delta_secs` (negative rewinds), clamped to the stream.
    pub fn seek_relative(&self, delta_secs: f64) {
        if !delta_secs.is_finite() {
            return;
        }
        let mut chain = lock_chain(&self.chain);
        let len = chain.len();
        let current = chain.position() as f64;
        let target = (current + self.format.frames_for_secs(delta_secs)).round();
        let frame = target.clamp(0.0, len as f64) as usize;
        if let Err(e) = chain.seek(frame) {
            tracing::warn!("seek failed: {e}");
            return;
        }
        tracing::debug!(frame, len, "seek");
    }

    pub fn seek_forward(&self, by: Duration) {
        self.seek_relative(by.as_secs_f64());
    }

    pub fn seek_backward(&self, by: Duration) {
        self.seek_relative(-by.as_secs_f64());
    }

    /// Consistent view of position, volume, speed and flags, taken under the lock.
    pub fn snapshot(&self) -> StatusSnapshot {
        let chain = lock_chain(&self.chain);
        let state = chain.state();
        StatusSnapshot {
            position: self.format.duration_of(chain.position()),
            length: self.format.duration_of(chain.len()),
            position_frames: chain.position(),
            volume: state.volume,
            speed: state.speed(),
            paused: state.paused,
            silent: state.silent,
            loops_remaining: state.loop_count,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Relaxed)
    }
}
