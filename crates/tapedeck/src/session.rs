//! Playback session context.
//!
//! A [`Session`] owns the one shared, lock-protected [`EffectChain`] plus the bits every
//! thread needs to agree on (stream format, finished flag, config). The render callback,
//! the [`Controller`] and the status reporter each get a clone of the same handle; there
//! is no process-wide state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::config::PlaybackConfig;
use crate::controller::Controller;
use crate::convert::RateConverter;
use crate::decode::{DecodedTrack, PcmStream, StreamFormat};
use crate::effects::EffectChain;
use crate::render::Renderer;

/// The single exclusion primitive shared by the render thread and all control paths.
pub type SharedChain = Arc<Mutex<EffectChain>>;

/// Lock the chain, recovering the guard if another thread panicked while holding it.
pub fn lock_chain(chain: &SharedChain) -> MutexGuard<'_, EffectChain> {
    chain.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct Session {
    chain: SharedChain,
    format: StreamFormat,
    finished: Arc<AtomicBool>,
    config: PlaybackConfig,
}

impl Session {
    pub fn new(stream: Box<dyn PcmStream>, config: PlaybackConfig) -> Self {
        let chain = EffectChain::new(stream, &config);
        Self {
            format: chain.format(),
            chain: Arc::new(Mutex::new(chain)),
            finished: Arc::new(AtomicBool::new(false)),
            config,
        }
    }

    pub fn from_track(track: DecodedTrack, config: PlaybackConfig) -> Self {
        Self::new(Box::new(track.stream), config)
    }

    pub fn format(&self) -> StreamFormat {
        self.format
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.config
    }

    pub fn chain(&self) -> &SharedChain {
        &self.chain
    }

    pub fn controller(&self) -> Controller {
        Controller::new(self.chain.clone(), self.format, self.finished.clone())
    }

    /// Build the pull side for an output with `dst_channels`, optionally converting rate.
    pub fn renderer(&self, dst_channels: usize, converter: Option<RateConverter>) -> Renderer {
        Renderer::new(
            self.chain.clone(),
            self.format.channels,
            dst_channels,
            self.config.chunk_frames,
            converter,
            self.finished.clone(),
        )
    }

    /// Whether the renderer has observed the end of the stream.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Relaxed)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        lock_chain(&self.chain).close();
    }
}
