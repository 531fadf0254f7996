//! Render side of the session: what the output callback runs.
//!
//! The renderer:
//! - pulls fixed-size blocks from the effect chain, holding the session lock only for the pull
//! - optionally converts to the device rate
//! - applies basic channel mapping (mono↔stereo, best-effort otherwise)
//! - pads with silence once the chain is exhausted and raises the session's finished flag

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::convert::RateConverter;
use crate::session::{SharedChain, lock_chain};

pub struct Renderer {
    chain: SharedChain,
    src_channels: usize,
    dst_channels: usize,
    refill_frames: usize,
    converter: Option<RateConverter>,
    finished: Arc<AtomicBool>,
    /// Interleaved source-channel frames waiting to be written.
    pending: Vec<f32>,
    pos: usize,
}

impl Renderer {
    pub(crate) fn new(
        chain: SharedChain,
        src_channels: usize,
        dst_channels: usize,
        refill_frames: usize,
        converter: Option<RateConverter>,
        finished: Arc<AtomicBool>,
    ) -> Self {
        Self {
            chain,
            src_channels: src_channels.max(1),
            dst_channels: dst_channels.max(1),
            refill_frames: refill_frames.max(1),
            converter,
            finished,
            pending: Vec::new(),
            pos: 0,
        }
    }

    /// Fill one device buffer of interleaved `dst_channels` samples.
    ///
    /// Returns the number of frames that carried audio; the rest is silence.
    pub fn render(&mut self, data: &mut [f32]) -> usize {
        let dst = self.dst_channels;
        let frames = data.len() / dst;
        let mut filled = 0;

        for frame in 0..frames {
            if self.pos >= self.pending.len() && !self.refill() {
                data[frame * dst..].fill(0.0);
                break;
            }
            for ch in 0..dst {
                data[frame * dst + ch] = self.next_sample_mapped(ch);
            }
            self.pos += self.src_channels;
            filled += 1;
        }
        filled
    }

    /// Pull the next block into `pending`. Returns `false` while the chain is exhausted.
    fn refill(&mut self) -> bool {
        self.pending.clear();
        self.pos = 0;

        let chain = &self.chain;
        let produced = match self.converter.as_mut() {
            None => {
                self.pending.resize(self.refill_frames * self.src_channels, 0.0);
                let n = lock_chain(chain).stream(&mut self.pending);
                self.pending.truncate(n * self.src_channels);
                n
            }
            Some(conv) => {
                match conv.process(|buf| lock_chain(chain).stream(buf), &mut self.pending) {
                    Ok(n) => n,
                    Err(e) => {
                        tracing::warn!("rate conversion failed: {e:#}");
                        0
                    }
                }
            }
        };

        let was_finished = self.finished.swap(produced == 0, Ordering::Relaxed);
        if produced == 0 && !was_finished {
            tracing::info!("playback reached end of stream");
        }
        produced > 0
    }

    /// Read one output sample for `dst_ch` from the current pending frame.
    ///
    /// Mapping rules:
    /// - mono → stereo: duplicate channel 0
    /// - stereo → mono: average L/R
    /// - stereo → stereo: pass-through
    /// - other layouts: clamp to the available channels
    fn next_sample_mapped(&self, dst_ch: usize) -> f32 {
        let frame_start = self.pos;
        let get_src = |ch: usize| -> f32 {
            if ch < self.src_channels {
                self.pending.get(frame_start + ch).copied().unwrap_or(0.0)
            } else {
                0.0
            }
        };

        match (self.src_channels, self.dst_channels) {
            (1, 1) => get_src(0),
            (2, 2) => get_src(dst_ch.min(1)),
            (2, 1) => 0.5 * (get_src(0) + get_src(1)),
            (1, 2) => get_src(0),
            _ => get_src(dst_ch.min(self.src_channels.saturating_sub(1))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::config::PlaybackConfig;
    use crate::decode::BufferedStream;
    use crate::session::Session;

    fn session(samples: Vec<f32>, channels: usize, loop_count: i64) -> Session {
        Session::new(
            Box::new(BufferedStream::from_interleaved(samples, channels, 1_000)),
            PlaybackConfig {
                loop_count,
                chunk_frames: 4,
                ..PlaybackConfig::default()
            },
        )
    }

    #[test]
    fn mono_is_duplicated_to_stereo() {
        let s = session(vec![0.1, 0.2, 0.3], 1, 0);
        let mut r = s.renderer(2, None);
        let mut data = [9.0f32; 6];
        assert_eq!(r.render(&mut data), 3);
        assert_eq!(data, [0.1, 0.1, 0.2, 0.2, 0.3, 0.3]);
    }

    #[test]
    fn stereo_is_averaged_to_mono() {
        let s = session(vec![0.2, 0.4, 1.0, 0.0], 2, 0);
        let mut r = s.renderer(1, None);
        let mut data = [9.0f32; 2];
        assert_eq!(r.render(&mut data), 2);
        assert!((data[0] - 0.3).abs() < 1e-6);
        assert!((data[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn exhaustion_pads_silence_and_sets_finished() {
        let s = session(vec![0.5; 6], 1, 0);
        let mut r = s.renderer(1, None);
        let mut data = [9.0f32; 10];
        assert_eq!(r.render(&mut data), 6);
        assert_eq!(&data[6..], &[0.0; 4]);
        assert!(s.is_finished());
        assert!(s.controller().is_finished());
        assert_eq!(r.render(&mut data), 0);
        assert!(data.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn looping_render_never_finishes() {
        let s = session((0..10).map(|v| v as f32).collect(), 1, -1);
        let mut r = s.renderer(1, None);
        let mut data = [0.0f32; 7];
        for _ in 0..50 {
            assert_eq!(r.render(&mut data), 7);
        }
        assert!(!s.is_finished());
    }

    #[test]
    fn render_thread_and_controller_share_one_lock() {
        let s = session(vec![0.25; 20_000], 2, -1);
        let ctl = s.controller();
        let mut r = s.renderer(2, None);
        let stop = Arc::new(AtomicBool::new(false));
        let stop_render = stop.clone();

        let render = thread::spawn(move || {
            let mut data = vec![0.0f32; 256];
            let mut blocks = 0usize;
            while !stop_render.load(Ordering::Relaxed) {
                r.render(&mut data);
                blocks += 1;
            }
            blocks
        });

        for _ in 0..200 {
            ctl.toggle_pause();
            ctl.adjust_volume(0.01);
            ctl.adjust_speed(0.001);
            ctl.seek_relative(-0.001);
        }
        thread::sleep(Duration::from_millis(10));
        stop.store(true, Ordering::Relaxed);
        assert!(render.join().unwrap() > 0);

        let snap = ctl.snapshot();
        assert!(!snap.paused);
        assert!((snap.volume - 2.0).abs() < 1e-9);
        assert!((snap.speed - 1.2).abs() < 1e-9);
    }
}
