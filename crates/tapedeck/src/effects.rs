//! Effect chain.
//!
//! One pull (`EffectChain::stream`) runs the stages innermost to outermost:
//! - **loop**: rewinds the PCM stream when it runs out, until the loop budget is spent
//! - **pause gate**: emits silence without reading the stream while paused
//! - **volume**: scales by `base^volume`, or zeroes everything when `silent`
//! - **speed**: Lagrange interpolation that advances the input cursor by `speed` per output frame
//!
//! The chain is not synchronized on its own. It lives behind the session lock and every
//! reader or writer (render callback, controller, status reporter) goes through that lock.

use crate::config::PlaybackConfig;
use crate::decode::{PcmStream, StreamFormat};
use crate::error::{PlayerError, Result};

/// Smallest speed ratio the controller will clamp to.
pub const MIN_SPEED: f64 = 0.01;

/// Upper bound on frames requested from the inner stages in one refill.
const MAX_REFILL_FRAMES: usize = 16_384;

/// Mutable playback parameters read by the stages on every pull.
#[derive(Clone, Debug, PartialEq)]
pub struct ChainState {
    /// Pause gate: silence without consuming input.
    pub paused: bool,
    /// Volume exponent; gain is `base^volume`. Zero is unity gain.
    pub volume: f64,
    /// Mute switch, independent of `volume`.
    pub silent: bool,
    /// Remaining restarts when the stream ends (-1 = forever).
    pub loop_count: i64,
    speed: f64,
}

impl ChainState {
    pub fn new(cfg: &PlaybackConfig) -> Self {
        let speed = if cfg.initial_speed.is_finite() && cfg.initial_speed > 0.0 {
            cfg.initial_speed
        } else {
            tracing::warn!(speed = cfg.initial_speed, "invalid initial speed, using 1.0");
            1.0
        };
        Self {
            paused: false,
            volume: cfg.initial_volume,
            silent: false,
            loop_count: cfg.loop_count,
            speed,
        }
    }

    /// Current speed ratio (always `> 0`).
    pub fn speed(&self) -> f64 {
        self.speed
    }

    /// Set the speed ratio, rejecting non-positive or non-finite values.
    pub fn set_speed(&mut self, speed: f64) -> Result<()> {
        if !(speed.is_finite() && speed > 0.0) {
            return Err(PlayerError::InvalidSpeed(speed));
        }
        self.speed = speed;
        Ok(())
    }
}

/// The full loop → pause → volume → speed pipeline over one PCM stream.
pub struct EffectChain {
    stream: Box<dyn PcmStream>,
    format: StreamFormat,
    state: ChainState,
    volume_base: f64,
    speed: SpeedStage,
}

impl EffectChain {
    pub fn new(stream: Box<dyn PcmStream>, cfg: &PlaybackConfig) -> Self {
        let format = stream.format();
        Self {
            speed: SpeedStage::new(format.channels, cfg.resample_quality),
            stream,
            format,
            state: ChainState::new(cfg),
            volume_base: cfg.volume_base,
        }
    }

    pub fn format(&self) -> StreamFormat {
        self.format
    }

    pub fn state(&self) -> &ChainState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut ChainState {
        &mut self.state
    }

    /// Read position of the underlying stream, in frames.
    pub fn position(&self) -> usize {
        self.stream.position()
    }

    /// Stream length in frames.
    pub fn len(&self) -> usize {
        self.stream.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stream.is_empty()
    }

    /// Seek the underlying stream and drop any input the speed stage had buffered.
    pub fn seek(&mut self, frame: usize) -> Result<()> {
        self.stream.seek(frame)?;
        self.speed.reset();
        Ok(())
    }

    /// True once the loop budget is spent and every buffered frame has been emitted.
    pub fn is_exhausted(&self) -> bool {
        self.speed.drained()
    }

    /// Fill `out` with interleaved frames and return the number of frames written.
    ///
    /// Returns fewer frames than requested only when the stream is exhausted; the caller
    /// is responsible for silencing the remainder.
    pub fn stream(&mut self, out: &mut [f32]) -> usize {
        let ratio = self.state.speed();
        let mut source = LoopedSource {
            stream: self.stream.as_mut(),
            state: &mut self.state,
            volume_base: self.volume_base,
        };
        self.speed.process(ratio, out, &mut source)
    }

    pub fn close(&mut self) {
        self.stream.close();
        self.speed.reset();
    }
}

/// Input side of the speed stage.
trait FrameSource {
    /// Fill `out` with whole frames and return how many were written. Zero means done.
    fn pull(&mut self, out: &mut [f32]) -> usize;

    /// Advance past `frames` frames without producing them. Returns how many were skipped.
    fn skip(&mut self, frames: usize) -> usize;
}

/// Loop stage and pause gate over the PCM stream, followed by the volume stage.
struct LoopedSource<'a> {
    stream: &'a mut dyn PcmStream,
    state: &'a mut ChainState,
    volume_base: f64,
}

impl FrameSource for LoopedSource<'_> {
    fn pull(&mut self, out: &mut [f32]) -> usize {
        let ch = self.stream.format().channels;
        if self.state.paused {
            out.fill(0.0);
            return out.len() / ch;
        }
        let frames = read_looped(self.stream, &mut self.state.loop_count, out);
        apply_volume(self.state, self.volume_base, &mut out[..frames * ch]);
        frames
    }

    fn skip(&mut self, frames: usize) -> usize {
        if self.state.paused {
            return frames;
        }
        skip_looped(self.stream, &mut self.state.loop_count, frames)
    }
}

/// Read from `stream`, rewinding to frame 0 while `loops` allows it.
fn read_looped(stream: &mut dyn PcmStream, loops: &mut i64, out: &mut [f32]) -> usize {
    let ch = stream.format().channels;
    let want = out.len() / ch;
    let mut filled = 0;
    while filled < want {
        let n = stream.read(&mut out[filled * ch..want * ch]);
        filled += n;
        if n > 0 {
            continue;
        }
        if *loops == 0 || stream.is_empty() {
            break;
        }
        if let Err(e) = stream.seek(0) {
            tracing::warn!("loop rewind failed: {e}");
            break;
        }
        if *loops > 0 {
            *loops -= 1;
        }
    }
    filled
}

/// Seek `frames` ahead with the same wrap rules as [`read_looped`].
///
/// Whole passes over the track are jumped arithmetically, so the cost does not depend
/// on the distance.
fn skip_looped(stream: &mut dyn PcmStream, loops: &mut i64, frames: usize) -> usize {
    let len = stream.len();
    let mut remaining = frames;
    loop {
        let pos = stream.position().min(len);
        let avail = len - pos;
        let step = remaining.min(avail);
        if let Err(e) = stream.seek(pos + step) {
            tracing::warn!("skip failed: {e}");
            return frames - remaining;
        }
        remaining -= step;
        if remaining == 0 || *loops == 0 || len == 0 {
            return frames - remaining;
        }

        // Passes that would end exactly on another wrap are dropped without seeking.
        let passes = (remaining - 1) / len;
        let passes = if *loops < 0 {
            passes
        } else {
            passes.min(usize::try_from(*loops - 1).unwrap_or(usize::MAX))
        };
        remaining -= passes * len;
        if *loops > 0 {
            *loops -= passes as i64;
        }

        if let Err(e) = stream.seek(0) {
            tracing::warn!("loop rewind failed: {e}");
            return frames - remaining;
        }
        if *loops > 0 {
            *loops -= 1;
        }
    }
}

fn apply_volume(state: &ChainState, base: f64, samples: &mut [f32]) {
    if state.silent {
        samples.fill(0.0);
        return;
    }
    let gain = base.powf(state.volume) as f32;
    if gain != 1.0 {
        for s in samples {
            *s *= gain;
        }
    }
}

/// Variable-ratio interpolating resampler.
///
/// `history` holds buffered input frames; `cursor` is the fractional input position
/// relative to `history[0]`. Frames outside the buffer read as zero.
struct SpeedStage {
    channels: usize,
    quality: usize,
    history: Vec<f32>,
    cursor: f64,
    exhausted: bool,
    chunk: Vec<f32>,
    weights: Vec<f64>,
}

impl SpeedStage {
    fn new(channels: usize, quality: usize) -> Self {
        let quality = quality.max(1);
        Self {
            channels: channels.max(1),
            quality,
            history: Vec::new(),
            cursor: 0.0,
            exhausted: false,
            chunk: Vec::new(),
            weights: vec![0.0; 2 * quality],
        }
    }

    fn reset(&mut self) {
        self.history.clear();
        self.cursor = 0.0;
        self.exhausted = false;
    }

    fn buffered_frames(&self) -> usize {
        self.history.len() / self.channels
    }

    fn drained(&self) -> bool {
        self.exhausted && self.cursor >= self.buffered_frames() as f64
    }

    fn process(&mut self, speed: f64, out: &mut [f32], source: &mut impl FrameSource) -> usize {
        let ch = self.channels;
        let q = self.quality as isize;
        let frames_out = out.len() / ch;
        let mut written = 0;

        while written < frames_out {
            if self.drained() {
                break;
            }
            let lead = self.cursor.floor() - self.buffered_frames() as f64;
            if lead > (self.quality + MAX_REFILL_FRAMES) as f64 && !self.exhausted {
                self.skip_to_cursor(lead, source);
                continue;
            }

            let base = self.cursor.floor() as isize;
            let needed = (base + q + 1).max(0) as usize;
            if self.buffered_frames() < needed && !self.exhausted {
                self.refill(frames_out - written, speed, source);
                continue;
            }

            let frac = self.cursor - base as f64;
            let dst = &mut out[written * ch..(written + 1) * ch];
            if frac == 0.0 {
                for (c, d) in dst.iter_mut().enumerate() {
                    *d = self.sample(base, c);
                }
            } else {
                self.compute_weights(base);
                for (c, d) in dst.iter_mut().enumerate() {
                    let mut acc = 0.0f64;
                    for (k, w) in self.weights.iter().enumerate() {
                        acc += w * self.sample(base - q + 1 + k as isize, c) as f64;
                    }
                    *d = acc as f32;
                }
            }

            written += 1;
            self.cursor += speed;
        }

        self.discard_consumed();
        written
    }

    /// Pull enough input to cover the interpolation window at the cursor, plus lookahead
    /// for the rest of the request at the current speed.
    fn refill(&mut self, remaining_out: usize, speed: f64, source: &mut impl FrameSource) {
        self.discard_consumed();
        let needed = (self.cursor.floor() as isize + self.quality as isize + 1).max(0) as usize;
        let missing = needed.saturating_sub(self.buffered_frames());
        let lookahead = ((remaining_out as f64 * speed).ceil() as usize).min(MAX_REFILL_FRAMES);
        let want = missing.max(lookahead).max(1);

        self.chunk.resize(want * self.channels, 0.0);
        let got = source.pull(&mut self.chunk[..]);
        if got == 0 {
            self.exhausted = true;
            return;
        }
        self.history.extend_from_slice(&self.chunk[..got * self.channels]);
    }

    /// The cursor ran `lead` frames past the buffered input: drop the buffer, skip the
    /// source to the start of the interpolation window and re-base the cursor there.
    fn skip_to_cursor(&mut self, lead: f64, source: &mut impl FrameSource) {
        let window_start = self.quality as f64 - 1.0;
        let frac = self.cursor - self.cursor.floor();
        // Saturates for absurd ratios; a looping source wraps either way.
        let gap = (lead - window_start) as usize;
        let skipped = source.skip(gap);

        self.history.clear();
        if skipped < gap {
            self.exhausted = true;
            self.cursor = 0.0;
        } else {
            self.cursor = window_start + frac;
        }
    }

    /// Drop frames no longer reachable by the interpolation window.
    fn discard_consumed(&mut self) {
        let first_needed = self.cursor.floor() as isize - self.quality as isize + 1;
        if first_needed <= 0 {
            return;
        }
        let drop = (first_needed as usize).min(self.buffered_frames());
        self.history.drain(..drop * self.channels);
        self.cursor -= drop as f64;
    }

    fn sample(&self, frame: isize, channel: usize) -> f32 {
        if frame < 0 {
            return 0.0;
        }
        self.history
            .get(frame as usize * self.channels + channel)
            .copied()
            .unwrap_or(0.0)
    }

    /// Lagrange basis weights for nodes `base - q + 1 ..= base + q` at `cursor`.
    fn compute_weights(&mut self, base: isize) {
        let q = self.quality as isize;
        let x = self.cursor;
        let first = base - q + 1;
        for (k, w) in self.weights.iter_mut().enumerate() {
            let xj = (first + k as isize) as f64;
            let mut acc = 1.0;
            for m in 0..(2 * q) {
                let xm = (first + m) as f64;
                if xm != xj {
                    acc *= (x - xm) / (xj - xm);
                }
            }
            *w = acc;
        }
    }
}
