use std::time::Duration;

/// Playback tuning parameters shared by the effect chain, sink and status stages.
#[derive(Clone, Debug)]
pub struct PlaybackConfig {
    /// Exponential base for the volume stage (`gain = base^volume`).
    pub volume_base: f64,
    /// Initial volume exponent.
    pub initial_volume: f64,
    /// Initial speed ratio.
    pub initial_speed: f64,
    /// Number of times to restart the track when it ends (-1 = forever).
    pub loop_count: i64,
    /// Half-width of the speed interpolation window, in frames.
    pub resample_quality: usize,
    /// Output buffer length used to derive the device buffer-size hint.
    pub buffer_duration: Duration,
    /// Frames pulled from the effect chain per render refill (also the rate converter's
    /// input chunk when the device runs at a different rate).
    pub chunk_frames: usize,
    /// Status line cadence.
    pub status_interval: Duration,
}

impl Default for PlaybackConfig {
    /// Same behavior as a plain `play <file>`: loop forever, unity gain, normal speed.
    fn default() -> Self {
        Self {
            volume_base: 2.0,
            initial_volume: 0.0,
            initial_speed: 1.0,
            loop_count: -1,
            resample_quality: 4,
            buffer_duration: Duration::from_millis(100),
            chunk_frames: 1024,
            status_interval: Duration::from_secs(1),
        }
    }
}

impl PlaybackConfig {
    /// Device buffer-size hint in frames for `sample_rate` (a tenth of a second by default).
    pub fn buffer_frames(&self, sample_rate: u32) -> u32 {
        let frames = (sample_rate as f64 * self.buffer_duration.as_secs_f64()).round() as u32;
        frames.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_frames_is_a_tenth_of_a_second_by_default() {
        let cfg = PlaybackConfig::default();
        assert_eq!(cfg.buffer_frames(44_100), 4_410);
        assert_eq!(cfg.buffer_frames(48_000), 4_800);
    }

    #[test]
    fn buffer_frames_never_zero() {
        let cfg = PlaybackConfig {
            buffer_duration: Duration::ZERO,
            ..PlaybackConfig::default()
        };
        assert_eq!(cfg.buffer_frames(48_000), 1);
    }
}
