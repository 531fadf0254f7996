use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, anyhow};

pub use tapedeck::config::PlaybackConfig;

use crate::cli::Args;

/// Step sizes applied by the control surface.
#[derive(Clone, Debug)]
pub struct ControlSteps {
    pub volume: f64,
    pub speed: f64,
    pub seek: Duration,
}

#[derive(Clone, Debug)]
pub struct PlayConfig {
    pub path: PathBuf,
    pub device: Option<String>,
    pub playback: PlaybackConfig,
    pub steps: ControlSteps,
}

impl PlayConfig {
    pub fn from_args(args: &Args) -> Result<Self> {
        let path = args
            .path
            .clone()
            .ok_or_else(|| anyhow!("missing audio file path"))?;

        let positive = |name: &str, v: f64| -> Result<f64> {
            if v.is_finite() && v > 0.0 {
                Ok(v)
            } else {
                Err(anyhow!("--{name} must be a positive number, got {v}"))
            }
        };

        let playback = PlaybackConfig {
            volume_base: positive("volume-base", args.volume_base)?,
            initial_volume: args.volume,
            initial_speed: positive("speed", args.speed)?,
            loop_count: args.loops,
            resample_quality: args.quality.max(1),
            chunk_frames: args.chunk_frames.max(1),
            status_interval: Duration::from_secs_f64(positive(
                "status-interval",
                args.status_interval,
            )?),
            ..PlaybackConfig::default()
        };

        Ok(Self {
            path,
            device: args.device.clone(),
            playback,
            steps: ControlSteps {
                volume: args.volume_step,
                speed: args.speed_step,
                seek: Duration::from_secs_f64(positive("seek-step", args.seek_step)?),
            },
        })
    }
}
