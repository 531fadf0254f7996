//! Output device lookup and stream planning.
//!
//! The plan is chosen against the track's own rate and channel count. A config that plays
//! the track natively wins; otherwise the renderer converts rate or remaps channels.

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait};

use crate::decode::StreamFormat;

/// The output device whose name contains `needle` (case-insensitive), or the host default.
pub fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device> {
    let Some(needle) = needle.map(str::trim).filter(|n| !n.is_empty()) else {
        return host
            .default_output_device()
            .ok_or_else(|| anyhow!("No default output device"));
    };

    let needle = needle.to_lowercase();
    host.output_devices()
        .context("No output devices")?
        .find(|d| {
            d.description()
                .is_ok_and(|desc| desc.name().to_lowercase().contains(&needle))
        })
        .ok_or_else(|| anyhow!("No output device matched: {needle}"))
}

/// Print output device names to stdout, marking the default one.
pub fn list_devices(host: &cpal::Host) -> Result<()> {
    let default_name = host
        .default_output_device()
        .and_then(|d| d.description().ok())
        .map(|d| d.name().to_string());
    for (i, d) in host.output_devices().context("No output devices")?.enumerate() {
        let name = d.description()?.name().to_string();
        let marker = if default_name.as_deref() == Some(name.as_str()) {
            " (default)"
        } else {
            ""
        };
        println!("#{i}: {name}{marker}");
    }
    Ok(())
}

/// Stream settings chosen for one track.
#[derive(Clone, Debug)]
pub struct OutputPlan {
    pub config: cpal::SupportedStreamConfig,
    /// Fixed buffer size, or `None` when the device reports no range.
    pub buffer_size: Option<cpal::BufferSize>,
}

impl OutputPlan {
    pub fn sample_format(&self) -> cpal::SampleFormat {
        self.config.sample_format()
    }

    pub fn stream_config(&self) -> cpal::StreamConfig {
        let mut cfg: cpal::StreamConfig = self.config.clone().into();
        if let Some(buf) = self.buffer_size.clone() {
            cfg.buffer_size = buf;
        }
        cfg
    }
}

/// Choose the output config for a track in `format`, with a buffer near `hint_frames`.
pub fn plan_output(
    device: &cpal::Device,
    format: StreamFormat,
    hint_frames: u32,
) -> Result<OutputPlan> {
    let ranges: Vec<cpal::SupportedStreamConfigRange> = device
        .supported_output_configs()
        .context("query output configs")?
        .collect();
    let candidates: Vec<RangeSummary> = ranges
        .iter()
        .map(|r| RangeSummary {
            min_rate: r.min_sample_rate(),
            max_rate: r.max_sample_rate(),
            channels: r.channels(),
            sample_format: r.sample_format(),
        })
        .collect();

    let (idx, rate) = choose_range(&candidates, format)
        .ok_or_else(|| anyhow!("No output config with a writable sample format"))?;
    let config = ranges[idx].clone().with_sample_rate(rate);
    let buffer_size = match config.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } => Some(cpal::BufferSize::Fixed(
            clamp_buffer_frames(hint_frames, *min, *max),
        )),
        cpal::SupportedBufferSize::Unknown => None,
    };
    Ok(OutputPlan {
        config,
        buffer_size,
    })
}

#[derive(Clone, Copy, Debug)]
struct RangeSummary {
    min_rate: u32,
    max_rate: u32,
    channels: u16,
    sample_format: cpal::SampleFormat,
}

/// Index of the best range and the rate to open it at.
///
/// Ranked by: native rate, then the nearest rate above the track (upsampling), then the
/// nearest below; matching channel count, then stereo; then sample format precision.
fn choose_range(ranges: &[RangeSummary], format: StreamFormat) -> Option<(usize, u32)> {
    let target = format.sample_rate;
    ranges
        .iter()
        .enumerate()
        .filter_map(|(i, r)| {
            let format_rank = writable_format_rank(r.sample_format)?;
            let rate = if r.max_rate < r.min_rate {
                r.min_rate
            } else {
                target.clamp(r.min_rate, r.max_rate)
            };
            let rate_cost = match rate.cmp(&target) {
                std::cmp::Ordering::Equal => (0, 0),
                std::cmp::Ordering::Greater => (1, rate - target),
                std::cmp::Ordering::Less => (2, target - rate),
            };
            let channel_cost = if r.channels as usize == format.channels {
                0
            } else if r.channels == 2 {
                1
            } else {
                2
            };
            Some(((rate_cost, channel_cost, format_rank), i, rate))
        })
        .min_by_key(|(key, _, _)| *key)
        .map(|(_, i, rate)| (i, rate))
}

/// Formats the sink can write, best first.
fn writable_format_rank(format: cpal::SampleFormat) -> Option<u8> {
    match format {
        cpal::SampleFormat::F32 => Some(0),
        cpal::SampleFormat::I32 => Some(1),
        cpal::SampleFormat::I16 => Some(2),
        cpal::SampleFormat::U16 => Some(3),
        _ => None,
    }
}

fn clamp_buffer_frames(hint: u32, min: u32, max: u32) -> u32 {
    if max < min {
        return min;
    }
    hint.clamp(min, max)
}

#[cfg(test)]
mod tests {
    use cpal::SampleFormat;

    use super::*;

    fn range(
        min_rate: u32,
        max_rate: u32,
        channels: u16,
        sample_format: SampleFormat,
    ) -> RangeSummary {
        RangeSummary {
            min_rate,
            max_rate,
            channels,
            sample_format,
        }
    }

    fn track(sample_rate: u32, channels: usize) -> StreamFormat {
        StreamFormat {
            sample_rate,
            channels,
        }
    }

    #[test]
    fn native_rate_beats_better_sample_format() {
        let ranges = [
            range(48_000, 48_000, 2, SampleFormat::F32),
            range(44_100, 44_100, 2, SampleFormat::I16),
        ];
        assert_eq!(choose_range(&ranges, track(44_100, 2)), Some((1, 44_100)));
    }

    #[test]
    fn track_rate_is_used_inside_a_range() {
        let ranges = [range(8_000, 192_000, 2, SampleFormat::F32)];
        assert_eq!(choose_range(&ranges, track(22_050, 2)), Some((0, 22_050)));
    }

    #[test]
    fn upsampling_preferred_over_downsampling() {
        let ranges = [
            range(32_000, 32_000, 2, SampleFormat::F32),
            range(96_000, 96_000, 2, SampleFormat::F32),
            range(48_000, 48_000, 2, SampleFormat::F32),
        ];
        assert_eq!(choose_range(&ranges, track(44_100, 2)), Some((2, 48_000)));
    }

    #[test]
    fn falls_back_to_nearest_lower_rate() {
        let ranges = [
            range(32_000, 32_000, 2, SampleFormat::F32),
            range(44_100, 48_000, 2, SampleFormat::F32),
        ];
        assert_eq!(choose_range(&ranges, track(96_000, 2)), Some((1, 48_000)));
    }

    #[test]
    fn matching_channel_count_then_stereo() {
        let ranges = [
            range(44_100, 44_100, 6, SampleFormat::F32),
            range(44_100, 44_100, 2, SampleFormat::F32),
            range(44_100, 44_100, 1, SampleFormat::I16),
        ];
        assert_eq!(choose_range(&ranges, track(44_100, 1)), Some((2, 44_100)));
        assert_eq!(choose_range(&ranges, track(44_100, 4)), Some((1, 44_100)));
    }

    #[test]
    fn unwritable_formats_are_skipped() {
        let ranges = [
            range(44_100, 44_100, 2, SampleFormat::F64),
            range(48_000, 48_000, 2, SampleFormat::I16),
        ];
        assert_eq!(choose_range(&ranges, track(44_100, 2)), Some((1, 48_000)));
        assert_eq!(choose_range(&ranges[..1], track(44_100, 2)), None);
        assert_eq!(choose_range(&[], track(44_100, 2)), None);
    }

    #[test]
    fn clamp_buffer_frames_respects_device_range() {
        assert_eq!(clamp_buffer_frames(4_410, 64, 8_192), 4_410);
        assert_eq!(clamp_buffer_frames(4_410, 64, 2_048), 2_048);
        assert_eq!(clamp_buffer_frames(16, 64, 2_048), 64);
        assert_eq!(clamp_buffer_frames(100, 512, 256), 512);
    }
}
