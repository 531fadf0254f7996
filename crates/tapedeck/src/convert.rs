//! Device sample-rate conversion.
//!
//! When the output device cannot run at the track's rate, the renderer pushes each pulled
//! chunk through a Rubato sinc resampler before channel mapping. This is separate from the
//! speed stage: it keeps pitch and tempo intact, it only matches the device clock.

use anyhow::{Result, anyhow};
use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{
    Async, FixedAsync, Indexing, Resampler, SincInterpolationParameters, SincInterpolationType,
    WindowFunction, calculate_cutoff,
};

/// Streaming sinc converter from `src_rate` to `dst_rate`, fed in fixed input chunks.
pub struct RateConverter {
    resampler: Async<f32>,
    channels: usize,
    chunk_frames: usize,
    input: Vec<f32>,
    output: Vec<f32>,
    indexing: Indexing,
}

impl RateConverter {
    pub fn new(src_rate: u32, dst_rate: u32, channels: usize, chunk_frames: usize) -> Result<Self> {
        if src_rate == 0 || dst_rate == 0 {
            return Err(anyhow!("invalid conversion {src_rate} Hz -> {dst_rate} Hz"));
        }
        let channels = channels.max(1);
        let chunk_frames = chunk_frames.max(1);
        let f_ratio = dst_rate as f64 / src_rate as f64;

        let sinc_len = 128;
        let oversampling_factor = 256;
        let interpolation = SincInterpolationType::Cubic;
        let window = WindowFunction::BlackmanHarris2;
        let f_cutoff = calculate_cutoff(sinc_len, window);

        let params = SincInterpolationParameters {
            sinc_len,
            f_cutoff,
            interpolation,
            oversampling_factor,
            window,
        };

        let resampler = Async::<f32>::new_sinc(
            f_ratio,
            1.1,
            &params,
            chunk_frames,
            channels,
            FixedAsync::Input,
        )
        .map_err(|e| anyhow!("resampler init: {e}"))?;

        let out_capacity_frames = (chunk_frames as f64 * f_ratio * 1.2).ceil() as usize + 64;

        Ok(Self {
            resampler,
            channels,
            chunk_frames,
            input: vec![0.0; chunk_frames * channels],
            output: vec![0.0; out_capacity_frames * channels],
            indexing: Indexing {
                input_offset: 0,
                output_offset: 0,
                active_channels_mask: None,
                partial_len: None,
            },
        })
    }

    /// Pull one input chunk through `pull` and append the converted frames to `out`.
    ///
    /// `pull` fills a buffer with interleaved frames and returns how many it wrote.
    /// Returns the number of frames appended; zero once `pull` has nothing left.
    pub fn process<F>(&mut self, mut pull: F, out: &mut Vec<f32>) -> Result<usize>
    where
        F: FnMut(&mut [f32]) -> usize,
    {
        let got = pull(&mut self.input[..]);
        if got == 0 {
            return Ok(0);
        }

        let input_adapter = InterleavedSlice::new(&self.input, self.channels, self.chunk_frames)
            .map_err(|e| anyhow!("interleaved slice (input): {e}"))?;

        let out_capacity_frames = self.output.len() / self.channels;
        let mut output_adapter =
            InterleavedSlice::new_mut(&mut self.output, self.channels, out_capacity_frames)
                .map_err(|e| anyhow!("interleaved slice (output): {e}"))?;

        self.indexing.input_offset = 0;
        self.indexing.output_offset = 0;
        self.indexing.partial_len = if got < self.chunk_frames {
            Some(got)
        } else {
            None
        };

        let (_nbr_in, nbr_out) = self
            .resampler
            .process_into_buffer(&input_adapter, &mut output_adapter, Some(&self.indexing))
            .map_err(|e| anyhow!("resampler process: {e}"))?;

        let produced_samples = nbr_out * self.channels;
        out.extend_from_slice(&self.output[..produced_samples]);
        Ok(nbr_out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_rates() {
        assert!(RateConverter::new(0, 48_000, 2, 256).is_err());
        assert!(RateConverter::new(44_100, 0, 2, 256).is_err());
    }

    #[test]
    fn upsampling_produces_proportionally_more_frames() {
        let mut conv = RateConverter::new(24_000, 48_000, 1, 256).unwrap();
        let mut out = Vec::new();
        let mut total_in = 0usize;
        for _ in 0..40 {
            conv.process(
                |buf| {
                    buf.fill(0.25);
                    total_in += buf.len();
                    buf.len()
                },
                &mut out,
            )
            .unwrap();
        }
        let ratio = out.len() as f64 / total_in as f64;
        assert!((ratio - 2.0).abs() < 0.1, "ratio {ratio}");
    }

    #[test]
    fn exhausted_source_yields_nothing() {
        let mut conv = RateConverter::new(44_100, 48_000, 2, 128).unwrap();
        let mut out = Vec::new();
        assert_eq!(conv.process(|_| 0, &mut out).unwrap(), 0);
        assert!(out.is_empty());
    }
}
