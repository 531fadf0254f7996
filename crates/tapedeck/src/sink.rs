//! Audio sink (CPAL output stream).
//!
//! `CpalSink::init` opens the device at (or near) the track's sample rate with a buffer
//! size hint. `CpalSink::play` moves a [`Renderer`] into the output callback; from then on
//! the device thread pulls from the session's effect chain at its own cadence, sharing the
//! session lock with the controller.

use cpal::traits::{DeviceTrait, StreamTrait};

use crate::convert::RateConverter;
use crate::decode::StreamFormat;
use crate::device;
use crate::error::{PlayerError, Result};
use crate::render::Renderer;
use crate::session::Session;

pub struct CpalSink {
    device: cpal::Device,
    sample_format: cpal::SampleFormat,
    stream_config: cpal::StreamConfig,
}

impl CpalSink {
    /// Open an output device for a track in `format` with a buffer of about `buffer_frames`.
    ///
    /// `device_name` selects by case-insensitive substring; `None` uses the host default.
    pub fn init(
        host: &cpal::Host,
        device_name: Option<&str>,
        format: StreamFormat,
        buffer_frames: u32,
    ) -> Result<Self> {
        let device = device::pick_device(host, device_name)
            .map_err(|e| PlayerError::DeviceInit(format!("{e:#}")))?;
        let plan = device::plan_output(&device, format, buffer_frames)
            .map_err(|e| PlayerError::DeviceInit(format!("{e:#}")))?;
        let stream_config = plan.stream_config();

        match device.description() {
            Ok(d) => tracing::info!(device = %d, "output device"),
            Err(e) => tracing::warn!("output device description unavailable: {e}"),
        }
        tracing::info!(
            source_rate_hz = format.sample_rate,
            output_rate_hz = stream_config.sample_rate,
            channels = stream_config.channels,
            buffer_size = ?stream_config.buffer_size,
            sample_format = ?plan.sample_format(),
            "device output config"
        );

        Ok(Self {
            device,
            sample_format: plan.sample_format(),
            stream_config,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.stream_config.sample_rate
    }

    pub fn channels(&self) -> usize {
        self.stream_config.channels as usize
    }

    /// Build the renderer for `session`, inserting a rate converter if the device rate
    /// differs from the track, and start output.
    pub fn play_session(&self, session: &Session) -> Result<SinkSession> {
        let src = session.format();
        let converter = if src.sample_rate == self.sample_rate() {
            tracing::info!(rate_hz = src.sample_rate, "rate conversion skipped");
            None
        } else {
            tracing::info!(
                from_hz = src.sample_rate,
                to_hz = self.sample_rate(),
                "converting to device rate"
            );
            let conv = RateConverter::new(
                src.sample_rate,
                self.sample_rate(),
                src.channels,
                session.config().chunk_frames,
            )
            .map_err(|e| PlayerError::DeviceInit(format!("{e:#}")))?;
            Some(conv)
        };
        self.play(session.renderer(self.channels(), converter))
    }

    /// Start the output stream with `renderer` as its pull source.
    pub fn play(&self, renderer: Renderer) -> Result<SinkSession> {
        let stream = match self.sample_format {
            cpal::SampleFormat::F32 => self.build_stream::<f32>(renderer),
            cpal::SampleFormat::I16 => self.build_stream::<i16>(renderer),
            cpal::SampleFormat::I32 => self.build_stream::<i32>(renderer),
            cpal::SampleFormat::U16 => self.build_stream::<u16>(renderer),
            other => Err(PlayerError::DeviceInit(format!(
                "Unsupported sample format: {other:?}"
            ))),
        }?;
        stream
            .play()
            .map_err(|e| PlayerError::DeviceInit(format!("start stream: {e}")))?;
        Ok(SinkSession { stream })
    }

    /// Type-specialized stream builder for CPAL sample formats.
    fn build_stream<T>(&self, mut renderer: Renderer) -> Result<cpal::Stream>
    where
        T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
    {
        let mut scratch: Vec<f32> = Vec::new();
        let err_fn = |err| tracing::warn!("stream error: {err}");

        self.device
            .build_output_stream(
                &self.stream_config,
                move |data: &mut [T], _| {
                    scratch.resize(data.len(), 0.0);
                    renderer.render(&mut scratch);
                    for (dst, src) in data.iter_mut().zip(scratch.iter()) {
                        *dst = <T as cpal::Sample>::from_sample::<f32>(*src);
                    }
                },
                err_fn,
                None,
            )
            .map_err(|e| PlayerError::DeviceInit(format!("build output stream: {e}")))
    }
}

/// Live output session. Dropping it stops the device callback.
pub struct SinkSession {
    stream: cpal::Stream,
}

impl SinkSession {
    /// Stop pulling from the chain and release the device.
    pub fn stop(self) {
        if let Err(e) = self.stream.pause() {
            tracing::debug!("stream pause on stop: {e}");
        }
    }
}
