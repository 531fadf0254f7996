//! Decoder adapter.
//!
//! Uses Symphonia to:
//! - pick a codec from the file extension (`mp3`, `wav`, `flac`)
//! - probe the container and check the track matches that codec
//! - decode every packet into an in-memory interleaved `f32` buffer
//!
//! The result is a [`BufferedStream`], a seekable [`PcmStream`] whose seek never touches
//! the file system. That keeps the session lock clear of blocking I/O.

use std::fs::File;
use std::path::Path;
use std::time::Duration;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecParameters, CodecType};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::io::MediaSource;
use symphonia::core::{
    codecs::DecoderOptions, formats::FormatOptions, io::MediaSourceStream,
    meta::MetadataOptions, probe::Hint,
};

use crate::error::{PlayerError, Result};

/// Codec selected from the input file extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Codec {
    Mp3,
    Wav,
    Flac,
}

impl Codec {
    /// Select the codec for `path` by lowercased extension.
    ///
    /// Anything outside `{mp3, wav, flac}` (including a missing extension) is
    /// [`PlayerError::UnsupportedFormat`].
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "mp3" => Ok(Codec::Mp3),
            "wav" => Ok(Codec::Wav),
            "flac" => Ok(Codec::Flac),
            _ => Err(PlayerError::UnsupportedFormat {
                extension: format!(".{ext}"),
            }),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Codec::Mp3 => "mp3",
            Codec::Wav => "wav",
            Codec::Flac => "flac",
        }
    }

    /// Whether a probed track codec belongs to this codec family.
    pub fn accepts(self, codec: CodecType) -> bool {
        use symphonia::core::codecs::*;
        match self {
            Codec::Mp3 => codec == CODEC_TYPE_MP3,
            Codec::Flac => codec == CODEC_TYPE_FLAC,
            Codec::Wav => matches!(
                codec,
                CODEC_TYPE_PCM_S8
                    | CODEC_TYPE_PCM_U8
                    | CODEC_TYPE_PCM_S16LE
                    | CODEC_TYPE_PCM_S16BE
                    | CODEC_TYPE_PCM_S24LE
                    | CODEC_TYPE_PCM_S24BE
                    | CODEC_TYPE_PCM_S32LE
                    | CODEC_TYPE_PCM_S32BE
                    | CODEC_TYPE_PCM_U16LE
                    | CODEC_TYPE_PCM_U24LE
                    | CODEC_TYPE_PCM_U32LE
                    | CODEC_TYPE_PCM_F32LE
                    | CODEC_TYPE_PCM_F32BE
                    | CODEC_TYPE_PCM_F64LE
                    | CODEC_TYPE_PCM_F64BE
                    | CODEC_TYPE_PCM_ALAW
                    | CODEC_TYPE_PCM_MULAW
            ),
        }
    }
}

/// Sample rate and channel count of a PCM stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub channels: usize,
}

impl StreamFormat {
    /// Duration covered by `frames` at this rate.
    pub fn duration_of(&self, frames: usize) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(frames as f64 / self.sample_rate as f64)
    }

    /// Frame count for `secs` at this rate (may be negative or past the end).
    pub fn frames_for_secs(&self, secs: f64) -> f64 {
        secs * self.sample_rate as f64
    }
}

/// A finite, seekable source of interleaved `f32` frames.
pub trait PcmStream: Send {
    fn format(&self) -> StreamFormat;

    /// Fill `out` with whole frames from the current position and return how many
    /// frames were written. Zero means the stream is exhausted.
    fn read(&mut self, out: &mut [f32]) -> usize;

    /// Move the read position to `frame` (`0..=len`).
    fn seek(&mut self, frame: usize) -> Result<()>;

    fn position(&self) -> usize;

    /// Total length in frames.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Release the decoded data. Reads after close return zero frames.
    fn close(&mut self);
}

/// Fully decoded track held in memory.
pub struct BufferedStream {
    format: StreamFormat,
    samples: Vec<f32>,
    pos: usize,
    closed: bool,
}

impl BufferedStream {
    /// Wrap already-interleaved samples. Trailing partial frames are dropped.
    pub fn from_interleaved(mut samples: Vec<f32>, channels: usize, sample_rate: u32) -> Self {
        let channels = channels.max(1);
        let whole = samples.len() - samples.len() % channels;
        samples.truncate(whole);
        Self {
            format: StreamFormat {
                sample_rate,
                channels,
            },
            samples,
            pos: 0,
            closed: false,
        }
    }
}

impl PcmStream for BufferedStream {
    fn format(&self) -> StreamFormat {
        self.format
    }

    fn read(&mut self, out: &mut [f32]) -> usize {
        if self.closed {
            return 0;
        }
        let ch = self.format.channels;
        let want = out.len() / ch;
        let frames = want.min(self.len() - self.pos);
        let start = self.pos * ch;
        let end = start + frames * ch;
        out[..frames * ch].copy_from_slice(&self.samples[start..end]);
        self.pos += frames;
        frames
    }

    fn seek(&mut self, frame: usize) -> Result<()> {
        let len = self.len();
        if frame > len {
            return Err(PlayerError::SeekOutOfRange { frame, len });
        }
        self.pos = frame;
        Ok(())
    }

    fn position(&self) -> usize {
        self.pos
    }

    fn len(&self) -> usize {
        self.samples.len() / self.format.channels
    }

    fn close(&mut self) {
        self.closed = true;
        self.samples = Vec::new();
        self.pos = 0;
    }
}

/// Metadata captured while probing the source.
#[derive(Clone, Debug, Default)]
pub struct SourceInfo {
    /// Codec name (best-effort).
    pub codec: Option<String>,
    /// Source bit depth (best-effort).
    pub bit_depth: Option<u16>,
    /// Container duration from the header, if declared.
    pub declared_duration: Option<Duration>,
}

/// A decoded file ready to hand to the effect chain.
pub struct DecodedTrack {
    pub codec: Codec,
    pub stream: BufferedStream,
    pub info: SourceInfo,
}

impl DecodedTrack {
    pub fn format(&self) -> StreamFormat {
        self.stream.format()
    }
}

/// Open and fully decode `path`.
///
/// The extension is checked first, so an unsupported file fails before it is opened.
pub fn open(path: &Path) -> Result<DecodedTrack> {
    let codec = Codec::from_path(path)?;
    let file = File::open(path).map_err(|source| PlayerError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    let (stream, info) = decode_media_source(Box::new(file), codec)?;
    tracing::info!(
        path = ?path,
        codec = info.codec.as_deref().unwrap_or("?"),
        rate_hz = stream.format().sample_rate,
        channels = stream.format().channels,
        frames = stream.len(),
        duration_secs = stream.format().duration_of(stream.len()).as_secs_f64(),
        declared_secs = info.declared_duration.map(|d| d.as_secs_f64()),
        bit_depth = info.bit_depth,
        "decoded"
    );

    Ok(DecodedTrack {
        codec,
        stream,
        info,
    })
}

/// Decode an arbitrary Symphonia [`MediaSource`] with the given codec selection.
pub fn decode_media_source(
    source: Box<dyn MediaSource>,
    codec: Codec,
) -> Result<(BufferedStream, SourceInfo)> {
    let mss = MediaSourceStream::new(source, Default::default());

    let mut hint = Hint::new();
    hint.with_extension(codec.extension());

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| PlayerError::Decode("no default audio track".to_string()))?;
    let track_id = track.id;

    let codec_params: CodecParameters = track.codec_params.clone();
    if !codec.accepts(codec_params.codec) {
        return Err(PlayerError::Decode(format!(
            "track codec {} does not match .{} file",
            codec_name_from_params(&codec_params).unwrap_or_else(|| "unknown".to_string()),
            codec.extension()
        )));
    }

    let mut channels = codec_params.channels.map(|c| c.count());
    let mut rate = codec_params.sample_rate;

    let info = SourceInfo {
        codec: codec_name_from_params(&codec_params),
        bit_depth: codec_params
            .bits_per_sample
            .or(codec_params.bits_per_coded_sample)
            .and_then(|v| u16::try_from(v).ok()),
        declared_duration: duration_from_codec_params(&codec_params),
    };

    let mut decoder =
        symphonia::default::get_codecs().make(&codec_params, &DecoderOptions::default())?;

    let mut samples: Vec<f32> = Vec::new();
    if let (Some(frames), Some(ch)) = (codec_params.n_frames, channels) {
        samples.reserve((frames as usize).saturating_mul(ch));
    }

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(e)) => {
                tracing::warn!("skipping corrupt packet: {e}");
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        channels.get_or_insert(spec.channels.count());
        rate.get_or_insert(spec.rate);

        let mut sample_buf = SampleBuffer::<f32>::new(decoded.frames() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(sample_buf.samples());
    }

    let channels = channels
        .filter(|&c| c > 0)
        .ok_or_else(|| PlayerError::Decode("unknown channel count".to_string()))?;
    let rate = rate
        .filter(|&r| r > 0)
        .ok_or_else(|| PlayerError::Decode("unknown sample rate".to_string()))?;

    Ok((BufferedStream::from_interleaved(samples, channels, rate), info))
}

/// Best-effort duration from codec metadata.
///
/// Returns `None` if the container does not provide total frames or sample rate.
fn duration_from_codec_params(codec_params: &CodecParameters) -> Option<Duration> {
    let frames = codec_params.n_frames?;
    let rate = codec_params.sample_rate? as u64;
    if rate == 0 {
        return None;
    }
    Some(Duration::from_millis(frames.saturating_mul(1000) / rate))
}

/// Best-effort codec label used in logs.
fn codec_name_from_params(params: &CodecParameters) -> Option<String> {
    use symphonia::core::codecs::*;
    let name = match params.codec {
        CODEC_TYPE_FLAC => "FLAC",
        CODEC_TYPE_MP3 => "MP3",
        CODEC_TYPE_PCM_S16LE | CODEC_TYPE_PCM_S16BE => "PCM_S16",
        CODEC_TYPE_PCM_S24LE | CODEC_TYPE_PCM_S24BE => "PCM_S24",
        CODEC_TYPE_PCM_S32LE | CODEC_TYPE_PCM_S32BE => "PCM_S32",
        CODEC_TYPE_PCM_F32LE | CODEC_TYPE_PCM_F32BE => "PCM_F32",
        _ => return None,
    };
    Some(name.to_string())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::path::PathBuf;

    use symphonia::core::codecs::*;

    /// Minimal 16-bit PCM RIFF/WAVE file.
    pub(crate) fn wav_bytes(sample_rate: u32, channels: u16, samples: &[i16]) -> Vec<u8> {
        let data_len = (samples.len() * 2) as u32;
        let block_align = channels * 2;
        let mut out = Vec::with_capacity(44 + data_len as usize);
        out.extend_from_slice(b"RIFF");
        out.extend_from_slice(&(36 + data_len).to_le_bytes());
        out.extend_from_slice(b"WAVE");
        out.extend_from_slice(b"fmt ");
        out.extend_from_slice(&16u32.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&channels.to_le_bytes());
        out.extend_from_slice(&sample_rate.to_le_bytes());
        out.extend_from_slice(&(sample_rate * block_align as u32).to_le_bytes());
        out.extend_from_slice(&block_align.to_le_bytes());
        out.extend_from_slice(&16u16.to_le_bytes());
        out.extend_from_slice(b"data");
        out.extend_from_slice(&data_len.to_le_bytes());
        for s in samples {
            out.extend_from_slice(&s.to_le_bytes());
        }
        out
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("tapedeck-{}-{name}", std::process::id()))
    }

    #[test]
    fn from_path_dispatches_supported_extensions() {
        assert_eq!(Codec::from_path(Path::new("a.mp3")).unwrap(), Codec::Mp3);
        assert_eq!(Codec::from_path(Path::new("a.wav")).unwrap(), Codec::Wav);
        assert_eq!(Codec::from_path(Path::new("a.flac")).unwrap(), Codec::Flac);
        assert_eq!(Codec::from_path(Path::new("dir/Song.FLAC")).unwrap(), Codec::Flac);
        assert_eq!(Codec::from_path(Path::new("x.Mp3")).unwrap(), Codec::Mp3);
    }

    #[test]
    fn from_path_rejects_other_extensions() {
        for p in ["a.ogg", "a.mp4", "noext", "a.wav.txt"] {
            match Codec::from_path(Path::new(p)) {
                Err(PlayerError::UnsupportedFormat { .. }) => {}
                other => panic!("{p}: expected UnsupportedFormat, got {other:?}"),
            }
        }
    }

    #[test]
    fn open_rejects_extension_before_touching_the_file() {
        let missing = temp_path("does-not-exist.ogg");
        match open(&missing) {
            Err(PlayerError::UnsupportedFormat { extension }) => assert_eq!(extension, ".ogg"),
            Err(e) => panic!("unexpected error {e}"),
            Ok(_) => panic!("unexpected success"),
        }
    }

    #[test]
    fn open_missing_supported_file_is_open_error() {
        let missing = temp_path("does-not-exist.wav");
        assert!(matches!(open(&missing), Err(PlayerError::Open { .. })));
    }

    #[test]
    fn codec_accepts_matching_family_only() {
        assert!(Codec::Mp3.accepts(CODEC_TYPE_MP3));
        assert!(!Codec::Mp3.accepts(CODEC_TYPE_FLAC));
        assert!(Codec::Flac.accepts(CODEC_TYPE_FLAC));
        assert!(Codec::Wav.accepts(CODEC_TYPE_PCM_S16LE));
        assert!(Codec::Wav.accepts(CODEC_TYPE_PCM_F32LE));
        assert!(!Codec::Wav.accepts(CODEC_TYPE_MP3));
    }

    #[test]
    fn open_decodes_wav_into_interleaved_frames() {
        let path = temp_path("stereo.wav");
        let pcm: Vec<i16> = vec![0, 16_384, -16_384, 8_192, 32_767, -32_768];
        std::fs::write(&path, wav_bytes(8_000, 2, &pcm)).unwrap();

        let track = open(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(track.codec, Codec::Wav);
        assert_eq!(
            track.format(),
            StreamFormat {
                sample_rate: 8_000,
                channels: 2
            }
        );
        assert_eq!(track.stream.len(), 3);
        assert_eq!(track.info.codec.as_deref(), Some("PCM_S16"));
        assert_eq!(track.info.bit_depth, Some(16));

        let mut stream = track.stream;
        let mut buf = vec![0.0f32; 6];
        assert_eq!(stream.read(&mut buf), 3);
        assert!((buf[0] - 0.0).abs() < 1e-4);
        assert!((buf[1] - 0.5).abs() < 1e-3);
        assert!((buf[2] + 0.5).abs() < 1e-3);
    }

    #[test]
    fn open_rejects_garbage_content() {
        let path = temp_path("garbage.flac");
        std::fs::write(&path, b"definitely not a flac stream").unwrap();
        let res = open(&path);
        let _ = std::fs::remove_file(&path);
        assert!(matches!(res, Err(PlayerError::Decode(_))));
    }

    #[test]
    fn buffered_stream_seek_and_position() {
        let mut s = BufferedStream::from_interleaved((0..10).map(|v| v as f32).collect(), 2, 10);
        assert_eq!(s.len(), 5);
        s.seek(3).unwrap();
        assert_eq!(s.position(), 3);
        let mut buf = [0.0f32; 8];
        assert_eq!(s.read(&mut buf), 2);
        assert_eq!(&buf[..4], &[6.0, 7.0, 8.0, 9.0]);
        assert_eq!(s.position(), 5);
        assert_eq!(s.read(&mut buf), 0);
        assert!(matches!(
            s.seek(6),
            Err(PlayerError::SeekOutOfRange { frame: 6, len: 5 })
        ));
        s.seek(5).unwrap();
    }

    #[test]
    fn buffered_stream_drops_partial_frame_and_reads_nothing_after_close() {
        let mut s = BufferedStream::from_interleaved(vec![1.0, 2.0, 3.0], 2, 10);
        assert_eq!(s.len(), 1);
        s.close();
        let mut buf = [0.0f32; 2];
        assert_eq!(s.read(&mut buf), 0);
        assert!(s.is_empty());
    }

    #[test]
    fn duration_from_codec_params_handles_zero_rate() {
        let mut params = CodecParameters::new();
        params.sample_rate = Some(0);
        params.n_frames = Some(100);
        assert!(duration_from_codec_params(&params).is_none());
    }

    #[test]
    fn duration_from_codec_params_computes() {
        let mut params = CodecParameters::new();
        params.sample_rate = Some(48_000);
        params.n_frames = Some(96_000);
        assert_eq!(
            duration_from_codec_params(&params),
            Some(Duration::from_secs(2))
        );
    }

    #[test]
    fn stream_format_conversions() {
        let f = StreamFormat {
            sample_rate: 48_000,
            channels: 2,
        };
        assert_eq!(f.duration_of(96_000), Duration::from_secs(2));
        assert_eq!(f.frames_for_secs(-0.5), -24_000.0);
    }
}
