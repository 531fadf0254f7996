//! Command-line interface definitions.
//!
//! This module contains the `clap`-powered CLI surface area (args + defaults).
//! It has no audio logic; `config` maps it onto the library's `PlaybackConfig`.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "tapedeck", version)]
pub struct Args {
    /// Path to audio file (.mp3, .wav or .flac)
    #[arg(required_unless_present = "list_devices")]
    pub path: Option<PathBuf>,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    /// Use a specific output device by substring match
    #[arg(long)]
    pub device: Option<String>,

    /// Times to restart the track when it ends (-1 = forever)
    #[arg(long, default_value_t = -1, allow_negative_numbers = true)]
    pub loops: i64,

    /// Initial volume exponent (gain = base^volume)
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    pub volume: f64,

    /// Exponential base for volume steps
    #[arg(long, default_value_t = 2.0)]
    pub volume_base: f64,

    /// Initial playback speed ratio
    #[arg(long, default_value_t = 1.0)]
    pub speed: f64,

    /// Volume change per `+`/`-` command
    #[arg(long, default_value_t = 0.5)]
    pub volume_step: f64,

    /// Speed change per `]`/`[` command
    #[arg(long, default_value_t = 0.1)]
    pub speed_step: f64,

    /// Seek distance per `>`/`<` command, in seconds
    #[arg(long, default_value_t = 5.0)]
    pub seek_step: f64,

    /// Seconds between status lines
    #[arg(long, default_value_t = 1.0)]
    pub status_interval: f64,

    /// Interpolation half-width for the speed stage (higher => smoother, more CPU)
    #[arg(long, default_value_t = 4)]
    pub quality: usize,

    /// Frames pulled from the effect chain per output refill
    #[arg(long, default_value_t = 1024)]
    pub chunk_frames: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_plain_play() {
        let args = Args::try_parse_from(["tapedeck", "song.mp3"]).unwrap();
        assert_eq!(args.path, Some(PathBuf::from("song.mp3")));
        assert_eq!(args.loops, -1);
        assert_eq!(args.volume, 0.0);
        assert_eq!(args.speed, 1.0);
        assert_eq!(args.quality, 4);
    }

    #[test]
    fn path_optional_only_when_listing_devices() {
        assert!(Args::try_parse_from(["tapedeck"]).is_err());
        let args = Args::try_parse_from(["tapedeck", "--list-devices"]).unwrap();
        assert!(args.list_devices);
        assert!(args.path.is_none());
    }

    #[test]
    fn negative_values_parse() {
        let args =
            Args::try_parse_from(["tapedeck", "a.wav", "--volume", "-1.5", "--loops", "2"]).unwrap();
        assert_eq!(args.volume, -1.5);
        assert_eq!(args.loops, 2);
    }
}
