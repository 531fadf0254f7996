//! Tapedeck: a small CLI utility that decodes an audio file into memory and plays it via CPAL,
//! with live control over pause, volume, speed and position.
//!
//! ## Pipeline
//! 1. **Decode**: Symphonia decodes the whole input into interleaved `f32` up front.
//! 2. **Effects**: loop, pause gate, volume and speed stages run inside the CPAL callback.
//! 3. **Playback**: the callback locks the effect chain once per refill; controls and the
//!    status line take the same lock, so every change lands between two refills.
//!
//! Commands are read line by line from stdin (see `controls`).

mod cli;
mod config;
mod controls;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::{select, tick, unbounded};
use tapedeck::sink::CpalSink;
use tapedeck::{Session, StatusReporter};
use tracing_subscriber::EnvFilter;

use controls::Command;

const FINISH_POLL: Duration = Duration::from_millis(250);

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tapedeck=info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let host = cpal::default_host();

    if args.list_devices {
        tapedeck::device::list_devices(&host)?;
        return Ok(());
    }

    let cfg = config::PlayConfig::from_args(&args)?;
    play(&host, &cfg)
}

fn play(host: &cpal::Host, cfg: &config::PlayConfig) -> Result<()> {
    let track = tapedeck::decode::open(&cfg.path)
        .with_context(|| format!("open {}", cfg.path.display()))?;
    let session = Session::from_track(track, cfg.playback.clone());
    let format = session.format();
    let sink = CpalSink::init(
        host,
        cfg.device.as_deref(),
        format,
        cfg.playback.buffer_frames(format.sample_rate),
    )
    .context("init audio output")?;
    let output = sink.play_session(&session).context("start playback")?;

    let controller = session.controller();
    let reporter = StatusReporter::spawn_stdout(controller.clone(), cfg.playback.status_interval);

    let (cmd_tx, cmd_rx) = unbounded::<Command>();
    let ctrlc_tx = cmd_tx.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        let _ = ctrlc_tx.send(Command::Quit);
    }) {
        tracing::warn!("ctrl-c handler not installed: {e}");
    }
    controls::spawn_stdin_reader(cmd_tx);
    eprintln!("{}", controls::HELP);

    let finished_poll = tick(FINISH_POLL);
    loop {
        select! {
            recv(cmd_rx) -> msg => match msg {
                Ok(cmd) => {
                    tracing::debug!(?cmd, "control");
                    if !controls::apply(&controller, &cfg.steps, cmd) {
                        break;
                    }
                }
                // stdin closed and no ctrl-c sender left; keep playing until the track ends
                Err(_) => {
                    wait_for_end(&session);
                    break;
                }
            },
            recv(finished_poll) -> _ => {
                if session.is_finished() {
                    tracing::info!("playback finished");
                    break;
                }
            }
        }
    }

    reporter.stop();
    output.stop();
    Ok(())
}

fn wait_for_end(session: &Session) {
    while !session.is_finished() {
        std::thread::sleep(FINISH_POLL);
    }
}
