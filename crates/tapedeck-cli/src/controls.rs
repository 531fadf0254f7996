//! Line-based control surface on stdin.
//!
//! Each line is one command; unknown input is ignored with a hint. The reader thread only
//! forwards parsed commands over a channel, the main loop applies them via the controller.

use std::io::BufRead;
use std::thread;

use crossbeam_channel::Sender;
use tapedeck::Controller;

use crate::config::ControlSteps;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    TogglePause,
    VolumeUp,
    VolumeDown,
    SpeedUp,
    SpeedDown,
    SeekForward,
    SeekBackward,
    ToggleMute,
    Status,
    Quit,
}

pub const HELP: &str =
    "controls: p=pause  +/-=volume  ]/[=speed  >/<=seek  m=mute  s=status  q=quit";

/// Parse one input line. Whitespace-only input toggles pause.
pub fn parse_command(line: &str) -> Option<Command> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return if line.contains(' ') {
            Some(Command::TogglePause)
        } else {
            None
        };
    }
    let cmd = match trimmed.to_lowercase().as_str() {
        "p" | "pause" => Command::TogglePause,
        "+" | "=" | "up" => Command::VolumeUp,
        "-" | "_" | "down" => Command::VolumeDown,
        "]" | "faster" => Command::SpeedUp,
        "[" | "slower" => Command::SpeedDown,
        ">" | "." | "ff" => Command::SeekForward,
        "<" | "," | "rw" => Command::SeekBackward,
        "m" | "mute" => Command::ToggleMute,
        "s" | "status" => Command::Status,
        "q" | "quit" | "exit" => Command::Quit,
        _ => return None,
    };
    Some(cmd)
}

/// Apply `cmd` to the session. Returns `false` when the player should exit.
pub fn apply(controller: &Controller, steps: &ControlSteps, cmd: Command) -> bool {
    match cmd {
        Command::TogglePause => controller.toggle_pause(),
        Command::VolumeUp => controller.increase_volume(steps.volume),
        Command::VolumeDown => controller.decrease_volume(steps.volume),
        Command::SpeedUp => controller.increase_speed(steps.speed),
        Command::SpeedDown => controller.decrease_speed(steps.speed),
        Command::SeekForward => controller.seek_forward(steps.seek),
        Command::SeekBackward => controller.seek_backward(steps.seek),
        Command::ToggleMute => controller.toggle_silent(),
        Command::Status => println!("{}", controller.snapshot()),
        Command::Quit => return false,
    }
    true
}

/// Spawn a detached thread reading commands from stdin until EOF.
pub fn spawn_stdin_reader(tx: Sender<Command>) {
    let spawned = thread::Builder::new()
        .name("stdin-controls".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(l) => l,
                    Err(e) => {
                        tracing::warn!("stdin read error: {e}");
                        break;
                    }
                };
                match parse_command(&line) {
                    Some(cmd) => {
                        if tx.send(cmd).is_err() {
                            break;
                        }
                    }
                    None if line.trim().is_empty() => {}
                    None => eprintln!("{HELP}"),
                }
            }
            tracing::debug!("stdin closed");
        });
    if let Err(e) = spawned {
        tracing::warn!("stdin controls unavailable: {e}");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use tapedeck::decode::BufferedStream;
    use tapedeck::{PlaybackConfig, Session};

    #[test]
    fn parses_symbols_and_words() {
        assert_eq!(parse_command("p"), Some(Command::TogglePause));
        assert_eq!(parse_command(" "), Some(Command::TogglePause));
        assert_eq!(parse_command("+"), Some(Command::VolumeUp));
        assert_eq!(parse_command("-"), Some(Command::VolumeDown));
        assert_eq!(parse_command("]"), Some(Command::SpeedUp));
        assert_eq!(parse_command("["), Some(Command::SpeedDown));
        assert_eq!(parse_command(">"), Some(Command::SeekForward));
        assert_eq!(parse_command("<"), Some(Command::SeekBackward));
        assert_eq!(parse_command("MUTE"), Some(Command::ToggleMute));
        assert_eq!(parse_command("q\n"), Some(Command::Quit));
        assert_eq!(parse_command(""), None);
        assert_eq!(parse_command("xyz"), None);
    }

    #[test]
    fn apply_drives_controller() {
        let session = Session::new(
            Box::new(BufferedStream::from_interleaved(vec![0.0; 10_000], 1, 1_000)),
            PlaybackConfig::default(),
        );
        let ctl = session.controller();
        let steps = ControlSteps {
            volume: 0.5,
            speed: 0.25,
            seek: Duration::from_secs(2),
        };

        assert!(apply(&ctl, &steps, Command::VolumeUp));
        assert!(apply(&ctl, &steps, Command::SpeedDown));
        assert!(apply(&ctl, &steps, Command::SeekForward));
        assert!(apply(&ctl, &steps, Command::TogglePause));
        assert!(!apply(&ctl, &steps, Command::Quit));

        let snap = ctl.snapshot();
        assert_eq!(snap.volume, 0.5);
        assert_eq!(snap.speed, 0.75);
        assert_eq!(snap.position_frames, 2_000);
        assert!(snap.paused);
    }
}
