use std::fmt;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, Sender, bounded};

use crate::controller::Controller;

/// Point-in-time view of the playback state, taken under the session lock.
#[derive(Clone, Debug, PartialEq)]
pub struct StatusSnapshot {
    /// Elapsed position in the track.
    pub position: Duration,
    /// Total track length.
    pub length: Duration,
    pub position_frames: usize,
    /// Volume exponent.
    pub volume: f64,
    pub speed: f64,
    pub paused: bool,
    pub silent: bool,
    /// Restarts left before the stream ends (-1 = forever).
    pub loops_remaining: i64,
}

impl StatusSnapshot {
    /// Position rounded to whole seconds.
    pub fn position_secs(&self) -> u64 {
        self.position.as_secs_f64().round() as u64
    }

    pub fn length_secs(&self) -> u64 {
        self.length.as_secs_f64().round() as u64
    }
}

impl fmt::Display for StatusSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Position: {}s / {}s | Volume: {} | Speed: {}",
            self.position_secs(),
            self.length_secs(),
            self.volume,
            self.speed
        )?;
        if self.paused {
            write!(f, " | paused")?;
        }
        if self.silent {
            write!(f, " | muted")?;
        }
        Ok(())
    }
}

/// Periodic status printer running on its own thread.
///
/// Stops when [`StatusReporter::stop`] is called or the reporter is dropped.
pub struct StatusReporter {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl StatusReporter {
    /// Print a snapshot line to stdout every `interval`.
    pub fn spawn_stdout(controller: Controller, interval: Duration) -> Self {
        Self::spawn(controller, interval, |snap| println!("{snap}"))
    }

    /// Call `emit` with a fresh snapshot immediately and then every `interval`.
    pub fn spawn<F>(controller: Controller, interval: Duration, mut emit: F) -> Self
    where
        F: FnMut(&StatusSnapshot) + Send + 'static,
    {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("status".to_string())
            .spawn(move || {
                loop {
                    let snap = controller.snapshot();
                    tracing::trace!(?snap, "status");
                    emit(&snap);
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            });

        let handle = match handle {
            Ok(h) => Some(h),
            Err(e) => {
                tracing::warn!("status reporter not started: {e}");
                None
            }
        };

        Self {
            stop_tx: Some(stop_tx),
            handle,
        }
    }

    /// Signal the reporter thread and wait for it to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.try_send(());
        }
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("status reporter panicked");
            }
        }
    }
}

impl Drop for StatusReporter {
    fn drop(&mut self) {
        self.shutdown();
    }
}
