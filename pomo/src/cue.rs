//! Audible cue and desktop notifications for finished phases.
//!
//! Both are best effort. Failures are logged and never reach the machine.

use pomo_ipc::Phase;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Length of the cue played by the "test" key.
pub const TEST_CUE_DURATION: Duration = Duration::from_secs(1);

/// Something that can make noise for a while. At most one cue plays at a
/// time: `play` replaces whatever is still playing.
pub trait Cue: Send {
    fn play(&mut self, duration: Duration, volume: f64);
    fn stop(&mut self);
}

/// Pending terminal bell rings. The cue task only counts them; whoever owns
/// the terminal writes the BEL bytes between frames. Clones share the count.
#[derive(Debug, Default, Clone)]
pub struct Bell {
    pending: Arc<AtomicU32>,
}

impl Bell {
    fn ring(&self) {
        self.pending.fetch_add(1, Ordering::SeqCst);
    }

    /// Rings requested since the last call.
    pub fn take(&self) -> u32 {
        self.pending.swap(0, Ordering::SeqCst)
    }
}

/// Rings the terminal bell once a second for the cue's duration.
///
/// The bell has no loudness, so volume only decides between muted
/// (`<= 0.0`) and audible. Every non-zero volume rings the same bell.
pub struct BellCue {
    bell: Bell,
    task: Option<JoinHandle<()>>,
}

impl BellCue {
    pub fn new(bell: Bell) -> Self {
        Self { bell, task: None }
    }
}

impl Cue for BellCue {
    fn play(&mut self, duration: Duration, volume: f64) {
        self.stop();
        if volume <= 0.0 {
            debug!("Cue muted");
            return;
        }
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Failed to play cue: {}", e);
                return;
            }
        };
        let rings = duration.as_secs().max(1);
        let bell = self.bell.clone();
        self.task = Some(handle.spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            for _ in 0..rings {
                interval.tick().await;
                bell.ring();
            }
        }));
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for BellCue {
    fn drop(&mut self) {
        self.stop();
    }
}

/// A cue that does nothing, for `--quiet` style embedding.
#[derive(Debug, Default)]
pub struct SilentCue;

impl Cue for SilentCue {
    fn play(&mut self, _duration: Duration, _volume: f64) {}
    fn stop(&mut self) {}
}

/// Title and body for the notification about a finished phase.
pub fn completion_message(phase: Phase, entry: Option<&str>) -> (String, String) {
    let title = match entry {
        Some(name) => format!("{} - {}", name, phase),
        None => phase.to_string(),
    };
    let body = match phase {
        Phase::Work => "Work session complete. Time for a break.",
        Phase::Break => "Break is over. Back to work.",
        Phase::Idle => "Timer finished.",
    };
    (title, body.to_string())
}

/// Shows a desktop notification without blocking the caller.
pub fn send_notification(title: String, body: String) {
    let show = move || {
        if let Err(e) = notify_rust::Notification::new()
            .summary(&title)
            .body(&body)
            .appname("pomo")
            .show()
        {
            warn!("Failed to send notification: {}", e);
        }
    };
    match Handle::try_current() {
        Ok(handle) => {
            handle.spawn_blocking(show);
        }
        Err(_) => show(),
    }
}
