//! Runs the timer machine on its own tokio task.
//!
//! The host is the only owner of the `Machine`. Everything else (the TUI,
//! the IPC server, the ticker, the continuation timer) talks to it through
//! a `HostHandle` and reads published `Snapshot`s. Messages are handled one
//! at a time, so no transition ever observes another half-done.

use crate::cue::{completion_message, send_notification, Cue, TEST_CUE_DURATION};
use crate::machine::{Effect, Event, Machine, Snapshot};
use crate::persistence::{load_schedule, load_settings, save_schedule, save_settings, KeyValueStore};
use crate::schedule::should_auto_start;
use pomo_ipc::{Mode, RunState};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant};
use tracing::{debug, error, info, trace};

const INBOX_CAPACITY: usize = 64;
const TICK_PERIOD: Duration = Duration::from_secs(1);
/// How often an idle planned schedule checks whether it should start.
pub const SCHEDULE_CHECK_PERIOD: Duration = Duration::from_secs(10);

#[derive(Debug)]
pub enum HostMessage {
    Event {
        event: Event,
        reply: Option<oneshot::Sender<Snapshot>>,
    },
    Tick {
        epoch: u64,
    },
    Continue {
        epoch: u64,
    },
    TestCue,
    CheckSchedule,
    Shutdown,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("timer host has shut down")]
pub struct HostClosed;

#[derive(Debug, Clone, Copy)]
pub struct HostOptions {
    pub notifications: bool,
    pub auto_start_planned: bool,
}

impl Default for HostOptions {
    fn default() -> Self {
        Self {
            notifications: true,
            auto_start_planned: true,
        }
    }
}

/// A background task tagged with the epoch its messages carry. Dropping it
/// cancels the task.
struct Scheduled {
    epoch: u64,
    task: JoinHandle<()>,
}

impl Drop for Scheduled {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub struct Host {
    machine: Machine,
    store: Box<dyn KeyValueStore>,
    cue: Box<dyn Cue>,
    options: HostOptions,
    inbox: mpsc::Receiver<HostMessage>,
    // Weak so the host stops once every handle is gone.
    outbox: mpsc::WeakSender<HostMessage>,
    snapshots: watch::Sender<Snapshot>,
    ticker: Option<Scheduled>,
    continuation: Option<Scheduled>,
    next_epoch: u64,
}

#[derive(Clone)]
pub struct HostHandle {
    tx: mpsc::Sender<HostMessage>,
    snapshots: watch::Receiver<Snapshot>,
}

impl HostHandle {
    /// Fire and forget.
    pub async fn send(&self, event: Event) -> Result<(), HostClosed> {
        self.tx
            .send(HostMessage::Event { event, reply: None })
            .await
            .map_err(|_| HostClosed)
    }

    /// Sends an event and waits for the snapshot right after it was handled.
    pub async fn request(&self, event: Event) -> Result<Snapshot, HostClosed> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(HostMessage::Event {
                event,
                reply: Some(reply),
            })
            .await
            .map_err(|_| HostClosed)?;
        rx.await.map_err(|_| HostClosed)
    }

    /// For callers outside the runtime, like the terminal loop.
    pub fn blocking_send(&self, event: Event) -> Result<(), HostClosed> {
        self.blocking_message(HostMessage::Event { event, reply: None })
    }

    pub fn blocking_message(&self, message: HostMessage) -> Result<(), HostClosed> {
        self.tx.blocking_send(message).map_err(|_| HostClosed)
    }

    pub async fn test_cue(&self) -> Result<(), HostClosed> {
        self.tx
            .send(HostMessage::TestCue)
            .await
            .map_err(|_| HostClosed)
    }

    pub async fn shutdown(&self) -> Result<(), HostClosed> {
        self.tx
            .send(HostMessage::Shutdown)
            .await
            .map_err(|_| HostClosed)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshots.clone()
    }
}

impl Host {
    /// Restores settings and the schedule from `store` into `machine`.
    pub fn new(
        mut machine: Machine,
        store: Box<dyn KeyValueStore>,
        cue: Box<dyn Cue>,
        options: HostOptions,
    ) -> (Self, HostHandle) {
        let settings = load_settings(store.as_ref());
        let entries = load_schedule(store.as_ref());
        info!(
            work = settings.work_duration,
            brk = settings.break_duration,
            entries = entries.len(),
            "Restoring saved state"
        );
        // Restoring is not a change worth writing back.
        machine.send(Event::UpdateSettings(settings.to_patch()));
        machine.send(Event::LoadPlannedEntries(entries));

        let (tx, inbox) = mpsc::channel(INBOX_CAPACITY);
        let (snapshots, snapshot_rx) = watch::channel(machine.snapshot());
        let host = Self {
            machine,
            store,
            cue,
            options,
            inbox,
            outbox: tx.downgrade(),
            snapshots,
            ticker: None,
            continuation: None,
            next_epoch: 0,
        };
        let handle = HostHandle {
            tx,
            snapshots: snapshot_rx,
        };
        (host, handle)
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) {
        info!("Timer host started");
        let _schedule_check = self
            .options
            .auto_start_planned
            .then(|| self.start_schedule_check());

        while let Some(message) = self.inbox.recv().await {
            match message {
                HostMessage::Event { event, reply } => {
                    self.dispatch(event);
                    if let Some(reply) = reply {
                        let _ = reply.send(self.machine.snapshot());
                    }
                }
                HostMessage::Tick { epoch } => {
                    if self.ticker.as_ref().map(|t| t.epoch) == Some(epoch) {
                        self.dispatch(Event::Tick);
                    } else {
                        trace!(epoch, "stale tick dropped");
                    }
                }
                HostMessage::Continue { epoch } => {
                    if self.continuation.as_ref().map(|t| t.epoch) == Some(epoch) {
                        self.continuation = None;
                        self.dispatch(Event::Continue);
                    } else {
                        trace!(epoch, "stale continuation dropped");
                    }
                }
                HostMessage::TestCue => {
                    let volume = self.machine.timer().settings.volume;
                    self.cue.play(TEST_CUE_DURATION, volume);
                }
                HostMessage::CheckSchedule => self.check_schedule(),
                HostMessage::Shutdown => break,
            }
            self.snapshots.send_replace(self.machine.snapshot());
        }

        self.ticker = None;
        self.continuation = None;
        self.cue.stop();
        info!("Timer host stopped");
    }

    fn dispatch(&mut self, event: Event) {
        for effect in self.machine.send(event) {
            self.apply(effect);
        }
    }

    fn apply(&mut self, effect: Effect) {
        match effect {
            Effect::StartTicker => self.ticker = Some(self.start_ticker()),
            Effect::StopTicker => self.ticker = None,
            Effect::ScheduleContinuation(delay) => {
                self.continuation = Some(self.schedule_continuation(delay))
            }
            Effect::CancelContinuation => self.continuation = None,
            Effect::PlayCue { duration, volume } => self.cue.play(duration, volume),
            Effect::StopCue => self.cue.stop(),
            Effect::Announce { phase, entry } => {
                info!(%phase, entry = entry.as_deref().unwrap_or("-"), "Phase complete");
                if self.options.notifications {
                    let (title, body) = completion_message(phase, entry.as_deref());
                    send_notification(title, body);
                }
            }
            Effect::PersistSettings(settings) => {
                if let Err(e) = save_settings(self.store.as_mut(), &settings) {
                    error!("Failed to save settings: {}", e);
                }
            }
            Effect::PersistSchedule(entries) => {
                if let Err(e) = save_schedule(self.store.as_mut(), &entries) {
                    error!("Failed to save planned schedule: {}", e);
                }
            }
        }
    }

    fn check_schedule(&mut self) {
        let timer = self.machine.timer();
        let due = self.machine.state() == RunState::Idle
            && timer.mode == Mode::Planned
            && should_auto_start(&timer.schedule, &timer.settings, self.machine.now());
        if due {
            info!("Planned schedule reached its start time");
            self.dispatch(Event::StartPlanned);
        }
    }

    fn epoch(&mut self) -> u64 {
        self.next_epoch += 1;
        self.next_epoch
    }

    fn start_ticker(&mut self) -> Scheduled {
        let epoch = self.epoch();
        let outbox = self.outbox.clone();
        debug!(epoch, "ticker started");
        let task = tokio::spawn(async move {
            let mut interval = interval_at(Instant::now() + TICK_PERIOD, TICK_PERIOD);
            loop {
                interval.tick().await;
                let Some(tx) = outbox.upgrade() else { break };
                if tx.send(HostMessage::Tick { epoch }).await.is_err() {
                    break;
                }
            }
        });
        Scheduled { epoch, task }
    }

    fn schedule_continuation(&mut self, delay: Duration) -> Scheduled {
        let epoch = self.epoch();
        let outbox = self.outbox.clone();
        debug!(epoch, ?delay, "continuation scheduled");
        let task = tokio::spawn(async move {
            sleep(delay).await;
            if let Some(tx) = outbox.upgrade() {
                let _ = tx.send(HostMessage::Continue { epoch }).await;
            }
        });
        Scheduled { epoch, task }
    }

    fn start_schedule_check(&self) -> Scheduled {
        let outbox = self.outbox.clone();
        let task = tokio::spawn(async move {
            let mut interval = interval_at(
                Instant::now() + SCHEDULE_CHECK_PERIOD,
                SCHEDULE_CHECK_PERIOD,
            );
            loop {
                interval.tick().await;
                let Some(tx) = outbox.upgrade() else { break };
                if tx.send(HostMessage::CheckSchedule).await.is_err() {
                    break;
                }
            }
        });
        Scheduled { epoch: 0, task }
    }
}
