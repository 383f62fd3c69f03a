//! Pomo - a Pomodoro timer for the terminal
//!
//! The core is a timer state machine (`machine`) that runs either a simple
//! repeating work/break cycle or a planned daily schedule. Around it sit the
//! host runtime that executes its effects, durable storage for settings and
//! the schedule, the audible cue, an IPC server for `pomoctl`, and the TUI.

pub mod app;
pub mod clock;
pub mod config;
pub mod countdown;
pub mod cue;
pub mod host;
pub mod ipc;
pub mod machine;
pub mod persistence;
pub mod schedule;
pub mod settings;
pub mod ui;

// Re-export commonly used types
pub use host::{Host, HostHandle, HostOptions};
pub use machine::{Effect, Event, Machine, Snapshot, TimerState};
pub use settings::Settings;
