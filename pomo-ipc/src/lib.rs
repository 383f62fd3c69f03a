//! Inter-process communication between pomo and pomoctl
//!
//! We use Unix domain sockets for local IPC. A client connects, writes one
//! newline-terminated JSON `Command`, and reads one JSON `Response` back.
//! The timer vocabulary (`Mode`, `Phase`, `RunState`, patches) lives here so
//! both ends agree on it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Which cycle the timer follows.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Fixed work/break durations, repeating.
    #[default]
    Default,
    /// Driven by the user's daily schedule of planned entries.
    Planned,
}

/// Work/break sub-state of an active session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    #[default]
    Idle,
    Work,
    Break,
}

/// Top-level state of the timer machine.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Paused,
    Completed,
}

/// Partial settings update. Absent fields are left unchanged.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SettingsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_duration: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub break_duration: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_repeat: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
}

impl SettingsPatch {
    pub fn is_empty(&self) -> bool {
        self.work_duration.is_none()
            && self.break_duration.is_none()
            && self.auto_repeat.is_none()
            && self.volume.is_none()
    }
}

/// Partial planned-entry update. Times are "HH:MM" strings.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EntryPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub work_end_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub break_end_time: Option<String>,
}

/// Commands that pomoctl can send to pomo
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Command {
    StartWork,
    StartPlanned,
    StartBreak,
    Pause,
    Resume,
    Stop,
    Reset,
    SwitchMode { mode: Mode },
    UpdateSettings { patch: SettingsPatch },
    /// Fields left out are suggested from the end of the current schedule.
    AddEntry { draft: EntryPatch },
    UpdateEntry { id: String, patch: EntryPatch },
    DeleteEntry { id: String },
    Status,
    ListEntries,
}

/// Responses from pomo back to pomoctl
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    Status(StatusReport),
    Entries(Vec<EntryReport>),
    Error(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub state: RunState,
    pub mode: Mode,
    pub phase: Phase,
    pub remaining_secs: u32,
    /// Remaining time rendered as MM:SS.
    pub countdown: String,
    pub work_duration: u32,
    pub break_duration: u32,
    pub auto_repeat: bool,
    pub volume: f64,
    pub current_entry: Option<EntryReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryReport {
    pub index: usize,
    pub id: String,
    pub name: String,
    pub start_time: String,
    pub work_end_time: String,
    pub break_end_time: String,
    pub current: bool,
}

#[derive(Error, Debug)]
pub enum IpcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Connection refused - is pomo running?")]
    ConnectionRefused,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown mode '{0}', expected 'default' or 'planned'")]
pub struct ParseModeError(pub String);

impl FromStr for Mode {
    type Err = ParseModeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "default" => Ok(Mode::Default),
            "planned" => Ok(Mode::Planned),
            other => Err(ParseModeError(other.to_string())),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Mode::Default => "default",
            Mode::Planned => "planned",
        })
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Phase::Idle => "Ready",
            Phase::Work => "Work",
            Phase::Break => "Break",
        })
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Paused => "paused",
            RunState::Completed => "completed",
        })
    }
}

pub const SOCKET_PATH: &str = "/tmp/pomo.sock";
