//! The timer state machine.
//!
//! `Machine::send` takes one event, applies the transition for the current
//! state, and returns the side effects the host has to carry out (ticker,
//! delayed continuation, cue, persistence). The machine itself never touches
//! timers, audio or storage, so every transition can be tested directly.
//!
//! States: `idle`, `running`, `paused`, `completed`. Events that make no
//! sense in the current state are ignored.

use crate::clock::{ClockTime, LocalClock, WallClock};
use crate::schedule::{PlannedEntry, Schedule};
use crate::settings::Settings;
use pomo_ipc::{EntryPatch, Mode, Phase, RunState, SettingsPatch};
use std::time::Duration;
use tracing::{debug, trace};

/// How long `completed` waits before deciding what comes next.
pub const COMPLETION_DELAY: Duration = Duration::from_secs(5);
/// How long the completion cue plays.
pub const CUE_DURATION: Duration = Duration::from_secs(5);

/// Everything the machine knows besides its top-level state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TimerState {
    pub mode: Mode,
    pub phase: Phase,
    /// Seconds left in the current phase.
    pub remaining_time: u32,
    /// Seconds the current phase started with; zero when idle.
    pub phase_length: u32,
    pub settings: Settings,
    pub schedule: Schedule,
}

impl TimerState {
    pub fn current_planned_index(&self) -> Option<usize> {
        self.schedule.current_index()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    StartWork,
    /// Only honored from `completed`.
    StartBreak,
    StartPlanned,
    Pause,
    Resume,
    Stop,
    Reset,
    Tick,
    /// The delayed continuation out of `completed` fired.
    Continue,
    SwitchMode(Mode),
    UpdateSettings(SettingsPatch),
    AddPlannedEntry(PlannedEntry),
    UpdatePlannedEntry { id: String, patch: EntryPatch },
    DeletePlannedEntry { id: String },
    LoadPlannedEntries(Vec<PlannedEntry>),
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::StartWork => "start_work",
            Event::StartBreak => "start_break",
            Event::StartPlanned => "start_planned",
            Event::Pause => "pause",
            Event::Resume => "resume",
            Event::Stop => "stop",
            Event::Reset => "reset",
            Event::Tick => "tick",
            Event::Continue => "continue",
            Event::SwitchMode(_) => "switch_mode",
            Event::UpdateSettings(_) => "update_settings",
            Event::AddPlannedEntry(_) => "add_planned_entry",
            Event::UpdatePlannedEntry { .. } => "update_planned_entry",
            Event::DeletePlannedEntry { .. } => "delete_planned_entry",
            Event::LoadPlannedEntries(_) => "load_planned_entries",
        }
    }
}

/// Work for the host, in the order it should be done.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Begin sending `Event::Tick` once per second.
    StartTicker,
    StopTicker,
    /// Send `Event::Continue` after the delay unless cancelled first.
    ScheduleContinuation(Duration),
    CancelContinuation,
    PlayCue { duration: Duration, volume: f64 },
    StopCue,
    /// A phase ran out. `entry` names the planned entry, if any.
    Announce { phase: Phase, entry: Option<String> },
    PersistSettings(Settings),
    PersistSchedule(Vec<PlannedEntry>),
}

/// Read-only view handed to presentation and IPC.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Snapshot {
    pub state: RunState,
    pub timer: TimerState,
}

impl Snapshot {
    pub fn is_idle(&self) -> bool {
        self.state == RunState::Idle
    }

    pub fn is_running(&self) -> bool {
        self.state == RunState::Running
    }

    pub fn is_paused(&self) -> bool {
        self.state == RunState::Paused
    }

    pub fn is_completed(&self) -> bool {
        self.state == RunState::Completed
    }

    pub fn current_entry_name(&self) -> Option<String> {
        let index = self.timer.current_planned_index()?;
        self.timer
            .schedule
            .get(index)
            .map(|e| e.display_name(index))
    }
}

enum Transition {
    Stay,
    Goto(RunState),
}

/// What follows a finished phase, first match wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Continuation {
    PlannedBreak,
    Break,
    Work,
    NextPlannedWork,
    Finish,
}

pub struct Machine {
    state: RunState,
    timer: TimerState,
    clock: Box<dyn WallClock>,
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

impl Machine {
    pub fn new() -> Self {
        Self::with_clock(LocalClock)
    }

    pub fn with_clock(clock: impl WallClock + 'static) -> Self {
        Self {
            state: RunState::Idle,
            timer: TimerState::default(),
            clock: Box::new(clock),
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn timer(&self) -> &TimerState {
        &self.timer
    }

    pub fn now(&self) -> ClockTime {
        self.clock.now()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            state: self.state,
            timer: self.timer.clone(),
        }
    }

    pub fn send(&mut self, event: Event) -> Vec<Effect> {
        let settings_before = self.timer.settings.clone();
        let entries_before = self.timer.schedule.entries().to_vec();
        let from = self.state;

        let mut effects = Vec::new();
        if let Transition::Goto(to) = self.transition(event) {
            debug!(%from, %to, phase = %self.timer.phase, remaining = self.timer.remaining_time, "transition");
            self.exit(from, &mut effects);
            self.state = to;
            self.enter(to, &mut effects);
        }

        if self.timer.settings != settings_before {
            effects.push(Effect::PersistSettings(self.timer.settings.clone()));
        }
        if self.timer.schedule.entries() != entries_before.as_slice() {
            effects.push(Effect::PersistSchedule(self.timer.schedule.entries().to_vec()));
        }
        effects
    }

    fn transition(&mut self, event: Event) -> Transition {
        use RunState::*;
        match (self.state, event) {
            (Idle, Event::StartWork) => {
                self.start_work();
                Transition::Goto(Running)
            }
            (Idle, Event::StartPlanned) if !self.timer.schedule.is_empty() => {
                self.timer.schedule.begin();
                self.start_planned_work();
                Transition::Goto(Running)
            }
            (Idle, Event::SwitchMode(mode)) => {
                self.timer.mode = mode;
                self.timer.schedule.clear_current();
                self.reset_to_idle();
                Transition::Stay
            }
            (Idle, Event::UpdateSettings(patch)) => {
                self.timer.settings.apply(&patch);
                Transition::Stay
            }
            (Idle, Event::Reset) => {
                self.timer.settings = Settings::default();
                Transition::Stay
            }
            (Idle, Event::AddPlannedEntry(entry)) => {
                let id = entry.id.clone();
                if !self.timer.schedule.add(entry) {
                    debug!(%id, "planned entry id already taken, ignoring");
                }
                Transition::Stay
            }
            (Idle, Event::UpdatePlannedEntry { id, patch }) => {
                if !self.timer.schedule.update(&id, &patch) {
                    debug!(%id, "no planned entry to update");
                }
                Transition::Stay
            }
            (Idle, Event::DeletePlannedEntry { id }) => {
                if !self.timer.schedule.remove(&id) {
                    debug!(%id, "no planned entry to delete");
                }
                Transition::Stay
            }
            (Idle, Event::LoadPlannedEntries(entries)) => {
                self.timer.schedule.replace(entries);
                Transition::Stay
            }

            (Running, Event::Tick) => {
                if self.timer.remaining_time > 0 {
                    self.timer.remaining_time -= 1;
                    Transition::Stay
                } else {
                    Transition::Goto(Completed)
                }
            }
            (Running, Event::Pause) => Transition::Goto(Paused),
            (Paused, Event::Resume) => Transition::Goto(Running),
            (Running | Paused | Completed, Event::Stop) => {
                self.reset_to_idle();
                Transition::Goto(Idle)
            }

            (Completed, Event::Continue) => self.continue_after_completion(),
            (Completed, Event::StartWork) => {
                self.start_work();
                Transition::Goto(Running)
            }
            (Completed, Event::StartBreak) => {
                self.start_break();
                Transition::Goto(Running)
            }

            (state, event) => {
                trace!(%state, event = event.name(), "event ignored");
                Transition::Stay
            }
        }
    }

    fn exit(&mut self, state: RunState, effects: &mut Vec<Effect>) {
        match state {
            RunState::Running => effects.push(Effect::StopTicker),
            RunState::Completed => {
                effects.push(Effect::CancelContinuation);
                effects.push(Effect::StopCue);
            }
            RunState::Idle | RunState::Paused => {}
        }
    }

    fn enter(&mut self, state: RunState, effects: &mut Vec<Effect>) {
        match state {
            RunState::Running => effects.push(Effect::StartTicker),
            RunState::Completed => {
                effects.push(Effect::PlayCue {
                    duration: CUE_DURATION,
                    volume: self.timer.settings.volume,
                });
                let entry = match self.timer.mode {
                    Mode::Planned => self.snapshot_entry_name(),
                    Mode::Default => None,
                };
                effects.push(Effect::Announce {
                    phase: self.timer.phase,
                    entry,
                });
                effects.push(Effect::ScheduleContinuation(COMPLETION_DELAY));
            }
            RunState::Idle | RunState::Paused => {}
        }
    }

    fn snapshot_entry_name(&self) -> Option<String> {
        let index = self.timer.current_planned_index()?;
        self.timer
            .schedule
            .get(index)
            .map(|e| e.display_name(index))
    }

    fn next_after_completion(&self) -> Continuation {
        let timer = &self.timer;
        let auto = timer.settings.auto_repeat;
        match (timer.phase, timer.mode) {
            (Phase::Work, Mode::Planned) if auto => Continuation::PlannedBreak,
            (Phase::Work, Mode::Default) if auto => Continuation::Break,
            (Phase::Break, Mode::Default) if auto => Continuation::Work,
            (Phase::Break, Mode::Planned) if auto && timer.schedule.has_next() => {
                Continuation::NextPlannedWork
            }
            _ => Continuation::Finish,
        }
    }

    fn continue_after_completion(&mut self) -> Transition {
        let next = self.next_after_completion();
        debug!(?next, "continuing after completion");
        match next {
            Continuation::PlannedBreak => self.start_planned_break(),
            Continuation::Break => self.start_break(),
            Continuation::Work => self.start_work(),
            Continuation::NextPlannedWork => {
                self.timer.schedule.advance();
                self.start_planned_work();
            }
            Continuation::Finish => {
                let schedule_done = self.timer.mode == Mode::Planned
                    && self.timer.phase == Phase::Break
                    && !self.timer.schedule.has_next();
                if schedule_done {
                    self.timer.schedule.clear_current();
                }
                self.reset_to_idle();
                return Transition::Goto(RunState::Idle);
            }
        }
        Transition::Goto(RunState::Running)
    }

    fn start_phase(&mut self, phase: Phase, secs: u32) {
        self.timer.phase = phase;
        self.timer.remaining_time = secs;
        self.timer.phase_length = secs;
    }

    fn start_work(&mut self) {
        let secs = self.timer.settings.work_secs();
        self.start_phase(Phase::Work, secs);
    }

    fn start_break(&mut self) {
        let secs = self.timer.settings.break_secs();
        self.start_phase(Phase::Break, secs);
    }

    fn start_planned_work(&mut self) {
        let secs = self.planned_secs(|e| e.work_end_time, self.timer.settings.work_secs());
        self.start_phase(Phase::Work, secs);
    }

    fn start_planned_break(&mut self) {
        let secs = self.planned_secs(|e| e.break_end_time, self.timer.settings.break_secs());
        self.start_phase(Phase::Break, secs);
    }

    /// Whole minutes from now until the current entry's boundary. A missing
    /// entry falls back to `default_secs`.
    fn planned_secs(&self, boundary: fn(&PlannedEntry) -> ClockTime, default_secs: u32) -> u32 {
        match self.timer.schedule.current_entry() {
            Some(entry) => self.clock.now().minutes_until(&boundary(entry)) * 60,
            None => default_secs,
        }
    }

    fn reset_to_idle(&mut self) {
        self.timer.phase = Phase::Idle;
        self.timer.remaining_time = 0;
        self.timer.phase_length = 0;
    }
}
