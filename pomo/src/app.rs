//! Terminal interaction state: which panel has focus, the entry form, and
//! how key presses turn into requests for the timer host.

use crate::clock::ClockTime;
use crate::config::Config;
use crate::machine::{Event, Snapshot};
use crate::schedule::{next_entry_id, EntryDraft};
use crate::settings::{TIME_INCREMENTS, VOLUME_STEP};
use chrono::Local;
use crossterm::event::{KeyCode, KeyEvent};
use pomo_ipc::{EntryPatch, Mode};

/// What the terminal loop should do after a key press.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    None,
    Send(Event),
    TestCue,
    Quit,
}

#[derive(Default, Clone, PartialEq, Debug)]
pub enum AppMode {
    #[default]
    Normal,
    EntryForm(EntryForm),
    ShowHelp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    Name,
    Start,
    WorkEnd,
    BreakEnd,
}

impl FormField {
    pub const ALL: [FormField; 4] = [
        FormField::Name,
        FormField::Start,
        FormField::WorkEnd,
        FormField::BreakEnd,
    ];

    pub fn label(self) -> &'static str {
        match self {
            FormField::Name => "Name",
            FormField::Start => "Start",
            FormField::WorkEnd => "Work ends",
            FormField::BreakEnd => "Break ends",
        }
    }

    fn next(self) -> Self {
        match self {
            FormField::Name => FormField::Start,
            FormField::Start => FormField::WorkEnd,
            FormField::WorkEnd => FormField::BreakEnd,
            FormField::BreakEnd => FormField::Name,
        }
    }

    fn prev(self) -> Self {
        match self {
            FormField::Name => FormField::BreakEnd,
            FormField::Start => FormField::Name,
            FormField::WorkEnd => FormField::Start,
            FormField::BreakEnd => FormField::WorkEnd,
        }
    }
}

/// Add or edit form for one planned entry. Time fields are free text until
/// they form a valid `HH:MM`; a valid start or work end recomputes the
/// fields after it.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryForm {
    /// Id of the entry being edited, `None` when adding.
    pub editing: Option<String>,
    pub focus: FormField,
    pub name: String,
    pub start: String,
    pub work_end: String,
    pub break_end: String,
    pub error: Option<String>,
}

impl EntryForm {
    pub fn from_draft(draft: EntryDraft, editing: Option<String>) -> Self {
        Self {
            editing,
            focus: FormField::Name,
            name: draft.name,
            start: draft.start_time.to_string(),
            work_end: draft.work_end_time.to_string(),
            break_end: draft.break_end_time.to_string(),
            error: None,
        }
    }

    pub fn value(&self, field: FormField) -> &str {
        match field {
            FormField::Name => &self.name,
            FormField::Start => &self.start,
            FormField::WorkEnd => &self.work_end,
            FormField::BreakEnd => &self.break_end,
        }
    }

    fn value_mut(&mut self, field: FormField) -> &mut String {
        match field {
            FormField::Name => &mut self.name,
            FormField::Start => &mut self.start,
            FormField::WorkEnd => &mut self.work_end,
            FormField::BreakEnd => &mut self.break_end,
        }
    }

    fn push(&mut self, c: char, snapshot: &Snapshot) {
        let field = self.focus;
        if field == FormField::Name {
            self.name.push(c);
            return;
        }
        let value = self.value_mut(field);
        if (c.is_ascii_digit() || c == ':') && value.len() < 5 {
            value.push(c);
        }
        self.recalculate(snapshot);
    }

    fn backspace(&mut self) {
        let field = self.focus;
        self.value_mut(field).pop();
    }

    fn recalculate(&mut self, snapshot: &Snapshot) {
        let settings = &snapshot.timer.settings;
        match self.focus {
            FormField::Start => {
                if let Some(start) = strict_time(&self.start) {
                    let draft = self.draft_from(start).with_start(start, settings);
                    self.work_end = draft.work_end_time.to_string();
                    self.break_end = draft.break_end_time.to_string();
                }
            }
            FormField::WorkEnd => {
                if let Some(work_end) = strict_time(&self.work_end) {
                    self.break_end = work_end
                        .add_minutes(settings.break_duration as i64)
                        .to_string();
                }
            }
            _ => {}
        }
    }

    fn draft_from(&self, start: ClockTime) -> EntryDraft {
        EntryDraft {
            name: self.name.clone(),
            start_time: start,
            work_end_time: start,
            break_end_time: start,
        }
    }

    /// The form's fields as a patch, or the label of the first bad time.
    pub fn to_patch(&self) -> Result<EntryPatch, String> {
        for field in [FormField::Start, FormField::WorkEnd, FormField::BreakEnd] {
            if strict_time(self.value(field)).is_none() {
                return Err(format!("{} must be HH:MM", field.label()));
            }
        }
        Ok(EntryPatch {
            name: Some(self.name.trim().to_string()),
            start_time: Some(self.start.clone()),
            work_end_time: Some(self.work_end.clone()),
            break_end_time: Some(self.break_end.clone()),
        })
    }
}

/// `HH:MM` with both parts in range. The form only accepts complete times;
/// stored values keep their lenient parsing.
fn strict_time(s: &str) -> Option<ClockTime> {
    let (h, m) = s.split_once(':')?;
    if h.is_empty() || m.len() != 2 {
        return None;
    }
    ClockTime::new(h.parse().ok()?, m.parse().ok()?)
}

pub struct App {
    pub config: Config,
    pub mode: AppMode,
    pub selected_entry: usize,
    /// Index into `TIME_INCREMENTS` used by the duration keys.
    pub increment: usize,
    /// One-line feedback shown in the status bar.
    pub message: Option<String>,
}

impl App {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            mode: AppMode::Normal,
            selected_entry: 0,
            increment: 0,
            message: None,
        }
    }

    pub fn step(&self) -> i64 {
        TIME_INCREMENTS[self.increment % TIME_INCREMENTS.len()]
    }

    pub fn handle_key(&mut self, key: KeyEvent, snapshot: &Snapshot) -> Action {
        self.clamp_selection(snapshot);
        match self.mode {
            AppMode::Normal => {
                self.message = None;
                self.handle_normal_key(key.code, snapshot)
            }
            AppMode::ShowHelp => {
                self.mode = AppMode::Normal;
                Action::None
            }
            AppMode::EntryForm(_) => self.handle_form_key(key.code, snapshot),
        }
    }

    fn handle_normal_key(&mut self, code: KeyCode, snapshot: &Snapshot) -> Action {
        let settings = &snapshot.timer.settings;
        let event = match code {
            KeyCode::Char('q') => return Action::Quit,
            KeyCode::Char('?') => {
                self.mode = AppMode::ShowHelp;
                return Action::None;
            }
            KeyCode::Char('t') => return Action::TestCue,
            KeyCode::Up | KeyCode::Char('k') => {
                self.selected_entry = self.selected_entry.saturating_sub(1);
                return Action::None;
            }
            KeyCode::Down | KeyCode::Char('j') => {
                let len = snapshot.timer.schedule.len();
                if len > 0 {
                    self.selected_entry = (self.selected_entry + 1).min(len - 1);
                }
                return Action::None;
            }
            KeyCode::Char('i') => {
                self.increment = (self.increment + 1) % TIME_INCREMENTS.len();
                self.message = Some(format!("Step: {} min", self.step()));
                return Action::None;
            }
            KeyCode::Char('a') => {
                if self.require_idle(snapshot) {
                    let draft = EntryDraft::suggest(&snapshot.timer.schedule, settings);
                    self.mode = AppMode::EntryForm(EntryForm::from_draft(draft, None));
                }
                return Action::None;
            }
            KeyCode::Char('e') => {
                if self.require_idle(snapshot) {
                    if let Some(entry) = snapshot.timer.schedule.get(self.selected_entry) {
                        let draft = EntryDraft {
                            name: entry.name.clone(),
                            start_time: entry.start_time,
                            work_end_time: entry.work_end_time,
                            break_end_time: entry.break_end_time,
                        };
                        self.mode =
                            AppMode::EntryForm(EntryForm::from_draft(draft, Some(entry.id.clone())));
                    }
                }
                return Action::None;
            }
            KeyCode::Char('d') => {
                if !self.require_idle(snapshot) {
                    return Action::None;
                }
                match snapshot.timer.schedule.get(self.selected_entry) {
                    Some(entry) => Event::DeletePlannedEntry {
                        id: entry.id.clone(),
                    },
                    None => return Action::None,
                }
            }
            KeyCode::Char('s') => {
                if snapshot.timer.mode == Mode::Planned && !snapshot.is_completed() {
                    Event::StartPlanned
                } else {
                    Event::StartWork
                }
            }
            KeyCode::Char('b') => Event::StartBreak,
            KeyCode::Char(' ') => {
                if snapshot.is_paused() {
                    Event::Resume
                } else {
                    Event::Pause
                }
            }
            KeyCode::Char('x') => Event::Stop,
            KeyCode::Char('R') => Event::Reset,
            KeyCode::Char('m') => {
                if !self.require_idle(snapshot) {
                    return Action::None;
                }
                Event::SwitchMode(match snapshot.timer.mode {
                    Mode::Default => Mode::Planned,
                    Mode::Planned => Mode::Default,
                })
            }
            KeyCode::Char('+') | KeyCode::Char('=') => {
                Event::UpdateSettings(settings.adjust_work(self.step()))
            }
            KeyCode::Char('-') => Event::UpdateSettings(settings.adjust_work(-self.step())),
            KeyCode::Char('>') => Event::UpdateSettings(settings.adjust_break(self.step())),
            KeyCode::Char('<') => Event::UpdateSettings(settings.adjust_break(-self.step())),
            KeyCode::Char('r') => Event::UpdateSettings(settings.toggle_auto_repeat()),
            KeyCode::Char('V') => Event::UpdateSettings(settings.adjust_volume(VOLUME_STEP)),
            KeyCode::Char('v') => Event::UpdateSettings(settings.adjust_volume(-VOLUME_STEP)),
            _ => return Action::None,
        };
        if matches!(event, Event::UpdateSettings(_)) && !self.require_idle(snapshot) {
            return Action::None;
        }
        Action::Send(event)
    }

    fn handle_form_key(&mut self, code: KeyCode, snapshot: &Snapshot) -> Action {
        let AppMode::EntryForm(form) = &mut self.mode else {
            return Action::None;
        };
        match code {
            KeyCode::Esc => {
                self.mode = AppMode::Normal;
                Action::None
            }
            KeyCode::Tab | KeyCode::Down => {
                form.focus = form.focus.next();
                Action::None
            }
            KeyCode::BackTab | KeyCode::Up => {
                form.focus = form.focus.prev();
                Action::None
            }
            KeyCode::Backspace => {
                form.backspace();
                Action::None
            }
            KeyCode::Char(c) => {
                form.push(c, snapshot);
                Action::None
            }
            KeyCode::Enter => match form.to_patch() {
                Ok(patch) => {
                    let event = submit(form.editing.take(), patch, snapshot);
                    self.mode = AppMode::Normal;
                    Action::Send(event)
                }
                Err(e) => {
                    form.error = Some(e);
                    Action::None
                }
            },
            _ => Action::None,
        }
    }

    fn require_idle(&mut self, snapshot: &Snapshot) -> bool {
        if !snapshot.is_idle() {
            self.message = Some("Stop the timer first".to_string());
        }
        snapshot.is_idle()
    }

    fn clamp_selection(&mut self, snapshot: &Snapshot) {
        let len = snapshot.timer.schedule.len();
        if self.selected_entry >= len {
            self.selected_entry = len.saturating_sub(1);
        }
    }
}

fn submit(editing: Option<String>, patch: EntryPatch, snapshot: &Snapshot) -> Event {
    let timer = &snapshot.timer;
    match editing {
        Some(id) => Event::UpdatePlannedEntry { id, patch },
        None => {
            let id = next_entry_id(&timer.schedule, Local::now().timestamp_millis());
            let entry = EntryDraft::suggest(&timer.schedule, &timer.settings)
                .patched(&patch, &timer.settings)
                .into_entry(id, timer.schedule.len());
            Event::AddPlannedEntry(entry)
        }
    }
}
