//! The user's daily plan: an ordered list of planned entries plus a pointer
//! at the one currently executing.

use crate::clock::ClockTime;
use crate::settings::Settings;
use pomo_ipc::EntryPatch;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;

pub const DEFAULT_PLANNED_START_TIME: &str = "09:00";

/// One scheduled work/break block. Times are advisory and never checked
/// against each other.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedEntry {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub start_time: ClockTime,
    #[serde(default)]
    pub work_end_time: ClockTime,
    #[serde(default)]
    pub break_end_time: ClockTime,
}

impl PlannedEntry {
    /// The entry's name, or "Pomodoro N" for its position when unnamed.
    pub fn display_name(&self, index: usize) -> String {
        if self.name.trim().is_empty() {
            default_name(index)
        } else {
            self.name.clone()
        }
    }

    pub fn apply(&mut self, patch: &EntryPatch) {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(start) = &patch.start_time {
            self.start_time = ClockTime::parse(start);
        }
        if let Some(work_end) = &patch.work_end_time {
            self.work_end_time = ClockTime::parse(work_end);
        }
        if let Some(break_end) = &patch.break_end_time {
            self.break_end_time = ClockTime::parse(break_end);
        }
    }
}

fn default_name(index: usize) -> String {
    format!("Pomodoro {}", index + 1)
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Schedule {
    entries: Vec<PlannedEntry>,
    current_index: Option<usize>,
}

impl Schedule {
    pub fn new(entries: Vec<PlannedEntry>) -> Self {
        Self {
            entries: unique_ids(entries),
            current_index: None,
        }
    }

    pub fn entries(&self) -> &[PlannedEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&PlannedEntry> {
        self.entries.get(index)
    }

    pub fn last(&self) -> Option<&PlannedEntry> {
        self.entries.last()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    /// May point past the end after a deletion.
    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    pub fn current_entry(&self) -> Option<&PlannedEntry> {
        self.current_index.and_then(|i| self.entries.get(i))
    }

    pub fn has_next(&self) -> bool {
        self.current_index
            .map_or(false, |i| i + 1 < self.entries.len())
    }

    /// Appends unless the id is already taken.
    pub fn add(&mut self, entry: PlannedEntry) -> bool {
        if self.contains(&entry.id) {
            return false;
        }
        self.entries.push(entry);
        true
    }

    pub fn update(&mut self, id: &str, patch: &EntryPatch) -> bool {
        match self.entries.iter_mut().find(|e| e.id == id) {
            Some(entry) => {
                entry.apply(patch);
                true
            }
            None => false,
        }
    }

    /// Removes the entry, preserving the order of the rest. The current
    /// index is left as is.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        self.entries.len() != before
    }

    /// Swaps in a whole list. Later entries reusing an id are dropped.
    pub fn replace(&mut self, entries: Vec<PlannedEntry>) {
        self.entries = unique_ids(entries);
    }

    /// Starts at the first entry unless a run is already in progress.
    pub(crate) fn begin(&mut self) -> usize {
        *self.current_index.get_or_insert(0)
    }

    pub(crate) fn advance(&mut self) {
        if let Some(i) = self.current_index.as_mut() {
            *i += 1;
        }
    }

    pub(crate) fn clear_current(&mut self) {
        self.current_index = None;
    }
}

fn unique_ids(entries: Vec<PlannedEntry>) -> Vec<PlannedEntry> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|entry| {
            let fresh = seen.insert(entry.id.clone());
            if !fresh {
                warn!(id = %entry.id, "Dropping planned entry with duplicate id");
            }
            fresh
        })
        .collect()
}

/// Builds an id from the creation time, suffixed if it collides.
pub fn next_entry_id(schedule: &Schedule, now_millis: i64) -> String {
    let base = now_millis.to_string();
    if !schedule.contains(&base) {
        return base;
    }
    (1..)
        .map(|n| format!("{}-{}", base, n))
        .find(|id| !schedule.contains(id))
        .unwrap_or(base)
}

/// A planned entry being composed, before it gets an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryDraft {
    pub name: String,
    pub start_time: ClockTime,
    pub work_end_time: ClockTime,
    pub break_end_time: ClockTime,
}

impl EntryDraft {
    /// Suggests the slot right after the last entry's break, or the
    /// default start time for an empty schedule.
    pub fn suggest(schedule: &Schedule, settings: &Settings) -> Self {
        let start = schedule
            .last()
            .map(|e| e.break_end_time)
            .unwrap_or_else(|| ClockTime::parse(DEFAULT_PLANNED_START_TIME));
        Self {
            name: String::new(),
            start_time: start,
            work_end_time: start,
            break_end_time: start,
        }
        .with_start(start, settings)
    }

    pub fn with_start(mut self, start: ClockTime, settings: &Settings) -> Self {
        self.start_time = start;
        self.with_work_end(start.add_minutes(settings.work_duration as i64), settings)
    }

    pub fn with_work_end(mut self, work_end: ClockTime, settings: &Settings) -> Self {
        self.work_end_time = work_end;
        self.break_end_time = work_end.add_minutes(settings.break_duration as i64);
        self
    }

    /// Applies explicit fields in order: a start recomputes both ends, a
    /// work end recomputes the break end, then an explicit break end wins.
    pub fn patched(mut self, patch: &EntryPatch, settings: &Settings) -> Self {
        if let Some(name) = &patch.name {
            self.name = name.clone();
        }
        if let Some(start) = &patch.start_time {
            self = self.with_start(ClockTime::parse(start), settings);
        }
        if let Some(work_end) = &patch.work_end_time {
            self = self.with_work_end(ClockTime::parse(work_end), settings);
        }
        if let Some(break_end) = &patch.break_end_time {
            self.break_end_time = ClockTime::parse(break_end);
        }
        self
    }

    /// `position` is the index the entry will occupy; it names unnamed drafts.
    pub fn into_entry(self, id: String, position: usize) -> PlannedEntry {
        let name = if self.name.trim().is_empty() {
            default_name(position)
        } else {
            self.name
        };
        PlannedEntry {
            id,
            name,
            start_time: self.start_time,
            work_end_time: self.work_end_time,
            break_end_time: self.break_end_time,
        }
    }
}

/// Whether an idle planned schedule should start by itself: only for a
/// fresh run, and only inside the first entry's work window.
pub fn should_auto_start(schedule: &Schedule, settings: &Settings, now: ClockTime) -> bool {
    if !settings.auto_repeat || schedule.current_index().is_some() {
        return false;
    }
    match schedule.get(0) {
        Some(first) => {
            let into = first.start_time.minutes_until(&now);
            into < first.start_time.minutes_until(&first.work_end_time)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, start: &str, work_end: &str, break_end: &str) -> PlannedEntry {
        PlannedEntry {
            id: id.to_string(),
            name: String::new(),
            start_time: ClockTime::parse(start),
            work_end_time: ClockTime::parse(work_end),
            break_end_time: ClockTime::parse(break_end),
        }
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut schedule = Schedule::default();
        assert!(schedule.add(entry("1", "09:00", "09:25", "09:30")));
        assert!(!schedule.add(entry("1", "10:00", "10:25", "10:30")));
        assert_eq!(schedule.len(), 1);
        assert_eq!(schedule.entries()[0].start_time.to_string(), "09:00");
    }

    #[test]
    fn replaced_list_keeps_first_of_each_id() {
        let mut schedule = Schedule::default();
        schedule.replace(vec![
            entry("a", "09:00", "09:25", "09:30"),
            entry("b", "09:30", "09:55", "10:00"),
            entry("a", "11:00", "11:25", "11:30"),
        ]);
        assert_eq!(schedule.len(), 2);
        assert_eq!(schedule.entries()[0].start_time.to_string(), "09:00");

        assert!(schedule.remove("a"));
        assert_eq!(schedule.len(), 1);
        assert_eq!(schedule.entries()[0].id, "b");

        let built = Schedule::new(vec![
            entry("x", "09:00", "09:25", "09:30"),
            entry("x", "10:00", "10:25", "10:30"),
        ]);
        assert_eq!(built.len(), 1);
    }

    #[test]
    fn update_merges_only_given_fields() {
        let mut schedule = Schedule::new(vec![entry("1", "09:00", "09:25", "09:30")]);
        let patch = EntryPatch {
            name: Some("Write report".to_string()),
            work_end_time: Some("09:40".to_string()),
            ..Default::default()
        };
        assert!(schedule.update("1", &patch));
        assert!(!schedule.update("missing", &patch));
        let e = &schedule.entries()[0];
        assert_eq!(e.name, "Write report");
        assert_eq!(e.start_time.to_string(), "09:00");
        assert_eq!(e.work_end_time.to_string(), "09:40");
        assert_eq!(e.break_end_time.to_string(), "09:30");
    }

    #[test]
    fn remove_keeps_order_and_index() {
        let mut schedule = Schedule::new(vec![
            entry("a", "09:00", "09:25", "09:30"),
            entry("b", "09:30", "09:55", "10:00"),
            entry("c", "10:00", "10:25", "10:30"),
        ]);
        schedule.begin();
        schedule.advance();
        assert!(schedule.remove("a"));
        assert_eq!(schedule.current_index(), Some(1));
        assert_eq!(schedule.current_entry().map(|e| e.id.as_str()), Some("c"));
        assert!(!schedule.remove("a"));
    }

    #[test]
    fn has_next_tracks_position() {
        let mut schedule = Schedule::new(vec![
            entry("a", "09:00", "09:25", "09:30"),
            entry("b", "09:30", "09:55", "10:00"),
        ]);
        assert!(!schedule.has_next());
        assert_eq!(schedule.begin(), 0);
        assert!(schedule.has_next());
        schedule.advance();
        assert!(!schedule.has_next());
        // begin keeps a run in progress
        assert_eq!(schedule.begin(), 1);
    }

    #[test]
    fn display_name_defaults_by_position() {
        let e = entry("a", "09:00", "09:25", "09:30");
        assert_eq!(e.display_name(2), "Pomodoro 3");
    }

    #[test]
    fn draft_follows_previous_entry() {
        let settings = Settings::default();
        let empty = EntryDraft::suggest(&Schedule::default(), &settings);
        assert_eq!(empty.start_time.to_string(), "09:00");
        assert_eq!(empty.work_end_time.to_string(), "09:25");
        assert_eq!(empty.break_end_time.to_string(), "09:30");

        let schedule = Schedule::new(vec![entry("a", "23:00", "23:25", "23:45")]);
        let next = EntryDraft::suggest(&schedule, &settings);
        assert_eq!(next.start_time.to_string(), "23:45");
        assert_eq!(next.work_end_time.to_string(), "00:10");
        assert_eq!(next.break_end_time.to_string(), "00:15");
    }

    #[test]
    fn draft_patch_recomputes_dependent_times() {
        let settings = Settings::default();
        let draft = EntryDraft::suggest(&Schedule::default(), &settings).patched(
            &EntryPatch {
                start_time: Some("14:00".to_string()),
                ..Default::default()
            },
            &settings,
        );
        assert_eq!(draft.work_end_time.to_string(), "14:25");
        assert_eq!(draft.break_end_time.to_string(), "14:30");

        let draft = draft.patched(
            &EntryPatch {
                work_end_time: Some("14:50".to_string()),
                ..Default::default()
            },
            &settings,
        );
        assert_eq!(draft.start_time.to_string(), "14:00");
        assert_eq!(draft.break_end_time.to_string(), "14:55");
    }

    #[test]
    fn unnamed_draft_gets_positional_name() {
        let settings = Settings::default();
        let e = EntryDraft::suggest(&Schedule::default(), &settings).into_entry("7".into(), 1);
        assert_eq!(e.name, "Pomodoro 2");
    }

    #[test]
    fn entry_ids_never_collide() {
        let mut schedule = Schedule::default();
        assert_eq!(next_entry_id(&schedule, 1000), "1000");
        schedule.add(entry("1000", "09:00", "09:25", "09:30"));
        assert_eq!(next_entry_id(&schedule, 1000), "1000-1");
    }

    #[test]
    fn auto_start_only_inside_first_work_window() {
        let settings = Settings::default();
        let mut schedule = Schedule::new(vec![entry("a", "09:00", "09:25", "09:30")]);
        assert!(!should_auto_start(&schedule, &settings, ClockTime::parse("08:59")));
        assert!(should_auto_start(&schedule, &settings, ClockTime::parse("09:00")));
        assert!(should_auto_start(&schedule, &settings, ClockTime::parse("09:24")));
        assert!(!should_auto_start(&schedule, &settings, ClockTime::parse("09:25")));

        let manual = Settings {
            auto_repeat: false,
            ..Settings::default()
        };
        assert!(!should_auto_start(&schedule, &manual, ClockTime::parse("09:10")));

        schedule.begin();
        assert!(!should_auto_start(&schedule, &settings, ClockTime::parse("09:10")));

        let late = Schedule::new(vec![entry("n", "23:50", "00:15", "00:20")]);
        assert!(should_auto_start(&late, &settings, ClockTime::parse("00:05")));
        assert!(!should_auto_start(&late, &settings, ClockTime::parse("00:15")));
    }

    #[test]
    fn stored_entries_use_camel_case() {
        let json = r#"[{"id":"1","name":"Focus","startTime":"09:00","workEndTime":"09:25","breakEndTime":"09:30"}]"#;
        let entries: Vec<PlannedEntry> = serde_json::from_str(json).unwrap();
        assert_eq!(entries[0].work_end_time.to_string(), "09:25");
        assert_eq!(serde_json::to_string(&entries).unwrap(), json);
    }
}
