use pomo_ipc::SettingsPatch;
use serde::{Deserialize, Serialize};

pub const MIN_WORK_DURATION: u32 = 1;
pub const MAX_WORK_DURATION: u32 = 60;
pub const MIN_BREAK_DURATION: u32 = 1;
pub const MAX_BREAK_DURATION: u32 = 15;

/// Step sizes offered for duration adjustment, in minutes.
pub const TIME_INCREMENTS: [i64; 3] = [1, 5, 25];
pub const VOLUME_STEP: f64 = 0.1;

/// User preferences. Every field is always present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// Minutes, 1-60.
    pub work_duration: u32,
    /// Minutes, 1-15.
    pub break_duration: u32,
    pub auto_repeat: bool,
    /// 0.0 (muted) to 1.0.
    pub volume: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            work_duration: 25,
            break_duration: 5,
            auto_repeat: true,
            volume: 0.5,
        }
    }
}

impl Settings {
    /// Merge a partial update field by field. Merged values are clamped
    /// into their allowed ranges.
    pub fn apply(&mut self, patch: &SettingsPatch) {
        if let Some(work) = patch.work_duration {
            self.work_duration = work;
        }
        if let Some(brk) = patch.break_duration {
            self.break_duration = brk;
        }
        if let Some(auto_repeat) = patch.auto_repeat {
            self.auto_repeat = auto_repeat;
        }
        if let Some(volume) = patch.volume {
            self.volume = volume;
        }
        self.clamp();
    }

    pub fn merged(&self, patch: &SettingsPatch) -> Self {
        let mut next = self.clone();
        next.apply(patch);
        next
    }

    pub fn clamp(&mut self) {
        self.work_duration = self
            .work_duration
            .clamp(MIN_WORK_DURATION, MAX_WORK_DURATION);
        self.break_duration = self
            .break_duration
            .clamp(MIN_BREAK_DURATION, MAX_BREAK_DURATION);
        self.volume = if self.volume.is_finite() {
            self.volume.clamp(0.0, 1.0)
        } else {
            Self::default().volume
        };
    }

    pub fn work_secs(&self) -> u32 {
        self.work_duration * 60
    }

    pub fn break_secs(&self) -> u32 {
        self.break_duration * 60
    }

    /// Full patch carrying every field, used to restore stored settings.
    pub fn to_patch(&self) -> SettingsPatch {
        SettingsPatch {
            work_duration: Some(self.work_duration),
            break_duration: Some(self.break_duration),
            auto_repeat: Some(self.auto_repeat),
            volume: Some(self.volume),
        }
    }

    pub fn adjust_work(&self, delta: i64) -> SettingsPatch {
        SettingsPatch {
            work_duration: Some(step(self.work_duration, delta, MIN_WORK_DURATION, MAX_WORK_DURATION)),
            ..Default::default()
        }
    }

    pub fn adjust_break(&self, delta: i64) -> SettingsPatch {
        SettingsPatch {
            break_duration: Some(step(self.break_duration, delta, MIN_BREAK_DURATION, MAX_BREAK_DURATION)),
            ..Default::default()
        }
    }

    pub fn adjust_volume(&self, delta: f64) -> SettingsPatch {
        // Round to one decimal so repeated steps don't drift.
        let volume = ((self.volume + delta).clamp(0.0, 1.0) * 10.0).round() / 10.0;
        SettingsPatch {
            volume: Some(volume),
            ..Default::default()
        }
    }

    pub fn toggle_auto_repeat(&self) -> SettingsPatch {
        SettingsPatch {
            auto_repeat: Some(!self.auto_repeat),
            ..Default::default()
        }
    }
}

fn step(value: u32, delta: i64, min: u32, max: u32) -> u32 {
    (value as i64 + delta).clamp(min as i64, max as i64) as u32
}
