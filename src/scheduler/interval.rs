//! Inter-dispatch interval policy
//!
//! The interval follows wall-clock time of day in a fixed reference offset
//! (peak vs off-peak), can be nudged by reported activity, and is always
//! clamped to the configured bounds.

use chrono::{DateTime, FixedOffset, Offset, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Smallest accepted lower bound for the interval
pub const MIN_INTERVAL_FLOOR_MS: u64 = 10;

/// Interval multiplier while end users are active
pub const ACTIVE_SCALE: f64 = 0.66;

/// Interval multiplier while end users are idle
pub const IDLE_SCALE: f64 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntervalSettings {
    pub min_ms: u64,
    pub peak_ms: u64,
    pub off_peak_ms: u64,
    pub max_ms: u64,
}

impl Default for IntervalSettings {
    fn default() -> Self {
        Self {
            min_ms: 200,
            peak_ms: 2_000,
            off_peak_ms: 500,
            max_ms: 60_000,
        }
    }
}

/// Partial update of [`IntervalSettings`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntervalUpdate {
    pub min_ms: Option<u64>,
    pub peak_ms: Option<u64>,
    pub off_peak_ms: Option<u64>,
    pub max_ms: Option<u64>,
}

/// Off-peak window in a fixed UTC offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeOfDayPolicy {
    pub utc_offset_hours: i32,
    /// Inclusive minute of day at which off-peak starts
    pub off_peak_start_minute: u32,
    /// Inclusive minute of day at which off-peak ends
    pub off_peak_end_minute: u32,
}

impl Default for TimeOfDayPolicy {
    /// 00:30 to 08:30 at UTC+8
    fn default() -> Self {
        Self {
            utc_offset_hours: 8,
            off_peak_start_minute: 30,
            off_peak_end_minute: 8 * 60 + 30,
        }
    }
}

impl TimeOfDayPolicy {
    pub fn is_off_peak(&self, now: DateTime<Utc>) -> bool {
        let offset = FixedOffset::east_opt(self.utc_offset_hours * 3600)
            .unwrap_or_else(|| Utc.fix());
        let local = now.with_timezone(&offset);
        let minute = local.hour() * 60 + local.minute();

        if self.off_peak_start_minute <= self.off_peak_end_minute {
            (self.off_peak_start_minute..=self.off_peak_end_minute).contains(&minute)
        } else {
            // Window wraps past midnight
            minute >= self.off_peak_start_minute || minute <= self.off_peak_end_minute
        }
    }
}

/// Current interval plus the settings it is derived from
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalState {
    settings: IntervalSettings,
    policy: TimeOfDayPolicy,
    current_ms: u64,
}

impl IntervalState {
    pub fn new(settings: IntervalSettings, policy: TimeOfDayPolicy, now: DateTime<Utc>) -> Self {
        let mut state = Self {
            settings: IntervalSettings {
                min_ms: settings.min_ms.max(MIN_INTERVAL_FLOOR_MS),
                ..settings
            },
            policy,
            current_ms: settings.peak_ms,
        };
        state.recompute(now);
        state
    }

    pub fn settings(&self) -> IntervalSettings {
        self.settings
    }

    pub fn current_ms(&self) -> u64 {
        self.current_ms
    }

    pub fn current(&self) -> Duration {
        Duration::from_millis(self.current_ms)
    }

    /// Select the peak or off-peak interval for `now`
    pub fn recompute(&mut self, now: DateTime<Utc>) {
        let target = if self.policy.is_off_peak(now) {
            self.settings.off_peak_ms
        } else {
            self.settings.peak_ms
        };
        self.current_ms = self.clamp(target);
    }

    /// Shorten the interval while users are active, lengthen it while idle
    pub fn scale_for_activity(&mut self, active: bool) {
        let factor = if active { ACTIVE_SCALE } else { IDLE_SCALE };
        let scaled = (self.current_ms as f64 * factor).round() as u64;
        self.current_ms = self.clamp(scaled);
    }

    /// Apply a partial update, then re-run the time-of-day policy
    pub fn update(&mut self, update: IntervalUpdate, now: DateTime<Utc>) {
        if let Some(min_ms) = update.min_ms {
            self.settings.min_ms = min_ms.max(MIN_INTERVAL_FLOOR_MS);
        }
        if let Some(peak_ms) = update.peak_ms {
            self.settings.peak_ms = peak_ms;
        }
        if let Some(off_peak_ms) = update.off_peak_ms {
            self.settings.off_peak_ms = off_peak_ms;
        }
        if let Some(max_ms) = update.max_ms {
            self.settings.max_ms = max_ms;
        }
        self.recompute(now);
    }

    /// The lower bound wins when the bounds cross
    fn clamp(&self, target: u64) -> u64 {
        target.min(self.settings.max_ms).max(self.settings.min_ms)
    }
}
