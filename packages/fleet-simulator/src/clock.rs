//! clock.rs — Deployment-local time and the day/night split
//!
//! All sampling and tick logic in one run reads time through a single
//! [`LocalClock`], so "night" means the same thing everywhere.

use std::time::Duration;

use chrono::{DateTime, FixedOffset, Local, NaiveTime, Offset, Timelike, Utc};

pub const NIGHT_START_HOUR: u32 = 18;
pub const NIGHT_END_HOUR: u32 = 6;

pub fn is_night_hour(hour: u32) -> bool {
    hour >= NIGHT_START_HOUR || hour <= NIGHT_END_HOUR
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalClock {
    /// Follow the host's local time zone
    System,
    /// Fixed offset from UTC (the field deployment runs at UTC-3)
    Fixed(FixedOffset),
}

impl LocalClock {
    /// `None` when the offset is outside ±24 h.
    pub fn from_utc_offset_hours(hours: i32) -> Option<Self> {
        FixedOffset::east_opt(hours.checked_mul(3600)?).map(Self::Fixed)
    }

    pub fn now(&self) -> DateTime<FixedOffset> {
        match self {
            Self::System => {
                let now = Local::now();
                now.with_timezone(&now.offset().fix())
            }
            Self::Fixed(offset) => Utc::now().with_timezone(offset),
        }
    }

    /// Snapshot for one engine operation covering `elapsed` simulated time.
    pub fn context(&self, elapsed: Duration) -> SimContext {
        SimContext::at(self.now(), elapsed)
    }
}

/// Time snapshot handed to every engine operation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimContext {
    pub now: DateTime<FixedOffset>,
    pub is_night: bool,
    /// Simulated time covered by this operation (zero for commands)
    pub elapsed: Duration,
}

impl SimContext {
    pub fn at(now: DateTime<FixedOffset>, elapsed: Duration) -> Self {
        Self {
            now,
            is_night: is_night_hour(now.hour()),
            elapsed,
        }
    }

    pub fn elapsed_hours(&self) -> f64 {
        self.elapsed.as_secs_f64() / 3600.0
    }

    /// Wall-clock time of day, truncated to whole seconds.
    pub fn time_of_day(&self) -> NaiveTime {
        let t = self.now.time();
        t.with_nanosecond(0).unwrap_or(t)
    }

    /// Current minute as `HH:MM`, the resolution of time programs.
    pub fn minute_of_day(&self) -> NaiveTime {
        let t = self.time_of_day();
        t.with_second(0).unwrap_or(t)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use chrono::TimeZone;

    /// Context at a given local hour in the UTC-3 deployment zone.
    pub fn context_at_hour(hour: u32, elapsed_secs: u64) -> SimContext {
        let zone = FixedOffset::west_opt(3 * 3600).unwrap();
        let now = zone.with_ymd_and_hms(2024, 6, 1, hour, 30, 15).unwrap();
        SimContext::at(now, Duration::from_secs(elapsed_secs))
    }

    pub fn night() -> SimContext {
        context_at_hour(22, 3600)
    }

    pub fn day() -> SimContext {
        context_at_hour(13, 3600)
    }
}
