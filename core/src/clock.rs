//! Wall clock and reset timezone.
//!
//! RULE: Nothing outside this module reads the system time directly.
//! Quota resets and the scheduler take a WallClock so tests can drive
//! the calendar by hand.

use crate::error::{DispenserError, DispenserResult};
use chrono::{DateTime, FixedOffset, Local, NaiveDate, Offset, Timelike, Utc};
use chrono_tz::Tz;
use parking_lot::Mutex;

pub trait WallClock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The host clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl WallClock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Used by tests and replay tooling.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(start) }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl WallClock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Timezone in which the daily reset time and calendar day are evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetZone {
    Local,
    Fixed(FixedOffset),
    /// IANA region, e.g. `Europe/Berlin`. Follows daylight-saving changes.
    Named(Tz),
}

impl ResetZone {
    /// Parse `local`, `UTC`/`Z`, `+HH:MM` / `-HH:MM`, or an IANA region name.
    pub fn parse(raw: &str) -> DispenserResult<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("local") {
            return Ok(Self::Local);
        }
        if trimmed.eq_ignore_ascii_case("utc") || trimmed == "Z" {
            return Ok(Self::Fixed(Utc.fix()));
        }
        if let Some(offset) = parse_offset(trimmed) {
            return Ok(Self::Fixed(offset));
        }
        trimmed.parse::<Tz>().map(Self::Named).map_err(|_| {
            DispenserError::invalid_config(format!("reset.timezone '{trimmed}' is not a known timezone"))
        })
    }

    /// Calendar date of `at` in this zone.
    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        match self {
            Self::Local => at.with_timezone(&Local).date_naive(),
            Self::Fixed(offset) => at.with_timezone(offset).date_naive(),
            Self::Named(tz) => at.with_timezone(tz).date_naive(),
        }
    }

    /// (hour, minute) of `at` in this zone.
    pub fn hour_minute(&self, at: DateTime<Utc>) -> (u32, u32) {
        match self {
            Self::Local => {
                let t = at.with_timezone(&Local);
                (t.hour(), t.minute())
            }
            Self::Fixed(offset) => {
                let t = at.with_timezone(offset);
                (t.hour(), t.minute())
            }
            Self::Named(tz) => {
                let t = at.with_timezone(tz);
                (t.hour(), t.minute())
            }
        }
    }
}

fn parse_offset(raw: &str) -> Option<FixedOffset> {
    let (sign, rest) = match raw.as_bytes().first()? {
        b'+' => (1, &raw[1..]),
        b'-' => (-1, &raw[1..]),
        _ => return None,
    };
    let (h, m) = rest.split_once(':')?;
    let hours: i32 = h.parse().ok()?;
    let minutes: i32 = m.parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
