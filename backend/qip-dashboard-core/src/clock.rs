// src/clock.rs
use chrono::{DateTime, Duration, Utc};
#[cfg(test)]
use chrono::NaiveDateTime;
#[cfg(test)]
use std::sync::{Arc, Mutex};

/// Longest span a configured TTL or lifetime may cover: ten years.
pub const MAX_SPAN_SECS: i64 = 10 * 365 * 24 * 60 * 60;

/// Configured seconds as a chrono span, capped at [`MAX_SPAN_SECS`].
pub fn span_from_secs(secs: u64) -> Duration {
    Duration::seconds(i64::try_from(secs).map_or(MAX_SPAN_SECS, |s| s.min(MAX_SPAN_SECS)))
}

/// Source of "now" for TTL checks and for timestamps written to the store.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to. Clones share the same time.
#[cfg(test)]
#[derive(Debug, Clone)]
pub struct ManualClock {
    current_time: Arc<Mutex<DateTime<Utc>>>,
}

#[cfg(test)]
impl ManualClock {
    pub fn new(datetime_str: &str) -> Self {
        let dt = NaiveDateTime::parse_from_str(datetime_str, "%Y-%m-%d %H:%M:%S")
            .map(|naive| naive.and_utc())
            .unwrap_or_else(|_| Utc::now());
        Self {
            current_time: Arc::new(Mutex::new(dt)),
        }
    }

    pub fn advance(&self, duration: Duration) {
        if let Ok(mut guard) = self.current_time.lock() {
            *guard += duration;
        }
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        match self.current_time.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}
