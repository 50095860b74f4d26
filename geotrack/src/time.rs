//! Time sources and conversions.
//!
//! Monotonic time (`tokio::time::Instant`) drives staleness and prediction
//! timers. Wall-clock time drives the schedule and the age of broadcast
//! payloads; it is injected through [`WallClock`] so estimators can be tested
//! at any time of day.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Local, NaiveTime, Utc};

/// Source of wall-clock time.
pub trait WallClock: Send + Sync {
    /// Current local time of day.
    fn time_of_day(&self) -> NaiveTime;

    /// Current UTC timestamp.
    fn now_utc(&self) -> DateTime<Utc>;
}

/// Wall clock backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl WallClock for SystemClock {
    fn time_of_day(&self) -> NaiveTime {
        Local::now().time()
    }

    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Wall clock that only moves when told to.
///
/// Useful for hosts replaying a recorded trip and for tests.
#[derive(Debug)]
pub struct ManualClock {
    inner: Mutex<(NaiveTime, DateTime<Utc>)>,
}

impl ManualClock {
    /// Create a clock reading `time_of_day`, with UTC at the current instant.
    pub fn new(time_of_day: NaiveTime) -> Self {
        Self {
            inner: Mutex::new((time_of_day, Utc::now())),
        }
    }

    /// Create a clock at `hour:minute` local time.
    ///
    /// Returns `None` for an invalid time.
    pub fn at(hour: u32, minute: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hour, minute, 0).map(Self::new)
    }

    /// Set the local time of day.
    pub fn set_time_of_day(&self, time_of_day: NaiveTime) {
        self.inner.lock().unwrap().0 = time_of_day;
    }

    /// Advance both readings by `duration`.
    pub fn advance(&self, duration: Duration) {
        let delta = chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::zero());
        let mut inner = self.inner.lock().unwrap();
        inner.0 = inner.0.overflowing_add_signed(delta).0;
        inner.1 += delta;
    }
}

impl WallClock for ManualClock {
    fn time_of_day(&self) -> NaiveTime {
        self.inner.lock().unwrap().0
    }

    fn now_utc(&self) -> DateTime<Utc> {
        self.inner.lock().unwrap().1
    }
}

/// Fractional minutes since local midnight.
pub fn minutes_of_day(time: NaiveTime) -> f64 {
    use chrono::Timelike;
    time.num_seconds_from_midnight() as f64 / 60.0
}

/// Age of a wall-clock timestamp relative to `now`.
///
/// Timestamps from the future have zero age.
pub fn age_since(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    now.signed_duration_since(timestamp)
        .to_std()
        .unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minutes_of_day() {
        let t = NaiveTime::from_hms_opt(7, 5, 30).unwrap();
        assert_eq!(minutes_of_day(t), 425.5);
        assert_eq!(minutes_of_day(NaiveTime::MIN), 0.0);
    }

    #[test]
    fn test_age_since_past() {
        let now = Utc::now();
        let past = now - chrono::Duration::seconds(60);
        assert_eq!(age_since(past, now), Duration::from_secs(60));
    }

    #[test]
    fn test_age_since_future_is_zero() {
        let now = Utc::now();
        let future = now + chrono::Duration::seconds(60);
        assert_eq!(age_since(future, now), Duration::ZERO);
    }

    #[test]
    fn test_manual_clock_advance() {
        let clock = ManualClock::at(7, 0).unwrap();
        let utc_before = clock.now_utc();

        clock.advance(Duration::from_secs(5 * 60));

        assert_eq!(clock.time_of_day(), NaiveTime::from_hms_opt(7, 5, 0).unwrap());
        assert_eq!(
            clock.now_utc() - utc_before,
            chrono::Duration::seconds(300)
        );
    }

    #[test]
    fn test_manual_clock_set() {
        let clock = ManualClock::at(7, 0).unwrap();
        clock.set_time_of_day(NaiveTime::from_hms_opt(18, 30, 0).unwrap());
        assert_eq!(minutes_of_day(clock.time_of_day()), 1110.0);
    }

    #[test]
    fn test_invalid_manual_clock() {
        assert!(ManualClock::at(25, 0).is_none());
    }
}
