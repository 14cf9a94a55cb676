//! Time as seen by claim validation
//!
//! Validation asks a [`Clock`] for the current time rather than reading the
//! system time directly, so tests can freeze it with a [`TestClock`].

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// A NumericDate: whole seconds since the Unix epoch
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UnixTime(pub u64);

impl UnixTime {
    /// Later by `by`, capped at the largest representable time
    #[must_use]
    pub fn saturating_add(self, by: Duration) -> Self {
        Self(self.0.saturating_add(by.as_secs()))
    }

    /// Earlier by `by`, capped at the epoch
    #[must_use]
    pub fn saturating_sub(self, by: Duration) -> Self {
        Self(self.0.saturating_sub(by.as_secs()))
    }
}

impl From<SystemTime> for UnixTime {
    fn from(time: SystemTime) -> Self {
        Self(time.duration_since(UNIX_EPOCH).map_or(0, |since| since.as_secs()))
    }
}

/// A source of the current time
pub trait Clock {
    /// Now
    fn now(&self) -> UnixTime;
}

/// Reads [`SystemTime::now`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct System;

impl Clock for System {
    fn now(&self) -> UnixTime {
        SystemTime::now().into()
    }
}

/// A clock frozen at a given time
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TestClock(UnixTime);

impl TestClock {
    /// Frozen at `time`
    pub const fn new(time: UnixTime) -> Self {
        Self(time)
    }

    /// Moves the clock forward by `by`
    pub fn advance(&mut self, by: Duration) {
        self.0 = self.0.saturating_add(by);
    }
}

impl Clock for TestClock {
    fn now(&self) -> UnixTime {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_only_moves_when_advanced() {
        let mut clock = TestClock::new(UnixTime(100));
        assert_eq!(clock.now(), UnixTime(100));

        clock.advance(Duration::from_secs(5));
        assert_eq!(clock.now(), UnixTime(105));
    }

    #[test]
    fn subtraction_stops_at_the_epoch() {
        assert_eq!(
            UnixTime(3).saturating_sub(Duration::from_secs(10)),
            UnixTime(0)
        );
    }

    #[test]
    fn system_time_is_recent() {
        // 2020-01-01T00:00:00Z
        assert!(System.now() > UnixTime(1_577_836_800));
    }
}
