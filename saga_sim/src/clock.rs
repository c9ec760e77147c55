//! Virtual clock for the simulation.
//!
//! Time moves only when the harness is told to move it. The clock never
//! observes wall-clock time and never moves backwards.

use crate::error::{SimError, SimResult};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Default simulation start: 2024-01-01 00:00:00 UTC.
pub fn default_epoch() -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(1704067200)
}

/// Holds the current simulated time.
#[derive(Debug, Clone)]
pub struct VirtualClock {
    /// Time at which the simulation started
    epoch: SystemTime,

    /// Current virtual time
    now: SystemTime,
}

impl VirtualClock {
    /// Creates a clock standing at `epoch`.
    pub fn new(epoch: SystemTime) -> Self {
        Self { epoch, now: epoch }
    }

    /// Returns the current virtual time.
    pub fn now(&self) -> SystemTime {
        self.now
    }

    /// Returns the virtual time elapsed since the epoch.
    pub fn elapsed(&self) -> Duration {
        self.now.duration_since(self.epoch).unwrap_or(Duration::ZERO)
    }

    pub fn epoch(&self) -> SystemTime {
        self.epoch
    }

    /// Returns the time `duration` after now.
    pub fn after(&self, duration: Duration) -> SimResult<SystemTime> {
        self.now.checked_add(duration).ok_or(SimError::ClockOverflow)
    }

    /// Returns how long until `time`, or zero if it already passed.
    pub fn until(&self, time: SystemTime) -> Duration {
        time.duration_since(self.now).unwrap_or(Duration::ZERO)
    }

    /// Moves the clock forward by `duration`.
    ///
    /// A zero duration is a no-op. `Duration` cannot be negative, so there is
    /// no backwards case here.
    pub fn advance_by(&mut self, duration: Duration) -> SimResult<()> {
        self.now = self.after(duration)?;
        Ok(())
    }

    /// Moves the clock to `time`.
    ///
    /// Fails with `TimeTravel` if `time` is before now; moving to now is a no-op.
    pub fn advance_to(&mut self, time: SystemTime) -> SimResult<()> {
        if time < self.now {
            return Err(SimError::TimeTravel {
                requested: time,
                current: self.now,
            });
        }
        self.now = time;
        Ok(())
    }
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new(default_epoch())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_starts_at_epoch() {
        let clock = VirtualClock::default();
        assert_eq!(clock.now(), default_epoch());
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_advance_by() {
        let mut clock = VirtualClock::default();
        clock.advance_by(Duration::from_secs(1)).unwrap();
        clock.advance_by(Duration::from_millis(500)).unwrap();
        assert_eq!(clock.elapsed(), Duration::from_millis(1500));
    }

    #[test]
    fn test_advance_by_zero_is_noop() {
        let mut clock = VirtualClock::default();
        let before = clock.now();
        clock.advance_by(Duration::ZERO).unwrap();
        assert_eq!(clock.now(), before);
    }

    #[test]
    fn test_advance_to_rejects_past() {
        let mut clock = VirtualClock::default();
        clock.advance_by(Duration::from_secs(60)).unwrap();
        let past = default_epoch() + Duration::from_secs(30);

        let err = clock.advance_to(past).unwrap_err();
        assert!(matches!(err, SimError::TimeTravel { .. }));
        assert_eq!(clock.elapsed(), Duration::from_secs(60));
    }

    #[test]
    fn test_until() {
        let mut clock = VirtualClock::default();
        let target = clock.after(Duration::from_secs(10)).unwrap();
        clock.advance_by(Duration::from_secs(4)).unwrap();
        assert_eq!(clock.until(target), Duration::from_secs(6));
        clock.advance_by(Duration::from_secs(10)).unwrap();
        assert_eq!(clock.until(target), Duration::ZERO);
    }
}
