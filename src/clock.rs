//! Clock adapters and time arithmetic helpers.
//!
//! Services take any [`mockable::Clock`]. Production code passes
//! [`mockable::DefaultClock`]; tests and replay tooling use [`ManualClock`]
//! to move time explicitly.

use chrono::{DateTime, Local, TimeDelta, Utc};
use mockable::Clock;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

/// Clock whose current instant only changes when told to.
///
/// Clones share the same instant, so a test can hand one clone to a service
/// and advance time through another.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<RwLock<DateTime<Utc>>>,
}

impl ManualClock {
    /// Creates a clock frozen at `start`.
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(RwLock::new(start)),
        }
    }

    /// Creates a clock frozen at the current wall-clock time.
    #[must_use]
    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.write().unwrap_or_else(PoisonError::into_inner);
        *now = add_duration(*now, by);
    }

    /// Sets the clock to an absolute instant.
    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.write().unwrap_or_else(PoisonError::into_inner) = at;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::starting_now()
    }
}

impl Clock for ManualClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self.now.read().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Returns `at + by`, saturating at the latest representable instant.
#[must_use]
pub fn add_duration(at: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(by)
        .ok()
        .and_then(|delta| at.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Returns `at - by`, saturating at the earliest representable instant.
#[must_use]
pub fn sub_duration(at: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(by)
        .ok()
        .and_then(|delta| at.checked_sub_signed(delta))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Returns the non-negative time elapsed from `earlier` to `later`.
#[must_use]
pub fn elapsed_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> Duration {
    (later - earlier).to_std().unwrap_or(Duration::ZERO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn manual_clock_advances_shared_instant() {
        let clock = ManualClock::starting_now();
        let observer = clock.clone();
        let before = observer.utc();

        clock.advance(Duration::from_secs(5));

        assert_eq!(elapsed_between(before, observer.utc()), Duration::from_secs(5));
    }

    #[rstest]
    fn elapsed_between_never_goes_negative() {
        let now = Utc::now();
        let earlier = sub_duration(now, Duration::from_secs(1));

        assert_eq!(elapsed_between(now, earlier), Duration::ZERO);
    }
}
