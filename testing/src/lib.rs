//! # Records Testing
//!
//! Test clocks and the Given/When/Then reducer harness used across the
//! portal's test suites.
//!
//! ## Example
//!
//! ```ignore
//! use records_testing::{ReducerTest, test_clock};
//!
//! ReducerTest::new(LifecycleReducer::new())
//!     .with_env(test_environment())
//!     .given_state(LifecycleState::loaded(pending_request()))
//!     .when_action(LifecycleAction::Approve { .. })
//!     .then_state(|s| assert!(s.last_error.is_none()))
//!     .run();
//! ```

use chrono::{DateTime, Utc};
use records_core::environment::Clock;

pub mod reducer_test;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use std::sync::{Arc, Mutex, PoisonError};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use records_testing::mocks::FixedClock;
    /// use records_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when a test advances it.
    ///
    /// Clones share the same time, so a test can keep one handle and give
    /// another to the service under test.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Create a manual clock starting at `time`
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(Mutex::new(time)),
            }
        }

        /// Move the clock forward by `by`
        pub fn advance(&self, by: chrono::Duration) {
            let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            *time += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(test_time())
    }

    /// The instant `test_clock()` is frozen at.
    ///
    /// # Panics
    ///
    /// Panics if the hardcoded timestamp fails to parse, which never happens.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_time() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
            .expect("hardcoded timestamp should always parse")
            .with_timezone(&Utc)
    }
}

pub use mocks::{FixedClock, ManualClock, test_clock, test_time};
pub use reducer_test::{ReducerTest, assertions};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_never_moves() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
        assert_eq!(clock.now(), test_time());
    }

    #[test]
    fn manual_clock_clones_share_time() {
        let clock = ManualClock::new(test_time());
        let handle = clock.clone();

        handle.advance(chrono::Duration::days(31));

        assert_eq!(clock.now(), test_time() + chrono::Duration::days(31));
    }
}
