//! Record versioning for optimistic concurrency control.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Version number of a stored record.
///
/// Every successful mutation of a record increments its version by exactly
/// one. Writers pass the version they read; the store rejects the write when
/// the stored version has moved on in the meantime:
///
/// - A caller reads a record at version `n`
/// - It submits a mutation with `expected_version = n`
/// - The store applies it only if the record is still at `n`, storing `n + 1`
///
/// A record that has never been written is at [`Version::INITIAL`]; the first
/// write (submission) moves it to version 1.
///
/// # Examples
///
/// ```
/// use records_core::version::Version;
///
/// let v0 = Version::INITIAL;
/// let v1 = v0.next();
/// assert_eq!(v1, Version::new(1));
/// assert_eq!(v1.value(), 1);
/// ```
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(u64);

impl Version {
    /// The version of a record that has not been persisted yet.
    pub const INITIAL: Self = Self(0);

    /// Create a new `Version` with the given value.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the version number.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Get the next version (current + 1).
    ///
    /// # Overflow Behavior
    ///
    /// Saturates at `u64::MAX`; no record is mutated that often.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Check if this is the initial version (0).
    #[must_use]
    pub const fn is_initial(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Version {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Version> for u64 {
    fn from(version: Version) -> Self {
        version.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn initial_version() {
        assert_eq!(Version::INITIAL, Version::new(0));
        assert!(Version::INITIAL.is_initial());
        assert!(!Version::new(1).is_initial());
    }

    #[test]
    fn next_version() {
        let v1 = Version::INITIAL.next();
        let v2 = v1.next();

        assert_eq!(v1, Version::new(1));
        assert_eq!(v2, Version::new(2));
        assert!(v1 < v2);
    }

    #[test]
    fn next_saturates() {
        assert_eq!(Version::new(u64::MAX).next(), Version::new(u64::MAX));
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn serializes_as_plain_number() {
        let json = serde_json::to_string(&Version::new(7)).unwrap();
        assert_eq!(json, "7");

        let parsed: Version = serde_json::from_str("12").unwrap();
        assert_eq!(parsed, Version::new(12));
    }

    proptest! {
        #[test]
        fn next_is_strictly_greater(n in 0_u64..u64::MAX) {
            let v = Version::new(n);
            prop_assert_eq!(v.next().value(), n + 1);
            prop_assert!(v.next() > v);
        }
    }
}
