//! Grade level normalization.
//!
//! Staff and students type grade levels many ways: `"7"`, `"grade 7"`,
//! `"Grade 7"`, `" GRADE7 "`. All of these normalize to the canonical label
//! `"Grade 7"` so that enrollments and sections compare equal. Labels that are
//! not numeric grades ("Kindergarten") are kept with whitespace collapsed.

use crate::error::PortalError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A normalized grade label.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GradeLevel(String);

impl GradeLevel {
    /// Normalize a raw grade level.
    ///
    /// # Errors
    ///
    /// Returns [`PortalError::Validation`] if `raw` is blank.
    ///
    /// # Examples
    ///
    /// ```
    /// use records_portal::grade::GradeLevel;
    ///
    /// let grade = GradeLevel::parse(" grade 07 ").unwrap();
    /// assert_eq!(grade.as_str(), "Grade 7");
    /// assert_eq!(GradeLevel::parse("7").unwrap(), grade);
    /// ```
    pub fn parse(raw: &str) -> Result<Self, PortalError> {
        let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            return Err(PortalError::Validation("Grade level is required".to_string()));
        }

        if let Some(number) = numeric_grade(&collapsed) {
            return Ok(Self(format!("Grade {number}")));
        }

        Ok(Self(collapsed))
    }

    /// Wrap an already-normalized label (from storage).
    #[must_use]
    pub fn from_normalized(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// The canonical label
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GradeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `"7"`, `"07"`, `"grade 7"`, `"Grade7"` → `Some(7)`.
fn numeric_grade(label: &str) -> Option<u32> {
    let digits = match label.get(..5) {
        Some(prefix) if prefix.eq_ignore_ascii_case("grade") => label[5..].trim_start(),
        _ => label,
    };

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use proptest::prelude::*;

    #[test]
    fn bare_number_gets_prefix() {
        assert_eq!(GradeLevel::parse("7").unwrap().as_str(), "Grade 7");
        assert_eq!(GradeLevel::parse("012").unwrap().as_str(), "Grade 12");
    }

    #[test]
    fn prefix_is_case_insensitive() {
        for raw in ["grade 7", "GRADE 7", "Grade7", "  grade   7  "] {
            assert_eq!(GradeLevel::parse(raw).unwrap().as_str(), "Grade 7", "{raw}");
        }
    }

    #[test]
    fn non_numeric_labels_are_kept() {
        assert_eq!(
            GradeLevel::parse("  Senior   High ").unwrap().as_str(),
            "Senior High"
        );
        assert_eq!(GradeLevel::parse("Grade A").unwrap().as_str(), "Grade A");
    }

    #[test]
    fn blank_is_rejected() {
        assert!(matches!(
            GradeLevel::parse("   "),
            Err(PortalError::Validation(_))
        ));
    }

    #[test]
    fn multibyte_input_does_not_split_characters() {
        assert_eq!(GradeLevel::parse("ñ").unwrap().as_str(), "ñ");
        assert_eq!(GradeLevel::parse("Gradé 7").unwrap().as_str(), "Gradé 7");
    }

    proptest! {
        #[test]
        fn every_spelling_of_a_number_agrees(n in 1_u32..=12, spaces in 0_usize..3, upper in any::<bool>()) {
            let prefix = if upper { "GRADE" } else { "grade" };
            let spelled = format!("{prefix}{}{n}", " ".repeat(spaces));
            prop_assert_eq!(
                GradeLevel::parse(&spelled).unwrap(),
                GradeLevel::parse(&n.to_string()).unwrap()
            );
        }

        #[test]
        fn normalization_is_idempotent(raw in "[A-Za-z0-9 ]{1,16}") {
            if let Ok(once) = GradeLevel::parse(&raw) {
                prop_assert_eq!(GradeLevel::parse(once.as_str()).unwrap(), once);
            }
        }
    }
}
