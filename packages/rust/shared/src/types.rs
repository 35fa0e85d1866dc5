//! Core domain types for the faculty/grade pipeline.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{GradeSyncError, Result};

/// Placeholder CRN for entries that carry none.
pub const MISSING_CRN: &str = "N/A";

/// Placeholder instructor for entries that carry none.
pub const UNKNOWN_INSTRUCTOR: &str = "Unknown";

// ---------------------------------------------------------------------------
// RunId
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for ingestion run identifiers (time-sortable).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub Uuid);

impl RunId {
    /// Generate a new time-sortable run identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RunId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

// ---------------------------------------------------------------------------
// Faculty records
// ---------------------------------------------------------------------------

/// A catalog link paired with the department it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceLink {
    /// Absolute page URL.
    pub url: String,
    /// Member of the configured department set.
    pub department_code: String,
}

/// A faculty line as scraped, before any cleanup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFacultyRecord {
    /// Name as found ("Last, First", "First Last", ...).
    pub raw_name: String,
    /// Department of the page the line came from.
    pub department_code: String,
    /// Matched academic title, lowercased.
    pub title: Option<String>,
    /// Page the line came from.
    pub source_url: Option<String>,
}

/// A faculty identity after name normalization.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NormalizedFacultyRecord {
    /// Canonical "Last, First" name (non-empty).
    pub name: String,
    pub department: String,
    pub course_number: Option<String>,
    pub title: Option<String>,
    pub source_url: Option<String>,
}

/// Persisted faculty identity, keyed by `(name, department, course_number)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FacultyRecord {
    pub name: String,
    pub department: String,
    pub course_number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
}

impl FacultyRecord {
    /// The identity key used for upserts.
    pub fn key(&self) -> (&str, &str, &str) {
        (&self.name, &self.department, &self.course_number)
    }

    /// Check that every identity field is present.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("name", &self.name),
            ("department", &self.department),
            ("course_number", &self.course_number),
        ] {
            if value.trim().is_empty() {
                return Err(GradeSyncError::validation(format!(
                    "faculty record missing {field}: {self:?}"
                )));
            }
        }
        Ok(())
    }
}

impl TryFrom<NormalizedFacultyRecord> for FacultyRecord {
    type Error = GradeSyncError;

    fn try_from(record: NormalizedFacultyRecord) -> Result<Self> {
        let course_number = record.course_number.ok_or_else(|| {
            GradeSyncError::validation(format!("no course number for '{}'", record.name))
        })?;
        let faculty = Self {
            name: record.name,
            department: record.department,
            course_number,
            title: record.title,
            source_url: record.source_url,
        };
        faculty.validate()?;
        Ok(faculty)
    }
}

// ---------------------------------------------------------------------------
// Grade records
// ---------------------------------------------------------------------------

/// Grade distribution of one course offering, each value in `[0, 100]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GradePercentages {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub f: f64,
}

impl GradePercentages {
    /// Reject values outside `[0, 100]` or NaN.
    pub fn validate(&self) -> Result<()> {
        for (label, value) in [
            ("a", self.a),
            ("b", self.b),
            ("c", self.c),
            ("d", self.d),
            ("f", self.f),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(GradeSyncError::validation(format!(
                    "{label} percentage out of range: {value}"
                )));
            }
        }
        Ok(())
    }
}

/// One term-entry of the grade dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradeRecord {
    /// Course code string, e.g. `CIS210`.
    pub course: String,
    pub term: String,
    pub instructor: String,
    pub crn: String,
    pub grades: GradePercentages,
    /// Set by reconciliation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    /// Set by reconciliation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub course_number: Option<String>,
}

impl GradeRecord {
    /// A fresh, unreconciled record.
    pub fn new(
        course: impl Into<String>,
        term: impl Into<String>,
        instructor: impl Into<String>,
        grades: GradePercentages,
    ) -> Self {
        Self {
            course: course.into(),
            term: term.into(),
            instructor: instructor.into(),
            crn: MISSING_CRN.into(),
            grades,
            department: None,
            course_number: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalized(course_number: Option<&str>) -> NormalizedFacultyRecord {
        NormalizedFacultyRecord {
            name: "Doe, John".into(),
            department: "CIS".into(),
            course_number: course_number.map(String::from),
            title: Some("professor".into()),
            source_url: None,
        }
    }

    #[test]
    fn run_id_roundtrip() {
        let id = RunId::new();
        let parsed: RunId = id.to_string().parse().expect("parse RunId");
        assert_eq!(id, parsed);
    }

    #[test]
    fn faculty_from_normalized() {
        let faculty = FacultyRecord::try_from(normalized(Some("101"))).expect("valid");
        assert_eq!(faculty.key(), ("Doe, John", "CIS", "101"));
    }

    #[test]
    fn faculty_without_course_number_is_invalid() {
        let err = FacultyRecord::try_from(normalized(None)).unwrap_err();
        assert!(matches!(err, GradeSyncError::Validation { .. }));
    }

    #[test]
    fn blank_identity_field_is_invalid() {
        let err = FacultyRecord::try_from(normalized(Some("  "))).unwrap_err();
        assert!(err.to_string().contains("course_number"));
    }

    #[test]
    fn percentages_range_checked() {
        let ok = GradePercentages {
            a: 50.0,
            b: 30.0,
            c: 10.0,
            d: 5.0,
            f: 5.0,
        };
        assert!(ok.validate().is_ok());

        let bad = GradePercentages { a: 120.0, ..ok };
        assert!(bad.validate().is_err());

        let nan = GradePercentages { f: f64::NAN, ..ok };
        assert!(nan.validate().is_err());
    }

    #[test]
    fn grade_record_serialization_skips_unset_fields() {
        let record = GradeRecord::new("CIS101", "Fall 2023", "Doe, John", GradePercentages::default());
        let json = serde_json::to_string(&record).expect("serialize");
        assert!(!json.contains("course_number"));
        assert!(json.contains("\"crn\":\"N/A\""));
    }
}
