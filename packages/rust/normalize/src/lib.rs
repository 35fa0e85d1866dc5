//! Identity-field normalization: instructor names and course codes.
//!
//! Both sources spell the same people and courses differently; everything
//! that crosses from extraction into the store goes through this crate so the
//! two sides compare on one representation.

mod course;
mod names;

use gradesync_shared::{GradeSyncError, NormalizedFacultyRecord, RawFacultyRecord, Result};

pub use course::{CourseCode, extract_department_and_number, known_departments_and_classes};
pub use names::{normalize_name, to_last_first};

/// Normalize a scraped faculty record.
///
/// Fails with a validation error when the name is empty after cleanup.
pub fn normalize_faculty(raw: &RawFacultyRecord) -> Result<NormalizedFacultyRecord> {
    let name = normalize_name(&raw.raw_name);
    if name.is_empty() {
        return Err(GradeSyncError::validation(format!(
            "empty faculty name in {}",
            raw.source_url.as_deref().unwrap_or(&raw.department_code)
        )));
    }

    Ok(NormalizedFacultyRecord {
        name,
        department: raw.department_code.trim().to_string(),
        course_number: None,
        title: raw.title.clone(),
        source_url: raw.source_url.clone(),
    })
}

/// Normalize a batch, dropping duplicates and counting invalid records.
///
/// Returns the unique normalized records (first occurrence wins) and the
/// number of records rejected.
pub fn normalize_all(raw: &[RawFacultyRecord]) -> (Vec<NormalizedFacultyRecord>, usize) {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::with_capacity(raw.len());
    let mut rejected = 0;

    for record in raw {
        match normalize_faculty(record) {
            Ok(n) => {
                if seen.insert((n.name.clone(), n.department.clone())) {
                    out.push(n);
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "skipping faculty record");
                rejected += 1;
            }
        }
    }

    (out, rejected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(name: &str, dept: &str) -> RawFacultyRecord {
        RawFacultyRecord {
            raw_name: name.into(),
            department_code: dept.into(),
            title: Some("professor".into()),
            source_url: Some("https://example.com/cis".into()),
        }
    }

    #[test]
    fn normalizes_name_and_keeps_department() {
        let n = normalize_faculty(&raw("doe, JOHN", "CIS")).unwrap();
        assert_eq!(n.name, "Doe, John");
        assert_eq!(n.department, "CIS");
        assert!(n.course_number.is_none());
    }

    #[test]
    fn empty_name_is_validation_error() {
        let err = normalize_faculty(&raw("  ", "CIS")).unwrap_err();
        assert!(matches!(err, GradeSyncError::Validation { .. }));
    }

    #[test]
    fn batch_dedupes_and_counts_rejects() {
        let (records, rejected) = normalize_all(&[
            raw("Doe, John", "CIS"),
            raw("DOE, JOHN", "CIS"),
            raw("Doe, John", "MATH"),
            raw("", "CIS"),
        ]);
        assert_eq!(records.len(), 2);
        assert_eq!(rejected, 1);
    }
}
