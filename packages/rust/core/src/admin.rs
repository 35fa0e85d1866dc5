//! Store maintenance and listings for administrators.

use serde::Serialize;
use tracing::{info, instrument};

use gradesync_normalize::known_departments_and_classes;
use gradesync_shared::{Department, Result};
use gradesync_storage::{Collection, Field, Filter, Storage};

/// Record counts removed by [`clear_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClearReport {
    pub grades: u64,
    pub faculty: u64,
}

/// Delete every faculty and grade record, reporting the counts held before.
#[instrument(skip_all)]
pub async fn clear_all(storage: &Storage) -> Result<ClearReport> {
    let report = ClearReport {
        grades: storage.count(Collection::Grades, &Filter::All).await?,
        faculty: storage.count(Collection::Faculty, &Filter::All).await?,
    };

    storage.delete_many(Collection::Grades, &Filter::All).await?;
    storage.delete_many(Collection::Faculty, &Filter::All).await?;

    info!(grades = report.grades, faculty = report.faculty, "cleared all collections");
    Ok(report)
}

/// Known departments and course numbers present in the grade store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DepartmentListing {
    /// Department names, sorted.
    pub departments: Vec<String>,
    /// Course numbers, sorted.
    pub classes: Vec<String>,
}

/// List the departments and course numbers of stored grades, restricted to
/// `known`.
pub async fn list_departments(storage: &Storage, known: &[Department]) -> Result<DepartmentListing> {
    let courses = storage
        .distinct(Collection::Grades, Field::Course, &Filter::All)
        .await?;
    let (departments, classes) =
        known_departments_and_classes(courses.iter().map(String::as_str), known);
    Ok(DepartmentListing {
        departments,
        classes,
    })
}
