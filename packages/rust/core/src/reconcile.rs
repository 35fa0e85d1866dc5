//! Faculty/grade reconciliation.
//!
//! Scraped faculty identities are matched against grade records by
//! instructor name. Matching is a heuristic: a faculty name that is a prefix
//! of the instructor string tolerates trailing middle initials ("Doe, John"
//! vs "Doe, John A.") but also lets "Lee, Ann" claim "Lee, Anna". Name-order
//! mismatches are missed entirely. The predicate is therefore pluggable and
//! the [`unmatched_names`] report exists to review both failure modes.
//!
//! Merges never insert grade records; they only set `department` and
//! `course_number` on records that already exist.

use std::collections::{BTreeSet, HashSet};

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use gradesync_normalize::CourseCode;
use gradesync_shared::{
    FacultyRecord, GradeRecord, MatchKind, NormalizedFacultyRecord, Result, UNKNOWN_INSTRUCTOR,
};
use gradesync_storage::{BulkWriteResult, Collection, Field, Filter, Storage, WriteOp};

// ---------------------------------------------------------------------------
// Match predicates
// ---------------------------------------------------------------------------

/// Decides which grade records belong to a faculty identity.
pub trait MatchPredicate: Send + Sync {
    /// Short name for logs and reports.
    fn name(&self) -> &'static str;

    /// Whether `instructor` (from the grade dataset) names `faculty_name`.
    fn names_match(&self, faculty_name: &str, instructor: &str) -> bool;

    /// Store-side selector for the grade records of `faculty`.
    fn grade_filter(&self, faculty: &FacultyRecord) -> Filter;
}

/// Instructor starts with the faculty name and the course starts with
/// department + course number.
pub struct CoursePrefixMatch;

impl MatchPredicate for CoursePrefixMatch {
    fn name(&self) -> &'static str {
        "course-prefix"
    }

    fn names_match(&self, faculty_name: &str, instructor: &str) -> bool {
        instructor.starts_with(faculty_name)
    }

    fn grade_filter(&self, faculty: &FacultyRecord) -> Filter {
        Filter::And(vec![
            Filter::prefix(
                Field::Course,
                format!("{}{}", faculty.department, faculty.course_number),
            ),
            Filter::prefix(Field::Instructor, faculty.name.clone()),
        ])
    }
}

/// Instructor starts with the faculty name; course is ignored.
pub struct InstructorPrefixMatch;

impl MatchPredicate for InstructorPrefixMatch {
    fn name(&self) -> &'static str {
        "instructor-prefix"
    }

    fn names_match(&self, faculty_name: &str, instructor: &str) -> bool {
        instructor.starts_with(faculty_name)
    }

    fn grade_filter(&self, faculty: &FacultyRecord) -> Filter {
        Filter::prefix(Field::Instructor, faculty.name.clone())
    }
}

/// Instructor equals the faculty name.
pub struct ExactMatch;

impl MatchPredicate for ExactMatch {
    fn name(&self) -> &'static str {
        "exact"
    }

    fn names_match(&self, faculty_name: &str, instructor: &str) -> bool {
        instructor == faculty_name
    }

    fn grade_filter(&self, faculty: &FacultyRecord) -> Filter {
        Filter::eq(Field::Instructor, faculty.name.clone())
    }
}

/// The predicate configured by `[reconcile] predicate`.
pub fn predicate_for(kind: MatchKind) -> Box<dyn MatchPredicate> {
    match kind {
        MatchKind::CoursePrefix => Box::new(CoursePrefixMatch),
        MatchKind::InstructorPrefix => Box::new(InstructorPrefixMatch),
        MatchKind::Exact => Box::new(ExactMatch),
    }
}

// ---------------------------------------------------------------------------
// Course-number resolution
// ---------------------------------------------------------------------------

/// Instructor/course pairs seen in the grade data.
#[derive(Debug, Default)]
pub struct CourseIndex {
    entries: Vec<(String, CourseCode)>,
}

impl CourseIndex {
    /// Index the distinct (instructor, course) pairs of `grades`.
    pub fn from_grades<'a>(grades: impl IntoIterator<Item = &'a GradeRecord>) -> Self {
        let pairs: BTreeSet<(&str, &str)> = grades
            .into_iter()
            .map(|g| (g.instructor.as_str(), g.course.as_str()))
            .collect();

        Self {
            entries: pairs
                .into_iter()
                .map(|(instructor, course)| (instructor.to_string(), CourseCode::parse(course)))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Course numbers taught in `department` by instructors matching `name`.
    pub fn course_numbers(
        &self,
        name: &str,
        department: &str,
        predicate: &dyn MatchPredicate,
    ) -> BTreeSet<String> {
        self.entries
            .iter()
            .filter(|(instructor, code)| {
                code.is_in(department) && predicate.names_match(name, instructor)
            })
            .filter_map(|(_, code)| code.number.clone())
            .collect()
    }
}

/// Faculty identities with course numbers attached.
#[derive(Debug, Default)]
pub struct Resolution {
    pub records: Vec<FacultyRecord>,
    /// Names with no course number in their department.
    pub unresolved: Vec<String>,
}

/// Expand each normalized record into one [`FacultyRecord`] per course
/// number it teaches. Records that already carry a course number pass
/// through unchanged.
pub fn resolve_faculty(
    normalized: &[NormalizedFacultyRecord],
    index: &CourseIndex,
    predicate: &dyn MatchPredicate,
) -> Resolution {
    let mut out = Resolution::default();

    for record in normalized {
        let numbers: BTreeSet<String> = match &record.course_number {
            Some(n) => BTreeSet::from([n.clone()]),
            None => index.course_numbers(&record.name, &record.department, predicate),
        };

        if numbers.is_empty() {
            debug!(name = %record.name, department = %record.department, "no course number found");
            out.unresolved.push(record.name.clone());
            continue;
        }

        for course_number in numbers {
            let candidate = NormalizedFacultyRecord {
                course_number: Some(course_number),
                ..record.clone()
            };
            match FacultyRecord::try_from(candidate) {
                Ok(faculty) => out.records.push(faculty),
                Err(e) => {
                    debug!(error = %e, "faculty record rejected");
                    out.unresolved.push(record.name.clone());
                }
            }
        }
    }

    out
}

// ---------------------------------------------------------------------------
// Faculty upsert
// ---------------------------------------------------------------------------

/// Counts from [`upsert_faculty`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpsertReport {
    pub upserted: u64,
    pub modified: u64,
    /// Records missing an identity field.
    pub skipped: usize,
    pub write_errors: usize,
    pub batches: usize,
}

/// Upsert faculty records in unordered batches of `batch_size`.
#[instrument(skip_all, fields(records = records.len(), batch_size = batch_size))]
pub async fn upsert_faculty(
    storage: &Storage,
    records: &[FacultyRecord],
    batch_size: usize,
) -> Result<UpsertReport> {
    let batch_size = batch_size.max(1);
    let mut report = UpsertReport::default();
    let mut batch = Vec::with_capacity(batch_size.min(records.len()));

    for record in records {
        if let Err(e) = record.validate() {
            debug!(error = %e, "skipping faculty record");
            report.skipped += 1;
            continue;
        }
        batch.push(WriteOp::UpsertFaculty(record.clone()));

        if batch.len() >= batch_size {
            flush_batch(storage, &mut batch, &mut report).await?;
        }
    }
    if !batch.is_empty() {
        flush_batch(storage, &mut batch, &mut report).await?;
    }

    info!(
        upserted = report.upserted,
        modified = report.modified,
        skipped = report.skipped,
        batches = report.batches,
        "faculty records upserted"
    );
    if report.skipped > 0 {
        warn!(skipped = report.skipped, "faculty records missing required fields");
    }
    Ok(report)
}

async fn flush_batch(
    storage: &Storage,
    batch: &mut Vec<WriteOp>,
    report: &mut UpsertReport,
) -> Result<()> {
    let result = storage.bulk_write(Collection::Faculty, batch, false).await?;
    report.upserted += result.upserted_count;
    report.modified += result.modified_count;
    report.write_errors += result.write_errors.len();
    report.batches += 1;
    batch.clear();
    Ok(())
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// A conditional update tagging matching grade records.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOperation {
    pub filter: Filter,
    pub department: String,
    pub course_number: String,
}

impl From<MergeOperation> for WriteOp {
    fn from(op: MergeOperation) -> Self {
        WriteOp::UpdateMany {
            filter: op.filter,
            set: vec![
                (Field::Department, op.department),
                (Field::CourseNumber, op.course_number),
            ],
        }
    }
}

/// One merge operation per distinct, valid faculty record.
pub fn plan_merges(
    faculty: &[FacultyRecord],
    predicate: &dyn MatchPredicate,
) -> Vec<MergeOperation> {
    let mut seen = HashSet::new();
    faculty
        .iter()
        .filter(|f| f.validate().is_ok())
        .filter(|f| seen.insert(f.key()))
        .map(|f| MergeOperation {
            filter: predicate.grade_filter(f),
            department: f.department.clone(),
            course_number: f.course_number.clone(),
        })
        .collect()
}

/// Counts from [`merge_faculty_with_grades`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    /// Update operations submitted.
    pub planned: usize,
    /// Grade records matched by at least one operation (summed per operation).
    pub matched: u64,
    /// Grade records whose fields actually changed.
    pub modified: u64,
    pub write_errors: usize,
}

/// Tag every grade record matched by a stored faculty identity.
#[instrument(skip_all, fields(predicate = predicate.name()))]
pub async fn merge_faculty_with_grades(
    storage: &Storage,
    predicate: &dyn MatchPredicate,
) -> Result<MergeReport> {
    let faculty = storage.find_faculty(&Filter::All).await?;
    let ops: Vec<WriteOp> = plan_merges(&faculty, predicate)
        .into_iter()
        .map(WriteOp::from)
        .collect();

    if ops.is_empty() {
        info!("no faculty records to merge");
        return Ok(MergeReport::default());
    }

    let BulkWriteResult {
        matched_count,
        modified_count,
        write_errors,
        ..
    } = storage.bulk_write(Collection::Grades, &ops, false).await?;

    let report = MergeReport {
        planned: ops.len(),
        matched: matched_count,
        modified: modified_count,
        write_errors: write_errors.len(),
    };
    info!(
        planned = report.planned,
        matched = report.matched,
        modified = report.modified,
        "merged faculty with grade records"
    );
    Ok(report)
}

// ---------------------------------------------------------------------------
// Unmatched names
// ---------------------------------------------------------------------------

/// Names present in one source with no counterpart in the other.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UnmatchedReport {
    pub faculty_without_grades: Vec<String>,
    pub instructors_without_faculty: Vec<String>,
}

/// Compare distinct faculty names against distinct grade instructors.
pub async fn unmatched_names(
    storage: &Storage,
    predicate: &dyn MatchPredicate,
) -> Result<UnmatchedReport> {
    let names = storage
        .distinct(Collection::Faculty, Field::Name, &Filter::All)
        .await?;
    let instructors: Vec<String> = storage
        .distinct(Collection::Grades, Field::Instructor, &Filter::All)
        .await?
        .into_iter()
        .filter(|i| i != UNKNOWN_INSTRUCTOR)
        .collect();

    Ok(unmatched_between(&names, &instructors, predicate))
}

/// Pure half of [`unmatched_names`].
pub fn unmatched_between(
    names: &[String],
    instructors: &[String],
    predicate: &dyn MatchPredicate,
) -> UnmatchedReport {
    UnmatchedReport {
        faculty_without_grades: names
            .iter()
            .filter(|n| !instructors.iter().any(|i| predicate.names_match(n, i)))
            .cloned()
            .collect(),
        instructors_without_faculty: instructors
            .iter()
            .filter(|i| !names.iter().any(|n| predicate.names_match(n, i)))
            .cloned()
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gradesync_shared::GradePercentages;
    use uuid::Uuid;

    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("gs_core_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn grade(course: &str, instructor: &str) -> GradeRecord {
        GradeRecord::new(
            course,
            "Fall 2013",
            instructor,
            GradePercentages {
                a: 50.0,
                ..GradePercentages::default()
            },
        )
    }

    fn faculty(name: &str, dept: &str, number: &str) -> FacultyRecord {
        FacultyRecord {
            name: name.into(),
            department: dept.into(),
            course_number: number.into(),
            title: None,
            source_url: None,
        }
    }

    fn normalized(name: &str, dept: &str) -> NormalizedFacultyRecord {
        NormalizedFacultyRecord {
            name: name.into(),
            department: dept.into(),
            course_number: None,
            title: Some("professor".into()),
            source_url: None,
        }
    }

    #[test]
    fn predicates_differ_on_names() {
        assert!(CoursePrefixMatch.names_match("Doe, John", "Doe, John A."));
        assert!(InstructorPrefixMatch.names_match("Doe, John", "Doe, John A."));
        assert!(!ExactMatch.names_match("Doe, John", "Doe, John A."));
        assert!(!CoursePrefixMatch.names_match("Doe, John", "doe, john"));
    }

    #[test]
    fn course_index_resolves_numbers_per_department() {
        let grades = vec![
            grade("CIS210", "Doe, John"),
            grade("CIS211", "Doe, John A."),
            grade("MATH251", "Doe, John"),
            grade("CIS210", "Roe, Jane"),
        ];
        let index = CourseIndex::from_grades(&grades);
        assert_eq!(index.len(), 4);

        let numbers = index.course_numbers("Doe, John", "CIS", &CoursePrefixMatch);
        assert_eq!(numbers.into_iter().collect::<Vec<_>>(), vec!["210", "211"]);

        let exact = index.course_numbers("Doe, John", "CIS", &ExactMatch);
        assert_eq!(exact.len(), 1);
    }

    #[test]
    fn resolve_expands_and_reports_unresolved() {
        let grades = vec![grade("CIS210", "Doe, John"), grade("CIS211", "Doe, John")];
        let index = CourseIndex::from_grades(&grades);

        let resolution = resolve_faculty(
            &[normalized("Doe, John", "CIS"), normalized("Lee, Ann", "MATH")],
            &index,
            &CoursePrefixMatch,
        );
        assert_eq!(resolution.records.len(), 2);
        assert!(resolution.records.iter().all(|f| f.department == "CIS"));
        assert_eq!(resolution.unresolved, vec!["Lee, Ann"]);
    }

    #[test]
    fn plan_skips_duplicates_and_invalid_records() {
        let ops = plan_merges(
            &[
                faculty("Doe, John", "CIS", "101"),
                faculty("Doe, John", "CIS", "101"),
                faculty("Doe, John", "CIS", ""),
            ],
            &CoursePrefixMatch,
        );
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].course_number, "101");
    }

    #[tokio::test]
    async fn merge_tags_matching_grade_record() {
        let storage = test_storage().await;
        storage
            .insert_grades(&[grade("CIS101", "Doe, John")])
            .await
            .unwrap();
        upsert_faculty(&storage, &[faculty("Doe, John", "CIS", "101")], 1000)
            .await
            .unwrap();

        let report = merge_faculty_with_grades(&storage, &CoursePrefixMatch)
            .await
            .unwrap();
        assert_eq!(report.planned, 1);
        assert_eq!(report.modified, 1);

        let grades = storage.find_grades(&Filter::All).await.unwrap();
        assert_eq!(grades[0].department.as_deref(), Some("CIS"));
        assert_eq!(grades[0].course_number.as_deref(), Some("101"));
    }

    #[tokio::test]
    async fn merge_leaves_non_matching_records_untouched() {
        let storage = test_storage().await;
        storage
            .insert_grades(&[
                grade("CIS101", "Doe, John"),
                grade("CIS101", "Roe, Jane"),
                grade("CIS102", "Doe, John"),
            ])
            .await
            .unwrap();
        upsert_faculty(
            &storage,
            &[faculty("Doe, John", "CIS", "101"), faculty("Ghost, Gus", "CIS", "999")],
            1000,
        )
        .await
        .unwrap();

        let report = merge_faculty_with_grades(&storage, &CoursePrefixMatch)
            .await
            .unwrap();
        assert_eq!(report.planned, 2);
        assert_eq!(report.modified, 1);

        let untagged = storage
            .find_grades(&Filter::All)
            .await
            .unwrap()
            .into_iter()
            .filter(|g| g.department.is_none())
            .count();
        assert_eq!(untagged, 2);
    }

    #[tokio::test]
    async fn merge_with_empty_faculty_is_no_op() {
        let storage = test_storage().await;
        let report = merge_faculty_with_grades(&storage, &CoursePrefixMatch)
            .await
            .unwrap();
        assert_eq!(report, MergeReport::default());
    }

    #[tokio::test]
    async fn upsert_batches_and_counts_skips() {
        let storage = test_storage().await;
        let records = vec![
            faculty("Doe, John", "CIS", "101"),
            faculty("Doe, John", "CIS", "102"),
            faculty("", "CIS", "103"),
            faculty("Lee, Ann", "MATH", "251"),
            faculty("Doe, John", "CIS", "101"),
        ];

        let report = upsert_faculty(&storage, &records, 2).await.unwrap();
        assert_eq!(report.upserted, 3);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.batches, 2);
        assert_eq!(
            storage.count(Collection::Faculty, &Filter::All).await.unwrap(),
            3
        );

        let again = upsert_faculty(&storage, &records, 2).await.unwrap();
        assert_eq!(again.upserted, 0);
    }

    #[tokio::test]
    async fn unmatched_lists_both_sides() {
        let storage = test_storage().await;
        storage
            .insert_grades(&[
                grade("CIS101", "Doe, John A."),
                grade("MATH251", "Park, Min"),
                grade("BI211", UNKNOWN_INSTRUCTOR),
            ])
            .await
            .unwrap();
        upsert_faculty(
            &storage,
            &[faculty("Doe, John", "CIS", "101"), faculty("Lee, Ann", "MATH", "251")],
            1000,
        )
        .await
        .unwrap();

        let report = unmatched_names(&storage, &CoursePrefixMatch).await.unwrap();
        assert_eq!(report.faculty_without_grades, vec!["Lee, Ann"]);
        assert_eq!(report.instructors_without_faculty, vec!["Park, Min"]);
    }
}
