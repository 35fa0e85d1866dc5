//! Grade dataset extraction from a JavaScript payload.
//!
//! The dataset ships as `var groups = { "CIS210": [ {...}, ... ], ... };`.
//! The object literal is captured with a non-greedy scan from the `=` to the
//! first terminating `};`, then decoded as JSON. Each top-level key is a
//! course code; each array element is one term-entry.

use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use gradesync_shared::{
    GradePercentages, GradeRecord, GradeSyncError, MISSING_CRN, Result, UNKNOWN_INSTRUCTOR,
};

use super::ExtractionStrategy;

/// A term-entry rejected during coercion.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedEntry {
    pub course: String,
    pub index: usize,
    pub reason: String,
}

/// Parsed dataset plus the entries that failed validation.
#[derive(Debug, Clone, Default)]
pub struct GradeDataset {
    pub records: Vec<GradeRecord>,
    pub skipped: Vec<SkippedEntry>,
}

/// Extracts grade records from `var <name> = {...};`.
pub struct GradeDatasetExtractor {
    variable: String,
    assignment: Regex,
    marker: Regex,
}

impl GradeDatasetExtractor {
    /// Build an extractor for the given variable name (normally `groups`).
    pub fn new(variable: &str) -> Result<Self> {
        let var = regex::escape(variable.trim());
        let assignment = Regex::new(&format!(r"(?s)\bvar\s+{var}\s*=\s*(\{{.*?\}})\s*;"))
            .map_err(|e| GradeSyncError::config(format!("invalid dataset variable: {e}")))?;
        let marker = Regex::new(&format!(r"\bvar\s+{var}\s*="))
            .map_err(|e| GradeSyncError::config(format!("invalid dataset variable: {e}")))?;

        Ok(Self {
            variable: variable.trim().to_string(),
            assignment,
            marker,
        })
    }

    /// Capture the object literal assigned to the variable.
    pub fn capture<'a>(&self, content: &'a str) -> Result<&'a str> {
        if !self.marker.is_match(content) {
            return Err(GradeSyncError::extraction(format!(
                "expected `var {} =` marker not found",
                self.variable
            )));
        }

        self.assignment
            .captures(content)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
            .ok_or_else(|| {
                GradeSyncError::extraction(format!(
                    "`var {} =` has no terminating `}};`",
                    self.variable
                ))
            })
    }

    /// Capture, decode, and coerce the whole dataset.
    pub fn parse_dataset(&self, content: &str) -> Result<GradeDataset> {
        let captured = self.capture(content)?;

        let value: Value = serde_json::from_str(captured)
            .map_err(|e| GradeSyncError::parse(format!("grade dataset is not valid JSON: {e}")))?;

        let Value::Object(groups) = value else {
            return Err(GradeSyncError::parse("grade dataset is not a JSON object"));
        };

        let mut dataset = GradeDataset::default();

        for (course, entries) in groups {
            let Value::Array(entries) = entries else {
                return Err(GradeSyncError::parse(format!(
                    "entries for course '{course}' are not an array"
                )));
            };

            for (index, entry) in entries.iter().enumerate() {
                let Value::Object(fields) = entry else {
                    return Err(GradeSyncError::parse(format!(
                        "entry {index} of course '{course}' is not an object"
                    )));
                };

                match coerce_entry(&course, fields) {
                    Ok(record) => dataset.records.push(record),
                    Err(e) => {
                        debug!(course, index, error = %e, "skipping grade entry");
                        dataset.skipped.push(SkippedEntry {
                            course: course.clone(),
                            index,
                            reason: e.to_string(),
                        });
                    }
                }
            }
        }

        Ok(dataset)
    }
}

impl ExtractionStrategy for GradeDatasetExtractor {
    type Record = GradeRecord;

    fn extract(&self, content: &str) -> Result<Vec<GradeRecord>> {
        let dataset = self.parse_dataset(content)?;
        if !dataset.skipped.is_empty() {
            warn!(skipped = dataset.skipped.len(), "grade entries failed validation");
        }
        Ok(dataset.records)
    }

    fn name(&self) -> &str {
        "grade-dataset"
    }
}

/// Turn one term-entry object into a [`GradeRecord`].
fn coerce_entry(course: &str, fields: &Map<String, Value>) -> Result<GradeRecord> {
    if course.trim().is_empty() {
        return Err(GradeSyncError::validation("empty course code"));
    }

    let grades = GradePercentages {
        a: percentage(fields, "aprec")?,
        b: percentage(fields, "bprec")?,
        c: percentage(fields, "cprec")?,
        d: percentage(fields, "dprec")?,
        f: percentage(fields, "fprec")?,
    };
    grades.validate()?;

    let term = text(fields, "TERM_DESC").unwrap_or_default();
    let instructor = text(fields, "instructor")
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| UNKNOWN_INSTRUCTOR.to_string());
    let crn = text(fields, "crn").unwrap_or_else(|| MISSING_CRN.to_string());

    Ok(GradeRecord {
        course: course.to_string(),
        term,
        instructor: instructor.trim().to_string(),
        crn,
        grades,
        department: None,
        course_number: None,
    })
}

/// Numeric field, defaulting to 0.0 when absent or null.
fn percentage(fields: &Map<String, Value>, key: &str) -> Result<f64> {
    match fields.get(key) {
        None | Some(Value::Null) => Ok(0.0),
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| GradeSyncError::validation(format!("{key} is not representable: {n}"))),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(0.0),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| GradeSyncError::validation(format!("{key} is not numeric: {s:?}"))),
        Some(other) => Err(GradeSyncError::validation(format!(
            "{key} has unexpected type: {other}"
        ))),
    }
}

/// String field; numbers are stringified.
fn text(fields: &Map<String, Value>, key: &str) -> Option<String> {
    match fields.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
