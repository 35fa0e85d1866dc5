//! Closed filter and write-operation vocabulary for the store.
//!
//! Callers never hand raw SQL to [`Storage`](crate::Storage). They describe
//! what to match with a [`Filter`] over a closed set of [`Field`]s and what
//! to change with a [`WriteOp`]; this module renders both into parameterized
//! SQL for one [`Collection`].

use libsql::Value;

use gradesync_shared::{FacultyRecord, GradeSyncError, Result};

// ---------------------------------------------------------------------------
// Collection / Field
// ---------------------------------------------------------------------------

/// A stored record set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Faculty,
    Grades,
}

impl Collection {
    pub(crate) fn table(self) -> &'static str {
        match self {
            Self::Faculty => "faculty",
            Self::Grades => "grades",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.table())
    }
}

/// A filterable or settable column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    /// Faculty name.
    Name,
    /// Both collections.
    Department,
    /// Both collections.
    CourseNumber,
    /// Faculty title.
    Title,
    /// Grade course code.
    Course,
    /// Grade term.
    Term,
    /// Grade instructor.
    Instructor,
    /// Grade CRN.
    Crn,
}

impl Field {
    pub(crate) fn column(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Department => "department",
            Self::CourseNumber => "course_number",
            Self::Title => "title",
            Self::Course => "course",
            Self::Term => "term",
            Self::Instructor => "instructor",
            Self::Crn => "crn",
        }
    }

    /// Whether the column exists in `collection`.
    pub fn belongs_to(self, collection: Collection) -> bool {
        match collection {
            Collection::Faculty => matches!(
                self,
                Self::Name | Self::Department | Self::CourseNumber | Self::Title
            ),
            Collection::Grades => matches!(
                self,
                Self::Department
                    | Self::CourseNumber
                    | Self::Course
                    | Self::Term
                    | Self::Instructor
                    | Self::Crn
            ),
        }
    }

    fn check(self, collection: Collection) -> Result<()> {
        if self.belongs_to(collection) {
            Ok(())
        } else {
            Err(GradeSyncError::Storage(format!(
                "field '{}' does not exist in {collection}",
                self.column()
            )))
        }
    }
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

/// Record selector.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Every record.
    All,
    /// Field equals value.
    Eq(Field, String),
    /// Field starts with value, case-sensitively.
    Prefix(Field, String),
    /// Every sub-filter matches.
    And(Vec<Filter>),
}

impl Filter {
    pub fn eq(field: Field, value: impl Into<String>) -> Self {
        Self::Eq(field, value.into())
    }

    pub fn prefix(field: Field, value: impl Into<String>) -> Self {
        Self::Prefix(field, value.into())
    }

    /// Render as a SQL boolean expression plus positional parameters.
    pub(crate) fn to_sql(&self, collection: Collection) -> Result<(String, Vec<Value>)> {
        let mut params = Vec::new();
        let sql = self.render(collection, &mut params)?;
        Ok((sql, params))
    }

    fn render(&self, collection: Collection, params: &mut Vec<Value>) -> Result<String> {
        match self {
            Self::All => Ok("1 = 1".into()),
            Self::Eq(field, value) => {
                field.check(collection)?;
                params.push(Value::Text(value.clone()));
                Ok(format!("{} = ?", field.column()))
            }
            Self::Prefix(field, value) => {
                field.check(collection)?;
                // substr comparison stays case-sensitive, unlike LIKE.
                params.push(Value::Text(value.clone()));
                params.push(Value::Text(value.clone()));
                Ok(format!("substr({}, 1, length(?)) = ?", field.column()))
            }
            Self::And(filters) if filters.is_empty() => Ok("1 = 1".into()),
            Self::And(filters) => {
                let parts = filters
                    .iter()
                    .map(|f| f.render(collection, params))
                    .collect::<Result<Vec<_>>>()?;
                Ok(format!("({})", parts.join(" AND ")))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Write operations
// ---------------------------------------------------------------------------

/// One operation of a bulk write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Insert or update the faculty record with the same identity key.
    UpsertFaculty(FacultyRecord),
    /// Set fields on every record matching the filter; never inserts.
    UpdateMany {
        filter: Filter,
        set: Vec<(Field, String)>,
    },
}

/// A failed operation within a bulk write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteError {
    /// Position of the operation in the submitted list.
    pub index: usize,
    pub message: String,
}

/// Counts reported by a bulk write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkWriteResult {
    /// Records matched by update filters.
    pub matched_count: u64,
    /// Records whose stored values actually changed.
    pub modified_count: u64,
    /// Records newly inserted by upserts.
    pub upserted_count: u64,
    pub write_errors: Vec<WriteError>,
}

impl BulkWriteResult {
    /// Fold another result into this one.
    pub fn absorb(&mut self, other: BulkWriteResult) {
        self.matched_count += other.matched_count;
        self.modified_count += other.modified_count;
        self.upserted_count += other.upserted_count;
        self.write_errors.extend(other.write_errors);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_nested_filters() {
        let filter = Filter::And(vec![
            Filter::prefix(Field::Instructor, "Doe, John"),
            Filter::eq(Field::Course, "CIS210"),
        ]);
        let (sql, params) = filter.to_sql(Collection::Grades).unwrap();
        assert_eq!(
            sql,
            "(substr(instructor, 1, length(?)) = ? AND course = ?)"
        );
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn rejects_foreign_fields() {
        let err = Filter::eq(Field::Instructor, "x")
            .to_sql(Collection::Faculty)
            .unwrap_err();
        assert!(err.to_string().contains("instructor"));
    }

    #[test]
    fn empty_and_matches_everything() {
        let (sql, params) = Filter::And(vec![]).to_sql(Collection::Faculty).unwrap();
        assert_eq!(sql, "1 = 1");
        assert!(params.is_empty());
    }
}
