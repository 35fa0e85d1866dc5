//! Embedded libSQL store for faculty and grade records.
//!
//! The [`Storage`] struct wraps a local libSQL database holding two record
//! collections (`faculty`, `grades`) plus the ingestion run ledger. The
//! surface is deliberately small: insert, find, distinct, count, bulk write,
//! and delete, all driven by the closed [`Filter`] vocabulary.
//!
//! **Write rules:**
//! - the pipeline writes only after aggregation completes, never from workers
//! - [`Storage::bulk_write`] is the single write boundary for merges/upserts

mod filter;
mod migrations;

use std::path::Path;

use chrono::Utc;
use gradesync_shared::{FacultyRecord, GradePercentages, GradeRecord, GradeSyncError, Result, RunId};
use libsql::params::Params;
use libsql::{Connection, Database, Value, params};
use tracing::{debug, info};

pub use filter::{BulkWriteResult, Collection, Field, Filter, WriteError, WriteOp};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
}

/// Outcome of a wholesale grade replacement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GradeReplace {
    pub removed: u64,
    pub inserted: u64,
}

/// One row of the ingestion run ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestRun {
    pub id: String,
    /// `refresh`, `grades`, `faculty`, or `merge`.
    pub kind: String,
    pub started_at: String,
    pub finished_at: Option<String>,
    /// `running`, `completed`, `failed`, or `cancelled`.
    pub status: String,
    pub stats_json: Option<String>,
    pub dataset_sha256: Option<String>,
}

impl Storage {
    /// Open or create a database at `path`, applying pending migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| GradeSyncError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| GradeSyncError::Storage(e.to_string()))?;

        let conn = db
            .connect()
            .map_err(|e| GradeSyncError::Storage(e.to_string()))?;

        let storage = Self { db, conn };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    GradeSyncError::Storage(format!("migration v{} failed: {e}", migration.version))
                })?;
            }
        }
        Ok(())
    }

    /// Current schema version, or 0 if no migrations have been applied.
    async fn schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => match rows.next().await {
                Ok(Some(row)) => row.get::<u32>(0).unwrap_or(0),
                _ => 0,
            },
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Create secondary indexes. Safe to call any number of times.
    pub async fn ensure_indexes(&self) -> Result<()> {
        for (name, sql) in migrations::INDEXES {
            self.conn
                .execute(sql, params![])
                .await
                .map_err(|e| GradeSyncError::Storage(format!("index {name}: {e}")))?;
        }
        debug!(count = migrations::INDEXES.len(), "indexes ensured");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Grade operations
    // -----------------------------------------------------------------------

    /// Append grade records. Returns the number inserted.
    pub async fn insert_grades(&self, records: &[GradeRecord]) -> Result<u64> {
        let tx = self
            .conn
            .transaction()
            .await
            .map_err(|e| GradeSyncError::Storage(e.to_string()))?;

        let mut inserted = 0;
        for record in records {
            inserted += insert_grade(&tx, record).await?;
        }

        tx.commit()
            .await
            .map_err(|e| GradeSyncError::Storage(e.to_string()))?;
        Ok(inserted)
    }

    /// Delete every grade record and insert `records`, atomically.
    pub async fn replace_grades(&self, records: &[GradeRecord]) -> Result<GradeReplace> {
        let tx = self
            .conn
            .transaction()
            .await
            .map_err(|e| GradeSyncError::Storage(e.to_string()))?;

        let removed = tx
            .execute("DELETE FROM grades", params![])
            .await
            .map_err(|e| GradeSyncError::Storage(e.to_string()))?;

        let mut inserted = 0;
        for record in records {
            inserted += insert_grade(&tx, record).await?;
        }

        tx.commit()
            .await
            .map_err(|e| GradeSyncError::Storage(e.to_string()))?;

        info!(removed, inserted, "grade records replaced");
        Ok(GradeReplace { removed, inserted })
    }

    /// Grade records matching `filter`, in insertion order.
    pub async fn find_grades(&self, filter: &Filter) -> Result<Vec<GradeRecord>> {
        let (clause, values) = filter.to_sql(Collection::Grades)?;
        let sql = format!(
            "SELECT course, term, instructor, crn, aprec, bprec, cprec, dprec, fprec, department, course_number
             FROM grades WHERE {clause} ORDER BY id"
        );
        let mut rows = self
            .conn
            .query(&sql, Params::Positional(values))
            .await
            .map_err(|e| GradeSyncError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| GradeSyncError::Storage(e.to_string()))?
        {
            results.push(row_to_grade(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Faculty operations
    // -----------------------------------------------------------------------

    /// Faculty records matching `filter`, ordered by identity key.
    pub async fn find_faculty(&self, filter: &Filter) -> Result<Vec<FacultyRecord>> {
        let (clause, values) = filter.to_sql(Collection::Faculty)?;
        let sql = format!(
            "SELECT name, department, course_number, title, source_url
             FROM faculty WHERE {clause} ORDER BY name, department, course_number"
        );
        let mut rows = self
            .conn
            .query(&sql, Params::Positional(values))
            .await
            .map_err(|e| GradeSyncError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| GradeSyncError::Storage(e.to_string()))?
        {
            results.push(FacultyRecord {
                name: row
                    .get::<String>(0)
                    .map_err(|e| GradeSyncError::Storage(e.to_string()))?,
                department: row
                    .get::<String>(1)
                    .map_err(|e| GradeSyncError::Storage(e.to_string()))?,
                course_number: row
                    .get::<String>(2)
                    .map_err(|e| GradeSyncError::Storage(e.to_string()))?,
                title: row.get::<String>(3).ok(),
                source_url: row.get::<String>(4).ok(),
            });
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Generic collection operations
    // -----------------------------------------------------------------------

    /// Distinct non-null values of `field` among records matching `filter`.
    pub async fn distinct(
        &self,
        collection: Collection,
        field: Field,
        filter: &Filter,
    ) -> Result<Vec<String>> {
        if !field.belongs_to(collection) {
            return Err(GradeSyncError::Storage(format!(
                "field '{}' does not exist in {collection}",
                field.column()
            )));
        }
        let (clause, values) = filter.to_sql(collection)?;
        let column = field.column();
        let sql = format!(
            "SELECT DISTINCT {column} FROM {} WHERE {clause} AND {column} IS NOT NULL ORDER BY {column}",
            collection.table()
        );
        let mut rows = self
            .conn
            .query(&sql, Params::Positional(values))
            .await
            .map_err(|e| GradeSyncError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| GradeSyncError::Storage(e.to_string()))?
        {
            results.push(
                row.get::<String>(0)
                    .map_err(|e| GradeSyncError::Storage(e.to_string()))?,
            );
        }
        Ok(results)
    }

    /// Number of records matching `filter`.
    pub async fn count(&self, collection: Collection, filter: &Filter) -> Result<u64> {
        let (clause, values) = filter.to_sql(collection)?;
        count_where(&self.conn, collection, &clause, values).await
    }

    /// Delete records matching `filter`. Returns the number deleted.
    pub async fn delete_many(&self, collection: Collection, filter: &Filter) -> Result<u64> {
        let (clause, values) = filter.to_sql(collection)?;
        let sql = format!("DELETE FROM {} WHERE {clause}", collection.table());
        let deleted = self
            .conn
            .execute(&sql, Params::Positional(values))
            .await
            .map_err(|e| GradeSyncError::Storage(e.to_string()))?;
        debug!(%collection, deleted, "records deleted");
        Ok(deleted)
    }

    /// Apply a list of write operations in one transaction.
    ///
    /// With `ordered = false` a failing operation is recorded in
    /// `write_errors` and the rest still run; with `ordered = true` the first
    /// failure stops the batch. Successful operations are committed either way.
    pub async fn bulk_write(
        &self,
        collection: Collection,
        ops: &[WriteOp],
        ordered: bool,
    ) -> Result<BulkWriteResult> {
        let tx = self
            .conn
            .transaction()
            .await
            .map_err(|e| GradeSyncError::Storage(e.to_string()))?;

        let mut result = BulkWriteResult::default();
        for (index, op) in ops.iter().enumerate() {
            match apply_op(&tx, collection, op).await {
                Ok(partial) => result.absorb(partial),
                Err(e) => {
                    debug!(index, error = %e, "bulk write operation failed");
                    result.write_errors.push(WriteError {
                        index,
                        message: e.to_string(),
                    });
                    if ordered {
                        break;
                    }
                }
            }
        }

        tx.commit()
            .await
            .map_err(|e| GradeSyncError::Storage(e.to_string()))?;

        debug!(
            %collection,
            ops = ops.len(),
            matched = result.matched_count,
            modified = result.modified_count,
            upserted = result.upserted_count,
            errors = result.write_errors.len(),
            "bulk write applied"
        );
        Ok(result)
    }

    // -----------------------------------------------------------------------
    // Run ledger
    // -----------------------------------------------------------------------

    /// Record the start of an ingestion run.
    pub async fn begin_run(&self, id: &RunId, kind: &str) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO ingest_runs (id, kind, started_at, status) VALUES (?1, ?2, ?3, 'running')",
                params![id.to_string(), kind, now.as_str()],
            )
            .await
            .map_err(|e| GradeSyncError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Record the end of an ingestion run.
    pub async fn finish_run(
        &self,
        id: &RunId,
        status: &str,
        stats_json: &str,
        dataset_sha256: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE ingest_runs SET finished_at = ?1, status = ?2, stats_json = ?3, dataset_sha256 = ?4
                 WHERE id = ?5",
                params![now.as_str(), status, stats_json, dataset_sha256, id.to_string()],
            )
            .await
            .map_err(|e| GradeSyncError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Most recent runs first.
    pub async fn list_runs(&self, limit: u32) -> Result<Vec<IngestRun>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, kind, started_at, finished_at, status, stats_json, dataset_sha256
                 FROM ingest_runs ORDER BY id DESC LIMIT ?1",
                params![limit],
            )
            .await
            .map_err(|e| GradeSyncError::Storage(e.to_string()))?;

        let mut results = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| GradeSyncError::Storage(e.to_string()))?
        {
            results.push(IngestRun {
                id: row
                    .get::<String>(0)
                    .map_err(|e| GradeSyncError::Storage(e.to_string()))?,
                kind: row
                    .get::<String>(1)
                    .map_err(|e| GradeSyncError::Storage(e.to_string()))?,
                started_at: row
                    .get::<String>(2)
                    .map_err(|e| GradeSyncError::Storage(e.to_string()))?,
                finished_at: row.get::<String>(3).ok(),
                status: row
                    .get::<String>(4)
                    .map_err(|e| GradeSyncError::Storage(e.to_string()))?,
                stats_json: row.get::<String>(5).ok(),
                dataset_sha256: row.get::<String>(6).ok(),
            });
        }
        Ok(results)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

async fn insert_grade(conn: &Connection, record: &GradeRecord) -> Result<u64> {
    let g = &record.grades;
    conn.execute(
        "INSERT INTO grades (course, term, instructor, crn, aprec, bprec, cprec, dprec, fprec, department, course_number)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            record.course.as_str(),
            record.term.as_str(),
            record.instructor.as_str(),
            record.crn.as_str(),
            g.a,
            g.b,
            g.c,
            g.d,
            g.f,
            record.department.as_deref(),
            record.course_number.as_deref(),
        ],
    )
    .await
    .map_err(|e| GradeSyncError::Storage(e.to_string()))
}

async fn count_where(
    conn: &Connection,
    collection: Collection,
    clause: &str,
    values: Vec<Value>,
) -> Result<u64> {
    let sql = format!("SELECT COUNT(*) FROM {} WHERE {clause}", collection.table());
    let mut rows = conn
        .query(&sql, Params::Positional(values))
        .await
        .map_err(|e| GradeSyncError::Storage(e.to_string()))?;

    match rows
        .next()
        .await
        .map_err(|e| GradeSyncError::Storage(e.to_string()))?
    {
        Some(row) => row
            .get::<i64>(0)
            .map(|n| u64::try_from(n).unwrap_or(0))
            .map_err(|e| GradeSyncError::Storage(e.to_string())),
        None => Ok(0),
    }
}

/// Apply one write operation, returning its contribution to the counts.
async fn apply_op(conn: &Connection, collection: Collection, op: &WriteOp) -> Result<BulkWriteResult> {
    match op {
        WriteOp::UpsertFaculty(record) => {
            if collection != Collection::Faculty {
                return Err(GradeSyncError::Storage(format!(
                    "faculty upsert submitted to {collection}"
                )));
            }
            upsert_faculty(conn, record).await
        }
        WriteOp::UpdateMany { filter, set } => update_many(conn, collection, filter, set).await,
    }
}

async fn upsert_faculty(conn: &Connection, record: &FacultyRecord) -> Result<BulkWriteResult> {
    record.validate()?;
    let now = Utc::now().to_rfc3339();

    let mut rows = conn
        .query(
            "SELECT id FROM faculty WHERE name = ?1 AND department = ?2 AND course_number = ?3 LIMIT 1",
            params![
                record.name.as_str(),
                record.department.as_str(),
                record.course_number.as_str()
            ],
        )
        .await
        .map_err(|e| GradeSyncError::Storage(e.to_string()))?;

    let existing = match rows
        .next()
        .await
        .map_err(|e| GradeSyncError::Storage(e.to_string()))?
    {
        Some(row) => Some(
            row.get::<i64>(0)
                .map_err(|e| GradeSyncError::Storage(e.to_string()))?,
        ),
        None => None,
    };

    let mut result = BulkWriteResult::default();
    match existing {
        Some(id) => {
            result.matched_count = 1;
            result.modified_count = conn
                .execute(
                    "UPDATE faculty SET title = ?1, source_url = ?2, updated_at = ?3
                     WHERE id = ?4 AND (title IS NOT ?1 OR source_url IS NOT ?2)",
                    params![
                        record.title.as_deref(),
                        record.source_url.as_deref(),
                        now.as_str(),
                        id
                    ],
                )
                .await
                .map_err(|e| GradeSyncError::Storage(e.to_string()))?;
        }
        None => {
            conn.execute(
                "INSERT INTO faculty (name, department, course_number, title, source_url, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.name.as_str(),
                    record.department.as_str(),
                    record.course_number.as_str(),
                    record.title.as_deref(),
                    record.source_url.as_deref(),
                    now.as_str()
                ],
            )
            .await
            .map_err(|e| GradeSyncError::Storage(e.to_string()))?;
            result.upserted_count = 1;
        }
    }
    Ok(result)
}

async fn update_many(
    conn: &Connection,
    collection: Collection,
    filter: &Filter,
    set: &[(Field, String)],
) -> Result<BulkWriteResult> {
    if set.is_empty() {
        return Err(GradeSyncError::Storage("update with no fields to set".into()));
    }
    if let Some((field, _)) = set.iter().find(|(f, _)| !f.belongs_to(collection)) {
        return Err(GradeSyncError::Storage(format!(
            "field '{}' does not exist in {collection}",
            field.column()
        )));
    }

    let (clause, where_values) = filter.to_sql(collection)?;
    let matched_count = count_where(conn, collection, &clause, where_values.clone()).await?;
    if matched_count == 0 {
        return Ok(BulkWriteResult::default());
    }

    let assignments = set
        .iter()
        .map(|(f, _)| format!("{} = ?", f.column()))
        .collect::<Vec<_>>()
        .join(", ");
    let changed = set
        .iter()
        .map(|(f, _)| format!("{} IS NOT ?", f.column()))
        .collect::<Vec<_>>()
        .join(" OR ");
    let sql = format!(
        "UPDATE {} SET {assignments} WHERE {clause} AND ({changed})",
        collection.table()
    );

    let set_values = set.iter().map(|(_, v)| Value::Text(v.clone()));
    let values: Vec<Value> = set_values
        .clone()
        .chain(where_values)
        .chain(set_values)
        .collect();

    let modified_count = conn
        .execute(&sql, Params::Positional(values))
        .await
        .map_err(|e| GradeSyncError::Storage(e.to_string()))?;

    Ok(BulkWriteResult {
        matched_count,
        modified_count,
        ..BulkWriteResult::default()
    })
}

/// Convert a grades row to a [`GradeRecord`].
fn row_to_grade(row: &libsql::Row) -> Result<GradeRecord> {
    Ok(GradeRecord {
        course: row
            .get::<String>(0)
            .map_err(|e| GradeSyncError::Storage(e.to_string()))?,
        term: row
            .get::<String>(1)
            .map_err(|e| GradeSyncError::Storage(e.to_string()))?,
        instructor: row
            .get::<String>(2)
            .map_err(|e| GradeSyncError::Storage(e.to_string()))?,
        crn: row
            .get::<String>(3)
            .map_err(|e| GradeSyncError::Storage(e.to_string()))?,
        grades: GradePercentages {
            a: row.get::<f64>(4).unwrap_or(0.0),
            b: row.get::<f64>(5).unwrap_or(0.0),
            c: row.get::<f64>(6).unwrap_or(0.0),
            d: row.get::<f64>(7).unwrap_or(0.0),
            f: row.get::<f64>(8).unwrap_or(0.0),
        },
        department: row.get::<String>(9).ok(),
        course_number: row.get::<String>(10).ok(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("gs_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn faculty(name: &str, dept: &str, number: &str) -> FacultyRecord {
        FacultyRecord {
            name: name.into(),
            department: dept.into(),
            course_number: number.into(),
            title: Some("professor".into()),
            source_url: None,
        }
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

    fn assign(dept: &str, number: &str) -> Vec<(Field, String)> {
        vec![
            (Field::Department, dept.into()),
            (Field::CourseNumber, number.into()),
        ]
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.schema_version().await, 1);
    }

    #[tokio::test]
    async fn idempotent_migration_and_indexes() {
        let tmp = std::env::temp_dir().join(format!("gs_test_{}.db", Uuid::now_v7()));
        let s1 = Storage::open(&tmp).await.expect("first open");
        s1.ensure_indexes().await.expect("indexes");
        drop(s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        s2.ensure_indexes().await.expect("indexes again");
        assert_eq!(s2.schema_version().await, 1);
    }

    #[tokio::test]
    async fn grade_insert_and_find() {
        let storage = test_storage().await;
        let inserted = storage
            .insert_grades(&[grade("CIS210", "Doe, John"), grade("MATH251", "Smith, Alice")])
            .await
            .unwrap();
        assert_eq!(inserted, 2);

        let found = storage
            .find_grades(&Filter::prefix(Field::Course, "CIS"))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].instructor, "Doe, John");
        assert_eq!(found[0].grades.a, 50.0);
        assert!(found[0].department.is_none());
    }

    #[tokio::test]
    async fn replace_grades_is_wholesale() {
        let storage = test_storage().await;
        storage
            .insert_grades(&[grade("CIS210", "Doe, John"), grade("CIS211", "Doe, John")])
            .await
            .unwrap();

        let replaced = storage
            .replace_grades(&[grade("BI211", "Green, Pat")])
            .await
            .unwrap();
        assert_eq!(replaced, GradeReplace { removed: 2, inserted: 1 });
        assert_eq!(storage.count(Collection::Grades, &Filter::All).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn faculty_upsert_is_idempotent() {
        let storage = test_storage().await;
        let ops = vec![WriteOp::UpsertFaculty(faculty("Doe, John", "CIS", "101"))];

        let first = storage.bulk_write(Collection::Faculty, &ops, false).await.unwrap();
        assert_eq!(first.upserted_count, 1);

        let second = storage.bulk_write(Collection::Faculty, &ops, false).await.unwrap();
        assert_eq!(second.upserted_count, 0);
        assert_eq!(second.matched_count, 1);
        assert_eq!(second.modified_count, 0);

        let all = storage.find_faculty(&Filter::All).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].key(), ("Doe, John", "CIS", "101"));
    }

    #[tokio::test]
    async fn faculty_upsert_updates_non_key_fields() {
        let storage = test_storage().await;
        storage
            .bulk_write(
                Collection::Faculty,
                &[WriteOp::UpsertFaculty(faculty("Doe, John", "CIS", "101"))],
                false,
            )
            .await
            .unwrap();

        let mut changed = faculty("Doe, John", "CIS", "101");
        changed.title = Some("associate professor".into());
        let result = storage
            .bulk_write(Collection::Faculty, &[WriteOp::UpsertFaculty(changed)], false)
            .await
            .unwrap();
        assert_eq!(result.modified_count, 1);

        let all = storage.find_faculty(&Filter::All).await.unwrap();
        assert_eq!(all[0].title.as_deref(), Some("associate professor"));
    }

    #[tokio::test]
    async fn update_many_only_touches_prefix_matches() {
        let storage = test_storage().await;
        storage
            .insert_grades(&[
                grade("CIS210", "Doe, John"),
                grade("CIS210", "Doe, John A."),
                grade("CIS210", "doe, john"),
                grade("CIS210", "Roe, Jane"),
            ])
            .await
            .unwrap();

        let ops = vec![WriteOp::UpdateMany {
            filter: Filter::prefix(Field::Instructor, "Doe, John"),
            set: assign("CIS", "210"),
        }];
        let result = storage.bulk_write(Collection::Grades, &ops, false).await.unwrap();
        assert_eq!(result.matched_count, 2);
        assert_eq!(result.modified_count, 2);

        let tagged = storage
            .find_grades(&Filter::eq(Field::Department, "CIS"))
            .await
            .unwrap();
        assert_eq!(tagged.len(), 2);
        assert!(tagged.iter().all(|g| g.course_number.as_deref() == Some("210")));

        // Re-applying matches the same rows but changes nothing.
        let again = storage.bulk_write(Collection::Grades, &ops, false).await.unwrap();
        assert_eq!(again.matched_count, 2);
        assert_eq!(again.modified_count, 0);
    }

    #[tokio::test]
    async fn unordered_bulk_write_continues_past_errors() {
        let storage = test_storage().await;
        let ops = vec![
            WriteOp::UpsertFaculty(faculty("", "CIS", "101")),
            WriteOp::UpsertFaculty(faculty("Doe, John", "CIS", "101")),
        ];

        let unordered = storage.bulk_write(Collection::Faculty, &ops, false).await.unwrap();
        assert_eq!(unordered.write_errors.len(), 1);
        assert_eq!(unordered.write_errors[0].index, 0);
        assert_eq!(unordered.upserted_count, 1);

        storage.delete_many(Collection::Faculty, &Filter::All).await.unwrap();
        let ordered = storage.bulk_write(Collection::Faculty, &ops, true).await.unwrap();
        assert_eq!(ordered.write_errors.len(), 1);
        assert_eq!(ordered.upserted_count, 0);
    }

    #[tokio::test]
    async fn distinct_count_and_delete() {
        let storage = test_storage().await;
        storage
            .insert_grades(&[
                grade("CIS210", "Doe, John"),
                grade("CIS211", "Doe, John"),
                grade("MATH251", "Smith, Alice"),
            ])
            .await
            .unwrap();

        let instructors = storage
            .distinct(Collection::Grades, Field::Instructor, &Filter::All)
            .await
            .unwrap();
        assert_eq!(instructors, vec!["Doe, John", "Smith, Alice"]);

        let departments = storage
            .distinct(Collection::Grades, Field::Department, &Filter::All)
            .await
            .unwrap();
        assert!(departments.is_empty());

        let cis = Filter::prefix(Field::Course, "CIS");
        assert_eq!(storage.count(Collection::Grades, &cis).await.unwrap(), 2);
        assert_eq!(storage.delete_many(Collection::Grades, &cis).await.unwrap(), 2);
        assert_eq!(storage.count(Collection::Grades, &Filter::All).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn run_ledger_lifecycle() {
        let storage = test_storage().await;
        let id = RunId::new();
        storage.begin_run(&id, "refresh").await.unwrap();

        let runs = storage.list_runs(10).await.unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].status, "running");
        assert!(runs[0].finished_at.is_none());

        storage
            .finish_run(&id, "completed", r#"{"grades": 5}"#, Some("abc"))
            .await
            .unwrap();
        let runs = storage.list_runs(10).await.unwrap();
        assert_eq!(runs[0].id, id.to_string());
        assert_eq!(runs[0].status, "completed");
        assert_eq!(runs[0].dataset_sha256.as_deref(), Some("abc"));
    }
}
