//! Ingestion runs: catalog links → pages → faculty records → store.
//!
//! One [`IngestionCoordinator`] drives one run at a time through
//! [`RunPhase`]s. Per-page failures reduce yield but never abort a run; only
//! zero catalog links or a failed grade-dataset ingest are terminal. All store
//! writes happen in the `Committing` phase, after every worker has finished.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use gradesync_crawler::{FacultyCandidate, Fetcher, PagePool, PoolOutcome, TitleVocabularyExtractor};
use gradesync_discovery::DiscoveryOptions;
use gradesync_normalize::normalize_all;
use gradesync_shared::{
    AppConfig, FacultyRecord, GradeRecord, GradeSyncError, RawFacultyRecord, Result, RunConfig,
    RunId, SourceLink,
};
use gradesync_storage::{Filter, Storage};

use crate::grades::{FetchedDataset, fetch_grade_dataset};
use crate::reconcile::{
    CourseIndex, MatchPredicate, MergeReport, UpsertReport, merge_faculty_with_grades,
    predicate_for, resolve_faculty, upsert_faculty,
};

// ---------------------------------------------------------------------------
// Run vocabulary
// ---------------------------------------------------------------------------

/// Coordinator state within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunPhase {
    Idle,
    FetchingLinks,
    FetchingPages,
    Extracting,
    Normalizing,
    Reconciling,
    Committing,
    Failed,
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::FetchingLinks => "fetching-links",
            Self::FetchingPages => "fetching-pages",
            Self::Extracting => "extracting",
            Self::Normalizing => "normalizing",
            Self::Reconciling => "reconciling",
            Self::Committing => "committing",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// What a run ingests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunKind {
    /// Grade dataset, faculty pages, and merge.
    Refresh,
    /// Grade dataset only.
    Grades,
    /// Faculty pages only, resolved against stored grades.
    Faculty,
    /// Merge stored faculty into stored grades.
    Merge,
}

impl RunKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Refresh => "refresh",
            Self::Grades => "grades",
            Self::Faculty => "faculty",
            Self::Merge => "merge",
        }
    }
}

impl std::fmt::Display for RunKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal status recorded in the run ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Counters gathered over one run, stored as JSON in the ledger.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStats {
    pub links_found: usize,
    pub links_discarded: usize,
    pub pages_fetched: usize,
    pub pages_failed: usize,
    pub empty_pages: usize,
    pub duplicates_skipped: usize,
    pub not_submitted: usize,
    pub faculty_candidates: usize,
    /// Candidates rejected by normalization.
    pub faculty_rejected: usize,
    /// Names with no course number in their department.
    pub faculty_unresolved: usize,
    pub grade_records: usize,
    pub grade_entries_skipped: usize,
    /// Raw size of the fetched grade dataset.
    pub dataset_bytes: usize,
    /// Distinct instructor/course pairs used to resolve course numbers.
    pub courses_indexed: usize,
    pub grades_removed: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upsert: Option<UpsertReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merge: Option<MergeReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dataset_sha256: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: RunId,
    pub kind: RunKind,
    pub status: RunStatus,
    pub stats: RunStats,
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Progress callback for reporting run status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, phase: RunPhase);
    /// Free-form status line within the current phase.
    fn message(&self, msg: &str);
    /// Called when the run completes.
    fn done(&self, report: &RunReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _phase: RunPhase) {}
    fn message(&self, _msg: &str) {}
    fn done(&self, _report: &RunReport) {}
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// Drives ingestion runs against one store.
pub struct IngestionCoordinator<'a> {
    storage: &'a Storage,
    config: AppConfig,
    run: RunConfig,
    pool: PagePool,
    predicate: Box<dyn MatchPredicate>,
    phase: RunPhase,
}

impl<'a> IngestionCoordinator<'a> {
    /// Build a coordinator with run settings derived from `config`.
    pub fn new(storage: &'a Storage, config: AppConfig) -> Result<Self> {
        let run = RunConfig::from(&config);
        Self::with_run_config(storage, config, run)
    }

    /// Build a coordinator with explicit run settings (CLI overrides).
    pub fn with_run_config(storage: &'a Storage, config: AppConfig, run: RunConfig) -> Result<Self> {
        let pool = PagePool::from_config(&run.pool)?;
        let predicate = predicate_for(run.predicate);
        Ok(Self {
            storage,
            config,
            run,
            pool,
            predicate,
            phase: RunPhase::Idle,
        })
    }

    /// Current phase.
    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    fn fetcher(&self) -> &Fetcher {
        self.pool.fetcher().as_ref()
    }

    fn enter(&mut self, phase: RunPhase, progress: &dyn ProgressReporter) {
        self.phase = phase;
        info!(%phase, "entering phase");
        progress.phase(phase);
    }

    /// Execute one run and record it in the ledger.
    ///
    /// Returns [`GradeSyncError::Cancelled`] when `cancel` fires before the
    /// commit; nothing is written to the record collections in that case.
    #[instrument(skip_all, fields(kind = %kind, predicate = self.predicate.name()))]
    pub async fn run(
        &mut self,
        kind: RunKind,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<RunReport> {
        let run_id = RunId::new();
        let start = Instant::now();
        self.storage.begin_run(&run_id, kind.as_str()).await?;
        info!(%run_id, "starting ingestion run");

        let mut stats = RunStats::default();
        let result = self.execute(kind, &mut stats, progress, cancel).await;
        stats.duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        let status = match &result {
            Ok(()) => RunStatus::Completed,
            Err(GradeSyncError::Cancelled) => RunStatus::Cancelled,
            Err(_) => RunStatus::Failed,
        };
        if let Err(e) = &result {
            stats.error = Some(e.to_string());
        }

        let recorded = match serde_json::to_string(&stats) {
            Ok(json) => {
                self.storage
                    .finish_run(&run_id, status.as_str(), &json, stats.dataset_sha256.as_deref())
                    .await
            }
            Err(e) => Err(GradeSyncError::Storage(e.to_string())),
        };
        if let Err(e) = &recorded {
            warn!(%run_id, error = %e, "failed to record run outcome");
        }

        match result {
            Ok(()) => {
                recorded?;
                self.enter(RunPhase::Idle, progress);
                let report = RunReport {
                    run_id,
                    kind,
                    status,
                    stats,
                };
                info!(
                    run_id = %report.run_id,
                    duration_ms = report.stats.duration_ms,
                    "ingestion run completed"
                );
                progress.done(&report);
                Ok(report)
            }
            Err(GradeSyncError::Cancelled) => {
                warn!(%run_id, "ingestion run cancelled before commit");
                self.phase = RunPhase::Idle;
                Err(GradeSyncError::Cancelled)
            }
            Err(e) => {
                warn!(%run_id, phase = %self.phase, error = %e, "ingestion run failed");
                self.enter(RunPhase::Failed, progress);
                Err(e)
            }
        }
    }

    async fn execute(
        &mut self,
        kind: RunKind,
        stats: &mut RunStats,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<()> {
        match kind {
            RunKind::Refresh => {
                let links = self.fetch_links(stats, progress).await?;
                let outcome = self.fetch_pages(links, stats, progress, cancel).await?;
                let dataset = self.fetch_grades(stats, progress).await?;
                let faculty = self.faculty_records(outcome, &dataset.dataset.records, stats, progress);

                ensure_not_cancelled(cancel)?;
                self.enter(RunPhase::Committing, progress);
                self.commit_grades(&dataset, stats).await?;
                self.commit_faculty(&faculty, stats).await?;
                stats.merge = Some(merge_faculty_with_grades(self.storage, self.predicate.as_ref()).await?);
            }
            RunKind::Grades => {
                self.enter(RunPhase::FetchingPages, progress);
                let dataset = self.fetch_grades(stats, progress).await?;

                ensure_not_cancelled(cancel)?;
                self.enter(RunPhase::Committing, progress);
                self.commit_grades(&dataset, stats).await?;
            }
            RunKind::Faculty => {
                let links = self.fetch_links(stats, progress).await?;
                let outcome = self.fetch_pages(links, stats, progress, cancel).await?;
                let stored = self.storage.find_grades(&Filter::All).await?;
                let faculty = self.faculty_records(outcome, &stored, stats, progress);

                ensure_not_cancelled(cancel)?;
                self.enter(RunPhase::Committing, progress);
                self.commit_faculty(&faculty, stats).await?;
            }
            RunKind::Merge => {
                self.enter(RunPhase::Reconciling, progress);
                ensure_not_cancelled(cancel)?;
                self.enter(RunPhase::Committing, progress);
                stats.merge = Some(merge_faculty_with_grades(self.storage, self.predicate.as_ref()).await?);
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Phases
    // -----------------------------------------------------------------------

    async fn fetch_links(
        &mut self,
        stats: &mut RunStats,
        progress: &dyn ProgressReporter,
    ) -> Result<Vec<SourceLink>> {
        self.enter(RunPhase::FetchingLinks, progress);
        let opts = DiscoveryOptions::from(&self.config);

        let found = gradesync_discovery::discover_links(self.fetcher(), &opts)
            .await
            .map_err(|e| GradeSyncError::run_failed(RunPhase::FetchingLinks, e.to_string()))?;
        stats.links_found = found.links.len();
        stats.links_discarded = found.discarded.len();

        if found.links.is_empty() {
            return Err(GradeSyncError::run_failed(
                RunPhase::FetchingLinks,
                format!("no catalog links found at {}", opts.archive_root),
            ));
        }
        progress.message(&format!("{} department pages", found.links.len()));
        Ok(found.links)
    }

    async fn fetch_pages(
        &mut self,
        links: Vec<SourceLink>,
        stats: &mut RunStats,
        progress: &dyn ProgressReporter,
        cancel: &CancellationToken,
    ) -> Result<PoolOutcome<FacultyCandidate>> {
        self.enter(RunPhase::FetchingPages, progress);
        let strategy = Arc::new(TitleVocabularyExtractor::new(&self.config.extract)?);

        let outcome = self.pool.run(links, strategy, cancel).await;
        stats.pages_fetched = outcome.pages.len();
        stats.pages_failed = outcome.failures.len();
        stats.empty_pages = outcome.empty_pages;
        stats.duplicates_skipped = outcome.duplicates_skipped;
        stats.not_submitted = outcome.not_submitted;
        stats.faculty_candidates = outcome.record_count();

        if outcome.cancelled {
            return Err(GradeSyncError::Cancelled);
        }
        Ok(outcome)
    }

    async fn fetch_grades(
        &mut self,
        stats: &mut RunStats,
        progress: &dyn ProgressReporter,
    ) -> Result<FetchedDataset> {
        progress.message("fetching grade dataset");
        let fetched = fetch_grade_dataset(self.fetcher(), &self.config.sources)
            .await
            .map_err(|e| GradeSyncError::run_failed(self.phase, e.to_string()))?;

        stats.grade_records = fetched.dataset.records.len();
        stats.grade_entries_skipped = fetched.dataset.skipped.len();
        stats.dataset_bytes = fetched.bytes;
        stats.dataset_sha256 = Some(fetched.sha256.clone());
        Ok(fetched)
    }

    /// Extract, normalize, and resolve course numbers for scraped faculty.
    fn faculty_records(
        &mut self,
        outcome: PoolOutcome<FacultyCandidate>,
        grades: &[GradeRecord],
        stats: &mut RunStats,
        progress: &dyn ProgressReporter,
    ) -> Vec<FacultyRecord> {
        self.enter(RunPhase::Extracting, progress);
        let raw: Vec<RawFacultyRecord> = outcome
            .into_pages()
            .flat_map(|page| {
                let link = page.link;
                page.records.into_iter().map(move |c| RawFacultyRecord {
                    raw_name: c.raw_name,
                    department_code: link.department_code.clone(),
                    title: Some(c.title),
                    source_url: Some(link.url.clone()),
                })
            })
            .collect();

        self.enter(RunPhase::Normalizing, progress);
        let (normalized, rejected) = normalize_all(&raw);
        stats.faculty_rejected = rejected;

        self.enter(RunPhase::Reconciling, progress);
        let index = CourseIndex::from_grades(grades);
        if index.is_empty() {
            warn!("no grade records to index, faculty course numbers cannot be resolved");
        }
        stats.courses_indexed = index.len();
        let resolution = resolve_faculty(&normalized, &index, self.predicate.as_ref());
        stats.faculty_unresolved = resolution.unresolved.len();

        info!(
            raw = raw.len(),
            normalized = normalized.len(),
            rejected,
            courses = index.len(),
            resolved = resolution.records.len(),
            unresolved = resolution.unresolved.len(),
            "faculty records prepared"
        );
        resolution.records
    }

    async fn commit_grades(&self, fetched: &FetchedDataset, stats: &mut RunStats) -> Result<()> {
        let replaced = self.storage.replace_grades(&fetched.dataset.records).await?;
        stats.grades_removed = replaced.removed;
        Ok(())
    }

    async fn commit_faculty(&self, faculty: &[FacultyRecord], stats: &mut RunStats) -> Result<()> {
        stats.upsert = Some(upsert_faculty(self.storage, faculty, self.run.batch_size).await?);
        Ok(())
    }
}

fn ensure_not_cancelled(cancel: &CancellationToken) -> Result<()> {
    if cancel.is_cancelled() {
        Err(GradeSyncError::Cancelled)
    } else {
        Ok(())
    }
}
