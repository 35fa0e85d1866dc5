//! Bounded worker pool for per-page fetch + extract.
//!
//! Every source link becomes one task: fetch through the shared [`Fetcher`],
//! then run the extraction strategy on the same worker. A semaphore caps the
//! number of pages in flight. Tasks return their own results and the pool
//! fans them in after they finish, so no map is shared between workers.
//!
//! Per-page failures are soft: they are logged, counted, and never abort the
//! pool. Arrival order is not preserved.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::{self, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use gradesync_shared::{PoolConfig, Result, SourceLink};

use crate::extract::ExtractionStrategy;
use crate::fetcher::Fetcher;

// ---------------------------------------------------------------------------
// Outcome types
// ---------------------------------------------------------------------------

/// Records extracted from one page.
#[derive(Debug, Clone)]
pub struct PageOutcome<R> {
    pub link: SourceLink,
    /// Empty when the page had no matches.
    pub records: Vec<R>,
}

/// A page that failed to fetch or extract.
#[derive(Debug, Clone)]
pub struct PageFailure {
    pub link: SourceLink,
    /// Error taxonomy label (`network`, `extraction`, ...).
    pub kind: &'static str,
    pub message: String,
}

/// Aggregated result of a pool run.
#[derive(Debug)]
pub struct PoolOutcome<R> {
    /// Successfully processed pages keyed by URL.
    pub pages: HashMap<String, PageOutcome<R>>,
    /// Soft per-page failures.
    pub failures: Vec<PageFailure>,
    /// Pages fetched fine but with zero matches.
    pub empty_pages: usize,
    /// Links skipped because their department was already submitted.
    pub duplicates_skipped: usize,
    /// Departments never submitted because the run was cancelled.
    pub not_submitted: usize,
    /// Whether cancellation was observed.
    pub cancelled: bool,
    pub duration: Duration,
}

impl<R> Default for PoolOutcome<R> {
    fn default() -> Self {
        Self {
            pages: HashMap::new(),
            failures: Vec::new(),
            empty_pages: 0,
            duplicates_skipped: 0,
            not_submitted: 0,
            cancelled: false,
            duration: Duration::ZERO,
        }
    }
}

impl<R> PoolOutcome<R> {
    /// Total number of records across all pages.
    pub fn record_count(&self) -> usize {
        self.pages.values().map(|p| p.records.len()).sum()
    }

    /// Consume the outcome, yielding every page.
    pub fn into_pages(self) -> impl Iterator<Item = PageOutcome<R>> {
        self.pages.into_values()
    }
}

// ---------------------------------------------------------------------------
// PagePool
// ---------------------------------------------------------------------------

/// Fixed-width pool of fetch+extract workers.
pub struct PagePool {
    fetcher: Arc<Fetcher>,
    concurrency: usize,
}

impl PagePool {
    /// Create a pool around an existing fetcher.
    pub fn new(fetcher: Arc<Fetcher>, concurrency: usize) -> Self {
        Self {
            fetcher,
            concurrency: concurrency.max(1),
        }
    }

    /// Build a pool and its fetcher from the pool configuration.
    pub fn from_config(config: &PoolConfig) -> Result<Self> {
        let fetcher = Fetcher::from_config(config)?;
        Ok(Self::new(Arc::new(fetcher), config.concurrency))
    }

    /// The shared fetcher.
    pub fn fetcher(&self) -> &Arc<Fetcher> {
        &self.fetcher
    }

    /// Fetch and extract every link.
    ///
    /// A link whose department code was already submitted is skipped. Once
    /// `cancel` fires no further links are submitted; pages already in flight
    /// are allowed to finish.
    #[instrument(skip_all, fields(links = links.len(), strategy = strategy.name()))]
    pub async fn run<S>(
        &self,
        links: Vec<SourceLink>,
        strategy: Arc<S>,
        cancel: &CancellationToken,
    ) -> PoolOutcome<S::Record>
    where
        S: ExtractionStrategy + 'static,
    {
        let start = Instant::now();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();
        let mut in_flight: HashMap<task::Id, SourceLink> = HashMap::new();
        let mut submitted_departments: HashSet<String> = HashSet::new();
        let mut outcome = PoolOutcome::default();

        info!(concurrency = self.concurrency, "starting page pool");

        for (index, link) in links.iter().enumerate() {
            if submitted_departments.contains(&link.department_code) {
                debug!(url = %link.url, department = %link.department_code, "duplicate department, skipping");
                outcome.duplicates_skipped += 1;
                continue;
            }

            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                outcome.not_submitted = links[index..]
                    .iter()
                    .map(|l| l.department_code.as_str())
                    .filter(|code| !submitted_departments.contains(*code))
                    .collect::<HashSet<_>>()
                    .len();
                warn!(not_submitted = outcome.not_submitted, "cancelled, no further pages submitted");
                break;
            };
            submitted_departments.insert(link.department_code.clone());

            let fetcher = Arc::clone(&self.fetcher);
            let strategy = Arc::clone(&strategy);
            let task_link = link.clone();
            let handle = tasks.spawn(async move {
                let _permit = permit;
                let result = process_page(&fetcher, strategy.as_ref(), &task_link.url).await;
                (task_link, result)
            });
            in_flight.insert(handle.id(), link.clone());
        }

        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((id, (link, Ok(records)))) => {
                    in_flight.remove(&id);
                    if records.is_empty() {
                        info!(url = %link.url, department = %link.department_code, "no matches on page");
                        outcome.empty_pages += 1;
                    } else {
                        debug!(url = %link.url, records = records.len(), "page extracted");
                    }
                    outcome
                        .pages
                        .insert(link.url.clone(), PageOutcome { link, records });
                }
                Ok((id, (link, Err(e)))) => {
                    in_flight.remove(&id);
                    warn!(url = %link.url, error = %e, "page failed, skipping");
                    outcome.failures.push(PageFailure {
                        link,
                        kind: e.kind(),
                        message: e.to_string(),
                    });
                }
                Err(e) => {
                    let Some(link) = in_flight.remove(&e.id()) else {
                        warn!(error = %e, "untracked page task aborted");
                        continue;
                    };
                    warn!(url = %link.url, error = %e, "page task aborted");
                    outcome.failures.push(PageFailure {
                        link,
                        kind: "task",
                        message: e.to_string(),
                    });
                }
            }
        }

        outcome.cancelled = cancel.is_cancelled();
        outcome.duration = start.elapsed();

        info!(
            pages = outcome.pages.len(),
            records = outcome.record_count(),
            failures = outcome.failures.len(),
            empty = outcome.empty_pages,
            duplicates = outcome.duplicates_skipped,
            cancelled = outcome.cancelled,
            duration_ms = outcome.duration.as_millis(),
            "page pool finished"
        );

        outcome
    }
}

/// Fetch one page and run the strategy over its body.
async fn process_page<S>(fetcher: &Fetcher, strategy: &S, url: &str) -> Result<Vec<S::Record>>
where
    S: ExtractionStrategy,
{
    let body = fetcher.fetch(url).await?;
    strategy.extract(&body)
}
