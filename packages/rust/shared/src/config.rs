//! Application configuration for gradesync.
//!
//! User config lives at `~/.gradesync/gradesync.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{GradeSyncError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "gradesync.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".gradesync";

// ---------------------------------------------------------------------------
// Config structs (matching gradesync.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Remote sources.
    #[serde(default)]
    pub sources: SourcesConfig,

    /// HTTP fetch and retry settings.
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Faculty extraction settings.
    #[serde(default)]
    pub extract: ExtractConfig,

    /// Reconciliation settings.
    #[serde(default)]
    pub reconcile: ReconcileConfig,

    /// Store settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// The closed set of known departments.
    #[serde(default = "default_departments")]
    pub departments: Vec<Department>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            sources: SourcesConfig::default(),
            fetch: FetchConfig::default(),
            extract: ExtractConfig::default(),
            reconcile: ReconcileConfig::default(),
            store: StoreConfig::default(),
            departments: default_departments(),
        }
    }
}

/// `[sources]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Archived catalog root listing the department pages.
    #[serde(default = "default_archive_root")]
    pub archive_root: String,

    /// JavaScript file embedding the grade dataset.
    #[serde(default = "default_grade_dataset_url")]
    pub grade_dataset_url: String,

    /// Variable name the dataset object is assigned to.
    #[serde(default = "default_dataset_variable")]
    pub dataset_variable: String,

    /// Path segment identifying department catalog links.
    #[serde(default = "default_catalog_path_segment")]
    pub catalog_path_segment: String,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            archive_root: default_archive_root(),
            grade_dataset_url: default_grade_dataset_url(),
            dataset_variable: default_dataset_variable(),
            catalog_path_segment: default_catalog_path_segment(),
        }
    }
}

fn default_archive_root() -> String {
    "https://web.archive.org/web/20140901091007/http://catalog.uoregon.edu/arts_sciences/".into()
}
fn default_grade_dataset_url() -> String {
    "https://emeraldmediagroup.github.io/grade-data/gradedata.js".into()
}
fn default_dataset_variable() -> String {
    "groups".into()
}
fn default_catalog_path_segment() -> String {
    "arts_sciences".into()
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Maximum simultaneous page fetches.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Retry ceiling for transient failures.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base of the exponential backoff (`delay = base ^ attempt` seconds).
    #[serde(default = "default_backoff_base")]
    pub backoff_base: f64,

    /// Upper bound for a single backoff delay.
    #[serde(default = "default_max_backoff_secs")]
    pub max_backoff_secs: u64,

    /// HTTP statuses treated as transient.
    #[serde(default = "default_retryable_status_codes")]
    pub retryable_status_codes: Vec<u16>,

    /// Per-request timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_retries: default_max_retries(),
            backoff_base: default_backoff_base(),
            max_backoff_secs: default_max_backoff_secs(),
            retryable_status_codes: default_retryable_status_codes(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_concurrency() -> usize {
    5
}
fn default_max_retries() -> u32 {
    3
}
fn default_backoff_base() -> f64 {
    2.0
}
fn default_max_backoff_secs() -> u64 {
    30
}
fn default_retryable_status_codes() -> Vec<u16> {
    vec![500, 502, 503, 504]
}
fn default_timeout_secs() -> u64 {
    30
}

/// Word order of names as printed on faculty pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NameOrder {
    /// "Jane Q. Doe", rewritten to "Doe, Jane Q." before normalization.
    FirstLast,
    /// Already "Doe, Jane".
    LastFirst,
}

/// `[extract]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// CSS selector for the block elements scanned for faculty lines.
    #[serde(default = "default_block_selector")]
    pub block_selector: String,

    /// Academic title vocabulary (matched case-insensitively).
    #[serde(default = "default_titles")]
    pub titles: Vec<String>,

    /// Word order of names on faculty pages.
    #[serde(default = "default_name_order")]
    pub name_order: NameOrder,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            block_selector: default_block_selector(),
            titles: default_titles(),
            name_order: default_name_order(),
        }
    }
}

fn default_block_selector() -> String {
    "p, li".into()
}
fn default_titles() -> Vec<String> {
    [
        "professor",
        "associate professor",
        "assistant professor",
        "lecturer",
        "instructor",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_name_order() -> NameOrder {
    NameOrder::FirstLast
}

/// How grade records are matched against a faculty identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchKind {
    /// Instructor prefix match, restricted to the faculty's course code.
    CoursePrefix,
    /// Instructor prefix match only.
    InstructorPrefix,
    /// Exact instructor equality.
    Exact,
}

/// `[reconcile]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Grade-record match predicate.
    #[serde(default = "default_predicate")]
    pub predicate: MatchKind,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            predicate: default_predicate(),
        }
    }
}

fn default_predicate() -> MatchKind {
    MatchKind::CoursePrefix
}

/// `[store]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Database file path (`~/` is expanded).
    #[serde(default = "default_store_path")]
    pub path: String,

    /// Upserts per bulk write.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_store_path() -> String {
    "~/.gradesync/gradesync.db".into()
}
fn default_batch_size() -> usize {
    1000
}

/// `[[departments]]` entry, one member of the closed department set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    /// Course prefix, e.g. `CIS`.
    pub code: String,
    /// Catalog path slug, e.g. `computerandinfoscience`.
    pub slug: String,
    /// Human-readable name.
    pub name: String,
}

fn default_departments() -> Vec<Department> {
    [
        ("BI", "biology", "Biology"),
        ("CH", "chemistry", "Chemistry and Biochemistry"),
        ("CIS", "computerandinfoscience", "Computer and Information Science"),
        ("ERTH", "earthsciences", "Earth Sciences"),
        ("HPHY", "humanphysiology", "Human Physiology"),
        ("MATH", "mathematics", "Mathematics"),
        ("PHYS", "physics", "Physics"),
        ("PSY", "psychology", "Psychology"),
    ]
    .into_iter()
    .map(|(code, slug, name)| Department {
        code: code.into(),
        slug: slug.into(),
        name: name.into(),
    })
    .collect()
}

impl AppConfig {
    /// Resolved database path.
    pub fn store_path(&self) -> Result<PathBuf> {
        expand_home(&self.store.path)
    }
}

// ---------------------------------------------------------------------------
// Runtime config (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Retry/backoff policy handed to the fetcher.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Number of retries after the first attempt.
    pub max_retries: u32,
    /// Backoff base; the delay before retry `n` is `base ^ n` seconds.
    pub backoff_base: f64,
    /// Cap on any single delay.
    pub max_backoff: Duration,
    /// Statuses worth retrying.
    pub retryable_status_codes: Vec<u16>,
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.backoff_base.powi(exponent);
        // Out-of-range delays (overflow, NaN, negative) saturate at the cap.
        Duration::try_from_secs_f64(secs).map_or(self.max_backoff, |d| d.min(self.max_backoff))
    }

    /// Whether an HTTP status is in the forcelist.
    pub fn is_retryable_status(&self, status: u16) -> bool {
        self.retryable_status_codes.contains(&status)
    }

    /// A policy with no delay between attempts.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff_base: 0.0,
            max_backoff: Duration::ZERO,
            retryable_status_codes: default_retryable_status_codes(),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for RetryPolicy {
    fn from(config: &AppConfig) -> Self {
        Self {
            max_retries: config.fetch.max_retries,
            backoff_base: config.fetch.backoff_base,
            max_backoff: Duration::from_secs(config.fetch.max_backoff_secs),
            retryable_status_codes: config.fetch.retryable_status_codes.clone(),
        }
    }
}

/// Worker pool configuration for page fetching.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum simultaneous fetches.
    pub concurrency: usize,
    /// Per-request timeout.
    pub timeout: Duration,
    /// Retry policy for every fetch.
    pub retry: RetryPolicy,
}

impl From<&AppConfig> for PoolConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            concurrency: config.fetch.concurrency.max(1),
            timeout: Duration::from_secs(config.fetch.timeout_secs),
            retry: RetryPolicy::from(config),
        }
    }
}

/// Per-run settings for the ingestion coordinator.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub pool: PoolConfig,
    /// Upserts per bulk write.
    pub batch_size: usize,
    /// Grade-record match predicate.
    pub predicate: MatchKind,
}

impl From<&AppConfig> for RunConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            pool: PoolConfig::from(config),
            batch_size: config.store.batch_size.max(1),
            predicate: config.reconcile.predicate,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.gradesync/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| GradeSyncError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.gradesync/gradesync.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| GradeSyncError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        GradeSyncError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    validate_config(&config)?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| GradeSyncError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| GradeSyncError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| GradeSyncError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Largest accepted `fetch.backoff_base`.
const MAX_BACKOFF_BASE: f64 = 60.0;

/// Reject configurations the pipeline cannot run with.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    if config.departments.is_empty() {
        return Err(GradeSyncError::config("at least one [[departments]] entry is required"));
    }
    if config.extract.titles.is_empty() {
        return Err(GradeSyncError::config("extract.titles must not be empty"));
    }
    if config.fetch.concurrency == 0 {
        return Err(GradeSyncError::config("fetch.concurrency must be at least 1"));
    }
    if !(0.0..=MAX_BACKOFF_BASE).contains(&config.fetch.backoff_base) {
        return Err(GradeSyncError::config(format!(
            "fetch.backoff_base must be between 0 and {MAX_BACKOFF_BASE}"
        )));
    }
    if config.store.batch_size == 0 {
        return Err(GradeSyncError::config("store.batch_size must be at least 1"));
    }
    for url in [&config.sources.archive_root, &config.sources.grade_dataset_url] {
        url::Url::parse(url)
            .map_err(|e| GradeSyncError::config(format!("invalid source URL '{url}': {e}")))?;
    }
    Ok(())
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| GradeSyncError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("archive_root"));
        assert!(toml_str.contains("gradedata.js"));
        assert!(toml_str.contains("[[departments]]"));
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[fetch]
concurrency = 8

[[departments]]
code = "CIS"
slug = "computerandinfoscience"
name = "Computer and Information Science"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.fetch.concurrency, 8);
        assert_eq!(config.fetch.max_retries, 3);
        assert_eq!(config.departments.len(), 1);
        assert_eq!(config.reconcile.predicate, MatchKind::CoursePrefix);
        assert_eq!(config.extract.name_order, NameOrder::FirstLast);
    }

    #[test]
    fn enums_use_kebab_case() {
        let toml_str = r#"
[reconcile]
predicate = "instructor-prefix"

[extract]
name_order = "last-first"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.reconcile.predicate, MatchKind::InstructorPrefix);
        assert_eq!(config.extract.name_order, NameOrder::LastFirst);
        assert_eq!(config.departments.len(), 8);
    }

    #[test]
    fn retry_policy_from_app_config() {
        let app = AppConfig::default();
        let policy = RetryPolicy::from(&app);
        assert_eq!(policy.max_retries, 3);
        assert!(policy.is_retryable_status(503));
        assert!(!policy.is_retryable_status(404));
        assert_eq!(policy.backoff(1), Duration::from_secs(2));
        assert_eq!(policy.backoff(3), Duration::from_secs(8));
        assert_eq!(policy.backoff(10), Duration::from_secs(30));
    }

    #[test]
    fn immediate_policy_never_sleeps() {
        let policy = RetryPolicy::immediate(2);
        assert_eq!(policy.backoff(1), Duration::ZERO);
        assert_eq!(policy.backoff(2), Duration::ZERO);
    }

    #[test]
    fn validation_rejects_empty_departments() {
        let config = AppConfig {
            departments: vec![],
            ..AppConfig::default()
        };
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("departments"));
    }

    #[test]
    fn oversized_backoff_saturates_at_cap() {
        let policy = RetryPolicy {
            backoff_base: 1e20,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.backoff(1), Duration::from_secs(30));
        assert_eq!(policy.backoff(u32::MAX), Duration::from_secs(30));

        let negative = RetryPolicy {
            backoff_base: -3.0,
            ..RetryPolicy::default()
        };
        assert_eq!(negative.backoff(1), Duration::from_secs(30));
    }

    #[test]
    fn validation_bounds_backoff_base() {
        for base in [1e20, -1.0, f64::NAN, f64::INFINITY] {
            let mut config = AppConfig::default();
            config.fetch.backoff_base = base;
            let err = validate_config(&config).unwrap_err();
            assert!(err.to_string().contains("backoff_base"), "base {base}");
        }

        let mut config = AppConfig::default();
        config.fetch.backoff_base = 0.0;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn expand_home_leaves_absolute_paths() {
        assert_eq!(expand_home("/tmp/x.db").unwrap(), PathBuf::from("/tmp/x.db"));
    }
}
