//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use gradesync_core::admin;
use gradesync_core::pipeline::{
    IngestionCoordinator, ProgressReporter, RunKind, RunPhase, RunReport,
};
use gradesync_core::reconcile::{predicate_for, unmatched_names};
use gradesync_shared::{
    AppConfig, GradeSyncError, MatchKind, RunConfig, init_config, load_config, load_config_from,
};
use gradesync_storage::Storage;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// gradesync: merge scraped faculty listings with public grade data.
#[derive(Parser)]
#[command(
    name = "gradesync",
    version,
    about = "Ingest faculty listings and grade distributions into a local store.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.gradesync/gradesync.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Database path, overriding `[store] path`.
    #[arg(long, env = "GRADESYNC_DB", global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Grade-record match predicate.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub(crate) enum PredicateArg {
    CoursePrefix,
    InstructorPrefix,
    Exact,
}

impl From<PredicateArg> for MatchKind {
    fn from(arg: PredicateArg) -> Self {
        match arg {
            PredicateArg::CoursePrefix => MatchKind::CoursePrefix,
            PredicateArg::InstructorPrefix => MatchKind::InstructorPrefix,
            PredicateArg::Exact => MatchKind::Exact,
        }
    }
}

/// Overrides shared by the ingestion commands.
#[derive(clap::Args, Clone, Debug, Default)]
pub(crate) struct RunArgs {
    /// Maximum simultaneous page fetches.
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Grade-record match predicate.
    #[arg(long, value_enum)]
    pub predicate: Option<PredicateArg>,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Full run: grade dataset, faculty pages, and merge.
    Refresh {
        #[command(flatten)]
        args: RunArgs,
    },

    /// Replace stored grades with the remote dataset.
    Grades,

    /// Scrape faculty pages and upsert them against stored grades.
    Faculty {
        #[command(flatten)]
        args: RunArgs,
    },

    /// Tag stored grade records with stored faculty identities.
    Merge {
        /// Grade-record match predicate.
        #[arg(long, value_enum)]
        predicate: Option<PredicateArg>,
    },

    /// List names present in one source but not the other.
    Unmatched {
        /// Grade-record match predicate.
        #[arg(long, value_enum)]
        predicate: Option<PredicateArg>,

        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// List known departments and course numbers in the grade store.
    Departments {
        /// Print JSON instead of text.
        #[arg(long)]
        json: bool,
    },

    /// Delete all faculty and grade records.
    Clear {
        /// Confirm deletion.
        #[arg(long)]
        yes: bool,
    },

    /// Show recent ingestion runs.
    Runs {
        /// Number of runs to show.
        #[arg(long, default_value = "10")]
        limit: u32,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "gradesync=info",
        1 => "gradesync=debug",
        _ => "gradesync=trace",
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };

    match cli.command {
        Command::Refresh { args } => cmd_ingest(&config, cli.db, RunKind::Refresh, &args).await,
        Command::Grades => cmd_ingest(&config, cli.db, RunKind::Grades, &RunArgs::default()).await,
        Command::Faculty { args } => cmd_ingest(&config, cli.db, RunKind::Faculty, &args).await,
        Command::Merge { predicate } => {
            let args = RunArgs {
                predicate,
                ..RunArgs::default()
            };
            cmd_ingest(&config, cli.db, RunKind::Merge, &args).await
        }
        Command::Unmatched { predicate, json } => {
            cmd_unmatched(&config, cli.db, predicate, json).await
        }
        Command::Departments { json } => cmd_departments(&config, cli.db, json).await,
        Command::Clear { yes } => cmd_clear(&config, cli.db, yes).await,
        Command::Runs { limit } => cmd_runs(&config, cli.db, limit).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(&config).await,
        },
    }
}

/// Open the store and create its indexes once for this process.
async fn open_storage(config: &AppConfig, db: Option<PathBuf>) -> Result<Storage> {
    let path = match db {
        Some(p) => p,
        None => config.store_path()?,
    };
    info!(path = %path.display(), "opening store");
    let storage = Storage::open(&path).await?;
    storage.ensure_indexes().await?;
    Ok(storage)
}

// ---------------------------------------------------------------------------
// Ingestion
// ---------------------------------------------------------------------------

async fn cmd_ingest(
    config: &AppConfig,
    db: Option<PathBuf>,
    kind: RunKind,
    args: &RunArgs,
) -> Result<()> {
    let mut run_config = RunConfig::from(config);
    if let Some(concurrency) = args.concurrency {
        if concurrency == 0 {
            return Err(eyre!("--concurrency must be at least 1"));
        }
        run_config.pool.concurrency = concurrency;
    }
    if let Some(predicate) = args.predicate {
        run_config.predicate = predicate.into();
    }

    let storage = open_storage(config, db).await?;
    let mut coordinator = IngestionCoordinator::with_run_config(&storage, config.clone(), run_config)?;

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, finishing in-flight pages");
                cancel.cancel();
            }
        })
    };

    let reporter = CliProgress::new();
    let result = coordinator.run(kind, &reporter, &cancel).await;
    ctrl_c.abort();

    let report = match result {
        Ok(report) => report,
        Err(GradeSyncError::Cancelled) => {
            reporter.spinner.finish_and_clear();
            return Err(eyre!("{kind} run cancelled; nothing was committed"));
        }
        Err(e) => {
            reporter.spinner.finish_and_clear();
            return Err(e.into());
        }
    };

    print_report(&report);
    Ok(())
}

fn print_report(report: &RunReport) {
    let stats = &report.stats;
    println!();
    println!("  Run {} ({}) {}", report.run_id, report.kind, report.status.as_str());
    if stats.links_found > 0 {
        println!(
            "  Pages:    {} fetched, {} failed, {} without faculty",
            stats.pages_fetched, stats.pages_failed, stats.empty_pages
        );
    }
    if stats.grade_records > 0 {
        println!(
            "  Grades:   {} records ({} entries skipped)",
            stats.grade_records, stats.grade_entries_skipped
        );
    }
    if let Some(upsert) = &stats.upsert {
        println!(
            "  Faculty:  {} new, {} updated, {} skipped, {} unresolved",
            upsert.upserted, upsert.modified, upsert.skipped, stats.faculty_unresolved
        );
    }
    match &stats.merge {
        Some(merge) if merge.modified > 0 => {
            println!("  Merged:   {} grade records tagged", merge.modified);
        }
        Some(_) => println!("  Merged:   no matches"),
        None => {}
    }
    println!("  Time:     {:.1}s", stats.duration_ms as f64 / 1000.0);
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, phase: RunPhase) {
        let label = match phase {
            RunPhase::Idle | RunPhase::Failed => return,
            RunPhase::FetchingLinks => "Discovering department pages",
            RunPhase::FetchingPages => "Fetching pages",
            RunPhase::Extracting => "Extracting faculty",
            RunPhase::Normalizing => "Normalizing names",
            RunPhase::Reconciling => "Resolving course numbers",
            RunPhase::Committing => "Writing to store",
        };
        self.spinner.set_message(label);
    }

    fn message(&self, msg: &str) {
        self.spinner.set_message(msg.to_string());
    }

    fn done(&self, _report: &RunReport) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// Administration
// ---------------------------------------------------------------------------

async fn cmd_unmatched(
    config: &AppConfig,
    db: Option<PathBuf>,
    predicate: Option<PredicateArg>,
    json: bool,
) -> Result<()> {
    let storage = open_storage(config, db).await?;
    let kind = predicate.map(MatchKind::from).unwrap_or(config.reconcile.predicate);
    let report = unmatched_names(&storage, predicate_for(kind).as_ref()).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if report.faculty_without_grades.is_empty() && report.instructors_without_faculty.is_empty() {
        println!("No unmatched names.");
        return Ok(());
    }
    println!("Faculty without grade records ({}):", report.faculty_without_grades.len());
    for name in &report.faculty_without_grades {
        println!("  {name}");
    }
    println!();
    println!(
        "Instructors without faculty records ({}):",
        report.instructors_without_faculty.len()
    );
    for name in &report.instructors_without_faculty {
        println!("  {name}");
    }
    Ok(())
}

async fn cmd_departments(config: &AppConfig, db: Option<PathBuf>, json: bool) -> Result<()> {
    let storage = open_storage(config, db).await?;
    let listing = admin::list_departments(&storage, &config.departments).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&listing)?);
    } else if listing.departments.is_empty() {
        println!("No data.");
    } else {
        println!("Departments: {}", listing.departments.join(", "));
        println!("Classes:     {}", listing.classes.join(", "));
    }
    Ok(())
}

async fn cmd_clear(config: &AppConfig, db: Option<PathBuf>, yes: bool) -> Result<()> {
    if !yes {
        return Err(eyre!("refusing to delete all records without --yes"));
    }
    let storage = open_storage(config, db).await?;
    let report = admin::clear_all(&storage).await?;
    println!(
        "Removed {} grade records and {} faculty records.",
        report.grades, report.faculty
    );
    Ok(())
}

async fn cmd_runs(config: &AppConfig, db: Option<PathBuf>, limit: u32) -> Result<()> {
    let storage = open_storage(config, db).await?;
    let runs = storage.list_runs(limit).await?;
    if runs.is_empty() {
        println!("No runs recorded.");
        return Ok(());
    }

    for run in runs {
        println!(
            "{}  {:<8} {:<10} {}",
            run.id,
            run.kind,
            run.status,
            run.finished_at.as_deref().unwrap_or(&run.started_at)
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}
