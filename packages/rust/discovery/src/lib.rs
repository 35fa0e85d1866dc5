//! Department link discovery from the archived catalog index.
//!
//! The faculty directory is reachable only through a web-archive mirror of
//! the catalog. The index page links to one page per department; this crate
//! fetches the index and maps each catalog link to a [`SourceLink`](gradesync_shared::SourceLink) for a
//! known department. Links to unknown departments are discarded before any
//! page is fetched.

mod parser;

use gradesync_crawler::Fetcher;
use gradesync_shared::{Department, GradeSyncError, Result};
use tracing::{debug, info, instrument};
use url::Url;

pub use parser::CatalogLinks;

// ---------------------------------------------------------------------------
// Discovery options
// ---------------------------------------------------------------------------

/// Where and what to look for.
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// Archive root URL of the catalog index.
    pub archive_root: String,
    /// Path segment every department link passes through (`arts_sciences`).
    pub catalog_segment: String,
    /// The closed set of known departments.
    pub departments: Vec<Department>,
}

impl From<&gradesync_shared::AppConfig> for DiscoveryOptions {
    fn from(config: &gradesync_shared::AppConfig) -> Self {
        Self {
            archive_root: config.sources.archive_root.clone(),
            catalog_segment: config.sources.catalog_path_segment.clone(),
            departments: config.departments.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Main entry point
// ---------------------------------------------------------------------------

/// Fetch the catalog index and return links to known department pages.
///
/// Returns whatever links were found, possibly none; deciding whether an
/// empty result is fatal is left to the caller.
#[instrument(skip_all, fields(root = %opts.archive_root))]
pub async fn discover_links(fetcher: &Fetcher, opts: &DiscoveryOptions) -> Result<CatalogLinks> {
    let base = Url::parse(&opts.archive_root).map_err(|e| {
        GradeSyncError::config(format!("invalid archive root '{}': {e}", opts.archive_root))
    })?;

    info!("fetching catalog index");
    let body = fetcher.fetch(base.as_str()).await?;

    let parsed = parser::parse_catalog_links(&body, &base, &opts.catalog_segment, &opts.departments);

    for url in &parsed.discarded {
        debug!(%url, "unknown department, discarding link");
    }
    info!(
        links = parsed.links.len(),
        discarded = parsed.discarded.len(),
        "catalog links discovered"
    );

    Ok(parsed)
}
