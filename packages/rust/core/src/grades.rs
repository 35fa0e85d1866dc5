//! Authoritative grade dataset ingest.
//!
//! The dataset is one remote JavaScript file. It is fetched once, without
//! any concurrency, and any failure here is terminal for the run: grade
//! records are replaced wholesale, so a partial dataset is never committed.

use sha2::{Digest, Sha256};
use tracing::{info, instrument, warn};

use gradesync_crawler::{Fetcher, GradeDataset, GradeDatasetExtractor};
use gradesync_shared::{GradeSyncError, Result, SourcesConfig};

/// A fetched and parsed grade dataset.
#[derive(Debug, Clone)]
pub struct FetchedDataset {
    pub dataset: GradeDataset,
    /// SHA-256 of the raw payload, hex-encoded.
    pub sha256: String,
    /// Payload size in bytes.
    pub bytes: usize,
}

/// Fetch and parse the grade dataset named by `[sources]`.
///
/// Network failures keep their own error kind; a missing marker or a
/// malformed body surfaces as extraction/parse errors for the caller to
/// treat as a terminal run failure.
#[instrument(skip_all, fields(url = %sources.grade_dataset_url))]
pub async fn fetch_grade_dataset(fetcher: &Fetcher, sources: &SourcesConfig) -> Result<FetchedDataset> {
    let extractor = GradeDatasetExtractor::new(&sources.dataset_variable)?;

    let payload = fetcher.fetch(&sources.grade_dataset_url).await?;
    let sha256 = content_hash(&payload);

    let dataset = extractor.parse_dataset(&payload)?;
    if !dataset.skipped.is_empty() {
        warn!(
            skipped = dataset.skipped.len(),
            "grade entries failed validation and were skipped"
        );
    }
    if dataset.records.is_empty() {
        return Err(GradeSyncError::parse("grade dataset contains no usable entries"));
    }

    info!(
        records = dataset.records.len(),
        skipped = dataset.skipped.len(),
        bytes = payload.len(),
        "grade dataset parsed"
    );

    Ok(FetchedDataset {
        dataset,
        sha256,
        bytes: payload.len(),
    })
}

/// Compute SHA-256 hash of content.
pub(crate) fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
