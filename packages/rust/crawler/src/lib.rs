//! Page fetching and content extraction.
//!
//! This crate provides:
//! - [`Fetcher`]: HTTP GET with a [`RetryPolicy`](gradesync_shared::RetryPolicy)
//! - [`PagePool`]: bounded concurrent fetch+extract over many source links
//! - [`extract`]: pluggable extraction strategies (faculty pages, grade dataset)

pub mod engine;
pub mod extract;
pub mod fetcher;

pub use engine::{PageFailure, PageOutcome, PagePool, PoolOutcome};
pub use extract::{
    ExtractionStrategy, FacultyCandidate, GradeDataset, GradeDatasetExtractor, SkippedEntry,
    TitleVocabularyExtractor,
};
pub use fetcher::Fetcher;
