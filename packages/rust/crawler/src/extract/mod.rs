//! Pluggable extraction strategies.
//!
//! A strategy turns fetched content into raw records and knows nothing about
//! fetching or merging, so the matching heuristics can be swapped and tested
//! on their own.

mod faculty;
mod grades;

use gradesync_shared::Result;

pub use faculty::{FacultyCandidate, TitleVocabularyExtractor};
pub use grades::{GradeDataset, GradeDatasetExtractor, SkippedEntry};

/// Trait for content-to-record extraction.
pub trait ExtractionStrategy: Send + Sync {
    /// Record type produced per match.
    type Record: Send + 'static;

    /// Parse `content` into raw records. An empty vector means "no matches",
    /// which callers treat as a soft outcome.
    fn extract(&self, content: &str) -> Result<Vec<Self::Record>>;

    /// Human-readable strategy name for tracing.
    fn name(&self) -> &str;
}
