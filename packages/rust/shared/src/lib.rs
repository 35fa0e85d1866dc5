//! Shared types, error model, and configuration for gradesync.
//!
//! This crate is the foundation depended on by all other gradesync crates.
//! It provides:
//! - [`GradeSyncError`], the unified error type
//! - Domain types ([`SourceLink`], [`FacultyRecord`], [`GradeRecord`], [`RunId`])
//! - Configuration ([`AppConfig`], [`RetryPolicy`], [`PoolConfig`], [`RunConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, Department, ExtractConfig, FetchConfig, MatchKind, NameOrder, PoolConfig,
    ReconcileConfig, RetryPolicy, RunConfig, SourcesConfig, StoreConfig, config_dir, config_file_path,
    expand_home, init_config, load_config, load_config_from, validate_config,
};
pub use error::{GradeSyncError, Result};
pub use types::{
    FacultyRecord, GradePercentages, GradeRecord, MISSING_CRN, NormalizedFacultyRecord,
    RawFacultyRecord, RunId, SourceLink, UNKNOWN_INSTRUCTOR,
};
