//! Ingestion orchestration and reconciliation for gradesync.
//!
//! This crate ties together discovery, page crawling, normalization, and the
//! store into end-to-end runs (see [`pipeline::IngestionCoordinator`]), and
//! hosts the faculty/grade reconciler and the administrator operations.

pub mod admin;
pub mod grades;
pub mod pipeline;
pub mod reconcile;
