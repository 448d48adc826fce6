//! # Datatrail - Pipeline Bookkeeping for Tabular Data
//!
//! Datatrail wraps dataset load/save calls with automatic provenance
//! tracking and column-level lineage documentation. Each pipeline stage
//! reads versioned files from a data folder, writes new versioned files,
//! and leaves a `metadata.json` sidecar recording which files produced
//! which, plus a free-text transformation trail per column.
//!
//! ## Quick Start
//!
//! ```no_run
//! use datatrail::stage::{LoadOptions, SaveOptions, Stage};
//!
//! # fn example() -> datatrail::error::Result<()> {
//! let mut stage = Stage::new();
//!
//! // Load the latest version of the raw step's single file.
//! let mut df = stage.load(
//!     &LoadOptions::new()
//!         .attrs(["india", "census"])
//!         .step("raw")
//!         .alias("census"),
//! )?;
//!
//! // Transform df, documenting what happened to each column.
//! stage.col_step("census::population", "Filled missing values with 0.", &["census::population"])?;
//!
//! // Save under the processed step; provenance and documentation ride along.
//! stage.save(
//!     &mut df,
//!     &SaveOptions::new().attrs(["india", "census"]).step("processed"),
//! )?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Modules
//!
//! - [`location`]: dataset addressing and path resolution
//! - [`formats`]: serializer registry keyed by file extension
//! - [`provenance`]: file records, sidecar persistence, lineage closure
//! - [`lineage`]: per-column documentation trails
//! - [`stage`]: the load/save facade tying the above together
//! - [`error`]: error types and handling utilities
//!
//! ## Key Concepts
//!
//! ### Deterministic identity
//!
//! A file's identity is derived from its root-relative path, so re-running
//! a pipeline updates records in place instead of accumulating duplicates.
//!
//! ### Self-contained sidecars
//!
//! Saving a file copies every ancestor record into the destination
//! sidecar. Any directory can be archived or handed off without losing the
//! history of how its files were produced.

#![warn(clippy::all, rust_2018_idioms)]

pub mod error;
pub mod formats;
pub mod lineage;
pub mod location;
pub mod provenance;
pub mod stage;

pub use stage::{LoadOptions, SaveOptions, Stage};
