//! Column-level lineage documentation.
//!
//! This module records, per column of a working dataset, an ordered list of
//! free-text annotations describing how the column came to be. Columns built
//! from several parents hold nested branches, one per parent, so a trail
//! reads as the full derivation tree of the column.
//!
//! ## Core Concepts
//!
//! - **Trail**: ordered entries for one column, persisted alongside the file
//! - **Branch**: the frozen trail of one parent column in a merge step
//! - **Alias**: caller-chosen label scoping column names to one dataset
//! - **Markers**: reserved `"Imported"`, `"Created"`, `"Dropped"` and
//!   `"origin: "` literals written by the bookkeeping layer itself
//!
//! ## Usage
//!
//! ```
//! use datatrail::lineage::Documenter;
//! use std::collections::BTreeMap;
//!
//! # fn example() -> datatrail::error::Result<()> {
//! let mut docs = Documenter::new();
//! docs.seed_import("sales", &["amount".to_owned()], &BTreeMap::new())?;
//! docs.document("sales::amount", "Converted to EUR.", &["sales::amount"], None)?;
//!
//! let trail = docs.get_documentation("amount", Some("sales"), false)?;
//! assert_eq!(trail.len(), 2);
//! # Ok(())
//! # }
//! ```

pub mod documenter;
pub mod tree;

pub use documenter::Documenter;
pub use tree::{CREATED, DROPPED, DocEntry, DocTrail, IMPORTED, ORIGIN_PREFIX};
