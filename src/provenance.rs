//! File provenance tracking via per-directory sidecar files.
//!
//! Every directory that holds exported data files also holds a
//! `metadata.json` sidecar describing each file: its identity, schema,
//! pipeline position, direct inputs and per-column documentation. Sidecars
//! are self-contained: saving a file copies the records of every ancestor
//! into the destination sidecar, so a directory can be archived or shipped
//! without losing the history of how its files were produced.
//!
//! File identity is deterministic: a UUID derived from the file's
//! root-relative path, so re-exporting the same logical file updates its
//! record in place instead of accumulating duplicates.

pub mod record;
pub mod store;

pub use record::{ColumnSchema, FileRecord, identity_for_path};
pub use store::{ProvenanceStore, SIDECAR_FILE_NAME, Sidecar, files_needed_to_generate};
