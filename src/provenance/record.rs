//! File records and their sidecar wire format.

use crate::lineage::DocTrail;
use crate::location::Location;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Deterministic identity of one exported file.
///
/// The UUID is the first 16 bytes of the SHA-256 digest of the file's
/// root-relative path, so the same logical artifact always gets the same
/// identity and re-exports update records in place.
pub fn identity_for_path(path_from_root: &str) -> Uuid {
    let digest = Sha256::digest(path_from_root.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes)
}

/// Schema of one column as captured at export time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    /// Polars dtype rendered as a string, e.g. `i64` or `str`.
    #[serde(rename = "type")]
    pub dtype: String,
    #[serde(default)]
    pub description: String,
}

/// Provenance record of one exported file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "RecordWire", from = "RecordWire")]
pub struct FileRecord {
    pub uuid: Uuid,
    pub location: Location,
    pub columns: Vec<ColumnSchema>,
    /// Name of the format used to write the file, e.g. `csv`.
    pub export_method_used: String,
    /// Identities of the files loaded to produce this one.
    pub input_files: Vec<Uuid>,
    /// Documentation trail per column, dropped columns included.
    pub col_steps: BTreeMap<String, DocTrail>,
}

impl FileRecord {
    /// Build a record for a freshly exported frame.
    pub fn new(
        location: Location,
        frame: &DataFrame,
        export_method: &str,
        input_files: Vec<Uuid>,
        col_steps: BTreeMap<String, DocTrail>,
    ) -> Self {
        Self {
            uuid: identity_for_path(&location.path_from_root()),
            columns: columns_from_frame(frame),
            location,
            export_method_used: export_method.to_owned(),
            input_files,
            col_steps,
        }
    }

    /// Column names in frame order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// Capture name and dtype for each column of a frame.
pub fn columns_from_frame(frame: &DataFrame) -> Vec<ColumnSchema> {
    frame
        .get_columns()
        .iter()
        .map(|col| ColumnSchema {
            name: col.name().to_string(),
            dtype: col.dtype().to_string(),
            description: String::new(),
        })
        .collect()
}

/// Sidecar JSON shape of a record. The file name is split into stem and
/// extension, and the pipeline position is nested under `step`.
#[derive(Debug, Serialize, Deserialize)]
struct RecordWire {
    file_name: String,
    file_type: String,
    uuid: Uuid,
    step: StepWire,
    columns: Vec<ColumnSchema>,
    export_method_used: String,
    input_files: Vec<InputRef>,
    #[serde(default)]
    col_steps: BTreeMap<String, DocTrail>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StepWire {
    attrs: Vec<String>,
    step_name: Option<String>,
    version: Option<String>,
}

/// Input references are objects, not bare strings, leaving room for extra
/// per-edge fields later.
#[derive(Debug, Serialize, Deserialize)]
struct InputRef {
    uuid: Uuid,
}

impl From<FileRecord> for RecordWire {
    fn from(record: FileRecord) -> Self {
        Self {
            file_name: record.location.file_stem().to_owned(),
            file_type: record.location.extension(),
            uuid: record.uuid,
            step: StepWire {
                attrs: record.location.attrs,
                step_name: record.location.step,
                version: record.location.version,
            },
            columns: record.columns,
            export_method_used: record.export_method_used,
            input_files: record
                .input_files
                .into_iter()
                .map(|uuid| InputRef { uuid })
                .collect(),
            col_steps: record.col_steps,
        }
    }
}

impl From<RecordWire> for FileRecord {
    fn from(wire: RecordWire) -> Self {
        let file_name = if wire.file_type.is_empty() {
            wire.file_name
        } else {
            format!("{}.{}", wire.file_name, wire.file_type)
        };
        Self {
            uuid: wire.uuid,
            location: Location {
                attrs: wire.step.attrs,
                step: wire.step.step_name,
                version: wire.step.version,
                file_name,
            },
            columns: wire.columns,
            export_method_used: wire.export_method_used,
            input_files: wire.input_files.into_iter().map(|r| r.uuid).collect(),
            col_steps: wire.col_steps,
        }
    }
}
