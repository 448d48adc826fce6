//! Serializer registry: file extension → load/save functions.
//!
//! The registry is resolved once at stage construction; an unknown extension
//! is a checked [`UnsupportedFormat`](crate::error::DatatrailError::UnsupportedFormat)
//! error listing the known set, never a runtime lookup failure. Custom
//! formats can be registered on top of the built-ins.

use crate::error::{DatatrailError, Result, ResultExt as _};
use polars::prelude::*;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

type LoadFn = fn(&Path) -> Result<DataFrame>;
type SaveFn = fn(&mut DataFrame, &Path) -> Result<()>;

/// One registered serialization strategy.
#[derive(Debug, Clone, Copy)]
pub struct DataFormat {
    /// Tag recorded in provenance metadata as `export_method_used`.
    pub name: &'static str,
    pub load: LoadFn,
    pub save: SaveFn,
}

/// Extension-keyed registry of [`DataFormat`]s.
pub struct FormatRegistry {
    formats: HashMap<String, DataFormat>,
}

impl FormatRegistry {
    /// Registry with the built-in polars-backed formats:
    /// csv, parquet, json, ndjson, ipc and feather.
    pub fn builtin() -> Self {
        let mut registry = Self {
            formats: HashMap::new(),
        };
        registry.register("csv", CSV);
        registry.register("parquet", PARQUET);
        registry.register("json", JSON);
        registry.register("ndjson", NDJSON);
        registry.register("jsonl", NDJSON);
        registry.register("ipc", IPC);
        registry.register("feather", IPC);
        registry
    }

    /// Register (or override) the strategy for an extension.
    pub fn register(&mut self, extension: &str, format: DataFormat) {
        self.formats.insert(extension.to_lowercase(), format);
    }

    /// Look up the strategy for a lowercase extension.
    ///
    /// # Errors
    ///
    /// [`DatatrailError::UnsupportedFormat`] naming the known extensions.
    pub fn get(&self, extension: &str) -> Result<&DataFormat> {
        self.formats
            .get(&extension.to_lowercase())
            .ok_or_else(|| {
                DatatrailError::UnsupportedFormat(format!(
                    "no serializer for extension '{extension}' (known: {})",
                    self.known().join(", ")
                ))
            })
    }

    /// Sorted list of known extensions.
    pub fn known(&self) -> Vec<String> {
        let mut known: Vec<String> = self.formats.keys().cloned().collect();
        known.sort();
        known
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

const CSV: DataFormat = DataFormat {
    name: "csv",
    load: load_csv,
    save: save_csv,
};

const PARQUET: DataFormat = DataFormat {
    name: "parquet",
    load: load_parquet,
    save: save_parquet,
};

const JSON: DataFormat = DataFormat {
    name: "json",
    load: load_json,
    save: save_json,
};

const NDJSON: DataFormat = DataFormat {
    name: "ndjson",
    load: load_ndjson,
    save: save_ndjson,
};

const IPC: DataFormat = DataFormat {
    name: "ipc",
    load: load_ipc,
    save: save_ipc,
};

fn load_csv(path: &Path) -> Result<DataFrame> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(10_000))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()
        .with_context(|| format!("Failed to read CSV: {}", path.display()))?;
    Ok(df)
}

fn save_csv(df: &mut DataFrame, path: &Path) -> Result<()> {
    let mut file = File::create(path)
        .with_context(|| format!("Failed to create file: {}", path.display()))?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(df)
        .with_context(|| format!("Failed to write CSV: {}", path.display()))?;
    Ok(())
}

fn load_parquet(path: &Path) -> Result<DataFrame> {
    let file =
        File::open(path).with_context(|| format!("Failed to open file: {}", path.display()))?;
    let df = ParquetReader::new(file)
        .finish()
        .with_context(|| format!("Failed to read Parquet: {}", path.display()))?;
    Ok(df)
}

fn save_parquet(df: &mut DataFrame, path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create file: {}", path.display()))?;
    ParquetWriter::new(file)
        .finish(df)
        .with_context(|| format!("Failed to write Parquet: {}", path.display()))?;
    Ok(())
}

fn load_json(path: &Path) -> Result<DataFrame> {
    let file =
        File::open(path).with_context(|| format!("Failed to open file: {}", path.display()))?;
    let df = JsonReader::new(file)
        .finish()
        .with_context(|| format!("Failed to read JSON: {}", path.display()))?;
    Ok(df)
}

fn save_json(df: &mut DataFrame, path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create file: {}", path.display()))?;
    JsonWriter::new(file)
        .with_json_format(JsonFormat::Json)
        .finish(df)
        .with_context(|| format!("Failed to write JSON: {}", path.display()))?;
    Ok(())
}

fn load_ndjson(path: &Path) -> Result<DataFrame> {
    let file =
        File::open(path).with_context(|| format!("Failed to open file: {}", path.display()))?;
    let df = JsonLineReader::new(file)
        .finish()
        .with_context(|| format!("Failed to read NDJSON: {}", path.display()))?;
    Ok(df)
}

fn save_ndjson(df: &mut DataFrame, path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create file: {}", path.display()))?;
    JsonWriter::new(file)
        .with_json_format(JsonFormat::JsonLines)
        .finish(df)
        .with_context(|| format!("Failed to write NDJSON: {}", path.display()))?;
    Ok(())
}

fn load_ipc(path: &Path) -> Result<DataFrame> {
    let file =
        File::open(path).with_context(|| format!("Failed to open file: {}", path.display()))?;
    let df = IpcReader::new(file)
        .finish()
        .with_context(|| format!("Failed to read IPC: {}", path.display()))?;
    Ok(df)
}

fn save_ipc(df: &mut DataFrame, path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("Failed to create file: {}", path.display()))?;
    IpcWriter::new(file)
        .finish(df)
        .with_context(|| format!("Failed to write IPC: {}", path.display()))?;
    Ok(())
}
