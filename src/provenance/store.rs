//! Sidecar persistence and the session working set of provenance records.

use super::record::FileRecord;
use crate::error::{DatatrailError, Result, ResultExt};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use uuid::Uuid;

/// Name of the sidecar metadata file written next to each exported file.
pub const SIDECAR_FILE_NAME: &str = "metadata.json";

/// On-disk sidecar content: every record known to one directory.
#[derive(Debug, Default, Clone, serde::Serialize, serde::Deserialize)]
pub struct Sidecar {
    pub files: Vec<FileRecord>,
}

impl Sidecar {
    /// Read the sidecar of `dir`. A missing sidecar is an empty one; a
    /// present but unparseable sidecar is corruption and fails loudly.
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(SIDECAR_FILE_NAME);
        if !path.exists() {
            log::debug!("no sidecar at {}", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read sidecar {}", path.display()))?;
        serde_json::from_str(&content).map_err(|e| {
            DatatrailError::ProvenanceCorrupt(format!(
                "sidecar {} is not valid provenance metadata: {e}",
                path.display()
            ))
        })
    }

    /// Write the sidecar into `dir`, creating the directory if needed.
    /// Last write wins; concurrent writers are not coordinated.
    pub fn persist(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
        let path = dir.join(SIDECAR_FILE_NAME);
        let json = serde_json::to_string_pretty(self)
            .with_context(|| "Failed to serialize sidecar metadata".to_string())?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write sidecar {}", path.display()))?;
        log::info!("wrote sidecar {} ({} records)", path.display(), self.files.len());
        Ok(())
    }

    pub fn find_by_path(&self, path_from_root: &str) -> Option<&FileRecord> {
        self.files
            .iter()
            .find(|r| r.location.path_from_root() == path_from_root)
    }

    pub fn find_by_uuid(&self, uuid: Uuid) -> Option<&FileRecord> {
        self.files.iter().find(|r| r.uuid == uuid)
    }

    /// Insert or replace a record, keyed by identity. An entry for the same
    /// root-relative path under a different identity is evicted, so stale
    /// records from an older identity scheme do not survive a rewrite.
    pub fn upsert(&mut self, record: FileRecord) {
        if let Some(existing) = self.files.iter_mut().find(|r| r.uuid == record.uuid) {
            *existing = record;
            return;
        }
        let path = record.location.path_from_root();
        if let Some(existing) = self
            .files
            .iter_mut()
            .find(|r| r.location.path_from_root() == path)
        {
            log::warn!(
                "sidecar record for {path} changed identity ({} -> {}), replacing",
                existing.uuid,
                record.uuid
            );
            *existing = record;
            return;
        }
        self.files.push(record);
    }
}

/// Identities of every ancestor needed to regenerate `target`, in dependency
/// order (deepest first), excluding `target` itself.
///
/// Input identities with no record among `records` are skipped with a log
/// line: upstream sidecars may legitimately predate this tool.
///
/// # Errors
///
/// [`DatatrailError::CyclicLineage`] when the input graph contains a cycle
/// reachable from `target`.
pub fn files_needed_to_generate(records: &[FileRecord], target: Uuid) -> Result<Vec<Uuid>> {
    let index: HashMap<Uuid, &FileRecord> = records.iter().map(|r| (r.uuid, r)).collect();
    let mut needed = Vec::new();
    let mut visited = HashSet::new();
    let mut active = HashSet::new();
    visit(&index, target, &mut visited, &mut active, &mut needed)?;
    needed.retain(|uuid| *uuid != target);
    Ok(needed)
}

fn visit(
    index: &HashMap<Uuid, &FileRecord>,
    uuid: Uuid,
    visited: &mut HashSet<Uuid>,
    active: &mut HashSet<Uuid>,
    needed: &mut Vec<Uuid>,
) -> Result<()> {
    if active.contains(&uuid) {
        return Err(DatatrailError::CyclicLineage(format!(
            "file {uuid} is part of a lineage cycle"
        )));
    }
    if !visited.insert(uuid) {
        return Ok(());
    }
    let Some(record) = index.get(&uuid) else {
        log::debug!("no provenance record for input {uuid}, skipping");
        return Ok(());
    };

    active.insert(uuid);
    for input in &record.input_files {
        visit(index, *input, visited, active, needed)?;
    }
    active.remove(&uuid);
    needed.push(uuid);
    Ok(())
}

/// In-memory provenance accumulated over one working session.
///
/// Each load absorbs the loaded file's record and its ancestors; each save
/// consults the accumulated records to stamp inputs onto the new record and
/// to copy ancestor records into the destination sidecar.
#[derive(Debug, Default)]
pub struct ProvenanceStore {
    records: Vec<FileRecord>,
    direct_inputs: Vec<Uuid>,
}

impl ProvenanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[FileRecord] {
        &self.records
    }

    pub fn get(&self, uuid: Uuid) -> Option<&FileRecord> {
        self.records.iter().find(|r| r.uuid == uuid)
    }

    /// Identities of the files loaded so far this session.
    pub fn direct_inputs(&self) -> &[Uuid] {
        &self.direct_inputs
    }

    /// Record that `uuid` was loaded as a direct input. Reloading the same
    /// file does not duplicate the edge.
    pub fn mark_direct_input(&mut self, uuid: Uuid) {
        if !self.direct_inputs.contains(&uuid) {
            self.direct_inputs.push(uuid);
        }
    }

    /// Absorb one record into the working set.
    ///
    /// A record whose root-relative path matches an existing one under a
    /// different identity replaces it with a warning: the sidecar was
    /// written by a tool using a different identity scheme.
    pub fn register(&mut self, record: FileRecord) {
        if let Some(existing) = self.records.iter_mut().find(|r| r.uuid == record.uuid) {
            *existing = record;
            return;
        }
        let path = record.location.path_from_root();
        if let Some(existing) = self
            .records
            .iter_mut()
            .find(|r| r.location.path_from_root() == path)
        {
            log::warn!(
                "record for {path} changed identity ({} -> {}), replacing",
                existing.uuid,
                record.uuid
            );
            *existing = record;
            return;
        }
        self.records.push(record);
    }

    /// Cloned records of every ancestor of `uuid` known to the session.
    pub fn ancestors_of(&self, uuid: Uuid) -> Result<Vec<FileRecord>> {
        let needed = files_needed_to_generate(&self.records, uuid)?;
        Ok(needed
            .into_iter()
            .filter_map(|id| self.get(id).cloned())
            .collect())
    }

    pub fn reset(&mut self) {
        self.records.clear();
        self.direct_inputs.clear();
    }
}
