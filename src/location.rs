//! Dataset addressing and path resolution.
//!
//! A dataset artifact lives at `root/attr1/.../step_<step>/<version>/file.ext`.
//! The step segment is omitted when no step is set; the version segment is
//! omitted for unversioned saves. [`Location`] is the root-relative, fully
//! resolved address (the part that is exported into sidecar metadata and
//! hashed into a file identity); [`ResolvedLocation`] pairs it with the root
//! for actual I/O.
//!
//! Resolution is pure path computation: directories are created by the save
//! path in [`Stage`](crate::stage::Stage), never here.

use crate::error::{DatatrailError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Directory-name prefix for step segments, e.g. step "raw" → `step_raw`.
pub const STEP_DIR_PREFIX: &str = "step_";

/// Version selector used when resolving an input location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSpec {
    /// Lexicographically greatest version subdirectory.
    Last,
    /// Lexicographically smallest version subdirectory.
    First,
    /// No version subdirectory; files live in the step directory itself.
    Unversioned,
    /// A concrete version name. On save, a name containing `%` is treated
    /// as a strftime pattern and formatted with the current local time.
    Named(String),
}

impl VersionSpec {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }
}

/// File-name selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileNameSpec {
    /// Infer the file name by scanning the resolved directory; exactly one
    /// candidate must exist. On save, reuse the single direct input's name.
    Auto,
    /// A concrete file name, optionally containing a single `*` wildcard
    /// (inputs only).
    Named(String),
}

impl FileNameSpec {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }
}

/// Root-relative resolved address of one dataset artifact.
///
/// This is the identity-bearing part of a path: two artifacts with the same
/// `Location` are the same logical file regardless of where the data root
/// lives on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub attrs: Vec<String>,
    pub step: Option<String>,
    pub version: Option<String>,
    pub file_name: String,
}

impl Location {
    /// Directory path relative to the root.
    pub fn dir_from_root(&self) -> PathBuf {
        let mut dir = PathBuf::new();
        for attr in &self.attrs {
            dir.push(attr);
        }
        if let Some(step) = &self.step {
            dir.push(format!("{STEP_DIR_PREFIX}{step}"));
        }
        if let Some(version) = &self.version {
            dir.push(version);
        }
        dir
    }

    /// Full file path relative to the root, as a `/`-joined string.
    ///
    /// This string is the input to identity derivation, so its form must be
    /// stable across platforms.
    pub fn path_from_root(&self) -> String {
        let mut parts: Vec<&str> = self.attrs.iter().map(String::as_str).collect();
        let step_segment = self
            .step
            .as_ref()
            .map(|s| format!("{STEP_DIR_PREFIX}{s}"));
        if let Some(seg) = &step_segment {
            parts.push(seg);
        }
        if let Some(version) = &self.version {
            parts.push(version);
        }
        parts.push(&self.file_name);
        parts.join("/")
    }

    /// File name without its extension.
    pub fn file_stem(&self) -> &str {
        self.file_name
            .rsplit_once('.')
            .map_or(self.file_name.as_str(), |(stem, _)| stem)
    }

    /// Lowercase file extension, empty if none.
    pub fn extension(&self) -> String {
        self.file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_lowercase())
            .unwrap_or_default()
    }
}

/// A [`Location`] anchored at a concrete data root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLocation {
    pub root: PathBuf,
    pub location: Location,
}

impl ResolvedLocation {
    pub fn dir_path(&self) -> PathBuf {
        self.root.join(self.location.dir_from_root())
    }

    pub fn full_path(&self) -> PathBuf {
        self.dir_path().join(&self.location.file_name)
    }

    /// Path of the sidecar metadata file co-located with this artifact.
    pub fn sidecar_path(&self) -> PathBuf {
        self.dir_path().join(crate::provenance::SIDECAR_FILE_NAME)
    }
}

/// Resolve a structured descriptor into a concrete directory + file path.
///
/// Version sentinels [`VersionSpec::Last`]/[`VersionSpec::First`] scan the
/// existing version subdirectories of the step directory and pick the
/// lexicographic max/min (version names are expected to sort consistently
/// with chronological order, e.g. timestamp-formatted). When no version
/// subdirectory exists the step directory itself is used, so unversioned
/// stages stay readable with default settings.
///
/// # Errors
///
/// Returns [`DatatrailError::InvalidPath`] when no candidate file exists for
/// an `Auto`/wildcard name, and [`DatatrailError::AmbiguousFile`] when more
/// than one does.
pub fn resolve(
    root: &Path,
    attrs: &[String],
    step: Option<&str>,
    version: &VersionSpec,
    file_name: &FileNameSpec,
) -> Result<ResolvedLocation> {
    let mut step_dir = root.to_path_buf();
    for attr in attrs {
        step_dir.push(attr);
    }
    if let Some(step) = step {
        step_dir.push(format!("{STEP_DIR_PREFIX}{step}"));
    }

    let version = match version {
        VersionSpec::Unversioned => None,
        VersionSpec::Named(name) => Some(name.clone()),
        VersionSpec::Last => pick_version(&step_dir, true)?,
        VersionSpec::First => pick_version(&step_dir, false)?,
    };

    let dir = match &version {
        Some(v) => step_dir.join(v),
        None => step_dir.clone(),
    };

    let file_name = match file_name {
        FileNameSpec::Named(name) if !name.contains('*') => name.clone(),
        FileNameSpec::Named(pattern) => discover_file(&dir, Some(pattern))?,
        FileNameSpec::Auto => discover_file(&dir, None)?,
    };

    Ok(ResolvedLocation {
        root: root.to_path_buf(),
        location: Location {
            attrs: attrs.to_vec(),
            step: step.map(str::to_owned),
            version,
            file_name,
        },
    })
}

/// Pick the lexicographic max (`last`) or min version subdirectory, or fall
/// back to the unversioned layout when there is none.
fn pick_version(step_dir: &Path, last: bool) -> Result<Option<String>> {
    if !step_dir.is_dir() {
        return Err(DatatrailError::InvalidPath(format!(
            "directory does not exist: {}",
            step_dir.display()
        )));
    }

    let mut versions: Vec<String> = fs::read_dir(step_dir)?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_dir())
        .filter_map(|e| e.file_name().to_str().map(str::to_owned))
        .collect();
    versions.sort();

    let picked = if last {
        versions.pop()
    } else {
        versions.into_iter().next()
    };
    if picked.is_none() {
        log::debug!(
            "no version subdirectories in {}, using the step directory",
            step_dir.display()
        );
    }
    Ok(picked)
}

/// Scan `dir` for exactly one candidate data file, optionally constrained by
/// a single-`*` wildcard pattern. The sidecar metadata file and
/// subdirectories never count as candidates.
fn discover_file(dir: &Path, pattern: Option<&str>) -> Result<String> {
    if let Some(p) = pattern
        && p.matches('*').count() > 1
    {
        return Err(DatatrailError::InvalidPath(format!(
            "only one '*' wildcard is allowed in a file name: {p}"
        )));
    }

    if !dir.is_dir() {
        return Err(DatatrailError::InvalidPath(format!(
            "directory does not exist: {}",
            dir.display()
        )));
    }

    let mut candidates: Vec<String> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .filter_map(|e| e.file_name().to_str().map(str::to_owned))
        .filter(|name| name != crate::provenance::SIDECAR_FILE_NAME)
        .filter(|name| pattern.is_none_or(|p| wildcard_match(p, name)))
        .collect();
    candidates.sort();

    match candidates.len() {
        1 => Ok(candidates.remove(0)),
        0 => Err(DatatrailError::InvalidPath(format!(
            "no candidate file in {}",
            dir.display()
        ))),
        n => Err(DatatrailError::AmbiguousFile(format!(
            "{n} candidate files in {}: {}; pass an explicit file name",
            dir.display(),
            candidates.join(", ")
        ))),
    }
}

/// Match a name against a pattern containing at most one `*`.
fn wildcard_match(pattern: &str, name: &str) -> bool {
    match pattern.split_once('*') {
        None => pattern == name,
        Some((prefix, suffix)) => {
            name.len() >= prefix.len() + suffix.len()
                && name.starts_with(prefix)
                && name.ends_with(suffix)
        }
    }
}
