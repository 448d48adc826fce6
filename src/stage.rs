//! Load/save orchestration for one pipeline stage.
//!
//! A [`Stage`] owns one working session: the provenance accumulated over its
//! loads, the column documentation built up between load and save, and the
//! default settings every call falls back to. Parameters resolve through
//! three tiers: the explicit call argument wins, then the stage-scoped
//! setting (directional `*_in`/`*_out` first, then the generic one), then
//! the hard-coded default. [`Param::Default`] is the "use next tier"
//! sentinel, distinct from setting a value to `None`.

use crate::error::{DatatrailError, Result, ResultExt as _};
use crate::formats::{DataFormat, FormatRegistry};
use crate::lineage::{self, DocTrail, Documenter, ORIGIN_PREFIX};
use crate::location::{self, FileNameSpec, Location, VersionSpec};
use crate::provenance::{FileRecord, ProvenanceStore, Sidecar, identity_for_path};
use polars::prelude::DataFrame;
use std::fs;
use std::path::PathBuf;

/// Default data root, relative to the working directory.
pub const DEFAULT_ROOT: &str = "./data";

/// Default save version: a strftime pattern formatted at save time.
pub const DEFAULT_VERSION_FORMAT: &str = "%Y%m%d%H%M%S";

/// One tier-aware parameter. [`Param::Default`] defers to the next tier.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Param<T> {
    #[default]
    Default,
    Set(T),
}

impl<T> Param<T> {
    pub fn set(value: T) -> Self {
        Self::Set(value)
    }

    pub fn get(&self) -> Option<&T> {
        match self {
            Self::Default => None,
            Self::Set(value) => Some(value),
        }
    }
}

/// First set value across the tiers, else the hard default.
fn resolve<T: Clone>(tiers: &[&Param<T>], hard_default: T) -> T {
    tiers
        .iter()
        .find_map(|p| p.get())
        .cloned()
        .unwrap_or(hard_default)
}

/// Stage-scoped defaults. Directional fields win over their generic
/// counterpart; [`Param::Default`] everywhere means library defaults.
#[derive(Debug, Clone, Default)]
pub struct StageConfig {
    pub root: Param<PathBuf>,
    pub root_in: Param<PathBuf>,
    pub root_out: Param<PathBuf>,
    pub attrs: Param<Vec<String>>,
    pub attrs_in: Param<Vec<String>>,
    pub attrs_out: Param<Vec<String>>,
    /// `Set(None)` means "no step directory", unlike `Default`.
    pub step_in: Param<Option<String>>,
    pub step_out: Param<Option<String>>,
    pub version_in: Param<VersionSpec>,
    pub version_out: Param<VersionSpec>,
    pub file_name: Param<FileNameSpec>,
    pub file_name_in: Param<FileNameSpec>,
    pub file_name_out: Param<FileNameSpec>,
    /// Format override by registry key; the file extension decides otherwise.
    pub format_in: Param<String>,
    pub format_out: Param<String>,
}

/// Per-call load settings, all optional.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub root: Param<PathBuf>,
    pub attrs: Param<Vec<String>>,
    pub step: Param<Option<String>>,
    pub version: Param<VersionSpec>,
    pub file_name: Param<FileNameSpec>,
    pub format: Param<String>,
    pub alias: Option<String>,
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Param::set(root.into());
        self
    }

    pub fn attrs<I, S>(mut self, attrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attrs = Param::set(attrs.into_iter().map(Into::into).collect());
        self
    }

    pub fn step(mut self, step: impl Into<String>) -> Self {
        self.step = Param::set(Some(step.into()));
        self
    }

    /// Read from the step directory itself, no step segment.
    pub fn no_step(mut self) -> Self {
        self.step = Param::set(None);
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Param::set(VersionSpec::named(version));
        self
    }

    pub fn first_version(mut self) -> Self {
        self.version = Param::set(VersionSpec::First);
        self
    }

    pub fn unversioned(mut self) -> Self {
        self.version = Param::set(VersionSpec::Unversioned);
        self
    }

    pub fn file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Param::set(FileNameSpec::named(name));
        self
    }

    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = Param::set(format.into());
        self
    }

    /// Label scoping the loaded file's column names; defaults to the file's
    /// identity.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }
}

/// Per-call save settings, all optional.
#[derive(Debug, Clone, Default)]
pub struct SaveOptions {
    pub root: Param<PathBuf>,
    pub attrs: Param<Vec<String>>,
    pub step: Param<Option<String>>,
    pub version: Param<VersionSpec>,
    pub file_name: Param<FileNameSpec>,
    pub format: Param<String>,
    pub alias: Option<String>,
}

impl SaveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Param::set(root.into());
        self
    }

    pub fn attrs<I, S>(mut self, attrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attrs = Param::set(attrs.into_iter().map(Into::into).collect());
        self
    }

    pub fn step(mut self, step: impl Into<String>) -> Self {
        self.step = Param::set(Some(step.into()));
        self
    }

    pub fn no_step(mut self) -> Self {
        self.step = Param::set(None);
        self
    }

    /// A version name; `%` patterns are formatted with the current local
    /// time at save.
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Param::set(VersionSpec::named(version));
        self
    }

    pub fn unversioned(mut self) -> Self {
        self.version = Param::set(VersionSpec::Unversioned);
        self
    }

    pub fn file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Param::set(FileNameSpec::named(name));
        self
    }

    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = Param::set(format.into());
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }
}

/// One pipeline stage session.
pub struct Stage {
    config: StageConfig,
    registry: FormatRegistry,
    store: ProvenanceStore,
    docs: Documenter,
}

impl Default for Stage {
    fn default() -> Self {
        Self::new()
    }
}

impl Stage {
    pub fn new() -> Self {
        Self::with_config(StageConfig::default())
    }

    pub fn with_config(config: StageConfig) -> Self {
        Self {
            config,
            registry: FormatRegistry::builtin(),
            store: ProvenanceStore::new(),
            docs: Documenter::new(),
        }
    }

    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut StageConfig {
        &mut self.config
    }

    /// Register a custom serialization strategy for an extension.
    pub fn register_format(&mut self, extension: &str, format: DataFormat) {
        self.registry.register(extension, format);
    }

    pub fn provenance(&self) -> &ProvenanceStore {
        &self.store
    }

    pub fn documentation(&self) -> &Documenter {
        &self.docs
    }

    /// Reinitialize the session: defaults, provenance and documentation all
    /// return to their constructed state.
    pub fn reset(&mut self) {
        self.config = StageConfig::default();
        self.store.reset();
        self.docs.reset();
    }

    /// Load a dataset and fold its recorded lineage into the session.
    ///
    /// The sidecar of the resolved directory is consulted for the file's
    /// provenance record. A file missing from a present sidecar is warned
    /// about and treated as having no ancestry; missing lineage must never
    /// block a load. The returned frame is unmodified in content.
    pub fn load(&mut self, opts: &LoadOptions) -> Result<DataFrame> {
        let cfg = &self.config;
        let root = resolve(
            &[&opts.root, &cfg.root_in, &cfg.root],
            PathBuf::from(DEFAULT_ROOT),
        );
        let attrs = resolve(&[&opts.attrs, &cfg.attrs_in, &cfg.attrs], Vec::new());
        let step = resolve(&[&opts.step, &cfg.step_in], None);
        let version = resolve(&[&opts.version, &cfg.version_in], VersionSpec::Last);
        let file_name = resolve(
            &[&opts.file_name, &cfg.file_name_in, &cfg.file_name],
            FileNameSpec::Auto,
        );

        let resolved = location::resolve(&root, &attrs, step.as_deref(), &version, &file_name)?;
        let path = resolved.full_path();

        let format_key = resolve(
            &[&opts.format, &cfg.format_in],
            resolved.location.extension(),
        );
        let format = *self.registry.get(&format_key)?;

        let frame = (format.load)(&path)?;
        log::info!(
            "loaded {} ({} rows, {} columns)",
            path.display(),
            frame.height(),
            frame.width()
        );

        let sidecar = Sidecar::load(&resolved.dir_path())?;
        let path_from_root = resolved.location.path_from_root();
        let record = match sidecar.find_by_path(&path_from_root) {
            Some(found) => found.clone(),
            None => {
                if !sidecar.files.is_empty() {
                    log::warn!(
                        "{path_from_root} has no record in its sidecar, treating it as a fresh file"
                    );
                }
                FileRecord::new(
                    resolved.location.clone(),
                    &frame,
                    format.name,
                    Vec::new(),
                    Default::default(),
                )
            }
        };

        // Pull every ancestor the sidecar knows about into the session.
        let mut universe = sidecar.files.clone();
        if universe.iter().all(|r| r.uuid != record.uuid) {
            universe.push(record.clone());
        }
        for needed in crate::provenance::files_needed_to_generate(&universe, record.uuid)? {
            if let Some(ancestor) = universe.iter().find(|r| r.uuid == needed) {
                self.store.register(ancestor.clone());
            }
        }

        let alias = opts
            .alias
            .clone()
            .unwrap_or_else(|| record.uuid.to_string());
        let columns: Vec<String> = frame
            .get_column_names_str()
            .into_iter()
            .map(str::to_owned)
            .collect();
        self.docs.seed_import(&alias, &columns, &record.col_steps)?;

        self.store.mark_direct_input(record.uuid);
        self.store.register(record);
        Ok(frame)
    }

    /// Save a dataset, finalize its column documentation and persist the
    /// sidecar of the destination directory.
    ///
    /// Returns the path the file was written to. The destination sidecar
    /// receives the new record plus every ancestor record known to the
    /// session, so downstream directories are lineage self-contained.
    pub fn save(&mut self, frame: &mut DataFrame, opts: &SaveOptions) -> Result<PathBuf> {
        let cfg = &self.config;
        let root = resolve(
            &[&opts.root, &cfg.root_out, &cfg.root],
            PathBuf::from(DEFAULT_ROOT),
        );
        let attrs = resolve(&[&opts.attrs, &cfg.attrs_out, &cfg.attrs], Vec::new());
        let step = resolve(&[&opts.step, &cfg.step_out], None);
        let version_spec = resolve(
            &[&opts.version, &cfg.version_out],
            VersionSpec::named(DEFAULT_VERSION_FORMAT),
        );
        let file_name_spec = resolve(
            &[&opts.file_name, &cfg.file_name_out, &cfg.file_name],
            FileNameSpec::Auto,
        );

        let version = match version_spec {
            VersionSpec::Unversioned => None,
            VersionSpec::Named(name) if name.contains('%') => {
                Some(chrono::Local::now().format(&name).to_string())
            }
            VersionSpec::Named(name) => Some(name),
            VersionSpec::Last | VersionSpec::First => {
                return Err(DatatrailError::InvalidPath(
                    "last/first version selectors only apply to loads; \
                     pass a concrete version to save"
                        .to_string(),
                ));
            }
        };

        let file_name = self.output_file_name(&file_name_spec)?;
        let location = Location {
            attrs,
            step,
            version,
            file_name,
        };

        let dir = root.join(location.dir_from_root());
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
        let path = dir.join(&location.file_name);

        let format_key = resolve(&[&opts.format, &cfg.format_out], location.extension());
        let format = *self.registry.get(&format_key)?;
        (format.save)(frame, &path)?;
        log::info!(
            "saved {} ({} rows, {} columns)",
            path.display(),
            frame.height(),
            frame.width()
        );

        let new_uuid = identity_for_path(&location.path_from_root());
        let alias = match &opts.alias {
            Some(alias) => alias.clone(),
            None => self.infer_save_alias(&location, new_uuid)?,
        };

        let current: Vec<String> = frame
            .get_column_names_str()
            .into_iter()
            .map(str::to_owned)
            .collect();
        self.docs.finalize_on_save(&current, &alias);
        let col_steps = self.docs.trails_for_alias(&alias)?;

        let record = FileRecord::new(
            location,
            frame,
            format.name,
            self.store.direct_inputs().to_vec(),
            col_steps,
        );
        self.store.register(record.clone());

        let mut sidecar = Sidecar::load(&dir)?;
        for ancestor in self.store.ancestors_of(record.uuid)? {
            sidecar.upsert(ancestor);
        }
        sidecar.upsert(record);
        sidecar.persist(&dir)?;
        Ok(path)
    }

    /// Annotate one transformation step on a column.
    ///
    /// References are `alias::column` or bare names. When no alias can be
    /// inferred from the reference or the inputs, the single loaded file's
    /// identity serves as the default.
    pub fn col_step(&mut self, target: &str, text: &str, inputs: &[&str]) -> Result<()> {
        let default_alias = self.default_alias(None).ok();
        self.docs
            .document(target, text, inputs, default_alias.as_deref())
    }

    /// Assert the original source of a column.
    pub fn col_origin(&mut self, column: &str, origin: &str) -> Result<()> {
        self.docs.document_origin(column, origin, None)
    }

    /// Documentation trail of one column; see
    /// [`Documenter::get_documentation`].
    pub fn get_doc(
        &self,
        column: &str,
        alias: Option<&str>,
        include_dropped: bool,
    ) -> Result<DocTrail> {
        self.docs.get_documentation(column, alias, include_dropped)
    }

    /// Origin names asserted anywhere in a column's trail, branches
    /// included, with the `origin: ` prefix stripped.
    pub fn get_origins(&self, column: &str, alias: Option<&str>) -> Result<Vec<String>> {
        let trail = self.docs.get_documentation(column, alias, true)?;
        Ok(lineage::tree::flatten(&trail)
            .into_iter()
            .filter_map(|note| note.strip_prefix(ORIGIN_PREFIX).map(str::to_owned))
            .collect())
    }

    /// Origin assertions with their branch structure intact, so a caller can
    /// tell which merge arm each origin came from.
    pub fn get_origins_raw(&self, column: &str, alias: Option<&str>) -> Result<DocTrail> {
        let trail = self.docs.get_documentation(column, alias, true)?;
        Ok(lineage::tree::filter_by_prefix(&trail, ORIGIN_PREFIX))
    }

    /// Alias inferred from the session: the single direct input's identity,
    /// else (for a save with no loads) the output's own identity.
    fn default_alias(&self, fallback: Option<uuid::Uuid>) -> Result<String> {
        match self.store.direct_inputs() {
            [single] => Ok(single.to_string()),
            [] => fallback.map(|uuid| uuid.to_string()).ok_or_else(|| {
                DatatrailError::AmbiguousFileName(
                    "no file loaded this session; pass an explicit alias".to_string(),
                )
            }),
            many => Err(DatatrailError::AmbiguousFileName(format!(
                "{} files loaded this session; pass an explicit alias",
                many.len()
            ))),
        }
    }

    /// Alias for a save: the single direct input, else (with several inputs)
    /// the one whose attrs and file name match the output, else (with none)
    /// the output's own identity.
    fn infer_save_alias(&self, out: &Location, new_uuid: uuid::Uuid) -> Result<String> {
        let inputs = self.store.direct_inputs();
        if inputs.len() > 1 {
            let matching: Vec<uuid::Uuid> = inputs
                .iter()
                .copied()
                .filter(|uuid| {
                    self.store.get(*uuid).is_some_and(|r| {
                        r.location.file_name == out.file_name && r.location.attrs == out.attrs
                    })
                })
                .collect();
            if let [single] = matching.as_slice() {
                return Ok(single.to_string());
            }
        }
        self.default_alias(Some(new_uuid))
    }

    /// Output file name: explicit, or the single direct input's name.
    fn output_file_name(&self, spec: &FileNameSpec) -> Result<String> {
        match spec {
            FileNameSpec::Named(name) if !name.contains('*') => Ok(name.clone()),
            FileNameSpec::Named(name) => Err(DatatrailError::InvalidPath(format!(
                "wildcards are not allowed in an output file name: {name}"
            ))),
            FileNameSpec::Auto => match self.store.direct_inputs() {
                [single] => {
                    let record = self.store.get(*single).ok_or_else(|| {
                        DatatrailError::AmbiguousFileName(
                            "direct input has no provenance record".to_string(),
                        )
                    })?;
                    Ok(record.location.file_name.clone())
                }
                others => Err(DatatrailError::AmbiguousFileName(format!(
                    "cannot infer an output file name from {} loaded files; \
                     pass an explicit file name",
                    others.len()
                ))),
            },
        }
    }
}

/// Expose the path a load would resolve to, without reading data. Useful
/// for wiring external tools around the directory layout.
pub fn resolve_load_path(stage: &Stage, opts: &LoadOptions) -> Result<PathBuf> {
    let cfg = stage.config();
    let root = resolve(
        &[&opts.root, &cfg.root_in, &cfg.root],
        PathBuf::from(DEFAULT_ROOT),
    );
    let attrs = resolve(&[&opts.attrs, &cfg.attrs_in, &cfg.attrs], Vec::new());
    let step = resolve(&[&opts.step, &cfg.step_in], None);
    let version = resolve(&[&opts.version, &cfg.version_in], VersionSpec::Last);
    let file_name = resolve(
        &[&opts.file_name, &cfg.file_name_in, &cfg.file_name],
        FileNameSpec::Auto,
    );
    Ok(location::resolve(&root, &attrs, step.as_deref(), &version, &file_name)?.full_path())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_tiers() {
        let call = Param::<i32>::Default;
        let scoped = Param::set(2);
        let generic = Param::set(3);
        assert_eq!(resolve(&[&call, &scoped, &generic], 9), 2);
        assert_eq!(resolve(&[&Param::set(1), &scoped, &generic], 9), 1);
        assert_eq!(
            resolve(&[&Param::<i32>::Default, &Param::Default, &Param::Default], 9),
            9
        );
    }

    #[test]
    fn test_set_none_step_overrides_default() {
        // Set(None) means "no step directory", not "use next tier".
        let call = Param::set(None::<String>);
        let scoped = Param::set(Some("raw".to_owned()));
        assert_eq!(resolve(&[&call, &scoped], Some("x".to_owned())), None);
    }

    #[test]
    fn test_save_rejects_version_selectors() {
        // The version is checked before any directory is touched.
        let mut stage = Stage::new();
        let mut frame = polars::df!("A" => [1i64]).unwrap();
        let mut opts = SaveOptions::new().file_name("out.csv");
        opts.version = Param::set(VersionSpec::Last);
        let err = stage.save(&mut frame, &opts).unwrap_err();
        assert!(matches!(err, DatatrailError::InvalidPath(_)));
    }

    #[test]
    fn test_auto_output_name_requires_single_input() {
        let stage = Stage::new();
        let err = stage.output_file_name(&FileNameSpec::Auto).unwrap_err();
        assert!(matches!(err, DatatrailError::AmbiguousFileName(_)));
    }
}
