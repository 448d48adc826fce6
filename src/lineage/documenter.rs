//! Per-column documentation bookkeeping for one working session.
//!
//! The [`Documenter`] owns an ordered list of documentation nodes, one per
//! (alias, column) pair. An alias is a caller-chosen label scoping a set of
//! column names to one originating dataset; it defaults to the identity of
//! the loaded file record when omitted.
//!
//! Nodes are created implicitly on first reference, mutated by
//! [`document`](Documenter::document) calls, and destroyed only by
//! [`reset`](Documenter::reset). Two nodes may share the same (alias, column)
//! key: that happens when a step writes a column name whose node already
//! exists without citing it as an input (a rename collision), and it makes
//! every later lookup of that key fail with `AmbiguousLineage` instead of
//! guessing which origin is meant.

use super::tree::{CREATED, DROPPED, DocEntry, DocTrail, IMPORTED, ORIGIN_PREFIX};
use crate::error::{DatatrailError, Result};
use std::collections::BTreeMap;

/// Separator between alias and column in a qualified reference.
const ALIAS_SEP: &str = "::";

/// One documented (alias, column) pair.
#[derive(Debug, Clone, PartialEq, Eq)]
struct DocNode {
    alias: String,
    column: String,
    entries: DocTrail,
}

/// Session-scoped column documentation store.
#[derive(Debug, Default)]
pub struct Documenter {
    nodes: Vec<DocNode>,
}

impl Documenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all documentation state.
    pub fn reset(&mut self) {
        self.nodes.clear();
    }

    /// Seed documentation for a freshly loaded dataset.
    ///
    /// Each column gets its carried trail from the ancestor record's saved
    /// documentation when one exists, else a single `"Imported"` entry.
    /// Carried trails for columns absent from the file (dropped upstream)
    /// are seeded too, so their chains stay queryable. Seeding the exact
    /// same (alias, column, trail) again is a no-op.
    ///
    /// # Errors
    ///
    /// [`DatatrailError::AmbiguousLineage`] when (alias, column) is already
    /// documented with a different trail — two lineages for one name cannot
    /// be told apart afterwards.
    pub fn seed_import(
        &mut self,
        alias: &str,
        columns: &[String],
        carried: &BTreeMap<String, DocTrail>,
    ) -> Result<()> {
        let mut seeded: Vec<&str> = columns.iter().map(String::as_str).collect();
        seeded.extend(
            carried
                .keys()
                .filter(|name| !columns.contains(name))
                .map(String::as_str),
        );

        for column in seeded {
            let desired = match carried.get(column) {
                Some(trail) if !trail.is_empty() => trail.clone(),
                _ => vec![DocEntry::note(IMPORTED)],
            };

            let matches = self.find(Some(alias), column);
            match matches.as_slice() {
                [] => self.nodes.push(DocNode {
                    alias: alias.to_owned(),
                    column: column.to_owned(),
                    entries: desired,
                }),
                [idx] if self.nodes[*idx].entries == desired => {}
                _ => {
                    return Err(DatatrailError::AmbiguousLineage(format!(
                        "column '{column}' is already documented under alias '{alias}' \
                         with a different lineage"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Record one transformation step on `target`.
    ///
    /// References are `alias::column` or bare column names; bare names must
    /// be unambiguous across the session's aliases. With no inputs the
    /// annotation is appended to the target's trail. With one distinct input
    /// the target's trail becomes the input's trail plus the annotation
    /// (a single-parent step is linear, not branched). With several distinct
    /// inputs each input's trail is frozen as a branch, in first-seen order,
    /// followed by the annotation.
    ///
    /// A target that already has a node but is not cited among the inputs
    /// gets a second node under the same key; see the module docs.
    pub fn document(
        &mut self,
        target: &str,
        text: &str,
        inputs: &[&str],
        default_alias: Option<&str>,
    ) -> Result<()> {
        let mut input_idxs: Vec<usize> = Vec::new();
        for reference in inputs {
            let idx = self.resolve(reference)?;
            if !input_idxs.contains(&idx) {
                input_idxs.push(idx);
            }
        }

        let new_entries = match input_idxs.as_slice() {
            [] => None,
            [idx] => {
                let mut entries = self.nodes[*idx].entries.clone();
                entries.push(DocEntry::note(text));
                Some(entries)
            }
            many => {
                let mut entries: DocTrail = many
                    .iter()
                    .map(|idx| DocEntry::Merge(self.nodes[*idx].entries.clone()))
                    .collect();
                entries.push(DocEntry::note(text));
                Some(entries)
            }
        };

        let (target_alias, target_column) = split_reference(target);
        let existing = self.find(target_alias, target_column);

        if target_alias.is_none() && alias_count(&self.nodes, &existing) > 1 {
            return Err(DatatrailError::AmbiguousColumn(format!(
                "column '{target_column}' is documented under several aliases; \
                 qualify it as alias{ALIAS_SEP}column"
            )));
        }

        match new_entries {
            // Append-only annotation.
            None => match existing.as_slice() {
                [] => {
                    let alias = self.pick_alias(target_alias, default_alias, &[], target)?;
                    self.nodes.push(DocNode {
                        alias,
                        column: target_column.to_owned(),
                        entries: vec![DocEntry::note(text)],
                    });
                }
                [idx] => self.nodes[*idx].entries.push(DocEntry::note(text)),
                _ => {
                    return Err(DatatrailError::AmbiguousLineage(format!(
                        "column '{target_column}' carries more than one lineage"
                    )));
                }
            },
            Some(entries) => {
                let cited: Vec<usize> = existing
                    .iter()
                    .copied()
                    .filter(|idx| input_idxs.contains(idx))
                    .collect();
                match cited.as_slice() {
                    [idx] => self.nodes[*idx].entries = entries,
                    [] => {
                        let alias =
                            self.pick_alias(target_alias, default_alias, &input_idxs, target)?;
                        self.nodes.push(DocNode {
                            alias,
                            column: target_column.to_owned(),
                            entries,
                        });
                    }
                    _ => {
                        return Err(DatatrailError::AmbiguousLineage(format!(
                            "column '{target_column}' carries more than one lineage"
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Assert the original source of a column with the reserved
    /// `origin: <name>` literal.
    ///
    /// # Errors
    ///
    /// [`DatatrailError::UnknownColumn`] when the column has no history yet:
    /// an origin cannot be asserted on a column that was never imported or
    /// created in this session.
    pub fn document_origin(
        &mut self,
        column: &str,
        origin: &str,
        inputs: Option<&[&str]>,
    ) -> Result<()> {
        self.resolve(column)?;
        let default_inputs = [column];
        self.document(
            column,
            &format!("{ORIGIN_PREFIX}{origin}"),
            inputs.unwrap_or(&default_inputs),
            None,
        )
    }

    /// Close out documentation before a save.
    ///
    /// Documented columns under `alias` that are absent from
    /// `current_columns` get a trailing `"Dropped"` marker (idempotent).
    /// Columns with no documentation node at all get a fresh `["Created"]`
    /// node under `alias` — the seed a downstream load will chain onto.
    pub fn finalize_on_save(&mut self, current_columns: &[String], alias: &str) {
        for node in &mut self.nodes {
            if node.alias == alias
                && !current_columns.contains(&node.column)
                && node.entries.last().is_none_or(|e| !e.is_note(DROPPED))
            {
                node.entries.push(DocEntry::note(DROPPED));
            }
        }

        for column in current_columns {
            if !self.nodes.iter().any(|n| &n.column == column) {
                self.nodes.push(DocNode {
                    alias: alias.to_owned(),
                    column: column.clone(),
                    entries: vec![DocEntry::note(CREATED)],
                });
            }
        }
    }

    /// The documentation trail of one column.
    ///
    /// A trailing `"Dropped"` marker is suppressed unless `include_dropped`
    /// is set: most consumers want current, not historical, documentation.
    /// An undocumented column under a known alias yields an empty trail.
    pub fn get_documentation(
        &self,
        column: &str,
        alias: Option<&str>,
        include_dropped: bool,
    ) -> Result<DocTrail> {
        let matches = self.find(alias, column);

        if alias.is_none() && alias_count(&self.nodes, &matches) > 1 {
            return Err(DatatrailError::AmbiguousColumn(format!(
                "column '{column}' is documented under several aliases; \
                 qualify it with an alias"
            )));
        }

        let mut trail = match matches.as_slice() {
            [idx] => self.nodes[*idx].entries.clone(),
            [] if alias.is_some() => Vec::new(),
            [] => {
                return Err(DatatrailError::UnknownColumn(format!(
                    "column '{column}' is not documented in this session"
                )));
            }
            _ => {
                return Err(DatatrailError::AmbiguousLineage(format!(
                    "column '{column}' carries more than one lineage"
                )));
            }
        };

        if !include_dropped && trail.last().is_some_and(|e| e.is_note(DROPPED)) {
            trail.pop();
        }
        Ok(trail)
    }

    /// All trails under one alias, keyed by column name, including trails
    /// whose column has been dropped. This is what gets persisted onto a
    /// saved file record.
    ///
    /// # Errors
    ///
    /// [`DatatrailError::AmbiguousLineage`] when any column under the alias
    /// carries more than one lineage — persisting a guess would corrupt the
    /// audit trail.
    pub fn trails_for_alias(&self, alias: &str) -> Result<BTreeMap<String, DocTrail>> {
        let mut trails = BTreeMap::new();
        for node in self.nodes.iter().filter(|n| n.alias == alias) {
            if trails
                .insert(node.column.clone(), node.entries.clone())
                .is_some()
            {
                return Err(DatatrailError::AmbiguousLineage(format!(
                    "column '{}' carries more than one lineage under alias '{alias}'",
                    node.column
                )));
            }
        }
        Ok(trails)
    }

    /// Whether any column is documented under `alias`.
    pub fn has_alias(&self, alias: &str) -> bool {
        self.nodes.iter().any(|n| n.alias == alias)
    }

    // === Private === //

    /// Node indices matching a key; `alias = None` matches across aliases.
    fn find(&self, alias: Option<&str>, column: &str) -> Vec<usize> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.column == column && alias.is_none_or(|a| n.alias == a))
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Resolve a reference to exactly one node index.
    fn resolve(&self, reference: &str) -> Result<usize> {
        let (alias, column) = split_reference(reference);
        let matches = self.find(alias, column);

        if alias.is_none() && alias_count(&self.nodes, &matches) > 1 {
            return Err(DatatrailError::AmbiguousColumn(format!(
                "column '{column}' is documented under several aliases; \
                 qualify it as alias{ALIAS_SEP}column"
            )));
        }
        match matches.as_slice() {
            [idx] => Ok(*idx),
            [] => Err(DatatrailError::UnknownColumn(format!(
                "no documentation for '{reference}'"
            ))),
            _ => Err(DatatrailError::AmbiguousLineage(format!(
                "column '{column}' carries more than one lineage"
            ))),
        }
    }

    /// Alias for a node being created: explicit qualifier, else the session
    /// default, else the single alias shared by all cited inputs.
    fn pick_alias(
        &self,
        qualifier: Option<&str>,
        default_alias: Option<&str>,
        input_idxs: &[usize],
        reference: &str,
    ) -> Result<String> {
        if let Some(alias) = qualifier.or(default_alias) {
            return Ok(alias.to_owned());
        }
        let mut aliases: Vec<&str> = input_idxs
            .iter()
            .map(|idx| self.nodes[*idx].alias.as_str())
            .collect();
        aliases.sort_unstable();
        aliases.dedup();
        match aliases.as_slice() {
            [alias] => Ok((*alias).to_owned()),
            _ => Err(DatatrailError::AmbiguousColumn(format!(
                "cannot infer an alias for new column '{reference}'; \
                 qualify it as alias{ALIAS_SEP}column"
            ))),
        }
    }
}

fn split_reference(reference: &str) -> (Option<&str>, &str) {
    match reference.split_once(ALIAS_SEP) {
        Some((alias, column)) => (Some(alias), column),
        None => (None, reference),
    }
}

/// Number of distinct aliases among the given node indices.
fn alias_count(nodes: &[DocNode], idxs: &[usize]) -> usize {
    let mut aliases: Vec<&str> = idxs.iter().map(|idx| nodes[*idx].alias.as_str()).collect();
    aliases.sort_unstable();
    aliases.dedup();
    aliases.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn imported() -> DocTrail {
        vec![DocEntry::note(IMPORTED)]
    }

    fn seed(doc: &mut Documenter, alias: &str, columns: &[&str]) {
        let columns: Vec<String> = columns.iter().map(|c| (*c).to_owned()).collect();
        doc.seed_import(alias, &columns, &BTreeMap::new()).unwrap();
    }

    #[test]
    fn test_linear_annotation() {
        let mut doc = Documenter::new();
        seed(&mut doc, "basic_data", &["A", "B"]);
        doc.document(
            "basic_data::A",
            "Loaded from raw data.",
            &["basic_data::A"],
            None,
        )
        .unwrap();

        assert_eq!(
            doc.get_documentation("A", Some("basic_data"), false).unwrap(),
            vec![DocEntry::note(IMPORTED), DocEntry::note("Loaded from raw data.")]
        );
        assert_eq!(
            doc.get_documentation("B", Some("basic_data"), false).unwrap(),
            imported()
        );
    }

    #[test]
    fn test_merge_creates_branch_frame() {
        let mut doc = Documenter::new();
        seed(&mut doc, "data", &["A", "B"]);
        doc.document(
            "data::A+B",
            "Column A plus B.",
            &["data::A", "data::B"],
            None,
        )
        .unwrap();

        assert_eq!(
            doc.get_documentation("A+B", Some("data"), false).unwrap(),
            vec![
                DocEntry::merge(imported()),
                DocEntry::merge(imported()),
                DocEntry::note("Column A plus B."),
            ]
        );
        // Inputs untouched.
        assert_eq!(
            doc.get_documentation("A", Some("data"), false).unwrap(),
            imported()
        );
    }

    #[test]
    fn test_self_merge_replaces_target() {
        // D with inputs [D, A] is a branch step even though D is the target.
        let mut doc = Documenter::new();
        seed(&mut doc, "data", &["A", "D"]);
        doc.document("data::D", "Added column A", &["data::D", "data::A"], None)
            .unwrap();
        doc.document("data::D", "Merged", &["data::D"], None).unwrap();

        assert_eq!(
            doc.get_documentation("D", Some("data"), false).unwrap(),
            vec![
                DocEntry::merge(imported()),
                DocEntry::merge(imported()),
                DocEntry::note("Added column A"),
                DocEntry::note("Merged"),
            ]
        );
    }

    #[test]
    fn test_nested_merge_deepens() {
        let mut doc = Documenter::new();
        seed(&mut doc, "data", &["A", "C", "D"]);
        doc.document("data::D", "Added column A", &["data::D", "data::A"], None)
            .unwrap();
        doc.document("data::C", "Added column D", &["data::C", "data::D"], None)
            .unwrap();

        assert_eq!(
            doc.get_documentation("C", Some("data"), false).unwrap(),
            vec![
                DocEntry::merge(imported()),
                DocEntry::merge(vec![
                    DocEntry::merge(imported()),
                    DocEntry::merge(imported()),
                    DocEntry::note("Added column A"),
                ]),
                DocEntry::note("Added column D"),
            ]
        );
    }

    #[test]
    fn test_no_input_annotation_on_unseeded_column() {
        let mut doc = Documenter::new();
        doc.document("basic_data::A", "random_origin", &[], None).unwrap();
        assert_eq!(
            doc.get_documentation("A", Some("basic_data"), false).unwrap(),
            vec![DocEntry::note("random_origin")]
        );
    }

    #[test]
    fn test_bare_references_resolve_when_unambiguous() {
        let mut doc = Documenter::new();
        seed(&mut doc, "data", &["A", "B"]);
        seed(&mut doc, "adv", &["C", "D"]);

        doc.document("data::A", "Added A to C", &["A", "C"], None).unwrap();
        doc.document("D", "Converted to int", &["D"], None).unwrap();

        assert_eq!(
            doc.get_documentation("A", Some("data"), false).unwrap(),
            vec![
                DocEntry::merge(imported()),
                DocEntry::merge(imported()),
                DocEntry::note("Added A to C"),
            ]
        );
        assert_eq!(
            doc.get_documentation("D", Some("adv"), false).unwrap(),
            vec![DocEntry::note(IMPORTED), DocEntry::note("Converted to int")]
        );
    }

    #[test]
    fn test_bare_reference_across_aliases_is_ambiguous() {
        let mut doc = Documenter::new();
        seed(&mut doc, "data", &["A"]);
        seed(&mut doc, "adv", &["A"]);

        let err = doc.get_documentation("A", None, false).unwrap_err();
        assert!(matches!(err, DatatrailError::AmbiguousColumn(_)));
    }

    #[test]
    fn test_rename_collision_makes_lookup_ambiguous() {
        // Writing A from inputs that do not cite A leaves two lineages.
        let mut doc = Documenter::new();
        seed(&mut doc, "data", &["A", "B"]);
        seed(&mut doc, "adv", &["C"]);
        doc.document("data::A", "Added A to C", &["data::B", "adv::C"], None)
            .unwrap();

        let err = doc.get_documentation("A", Some("data"), false).unwrap_err();
        assert!(matches!(err, DatatrailError::AmbiguousLineage(_)));
    }

    #[test]
    fn test_unknown_qualified_input() {
        let mut doc = Documenter::new();
        seed(&mut doc, "data", &["A"]);
        let err = doc
            .document("data::X", "nope", &["data::missing"], None)
            .unwrap_err();
        assert!(matches!(err, DatatrailError::UnknownColumn(_)));
    }

    #[test]
    fn test_origin_requires_history() {
        let mut doc = Documenter::new();
        let err = doc.document_origin("A", "random_origin", None).unwrap_err();
        assert!(matches!(err, DatatrailError::UnknownColumn(_)));

        seed(&mut doc, "data", &["A"]);
        doc.document_origin("A", "basic_data.csv", None).unwrap();
        assert_eq!(
            doc.get_documentation("A", Some("data"), false).unwrap(),
            vec![DocEntry::note(IMPORTED), DocEntry::note("origin: basic_data.csv")]
        );
    }

    #[test]
    fn test_seed_is_idempotent_but_rejects_divergent_lineage() {
        let mut doc = Documenter::new();
        let columns = vec!["A".to_owned()];
        doc.seed_import("data", &columns, &BTreeMap::new()).unwrap();
        doc.seed_import("data", &columns, &BTreeMap::new()).unwrap();
        assert_eq!(
            doc.get_documentation("A", Some("data"), false).unwrap(),
            imported()
        );

        let carried: BTreeMap<String, DocTrail> = [(
            "A".to_owned(),
            vec![DocEntry::note(IMPORTED), DocEntry::note("squared")],
        )]
        .into();
        let err = doc.seed_import("data", &columns, &carried).unwrap_err();
        assert!(matches!(err, DatatrailError::AmbiguousLineage(_)));
    }

    #[test]
    fn test_seed_uses_carried_trail_as_is() {
        let mut doc = Documenter::new();
        let carried: BTreeMap<String, DocTrail> =
            [("A".to_owned(), vec![DocEntry::note("random_origin")])].into();
        doc.seed_import("data", &["A".to_owned()], &carried).unwrap();
        assert_eq!(
            doc.get_documentation("A", Some("data"), false).unwrap(),
            vec![DocEntry::note("random_origin")]
        );
    }

    #[test]
    fn test_finalize_marks_drops_and_creates() {
        let mut doc = Documenter::new();
        seed(&mut doc, "data", &["A", "B"]);
        doc.document("data::A+B", "sum", &["data::A", "data::B"], None).unwrap();

        // A and B were dropped from the dataframe; A+B survives, NEW appears.
        let current = vec!["A+B".to_owned(), "NEW".to_owned()];
        doc.finalize_on_save(&current, "data");

        assert_eq!(
            doc.get_documentation("A", Some("data"), true).unwrap(),
            vec![DocEntry::note(IMPORTED), DocEntry::note(DROPPED)]
        );
        // Default view suppresses the trailing marker.
        assert_eq!(
            doc.get_documentation("A", Some("data"), false).unwrap(),
            imported()
        );
        assert_eq!(
            doc.get_documentation("NEW", Some("data"), false).unwrap(),
            vec![DocEntry::note(CREATED)]
        );

        // Idempotent on repeated save.
        doc.finalize_on_save(&current, "data");
        assert_eq!(
            doc.get_documentation("A", Some("data"), true).unwrap(),
            vec![DocEntry::note(IMPORTED), DocEntry::note(DROPPED)]
        );
    }

    #[test]
    fn test_trails_for_alias_includes_dropped_columns() {
        let mut doc = Documenter::new();
        seed(&mut doc, "data", &["A", "B"]);
        doc.finalize_on_save(&["B".to_owned()], "data");

        let trails = doc.trails_for_alias("data").unwrap();
        assert_eq!(trails.len(), 2);
        assert_eq!(
            trails["A"],
            vec![DocEntry::note(IMPORTED), DocEntry::note(DROPPED)]
        );
        assert_eq!(trails["B"], imported());
    }

    #[test]
    fn test_missing_column_under_alias_is_empty() {
        let mut doc = Documenter::new();
        seed(&mut doc, "data", &["A"]);
        assert!(
            doc.get_documentation("missing", Some("data"), false)
                .unwrap()
                .is_empty()
        );
    }
}
