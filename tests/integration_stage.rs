//! End-to-end tests of the load/save session: provenance sidecars, lineage
//! closure and column documentation across real directories.

use datatrail::error::DatatrailError;
use datatrail::lineage::DocEntry;
use datatrail::provenance::{FileRecord, Sidecar, identity_for_path};
use datatrail::stage::{LoadOptions, SaveOptions, Stage};
use polars::df;
use std::fs;
use std::path::Path;
use tempfile::{TempDir, tempdir};

fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn note(text: &str) -> DocEntry {
    DocEntry::note(text)
}

/// A data root with `test/step_raw/basic_data.csv` (columns A, B).
fn seeded_root() -> TempDir {
    init_logs();
    let root = tempdir().unwrap();
    let dir = root.path().join("test").join("step_raw");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("basic_data.csv"), "A,B\n1,2\n3,4\n").unwrap();
    root
}

fn load_raw(stage: &mut Stage, root: &Path, alias: &str) -> polars::prelude::DataFrame {
    stage
        .load(
            &LoadOptions::new()
                .root(root)
                .attrs(["test"])
                .step("raw")
                .alias(alias),
        )
        .unwrap()
}

#[test]
fn test_linear_lineage_documentation() {
    let root = seeded_root();
    let mut stage = Stage::new();
    let df = load_raw(&mut stage, root.path(), "basic_data");
    assert_eq!(df.shape(), (2, 2));

    stage
        .col_step("basic_data::A", "Loaded from raw data.", &["basic_data::A"])
        .unwrap();

    assert_eq!(
        stage.get_doc("A", Some("basic_data"), false).unwrap(),
        vec![note("Imported"), note("Loaded from raw data.")]
    );
    assert_eq!(
        stage.get_doc("B", Some("basic_data"), false).unwrap(),
        vec![note("Imported")]
    );
}

#[test]
fn test_merge_documentation_shape() {
    let root = seeded_root();
    let mut stage = Stage::new();
    load_raw(&mut stage, root.path(), "data");

    stage
        .col_step("data::A+B", "Column A plus B.", &["data::A", "data::B"])
        .unwrap();

    assert_eq!(
        stage.get_doc("A+B", Some("data"), false).unwrap(),
        vec![
            DocEntry::merge(vec![note("Imported")]),
            DocEntry::merge(vec![note("Imported")]),
            note("Column A plus B."),
        ]
    );
}

#[test]
fn test_save_links_inputs_and_carries_documentation() {
    let root = seeded_root();
    let mut stage = Stage::new();
    let mut df = load_raw(&mut stage, root.path(), "basic_data");
    stage
        .col_step("basic_data::A", "Loaded from raw data.", &["basic_data::A"])
        .unwrap();

    // Auto file name reuses the single input's name.
    let path = stage
        .save(
            &mut df,
            &SaveOptions::new()
                .root(root.path())
                .attrs(["test"])
                .step("processed")
                .version("1")
                .alias("basic_data"),
        )
        .unwrap();
    assert!(path.ends_with("test/step_processed/1/basic_data.csv"));

    // The destination sidecar holds the new record and its raw ancestor.
    let out_dir = path.parent().unwrap();
    let sidecar = Sidecar::load(out_dir).unwrap();
    assert_eq!(sidecar.files.len(), 2);

    let raw_uuid = identity_for_path("test/step_raw/basic_data.csv");
    let new_uuid = identity_for_path("test/step_processed/1/basic_data.csv");
    let saved = sidecar.find_by_uuid(new_uuid).unwrap();
    assert_eq!(saved.input_files, [raw_uuid]);
    assert_eq!(saved.export_method_used, "csv");
    assert!(sidecar.find_by_uuid(raw_uuid).is_some());

    // A fresh session chains onto the persisted documentation.
    let mut next = Stage::new();
    next.load(
        &LoadOptions::new()
            .root(root.path())
            .attrs(["test"])
            .step("processed")
            .alias("processed"),
    )
    .unwrap();
    assert_eq!(
        next.get_doc("A", Some("processed"), false).unwrap(),
        vec![note("Imported"), note("Loaded from raw data.")]
    );
}

#[test]
fn test_dropped_columns_are_tracked_across_saves() {
    let root = seeded_root();
    let mut stage = Stage::new();
    let df = load_raw(&mut stage, root.path(), "data");

    let mut narrowed = df.drop("B").unwrap();
    stage
        .save(
            &mut narrowed,
            &SaveOptions::new()
                .root(root.path())
                .attrs(["test"])
                .step("narrow")
                .version("1")
                .alias("data"),
        )
        .unwrap();

    let mut next = Stage::new();
    let reloaded = next
        .load(
            &LoadOptions::new()
                .root(root.path())
                .attrs(["test"])
                .step("narrow")
                .alias("data"),
        )
        .unwrap();
    assert_eq!(reloaded.get_column_names_str(), ["A"]);

    // The dropped column stays queryable with its terminal marker.
    assert_eq!(
        next.get_doc("B", Some("data"), true).unwrap(),
        vec![note("Imported"), note("Dropped")]
    );
    // The default view hides it.
    assert_eq!(
        next.get_doc("B", Some("data"), false).unwrap(),
        vec![note("Imported")]
    );
}

#[test]
fn test_bare_reference_ambiguous_across_aliases() {
    let root = seeded_root();
    let other = root.path().join("other").join("step_raw");
    fs::create_dir_all(&other).unwrap();
    fs::write(other.join("more.csv"), "A,C\n5,6\n").unwrap();

    let mut stage = Stage::new();
    load_raw(&mut stage, root.path(), "data");
    stage
        .load(
            &LoadOptions::new()
                .root(root.path())
                .attrs(["other"])
                .step("raw")
                .alias("more"),
        )
        .unwrap();

    let err = stage.get_doc("A", None, false).unwrap_err();
    assert!(matches!(err, DatatrailError::AmbiguousColumn(_)));
    // Qualified lookups still work.
    assert_eq!(
        stage.get_doc("C", Some("more"), false).unwrap(),
        vec![note("Imported")]
    );
}

#[test]
fn test_save_without_load_creates_fresh_lineage() {
    init_logs();
    let root = tempdir().unwrap();
    let mut stage = Stage::new();
    let mut df = df!("X" => [1i64, 2], "Y" => ["a", "b"]).unwrap();

    let path = stage
        .save(
            &mut df,
            &SaveOptions::new()
                .root(root.path())
                .attrs(["fresh"])
                .step("raw")
                .version("1")
                .file_name("fresh.csv"),
        )
        .unwrap();

    let sidecar = Sidecar::load(path.parent().unwrap()).unwrap();
    assert_eq!(sidecar.files.len(), 1);
    assert!(sidecar.files[0].input_files.is_empty());

    let mut next = Stage::new();
    next.load(
        &LoadOptions::new()
            .root(root.path())
            .attrs(["fresh"])
            .step("raw")
            .alias("fresh"),
    )
    .unwrap();
    assert_eq!(
        next.get_doc("X", Some("fresh"), false).unwrap(),
        vec![note("Created")]
    );
    assert_eq!(
        next.get_doc("Y", Some("fresh"), false).unwrap(),
        vec![note("Created")]
    );
}

#[test]
fn test_origin_survives_merge_and_is_listable() {
    let root = seeded_root();
    let mut stage = Stage::new();
    load_raw(&mut stage, root.path(), "data");

    stage.col_origin("data::A", "census_2024.csv").unwrap();
    stage
        .col_step("data::A+B", "Column A plus B.", &["data::A", "data::B"])
        .unwrap();

    assert_eq!(
        stage.get_origins("A+B", Some("data")).unwrap(),
        ["census_2024.csv"]
    );
}

#[test]
fn test_cyclic_sidecar_fails_instead_of_hanging() {
    init_logs();
    let root = tempdir().unwrap();
    let dir = root.path().join("test").join("step_raw");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("a.csv"), "A\n1\n").unwrap();

    let frame = df!("A" => [1i64]).unwrap();
    let loc = |name: &str| datatrail::location::Location {
        attrs: vec!["test".to_owned()],
        step: Some("raw".to_owned()),
        version: None,
        file_name: name.to_owned(),
    };
    let b_uuid = identity_for_path("test/step_raw/b.csv");
    let mut a = FileRecord::new(loc("a.csv"), &frame, "csv", vec![b_uuid], Default::default());
    let b = FileRecord::new(loc("b.csv"), &frame, "csv", vec![a.uuid], Default::default());
    a.input_files = vec![b.uuid];

    let mut sidecar = Sidecar::default();
    sidecar.upsert(a);
    sidecar.upsert(b);
    sidecar.persist(&dir).unwrap();

    let mut stage = Stage::new();
    let err = stage
        .load(
            &LoadOptions::new()
                .root(root.path())
                .attrs(["test"])
                .step("raw")
                .file_name("a.csv"),
        )
        .unwrap_err();
    assert!(matches!(err, DatatrailError::CyclicLineage(_)));
}

#[test]
fn test_file_missing_from_sidecar_loads_without_ancestry() {
    let root = seeded_root();
    let dir = root.path().join("test").join("step_raw");

    // Sidecar describing an unrelated file only.
    let frame = df!("Z" => [0i64]).unwrap();
    let other = FileRecord::new(
        datatrail::location::Location {
            attrs: vec!["test".to_owned()],
            step: Some("raw".to_owned()),
            version: None,
            file_name: "unrelated.csv".to_owned(),
        },
        &frame,
        "csv",
        Vec::new(),
        Default::default(),
    );
    let mut sidecar = Sidecar::default();
    sidecar.upsert(other);
    sidecar.persist(&dir).unwrap();

    let mut stage = Stage::new();
    let df = stage
        .load(
            &LoadOptions::new()
                .root(root.path())
                .attrs(["test"])
                .step("raw")
                .file_name("basic_data.csv")
                .alias("data"),
        )
        .unwrap();
    assert_eq!(df.shape(), (2, 2));

    let record = stage
        .provenance()
        .get(identity_for_path("test/step_raw/basic_data.csv"))
        .unwrap();
    assert!(record.input_files.is_empty());
}

#[test]
fn test_unknown_extension_is_a_checked_error() {
    init_logs();
    let root = tempdir().unwrap();
    let dir = root.path().join("test").join("step_raw");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("data.xyz"), "??").unwrap();

    let mut stage = Stage::new();
    let err = stage
        .load(
            &LoadOptions::new()
                .root(root.path())
                .attrs(["test"])
                .step("raw"),
        )
        .unwrap_err();
    assert!(matches!(err, DatatrailError::UnsupportedFormat(_)));
}

#[test]
fn test_latest_version_wins_by_default() {
    init_logs();
    let root = tempdir().unwrap();
    let step_dir = root.path().join("test").join("step_raw");
    for (version, value) in [("20230101000000", "1"), ("20240101000000", "2")] {
        let dir = step_dir.join(version);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("data.csv"), format!("A\n{value}\n")).unwrap();
    }

    let mut stage = Stage::new();
    let df = stage
        .load(
            &LoadOptions::new()
                .root(root.path())
                .attrs(["test"])
                .step("raw")
                .alias("data"),
        )
        .unwrap();
    let column = df.column("A").unwrap();
    assert_eq!(column.get(0).unwrap().to_string(), "2");
}

#[test]
fn test_stage_defaults_apply_under_explicit_overrides() {
    let root = seeded_root();
    let mut stage = Stage::new();
    {
        let cfg = stage.config_mut();
        cfg.root = datatrail::stage::Param::set(root.path().to_path_buf());
        cfg.attrs = datatrail::stage::Param::set(vec!["test".to_owned()]);
        cfg.step_in = datatrail::stage::Param::set(Some("raw".to_owned()));
    }

    let df = stage.load(&LoadOptions::new().alias("data")).unwrap();
    assert_eq!(df.shape(), (2, 2));
}
