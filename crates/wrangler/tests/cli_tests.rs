//! Integration tests for the wrangler binary

use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;
use wrangler_lib::{write_parquet, Column, ParquetReader, SnapshotReader, Table, Value};

const FEATURES: &str = r#"
- names: [node0_control_plane, node0_yy_node_not_ready]
  dtype: bool
- names: [node0_cpu_busy, node0_etcd_object_counts, node0_etcd_failed_proposal]
  dtype: float64
- names: [source]
  dtype: category
"#;

const LABELS: &str = r#"
- name: yy_node_not_ready
  label: red
- name: yy_unused_indicator
  label: informational
"#;

fn write_mappings(dir: &Path) {
    std::fs::write(dir.join("mapping.yaml"), FEATURES).unwrap();
    std::fs::write(dir.join("labels.yaml"), LABELS).unwrap();
}

/// Run the binary inside `dir` with a clean logging environment
fn wrangler(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_wrangler"))
        .current_dir(dir)
        .env_remove("RUST_LOG")
        .env_remove("LOG_LEVEL")
        .env_remove("WRANGLER_CONFIG")
        .args(args)
        .output()
        .expect("failed to run wrangler")
}

fn snapshot(control_planes: [u8; 3]) -> Table {
    let mut columns = Vec::new();
    for slot in control_planes {
        columns.push(Column::new(
            format!("node{}_control_plane", slot),
            vec![Value::Bool(true); 2],
        ));
    }
    for slot in 1..=6u8 {
        columns.push(Column::new(
            format!("node{}_cpu_busy", slot),
            vec![Value::Float(f64::from(slot)); 2],
        ));
        columns.push(Column::new(
            format!("node{}_yy_node_not_ready", slot),
            vec![Value::Bool(false), Value::Bool(slot == 2)],
        ));
    }
    for ip in ["10_1_0_5", "10_1_0_6", "10_1_0_7"] {
        columns.push(Column::new(
            format!("etcd_object_counts_{}", ip),
            vec![Value::Float(100.0); 2],
        ));
        columns.push(Column::new(
            format!("etcd_failed_proposal_ip_{}_compute_internal", ip),
            vec![Value::Float(0.0); 2],
        ));
    }
    Table::from_columns(columns).unwrap()
}

#[test]
fn test_help_lists_flags() {
    let dir = TempDir::new().unwrap();
    let output = wrangler(dir.path(), &["--help"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for flag in ["--validate", "--mapping", "--y-map", "--src", "--dstfile", "--label-weights"] {
        assert!(stdout.contains(flag), "help is missing {}", flag);
    }
}

#[test]
fn test_validate_prints_mapping_summary() {
    let dir = TempDir::new().unwrap();
    write_mappings(dir.path());

    let output = wrangler(
        dir.path(),
        &["--validate", "--mapping", "mapping.yaml", "--y-map", "labels.yaml"],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["features"], 6);
    assert_eq!(summary["red"], 1);
    assert_eq!(summary["unclassified"], 1);
    assert!(!dir.path().join("data").exists());
}

#[test]
fn test_missing_mapping_fails() {
    let dir = TempDir::new().unwrap();
    let output = wrangler(
        dir.path(),
        &["--validate", "--mapping", "nope.yaml", "--y-map", "nope.yaml"],
    );
    assert!(!output.status.success());
}

#[test]
fn test_run_writes_dataset_and_report() {
    let dir = TempDir::new().unwrap();
    write_mappings(dir.path());
    let runs = dir.path().join("runs");
    write_parquet(&snapshot([1, 2, 3]), &runs.join("compact-1.parquet")).unwrap();
    write_parquet(&snapshot([1, 2, 6]), &runs.join("nested").join("mno-2.parquet")).unwrap();

    let output = wrangler(
        dir.path(),
        &[
            "--mapping",
            "mapping.yaml",
            "--y-map",
            "labels.yaml",
            "--src",
            "runs",
            "--dstdir",
            "out",
            "--impute-labels",
            "--normalize-sources",
            "--report",
            "out/report.json",
        ],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let dataset = ParquetReader
        .read(&dir.path().join("out").join("dtyped-data.parquet"))
        .unwrap();
    assert_eq!(dataset.height(), 4);
    assert!(dataset.contains("y_label"));
    assert!(dataset.column_names().all(|name| !name.contains("10_1_0")));

    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(dir.path().join("out/report.json")).unwrap())
            .unwrap();
    assert_eq!(report["combined"]["rows"], 4);
    assert_eq!(report["inputs"].as_array().unwrap().len(), 2);
    assert_eq!(report["labels"]["by_source"]["compact"]["green"], 2);
}

#[test]
fn test_unreconcilable_snapshot_writes_nothing() {
    let dir = TempDir::new().unwrap();
    write_mappings(dir.path());
    let runs = dir.path().join("runs");
    let broken =
        snapshot([1, 2, 3]).drop_columns_where(|name| name.ends_with("node3_control_plane"));
    write_parquet(&broken, &runs.join("broken.parquet")).unwrap();

    let output = wrangler(
        dir.path(),
        &[
            "--mapping",
            "mapping.yaml",
            "--y-map",
            "labels.yaml",
            "--src",
            "runs",
            "--dstdir",
            "out",
        ],
    );
    assert!(!output.status.success());
    assert!(!dir.path().join("out").join("dtyped-data.parquet").exists());
}
