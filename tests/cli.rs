//! End-to-end runs of the `string-bench` binary.

use std::process::Command;

use string_build_bench::schema::{Status, SuiteReport};
use tempfile::tempdir;

const SMALL: [&str; 6] = [
    "--size",
    "200",
    "--warmup",
    "1",
    "--max-iterations",
    "3",
];

fn bench() -> Command {
    Command::new(env!("CARGO_BIN_EXE_string-bench"))
}

#[test]
fn list_names_every_variant() {
    let output = bench().arg("list").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    for name in [
        "lazy-join",
        "piecewise",
        "interpolation",
        "temporaries",
        "fold-interpolation",
        "fold-temporaries",
    ] {
        assert!(stdout.contains(name), "missing {name}");
    }
}

#[test]
fn run_prints_a_table_per_benchmark() {
    let output = bench()
        .args(SMALL)
        .args(["run", "--variant", "lazy-join", "--variant", "piecewise"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("lazy-join (3 samples)"));
    assert!(stdout.contains("piecewise (3 samples)"));
    assert!(stdout.contains("malloc-small-count"));
    assert!(stdout.contains("Samples"));
    assert!(!stdout.contains("allocation data unavailable"));
}

#[test]
fn run_writes_json_report() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("report.json");

    let status = bench()
        .args(SMALL)
        .args([
            "--format",
            "json",
            "--metric",
            "wall-clock-ms",
            "--metric",
            "malloc-total-count",
        ])
        .arg("--out")
        .arg(&path)
        .args(["run", "--variant", "fold-temporaries"])
        .status()
        .unwrap();
    assert!(status.success());

    let report: SuiteReport =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(report.run.input_size, 200);
    assert_eq!(report.benchmarks.len(), 1);
    let entry = &report.benchmarks[0];
    assert_eq!(entry.name, "fold-temporaries");
    assert_eq!(entry.status, Status::Ok);
    assert_eq!(entry.samples, 3);
    assert_eq!(entry.metrics.len(), 2);
    assert!(entry.metrics.iter().all(|m| m.percentiles.is_some()));
}

#[test]
fn suite_runs_each_variant_in_a_child() {
    let output = bench()
        .args(SMALL)
        .args(["--format", "json"])
        .args(["suite", "--variant", "temporaries", "--variant", "interpolation"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: SuiteReport = serde_json::from_slice(&output.stdout).unwrap();
    let names: Vec<&str> = report.benchmarks.iter().map(|b| b.name.as_str()).collect();
    assert_eq!(names, ["temporaries", "interpolation"]);
    assert!(!report.any_failed());
}

#[test]
fn invalid_scale_exits_nonzero() {
    let output = bench()
        .args(SMALL)
        .args(["--scale", "0", "run"])
        .output()
        .unwrap();
    assert!(!output.status.success());
}
