use assert_cmd::Command;
use nl2sql_core::storage::results::read_records;
use predicates::str::contains;
use std::path::Path;
use tempfile::TempDir;

fn nl2sql(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("nl2sql").unwrap();
    cmd.current_dir(dir).env_remove("RUST_LOG");
    cmd
}

fn demo_workspace() -> TempDir {
    let dir = TempDir::new().unwrap();
    nl2sql(dir.path()).arg("init").assert().success();
    nl2sql(dir.path())
        .args(["init-db", "--db", "warehouse.db", "--demo"])
        .assert()
        .success();
    dir
}

#[test]
fn version_prints_crate_version() {
    let dir = TempDir::new().unwrap();
    nl2sql(dir.path())
        .arg("version")
        .assert()
        .success()
        .stdout(contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn init_writes_sample_files_once() {
    let dir = TempDir::new().unwrap();
    nl2sql(dir.path())
        .args(["init", "--gitignore"])
        .assert()
        .success()
        .stderr(contains("created nl2sql.yaml"));
    assert!(dir.path().join("questions.json").exists());
    assert!(dir.path().join(".gitignore").exists());

    nl2sql(dir.path())
        .arg("init")
        .assert()
        .success()
        .stderr(contains("already exists"));
}

#[test]
fn offline_run_writes_every_question_and_configuration() {
    let dir = demo_workspace();
    nl2sql(dir.path())
        .arg("run")
        .assert()
        .success()
        .stderr(contains("results:"));

    let results = dir.path().join("results").join("demo.csv");
    let records = read_records(&results).unwrap();
    // 4 sample questions x 6 grid configurations
    assert_eq!(records.len(), 24);
    assert!(records.iter().all(|r| r.execution_success));
    assert!(records.iter().all(|r| r.results_match));
    assert!(dir.path().join("results").join("demo_summary.json").exists());
}

#[test]
fn resumed_run_adds_no_duplicate_rows() {
    let dir = demo_workspace();
    nl2sql(dir.path()).arg("run").assert().success();
    nl2sql(dir.path())
        .args(["run", "--resume"])
        .assert()
        .success();

    let records = read_records(&dir.path().join("results").join("demo.csv")).unwrap();
    assert_eq!(records.len(), 24);
}

#[test]
fn question_range_limits_the_run() {
    let dir = demo_workspace();
    nl2sql(dir.path())
        .args(["run", "--from", "2", "--to", "3"])
        .assert()
        .success();

    let records = read_records(&dir.path().join("results").join("demo.csv")).unwrap();
    assert_eq!(records.len(), 12);
    assert!(records.iter().all(|r| r.question_id == "2" || r.question_id == "3"));
}

#[test]
fn analyze_renders_report_for_results() {
    let dir = demo_workspace();
    nl2sql(dir.path()).arg("run").assert().success();
    nl2sql(dir.path())
        .args(["analyze", "--results", "results/demo.csv"])
        .assert()
        .success()
        .stdout(contains("EXPERIMENT FAILURE ANALYSIS"))
        .stdout(contains("Total queries:          24"));
}

#[test]
fn missing_config_is_a_config_error() {
    let dir = TempDir::new().unwrap();
    nl2sql(dir.path())
        .args(["run", "--config", "missing.yaml"])
        .assert()
        .code(2)
        .stderr(contains("config error"));
}

#[test]
fn missing_database_is_a_config_error() {
    let dir = TempDir::new().unwrap();
    nl2sql(dir.path()).arg("init").assert().success();
    nl2sql(dir.path())
        .arg("run")
        .assert()
        .code(2)
        .stderr(contains("init-db"));
    assert!(!dir.path().join("results").join("demo.csv").exists());
}

#[test]
fn ask_prints_generated_sql_and_rows() {
    let dir = demo_workspace();
    nl2sql(dir.path())
        .args([
            "ask",
            "How many rows are there?",
            "--db",
            "warehouse.db",
            "--provider",
            "fake",
        ])
        .assert()
        .success()
        .stdout(contains("SELECT 1"));
}

#[test]
fn ask_with_insights_prints_narrative_after_rows() {
    let dir = demo_workspace();
    nl2sql(dir.path())
        .args([
            "ask",
            "How many rows are there?",
            "--db",
            "warehouse.db",
            "--provider",
            "fake",
            "--insights",
        ])
        .assert()
        .success()
        .stdout(contains("Insights"))
        .stdout(contains("Summary: SELECT 1"));
}

#[test]
fn unknown_insights_kind_is_a_config_error() {
    let dir = demo_workspace();
    nl2sql(dir.path())
        .args([
            "ask",
            "anything",
            "--db",
            "warehouse.db",
            "--provider",
            "fake",
            "--insights",
            "chart",
        ])
        .assert()
        .code(2)
        .stderr(contains("unknown insights kind"));
}

#[test]
fn unknown_provider_is_rejected() {
    let dir = demo_workspace();
    nl2sql(dir.path())
        .args(["ask", "anything", "--db", "warehouse.db", "--provider", "nope"])
        .assert()
        .code(2)
        .stderr(contains("unknown provider"));
}

#[test]
fn json_flag_prints_summary_on_stdout() {
    let dir = demo_workspace();
    let out = nl2sql(dir.path())
        .args(["run", "--json", "--to", "1"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let summary: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(summary["experiment"], "demo");
    assert_eq!(summary["overall"]["total"], 6);
}
