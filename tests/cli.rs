//! Integration tests for the gridlens binary

use std::path::Path;
use std::process::Command;

const MODEL_V1: &str = r#"
[Data]
A1: "Region"
B1: "Revenue"
C1: "Tax"
A2: "North"
B2: 100
C2: =B2*0.19
A3: "South"
B3: 200
C3: =B3*0.19
A4: "East"
B4: 300
C4: =B4*0.19
"#;

const MODEL_V2: &str = r#"
[Data]
A1: "Region"
B1: "Revenue"
C1: "Tax"
A2: "South"
B2: 250
C2: =B2*0.19
A3: "North"
B3: 100
C3: =B3*0.19
A4: "West"
B4: 50
C4: =B4*0.2
"#;

fn run_gridlens(dir: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_gridlens"))
        .args(args)
        // Tests must not depend on a user's ~/.config/gridlens/config.toml.
        .env("XDG_CONFIG_HOME", dir)
        .env("HOME", dir)
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to execute gridlens");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let exit_code = output.status.code().unwrap_or(-1);

    (stdout, stderr, exit_code)
}

fn write(dir: &Path, name: &str, content: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path.display().to_string()
}

#[test]
fn test_analyze_table() {
    let dir = tempfile::tempdir().unwrap();
    let model = write(dir.path(), "model.grd", MODEL_V1);
    let (stdout, _, code) = run_gridlens(dir.path(), &["analyze", &model]);
    assert_eq!(code, 0);
    assert!(stdout.contains("Health score:"));
    assert!(stdout.contains("Hidden Hardcode"));
    assert!(stdout.contains("Data!C2...C4 (x3)"));
}

#[test]
fn test_analyze_csv_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let model = write(dir.path(), "model.grd", MODEL_V1);
    let out = dir.path().join("risks.csv");
    let (_, _, code) = run_gridlens(
        dir.path(),
        &["analyze", &model, "--format", "csv", "-o", &out.display().to_string()],
    );
    assert_eq!(code, 0);
    let csv = std::fs::read_to_string(&out).unwrap();
    assert!(csv.starts_with("risk_type,severity,tier,sheet,location,instances,context,description"));
    assert!(csv.contains("C2...C4,3,"));
}

#[test]
fn test_analyze_json() {
    let dir = tempfile::tempdir().unwrap();
    let model = write(dir.path(), "model.grd", MODEL_V1);
    let (stdout, _, code) = run_gridlens(dir.path(), &["analyze", &model, "-f", "json"]);
    assert_eq!(code, 0);
    let report: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert!(report["health_score"].as_u64().unwrap() <= 100);
    assert!(!report["risks"].as_array().unwrap().is_empty());
}

#[test]
fn test_diff_json() {
    let dir = tempfile::tempdir().unwrap();
    let v1 = write(dir.path(), "v1.grd", MODEL_V1);
    let v2 = write(dir.path(), "v2.grd", MODEL_V2);
    let (stdout, _, code) = run_gridlens(
        dir.path(),
        &["diff", &v1, &v2, "--sheet", "Data", "--keys", "A", "--format", "json"],
    );
    assert_eq!(code, 0);
    let changes: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let rows = changes["rows"].as_array().unwrap();
    let status_of = |key: &str| {
        rows.iter()
            .find(|r| r["key"] == key)
            .map(|r| r["status"].as_str().unwrap().to_string())
    };
    assert_eq!(status_of("north").as_deref(), Some("matched"));
    assert_eq!(status_of("south").as_deref(), Some("matched"));
    assert_eq!(status_of("east").as_deref(), Some("deleted"));
    assert_eq!(status_of("west").as_deref(), Some("inserted"));

    let kinds: Vec<&str> = changes["changes"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["kind"].as_str().unwrap())
        .collect();
    // South's revenue moved 200 -> 250; North is unchanged despite moving rows.
    assert_eq!(kinds.iter().filter(|k| **k == "input_update").count(), 1);
    assert!(kinds.contains(&"row_inserted"));
    assert!(kinds.contains(&"row_deleted"));
}

#[test]
fn test_diff_table() {
    let dir = tempfile::tempdir().unwrap();
    let v1 = write(dir.path(), "v1.grd", MODEL_V1);
    let v2 = write(dir.path(), "v2.grd", MODEL_V2);
    let (stdout, _, code) = run_gridlens(dir.path(), &["diff", &v1, &v2, "--sheet", "Data", "--keys", "A"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("Rows: 3 matched, 1 inserted, 1 deleted"));
    assert!(stdout.contains("Input Update"));
}

#[test]
fn test_unreadable_workbook_exits_one() {
    let dir = tempfile::tempdir().unwrap();
    let broken = write(dir.path(), "broken.xlsx", "not a workbook");
    let (_, stderr, code) = run_gridlens(dir.path(), &["analyze", &broken]);
    assert_eq!(code, 1);
    assert!(stderr.contains("Error:"));
}

#[test]
fn test_unknown_sheet_exits_one() {
    let dir = tempfile::tempdir().unwrap();
    let v1 = write(dir.path(), "v1.grd", MODEL_V1);
    let (_, stderr, code) = run_gridlens(dir.path(), &["diff", &v1, &v1, "--sheet", "Nope", "--keys", "A"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("Sheet not found"));
}

#[test]
fn test_bad_arguments_exit_one() {
    let dir = tempfile::tempdir().unwrap();
    let (_, _, code) = run_gridlens(dir.path(), &["diff", "only-one.grd"]);
    assert_eq!(code, 1);
}
