use std::process::Command;

fn temp_path(label: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!(
        "courier-cli-{label}-{}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos()
    ))
}

#[test]
fn cli_list_scenarios_writes_output() {
    let exe = env!("CARGO_BIN_EXE_courier-tester");
    let output_path = temp_path("list");
    let status = Command::new(exe)
        .args(["--list-scenarios", "--output"])
        .arg(&output_path)
        .status()
        .expect("run cli");
    assert!(status.success());
    let content = std::fs::read_to_string(output_path).expect("read output");
    assert!(content.contains("Available scenarios"));
    assert!(content.contains("smoke"));
}

#[test]
fn cli_runs_smoke_with_json_report_and_scores() {
    let exe = env!("CARGO_BIN_EXE_courier-tester");
    let output_path = temp_path("run.json");
    let scores_path = temp_path("scores.json");
    let output = Command::new(exe)
        .args([
            "--report",
            "json",
            "--scenarios",
            "smoke",
            "--iterations",
            "1",
            "--seeds",
            "1,rainy-monday",
            "--max-time",
            "30",
            "--scores",
        ])
        .arg(&scores_path)
        .arg("--output")
        .arg(&output_path)
        .output()
        .expect("run cli");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Courier Automated Tester"));

    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(output_path).expect("read report"))
            .expect("json report");
    let results = report.as_array().expect("result list");
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|r| r["passed"] == true));

    let scores: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(scores_path).expect("read scores"))
            .expect("score file");
    assert_eq!(scores.as_array().map(Vec::len), Some(2));
}

#[test]
fn cli_rejects_missing_feed_files() {
    let exe = env!("CARGO_BIN_EXE_courier-tester");
    let output = Command::new(exe)
        .args(["--report", "json", "--map", "/no/such/city.json"])
        .output()
        .expect("run cli");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to load simulation feeds"));
}
