//! The binary's stdout must stay machine-readable with logging enabled.

use std::process::Command;

#[test]
fn extract_keeps_logs_off_stdout() {
    let tmp = tempfile::tempdir().unwrap();
    let report = tmp.path().join("report.txt");
    std::fs::write(&report, "Name: Jane Doe\nAge: 41\nSymptoms: fatigue, headaches").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_medassist"))
        .arg("extract")
        .arg(&report)
        .env("RUST_LOG", "debug")
        .env("NO_COLOR", "1")
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(stdout.starts_with("Medical Report Analysis"));
    assert!(stdout.contains("Age: 41"));
    assert!(!stdout.contains("INFO"));
    assert!(!stdout.contains("DEBUG"));
    assert!(stderr.contains("INFO"));
}
