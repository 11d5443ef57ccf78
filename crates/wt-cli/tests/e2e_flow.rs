//! End-to-end tests for the `wt` binary.
//!
//! Tests the offline pipeline: capture → replay → export → summarize.

use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

fn wt_binary() -> String {
    env!("CARGO_BIN_EXE_wt").to_string()
}

fn wt(home: &Path, args: &[&str]) -> Output {
    Command::new(wt_binary())
        .env("HOME", home)
        .env_remove("RUST_LOG")
        .args(args)
        .output()
        .expect("failed to run wt")
}

fn weight_frame(weight: f64, unit: &str) -> String {
    format!(r#"{{"type":"weight","data":{{"weight":{weight},"unit":"{unit}"}}}}"#)
}

/// Writes a capture with two items placed and removed, plus noise frames.
fn write_capture(dir: &Path) -> std::path::PathBuf {
    let mut lines = vec![
        r#"{"type":"welcome","data":{"message":"Scale 1 ready"}}"#.to_string(),
        r#"{"type":"history","data":[]}"#.to_string(),
    ];
    for grams in [0.0, 500.0, 980.0, 1002.0, 1001.0, 1003.0, 1002.0, 1002.0, 1001.0, 0.0] {
        lines.push(weight_frame(grams, "g"));
    }
    lines.push("{not json".to_string());
    for kg in [2.4, 2.45, 2.451, 2.449, 2.45, 0.0] {
        lines.push(weight_frame(kg, "kg"));
    }

    let path = dir.join("capture.jsonl");
    std::fs::write(&path, lines.join("\n")).unwrap();
    path
}

#[test]
fn test_replay_prints_csv_to_stdout() {
    let temp = TempDir::new().unwrap();
    let capture = write_capture(temp.path());

    let output = wt(temp.path(), &["replay", capture.to_str().unwrap()]);
    assert!(
        output.status.success(),
        "replay should succeed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let csv = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], "S.No,Weight (kg),Date,Time");
    assert!(lines[1].starts_with("1,1.002,"), "{csv}");
    assert!(lines[2].starts_with("2,2.450,"), "{csv}");
    assert_eq!(lines[3], "");
    assert_eq!(lines[4], "Total Weight,3.452 kg");
    assert_eq!(lines[5], "Total Items,2");
}

#[test]
fn test_replay_then_summarize() {
    let temp = TempDir::new().unwrap();
    let capture = write_capture(temp.path());
    let export = temp.path().join("session.csv");

    let output = wt(
        temp.path(),
        &[
            "replay",
            capture.to_str().unwrap(),
            "--output",
            export.to_str().unwrap(),
        ],
    );
    assert!(output.status.success());
    let message = String::from_utf8_lossy(&output.stdout);
    assert!(message.starts_with("Recorded 2 items (3.452 kg)"), "{message}");

    let output = wt(temp.path(), &["summarize", export.to_str().unwrap()]);
    assert!(
        output.status.success(),
        "summarize should succeed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let summary = String::from_utf8(output.stdout).unwrap();
    assert!(summary.starts_with("Items: 2\nTotal weight: 3.452 kg\n"), "{summary}");
    assert!(!summary.contains("Warning"));
}

#[test]
fn test_replay_with_no_settled_weight_fails() {
    let temp = TempDir::new().unwrap();
    let capture = temp.path().join("capture.jsonl");
    let frames: Vec<String> = [0.1, 0.5, 0.9, 1.3].iter().map(|&kg| weight_frame(kg, "kg")).collect();
    std::fs::write(&capture, frames.join("\n")).unwrap();

    let output = wt(temp.path(), &["replay", capture.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("replay recorded no items"));
}

#[test]
fn test_summarize_rejects_non_export() {
    let temp = TempDir::new().unwrap();
    let file = temp.path().join("notes.csv");
    std::fs::write(&file, "a,b,c\n").unwrap();

    let output = wt(temp.path(), &["summarize", file.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("missing export header"));
}

#[test]
fn test_no_subcommand_prints_help() {
    let temp = TempDir::new().unwrap();
    let output = wt(temp.path(), &[]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("replay"));
}
