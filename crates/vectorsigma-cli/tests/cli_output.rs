//! End-to-end tests of the vectorsigma binary

use std::process::{Command, Output};

const DIAGRAM: &str = "title Lights
[*] --> Red
Red: do / SwitchIn(5)
Red --> [*]: [ IsError ]
Red --> Green
state Green {
    [*] --> Walking
    Walking --> [*]
}
Green --> [*]
";

fn run_cli(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_vectorsigma"))
        .args(args)
        .env("VECTORSIGMA_LOG_LEVEL", "off")
        .env("NO_COLOR", "1")
        .output()
        .expect("failed to run vectorsigma")
}

#[test]
fn test_inspect_json() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("lights.puml");
    std::fs::write(&input, DIAGRAM).unwrap();

    let output = run_cli(&["inspect", "--json", "-i", input.to_str().unwrap()]);
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["title"], "Lights");
    assert_eq!(value["states"]["Green"]["composite"]["initial_state"], "InitialState");
    assert!(value["all_states"]
        .as_array()
        .unwrap()
        .iter()
        .any(|s| s == "Walking"));
}

#[test]
fn test_inspect_summary() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("lights.puml");
    std::fs::write(&input, DIAGRAM).unwrap();

    let output = run_cli(&["inspect", "-i", input.to_str().unwrap()]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Title:   Lights"));
    assert!(stdout.contains("Depth:   1"));
}

#[test]
fn test_missing_input_fails() {
    let output = run_cli(&["generate", "-i", "/nonexistent/lights.puml"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.starts_with("Error: "));
    assert!(stderr.contains("failed to read input file"));
}
