//! End-to-end runs of the compiled binary.

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

#[test]
fn compiles_and_runs_wasm() {
    let dir = tempdir().expect("tempdir");
    let input_path = dir.path().join("input.opal");
    fs::write(&input_path, "print(40 + 2)").expect("write input");
    let output_path = dir.path().join("out.wasm");

    Command::cargo_bin("opal-cli")
        .expect("binary exists")
        .arg("--input")
        .arg(&input_path)
        .arg("--output")
        .arg(&output_path)
        .arg("--run")
        .assert()
        .success()
        .stdout(predicate::str::contains("42"))
        .stdout(predicate::str::contains("Program exited with 0"));

    assert!(output_path.exists(), "wasm output was not created");
}

#[test]
fn emits_textual_mir() {
    let dir = tempdir().expect("tempdir");
    let input_path = dir.path().join("input.opal");
    fs::write(&input_path, "let a = 2\nprint(a * 3)").expect("write input");
    let output_path = dir.path().join("out.mir");

    Command::cargo_bin("opal-cli")
        .expect("binary exists")
        .arg("--input")
        .arg(&input_path)
        .arg("--output")
        .arg(&output_path)
        .arg("--emit")
        .arg("mir")
        .assert()
        .success();

    let dump = fs::read_to_string(&output_path).expect("read mir");
    assert!(dump.contains("global $a"));
    assert!(dump.contains("fn @main"));
}

#[test]
fn emits_module_artifacts() {
    let dir = tempdir().expect("tempdir");
    let input_path = dir.path().join("lib.opal");
    fs::write(&input_path, "pub fn double(x: Int) -> Int { return x + x }")
        .expect("write input");
    let output_path = dir.path().join("lib.opalmod");

    Command::cargo_bin("opal-cli")
        .expect("binary exists")
        .arg("--input")
        .arg(&input_path)
        .arg("--output")
        .arg(&output_path)
        .arg("--emit")
        .arg("artifact")
        .arg("--module-name")
        .arg("Lib")
        .assert()
        .success();

    let artifact = opal_core::serialize::read_artifact(&output_path).expect("read artifact");
    assert_eq!(artifact.link_name, "Lib");
    assert!(artifact.decl("double").is_some());
}

#[test]
fn reports_type_errors() {
    let dir = tempdir().expect("tempdir");
    let input_path = dir.path().join("input.opal");
    fs::write(&input_path, "let x: Bool = 1").expect("write input");
    let output_path = dir.path().join("out.wasm");

    Command::cargo_bin("opal-cli")
        .expect("binary exists")
        .arg("--input")
        .arg(&input_path)
        .arg("--output")
        .arg(&output_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected `Bool`"));
}

#[test]
fn rejects_unknown_emit_formats() {
    let dir = tempdir().expect("tempdir");
    let input_path = dir.path().join("input.opal");
    fs::write(&input_path, "let a = 1").expect("write input");

    Command::cargo_bin("opal-cli")
        .expect("binary exists")
        .arg("--input")
        .arg(&input_path)
        .arg("--output")
        .arg(dir.path().join("out"))
        .arg("--emit")
        .arg("exe")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported emit format"));
}
