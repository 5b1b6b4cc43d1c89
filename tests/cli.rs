use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;

fn pantier() -> Command {
    Command::cargo_bin("pantier").unwrap()
}

#[test]
fn runs() {
    pantier().assert().success();
}

#[test]
fn outputs_tool_name() {
    pantier()
        .arg("-V")
        .assert()
        .success()
        .stdout("pantier 0.3.0\n");
}

// Convert subcommand tests

#[test]
fn convert_ctm_to_xra_is_lossless() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("sample.xra");

    pantier()
        .args(["convert", "tests/fixtures/sample.ctm"])
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("(ctm) ->"))
        .stdout(predicate::str::contains("4 tiers, 22 annotations"));

    let xml = fs::read_to_string(&out).unwrap();
    assert!(xml.contains("tiername=\"SHOW_1-1\""));
    assert!(xml.contains("file_reader"));
}

#[test]
fn convert_refuses_lossy_output_without_flag() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("sample.TextGrid");

    pantier()
        .args(["convert", "tests/fixtures/sample.eaf"])
        .arg(&out)
        .assert()
        .failure()
        .stderr(predicate::str::contains("--allow-lossy"))
        .stderr(predicate::str::contains("hierarchy"));
    assert!(!out.exists());
}

#[test]
fn convert_writes_lossy_output_with_flag() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("sample.TextGrid");

    pantier()
        .args(["convert", "tests/fixtures/sample.eaf"])
        .arg(&out)
        .arg("--allow-lossy")
        .assert()
        .success()
        .stdout(predicate::str::contains("Warnings"));

    let grid = fs::read_to_string(&out).unwrap();
    assert!(grid.contains("name = \"words\""));
    assert!(grid.contains("good morning"));
}

#[test]
fn convert_rejected_conversion_names_the_cause() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("sample.srt");

    pantier()
        .args(["convert", "tests/fixtures/sample.ctm"])
        .arg(&out)
        .arg("--allow-lossy")
        .assert()
        .failure()
        .stderr(predicate::str::contains("only one tier"));
    assert!(!out.exists());
}

#[test]
fn convert_json_report() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("sample.csv");

    pantier()
        .args(["convert", "tests/fixtures/sample.stm"])
        .arg(&out)
        .args(["--report", "json", "--allow-lossy"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"from\": \"stm\""))
        .stdout(predicate::str::contains("\"to\": \"csv\""));
}

#[test]
fn convert_unknown_output_extension_fails() {
    let dir = tempfile::tempdir().unwrap();
    pantier()
        .args(["convert", "tests/fixtures/sample.ctm"])
        .arg(dir.path().join("out.docx"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("docx"));
}

#[test]
fn convert_with_heuristic_reads_unknown_extensions() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("grid.praat");
    fs::copy("tests/fixtures/sample.TextGrid", &input).unwrap();
    let out = dir.path().join("grid.xra");

    pantier()
        .arg("convert")
        .arg(&input)
        .arg(&out)
        .assert()
        .failure();

    pantier()
        .arg("convert")
        .arg(&input)
        .arg(&out)
        .arg("--heuristic")
        .assert()
        .success()
        .stdout(predicate::str::contains("(textgrid)"));
}

// Validate subcommand tests

#[test]
fn validate_clean_file_succeeds() {
    pantier()
        .args(["validate", "tests/fixtures/sample.TextGrid"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Validation passed"));
}

#[test]
fn validate_reports_vocabulary_violations() {
    pantier()
        .args(["validate", "tests/fixtures/sample.eaf"])
        .assert()
        .success()
        .stdout(predicate::str::contains("VocabularyViolation"))
        .stdout(predicate::str::contains("maybe"));
}

#[test]
fn validate_strict_fails_on_warnings() {
    pantier()
        .args(["validate", "tests/fixtures/sample.eaf", "--strict"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("warning(s)"));
}

#[test]
fn validate_json_output_format() {
    pantier()
        .args(["validate", "tests/fixtures/sample.ctm", "--output", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"error_count\": 0"))
        .stdout(predicate::str::contains("\"warning_count\": 0"));
}

#[test]
fn validate_nonexistent_file_fails() {
    pantier()
        .args(["validate", "nonexistent_file.eaf"])
        .assert()
        .failure();
}

// Formats subcommand tests

#[test]
fn formats_lists_every_adapter() {
    let assert = pantier().arg("formats").assert().success();
    let stdout = String::from_utf8(assert.get_output().stdout.clone()).unwrap();
    for name in [
        "xra", "eaf", "textgrid", "subrip", "webvtt", "subviewer", "ctm", "stm", "htk", "csv",
        "text",
    ] {
        assert!(stdout.contains(name), "missing {name} in:\n{stdout}");
    }
}

#[test]
fn formats_json_includes_capabilities() {
    pantier()
        .args(["formats", "--output", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"name\": \"eaf\""))
        .stdout(predicate::str::contains("\"hierarchy\": true"))
        .stdout(predicate::str::contains("\"alt_tag\": false"));
}

// Batch subcommand tests

#[test]
fn batch_converts_a_directory() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    fs::create_dir_all(input.path().join("nested")).unwrap();
    fs::copy("tests/fixtures/sample.ctm", input.path().join("a.ctm")).unwrap();
    fs::copy("tests/fixtures/sample.stm", input.path().join("nested/b.stm")).unwrap();
    fs::write(input.path().join("README"), "not an annotation").unwrap();

    pantier()
        .arg("batch")
        .arg(input.path())
        .arg(output.path())
        .args(["--to", "xra", "--jobs", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Converted 2 file(s), 0 failed, 1 skipped"));

    assert!(output.path().join("a.xra").is_file());
    assert!(output.path().join("nested/b.xra").is_file());
}

#[test]
fn batch_reports_failures() {
    let input = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    fs::write(input.path().join("broken.eaf"), "<ANNOTATION_DOCUMENT").unwrap();

    pantier()
        .arg("batch")
        .arg(input.path())
        .arg(output.path())
        .args(["--to", "xra", "--output-format", "json"])
        .env("PANTIER_JOBS", "1")
        .assert()
        .failure()
        .stdout(predicate::str::contains("broken.eaf"))
        .stderr(predicate::str::contains("1 file(s)"));
}
