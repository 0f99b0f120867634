//! End-to-end CLI tests.

use assert_cmd::Command;
use predicates::prelude::*;

fn write_script(dir: &tempfile::TempDir, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, contents).expect("write script");
    path
}

#[test]
fn check_accepts_a_valid_script() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(&dir, "story.lor", "beat Start\n  Hello there.\n");
    Command::cargo_bin("lort")
        .unwrap()
        .args(["check"])
        .arg(&script)
        .assert()
        .success();
}

#[test]
fn check_reports_errors() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(&dir, "broken.lor", "beat Start\n  -> \n");
    Command::cargo_bin("lort")
        .unwrap()
        .args(["check"])
        .arg(&script)
        .assert()
        .failure()
        .stderr(predicate::str::contains("unexpected token"));
}

#[test]
fn check_resolves_imports_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    write_script(&dir, "extras.lor", "beat Extra\n  Imported.\n");
    let script = write_script(&dir, "main.lor", "import extras\n\nbeat Main\n  -> Extra\n");
    Command::cargo_bin("lort")
        .unwrap()
        .args(["check"])
        .arg(&script)
        .assert()
        .success();
}

#[test]
fn fmt_prints_canonical_form() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(&dir, "story.lor", "beat Start { \"Hi.\" -> Start }");
    Command::cargo_bin("lort")
        .unwrap()
        .args(["fmt"])
        .arg(&script)
        .assert()
        .success()
        .stdout("beat Start\n  \"Hi.\"\n  -> Start\n");
}

#[test]
fn fmt_write_rewrites_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(&dir, "story.lor", "beat Start { \"Hi.\" }");
    Command::cargo_bin("lort")
        .unwrap()
        .args(["fmt", "--write"])
        .arg(&script)
        .assert()
        .success();
    let rewritten = std::fs::read_to_string(&script).unwrap();
    assert_eq!(rewritten, "beat Start\n  \"Hi.\"\n");
}

#[test]
fn extract_lists_text_nodes() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(
        &dir,
        "story.lor",
        "beat Start\n  The aroma fills the air.\n",
    );
    Command::cargo_bin("lort")
        .unwrap()
        .args(["extract"])
        .arg(&script)
        .assert()
        .success()
        .stdout(predicate::str::contains("The aroma fills the air."))
        .stdout(predicate::str::contains("\"id\""));
}

#[test]
fn run_plays_a_script_with_piped_choices() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(
        &dir,
        "story.lor",
        "beat Start\n  A door stands before you.\n  choice\n    Open it\n      It creaks open.\n    Walk away\n      You leave.\n",
    );
    Command::cargo_bin("lort")
        .unwrap()
        .args(["run"])
        .arg(&script)
        .write_stdin("1\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("A door stands before you."))
        .stdout(predicate::str::contains("1. Open it"))
        .stdout(predicate::str::contains("It creaks open."))
        .stdout(predicate::str::contains("(the end)"));
}

#[test]
fn run_respects_start_beat() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(
        &dir,
        "story.lor",
        "beat First\n  From the top.\n\nbeat Second\n  Skipped ahead.\n",
    );
    Command::cargo_bin("lort")
        .unwrap()
        .args(["run", "--beat", "Second"])
        .arg(&script)
        .assert()
        .success()
        .stdout(predicate::str::contains("Skipped ahead."))
        .stdout(predicate::str::contains("From the top.").not());
}
