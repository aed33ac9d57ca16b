//! End-to-end runs of the `record-patch` binary against temporary documents.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use predicates::prelude::*;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

const DOCUMENT: &str = "val questions = listOf(\n    Question(\"qu_x_1\", \"qu_x\", \"old text\", 1),\n    Question(\"qu_x_2\", \"qu_x\", \"Other\", 2),\n)\n";

fn record_patch() -> Result<assert_cmd::Command> {
    let mut cmd = assert_cmd::Command::cargo_bin("record-patch")?;
    cmd.env("RUST_LOG", "warn");
    Ok(cmd)
}

fn write(dir: &Path, name: &str, contents: &str) -> Result<PathBuf> {
    let path = dir.join(name);
    fs::write(&path, contents)?;
    Ok(path)
}

#[test]
fn patch_replaces_only_the_named_record() -> Result<()> {
    let dir = TempDir::new()?;
    let document = write(dir.path(), "Questions.kt", DOCUMENT)?;
    let batch = write(
        dir.path(),
        "batch.json",
        r#"[{"identifier": "qu_x_1", "category": "qu_x", "content": "new text"}]"#,
    )?;

    record_patch()?
        .arg("patch")
        .arg(&document)
        .arg("--batch")
        .arg(&batch)
        .assert()
        .success()
        .stdout(predicate::str::contains("Updated qu_x_1 (#1)"))
        .stdout(predicate::str::contains("1 changed, 0 unchanged, 0 skipped"));

    assert_eq!(
        fs::read_to_string(&document)?,
        DOCUMENT.replace("\"old text\"", "\"new text\"")
    );
    Ok(())
}

#[test]
fn patch_normalizes_batch_content() -> Result<()> {
    let dir = TempDir::new()?;
    let document = write(dir.path(), "Questions.kt", DOCUMENT)?;
    let batch = write(
        dir.path(),
        "batch.json",
        r#"{"passes": [[{"identifier": "qu_x_2", "category": "qu_x", "content": "Yes — no"}]]}"#,
    )?;

    record_patch()?
        .args(["patch", "--batch"])
        .arg(&batch)
        .arg(&document)
        .assert()
        .success();

    let text = fs::read_to_string(&document)?;
    assert!(text.contains("Question(\"qu_x_2\", \"qu_x\", \"Yes - no\", 1)"));
    assert!(text.contains("Question(\"qu_x_1\", \"qu_x\", \"old text\", 1)"));
    Ok(())
}

#[test]
fn no_normalize_keeps_punctuation() -> Result<()> {
    let dir = TempDir::new()?;
    let document = write(dir.path(), "Questions.kt", DOCUMENT)?;
    let batch = write(
        dir.path(),
        "batch.json",
        r#"[{"identifier": "qu_x_1", "category": "qu_x", "content": "a → b"}]"#,
    )?;

    record_patch()?
        .arg("patch")
        .arg(&document)
        .arg("--batch")
        .arg(&batch)
        .arg("--no-normalize")
        .assert()
        .success();

    assert!(fs::read_to_string(&document)?.contains("\"a → b\""));
    Ok(())
}

#[test]
fn normalize_rewrites_typographic_dash() -> Result<()> {
    let dir = TempDir::new()?;
    let document = write(
        dir.path(),
        "Questions.kt",
        "Question(\"a_1\", \"a\", \"Self-reliance — a virtue\", 1)\n",
    )?;

    record_patch()?
        .arg("normalize")
        .arg(&document)
        .assert()
        .success()
        .stdout(predicate::str::contains("Normalized a_1"));

    assert_eq!(
        fs::read_to_string(&document)?,
        "Question(\"a_1\", \"a\", \"Self-reliance - a virtue\", 1)\n"
    );
    Ok(())
}

#[test]
fn repair_collapses_duplicated_closing() -> Result<()> {
    let dir = TempDir::new()?;
    let document = write(
        dir.path(),
        "Questions.kt",
        "listOf(\n    Question(\"a_1\", \"a\", \"Text\", 1), stale tail\", 1),\n)\n",
    )?;

    record_patch()?
        .arg("repair")
        .arg(&document)
        .assert()
        .success()
        .stdout(predicate::str::contains("Repaired a_1"));

    assert_eq!(
        fs::read_to_string(&document)?,
        "listOf(\n    Question(\"a_1\", \"a\", \"Text\", 1),\n)\n"
    );
    Ok(())
}

#[test]
fn dry_run_writes_nothing() -> Result<()> {
    let dir = TempDir::new()?;
    let original = "Question(\"a_1\", \"a\", \"x … y\", 1)\n";
    let document = write(dir.path(), "Questions.kt", original)?;

    record_patch()?
        .arg("--dry-run")
        .arg("normalize")
        .arg(&document)
        .assert()
        .success()
        .stdout(predicate::str::contains("dry run"));

    assert_eq!(fs::read_to_string(&document)?, original);
    Ok(())
}

#[test]
fn strict_missing_identifier_fails_without_writing() -> Result<()> {
    let dir = TempDir::new()?;
    let document = write(dir.path(), "Questions.kt", DOCUMENT)?;
    let batch = write(
        dir.path(),
        "batch.json",
        r#"[
            {"identifier": "qu_x_1", "category": "qu_x", "content": "changed"},
            {"identifier": "qu_gone_1", "category": "qu_gone", "content": "absent"}
        ]"#,
    )?;

    record_patch()?
        .arg("--strict")
        .arg("patch")
        .arg(&document)
        .arg("--batch")
        .arg(&batch)
        .assert()
        .failure()
        .stderr(predicate::str::contains("strict mode"))
        .stderr(predicate::str::contains("qu_gone_1"));

    assert_eq!(fs::read_to_string(&document)?, DOCUMENT);
    Ok(())
}

#[test]
fn missing_identifier_is_a_warning_by_default() -> Result<()> {
    let dir = TempDir::new()?;
    let document = write(dir.path(), "Questions.kt", DOCUMENT)?;
    let batch = write(
        dir.path(),
        "batch.json",
        r#"[{"identifier": "qu_gone_1", "category": "qu_gone", "content": "absent"}]"#,
    )?;

    record_patch()?
        .arg("patch")
        .arg(&document)
        .arg("--batch")
        .arg(&batch)
        .assert()
        .success()
        .stdout(predicate::str::contains("warning:"))
        .stdout(predicate::str::contains("0 changed, 0 unchanged, 1 skipped"));

    assert_eq!(fs::read_to_string(&document)?, DOCUMENT);
    Ok(())
}

#[test]
fn malformed_batch_is_rejected() -> Result<()> {
    let dir = TempDir::new()?;
    let document = write(dir.path(), "Questions.kt", DOCUMENT)?;
    let batch = write(dir.path(), "batch.json", r#"[{"identifier": "qu_x_1"}]"#)?;

    record_patch()?
        .arg("patch")
        .arg(&document)
        .arg("--batch")
        .arg(&batch)
        .assert()
        .failure();

    assert_eq!(fs::read_to_string(&document)?, DOCUMENT);
    Ok(())
}

#[test]
fn missing_document_fails() -> Result<()> {
    let dir = TempDir::new()?;

    record_patch()?
        .arg("normalize")
        .arg(dir.path().join("absent.kt"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("absent.kt"));
    Ok(())
}

#[test]
fn check_reports_problems_with_exit_status() -> Result<()> {
    let dir = TempDir::new()?;
    let clean = write(dir.path(), "Clean.kt", DOCUMENT)?;
    let dirty = write(
        dir.path(),
        "Dirty.kt",
        "Question(\"a_1\", \"a\", \"One\", 1),\nQuestion(\"a_1\", \"a\", \"Two\", 2),\n",
    )?;

    record_patch()?
        .arg("check")
        .arg(&clean)
        .assert()
        .success()
        .stdout(predicate::str::contains("ok (2 records)"));

    record_patch()?
        .arg("check")
        .arg(&clean)
        .arg(&dirty)
        .assert()
        .failure()
        .stdout(predicate::str::contains("identifier 'a_1' appears 2 times"))
        .stdout(predicate::str::contains("1 duplicate"));
    Ok(())
}

#[test]
fn config_file_sets_marker() -> Result<()> {
    let dir = TempDir::new()?;
    let config = write(dir.path(), "record-patch.toml", "marker = \"Item\"\n")?;
    let document = write(
        dir.path(),
        "Items.kt",
        "Item(\"i_1\", \"i\", \"“quoted”\", 1)\nQuestion(\"q_1\", \"q\", \"plain — text\", 1)\n",
    )?;

    record_patch()?
        .arg("--config")
        .arg(&config)
        .arg("normalize")
        .arg(&document)
        .assert()
        .success()
        .stdout(predicate::str::contains("Normalized i_1"))
        .stdout(predicate::str::contains("q_1").not());

    let text = fs::read_to_string(&document)?;
    assert!(text.starts_with("Item(\"i_1\", \"i\", \"\\\"quoted\\\"\", 1)"));
    // Not a record under this marker, so it is normalized as plain text.
    assert!(text.contains("Question(\"q_1\", \"q\", \"plain - text\", 1)"));
    Ok(())
}

#[test]
fn invalid_config_fails() -> Result<()> {
    let dir = TempDir::new()?;
    let config = write(dir.path(), "record-patch.toml", "marker = \"not a name\"\n")?;
    let document = write(dir.path(), "Questions.kt", DOCUMENT)?;

    record_patch()?
        .arg("--config")
        .arg(&config)
        .arg("normalize")
        .arg(&document)
        .assert()
        .failure();
    Ok(())
}
