//! CLI Integration Tests
//!
//! Tests for the CLI interface using assert_cmd. Documents are generated
//! PNG files so no external renderer is needed.

use assert_cmd::Command;
use image::{GrayImage, Luma};
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn proofmatch_cmd() -> Command {
    Command::new(env!("CARGO_BIN_EXE_proofmatch"))
}

/// White page with a textured content block
fn write_page(path: &Path, seed: u32) {
    let img = GrayImage::from_fn(400, 400, |x, y| {
        if (80..320).contains(&x) && (80..320).contains(&y) {
            Luma([((x * 3 + y * 5 + seed * 17) % 160) as u8])
        } else {
            Luma([255])
        }
    });
    img.save(path).unwrap();
}

/// Same layout, unrelated content
fn write_other_page(path: &Path) {
    let img = GrayImage::from_fn(400, 400, |x, y| {
        if (80..320).contains(&x) && (80..320).contains(&y) {
            Luma([if (x / 20 + y / 20) % 2 == 0 { 10 } else { 200 }])
        } else {
            Luma([255])
        }
    });
    img.save(path).unwrap();
}

/// Two folders: one matched code, one original without a proof
fn setup_folders() -> (TempDir, PathBuf, PathBuf) {
    let dir = TempDir::new().unwrap();
    let originals = dir.path().join("originals");
    let printers = dir.path().join("printers");
    std::fs::create_dir_all(&originals).unwrap();
    std::fs::create_dir_all(printers.join("nested")).unwrap();

    write_page(&originals.join("AAAAAAAA_flyer.png"), 1);
    write_page(&printers.join("nested").join("AAAAAAAA_proof.png"), 1);
    write_page(&originals.join("BBBBBBBB_card.png"), 2);

    (dir, originals, printers)
}

#[test]
fn test_help_command() {
    proofmatch_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("proofmatch"))
        .stdout(predicate::str::contains("compare"))
        .stdout(predicate::str::contains("batch"))
        .stdout(predicate::str::contains("info"));
}

#[test]
fn test_version_command() {
    proofmatch_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_info_command() {
    proofmatch_cmd()
        .arg("info")
        .assert()
        .success()
        .stdout(predicate::str::contains("System Information"))
        .stdout(predicate::str::contains("Renderers"))
        .stdout(predicate::str::contains("proofmatch.toml"));
}

#[test]
fn test_compare_missing_argument() {
    proofmatch_cmd()
        .args(["compare", "only-one.png"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("required"));
}

#[test]
fn test_compare_missing_file() {
    let dir = TempDir::new().unwrap();
    let existing = dir.path().join("AAAAAAAA.png");
    write_page(&existing, 1);

    proofmatch_cmd()
        .arg("compare")
        .arg(&existing)
        .arg(dir.path().join("missing.png"))
        .assert()
        .code(3)
        .stderr(predicate::str::contains("File not found"));
}

#[test]
fn test_compare_identical_pages() {
    let dir = TempDir::new().unwrap();
    let a = dir.path().join("AAAAAAAA_a.png");
    let b = dir.path().join("AAAAAAAA_b.png");
    write_page(&a, 3);
    write_page(&b, 3);

    proofmatch_cmd()
        .arg("compare")
        .arg(&a)
        .arg(&b)
        .assert()
        .success()
        .stdout(predicate::str::contains("Similarity: 100.00%"))
        .stdout(predicate::str::contains("CONFORMANT"));
}

#[test]
fn test_compare_json_output() {
    let dir = TempDir::new().unwrap();
    let a = dir.path().join("a.png");
    let b = dir.path().join("b.png");
    write_page(&a, 4);
    write_page(&b, 4);

    let output = proofmatch_cmd()
        .args(["compare", "--json"])
        .arg(&a)
        .arg(&b)
        .output()
        .unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["page"], 0);
    assert_eq!(report["comparison"]["status"], "scored");
    assert_eq!(report["comparison"]["conformant"], true);
}

#[test]
fn test_compare_below_threshold() {
    let dir = TempDir::new().unwrap();
    let a = dir.path().join("a.png");
    let b = dir.path().join("b.png");
    write_page(&a, 5);
    write_other_page(&b);

    proofmatch_cmd()
        .args(["compare", "--threshold", "100"])
        .arg(&a)
        .arg(&b)
        .assert()
        .code(6)
        .stdout(predicate::str::contains("NOT CONFORMANT"));
}

#[test]
fn test_compare_page_zero_rejected() {
    let dir = TempDir::new().unwrap();
    let a = dir.path().join("a.png");
    write_page(&a, 1);

    proofmatch_cmd()
        .args(["compare", "--page", "0"])
        .arg(&a)
        .arg(&a)
        .assert()
        .code(2);
}

#[test]
fn test_compare_page_out_of_range() {
    let dir = TempDir::new().unwrap();
    let a = dir.path().join("a.png");
    write_page(&a, 1);

    proofmatch_cmd()
        .args(["compare", "--page", "2"])
        .arg(&a)
        .arg(&a)
        .assert()
        .code(2)
        .stdout(predicate::str::contains("N/A"));
}

#[test]
fn test_compare_manual_region() {
    let dir = TempDir::new().unwrap();
    let a = dir.path().join("a.png");
    write_page(&a, 1);

    proofmatch_cmd()
        .args(["compare", "--original-rect", "80,80,320,320"])
        .arg(&a)
        .arg(&a)
        .assert()
        .stdout(predicate::str::contains("Original region: 80,80,320,320 (manual"));
}

#[test]
fn test_compare_config_file() {
    let dir = TempDir::new().unwrap();
    let a = dir.path().join("a.png");
    write_page(&a, 1);
    let config = dir.path().join("proofmatch.toml");
    std::fs::write(&config, "[detection]\nauto_crop = false\n").unwrap();

    proofmatch_cmd()
        .arg("--config")
        .arg(&config)
        .arg("compare")
        .arg(&a)
        .arg(&a)
        .assert()
        .success()
        .stdout(predicate::str::contains("(disabled, confidence 1.0)"));
}

#[test]
fn test_pairs_listing() {
    let (_dir, originals, printers) = setup_folders();

    proofmatch_cmd()
        .arg("pairs")
        .arg(&originals)
        .arg(&printers)
        .assert()
        .success()
        .stdout(predicate::str::contains("AAAAAAAA"))
        .stdout(predicate::str::contains("Both files"))
        .stdout(predicate::str::contains("Original only"))
        .stdout(predicate::str::contains("2 pairs, 1 matched"));
}

#[test]
fn test_pairs_matched_only() {
    let (_dir, originals, printers) = setup_folders();

    proofmatch_cmd()
        .args(["pairs", "--matched-only"])
        .arg(&originals)
        .arg(&printers)
        .assert()
        .success()
        .stdout(predicate::str::contains("Both files"))
        .stdout(predicate::str::contains("Original only").not());
}

#[test]
fn test_pairs_missing_folder() {
    let dir = TempDir::new().unwrap();

    proofmatch_cmd()
        .arg("pairs")
        .arg(dir.path().join("nope"))
        .arg(dir.path())
        .assert()
        .code(3);
}

#[test]
fn test_batch_writes_csv() {
    let (dir, originals, printers) = setup_folders();
    let report = dir.path().join("report.csv");

    proofmatch_cmd()
        .args(["batch", "-q", "--threads", "2", "-o"])
        .arg(&report)
        .arg(&originals)
        .arg(&printers)
        .assert()
        .success();

    let text = std::fs::read_to_string(&report).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(
        lines[0],
        "Code;Filename;Match;Similarity;Validation;Comment;Timestamp"
    );
    assert_eq!(lines.len(), 3);

    let matched = lines.iter().find(|l| l.starts_with("AAAAAAAA")).unwrap();
    assert!(matched.contains(";100.00;Auto-Approved;Auto-approved (Score: 100.00%);"));

    let single = lines.iter().find(|l| l.starts_with("BBBBBBBB")).unwrap();
    assert!(single.contains("Original only;N/A;Pending (0/1);"));
}

#[test]
fn test_batch_json_to_stdout() {
    let (_dir, originals, printers) = setup_folders();

    let output = proofmatch_cmd()
        .args(["batch", "-q", "--format", "json", "--no-auto-approve"])
        .arg(&originals)
        .arg(&printers)
        .output()
        .unwrap();
    assert!(output.status.success());

    let rows: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    for row in rows {
        assert!(row["Validation"].as_str().unwrap().starts_with("Pending"));
    }
}

#[test]
fn test_batch_dry_run() {
    let (_dir, originals, printers) = setup_folders();

    proofmatch_cmd()
        .args(["batch", "--dry-run", "--threshold", "92"])
        .arg(&originals)
        .arg(&printers)
        .assert()
        .success()
        .stdout(predicate::str::contains("Dry Run"))
        .stdout(predicate::str::contains("Pairs: 2 (1 matched)"))
        .stdout(predicate::str::contains("threshold 92.00%"));
}

#[test]
fn test_batch_rejects_wide_delimiter() {
    let (_dir, originals, printers) = setup_folders();

    proofmatch_cmd()
        .args(["batch", "-q", "--delimiter", "§"])
        .arg(&originals)
        .arg(&printers)
        .assert()
        .code(2);
}
