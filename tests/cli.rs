//! CLI test cases.
//!
//! These run entirely offline. OCR tests use the `echo` engine, which returns
//! one `## Page N` block per PDF page it receives.

use std::path::Path;

use assert_cmd::Command;
use lopdf::{Object, Stream, content::Content, dictionary};
use predicates::prelude::*;

/// Create a new `Command` with our binary.
fn cmd() -> Command {
    Command::cargo_bin("doc-ocr").unwrap()
}

/// Write a PDF with `page_count` blank pages to `path`.
fn write_blank_pdf(path: &Path, page_count: usize) {
    let mut doc = lopdf::Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids = vec![];
    for _ in 0..page_count {
        let content = Content { operations: vec![] };
        let content_id =
            doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        });
        kids.push(Object::Reference(page_id));
    }
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).unwrap();
}

#[test]
fn test_help() {
    cmd().arg("--help").assert().success();
}

#[test]
fn test_version() {
    cmd().arg("--version").assert().success();
}

#[test]
fn test_normalize_stdin() {
    cmd()
        .arg("normalize")
        .arg("--max-length-change")
        .arg("1.0")
        .write_stdin("#Hello\n#Hello\n")
        .assert()
        .success()
        .stdout("# Hello\n");
}

#[test]
fn test_normalize_reverts_large_changes() {
    cmd()
        .arg("normalize")
        .write_stdin("#Hello\n#Hello\n")
        .assert()
        .success()
        .stdout("#Hello\n#Hello\n");
}

#[test]
fn test_schema() {
    cmd()
        .arg("schema")
        .arg("DocumentResult")
        .assert()
        .success()
        .stdout(predicate::str::contains("chunk_count"));
}

#[test]
fn test_split() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("scan.pdf");
    write_blank_pdf(&input, 5);
    let out_dir = dir.path().join("parts");

    cmd()
        .arg("split")
        .arg(&input)
        .arg("--out-dir")
        .arg(&out_dir)
        .arg("--pages-per-chunk")
        .arg("2")
        .assert()
        .success();

    for (n, pages) in [(1, 2), (2, 2), (3, 1)] {
        let part = lopdf::Document::load(out_dir.join(format!("scan_part_{n}.pdf"))).unwrap();
        assert_eq!(part.get_pages().len(), pages);
    }
    assert!(!out_dir.join("scan_part_4.pdf").exists());
}

#[test]
fn test_ocr_echo_chunks_long_pdf() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("long.pdf");
    write_blank_pdf(&input, 250);
    let out_dir = dir.path().join("out");

    let output = cmd()
        .arg("ocr")
        .arg(&input)
        .arg("--engine")
        .arg("echo")
        .arg("--pause")
        .arg("0")
        .arg("--pages-per-chunk")
        .arg("100")
        .arg("--out-dir")
        .arg(&out_dir)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8(output.stdout).unwrap();
    let records = stdout
        .lines()
        .map(|line| serde_json::from_str::<serde_json::Value>(line).unwrap())
        .collect::<Vec<_>>();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record["status"], "ok");
    assert_eq!(record["name"], "long");
    assert_eq!(record["page_count"], 250);
    assert_eq!(record["chunk_count"], 3);

    let text = record["text"].as_str().unwrap();
    assert!(text.starts_with("## Page 1\n\nEchoed page 1 of 100."));
    assert!(text.contains("Echoed page 100 of 100.\n\n## Page 1\n\nEchoed page 1 of 100."));
    assert!(text.ends_with("Echoed page 50 of 50."));

    for ext in ["json", "txt", "md"] {
        assert!(out_dir.join(format!("long.{ext}")).exists(), "missing .{ext}");
    }
    assert!(!out_dir.join("long.pdf").exists());
    let json = std::fs::read_to_string(out_dir.join("long.json")).unwrap();
    let json = serde_json::from_str::<serde_json::Value>(&json).unwrap();
    assert_eq!(json["ocr_result"], text);
}

#[test]
fn test_ocr_failures_exceed_allowed_rate() {
    let dir = tempfile::tempdir().unwrap();
    cmd()
        .arg("ocr")
        .arg(dir.path().join("missing.pdf"))
        .arg("--engine")
        .arg("echo")
        .arg("--pause")
        .arg("0")
        .assert()
        .failure()
        .stdout(predicate::str::contains("Error extracting result: "));
}

#[test]
fn test_ocr_requires_sources() {
    cmd()
        .arg("ocr")
        .arg("--engine")
        .arg("echo")
        .assert()
        .failure();
}

#[test]
fn test_ocr_rejects_small_chunks() {
    cmd()
        .arg("ocr")
        .arg("a.pdf")
        .arg("--pages-per-chunk")
        .arg("10")
        .assert()
        .failure();
}

#[test]
fn test_render() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.pdf");
    cmd()
        .arg("render")
        .arg("-o")
        .arg(&out)
        .write_stdin("# Title\n\n| a | b |\n| --- | --- |\n| 1 | 2 |\n")
        .assert()
        .success();
    let pdf = lopdf::Document::load(&out).unwrap();
    assert_eq!(pdf.get_pages().len(), 1);
}

#[test]
fn test_ocr_same_stem_sources_keep_separate_downloads() {
    let dir = tempfile::tempdir().unwrap();
    for (sub, pages) in [("a", 1), ("b", 2)] {
        std::fs::create_dir(dir.path().join(sub)).unwrap();
        write_blank_pdf(&dir.path().join(sub).join("report.pdf"), pages);
    }
    let out_dir = dir.path().join("out");

    let output = cmd()
        .arg("ocr")
        .arg(dir.path().join("a/report.pdf"))
        .arg(dir.path().join("b/report.pdf"))
        .arg("--engine")
        .arg("echo")
        .arg("--pause")
        .arg("0")
        .arg("--format")
        .arg("md")
        .arg("--out-dir")
        .arg(&out_dir)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let stdout = String::from_utf8(output.stdout).unwrap();
    let names = stdout
        .lines()
        .map(|line| serde_json::from_str::<serde_json::Value>(line).unwrap()["name"].clone())
        .collect::<Vec<_>>();
    assert_eq!(names, vec!["report", "report_2"]);

    let first = std::fs::read_to_string(out_dir.join("report.md")).unwrap();
    let second = std::fs::read_to_string(out_dir.join("report_2.md")).unwrap();
    assert!(first.ends_with("Echoed page 1 of 1."));
    assert!(second.ends_with("Echoed page 2 of 2."));
}

#[test]
fn test_max_length_change_must_be_non_negative() {
    cmd()
        .arg("normalize")
        .arg("--max-length-change=-0.5")
        .write_stdin("#Hello\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("non-negative"));
    cmd()
        .arg("ocr")
        .arg("a.pdf")
        .arg("--max-length-change")
        .arg("NaN")
        .assert()
        .failure();
}
