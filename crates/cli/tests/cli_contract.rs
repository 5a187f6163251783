use assert_cmd::cargo::cargo_bin_cmd;
use folio_engine::fixtures::DocumentBuilder;
use folio_engine::{LopdfRenderer, Renderer};
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write_pdf(dir: &Path, name: &str, builder: DocumentBuilder) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, builder.build().expect("fixture should build")).expect("fixture written");
    path
}

fn letter_pages(count: usize) -> DocumentBuilder {
    (0..count).fold(DocumentBuilder::new(), |builder, _| builder.page(612.0, 792.0))
}

fn page_count(path: &Path) -> u32 {
    let bytes = fs::read(path).expect("output should exist");
    let mut renderer = LopdfRenderer::new();
    let handle = renderer.load_document(&bytes).expect("output should parse");
    renderer.page_count(handle).expect("page count")
}

fn stdout_json(output: &[u8]) -> Value {
    serde_json::from_slice(output).expect("stdout should contain valid json")
}

#[test]
fn test_info_emits_stable_json_contract() {
    let temp = TempDir::new().expect("temp dir should be created");
    let file = write_pdf(
        temp.path(),
        "form.pdf",
        DocumentBuilder::new()
            .page(612.0, 792.0)
            .page(842.0, 595.0)
            .text_field("name", [100.0, 700.0, 300.0, 720.0], "")
            .checkbox("agree", [100.0, 650.0, 112.0, 662.0], false),
    );

    let output = cargo_bin_cmd!("folio")
        .arg("info")
        .arg(&file)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value = stdout_json(&output);
    assert_eq!(value["page_count"], 2);
    assert_eq!(value["pages"][0]["width"], 612.0);
    assert_eq!(value["pages"][1]["width"], 842.0);
    assert_eq!(value["pages"][1]["height"], 595.0);

    let fields = value["fields"].as_array().expect("fields array");
    let names: Vec<&str> = fields.iter().filter_map(|f| f["name"].as_str()).collect();
    assert!(names.contains(&"name"));
    assert!(names.contains(&"agree"));
}

#[test]
fn test_info_fails_for_missing_file() {
    let temp = TempDir::new().expect("temp dir should be created");
    cargo_bin_cmd!("folio")
        .arg("info")
        .arg(temp.path().join("missing.pdf"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("file does not exist"));
}

#[test]
fn test_info_fails_for_invalid_pdf() {
    let temp = TempDir::new().expect("temp dir should be created");
    let file = temp.path().join("invalid.pdf");
    fs::write(&file, b"not a pdf").expect("write");

    cargo_bin_cmd!("folio")
        .arg("info")
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to open PDF"));
}

#[test]
fn test_apply_writes_edited_copy_next_to_input() {
    let temp = TempDir::new().expect("temp dir should be created");
    let file = write_pdf(temp.path(), "contract.pdf", letter_pages(3));
    let original = fs::read(&file).expect("input");
    let edits = temp.path().join("edits.json");
    fs::write(
        &edits,
        r##"{
            "elements": [
                { "type": "rectangle", "page": 2, "rect": [50, 50, 100, 40] },
                { "type": "text", "page": 1, "rect": [72, 72, 200, 20], "text": "Approved" },
                { "type": "redaction", "page": 3, "rect": [10, 10, 200, 30] }
            ],
            "rotations": { "2": 90 }
        }"##,
    )
    .expect("write edits");

    let output = cargo_bin_cmd!("folio")
        .arg("apply")
        .arg(&file)
        .arg("--edits")
        .arg(&edits)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value = stdout_json(&output);
    assert_eq!(value["elements"], 3);
    assert_eq!(value["failures"].as_array().map(Vec::len), Some(0));

    let edited = temp.path().join("contract_edited.pdf");
    assert!(edited.exists());
    assert_eq!(page_count(&edited), 3);
    assert_eq!(fs::read(&file).expect("input kept"), original);
}

#[test]
fn test_apply_fills_detected_fields() {
    let temp = TempDir::new().expect("temp dir should be created");
    let file = write_pdf(
        temp.path(),
        "form.pdf",
        DocumentBuilder::new()
            .page(612.0, 792.0)
            .text_field("name", [100.0, 700.0, 300.0, 720.0], ""),
    );
    let edits = temp.path().join("edits.json");
    fs::write(&edits, r#"{ "fields": { "name": "Ada" } }"#).expect("write edits");
    let out = temp.path().join("out").join("filled.pdf");

    cargo_bin_cmd!("folio")
        .arg("apply")
        .arg(&file)
        .arg("--edits")
        .arg(&edits)
        .arg("-o")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("filled.pdf"));

    assert_eq!(page_count(&out), 1);
}

#[test]
fn test_apply_rejects_unknown_field() {
    let temp = TempDir::new().expect("temp dir should be created");
    let file = write_pdf(temp.path(), "plain.pdf", letter_pages(1));
    let edits = temp.path().join("edits.json");
    fs::write(&edits, r#"{ "fields": { "missing": "x" } }"#).expect("write edits");

    cargo_bin_cmd!("folio")
        .arg("apply")
        .arg(&file)
        .arg("--edits")
        .arg(&edits)
        .assert()
        .failure()
        .stderr(predicate::str::contains("no form field named"));
    assert!(!temp.path().join("plain_edited.pdf").exists());
}

#[test]
fn test_apply_rejects_element_on_missing_page() {
    let temp = TempDir::new().expect("temp dir should be created");
    let file = write_pdf(temp.path(), "plain.pdf", letter_pages(1));
    let edits = temp.path().join("edits.json");
    fs::write(
        &edits,
        r#"{ "elements": [ { "type": "highlight", "page": 4, "rect": [0, 0, 50, 10] } ] }"#,
    )
    .expect("write edits");

    cargo_bin_cmd!("folio")
        .arg("apply")
        .arg(&file)
        .arg("--edits")
        .arg(&edits)
        .assert()
        .failure()
        .stderr(predicate::str::contains("edit script rejected"));
}

#[test]
fn test_merge_concatenates_pages() {
    let temp = TempDir::new().expect("temp dir should be created");
    let a = write_pdf(temp.path(), "a.pdf", letter_pages(2));
    let b = write_pdf(temp.path(), "b.pdf", letter_pages(3));
    let out = temp.path().join("merged.pdf");

    cargo_bin_cmd!("folio")
        .arg("merge")
        .arg(&a)
        .arg(&b)
        .arg("-o")
        .arg(&out)
        .assert()
        .success();

    assert_eq!(page_count(&out), 5);
}

#[test]
fn test_split_extracts_ranges() {
    let temp = TempDir::new().expect("temp dir should be created");
    let file = write_pdf(temp.path(), "long.pdf", letter_pages(6));
    let out = temp.path().join("part.pdf");

    cargo_bin_cmd!("folio")
        .arg("split")
        .arg(&file)
        .arg("--pages")
        .arg("1-3,5,2")
        .arg("-o")
        .arg(&out)
        .assert()
        .success();

    assert_eq!(page_count(&out), 4);
}

#[test]
fn test_split_rejects_out_of_range_pages() {
    let temp = TempDir::new().expect("temp dir should be created");
    let file = write_pdf(temp.path(), "short.pdf", letter_pages(2));
    let out = temp.path().join("part.pdf");

    cargo_bin_cmd!("folio")
        .arg("split")
        .arg(&file)
        .arg("--pages")
        .arg("2-5")
        .arg("-o")
        .arg(&out)
        .assert()
        .failure();

    assert!(!out.exists());
}

#[test]
fn test_version_prints_package_version() {
    cargo_bin_cmd!("folio")
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}
