use std::fs;
use std::process::Command;

use askdocs::VectorStore;
use pretty_assertions::assert_eq;

#[test]
fn upgrade_store_consolidates_legacy_fragments() {
    let legacy = tempfile::tempdir().unwrap();
    let output = tempfile::tempdir().unwrap();
    fs::write(
        legacy.path().join("embed_notes.txt_1.json"),
        r#"{"text":"second","embeddings":[0.0,1.0],"sourceFileName":"notes.txt"}"#,
    )
    .unwrap();
    fs::write(
        legacy.path().join("embed_notes.txt_0.json"),
        r#"{"text":"first","embeddings":{"data":[{"embedding":[1.0,0.0]}]},"sourceFileName":"notes.txt"}"#,
    )
    .unwrap();

    let status = Command::new(env!("CARGO_BIN_EXE_upgrade_store"))
        .arg("--legacy-dir")
        .arg(legacy.path())
        .arg("--output-dir")
        .arg(output.path())
        .env("ASKDOCS_LOG", "warn")
        .status()
        .expect("run upgrade_store");
    assert!(status.success());

    let store = VectorStore::new(output.path());
    let corpus = store.load_all().unwrap();
    assert_eq!(corpus.records.len(), 1);
    let record = &corpus.records[0];
    assert_eq!(record.source_name, "notes.txt");
    let texts: Vec<_> = record.fragments.iter().map(|f| f.text.as_str()).collect();
    assert_eq!(texts, ["first", "second"]);
    assert!(output.path().join("embed_notes.txt.json").is_file());
}

#[test]
fn upgrade_store_fails_on_missing_directory() {
    let scratch = tempfile::tempdir().unwrap();
    let status = Command::new(env!("CARGO_BIN_EXE_upgrade_store"))
        .arg("--legacy-dir")
        .arg(scratch.path().join("absent"))
        .arg("--output-dir")
        .arg(scratch.path().join("out"))
        .status()
        .expect("run upgrade_store");
    assert!(!status.success());
}
