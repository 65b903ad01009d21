use std::fs;
use std::path::Path;

use super::*;
use crate::config::{ChunkUnit, ChunkingConfig};
use crate::embedder::test_support::FailingEmbedder;
use crate::embedder::{Embedder, LocalHashEmbedder};
use crate::index::{IndexExpectation, VectorIndex, metadata_path};
use crate::model::IngestRunManifest;
use crate::util::temp_sibling;

fn embedder() -> LocalHashEmbedder {
    LocalHashEmbedder::new("local-hash-v1").unwrap()
}

fn options(doc_dir: &Path, index_path: &Path) -> IngestOptions {
    IngestOptions {
        doc_dir: doc_dir.to_path_buf(),
        index_path: index_path.to_path_buf(),
        chunking: ChunkingConfig {
            unit: ChunkUnit::Chars,
            size: 800,
            overlap: 100,
        },
        allow_empty: false,
    }
}

fn text_of_len(seed: &str, len: usize) -> String {
    seed.chars().cycle().take(len).collect()
}

#[test]
fn single_long_file_yields_three_chunks_and_is_retrievable() {
    let dir = tempfile::tempdir().unwrap();
    let docs = dir.path().join("docs");
    fs::create_dir(&docs).unwrap();
    let text = text_of_len(
        "The ingres lock manager escalates page locks to table locks when maxlocks is reached. ",
        2000,
    );
    assert_eq!(text.chars().count(), 2000);
    fs::write(docs.join("locking.txt"), &text).unwrap();

    let index_path = dir.path().join("index").join("docs.index");
    let embedder = embedder();
    let manifest = ingest(&options(&docs, &index_path), &embedder).unwrap();

    assert_eq!(manifest.counts.documents_processed, 1);
    assert_eq!(manifest.counts.chunks_indexed, 3);
    assert_eq!(manifest.documents[0].chunk_count, 3);
    assert_eq!(manifest.documents[0].char_count, 2000);

    let index = VectorIndex::load(&index_path, Some(&IndexExpectation::of(&embedder))).unwrap();
    assert_eq!(index.len(), 3);
    assert_eq!(index.record(1).unwrap().title, "locking.txt - chunk 1");
    assert_eq!(index.record(1).unwrap().byte_start, 700);

    let query = embedder.embed("lock manager escalates page locks").unwrap();
    let hits = index.search(&query, 4).unwrap();
    assert_eq!(hits.len(), 3);
    assert_eq!(index.record(hits[0].0).unwrap().doc_id, "locking.txt");
}

#[test]
fn unique_content_ranks_its_own_document_first() {
    let dir = tempfile::tempdir().unwrap();
    let docs = dir.path().join("docs");
    fs::create_dir(&docs).unwrap();
    fs::write(
        docs.join("backup.md"),
        "Use ckpdb to take an online checkpoint of the database and journal files.",
    )
    .unwrap();
    fs::write(
        docs.join("network.txt"),
        "Configure the Ingres Net listen address and the remote vnode login entries.",
    )
    .unwrap();

    let index_path = dir.path().join("docs.index");
    let embedder = embedder();
    ingest(&options(&docs, &index_path), &embedder).unwrap();

    let index = VectorIndex::load(&index_path, None).unwrap();
    let query = embedder.embed("remote vnode login entries").unwrap();
    let hits = index.search(&query, 2).unwrap();
    assert_eq!(index.record(hits[0].0).unwrap().doc_id, "network.txt");
}

#[test]
fn unsupported_and_unreadable_files_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let docs = dir.path().join("docs");
    fs::create_dir(&docs).unwrap();
    fs::write(docs.join("guide.txt"), "Sysmod rebuilds the system catalogs.").unwrap();
    fs::write(docs.join("diagram.png"), [0x89, b'P', b'N', b'G']).unwrap();
    fs::write(docs.join("latin1.txt"), [0x63, 0x61, 0x66, 0xe9]).unwrap();
    fs::write(docs.join("blank.md"), "   \n\n  ").unwrap();
    fs::write(docs.join("broken.pdf"), b"not really a pdf").unwrap();
    fs::write(docs.join(".hidden.txt"), "ignored entirely").unwrap();
    fs::create_dir(docs.join("nested")).unwrap();

    let index_path = dir.path().join("docs.index");
    let manifest = ingest(&options(&docs, &index_path), &embedder()).unwrap();

    assert_eq!(manifest.counts.documents_processed, 1);
    assert_eq!(manifest.counts.files_seen, 5);
    let skipped = manifest
        .skipped
        .iter()
        .map(|file| file.filename.as_str())
        .collect::<Vec<_>>();
    assert_eq!(
        skipped,
        vec!["diagram.png", "blank.md", "broken.pdf", "latin1.txt"]
    );
    assert_eq!(manifest.skipped[0].reason, "unsupported file type");
}

#[test]
fn zero_documents_fails_and_keeps_previous_index() {
    let dir = tempfile::tempdir().unwrap();
    let docs = dir.path().join("docs");
    let empty = dir.path().join("empty");
    fs::create_dir(&docs).unwrap();
    fs::create_dir(&empty).unwrap();
    fs::write(docs.join("guide.txt"), "Optimizedb collects column statistics.").unwrap();

    let index_path = dir.path().join("docs.index");
    let embedder = embedder();
    let first = ingest(&options(&docs, &index_path), &embedder).unwrap();

    let err = ingest(&options(&empty, &index_path), &embedder).unwrap_err();
    assert_eq!(err.kind(), "no_documents");

    let index = VectorIndex::load(&index_path, None).unwrap();
    assert_eq!(index.build_id(), first.build_id);
    assert_eq!(index.len(), 1);
}

#[test]
fn allow_empty_writes_an_empty_index() {
    let dir = tempfile::tempdir().unwrap();
    let docs = dir.path().join("docs");
    fs::create_dir(&docs).unwrap();

    let index_path = dir.path().join("docs.index");
    let mut opts = options(&docs, &index_path);
    opts.allow_empty = true;
    let manifest = ingest(&opts, &embedder()).unwrap();

    assert_eq!(manifest.counts.chunks_indexed, 0);
    assert_eq!(manifest.warnings.len(), 1);
    assert!(VectorIndex::load(&index_path, None).unwrap().is_empty());
}

#[test]
fn embedding_failure_leaves_previous_index_intact() {
    let dir = tempfile::tempdir().unwrap();
    let docs = dir.path().join("docs");
    fs::create_dir(&docs).unwrap();
    fs::write(docs.join("guide.txt"), "Rollforwarddb replays journals.").unwrap();

    let index_path = dir.path().join("docs.index");
    let first = ingest(&options(&docs, &index_path), &embedder()).unwrap();

    let failing = FailingEmbedder::like("local-hash-v1", 384);
    let err = ingest(&options(&docs, &index_path), &failing).unwrap_err();
    assert_eq!(err.kind(), "model_unavailable");

    let index = VectorIndex::load(&index_path, None).unwrap();
    assert_eq!(index.build_id(), first.build_id);
    assert!(!temp_sibling(&index_path).exists());
    assert!(!temp_sibling(&metadata_path(&index_path)).exists());
}

#[test]
fn missing_doc_dir_is_configuration_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = ingest(
        &options(&dir.path().join("nope"), &dir.path().join("docs.index")),
        &embedder(),
    )
    .unwrap_err();
    assert_eq!(err.kind(), "configuration_error");
}

#[test]
fn manifest_is_written_next_to_index() {
    let dir = tempfile::tempdir().unwrap();
    let docs = dir.path().join("docs");
    fs::create_dir(&docs).unwrap();
    fs::write(docs.join("guide.txt"), "Auditdb reports journal activity.").unwrap();

    let index_path = dir.path().join("docs.index");
    let manifest = ingest(&options(&docs, &index_path), &embedder()).unwrap();

    let on_disk: IngestRunManifest =
        serde_json::from_slice(&fs::read(manifest_path(&index_path)).unwrap()).unwrap();
    assert_eq!(on_disk.build_id, manifest.build_id);
    assert_eq!(on_disk.embedding_model, "local-hash-v1");
    assert_eq!(on_disk.embedding_dimension, 384);
    assert_eq!(on_disk.chunk_unit, "chars");
    assert_eq!(on_disk.documents[0].sha256.len(), 64);
}
