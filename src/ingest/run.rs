use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use tracing::{info, warn};

use super::discover::{SourceFile, discover_documents};
use super::extract::{TextCleaner, extract_text};
use crate::chunker::{Chunk, Chunker};
use crate::config::{ChunkingConfig, RagConfig};
use crate::embedder::{Embedder, embed_checked};
use crate::error::{RagError, RagResult};
use crate::index::{ChunkRecord, VectorIndex, metadata_path};
use crate::model::{
    DocumentRecord, INGEST_MANIFEST_VERSION, IngestCounts, IngestPaths, IngestRunManifest,
    SkippedFile,
};
use crate::util::{
    now_utc_string, sha256_file, sibling_path, utc_compact_string, write_json_pretty_atomic,
};

pub const MANIFEST_SUFFIX: &str = ".ingest.json";

pub fn manifest_path(index_path: &Path) -> PathBuf {
    sibling_path(index_path, MANIFEST_SUFFIX)
}

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub doc_dir: PathBuf,
    pub index_path: PathBuf,
    pub chunking: ChunkingConfig,
    pub allow_empty: bool,
}

impl IngestOptions {
    pub fn from_config(config: &RagConfig, allow_empty: bool) -> Self {
        Self {
            doc_dir: config.doc_dir.clone(),
            index_path: config.index_path.clone(),
            chunking: config.chunking,
            allow_empty,
        }
    }
}

/// Rebuild the index at `options.index_path` from every document in
/// `options.doc_dir`. A run that fails before the index is saved leaves the
/// previous index in place. The manifest is written after the index, so a
/// manifest write error is reported even though the new index is live.
pub fn ingest(options: &IngestOptions, embedder: &dyn Embedder) -> RagResult<IngestRunManifest> {
    let started = Utc::now();
    let run_id = format!("ingest-{}", utc_compact_string(started));
    let chunker = Chunker::new(options.chunking)?;
    let cleaner = TextCleaner::new()?;

    let discovery = discover_documents(&options.doc_dir)?;
    info!(
        run_id = %run_id,
        doc_dir = %options.doc_dir.display(),
        candidates = discovery.files.len(),
        unsupported = discovery.skipped.len(),
        "discovered documents"
    );

    let mut skipped = discovery.skipped;
    let mut warnings = Vec::new();
    let mut index = VectorIndex::new(embedder.model_id(), embedder.dimension())?
        .with_chunking(options.chunking);

    for file in &discovery.files {
        let (text, sha256) = match load_document(file, &cleaner) {
            Ok(loaded) => loaded,
            Err(err) => {
                warn!(file = %file.filename, error = %err, "skipping document");
                skipped.push(SkippedFile {
                    filename: file.filename.clone(),
                    reason: err.to_string(),
                });
                continue;
            }
        };

        let chunks = chunker.chunks(&file.filename, &text).collect::<Vec<Chunk>>();
        let texts = chunks.iter().map(|chunk| chunk.text.as_str()).collect::<Vec<_>>();
        let vectors = embed_checked(embedder, &texts)?;
        let records = chunks.iter().map(ChunkRecord::from_chunk).collect();
        let ids = index.add(vectors, records)?;

        info!(
            file = %file.filename,
            kind = file.kind.as_str(),
            chunks = chunks.len(),
            first_id = ids.start,
            "indexed document"
        );
        index.add_document(DocumentRecord {
            doc_id: file.filename.clone(),
            filename: file.filename.clone(),
            kind: file.kind,
            sha256,
            char_count: text.chars().count(),
            chunk_count: chunks.len(),
        });
    }

    if index.documents().is_empty() {
        if !options.allow_empty {
            return Err(RagError::NoDocuments {
                dir: options.doc_dir.clone(),
            });
        }
        warnings.push(format!(
            "no processable documents in {}; wrote an empty index",
            options.doc_dir.display()
        ));
    }

    index.save(&options.index_path)?;

    let manifest_path = manifest_path(&options.index_path);
    let manifest = IngestRunManifest {
        manifest_version: INGEST_MANIFEST_VERSION,
        run_id,
        build_id: index.build_id().to_string(),
        status: "completed".to_string(),
        started_at: started.to_rfc3339_opts(SecondsFormat::Secs, true),
        completed_at: now_utc_string(),
        embedding_model: index.model_id().to_string(),
        embedding_dimension: index.dimension(),
        chunk_unit: options.chunking.unit.as_str().to_string(),
        chunk_size: options.chunking.size,
        chunk_overlap: options.chunking.overlap,
        paths: IngestPaths {
            doc_dir: options.doc_dir.display().to_string(),
            index_path: options.index_path.display().to_string(),
            metadata_path: metadata_path(&options.index_path).display().to_string(),
            manifest_path: manifest_path.display().to_string(),
        },
        counts: IngestCounts {
            files_seen: discovery.seen,
            documents_processed: index.documents().len(),
            files_skipped: skipped.len(),
            chunks_indexed: index.len(),
        },
        documents: index.documents().to_vec(),
        skipped,
        warnings,
    };
    write_json_pretty_atomic(&manifest_path, &manifest)?;

    info!(
        run_id = %manifest.run_id,
        documents = manifest.counts.documents_processed,
        skipped = manifest.counts.files_skipped,
        chunks = manifest.counts.chunks_indexed,
        manifest = %manifest_path.display(),
        "ingestion completed"
    );
    Ok(manifest)
}

fn load_document(file: &SourceFile, cleaner: &TextCleaner) -> RagResult<(String, String)> {
    let sha256 = sha256_file(&file.path).map_err(|err| RagError::Extraction {
        path: file.path.clone(),
        reason: err.to_string(),
    })?;
    let text = extract_text(file, cleaner)?;
    Ok((text, sha256))
}
