use std::fs;

use anyhow::{Context, Result};
use tracing::{info, warn};

use docbot::index::{VectorIndex, metadata_path};
use docbot::ingest::manifest_path;
use docbot::model::IngestRunManifest;

use crate::cli::StatusArgs;

pub fn run(args: StatusArgs) -> Result<()> {
    let index_path = args.index.index_path;
    let metadata_path = metadata_path(&index_path);
    let manifest_path = manifest_path(&index_path);

    info!(index_path = %index_path.display(), "status requested");

    if index_path.exists() && metadata_path.exists() {
        match VectorIndex::load(&index_path, None) {
            Ok(index) => {
                let chunking = index.chunking();
                info!(
                    model = index.model_id(),
                    dimension = index.dimension(),
                    entries = index.len(),
                    documents = index.documents().len(),
                    build_id = index.build_id(),
                    created_at = index.created_at(),
                    chunk_unit = chunking.map(|value| value.unit.as_str()).unwrap_or_default(),
                    chunk_size = chunking.map(|value| value.size).unwrap_or_default(),
                    chunk_overlap = chunking.map(|value| value.overlap).unwrap_or_default(),
                    "index loaded"
                );
            }
            Err(err) => {
                warn!(
                    kind = err.kind(),
                    error = %err,
                    guidance = err.guidance().unwrap_or_default(),
                    "index unusable"
                );
            }
        }
    } else {
        warn!(
            vectors = %index_path.display(),
            vectors_present = index_path.exists(),
            metadata = %metadata_path.display(),
            metadata_present = metadata_path.exists(),
            "index missing; run ingestion first"
        );
    }

    if manifest_path.exists() {
        let raw = fs::read(&manifest_path)
            .with_context(|| format!("failed to read {}", manifest_path.display()))?;
        let manifest: IngestRunManifest = serde_json::from_slice(&raw)
            .with_context(|| format!("failed to parse {}", manifest_path.display()))?;

        info!(
            run_id = %manifest.run_id,
            build_id = %manifest.build_id,
            status = %manifest.status,
            started_at = %manifest.started_at,
            completed_at = %manifest.completed_at,
            doc_dir = %manifest.paths.doc_dir,
            files_seen = manifest.counts.files_seen,
            documents = manifest.counts.documents_processed,
            skipped = manifest.counts.files_skipped,
            chunks = manifest.counts.chunks_indexed,
            "loaded ingest manifest"
        );
        for skipped in &manifest.skipped {
            info!(file = %skipped.filename, reason = %skipped.reason, "skipped during last ingest");
        }
    } else {
        warn!(path = %manifest_path.display(), "ingest manifest missing");
    }

    Ok(())
}
