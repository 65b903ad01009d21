use anyhow::{Context, Result};
use tracing::{info, warn};

use docbot::embedder;
use docbot::ingest::{IngestOptions, ingest};

use crate::cli::IngestArgs;

pub fn run(args: IngestArgs) -> Result<()> {
    let config = args.to_config();
    config.validate().context("invalid ingestion settings")?;

    let embedder = embedder::from_config(&config.embedding)
        .context("failed to initialize the embedding model")?;
    let options = IngestOptions::from_config(&config, args.allow_empty);

    info!(
        doc_dir = %options.doc_dir.display(),
        index_path = %options.index_path.display(),
        model = embedder.model_id(),
        dimension = embedder.dimension(),
        chunk_unit = options.chunking.unit.as_str(),
        chunk_size = options.chunking.size,
        chunk_overlap = options.chunking.overlap,
        "ingest requested"
    );

    let manifest = ingest(&options, embedder.as_ref()).with_context(|| {
        format!(
            "failed to ingest documents from {}",
            options.doc_dir.display()
        )
    })?;

    for warning in &manifest.warnings {
        warn!(warning = %warning, "ingest warning");
    }

    info!(
        run_id = %manifest.run_id,
        build_id = %manifest.build_id,
        files_seen = manifest.counts.files_seen,
        documents = manifest.counts.documents_processed,
        skipped = manifest.counts.files_skipped,
        chunks = manifest.counts.chunks_indexed,
        "ingest summary"
    );
    Ok(())
}
