mod flat;
mod metadata;
mod store;


use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::chunker::Chunk;
use crate::config::ChunkingConfig;
use crate::embedder::Embedder;
use crate::error::{RagError, RagResult};
use crate::model::DocumentRecord;
use crate::util::{
    ensure_parent_directory, now_utc_string, remove_if_exists, sha256_hex, sibling_path,
    temp_sibling, utc_compact_string, write_synced,
};

pub const METADATA_SUFFIX: &str = ".meta.sqlite";

pub fn metadata_path(index_path: &Path) -> PathBuf {
    sibling_path(index_path, METADATA_SUFFIX)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub doc_id: String,
    pub title: String,
    pub seq: usize,
    pub text: String,
    pub byte_start: usize,
    pub byte_end: usize,
}

impl ChunkRecord {
    pub fn from_chunk(chunk: &Chunk) -> Self {
        Self {
            doc_id: chunk.doc_id.clone(),
            title: format!("{} - chunk {}", chunk.doc_id, chunk.seq),
            seq: chunk.seq,
            text: chunk.text.clone(),
            byte_start: chunk.span.start,
            byte_end: chunk.span.end,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexExpectation {
    pub model_id: String,
    pub dimension: usize,
}

impl IndexExpectation {
    pub fn of(embedder: &dyn Embedder) -> Self {
        Self {
            model_id: embedder.model_id().to_string(),
            dimension: embedder.dimension(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VectorIndex {
    build_id: String,
    model_id: String,
    dimension: usize,
    created_at: String,
    chunking: Option<ChunkingConfig>,
    vectors: Vec<f32>,
    records: Vec<ChunkRecord>,
    documents: Vec<DocumentRecord>,
}

impl VectorIndex {
    pub fn new(model_id: &str, dimension: usize) -> RagResult<Self> {
        if dimension == 0 {
            return Err(RagError::configuration("index dimension must be at least 1"));
        }

        let created_at = now_utc_string();
        Ok(Self {
            build_id: new_build_id(model_id),
            model_id: model_id.to_string(),
            dimension,
            created_at,
            chunking: None,
            vectors: Vec::new(),
            records: Vec::new(),
            documents: Vec::new(),
        })
    }

    pub fn with_chunking(mut self, chunking: ChunkingConfig) -> Self {
        self.chunking = Some(chunking);
        self
    }

    pub fn add(
        &mut self,
        vectors: Vec<Vec<f32>>,
        records: Vec<ChunkRecord>,
    ) -> RagResult<Range<usize>> {
        if vectors.len() != records.len() {
            return Err(RagError::InvalidRequest(format!(
                "{} vectors supplied for {} records",
                vectors.len(),
                records.len()
            )));
        }
        if let Some(bad) = vectors.iter().find(|vector| vector.len() != self.dimension) {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: bad.len(),
            });
        }

        let start = self.records.len();
        self.vectors.reserve(vectors.len() * self.dimension);
        for vector in vectors {
            self.vectors.extend(vector);
        }
        self.records.extend(records);
        Ok(start..self.records.len())
    }

    pub fn add_document(&mut self, document: DocumentRecord) {
        self.documents.push(document);
    }

    pub fn search(&self, query: &[f32], k: usize) -> RagResult<Vec<(usize, f32)>> {
        if query.len() != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }
        Ok(flat::nearest(&self.vectors, self.dimension, query, k))
    }

    pub fn search_records(
        &self,
        query: &[f32],
        k: usize,
    ) -> RagResult<Vec<(usize, f32, &ChunkRecord)>> {
        let ranked = self.search(query, k)?;
        Ok(ranked
            .into_iter()
            .map(|(id, distance)| (id, distance, &self.records[id]))
            .collect())
    }

    pub fn record(&self, id: usize) -> Option<&ChunkRecord> {
        self.records.get(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    pub fn build_id(&self) -> &str {
        &self.build_id
    }

    pub fn created_at(&self) -> &str {
        &self.created_at
    }

    pub fn chunking(&self) -> Option<ChunkingConfig> {
        self.chunking
    }

    pub fn documents(&self) -> &[DocumentRecord] {
        &self.documents
    }

    /// Both files are staged as temporary siblings, then renamed into place.
    /// If the second rename fails the previous metadata file is restored, so
    /// an earlier index pair stays loadable.
    pub fn save(&self, index_path: &Path) -> RagResult<()> {
        ensure_parent_directory(index_path)?;
        let meta_path = metadata_path(index_path);
        let vector_temp = temp_sibling(index_path);
        let meta_temp = temp_sibling(&meta_path);

        let committed = self
            .stage(&vector_temp, &meta_temp)
            .and_then(|()| commit(&vector_temp, &meta_temp, index_path, &meta_path));
        if let Err(err) = committed {
            remove_if_exists(&vector_temp);
            remove_if_exists(&meta_temp);
            return Err(err);
        }

        info!(
            index_path = %index_path.display(),
            build_id = %self.build_id,
            model = %self.model_id,
            dimension = self.dimension,
            entries = self.len(),
            "vector index saved"
        );
        Ok(())
    }

    fn stage(&self, vector_temp: &Path, meta_temp: &Path) -> RagResult<()> {
        let bytes = store::encode(&self.build_id, &self.model_id, self.dimension, &self.vectors)?;
        write_synced(vector_temp, &bytes)?;
        metadata::write(meta_temp, self)
    }

    pub fn load(index_path: &Path, expected: Option<&IndexExpectation>) -> RagResult<Self> {
        let meta_path = metadata_path(index_path);
        for path in [index_path, meta_path.as_path()] {
            if !path.is_file() {
                return Err(RagError::IndexNotFound {
                    path: path.to_path_buf(),
                });
            }
        }

        let bytes = fs::read(index_path)?;
        let file = store::decode(index_path, &bytes)?;
        let stored = metadata::read(&meta_path)?;

        if stored.build_id != file.build_id {
            return Err(RagError::index_corrupt(
                index_path,
                format!(
                    "vector file (build {}) and metadata (build {}) come from different builds",
                    file.build_id, stored.build_id
                ),
            ));
        }
        if stored.model_id != file.model_id || stored.dimension != file.dimension {
            return Err(RagError::index_corrupt(
                index_path,
                "vector file and metadata disagree on model or dimension",
            ));
        }
        if stored.records.len() != file.count || stored.entry_count != file.count {
            return Err(RagError::index_corrupt(
                index_path,
                format!(
                    "vector file holds {} entries but metadata lists {}",
                    file.count,
                    stored.records.len()
                ),
            ));
        }
        if file.dimension == 0 {
            return Err(RagError::index_corrupt(index_path, "dimension is zero"));
        }

        if let Some(expected) = expected
            && (expected.model_id != file.model_id || expected.dimension != file.dimension)
        {
            return Err(RagError::index_corrupt(
                index_path,
                format!(
                    "index was built with model '{}' (dimension {}) but the configured embedder is '{}' (dimension {}); re-ingest with matching model",
                    file.model_id, file.dimension, expected.model_id, expected.dimension
                ),
            ));
        }

        info!(
            index_path = %index_path.display(),
            build_id = %file.build_id,
            model = %file.model_id,
            entries = file.count,
            "vector index loaded"
        );

        Ok(Self {
            build_id: file.build_id,
            model_id: file.model_id,
            dimension: file.dimension,
            created_at: stored.created_at,
            chunking: stored.chunking,
            vectors: file.vectors,
            records: stored.records,
            documents: stored.documents,
        })
    }
}

fn new_build_id(model_id: &str) -> String {
    static SEQUENCE: AtomicU64 = AtomicU64::new(0);

    let now = Utc::now();
    let seed = format!(
        "{}:{}:{}:{}",
        now.timestamp_nanos_opt().unwrap_or_default(),
        std::process::id(),
        SEQUENCE.fetch_add(1, Ordering::Relaxed),
        model_id
    );
    format!(
        "{}-{}",
        utc_compact_string(now),
        &sha256_hex(seed.as_bytes())[..12]
    )
}

fn commit(
    vector_temp: &Path,
    meta_temp: &Path,
    index_path: &Path,
    meta_path: &Path,
) -> RagResult<()> {
    let backup = sibling_path(meta_path, &format!(".prev-{}", std::process::id()));
    let had_previous = meta_path.is_file();
    if had_previous {
        fs::rename(meta_path, &backup)?;
    }

    let swapped = fs::rename(meta_temp, meta_path).and_then(|()| fs::rename(vector_temp, index_path));
    if let Err(err) = swapped {
        if had_previous {
            if let Err(restore) = fs::rename(&backup, meta_path) {
                warn!(
                    path = %meta_path.display(),
                    error = %restore,
                    "failed to restore previous index metadata"
                );
            }
        } else {
            remove_if_exists(meta_path);
        }
        return Err(err.into());
    }

    if had_previous {
        remove_if_exists(&backup);
    }
    Ok(())
}
