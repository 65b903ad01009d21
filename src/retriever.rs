use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::embedder::{Embedder, embed_query};
use crate::error::{RagError, RagResult};
use crate::index::{ChunkRecord, IndexExpectation, VectorIndex};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    pub id: usize,
    pub distance: f32,
    pub record: ChunkRecord,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub hits: Vec<RetrievedChunk>,
    pub degraded: Option<String>,
}

impl RetrievalResult {
    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }
}

pub struct Retriever {
    index: VectorIndex,
    embedder: Arc<dyn Embedder>,
}

impl Retriever {
    pub fn open(index_path: &Path, embedder: Arc<dyn Embedder>) -> RagResult<Self> {
        let expected = IndexExpectation::of(embedder.as_ref());
        let index = VectorIndex::load(index_path, Some(&expected))?;
        Ok(Self { index, embedder })
    }

    pub fn from_index(index: VectorIndex, embedder: Arc<dyn Embedder>) -> RagResult<Self> {
        if index.model_id() != embedder.model_id() || index.dimension() != embedder.dimension() {
            return Err(RagError::configuration(format!(
                "index model '{}' ({}) does not match embedder '{}' ({})",
                index.model_id(),
                index.dimension(),
                embedder.model_id(),
                embedder.dimension()
            )));
        }
        Ok(Self { index, embedder })
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn retrieve(&self, query: &str, k: usize) -> RagResult<RetrievalResult> {
        if k == 0 || self.index.is_empty() {
            return Ok(RetrievalResult::default());
        }

        let embedding = embed_query(self.embedder.as_ref(), query);
        if let Some(reason) = &embedding.degraded {
            warn!(reason = %reason, "answering in degraded mode with a zero query vector");
        }

        let mut result = self.search_vector(&embedding.vector, k)?;
        result.degraded = embedding.degraded;
        Ok(result)
    }

    pub fn search_vector(&self, vector: &[f32], k: usize) -> RagResult<RetrievalResult> {
        let hits = self
            .index
            .search_records(vector, k)?
            .into_iter()
            .map(|(id, distance, record)| RetrievedChunk {
                id,
                distance,
                record: record.clone(),
            })
            .collect::<Vec<_>>();

        debug!(
            hits = hits.len(),
            best = hits.first().map(|hit| hit.distance),
            "retrieval complete"
        );
        Ok(RetrievalResult {
            hits,
            degraded: None,
        })
    }
}
