use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::config::EmbeddingConfig;
use crate::error::{RagError, RagResult};
use crate::http::JsonEndpoint;

const LOCAL_MODELS: &[(&str, usize)] = &[
    ("local-hash-v1", 384),
    ("local-hash-v1-768", 768),
    ("local-hash-v1-1536", 1536),
];

pub trait Embedder: Send + Sync {
    fn model_id(&self) -> &str;

    fn dimension(&self) -> usize;

    fn embed_batch(&self, texts: &[&str]) -> RagResult<Vec<Vec<f32>>>;

    fn embed(&self, text: &str) -> RagResult<Vec<f32>> {
        let mut vectors = embed_checked(self, &[text])?;
        vectors
            .pop()
            .ok_or_else(|| RagError::model_unavailable(self.model_id(), "backend returned no vector"))
    }
}

pub fn embed_checked<E>(embedder: &E, texts: &[&str]) -> RagResult<Vec<Vec<f32>>>
where
    E: Embedder + ?Sized,
{
    let vectors = embedder.embed_batch(texts)?;
    check_batch(embedder.model_id(), embedder.dimension(), texts.len(), vectors)
}

fn check_batch(
    model_id: &str,
    dimension: usize,
    expected: usize,
    vectors: Vec<Vec<f32>>,
) -> RagResult<Vec<Vec<f32>>> {
    if vectors.len() != expected {
        return Err(RagError::model_unavailable(
            model_id,
            format!("expected {expected} vectors, backend returned {}", vectors.len()),
        ));
    }
    if let Some(bad) = vectors.iter().find(|vector| vector.len() != dimension) {
        return Err(RagError::DimensionMismatch {
            expected: dimension,
            actual: bad.len(),
        });
    }
    Ok(vectors)
}

pub fn local_model_dimension(model_id: &str) -> Option<usize> {
    LOCAL_MODELS
        .iter()
        .find(|(id, _)| *id == model_id)
        .map(|(_, dimension)| *dimension)
}

pub fn from_config(config: &EmbeddingConfig) -> RagResult<Box<dyn Embedder>> {
    let model_id = config.model_id.trim();
    match &config.endpoint {
        Some(endpoint) => {
            let dimension = config.dimension.ok_or_else(|| {
                RagError::configuration("a remote embedding endpoint requires a dimension")
            })?;
            let embedder = HttpEmbedder::new(
                JsonEndpoint::new(endpoint, model_id, config.api_key.clone(), config.timeout())?,
                model_id,
                dimension,
            )?;
            Ok(Box::new(embedder))
        }
        None => Ok(Box::new(LocalHashEmbedder::new(model_id)?)),
    }
}

#[derive(Debug, Clone)]
pub struct LocalHashEmbedder {
    model_id: String,
    dimension: usize,
}

impl LocalHashEmbedder {
    pub fn new(model_id: &str) -> RagResult<Self> {
        let dimension = local_model_dimension(model_id).ok_or_else(|| {
            let known = LOCAL_MODELS
                .iter()
                .map(|(id, _)| *id)
                .collect::<Vec<_>>()
                .join(", ");
            RagError::model_unavailable(
                model_id,
                format!("not a registered local model (known: {known})"),
            )
        })?;

        Ok(Self {
            model_id: model_id.to_string(),
            dimension,
        })
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0_f32; self.dimension];

        for feature in features(text) {
            let hash = stable_hash(&feature);
            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
            let weight = 1.0 + ((hash >> 48) & 0xFF) as f32 / 255.0;
            vector[bucket] += sign * weight;
        }

        normalize(&mut vector);
        vector
    }
}

impl Embedder for LocalHashEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed_batch(&self, texts: &[&str]) -> RagResult<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct HttpEmbedder {
    endpoint: JsonEndpoint,
    model_id: String,
    dimension: usize,
}

impl HttpEmbedder {
    pub fn new(endpoint: JsonEndpoint, model_id: &str, dimension: usize) -> RagResult<Self> {
        if dimension == 0 {
            return Err(RagError::configuration("embedding dimension must be at least 1"));
        }
        Ok(Self {
            endpoint,
            model_id: model_id.to_string(),
            dimension,
        })
    }
}

impl Embedder for HttpEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed_batch(&self, texts: &[&str]) -> RagResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let response: EmbeddingResponse = self.endpoint.post_json(&EmbeddingRequest {
            model: &self.model_id,
            input: texts,
        })?;

        let mut data = response.data;
        data.sort_by_key(|datum| datum.index);
        debug!(
            model = %self.model_id,
            requested = texts.len(),
            returned = data.len(),
            "remote embedding batch complete"
        );

        let vectors = data.into_iter().map(|datum| datum.embedding).collect();
        check_batch(&self.model_id, self.dimension, texts.len(), vectors)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryEmbedding {
    pub vector: Vec<f32>,
    pub degraded: Option<String>,
}

impl QueryEmbedding {
    pub fn is_degraded(&self) -> bool {
        self.degraded.is_some()
    }
}

/// Query-time embedding. Failures degrade to a zero vector instead of
/// failing the request.
pub fn embed_query(embedder: &dyn Embedder, text: &str) -> QueryEmbedding {
    match embedder.embed(text) {
        Ok(vector) => QueryEmbedding {
            vector,
            degraded: None,
        },
        Err(err) => {
            warn!(
                model = %embedder.model_id(),
                error = %err,
                "query embedding failed, falling back to zero vector"
            );
            QueryEmbedding {
                vector: vec![0.0; embedder.dimension()],
                degraded: Some(err.to_string()),
            }
        }
    }
}

fn stable_hash(value: &str) -> u64 {
    let digest = Sha256::digest(value.as_bytes());
    let mut bytes = [0_u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

fn features(text: &str) -> Vec<String> {
    let words = text
        .split_whitespace()
        .map(|word| {
            word.chars()
                .filter(|character| character.is_alphanumeric())
                .flat_map(char::to_lowercase)
                .collect::<String>()
        })
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>();

    let mut features = Vec::with_capacity(words.len() * 2);
    for (index, word) in words.iter().enumerate() {
        features.push(format!("w:{word}"));
        if let Some(next) = words.get(index + 1) {
            features.push(format!("b:{word}_{next}"));
        }
    }
    features
}

fn normalize(values: &mut [f32]) {
    let norm = values
        .iter()
        .map(|value| f64::from(*value) * f64::from(*value))
        .sum::<f64>()
        .sqrt();
    if norm <= f64::EPSILON {
        return;
    }
    for value in values {
        *value = (f64::from(*value) / norm) as f32;
    }
}
