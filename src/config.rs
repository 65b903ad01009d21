use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{RagError, RagResult};

pub const DEFAULT_CHUNK_SIZE: usize = 800;

pub const DEFAULT_CHUNK_OVERLAP: usize = 100;

pub const DEFAULT_TOP_K: usize = 4;

pub const DEFAULT_EXCERPT_CHARS: usize = 500;

pub const DEFAULT_MAX_HISTORY_TURNS: usize = 6;

pub const DEFAULT_EMBEDDING_MODEL: &str = "local-hash-v1";
pub const DEFAULT_GENERATION_MODEL: &str = "falcon-7b-instruct";
pub const DEFAULT_PRODUCT_NAME: &str = "INGRES";
pub const DEFAULT_DOC_DIR: &str = "data/docs";
pub const DEFAULT_INDEX_PATH: &str = "data/embeddings/docs.index";
pub const DEFAULT_EMBEDDING_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_GENERATION_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_MAX_NEW_TOKENS: u32 = 300;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum ChunkUnit {
    #[default]
    Words,
    Chars,
}

impl ChunkUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Words => "words",
            Self::Chars => "chars",
        }
    }
}

impl FromStr for ChunkUnit {
    type Err = RagError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "words" | "word" => Ok(Self::Words),
            "chars" | "char" | "characters" => Ok(Self::Chars),
            other => Err(RagError::configuration(format!(
                "unknown chunk unit '{other}' (expected 'words' or 'chars')"
            ))),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ChunkingConfig {
    pub unit: ChunkUnit,
    pub size: usize,
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            unit: ChunkUnit::Words,
            size: DEFAULT_CHUNK_SIZE,
            overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> RagResult<()> {
        if self.size == 0 {
            return Err(RagError::configuration("chunk size must be greater than zero"));
        }
        if self.overlap >= self.size {
            return Err(RagError::configuration(format!(
                "chunk overlap ({}) must be smaller than chunk size ({})",
                self.overlap, self.size
            )));
        }
        Ok(())
    }
}

#[derive(Clone, Debug)]
pub struct EmbeddingConfig {
    pub model_id: String,
    pub endpoint: Option<String>,
    pub dimension: Option<usize>,
    pub api_key: Option<String>,
    pub timeout_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_EMBEDDING_MODEL.to_string(),
            endpoint: None,
            dimension: None,
            api_key: None,
            timeout_ms: DEFAULT_EMBEDDING_TIMEOUT_MS,
        }
    }
}

impl EmbeddingConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Clone, Debug)]
pub struct GenerationConfig {
    pub model_id: String,
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub timeout_ms: u64,
    pub max_new_tokens: u32,
    pub temperature: f32,
    pub product_name: String,
    pub excerpt_chars: usize,
    pub max_history_turns: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_GENERATION_MODEL.to_string(),
            endpoint: None,
            api_key: None,
            timeout_ms: DEFAULT_GENERATION_TIMEOUT_MS,
            max_new_tokens: DEFAULT_MAX_NEW_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            product_name: DEFAULT_PRODUCT_NAME.to_string(),
            excerpt_chars: DEFAULT_EXCERPT_CHARS,
            max_history_turns: DEFAULT_MAX_HISTORY_TURNS,
        }
    }
}

impl GenerationConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Clone, Debug)]
pub struct RagConfig {
    pub doc_dir: PathBuf,
    pub index_path: PathBuf,
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub generation: GenerationConfig,
    pub top_k: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            doc_dir: PathBuf::from(DEFAULT_DOC_DIR),
            index_path: PathBuf::from(DEFAULT_INDEX_PATH),
            chunking: ChunkingConfig::default(),
            embedding: EmbeddingConfig::default(),
            generation: GenerationConfig::default(),
            top_k: DEFAULT_TOP_K,
        }
    }
}

impl RagConfig {
    pub fn validate(&self) -> RagResult<()> {
        self.chunking.validate()?;

        if self.top_k == 0 {
            return Err(RagError::configuration("top-k must be at least 1"));
        }
        if self.generation.excerpt_chars == 0 {
            return Err(RagError::configuration(
                "excerpt character budget must be at least 1",
            ));
        }
        if self.embedding.model_id.trim().is_empty() {
            return Err(RagError::configuration("embedding model id must not be empty"));
        }
        if self.embedding.endpoint.is_some() && self.embedding.dimension.is_none() {
            return Err(RagError::configuration(
                "a remote embedding endpoint requires an explicit embedding dimension",
            ));
        }
        if self.embedding.dimension == Some(0) {
            return Err(RagError::configuration("embedding dimension must be at least 1"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        RagConfig::default().validate().unwrap();
    }

    #[test]
    fn overlap_equal_to_size_is_rejected() {
        let chunking = ChunkingConfig {
            unit: ChunkUnit::Words,
            size: 100,
            overlap: 100,
        };
        let err = chunking.validate().unwrap_err();
        assert_eq!(err.kind(), "configuration_error");
    }

    #[test]
    fn zero_size_is_rejected() {
        let chunking = ChunkingConfig {
            unit: ChunkUnit::Chars,
            size: 0,
            overlap: 0,
        };
        assert!(chunking.validate().is_err());
    }

    #[test]
    fn remote_embedding_requires_dimension() {
        let mut config = RagConfig::default();
        config.embedding.endpoint = Some("http://127.0.0.1:9/v1/embeddings".to_string());
        assert!(config.validate().is_err());

        config.embedding.dimension = Some(1536);
        config.validate().unwrap();
    }

    #[test]
    fn chunk_unit_parses_aliases() {
        assert_eq!("Chars".parse::<ChunkUnit>().unwrap(), ChunkUnit::Chars);
        assert_eq!("word".parse::<ChunkUnit>().unwrap(), ChunkUnit::Words);
        assert!("tokens".parse::<ChunkUnit>().is_err());
    }
}
