use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;

pub type RagResult<T> = Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("model '{model}' is unavailable: {reason}")]
    ModelUnavailable { model: String, reason: String },

    #[error("model '{model}' timed out after {timeout_ms}ms")]
    ModelTimeout { model: String, timeout_ms: u64 },

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("index not found at {}", path.display())]
    IndexNotFound { path: PathBuf },

    #[error("index at {} is corrupt: {reason}", path.display())]
    IndexCorrupt { path: PathBuf, reason: String },

    #[error("no processable documents found in {}", dir.display())]
    NoDocuments { dir: PathBuf },

    #[error("failed to extract text from {}: {reason}", path.display())]
    Extraction { path: PathBuf, reason: String },

    #[error("metadata store error: {0}")]
    Metadata(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RagError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn model_unavailable(model: &str, reason: impl Into<String>) -> Self {
        Self::ModelUnavailable {
            model: model.to_string(),
            reason: reason.into(),
        }
    }

    pub fn index_corrupt(path: &Path, reason: impl Into<String>) -> Self {
        Self::IndexCorrupt {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration_error",
            Self::InvalidRequest(_) => "invalid_request",
            Self::ModelUnavailable { .. } => "model_unavailable",
            Self::ModelTimeout { .. } => "model_timeout",
            Self::DimensionMismatch { .. } => "dimension_mismatch",
            Self::IndexNotFound { .. } => "index_not_found",
            Self::IndexCorrupt { .. } => "index_corrupt",
            Self::NoDocuments { .. } => "no_documents",
            Self::Extraction { .. } => "extraction_failed",
            Self::Metadata(_) => "metadata_error",
            Self::Io(_) => "io_error",
        }
    }

    pub fn guidance(&self) -> Option<&'static str> {
        match self {
            Self::Configuration(_) => Some("check the chunking and model settings"),
            Self::ModelUnavailable { .. } | Self::ModelTimeout { .. } => {
                Some("check that the configured model is installed or reachable")
            }
            Self::DimensionMismatch { .. } => Some("re-ingest with matching model"),
            Self::IndexNotFound { .. } => Some("run ingestion first: docbot ingest"),
            Self::IndexCorrupt { .. } => Some("delete the index files and re-run ingestion"),
            Self::NoDocuments { .. } => Some("add PDF or plain-text files to the document directory"),
            _ => None,
        }
    }

    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            kind: self.kind(),
            message: self.to_string(),
            guidance: self.guidance(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub kind: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guidance: Option<&'static str>,
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn all_variants() -> Vec<RagError> {
        vec![
            RagError::configuration("overlap must be smaller than size"),
            RagError::InvalidRequest("empty".to_string()),
            RagError::model_unavailable("m", "down"),
            RagError::ModelTimeout {
                model: "m".to_string(),
                timeout_ms: 10,
            },
            RagError::DimensionMismatch {
                expected: 384,
                actual: 3,
            },
            RagError::IndexNotFound {
                path: PathBuf::from("/tmp/x.index"),
            },
            RagError::index_corrupt(Path::new("/tmp/x.index"), "bad magic"),
            RagError::NoDocuments {
                dir: PathBuf::from("/tmp/docs"),
            },
            RagError::Extraction {
                path: PathBuf::from("/tmp/a.pdf"),
                reason: "boom".to_string(),
            },
            RagError::Metadata(rusqlite::Error::InvalidQuery),
            RagError::Io(std::io::Error::other("disk")),
        ]
    }

    #[test]
    fn kinds_are_unique() {
        let variants = all_variants();
        let kinds = variants.iter().map(RagError::kind).collect::<HashSet<_>>();
        assert_eq!(kinds.len(), variants.len());
    }

    #[test]
    fn index_errors_point_at_ingestion() {
        let missing = RagError::IndexNotFound {
            path: PathBuf::from("data/docs.index"),
        };
        assert!(missing.guidance().unwrap().contains("run ingestion"));

        let skew = RagError::DimensionMismatch {
            expected: 384,
            actual: 768,
        };
        assert_eq!(skew.guidance(), Some("re-ingest with matching model"));
    }

    #[test]
    fn body_serializes_kind_and_message() {
        let body = RagError::index_corrupt(Path::new("x.index"), "checksum mismatch").to_body();
        let value = serde_json::to_value(&body).unwrap();
        assert_eq!(value["kind"], "index_corrupt");
        assert!(value["message"].as_str().unwrap().contains("checksum mismatch"));
        assert!(value["guidance"].is_string());
    }

    #[test]
    fn guidance_is_omitted_when_absent() {
        let body = RagError::InvalidRequest("message must not be empty".to_string()).to_body();
        let value = serde_json::to_value(&body).unwrap();
        assert!(value.get("guidance").is_none());
    }
}
