use serde::{Deserialize, Serialize};

pub const INGEST_MANIFEST_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Pdf,
    Text,
}

impl DocumentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Text => "text",
        }
    }

    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "txt" | "text" | "md" | "markdown" => Some(Self::Text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub doc_id: String,
    pub filename: String,
    pub kind: DocumentKind,
    pub sha256: String,
    pub char_count: usize,
    pub chunk_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedFile {
    pub filename: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestPaths {
    pub doc_dir: String,
    pub index_path: String,
    pub metadata_path: String,
    pub manifest_path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestCounts {
    pub files_seen: usize,
    pub documents_processed: usize,
    pub files_skipped: usize,
    pub chunks_indexed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestRunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub build_id: String,
    pub status: String,
    pub started_at: String,
    pub completed_at: String,
    pub embedding_model: String,
    pub embedding_dimension: usize,
    pub chunk_unit: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub paths: IngestPaths,
    pub counts: IngestCounts,
    pub documents: Vec<DocumentRecord>,
    pub skipped: Vec<SkippedFile>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn label(self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Assistant => "Assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub text: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<ConversationTurn>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub source: String,
    pub title: String,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyMode {
    Generated,
    NoRelevantContext,
    Fallback,
}

impl ReplyMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Generated => "generated",
            Self::NoRelevantContext => "no_relevant_context",
            Self::Fallback => "fallback",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub reply: String,
    pub sources: Vec<SourceRef>,
    pub mode: ReplyMode,
    pub degraded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketRequest {
    pub session_id: String,
    pub issue: String,
    pub chat_history: Vec<ConversationTurn>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketResponse {
    pub ticket_id: String,
    pub status: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EvaluationCase {
    #[serde(default)]
    pub id: Option<String>,
    pub question: String,
    #[serde(alias = "reference")]
    pub expected_answer: String,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationResult {
    pub id: Option<String>,
    pub category: Option<String>,
    pub question: String,
    pub expected_answer: String,
    pub reply: String,
    pub mode: Option<ReplyMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub word_overlap: f64,
    pub bleu: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ScoreSummary {
    pub mean: f64,
    /// Sample standard deviation, zero below two values.
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryScores {
    pub category: String,
    pub count: usize,
    pub word_overlap: ScoreSummary,
    pub bleu: ScoreSummary,
}

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationReport {
    pub generated_at: String,
    pub dataset_path: String,
    pub index_path: String,
    pub case_count: usize,
    pub failed_cases: usize,
    pub word_overlap: ScoreSummary,
    pub bleu: ScoreSummary,
    pub categories: Vec<CategoryScores>,
    pub results: Vec<EvaluationResult>,
}
