use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use docbot::config::{
    ChunkUnit, ChunkingConfig, DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, DEFAULT_DOC_DIR,
    DEFAULT_EMBEDDING_MODEL, DEFAULT_EMBEDDING_TIMEOUT_MS, DEFAULT_EXCERPT_CHARS,
    DEFAULT_GENERATION_MODEL, DEFAULT_GENERATION_TIMEOUT_MS, DEFAULT_INDEX_PATH,
    DEFAULT_MAX_HISTORY_TURNS, DEFAULT_MAX_NEW_TOKENS, DEFAULT_PRODUCT_NAME, DEFAULT_TEMPERATURE,
    DEFAULT_TOP_K, EmbeddingConfig, GenerationConfig, RagConfig,
};

#[derive(Parser, Debug)]
#[command(
    name = "docbot",
    version,
    about = "Documentation chatbot: ingest manuals into a vector index and answer questions from them"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Rebuild the vector index from the document directory.
    Ingest(IngestArgs),
    /// Show the chunks retrieved for a question.
    Query(QueryArgs),
    /// Answer one chat message from the indexed documentation.
    Chat(ChatArgs),
    /// Report on the persisted index and the last ingestion run.
    Status(StatusArgs),
    /// Score chat replies against a reference dataset.
    Evaluate(EvaluateArgs),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum ChunkUnitArg {
    Words,
    Chars,
}

impl From<ChunkUnitArg> for ChunkUnit {
    fn from(value: ChunkUnitArg) -> Self {
        match value {
            ChunkUnitArg::Words => Self::Words,
            ChunkUnitArg::Chars => Self::Chars,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct IndexArgs {
    #[arg(long, env = "DOCBOT_INDEX_PATH", default_value = DEFAULT_INDEX_PATH)]
    pub index_path: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct ChunkingArgs {
    #[arg(long, env = "DOCBOT_CHUNK_SIZE", default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    #[arg(long, env = "DOCBOT_CHUNK_OVERLAP", default_value_t = DEFAULT_CHUNK_OVERLAP)]
    pub chunk_overlap: usize,

    #[arg(long, env = "DOCBOT_CHUNK_UNIT", value_enum, default_value_t = ChunkUnitArg::Words)]
    pub chunk_unit: ChunkUnitArg,
}

impl ChunkingArgs {
    pub fn to_config(&self) -> ChunkingConfig {
        ChunkingConfig {
            unit: self.chunk_unit.into(),
            size: self.chunk_size,
            overlap: self.chunk_overlap,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct EmbeddingArgs {
    #[arg(long, env = "DOCBOT_EMBEDDING_MODEL", default_value = DEFAULT_EMBEDDING_MODEL)]
    pub embedding_model: String,

    #[arg(long, env = "DOCBOT_EMBEDDING_ENDPOINT")]
    pub embedding_endpoint: Option<String>,

    #[arg(long, env = "DOCBOT_EMBEDDING_DIM")]
    pub embedding_dim: Option<usize>,

    #[arg(long, env = "DOCBOT_EMBEDDING_TIMEOUT_MS", default_value_t = DEFAULT_EMBEDDING_TIMEOUT_MS)]
    pub embedding_timeout_ms: u64,

    /// Bearer token sent to both model endpoints.
    #[arg(long, env = "DOCBOT_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,
}

impl EmbeddingArgs {
    pub fn to_config(&self) -> EmbeddingConfig {
        EmbeddingConfig {
            model_id: self.embedding_model.clone(),
            endpoint: self.embedding_endpoint.clone(),
            dimension: self.embedding_dim,
            api_key: self.api_key.clone(),
            timeout_ms: self.embedding_timeout_ms,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct GenerationArgs {
    #[arg(long, env = "DOCBOT_GENERATION_MODEL", default_value = DEFAULT_GENERATION_MODEL)]
    pub generation_model: String,

    /// Without an endpoint every reply is the template built from retrieved excerpts.
    #[arg(long, env = "DOCBOT_GENERATION_ENDPOINT")]
    pub generation_endpoint: Option<String>,

    #[arg(long, env = "DOCBOT_GENERATION_TIMEOUT_MS", default_value_t = DEFAULT_GENERATION_TIMEOUT_MS)]
    pub generation_timeout_ms: u64,

    #[arg(long, env = "DOCBOT_MAX_NEW_TOKENS", default_value_t = DEFAULT_MAX_NEW_TOKENS)]
    pub max_new_tokens: u32,

    #[arg(long, env = "DOCBOT_TEMPERATURE", default_value_t = DEFAULT_TEMPERATURE)]
    pub temperature: f32,

    #[arg(long, env = "DOCBOT_PRODUCT_NAME", default_value = DEFAULT_PRODUCT_NAME)]
    pub product_name: String,

    #[arg(long, env = "DOCBOT_EXCERPT_CHARS", default_value_t = DEFAULT_EXCERPT_CHARS)]
    pub excerpt_chars: usize,

    #[arg(long, env = "DOCBOT_MAX_HISTORY_TURNS", default_value_t = DEFAULT_MAX_HISTORY_TURNS)]
    pub max_history_turns: usize,
}

impl GenerationArgs {
    pub fn to_config(&self, api_key: Option<String>) -> GenerationConfig {
        GenerationConfig {
            model_id: self.generation_model.clone(),
            endpoint: self.generation_endpoint.clone(),
            api_key,
            timeout_ms: self.generation_timeout_ms,
            max_new_tokens: self.max_new_tokens,
            temperature: self.temperature,
            product_name: self.product_name.clone(),
            excerpt_chars: self.excerpt_chars,
            max_history_turns: self.max_history_turns,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct IngestArgs {
    #[arg(long, env = "DOCBOT_DOC_DIR", default_value = DEFAULT_DOC_DIR)]
    pub doc_dir: PathBuf,

    #[command(flatten)]
    pub index: IndexArgs,

    #[command(flatten)]
    pub chunking: ChunkingArgs,

    #[command(flatten)]
    pub embedding: EmbeddingArgs,

    /// Write an empty index when no document is processable instead of failing.
    #[arg(long, default_value_t = false)]
    pub allow_empty: bool,
}

impl IngestArgs {
    pub fn to_config(&self) -> RagConfig {
        RagConfig {
            doc_dir: self.doc_dir.clone(),
            index_path: self.index.index_path.clone(),
            chunking: self.chunking.to_config(),
            embedding: self.embedding.to_config(),
            ..RagConfig::default()
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct QueryArgs {
    #[arg(long)]
    pub query: String,

    #[command(flatten)]
    pub index: IndexArgs,

    #[command(flatten)]
    pub embedding: EmbeddingArgs,

    #[arg(long, env = "DOCBOT_TOP_K", default_value_t = DEFAULT_TOP_K)]
    pub top_k: usize,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

impl QueryArgs {
    pub fn to_config(&self) -> RagConfig {
        RagConfig {
            index_path: self.index.index_path.clone(),
            embedding: self.embedding.to_config(),
            top_k: self.top_k,
            ..RagConfig::default()
        }
    }
}

/// Options shared by every command that answers through the chat service.
#[derive(Args, Debug, Clone)]
pub struct ServiceArgs {
    #[command(flatten)]
    pub index: IndexArgs,

    #[command(flatten)]
    pub embedding: EmbeddingArgs,

    #[command(flatten)]
    pub generation: GenerationArgs,

    #[arg(long, env = "DOCBOT_TOP_K", default_value_t = DEFAULT_TOP_K)]
    pub top_k: usize,
}

impl ServiceArgs {
    pub fn to_config(&self) -> RagConfig {
        RagConfig {
            index_path: self.index.index_path.clone(),
            embedding: self.embedding.to_config(),
            generation: self.generation.to_config(self.embedding.api_key.clone()),
            top_k: self.top_k,
            ..RagConfig::default()
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ChatArgs {
    #[arg(long, conflicts_with = "request", required_unless_present = "request")]
    pub message: Option<String>,

    /// JSON chat request `{message, session_id?, history?}`; `-` reads stdin.
    #[arg(long)]
    pub request: Option<PathBuf>,

    #[arg(long)]
    pub session_id: Option<String>,

    #[command(flatten)]
    pub service: ServiceArgs,

    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[command(flatten)]
    pub index: IndexArgs,
}

#[derive(Args, Debug, Clone)]
pub struct EvaluateArgs {
    /// JSON array of `{id?, question, expected_answer | reference, category?}`.
    #[arg(long)]
    pub dataset: PathBuf,

    /// Defaults to `<dataset>.report.json`.
    #[arg(long)]
    pub report_path: Option<PathBuf>,

    #[command(flatten)]
    pub service: ServiceArgs,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn ingest_flags_map_onto_config() {
        let cli = Cli::try_parse_from([
            "docbot",
            "ingest",
            "--doc-dir",
            "manuals",
            "--index-path",
            "out/docs.index",
            "--chunk-size",
            "400",
            "--chunk-overlap",
            "40",
            "--chunk-unit",
            "chars",
            "--allow-empty",
        ])
        .unwrap();

        let Commands::Ingest(args) = cli.command else {
            panic!("expected ingest");
        };
        let config = args.to_config();
        assert_eq!(config.doc_dir, PathBuf::from("manuals"));
        assert_eq!(config.index_path, PathBuf::from("out/docs.index"));
        assert_eq!(config.chunking.unit, ChunkUnit::Chars);
        assert_eq!(config.chunking.size, 400);
        assert_eq!(config.chunking.overlap, 40);
        assert!(args.allow_empty);
    }

    #[test]
    fn chat_requires_message_or_request() {
        assert!(Cli::try_parse_from(["docbot", "chat"]).is_err());
        assert!(
            Cli::try_parse_from(["docbot", "chat", "--message", "hi", "--request", "-"]).is_err()
        );
        assert!(Cli::try_parse_from(["docbot", "chat", "--request", "-"]).is_ok());
    }

    #[test]
    fn api_key_is_shared_with_generation() {
        let cli = Cli::try_parse_from([
            "docbot",
            "chat",
            "--message",
            "hi",
            "--api-key",
            "secret",
            "--generation-endpoint",
            "http://127.0.0.1:9/v1/chat/completions",
        ])
        .unwrap();

        let Commands::Chat(args) = cli.command else {
            panic!("expected chat");
        };
        let config = args.service.to_config();
        assert_eq!(config.generation.api_key.as_deref(), Some("secret"));
        assert_eq!(config.embedding.api_key.as_deref(), Some("secret"));
    }
}
