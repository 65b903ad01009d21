mod fallback;
mod llm;
mod prompt;

use std::time::Instant;

use tracing::{info, warn};

pub use fallback::{no_context_reply, template_reply};
pub use llm::{HttpLanguageModel, LanguageModel};
pub use prompt::{MAX_HISTORY_TURN_CHARS, Prompt, build_prompt};

use crate::config::GenerationConfig;
use crate::error::RagResult;
use crate::index::ChunkRecord;
use crate::model::{ConversationTurn, ReplyMode, SourceRef};
use crate::util::truncate_chars;

#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    pub product_name: String,
    pub excerpt_chars: usize,
    pub max_history_turns: usize,
}

impl From<&GenerationConfig> for GeneratorSettings {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            product_name: config.product_name.clone(),
            excerpt_chars: config.excerpt_chars,
            max_history_turns: config.max_history_turns,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeneratedReply {
    pub reply: String,
    pub sources: Vec<SourceRef>,
    pub mode: ReplyMode,
    pub fallback_reason: Option<String>,
}

pub struct Generator {
    settings: GeneratorSettings,
    model: Option<Box<dyn LanguageModel>>,
}

impl Generator {
    pub fn new(settings: GeneratorSettings, model: Option<Box<dyn LanguageModel>>) -> Self {
        Self { settings, model }
    }

    pub fn from_config(config: &GenerationConfig) -> RagResult<Self> {
        let model = HttpLanguageModel::from_config(config)?
            .map(|model| Box::new(model) as Box<dyn LanguageModel>);
        Ok(Self::new(GeneratorSettings::from(config), model))
    }

    pub fn settings(&self) -> &GeneratorSettings {
        &self.settings
    }

    pub fn model_id(&self) -> Option<&str> {
        self.model.as_deref().map(LanguageModel::model_id)
    }

    pub fn generate(
        &self,
        query: &str,
        chunks: &[ChunkRecord],
        history: Option<&[ConversationTurn]>,
    ) -> GeneratedReply {
        let product = &self.settings.product_name;
        if chunks.is_empty() {
            return GeneratedReply {
                reply: no_context_reply(product),
                sources: Vec::new(),
                mode: ReplyMode::NoRelevantContext,
                fallback_reason: None,
            };
        }

        let excerpts = chunks
            .iter()
            .map(|chunk| self.excerpt(chunk))
            .collect::<Vec<_>>();
        let sources = excerpts
            .iter()
            .map(|(source, _)| source.clone())
            .collect::<Vec<_>>();

        let failure = match self.model.as_deref() {
            None => "no language model configured".to_string(),
            Some(model) => {
                let prompt = build_prompt(&self.settings, query, &sources, history.unwrap_or(&[]));
                let started = Instant::now();
                match model.complete(&prompt) {
                    Ok(completion) if !completion.trim().is_empty() => {
                        info!(
                            model = %model.model_id(),
                            excerpts = sources.len(),
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "generated reply"
                        );
                        return GeneratedReply {
                            reply: completion.trim().to_string(),
                            sources,
                            mode: ReplyMode::Generated,
                            fallback_reason: None,
                        };
                    }
                    Ok(_) => "model returned an empty completion".to_string(),
                    Err(err) => err.to_string(),
                }
            }
        };

        warn!(reason = %failure, "using template reply");
        GeneratedReply {
            reply: template_reply(product, &excerpts),
            sources,
            mode: ReplyMode::Fallback,
            fallback_reason: Some(failure),
        }
    }

    fn excerpt(&self, chunk: &ChunkRecord) -> (SourceRef, bool) {
        let text = chunk.text.trim();
        let excerpt = truncate_chars(text, self.settings.excerpt_chars);
        (
            SourceRef {
                source: chunk.doc_id.clone(),
                title: chunk.title.clone(),
                text: excerpt.to_string(),
            },
            excerpt.len() < text.len(),
        )
    }
}
