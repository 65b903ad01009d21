use serde::{Deserialize, Serialize};

use super::prompt::Prompt;
use crate::config::GenerationConfig;
use crate::error::{RagError, RagResult};
use crate::http::JsonEndpoint;

pub trait LanguageModel: Send + Sync {
    fn model_id(&self) -> &str;

    fn complete(&self, prompt: &Prompt) -> RagResult<String>;
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HttpLanguageModel {
    endpoint: JsonEndpoint,
    model_id: String,
    max_new_tokens: u32,
    temperature: f32,
}

impl HttpLanguageModel {
    pub fn new(endpoint: JsonEndpoint, model_id: &str, max_new_tokens: u32, temperature: f32) -> Self {
        Self {
            endpoint,
            model_id: model_id.to_string(),
            max_new_tokens,
            temperature,
        }
    }

    pub fn from_config(config: &GenerationConfig) -> RagResult<Option<Self>> {
        let Some(url) = &config.endpoint else {
            return Ok(None);
        };
        let endpoint = JsonEndpoint::new(
            url,
            &config.model_id,
            config.api_key.clone(),
            config.timeout(),
        )?;
        Ok(Some(Self::new(
            endpoint,
            &config.model_id,
            config.max_new_tokens,
            config.temperature,
        )))
    }
}

impl LanguageModel for HttpLanguageModel {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn complete(&self, prompt: &Prompt) -> RagResult<String> {
        let request = ChatCompletionRequest {
            model: &self.model_id,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            max_tokens: self.max_new_tokens,
            temperature: self.temperature,
        };

        let response: ChatCompletionResponse = self.endpoint.post_json(&request)?;
        response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.unwrap_or_default())
            .ok_or_else(|| RagError::model_unavailable(&self.model_id, "response had no choices"))
    }
}
