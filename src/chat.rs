use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use crate::config::RagConfig;
use crate::embedder;
use crate::error::{RagError, RagResult};
use crate::generator::Generator;
use crate::index::ChunkRecord;
use crate::model::{ChatRequest, ChatResponse, ConversationTurn, TicketRequest};
use crate::retriever::Retriever;

pub struct ChatService {
    retriever: Retriever,
    generator: Generator,
    top_k: usize,
}

impl ChatService {
    pub fn new(retriever: Retriever, generator: Generator, top_k: usize) -> Self {
        Self {
            retriever,
            generator,
            top_k,
        }
    }

    pub fn from_config(config: &RagConfig) -> RagResult<Self> {
        config.validate()?;
        let embedder = Arc::from(embedder::from_config(&config.embedding)?);
        let retriever = Retriever::open(&config.index_path, embedder)?;
        let generator = Generator::from_config(&config.generation)?;
        Ok(Self::new(retriever, generator, config.top_k))
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    pub fn respond(&self, request: &ChatRequest) -> RagResult<ChatResponse> {
        let message = request.message.trim();
        if message.is_empty() {
            return Err(RagError::InvalidRequest(
                "message must not be empty".to_string(),
            ));
        }

        let started = Instant::now();
        let retrieval = self.retriever.retrieve(message, self.top_k)?;
        let chunks = retrieval
            .hits
            .iter()
            .map(|hit| hit.record.clone())
            .collect::<Vec<ChunkRecord>>();

        let history = (!request.history.is_empty()).then_some(request.history.as_slice());
        let generated = self.generator.generate(message, &chunks, history);

        info!(
            session_id = request.session_id.as_deref().unwrap_or("-"),
            hits = chunks.len(),
            mode = generated.mode.as_str(),
            degraded = retrieval.is_degraded(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "chat request served"
        );

        Ok(ChatResponse {
            reply: generated.reply,
            sources: generated.sources,
            mode: generated.mode,
            degraded: retrieval.is_degraded(),
        })
    }

    pub fn ticket_request(
        session_id: &str,
        issue: &str,
        history: &[ConversationTurn],
    ) -> RagResult<TicketRequest> {
        let issue = issue.trim();
        if issue.is_empty() {
            return Err(RagError::InvalidRequest(
                "ticket issue must not be empty".to_string(),
            ));
        }

        Ok(TicketRequest {
            session_id: session_id.to_string(),
            issue: issue.to_string(),
            chat_history: history.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::embedder::{Embedder, LocalHashEmbedder};
    use crate::generator::GeneratorSettings;
    use crate::index::VectorIndex;
    use crate::ingest::{IngestOptions, ingest};
    use crate::model::{ReplyMode, Role};

    fn settings() -> GeneratorSettings {
        GeneratorSettings {
            product_name: "INGRES".to_string(),
            excerpt_chars: 500,
            max_history_turns: 6,
        }
    }

    fn service(texts: &[(&str, &str)]) -> ChatService {
        let embedder: Arc<dyn Embedder> = Arc::new(LocalHashEmbedder::new("local-hash-v1").unwrap());
        let mut index = VectorIndex::new("local-hash-v1", 384).unwrap();
        for (doc, text) in texts {
            index
                .add(
                    vec![embedder.embed(text).unwrap()],
                    vec![ChunkRecord {
                        doc_id: doc.to_string(),
                        title: format!("{doc} - chunk 0"),
                        seq: 0,
                        text: text.to_string(),
                        byte_start: 0,
                        byte_end: text.len(),
                    }],
                )
                .unwrap();
        }
        let retriever = Retriever::from_index(index, embedder).unwrap();
        ChatService::new(retriever, Generator::new(settings(), None), 4)
    }

    fn request(message: &str) -> ChatRequest {
        ChatRequest {
            message: message.to_string(),
            session_id: Some("s-1".to_string()),
            history: Vec::new(),
        }
    }

    #[test]
    fn blank_message_is_invalid() {
        let err = service(&[]).respond(&request("  \n ")).unwrap_err();
        assert_eq!(err.kind(), "invalid_request");
    }

    #[test]
    fn empty_index_answers_with_no_relevant_information() {
        let response = service(&[]).respond(&request("How do I create a database?")).unwrap();
        assert_eq!(response.mode, ReplyMode::NoRelevantContext);
        assert!(response.reply.contains("No relevant information found"));
        assert!(response.sources.is_empty());
        assert!(!response.degraded);
    }

    #[test]
    fn ingested_empty_directory_answers_with_no_relevant_information() {
        let dir = tempfile::tempdir().unwrap();
        let docs = dir.path().join("docs");
        std::fs::create_dir(&docs).unwrap();
        let config = RagConfig {
            doc_dir: docs,
            index_path: dir.path().join("docs.index"),
            ..RagConfig::default()
        };

        let embedder = LocalHashEmbedder::new(&config.embedding.model_id).unwrap();
        let manifest = ingest(&IngestOptions::from_config(&config, true), &embedder).unwrap();
        assert_eq!(manifest.counts.chunks_indexed, 0);

        let service = ChatService::from_config(&config).unwrap();
        assert!(service.retriever().index().is_empty());

        let response = service.respond(&request("How do I create a database?")).unwrap();
        assert_eq!(response.mode, ReplyMode::NoRelevantContext);
        assert!(response.reply.starts_with("No relevant information found in the INGRES documentation"));
        assert!(response.sources.is_empty());
        assert!(!response.degraded);
    }

    #[test]
    fn without_model_the_reply_quotes_retrieved_sources() {
        let service = service(&[
            ("create.txt", "Use createdb dbname to create a database."),
            ("drop.txt", "Use destroydb dbname to remove a database."),
        ]);
        let response = service.respond(&request("how to create a database")).unwrap();

        assert_eq!(response.mode, ReplyMode::Fallback);
        assert_eq!(response.sources.len(), 2);
        assert_eq!(response.sources[0].source, "create.txt");
        assert!(response.reply.starts_with("Here's what the INGRES documentation says:"));
    }

    #[test]
    fn response_serializes_contract_fields() {
        let service = service(&[("a.txt", "sysmod dbname")]);
        let response = service.respond(&request("sysmod")).unwrap();
        let value = serde_json::to_value(&response).unwrap();

        assert!(value["reply"].is_string());
        assert_eq!(value["mode"], "fallback");
        assert_eq!(value["degraded"], false);
        assert_eq!(value["sources"][0]["source"], "a.txt");
        assert_eq!(value["sources"][0]["title"], "a.txt - chunk 0");
    }

    #[test]
    fn shared_service_answers_concurrently() {
        let service = Arc::new(service(&[
            ("a.txt", "optimizedb gathers statistics"),
            ("b.txt", "verifydb checks consistency"),
        ]));

        let handles = (0..6)
            .map(|n| {
                let service = Arc::clone(&service);
                thread::spawn(move || {
                    let message = if n % 2 == 0 { "optimizedb statistics" } else { "verifydb consistency" };
                    let response = service.respond(&request(message)).unwrap();
                    (n, response.sources[0].source.clone())
                })
            })
            .collect::<Vec<_>>();

        for handle in handles {
            let (n, top) = handle.join().unwrap();
            assert_eq!(top, if n % 2 == 0 { "a.txt" } else { "b.txt" });
        }
    }

    #[test]
    fn ticket_request_carries_transcript() {
        let history = vec![
            ConversationTurn {
                role: Role::User,
                text: "E_US0845 on insert".to_string(),
            },
            ConversationTurn {
                role: Role::Assistant,
                text: "Check the table exists.".to_string(),
            },
        ];
        let ticket = ChatService::ticket_request("s-9", " still failing ", &history).unwrap();
        let value = serde_json::to_value(&ticket).unwrap();

        assert_eq!(value["session_id"], "s-9");
        assert_eq!(value["issue"], "still failing");
        assert_eq!(value["chat_history"][0]["role"], "user");
        assert_eq!(value["chat_history"][1]["text"], "Check the table exists.");

        assert!(ChatService::ticket_request("s-9", "  ", &history).is_err());
    }
}
