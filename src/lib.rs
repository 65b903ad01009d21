pub mod chat;
pub mod chunker;
pub mod config;
pub mod embedder;
pub mod error;
pub mod generator;
pub mod http;
pub mod index;
pub mod ingest;
pub mod model;
pub mod retriever;
pub mod util;

pub use chat::ChatService;
pub use error::{RagError, RagResult};
