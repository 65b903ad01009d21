pub mod chat;
pub mod evaluate;
pub mod ingest;
pub mod query;
pub mod status;
