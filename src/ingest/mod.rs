mod discover;
mod extract;
mod run;
#[cfg(test)]
mod tests;

pub use discover::{Discovery, SourceFile, discover_documents};
pub use extract::{TextCleaner, extract_text};
pub use run::{IngestOptions, MANIFEST_SUFFIX, ingest, manifest_path};
