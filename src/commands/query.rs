use std::io::{self, Write};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::info;

use docbot::embedder;
use docbot::retriever::{RetrievalResult, Retriever};
use docbot::util::truncate_chars;

use crate::cli::QueryArgs;

const SNIPPET_CHARS: usize = 240;

#[derive(Debug, Serialize)]
struct QueryResponse {
    query: String,
    top_k: usize,
    returned: usize,
    model: String,
    duration_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    degraded: Option<String>,
    results: Vec<QueryHit>,
}

#[derive(Debug, Serialize)]
struct QueryHit {
    rank: usize,
    entry_id: usize,
    distance: f32,
    source: String,
    title: String,
    seq: usize,
    byte_start: usize,
    byte_end: usize,
    text: String,
}

pub fn run(args: QueryArgs) -> Result<()> {
    let query_text = args.query.trim();
    if query_text.is_empty() {
        bail!("query text must not be empty");
    }

    let config = args.to_config();
    config.validate().context("invalid query settings")?;

    let embedder = embedder::from_config(&config.embedding)
        .context("failed to initialize the embedding model")?;
    let retriever = Retriever::open(&config.index_path, Arc::from(embedder))
        .with_context(|| format!("failed to open index {}", config.index_path.display()))?;

    let started = Instant::now();
    let retrieval = retriever
        .retrieve(query_text, config.top_k)
        .context("retrieval failed")?;
    let duration_ms = started.elapsed().as_secs_f64() * 1000.0;

    info!(
        index_path = %config.index_path.display(),
        entries = retriever.index().len(),
        top_k = config.top_k,
        returned = retrieval.hits.len(),
        degraded = retrieval.is_degraded(),
        "query complete"
    );

    let response = build_response(
        query_text,
        config.top_k,
        retriever.index().model_id(),
        duration_ms,
        retrieval,
    );
    if args.json {
        write_json_response(&response)
    } else {
        write_text_response(&response)
    }
}

fn build_response(
    query_text: &str,
    top_k: usize,
    model: &str,
    duration_ms: f64,
    retrieval: RetrievalResult,
) -> QueryResponse {
    let results = retrieval
        .hits
        .into_iter()
        .enumerate()
        .map(|(position, hit)| QueryHit {
            rank: position + 1,
            entry_id: hit.id,
            distance: hit.distance,
            source: hit.record.doc_id,
            title: hit.record.title,
            seq: hit.record.seq,
            byte_start: hit.record.byte_start,
            byte_end: hit.record.byte_end,
            text: hit.record.text,
        })
        .collect::<Vec<_>>();

    QueryResponse {
        query: query_text.to_string(),
        top_k,
        returned: results.len(),
        model: model.to_string(),
        duration_ms,
        degraded: retrieval.degraded,
        results,
    }
}

fn write_json_response(response: &QueryResponse) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    serde_json::to_writer_pretty(&mut output, response)
        .context("failed to serialize query json output")?;
    writeln!(output)?;
    output.flush()?;
    Ok(())
}

fn write_text_response(response: &QueryResponse) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());

    writeln!(output, "Query: {}", response.query)?;
    writeln!(
        output,
        "Retrieval: model={} top_k={} duration_ms={:.3}",
        response.model, response.top_k, response.duration_ms
    )?;
    if let Some(reason) = &response.degraded {
        writeln!(output, "Degraded: {reason}")?;
    }
    writeln!(output, "Results: {}", response.returned)?;

    for hit in &response.results {
        writeln!(
            output,
            "{}.\t{}\tdistance={:.6}\tentry_id={}\tbytes {}..{}",
            hit.rank, hit.title, hit.distance, hit.entry_id, hit.byte_start, hit.byte_end
        )?;
        writeln!(output, "\tsnippet: {}", snippet(&hit.text))?;
    }

    output.flush()?;
    Ok(())
}

fn snippet(text: &str) -> String {
    let flattened = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let cut = truncate_chars(&flattened, SNIPPET_CHARS);
    if cut.len() < flattened.len() {
        format!("{cut}...")
    } else {
        flattened
    }
}
