use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use docbot::ChatService;
use docbot::error::{RagError, RagResult};
use docbot::model::{ChatRequest, ChatResponse};

use crate::cli::ChatArgs;

pub fn run(args: ChatArgs) -> Result<()> {
    match answer(&args) {
        Ok(response) => {
            if args.json {
                write_json(&response)
            } else {
                write_text_response(&response)
            }
        }
        Err(err) => {
            write_json(&err.to_body())?;
            Err(anyhow::Error::new(err).context("chat request failed"))
        }
    }
}

fn answer(args: &ChatArgs) -> RagResult<ChatResponse> {
    let request = load_request(args)?;
    let service = ChatService::from_config(&args.service.to_config())?;
    service.respond(&request)
}

fn load_request(args: &ChatArgs) -> RagResult<ChatRequest> {
    let mut request = match (&args.message, &args.request) {
        (Some(message), _) => ChatRequest {
            message: message.clone(),
            ..ChatRequest::default()
        },
        (None, Some(path)) => parse_request(&read_request(path)?)?,
        (None, None) => {
            return Err(RagError::InvalidRequest(
                "either --message or --request is required".to_string(),
            ));
        }
    };

    if args.session_id.is_some() {
        request.session_id = args.session_id.clone();
    }
    Ok(request)
}

fn read_request(path: &Path) -> RagResult<String> {
    if path == Path::new("-") {
        let mut raw = String::new();
        io::stdin().read_to_string(&mut raw)?;
        return Ok(raw);
    }
    Ok(fs::read_to_string(path)?)
}

fn parse_request(raw: &str) -> RagResult<ChatRequest> {
    serde_json::from_str(raw)
        .map_err(|err| RagError::InvalidRequest(format!("malformed chat request: {err}")))
}

fn write_json<T: Serialize>(value: &T) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());
    serde_json::to_writer_pretty(&mut output, value)
        .context("failed to serialize chat json output")?;
    writeln!(output)?;
    output.flush()?;
    Ok(())
}

fn write_text_response(response: &ChatResponse) -> Result<()> {
    let mut output = io::BufWriter::new(io::stdout().lock());

    writeln!(output, "{}", response.reply)?;
    writeln!(output)?;
    writeln!(
        output,
        "Mode: {}{}",
        response.mode.as_str(),
        if response.degraded { " (degraded retrieval)" } else { "" }
    )?;
    if !response.sources.is_empty() {
        writeln!(output, "Sources:")?;
        for (position, source) in response.sources.iter().enumerate() {
            writeln!(output, "  [{}] {}", position + 1, source.title)?;
        }
    }

    output.flush()?;
    Ok(())
}
