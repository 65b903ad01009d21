use std::ops::Range;

use crate::config::{ChunkUnit, ChunkingConfig};
use crate::error::RagResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub doc_id: String,
    pub seq: usize,
    pub text: String,
    pub span: Range<usize>,
    pub overlap_bytes: usize,
}

impl Chunk {
    pub fn novel_text(&self) -> &str {
        &self.text[self.overlap_bytes..]
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    config: ChunkingConfig,
}

impl Chunker {
    pub fn new(config: ChunkingConfig) -> RagResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> ChunkingConfig {
        self.config
    }

    pub fn chunks<'a>(&self, doc_id: &'a str, text: &'a str) -> Chunks<'a> {
        let mut boundaries = if text.trim().is_empty() {
            Vec::new()
        } else {
            token_starts(text, self.config.unit)
        };
        if !boundaries.is_empty() {
            boundaries.push(text.len());
        }

        Chunks {
            doc_id,
            text,
            next_start: (!boundaries.is_empty()).then_some(0),
            boundaries,
            size: self.config.size,
            overlap: self.config.overlap,
            prev_end: 0,
            seq: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    doc_id: &'a str,
    text: &'a str,
    boundaries: Vec<usize>,
    size: usize,
    overlap: usize,
    next_start: Option<usize>,
    prev_end: usize,
    seq: usize,
}

impl Chunks<'_> {
    fn token_total(&self) -> usize {
        self.boundaries.len().saturating_sub(1)
    }
}

impl Iterator for Chunks<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        let start = self.next_start?;
        let tokens = self.token_total();
        let end = (start + self.size).min(tokens);

        let overlap_bytes = if self.seq == 0 {
            0
        } else {
            self.boundaries[self.prev_end] - self.boundaries[start]
        };
        let span = self.boundaries[start]..self.boundaries[end];

        self.next_start = (end < tokens).then(|| end - self.overlap);
        self.prev_end = end;

        let chunk = Chunk {
            doc_id: self.doc_id.to_string(),
            seq: self.seq,
            text: self.text[span.clone()].to_string(),
            span,
            overlap_bytes,
        };
        self.seq += 1;
        Some(chunk)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = match self.next_start {
            None => 0,
            Some(start) => {
                let left = self.token_total() - start;
                if left <= self.size {
                    1
                } else {
                    let stride = self.size - self.overlap;
                    1 + (left - self.size).div_ceil(stride)
                }
            }
        };
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Chunks<'_> {}

pub fn count_tokens(text: &str, unit: ChunkUnit) -> usize {
    token_starts(text, unit).len()
}

/// Byte offsets at which tokens begin. Word tokens absorb the whitespace
/// that follows them, and the first token also absorbs any leading
/// whitespace, so the spans partition the whole text.
fn token_starts(text: &str, unit: ChunkUnit) -> Vec<usize> {
    match unit {
        ChunkUnit::Chars => text.char_indices().map(|(offset, _)| offset).collect(),
        ChunkUnit::Words => {
            let mut starts = Vec::new();
            let mut in_word = false;
            for (offset, character) in text.char_indices() {
                let is_space = character.is_whitespace();
                if !is_space && !in_word {
                    starts.push(offset);
                }
                in_word = !is_space;
            }
            if let Some(first) = starts.first_mut() {
                *first = 0;
            }
            starts
        }
    }
}
