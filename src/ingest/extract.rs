use std::fs;
use std::path::Path;
use std::process::Command;

use regex::Regex;

use super::discover::SourceFile;
use crate::error::{RagError, RagResult};
use crate::model::DocumentKind;

pub struct TextCleaner {
    hyphen_break: Regex,
    trailing_space: Regex,
    blank_runs: Regex,
}

impl TextCleaner {
    pub fn new() -> RagResult<Self> {
        let compile = |pattern: &str| {
            Regex::new(pattern).map_err(|err| {
                RagError::configuration(format!("failed to compile cleanup regex {pattern}: {err}"))
            })
        };

        Ok(Self {
            hyphen_break: compile(r"(\p{Alphabetic})-[ \t]*\n[ \t]*(\p{Ll})")?,
            trailing_space: compile(r"[ \t]+\n")?,
            blank_runs: compile(r"\n{3,}")?,
        })
    }

    pub fn clean(&self, raw: &str) -> String {
        let text = self.trailing_space.replace_all(raw, "\n");
        let text = self.hyphen_break.replace_all(&text, "$1$2");
        let text = self.blank_runs.replace_all(&text, "\n\n");
        text.trim_matches('\n').to_string()
    }
}

pub fn extract_text(file: &SourceFile, cleaner: &TextCleaner) -> RagResult<String> {
    let text = match file.kind {
        DocumentKind::Text => read_plain_text(&file.path)?,
        DocumentKind::Pdf => cleaner.clean(&join_pages(&run_pdftotext(&file.path)?)),
    };

    if text.trim().is_empty() {
        return Err(RagError::Extraction {
            path: file.path.clone(),
            reason: "no extractable text".to_string(),
        });
    }
    Ok(text)
}

fn read_plain_text(path: &Path) -> RagResult<String> {
    let bytes = fs::read(path).map_err(|err| RagError::Extraction {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;
    let text = String::from_utf8(bytes).map_err(|_| RagError::Extraction {
        path: path.to_path_buf(),
        reason: "file is not valid UTF-8".to_string(),
    })?;

    Ok(match text.strip_prefix('\u{feff}') {
        Some(stripped) => stripped.to_string(),
        None => text,
    })
}

fn run_pdftotext(pdf_path: &Path) -> RagResult<String> {
    let failed = |reason: String| RagError::Extraction {
        path: pdf_path.to_path_buf(),
        reason,
    };

    let output = Command::new("pdftotext")
        .arg("-enc")
        .arg("UTF-8")
        .arg(pdf_path)
        .arg("-")
        .output()
        .map_err(|err| failed(format!("failed to execute pdftotext: {err}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(failed(format!(
            "pdftotext returned non-zero exit status: {}",
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn join_pages(raw: &str) -> String {
    let mut pages = raw
        .split('\u{000C}')
        .map(|page| page.replace('\u{0000}', ""))
        .collect::<Vec<_>>();

    while pages.last().is_some_and(|page| page.trim().is_empty()) {
        pages.pop();
    }
    pages.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleaner_merges_hyphenated_breaks_and_collapses_blank_lines() {
        let cleaner = TextCleaner::new().unwrap();
        let raw = "The check-\npoint process   \nflushes the log.\n\n\n\n\nNext para-\n  graph.\n";
        assert_eq!(
            cleaner.clean(raw),
            "The checkpoint process\nflushes the log.\n\nNext paragraph."
        );
    }

    #[test]
    fn cleaner_keeps_hyphen_before_capitalised_line() {
        let cleaner = TextCleaner::new().unwrap();
        assert_eq!(cleaner.clean("Ingres-\nStar"), "Ingres-\nStar");
    }

    #[test]
    fn pages_are_joined_and_trailing_blank_pages_dropped() {
        let raw = "page one\u{000C}page\u{0000} two\u{000C}  \n\u{000C}";
        assert_eq!(join_pages(raw), "page one\npage two");
    }

    #[test]
    fn plain_text_strips_bom_and_rejects_invalid_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.txt");
        fs::write(&good, "\u{feff}hello").unwrap();
        assert_eq!(read_plain_text(&good).unwrap(), "hello");

        let bad = dir.path().join("bad.txt");
        fs::write(&bad, [0xff, 0xfe, 0x00, 0x41]).unwrap();
        let err = read_plain_text(&bad).unwrap_err();
        assert_eq!(err.kind(), "extraction_failed");
    }
}
