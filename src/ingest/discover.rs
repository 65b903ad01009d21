use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{RagError, RagResult};
use crate::model::{DocumentKind, SkippedFile};

#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub filename: String,
    pub kind: DocumentKind,
}

#[derive(Debug, Default)]
pub struct Discovery {
    pub files: Vec<SourceFile>,
    pub skipped: Vec<SkippedFile>,
    pub seen: usize,
}

pub fn discover_documents(doc_dir: &Path) -> RagResult<Discovery> {
    if !doc_dir.is_dir() {
        return Err(RagError::configuration(format!(
            "document directory does not exist or is not a directory: {}",
            doc_dir.display()
        )));
    }

    let mut discovery = Discovery::default();

    for entry in fs::read_dir(doc_dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        let is_file = file_type.is_file() || (file_type.is_symlink() && path.is_file());
        if !is_file {
            continue;
        }

        let Some(filename) = path.file_name().and_then(|name| name.to_str()).map(ToOwned::to_owned)
        else {
            discovery.seen += 1;
            discovery.skipped.push(SkippedFile {
                filename: path.display().to_string(),
                reason: "file name is not valid UTF-8".to_string(),
            });
            continue;
        };
        if filename.starts_with('.') {
            continue;
        }
        discovery.seen += 1;

        let kind = path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(DocumentKind::from_extension);

        match kind {
            Some(kind) => discovery.files.push(SourceFile {
                path,
                filename,
                kind,
            }),
            None => discovery.skipped.push(SkippedFile {
                filename,
                reason: "unsupported file type".to_string(),
            }),
        }
    }

    discovery.files.sort_by(|a, b| a.filename.cmp(&b.filename));
    discovery.skipped.sort_by(|a, b| a.filename.cmp(&b.filename));
    Ok(discovery)
}
