use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::RagResult;

pub fn now_utc_string() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn utc_compact_string(ts: DateTime<Utc>) -> String {
    ts.format("%Y%m%dT%H%M%SZ").to_string()
}

pub fn ensure_directory(path: &Path) -> RagResult<()> {
    fs::create_dir_all(path)?;
    Ok(())
}

pub fn ensure_parent_directory(path: &Path) -> RagResult<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => ensure_directory(parent),
        _ => Ok(()),
    }
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

pub fn sha256_file(path: &Path) -> RagResult<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0_u8; 8192];

    loop {
        let count = file.read(&mut buf)?;
        if count == 0 {
            break;
        }
        hasher.update(&buf[..count]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

pub fn sibling_path(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

pub fn temp_sibling(path: &Path) -> PathBuf {
    sibling_path(path, &format!(".tmp-{}", std::process::id()))
}

pub fn remove_if_exists(path: &Path) {
    if let Err(err) = fs::remove_file(path)
        && err.kind() != io::ErrorKind::NotFound
    {
        tracing::warn!(path = %path.display(), error = %err, "failed to remove temporary file");
    }
}

pub fn write_atomic(path: &Path, bytes: &[u8]) -> RagResult<()> {
    ensure_parent_directory(path)?;
    let temp = temp_sibling(path);

    let written = write_synced(&temp, bytes).and_then(|()| fs::rename(&temp, path));
    if let Err(err) = written {
        remove_if_exists(&temp);
        return Err(err.into());
    }
    Ok(())
}

pub fn write_json_pretty_atomic<T: Serialize>(path: &Path, value: &T) -> RagResult<()> {
    let mut data = serde_json::to_vec_pretty(value).map_err(io::Error::other)?;
    data.push(b'\n');
    write_atomic(path, &data)
}

pub fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((offset, _)) => &text[..offset],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sibling_appends_to_file_name() {
        let path = Path::new("data/embeddings/docs.index");
        assert_eq!(
            sibling_path(path, ".meta.sqlite"),
            PathBuf::from("data/embeddings/docs.index.meta.sqlite")
        );
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("abc", 10), "abc");
        assert_eq!(truncate_chars("abc", 0), "");
    }

    #[test]
    fn atomic_write_replaces_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("out.json");

        write_json_pretty_atomic(&path, &serde_json::json!({"a": 1})).unwrap();
        write_json_pretty_atomic(&path, &serde_json::json!({"a": 2})).unwrap();

        let value: serde_json::Value =
            serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(value["a"], 2);
        assert!(!temp_sibling(&path).exists());
    }

    #[test]
    fn file_hash_matches_byte_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.txt");
        fs::write(&path, b"ingres").unwrap();
        assert_eq!(sha256_file(&path).unwrap(), sha256_hex(b"ingres"));
    }
}
