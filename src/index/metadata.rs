use std::collections::HashMap;
use std::path::Path;

use rusqlite::{Connection, OpenFlags, params};

use super::{ChunkRecord, VectorIndex};
use crate::config::{ChunkUnit, ChunkingConfig};
use crate::error::{RagError, RagResult};
use crate::model::{DocumentKind, DocumentRecord};
use crate::util::remove_if_exists;

const SCHEMA_VERSION: &str = "1";

#[derive(Debug)]
pub(super) struct StoredMetadata {
    pub build_id: String,
    pub model_id: String,
    pub dimension: usize,
    pub entry_count: usize,
    pub created_at: String,
    pub chunking: Option<ChunkingConfig>,
    pub documents: Vec<DocumentRecord>,
    pub records: Vec<ChunkRecord>,
}

fn ensure_schema(connection: &Connection) -> rusqlite::Result<()> {
    connection.execute_batch(
        "
        CREATE TABLE metadata (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
        );

        CREATE TABLE docs (
          doc_id TEXT PRIMARY KEY,
          filename TEXT NOT NULL,
          kind TEXT NOT NULL,
          sha256 TEXT NOT NULL,
          char_count INTEGER NOT NULL,
          chunk_count INTEGER NOT NULL
        );

        CREATE TABLE chunks (
          entry_id INTEGER PRIMARY KEY,
          doc_id TEXT NOT NULL,
          chunk_seq INTEGER NOT NULL,
          title TEXT NOT NULL,
          text TEXT NOT NULL,
          byte_start INTEGER NOT NULL,
          byte_end INTEGER NOT NULL
        );

        CREATE INDEX idx_chunks_doc ON chunks(doc_id, chunk_seq);
        ",
    )
}

pub(super) fn write(path: &Path, index: &VectorIndex) -> RagResult<()> {
    remove_if_exists(path);

    let mut connection = Connection::open(path)?;
    connection.pragma_update(None, "synchronous", "FULL")?;
    ensure_schema(&connection)?;

    let tx = connection.transaction()?;
    {
        let mut put = tx.prepare("INSERT INTO metadata(key, value) VALUES(?1, ?2)")?;
        for (key, value) in metadata_pairs(index) {
            put.execute(params![key, value])?;
        }

        let mut put_doc = tx.prepare(
            "
            INSERT INTO docs(doc_id, filename, kind, sha256, char_count, chunk_count)
            VALUES(?1, ?2, ?3, ?4, ?5, ?6)
            ",
        )?;
        for doc in &index.documents {
            put_doc.execute(params![
                doc.doc_id,
                doc.filename,
                doc.kind.as_str(),
                doc.sha256,
                doc.char_count as i64,
                doc.chunk_count as i64,
            ])?;
        }

        let mut put_chunk = tx.prepare(
            "
            INSERT INTO chunks(entry_id, doc_id, chunk_seq, title, text, byte_start, byte_end)
            VALUES(?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ",
        )?;
        for (entry_id, record) in index.records.iter().enumerate() {
            put_chunk.execute(params![
                entry_id as i64,
                record.doc_id,
                record.seq as i64,
                record.title,
                record.text,
                record.byte_start as i64,
                record.byte_end as i64,
            ])?;
        }
    }
    tx.commit()?;

    connection.close().map_err(|(_, err)| err)?;
    Ok(())
}

fn metadata_pairs(index: &VectorIndex) -> Vec<(&'static str, String)> {
    let mut pairs = vec![
        ("schema_version", SCHEMA_VERSION.to_string()),
        ("build_id", index.build_id.clone()),
        ("model_id", index.model_id.clone()),
        ("dimension", index.dimension.to_string()),
        ("entry_count", index.records.len().to_string()),
        ("created_at", index.created_at.clone()),
    ];
    if let Some(chunking) = index.chunking {
        pairs.push(("chunk_unit", chunking.unit.as_str().to_string()));
        pairs.push(("chunk_size", chunking.size.to_string()));
        pairs.push(("chunk_overlap", chunking.overlap.to_string()));
    }
    pairs
}

pub(super) fn read(path: &Path) -> RagResult<StoredMetadata> {
    let unreadable =
        |err: rusqlite::Error| RagError::index_corrupt(path, format!("unreadable metadata: {err}"));

    let connection = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(unreadable)?;

    let pairs = load_pairs(&connection).map_err(unreadable)?;
    let schema_version = required(&pairs, "schema_version", path)?;
    if schema_version != SCHEMA_VERSION {
        return Err(RagError::index_corrupt(
            path,
            format!("unsupported metadata schema version {schema_version}"),
        ));
    }

    let chunking = match (
        pairs.get("chunk_unit"),
        pairs.get("chunk_size"),
        pairs.get("chunk_overlap"),
    ) {
        (Some(unit), Some(size), Some(overlap)) => Some(ChunkingConfig {
            unit: unit
                .parse::<ChunkUnit>()
                .map_err(|err| RagError::index_corrupt(path, err.to_string()))?,
            size: parse_number(size, "chunk_size", path)?,
            overlap: parse_number(overlap, "chunk_overlap", path)?,
        }),
        _ => None,
    };

    let documents = load_documents(&connection, path)?;
    let records = load_records(&connection, path)?;

    Ok(StoredMetadata {
        build_id: required(&pairs, "build_id", path)?.to_string(),
        model_id: required(&pairs, "model_id", path)?.to_string(),
        dimension: parse_number(required(&pairs, "dimension", path)?, "dimension", path)?,
        entry_count: parse_number(required(&pairs, "entry_count", path)?, "entry_count", path)?,
        created_at: required(&pairs, "created_at", path)?.to_string(),
        chunking,
        documents,
        records,
    })
}

fn load_pairs(connection: &Connection) -> rusqlite::Result<HashMap<String, String>> {
    let mut statement = connection.prepare("SELECT key, value FROM metadata")?;
    let rows = statement.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    rows.collect()
}

fn load_documents(connection: &Connection, path: &Path) -> RagResult<Vec<DocumentRecord>> {
    let unreadable =
        |err: rusqlite::Error| RagError::index_corrupt(path, format!("unreadable metadata: {err}"));

    let mut statement = connection
        .prepare(
            "
            SELECT doc_id, filename, kind, sha256, char_count, chunk_count
            FROM docs
            ORDER BY rowid ASC
            ",
        )
        .map_err(unreadable)?;
    let mut rows = statement.query([]).map_err(unreadable)?;

    let mut out = Vec::new();
    while let Some(row) = rows.next().map_err(unreadable)? {
        let kind: String = row.get(2).map_err(unreadable)?;
        let kind = match kind.as_str() {
            "pdf" => DocumentKind::Pdf,
            "text" => DocumentKind::Text,
            other => {
                return Err(RagError::index_corrupt(
                    path,
                    format!("unknown document kind '{other}'"),
                ));
            }
        };
        out.push(DocumentRecord {
            doc_id: row.get(0).map_err(unreadable)?,
            filename: row.get(1).map_err(unreadable)?,
            kind,
            sha256: row.get(3).map_err(unreadable)?,
            char_count: non_negative(row.get(4).map_err(unreadable)?, path)?,
            chunk_count: non_negative(row.get(5).map_err(unreadable)?, path)?,
        });
    }
    Ok(out)
}

fn load_records(connection: &Connection, path: &Path) -> RagResult<Vec<ChunkRecord>> {
    let unreadable =
        |err: rusqlite::Error| RagError::index_corrupt(path, format!("unreadable metadata: {err}"));

    let mut statement = connection
        .prepare(
            "
            SELECT entry_id, doc_id, chunk_seq, title, text, byte_start, byte_end
            FROM chunks
            ORDER BY entry_id ASC
            ",
        )
        .map_err(unreadable)?;
    let mut rows = statement.query([]).map_err(unreadable)?;

    let mut out = Vec::new();
    while let Some(row) = rows.next().map_err(unreadable)? {
        let entry_id: i64 = row.get(0).map_err(unreadable)?;
        if entry_id != out.len() as i64 {
            return Err(RagError::index_corrupt(
                path,
                format!("chunk entry ids are not contiguous at {entry_id}"),
            ));
        }
        out.push(ChunkRecord {
            doc_id: row.get(1).map_err(unreadable)?,
            seq: non_negative(row.get(2).map_err(unreadable)?, path)?,
            title: row.get(3).map_err(unreadable)?,
            text: row.get(4).map_err(unreadable)?,
            byte_start: non_negative(row.get(5).map_err(unreadable)?, path)?,
            byte_end: non_negative(row.get(6).map_err(unreadable)?, path)?,
        });
    }
    Ok(out)
}

fn required<'a>(pairs: &'a HashMap<String, String>, key: &str, path: &Path) -> RagResult<&'a str> {
    pairs
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| RagError::index_corrupt(path, format!("metadata key '{key}' is missing")))
}

fn parse_number(value: &str, key: &str, path: &Path) -> RagResult<usize> {
    value.parse::<usize>().map_err(|_| {
        RagError::index_corrupt(path, format!("metadata key '{key}' is not a number: {value}"))
    })
}

fn non_negative(value: i64, path: &Path) -> RagResult<usize> {
    usize::try_from(value)
        .map_err(|_| RagError::index_corrupt(path, format!("negative value {value} in metadata")))
}
