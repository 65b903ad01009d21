//! Binary vector file.
//!
//! Layout, little-endian: magic, format version, dimension, entry count,
//! length-prefixed build id and model id, the row-major `f32` payload, then
//! a SHA-256 over every preceding byte.

use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{RagError, RagResult};

const MAGIC: &[u8; 8] = b"DOCBOTIX";
const FORMAT_VERSION: u32 = 1;
const CHECKSUM_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq)]
pub(super) struct VectorFile {
    pub build_id: String,
    pub model_id: String,
    pub dimension: usize,
    pub count: usize,
    pub vectors: Vec<f32>,
}

pub(super) fn encode(
    build_id: &str,
    model_id: &str,
    dimension: usize,
    vectors: &[f32],
) -> RagResult<Vec<u8>> {
    let count = if dimension == 0 { 0 } else { vectors.len() / dimension };
    let mut out = Vec::with_capacity(64 + vectors.len() * 4 + CHECKSUM_LEN);

    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&to_u32(dimension, "dimension")?.to_le_bytes());
    out.extend_from_slice(&(count as u64).to_le_bytes());
    push_str(&mut out, build_id)?;
    push_str(&mut out, model_id)?;
    for value in vectors {
        out.extend_from_slice(&value.to_le_bytes());
    }

    let checksum = Sha256::digest(&out);
    out.extend_from_slice(&checksum);
    Ok(out)
}

pub(super) fn decode(path: &Path, bytes: &[u8]) -> RagResult<VectorFile> {
    let corrupt = |reason: &str| RagError::index_corrupt(path, reason);

    if !bytes.starts_with(MAGIC) {
        return Err(corrupt("not a docbot vector file (bad magic)"));
    }
    if bytes.len() < MAGIC.len() + CHECKSUM_LEN {
        return Err(corrupt("file is truncated"));
    }

    let (payload, checksum) = bytes.split_at(bytes.len() - CHECKSUM_LEN);
    if Sha256::digest(payload).as_slice() != checksum {
        return Err(corrupt("checksum mismatch (file truncated or modified)"));
    }

    let mut reader = Reader {
        path,
        bytes: payload,
        offset: MAGIC.len(),
    };

    let version = reader.u32()?;
    if version != FORMAT_VERSION {
        return Err(corrupt(&format!(
            "unsupported format version {version} (expected {FORMAT_VERSION})"
        )));
    }

    let dimension = reader.u32()? as usize;
    let count = usize::try_from(reader.u64()?).map_err(|_| corrupt("entry count overflows"))?;
    let build_id = reader.string()?;
    let model_id = reader.string()?;

    let values = count
        .checked_mul(dimension)
        .ok_or_else(|| corrupt("entry count overflows"))?;
    let byte_len = values
        .checked_mul(4)
        .ok_or_else(|| corrupt("entry count overflows"))?;
    let raw = reader.take(byte_len)?;
    if reader.offset != payload.len() {
        return Err(corrupt("trailing bytes after vector payload"));
    }

    let vectors = raw
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();

    Ok(VectorFile {
        build_id,
        model_id,
        dimension,
        count,
        vectors,
    })
}

struct Reader<'a> {
    path: &'a Path,
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> RagResult<&'a [u8]> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or_else(|| RagError::index_corrupt(self.path, "file is truncated"))?;
        let slice = &self.bytes[self.offset..end];
        self.offset = end;
        Ok(slice)
    }

    fn u16(&mut self) -> RagResult<u16> {
        let raw = self.take(2)?;
        Ok(u16::from_le_bytes([raw[0], raw[1]]))
    }

    fn u32(&mut self) -> RagResult<u32> {
        let raw = self.take(4)?;
        Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }

    fn u64(&mut self) -> RagResult<u64> {
        let mut buf = [0_u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(buf))
    }

    fn string(&mut self) -> RagResult<String> {
        let len = usize::from(self.u16()?);
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec())
            .map_err(|_| RagError::index_corrupt(self.path, "header string is not UTF-8"))
    }
}

fn push_str(out: &mut Vec<u8>, value: &str) -> RagResult<()> {
    let len = u16::try_from(value.len())
        .map_err(|_| RagError::configuration(format!("identifier too long: {value}")))?;
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(value.as_bytes());
    Ok(())
}

fn to_u32(value: usize, what: &str) -> RagResult<u32> {
    u32::try_from(value).map_err(|_| RagError::configuration(format!("{what} too large: {value}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        encode("build-1", "local-hash-v1", 2, &[1.0, 2.0, 3.0, 4.0]).unwrap()
    }

    #[test]
    fn decodes_what_it_encodes() {
        let file = decode(Path::new("x.index"), &sample()).unwrap();
        assert_eq!(file.count, 2);
        assert_eq!(file.dimension, 2);
        assert_eq!(file.build_id, "build-1");
        assert_eq!(file.model_id, "local-hash-v1");
        assert_eq!(file.vectors, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn bad_magic_is_corrupt() {
        let mut bytes = sample();
        bytes[0] = b'X';
        let err = decode(Path::new("x.index"), &bytes).unwrap_err();
        assert_eq!(err.kind(), "index_corrupt");
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn truncation_is_corrupt() {
        let bytes = sample();
        for len in [4, 20, bytes.len() - 1] {
            let err = decode(Path::new("x.index"), &bytes[..len]).unwrap_err();
            assert_eq!(err.kind(), "index_corrupt", "len {len}");
        }
    }

    #[test]
    fn flipped_payload_byte_fails_checksum() {
        let mut bytes = sample();
        let middle = bytes.len() - CHECKSUM_LEN - 3;
        bytes[middle] ^= 0xFF;
        let err = decode(Path::new("x.index"), &bytes).unwrap_err();
        assert!(err.to_string().contains("checksum"));
    }

    #[test]
    fn future_version_is_rejected() {
        let mut bytes = sample();
        bytes[8..12].copy_from_slice(&2_u32.to_le_bytes());
        let payload_len = bytes.len() - CHECKSUM_LEN;
        let checksum = Sha256::digest(&bytes[..payload_len]);
        bytes[payload_len..].copy_from_slice(&checksum);

        let err = decode(Path::new("x.index"), &bytes).unwrap_err();
        assert!(err.to_string().contains("unsupported format version 2"));
    }
}
