//! On-disk entry codec.
//!
//! Each cache file is `[u32 header_len LE][header JSON][payload bytes]`.
//! Payloads at or above [`COMPRESSION_THRESHOLD`] are gzip-compressed;
//! smaller payloads are stored raw, since compression overhead outweighs
//! the saving below that size.

use std::io::{Read, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

/// Payloads at or above this size are compressed.
pub const COMPRESSION_THRESHOLD: usize = 4 * 1024;

#[derive(Serialize, Deserialize)]
pub(crate) struct FileHeader {
    pub data_type: String,
    pub created_at_millis: u64,
    pub schema_version: u32,
    pub compressed: bool,
}

pub(crate) struct DecodedEntry {
    pub header: FileHeader,
    pub payload: Vec<u8>,
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as u64
}

/// Encodes a cache file's bytes: header-length-prefixed JSON header, then
/// the (possibly compressed) payload. Returns the encoded bytes plus
/// whether compression was applied, for stats bookkeeping.
pub(crate) fn encode(data_type: &str, schema_version: u32, payload: &[u8]) -> (Vec<u8>, bool) {
    let compressed = payload.len() >= COMPRESSION_THRESHOLD;

    let body = if compressed {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(payload)
            .expect("writing to an in-memory encoder cannot fail");
        encoder.finish().expect("finishing an in-memory gzip stream cannot fail")
    } else {
        payload.to_vec()
    };

    let header = FileHeader {
        data_type: data_type.to_string(),
        created_at_millis: now_millis(),
        schema_version,
        compressed,
    };

    let header_bytes = serde_json::to_vec(&header).expect("header must serialize");
    let mut out = Vec::with_capacity(4 + header_bytes.len() + body.len());
    out.extend_from_slice(&(header_bytes.len() as u32).to_le_bytes());
    out.extend_from_slice(&header_bytes);
    out.extend_from_slice(&body);
    (out, compressed)
}

/// Decodes a cache file's raw bytes back into a header and decompressed payload.
pub(crate) fn decode(raw: &[u8]) -> Option<DecodedEntry> {
    if raw.len() < 4 {
        return None;
    }
    let header_len = u32::from_le_bytes(raw[0..4].try_into().ok()?) as usize;
    let header_start = 4;
    let header_end = header_start.checked_add(header_len)?;
    if raw.len() < header_end {
        return None;
    }

    let header: FileHeader = serde_json::from_slice(&raw[header_start..header_end]).ok()?;
    let body = &raw[header_end..];

    let payload = if header.compressed {
        let mut decoder = GzDecoder::new(body);
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).ok()?;
        out
    } else {
        body.to_vec()
    };

    Some(DecodedEntry { header, payload })
}
