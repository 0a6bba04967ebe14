//! Inline-versus-blob tiering rules and the blob wire format.
//!
//! Payloads at or above [`TIER_THRESHOLD_BYTES`] are written to the blob store
//! as gzip-compressed JSON envelopes; the table keeps only a [`BlobRef`].

use std::io::{Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::keys;
use crate::problem::{BlobRef, TestCase};
use crate::storage::{RepositoryError, Result};

/// 100 KiB, well below the store's 400 KB item ceiling.
pub const TIER_THRESHOLD_BYTES: usize = 102_400;

pub const GZIP_LEVEL: u32 = 6;

/// `Content-Encoding` recorded on every blob.
pub const CONTENT_ENCODING: &str = "gzip";

/// Format marker written into every envelope.
pub const ENVELOPE_FORMAT: &str = "probstore.blob";
pub const ENVELOPE_VERSION: u32 = 1;

const TESTCASE_CATEGORY: &str = "testcases";
const SNAPSHOT_FILE: &str = "testcases.json.gz";

/// Combined UTF-8 length of a test case payload.
pub fn payload_size(input: &str, output: &str) -> usize {
    input.len() + output.len()
}

/// True if the payload must be stored outside the table.
pub fn should_tier(input: &str, output: &str) -> bool {
    payload_size(input, output) >= TIER_THRESHOLD_BYTES
}

/// Prefix shared by every blob belonging to one problem.
pub fn problem_blob_prefix(platform: &str, problem_id: &str) -> Result<String> {
    Ok(format!(
        "{TESTCASE_CATEGORY}/{}/{}/",
        keys::segment("platform", platform)?,
        keys::segment("problem id", problem_id)?
    ))
}

/// Pattern: `testcases/<platform>/<problem_id>/tc_<testcase_id>.json.gz`
pub fn testcase_blob_key(platform: &str, problem_id: &str, testcase_id: &str) -> Result<String> {
    Ok(format!(
        "{}tc_{}.json.gz",
        problem_blob_prefix(platform, problem_id)?,
        keys::segment("test case id", testcase_id)?
    ))
}

/// Pattern: `testcases/<platform>/<problem_id>/testcases.json.gz`
pub fn snapshot_blob_key(platform: &str, problem_id: &str) -> Result<String> {
    Ok(format!(
        "{}{SNAPSHOT_FILE}",
        problem_blob_prefix(platform, problem_id)?
    ))
}

/// Kind of payload carried by an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlobKind {
    Testcase,
    TestcaseSnapshot,
}

/// Self-describing wrapper around a blob payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlobEnvelope<T> {
    pub format: String,
    pub version: u32,
    pub kind: BlobKind,
    /// Unix seconds.
    pub stored_at: i64,
    pub payload: T,
}

impl<T> BlobEnvelope<T> {
    pub fn new(kind: BlobKind, payload: T, stored_at: i64) -> Self {
        Self {
            format: ENVELOPE_FORMAT.to_string(),
            version: ENVELOPE_VERSION,
            kind,
            stored_at,
            payload,
        }
    }
}

/// Payload of a single-case blob.
pub type TestCaseEnvelope = BlobEnvelope<TestCase>;

/// Payload of a whole-problem snapshot blob.
pub type SnapshotEnvelope = BlobEnvelope<Vec<TestCase>>;

/// An encoded blob ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBlob {
    pub body: Vec<u8>,
    /// Length of the JSON before compression.
    pub size: u64,
}

impl EncodedBlob {
    pub fn blob_ref(&self, key: impl Into<String>) -> BlobRef {
        BlobRef {
            key: key.into(),
            size: self.size,
            compressed_size: self.body.len() as u64,
        }
    }
}

/// Serializes and gzip-compresses an envelope.
pub fn encode<T: Serialize>(envelope: &BlobEnvelope<T>) -> Result<EncodedBlob> {
    let json = serde_json::to_vec(envelope).map_err(RepositoryError::serialization)?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::new(GZIP_LEVEL));
    encoder
        .write_all(&json)
        .map_err(RepositoryError::serialization)?;
    let body = encoder.finish().map_err(RepositoryError::serialization)?;
    Ok(EncodedBlob {
        body,
        size: json.len() as u64,
    })
}

/// Decompresses and parses an envelope, checking its kind.
///
/// Any failure is a [`RepositoryError::MalformedBlob`] naming `key`.
pub fn decode<T: DeserializeOwned>(
    key: &str,
    kind: BlobKind,
    body: &[u8],
) -> Result<BlobEnvelope<T>> {
    let malformed = |reason: String| RepositoryError::MalformedBlob {
        key: key.to_string(),
        reason,
    };

    let mut json = Vec::new();
    GzDecoder::new(body)
        .read_to_end(&mut json)
        .map_err(|e| malformed(format!("gzip: {}", e)))?;

    let envelope: BlobEnvelope<T> =
        serde_json::from_slice(&json).map_err(|e| malformed(format!("json: {}", e)))?;

    if envelope.format != ENVELOPE_FORMAT {
        return Err(malformed(format!("unknown format '{}'", envelope.format)));
    }
    if envelope.kind != kind {
        return Err(malformed(format!(
            "expected {:?} payload, found {:?}",
            kind, envelope.kind
        )));
    }
    Ok(envelope)
}
