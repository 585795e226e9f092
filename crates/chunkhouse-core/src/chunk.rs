//! Chunk Data Structure
//!
//! A chunk is the unit of storage: an immutable, opaque block of encoded
//! metric samples covering a time range for a single series.
//!
//! ## Structure
//!
//! - **id**: `<fingerprint>:<from>:<through>` — the series fingerprint is
//!   caller-supplied and opaque to the store; the two timestamps are
//!   recoverable with [`parse_chunk_id`] so the query planner can filter
//!   by time without loading bodies
//! - **from / through**: millisecond instants, both inclusive
//! - **metric**: the full label set, which must include `__name__`
//! - **data**: the encoded sample payload, opaque to the store
//!
//! ## Encodings
//!
//! Two JSON encodings exist. [`Chunk::encode`] includes `data` and is the
//! blob-store body payload. [`Chunk::encode_metadata`] omits `data` and
//! is the optional inline copy written into index entries, letting the
//! planner reconstruct metadata without a body fetch
//! (`metadata_in_index` records that an index row carried it).

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::labels::{Labels, METRIC_NAME};
use crate::time::Timestamp;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,

    /// First instant covered, milliseconds since epoch.
    pub from: Timestamp,

    /// Last instant covered, inclusive.
    pub through: Timestamp,

    /// Full label set, including `__name__`.
    pub metric: Labels,

    /// Encoded sample payload. Empty on index-only chunk stubs.
    #[serde(default, skip_serializing_if = "Bytes::is_empty")]
    pub data: Bytes,

    /// Whether the index entry this chunk was read from carried an inline
    /// copy of the metadata. Never serialized.
    #[serde(skip)]
    pub metadata_in_index: bool,
}

impl Chunk {
    pub fn new(
        fingerprint: u64,
        from: Timestamp,
        through: Timestamp,
        metric: Labels,
        data: Bytes,
    ) -> Self {
        Self {
            id: format!("{fingerprint}:{from}:{through}"),
            from,
            through,
            metric,
            data,
            metadata_in_index: false,
        }
    }

    /// The `__name__` label value, if present.
    pub fn metric_name(&self) -> Option<&str> {
        self.metric.get(METRIC_NAME).map(String::as_str)
    }

    /// Encode the full chunk, body included, for the blob store.
    pub fn encode(&self) -> Result<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    /// Decode a blob-store body back into a chunk.
    pub fn decode(body: &[u8]) -> Result<Chunk> {
        Ok(serde_json::from_slice(body)?)
    }

    /// Encode metadata only (no body) for inline storage in the index.
    pub fn encode_metadata(&self) -> Result<Bytes> {
        let mut stripped = self.clone();
        stripped.data = Bytes::new();
        Ok(Bytes::from(serde_json::to_vec(&stripped)?))
    }

    /// Decode an inline metadata payload from an index entry.
    pub fn decode_metadata(raw: &[u8]) -> Result<Chunk> {
        let mut chunk: Chunk = serde_json::from_slice(raw)?;
        chunk.metadata_in_index = true;
        Ok(chunk)
    }
}

/// Recover `(from, through)` from a chunk ID without loading the chunk.
pub fn parse_chunk_id(id: &str) -> Result<(Timestamp, Timestamp)> {
    let invalid = || Error::InvalidChunkId(id.to_string());
    let mut parts = id.split(':');
    let fingerprint = parts.next().ok_or_else(invalid)?;
    if fingerprint.is_empty() {
        return Err(invalid());
    }
    let from = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(invalid)?;
    let through = parts
        .next()
        .and_then(|s| s.parse().ok())
        .ok_or_else(invalid)?;
    if parts.next().is_some() {
        return Err(invalid());
    }
    Ok((from, through))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> Labels {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect()
    }

    fn sample_chunk() -> Chunk {
        Chunk::new(
            42,
            1_000,
            9_000,
            labels(&[(METRIC_NAME, "http_requests"), ("job", "api")]),
            Bytes::from_static(b"payload"),
        )
    }

    #[test]
    fn id_encodes_time_range() {
        let chunk = sample_chunk();
        assert_eq!(chunk.id, "42:1000:9000");
        assert_eq!(parse_chunk_id(&chunk.id).unwrap(), (1_000, 9_000));
    }

    #[test]
    fn parse_rejects_malformed_ids() {
        assert!(parse_chunk_id("").is_err());
        assert!(parse_chunk_id("42").is_err());
        assert!(parse_chunk_id("42:1000").is_err());
        assert!(parse_chunk_id("42:a:b").is_err());
        assert!(parse_chunk_id("42:1:2:3").is_err());
        assert!(parse_chunk_id(":1:2").is_err());
    }

    #[test]
    fn body_round_trip() {
        let chunk = sample_chunk();
        let body = chunk.encode().unwrap();
        let decoded = Chunk::decode(&body).unwrap();
        assert_eq!(decoded, chunk);
        assert_eq!(decoded.data, Bytes::from_static(b"payload"));
    }

    #[test]
    fn metadata_round_trip_drops_body() {
        let chunk = sample_chunk();
        let raw = chunk.encode_metadata().unwrap();
        let decoded = Chunk::decode_metadata(&raw).unwrap();
        assert_eq!(decoded.id, chunk.id);
        assert_eq!(decoded.metric, chunk.metric);
        assert!(decoded.data.is_empty());
        assert!(decoded.metadata_in_index);
    }

    #[test]
    fn metric_name_lookup() {
        let chunk = sample_chunk();
        assert_eq!(chunk.metric_name(), Some("http_requests"));

        let nameless = Chunk::new(1, 0, 1, labels(&[("job", "api")]), Bytes::new());
        assert_eq!(nameless.metric_name(), None);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(Chunk::decode(b"not json").is_err());
    }
}
