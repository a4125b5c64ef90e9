//! Payload encoding: canonical JSON, optionally gzip-compressed.
//!
//! Compressed payloads are stored as base64 text of a gzip stream of the
//! canonical JSON document, so they embed cleanly in the persisted snapshot
//! map. Decoding is an explicit two-step strategy: try the compressed form,
//! then fall back to parsing the text as raw JSON.

use std::io::{Read, Write};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use tracing::{debug, warn};

use crate::models::snapshot::{SnapshotData, SnapshotPayload};
use crate::{AppError, Result};

/// Encoded payload ready to be stored on a snapshot.
#[derive(Debug, Clone)]
pub struct EncodedPayload {
    /// Stored form.
    pub data: SnapshotData,
    /// Whether `data` is compressed.
    pub compressed: bool,
    /// Length of the canonical JSON form in bytes.
    pub serialized_size: u64,
}

/// Which decode path produced a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodePath {
    /// Structured payload stored as-is.
    Raw,
    /// base64 + gzip + JSON.
    Compressed,
    /// Text that turned out to be plain JSON.
    RawJsonFallback,
}

/// Serialize a payload to its canonical JSON text.
///
/// Files are held in a `BTreeMap`, so identical payloads always produce
/// identical text.
///
/// # Errors
///
/// Returns `AppError::Decode` if the payload cannot be serialized.
pub fn to_canonical_json(payload: &SnapshotPayload) -> Result<String> {
    serde_json::to_string(payload)
        .map_err(|err| AppError::Decode(format!("failed to serialize payload: {err}")))
}

/// Gzip and base64-encode raw bytes.
///
/// # Errors
///
/// Returns `AppError::Io` if the encoder fails.
pub fn compress_bytes(raw: &[u8]) -> Result<String> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(raw)?;
    let gz = encoder.finish()?;
    Ok(STANDARD.encode(gz))
}

/// Reverse [`compress_bytes`].
///
/// # Errors
///
/// Returns `AppError::Decode` if the text is not base64 or not a gzip stream.
pub fn decompress_bytes(encoded: &str) -> Result<Vec<u8>> {
    let gz = STANDARD
        .decode(encoded.trim().as_bytes())
        .map_err(|err| AppError::Decode(format!("payload is not base64: {err}")))?;
    let mut decoder = GzDecoder::new(gz.as_slice());
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|err| AppError::Decode(format!("payload is not gzip: {err}")))?;
    Ok(out)
}

/// Compress a payload into its stored text form.
///
/// # Errors
///
/// Returns `AppError::Decode` if serialization fails or `AppError::Io` if
/// compression fails.
pub fn compress(payload: &SnapshotPayload) -> Result<String> {
    let json = to_canonical_json(payload)?;
    compress_bytes(json.as_bytes())
}

/// Decompress a stored text form back into a payload.
///
/// Fails rather than returning partial data: empty output and unparseable
/// JSON are both `AppError::Decode`.
///
/// # Errors
///
/// Returns `AppError::Decode` on any decoding failure.
pub fn decompress(encoded: &str) -> Result<SnapshotPayload> {
    let raw = decompress_bytes(encoded)?;
    if raw.is_empty() {
        return Err(AppError::Decode("decompressed payload is empty".into()));
    }
    let mut payload: SnapshotPayload = serde_json::from_slice(&raw)
        .map_err(|err| AppError::Decode(format!("decompressed payload is not JSON: {err}")))?;
    payload.recompute_metadata();
    Ok(payload)
}

/// Encode a payload for storage, compressing only above `threshold` bytes.
///
/// Rejects payloads whose canonical form or file total exceeds `max_bytes`.
///
/// # Errors
///
/// Returns `AppError::Oversize` if the payload is over the cap,
/// `AppError::Decode` if it cannot be serialized, or `AppError::Io` if
/// compression fails.
pub fn encode_for_storage(
    payload: SnapshotPayload,
    threshold: u64,
    max_bytes: u64,
) -> Result<EncodedPayload> {
    if payload.metadata.total_size > max_bytes {
        return Err(AppError::Oversize(format!(
            "snapshot files total {} bytes, limit is {max_bytes}",
            payload.metadata.total_size
        )));
    }

    let json = to_canonical_json(&payload)?;
    let serialized_size = json.len() as u64;
    if serialized_size > max_bytes {
        return Err(AppError::Oversize(format!(
            "snapshot serializes to {serialized_size} bytes, limit is {max_bytes}"
        )));
    }

    if serialized_size > threshold {
        let encoded = compress_bytes(json.as_bytes())?;
        debug!(
            serialized_size,
            compressed_size = encoded.len(),
            "payload compressed"
        );
        Ok(EncodedPayload {
            data: SnapshotData::Encoded(encoded),
            compressed: true,
            serialized_size,
        })
    } else {
        Ok(EncodedPayload {
            data: SnapshotData::Raw(payload),
            compressed: false,
            serialized_size,
        })
    }
}

/// Decode stored snapshot data regardless of what the `compressed` flag says.
///
/// Text data is tried as a compressed stream first and as raw JSON second;
/// the path that succeeded is logged and returned. Metadata is always
/// recomputed on the result.
///
/// # Errors
///
/// Returns `AppError::Decode` if neither strategy yields a payload.
pub fn decode_data(data: &SnapshotData, compressed: bool) -> Result<(SnapshotPayload, DecodePath)> {
    match data {
        SnapshotData::Raw(payload) => {
            if compressed {
                warn!("snapshot flagged compressed but stored raw; using raw payload");
            }
            let mut payload = payload.clone();
            payload.recompute_metadata();
            Ok((payload, DecodePath::Raw))
        }
        SnapshotData::Encoded(text) => match decompress(text) {
            Ok(payload) => {
                if !compressed {
                    warn!("snapshot flagged uncompressed but stored compressed");
                }
                debug!("payload decoded via compressed path");
                Ok((payload, DecodePath::Compressed))
            }
            Err(compressed_err) => {
                debug!(%compressed_err, "compressed decode failed, trying raw JSON");
                let mut payload: SnapshotPayload =
                    serde_json::from_str(text).map_err(|json_err| {
                        AppError::Decode(format!(
                            "payload is neither compressed ({compressed_err}) nor JSON ({json_err})"
                        ))
                    })?;
                payload.recompute_metadata();
                warn!("payload decoded via raw JSON fallback");
                Ok((payload, DecodePath::RawJsonFallback))
            }
        },
    }
}
