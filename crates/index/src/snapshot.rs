//! On-backend layout of the embedding index.
//!
//! Two blobs, always written together in one atomic `put_many`:
//!
//! | key                   | content                                                      |
//! |-----------------------|--------------------------------------------------------------|
//! | `embedding_index.bin` | codec tag byte + (zstd of) bincode `{schema, dim, metric, vectors}` |
//! | `id_map.json`         | `{"id_map": ["<identity_id>", ...]}`, position-aligned       |
//!
//! Vectors are stored in search form (normalized under cosine). The leading
//! codec tag lets a snapshot written with one compression setting be read
//! back under another.

use crate::{IndexConfig, IndexError, Metric};
use bincode::config::standard;
use bincode::serde::{decode_from_slice, encode_to_vec};
use serde::{Deserialize, Serialize};
use store::SnapshotBackend;
use zstd::{decode_all, encode_all};

pub(crate) const INDEX_BLOB_KEY: &str = "embedding_index.bin";
pub(crate) const ID_MAP_KEY: &str = "id_map.json";

/// Bump this value whenever the index blob layout changes.
pub const INDEX_SCHEMA_VERSION: u16 = 1;

const CODEC_TAG_NONE: u8 = 0;
const CODEC_TAG_ZSTD: u8 = 1;

/// Compression codec options for the index blob.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionCodec {
    /// No compression (useful for debugging).
    None,
    /// Zstd compression (default).
    #[default]
    Zstd,
}

/// Compression behavior configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionConfig {
    /// The compression codec to use.
    pub codec: CompressionCodec,
    /// Compression level (1-22 for Zstd, higher = smaller but slower).
    pub level: i32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            codec: CompressionCodec::default(),
            level: 3,
        }
    }
}

impl CompressionConfig {
    pub fn new(codec: CompressionCodec, level: i32) -> Self {
        Self { codec, level }
    }

    pub fn with_codec(mut self, codec: CompressionCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_level(mut self, level: i32) -> Self {
        self.level = level;
        self
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>, IndexError> {
        let (tag, body) = match self.codec {
            CompressionCodec::None => (CODEC_TAG_NONE, data.to_vec()),
            CompressionCodec::Zstd => (
                CODEC_TAG_ZSTD,
                encode_all(data, self.level).map_err(|e| IndexError::Compression(e.to_string()))?,
            ),
        };
        let mut out = Vec::with_capacity(body.len() + 1);
        out.push(tag);
        out.extend_from_slice(&body);
        Ok(out)
    }

    fn decompress(data: &[u8]) -> Result<Vec<u8>, IndexError> {
        match data.split_first() {
            Some((&CODEC_TAG_NONE, body)) => Ok(body.to_vec()),
            Some((&CODEC_TAG_ZSTD, body)) => {
                decode_all(body).map_err(|e| IndexError::Compression(e.to_string()))
            }
            Some((tag, _)) => Err(IndexError::CorruptSnapshot(format!(
                "unknown codec tag {tag}"
            ))),
            None => Err(IndexError::CorruptSnapshot("empty index blob".into())),
        }
    }
}

#[derive(Serialize)]
struct IndexBlobRef<'a> {
    schema_version: u16,
    dimension: u32,
    metric: Metric,
    vectors: Vec<&'a [f32]>,
}

#[derive(Deserialize)]
struct IndexBlob {
    schema_version: u16,
    dimension: u32,
    metric: Metric,
    vectors: Vec<Vec<f32>>,
}

#[derive(Serialize)]
struct IdMapRef<'a> {
    id_map: Vec<&'a str>,
}

#[derive(Deserialize)]
struct IdMap {
    id_map: Vec<String>,
}

/// Encode a full snapshot into backend entries.
pub(crate) fn encode_snapshot(
    cfg: &IndexConfig,
    ids: Vec<&str>,
    vectors: Vec<&[f32]>,
) -> Result<Vec<(String, Vec<u8>)>, IndexError> {
    let blob = IndexBlobRef {
        schema_version: INDEX_SCHEMA_VERSION,
        dimension: cfg.dimension as u32,
        metric: cfg.metric,
        vectors,
    };
    let encoded =
        encode_to_vec(&blob, standard()).map_err(|e| IndexError::Encode(e.to_string()))?;
    let compressed = cfg.compression.compress(&encoded)?;

    let id_map = serde_json::to_vec(&IdMapRef { id_map: ids })
        .map_err(|e| IndexError::Encode(e.to_string()))?;

    Ok(vec![
        (INDEX_BLOB_KEY.to_string(), compressed),
        (ID_MAP_KEY.to_string(), id_map),
    ])
}

/// Load a snapshot. `Ok(None)` means nothing has been persisted yet.
pub(crate) fn load_snapshot(
    backend: &dyn SnapshotBackend,
    cfg: &IndexConfig,
) -> Result<Option<(Vec<String>, Vec<Vec<f32>>)>, IndexError> {
    let blob = backend.get(INDEX_BLOB_KEY)?;
    let id_map = backend.get(ID_MAP_KEY)?;

    let (blob, id_map) = match (blob, id_map) {
        (None, None) => return Ok(None),
        (Some(blob), Some(id_map)) => (blob, id_map),
        (Some(_), None) => {
            return Err(IndexError::CorruptSnapshot(
                "index blob present without id map".into(),
            ))
        }
        (None, Some(_)) => {
            return Err(IndexError::CorruptSnapshot(
                "id map present without index blob".into(),
            ))
        }
    };

    let raw = CompressionConfig::decompress(&blob)?;
    let (decoded, _): (IndexBlob, usize) =
        decode_from_slice(&raw, standard()).map_err(|e| IndexError::Decode(e.to_string()))?;

    if decoded.schema_version > INDEX_SCHEMA_VERSION {
        return Err(IndexError::IncompatibleSnapshot(format!(
            "schema version {} is newer than supported {INDEX_SCHEMA_VERSION}",
            decoded.schema_version
        )));
    }
    if decoded.dimension as usize != cfg.dimension {
        return Err(IndexError::IncompatibleSnapshot(format!(
            "snapshot dimension {} does not match configured {}",
            decoded.dimension, cfg.dimension
        )));
    }
    if decoded.metric != cfg.metric {
        return Err(IndexError::IncompatibleSnapshot(format!(
            "snapshot metric {:?} does not match configured {:?}",
            decoded.metric, cfg.metric
        )));
    }

    let ids: IdMap =
        serde_json::from_slice(&id_map).map_err(|e| IndexError::Decode(e.to_string()))?;

    Ok(Some((ids.id_map, decoded.vectors)))
}
