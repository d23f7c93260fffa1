//! Snapshot format
//!
//! Captures exactly the controller's register file; everything derived
//! (decoded attributes, pending-set order, raw line levels) is
//! reconstructed deterministically on restore. Byte encoding is
//! bincode compressed with zstd, matching the embedding simulator's
//! snapshot pipeline.

use serde::{Deserialize, Serialize};

/// ECLIC register-file snapshot.
///
/// The four per-source vectors are indexed by source id and must all
/// have the controller's `num_sources` length for `restore` to accept
/// the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EclicSnapshot {
    /// Version for compatibility checking
    pub version: u32,
    /// Global config byte (nlbits)
    pub cliccfg: u8,
    /// Threshold register
    pub mth: u8,
    /// Per-source pending bits
    pub clicintip: Vec<u8>,
    /// Per-source enable bits
    pub clicintie: Vec<u8>,
    /// Per-source attr bytes (trigger mode + shv)
    pub clicintattr: Vec<u8>,
    /// Per-source ctl bytes (level/priority)
    pub clicintctl: Vec<u8>,
}

impl EclicSnapshot {
    /// Current snapshot version
    pub const VERSION: u32 = 1;

    /// Serialize to bytes (compressed with zstd)
    pub fn to_bytes(&self) -> Result<Vec<u8>, String> {
        let serialized = bincode::serialize(self)
            .map_err(|e| format!("Serialization error: {}", e))?;

        zstd::stream::encode_all(&serialized[..], 3)
            .map_err(|e| format!("Compression error: {}", e))
    }

    /// Deserialize from bytes (compressed with zstd)
    pub fn from_bytes(data: &[u8]) -> Result<Self, String> {
        let decompressed = zstd::stream::decode_all(data)
            .map_err(|e| format!("Decompression error: {}", e))?;

        bincode::deserialize(&decompressed)
            .map_err(|e| format!("Deserialization error: {}", e))
    }
}
