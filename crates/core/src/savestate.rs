//! Device save states.
//!
//! Captures the memory array and configuration register so a simulation can
//! be checkpointed and resumed. In-flight transaction state is never saved;
//! a restored device always starts idle.
//!
//! ## File format
//!
//! ```text
//! +------------------+
//! | Magic "HBSS"     |  4 bytes
//! +------------------+
//! | Format version   |  u32 little-endian (currently 1)
//! +------------------+
//! | Address width    |  u8
//! +------------------+
//! | Compressed data  |  deflate-compressed bincode payload
//! +------------------+
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::memory::MemoryPage;

/// Magic bytes identifying a save state file.
const MAGIC: &[u8; 4] = b"HBSS";
/// Current save state format version.
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 9;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceState {
    pub address_width: u32,
    pub config_raw: u16,
    /// Non-zero pages of the array
    pub memory: Vec<MemoryPage>,
}

#[derive(Debug, Error)]
pub enum SaveStateError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialize error: {0}")]
    Encode(#[from] bincode::Error),
    #[error("decompress error: {0}")]
    Decompress(String),
    #[error("file too small")]
    TooSmall,
    #[error("invalid save state file (bad magic)")]
    BadMagic,
    #[error("unsupported save state version {found} (expected {expected})")]
    Version { found: u32, expected: u32 },
    #[error("address width mismatch: save={found} current={expected}")]
    Width { found: u8, expected: u8 },
}

/// Encode a state into the file format.
pub fn encode(state: &DeviceState) -> Result<Vec<u8>, SaveStateError> {
    let payload = bincode::serialize(state)?;
    let compressed = miniz_oxide::deflate::compress_to_vec(&payload, 6);

    let mut out = Vec::with_capacity(HEADER_LEN + compressed.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.push(state.address_width as u8);
    out.extend_from_slice(&compressed);
    Ok(out)
}

/// Decode the file format, verifying magic, version and address width.
pub fn decode(data: &[u8], expected_width: u32) -> Result<DeviceState, SaveStateError> {
    if data.len() < HEADER_LEN {
        return Err(SaveStateError::TooSmall);
    }
    if &data[0..4] != MAGIC {
        return Err(SaveStateError::BadMagic);
    }
    let version = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
    if version != FORMAT_VERSION {
        return Err(SaveStateError::Version { found: version, expected: FORMAT_VERSION });
    }
    if data[8] as u32 != expected_width {
        return Err(SaveStateError::Width { found: data[8], expected: expected_width as u8 });
    }

    let decompressed = miniz_oxide::inflate::decompress_to_vec(&data[HEADER_LEN..])
        .map_err(|e| SaveStateError::Decompress(format!("{:?}", e)))?;
    Ok(bincode::deserialize(&decompressed)?)
}

/// Save state to file.
pub fn save_to_file(state: &DeviceState, path: &Path) -> Result<(), SaveStateError> {
    std::fs::write(path, encode(state)?)?;
    Ok(())
}

/// Load state from file.
pub fn load_from_file(path: &Path, expected_width: u32) -> Result<DeviceState, SaveStateError> {
    let data = std::fs::read(path)?;
    decode(&data, expected_width)
}
