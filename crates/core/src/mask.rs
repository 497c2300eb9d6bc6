//! Masked write-burst commit.
//!
//! During a write data phase RWDS carries one mask bit per byte. A low mask
//! bit (`false`) writes the byte; a high bit (`true`) leaves the stored byte
//! untouched.

use crate::error::{Error, Result};
use crate::memory::MemoryArray;

/// Applies buffered write-burst bytes to memory.
pub struct WriteMasker;

impl WriteMasker {
    /// Commit `data` to the byte `addresses`, skipping bytes whose `mask` bit
    /// is set.
    ///
    /// All three slices must be the same length. The commit is a single
    /// all-or-nothing store: on any error memory is unchanged.
    pub fn commit(
        memory: &mut MemoryArray,
        addresses: &[u64],
        data: &[u8],
        mask: &[bool],
    ) -> Result<usize> {
        if mask.len() != data.len() {
            return Err(Error::MaskLengthMismatch { data: data.len(), mask: mask.len() });
        }
        if addresses.len() != data.len() {
            return Err(Error::MaskLengthMismatch { data: addresses.len(), mask: mask.len() });
        }
        let writes: Vec<(u64, u8)> = addresses
            .iter()
            .zip(data)
            .zip(mask)
            .filter(|(_, &skip)| !skip)
            .map(|((&addr, &byte), _)| (addr, byte))
            .collect();
        memory.apply(&writes)?;
        Ok(writes.len())
    }
}
