//! Error taxonomy for device operations.
//!
//! Aborted transactions are not errors: a chip-select deassertion during CA
//! capture or the latency wait is reported as [`crate::device::Outcome::Aborted`].

use thiserror::Error;

/// Errors surfaced to the caller of a device operation.
///
/// None of these leave the device in a stuck state; the transaction state
/// machine always returns to idle before the error is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// An access touched bytes beyond the end of the memory array.
    #[error("access of {length} byte(s) at {address:#x} exceeds capacity {capacity:#x}")]
    OutOfRange { address: u64, length: u64, capacity: u64 },

    /// Write data, mask, and address streams disagree in length.
    #[error("write mask covers {mask} byte(s) but {data} byte(s) were transferred")]
    MaskLengthMismatch { data: usize, mask: usize },

    /// A raw burst-type code outside {Linear, Wrapped}.
    #[error("reserved burst type encoding {0:#x}")]
    MalformedBurstType(u8),

    /// A host transfer longer than one configured burst.
    #[error("transfer of {requested} byte(s) exceeds the {burst}-byte burst")]
    BurstOverrun { requested: usize, burst: usize },

    /// The device moved fewer (or more) data bytes than the host expected,
    /// usually because host and device disagree on latency.
    #[error("expected {expected} data byte(s), device transferred {received}")]
    ShortTransfer { expected: usize, received: usize },

    /// A save state built for a different array size.
    #[error("state is for a {found}-bit array, device has {expected} bits")]
    WidthMismatch { found: u32, expected: u32 },
}

pub type Result<T> = std::result::Result<T, Error>;
