//! Burst address sequencing.
//!
//! Produces the word address for each transferred word of a burst. Three
//! addressing modes are supported:
//!
//! - **Linear**: `start, start + 1, ...` with no window.
//! - **Wrapped**: confined to the aligned window of `wrap` words containing
//!   `start`; after the window end the address returns to the window start.
//! - **Hybrid**: one wrapped-style pass to the end of the window, then a
//!   linear continuation from the first word after the window.

use crate::command::BurstType;

/// Effective addressing mode of a burst.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BurstMode {
    Linear,
    Wrapped,
    Hybrid,
}

impl BurstMode {
    /// Combine the CA burst type with the configuration's hybrid flag.
    pub fn select(burst: BurstType, hybrid_wrap: bool) -> Self {
        match (burst, hybrid_wrap) {
            (BurstType::Linear, _) => BurstMode::Linear,
            (BurstType::Wrapped, false) => BurstMode::Wrapped,
            (BurstType::Wrapped, true) => BurstMode::Hybrid,
        }
    }
}

/// Finite, restartable iterator over the word addresses of one burst.
#[derive(Debug, Clone)]
pub struct BurstSequence {
    start: u64,
    length: u64,
    mode: BurstMode,
    wrap: u64,
    index: u64,
}

impl BurstSequence {
    /// `wrap` is the window size in words; a zero window is treated as one word.
    pub fn new(start: u64, length: u32, mode: BurstMode, wrap: u32) -> Self {
        BurstSequence {
            start,
            length: length as u64,
            mode,
            wrap: (wrap as u64).max(1),
            index: 0,
        }
    }

    /// Rewind to the first address.
    pub fn restart(&mut self) {
        self.index = 0;
    }

    pub fn mode(&self) -> BurstMode {
        self.mode
    }

    /// Number of addresses already produced.
    pub fn position(&self) -> u64 {
        self.index
    }

    pub fn is_exhausted(&self) -> bool {
        self.index >= self.length
    }

    fn address_at(&self, i: u64) -> u64 {
        let offset = self.start % self.wrap;
        let base = self.start - offset;
        match self.mode {
            BurstMode::Linear => self.start + i,
            BurstMode::Wrapped => base + (offset + i) % self.wrap,
            BurstMode::Hybrid => {
                let first_run = self.wrap - offset;
                if i < first_run {
                    self.start + i
                } else {
                    base + self.wrap + (i - first_run)
                }
            }
        }
    }
}

impl Iterator for BurstSequence {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        if self.is_exhausted() {
            return None;
        }
        let addr = self.address_at(self.index);
        self.index += 1;
        Some(addr)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.length.saturating_sub(self.index) as usize;
        (left, Some(left))
    }
}

impl ExactSizeIterator for BurstSequence {}
