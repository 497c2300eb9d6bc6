//! HyperRAM memory array.
//!
//! Byte storage addressed by byte address:
//!
//! | Address Range              | Content                  |
//! |----------------------------|--------------------------|
//! | 0 .. 2^address_width       | Array bytes (reset to 0) |
//!
//! Bus transfers use word addresses; word `w` occupies bytes `2w` (first
//! byte on the bus) and `2w + 1`. Storage is split into 4 KiB pages that are
//! allocated on first write, so a full 32-bit word-addressed device only
//! costs the pages actually touched.

use std::collections::BTreeMap;

use log::warn;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Backing page size in bytes.
pub const PAGE_SIZE: u64 = 4096;

/// Widest supported array: 32-bit word addresses, two bytes per word.
pub const MAX_ADDRESS_WIDTH: u32 = 33;

/// One allocated page, as stored in save states.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryPage {
    /// Byte address of the first byte
    pub base: u64,
    pub data: Vec<u8>,
}

/// Byte-addressable storage behind the device.
pub struct MemoryArray {
    /// Allocated pages keyed by page index
    pages: BTreeMap<u64, Box<[u8]>>,
    /// Number of addressable bytes
    capacity: u64,
    address_width: u32,
}

impl MemoryArray {
    /// Create an array with `2^address_width` bytes. Widths above
    /// [`MAX_ADDRESS_WIDTH`] are clamped to it.
    pub fn new(address_width: u32) -> Self {
        let width = if address_width > MAX_ADDRESS_WIDTH {
            warn!("address width {} clamped to {}", address_width, MAX_ADDRESS_WIDTH);
            MAX_ADDRESS_WIDTH
        } else {
            address_width
        };
        MemoryArray {
            pages: BTreeMap::new(),
            capacity: 1u64 << width,
            address_width: width,
        }
    }

    /// Number of addressable bytes.
    #[inline(always)]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// log2 of the capacity, after clamping.
    pub fn address_width(&self) -> u32 {
        self.address_width
    }

    /// Number of pages currently backed by storage.
    pub fn allocated_pages(&self) -> usize {
        self.pages.len()
    }

    fn page_len(&self) -> usize {
        PAGE_SIZE.min(self.capacity) as usize
    }

    /// Fails unless `address .. address + length` lies inside the array.
    pub fn check_range(&self, address: u64, length: u64) -> Result<()> {
        match address.checked_add(length) {
            Some(end) if end <= self.capacity => Ok(()),
            _ => Err(Error::OutOfRange { address, length, capacity: self.capacity }),
        }
    }

    #[inline(always)]
    fn peek(&self, address: u64) -> u8 {
        self.pages
            .get(&(address / PAGE_SIZE))
            .map_or(0, |p| p[(address % PAGE_SIZE) as usize])
    }

    #[inline(always)]
    fn poke(&mut self, address: u64, value: u8) {
        let len = self.page_len();
        let page = self
            .pages
            .entry(address / PAGE_SIZE)
            .or_insert_with(|| vec![0u8; len].into_boxed_slice());
        page[(address % PAGE_SIZE) as usize] = value;
    }

    /// Read a single byte.
    pub fn read_byte(&self, address: u64) -> Result<u8> {
        self.check_range(address, 1)?;
        Ok(self.peek(address))
    }

    /// Read `length` bytes starting at `address`.
    pub fn read(&self, address: u64, length: usize) -> Result<Vec<u8>> {
        self.check_range(address, length as u64)?;
        Ok((address..address + length as u64).map(|a| self.peek(a)).collect())
    }

    /// Store `bytes` at `address`. Nothing is written if any byte is out of range.
    pub fn write(&mut self, address: u64, bytes: &[u8]) -> Result<()> {
        self.check_range(address, bytes.len() as u64)?;
        for (i, &b) in bytes.iter().enumerate() {
            self.poke(address + i as u64, b);
        }
        Ok(())
    }

    /// Store scattered `(address, byte)` pairs in one pass.
    ///
    /// Every address is checked before the first store, so either all
    /// pairs land or none do.
    pub fn apply(&mut self, writes: &[(u64, u8)]) -> Result<()> {
        for &(address, _) in writes {
            self.check_range(address, 1)?;
        }
        for &(address, value) in writes {
            self.poke(address, value);
        }
        Ok(())
    }

    /// Non-zero pages in address order, for save states.
    pub fn pages(&self) -> Vec<MemoryPage> {
        self.pages
            .iter()
            .filter(|(_, p)| p.iter().any(|&b| b != 0))
            .map(|(&index, p)| MemoryPage { base: index * PAGE_SIZE, data: p.to_vec() })
            .collect()
    }

    /// Replace contents from save-state pages.
    ///
    /// Every page is range checked first; on error the array is unchanged.
    /// Bytes not covered by any page read as zero afterwards.
    pub fn restore(&mut self, pages: Vec<MemoryPage>) -> Result<()> {
        for p in &pages {
            self.check_range(p.base, p.data.len() as u64)?;
        }
        self.pages.clear();
        for p in pages {
            self.write(p.base, &p.data)?;
        }
        Ok(())
    }

    /// Format a hex + ASCII dump, 16 bytes per line.
    ///
    /// The range is clipped to the array.
    pub fn dump(&self, start: u64, length: u64) -> String {
        let mut s = String::new();
        let end = start.saturating_add(length).min(self.capacity);
        let mut addr = start;
        while addr < end {
            let line_end = (addr + 16).min(end);
            s.push_str(&format!("{:08X}: ", addr));
            for i in addr..addr + 16 {
                if i < line_end {
                    s.push_str(&format!("{:02X} ", self.peek(i)));
                } else {
                    s.push_str("   ");
                }
                if i == addr + 7 { s.push(' '); }
            }
            s.push(' ');
            for i in addr..line_end {
                let c = self.peek(i);
                if (0x20..0x7F).contains(&c) {
                    s.push(c as char);
                } else {
                    s.push('.');
                }
            }
            s.push('\n');
            addr += 16;
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_array_reads_zero() {
        let mem = MemoryArray::new(12);
        assert_eq!(mem.capacity(), 4096);
        assert_eq!(mem.read(0x100, 4).unwrap(), vec![0, 0, 0, 0]);
        assert_eq!(mem.allocated_pages(), 0);
        assert!(mem.pages().is_empty());
    }

    #[test]
    fn test_round_trip() {
        let mut mem = MemoryArray::new(12);
        mem.write(0x7FE, &[0xDE, 0xAD, 0xBE, 0xEF]).unwrap();
        assert_eq!(mem.read(0x7FE, 4).unwrap(), vec![0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(mem.read_byte(0x7FF).unwrap(), 0xAD);
    }

    #[test]
    fn test_write_across_page_boundary() {
        let mut mem = MemoryArray::new(16);
        mem.write(PAGE_SIZE - 2, &[1, 2, 3, 4]).unwrap();
        assert_eq!(mem.allocated_pages(), 2);
        assert_eq!(mem.read(PAGE_SIZE - 2, 4).unwrap(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_write_at_end_is_all_or_nothing() {
        let mut mem = MemoryArray::new(8);
        mem.write(0xFE, &[1, 2]).unwrap();
        let err = mem.write(0xFE, &[9, 9, 9]).unwrap_err();
        assert_eq!(err, Error::OutOfRange { address: 0xFE, length: 3, capacity: 0x100 });
        assert_eq!(mem.read(0xFE, 2).unwrap(), vec![1, 2]);
        assert!(mem.read(0x100, 1).is_err());
        assert!(mem.read(u64::MAX, 2).is_err());
    }

    #[test]
    fn test_apply_checks_every_address_first() {
        let mut mem = MemoryArray::new(8);
        let err = mem.apply(&[(0x10, 0xAA), (0x200, 0xBB)]);
        assert!(err.is_err());
        assert_eq!(mem.read_byte(0x10).unwrap(), 0);
        mem.apply(&[(0x10, 0xAA), (0x12, 0xBB)]).unwrap();
        assert_eq!(mem.read(0x10, 3).unwrap(), vec![0xAA, 0x00, 0xBB]);
    }

    #[test]
    fn test_width_is_clamped() {
        let mem = MemoryArray::new(64);
        assert_eq!(mem.address_width(), MAX_ADDRESS_WIDTH);
        assert_eq!(mem.capacity(), 1u64 << 33);
        let mem = MemoryArray::new(u32::MAX);
        assert_eq!(mem.capacity(), 1u64 << 33);
        assert_eq!(MemoryArray::new(MAX_ADDRESS_WIDTH).address_width(), MAX_ADDRESS_WIDTH);
    }

    #[test]
    fn test_full_width_write_touches_one_page() {
        let mut mem = MemoryArray::new(MAX_ADDRESS_WIDTH);
        let last = mem.capacity() - 2;
        mem.write(last, &[0xAB, 0xCD]).unwrap();
        assert_eq!(mem.allocated_pages(), 1);
        assert_eq!(mem.read(last, 2).unwrap(), vec![0xAB, 0xCD]);
        let pages = mem.pages();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].base, mem.capacity() - PAGE_SIZE);
        assert!(mem.write(mem.capacity() - 1, &[1, 2]).is_err());
    }

    #[test]
    fn test_restore_pages() {
        let mut mem = MemoryArray::new(8);
        mem.write(0x80, &[5]).unwrap();
        mem.restore(vec![MemoryPage { base: 0, data: vec![7, 8] }]).unwrap();
        assert_eq!(mem.read(0, 3).unwrap(), vec![7, 8, 0]);
        assert_eq!(mem.read_byte(0x80).unwrap(), 0);

        let err = mem.restore(vec![MemoryPage { base: 0xFF, data: vec![1, 2] }]);
        assert!(matches!(err, Err(Error::OutOfRange { .. })));
        assert_eq!(mem.read_byte(0).unwrap(), 7);

        mem.restore(Vec::new()).unwrap();
        assert_eq!(mem.allocated_pages(), 0);
    }

    #[test]
    fn test_zero_pages_not_saved() {
        let mut mem = MemoryArray::new(16);
        mem.write(0x10, &[0]).unwrap();
        mem.write(0x2000, &[3]).unwrap();
        let pages = mem.pages();
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].base, 0x2000);
        assert_eq!(pages[0].data.len(), PAGE_SIZE as usize);
    }

    #[test]
    fn test_dump_format() {
        let mut mem = MemoryArray::new(8);
        mem.write(0x10, b"Hi!").unwrap();
        let s = mem.dump(0x10, 4);
        assert!(s.starts_with("00000010: 48 69 21 00 "));
        assert!(s.trim_end().ends_with("Hi!."));
    }
}
