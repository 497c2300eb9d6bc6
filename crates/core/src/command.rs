//! Command-Address (CA) packet decoding.
//!
//! A CA packet is 48 bits, transferred most significant byte first over
//! three clock cycles (one byte per edge):
//!
//! | Bits  | Field                                        |
//! |-------|----------------------------------------------|
//! | 47    | R/W#: 1 = read, 0 = write                    |
//! | 46    | Address space: 1 = memory, 0 = register      |
//! | 45    | Burst type: 0 = linear, 1 = wrapped          |
//! | 44:16 | Row and upper column address (29 bits)       |
//! | 15:3  | Reserved                                     |
//! | 2:0   | Lower column address (3 bits)                |
//!
//! The word address is `(CA[44:16] << 3) | CA[2:0]`, 32 bits in total.

use crate::error::Error;
use crate::CA_BYTES;

const RW_BIT: u32 = 47;
const SPACE_BIT: u32 = 46;
const BURST_BIT: u32 = 45;
const UPPER_SHIFT: u32 = 16;
const UPPER_MASK: u64 = 0x1FFF_FFFF;
const LOWER_MASK: u64 = 0x7;
const LOWER_BITS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Read,
    Write,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressSpace {
    Memory,
    Register,
}

/// Burst type requested by the CA packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BurstType {
    Linear,
    Wrapped,
}

impl TryFrom<u8> for BurstType {
    type Error = Error;

    fn try_from(code: u8) -> Result<Self, Error> {
        match code {
            0 => Ok(BurstType::Linear),
            1 => Ok(BurstType::Wrapped),
            other => Err(Error::MalformedBurstType(other)),
        }
    }
}

/// Decoded CA packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandAddress {
    pub operation: Operation,
    pub space: AddressSpace,
    pub burst: BurstType,
    /// Word address
    pub address: u32,
}

impl CommandAddress {
    /// Decode a 48-bit CA value. Bits above 47 and reserved bits are ignored.
    pub fn decode(ca: u64) -> Self {
        let bit = |n: u32| (ca >> n) & 1 != 0;
        let upper = (ca >> UPPER_SHIFT) & UPPER_MASK;
        let lower = ca & LOWER_MASK;
        CommandAddress {
            operation: if bit(RW_BIT) { Operation::Read } else { Operation::Write },
            space: if bit(SPACE_BIT) { AddressSpace::Memory } else { AddressSpace::Register },
            burst: if bit(BURST_BIT) { BurstType::Wrapped } else { BurstType::Linear },
            address: ((upper << LOWER_BITS) | lower) as u32,
        }
    }

    /// Decode from bytes in bus order (first captured byte = CA[47:40]).
    pub fn from_bytes(bytes: [u8; CA_BYTES]) -> Self {
        let ca = bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64);
        Self::decode(ca)
    }

    /// Encode into a 48-bit CA value with reserved bits cleared.
    pub fn encode(&self) -> u64 {
        let addr = self.address as u64;
        ((matches!(self.operation, Operation::Read) as u64) << RW_BIT)
            | ((matches!(self.space, AddressSpace::Memory) as u64) << SPACE_BIT)
            | ((matches!(self.burst, BurstType::Wrapped) as u64) << BURST_BIT)
            | (((addr >> LOWER_BITS) & UPPER_MASK) << UPPER_SHIFT)
            | (addr & LOWER_MASK)
    }

    /// Bytes in bus order.
    pub fn to_bytes(&self) -> [u8; CA_BYTES] {
        let ca = self.encode();
        let mut out = [0u8; CA_BYTES];
        for (i, b) in out.iter_mut().enumerate() {
            *b = (ca >> (8 * (CA_BYTES - 1 - i))) as u8;
        }
        out
    }

    pub fn is_read(&self) -> bool {
        self.operation == Operation::Read
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_register_read() {
        let ca = CommandAddress::from_bytes([0x80, 0x00, 0x02, 0x00, 0x00, 0x00]);
        assert_eq!(ca.operation, Operation::Read);
        assert_eq!(ca.space, AddressSpace::Register);
        assert_eq!(ca.burst, BurstType::Linear);
        assert_eq!(ca.address, 0x1000);
    }

    #[test]
    fn test_decode_memory_wrapped_write() {
        // write, memory, wrapped, upper = 0x1234567, lower = 5
        let ca = (1u64 << 46) | (1u64 << 45) | (0x123_4567u64 << 16) | 0x5;
        let d = CommandAddress::decode(ca);
        assert_eq!(d.operation, Operation::Write);
        assert_eq!(d.space, AddressSpace::Memory);
        assert_eq!(d.burst, BurstType::Wrapped);
        assert_eq!(d.address, (0x123_4567 << 3) | 5);
    }

    #[test]
    fn test_reserved_bits_ignored() {
        let clean = 0xE000_0002_0003u64;
        let noisy = clean | 0xFFF8 | (0xFFFFu64 << 48);
        assert_eq!(CommandAddress::decode(clean), CommandAddress::decode(noisy));
    }

    #[test]
    fn test_full_width_address() {
        let ca = CommandAddress {
            operation: Operation::Read,
            space: AddressSpace::Memory,
            burst: BurstType::Linear,
            address: 0xFFFF_FFFF,
        };
        assert_eq!(ca.encode(), 0xDFFF_FFFF_0007);
        assert_eq!(CommandAddress::from_bytes(ca.to_bytes()), ca);
    }

    #[test]
    fn test_lower_column_bits() {
        let bytes = CommandAddress {
            operation: Operation::Write,
            space: AddressSpace::Memory,
            burst: BurstType::Linear,
            address: 0x0000_000B,
        }
        .to_bytes();
        // upper column 1 lands in CA[16], lower column 3 in CA[2:0]
        assert_eq!(bytes, [0x40, 0x00, 0x00, 0x01, 0x00, 0x03]);
    }

    #[test]
    fn test_burst_type_codes() {
        assert_eq!(BurstType::try_from(0).unwrap(), BurstType::Linear);
        assert_eq!(BurstType::try_from(1).unwrap(), BurstType::Wrapped);
        assert_eq!(BurstType::try_from(2), Err(Error::MalformedBurstType(2)));
    }
}
