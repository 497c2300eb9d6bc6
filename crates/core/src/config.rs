//! Configuration register 0 (CR0).
//!
//! ```text
//!  15   14..12   11..8     7..4        3       2..1      0
//! DPD   drive   reserved  latency   fixed    burst    hybrid
//! ```
//!
//! All fields are decoded from one 16-bit value. A register write replaces
//! every field in a single assignment, so an observer never sees a mix of
//! old and new fields.

use serde::{Deserialize, Serialize};

const DPD_BIT: u16 = 1 << 15;
const DRIVE_SHIFT: u16 = 12;
const DRIVE_MASK: u16 = 0x7;
const LATENCY_SHIFT: u16 = 4;
const LATENCY_MASK: u16 = 0xF;
const FIXED_BIT: u16 = 1 << 3;
const BURST_SHIFT: u16 = 1;
const BURST_MASK: u16 = 0x3;
const HYBRID_BIT: u16 = 1 << 0;

/// Power-on value: 4-cycle fixed latency, 32-word bursts, legacy wrap.
pub const POWER_ON_VALUE: u16 = 0x00FE;

/// Longest supported initial latency; reserved codes decode to it.
pub const MAX_LATENCY_CYCLES: u32 = 7;

/// Decode a 4-bit initial latency code into clock cycles.
pub fn latency_from_code(code: u8) -> u32 {
    match code & 0xF {
        0b0000 => 5,
        0b0001 => 6,
        0b0010 => 7,
        0b1110 => 3,
        0b1111 => 4,
        _ => MAX_LATENCY_CYCLES,
    }
}

/// Burst length in words for a 2-bit code.
pub fn burst_words_from_code(code: u8) -> u32 {
    match code & 0x3 {
        0b00 => 128,
        0b01 => 64,
        0b10 => 16,
        _ => 32,
    }
}

/// Decoded CR0 fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFields {
    pub deep_power_down: bool,
    /// 3-bit output drive strength code
    pub output_drive_strength: u8,
    /// 4-bit initial latency code (see [`latency_from_code`])
    pub initial_latency: u8,
    pub fixed_latency: bool,
    /// 2-bit burst length code (see [`burst_words_from_code`])
    pub burst_length: u8,
    pub hybrid_wrap: bool,
}

impl ConfigFields {
    pub fn decode(raw: u16) -> Self {
        ConfigFields {
            deep_power_down: raw & DPD_BIT != 0,
            output_drive_strength: ((raw >> DRIVE_SHIFT) & DRIVE_MASK) as u8,
            initial_latency: ((raw >> LATENCY_SHIFT) & LATENCY_MASK) as u8,
            fixed_latency: raw & FIXED_BIT != 0,
            burst_length: ((raw >> BURST_SHIFT) & BURST_MASK) as u8,
            hybrid_wrap: raw & HYBRID_BIT != 0,
        }
    }

    /// Pack the fields back into the register layout. Reserved bits read 0.
    pub fn encode(&self) -> u16 {
        ((self.deep_power_down as u16) << 15)
            | ((self.output_drive_strength as u16 & DRIVE_MASK) << DRIVE_SHIFT)
            | ((self.initial_latency as u16 & LATENCY_MASK) << LATENCY_SHIFT)
            | ((self.fixed_latency as u16) << 3)
            | ((self.burst_length as u16 & BURST_MASK) << BURST_SHIFT)
            | (self.hybrid_wrap as u16)
    }

    /// Initial latency in clock cycles.
    pub fn initial_latency_cycles(&self) -> u32 {
        latency_from_code(self.initial_latency)
    }

    /// Burst length in words.
    pub fn burst_words(&self) -> u32 {
        burst_words_from_code(self.burst_length)
    }
}

/// The device configuration register.
#[derive(Debug, Clone)]
pub struct ConfigRegister {
    fields: ConfigFields,
}

impl ConfigRegister {
    pub fn new() -> Self {
        Self::with_value(POWER_ON_VALUE)
    }

    pub fn with_value(raw: u16) -> Self {
        ConfigRegister { fields: ConfigFields::decode(raw) }
    }

    /// Decode `raw` and replace all fields.
    pub fn apply(&mut self, raw: u16) {
        self.fields = ConfigFields::decode(raw);
    }

    /// Copy of the current field set.
    pub fn snapshot(&self) -> ConfigFields {
        self.fields
    }

    /// Current fields packed into the 16-bit layout.
    pub fn raw(&self) -> u16 {
        self.fields.encode()
    }

    pub fn reset(&mut self) {
        *self = ConfigRegister::new();
    }

    /// Latency wait in clock cycles after CA capture.
    ///
    /// Fixed latency always uses the doubled count. Variable latency doubles
    /// only when the additional-latency indicator was seen during CA.
    pub fn latency_cycles(&self, additional: bool) -> u32 {
        let initial = self.fields.initial_latency_cycles();
        if self.fields.fixed_latency || additional {
            initial * 2
        } else {
            initial
        }
    }

    /// Wrap window in words for wrapped and hybrid bursts.
    pub fn wrap_words(&self) -> u32 {
        self.fields.burst_words()
    }

    pub fn hybrid_wrap(&self) -> bool {
        self.fields.hybrid_wrap
    }

    pub fn deep_power_down(&self) -> bool {
        self.fields.deep_power_down
    }
}

impl Default for ConfigRegister {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_on_defaults() {
        let cr = ConfigRegister::new();
        let f = cr.snapshot();
        assert!(!f.deep_power_down);
        assert_eq!(f.output_drive_strength, 0);
        assert_eq!(f.initial_latency_cycles(), 4);
        assert!(f.fixed_latency);
        assert_eq!(f.burst_words(), 32);
        assert!(!f.hybrid_wrap);
        assert_eq!(cr.raw(), POWER_ON_VALUE);
    }

    #[test]
    fn test_apply_0431() {
        let mut cr = ConfigRegister::new();
        cr.apply(0x0431);
        let f = cr.snapshot();
        assert!(!f.deep_power_down);
        assert_eq!(f.output_drive_strength, 0);
        assert_eq!(f.initial_latency, 3);
        assert_eq!(f.initial_latency_cycles(), MAX_LATENCY_CYCLES);
        assert!(!f.fixed_latency);
        assert_eq!(f.burst_length, 0b00);
        assert_eq!(f.burst_words(), 128);
        assert!(f.hybrid_wrap);
        // bit 10 is reserved and dropped on read-back
        assert_eq!(cr.raw(), 0x0031);
    }

    #[test]
    fn test_apply_all_fields_set() {
        let mut cr = ConfigRegister::new();
        cr.apply(0xF0E5);
        let f = cr.snapshot();
        assert!(f.deep_power_down);
        assert_eq!(f.output_drive_strength, 0b111);
        assert_eq!(f.initial_latency, 0b1110);
        assert_eq!(f.initial_latency_cycles(), 3);
        assert!(!f.fixed_latency);
        assert_eq!(f.burst_words(), 16);
        assert!(f.hybrid_wrap);
        assert_eq!(cr.raw(), 0xF0E5);
    }

    #[test]
    fn test_apply_is_idempotent() {
        let mut cr = ConfigRegister::new();
        cr.apply(0x8F1C);
        let first = cr.snapshot();
        cr.apply(0x8F1C);
        assert_eq!(cr.snapshot(), first);
    }

    #[test]
    fn test_latency_policy() {
        let mut cr = ConfigRegister::new();
        // fixed, 4 cycles
        assert_eq!(cr.latency_cycles(false), 8);
        assert_eq!(cr.latency_cycles(true), 8);
        // variable, 6 cycles
        cr.apply(0x0016);
        assert_eq!(cr.latency_cycles(false), 6);
        assert_eq!(cr.latency_cycles(true), 12);
    }

    #[test]
    fn test_code_tables() {
        assert_eq!(latency_from_code(0b0000), 5);
        assert_eq!(latency_from_code(0b0010), 7);
        assert_eq!(latency_from_code(0b1000), MAX_LATENCY_CYCLES);
        assert_eq!(burst_words_from_code(0b10), 16);
        assert_eq!(burst_words_from_code(0b11), 32);
    }
}
