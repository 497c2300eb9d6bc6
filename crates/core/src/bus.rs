//! HyperBus signal model.
//!
//! The device sees the bus through the [`BusPort`] trait: it samples the
//! 8-bit DQ lines and the RWDS strobe, and drives either a value or high
//! impedance back. [`Wires`] is a shared-line implementation with separate
//! host-side and device-side drivers, used by the simulator.

/// Fixed-width bit vector. Values are masked to `N` bits on construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Bits<const N: u32>(u32);

impl<const N: u32> Bits<N> {
    pub const WIDTH: u32 = N;

    const MASK: u32 = if N >= 32 { u32::MAX } else { (1u32 << N) - 1 };

    pub fn new(value: u32) -> Self {
        Bits(value & Self::MASK)
    }

    pub fn value(self) -> u32 {
        self.0
    }

    pub fn bit(self, n: u32) -> bool {
        n < N && (self.0 >> n) & 1 != 0
    }
}

/// The 8 DQ lines.
pub type Dq = Bits<8>;

impl Dq {
    pub fn byte(self) -> u8 {
        self.0 as u8
    }
}

impl From<u8> for Dq {
    fn from(b: u8) -> Self {
        Bits(b as u32)
    }
}

/// A driver's output: a value or high impedance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drive<T> {
    Value(T),
    HighZ,
}

impl<T> Default for Drive<T> {
    fn default() -> Self {
        Drive::HighZ
    }
}

impl<T: Copy> Drive<T> {
    pub fn value(self) -> Option<T> {
        match self {
            Drive::Value(v) => Some(v),
            Drive::HighZ => None,
        }
    }

    pub fn is_high_z(self) -> bool {
        matches!(self, Drive::HighZ)
    }
}

/// Bus event delivered to the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    /// CS# asserted (active low)
    ChipSelectFall,
    /// CS# deasserted
    ChipSelectRise,
    ClockRise,
    ClockFall,
}

impl Edge {
    pub fn is_clock(self) -> bool {
        matches!(self, Edge::ClockRise | Edge::ClockFall)
    }
}

/// Device-side view of the bus.
pub trait BusPort {
    /// Sample the DQ lines.
    fn sample_dq(&mut self) -> Dq;
    /// Sample the RWDS line.
    fn sample_rwds(&mut self) -> bool;
    fn drive_dq(&mut self, value: Drive<Dq>);
    fn drive_rwds(&mut self, level: Drive<bool>);

    /// Put DQ and RWDS into high impedance.
    fn release(&mut self) {
        self.drive_dq(Drive::HighZ);
        self.drive_rwds(Drive::HighZ);
    }
}

/// Shared bus lines with one host driver and one device driver per line.
///
/// Sampling resolves the host drive first, then the device drive, and
/// reads undriven lines as low (weak pull-down).
#[derive(Debug, Clone)]
pub struct Wires {
    /// CS# level; `true` = deasserted
    pub cs_n: bool,
    pub host_dq: Drive<Dq>,
    pub host_rwds: Drive<bool>,
    pub device_dq: Drive<Dq>,
    pub device_rwds: Drive<bool>,
}

impl Wires {
    pub fn new() -> Self {
        Wires {
            cs_n: true,
            host_dq: Drive::HighZ,
            host_rwds: Drive::HighZ,
            device_dq: Drive::HighZ,
            device_rwds: Drive::HighZ,
        }
    }

    /// Resolved DQ value.
    pub fn dq(&self) -> Dq {
        self.host_dq.value().or(self.device_dq.value()).unwrap_or_default()
    }

    /// Resolved RWDS level.
    pub fn rwds(&self) -> bool {
        self.host_rwds.value().or(self.device_rwds.value()).unwrap_or(false)
    }

    /// True if two drivers fight over DQ.
    pub fn dq_contention(&self) -> bool {
        !self.host_dq.is_high_z() && !self.device_dq.is_high_z()
    }
}

impl Default for Wires {
    fn default() -> Self {
        Self::new()
    }
}

impl BusPort for Wires {
    fn sample_dq(&mut self) -> Dq {
        self.dq()
    }

    fn sample_rwds(&mut self) -> bool {
        self.rwds()
    }

    fn drive_dq(&mut self, value: Drive<Dq>) {
        self.device_dq = value;
    }

    fn drive_rwds(&mut self, level: Drive<bool>) {
        self.device_rwds = level;
    }
}
