//! Host controller model.
//!
//! Builds the per-edge stimulus a HyperBus master would produce for register
//! and memory accesses. The controller keeps its own copy of the
//! configuration it has programmed so it knows how many latency edges to
//! insert before the data phase.

use crate::bus::{Dq, Drive};
use crate::command::{AddressSpace, BurstType, CommandAddress, Operation};
use crate::config::ConfigRegister;
use crate::device::{ID0_ADDR, ID1_ADDR};
use crate::error::{Error, Result};
use crate::WORD_BYTES;

/// One host action. Clock edges come from the simulator's clock; the host
/// only decides what it drives on them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Assert CS#
    Select,
    /// Deassert CS# and release DQ/RWDS
    Deselect,
    /// One clock edge with the host drive levels for it
    Clock {
        dq: Drive<Dq>,
        rwds: Drive<bool>,
        /// Collect the device-driven DQ value after this edge
        capture: bool,
    },
}

impl Step {
    fn drive(byte: u8, rwds: bool) -> Self {
        Step::Clock { dq: Drive::Value(Dq::from(byte)), rwds: Drive::Value(rwds), capture: false }
    }

    fn idle() -> Self {
        Step::Clock { dq: Drive::HighZ, rwds: Drive::HighZ, capture: false }
    }

    fn capture() -> Self {
        Step::Clock { dq: Drive::HighZ, rwds: Drive::HighZ, capture: true }
    }
}

#[derive(Debug, Clone)]
pub struct HostController {
    /// Latency and burst settings as last programmed by this host
    config: ConfigRegister,
    /// Assert RWDS during CA to request additional latency
    pub additional_latency: bool,
}

impl HostController {
    pub fn new(power_on_register: u16) -> Self {
        HostController {
            config: ConfigRegister::with_value(power_on_register),
            additional_latency: false,
        }
    }

    pub fn config(&self) -> &ConfigRegister {
        &self.config
    }

    /// Forget programmed settings after a device reset.
    pub fn reset(&mut self, power_on_register: u16) {
        self.config.apply(power_on_register);
    }

    fn ca_phase(&self, command: &CommandAddress) -> Vec<Step> {
        let mut steps = vec![Step::Select];
        steps.extend(command.to_bytes().iter().map(|&b| Step::drive(b, self.additional_latency)));
        steps
    }

    /// Edges between the last CA byte and the first data byte.
    pub fn latency_edges(&self, command: &CommandAddress) -> u32 {
        if command.space == AddressSpace::Register && command.operation == Operation::Write {
            0
        } else {
            self.config.latency_cycles(self.additional_latency) * 2
        }
    }

    /// Longest memory transfer the device accepts in one burst, in bytes.
    pub fn burst_bytes(&self) -> usize {
        self.config.wrap_words() as usize * WORD_BYTES
    }

    fn check_burst(&self, bytes: usize) -> Result<()> {
        let burst = self.burst_bytes();
        if bytes > burst {
            return Err(Error::BurstOverrun { requested: bytes, burst });
        }
        Ok(())
    }

    fn with_latency(&self, command: &CommandAddress) -> Vec<Step> {
        let mut steps = self.ca_phase(command);
        steps.extend((0..self.latency_edges(command)).map(|_| Step::idle()));
        steps
    }

    /// Read `words` words starting at word address `address`. At most one
    /// configured burst.
    pub fn read_mem(&self, address: u32, words: usize, burst: BurstType) -> Result<Vec<Step>> {
        self.check_burst(words * WORD_BYTES)?;
        let command = CommandAddress {
            operation: Operation::Read,
            space: AddressSpace::Memory,
            burst,
            address,
        };
        let mut steps = self.with_latency(&command);
        steps.extend((0..words * WORD_BYTES).map(|_| Step::capture()));
        steps.push(Step::Deselect);
        Ok(steps)
    }

    /// Write `data` starting at word address `address`. `mask[i] == true`
    /// leaves byte `i` unwritten. `data` must fit in one configured burst.
    pub fn write_mem(
        &self,
        address: u32,
        data: &[u8],
        mask: Option<&[bool]>,
        burst: BurstType,
    ) -> Result<Vec<Step>> {
        if let Some(m) = mask {
            if m.len() != data.len() {
                return Err(Error::MaskLengthMismatch { data: data.len(), mask: m.len() });
            }
        }
        self.check_burst(data.len())?;
        let command = CommandAddress {
            operation: Operation::Write,
            space: AddressSpace::Memory,
            burst,
            address,
        };
        let mut steps = self.with_latency(&command);
        for (i, &b) in data.iter().enumerate() {
            let skip = mask.map_or(false, |m| m[i]);
            steps.push(Step::drive(b, skip));
        }
        steps.push(Step::Deselect);
        Ok(steps)
    }

    /// Read one register word.
    pub fn read_reg(&self, address: u32) -> Vec<Step> {
        let command = CommandAddress {
            operation: Operation::Read,
            space: AddressSpace::Register,
            burst: BurstType::Linear,
            address,
        };
        let mut steps = self.with_latency(&command);
        steps.extend((0..WORD_BYTES).map(|_| Step::capture()));
        steps.push(Step::Deselect);
        steps
    }

    /// Write one register word and update the host's view of the
    /// configuration.
    pub fn write_reg(&mut self, address: u32, value: u16) -> Vec<Step> {
        let command = CommandAddress {
            operation: Operation::Write,
            space: AddressSpace::Register,
            burst: BurstType::Linear,
            address,
        };
        let mut steps = self.with_latency(&command);
        steps.extend(value.to_be_bytes().iter().map(|&b| Step::drive(b, false)));
        steps.push(Step::Deselect);
        if address != ID0_ADDR && address != ID1_ADDR {
            self.config.apply(value);
        }
        steps
    }

    /// Start a write and deassert CS# after `ca_bytes` CA bytes.
    pub fn abort_after(&self, ca_bytes: usize) -> Vec<Step> {
        let command = CommandAddress {
            operation: Operation::Write,
            space: AddressSpace::Memory,
            burst: BurstType::Linear,
            address: 0,
        };
        let mut steps = self.ca_phase(&command);
        steps.truncate(1 + ca_bytes.min(crate::CA_BYTES));
        steps.push(Step::Deselect);
        steps
    }
}
