//! HyperRAM device: the transaction state machine.
//!
//! One transaction runs per chip-select assertion:
//!
//! ```text
//! Idle --CS#↓--> CaCapture --6 bytes--> Latency --N edges--> ReadData / WriteData --> Idle
//!                    |                     |
//!                    +------- CS#↑ --------+--> Idle (aborted, no side effects)
//! ```
//!
//! - CA bytes are sampled on every clock edge (DDR, two per cycle). RWDS
//!   high during any CA edge requests additional latency.
//! - The latency wait comes from [`ConfigRegister::latency_cycles`], counted
//!   as two edges per cycle. Register writes have no latency.
//! - Reads drive one byte per edge with RWDS high on the first byte of each
//!   word and low on the second, for the configured burst length.
//! - Writes sample one data byte and one RWDS mask bit per edge and commit
//!   the whole burst through [`WriteMasker`] when CS# rises or the burst
//!   runs out.
//! - Register space bypasses the memory array. Word address 0 and 1 are the
//!   read-only identification registers; every other address reaches CR0.

use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};

use crate::burst::{BurstMode, BurstSequence};
use crate::bus::{BusPort, Dq, Drive, Edge};
use crate::command::{AddressSpace, CommandAddress};
use crate::config::{ConfigRegister, POWER_ON_VALUE};
use crate::error::{Error, Result};
use crate::mask::WriteMasker;
use crate::memory::MemoryArray;
use crate::{CA_BYTES, WORD_BYTES};

/// Identification register 0 (word address 0x0000)
pub const ID0_ADDR: u32 = 0x0000;
/// Identification register 1 (word address 0x0001)
pub const ID1_ADDR: u32 = 0x0001;
/// Canonical configuration register 0 address
pub const CR0_ADDR: u32 = 0x0800;

const ID0_VALUE: u16 = 0x0C81;
const ID1_VALUE: u16 = 0x0000;

/// Device construction parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// log2 of the array size in bytes
    pub address_width: u32,
    /// CR0 value loaded at power-on and on reset
    pub power_on_register: u16,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        // 64 Mbit part
        DeviceConfig { address_width: 23, power_on_register: POWER_ON_VALUE }
    }
}

/// Externally visible transaction phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    CaCapture,
    Latency,
    ReadData,
    WriteData,
}

/// Result of a finished transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed(TransactionSummary),
    /// CS# rose during CA capture or the latency wait, or fell again
    /// before the transaction finished; nothing was committed
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionSummary {
    pub command: CommandAddress,
    pub mode: BurstMode,
    /// Bytes driven (reads) or sampled (writes) during the data phase
    pub bytes: usize,
    pub additional_latency: bool,
    pub latency_cycles: u32,
}

/// Data-phase bookkeeping for one burst.
#[derive(Debug)]
struct DataPhase {
    command: CommandAddress,
    additional: bool,
    latency_cycles: u32,
    seq: BurstSequence,
    /// Word address currently on the bus
    word: u64,
    /// Bytes of the word being driven (reads)
    word_bytes: [u8; WORD_BYTES],
    /// 0 = first byte of the word, 1 = second
    half: usize,
    transferred: usize,
    addresses: Vec<u64>,
    data: Vec<u8>,
    mask: Vec<bool>,
}

#[derive(Debug)]
enum TxState {
    Idle,
    CaCapture { bytes: [u8; CA_BYTES], count: usize, additional: bool },
    Latency { command: CommandAddress, remaining: u32, additional: bool, cycles: u32 },
    ReadData(DataPhase),
    WriteData(DataPhase),
}

/// HyperRAM device model.
pub struct HyperRam {
    memory: MemoryArray,
    config: ConfigRegister,
    state: TxState,
    power_on_register: u16,
    /// Transactions that reached the data phase and finished
    pub completed: u64,
    /// Transactions dropped by an early CS# rise
    pub aborted: u64,
}

impl HyperRam {
    pub fn new(cfg: DeviceConfig) -> Self {
        HyperRam {
            memory: MemoryArray::new(cfg.address_width),
            config: ConfigRegister::with_value(cfg.power_on_register),
            state: TxState::Idle,
            power_on_register: cfg.power_on_register,
            completed: 0,
            aborted: 0,
        }
    }

    pub fn memory(&self) -> &MemoryArray {
        &self.memory
    }

    pub fn config(&self) -> &ConfigRegister {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        match self.state {
            TxState::Idle => Phase::Idle,
            TxState::CaCapture { .. } => Phase::CaCapture,
            TxState::Latency { .. } => Phase::Latency,
            TxState::ReadData(_) => Phase::ReadData,
            TxState::WriteData(_) => Phase::WriteData,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, TxState::Idle)
    }

    // --- Direct access (bypasses the bus) ---

    /// Read `length` bytes at byte `address`.
    pub fn read(&self, address: u64, length: usize) -> Result<Vec<u8>> {
        self.memory.read(address, length)
    }

    /// Write `bytes` at byte `address`.
    pub fn write(&mut self, address: u64, bytes: &[u8]) -> Result<()> {
        self.memory.write(address, bytes)
    }

    /// Replace the configuration register.
    pub fn configure(&mut self, raw: u16) {
        debug!("CR0 <- {:#06X}", raw);
        self.config.apply(raw);
    }

    /// Hardware reset: drop any transaction, release the bus and reload the
    /// power-on configuration. Memory contents are kept.
    pub fn reset<B: BusPort>(&mut self, bus: &mut B) {
        if !self.is_idle() {
            debug!("reset during {:?}", self.phase());
        }
        self.state = TxState::Idle;
        self.config = ConfigRegister::with_value(self.power_on_register);
        bus.release();
    }

    // --- Bus interface ---

    /// Advance the state machine by one bus event.
    ///
    /// Returns `Ok(Some(_))` when a transaction finishes or is aborted. An
    /// error ends the transaction; the device is idle again afterwards.
    pub fn on_edge<B: BusPort>(&mut self, edge: Edge, bus: &mut B) -> Result<Option<Outcome>> {
        match edge {
            Edge::ChipSelectFall => Ok(self.select(bus)),
            Edge::ChipSelectRise => self.deselect(bus),
            Edge::ClockRise | Edge::ClockFall => self.clock_edge(bus),
        }
    }

    /// A select while busy drops the running transaction, buffered write
    /// data included, and reports it as aborted.
    fn select<B: BusPort>(&mut self, bus: &mut B) -> Option<Outcome> {
        let restarted = !self.is_idle();
        if restarted {
            warn!("CS# asserted during {:?}, restarting capture", self.phase());
            bus.release();
            self.aborted += 1;
        }
        if self.config.deep_power_down() {
            warn!("access while deep power down is set");
        }
        trace!("Idle -> CaCapture");
        self.state = TxState::CaCapture { bytes: [0; CA_BYTES], count: 0, additional: false };
        restarted.then_some(Outcome::Aborted)
    }

    fn deselect<B: BusPort>(&mut self, bus: &mut B) -> Result<Option<Outcome>> {
        bus.release();
        match std::mem::replace(&mut self.state, TxState::Idle) {
            TxState::Idle => Ok(None),
            TxState::CaCapture { count, .. } => {
                debug!("transaction aborted after {} CA byte(s)", count);
                self.aborted += 1;
                Ok(Some(Outcome::Aborted))
            }
            TxState::Latency { remaining, .. } => {
                debug!("transaction aborted with {} latency edge(s) left", remaining);
                self.aborted += 1;
                Ok(Some(Outcome::Aborted))
            }
            TxState::ReadData(phase) => Ok(Some(self.complete(phase))),
            TxState::WriteData(phase) => self.commit(phase).map(Some),
        }
    }

    fn clock_edge<B: BusPort>(&mut self, bus: &mut B) -> Result<Option<Outcome>> {
        match std::mem::replace(&mut self.state, TxState::Idle) {
            TxState::Idle => Ok(None),

            TxState::CaCapture { mut bytes, count, additional } => {
                bytes[count] = bus.sample_dq().byte();
                let additional = additional || bus.sample_rwds();
                let count = count + 1;
                if count < CA_BYTES {
                    self.state = TxState::CaCapture { bytes, count, additional };
                    return Ok(None);
                }
                let command = CommandAddress::from_bytes(bytes);
                let cycles = if command.space == AddressSpace::Register && !command.is_read() {
                    0
                } else {
                    self.config.latency_cycles(additional)
                };
                debug!("CA {:02X?} -> {:?}, latency {} cycle(s)", bytes, command, cycles);
                self.state = if cycles == 0 {
                    self.begin_data(command, additional, 0)
                } else {
                    trace!("CaCapture -> Latency");
                    TxState::Latency { command, remaining: cycles * 2, additional, cycles }
                };
                Ok(None)
            }

            TxState::Latency { command, remaining, additional, cycles } => {
                self.state = if remaining > 1 {
                    TxState::Latency { command, remaining: remaining - 1, additional, cycles }
                } else {
                    self.begin_data(command, additional, cycles)
                };
                Ok(None)
            }

            TxState::ReadData(phase) => self.read_edge(phase, bus),
            TxState::WriteData(phase) => self.write_edge(phase, bus),
        }
    }

    fn begin_data(&self, command: CommandAddress, additional: bool, cycles: u32) -> TxState {
        let mode = BurstMode::select(command.burst, self.config.hybrid_wrap());
        let wrap = self.config.wrap_words();
        let length = match (command.space, command.is_read()) {
            // a register write carries a single word
            (AddressSpace::Register, false) => 1,
            _ => wrap,
        };
        let phase = DataPhase {
            command,
            additional,
            latency_cycles: cycles,
            seq: BurstSequence::new(command.address as u64, length, mode, wrap),
            word: command.address as u64,
            word_bytes: [0; WORD_BYTES],
            half: 0,
            transferred: 0,
            addresses: Vec::new(),
            data: Vec::new(),
            mask: Vec::new(),
        };
        if command.is_read() {
            trace!("-> ReadData ({:?}, {} words)", mode, length);
            TxState::ReadData(phase)
        } else {
            trace!("-> WriteData ({:?}, {} words)", mode, length);
            TxState::WriteData(phase)
        }
    }

    fn read_edge<B: BusPort>(&mut self, mut phase: DataPhase, bus: &mut B) -> Result<Option<Outcome>> {
        if phase.half == 0 {
            let Some(word) = phase.seq.next() else {
                bus.release();
                return Ok(Some(self.complete(phase)));
            };
            match self.fetch_word(&phase.command, word) {
                Ok(bytes) => {
                    phase.word = word;
                    phase.word_bytes = bytes;
                }
                Err(e) => {
                    warn!("read burst failed at word {:#x}: {}", word, e);
                    bus.release();
                    return Err(e);
                }
            }
        }
        bus.drive_dq(Drive::Value(Dq::from(phase.word_bytes[phase.half])));
        bus.drive_rwds(Drive::Value(phase.half == 0));
        phase.half ^= 1;
        phase.transferred += 1;
        self.state = TxState::ReadData(phase);
        Ok(None)
    }

    fn fetch_word(&self, command: &CommandAddress, word: u64) -> Result<[u8; WORD_BYTES]> {
        match command.space {
            AddressSpace::Register => Ok(self.read_register(command.address).to_be_bytes()),
            AddressSpace::Memory => {
                let bytes = self.memory.read(word * WORD_BYTES as u64, WORD_BYTES)?;
                Ok([bytes[0], bytes[1]])
            }
        }
    }

    fn write_edge<B: BusPort>(&mut self, mut phase: DataPhase, bus: &mut B) -> Result<Option<Outcome>> {
        if phase.half == 0 {
            let Some(word) = phase.seq.next() else {
                return self.commit(phase).map(Some);
            };
            phase.word = word;
        }
        phase.addresses.push(phase.word * WORD_BYTES as u64 + phase.half as u64);
        phase.data.push(bus.sample_dq().byte());
        phase.mask.push(bus.sample_rwds());
        phase.half ^= 1;
        phase.transferred += 1;
        if phase.command.space == AddressSpace::Register && phase.transferred == WORD_BYTES {
            return self.commit(phase).map(Some);
        }
        self.state = TxState::WriteData(phase);
        Ok(None)
    }

    /// Apply a finished write burst. The state is already idle.
    fn commit(&mut self, phase: DataPhase) -> Result<Outcome> {
        match phase.command.space {
            AddressSpace::Register => {
                if phase.data.len() >= WORD_BYTES {
                    let value = u16::from_be_bytes([phase.data[0], phase.data[1]]);
                    self.write_register(phase.command.address, value);
                } else {
                    warn!("register write ended after {} byte(s), ignored", phase.data.len());
                }
            }
            AddressSpace::Memory => {
                let written = WriteMasker::commit(
                    &mut self.memory,
                    &phase.addresses,
                    &phase.data,
                    &phase.mask,
                )?;
                debug!(
                    "write burst committed: {} of {} byte(s) at word {:#x}",
                    written,
                    phase.data.len(),
                    phase.command.address
                );
            }
        }
        Ok(self.complete(phase))
    }

    fn complete(&mut self, phase: DataPhase) -> Outcome {
        self.completed += 1;
        trace!("-> Idle ({} byte(s))", phase.transferred);
        Outcome::Completed(TransactionSummary {
            command: phase.command,
            mode: phase.seq.mode(),
            bytes: phase.transferred,
            additional_latency: phase.additional,
            latency_cycles: phase.latency_cycles,
        })
    }

    fn read_register(&self, address: u32) -> u16 {
        match address {
            ID0_ADDR => ID0_VALUE,
            ID1_ADDR => ID1_VALUE,
            _ => self.config.raw(),
        }
    }

    fn write_register(&mut self, address: u32, value: u16) {
        match address {
            ID0_ADDR | ID1_ADDR => {
                warn!("write of {:#06X} to read-only ID register {:#x} ignored", value, address);
            }
            _ => self.configure(value),
        }
    }

    // --- Save state ---

    /// Capture the persistent device state. Transient bus state is not saved.
    pub fn save_state(&self) -> crate::savestate::DeviceState {
        crate::savestate::DeviceState {
            address_width: self.memory.address_width(),
            config_raw: self.config.raw(),
            memory: self.memory.pages(),
        }
    }

    /// Restore from a save state. Any transaction in progress is dropped.
    ///
    /// The state must describe an array of the same width; on error the
    /// device is unchanged.
    pub fn load_state(&mut self, s: crate::savestate::DeviceState) -> Result<()> {
        let expected = self.memory.address_width();
        if s.address_width != expected {
            return Err(Error::WidthMismatch { found: s.address_width, expected });
        }
        self.memory.restore(s.memory)?;
        self.config.apply(s.config_raw);
        self.state = TxState::Idle;
        Ok(())
    }
}

impl Default for HyperRam {
    fn default() -> Self {
        Self::new(DeviceConfig::default())
    }
}
