//! # hyperbus-core
//!
//! Edge-driven model of a HyperBus memory device (HyperRAM class) for
//! verifying host bus controllers in simulation.
//!
//! The device receives an 8-bit, double-data-rate command/address/data
//! stream framed by an active-low chip select. Each transaction is a 48-bit
//! Command-Address packet, an initial latency, then a read or masked write
//! burst (linear, wrapped or hybrid addressing). A 16-bit configuration
//! register controls latency and burst parameters.
//!
//! ## Architecture
//!
//! - [`HyperRam`] — Transaction state machine, driven one [`bus::Edge`] at a time
//! - [`MemoryArray`] — Flat byte storage behind the device
//! - [`ConfigRegister`] — CR0 bit-fields (latency, burst length, power state)
//! - [`command`] — CA packet decoding and encoding
//! - [`burst`] — Linear / wrapped / hybrid burst address sequencing
//! - [`mask`] — RWDS-masked write commit
//! - [`bus`] — Fixed-width bus values, the [`bus::BusPort`] trait and shared wires
//! - [`clock`] — Simulated clock producing rising/falling edges
//! - [`monitor`] — Passive transaction monitor
//! - [`host`] — Host controller stimulus builder
//! - [`sim`] — Simulation loop tying host, clock, wires and device together
//! - [`savestate`] — Device checkpoints (bincode + deflate)
//!
//! ## Word addressing
//!
//! CA addresses count 16-bit words. Word `w` occupies bytes `2w` and
//! `2w + 1` of the array; the even byte travels on the rising clock edge.

pub mod error;
pub mod memory;
pub mod config;
pub mod command;
pub mod burst;
pub mod mask;
pub mod bus;
pub mod clock;
pub mod device;
pub mod monitor;
pub mod host;
pub mod sim;
pub mod savestate;

pub use config::ConfigRegister;
pub use device::{DeviceConfig, HyperRam, Outcome};
pub use error::{Error, Result};
pub use memory::MemoryArray;
pub use sim::Simulator;

/// Command-Address packet length in bytes (48 bits)
pub const CA_BYTES: usize = 6;
/// Bytes per bus word
pub const WORD_BYTES: usize = 2;
