//! Single-threaded simulation loop.
//!
//! Wires a [`Clock`], the shared [`Wires`], a [`HyperRam`] device, a
//! [`Monitor`] and a [`HostController`] together. Host steps are applied in
//! order; every clock step consumes one edge from the clock, the device sees
//! the edge first and the monitor observes the settled lines afterwards.

use log::debug;

use crate::bus::{Drive, Edge, Wires};
use crate::clock::Clock;
use crate::command::BurstType;
use crate::device::{DeviceConfig, HyperRam, Outcome, CR0_ADDR};
use crate::error::{Error, Result};
use crate::host::{HostController, Step};
use crate::monitor::Monitor;
use crate::WORD_BYTES;

/// Collected results of one [`Simulator::run`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunResult {
    /// Device-driven bytes on capture edges
    pub read_data: Vec<u8>,
    pub outcomes: Vec<Outcome>,
}

pub struct Simulator {
    pub device: HyperRam,
    pub monitor: Monitor,
    pub host: HostController,
    pub clock: Clock,
    pub wires: Wires,
    device_config: DeviceConfig,
}

impl Simulator {
    pub fn new(device_config: DeviceConfig, period_ps: u64) -> Self {
        Simulator {
            device: HyperRam::new(device_config),
            monitor: Monitor::new(),
            host: HostController::new(device_config.power_on_register),
            clock: Clock::new(period_ps),
            wires: Wires::new(),
            device_config,
        }
    }

    pub fn device_config(&self) -> DeviceConfig {
        self.device_config
    }

    fn deliver(&mut self, edge: Edge, result: &mut RunResult) -> Result<()> {
        let outcome = self.device.on_edge(edge, &mut self.wires);
        self.monitor.observe(edge, &self.wires, self.clock.now_ps());
        if let Some(o) = outcome? {
            result.outcomes.push(o);
        }
        Ok(())
    }

    /// Apply host steps in order.
    ///
    /// On a device error the remaining steps are dropped, CS# is released so
    /// the bus is left idle, and the error is returned.
    pub fn run(&mut self, steps: &[Step]) -> Result<RunResult> {
        let mut result = RunResult::default();
        for step in steps {
            if let Err(e) = self.apply(*step, &mut result) {
                debug!("run stopped: {}", e);
                self.release_host();
                if !self.wires.cs_n {
                    self.wires.cs_n = true;
                    // the device is idle after an error; this cannot fail
                    let _ = self.deliver(Edge::ChipSelectRise, &mut result);
                }
                return Err(e);
            }
        }
        Ok(result)
    }

    fn apply(&mut self, step: Step, result: &mut RunResult) -> Result<()> {
        match step {
            Step::Select => {
                // start every transaction on a rising edge
                if self.clock.is_high() {
                    self.release_host();
                    let edge = self.clock.next_edge();
                    self.deliver(edge, result)?;
                }
                self.wires.cs_n = false;
                self.deliver(Edge::ChipSelectFall, result)
            }
            Step::Deselect => {
                self.release_host();
                self.wires.cs_n = true;
                self.deliver(Edge::ChipSelectRise, result)
            }
            Step::Clock { dq, rwds, capture } => {
                self.wires.host_dq = dq;
                self.wires.host_rwds = rwds;
                let edge = self.clock.next_edge();
                self.deliver(edge, result)?;
                if capture {
                    if let Some(v) = self.wires.device_dq.value() {
                        result.read_data.push(v.byte());
                    }
                }
                Ok(())
            }
        }
    }

    fn release_host(&mut self) {
        self.wires.host_dq = Drive::HighZ;
        self.wires.host_rwds = Drive::HighZ;
    }

    // --- Host operations ---

    fn expect_len(expected: usize, received: usize) -> Result<()> {
        if expected != received {
            return Err(Error::ShortTransfer { expected, received });
        }
        Ok(())
    }

    /// Read `words` words from word address `address`.
    ///
    /// Fails unless the device drove every requested byte.
    pub fn read_mem(&mut self, address: u32, words: usize, burst: BurstType) -> Result<Vec<u8>> {
        let steps = self.host.read_mem(address, words, burst)?;
        let data = self.run(&steps)?.read_data;
        Self::expect_len(words * WORD_BYTES, data.len())?;
        Ok(data)
    }

    /// Write bytes from word address `address`, optionally masked.
    pub fn write_mem(&mut self, address: u32, data: &[u8], mask: Option<&[bool]>) -> Result<()> {
        self.write_mem_burst(address, data, mask, BurstType::Linear)
    }

    /// Write one burst. Fails if the device sampled a different number of
    /// data bytes than were sent.
    pub fn write_mem_burst(
        &mut self,
        address: u32,
        data: &[u8],
        mask: Option<&[bool]>,
        burst: BurstType,
    ) -> Result<()> {
        let steps = self.host.write_mem(address, data, mask, burst)?;
        let result = self.run(&steps)?;
        let received = result
            .outcomes
            .iter()
            .map(|o| match o {
                Outcome::Completed(t) => t.bytes,
                Outcome::Aborted => 0,
            })
            .sum();
        Self::expect_len(data.len(), received)
    }

    pub fn read_reg(&mut self, address: u32) -> Result<u16> {
        let steps = self.host.read_reg(address);
        let data = self.run(&steps)?.read_data;
        match data.as_slice() {
            [hi, lo] => Ok(u16::from_be_bytes([*hi, *lo])),
            _ => Err(Error::ShortTransfer { expected: WORD_BYTES, received: data.len() }),
        }
    }

    pub fn write_reg(&mut self, address: u32, value: u16) -> Result<()> {
        let steps = self.host.write_reg(address, value);
        self.run(&steps).map(|_| ())
    }

    /// Program CR0.
    pub fn configure(&mut self, value: u16) -> Result<()> {
        self.write_reg(CR0_ADDR, value)
    }

    /// Start a transaction and drop CS# after `ca_bytes` CA bytes.
    pub fn abort_after(&mut self, ca_bytes: usize) -> Result<Vec<Outcome>> {
        let steps = self.host.abort_after(ca_bytes);
        Ok(self.run(&steps)?.outcomes)
    }

    /// Hold reset for `pulse_ps`, then reload power-on settings on both ends.
    pub fn reset(&mut self, pulse_ps: u64) {
        self.release_host();
        self.wires.cs_n = true;
        self.clock.advance(pulse_ps);
        self.device.reset(&mut self.wires);
        self.host.reset(self.device_config.power_on_register);
        debug!("reset released at {} ns", self.clock.now_ns());
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new(DeviceConfig::default(), crate::clock::DEFAULT_PERIOD_PS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::burst::BurstMode;
    use crate::config::POWER_ON_VALUE;
    use crate::device::{Phase, ID0_ADDR};

    fn sim() -> Simulator {
        Simulator::new(
            DeviceConfig { address_width: 16, power_on_register: POWER_ON_VALUE },
            crate::clock::DEFAULT_PERIOD_PS,
        )
    }

    #[test]
    fn test_write_then_read_over_bus() {
        let mut s = sim();
        s.write_mem(0x1000, &[0x12, 0x34, 0x56, 0x78, 0x87, 0x65, 0x43, 0x21], None).unwrap();
        assert_eq!(s.device.read(0x2000, 4).unwrap(), vec![0x12, 0x34, 0x56, 0x78]);
        let data = s.read_mem(0x1000, 4, BurstType::Linear).unwrap();
        assert_eq!(data, vec![0x12, 0x34, 0x56, 0x78, 0x87, 0x65, 0x43, 0x21]);
        assert_eq!(s.device.completed, 2);
    }

    #[test]
    fn test_masked_write_over_bus() {
        let mut s = sim();
        s.device.write(0x40, &[0xAA, 0xBB, 0xCC]).unwrap();
        s.write_mem(0x20, &[0x11, 0x22, 0x33], Some(&[false, true, false])).unwrap();
        assert_eq!(s.device.read(0x40, 3).unwrap(), vec![0x11, 0xBB, 0x33]);
    }

    #[test]
    fn test_register_round_trip_changes_latency() {
        let mut s = sim();
        assert_eq!(s.read_reg(CR0_ADDR).unwrap(), POWER_ON_VALUE);
        // variable latency, 5 cycles, 16-word bursts, hybrid wrap
        s.configure(0x0005).unwrap();
        assert_eq!(s.read_reg(CR0_ADDR).unwrap(), 0x0005);
        assert_eq!(s.host.latency_edges(&crate::command::CommandAddress {
            operation: crate::command::Operation::Read,
            space: crate::command::AddressSpace::Memory,
            burst: BurstType::Linear,
            address: 0,
        }), 10);
        s.device.write(0, &[7, 8]).unwrap();
        assert_eq!(s.read_mem(0, 1, BurstType::Linear).unwrap(), vec![7, 8]);
        assert_eq!(s.read_reg(ID0_ADDR).unwrap(), 0x0C81);
    }

    #[test]
    fn test_additional_latency_round_trip() {
        let mut s = sim();
        s.configure(0x0016).unwrap();
        s.host.additional_latency = true;
        s.write_mem(0x10, &[1, 2, 3, 4], None).unwrap();
        let steps = s.host.read_mem(0x10, 2, BurstType::Linear).unwrap();
        let result = s.run(&steps).unwrap();
        assert_eq!(result.read_data, vec![1, 2, 3, 4]);
        match &result.outcomes[..] {
            [Outcome::Completed(t)] => {
                assert!(t.additional_latency);
                assert_eq!(t.latency_cycles, 12);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_hybrid_read_over_bus() {
        let mut s = sim();
        // 16-word window, hybrid wrap
        s.configure(0x00FD).unwrap();
        let bytes: Vec<u8> = (0..64).collect();
        s.device.write(0, &bytes).unwrap();
        let steps = s.host.read_mem(14, 4, BurstType::Wrapped).unwrap();
        let result = s.run(&steps).unwrap();
        // words 14, 15 then linear 16, 17
        assert_eq!(result.read_data, vec![28, 29, 30, 31, 32, 33, 34, 35]);
        match &result.outcomes[..] {
            [Outcome::Completed(t)] => assert_eq!(t.mode, BurstMode::Hybrid),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_wrapped_write_over_bus() {
        let mut s = sim();
        s.configure(0x00FC).unwrap();
        s.write_mem_burst(0x0F, &[1, 2, 3, 4], None, BurstType::Wrapped).unwrap();
        assert_eq!(s.device.read(0x1E, 2).unwrap(), vec![1, 2]);
        assert_eq!(s.device.read(0x00, 2).unwrap(), vec![3, 4]);
        assert_eq!(s.device.read(0x20, 2).unwrap(), vec![0, 0]);
    }

    #[test]
    fn test_abort_then_recover() {
        let mut s = sim();
        s.device.write(0, &[0x5A; 4]).unwrap();
        assert_eq!(s.abort_after(3).unwrap(), vec![Outcome::Aborted]);
        assert_eq!(s.device.phase(), Phase::Idle);
        assert_eq!(s.device.read(0, 4).unwrap(), vec![0x5A; 4]);
        s.write_mem(0, &[1, 2], None).unwrap();
        assert_eq!(s.device.read(0, 2).unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_out_of_range_read_then_next_transaction() {
        let mut s = sim();
        // last word of a 64 KiB array
        let err = s.read_mem(0x7FFF, 2, BurstType::Linear).unwrap_err();
        assert!(matches!(err, Error::OutOfRange { .. }));
        assert!(s.wires.cs_n);
        assert!(s.device.is_idle());
        s.write_mem(0x10, &[9, 9], None).unwrap();
        assert_eq!(s.read_mem(0x10, 1, BurstType::Linear).unwrap(), vec![9, 9]);
    }

    #[test]
    fn test_monitor_sees_transactions() {
        let mut s = sim();
        s.write_mem(0x1000, &[0xDE, 0xAD], None).unwrap();
        s.read_mem(0x1000, 1, BurstType::Linear).unwrap();
        let t = s.monitor.take();
        assert_eq!(t.len(), 2);
        assert_eq!(t[0].data, vec![0xDE, 0xAD]);
        assert_eq!(t[1].data, vec![0xDE, 0xAD]);
        assert_eq!(t[1].strobe, vec![true, false]);
        assert!(t[1].command().unwrap().is_read());
        assert!(t[1].time_ps > t[0].time_ps);
    }

    #[test]
    fn test_transfer_longer_than_burst_rejected() {
        let mut s = sim();
        let data: Vec<u8> = (1..=70).collect();
        let err = s.write_mem(0, &data, None).unwrap_err();
        assert_eq!(err, Error::BurstOverrun { requested: 70, burst: 64 });
        assert_eq!(s.device.read(0, 4).unwrap(), vec![0; 4]);
        assert_eq!(s.device.completed, 0);
        assert!(s.read_mem(0, 35, BurstType::Linear).is_err());

        s.write_mem(0, &data[..64], None).unwrap();
        assert_eq!(s.read_mem(0, 32, BurstType::Linear).unwrap(), data[..64].to_vec());

        // 128-word bursts take the whole buffer in one transaction
        s.configure(0x00F8).unwrap();
        s.write_mem(0, &data, None).unwrap();
        assert_eq!(s.read_mem(0, 35, BurstType::Linear).unwrap(), data);
    }

    #[test]
    fn test_latency_mismatch_is_reported() {
        let mut s = sim();
        s.device.write(0, &[1, 2, 3, 4]).unwrap();
        // device waits 2 x 5 cycles, host still assumes 2 x 4
        s.device.configure(0x000E);
        let err = s.read_reg(CR0_ADDR).unwrap_err();
        assert_eq!(err, Error::ShortTransfer { expected: 2, received: 0 });
        assert!(s.device.is_idle());

        let err = s.read_mem(0, 2, BurstType::Linear).unwrap_err();
        assert_eq!(err, Error::ShortTransfer { expected: 4, received: 0 });

        let err = s.write_mem(0x10, &[9; 8], None).unwrap_err();
        assert_eq!(err, Error::ShortTransfer { expected: 8, received: 4 });

        // bring the host back in line
        s.host.reset(s.device.config().raw());
        assert_eq!(s.read_reg(CR0_ADDR).unwrap(), 0x000E);
    }

    #[test]
    fn test_reset_restores_defaults() {
        let mut s = sim();
        s.configure(0x0016).unwrap();
        s.device.write(0, &[3]).unwrap();
        s.reset(200_000);
        assert_eq!(s.device.config().raw(), POWER_ON_VALUE);
        assert_eq!(s.host.config().raw(), POWER_ON_VALUE);
        assert_eq!(s.read_mem(0, 1, BurstType::Linear).unwrap(), vec![3, 0]);
    }
}
