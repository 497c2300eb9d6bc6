//! Passive bus monitor.
//!
//! Watches the resolved bus lines and records one entry per chip-select
//! assertion: the CA bytes, every data byte that was actually driven (by the
//! host or the device), and the RWDS level next to each data byte. Latency
//! edges with nobody driving DQ are skipped.

use log::info;

use crate::bus::{Edge, Wires};
use crate::command::CommandAddress;
use crate::CA_BYTES;

/// One observed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitoredTransaction {
    /// Simulated time of the CS# falling edge
    pub time_ps: u64,
    pub ca: Vec<u8>,
    pub data: Vec<u8>,
    /// RWDS level sampled with each data byte
    pub strobe: Vec<bool>,
}

impl MonitoredTransaction {
    /// Decoded CA packet, if all six bytes were seen.
    pub fn command(&self) -> Option<CommandAddress> {
        let bytes: [u8; CA_BYTES] = self.ca.as_slice().try_into().ok()?;
        Some(CommandAddress::from_bytes(bytes))
    }
}

#[derive(Debug, Default)]
pub struct Monitor {
    current: Option<MonitoredTransaction>,
    transactions: Vec<MonitoredTransaction>,
}

impl Monitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one bus event; `wires` must reflect the state after the event.
    pub fn observe(&mut self, edge: Edge, wires: &Wires, time_ps: u64) {
        match edge {
            Edge::ChipSelectFall => {
                self.current = Some(MonitoredTransaction {
                    time_ps,
                    ca: Vec::with_capacity(CA_BYTES),
                    data: Vec::new(),
                    strobe: Vec::new(),
                });
            }
            Edge::ChipSelectRise => {
                if let Some(t) = self.current.take() {
                    info!(
                        "[{} ns] CA: {:02X?} ({:?}), data: {} byte(s) {:02X?}",
                        t.time_ps / 1000,
                        t.ca,
                        t.command(),
                        t.data.len(),
                        t.data
                    );
                    self.transactions.push(t);
                }
            }
            Edge::ClockRise | Edge::ClockFall => {
                let Some(t) = self.current.as_mut() else { return };
                if t.ca.len() < CA_BYTES {
                    t.ca.push(wires.dq().byte());
                } else if !wires.host_dq.is_high_z() || !wires.device_dq.is_high_z() {
                    t.data.push(wires.dq().byte());
                    t.strobe.push(wires.rwds());
                }
            }
        }
    }

    pub fn transactions(&self) -> &[MonitoredTransaction] {
        &self.transactions
    }

    /// Remove and return all recorded transactions.
    pub fn take(&mut self) -> Vec<MonitoredTransaction> {
        std::mem::take(&mut self.transactions)
    }

    pub fn clear(&mut self) {
        self.current = None;
        self.transactions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{Dq, Drive};
    use crate::command::{AddressSpace, BurstType, Operation};

    #[test]
    fn test_records_ca_and_driven_data_only() {
        let mut mon = Monitor::new();
        let mut w = Wires::new();
        mon.observe(Edge::ChipSelectFall, &w, 1_000);
        for b in [0xA0, 0x00, 0x00, 0x01, 0x00, 0x02] {
            w.host_dq = Drive::Value(Dq::from(b));
            mon.observe(Edge::ClockRise, &w, 0);
        }
        // latency: nobody drives
        w.host_dq = Drive::HighZ;
        mon.observe(Edge::ClockRise, &w, 0);
        mon.observe(Edge::ClockFall, &w, 0);
        w.device_dq = Drive::Value(Dq::from(0x42));
        w.device_rwds = Drive::Value(true);
        mon.observe(Edge::ClockRise, &w, 0);
        mon.observe(Edge::ChipSelectRise, &w, 0);

        let t = &mon.transactions()[0];
        assert_eq!(t.time_ps, 1_000);
        assert_eq!(t.data, vec![0x42]);
        assert_eq!(t.strobe, vec![true]);
        let cmd = t.command().unwrap();
        assert_eq!(cmd.operation, Operation::Read);
        assert_eq!(cmd.space, AddressSpace::Register);
        assert_eq!(cmd.burst, BurstType::Wrapped);
        assert_eq!(cmd.address, 0xA);
    }

    #[test]
    fn test_partial_ca_has_no_command() {
        let mut mon = Monitor::new();
        let w = Wires::new();
        mon.observe(Edge::ChipSelectFall, &w, 0);
        mon.observe(Edge::ClockRise, &w, 0);
        mon.observe(Edge::ChipSelectRise, &w, 0);
        let all = mon.take();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].command(), None);
        assert!(mon.transactions().is_empty());
    }

    #[test]
    fn test_edges_outside_cs_ignored() {
        let mut mon = Monitor::new();
        let w = Wires::new();
        mon.observe(Edge::ClockRise, &w, 0);
        mon.observe(Edge::ChipSelectRise, &w, 0);
        assert!(mon.transactions().is_empty());
    }
}
