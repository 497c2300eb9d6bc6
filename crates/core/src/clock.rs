//! Simulated bus clock.
//!
//! Time is kept in picoseconds. Each call to [`Clock::next_edge`] advances by
//! half a period and flips the clock level.

use crate::bus::Edge;

/// Default clock period: 10 ns (100 MHz).
pub const DEFAULT_PERIOD_PS: u64 = 10_000;

#[derive(Debug, Clone)]
pub struct Clock {
    period_ps: u64,
    now_ps: u64,
    /// Current clock level
    high: bool,
    /// Rising edges since creation
    cycles: u64,
}

impl Clock {
    /// Create a clock with the given period. The clock starts low at time 0.
    pub fn new(period_ps: u64) -> Self {
        Clock { period_ps: period_ps.max(2), now_ps: 0, high: false, cycles: 0 }
    }

    pub fn period_ps(&self) -> u64 {
        self.period_ps
    }

    pub fn now_ps(&self) -> u64 {
        self.now_ps
    }

    pub fn now_ns(&self) -> f64 {
        self.now_ps as f64 / 1000.0
    }

    pub fn is_high(&self) -> bool {
        self.high
    }

    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Advance half a period and return the edge produced.
    pub fn next_edge(&mut self) -> Edge {
        self.now_ps += self.period_ps / 2;
        self.high = !self.high;
        if self.high {
            self.cycles += 1;
            Edge::ClockRise
        } else {
            Edge::ClockFall
        }
    }

    /// Advance time without producing edges (reset pulses, idle gaps).
    pub fn advance(&mut self, duration_ps: u64) {
        self.now_ps += duration_ps;
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new(DEFAULT_PERIOD_PS)
    }
}

impl Iterator for Clock {
    type Item = Edge;

    fn next(&mut self) -> Option<Edge> {
        Some(self.next_edge())
    }
}
