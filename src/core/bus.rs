use std::sync::Arc;

use bitfield::bitfield;
use log::{debug, trace};

use crate::core::clock::EdgeSignal;
use crate::core::traits::{BusPins, ControlLine, PortDirection};

bitfield! {
    /// Raw levels of the control strobes at one instant. Active-low lines
    /// store their wire level, so an asserted strobe reads `false`.
    #[derive(Copy, Clone, Default)]
    pub struct ControlLevels(u8);
    impl Debug;
    pub rd, set_rd: 0;
    pub wr, set_wr: 1;
    pub mreq, set_mreq: 2;
    pub rfsh, set_rfsh: 3;
    pub reset, set_reset: 4;
    pub clock, set_clock: 5;
}

/// One cycle's view of the bus. Ephemeral: lives for the duration of a
/// single service pass or telemetry frame, never stored.
#[derive(Debug, Clone, Copy)]
pub struct BusSnapshot {
    pub address: u16,
    pub data: u8,
    pub lines: ControlLevels,
}

impl BusSnapshot {
    /// A memory request that is not a register-refresh cycle.
    #[inline]
    pub fn is_memory_request(&self) -> bool {
        !self.lines.mreq() && self.lines.rfsh()
    }

    #[inline]
    pub fn read_active(&self) -> bool {
        !self.lines.rd()
    }

    #[inline]
    pub fn write_active(&self) -> bool {
        !self.lines.wr()
    }
}

/// Translates electrical line states into logical address/data values and
/// back, and owns data-bus directionality.
pub struct BusPort<P: BusPins> {
    pins: P,
    edge: Arc<EdgeSignal>,
}

impl<P: BusPins> BusPort<P> {
    pub fn new(mut pins: P, edge: Arc<EdgeSignal>) -> Self {
        // Data lines default to output; every cycle switches direction
        // explicitly before touching them.
        pins.set_data_direction(PortDirection::Output);
        BusPort { pins, edge }
    }

    /// Assembles the 16 address lines into a value. Edge notification is
    /// suppressed for the duration so a mid-read edge cannot tear the
    /// multi-bit read.
    pub fn sample_address(&self) -> u16 {
        self.edge.mask();
        let mut addr = 0u16;
        for bit in 0..16 {
            if self.pins.address_bit(bit) {
                addr |= 1 << bit;
            }
        }
        self.edge.unmask();
        addr
    }

    /// Assembles the 8 data lines into a byte. The caller must have put the
    /// data bus into input mode first.
    pub fn sample_data(&self) -> u8 {
        let mut val = 0u8;
        for bit in 0..8 {
            if self.pins.data_bit(bit) {
                val |= 1 << bit;
            }
        }
        val
    }

    /// Puts a byte on the data lines. The caller must have put the data bus
    /// into output mode first. The log line is observability only, not part
    /// of the protocol.
    pub fn drive_data(&mut self, val: u8) {
        for bit in 0..8 {
            self.pins.set_data_bit(bit, (val >> bit) & 1 == 1);
        }
        debug!("drove 0x{val:02X} onto the data bus");
    }

    pub fn set_data_direction(&mut self, dir: PortDirection) {
        trace!("data bus direction -> {dir:?}");
        self.pins.set_data_direction(dir);
    }

    pub fn data_direction(&self) -> PortDirection {
        self.pins.data_direction()
    }

    /// Drives /WAIT. Asserted means low on the wire.
    pub fn set_wait(&mut self, asserted: bool) {
        debug!("/WAIT {}", if asserted { "asserted" } else { "released" });
        self.pins.set_control(ControlLine::Wait, !asserted);
    }

    pub fn snapshot(&self) -> BusSnapshot {
        let mut lines = ControlLevels::default();
        lines.set_rd(self.pins.control(ControlLine::Rd));
        lines.set_wr(self.pins.control(ControlLine::Wr));
        lines.set_mreq(self.pins.control(ControlLine::Mreq));
        lines.set_rfsh(self.pins.control(ControlLine::Rfsh));
        lines.set_reset(self.pins.control(ControlLine::Reset));
        lines.set_clock(self.pins.control(ControlLine::Clock));
        BusSnapshot {
            address: self.sample_address(),
            data: self.sample_data(),
            lines,
        }
    }
}
