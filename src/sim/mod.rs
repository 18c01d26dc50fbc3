//! In-process stand-ins for the electrical world: a simulated Z80 bus with
//! one handle per side, and an in-memory host channel pair. Used by the
//! demo mode and the tests; real GPIO backends implement the same traits
//! out of tree.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};

use log::trace;

use crate::core::clock::EdgeSignal;
use crate::core::traits::{BusPins, ControlLine, HostChannel, PortDirection};

mod line_masks {
    pub const RD: u8 = 0b0000_0001;
    pub const WR: u8 = 0b0000_0010;
    pub const MREQ: u8 = 0b0000_0100;
    pub const RFSH: u8 = 0b0000_1000;
    pub const RESET: u8 = 0b0001_0000;
    pub const CLOCK: u8 = 0b0010_0000;
    pub const WAIT: u8 = 0b0100_0000;
    pub const HALT: u8 = 0b1000_0000;
}

fn mask(line: ControlLine) -> u8 {
    match line {
        ControlLine::Rd => line_masks::RD,
        ControlLine::Wr => line_masks::WR,
        ControlLine::Mreq => line_masks::MREQ,
        ControlLine::Rfsh => line_masks::RFSH,
        ControlLine::Reset => line_masks::RESET,
        ControlLine::Clock => line_masks::CLOCK,
        ControlLine::Wait => line_masks::WAIT,
        ControlLine::Halt => line_masks::HALT,
    }
}

struct SimBusState {
    address: AtomicU16,
    /// What the CPU side drives while the adapter's data port is an input.
    cpu_data: AtomicU8,
    /// What the adapter drives while its data port is an output.
    adapter_data: AtomicU8,
    /// Raw levels of all control lines; everything deasserts high.
    lines: AtomicU8,
    direction_output: AtomicBool,
}

impl SimBusState {
    fn bus_data(&self) -> u8 {
        if self.direction_output.load(Ordering::Acquire) {
            self.adapter_data.load(Ordering::Acquire)
        } else {
            self.cpu_data.load(Ordering::Acquire)
        }
    }

    fn set_line(&self, line: ControlLine, level: bool) {
        if level {
            self.lines.fetch_or(mask(line), Ordering::AcqRel);
        } else {
            self.lines.fetch_and(!mask(line), Ordering::AcqRel);
        }
    }

    fn line(&self, line: ControlLine) -> bool {
        self.lines.load(Ordering::Acquire) & mask(line) != 0
    }
}

pub struct SimBus;

impl SimBus {
    /// Builds one shared bus and returns the adapter-side pins and the
    /// CPU-side handle.
    pub fn new() -> (SimPins, CpuSide) {
        let state = Arc::new(SimBusState {
            address: AtomicU16::new(0),
            cpu_data: AtomicU8::new(0),
            adapter_data: AtomicU8::new(0),
            lines: AtomicU8::new(0xFF),
            direction_output: AtomicBool::new(true),
        });
        (SimPins(Arc::clone(&state)), CpuSide(state))
    }
}

/// The adapter's view of the simulated bus.
pub struct SimPins(Arc<SimBusState>);

impl BusPins for SimPins {
    fn address_bit(&self, bit: u8) -> bool {
        (self.0.address.load(Ordering::Acquire) >> bit) & 1 == 1
    }

    fn data_bit(&self, bit: u8) -> bool {
        (self.0.bus_data() >> bit) & 1 == 1
    }

    fn set_data_bit(&mut self, bit: u8, level: bool) {
        if level {
            self.0.adapter_data.fetch_or(1 << bit, Ordering::AcqRel);
        } else {
            self.0.adapter_data.fetch_and(!(1 << bit), Ordering::AcqRel);
        }
    }

    fn data_direction(&self) -> PortDirection {
        if self.0.direction_output.load(Ordering::Acquire) {
            PortDirection::Output
        } else {
            PortDirection::Input
        }
    }

    fn set_data_direction(&mut self, dir: PortDirection) {
        self.0
            .direction_output
            .store(dir == PortDirection::Output, Ordering::Release);
    }

    fn control(&self, line: ControlLine) -> bool {
        self.0.line(line)
    }

    fn set_control(&mut self, line: ControlLine, level: bool) {
        self.0.set_line(line, level);
    }
}

/// Plays the external CPU: owns the address lines and strobes, drives data
/// during write cycles, reads what the adapter drives during read cycles.
pub struct CpuSide(Arc<SimBusState>);

impl CpuSide {
    pub fn set_address(&self, addr: u16) {
        self.0.address.store(addr, Ordering::Release);
    }

    pub fn drive_data(&self, val: u8) {
        self.0.cpu_data.store(val, Ordering::Release);
    }

    /// Current level of the data bus, whoever drives it.
    pub fn data(&self) -> u8 {
        self.0.bus_data()
    }

    pub fn assert_line(&self, line: ControlLine) {
        self.0.set_line(line, false);
    }

    pub fn release_line(&self, line: ControlLine) {
        self.0.set_line(line, true);
    }

    pub fn wait_level(&self) -> bool {
        self.0.line(ControlLine::Wait)
    }

    pub fn adapter_direction(&self) -> PortDirection {
        if self.0.direction_output.load(Ordering::Acquire) {
            PortDirection::Output
        } else {
            PortDirection::Input
        }
    }

    /// Strobe setup for a memory-read cycle at `addr`.
    pub fn begin_read_cycle(&self, addr: u16) {
        self.set_address(addr);
        self.assert_line(ControlLine::Mreq);
        self.assert_line(ControlLine::Rd);
    }

    /// Strobe setup for a memory-write cycle of `val` at `addr`.
    pub fn begin_write_cycle(&self, addr: u16, val: u8) {
        self.set_address(addr);
        self.drive_data(val);
        self.assert_line(ControlLine::Mreq);
        self.assert_line(ControlLine::Wr);
    }

    pub fn end_cycle(&self) {
        self.release_line(ControlLine::Rd);
        self.release_line(ControlLine::Wr);
        self.release_line(ControlLine::Mreq);
    }

    /// One clock transition: flips the raw line level and fires the edge
    /// notification, the way the edge interrupt does on target.
    pub fn pulse_clock(&self, edge: &EdgeSignal) {
        let level = self.0.line(ControlLine::Clock);
        self.0.set_line(ControlLine::Clock, !level);
        edge.notify();
    }
}

/// One end of an in-memory host channel. `pair()` cross-wires two of them;
/// either end satisfies `HostChannel`, so tests and the demo script can sit
/// on the host side of the protocol.
pub struct LoopbackChannel {
    rx: Arc<Mutex<VecDeque<u8>>>,
    tx: Arc<Mutex<VecDeque<u8>>>,
}

impl LoopbackChannel {
    pub fn pair() -> (LoopbackChannel, LoopbackChannel) {
        let a = Arc::new(Mutex::new(VecDeque::new()));
        let b = Arc::new(Mutex::new(VecDeque::new()));
        (
            LoopbackChannel {
                rx: Arc::clone(&a),
                tx: Arc::clone(&b),
            },
            LoopbackChannel { rx: b, tx: a },
        )
    }
}

impl HostChannel for LoopbackChannel {
    fn available(&mut self) -> usize {
        self.rx.lock().unwrap().len()
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut rx = self.rx.lock().unwrap();
        let mut n = 0;
        while n < buf.len() {
            match rx.pop_front() {
                Some(byte) => {
                    buf[n] = byte;
                    n += 1;
                }
                None => break,
            }
        }
        Ok(n)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        trace!("loopback tx {buf:02X?}");
        self.tx.lock().unwrap().extend(buf.iter().copied());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{LoopbackChannel, SimBus};
    use crate::core::clock::EdgeSignal;
    use crate::core::traits::{BusPins, ControlLine, HostChannel, PortDirection};

    #[test]
    fn data_ownership_follows_direction() {
        let (mut pins, cpu) = SimBus::new();
        pins.set_data_direction(PortDirection::Output);
        for bit in 0..8 {
            pins.set_data_bit(bit, (0xA5 >> bit) & 1 == 1);
        }
        cpu.drive_data(0x3C);
        assert_eq!(cpu.data(), 0xA5);

        pins.set_data_direction(PortDirection::Input);
        assert_eq!(cpu.data(), 0x3C);
    }

    #[test]
    fn lines_deassert_high_by_default() {
        let (pins, _cpu) = SimBus::new();
        for line in [
            ControlLine::Rd,
            ControlLine::Wr,
            ControlLine::Mreq,
            ControlLine::Rfsh,
            ControlLine::Reset,
            ControlLine::Wait,
            ControlLine::Halt,
        ] {
            assert!(pins.control(line));
        }
    }

    #[test]
    fn end_cycle_releases_the_strobes() {
        let (pins, cpu) = SimBus::new();
        cpu.begin_write_cycle(0x1000, 0x10);
        assert!(!pins.control(ControlLine::Wr));
        cpu.end_cycle();
        assert!(pins.control(ControlLine::Wr));
        assert!(pins.control(ControlLine::Mreq));
    }

    #[test]
    fn pulse_clock_flips_the_level_and_notifies() {
        let (pins, cpu) = SimBus::new();
        let edge = EdgeSignal::new();
        let level = pins.control(ControlLine::Clock);
        let seen = edge.observe();
        cpu.pulse_clock(&edge);
        assert_ne!(pins.control(ControlLine::Clock), level);
        assert_ne!(edge.observe(), seen);
    }

    #[test]
    fn loopback_ends_are_cross_wired() {
        let (mut a, mut b) = LoopbackChannel::pair();
        a.write_all(&[1, 2, 3]).unwrap();
        assert_eq!(b.available(), 3);
        let mut buf = [0u8; 3];
        assert_eq!(b.read(&mut buf).unwrap(), 3);
        assert_eq!(buf, [1, 2, 3]);
        assert_eq!(a.available(), 0);
    }
}
