use std::sync::Arc;
use std::thread;

use log::{trace, warn};

use crate::core::bus::BusPort;
use crate::core::clock::EdgeSignal;
use crate::core::errors::BridgeError;
use crate::core::memory::MemoryStore;
use crate::core::state::ExecutionState;
use crate::core::timing::Timings;
use crate::core::traits::{BusPins, DebugDisplay, HostChannel, PortDirection};

pub mod bus;
pub mod clock;
pub mod errors;
pub mod memory;
pub mod protocol;
pub mod state;
pub mod timing;
pub mod traits;

/// The adapter core: one context object owning every piece of mutable state,
/// passed by reference to every operation. The external CPU's silicon
/// executes instructions; this only emulates its memory and observes or
/// drives the bus lines.
pub struct Bridge<P: BusPins, C: HostChannel> {
    bus: BusPort<P>,
    host: C,
    memory: MemoryStore,
    state: ExecutionState,
    edge: Arc<EdgeSignal>,
    /// Slot value consumed by the last serviced edge. Persisted across polls
    /// so a toggle that lands while a command is being served satisfies the
    /// next wait instead of vanishing.
    edge_seen: bool,
    timings: Timings,
    /// Incremented once per telemetry emission, reset on CPU reset.
    cycle_counter: u16,
    /// Where RUN told the CPU-side loader execution begins.
    start_address: u16,
    latched_address: u16,
    latched_data: u8,
    /// Set/cleared by the capture opcodes; the emitter does not read it yet.
    capture: bool,
    display: Option<Box<dyn DebugDisplay>>,
}

impl<P: BusPins, C: HostChannel> Bridge<P, C> {
    pub fn new(pins: P, host: C, timings: Timings) -> Self {
        let edge = Arc::new(EdgeSignal::new());
        let edge_seen = edge.observe();
        Bridge {
            bus: BusPort::new(pins, Arc::clone(&edge)),
            host,
            memory: MemoryStore::new(),
            state: ExecutionState::Idle,
            edge,
            edge_seen,
            timings,
            cycle_counter: 0,
            start_address: 0,
            latched_address: 0,
            latched_data: 0,
            capture: false,
            display: None,
        }
    }

    pub fn with_display(mut self, display: Box<dyn DebugDisplay>) -> Self {
        self.display = Some(display);
        self
    }

    /// Handle for the clock-edge source (interrupt handler or thread).
    pub fn edge(&self) -> Arc<EdgeSignal> {
        Arc::clone(&self.edge)
    }

    pub fn state(&self) -> ExecutionState {
        self.state
    }

    pub fn cycle_counter(&self) -> u16 {
        self.cycle_counter
    }

    pub fn memory(&self) -> &MemoryStore {
        &self.memory
    }

    pub fn start_address(&self) -> u16 {
        self.start_address
    }

    /// One mainline pass: serve any complete host command, then wait out one
    /// clock edge and service the bus cycle it announces. The wait compares
    /// against the slot value of the last serviced edge, so an edge that
    /// fired during command handling is picked up immediately; only excess
    /// edges beyond one coalesce. An edge timeout is not an error here; it
    /// just means the external clock is quiet and we go back to command
    /// polling.
    pub fn poll(&mut self) -> Result<(), BridgeError> {
        self.poll_command()?;
        match self.edge.wait_for_change(
            self.edge_seen,
            self.timings.edge_timeout,
            self.timings.edge_poll,
        ) {
            Ok(()) => {
                self.edge_seen = self.edge.observe();
                self.service_cycle();
            }
            Err(BridgeError::WaitTimeout(_)) => {}
            Err(e) => return Err(e),
        }
        Ok(())
    }

    pub fn run(&mut self) -> ! {
        loop {
            if let Err(e) = self.poll() {
                warn!("{e}");
            }
        }
    }

    /// Services exactly one memory transaction, if the strobes announce one:
    /// /MREQ asserted and /RFSH deasserted, then /RD or /WR decides the
    /// direction. Anything else this edge is an address-only or wait-state
    /// cycle and is left alone.
    pub fn service_cycle(&mut self) {
        if !self.state.is_running() {
            return;
        }
        let snap = self.bus.snapshot();
        if !snap.is_memory_request() {
            return;
        }

        if snap.read_active() {
            self.bus.set_data_direction(PortDirection::Output);
            thread::sleep(self.timings.data_setup);
            let addr = self.bus.sample_address();
            let val = self.memory.read(addr);
            self.bus.drive_data(val);
            thread::sleep(self.timings.data_hold);
            trace!("read cycle: {addr:#06x} -> {val:#04x}");
            self.latched_address = addr;
            self.latched_data = val;
            if let Some(d) = self.display.as_mut() {
                d.show(self.latched_address, self.latched_data);
            }
        } else if snap.write_active() {
            self.bus.set_data_direction(PortDirection::Input);
            thread::sleep(self.timings.data_setup);
            let addr = self.bus.sample_address();
            let val = self.bus.sample_data();
            self.memory.write(addr, val);
            thread::sleep(self.timings.data_hold);
            trace!("write cycle: {addr:#06x} <- {val:#04x}");
            self.latched_address = addr;
            self.latched_data = val;
        }
    }

    /// Counter and latch reset shared by the RESET command variants.
    fn trigger_reset(&mut self) {
        self.cycle_counter = 0;
        self.latched_address = 0;
        self.latched_data = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::Bridge;
    use crate::core::protocol::opcodes;
    use crate::core::state::ExecutionState;
    use crate::core::timing::Timings;
    use crate::core::traits::{ControlLine, PortDirection};
    use crate::sim::{CpuSide, LoopbackChannel, SimBus, SimPins};

    fn bridge() -> (Bridge<SimPins, LoopbackChannel>, CpuSide, LoopbackChannel) {
        let (pins, cpu) = SimBus::new();
        let (device, host) = LoopbackChannel::pair();
        (Bridge::new(pins, device, Timings::fast()), cpu, host)
    }

    fn start_running(bridge: &mut Bridge<SimPins, LoopbackChannel>, host: &mut LoopbackChannel) {
        use crate::core::traits::HostChannel;
        host.write_all(&[opcodes::RUN, 0x00, 0x00, 0x00, 0x00]).unwrap();
        bridge.poll_command().unwrap();
        assert_eq!(bridge.state(), ExecutionState::Running);
    }

    #[test]
    fn bus_write_then_read_roundtrip() {
        let (mut b, cpu, mut host) = bridge();
        start_running(&mut b, &mut host);

        cpu.begin_write_cycle(0x4000, 0x5A);
        b.service_cycle();
        cpu.end_cycle();
        assert_eq!(b.memory().read(0x4000), 0x5A);

        cpu.begin_read_cycle(0x4000);
        b.service_cycle();
        assert_eq!(cpu.data(), 0x5A);
        cpu.end_cycle();
    }

    #[test]
    fn direction_tracks_cycle_kind() {
        let (mut b, cpu, mut host) = bridge();
        start_running(&mut b, &mut host);

        cpu.begin_write_cycle(0x0010, 0x01);
        b.service_cycle();
        assert_eq!(cpu.adapter_direction(), PortDirection::Input);
        cpu.end_cycle();

        cpu.begin_read_cycle(0x0010);
        b.service_cycle();
        assert_eq!(cpu.adapter_direction(), PortDirection::Output);
        cpu.end_cycle();
    }

    #[test]
    fn idle_state_services_nothing() {
        let (mut b, cpu, _host) = bridge();
        cpu.begin_write_cycle(0x2000, 0xAA);
        b.service_cycle();
        cpu.end_cycle();
        assert_eq!(b.memory().read(0x2000), 0x00);
    }

    #[test]
    fn refresh_cycle_is_ignored() {
        let (mut b, cpu, mut host) = bridge();
        start_running(&mut b, &mut host);
        cpu.begin_write_cycle(0x2000, 0xAA);
        cpu.assert_line(ControlLine::Rfsh);
        b.service_cycle();
        cpu.end_cycle();
        assert_eq!(b.memory().read(0x2000), 0x00);
    }

    #[test]
    fn address_only_cycle_is_ignored() {
        let (mut b, cpu, mut host) = bridge();
        start_running(&mut b, &mut host);
        cpu.set_address(0x3000);
        cpu.assert_line(ControlLine::Mreq);
        b.service_cycle();
        cpu.end_cycle();
        assert_eq!(b.memory().read(0x3000), 0x00);
    }

    #[test]
    fn poll_services_a_cycle_per_edge() {
        let (mut b, cpu, mut host) = bridge();
        start_running(&mut b, &mut host);
        cpu.begin_write_cycle(0x0123, 0x42);
        b.edge().notify();
        b.poll().unwrap();
        cpu.end_cycle();
        assert_eq!(b.memory().read(0x0123), 0x42);
    }

    #[test]
    fn edges_fired_between_polls_carry_over() {
        let (mut b, cpu, mut host) = bridge();
        start_running(&mut b, &mut host);

        // each edge lands before its poll begins; none may be dropped
        cpu.begin_write_cycle(0x0200, 0x11);
        b.edge().notify();
        b.poll().unwrap();
        cpu.end_cycle();
        assert_eq!(b.memory().read(0x0200), 0x11);

        cpu.begin_write_cycle(0x0201, 0x22);
        b.edge().notify();
        b.poll().unwrap();
        cpu.end_cycle();
        assert_eq!(b.memory().read(0x0201), 0x22);
    }

    #[test]
    fn poll_survives_a_quiet_clock() {
        let (mut b, _cpu, _host) = bridge();
        assert!(b.poll().is_ok());
    }
}
