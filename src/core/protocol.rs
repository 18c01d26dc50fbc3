use std::collections::HashMap;
use std::thread;

use log::{debug, info, trace, warn};
use once_cell::sync::Lazy;

use crate::core::errors::BridgeError;
use crate::core::state::ExecutionState;
use crate::core::traits::{BusPins, HostChannel};
use crate::core::Bridge;

/// A command frame is exactly one opcode byte plus four operand bytes; it is
/// parsed only once all five are available. 16-bit operand fields are built
/// big-endian from operand pairs.
pub const FRAME_LEN: usize = 5;
/// Fixed layout of one telemetry frame.
pub const TELEMETRY_LEN: usize = 11;

pub mod opcodes {
    pub const ECHO: u8 = 0x01;
    pub const SEND_BYTE: u8 = 0x02;
    pub const GET_STATUS: u8 = 0x03;
    pub const WRITE_MEMORY: u8 = 0x04;
    pub const RUN: u8 = 0x05;
    pub const READ_MEMORY: u8 = 0x06;
    pub const RESET: u8 = 0x07;
    pub const RESET_NO_CLEAR: u8 = 0x08;
    pub const GET_REGISTERS: u8 = 0x09;
    pub const START_CAPTURE: u8 = 0x0A;
    pub const STOP_CAPTURE: u8 = 0x0B;
    pub const RELEASE_WAIT: u8 = 0x0C;
    pub const ASSERT_WAIT: u8 = 0x0D;
}

static OPCODE_NAMES: Lazy<HashMap<u8, &'static str>> = Lazy::new(|| {
    HashMap::from([
        (opcodes::ECHO, "ECHO"),
        (opcodes::SEND_BYTE, "SEND_BYTE"),
        (opcodes::GET_STATUS, "GET_STATUS"),
        (opcodes::WRITE_MEMORY, "WRITE_MEMORY"),
        (opcodes::RUN, "RUN"),
        (opcodes::READ_MEMORY, "READ_MEMORY"),
        (opcodes::RESET, "RESET"),
        (opcodes::RESET_NO_CLEAR, "RESET_NO_CLEAR"),
        (opcodes::GET_REGISTERS, "GET_REGISTERS"),
        (opcodes::START_CAPTURE, "START_CAPTURE"),
        (opcodes::STOP_CAPTURE, "STOP_CAPTURE"),
        (opcodes::RELEASE_WAIT, "RELEASE_WAIT"),
        (opcodes::ASSERT_WAIT, "ASSERT_WAIT"),
    ])
});

fn opcode_name(opcode: u8) -> &'static str {
    OPCODE_NAMES.get(&opcode).copied().unwrap_or("UNKNOWN")
}

impl<P: BusPins, C: HostChannel> Bridge<P, C> {
    /// Serves at most one host command. Nothing is buffered across calls
    /// beyond waiting for a full frame: fewer than five pending bytes leave
    /// the channel untouched.
    pub fn poll_command(&mut self) -> Result<(), BridgeError> {
        if self.host.available() < FRAME_LEN {
            return Ok(());
        }
        let mut frame = [0u8; FRAME_LEN];
        self.host
            .read_exact_timeout(&mut frame, self.timings.host_timeout, self.timings.host_poll)?;
        let opcode = frame[0];
        let op = [frame[1], frame[2], frame[3], frame[4]];
        debug!(
            "command {} ({opcode:#04x}), operands {op:02X?}",
            opcode_name(opcode)
        );

        match opcode {
            opcodes::ECHO => self.host.write_all(&[op[3]])?,
            opcodes::SEND_BYTE => debug!("byte {:#04x} accepted", op[3]),
            opcodes::GET_STATUS => self.host.write_all(&[self.state.as_byte()])?,
            opcodes::WRITE_MEMORY => {
                let start = u16::from_be_bytes([op[0], op[1]]);
                let len = u16::from_be_bytes([op[2], op[3]]);
                if len == 0 {
                    warn!("WRITE_MEMORY of zero bytes at {start:#06x} ignored");
                } else if start as usize + len as usize > 0x10000 {
                    warn!("WRITE_MEMORY {len} bytes at {start:#06x} out of range, ignored");
                } else {
                    // The body follows the frame on the same channel; a host
                    // that stops sending mid-transfer surfaces as a timeout
                    // and the partial body is discarded whole.
                    let mut body = vec![0u8; len as usize];
                    self.host.read_exact_timeout(
                        &mut body,
                        self.timings.host_timeout,
                        self.timings.host_poll,
                    )?;
                    self.memory.bulk_write(start, &body);
                    info!("wrote {len} bytes at {start:#06x}");
                }
            }
            opcodes::RUN => {
                let start = u16::from_be_bytes([op[0], op[1]]);
                self.start_address = start;
                self.state = ExecutionState::Running;
                info!("running from {start:#06x}");
            }
            opcodes::READ_MEMORY => {
                let start = u16::from_be_bytes([op[0], op[1]]);
                let len = u16::from_be_bytes([op[2], op[3]]);
                if let Some(slice) = self.memory.bulk_read(start, len) {
                    self.host.write_all(slice)?;
                }
            }
            opcodes::RESET => {
                self.trigger_reset();
                self.memory.clear();
                self.memory.clear_io();
                self.state = ExecutionState::Idle;
                info!("reset: memory cleared, idle");
            }
            opcodes::RESET_NO_CLEAR => {
                self.trigger_reset();
                self.state = ExecutionState::Running;
                info!("reset without clearing memory, running from 0x0000");
            }
            opcodes::GET_REGISTERS => debug!("GET_REGISTERS is reserved, no response"),
            opcodes::START_CAPTURE => {
                self.capture = true;
                self.emit_capture_frame()?;
            }
            opcodes::STOP_CAPTURE => {
                debug!("capture flag cleared (was {})", self.capture);
                self.capture = false;
            }
            opcodes::RELEASE_WAIT => self.bus.set_wait(false),
            opcodes::ASSERT_WAIT => self.bus.set_wait(true),
            _ => warn!("unknown opcode {opcode:#04x} ignored"),
        }
        Ok(())
    }

    /// Builds and emits one telemetry frame describing the bus right now.
    /// The cycle counter counts emission attempts whether or not the gate
    /// (running, not a refresh cycle) lets the frame out, and the throttle
    /// delay bounds the emission rate.
    pub fn emit_capture_frame(&mut self) -> Result<(), BridgeError> {
        let snap = self.bus.snapshot();
        let mut frame = [0u8; TELEMETRY_LEN];
        frame[0] = (self.cycle_counter >> 8) as u8;
        frame[1] = (self.cycle_counter & 0xFF) as u8;
        frame[2] = u8::from(snap.lines.clock());
        frame[3] = (snap.address & 0xFF) as u8;
        frame[4] = (snap.address >> 8) as u8;
        frame[5] = snap.data;
        frame[6] = u8::from(snap.lines.rd());
        frame[7] = u8::from(snap.lines.wr());
        frame[8] = u8::from(snap.lines.mreq());
        frame[9] = u8::from(snap.lines.rfsh());
        frame[10] = u8::from(snap.lines.reset());

        self.cycle_counter = self.cycle_counter.wrapping_add(1);
        thread::sleep(self.timings.telemetry_throttle);
        if self.state.is_running() && snap.lines.rfsh() {
            self.host.write_all(&frame)?;
            trace!("telemetry frame emitted for {:#06x}", snap.address);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{opcodes, FRAME_LEN, TELEMETRY_LEN};
    use crate::core::errors::BridgeError;
    use crate::core::state::ExecutionState;
    use crate::core::timing::Timings;
    use crate::core::traits::{ControlLine, HostChannel};
    use crate::core::Bridge;
    use crate::sim::{CpuSide, LoopbackChannel, SimBus, SimPins};

    const TIMEOUT: Duration = Duration::from_millis(50);
    const POLL: Duration = Duration::from_micros(10);

    fn bridge() -> (Bridge<SimPins, LoopbackChannel>, CpuSide, LoopbackChannel) {
        let (pins, cpu) = SimBus::new();
        let (device, host) = LoopbackChannel::pair();
        (Bridge::new(pins, device, Timings::fast()), cpu, host)
    }

    fn send(host: &mut LoopbackChannel, opcode: u8, operands: [u8; 4]) {
        let frame = [opcode, operands[0], operands[1], operands[2], operands[3]];
        host.write_all(&frame).unwrap();
    }

    fn recv(host: &mut LoopbackChannel, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        host.read_exact_timeout(&mut buf, TIMEOUT, POLL).unwrap();
        buf
    }

    #[test]
    fn echo_returns_the_operand_byte() {
        let (mut b, _cpu, mut host) = bridge();
        send(&mut host, opcodes::ECHO, [0x00, 0x00, 0x00, 0x5A]);
        b.poll_command().unwrap();
        assert_eq!(recv(&mut host, 1), [0x5A]);
    }

    #[test]
    fn get_status_reports_the_state_byte() {
        let (mut b, _cpu, mut host) = bridge();
        send(&mut host, opcodes::GET_STATUS, [0; 4]);
        b.poll_command().unwrap();
        assert_eq!(recv(&mut host, 1), [0x00]);

        send(&mut host, opcodes::RUN, [0x12, 0x34, 0x00, 0x00]);
        b.poll_command().unwrap();
        send(&mut host, opcodes::GET_STATUS, [0; 4]);
        b.poll_command().unwrap();
        assert_eq!(recv(&mut host, 1), [0x01]);
    }

    #[test]
    fn run_records_the_start_address() {
        let (mut b, _cpu, mut host) = bridge();
        send(&mut host, opcodes::RUN, [0x12, 0x34, 0x00, 0x00]);
        b.poll_command().unwrap();
        assert_eq!(b.start_address(), 0x1234);
        assert_eq!(b.state(), ExecutionState::Running);
    }

    #[test]
    fn write_then_read_memory_over_the_wire() {
        let (mut b, _cpu, mut host) = bridge();
        let body = [0x3E, 0x2A, 0x32, 0x76];
        send(&mut host, opcodes::WRITE_MEMORY, [0x01, 0x00, 0x00, body.len() as u8]);
        host.write_all(&body).unwrap();
        b.poll_command().unwrap();
        assert_eq!(b.memory().read(0x0100), 0x3E);

        send(&mut host, opcodes::READ_MEMORY, [0x01, 0x00, 0x00, body.len() as u8]);
        b.poll_command().unwrap();
        assert_eq!(recv(&mut host, body.len()), body);
    }

    #[test]
    fn out_of_range_bulk_ops_produce_nothing() {
        let (mut b, _cpu, mut host) = bridge();
        // start 0xFFF0 + length 0x0020 crosses the end of the address space
        send(&mut host, opcodes::READ_MEMORY, [0xFF, 0xF0, 0x00, 0x20]);
        b.poll_command().unwrap();
        assert_eq!(host.available(), 0);

        send(&mut host, opcodes::WRITE_MEMORY, [0xFF, 0xF0, 0x00, 0x20]);
        b.poll_command().unwrap();
        assert_eq!(b.memory().read(0xFFF0), 0x00);
    }

    #[test]
    fn zero_length_write_is_rejected_without_a_body_wait() {
        let (mut b, _cpu, mut host) = bridge();
        send(&mut host, opcodes::WRITE_MEMORY, [0x00, 0x00, 0x00, 0x00]);
        b.poll_command().unwrap();
        assert_eq!(host.available(), 0);
        assert_eq!(b.memory().read(0x0000), 0x00);
    }

    #[test]
    fn write_memory_times_out_on_a_stalled_host() {
        let (mut b, _cpu, mut host) = bridge();
        send(&mut host, opcodes::WRITE_MEMORY, [0x00, 0x00, 0x00, 0x04]);
        host.write_all(&[0xAA, 0xBB]).unwrap();
        let res = b.poll_command();
        assert!(matches!(
            res,
            Err(BridgeError::HostTimeout { wanted: 4, got: 2 })
        ));
        // the abandoned partial body must not reach memory
        assert_eq!(b.memory().read(0x0000), 0x00);
    }

    #[test]
    fn reset_clears_memory_counter_and_goes_idle() {
        let (mut b, _cpu, mut host) = bridge();
        send(&mut host, opcodes::WRITE_MEMORY, [0x00, 0x00, 0x00, 0x01]);
        host.write_all(&[0xEE]).unwrap();
        b.poll_command().unwrap();
        send(&mut host, opcodes::START_CAPTURE, [0; 4]);
        b.poll_command().unwrap();
        assert_eq!(b.cycle_counter(), 1);

        send(&mut host, opcodes::RESET, [0; 4]);
        b.poll_command().unwrap();
        assert_eq!(b.state(), ExecutionState::Idle);
        assert_eq!(b.cycle_counter(), 0);
        assert_eq!(b.memory().read(0x0000), 0x00);
    }

    #[test]
    fn reset_no_clear_keeps_memory_and_runs() {
        let (mut b, _cpu, mut host) = bridge();
        send(&mut host, opcodes::WRITE_MEMORY, [0x00, 0x00, 0x00, 0x01]);
        host.write_all(&[0xEE]).unwrap();
        b.poll_command().unwrap();

        send(&mut host, opcodes::RESET_NO_CLEAR, [0; 4]);
        b.poll_command().unwrap();
        assert_eq!(b.state(), ExecutionState::Running);
        assert_eq!(b.cycle_counter(), 0);
        assert_eq!(b.memory().read(0x0000), 0xEE);
    }

    #[test]
    fn partial_frames_are_left_on_the_channel() {
        let (mut b, _cpu, mut host) = bridge();
        host.write_all(&[opcodes::ECHO, 0x00, 0x00]).unwrap();
        b.poll_command().unwrap();
        assert_eq!(host.available(), 0);

        host.write_all(&[0x00, 0x5A]).unwrap();
        b.poll_command().unwrap();
        assert_eq!(recv(&mut host, 1), [0x5A]);
    }

    #[test]
    fn unknown_opcodes_are_silently_ignored() {
        let (mut b, _cpu, mut host) = bridge();
        send(&mut host, 0xEE, [0xDE, 0xAD, 0xBE, 0xEF]);
        b.poll_command().unwrap();
        assert_eq!(host.available(), 0);

        send(&mut host, opcodes::ECHO, [0x00, 0x00, 0x00, 0x42]);
        b.poll_command().unwrap();
        assert_eq!(recv(&mut host, 1), [0x42]);
    }

    #[test]
    fn reserved_get_registers_has_no_response() {
        let (mut b, _cpu, mut host) = bridge();
        send(&mut host, opcodes::GET_REGISTERS, [0; 4]);
        b.poll_command().unwrap();
        assert_eq!(host.available(), 0);
    }

    #[test]
    fn telemetry_is_gated_while_idle() {
        let (mut b, _cpu, mut host) = bridge();
        send(&mut host, opcodes::START_CAPTURE, [0; 4]);
        b.poll_command().unwrap();
        // the counter still advances on a gated emission
        assert_eq!(b.cycle_counter(), 1);
        assert_eq!(host.available(), 0);
    }

    #[test]
    fn telemetry_is_gated_during_refresh() {
        let (mut b, cpu, mut host) = bridge();
        send(&mut host, opcodes::RUN, [0; 4]);
        b.poll_command().unwrap();
        cpu.assert_line(ControlLine::Rfsh);
        send(&mut host, opcodes::START_CAPTURE, [0; 4]);
        b.poll_command().unwrap();
        assert_eq!(b.cycle_counter(), 1);
        assert_eq!(host.available(), 0);
    }

    #[test]
    fn telemetry_frame_layout() {
        let (mut b, cpu, mut host) = bridge();
        send(&mut host, opcodes::RUN, [0; 4]);
        b.poll_command().unwrap();

        cpu.set_address(0xBEEF);
        cpu.assert_line(ControlLine::Mreq);
        cpu.assert_line(ControlLine::Rd);
        send(&mut host, opcodes::START_CAPTURE, [0; 4]);
        b.poll_command().unwrap();

        let frame = recv(&mut host, TELEMETRY_LEN);
        assert_eq!(&frame[0..2], &[0x00, 0x00]); // counter before increment
        assert_eq!(frame[3], 0xEF); // address low first
        assert_eq!(frame[4], 0xBE);
        assert_eq!(frame[6], 0); // /RD asserted
        assert_eq!(frame[7], 1); // /WR released
        assert_eq!(frame[8], 0); // /MREQ asserted
        assert_eq!(frame[9], 1); // /RFSH released
        assert_eq!(b.cycle_counter(), 1);
    }

    #[test]
    fn wait_line_opcodes_drive_the_pin() {
        let (mut b, cpu, mut host) = bridge();
        send(&mut host, opcodes::ASSERT_WAIT, [0; 4]);
        b.poll_command().unwrap();
        assert!(!cpu.wait_level());

        send(&mut host, opcodes::RELEASE_WAIT, [0; 4]);
        b.poll_command().unwrap();
        assert!(cpu.wait_level());
    }

    #[test]
    fn frames_shorter_than_five_bytes_never_dispatch() {
        let (mut b, _cpu, mut host) = bridge();
        for _ in 0..FRAME_LEN - 1 {
            host.write_all(&[opcodes::RUN]).unwrap();
            b.poll_command().unwrap();
        }
        assert_eq!(b.state(), ExecutionState::Idle);
    }
}
