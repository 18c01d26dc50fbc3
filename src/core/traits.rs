use std::io;
use std::thread;
use std::time::{Duration, Instant};

use crate::core::errors::BridgeError;

/// Electrical direction of the shared data lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortDirection {
    Input,
    Output,
}

/// The Z80-side control strobes and lines. All of these are active low on
/// the wire; `BusPins::control` always reports the raw level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlLine {
    Clock,
    Rd,
    Wr,
    Mreq,
    Rfsh,
    Reset,
    Wait,
    Halt,
}

/// Pin-level access to the external CPU bus. Implementations exist for the
/// in-crate simulated bus and, out of tree, for real GPIO backends.
pub trait BusPins {
    /// Level of address line `bit` (0 = A0 .. 15 = A15). Input only.
    fn address_bit(&self, bit: u8) -> bool;
    /// Current level of data line `bit`, whoever is driving it.
    fn data_bit(&self, bit: u8) -> bool;
    /// Drive data line `bit`. Only effective while the data bus is in
    /// output mode.
    fn set_data_bit(&mut self, bit: u8, level: bool);
    fn data_direction(&self) -> PortDirection;
    fn set_data_direction(&mut self, dir: PortDirection);
    /// Raw level of a control line (asserted means `false`).
    fn control(&self, line: ControlLine) -> bool;
    /// Drive an adapter-owned output line (/WAIT, /RESET).
    fn set_control(&mut self, line: ControlLine, level: bool);
}

/// The host-facing command channel. Distinct from the debug channel, which
/// is just the log output.
pub trait HostChannel {
    /// Bytes ready to read without blocking.
    fn available(&mut self) -> usize;
    /// Read whatever is ready, up to `buf.len()`. `Ok(0)` when nothing is.
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;

    /// Blocking receive with a bounded deadline. The partial prefix that did
    /// arrive stays in `buf`; callers discard it on timeout.
    fn read_exact_timeout(
        &mut self,
        buf: &mut [u8],
        timeout: Duration,
        poll: Duration,
    ) -> Result<(), BridgeError> {
        let start = Instant::now();
        let mut got = 0;
        while got < buf.len() {
            match self.read(&mut buf[got..]) {
                Ok(0) => {
                    if start.elapsed() >= timeout {
                        return Err(BridgeError::HostTimeout {
                            wanted: buf.len(),
                            got,
                        });
                    }
                    thread::sleep(poll);
                }
                Ok(n) => got += n,
                Err(ref e)
                    if e.kind() == io::ErrorKind::WouldBlock
                        || e.kind() == io::ErrorKind::TimedOut =>
                {
                    if start.elapsed() >= timeout {
                        return Err(BridgeError::HostTimeout {
                            wanted: buf.len(),
                            got,
                        });
                    }
                    thread::sleep(poll);
                }
                Err(e) => return Err(BridgeError::Io(e)),
            }
        }
        Ok(())
    }
}

/// Write-only debug visualization consumed after serviced read cycles.
pub trait DebugDisplay {
    fn show(&mut self, address: u16, data: u8);
}
