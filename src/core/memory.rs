use log::warn;

/// Size of the emulated address space in bytes.
const MEMORY_SIZE: usize = 0x10000;

/// Number of shadowed I/O ports per direction.
const IO_PORTS: usize = 10;

/// The 64 KiB RAM the external CPU sees, plus the I/O-port shadow arrays.
///
/// Single-byte access is total: a 16-bit address cannot fall outside the
/// array. Bulk transfers carry the host-protocol bounds policy instead:
/// a range crossing the end of the address space is a silent no-op, never a
/// truncated or partial copy.
pub struct MemoryStore {
    ram: Vec<u8>,
    io_input: [u8; IO_PORTS],
    io_output: [u8; IO_PORTS],
}

impl Default for MemoryStore {
    fn default() -> Self {
        MemoryStore {
            ram: vec![0; MEMORY_SIZE],
            io_input: [0; IO_PORTS],
            io_output: [0; IO_PORTS],
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn read(&self, addr: u16) -> u8 {
        self.ram[addr as usize]
    }

    #[inline]
    pub fn write(&mut self, addr: u16, val: u8) {
        self.ram[addr as usize] = val;
    }

    /// Zero-fills the whole array. Used on CPU reset.
    pub fn clear(&mut self) {
        self.ram.fill(0);
    }

    /// Contiguous view of `len` bytes starting at `start`, or `None` when
    /// the range leaves the address space. Callers emit nothing in that
    /// case; no error byte goes back to the host.
    pub fn bulk_read(&self, start: u16, len: u16) -> Option<&[u8]> {
        let start = start as usize;
        let len = len as usize;
        if start + len > MEMORY_SIZE {
            warn!("bulk read of {len} bytes at {start:#06x} leaves the address space, ignored");
            return None;
        }
        Some(&self.ram[start..start + len])
    }

    /// Copies `data` starting at `start`. Empty or out-of-range writes are
    /// rejected whole; there are never partial copies.
    pub fn bulk_write(&mut self, start: u16, data: &[u8]) -> bool {
        let start = start as usize;
        if data.is_empty() || start + data.len() > MEMORY_SIZE {
            warn!(
                "bulk write of {} bytes at {start:#06x} rejected",
                data.len()
            );
            return false;
        }
        self.ram[start..start + data.len()].copy_from_slice(data);
        true
    }

    // Port-mapped I/O is reserved for future use; the shadows only store.

    pub fn write_io_input(&mut self, port: usize, val: u8) {
        self.io_input[port] = val;
    }

    pub fn write_io_output(&mut self, port: usize, val: u8) {
        self.io_output[port] = val;
    }

    pub fn clear_io(&mut self) {
        self.io_input = [0; IO_PORTS];
        self.io_output = [0; IO_PORTS];
    }

    pub fn io_input(&self) -> &[u8] {
        &self.io_input
    }

    pub fn io_output(&self) -> &[u8] {
        &self.io_output
    }
}
