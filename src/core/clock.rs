use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use log::trace;

use crate::core::errors::BridgeError;

/// Single-slot edge notification shared between the clock-edge source (an
/// interrupt handler on target, a thread here) and the mainline.
///
/// The contract is a two-state toggle, not a counting semaphore: the source
/// flips the slot exactly once per edge, the mainline waits for the slot to
/// differ from a snapshot taken before the wait. Edges that arrive while the
/// mainline is not waiting coalesce silently; the adapter accepts only as
/// many bus cycles per second as the mainline can service.
#[derive(Debug, Default)]
pub struct EdgeSignal {
    slot: AtomicBool,
    masked: AtomicBool,
    pending: AtomicBool,
}

impl EdgeSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Edge-source side. Cheap enough for interrupt context: one flag flip.
    pub fn notify(&self) {
        if self.masked.load(Ordering::Acquire) {
            self.pending.store(true, Ordering::Release);
        } else {
            self.slot.fetch_xor(true, Ordering::AcqRel);
        }
    }

    /// Snapshot of the slot, taken before a wait.
    pub fn observe(&self) -> bool {
        self.slot.load(Ordering::Acquire)
    }

    /// Suppress notification while a multi-bit bus read is in flight, so all
    /// sixteen address bits reflect the same instant. At most one deferred
    /// toggle is applied on `unmask`.
    pub fn mask(&self) {
        self.masked.store(true, Ordering::Release);
    }

    pub fn unmask(&self) {
        self.masked.store(false, Ordering::Release);
        if self.pending.swap(false, Ordering::AcqRel) {
            self.slot.fetch_xor(true, Ordering::AcqRel);
        }
    }

    /// Cooperative wait for the slot to change from `seen`. Bounded so a
    /// stalled external clock cannot starve command servicing.
    pub fn wait_for_change(
        &self,
        seen: bool,
        timeout: Duration,
        poll: Duration,
    ) -> Result<(), BridgeError> {
        let start = Instant::now();
        while self.observe() == seen {
            if start.elapsed() >= timeout {
                trace!("edge wait timed out after {} ms", timeout.as_millis());
                return Err(BridgeError::WaitTimeout(timeout));
            }
            thread::sleep(poll);
        }
        Ok(())
    }
}
