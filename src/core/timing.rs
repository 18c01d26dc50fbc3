use std::time::Duration;

// The external CPU's electrical timing budget is met with small fixed
// delays around every direction switch and drive/sample. Widening any of
// these is safe; removing them is not.

/// Settling time after switching the data-bus direction.
pub const DATA_SETUP: Duration = Duration::from_micros(10);
/// Hold time after driving or sampling the data lines.
pub const DATA_HOLD: Duration = Duration::from_micros(10);
/// Sleep between polls of the edge slot.
pub const EDGE_POLL: Duration = Duration::from_micros(10);
/// How long the mainline waits for a clock edge before going back to
/// command polling.
pub const EDGE_TIMEOUT: Duration = Duration::from_millis(500);
/// Sleep between polls for pending host bytes.
pub const HOST_POLL: Duration = Duration::from_millis(1);
/// Deadline for a bulk-write body to arrive in full.
pub const HOST_TIMEOUT: Duration = Duration::from_secs(2);
/// Minimum spacing between telemetry frames.
pub const TELEMETRY_THROTTLE: Duration = Duration::from_millis(15);

/// All timing knobs in one place so a port to different hardware can retune
/// them without hunting through the logic.
#[derive(Debug, Clone, Copy)]
pub struct Timings {
    pub data_setup: Duration,
    pub data_hold: Duration,
    pub edge_poll: Duration,
    pub edge_timeout: Duration,
    pub host_poll: Duration,
    pub host_timeout: Duration,
    pub telemetry_throttle: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Timings {
            data_setup: DATA_SETUP,
            data_hold: DATA_HOLD,
            edge_poll: EDGE_POLL,
            edge_timeout: EDGE_TIMEOUT,
            host_poll: HOST_POLL,
            host_timeout: HOST_TIMEOUT,
            telemetry_throttle: TELEMETRY_THROTTLE,
        }
    }
}

#[cfg(test)]
impl Timings {
    /// Near-zero delays so unit tests don't sleep.
    pub fn fast() -> Self {
        Timings {
            data_setup: Duration::ZERO,
            data_hold: Duration::ZERO,
            edge_poll: Duration::from_micros(1),
            edge_timeout: Duration::from_millis(2),
            host_poll: Duration::from_micros(10),
            host_timeout: Duration::from_millis(10),
            telemetry_throttle: Duration::ZERO,
        }
    }
}
