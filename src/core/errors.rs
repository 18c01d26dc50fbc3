use std::fmt;
use std::io;
use std::time::Duration;

/// Failures the mainline can actually recover from. Both timeout cases
/// surface as errors so the loop can log and keep serving commands instead
/// of stalling.
#[derive(Debug)]
pub enum BridgeError {
    /// No clock edge was observed within the configured window.
    WaitTimeout(Duration),
    /// The host stopped sending mid-transfer.
    HostTimeout { wanted: usize, got: usize },
    Io(io::Error),
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BridgeError::WaitTimeout(window) => {
                write!(f, "no clock edge within {} ms", window.as_millis())
            }
            BridgeError::HostTimeout { wanted, got } => {
                write!(f, "host channel timed out after {got} of {wanted} bytes")
            }
            BridgeError::Io(e) => write!(f, "host channel I/O error: {e}"),
        }
    }
}

impl std::error::Error for BridgeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BridgeError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for BridgeError {
    fn from(e: io::Error) -> Self {
        BridgeError::Io(e)
    }
}
