use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::timing::Timings;

/// Runtime configuration, loadable from a JSON file. Every field has a
/// default, so a missing file or a sparse one falls back to the named
/// constants in `core::timing`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Host-facing serial device.
    pub port: String,
    pub baud_rate: u32,
    pub verbosity: u64,
    pub bus_verbosity: u64,
    pub timings: TimingOverrides,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: String::from("/dev/ttyUSB0"),
            baud_rate: 115_200,
            verbosity: 2,
            bus_verbosity: 0,
            timings: TimingOverrides::default(),
        }
    }
}

/// Per-port retuning of the timing constants. Units are in the field names;
/// anything left out keeps its default.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingOverrides {
    pub data_setup_us: Option<u64>,
    pub data_hold_us: Option<u64>,
    pub edge_poll_us: Option<u64>,
    pub edge_timeout_ms: Option<u64>,
    pub host_poll_ms: Option<u64>,
    pub host_timeout_ms: Option<u64>,
    pub telemetry_throttle_ms: Option<u64>,
}

impl Config {
    pub fn load(path: &Path) -> io::Result<Self> {
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }

    pub fn timings(&self) -> Timings {
        let mut t = Timings::default();
        let o = &self.timings;
        if let Some(us) = o.data_setup_us {
            t.data_setup = Duration::from_micros(us);
        }
        if let Some(us) = o.data_hold_us {
            t.data_hold = Duration::from_micros(us);
        }
        if let Some(us) = o.edge_poll_us {
            t.edge_poll = Duration::from_micros(us);
        }
        if let Some(ms) = o.edge_timeout_ms {
            t.edge_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = o.host_poll_ms {
            t.host_poll = Duration::from_millis(ms);
        }
        if let Some(ms) = o.host_timeout_ms {
            t.host_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = o.telemetry_throttle_ms {
            t.telemetry_throttle = Duration::from_millis(ms);
        }
        t
    }
}
