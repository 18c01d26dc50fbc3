mod config;
pub mod core;
mod display;
mod logging;
mod sim;

use std::error::Error;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::{Arg, ArgAction, Command};
use log::{info, warn};
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};

use crate::config::Config;
use crate::core::clock::EdgeSignal;
use crate::core::errors::BridgeError;
use crate::core::protocol::{opcodes, TELEMETRY_LEN};
use crate::core::traits::HostChannel;
use crate::core::Bridge;
use crate::display::{Max7219, ShiftPins};
use crate::sim::{CpuSide, LoopbackChannel, SimBus};

fn main() -> Result<(), Box<dyn Error>> {
    let matches = Command::new("zebra")
        .about("Z80 external bus RAM adapter")
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("FILE")
                .help("JSON configuration file"),
        )
        .arg(
            Arg::new("port")
                .long("port")
                .short('p')
                .value_name("DEV")
                .help("host-facing serial device"),
        )
        .arg(
            Arg::new("baud")
                .long("baud")
                .value_name("RATE")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new("demo")
                .long("demo")
                .action(ArgAction::SetTrue)
                .help("run a scripted host session over a loopback channel"),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .action(ArgAction::Count),
        )
        .get_matches();

    let mut cfg = match matches.get_one::<String>("config") {
        Some(path) => Config::load(Path::new(path))?,
        None => Config::default(),
    };
    if let Some(port) = matches.get_one::<String>("port") {
        cfg.port = port.clone();
    }
    if let Some(&baud) = matches.get_one::<u32>("baud") {
        cfg.baud_rate = baud;
    }

    let verbosity = cfg.verbosity + u64::from(matches.get_count("verbose"));
    logging::setup_logger(verbosity, cfg.bus_verbosity)?;
    info!("starting zebra");

    if matches.get_flag("demo") {
        run_demo(&cfg)
    } else {
        run_serial(&cfg)
    }
}

/// Serves a real host over the serial device while the simulated CPU keeps
/// the bus alive. A GPIO `BusPins` backend replaces `SimBus` on target.
fn run_serial(cfg: &Config) -> Result<(), Box<dyn Error>> {
    let port = serialport::new(&cfg.port, cfg.baud_rate)
        .data_bits(DataBits::Eight)
        .flow_control(FlowControl::None)
        .parity(Parity::None)
        .stop_bits(StopBits::One)
        .timeout(Duration::from_millis(500))
        .open()?;
    info!("serial port {} open at {} bps", cfg.port, cfg.baud_rate);

    let (pins, cpu) = SimBus::new();
    let mut bridge = Bridge::new(pins, SerialChannel(port), cfg.timings());
    spawn_cpu(cpu, bridge.edge(), None);
    bridge.run()
}

/// Self-contained session: a scripted host on a loopback channel, the
/// simulated CPU fetching from emulated RAM, the display on trace logging.
fn run_demo(cfg: &Config) -> Result<(), Box<dyn Error>> {
    let (pins, cpu) = SimBus::new();
    let (device, mut host) = LoopbackChannel::pair();
    let mut bridge = Bridge::new(pins, device, cfg.timings())
        .with_display(Box::new(Max7219::new(TraceShiftPins)));

    let done = Arc::new(AtomicBool::new(false));
    let script_done = Arc::clone(&done);
    let script = thread::spawn(move || {
        if let Err(e) = demo_script(&mut host) {
            warn!("demo script failed: {e}");
        }
        script_done.store(true, Ordering::Release);
    });
    let cpu_thread = spawn_cpu(cpu, bridge.edge(), Some(Arc::clone(&done)));

    while !done.load(Ordering::Acquire) {
        if let Err(e) = bridge.poll() {
            warn!("{e}");
        }
    }
    script.join().expect("demo script panicked");
    cpu_thread.join().expect("cpu thread panicked");
    info!(
        "demo complete: state {:?} from {:#06x}, {} telemetry frames, first program byte {:#04x}",
        bridge.state(),
        bridge.start_address(),
        bridge.cycle_counter(),
        bridge.memory().read(0x0000)
    );
    Ok(())
}

/// Plays the external CPU: endless sequential read cycles, one per clock
/// edge, paced slowly enough for the mainline to service every one.
fn spawn_cpu(
    cpu: CpuSide,
    edge: Arc<EdgeSignal>,
    stop: Option<Arc<AtomicBool>>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let mut pc: u16 = 0;
        loop {
            if let Some(s) = &stop {
                if s.load(Ordering::Acquire) {
                    break;
                }
            }
            cpu.begin_read_cycle(pc);
            cpu.pulse_clock(&edge);
            thread::sleep(Duration::from_millis(1));
            cpu.end_cycle();
            pc = pc.wrapping_add(1);
        }
    })
}

fn send(host: &mut LoopbackChannel, opcode: u8, operands: [u8; 4]) -> Result<(), BridgeError> {
    host.write_all(&[opcode, operands[0], operands[1], operands[2], operands[3]])?;
    Ok(())
}

/// What the PC-side client would do: echo test, program upload and readback,
/// run, then one telemetry capture.
fn demo_script(host: &mut LoopbackChannel) -> Result<(), BridgeError> {
    const TIMEOUT: Duration = Duration::from_secs(2);
    const POLL: Duration = Duration::from_millis(1);
    // LD A,0x2A / LD (0x4000),A / HALT
    const PROGRAM: [u8; 6] = [0x3E, 0x2A, 0x32, 0x00, 0x40, 0x76];

    send(host, opcodes::ECHO, [0x00, 0x00, 0x00, 0x5A])?;
    let mut echo = [0u8; 1];
    host.read_exact_timeout(&mut echo, TIMEOUT, POLL)?;
    info!("echo answered {:#04x}", echo[0]);

    send(host, opcodes::WRITE_MEMORY, [0x00, 0x00, 0x00, PROGRAM.len() as u8])?;
    host.write_all(&PROGRAM)?;

    send(host, opcodes::READ_MEMORY, [0x00, 0x00, 0x00, PROGRAM.len() as u8])?;
    let mut readback = [0u8; PROGRAM.len()];
    host.read_exact_timeout(&mut readback, TIMEOUT, POLL)?;
    info!(
        "program upload {}",
        if readback == PROGRAM { "verified" } else { "MISMATCH" }
    );

    send(host, opcodes::RUN, [0x00, 0x00, 0x00, 0x00])?;
    send(host, opcodes::GET_STATUS, [0x00; 4])?;
    let mut status = [0u8; 1];
    host.read_exact_timeout(&mut status, TIMEOUT, POLL)?;
    info!("status {:#04x}", status[0]);

    // let the simulated CPU fetch for a while before sampling the bus
    thread::sleep(Duration::from_millis(100));

    send(host, opcodes::START_CAPTURE, [0x00; 4])?;
    let mut frame = [0u8; TELEMETRY_LEN];
    host.read_exact_timeout(&mut frame, TIMEOUT, POLL)?;
    info!(
        "telemetry: cycle {:04X} addr {:02X}{:02X} data {:02X} rd {} wr {} mreq {} rfsh {} reset {}",
        u16::from(frame[0]) << 8 | u16::from(frame[1]),
        frame[4],
        frame[3],
        frame[5],
        frame[6],
        frame[7],
        frame[8],
        frame[9],
        frame[10]
    );
    Ok(())
}

/// Host channel over a real serial port.
struct SerialChannel(Box<dyn SerialPort>);

impl HostChannel for SerialChannel {
    fn available(&mut self) -> usize {
        self.0.bytes_to_read().unwrap_or(0) as usize
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match io::Read::read(&mut self.0, buf) {
            Ok(n) => Ok(n),
            Err(ref e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        io::Write::write_all(&mut self.0, buf)?;
        io::Write::flush(&mut self.0)
    }
}

/// Stand-in for the three display wires when there is no chip to talk to.
struct TraceShiftPins;

impl ShiftPins for TraceShiftPins {
    fn set_data(&mut self, _level: bool) {}

    fn set_clock(&mut self, _level: bool) {}

    fn set_chip_select(&mut self, level: bool) {
        if level {
            log::trace!("7seg latched");
        }
    }
}
