//! HyperBus device simulator frontend.
//!
//! Provides two execution modes:
//!
//! - **Script mode** (default): runs a transaction script against the device
//!   model and prints read data, register values and memory dumps.
//! - **Step mode** (`--step`): the same commands typed interactively.
//!
//! ## Script commands
//!
//! ```text
//! cfg  <hex>                      write CR0
//! w    <word> <byte>...           linear write burst
//! wm   <word> <byte[:m]>...       masked write; `:m` skips the byte
//! ww   <word> <byte>...           wrapped write burst
//! r    <word> <words> [wrap]      read burst
//! rr   <addr>                     read register
//! abort <n>                       drop CS# after n CA bytes
//! dump <byte-addr> <len>          hex dump of the array
//! reset                           pulse reset
//! # ...                           comment
//! ```
//!
//! Reads and writes are limited to one configured burst (32 words after
//! power-on). Numbers are hex, with or without `0x`, except counts which are decimal.
//! Logging goes through `env_logger`; set `HYPERBUS_LOG=debug` for decoded
//! packets or `trace` for every state transition.

use hyperbus_core::command::BurstType;
use hyperbus_core::memory::MAX_ADDRESS_WIDTH;
use hyperbus_core::savestate;
use hyperbus_core::{DeviceConfig, Outcome, Simulator};
use log::{error, info};
use std::env;
use std::fs;
use std::io::{BufRead, Write};
use std::path::Path;

/// Reset pulse width used by the `reset` command: 200 ns
const RESET_PULSE_PS: u64 = 200_000;

// ─── Commands ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum Command {
    Configure(u16),
    Write { word: u32, data: Vec<u8>, mask: Option<Vec<bool>>, burst: BurstType },
    Read { word: u32, words: usize, burst: BurstType },
    ReadReg(u32),
    Abort(usize),
    Dump { addr: u64, len: u64 },
    Reset,
}

fn parse_hex_u64(s: &str) -> Result<u64, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    u64::from_str_radix(digits, 16).map_err(|_| format!("bad hex number '{}'", s))
}

fn parse_hex_u32(s: &str) -> Result<u32, String> {
    let v = parse_hex_u64(s)?;
    u32::try_from(v).map_err(|_| format!("'{}' does not fit in 32 bits", s))
}

fn parse_byte(s: &str) -> Result<u8, String> {
    let v = parse_hex_u64(s)?;
    u8::try_from(v).map_err(|_| format!("'{}' is not a byte", s))
}

fn parse_count(s: &str) -> Result<usize, String> {
    s.parse().map_err(|_| format!("bad count '{}'", s))
}

/// Parse one script line. Blank lines and comments yield `None`.
fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let line = line.split('#').next().unwrap_or("").trim();
    if line.is_empty() {
        return Ok(None);
    }
    let parts: Vec<&str> = line.split_whitespace().collect();
    let arg = |i: usize| parts.get(i).copied().ok_or_else(|| format!("'{}' needs more arguments", parts[0]));

    let cmd = match parts[0] {
        "cfg" => {
            let v = parse_hex_u64(arg(1)?)?;
            Command::Configure(u16::try_from(v).map_err(|_| format!("CR0 value {:#x} exceeds 16 bits", v))?)
        }
        "w" | "ww" => {
            let word = parse_hex_u32(arg(1)?)?;
            let data = parts[2..].iter().map(|s| parse_byte(s)).collect::<Result<Vec<u8>, String>>()?;
            if data.is_empty() {
                return Err("write needs at least one byte".into());
            }
            let burst = if parts[0] == "ww" { BurstType::Wrapped } else { BurstType::Linear };
            Command::Write { word, data, mask: None, burst }
        }
        "wm" => {
            let word = parse_hex_u32(arg(1)?)?;
            let mut data = Vec::new();
            let mut mask = Vec::new();
            for tok in &parts[2..] {
                let (byte, skip) = match tok.strip_suffix(":m") {
                    Some(b) => (b, true),
                    None => (*tok, false),
                };
                data.push(parse_byte(byte)?);
                mask.push(skip);
            }
            if data.is_empty() {
                return Err("write needs at least one byte".into());
            }
            Command::Write { word, data, mask: Some(mask), burst: BurstType::Linear }
        }
        "r" => {
            let word = parse_hex_u32(arg(1)?)?;
            let words = parse_count(arg(2)?)?;
            let burst = match parts.get(3) {
                Some(&"wrap") => BurstType::Wrapped,
                Some(other) => return Err(format!("unknown burst type '{}'", other)),
                None => BurstType::Linear,
            };
            Command::Read { word, words, burst }
        }
        "rr" => Command::ReadReg(parse_hex_u32(arg(1)?)?),
        "abort" => Command::Abort(parse_count(arg(1)?)?),
        "dump" => Command::Dump { addr: parse_hex_u64(arg(1)?)?, len: parse_count(arg(2)?)? as u64 },
        "reset" => Command::Reset,
        other => return Err(format!("unknown command '{}'", other)),
    };
    Ok(Some(cmd))
}

fn format_bytes(data: &[u8]) -> String {
    data.iter().map(|b| format!("{:02X}", b)).collect::<Vec<_>>().join(" ")
}

/// Run one command and return the text to print.
fn execute(sim: &mut Simulator, cmd: &Command) -> Result<String, String> {
    let out = match cmd {
        Command::Configure(v) => {
            sim.configure(*v).map_err(|e| e.to_string())?;
            format!("CR0 <- {:04X}", v)
        }
        Command::Write { word, data, mask, burst } => {
            sim.write_mem_burst(*word, data, mask.as_deref(), *burst).map_err(|e| e.to_string())?;
            format!("wrote {} byte(s) at word {:08X}", data.len(), word)
        }
        Command::Read { word, words, burst } => {
            let data = sim.read_mem(*word, *words, *burst).map_err(|e| e.to_string())?;
            format!("{:08X}: {}", word, format_bytes(&data))
        }
        Command::ReadReg(addr) => {
            let v = sim.read_reg(*addr).map_err(|e| e.to_string())?;
            format!("reg {:04X} = {:04X}", addr, v)
        }
        Command::Abort(n) => {
            let outcomes = sim.abort_after(*n).map_err(|e| e.to_string())?;
            let aborted = outcomes.iter().filter(|o| matches!(o, Outcome::Aborted)).count();
            format!("CS# released after {} CA byte(s), {} aborted", n, aborted)
        }
        Command::Dump { addr, len } => sim.device.memory().dump(*addr, *len).trim_end().to_string(),
        Command::Reset => {
            sim.reset(RESET_PULSE_PS);
            "reset".to_string()
        }
    };
    Ok(out)
}

// ─── Modes ──────────────────────────────────────────────────────────────────

/// Run every line of a script. Stops at the first failing line.
fn run_script(sim: &mut Simulator, script: &str) -> Result<(), String> {
    for (n, line) in script.lines().enumerate() {
        let cmd = match parse_command(line).map_err(|e| format!("line {}: {}", n + 1, e))? {
            Some(c) => c,
            None => continue,
        };
        let out = execute(sim, &cmd).map_err(|e| format!("line {}: {}", n + 1, e))?;
        println!("{}", out);
    }
    Ok(())
}

fn run_step_mode(sim: &mut Simulator) {
    println!("Step mode: enter script commands, 'state' for device state, q=quit");
    let stdin = std::io::stdin();
    loop {
        print!("hb> ");
        let _ = std::io::stdout().flush();
        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        match line.trim() {
            "q" | "quit" => break,
            "state" => {
                println!(
                    "phase={:?} CR0={:04X} completed={} aborted={} t={} ns",
                    sim.device.phase(),
                    sim.device.config().raw(),
                    sim.device.completed,
                    sim.device.aborted,
                    sim.clock.now_ns()
                );
                continue;
            }
            _ => {}
        }
        match parse_command(&line).and_then(|c| match c {
            Some(c) => execute(sim, &c),
            None => Ok(String::new()),
        }) {
            Ok(out) if out.is_empty() => {}
            Ok(out) => println!("{}", out),
            Err(e) => println!("error: {}", e),
        }
    }
    println!("Total: {} transaction(s), {} aborted", sim.device.completed, sim.device.aborted);
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("HYPERBUS_LOG", "info")).init();

    let args: Vec<String> = env::args().collect();
    let step_mode = args.iter().any(|a| a == "--step");
    let script_path = args.get(1).filter(|a| !a.starts_with("--"));
    if script_path.is_none() && !step_mode {
        eprintln!("HyperBus device simulator");
        eprintln!("Usage: {} <script> [options]", args[0]);
        eprintln!();
        eprintln!("Options:");
        eprintln!("  --width N            Address width in bits, 4..=33 (default 23 = 8 MiB)");
        eprintln!("  --period PS          Clock period in picoseconds (default 10000)");
        eprintln!("  --state FILE         Load a save state before running");
        eprintln!("  --save FILE          Write a save state when done");
        eprintln!("  --step               Interactive step mode (script optional)");
        std::process::exit(1);
    }

    let option = |name: &str| args.iter().position(|a| a == name).and_then(|i| args.get(i + 1));
    let mut device_config = DeviceConfig::default();
    if let Some(w) = option("--width").and_then(|s| s.parse::<u32>().ok()) {
        if !(4..=MAX_ADDRESS_WIDTH).contains(&w) {
            eprintln!("Error: --width must be between 4 and {}", MAX_ADDRESS_WIDTH);
            std::process::exit(1);
        }
        device_config.address_width = w;
    }
    let period: u64 = option("--period")
        .and_then(|s| s.parse().ok())
        .unwrap_or(hyperbus_core::clock::DEFAULT_PERIOD_PS);

    let mut sim = Simulator::new(device_config, period);
    info!(
        "device: {} byte(s), CR0={:04X}, clock period {} ps",
        sim.device.memory().capacity(),
        sim.device.config().raw(),
        period
    );

    if let Some(path) = option("--state") {
        let loaded = savestate::load_from_file(Path::new(path), device_config.address_width)
            .map_err(|e| e.to_string())
            .and_then(|state| sim.device.load_state(state).map_err(|e| e.to_string()));
        match loaded {
            Ok(()) => {
                // keep the host's latency view in step with the restored CR0
                let raw = sim.device.config().raw();
                sim.host.reset(raw);
                info!("loaded state from {}", path);
            }
            Err(e) => {
                eprintln!("Error loading {}: {}", path, e);
                std::process::exit(1);
            }
        }
    }

    if let Some(path) = script_path {
        let script = match fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("Error reading {}: {}", path, e);
                std::process::exit(1);
            }
        };
        if let Err(e) = run_script(&mut sim, &script) {
            error!("{}", e);
            std::process::exit(2);
        }
    }

    if step_mode {
        run_step_mode(&mut sim);
    }

    if let Some(path) = option("--save") {
        if let Err(e) = savestate::save_to_file(&sim.device.save_state(), Path::new(path)) {
            eprintln!("Error saving {}: {}", path, e);
            std::process::exit(1);
        }
        info!("saved state to {}", path);
    }
}
