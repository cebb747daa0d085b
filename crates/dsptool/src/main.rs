mod console;

use clap::{Args as ClapArgs, Parser, Subcommand};
use comfy_table::{Cell, ContentArrangement, Table, presets::NOTHING};
use dsp::{Config, Core, Dsp, Ram, Roms, disassemble};
use eyre_pretty::{Context, Result, bail, eyre};
use std::{
    path::{Path, PathBuf},
    sync::{Arc, atomic::AtomicU32},
    time::{Duration, Instant},
};

/// Options to build a DSP with a ucode image loaded in IRAM.
#[derive(Debug, ClapArgs)]
struct Machine {
    /// Path to a big endian ucode image, loaded at the start of IRAM
    ucode: PathBuf,
    /// Path to an IROM image (8 KiB)
    #[arg(long)]
    irom: Option<PathBuf>,
    /// Path to a DROM image (4 KiB)
    #[arg(long)]
    drom: Option<PathBuf>,
    /// Size of the emulated main memory, in bytes
    #[arg(long, default_value = "0x01800000")]
    ram_size: String,
    /// Slot address where execution starts
    #[arg(long, default_value = "0x0000")]
    entry: String,
    /// Directory where ucode uploaded through DMA is saved
    #[arg(long)]
    dump_ucode: Option<PathBuf>,
    /// Ignore breakpoints
    #[arg(long, default_value_t = false)]
    no_breakpoints: bool,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Disassemble a ucode image.
    Disasm {
        /// Path to a big endian ucode image
        input: PathBuf,
        /// Slot address the image is loaded at
        #[arg(long, default_value = "0x0000")]
        base: String,
        /// Also print the raw instruction words
        #[arg(long, default_value_t = false)]
        words: bool,
    },
    /// Run a ucode image until it halts, faults or the timeout expires.
    Run {
        #[command(flatten)]
        machine: Machine,
        /// Timeout, in milliseconds
        #[arg(long, default_value_t = 1000)]
        timeout: u64,
    },
    /// Open an interactive debug console.
    Console {
        #[command(flatten)]
        machine: Machine,
    },
}

/// A CLI tool to disassemble, run and debug GameCube DSP ucode.
#[derive(Parser, Debug)]
#[command(version)]
struct Args {
    /// Action to take
    #[command(subcommand)]
    command: Command,
}

fn setup_tracing() {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or(EnvFilter::new("dsp=info,dsptool=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

pub(crate) fn parse_u16(s: &str) -> Result<u16> {
    util::parse_int(s)
        .and_then(|v| u16::try_from(v).ok())
        .ok_or_else(|| eyre!("invalid 16-bit value {s:?}"))
}

fn read_file(path: &Path, what: &str) -> Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("reading {what} {}", path.display()))
}

fn build(machine: &Machine) -> Result<Dsp> {
    let roms = Roms {
        irom: machine
            .irom
            .as_ref()
            .map(|p| read_file(p, "IROM"))
            .transpose()?,
        drom: machine
            .drom
            .as_ref()
            .map(|p| read_file(p, "DROM"))
            .transpose()?,
    };

    let ram_size = util::parse_int(&machine.ram_size)
        .ok_or_else(|| eyre!("invalid RAM size {:?}", machine.ram_size))?;

    let config = Config {
        ticks_per_instruction: 0,
        breakpoints_enabled: !machine.no_breakpoints,
        ucode_dump_dir: machine.dump_ucode.clone(),
        ..Default::default()
    };

    let mut core = Core::new(config, &roms, Arc::new(Ram::new(ram_size as usize)));

    let ucode = read_file(&machine.ucode, "ucode")?;
    if ucode.len() % 2 != 0 || ucode.len() / 2 > core.mem.iram.len() {
        bail!("ucode image has an invalid size of 0x{:X} bytes", ucode.len());
    }

    for (slot, word) in core.mem.iram.iter_mut().zip(ucode.chunks_exact(2)) {
        *slot = u16::from_be_bytes([word[0], word[1]]);
    }

    core.regs.pc = parse_u16(&machine.entry)?;
    Ok(Dsp::new(core, Arc::new(AtomicU32::new(0))))
}

fn disasm(input: PathBuf, base: u16, words: bool) -> Result<()> {
    let bytes = read_file(&input, "ucode")?;

    let mut table = Table::new();
    table
        .load_preset(NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic);

    for (addr, result) in disassemble(&bytes, base) {
        let mut row = vec![Cell::new(format!("{addr:04X}"))];
        match result {
            Ok(ins) => {
                if words {
                    let raw = if ins.len == 4 {
                        format!("{:04X} {:04X}", ins.ins.base, ins.ins.extra)
                    } else {
                        format!("{:04X}", ins.ins.base)
                    };
                    row.push(Cell::new(raw));
                }

                row.push(Cell::new(ins));
            }
            Err(e) => {
                if words {
                    row.push(Cell::new(""));
                }

                row.push(Cell::new(format!("<{e}>")));
            }
        }

        table.add_row(row);
    }

    println!("{table}");
    Ok(())
}

fn run(machine: Machine, timeout: Duration) -> Result<()> {
    let dsp = build(&machine)?;
    let start = Instant::now();

    dsp.run();
    while dsp.is_running() {
        if start.elapsed() > timeout {
            tracing::warn!("timeout expired, suspending");
            dsp.suspend();
            break;
        }

        std::thread::sleep(Duration::from_millis(1));
    }

    dsp.wait();
    dsp.with_core(|core| {
        println!("executed {} instructions", core.executed());
        print!("{}", core.dump_regs(None));
    });
    println!("{}", dsp.ifx());

    if let Some(fault) = dsp.take_fault() {
        bail!("DSP stopped by a fault: {fault}");
    }

    Ok(())
}

fn main() -> Result<()> {
    eyre_pretty::install().unwrap();
    setup_tracing();

    let args = Args::parse();
    match args.command {
        Command::Disasm { input, base, words } => disasm(input, parse_u16(&base)?, words),
        Command::Run { machine, timeout } => run(machine, Duration::from_millis(timeout)),
        Command::Console { machine } => console::run(build(&machine)?),
    }
}
