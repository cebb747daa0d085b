use crate::parse_u16;
use comfy_table::{
    Cell, CellAlignment, ContentArrangement, Table, modifiers::UTF8_ROUND_CORNERS,
    presets::UTF8_FULL,
};
use dsp::{Dsp, Reg, Registers, debug::changed_registers, disassemble, ifx::CMBH, ifx::CMBL};
use eyre_pretty::{Result, bail, eyre};
use std::io::{BufRead, Write};

const HELP: &str = "\
dspdisa [addr] [len]   disassemble instruction memory
dregs                  show all registers
dreg <name> [value]    show or set a register
dmem <addr> [len]      dump data memory
imem <addr> [len]      dump instruction memory
drun                   run until a breakpoint, halt or fault
dstop                  suspend execution
dstep [count]          execute instructions
dbrk <addr>            toggle a breakpoint
dcan <addr> <text>     add a canary, or remove it when no text is given
dlist                  list breakpoints and canaries
dbrkclr                clear breakpoints
dcanclr                clear canaries
dpc <addr>             set the program counter
dreset                 hard reset the core
du                     show registers changed since the last du
dst                    show the call stack
difx                   show the hardware register state
cpumbox <value>        send a 32-bit message to the DSP
dspmbox                read the message from the DSP
dspint                 assert the external interrupt
help                   show this text
quit                   exit";

struct Console {
    dsp: Dsp,
    snapshot: Registers,
}

fn table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            header
                .iter()
                .map(|h| Cell::new(h).set_alignment(CellAlignment::Center))
                .collect::<Vec<_>>(),
        );

    table
}

fn arg<'a>(args: &[&'a str], index: usize) -> Result<&'a str> {
    args.get(index)
        .copied()
        .ok_or_else(|| eyre!("missing argument {}", index + 1))
}

fn opt_u16(args: &[&str], index: usize, default: u16) -> Result<u16> {
    args.get(index).map_or(Ok(default), |s| parse_u16(s))
}

impl Console {
    fn disassemble(&self, start: u16, len: u16) {
        let bytes: Vec<u8> = self.dsp.with_core(|core| {
            (0..len)
                .flat_map(|i| core.mem.peek_imem(start.wrapping_add(i)).to_be_bytes())
                .collect()
        });

        let pc = self.dsp.with_core(|core| core.pc());
        let breakpoints = self.dsp.debugger().breakpoints();
        for (addr, result) in disassemble(&bytes, start) {
            let marker = match (addr == pc, breakpoints.contains(&addr)) {
                (true, _) => ">",
                (false, true) => "*",
                (false, false) => " ",
            };

            match result {
                Ok(ins) => println!("{marker} {addr:04X}  {ins}"),
                Err(e) => println!("{marker} {addr:04X}  <{e}>"),
            }
        }
    }

    fn registers(&self) {
        let regs = self.dsp.with_core(|core| core.regs.clone());

        let mut table = table(&["Register", "Value", "Register", "Value"]);
        for row in 0..16 {
            let (left, right) = (Reg::new(row), Reg::new(row + 16));
            table.add_row(vec![
                Cell::new(left),
                Cell::new(format!("{:04X}", regs.get(left))),
                Cell::new(right),
                Cell::new(format!("{:04X}", regs.get(right))),
            ]);
        }

        table.add_row(vec![
            Cell::new("pc"),
            Cell::new(format!("{:04X}", regs.pc)),
            Cell::new(""),
            Cell::new(""),
        ]);

        println!("{table}");
    }

    fn list(&self) {
        let mut table = table(&["Kind", "Address", "Text"]);
        for addr in self.dsp.debugger().breakpoints() {
            table.add_row(vec![
                Cell::new("breakpoint"),
                Cell::new(format!("{addr:04X}")),
                Cell::new(""),
            ]);
        }

        for (addr, text) in self.dsp.debugger().canaries() {
            table.add_row(vec![
                Cell::new("canary"),
                Cell::new(format!("{addr:04X}")),
                Cell::new(text),
            ]);
        }

        println!("{table}");
    }

    fn changes(&mut self) {
        let regs = self.dsp.with_core(|core| core.regs.clone());
        let changed = changed_registers(&self.snapshot, &regs);

        if changed.is_empty() {
            println!("no register changed");
        } else {
            let mut table = table(&["Register", "Before", "After"]);
            for (name, old, new) in changed {
                table.add_row(vec![
                    Cell::new(name),
                    Cell::new(format!("{old:04X}")),
                    Cell::new(format!("{new:04X}")),
                ]);
            }

            println!("{table}");
        }

        self.snapshot = regs;
    }

    fn report_stop(&self) {
        if let Some(fault) = self.dsp.take_fault() {
            println!("stopped by a fault: {fault}");
        }

        let (pc, halted) = self.dsp.with_core(|core| (core.pc(), core.is_halted()));
        println!("pc = {pc:04X}{}", if halted { " (halted)" } else { "" });
    }

    fn execute(&mut self, command: &str, args: &[&str]) -> Result<bool> {
        match command {
            "dspdisa" => {
                let start = match args.first() {
                    Some(s) => parse_u16(s)?,
                    None => self.dsp.with_core(|core| core.pc()),
                };

                self.disassemble(start, opt_u16(args, 1, 16)?);
            }
            "dregs" => self.registers(),
            "dreg" => {
                let name = arg(args, 0)?;
                match args.get(1) {
                    Some(value) => {
                        let value = parse_u16(value)?;
                        self.dsp
                            .with_core(|core| core.set_register(name, value))?;
                    }
                    None => {
                        let value = self.dsp.with_core(|core| core.register(name))?;
                        println!("{name} = {value:04X}");
                    }
                }
            }
            "dmem" => {
                let start = parse_u16(arg(args, 0)?)?;
                let len = opt_u16(args, 1, 0x40)?;
                print!("{}", self.dsp.with_core(|core| core.dump_dmem(start, len)));
            }
            "imem" => {
                let start = parse_u16(arg(args, 0)?)?;
                let len = opt_u16(args, 1, 0x40)?;
                print!("{}", self.dsp.with_core(|core| core.dump_imem(start, len)));
            }
            "drun" => {
                self.dsp.run();
                self.dsp.wait();
                self.report_stop();
            }
            "dstop" => {
                self.dsp.suspend();
                self.dsp.wait();
                self.report_stop();
            }
            "dstep" => {
                let count = opt_u16(args, 0, 1)?;
                for _ in 0..count {
                    self.dsp.step()?;
                }

                self.report_stop();
            }
            "dbrk" => {
                let addr = parse_u16(arg(args, 0)?)?;
                if self.dsp.debugger().toggle_breakpoint(addr) {
                    println!("breakpoint added at {addr:04X}");
                } else {
                    println!("breakpoint removed at {addr:04X}");
                }
            }
            "dcan" => {
                let addr = parse_u16(arg(args, 0)?)?;
                if args.len() > 1 {
                    self.dsp.debugger().add_canary(addr, args[1..].join(" "));
                } else if !self.dsp.debugger().remove_canary(addr) {
                    bail!("no canary at {addr:04X}");
                }
            }
            "dlist" => self.list(),
            "dbrkclr" => self.dsp.debugger().clear_breakpoints(),
            "dcanclr" => self.dsp.debugger().clear_canaries(),
            "dpc" => {
                let pc = parse_u16(arg(args, 0)?)?;
                self.dsp.with_core(|core| core.regs.pc = pc);
            }
            "dreset" => {
                self.dsp.suspend();
                self.dsp.wait();
                self.dsp.assert_reset();
                self.report_stop();
            }
            "du" => self.changes(),
            "dst" => {
                let stack = self.dsp.with_core(|core| core.call_stack());
                if stack.is_empty() {
                    println!("call stack is empty");
                }

                for (depth, addr) in stack.iter().enumerate() {
                    println!("#{depth} {addr:04X}");
                }
            }
            "difx" => println!("{}", self.dsp.ifx()),
            "cpumbox" => {
                let value = util::parse_int(arg(args, 0)?)
                    .and_then(|v| u32::try_from(v).ok())
                    .ok_or_else(|| eyre!("invalid 32-bit value"))?;

                self.dsp.host_write(CMBH, (value >> 16) as u16)?;
                self.dsp.host_write(CMBL, value as u16)?;
            }
            "dspmbox" => {
                let mailbox = &self.dsp.ifx().dsp_to_cpu;
                if mailbox.ready() {
                    let hi = mailbox.read_hi();
                    let lo = mailbox.read_lo(true);
                    println!("{:08X}", (((hi as u32) << 16) | lo as u32) & 0x7FFF_FFFF);
                } else {
                    println!("mailbox is empty");
                }
            }
            "dspint" => self.dsp.assert_interrupt(),
            "help" => println!("{HELP}"),
            "quit" | "exit" => return Ok(false),
            _ => bail!("unknown command {command:?}, try help"),
        }

        Ok(true)
    }
}

pub fn run(dsp: Dsp) -> Result<()> {
    let snapshot = dsp.with_core(|core| core.regs.clone());
    let mut console = Console { dsp, snapshot };

    let stdin = std::io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        print!("dsp> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next() else {
            break;
        };

        let line = line?;
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            continue;
        };

        let args: Vec<&str> = words.collect();
        match console.execute(command, &args) {
            Ok(true) => (),
            Ok(false) => break,
            Err(e) => println!("error: {e}"),
        }
    }

    Ok(())
}
