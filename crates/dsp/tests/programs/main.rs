mod file;

use dsp::{Config, Core, Ins, Ram, Reg, Registers, Roms};
use libtest_mimic::{Arguments, Failed, Trial};
use std::{fmt::Write, sync::Arc};

const HALT: u16 = 0x0021;
const MAX_STEPS: usize = 100_000;

/// A small program run from IRAM address 0 until it halts.
struct Program {
    name: &'static str,
    code: &'static [u16],
    regs: &'static [(Reg, u16)],
    dmem: &'static [(u16, u16)],
    mailbox: Option<u32>,
}

const PROGRAMS: &[Program] = &[
    Program {
        name: "add_mid",
        // lri $ac0.m, 1 ; lri $ac1.m, 2 ; add $ac0, $ac1
        code: &[0x009E, 0x0001, 0x009F, 0x0002, 0x4C00, HALT],
        regs: &[(Reg::Acc40Mid0, 3), (Reg::Acc40Mid1, 2)],
        dmem: &[],
        mailbox: None,
    },
    Program {
        name: "block_loop_store",
        // lri $ar0, 0x100 ; bloopi 4, 0x0005 ; incm $ac0 ; srri @$ar0, $ac0.m
        code: &[0x0080, 0x0100, 0x1104, 0x0005, 0x7400, 0x1B1E, HALT],
        regs: &[(Reg::Acc40Mid0, 4), (Reg::Addr0, 0x0104), (Reg::LoopStack, 0)],
        dmem: &[(0x100, 1), (0x101, 2), (0x102, 3), (0x103, 4)],
        mailbox: None,
    },
    Program {
        name: "call_return",
        // call 0x0004 ; halt ; nop ; lri $ac1.m, 0x1234 ; ret
        code: &[0x02BF, 0x0004, HALT, 0x0000, 0x009F, 0x1234, 0x02DF],
        regs: &[(Reg::Acc40Mid1, 0x1234), (Reg::CallStack, 0)],
        dmem: &[],
        mailbox: None,
    },
    Program {
        name: "repeat_increment",
        // loopi 3 ; iar $ar1
        code: &[0x1003, 0x0009, HALT],
        regs: &[(Reg::Addr1, 3)],
        dmem: &[],
        mailbox: None,
    },
    Program {
        name: "repeat_ends_block",
        // bloopi 2, 0x0003 ; loopi 3 ; iar $ar1
        code: &[0x1102, 0x0003, 0x1003, 0x0009, HALT],
        regs: &[(Reg::Addr1, 6), (Reg::LoopStack, 0), (Reg::CallStack, 0)],
        dmem: &[],
        mailbox: None,
    },
    Program {
        name: "skip_on_zero",
        // clr $ac0 ; jz 0x0005 ; lri $ac1.m, 0xDEAD
        code: &[0x8100, 0x0295, 0x0005, 0x009F, 0xDEAD, HALT],
        regs: &[(Reg::Acc40Mid1, 0)],
        dmem: &[],
        mailbox: None,
    },
    Program {
        name: "multiply",
        // lri $ax0.l, 3 ; lri $ax0.h, 4 ; mul $ax0.l, $ax0.h ; movp $ac0
        code: &[0x0098, 0x0003, 0x009A, 0x0004, 0x9000, 0x6E00, HALT],
        regs: &[(Reg::Acc40Low0, 24), (Reg::Acc40Mid0, 0)],
        dmem: &[],
        mailbox: None,
    },
    Program {
        name: "mailbox_send",
        // si @DMBH, 0x8123 ; si @DMBL, 0x4567
        code: &[0x16FC, 0x8123, 0x16FD, 0x4567, HALT],
        regs: &[],
        dmem: &[],
        mailbox: Some(0x8123_4567),
    },
    Program {
        name: "extension_load",
        // lri $ar0, 0x10 ; lri $ac0.m, 0xAA ; srri @$ar0, $ac0.m ; dar $ar0 ; nx : l $ax0.h, @$ar0
        code: &[
            0x0080, 0x0010, 0x009E, 0x00AA, 0x1B1E, 0x0004, 0x8050, HALT,
        ],
        regs: &[(Reg::Acc32High0, 0x00AA), (Reg::Addr0, 0x0011)],
        dmem: &[(0x10, 0x00AA)],
        mailbox: None,
    },
];

fn new_core() -> Core {
    Core::new(Config::default(), &Roms::default(), Arc::new(Ram::new(0x1000)))
}

fn run_until_halt(core: &mut Core) -> Result<(), Failed> {
    for _ in 0..MAX_STEPS {
        core.step()
            .map_err(|fault| format!("fault at 0x{:04X}: {fault}", core.pc()))?;

        if core.is_halted() {
            return Ok(());
        }
    }

    Err(format!("did not halt after {MAX_STEPS} steps").into())
}

fn run_program(program: &Program) -> Result<(), Failed> {
    let mut core = new_core();
    core.mem.iram[..program.code.len()].copy_from_slice(program.code);
    core.regs.pc = 0;

    run_until_halt(&mut core)?;

    let mut divergences = String::new();
    for (reg, expected) in program.regs {
        let value = core.regs.get(*reg);
        if value != *expected {
            _ = write!(divergences, "{reg}(v={value:04X}, e={expected:04X}), ");
        }
    }

    for (addr, expected) in program.dmem {
        let value = core.mem.peek_dmem(*addr);
        if value != *expected {
            _ = write!(divergences, "@{addr:04X}(v={value:04X}, e={expected:04X}), ");
        }
    }

    if let Some(expected) = program.mailbox {
        let value = core.ifx().dsp_to_cpu.peek();
        if value != expected {
            _ = write!(divergences, "mailbox(v={value:08X}, e={expected:08X}), ");
        }
    }

    if divergences.is_empty() {
        Ok(())
    } else {
        Err(divergences.trim_end_matches(", ").into())
    }
}

/// Slot address where test vector code is placed.
const VECTOR_BASE: u16 = 62;

fn parse_code(mut words: &[u16]) -> Vec<Ins> {
    let mut code = vec![];
    while let Some(&base) = words.first() {
        let decoded = Ins::new(base).decoded();
        if decoded.needs_extra && words.len() > 1 {
            code.push(Ins::with_extra(base, words[1]));
            words = &words[2..];
        } else {
            code.push(Ins::new(base));
            words = &words[1..];
        }
    }

    code
}

fn divergences(value: &Registers, expected: &Registers) -> Vec<(Reg, u16, u16)> {
    let ignore_status = std::env::var("IGNORE_STATUS").is_ok();

    (0..32)
        .map(Reg::new)
        .filter(|reg| !file::SKIPPED.contains(reg))
        .filter(|reg| !(ignore_status && *reg == Reg::Status))
        .filter_map(|reg| {
            let (v, e) = (value.get(reg), expected.get(reg));
            (v != e).then_some((reg, v, e))
        })
        .collect()
}

fn run_case(case: &file::TestCase) -> Result<(), String> {
    let mut core = new_core();
    let base = VECTOR_BASE as usize;
    let len = case.instructions.len();

    core.regs = case.initial.registers();
    core.regs.pc = VECTOR_BASE;
    core.mem.iram[base..][..len].copy_from_slice(&case.instructions);
    core.mem.iram[base + len] = HALT;

    run_until_halt(&mut core).map_err(|e| format!("{e:?}"))?;

    let found = divergences(&core.regs, &case.expected.registers());
    if found.is_empty() {
        return Ok(());
    }

    let mut msg = found
        .iter()
        .map(|(r, v, e)| format!("{r}(v={v:04X}, e={e:04X}), "))
        .collect::<String>()
        .trim_end_matches(", ")
        .to_owned();

    let mut pc = VECTOR_BASE;
    for ins in parse_code(&case.instructions) {
        _ = write!(msg, "\r\n{pc:04X} {ins:?}");
        pc += ins.decoded().len();
    }

    Err(msg)
}

fn run_vectors(file: file::TestFile, quiet: bool) -> Result<(), Failed> {
    let total = file.cases.len();
    let failures: Vec<String> = file
        .cases
        .iter()
        .enumerate()
        .filter_map(|(i, case)| run_case(case).err().map(|e| format!("Case {i} failed: {e}")))
        .collect();

    if failures.is_empty() {
        return Ok(());
    }

    let mut msg = format!(
        "Failed a total of {} cases (out of {total})",
        failures.len()
    );

    if !quiet {
        let shown = 8;
        msg.push_str("\r\n\r\n");
        for failure in failures.iter().take(shown) {
            _ = writeln!(msg, "{failure}");
        }

        if failures.len() > shown {
            _ = writeln!(msg, "... and {} others", failures.len() - shown);
        }
    }

    Err(msg.into())
}

fn vector_trials(quiet: bool) -> Vec<Trial> {
    let Ok(dir) = std::env::var("DSP_TEST_VECTORS") else {
        return vec![];
    };

    let Ok(entries) = std::fs::read_dir(&dir) else {
        eprintln!("could not read test vector directory {dir}");
        return vec![];
    };

    entries
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_file()))
        .map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            let path = entry.path();
            Trial::test(format!("vectors::{name}"), move || {
                let file = file::TestFile::open(&path)?;
                run_vectors(file, quiet)
            })
        })
        .collect()
}

fn main() {
    let args = Arguments::from_args();
    let quiet = args.quiet || std::env::var("QUIET").is_ok();

    let mut trials: Vec<Trial> = PROGRAMS
        .iter()
        .map(|program| Trial::test(program.name, move || run_program(program)))
        .collect();

    trials.extend(vector_trials(quiet));
    libtest_mimic::run(&args, trials).exit();
}
