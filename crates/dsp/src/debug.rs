//! Inspection layer: breakpoints, canaries and state dumps.

use crate::{
    core::Core,
    error::DebugError,
    regs::{Reg, Registers},
};
use std::{collections::BTreeMap, fmt::Write, sync::Mutex};
use strum::VariantArray;
use tracing::debug;

#[derive(Debug, Default)]
struct Breakpoints {
    list: Vec<u16>,
    one_shot: Option<u16>,
}

/// Breakpoints and canaries. Shared between the DSP thread and debug frontends.
#[derive(Debug, Default)]
pub struct Debugger {
    breakpoints: Mutex<Breakpoints>,
    canaries: Mutex<BTreeMap<u16, String>>,
}

impl Debugger {
    /// Adds a breakpoint. Returns whether it was not already set.
    pub fn add_breakpoint(&self, addr: u16) -> bool {
        let mut breakpoints = self.breakpoints.lock().unwrap();
        if breakpoints.list.contains(&addr) {
            return false;
        }

        debug!("breakpoint added at 0x{addr:04X}");
        breakpoints.list.push(addr);
        true
    }

    /// Removes a breakpoint. Returns whether it was set.
    pub fn remove_breakpoint(&self, addr: u16) -> bool {
        let mut breakpoints = self.breakpoints.lock().unwrap();
        let len = breakpoints.list.len();
        breakpoints.list.retain(|b| *b != addr);

        breakpoints.list.len() != len
    }

    /// Toggles a breakpoint. Returns whether it is now set.
    pub fn toggle_breakpoint(&self, addr: u16) -> bool {
        if self.remove_breakpoint(addr) {
            false
        } else {
            self.add_breakpoint(addr)
        }
    }

    /// Sets a breakpoint which is removed after it first hits.
    pub fn set_one_shot(&self, addr: u16) {
        self.breakpoints.lock().unwrap().one_shot = Some(addr);
    }

    pub fn breakpoints(&self) -> Vec<u16> {
        let mut list = self.breakpoints.lock().unwrap().list.clone();
        list.sort_unstable();
        list
    }

    pub fn clear_breakpoints(&self) {
        let mut breakpoints = self.breakpoints.lock().unwrap();
        breakpoints.list.clear();
        breakpoints.one_shot = None;
    }

    /// Whether execution should stop at `pc`. Consumes the one-shot breakpoint if it matches.
    pub fn test_breakpoint(&self, pc: u16) -> bool {
        let mut breakpoints = self.breakpoints.lock().unwrap();
        if breakpoints.one_shot == Some(pc) {
            breakpoints.one_shot = None;
            return true;
        }

        breakpoints.list.contains(&pc)
    }

    pub fn add_canary(&self, addr: u16, text: impl Into<String>) {
        self.canaries.lock().unwrap().insert(addr, text.into());
    }

    pub fn remove_canary(&self, addr: u16) -> bool {
        self.canaries.lock().unwrap().remove(&addr).is_some()
    }

    pub fn canaries(&self) -> Vec<(u16, String)> {
        self.canaries
            .lock()
            .unwrap()
            .iter()
            .map(|(addr, text)| (*addr, text.clone()))
            .collect()
    }

    pub fn clear_canaries(&self) {
        self.canaries.lock().unwrap().clear();
    }

    /// Text of the canary at `pc`, if any.
    pub fn canary(&self, pc: u16) -> Option<String> {
        self.canaries.lock().unwrap().get(&pc).cloned()
    }
}

/// Registers which differ between two snapshots, as `(name, old, new)`.
pub fn changed_registers(old: &Registers, new: &Registers) -> Vec<(String, u16, u16)> {
    let mut changed = Vec::new();
    if old.pc != new.pc {
        changed.push(("pc".to_owned(), old.pc, new.pc));
    }

    for reg in Reg::VARIANTS {
        let (a, b) = (old.get(*reg), new.get(*reg));
        if a != b {
            changed.push((reg.to_string(), a, b));
        }
    }

    changed
}

impl Core {
    /// Reads a register by name. `pc` is accepted along with the register names.
    pub fn register(&self, name: &str) -> Result<u16, DebugError> {
        if name.eq_ignore_ascii_case("pc") {
            return Ok(self.regs.pc);
        }

        let reg = parse_reg(name)?;
        Ok(self.regs.get(reg))
    }

    /// Writes a register by name. Stack registers push `value`.
    pub fn set_register(&mut self, name: &str, value: u16) -> Result<(), DebugError> {
        if name.eq_ignore_ascii_case("pc") {
            self.regs.pc = value;
            return Ok(());
        }

        let reg = parse_reg(name)?;
        self.regs.set(reg, value);
        Ok(())
    }

    /// Lists registers, one per line. With a previous snapshot, only changed registers are
    /// listed.
    pub fn dump_regs(&self, previous: Option<&Registers>) -> String {
        let mut out = String::new();
        match previous {
            Some(previous) => {
                for (name, old, new) in changed_registers(previous, &self.regs) {
                    _ = writeln!(out, "{name:>6}: 0x{old:04X} -> 0x{new:04X}");
                }
            }
            None => {
                _ = writeln!(out, "{:>6}: 0x{:04X}", "pc", self.regs.pc);
                for reg in Reg::VARIANTS {
                    _ = writeln!(out, "{:>6}: 0x{:04X}", reg.to_string(), self.regs.get(*reg));
                }
            }
        }

        out
    }

    /// Hex dump of `len` DMEM slots starting at `start`. Hardware registers are not read.
    pub fn dump_dmem(&self, start: u16, len: u16) -> String {
        hex_dump(start, len, |addr| self.mem.peek_dmem(addr))
    }

    /// Hex dump of `len` IMEM slots starting at `start`.
    pub fn dump_imem(&self, start: u16, len: u16) -> String {
        hex_dump(start, len, |addr| self.mem.peek_imem(addr))
    }

    /// Return addresses in the call stack, innermost first.
    pub fn call_stack(&self) -> Vec<u16> {
        self.regs.call_stack.iter().rev().copied().collect()
    }
}

fn parse_reg(name: &str) -> Result<Reg, DebugError> {
    let name = name.trim_start_matches('$').to_ascii_lowercase();
    name.parse::<Reg>()
        .map_err(|_| DebugError::UnknownRegister { name })
}

fn hex_dump(start: u16, len: u16, read: impl Fn(u16) -> u16) -> String {
    let mut out = String::new();
    for offset in (0..len).step_by(8) {
        let addr = start.wrapping_add(offset);
        _ = write!(out, "{addr:04X}:");

        for i in offset..(offset + 8).min(len) {
            _ = write!(out, " {:04X}", read(start.wrapping_add(i)));
        }

        out.push('\n');
    }

    out
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        config::{Config, Roms},
        ifx::Ram,
    };
    use std::sync::Arc;

    #[test]
    fn breakpoints() {
        let debugger = Debugger::default();
        assert!(debugger.add_breakpoint(0x10));
        assert!(!debugger.add_breakpoint(0x10));
        assert!(debugger.toggle_breakpoint(0x04));
        assert_eq!(debugger.breakpoints(), vec![0x04, 0x10]);
        assert!(!debugger.toggle_breakpoint(0x04));

        assert!(debugger.test_breakpoint(0x10));
        assert!(!debugger.test_breakpoint(0x11));

        debugger.set_one_shot(0x20);
        assert!(debugger.test_breakpoint(0x20));
        assert!(!debugger.test_breakpoint(0x20));

        debugger.clear_breakpoints();
        assert!(debugger.breakpoints().is_empty());
    }

    #[test]
    fn canaries() {
        let debugger = Debugger::default();
        debugger.add_canary(0x8000, "boot");
        assert_eq!(debugger.canary(0x8000).as_deref(), Some("boot"));
        assert_eq!(debugger.canary(0x8001), None);

        debugger.clear_canaries();
        assert!(debugger.canaries().is_empty());
    }

    #[test]
    fn registers_by_name() {
        let mut core = Core::new(
            Config::default(),
            &Roms::default(),
            Arc::new(Ram::new(0x100)),
        );

        core.set_register("$AR1", 0x1234).unwrap();
        core.set_register("pc", 0x0010).unwrap();
        assert_eq!(core.register("ar1"), Ok(0x1234));
        assert_eq!(core.pc(), 0x0010);
        assert_eq!(
            core.register("foo"),
            Err(DebugError::UnknownRegister {
                name: "foo".to_owned()
            })
        );

        let previous = core.regs.clone();
        core.set_register("r8", 0x00FF).unwrap();
        let changed = changed_registers(&previous, &core.regs);
        assert_eq!(changed, vec![("lm0".to_owned(), 0xFFFF, 0x00FF)]);
    }

    #[test]
    fn dumps() {
        let mut core = Core::new(
            Config::default(),
            &Roms::default(),
            Arc::new(Ram::new(0x100)),
        );
        core.mem.dram[1] = 0xABCD;

        assert_eq!(
            core.dump_dmem(0, 10),
            "0000: 0000 ABCD 0000 0000 0000 0000 0000 0000\n0008: 0000 0000\n"
        );
    }
}
