//! The DSP core: registers, memories and the instruction cycle.

use crate::{
    config::{Config, Roms},
    error::Fault,
    exec::{EXEC_LUT, exec_extension},
    ifx::{Accelerator, Ifx, MainMemory},
    ins::Ins,
    mem::{DataTarget, IROM_BASE, Memory},
    regs::{Reg, Registers},
};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exception {
    Reset = 0,
    StackOverflow = 1,
    Unknown2 = 2,
    AccelRawReadOverflow = 3,
    AccelRawWriteOverflow = 4,
    AdpcmOverflow = 5,
    Unknown6 = 6,
    Interrupt = 7,
}

impl Exception {
    /// Address of the exception vector.
    pub fn vector(self) -> u16 {
        self as u16 * 2
    }
}

/// An instruction being repeated by LOOP/LOOPI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Repeat {
    pub addr: u16,
    pub remaining: u16,
}

pub struct Core {
    pub regs: Registers,
    pub mem: Memory,
    pub accel: Accelerator,
    pub(crate) ifx: Arc<Ifx>,
    pub(crate) ram: Arc<dyn MainMemory>,
    pub(crate) aram: Arc<dyn MainMemory>,
    pub(crate) config: Config,
    pub(crate) repeat: Option<Repeat>,
    pub(crate) halted: bool,
    pending_interrupt: Option<u32>,
    fault: Option<Fault>,
    executed: u64,
}

impl Core {
    /// Creates a core in its hard reset state. ROM images which fail to load are reported and
    /// leave their region zeroed.
    pub fn new(config: Config, roms: &Roms, ram: Arc<dyn MainMemory>) -> Self {
        let mut mem = Memory::default();

        if let Some(irom) = &roms.irom {
            match mem.load_irom(irom) {
                Ok(()) => info!("loaded IROM image"),
                Err(e) => warn!("{e}"),
            }
        }

        if let Some(drom) = &roms.drom {
            match mem.load_drom(drom) {
                Ok(()) => info!("loaded DROM image"),
                Err(e) => warn!("{e}"),
            }
        }

        let mut core = Self {
            regs: Registers::default(),
            mem,
            accel: Accelerator::default(),
            ifx: Arc::new(Ifx::new()),
            aram: ram.clone(),
            ram,
            config,
            repeat: None,
            halted: false,
            pending_interrupt: None,
            fault: None,
            executed: 0,
        };

        core.hard_reset();
        core
    }

    /// Replaces the memory the accelerator streams from. By default it is main memory.
    pub fn set_aram(&mut self, aram: Arc<dyn MainMemory>) {
        self.aram = aram;
    }

    /// The state shared with the host.
    pub fn ifx(&self) -> &Arc<Ifx> {
        &self.ifx
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn pc(&self) -> u16 {
        self.regs.pc
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn set_halted(&mut self, halted: bool) {
        debug!("DSP halt set to {halted}");
        self.halted = halted;
    }

    /// Amount of instructions executed since construction.
    pub fn executed(&self) -> u64 {
        self.executed
    }

    pub fn is_repeating(&self) -> bool {
        self.repeat.is_some()
    }

    pub fn interrupt_pending(&self) -> bool {
        self.pending_interrupt.is_some()
    }

    /// Records a fault. Only the first fault of an instruction is kept.
    pub(crate) fn fault(&mut self, fault: Fault) {
        if self.fault.is_none() {
            self.fault = Some(fault);
        }
    }

    /// Resets every register, the stacks and the hardware register block. Memories are kept.
    pub fn hard_reset(&mut self) {
        debug!("DSP hard reset");

        self.regs = Registers::default();
        self.regs.pc = IROM_BASE;
        self.accel = Accelerator::default();
        self.ifx.reset();

        self.repeat = None;
        self.halted = false;
        self.pending_interrupt = None;
        self.fault = None;
    }

    /// Restarts execution at the IROM entry point. Registers other than the stacks and the
    /// hardware register block are kept.
    pub fn soft_reset(&mut self) {
        debug!("DSP soft reset");

        self.regs.clear_stacks();
        self.regs.pc = IROM_BASE;
        self.repeat = None;
    }

    pub fn raise_exception(&mut self, exception: Exception) {
        debug!("raising exception {exception:?} at 0x{:04X}", self.regs.pc);

        self.regs.call_stack.push(self.regs.pc);
        self.regs.data_stack.push(self.regs.status.to_bits());
        self.regs.pc = exception.vector();
    }

    pub fn return_from_exception(&mut self) {
        let (Some(sr), Some(pc)) = (self.regs.data_stack.pop(), self.regs.call_stack.pop()) else {
            warn!("return from exception with empty stacks");
            return;
        };

        self.regs.set(Reg::Status, sr);
        self.regs.pc = pc;
    }

    /// Reads from instruction memory.
    pub fn read_imem(&mut self, addr: u16) -> u16 {
        match Memory::translate_imem(addr) {
            Some((region, index)) => self.mem.read(region, index),
            None => {
                self.fault(Fault::UnmappedFetch { addr });
                0
            }
        }
    }

    /// Reads from data memory.
    pub fn read_dmem(&mut self, addr: u16) -> u16 {
        match Memory::translate_dmem(addr) {
            DataTarget::Memory(region, index) => self.mem.read(region, index),
            DataTarget::Hardware(_) => self.read_hw(addr),
            DataTarget::Unmapped => {
                self.fault(Fault::UnmappedRead { addr });
                0
            }
        }
    }

    /// Writes to data memory.
    pub fn write_dmem(&mut self, addr: u16, value: u16) {
        match Memory::translate_dmem(addr) {
            DataTarget::Memory(region, index) if region.writable() => {
                self.mem.write(region, index, value)
            }
            DataTarget::Hardware(_) => self.write_hw(addr, value),
            _ => self.fault(Fault::UnmappedWrite { addr, value }),
        }
    }

    /// Length, in slots, of the instruction at `addr`.
    pub(crate) fn ins_len_at(&self, addr: u16) -> u16 {
        Ins::new(self.mem.peek_imem(addr)).decoded().len()
    }

    /// Services deferred events. Requests which can't be serviced yet stay pending.
    fn service_events(&mut self) {
        if self.ifx.take_soft_reset_request() {
            self.soft_reset();
        }

        if self.regs.status.accel_interrupt_enable() {
            if let Some(exception) = self.accel.take_overflow() {
                self.raise_exception(exception);
            }
        }

        if self.ifx.take_interrupt_request() && self.pending_interrupt.is_none() {
            debug!("external interrupt pending");
            self.pending_interrupt = Some(self.config.interrupt_delay);
        }

        if let Some(delay) = self.pending_interrupt {
            if delay > 0 {
                self.pending_interrupt = Some(delay - 1);
            } else if self.regs.status.external_interrupt_enable() && self.repeat.is_none() {
                self.pending_interrupt = None;
                self.raise_exception(Exception::Interrupt);
            }
        }
    }

    /// Handles LOOP repeats and BLOOP blocks after the instruction at `executed` completes.
    fn check_loops(&mut self, executed: u16) {
        if let Some(repeat) = self.repeat {
            if repeat.addr == executed {
                if repeat.remaining > 1 {
                    self.repeat = Some(Repeat {
                        remaining: repeat.remaining - 1,
                        ..repeat
                    });
                    self.regs.pc = repeat.addr;
                    return;
                }

                // the last repetition may also end a block
                self.repeat = None;
            }
        }

        if self.regs.loop_stack.last() != Some(&executed) {
            return;
        }

        let count = self.regs.loop_count.last().copied().unwrap_or_default();
        if count > 1 {
            if let Some(counter) = self.regs.loop_count.last_mut() {
                *counter = count - 1;
            }

            if let Some(start) = self.regs.call_stack.last() {
                self.regs.pc = *start;
            }
        } else {
            trace!("block loop ending at 0x{executed:04X} done");
            self.regs.call_stack.pop();
            self.regs.loop_stack.pop();
            self.regs.loop_count.pop();
        }
    }

    /// Executes a single instruction, servicing pending events first. A halted core does
    /// nothing.
    pub fn step(&mut self) -> Result<(), Fault> {
        if self.halted {
            return Ok(());
        }

        self.service_events();

        // fetch
        let pc = self.regs.pc;
        let mut ins = Ins::new(self.read_imem(pc));
        let decoded = ins.decoded();
        if decoded.needs_extra {
            ins.extra = self.read_imem(pc.wrapping_add(1));
        }

        if let Some(fault) = self.fault.take() {
            return Err(fault);
        }

        trace!("0x{pc:04X}: {ins:?}");
        self.regs.pc = pc.wrapping_add(decoded.len());

        // execute
        let previous = decoded.extension.map(|_| self.regs.clone());
        EXEC_LUT[decoded.opcode as usize](self, ins);

        if let (Some(extension), Some(previous)) = (decoded.extension, previous) {
            exec_extension(self, extension, ins, &previous);
        }

        self.check_loops(pc);
        self.executed += 1;

        match self.fault.take() {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }
}
