//! The DSP execution thread.
//!
//! A [`Dsp`] owns a [`Core`] and a dedicated thread which executes it while running, paced
//! by a host clock.

use crate::{
    core::Core,
    debug::Debugger,
    error::{Fault, StepError},
    ifx::Ifx,
};
use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicU32, Ordering},
    },
    thread::JoinHandle,
};
use tracing::{debug, error, info, warn};

/// A free running 32-bit tick counter of the host.
pub trait Clock: Send + Sync {
    fn ticks(&self) -> u32;
}

impl Clock for AtomicU32 {
    fn ticks(&self) -> u32 {
        self.load(Ordering::Relaxed)
    }
}

const SUSPENDED: u32 = 0;
const RUNNING: u32 = 1;
const SHUTDOWN: u32 = 2;

struct Shared {
    core: Mutex<Core>,
    ifx: Arc<Ifx>,
    clock: Arc<dyn Clock>,
    state: AtomicU32,
    last_ticks: AtomicU32,
    resume_pc: Mutex<Option<u16>>,
    fault: Mutex<Option<Fault>>,
    debugger: Debugger,
    ticks_per_instruction: u32,
    breakpoints_enabled: bool,
}

impl Shared {
    fn is_running(&self) -> bool {
        self.state.load(Ordering::Acquire) == RUNNING
    }

    fn suspend(&self) {
        if self
            .state
            .compare_exchange(RUNNING, SUSPENDED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            debug!("DSP suspended");
            atomic_wait::wake_all(&self.state);
        }
    }

    fn check_canary(&self, pc: u16) {
        if let Some(text) = self.debugger.canary(pc) {
            info!("canary at 0x{pc:04X}: {text}");
        }
    }

    /// Executes a single instruction if enough host ticks elapsed since the last one.
    fn update(&self) {
        let now = self.clock.ticks();
        let last = self.last_ticks.load(Ordering::Relaxed);
        if now.wrapping_sub(last) < self.ticks_per_instruction {
            std::thread::yield_now();
            return;
        }

        self.last_ticks.store(now, Ordering::Relaxed);

        let mut core = self.core.lock().unwrap();
        let pc = core.pc();

        let resumed_here = self.resume_pc.lock().unwrap().take() == Some(pc);
        if self.breakpoints_enabled && !resumed_here && self.debugger.test_breakpoint(pc) {
            info!("breakpoint hit at 0x{pc:04X}");
            self.suspend();
            return;
        }

        self.check_canary(pc);
        match core.step() {
            Ok(()) => {
                if core.is_halted() {
                    debug!("DSP halted, suspending");
                    self.suspend();
                }
            }
            Err(fault) => {
                std::mem::drop(core);

                error!("DSP fault: {fault}");
                *self.fault.lock().unwrap() = Some(fault);
                self.suspend();
            }
        }
    }
}

fn worker(shared: Arc<Shared>) {
    loop {
        match shared.state.load(Ordering::Acquire) {
            RUNNING => shared.update(),
            SHUTDOWN => break,
            state => atomic_wait::wait(&shared.state, state),
        }
    }
}

/// A DSP core together with the thread executing it. Starts suspended.
pub struct Dsp {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl Dsp {
    pub fn new(core: Core, clock: Arc<dyn Clock>) -> Self {
        let ticks_per_instruction = core.config().ticks_per_instruction;
        let breakpoints_enabled = core.config().breakpoints_enabled;
        let shared = Arc::new(Shared {
            ifx: core.ifx().clone(),
            ticks_per_instruction,
            breakpoints_enabled,
            core: Mutex::new(core),
            last_ticks: AtomicU32::new(clock.ticks()),
            clock,
            state: AtomicU32::new(SUSPENDED),
            resume_pc: Mutex::new(None),
            fault: Mutex::new(None),
            debugger: Debugger::default(),
        });

        let handle = std::thread::Builder::new()
            .name("dsp runner".into())
            .spawn({
                let shared = shared.clone();
                move || worker(shared)
            })
            .unwrap();

        Self {
            shared,
            handle: Some(handle),
        }
    }

    /// Starts executing on the DSP thread. A breakpoint at the current PC does not trigger
    /// until execution moves past it.
    pub fn run(&self) {
        let pc = self.shared.core.lock().unwrap().pc();
        *self.shared.resume_pc.lock().unwrap() = Some(pc);
        self.shared
            .last_ticks
            .store(self.shared.clock.ticks(), Ordering::Relaxed);

        if self
            .shared
            .state
            .compare_exchange(SUSPENDED, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            debug!("DSP running from 0x{pc:04X}");
            atomic_wait::wake_all(&self.shared.state);
        }
    }

    /// Stops executing. An instruction in flight completes first.
    pub fn suspend(&self) {
        self.shared.suspend();
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// Blocks until the DSP thread suspends, either by request, breakpoint, halt or fault.
    pub fn wait(&self) {
        while self.is_running() {
            atomic_wait::wait(&self.shared.state, RUNNING);
        }
    }

    /// Executes a single instruction. Only possible while suspended.
    pub fn step(&self) -> Result<(), StepError> {
        if self.is_running() {
            warn!("cannot step while the DSP thread is running");
            return Err(StepError::Running);
        }

        let mut core = self.shared.core.lock().unwrap();
        self.shared.check_canary(core.pc());
        core.step().map_err(|source| StepError::Fault { source })
    }

    /// Runs `f` with exclusive access to the core.
    pub fn with_core<R>(&self, f: impl FnOnce(&mut Core) -> R) -> R {
        let mut core = self.shared.core.lock().unwrap();
        f(&mut core)
    }

    pub fn ifx(&self) -> &Arc<Ifx> {
        &self.shared.ifx
    }

    pub fn debugger(&self) -> &Debugger {
        &self.shared.debugger
    }

    /// Takes the fault which stopped the DSP thread, if any.
    pub fn take_fault(&self) -> Option<Fault> {
        self.shared.fault.lock().unwrap().take()
    }

    /// Asserts the external interrupt. It is taken at a later instruction boundary.
    pub fn assert_interrupt(&self) {
        debug!("external interrupt asserted");
        self.shared.ifx.request_interrupt();
    }

    /// Requests a soft reset, serviced at the next instruction boundary.
    pub fn request_soft_reset(&self) {
        self.shared.ifx.request_soft_reset();
    }

    /// Hard resets the core.
    pub fn assert_reset(&self) {
        info!("DSP reset asserted");
        self.with_core(Core::hard_reset);
    }

    /// Halts or resumes the core. Resuming also starts the DSP thread.
    pub fn set_halt(&self, halted: bool) {
        self.with_core(|core| core.set_halted(halted));
        if !halted {
            self.run();
        }
    }

    /// Writes a hardware register from the host side.
    pub fn host_write(&self, addr: u16, value: u16) -> Result<(), Fault> {
        self.shared.ifx.host_write(addr, value).inspect_err(|e| error!("{e}"))
    }

    /// Reads a hardware register from the host side.
    pub fn host_read(&self, addr: u16) -> Result<u16, Fault> {
        self.shared.ifx.host_read(addr).inspect_err(|e| error!("{e}"))
    }
}

impl Drop for Dsp {
    fn drop(&mut self) {
        self.shared.state.store(SHUTDOWN, Ordering::Release);
        atomic_wait::wake_all(&self.shared.state);

        if let Some(handle) = self.handle.take() {
            _ = handle.join();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        config::{Config, Roms},
        ifx::Ram,
    };
    use std::time::Duration;

    const HALT: u16 = 0x0021;

    fn dsp(program: &[u16], config: Config) -> (Dsp, Arc<AtomicU32>) {
        let mut core = Core::new(config, &Roms::default(), Arc::new(Ram::new(0x1000)));
        core.mem.iram[..program.len()].copy_from_slice(program);
        core.regs.pc = 0;

        let clock = Arc::new(AtomicU32::new(0));
        (Dsp::new(core, clock.clone()), clock)
    }

    fn free_running() -> Config {
        Config {
            ticks_per_instruction: 0,
            ..Default::default()
        }
    }

    #[test]
    fn step_only_while_suspended() {
        // inc $ac0 ; jmp 0x0000
        let (dsp, _) = dsp(&[0x7600, 0x029F, 0x0000], Config::default());

        dsp.step().unwrap();
        assert_eq!(dsp.with_core(|core| core.pc()), 1);

        dsp.run();
        let before = dsp.with_core(|core| core.executed());
        assert!(matches!(dsp.step(), Err(StepError::Running)));
        dsp.suspend();
        dsp.wait();

        // the clock never advanced
        assert_eq!(dsp.with_core(|core| core.executed()), before);
    }

    fn wait_for(f: impl Fn() -> bool) {
        for _ in 0..1000 {
            if f() {
                return;
            }

            std::thread::sleep(Duration::from_millis(1));
        }

        panic!("condition never held");
    }

    #[test]
    fn clock_paces_execution() {
        let (dsp, clock) = dsp(&[0x7600, 0x7600, 0x7600, HALT], Config::default());
        let executed = || dsp.with_core(|core| core.executed());

        dsp.run();
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(executed(), 0);

        clock.store(5, Ordering::Relaxed);
        wait_for(|| executed() == 1);
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(executed(), 1);

        clock.store(12, Ordering::Relaxed);
        wait_for(|| executed() == 2);

        dsp.suspend();
        dsp.wait();
        assert_eq!(dsp.with_core(|core| core.regs.acc40[0].get()), 2);
    }

    #[test]
    fn breakpoints_pause() {
        let (dsp, _) = dsp(&[0x7600, 0x7600, 0x7600, HALT], free_running());
        dsp.debugger().add_breakpoint(0x0002);

        dsp.run();
        dsp.wait();
        assert_eq!(dsp.with_core(|core| core.pc()), 2);
        assert_eq!(dsp.with_core(|core| core.regs.acc40[0].get()), 2);

        // resuming at the breakpoint does not hit it again
        dsp.run();
        dsp.wait();
        assert!(dsp.with_core(|core| core.is_halted()));
        assert_eq!(dsp.with_core(|core| core.regs.acc40[0].get()), 3);
    }

    #[test]
    fn fault_stops_thread() {
        // lr $ac0.m, @0x2000
        let (dsp, _) = dsp(&[0x00DE, 0x2000], free_running());

        dsp.run();
        dsp.wait();
        assert_eq!(dsp.take_fault(), Some(Fault::UnmappedRead { addr: 0x2000 }));
        assert!(!dsp.is_running());
    }

    #[test]
    fn host_cannot_write_dsp_mailbox() {
        let (dsp, _) = dsp(&[HALT], Config::default());
        assert!(dsp.host_write(crate::ifx::DMBH, 0x8000).is_err());
        assert!(dsp.host_write(crate::ifx::CMBH, 0x8000).is_ok());
        assert!(dsp.host_read(crate::ifx::CMBH).is_ok());
        assert!(dsp.host_read(crate::ifx::DIRQ).is_err());
    }
}
