//! The hardware register block shared by the host CPU and the DSP.
//!
//! The [`Ifx`] object holds all state the host side touches: the two mailboxes, the DMA
//! registers and the request lines. Accelerator state is only ever touched by the DSP and is
//! owned by the core.

mod accel;
mod dma;
mod mailbox;

pub use accel::{AccelFormat, Accelerator};
pub use dma::{DmaControl, DmaRegs};
pub use mailbox::{Mailbox, READY};

use crate::{core::Core, error::Fault};
use std::sync::{
    Mutex,
    atomic::{AtomicBool, AtomicU16, Ordering},
};
use tracing::{debug, info, trace, warn};

pub const DSCR: u16 = 0xFFC9;
pub const DSBL: u16 = 0xFFCB;
pub const DSPA: u16 = 0xFFCD;
pub const DSMAH: u16 = 0xFFCE;
pub const DSMAL: u16 = 0xFFCF;

pub const ACFMT: u16 = 0xFFD1;
pub const ACDAT2: u16 = 0xFFD3;
pub const ACSAH: u16 = 0xFFD4;
pub const ACSAL: u16 = 0xFFD5;
pub const ACEAH: u16 = 0xFFD6;
pub const ACEAL: u16 = 0xFFD7;
pub const ACCAH: u16 = 0xFFD8;
pub const ACCAL: u16 = 0xFFD9;
pub const ACPDS: u16 = 0xFFDA;
pub const ACYN1: u16 = 0xFFDB;
pub const ACYN2: u16 = 0xFFDC;
pub const ACDAT: u16 = 0xFFDD;
pub const ACGAN: u16 = 0xFFDE;
pub const ADPCM_COEFS: u16 = 0xFFA0;

pub const AMDM: u16 = 0xFFEF;
pub const DIRQ: u16 = 0xFFFB;
pub const DMBH: u16 = 0xFFFC;
pub const DMBL: u16 = 0xFFFD;
pub const CMBH: u16 = 0xFFFE;
pub const CMBL: u16 = 0xFFFF;

/// Registers which exist but whose purpose is unknown. Accesses are accepted and logged.
const KNOWN_UNKNOWNS: [u16; 2] = [0xFFB0, 0xFFB1];

/// Main memory as seen by the DSP through DMA and the accelerator. Addresses are in bytes.
pub trait MainMemory: Send + Sync {
    fn len(&self) -> usize;
    fn read(&self, addr: u32, buf: &mut [u8]);
    fn write(&self, addr: u32, data: &[u8]);

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read_u8(&self, addr: u32) -> u8 {
        let mut buf = [0];
        self.read(addr, &mut buf);
        buf[0]
    }

    fn read_u16(&self, addr: u32) -> u16 {
        let mut buf = [0; 2];
        self.read(addr, &mut buf);
        u16::from_be_bytes(buf)
    }

    fn write_u16(&self, addr: u32, value: u16) {
        self.write(addr, &value.to_be_bytes());
    }
}

/// A plain byte array main memory. Out of range accesses are clamped: reads past the end
/// return zeros and writes past the end are dropped.
#[derive(Debug, Default)]
pub struct Ram {
    bytes: Mutex<Vec<u8>>,
}

impl Ram {
    pub fn new(len: usize) -> Self {
        Self::from_bytes(vec![0; len])
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Mutex::new(bytes),
        }
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.bytes.lock().unwrap().clone()
    }
}

impl MainMemory for Ram {
    fn len(&self) -> usize {
        self.bytes.lock().unwrap().len()
    }

    fn read(&self, addr: u32, buf: &mut [u8]) {
        let bytes = self.bytes.lock().unwrap();
        let start = (addr as usize).min(bytes.len());
        let end = start.saturating_add(buf.len()).min(bytes.len());
        let count = end - start;

        buf[..count].copy_from_slice(&bytes[start..end]);
        buf[count..].fill(0);

        if count < buf.len() {
            warn!(
                "main memory read of 0x{:X} bytes at 0x{addr:08X} is out of range",
                buf.len()
            );
        }
    }

    fn write(&self, addr: u32, data: &[u8]) {
        let mut bytes = self.bytes.lock().unwrap();
        let start = (addr as usize).min(bytes.len());
        let end = start.saturating_add(data.len()).min(bytes.len());
        let count = end - start;

        bytes[start..end].copy_from_slice(&data[..count]);

        if count < data.len() {
            warn!(
                "main memory write of 0x{:X} bytes at 0x{addr:08X} is out of range",
                data.len()
            );
        }
    }
}

/// State shared between the host and the DSP.
#[derive(Debug)]
pub struct Ifx {
    pub cpu_to_dsp: Mailbox,
    pub dsp_to_cpu: Mailbox,
    pub dma: Mutex<DmaRegs>,
    amdm: AtomicU16,
    /// The DSP to host interrupt line.
    cpu_interrupt: AtomicBool,
    interrupt_request: AtomicBool,
    soft_reset_request: AtomicBool,
}

impl Default for Ifx {
    fn default() -> Self {
        Self::new()
    }
}

impl Ifx {
    pub fn new() -> Self {
        Self {
            cpu_to_dsp: Mailbox::new("CPU->DSP"),
            dsp_to_cpu: Mailbox::new("DSP->CPU"),
            dma: Mutex::new(DmaRegs::default()),
            amdm: AtomicU16::new(0),
            cpu_interrupt: AtomicBool::new(false),
            interrupt_request: AtomicBool::new(false),
            soft_reset_request: AtomicBool::new(false),
        }
    }

    /// Writes a mailbox register from the host side. Only the CPU to DSP mailbox is writable.
    pub fn host_write(&self, addr: u16, value: u16) -> Result<(), Fault> {
        match addr {
            CMBH => self.cpu_to_dsp.write_hi(value),
            CMBL => self.cpu_to_dsp.write_lo(value),
            DMBH | DMBL => return Err(Fault::MailboxDirection { addr, value }),
            _ => return Err(Fault::UnknownHwWrite { addr, value }),
        }

        Ok(())
    }

    /// Reads a mailbox register from the host side. Reading DMBL consumes the DSP message.
    pub fn host_read(&self, addr: u16) -> Result<u16, Fault> {
        Ok(match addr {
            CMBH => self.cpu_to_dsp.read_hi(),
            CMBL => self.cpu_to_dsp.read_lo(false),
            DMBH => self.dsp_to_cpu.read_hi(),
            DMBL => self.dsp_to_cpu.read_lo(true),
            _ => return Err(Fault::UnknownHwRead { addr }),
        })
    }

    /// Whether the DSP is asserting its interrupt line towards the host.
    pub fn cpu_interrupt(&self) -> bool {
        self.cpu_interrupt.load(Ordering::Acquire)
    }

    /// Acknowledges the DSP interrupt, returning whether it was asserted.
    pub fn take_cpu_interrupt(&self) -> bool {
        self.cpu_interrupt.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn request_interrupt(&self) {
        self.interrupt_request.store(true, Ordering::Release);
    }

    pub(crate) fn take_interrupt_request(&self) -> bool {
        self.interrupt_request.swap(false, Ordering::AcqRel)
    }

    pub(crate) fn request_soft_reset(&self) {
        self.soft_reset_request.store(true, Ordering::Release);
    }

    pub(crate) fn take_soft_reset_request(&self) -> bool {
        self.soft_reset_request.swap(false, Ordering::AcqRel)
    }

    /// Clears mailboxes, DMA registers and every request line.
    pub fn reset(&self) {
        self.cpu_to_dsp.clear();
        self.dsp_to_cpu.clear();
        *self.dma.lock().unwrap() = DmaRegs::default();
        self.amdm.store(0, Ordering::Relaxed);
        self.cpu_interrupt.store(false, Ordering::Release);
        self.interrupt_request.store(false, Ordering::Release);
        self.soft_reset_request.store(false, Ordering::Release);
    }
}

impl std::fmt::Display for Ifx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let dma = *self.dma.lock().unwrap();
        writeln!(f, "CPU->DSP mailbox: 0x{:08X}", self.cpu_to_dsp.peek())?;
        writeln!(f, "DSP->CPU mailbox: 0x{:08X}", self.dsp_to_cpu.peek())?;
        writeln!(f, "DSP->CPU interrupt: {}", self.cpu_interrupt())?;
        writeln!(
            f,
            "DMA: main 0x{:08X} dsp 0x{:04X} len 0x{:04X} to_main {} imem {}",
            dma.main_addr,
            dma.dsp_addr,
            dma.block_size,
            dma.control.to_main(),
            dma.control.imem()
        )?;
        write!(f, "AMDM: 0x{:04X}", self.amdm.load(Ordering::Relaxed))
    }
}

impl Core {
    /// Reads a hardware register from the DSP side.
    pub(crate) fn read_hw(&mut self, addr: u16) -> u16 {
        let value = match addr {
            DSCR => self.ifx.dma.lock().unwrap().control.to_bits(),
            DSBL => self.ifx.dma.lock().unwrap().block_size,
            DSPA => self.ifx.dma.lock().unwrap().dsp_addr,
            DSMAH => self.ifx.dma.lock().unwrap().main_addr_hi(),
            DSMAL => self.ifx.dma.lock().unwrap().main_addr_lo(),

            ACFMT => self.accel.format,
            ACDAT2 => self.accel.read_raw(&*self.aram),
            ACSAH => (self.accel.start >> 16) as u16,
            ACSAL => self.accel.start as u16,
            ACEAH => (self.accel.end >> 16) as u16,
            ACEAL => self.accel.end as u16,
            ACCAH => (self.accel.current >> 16) as u16,
            ACCAL => self.accel.current as u16,
            ACPDS => self.accel.pred_scale,
            ACYN1 => self.accel.yn1,
            ACYN2 => self.accel.yn2,
            ACDAT => self.accel.read_sample(&*self.aram),
            ACGAN => self.accel.gain,
            0xFFA0..=0xFFAF => self.accel.coefs[(addr - ADPCM_COEFS) as usize],

            AMDM => self.ifx.amdm.load(Ordering::Relaxed),
            DIRQ => 0,
            DMBH => self.ifx.dsp_to_cpu.read_hi(),
            DMBL => self.ifx.dsp_to_cpu.read_lo(false),
            CMBH => self.ifx.cpu_to_dsp.read_hi(),
            CMBL => self.ifx.cpu_to_dsp.read_lo(true),

            _ if KNOWN_UNKNOWNS.contains(&addr) => {
                debug!("read from unknown register 0x{addr:04X}");
                0
            }
            _ => {
                self.fault(Fault::UnknownHwRead { addr });
                0
            }
        };

        trace!("hardware read 0x{addr:04X} = 0x{value:04X}");
        value
    }

    /// Writes a hardware register from the DSP side.
    pub(crate) fn write_hw(&mut self, addr: u16, value: u16) {
        trace!("hardware write 0x{addr:04X} = 0x{value:04X}");

        match addr {
            DSCR => {
                self.ifx.dma.lock().unwrap().control = DmaControl::from_bits(value & 3);
            }
            DSBL => {
                self.ifx.dma.lock().unwrap().block_size = value & !3;
                self.do_dma();
            }
            DSPA => self.ifx.dma.lock().unwrap().dsp_addr = value & !1,
            DSMAH => self.ifx.dma.lock().unwrap().set_main_addr_hi(value),
            DSMAL => self.ifx.dma.lock().unwrap().set_main_addr_lo(value),

            ACFMT => self.accel.format = value,
            ACDAT2 => self.accel.write_raw(&*self.aram, value),
            ACSAH => self.accel.set_start_hi(value),
            ACSAL => self.accel.set_start_lo(value),
            ACEAH => self.accel.set_end_hi(value),
            ACEAL => self.accel.set_end_lo(value),
            ACCAH => self.accel.set_current_hi(value),
            ACCAL => self.accel.set_current_lo(value),
            ACPDS => self.accel.pred_scale = value,
            ACYN1 => self.accel.yn1 = value,
            ACYN2 => self.accel.yn2 = value,
            ACDAT => warn!("write of 0x{value:04X} to read only register ACDAT ignored"),
            ACGAN => self.accel.gain = value,
            0xFFA0..=0xFFAF => self.accel.coefs[(addr - ADPCM_COEFS) as usize] = value,

            AMDM => self.ifx.amdm.store(value, Ordering::Relaxed),
            DIRQ => {
                if value & 1 != 0 {
                    info!("DSP interrupt asserted towards the CPU");
                    self.ifx.cpu_interrupt.store(true, Ordering::Release);
                }
            }
            DMBH => self.ifx.dsp_to_cpu.write_hi(value),
            DMBL => self.ifx.dsp_to_cpu.write_lo(value),
            CMBH | CMBL => self.fault(Fault::MailboxDirection { addr, value }),

            _ if KNOWN_UNKNOWNS.contains(&addr) => {
                debug!("write of 0x{value:04X} to unknown register 0x{addr:04X}");
            }
            _ => self.fault(Fault::UnknownHwWrite { addr, value }),
        }
    }
}
