//! Block transfers between main memory and DSP memory.

use crate::{
    core::Core,
    error::Fault,
    mem::{DRAM_LEN, DROM_LEN, DataTarget, IRAM_LEN, IROM_LEN, Memory, Region},
};
use bitos::{BitUtils, bitos};
use tracing::{debug, info, warn};

#[bitos(16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DmaControl {
    /// 0: main memory to DSP, 1: DSP to main memory.
    #[bits(0)]
    pub to_main: bool,
    /// 0: DMEM, 1: IMEM.
    #[bits(1)]
    pub imem: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DmaRegs {
    pub main_addr: u32,
    pub dsp_addr: u16,
    /// Length in bytes.
    pub block_size: u16,
    pub control: DmaControl,
}

impl DmaRegs {
    pub fn main_addr_hi(&self) -> u16 {
        self.main_addr.bits(16, 32) as u16
    }

    pub fn main_addr_lo(&self) -> u16 {
        self.main_addr.bits(0, 16) as u16
    }

    pub fn set_main_addr_hi(&mut self, value: u16) {
        self.main_addr = self.main_addr.with_bits(16, 32, (value & 0x03FF) as u32);
    }

    pub fn set_main_addr_lo(&mut self, value: u16) {
        self.main_addr = self.main_addr.with_bits(0, 16, (value & !3) as u32);
    }
}

/// Resolves a whole DMA block to a memory region and its start index. ROM is only valid as
/// the source of a transfer to main memory.
fn resolve(dsp_addr: u16, words: usize, imem: bool, to_main: bool) -> Option<(Region, usize)> {
    let (region, index) = if imem {
        Memory::translate_imem(dsp_addr)?
    } else {
        match Memory::translate_dmem(dsp_addr) {
            DataTarget::Memory(region, index) => (region, index),
            _ => return None,
        }
    };

    if !to_main && !region.writable() {
        return None;
    }

    let len = match region {
        Region::Iram => IRAM_LEN,
        Region::Irom => IROM_LEN,
        Region::Dram => DRAM_LEN,
        Region::Drom => DROM_LEN,
    };

    (index + words <= len).then_some((region, index))
}

impl Core {
    /// Performs the DMA described by the DMA registers. Transfers complete immediately.
    pub(crate) fn do_dma(&mut self) {
        let regs = *self.ifx.dma.lock().unwrap();
        let words = regs.block_size as usize / 2;
        let imem = regs.control.imem();
        let to_main = regs.control.to_main();

        let Some((region, index)) = resolve(regs.dsp_addr, words, imem, to_main) else {
            self.fault(Fault::InvalidDmaAddress {
                addr: regs.dsp_addr,
                len: regs.block_size,
                imem,
            });
            return;
        };

        let space = if imem { "IMEM" } else { "DMEM" };
        let mut bytes = vec![0; words * 2];

        if to_main {
            debug!(
                "DMA 0x{:04X} bytes from {space} 0x{:04X} ({}) to RAM 0x{:08X}",
                regs.block_size,
                regs.dsp_addr,
                region.name(),
                regs.main_addr
            );

            let source = &self.mem.region(region)[index..][..words];
            for (chunk, word) in bytes.chunks_exact_mut(2).zip(source) {
                chunk.copy_from_slice(&word.to_be_bytes());
            }

            self.ram.write(regs.main_addr, &bytes);
        } else {
            debug!(
                "DMA 0x{:04X} bytes from RAM 0x{:08X} to {space} 0x{:04X}",
                regs.block_size, regs.main_addr, regs.dsp_addr
            );

            self.ram.read(regs.main_addr, &mut bytes);
            let target = &mut self.mem.region_mut(region)[index..][..words];
            for (word, chunk) in target.iter_mut().zip(bytes.chunks_exact(2)) {
                *word = u16::from_be_bytes([chunk[0], chunk[1]]);
            }

            if imem {
                info!("ucode upload of 0x{:04X} bytes", regs.block_size);
                self.dump_ucode(&bytes);
            }
        }
    }

    fn dump_ucode(&self, bytes: &[u8]) {
        let Some(dir) = &self.config.ucode_dump_dir else {
            return;
        };

        let path = dir.join(format!("DspUcode_{:04X}.bin", bytes.len()));
        match std::fs::write(&path, bytes) {
            Ok(()) => info!("ucode saved to {}", path.display()),
            Err(e) => warn!("failed to save ucode to {}: {e}", path.display()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn resolve_blocks() {
        assert_eq!(resolve(0x0000, 0x1000, true, false), Some((Region::Iram, 0)));
        assert_eq!(resolve(0x0FFF, 2, true, false), None);
        assert_eq!(resolve(0x8000, 1, true, false), None);
        assert_eq!(resolve(0x0100, 0x10, false, false), Some((Region::Dram, 0x100)));
        assert_eq!(resolve(0x1000, 0x10, false, false), None);
        assert_eq!(resolve(0xFF00, 1, false, false), None);
        assert_eq!(resolve(0xFF00, 1, false, true), None);
    }

    #[test]
    fn rom_is_a_valid_source() {
        assert_eq!(resolve(0x1000, 0x10, false, true), Some((Region::Drom, 0)));
        assert_eq!(resolve(0x17F0, 0x10, false, true), Some((Region::Drom, 0x7F0)));
        assert_eq!(resolve(0x17F0, 0x11, false, true), None);
        assert_eq!(resolve(0x8000, 0x1000, true, true), Some((Region::Irom, 0)));
    }

    #[test]
    fn address_masks() {
        let mut regs = DmaRegs::default();
        regs.set_main_addr_hi(0xFFFF);
        regs.set_main_addr_lo(0xFFFF);
        assert_eq!(regs.main_addr, 0x03FF_FFFC);
        assert_eq!(regs.main_addr_hi(), 0x03FF);
        assert_eq!(regs.main_addr_lo(), 0xFFFC);
    }
}
