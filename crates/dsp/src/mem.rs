//! DSP memories and address translation.
//!
//! Both address spaces are word addressed: every address refers to a 16-bit slot.

use crate::error::LoadError;
use util::boxed_array;
use zerocopy::{FromBytes, big_endian::U16};

pub const IRAM_LEN: usize = 0x1000;
pub const IROM_LEN: usize = 0x1000;
pub const DRAM_LEN: usize = 0x1000;
pub const DROM_LEN: usize = 0x0800;

pub const IROM_BASE: u16 = 0x8000;
pub const DROM_BASE: u16 = 0x1000;
pub const IFX_BASE: u16 = 0xFF00;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Region {
    Iram,
    Irom,
    Dram,
    Drom,
}

impl Region {
    pub fn name(self) -> &'static str {
        match self {
            Region::Iram => "IRAM",
            Region::Irom => "IROM",
            Region::Dram => "DRAM",
            Region::Drom => "DROM",
        }
    }

    pub fn writable(self) -> bool {
        matches!(self, Region::Iram | Region::Dram)
    }
}

/// Where a data address lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataTarget {
    Memory(Region, usize),
    /// A hardware register, with the low byte of its address.
    Hardware(u8),
    Unmapped,
}

pub struct Memory {
    pub iram: Box<[u16; IRAM_LEN]>,
    pub irom: Box<[u16; IROM_LEN]>,
    pub dram: Box<[u16; DRAM_LEN]>,
    pub drom: Box<[u16; DROM_LEN]>,
}

impl Default for Memory {
    fn default() -> Self {
        Self {
            iram: boxed_array(0),
            irom: boxed_array(0),
            dram: boxed_array(0),
            drom: boxed_array(0),
        }
    }
}

fn load_words(region: Region, dst: &mut [u16], bytes: &[u8]) -> Result<(), LoadError> {
    let expected = dst.len() * 2;
    let words = <[U16]>::ref_from_bytes(bytes)
        .ok()
        .filter(|_| bytes.len() == expected)
        .ok_or(LoadError::SizeMismatch {
            region: region.name(),
            expected,
            actual: bytes.len(),
        })?;

    for (slot, word) in dst.iter_mut().zip(words) {
        *slot = word.get();
    }

    Ok(())
}

impl Memory {
    /// Loads the instruction ROM from a big endian image. On failure, the ROM is left zeroed.
    pub fn load_irom(&mut self, bytes: &[u8]) -> Result<(), LoadError> {
        self.irom.fill(0);
        load_words(Region::Irom, &mut self.irom[..], bytes)
    }

    /// Loads the data ROM from a big endian image. On failure, the ROM is left zeroed.
    pub fn load_drom(&mut self, bytes: &[u8]) -> Result<(), LoadError> {
        self.drom.fill(0);
        load_words(Region::Drom, &mut self.drom[..], bytes)
    }

    #[inline(always)]
    pub fn translate_imem(addr: u16) -> Option<(Region, usize)> {
        match addr {
            0x0000..0x1000 => Some((Region::Iram, addr as usize)),
            0x8000..0x9000 => Some((Region::Irom, (addr - IROM_BASE) as usize)),
            _ => None,
        }
    }

    #[inline(always)]
    pub fn translate_dmem(addr: u16) -> DataTarget {
        match addr {
            0x0000..0x1000 => DataTarget::Memory(Region::Dram, addr as usize),
            0x1000..0x1800 => DataTarget::Memory(Region::Drom, (addr - DROM_BASE) as usize),
            // IROM is visible in data space as well
            0x8000..0x9000 => DataTarget::Memory(Region::Irom, (addr - IROM_BASE) as usize),
            IFX_BASE.. => DataTarget::Hardware(addr as u8),
            _ => DataTarget::Unmapped,
        }
    }

    pub fn region(&self, region: Region) -> &[u16] {
        match region {
            Region::Iram => &self.iram[..],
            Region::Irom => &self.irom[..],
            Region::Dram => &self.dram[..],
            Region::Drom => &self.drom[..],
        }
    }

    pub fn region_mut(&mut self, region: Region) -> &mut [u16] {
        match region {
            Region::Iram => &mut self.iram[..],
            Region::Irom => &mut self.irom[..],
            Region::Dram => &mut self.dram[..],
            Region::Drom => &mut self.drom[..],
        }
    }

    #[inline(always)]
    pub fn read(&self, region: Region, index: usize) -> u16 {
        self.region(region)[index]
    }

    #[inline(always)]
    pub fn write(&mut self, region: Region, index: usize, value: u16) {
        self.region_mut(region)[index] = value;
    }

    /// Reads IMEM without side effects. Unmapped addresses read as zero.
    pub fn peek_imem(&self, addr: u16) -> u16 {
        Self::translate_imem(addr)
            .map(|(region, index)| self.read(region, index))
            .unwrap_or_default()
    }

    /// Reads DMEM memory without side effects. Hardware registers and unmapped addresses read
    /// as zero.
    pub fn peek_dmem(&self, addr: u16) -> u16 {
        match Self::translate_dmem(addr) {
            DataTarget::Memory(region, index) => self.read(region, index),
            _ => 0,
        }
    }

    /// Clears the RAMs.
    pub fn clear_ram(&mut self) {
        self.iram.fill(0);
        self.dram.fill(0);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn imem_translation() {
        assert_eq!(Memory::translate_imem(0x0FFF), Some((Region::Iram, 0x0FFF)));
        assert_eq!(Memory::translate_imem(0x1000), None);
        assert_eq!(Memory::translate_imem(0x8000), Some((Region::Irom, 0)));
        assert_eq!(Memory::translate_imem(0x8FFF), Some((Region::Irom, 0xFFF)));
        assert_eq!(Memory::translate_imem(0x9000), None);
    }

    #[test]
    fn dmem_translation() {
        assert_eq!(
            Memory::translate_dmem(0x0123),
            DataTarget::Memory(Region::Dram, 0x123)
        );
        assert_eq!(
            Memory::translate_dmem(0x17FF),
            DataTarget::Memory(Region::Drom, 0x7FF)
        );
        assert_eq!(Memory::translate_dmem(0x1800), DataTarget::Unmapped);
        assert_eq!(
            Memory::translate_dmem(0x8010),
            DataTarget::Memory(Region::Irom, 0x10)
        );
        assert_eq!(Memory::translate_dmem(0xFEFF), DataTarget::Unmapped);
        assert_eq!(Memory::translate_dmem(0xFFFE), DataTarget::Hardware(0xFE));
    }

    #[test]
    fn rom_images_are_big_endian() {
        let mut mem = Memory::default();
        let mut image = vec![0u8; DROM_LEN * 2];
        image[0] = 0x12;
        image[1] = 0x34;

        mem.load_drom(&image).unwrap();
        assert_eq!(mem.peek_dmem(0x1000), 0x1234);
    }

    #[test]
    fn rom_size_mismatch() {
        let mut mem = Memory::default();
        mem.irom[0] = 0xFFFF;

        let err = mem.load_irom(&[0u8; 16]).unwrap_err();
        assert_eq!(
            err,
            LoadError::SizeMismatch {
                region: "IROM",
                expected: IROM_LEN * 2,
                actual: 16,
            }
        );
        assert_eq!(mem.irom[0], 0);
    }
}
