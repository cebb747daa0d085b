//! Register test vector files: a little endian code length in bytes, followed by cases until
//! the end of the file.

use binrw::{BinRead, binread, helpers::until_eof, io::BufReader};
use dsp::{Reg, Registers};
use std::{fs::File, path::Path};
use strum::VariantArray;

/// Registers the vectors don't check. Stack registers can't be loaded with a plain move and
/// the bank register is not part of the images.
pub const SKIPPED: [Reg; 2] = [Reg::LoopStack, Reg::Bank];

/// A register file image: every register id except the bank register, in id order.
#[derive(BinRead)]
#[br(little)]
pub struct RegisterImage([u16; 31]);

impl RegisterImage {
    pub fn entries(&self) -> impl Iterator<Item = (Reg, u16)> + '_ {
        Reg::VARIANTS
            .iter()
            .copied()
            .filter(|reg| *reg != Reg::Bank)
            .zip(self.0)
            .filter(|(reg, _)| !SKIPPED.contains(reg))
    }

    pub fn registers(&self) -> Registers {
        let mut regs = Registers::default();
        for (reg, value) in self.entries() {
            regs.set(reg, value);
        }

        regs
    }
}

/// A code snippet with the register file before and after running it.
#[derive(BinRead)]
#[br(little, import(words: u16))]
pub struct TestCase {
    #[br(count = words)]
    pub instructions: Vec<u16>,
    pub expected: RegisterImage,
    pub initial: RegisterImage,
}

#[binread]
#[br(little)]
pub struct TestFile {
    #[br(temp, assert(code_bytes % 2 == 0, "code length {} is not whole words", code_bytes))]
    code_bytes: u16,
    #[br(parse_with = until_eof, args(code_bytes / 2))]
    pub cases: Vec<TestCase>,
}

impl TestFile {
    pub fn open(path: &Path) -> Result<Self, String> {
        let describe = |e: &dyn std::fmt::Display| format!("{}: {e}", path.display());

        let file = File::open(path).map_err(|e| describe(&e))?;
        Self::read(&mut BufReader::new(file)).map_err(|e| describe(&e))
    }
}
