//! Instruction analysis, for the interpreter and for static disassembly.

use crate::{
    error::DecodeError,
    ins::{COND, CondCode, ExtensionOpcode, FLOW, Field, Ins, LOGIC, MADD, Opcode},
    regs::Reg,
};
use bitos::BitUtils;
use std::fmt::{Display, Write};
use tinyvec::ArrayVec;

/// An immediate operand, carrying its width and signedness.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Immediate {
    Byte(u8),
    SignedByte(i8),
    Short(u16),
    SignedShort(i16),
    Address(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Operand {
    Reg(Reg),
    /// A whole 40-bit accumulator.
    Acc(u8),
    /// A whole 32-bit accumulator.
    AccX(u8),
    #[default]
    Prod,
    /// Memory addressed by an address register.
    Indirect(u8),
    Imm(Immediate),
}

impl Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operand::Reg(reg) => write!(f, "${reg}"),
            Operand::Acc(i) => write!(f, "$ac{i}"),
            Operand::AccX(i) => write!(f, "$ax{i}"),
            Operand::Prod => write!(f, "$prod"),
            Operand::Indirect(i) => write!(f, "@$ar{i}"),
            Operand::Imm(Immediate::Byte(x)) => write!(f, "#0x{x:02X}"),
            Operand::Imm(Immediate::SignedByte(x)) => write!(f, "#{x}"),
            Operand::Imm(Immediate::Short(x)) => write!(f, "#0x{x:04X}"),
            Operand::Imm(Immediate::SignedShort(x)) => write!(f, "#{x}"),
            Operand::Imm(Immediate::Address(x)) => write!(f, "0x{x:04X}"),
        }
    }
}

impl Field {
    fn operand(self, ins: Ins) -> Operand {
        let word = ins.base;
        match self {
            Field::Reg {
                at,
                len,
                base,
                stride,
            } => Operand::Reg(Reg::new(base + stride * word.bits(at, at + len) as u8)),
            Field::OtherMid { at } => Operand::Reg(Reg::new(0x1E + !word.bit(at) as u8)),
            Field::Acc { at } => Operand::Acc(word.bit(at) as u8),
            Field::OtherAcc { at } => Operand::Acc(!word.bit(at) as u8),
            Field::AccX { at } => Operand::AccX(word.bit(at) as u8),
            Field::Prod => Operand::Prod,
            Field::Indirect { at, len } => Operand::Indirect(word.bits(at, at + len) as u8),
            Field::Byte => Operand::Imm(Immediate::Byte(word as u8)),
            Field::SignedByte => Operand::Imm(Immediate::SignedByte(word as u8 as i8)),
            Field::Shift => {
                let shift = ((word.bits(0, 6) as i8) << 2) >> 2;
                Operand::Imm(Immediate::SignedByte(shift))
            }
            Field::StatusBit => Operand::Imm(Immediate::Byte(6 + word.bits(0, 3) as u8)),
            Field::IoAddress => Operand::Imm(Immediate::Address(0xFF00 | (word & 0xFF))),
            Field::Short => Operand::Imm(Immediate::Short(ins.extra)),
            Field::SignedShort => Operand::Imm(Immediate::SignedShort(ins.extra as i16)),
            Field::Address => Operand::Imm(Immediate::Address(ins.extra)),
        }
    }
}

/// `ldax` is the `ld` family with `$ar3` selected: it loads a whole `$axN` through `$ar0` or
/// `$ar1`.
const LDAX: [Field; 2] = [Field::AccX { at: 4 }, Field::Indirect { at: 5, len: 1 }];

fn extension_fields(extension: ExtensionOpcode, word: u16) -> &'static [Field] {
    use ExtensionOpcode::*;

    match extension {
        Ld | Ldn | Ldm | Ldnm if word.bits(0, 2) == 3 => &LDAX,
        _ => extension.def().fields,
    }
}

fn operands(fields: &[Field], ins: Ins) -> ArrayVec<[Operand; 4]> {
    fields.iter().map(|field| field.operand(ins)).collect()
}

/// A fully analyzed instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedInstruction {
    pub ins: Ins,
    pub opcode: Opcode,
    pub operands: ArrayVec<[Operand; 4]>,
    /// The packed extension opcode, if this instruction has one.
    pub extension: Option<ExtensionOpcode>,
    pub extension_operands: ArrayVec<[Operand; 4]>,
    pub condition: Option<CondCode>,
    /// Length in bytes: 2 or 4.
    pub len: usize,
    pub is_control_flow: bool,
    pub is_logic_op: bool,
    pub has_multiply_add: bool,
}

impl DecodedInstruction {
    /// Analyzes an already fetched instruction.
    pub fn new(ins: Ins) -> Self {
        let decoded = ins.decoded();
        let def = decoded.opcode.def();

        Self {
            ins,
            opcode: decoded.opcode,
            operands: operands(def.fields, ins),
            extension: decoded.extension,
            extension_operands: decoded
                .extension
                .map(|ext| operands(extension_fields(ext, ins.base), ins))
                .unwrap_or_default(),
            condition: def
                .has(COND)
                .then(|| CondCode::new(ins.base.bits(0, 4) as u8)),
            len: decoded.len() as usize * 2,
            is_control_flow: def.has(FLOW),
            is_logic_op: def.has(LOGIC),
            has_multiply_add: def.has(MADD),
        }
    }

    pub fn mnemonic(&self) -> String {
        let cc = self.condition.map_or("", CondCode::suffix);
        match self.opcode {
            Opcode::Jmp if cc.is_empty() => "jmp".to_owned(),
            opcode => format!("{}{cc}", opcode.mnemonic()),
        }
    }
}

fn write_operands(out: &mut String, operands: &[Operand]) -> std::fmt::Result {
    for (i, operand) in operands.iter().enumerate() {
        if i == 0 {
            write!(out, " {operand}")?;
        } else {
            write!(out, ", {operand}")?;
        }
    }

    Ok(())
}

impl Display for DecodedInstruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut out = self.mnemonic();
        write_operands(&mut out, &self.operands)?;

        match self.extension {
            None | Some(ExtensionOpcode::Nop) => (),
            Some(ext) => {
                write!(out, " : {}", ext.mnemonic())?;
                write_operands(&mut out, &self.extension_operands)?;
            }
        }

        f.pad(&out)
    }
}

/// Decodes the instruction at the start of `bytes`, a stream of big endian words. Returns the
/// instruction and how many bytes it spans.
pub fn decode(bytes: &[u8]) -> Result<(DecodedInstruction, usize), DecodeError> {
    let word = |i: usize| u16::from_be_bytes([bytes[i], bytes[i + 1]]);

    if bytes.len() < 2 {
        return Err(DecodeError::Truncated {
            needed: 2,
            available: bytes.len(),
        });
    }

    let base = word(0);
    let decoded = Ins::new(base).decoded();
    if decoded.opcode == Opcode::Illegal {
        return Err(DecodeError::Illegal { word: base });
    }

    let len = decoded.len() as usize * 2;
    if bytes.len() < len {
        return Err(DecodeError::Truncated {
            needed: len,
            available: bytes.len(),
        });
    }

    let ins = if decoded.needs_extra {
        Ins::with_extra(base, word(2))
    } else {
        Ins::new(base)
    };

    Ok((DecodedInstruction::new(ins), len))
}

/// Iterator over the instructions of a ucode image.
pub struct Disassembly<'a> {
    bytes: &'a [u8],
    offset: usize,
    base: u16,
    done: bool,
}

impl Iterator for Disassembly<'_> {
    type Item = (u16, Result<DecodedInstruction, DecodeError>);

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.offset >= self.bytes.len() {
            return None;
        }

        let addr = self.base.wrapping_add((self.offset / 2) as u16);
        let result = decode(&self.bytes[self.offset..]);
        match &result {
            Ok((_, len)) => self.offset += len,
            Err(DecodeError::Illegal { .. }) => self.offset += 2,
            Err(DecodeError::Truncated { .. }) => self.done = true,
        }

        Some((addr, result.map(|(decoded, _)| decoded)))
    }
}

/// Disassembles a whole ucode image loaded at slot address `base`.
pub fn disassemble(bytes: &[u8], base: u16) -> Disassembly<'_> {
    Disassembly {
        bytes,
        offset: 0,
        base,
        done: false,
    }
}
