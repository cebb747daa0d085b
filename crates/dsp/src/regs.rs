//! The DSP register file.

use bitos::{BitUtils, bitos};
use strum::{Display, EnumString, VariantArray};
use tinyvec::TinyVec;

/// A hardware stack. Stacks have no fixed bound, but ucode rarely goes deeper than a handful
/// of entries, so those are kept inline.
pub type Stack = TinyVec<[u16; 8]>;

/// A 40-bit accumulator, stored as its three architectural slices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Acc40 {
    pub low: u16,
    pub mid: u16,
    pub high: u8,
}

impl Acc40 {
    pub const MIN: i64 = -(1 << 39);
    pub const MAX: i64 = (1 << 39) - 1;

    /// Truncates `value` to 40 bits and sign extends it back.
    #[inline(always)]
    pub fn wrap(value: i64) -> i64 {
        (value << 24) >> 24
    }

    /// The sign extended 40-bit value.
    pub fn get(&self) -> i64 {
        ((self.high as i8 as i64) << 32) | ((self.mid as i64) << 16) | self.low as i64
    }

    /// Stores the low 40 bits of `value` and returns the resulting (sign extended) value.
    pub fn set(&mut self, value: i64) -> i64 {
        self.low = value as u16;
        self.mid = (value >> 16) as u16;
        self.high = (value >> 32) as u8;

        Self::wrap(value)
    }

    /// The high slice as seen through the register file, sign extended to 16 bits.
    pub fn high_extended(&self) -> u16 {
        self.high as i8 as u16
    }

    /// The mid slice as read by moves: in sign extension mode, a value which does not fit in
    /// 32 bits reads as the saturated 16-bit bound.
    fn mid_saturated(&self, saturate: bool) -> u16 {
        let value = self.get();
        if saturate && value != value as i32 as i64 {
            if value < 0 { 0x8000 } else { 0x7FFF }
        } else {
            self.mid
        }
    }
}

/// A resolved product.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    pub value: i64,
    pub carry: bool,
    pub overflow: bool,
}

/// The product register. Multiplications leave it in a partial sum form split across the two
/// mid slices; the value is only resolved when read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Product {
    pub low: u16,
    pub mid1: u16,
    pub mid2: u16,
    pub high: u8,
}

impl Product {
    /// Adds the two mid slices, carrying into the high slice.
    pub fn resolve(&self) -> Resolved {
        let (mid, carry) = self.mid1.overflowing_add(self.mid2);
        let (high, carry) = self.high.overflowing_add(carry as u8);

        Resolved {
            value: ((high as i8 as i64) << 32) | ((mid as i64) << 16) | self.low as i64,
            carry,
            overflow: (self.high as i8) >= 0 && (high as i8) < 0,
        }
    }

    pub fn value(&self) -> i64 {
        self.resolve().value
    }

    pub fn set(&mut self, value: i64) {
        *self = Self {
            low: value as u16,
            mid1: 0,
            mid2: (value >> 16) as u16,
            high: (value >> 32) as u8,
        };
    }
}

#[bitos(16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Status {
    #[bits(0)]
    pub carry: bool,
    #[bits(1)]
    pub overflow: bool,
    #[bits(2)]
    pub arithmetic_zero: bool,
    #[bits(3)]
    pub sign: bool,
    #[bits(4)]
    pub above_s32: bool,
    #[bits(5)]
    pub top_two_bits_eq: bool,
    #[bits(6)]
    pub logic_zero: bool,
    #[bits(7)]
    pub overflow_fused: bool,
    /// Always reads as zero.
    #[bits(8)]
    pub hardwired_zero: bool,
    /// Accelerator overflow exceptions enable.
    #[bits(9)]
    pub accel_interrupt_enable: bool,
    #[bits(10)]
    pub unknown_10: bool,
    #[bits(11)]
    pub external_interrupt_enable: bool,
    #[bits(12)]
    pub global_interrupt_enable: bool,
    /// When clear, multiplication results are doubled.
    #[bits(13)]
    pub dont_double_result: bool,
    /// Loads into the mid slice of an accumulator sign extend into the high slice and clear
    /// the low one.
    #[bits(14)]
    pub sign_extend_to_40: bool,
    #[bits(15)]
    pub unsigned_mul: bool,
}

/// Register ids, as encoded in instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, VariantArray, Display, EnumString)]
#[repr(u8)]
pub enum Reg {
    #[strum(to_string = "ar0")]
    Addr0,
    #[strum(to_string = "ar1")]
    Addr1,
    #[strum(to_string = "ar2")]
    Addr2,
    #[strum(to_string = "ar3")]
    Addr3,
    #[strum(to_string = "ix0")]
    Index0,
    #[strum(to_string = "ix1")]
    Index1,
    #[strum(to_string = "ix2")]
    Index2,
    #[strum(to_string = "ix3")]
    Index3,
    #[strum(to_string = "lm0", serialize = "r8")]
    Limit0,
    #[strum(to_string = "lm1", serialize = "r9")]
    Limit1,
    #[strum(to_string = "lm2", serialize = "r10")]
    Limit2,
    #[strum(to_string = "lm3", serialize = "r11")]
    Limit3,
    #[strum(to_string = "st0")]
    CallStack,
    #[strum(to_string = "st1")]
    DataStack,
    #[strum(to_string = "st2")]
    LoopStack,
    #[strum(to_string = "st3")]
    LoopCount,
    #[strum(to_string = "ac0.h")]
    Acc40High0,
    #[strum(to_string = "ac1.h")]
    Acc40High1,
    #[strum(to_string = "bank", serialize = "cr")]
    Bank,
    #[strum(to_string = "sr")]
    Status,
    #[strum(to_string = "prod.l")]
    ProdLow,
    #[strum(to_string = "prod.m1")]
    ProdMid1,
    #[strum(to_string = "prod.h")]
    ProdHigh,
    #[strum(to_string = "prod.m2")]
    ProdMid2,
    #[strum(to_string = "ax0.l")]
    Acc32Low0,
    #[strum(to_string = "ax1.l")]
    Acc32Low1,
    #[strum(to_string = "ax0.h")]
    Acc32High0,
    #[strum(to_string = "ax1.h")]
    Acc32High1,
    #[strum(to_string = "ac0.l")]
    Acc40Low0,
    #[strum(to_string = "ac1.l")]
    Acc40Low1,
    #[strum(to_string = "ac0.m")]
    Acc40Mid0,
    #[strum(to_string = "ac1.m")]
    Acc40Mid1,
}

/// What a register id refers to. Ids come in groups of four: `ar`, `ix`, `lm`, the stacks,
/// then mixed groups for the high slices, the product slices, `ax` and the low and mid slices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    Addressing(usize),
    Indexing(usize),
    Limit(usize),
    Stack(usize),
    AccHigh(usize),
    Bank,
    Status,
    Product(usize),
    AxLow(usize),
    AxHigh(usize),
    AccLow(usize),
    AccMid(usize),
}

impl Reg {
    /// Returns the register with the given id. Only the low 5 bits of `index` are used.
    #[inline(always)]
    pub fn new(index: u8) -> Self {
        Self::VARIANTS[(index & 0x1F) as usize]
    }

    #[inline(always)]
    pub fn id(self) -> u8 {
        self as u8
    }

    fn slot(self) -> Slot {
        let id = self.id();
        let n = (id & 3) as usize;

        match (id >> 2, n) {
            (0, _) => Slot::Addressing(n),
            (1, _) => Slot::Indexing(n),
            (2, _) => Slot::Limit(n),
            (3, _) => Slot::Stack(n),
            (4, 0 | 1) => Slot::AccHigh(n),
            (4, 2) => Slot::Bank,
            (4, _) => Slot::Status,
            (5, _) => Slot::Product(n),
            (6, 0 | 1) => Slot::AxLow(n),
            (6, _) => Slot::AxHigh(n - 2),
            (_, 0 | 1) => Slot::AccLow(n),
            (_, _) => Slot::AccMid(n - 2),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registers {
    pub pc: u16,
    pub addressing: [u16; 4],
    pub indexing: [u16; 4],
    pub limit: [u16; 4],
    pub call_stack: Stack,
    pub data_stack: Stack,
    pub loop_stack: Stack,
    pub loop_count: Stack,
    pub product: Product,
    pub acc40: [Acc40; 2],
    pub acc32: [i32; 2],
    pub bank: u8,
    pub status: Status,
}

impl Default for Registers {
    fn default() -> Self {
        Self {
            pc: Default::default(),
            addressing: Default::default(),
            indexing: Default::default(),
            limit: [0xFFFF; 4],
            call_stack: Default::default(),
            data_stack: Default::default(),
            loop_stack: Default::default(),
            loop_count: Default::default(),
            product: Default::default(),
            acc40: Default::default(),
            acc32: Default::default(),
            bank: Default::default(),
            status: Default::default(),
        }
    }
}

impl Registers {
    /// The stack behind `st{n}`.
    pub fn stack(&self, n: usize) -> &Stack {
        match n {
            0 => &self.call_stack,
            1 => &self.data_stack,
            2 => &self.loop_stack,
            _ => &self.loop_count,
        }
    }

    pub fn stack_mut(&mut self, n: usize) -> &mut Stack {
        match n {
            0 => &mut self.call_stack,
            1 => &mut self.data_stack,
            2 => &mut self.loop_stack,
            _ => &mut self.loop_count,
        }
    }

    /// Reads a register the way a register move would. Stack registers read their top entry
    /// without popping it.
    pub fn get(&self, reg: Reg) -> u16 {
        match reg.slot() {
            Slot::Addressing(n) => self.addressing[n],
            Slot::Indexing(n) => self.indexing[n],
            Slot::Limit(n) => self.limit[n],
            Slot::Stack(n) => self.stack(n).last().copied().unwrap_or_default(),
            Slot::AccHigh(n) => self.acc40[n].high_extended(),
            Slot::Bank => self.bank as u16,
            Slot::Status => self.status.to_bits(),
            Slot::Product(0) => self.product.low,
            Slot::Product(1) => self.product.mid1,
            Slot::Product(2) => self.product.high as u16,
            Slot::Product(_) => self.product.mid2,
            Slot::AxLow(n) => self.acc32[n] as u16,
            Slot::AxHigh(n) => (self.acc32[n] >> 16) as u16,
            Slot::AccLow(n) => self.acc40[n].low,
            Slot::AccMid(n) => self.acc40[n].mid_saturated(self.status.sign_extend_to_40()),
        }
    }

    /// Writes a register slot directly. Stack registers push `value`.
    pub fn set(&mut self, reg: Reg, value: u16) {
        match reg.slot() {
            Slot::Addressing(n) => self.addressing[n] = value,
            Slot::Indexing(n) => self.indexing[n] = value,
            Slot::Limit(n) => self.limit[n] = value,
            Slot::Stack(n) => self.stack_mut(n).push(value),
            Slot::AccHigh(n) => self.acc40[n].high = value as u8,
            Slot::Bank => self.bank = value as u8,
            Slot::Status => self.status = Status::from_bits(value.with_bit(8, false)),
            Slot::Product(0) => self.product.low = value,
            Slot::Product(1) => self.product.mid1 = value,
            Slot::Product(2) => self.product.high = value as u8,
            Slot::Product(_) => self.product.mid2 = value,
            Slot::AxLow(n) => self.acc32[n] = self.acc32[n].with_bits(0, 16, value as i32),
            Slot::AxHigh(n) => self.acc32[n] = self.acc32[n].with_bits(16, 32, value as i32),
            Slot::AccLow(n) => self.acc40[n].low = value,
            Slot::AccMid(n) => self.acc40[n].mid = value,
        }
    }

    /// Writes a register the way a load or move instruction does: in sign extension mode, a
    /// write to the mid slice of an accumulator sign extends into the high slice and clears
    /// the low slice.
    pub fn set_saturate(&mut self, reg: Reg, value: u16) {
        match reg.slot() {
            Slot::AccMid(n) if self.status.sign_extend_to_40() => {
                self.acc40[n].set((value as i16 as i64) << 16);
            }
            _ => self.set(reg, value),
        }
    }

    /// Clears the stacks.
    pub fn clear_stacks(&mut self) {
        self.call_stack.clear();
        self.data_stack.clear();
        self.loop_stack.clear();
        self.loop_count.clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn acc40_views_agree() {
        let mut acc = Acc40::default();
        acc.set(-2);
        assert_eq!(acc.low, 0xFFFE);
        assert_eq!(acc.mid, 0xFFFF);
        assert_eq!(acc.high, 0xFF);

        acc.mid = 0x1234;
        assert_eq!(acc.get(), (-1i64 << 32) | 0x1234_FFFE);

        // only 40 bits are kept
        assert_eq!(acc.set(Acc40::MAX + 1), Acc40::MIN);
    }

    #[test]
    fn product_resolves_partial_sum() {
        let mut prod = Product::default();
        prod.set(0x12_3456_789A);
        assert_eq!(prod.value(), 0x12_3456_789A);

        prod.mid1 = 0x0001;
        prod.mid2 = 0xFFFF;
        let resolved = prod.resolve();
        assert!(resolved.carry);
        assert_eq!(resolved.value, 0x13_0000_789A);
    }

    #[test]
    fn mid_reads_saturate_in_sign_extension_mode() {
        let mut regs = Registers::default();
        regs.acc40[0].set(0x01_0000_0000);

        assert_eq!(regs.get(Reg::Acc40Mid0), 0x0000);
        regs.status.set_sign_extend_to_40(true);
        assert_eq!(regs.get(Reg::Acc40Mid0), 0x7FFF);

        regs.acc40[0].set(-0x01_0000_0000);
        assert_eq!(regs.get(Reg::Acc40Mid0), 0x8000);
    }

    #[test]
    fn mid_writes_sign_extend() {
        let mut regs = Registers::default();
        regs.acc40[1].low = 0x1234;
        regs.status.set_sign_extend_to_40(true);
        regs.set_saturate(Reg::Acc40Mid1, 0x8000);

        assert_eq!(regs.acc40[1].get(), -0x8000_0000);
        assert_eq!(regs.get(Reg::Acc40High1), 0xFFFF);
    }

    #[test]
    fn status_bit_8_is_hardwired() {
        let mut regs = Registers::default();
        regs.set(Reg::Status, 0xFFFF);
        assert_eq!(regs.get(Reg::Status), 0xFEFF);
    }

    #[test]
    fn stack_registers_push() {
        let mut regs = Registers::default();
        for i in 0..20 {
            regs.set(Reg::CallStack, i);
        }

        assert_eq!(regs.call_stack.len(), 20);
        assert_eq!(regs.get(Reg::CallStack), 19);
    }

    #[test]
    fn ids_group_by_four() {
        assert_eq!(Reg::Limit2.slot(), Slot::Limit(2));
        assert_eq!(Reg::LoopStack.slot(), Slot::Stack(2));
        assert_eq!(Reg::Bank.slot(), Slot::Bank);
        assert_eq!(Reg::ProdMid2.slot(), Slot::Product(3));
        assert_eq!(Reg::Acc32High1.slot(), Slot::AxHigh(1));
        assert_eq!(Reg::Acc40Mid0.slot(), Slot::AccMid(0));

        let mut regs = Registers::default();
        for reg in Reg::VARIANTS.iter().copied() {
            if matches!(reg.slot(), Slot::Stack(_) | Slot::Status) {
                continue;
            }

            regs.set(reg, 0x0042 + reg.id() as u16);
            assert_eq!(regs.get(reg), 0x0042 + reg.id() as u16, "{reg}");
        }

        assert_eq!(regs.acc32[1], 0x005D_005B);
        assert_eq!(regs.product.mid2, 0x0042 + 23);
    }

    #[test]
    fn register_names() {
        assert_eq!(Reg::Acc40Mid1.to_string(), "ac1.m");
        assert_eq!("r9".parse::<Reg>(), Ok(Reg::Limit1));
        assert_eq!("lm1".parse::<Reg>(), Ok(Reg::Limit1));
        assert_eq!("ax0.h".parse::<Reg>(), Ok(Reg::Acc32High0));
        for (i, reg) in Reg::VARIANTS.iter().enumerate() {
            assert_eq!(Reg::new(i as u8), *reg);
        }
    }
}
