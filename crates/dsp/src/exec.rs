use crate::{
    core::{Core, Repeat},
    ins::{CondCode, ExtensionOpcode, Ins, Opcode},
    regs::{Acc40, Reg, Registers, Resolved, Status},
};
use bitos::BitUtils;
use tracing::{debug, warn};

type ExecFn = fn(&mut Core, Ins);

#[derive(Clone, Copy, PartialEq, Eq)]
enum MultiplyMode {
    Unsigned,
    Mixed,
    Signed,
}

#[inline(always)]
fn add_carried(lhs: i64, new: i64) -> bool {
    lhs as u64 > new as u64
}

#[inline(always)]
fn sub_carried(lhs: i64, new: i64) -> bool {
    lhs as u64 >= new as u64
}

#[inline(always)]
fn add_overflowed(lhs: i64, rhs: i64, new: i64) -> bool {
    (lhs > 0 && rhs > 0 && new <= 0) || (lhs < 0 && rhs < 0 && new >= 0)
}

#[inline(always)]
fn sub_overflowed(lhs: i64, rhs: i64, new: i64) -> bool {
    add_overflowed(lhs, -rhs, new)
}

#[inline(always)]
fn round_40(value: i64) -> i64 {
    if value.bit(16) {
        (value + 0x8000) & !0xFFFF
    } else {
        (value + 0x7FFF) & !0xFFFF
    }
}

/// Steps an address register through the circular buffer described by its limit register.
/// `lm` is the buffer length minus one and the buffer is aligned to the next power of two.
/// `forward` selects which end of the buffer the step may cross.
fn wrap_addr(ar: u16, lm: u16, addend: i16, carry_in: bool, forward: bool) -> u16 {
    // significant bits of lm, at least one
    let n = (16 - lm.leading_zeros()).max(1);
    let mask = 1u16.checked_shl(n).map_or(!0, |r| r - 1);
    let len = lm.wrapping_add(1);

    let low = (ar & mask) as u32 + (addend as u16 & mask) as u32 + carry_in as u32;
    let carry = low > mask as u32;
    let result = ar
        .wrapping_add_signed(addend)
        .wrapping_add(carry_in as u16);

    if forward {
        if carry { result.wrapping_sub(len) } else { result }
    } else if !carry || (result & mask) < (!lm & mask) {
        result.wrapping_add(len)
    } else {
        result
    }
}

fn add_to_addr_reg(ar: u16, lm: u16, value: i16) -> u16 {
    wrap_addr(ar, lm, value, false, value >= 0)
}

fn sub_from_addr_reg(ar: u16, lm: u16, value: i16) -> u16 {
    // ar + !value + 1
    let negated = value.wrapping_neg();
    wrap_addr(ar, lm, !value, true, negated > 0 || negated == i16::MIN)
}

/// Address used by the second read of a dual load. Reads from the same bank as the first one
/// use the first address.
#[inline(always)]
fn paired_addr(regs: &Registers, s: usize) -> u16 {
    if (regs.addressing[3] >> 10) == (regs.addressing[s] >> 10) {
        regs.addressing[s]
    } else {
        regs.addressing[3]
    }
}

/// The low and high halves of an `axN` register, sign extended.
#[inline(always)]
fn acc32_halves(acc: i32) -> (i64, i64) {
    (((acc << 16) >> 16) as i64, (acc >> 16) as i64)
}

impl Core {
    fn base_flags(&mut self, value: i64) {
        let status = &mut self.regs.status;
        status.set_sign(value < 0);
        status.set_arithmetic_zero(value == 0);
        status.set_above_s32(value > i32::MAX as i64 || value < i32::MIN as i64);
        status.set_top_two_bits_eq(value.bit(30) == value.bit(31));
        status.set_overflow_fused(status.overflow() || status.overflow_fused());
    }

    /// Flags of an operation which leaves carry and overflow clear.
    fn plain_flags(&mut self, value: i64) {
        self.regs.status.set_carry(false);
        self.regs.status.set_overflow(false);
        self.base_flags(value);
    }

    /// Flags of a logic operation on the mid slice of `acN`.
    fn logic_flags(&mut self, d: usize) {
        let new = self.regs.acc40[d].get();
        self.plain_flags(new);

        let mid = self.regs.acc40[d].mid;
        self.regs.status.set_arithmetic_zero(mid == 0);
        self.regs.status.set_sign((mid as i16) < 0);
    }

    fn add_flags(&mut self, lhs: i64, rhs: i64, new: i64) {
        self.regs.status.set_carry(add_carried(lhs, new));
        self.regs.status.set_overflow(add_overflowed(lhs, rhs, new));
        self.base_flags(new);
    }

    fn sub_flags(&mut self, lhs: i64, rhs: i64, new: i64) {
        self.regs.status.set_carry(sub_carried(lhs, new));
        self.regs.status.set_overflow(sub_overflowed(lhs, rhs, new));
        self.base_flags(new);
    }

    /// Adds `rhs` to `acN`, setting flags.
    fn acc_add(&mut self, d: usize, rhs: i64) {
        let lhs = self.regs.acc40[d].get();
        let new = self.regs.acc40[d].set(lhs + rhs);
        self.add_flags(lhs, rhs, new);
    }

    /// Subtracts `rhs` from `acN`, setting flags.
    fn acc_sub(&mut self, d: usize, rhs: i64) {
        let lhs = self.regs.acc40[d].get();
        let new = self.regs.acc40[d].set(lhs - rhs);
        self.sub_flags(lhs, rhs, new);
    }

    /// Compares `lhs` against `rhs` without storing the difference.
    fn compare(&mut self, lhs: i64, rhs: i64) {
        let diff = Acc40::wrap(lhs - rhs);
        self.sub_flags(lhs, rhs, diff);
    }

    /// Applies the product scaling mode. Carry and overflow of multiplications are not
    /// modeled.
    #[inline(always)]
    fn scaled(&self, product: i64) -> i64 {
        if self.regs.status.dont_double_result() {
            product
        } else {
            2 * product
        }
    }

    fn multiply(&self, mode: MultiplyMode, a: u16, b: u16) -> i64 {
        let (a, b) = if mode == MultiplyMode::Signed || !self.regs.status.unsigned_mul() {
            // sign ext, sign ext
            (a as i16 as i64, b as i16 as i64)
        } else if mode == MultiplyMode::Mixed {
            // zero ext, sign ext
            (a as i64, b as i16 as i64)
        } else {
            // zero ext, zero ext
            (a as i64, b as i64)
        };

        self.scaled(a * b)
    }

    /// Operand selection of the MULX family.
    fn mulx_product(&self, ins: Ins) -> i64 {
        let t = ins.base.bit(11);
        let s = ins.base.bit(12);

        let lhs = if s {
            (self.regs.acc32[0] >> 16) as u16
        } else {
            self.regs.acc32[0] as u16
        };

        let rhs = if t {
            (self.regs.acc32[1] >> 16) as u16
        } else {
            self.regs.acc32[1] as u16
        };

        let (mode, lhs, rhs) = match (s, t) {
            (false, false) => (MultiplyMode::Unsigned, lhs, rhs),
            (false, true) => (MultiplyMode::Mixed, lhs, rhs),
            (true, false) => (MultiplyMode::Mixed, rhs, lhs),
            (true, true) => (MultiplyMode::Signed, lhs, rhs),
        };

        self.multiply(mode, lhs, rhs)
    }

    /// `axS.l * axS.h`.
    fn ax_product(&self, s: usize) -> i64 {
        let (low, high) = acc32_halves(self.regs.acc32[s]);
        self.scaled(low * high)
    }

    /// `acS.m * axT.h`.
    fn mulc_product(&self, s: usize, t: usize) -> i64 {
        let lhs = self.regs.acc40[s].mid as i16 as i64;
        let rhs = (self.regs.acc32[t] >> 16) as i64;
        self.scaled(lhs * rhs)
    }

    /// `axS.l * axT.h` as used by MADDX/MSUBX.
    fn maddx_product(&self, s: u8, t: u8) -> i64 {
        let lhs = self.regs.get(Reg::new(0x18 + 2 * s)) as i16 as i64;
        let rhs = self.regs.get(Reg::new(0x19 + 2 * t)) as i16 as i64;
        self.scaled(lhs * rhs)
    }

    fn condition(&self, code: CondCode) -> bool {
        let status: Status = self.regs.status;
        match code {
            CondCode::GreaterOrEqual => status.overflow() == status.sign(),
            CondCode::Less => status.overflow() != status.sign(),
            CondCode::Greater => status.overflow() == status.sign() && !status.arithmetic_zero(),
            CondCode::LessOrEqual => status.overflow() != status.sign() || status.arithmetic_zero(),
            CondCode::NotZero => !status.arithmetic_zero(),
            CondCode::Zero => status.arithmetic_zero(),
            CondCode::NotCarry => !status.carry(),
            CondCode::Carry => status.carry(),
            CondCode::BelowS32 => !status.above_s32(),
            CondCode::AboveS32 => status.above_s32(),
            CondCode::WeirdA => {
                (status.above_s32() || status.top_two_bits_eq()) && !status.arithmetic_zero()
            }
            CondCode::WeirdB => {
                (!status.above_s32() && !status.top_two_bits_eq()) || status.arithmetic_zero()
            }
            CondCode::NotLogicZero => !status.logic_zero(),
            CondCode::LogicZero => status.logic_zero(),
            CondCode::Overflow => status.overflow(),
            CondCode::Always => true,
        }
    }

    #[inline(always)]
    fn condition_of(&self, ins: Ins) -> bool {
        self.condition(CondCode::new(ins.base.bits(0, 4) as u8))
    }

    fn illegal(&mut self, ins: Ins) {
        warn!(
            "illegal instruction 0x{:04X} at 0x{:04X}, ignored",
            ins.base,
            self.regs.pc.wrapping_sub(1)
        );
    }

    fn nop(&mut self, _: Ins) {}

    fn abs(&mut self, ins: Ins) {
        let d = ins.base.bit(11) as usize;
        let old = self.regs.acc40[d].get();
        let new = self.regs.acc40[d].set(old.abs());

        self.regs.status.set_carry(false);
        self.regs.status.set_overflow(new == Acc40::MIN);
        self.base_flags(new);
    }

    fn add(&mut self, ins: Ins) {
        let d = ins.base.bit(8) as usize;
        let rhs = self.regs.acc40[1 - d].get();
        self.acc_add(d, rhs);
    }

    fn addarn(&mut self, ins: Ins) {
        let d = ins.base.bits(0, 2) as usize;
        let s = ins.base.bits(2, 4) as usize;

        let ar = self.regs.addressing[d];
        let lm = self.regs.limit[d];
        let ix = self.regs.indexing[s];
        self.regs.addressing[d] = add_to_addr_reg(ar, lm, ix as i16);
    }

    fn addax(&mut self, ins: Ins) {
        let d = ins.base.bit(8) as usize;
        let s = ins.base.bit(9) as usize;
        self.acc_add(d, self.regs.acc32[s] as i64);
    }

    fn addaxl(&mut self, ins: Ins) {
        let d = ins.base.bit(8) as usize;
        let s = ins.base.bit(9) as usize;
        self.acc_add(d, self.regs.acc32[s].bits(0, 16) as u16 as i64);
    }

    fn addi(&mut self, ins: Ins) {
        let d = ins.base.bit(8) as usize;
        self.acc_add(d, (ins.extra as i16 as i64) << 16);
    }

    fn addis(&mut self, ins: Ins) {
        let d = ins.base.bit(8) as usize;
        self.acc_add(d, (ins.base.bits(0, 8) as i8 as i64) << 16);
    }

    fn addp(&mut self, ins: Ins) {
        let d = ins.base.bit(8) as usize;

        let lhs = self.regs.acc40[d].get();
        let Resolved { value: rhs, carry, overflow } = self.regs.product.resolve();
        let new = self.regs.acc40[d].set(lhs + rhs);

        self.regs.status.set_carry(add_carried(lhs, new) || carry);
        self.regs
            .status
            .set_overflow(add_overflowed(lhs, rhs, new) ^ overflow);
        self.base_flags(new);
    }

    fn addpaxz(&mut self, ins: Ins) {
        let d = ins.base.bit(8) as usize;
        let s = ins.base.bit(9) as usize;

        let Resolved { value: lhs, carry, overflow } = self.regs.product.resolve();
        let lhs = round_40(lhs);
        let rhs = self.regs.acc32[s] as i64;
        let new = self.regs.acc40[d].set((lhs + rhs) & !0xFFFF);

        self.regs.status.set_carry(add_carried(lhs, new) ^ carry);
        self.regs
            .status
            .set_overflow(add_overflowed(lhs, rhs, new) ^ overflow);
        self.base_flags(new);
    }

    fn addr(&mut self, ins: Ins) {
        let d = ins.base.bit(8) as usize;
        let s = ins.base.bits(9, 11) as u8;
        let rhs = (self.regs.get(Reg::new(0x18 + s)) as i16 as i64) << 16;
        self.acc_add(d, rhs);
    }

    fn andc(&mut self, ins: Ins) {
        let d = ins.base.bit(8) as usize;
        self.regs.acc40[d].mid &= self.regs.acc40[1 - d].mid;
        self.logic_flags(d);
    }

    fn andcf(&mut self, ins: Ins) {
        let d = ins.base.bit(8) as usize;
        let all_set = self.regs.acc40[d].mid & ins.extra == ins.extra;
        self.regs.status.set_logic_zero(all_set);
    }

    fn andf(&mut self, ins: Ins) {
        let d = ins.base.bit(8) as usize;
        let none_set = self.regs.acc40[d].mid & ins.extra == 0;
        self.regs.status.set_logic_zero(none_set);
    }

    fn andi(&mut self, ins: Ins) {
        let d = ins.base.bit(8) as usize;
        self.regs.acc40[d].mid &= ins.extra;
        self.logic_flags(d);
    }

    fn andr(&mut self, ins: Ins) {
        let d = ins.base.bit(8) as usize;
        let s = ins.base.bit(9) as usize;
        self.regs.acc40[d].mid &= (self.regs.acc32[s] >> 16) as u16;
        self.logic_flags(d);
    }

    fn asl(&mut self, ins: Ins) {
        let d = ins.base.bit(8) as usize;
        let shift = ins.base.bits(0, 6);

        let old = self.regs.acc40[d].get();
        let new = self.regs.acc40[d].set(old << shift);
        self.plain_flags(new);
    }

    fn asr(&mut self, ins: Ins) {
        let d = ins.base.bit(8) as usize;
        let shift = (64 - ins.base.bits(0, 6)) % 64;

        let old = self.regs.acc40[d].get();
        let new = self.regs.acc40[d].set(old >> shift);
        self.plain_flags(new);
    }

    fn asr16(&mut self, ins: Ins) {
        let d = ins.base.bit(11) as usize;
        let old = self.regs.acc40[d].get();
        let new = self.regs.acc40[d].set(old >> 16);
        self.plain_flags(new);
    }

    /// Shifts `acD` by a 7-bit signed amount. `positive_left` selects the direction of positive
    /// amounts.
    fn shift_by(&mut self, d: usize, value: i64, amount: u16, positive_left: bool) {
        let shift = amount.bits(0, 6);
        let right = amount.bit(6) == positive_left;

        let new = if right {
            let shift = if positive_left {
                (64 - shift) % 64
            } else {
                shift
            };
            self.regs.acc40[d].set(value >> shift)
        } else {
            let shift = if positive_left {
                shift
            } else {
                (64 - shift) % 64
            };
            self.regs.acc40[d].set(value << shift)
        };

        self.plain_flags(new);
    }

    fn asrn(&mut self, _: Ins) {
        let value = self.regs.acc40[0].get();
        let amount = self.regs.acc40[1].mid;
        self.shift_by(0, value, amount, false);
    }

    fn asrnr(&mut self, ins: Ins) {
        let d = ins.base.bit(8) as usize;
        let value = self.regs.acc40[d].get();
        let amount = self.regs.acc40[1 - d].mid;
        self.shift_by(d, value, amount, true);
    }

    fn asrnrx(&mut self, ins: Ins) {
        let d = ins.base.bit(8) as usize;
        let s = ins.base.bit(9) as usize;
        let value = self.regs.acc40[d].get();
        let amount = (self.regs.acc32[s] >> 16) as u16;
        self.shift_by(d, value, amount, true);
    }

    fn lsl(&mut self, ins: Ins) {
        let d = ins.base.bit(8) as usize;
        let shift = ins.base.bits(0, 6);

        let old = self.regs.acc40[d].get();
        let new = self.regs.acc40[d].set(old << shift);
        self.plain_flags(new);
    }

    fn lsl16(&mut self, ins: Ins) {
        let d = ins.base.bit(8) as usize;
        let old = self.regs.acc40[d].get();
        let new = self.regs.acc40[d].set(old << 16);
        self.plain_flags(new);
    }

    fn lsr(&mut self, ins: Ins) {
        let d = ins.base.bit(8) as usize;
        let shift = (64 - ins.base.bits(0, 6)) % 64;

        let old = (self.regs.acc40[d].get() as u64) & ((1 << 40) - 1);
        let new = self.regs.acc40[d].set((old >> shift) as i64);
        self.plain_flags(new);
    }

    fn lsr16(&mut self, ins: Ins) {
        let d = ins.base.bit(8) as usize;
        let old = (self.regs.acc40[d].get() as u64) & ((1 << 40) - 1);
        let new = self.regs.acc40[d].set((old >> 16) as i64);
        self.plain_flags(new);
    }

    fn lsrn(&mut self, _: Ins) {
        let value = self.regs.acc40[0].get() & ((1 << 40) - 1);
        let amount = self.regs.acc40[1].mid;
        self.shift_by(0, value, amount, false);
    }

    fn lsrnr(&mut self, ins: Ins) {
        let d = ins.base.bit(8) as usize;
        let value = self.regs.acc40[d].get() & ((1 << 40) - 1);
        let amount = self.regs.acc40[1 - d].mid;
        self.shift_by(d, value, amount, true);
    }

    fn lsrnrx(&mut self, ins: Ins) {
        let d = ins.base.bit(8) as usize;
        let s = ins.base.bit(9) as usize;
        let value = self.regs.acc40[d].get() & ((1 << 40) - 1);
        let amount = (self.regs.acc32[s] >> 16) as u16;
        self.shift_by(d, value, amount, true);
    }

    fn clr(&mut self, ins: Ins) {
        let d = ins.base.bit(11) as usize;
        let new = self.regs.acc40[d].set(0);
        self.plain_flags(new);
    }

    fn clrl(&mut self, ins: Ins) {
        let d = ins.base.bit(8) as usize;
        let old = self.regs.acc40[d].get();
        let new = self.regs.acc40[d].set(round_40(old));
        self.plain_flags(new);
    }

    fn clrp(&mut self, _: Ins) {
        self.regs.product.low = 0x0000;
        self.regs.product.mid1 = 0xFFF0;
        self.regs.product.mid2 = 0x0010;
        self.regs.product.high = 0x00FF;
    }

    fn clr15(&mut self, _: Ins) {
        self.regs.status.set_unsigned_mul(false);
    }

    fn set15(&mut self, _: Ins) {
        self.regs.status.set_unsigned_mul(true);
    }

    fn set16(&mut self, _: Ins) {
        self.regs.status.set_sign_extend_to_40(false);
    }

    fn set40(&mut self, _: Ins) {
        self.regs.status.set_sign_extend_to_40(true);
    }

    fn m0(&mut self, _: Ins) {
        self.regs.status.set_dont_double_result(true);
    }

    fn m2(&mut self, _: Ins) {
        self.regs.status.set_dont_double_result(false);
    }

    fn cmp(&mut self, _: Ins) {
        let lhs = self.regs.acc40[0].get();
        let rhs = self.regs.acc40[1].get();
        self.compare(lhs, rhs);
    }

    fn cmpaxh(&mut self, ins: Ins) {
        let s = ins.base.bit(11) as usize;
        let r = ins.base.bit(12) as usize;

        let lhs = self.regs.acc40[s].get();
        let rhs = ((self.regs.acc32[r] as i64) >> 16) << 16;
        self.compare(lhs, rhs);
    }

    fn cmpi(&mut self, ins: Ins) {
        let d = ins.base.bit(8) as usize;
        let lhs = self.regs.acc40[d].get();
        self.compare(lhs, (ins.extra as i16 as i64) << 16);
    }

    fn cmpis(&mut self, ins: Ins) {
        let d = ins.base.bit(8) as usize;
        let lhs = self.regs.acc40[d].get();
        self.compare(lhs, (ins.base as i8 as i64) << 16);
    }

    fn dar(&mut self, ins: Ins) {
        let d = ins.base.bits(0, 2) as usize;
        let ar = self.regs.addressing[d];
        let lm = self.regs.limit[d];
        self.regs.addressing[d] = sub_from_addr_reg(ar, lm, 1);
    }

    fn iar(&mut self, ins: Ins) {
        let d = ins.base.bits(0, 2) as usize;
        let ar = self.regs.addressing[d];
        let lm = self.regs.limit[d];
        self.regs.addressing[d] = add_to_addr_reg(ar, lm, 1);
    }

    fn subarn(&mut self, ins: Ins) {
        let d = ins.base.bits(0, 2) as usize;
        let ar = self.regs.addressing[d];
        let lm = self.regs.limit[d];
        let ix = self.regs.indexing[d];
        self.regs.addressing[d] = sub_from_addr_reg(ar, lm, ix as i16);
    }

    fn dec(&mut self, ins: Ins) {
        let d = ins.base.bit(8) as usize;
        let old = self.regs.acc40[d].get();
        let new = self.regs.acc40[d].set(old - 1);

        self.regs.status.set_carry(sub_carried(old, new));
        self.regs.status.set_overflow(add_overflowed(old, -1, new));
        self.base_flags(new);
    }

    fn decm(&mut self, ins: Ins) {
        let d = ins.base.bit(8) as usize;
        let old = self.regs.acc40[d].get();
        let new = self.regs.acc40[d].set(old - (1 << 16));

        self.regs.status.set_carry(sub_carried(old, new));
        self.regs
            .status
            .set_overflow(add_overflowed(old, -(1 << 16), new));
        self.base_flags(new);
    }

    fn inc(&mut self, ins: Ins) {
        let d = ins.base.bit(8) as usize;
        let old = self.regs.acc40[d].get();
        let new = self.regs.acc40[d].set(old + 1);
        self.add_flags(old, 1, new);
    }

    fn incm(&mut self, ins: Ins) {
        let d = ins.base.bit(8) as usize;
        let old = self.regs.acc40[d].get();
        let new = self.regs.acc40[d].set(old + (1 << 16));
        self.add_flags(old, 1 << 16, new);
    }

    fn neg(&mut self, ins: Ins) {
        let d = ins.base.bit(8) as usize;
        let old = self.regs.acc40[d].get();
        let new = self.regs.acc40[d].set(-old);

        self.regs.status.set_carry(old == 0);
        self.regs.status.set_overflow(old == Acc40::MIN);
        self.base_flags(new);
    }

    fn not(&mut self, ins: Ins) {
        let d = ins.base.bit(8) as usize;
        self.regs.acc40[d].mid ^= 0xFFFF;
        self.logic_flags(d);
    }

    fn orc(&mut self, ins: Ins) {
        let d = ins.base.bit(8) as usize;
        self.regs.acc40[d].mid |= self.regs.acc40[1 - d].mid;
        self.logic_flags(d);
    }

    fn ori(&mut self, ins: Ins) {
        let d = ins.base.bit(8) as usize;
        self.regs.acc40[d].mid |= ins.extra;
        self.logic_flags(d);
    }

    fn orr(&mut self, ins: Ins) {
        let d = ins.base.bit(8) as usize;
        let s = ins.base.bit(9) as usize;
        self.regs.acc40[d].mid |= (self.regs.acc32[s] >> 16) as u16;
        self.logic_flags(d);
    }

    fn xorc(&mut self, ins: Ins) {
        let d = ins.base.bit(8) as usize;
        self.regs.acc40[d].mid ^= self.regs.acc40[1 - d].mid;
        self.logic_flags(d);
    }

    fn xori(&mut self, ins: Ins) {
        let d = ins.base.bit(8) as usize;
        self.regs.acc40[d].mid ^= ins.extra;
        self.logic_flags(d);
    }

    fn xorr(&mut self, ins: Ins) {
        let d = ins.base.bit(8) as usize;
        let s = ins.base.bit(9) as usize;
        self.regs.acc40[d].mid ^= (self.regs.acc32[s] >> 16) as u16;
        self.logic_flags(d);
    }

    fn sub(&mut self, ins: Ins) {
        let d = ins.base.bit(8) as usize;
        let rhs = self.regs.acc40[1 - d].get();
        self.acc_sub(d, rhs);
    }

    fn subax(&mut self, ins: Ins) {
        let d = ins.base.bit(8) as usize;
        let s = ins.base.bit(9) as usize;
        self.acc_sub(d, self.regs.acc32[s] as i64);
    }

    fn subp(&mut self, ins: Ins) {
        let d = ins.base.bit(8) as usize;

        let lhs = self.regs.acc40[d].get();
        let Resolved { value: rhs, carry, overflow } = self.regs.product.resolve();
        let new = self.regs.acc40[d].set(lhs - rhs);

        self.regs.status.set_carry(sub_carried(lhs, new) ^ !carry);
        self.regs
            .status
            .set_overflow(sub_overflowed(lhs, rhs, new) ^ overflow);
        self.base_flags(new);
    }

    fn subr(&mut self, ins: Ins) {
        let d = ins.base.bit(8) as usize;
        let s = ins.base.bits(9, 11) as u8;
        let rhs = (self.regs.get(Reg::new(0x18 + s)) as i16 as i64) << 16;
        self.acc_sub(d, rhs);
    }

    fn tst(&mut self, ins: Ins) {
        let d = ins.base.bit(11) as usize;
        let value = self.regs.acc40[d].get();
        self.plain_flags(value);
    }

    fn tstaxh(&mut self, ins: Ins) {
        let d = ins.base.bit(8) as usize;
        let value = self.regs.acc32[d] >> 16;

        self.plain_flags(value as i64);
        self.regs
            .status
            .set_top_two_bits_eq(value.bit(15) == value.bit(14));
    }

    fn tstprod(&mut self, _: Ins) {
        let Resolved { value: prod, carry, overflow } = self.regs.product.resolve();

        self.regs.status.set_carry(carry);
        self.regs.status.set_overflow(overflow);
        self.base_flags(prod);
    }

    fn mov(&mut self, ins: Ins) {
        let d = ins.base.bit(8) as usize;
        let new = self.regs.acc40[d].set(self.regs.acc40[1 - d].get());
        self.plain_flags(new);
    }

    fn movax(&mut self, ins: Ins) {
        let d = ins.base.bit(8) as usize;
        let s = ins.base.bit(9) as usize;
        let new = self.regs.acc40[d].set(self.regs.acc32[s] as i64);
        self.plain_flags(new);
    }

    fn movr(&mut self, ins: Ins) {
        let d = ins.base.bit(8) as usize;
        let s = ins.base.bits(9, 11) as u8;

        let value = self.regs.get(Reg::new(0x18 + s)) as i16 as i64;
        let new = self.regs.acc40[d].set(value << 16);
        self.plain_flags(new);
    }

    fn movp(&mut self, ins: Ins) {
        let d = ins.base.bit(8) as usize;

        let Resolved { value: prod, carry, overflow } = self.regs.product.resolve();
        let new = self.regs.acc40[d].set(prod);

        self.regs.status.set_carry(carry);
        self.regs.status.set_overflow(overflow);
        self.base_flags(new);
    }

    fn movnp(&mut self, ins: Ins) {
        let d = ins.base.bit(8) as usize;

        let Resolved { value: prod, carry, overflow } = self.regs.product.resolve();
        let new = self.regs.acc40[d].set(-prod);

        self.regs.status.set_carry(prod != 0 && !carry);
        self.regs.status.set_overflow(overflow);
        self.base_flags(new);
    }

    fn movpz(&mut self, ins: Ins) {
        let d = ins.base.bit(8) as usize;

        let Resolved { value: prod, carry, overflow } = self.regs.product.resolve();
        let new = self.regs.acc40[d].set(round_40(prod));

        self.regs.status.set_carry(carry);
        self.regs.status.set_overflow(overflow);
        self.base_flags(new);
    }

    fn mrr(&mut self, ins: Ins) {
        let s = ins.base.bits(0, 5) as u8;
        let d = ins.base.bits(5, 10) as u8;

        let value = self.regs.get(Reg::new(s));
        self.regs.set_saturate(Reg::new(d), value);
    }

    fn sbclr(&mut self, ins: Ins) {
        let bit = 6 + ins.base.bits(0, 3) as u8;
        let sr = self.regs.status.to_bits().with_bit(bit, false);
        self.regs.set(Reg::Status, sr);
    }

    fn sbset(&mut self, ins: Ins) {
        let bit = 6 + ins.base.bits(0, 3) as u8;
        let sr = self.regs.status.to_bits().with_bit(bit, true);
        self.regs.set(Reg::Status, sr);
    }

    fn madd(&mut self, ins: Ins) {
        let s = ins.base.bit(8) as usize;
        let prod = self.regs.product.value();
        self.regs.product.set(prod + self.ax_product(s));
    }

    fn msub(&mut self, ins: Ins) {
        let s = ins.base.bit(8) as usize;
        let prod = self.regs.product.value();
        self.regs.product.set(prod - self.ax_product(s));
    }

    fn maddc(&mut self, ins: Ins) {
        let t = ins.base.bit(8) as usize;
        let s = ins.base.bit(9) as usize;
        let prod = self.regs.product.value();
        self.regs.product.set(prod + self.mulc_product(s, t));
    }

    fn msubc(&mut self, ins: Ins) {
        let t = ins.base.bit(8) as usize;
        let s = ins.base.bit(9) as usize;
        let prod = self.regs.product.value();
        self.regs.product.set(prod - self.mulc_product(s, t));
    }

    fn maddx(&mut self, ins: Ins) {
        let t = ins.base.bit(8) as u8;
        let s = ins.base.bit(9) as u8;
        let prod = self.regs.product.value();
        self.regs.product.set(prod + self.maddx_product(s, t));
    }

    fn msubx(&mut self, ins: Ins) {
        let t = ins.base.bit(8) as u8;
        let s = ins.base.bit(9) as u8;
        let prod = self.regs.product.value();
        self.regs.product.set(prod - self.maddx_product(s, t));
    }

    fn mul(&mut self, ins: Ins) {
        let s = ins.base.bit(11) as usize;
        let result = self.ax_product(s);
        self.regs.product.set(result);
    }

    fn mulaxh(&mut self, _: Ins) {
        let value = (self.regs.acc32[0] >> 16) as i64;
        let result = self.scaled(value * value);
        self.regs.product.set(result);
    }

    fn mulac(&mut self, ins: Ins) {
        let r = ins.base.bit(8) as usize;
        let s = ins.base.bit(11) as usize;

        let acc = self.regs.acc40[r].get();
        let new = self.regs.acc40[r].set(acc + self.regs.product.value());
        self.regs.product.set(self.ax_product(s));

        self.regs.status.set_overflow(false);
        self.base_flags(new);
    }

    fn mulmv(&mut self, ins: Ins) {
        let r = ins.base.bit(8) as usize;
        let s = ins.base.bit(11) as usize;

        let new = self.regs.acc40[r].set(self.regs.product.value());
        self.regs.product.set(self.ax_product(s));

        self.regs.status.set_overflow(false);
        self.base_flags(new);
    }

    fn mulmvz(&mut self, ins: Ins) {
        let r = ins.base.bit(8) as usize;
        let s = ins.base.bit(11) as usize;

        let new = self.regs.acc40[r].set(round_40(self.regs.product.value()));
        self.regs.product.set(self.ax_product(s));

        self.regs.status.set_overflow(false);
        self.base_flags(new);
    }

    fn mulc(&mut self, ins: Ins) {
        let t = ins.base.bit(11) as usize;
        let s = ins.base.bit(12) as usize;
        let result = self.mulc_product(s, t);
        self.regs.product.set(result);
    }

    fn mulcac(&mut self, ins: Ins) {
        let r = ins.base.bit(8) as usize;
        let t = ins.base.bit(11) as usize;
        let s = ins.base.bit(12) as usize;

        let prod = self.regs.product.value();
        self.regs.product.set(self.mulc_product(s, t));
        let acc = self.regs.acc40[r].get();
        let new = self.regs.acc40[r].set(acc + prod);

        self.regs.status.set_overflow(false);
        self.base_flags(new);
    }

    fn mulcmv(&mut self, ins: Ins) {
        let r = ins.base.bit(8) as usize;
        let t = ins.base.bit(11) as usize;
        let s = ins.base.bit(12) as usize;

        let prod = self.regs.product.value();
        self.regs.product.set(self.mulc_product(s, t));
        let new = self.regs.acc40[r].set(prod);

        self.regs.status.set_overflow(false);
        self.base_flags(new);
    }

    fn mulcmvz(&mut self, ins: Ins) {
        let r = ins.base.bit(8) as usize;
        let t = ins.base.bit(11) as usize;
        let s = ins.base.bit(12) as usize;

        let prod = self.regs.product.value();
        self.regs.product.set(self.mulc_product(s, t));
        let new = self.regs.acc40[r].set(round_40(prod));

        self.regs.status.set_overflow(false);
        self.base_flags(new);
    }

    fn mulx(&mut self, ins: Ins) {
        let result = self.mulx_product(ins);
        self.regs.product.set(result);
    }

    fn mulxac(&mut self, ins: Ins) {
        let r = ins.base.bit(8) as usize;

        let acc = self.regs.acc40[r].get();
        self.regs.acc40[r].set(acc + self.regs.product.value());
        self.regs.product.set(self.mulx_product(ins));
    }

    fn mulxmv(&mut self, ins: Ins) {
        let r = ins.base.bit(8) as usize;

        self.regs.acc40[r].set(self.regs.product.value());
        self.regs.product.set(self.mulx_product(ins));
    }

    fn mulxmvz(&mut self, ins: Ins) {
        let r = ins.base.bit(8) as usize;

        self.regs.acc40[r].set(round_40(self.regs.product.value()));
        self.regs.product.set(self.mulx_product(ins));
    }

    fn halt(&mut self, _: Ins) {
        debug!("DSP halted at 0x{:04X}", self.regs.pc.wrapping_sub(1));
        self.halted = true;
    }

    fn ifcc(&mut self, ins: Ins) {
        if !self.condition_of(ins) {
            self.regs.pc = self.regs.pc.wrapping_add(self.ins_len_at(self.regs.pc));
        }
    }

    fn jmp(&mut self, ins: Ins) {
        if self.condition_of(ins) {
            self.regs.pc = ins.extra;
        }
    }

    fn jr(&mut self, ins: Ins) {
        let r = ins.base.bits(5, 8) as u8;
        let addr = self.regs.get(Reg::new(r));

        if self.condition_of(ins) {
            self.regs.pc = addr;
        }
    }

    fn call(&mut self, ins: Ins) {
        if self.condition_of(ins) {
            self.regs.call_stack.push(self.regs.pc);
            self.regs.pc = ins.extra;
        }
    }

    fn callr(&mut self, ins: Ins) {
        let r = ins.base.bits(5, 8) as u8;
        let addr = self.regs.get(Reg::new(r));

        if self.condition_of(ins) {
            self.regs.call_stack.push(self.regs.pc);
            self.regs.pc = addr;
        }
    }

    fn ret(&mut self, ins: Ins) {
        if !self.condition_of(ins) {
            return;
        }

        match self.regs.call_stack.pop() {
            Some(addr) => self.regs.pc = addr,
            None => warn!("return with empty call stack, ignored"),
        }
    }

    fn rti(&mut self, ins: Ins) {
        if self.condition_of(ins) {
            self.return_from_exception();
        }
    }

    fn start_repeat(&mut self, count: u16) {
        debug!("starting loop with counter {count}");

        if count == 0 {
            self.regs.pc = self.regs.pc.wrapping_add(self.ins_len_at(self.regs.pc));
        } else {
            self.repeat = Some(Repeat {
                addr: self.regs.pc,
                remaining: count,
            });
        }
    }

    fn loop_(&mut self, ins: Ins) {
        let r = ins.base.bits(0, 5) as u8;
        let count = self.regs.get(Reg::new(r));
        self.start_repeat(count);
    }

    fn loopi(&mut self, ins: Ins) {
        let count = ins.base.bits(0, 8);
        self.start_repeat(count);
    }

    fn start_block(&mut self, count: u16, end: u16) {
        if count == 0 {
            self.regs.pc = end.wrapping_add(self.ins_len_at(end));
        } else {
            self.regs.call_stack.push(self.regs.pc);
            self.regs.loop_stack.push(end);
            self.regs.loop_count.push(count);
        }
    }

    fn bloop(&mut self, ins: Ins) {
        let r = ins.base.bits(0, 5) as u8;
        let count = self.regs.get(Reg::new(r));
        self.start_block(count, ins.extra);
    }

    fn bloopi(&mut self, ins: Ins) {
        let count = ins.base.bits(0, 8);
        self.start_block(count, ins.extra);
    }

    fn lr(&mut self, ins: Ins) {
        let d = ins.base.bits(0, 5) as u8;
        let data = self.read_dmem(ins.extra);
        self.regs.set_saturate(Reg::new(d), data);
    }

    fn lri(&mut self, ins: Ins) {
        let d = ins.base.bits(0, 5) as u8;
        self.regs.set_saturate(Reg::new(d), ins.extra);
    }

    fn lris(&mut self, ins: Ins) {
        let d = ins.base.bits(8, 11) as u8;
        let imm = ins.base.bits(0, 8) as i8 as i16;
        self.regs.set_saturate(Reg::new(0x18 + d), imm as u16);
    }

    fn lrs(&mut self, ins: Ins) {
        let imm = ins.base.bits(0, 8) as u8;
        let d = ins.base.bits(8, 11) as u8;

        let addr = u16::from_le_bytes([imm, self.regs.bank]);
        let data = self.read_dmem(addr);
        self.regs.set_saturate(Reg::new(0x18 + d), data);
    }

    /// Loads through `arS`, then moves it by `step` (in slots, or `None` for `ixS`).
    fn load_indirect(&mut self, d: Reg, s: usize, step: Option<i16>) {
        let ar = self.regs.addressing[s];
        let data = self.read_dmem(ar);
        self.step_addr(s, step);
        self.regs.set_saturate(d, data);
    }

    fn step_addr(&mut self, s: usize, step: Option<i16>) {
        let ar = self.regs.addressing[s];
        let lm = self.regs.limit[s];
        self.regs.addressing[s] = match step {
            Some(0) => ar,
            Some(-1) => sub_from_addr_reg(ar, lm, 1),
            Some(value) => add_to_addr_reg(ar, lm, value),
            None => add_to_addr_reg(ar, lm, self.regs.indexing[s] as i16),
        };
    }

    fn lrr(&mut self, ins: Ins) {
        let d = Reg::new(ins.base.bits(0, 5) as u8);
        let s = ins.base.bits(5, 7) as usize;
        self.load_indirect(d, s, Some(0));
    }

    fn lrrd(&mut self, ins: Ins) {
        let d = Reg::new(ins.base.bits(0, 5) as u8);
        let s = ins.base.bits(5, 7) as usize;
        self.load_indirect(d, s, Some(-1));
    }

    fn lrri(&mut self, ins: Ins) {
        let d = Reg::new(ins.base.bits(0, 5) as u8);
        let s = ins.base.bits(5, 7) as usize;
        self.load_indirect(d, s, Some(1));
    }

    fn lrrn(&mut self, ins: Ins) {
        let d = Reg::new(ins.base.bits(0, 5) as u8);
        let s = ins.base.bits(5, 7) as usize;
        self.load_indirect(d, s, None);
    }

    /// Loads `acD.m` from IMEM through `arS`, then moves it by `step`.
    fn load_imem(&mut self, ins: Ins, step: Option<i16>) {
        let s = ins.base.bits(0, 2) as usize;
        let d = if ins.base.bit(8) {
            Reg::Acc40Mid1
        } else {
            Reg::Acc40Mid0
        };

        let ar = self.regs.addressing[s];
        let data = self.read_imem(ar);
        self.regs.set_saturate(d, data);
        self.step_addr(s, step);
    }

    fn ilrr(&mut self, ins: Ins) {
        self.load_imem(ins, Some(0));
    }

    fn ilrrd(&mut self, ins: Ins) {
        self.load_imem(ins, Some(-1));
    }

    fn ilrri(&mut self, ins: Ins) {
        self.load_imem(ins, Some(1));
    }

    fn ilrrn(&mut self, ins: Ins) {
        self.load_imem(ins, None);
    }

    fn si(&mut self, ins: Ins) {
        let offset = ins.base.bits(0, 8) as u8;
        let addr = u16::from_le_bytes([offset, 0xFF]);
        self.write_dmem(addr, ins.extra);
    }

    fn sr(&mut self, ins: Ins) {
        let s = ins.base.bits(0, 5) as u8;
        let data = self.regs.get(Reg::new(s));
        self.write_dmem(ins.extra, data);
    }

    /// Stores through `arD`, then moves it by `step`.
    fn store_indirect(&mut self, ins: Ins, step: Option<i16>) {
        let s = ins.base.bits(0, 5) as u8;
        let d = ins.base.bits(5, 7) as usize;

        let data = self.regs.get(Reg::new(s));
        let ar = self.regs.addressing[d];
        self.write_dmem(ar, data);
        self.step_addr(d, step);
    }

    fn srr(&mut self, ins: Ins) {
        self.store_indirect(ins, Some(0));
    }

    fn srrd(&mut self, ins: Ins) {
        self.store_indirect(ins, Some(-1));
    }

    fn srri(&mut self, ins: Ins) {
        self.store_indirect(ins, Some(1));
    }

    fn srrn(&mut self, ins: Ins) {
        self.store_indirect(ins, None);
    }

    fn srs(&mut self, ins: Ins) {
        let imm = ins.base.bits(0, 8) as u8;
        let s = ins.base.bits(8, 10) as u8;

        let addr = u16::from_le_bytes([imm, self.regs.bank]);
        let data = self.regs.get(Reg::new(0x1C + s));
        self.write_dmem(addr, data);
    }

    fn srsh(&mut self, ins: Ins) {
        let imm = ins.base.bits(0, 8) as u8;
        let s = ins.base.bit(8) as usize;

        let addr = u16::from_le_bytes([imm, self.regs.bank]);
        let data = self.regs.acc40[s].high_extended();
        self.write_dmem(addr, data);
    }
}

pub(crate) static EXEC_LUT: [ExecFn; 1 << 8] = {
    let mut lut = [Core::nop as ExecFn; 1 << 8];

    lut[Opcode::Abs as usize] = Core::abs as ExecFn;
    lut[Opcode::Add as usize] = Core::add as ExecFn;
    lut[Opcode::Addarn as usize] = Core::addarn as ExecFn;
    lut[Opcode::Addax as usize] = Core::addax as ExecFn;
    lut[Opcode::Addaxl as usize] = Core::addaxl as ExecFn;
    lut[Opcode::Addi as usize] = Core::addi as ExecFn;
    lut[Opcode::Addis as usize] = Core::addis as ExecFn;
    lut[Opcode::Addp as usize] = Core::addp as ExecFn;
    lut[Opcode::Addpaxz as usize] = Core::addpaxz as ExecFn;
    lut[Opcode::Addr as usize] = Core::addr as ExecFn;
    lut[Opcode::Andc as usize] = Core::andc as ExecFn;
    lut[Opcode::Andcf as usize] = Core::andcf as ExecFn;
    lut[Opcode::Andf as usize] = Core::andf as ExecFn;
    lut[Opcode::Andi as usize] = Core::andi as ExecFn;
    lut[Opcode::Andr as usize] = Core::andr as ExecFn;
    lut[Opcode::Asl as usize] = Core::asl as ExecFn;
    lut[Opcode::Asr as usize] = Core::asr as ExecFn;
    lut[Opcode::Asr16 as usize] = Core::asr16 as ExecFn;
    lut[Opcode::Asrn as usize] = Core::asrn as ExecFn;
    lut[Opcode::Asrnr as usize] = Core::asrnr as ExecFn;
    lut[Opcode::Asrnrx as usize] = Core::asrnrx as ExecFn;
    lut[Opcode::Bloop as usize] = Core::bloop as ExecFn;
    lut[Opcode::Bloopi as usize] = Core::bloopi as ExecFn;
    lut[Opcode::Call as usize] = Core::call as ExecFn;
    lut[Opcode::Callr as usize] = Core::callr as ExecFn;
    lut[Opcode::Clr as usize] = Core::clr as ExecFn;
    lut[Opcode::Clr15 as usize] = Core::clr15 as ExecFn;
    lut[Opcode::Clrl as usize] = Core::clrl as ExecFn;
    lut[Opcode::Clrp as usize] = Core::clrp as ExecFn;
    lut[Opcode::Cmp as usize] = Core::cmp as ExecFn;
    lut[Opcode::Cmpaxh as usize] = Core::cmpaxh as ExecFn;
    lut[Opcode::Cmpi as usize] = Core::cmpi as ExecFn;
    lut[Opcode::Cmpis as usize] = Core::cmpis as ExecFn;
    lut[Opcode::Dar as usize] = Core::dar as ExecFn;
    lut[Opcode::Dec as usize] = Core::dec as ExecFn;
    lut[Opcode::Decm as usize] = Core::decm as ExecFn;
    lut[Opcode::Halt as usize] = Core::halt as ExecFn;
    lut[Opcode::Iar as usize] = Core::iar as ExecFn;
    lut[Opcode::If as usize] = Core::ifcc as ExecFn;
    lut[Opcode::Ilrr as usize] = Core::ilrr as ExecFn;
    lut[Opcode::Ilrrd as usize] = Core::ilrrd as ExecFn;
    lut[Opcode::Ilrri as usize] = Core::ilrri as ExecFn;
    lut[Opcode::Ilrrn as usize] = Core::ilrrn as ExecFn;
    lut[Opcode::Inc as usize] = Core::inc as ExecFn;
    lut[Opcode::Incm as usize] = Core::incm as ExecFn;
    lut[Opcode::Jmp as usize] = Core::jmp as ExecFn;
    lut[Opcode::Jr as usize] = Core::jr as ExecFn;
    lut[Opcode::Loop as usize] = Core::loop_ as ExecFn;
    lut[Opcode::Loopi as usize] = Core::loopi as ExecFn;
    lut[Opcode::Lr as usize] = Core::lr as ExecFn;
    lut[Opcode::Lri as usize] = Core::lri as ExecFn;
    lut[Opcode::Lris as usize] = Core::lris as ExecFn;
    lut[Opcode::Lrr as usize] = Core::lrr as ExecFn;
    lut[Opcode::Lrrd as usize] = Core::lrrd as ExecFn;
    lut[Opcode::Lrri as usize] = Core::lrri as ExecFn;
    lut[Opcode::Lrrn as usize] = Core::lrrn as ExecFn;
    lut[Opcode::Lrs as usize] = Core::lrs as ExecFn;
    lut[Opcode::Lsl as usize] = Core::lsl as ExecFn;
    lut[Opcode::Lsl16 as usize] = Core::lsl16 as ExecFn;
    lut[Opcode::Lsr as usize] = Core::lsr as ExecFn;
    lut[Opcode::Lsr16 as usize] = Core::lsr16 as ExecFn;
    lut[Opcode::Lsrn as usize] = Core::lsrn as ExecFn;
    lut[Opcode::Lsrnr as usize] = Core::lsrnr as ExecFn;
    lut[Opcode::Lsrnrx as usize] = Core::lsrnrx as ExecFn;
    lut[Opcode::M0 as usize] = Core::m0 as ExecFn;
    lut[Opcode::M2 as usize] = Core::m2 as ExecFn;
    lut[Opcode::Madd as usize] = Core::madd as ExecFn;
    lut[Opcode::Maddc as usize] = Core::maddc as ExecFn;
    lut[Opcode::Maddx as usize] = Core::maddx as ExecFn;
    lut[Opcode::Mov as usize] = Core::mov as ExecFn;
    lut[Opcode::Movax as usize] = Core::movax as ExecFn;
    lut[Opcode::Movnp as usize] = Core::movnp as ExecFn;
    lut[Opcode::Movp as usize] = Core::movp as ExecFn;
    lut[Opcode::Movpz as usize] = Core::movpz as ExecFn;
    lut[Opcode::Movr as usize] = Core::movr as ExecFn;
    lut[Opcode::Mrr as usize] = Core::mrr as ExecFn;
    lut[Opcode::Msub as usize] = Core::msub as ExecFn;
    lut[Opcode::Msubc as usize] = Core::msubc as ExecFn;
    lut[Opcode::Msubx as usize] = Core::msubx as ExecFn;
    lut[Opcode::Mul as usize] = Core::mul as ExecFn;
    lut[Opcode::Mulac as usize] = Core::mulac as ExecFn;
    lut[Opcode::Mulaxh as usize] = Core::mulaxh as ExecFn;
    lut[Opcode::Mulc as usize] = Core::mulc as ExecFn;
    lut[Opcode::Mulcac as usize] = Core::mulcac as ExecFn;
    lut[Opcode::Mulcmv as usize] = Core::mulcmv as ExecFn;
    lut[Opcode::Mulcmvz as usize] = Core::mulcmvz as ExecFn;
    lut[Opcode::Mulmv as usize] = Core::mulmv as ExecFn;
    lut[Opcode::Mulmvz as usize] = Core::mulmvz as ExecFn;
    lut[Opcode::Mulx as usize] = Core::mulx as ExecFn;
    lut[Opcode::Mulxac as usize] = Core::mulxac as ExecFn;
    lut[Opcode::Mulxmv as usize] = Core::mulxmv as ExecFn;
    lut[Opcode::Mulxmvz as usize] = Core::mulxmvz as ExecFn;
    lut[Opcode::Neg as usize] = Core::neg as ExecFn;
    lut[Opcode::Not as usize] = Core::not as ExecFn;
    lut[Opcode::Orc as usize] = Core::orc as ExecFn;
    lut[Opcode::Ori as usize] = Core::ori as ExecFn;
    lut[Opcode::Orr as usize] = Core::orr as ExecFn;
    lut[Opcode::Ret as usize] = Core::ret as ExecFn;
    lut[Opcode::Rti as usize] = Core::rti as ExecFn;
    lut[Opcode::Sbclr as usize] = Core::sbclr as ExecFn;
    lut[Opcode::Sbset as usize] = Core::sbset as ExecFn;
    lut[Opcode::Set15 as usize] = Core::set15 as ExecFn;
    lut[Opcode::Set16 as usize] = Core::set16 as ExecFn;
    lut[Opcode::Set40 as usize] = Core::set40 as ExecFn;
    lut[Opcode::Si as usize] = Core::si as ExecFn;
    lut[Opcode::Sr as usize] = Core::sr as ExecFn;
    lut[Opcode::Srr as usize] = Core::srr as ExecFn;
    lut[Opcode::Srrd as usize] = Core::srrd as ExecFn;
    lut[Opcode::Srri as usize] = Core::srri as ExecFn;
    lut[Opcode::Srrn as usize] = Core::srrn as ExecFn;
    lut[Opcode::Srs as usize] = Core::srs as ExecFn;
    lut[Opcode::Srsh as usize] = Core::srsh as ExecFn;
    lut[Opcode::Sub as usize] = Core::sub as ExecFn;
    lut[Opcode::Subarn as usize] = Core::subarn as ExecFn;
    lut[Opcode::Subax as usize] = Core::subax as ExecFn;
    lut[Opcode::Subp as usize] = Core::subp as ExecFn;
    lut[Opcode::Subr as usize] = Core::subr as ExecFn;
    lut[Opcode::Tst as usize] = Core::tst as ExecFn;
    lut[Opcode::Tstaxh as usize] = Core::tstaxh as ExecFn;
    lut[Opcode::Tstprod as usize] = Core::tstprod as ExecFn;
    lut[Opcode::Xorc as usize] = Core::xorc as ExecFn;
    lut[Opcode::Xori as usize] = Core::xori as ExecFn;
    lut[Opcode::Xorr as usize] = Core::xorr as ExecFn;
    lut[Opcode::Illegal as usize] = Core::illegal as ExecFn;

    lut
};

/// How an extension op moves an address register after its access.
#[derive(Clone, Copy)]
enum Step {
    One,
    Index,
}

// Extension ops. These observe the registers as they were before the primary op.
impl Core {
    fn ext_step(&mut self, regs: &Registers, r: usize, step: Step) {
        let ar = regs.addressing[r];
        let lm = regs.limit[r];
        let value = match step {
            Step::One => 1,
            Step::Index => regs.indexing[r] as i16,
        };

        self.regs.addressing[r] = add_to_addr_reg(ar, lm, value);
    }

    fn ext_dr(&mut self, ins: Ins, regs: &Registers) {
        let r = ins.base.bits(0, 2) as usize;
        self.regs.addressing[r] = sub_from_addr_reg(regs.addressing[r], regs.limit[r], 1);
    }

    fn ext_ir(&mut self, ins: Ins, regs: &Registers) {
        let r = ins.base.bits(0, 2) as usize;
        self.ext_step(regs, r, Step::One);
    }

    fn ext_nr(&mut self, ins: Ins, regs: &Registers) {
        let r = ins.base.bits(0, 2) as usize;
        self.ext_step(regs, r, Step::Index);
    }

    fn ext_mv(&mut self, ins: Ins, regs: &Registers) {
        let s = ins.base.bits(0, 2) as u8;
        let d = ins.base.bits(2, 4) as u8;
        self.regs
            .set(Reg::new(0x18 + d), regs.get(Reg::new(0x1C + s)));
    }

    /// `L`/`LN`: loads `d` through `arS`.
    fn ext_load(&mut self, ins: Ins, regs: &Registers, step: Step) {
        let s = ins.base.bits(0, 2) as usize;
        let d = ins.base.bits(3, 6) as u8;

        let data = self.read_dmem(regs.addressing[s]);
        self.regs.set_saturate(Reg::new(0x18 + d), data);
        self.ext_step(regs, s, step);
    }

    /// `S`/`SN`: stores `acS.l`/`acS.m` through `arD`.
    fn ext_store(&mut self, ins: Ins, regs: &Registers, step: Step) {
        let d = ins.base.bits(0, 2) as usize;
        let s = ins.base.bits(3, 5) as u8;

        let data = regs.get(Reg::new(0x1C + s));
        self.write_dmem(regs.addressing[d], data);
        self.ext_step(regs, d, step);
    }

    /// `LD` family: loads two `ax` halves through `arS` and `ar3`.
    fn ext_dual_load(&mut self, ins: Ins, regs: &Registers, step_s: Step, step_3: Step) {
        let s = ins.base.bits(0, 2) as usize;
        let r = ins.base.bit(4);
        let d = ins.base.bit(5);

        if s == 3 {
            // LDAX: both halves of a single axR
            let s = d as usize;
            let r = r as usize;

            let high = self.read_dmem(regs.addressing[s]);
            let low = self.read_dmem(paired_addr(regs, s));
            self.regs.acc32[r] = (((high as u32) << 16) | low as u32) as i32;

            self.ext_step(regs, s, step_s);
            self.ext_step(regs, 3, step_3);
            return;
        }

        let d = if d { Reg::Acc32High0 } else { Reg::Acc32Low0 };
        let data = self.read_dmem(regs.addressing[s]);
        self.regs.set_saturate(d, data);

        let r = if r { Reg::Acc32High1 } else { Reg::Acc32Low1 };
        let data = self.read_dmem(paired_addr(regs, s));
        self.regs.set_saturate(r, data);

        self.ext_step(regs, s, step_s);
        self.ext_step(regs, 3, step_3);
    }

    /// `LS` family: loads through `ar0` and stores `acS.m` through `ar3`.
    fn ext_load_store(&mut self, ins: Ins, regs: &Registers, step_0: Step, step_3: Step) {
        let s = ins.base.bit(0) as usize;
        let d = ins.base.bits(4, 6) as u8;

        let data = self.read_dmem(regs.addressing[0]);
        self.regs.set(Reg::new(0x18 + d), data);
        self.write_dmem(regs.addressing[3], regs.acc40[s].mid);

        self.ext_step(regs, 0, step_0);
        self.ext_step(regs, 3, step_3);
    }

    /// `SL` family: stores `acS.m` through `ar0` and loads through `ar3`.
    fn ext_store_load(&mut self, ins: Ins, regs: &Registers, step_0: Step, step_3: Step) {
        let s = ins.base.bit(0) as usize;
        let d = ins.base.bits(4, 6) as u8;

        self.write_dmem(regs.addressing[0], regs.acc40[s].mid);
        let data = self.read_dmem(regs.addressing[3]);
        self.regs.set(Reg::new(0x18 + d), data);

        self.ext_step(regs, 0, step_0);
        self.ext_step(regs, 3, step_3);
    }
}

/// Executes the packed extension op of `ins`. `previous` holds the registers as they were
/// before the primary op executed.
pub(crate) fn exec_extension(
    core: &mut Core,
    extension: ExtensionOpcode,
    ins: Ins,
    previous: &Registers,
) {
    use ExtensionOpcode as Ext;
    use Step::{Index, One};

    match extension {
        Ext::Nop => (),
        Ext::Dr => core.ext_dr(ins, previous),
        Ext::Ir => core.ext_ir(ins, previous),
        Ext::Nr => core.ext_nr(ins, previous),
        Ext::Mv => core.ext_mv(ins, previous),
        Ext::S => core.ext_store(ins, previous, One),
        Ext::Sn => core.ext_store(ins, previous, Index),
        Ext::L => core.ext_load(ins, previous, One),
        Ext::Ln => core.ext_load(ins, previous, Index),
        Ext::Ls => core.ext_load_store(ins, previous, One, One),
        Ext::Lsn => core.ext_load_store(ins, previous, Index, One),
        Ext::Lsm => core.ext_load_store(ins, previous, One, Index),
        Ext::Lsnm => core.ext_load_store(ins, previous, Index, Index),
        Ext::Sl => core.ext_store_load(ins, previous, One, One),
        Ext::Sln => core.ext_store_load(ins, previous, Index, One),
        Ext::Slm => core.ext_store_load(ins, previous, One, Index),
        Ext::Slnm => core.ext_store_load(ins, previous, Index, Index),
        Ext::Ld => core.ext_dual_load(ins, previous, One, One),
        Ext::Ldn => core.ext_dual_load(ins, previous, Index, One),
        Ext::Ldm => core.ext_dual_load(ins, previous, One, Index),
        Ext::Ldnm => core.ext_dual_load(ins, previous, Index, Index),
        Ext::Illegal => warn!(
            "illegal extension opcode in 0x{:04X}, ignored",
            ins.base
        ),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        config::{Config, Roms},
        ifx::Ram,
    };
    use std::sync::Arc;

    fn core_with(program: &[u16]) -> Core {
        let mut core = Core::new(
            Config::default(),
            &Roms::default(),
            Arc::new(Ram::new(0x1000)),
        );

        core.mem.iram[..program.len()].copy_from_slice(program);
        core.regs.pc = 0;
        core
    }

    fn run(core: &mut Core) {
        for _ in 0..1000 {
            core.step().unwrap();
            if core.is_halted() {
                return;
            }
        }

        panic!("program did not halt");
    }

    const HALT: u16 = 0x0021;

    #[test]
    fn addressing_wraps_at_limit() {
        // lm = 0x000F: ar wraps inside a 16 slot window
        assert_eq!(add_to_addr_reg(0x100F, 0x000F, 1), 0x1000);
        assert_eq!(sub_from_addr_reg(0x1000, 0x000F, 1), 0x100F);
        assert_eq!(add_to_addr_reg(0x1004, 0x000F, -8), 0x100C);
        // subtracting a negative step moves forward
        assert_eq!(sub_from_addr_reg(0x100E, 0x000F, -4), 0x1002);
        assert_eq!(sub_from_addr_reg(0x1002, 0x000F, 4), 0x100E);
        // the default limit never wraps
        assert_eq!(add_to_addr_reg(0xFFFF, 0xFFFF, 1), 0x0000);
        assert_eq!(add_to_addr_reg(0x1234, 0xFFFF, 0x10), 0x1244);
    }

    #[test]
    fn rounding() {
        assert_eq!(round_40(0x0000_7FFF), 0);
        assert_eq!(round_40(0x0000_8000), 0);
        assert_eq!(round_40(0x0001_8000), 0x0002_0000);
        assert_eq!(round_40(0x0000_8001), 0x0001_0000);
    }

    #[test]
    fn add_above_s32() {
        // add $ac0, $ac1
        let mut core = core_with(&[0x4C00, HALT]);
        core.regs.acc40[0].set(0x7FFF_FFFF);
        core.regs.acc40[1].set(1);
        run(&mut core);

        assert_eq!(core.regs.acc40[0].get(), 0x8000_0000);
        assert!(core.regs.status.above_s32());
        assert!(!core.regs.status.overflow());
        assert!(!core.regs.status.sign());
    }

    #[test]
    fn logic_flags_use_mid() {
        // lri $ac0.m, 0x00F0 ; andi $ac0.m, 0x0F00
        let mut core = core_with(&[0x009E, 0x00F0, 0x0240, 0x0F00, HALT]);
        run(&mut core);

        assert_eq!(core.regs.acc40[0].mid, 0);
        assert!(core.regs.status.arithmetic_zero());
        assert!(!core.regs.status.carry());
    }

    #[test]
    fn multiply_doubles_unless_m0() {
        let mut core = core_with(&[0x9000, 0x8B00, 0x9000, HALT]);
        // ax0.l = 3, ax0.h = -2
        core.regs.acc32[0] = ((-2i32) << 16) | 3;

        core.step().unwrap();
        assert_eq!(core.regs.product.value(), -12);

        core.step().unwrap();
        core.step().unwrap();
        assert_eq!(core.regs.product.value(), -6);
    }

    #[test]
    fn multiply_does_not_overflow() {
        // mulaxh: ax0.h * ax0.h, doubled
        let mut core = core_with(&[0x8300, HALT]);
        core.regs.acc32[0] = i16::MIN as i32 * 0x10000;
        run(&mut core);

        assert_eq!(core.regs.product.value(), 1 << 31);
    }

    #[test]
    fn extension_sees_previous_registers() {
        // clr $ac0 : 'mv $ax0.l, $ac0.l
        let mut core = core_with(&[0x8110, HALT]);
        core.regs.acc40[0].low = 0x1234;
        run(&mut core);

        assert_eq!(core.regs.acc40[0].get(), 0);
        assert_eq!(core.regs.get(Reg::Acc32Low0), 0x1234);
    }

    #[test]
    fn extension_load_increments() {
        // nx : 'l $ax0.h, @$ar0
        let mut core = core_with(&[0x8050, HALT]);
        core.mem.dram[0x10] = 0xBEEF;
        core.regs.addressing[0] = 0x10;
        run(&mut core);

        assert_eq!(core.regs.get(Reg::Acc32High0), 0xBEEF);
        assert_eq!(core.regs.addressing[0], 0x11);
    }

    #[test]
    fn call_and_return() {
        // call 0x0004 ; halt ; nop ; inc $ac0 ; ret
        let mut core = core_with(&[0x02BF, 0x0004, HALT, 0x0000, 0x7600, 0x02DF]);
        run(&mut core);

        assert_eq!(core.regs.acc40[0].get(), 1);
        assert!(core.regs.call_stack.is_empty());
        assert_eq!(core.pc(), 0x0003);
    }

    #[test]
    fn conditional_skip_respects_length() {
        // clr $ac0 ; ifnz ; lri $ac1.m, 0x1234 ; halt
        let mut core = core_with(&[0x8100, 0x0274, 0x009F, 0x1234, HALT]);
        run(&mut core);

        assert_eq!(core.regs.acc40[1].mid, 0);
    }

    #[test]
    fn repeat_loop() {
        // loopi 5 ; inc $ac0 ; halt
        let mut core = core_with(&[0x1005, 0x7600, HALT]);
        run(&mut core);

        assert_eq!(core.regs.acc40[0].get(), 5);
        assert!(!core.is_repeating());
    }

    #[test]
    fn repeat_zero_skips() {
        // loopi 0 ; inc $ac0 ; halt
        let mut core = core_with(&[0x1000, 0x7600, HALT]);
        run(&mut core);

        assert_eq!(core.regs.acc40[0].get(), 0);
    }

    #[test]
    fn block_loop() {
        // bloopi 3, 0x0003 ; inc $ac0 ; inc $ac1 ; halt
        let mut core = core_with(&[0x1103, 0x0003, 0x7600, 0x7700, HALT]);
        run(&mut core);

        assert_eq!(core.regs.acc40[0].get(), 3);
        assert_eq!(core.regs.acc40[1].get(), 3);
        assert!(core.regs.loop_stack.is_empty());
        assert!(core.regs.call_stack.is_empty());
        assert!(core.regs.loop_count.is_empty());
    }

    #[test]
    fn block_loop_zero_skips_body() {
        // bloopi 0, 0x0003 ; inc $ac0 ; inc $ac1 ; halt
        let mut core = core_with(&[0x1100, 0x0003, 0x7600, 0x7700, HALT]);
        run(&mut core);

        assert_eq!(core.regs.acc40[0].get(), 0);
        assert_eq!(core.regs.acc40[1].get(), 0);
    }

    #[test]
    fn short_store_uses_bank() {
        // lri $ac0.m, 0x5678 ; srs @0x20, $ac0.m ; halt
        let mut core = core_with(&[0x009E, 0x5678, 0x2E20, HALT]);
        core.regs.bank = 0x01;
        run(&mut core);

        assert_eq!(core.mem.dram[0x0120], 0x5678);
    }

    #[test]
    fn status_bit_ops() {
        // sbset #5 (bit 11) ; sbset #2 (bit 8) ; halt
        let mut core = core_with(&[0x1305, 0x1302, HALT]);
        run(&mut core);

        assert!(core.regs.status.external_interrupt_enable());
        assert!(!core.regs.status.hardwired_zero());
    }
}
