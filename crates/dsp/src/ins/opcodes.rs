//! The instruction set. Every opcode is one row of a table giving its encoding, mnemonic,
//! traits and operand layout. The build script reads the same rows to generate the decoding
//! tables.

use strum::VariantArray;

/// Conditions tested by `IFcc`, `Jcc`, `JRcc`, `CALLcc`, `CALLRcc`, `RETcc` and `RTIcc`,
/// in encoding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, VariantArray)]
pub enum CondCode {
    GreaterOrEqual,
    Less,
    Greater,
    LessOrEqual,
    NotZero,
    Zero,
    NotCarry,
    Carry,
    BelowS32,
    AboveS32,
    WeirdA,
    WeirdB,
    NotLogicZero,
    LogicZero,
    Overflow,
    Always,
}

const COND_SUFFIXES: [&str; 16] = [
    "ge", "l", "g", "le", "nz", "z", "nc", "c", "x8", "x9", "xa", "xb", "lnz", "lz", "o", "",
];

impl CondCode {
    /// The condition in the low nibble of `nibble`.
    #[inline(always)]
    pub fn new(nibble: u8) -> Self {
        Self::VARIANTS[(nibble & 0xF) as usize]
    }

    /// Suffix appended to the mnemonic of a conditional instruction.
    pub fn suffix(self) -> &'static str {
        COND_SUFFIXES[self as usize]
    }
}

/// A 16-bit encoding such as `"0000_0010_1001_xxxx"`. `0` and `1` bits must match, `x` bits
/// are free and `_` is a separator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pattern {
    pub care: u16,
    pub value: u16,
}

impl Pattern {
    /// Matches no word.
    pub const NEVER: Self = Self { care: 0, value: 1 };

    pub const fn new(text: &str) -> Self {
        let text = text.as_bytes();
        let mut care = 0u16;
        let mut value = 0u16;
        let mut width = 0;

        let mut i = 0;
        while i < text.len() {
            let (c, v) = match text[i] {
                b'0' => (1, 0),
                b'1' => (1, 1),
                b'x' => (0, 0),
                b'_' => {
                    i += 1;
                    continue;
                }
                _ => panic!("patterns only contain 0, 1, x and _"),
            };

            care = (care << 1) | c;
            value = (value << 1) | v;
            width += 1;
            i += 1;
        }

        assert!(width == 16, "patterns are 16 bits wide");
        Self { care, value }
    }

    #[inline(always)]
    pub const fn matches(self, word: u16) -> bool {
        word & self.care == self.value
    }
}

/// Where an operand lives in an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    /// Register `base + stride * bits[at..at + len]`.
    Reg { at: u8, len: u8, base: u8, stride: u8 },
    /// Mid slice of the accumulator not selected by bit `at`.
    OtherMid { at: u8 },
    Acc { at: u8 },
    /// The accumulator not selected by bit `at`.
    OtherAcc { at: u8 },
    AccX { at: u8 },
    Prod,
    Indirect { at: u8, len: u8 },
    /// Low byte of the base word.
    Byte,
    SignedByte,
    /// 6-bit signed shift amount.
    Shift,
    /// Status bit index of `SBSET`/`SBCLR`.
    StatusBit,
    /// Hardware register in the low byte of the base word.
    IoAddress,
    Short,
    SignedShort,
    Address,
}

const fn reg(at: u8, len: u8, base: u8) -> Field {
    Field::Reg {
        at,
        len,
        base,
        stride: 1,
    }
}

/// One of a register pair interleaved with its sibling, such as `$ax0.l`/`$ax0.h`.
const fn paired(at: u8, base: u8) -> Field {
    Field::Reg {
        at,
        len: 1,
        base,
        stride: 2,
    }
}

const AR: Field = reg(0, 2, 0x00);
const IX: Field = reg(2, 2, 0x04);
const ANY: Field = reg(0, 5, 0x00);
const ANY_SRC: Field = reg(5, 5, 0x00);
const ACC: Field = Field::Acc { at: 8 };
const ACC_HI: Field = Field::Acc { at: 11 };
const MID: Field = reg(8, 1, 0x1E);
const OTHER_MID: Field = Field::OtherMid { at: 8 };
const AXL: Field = reg(11, 1, 0x18);
const AXH: Field = reg(11, 1, 0x1A);
const AXH_9: Field = reg(9, 1, 0x1A);
const AX: Field = Field::AccX { at: 9 };
const AXL_3: Field = reg(8, 3, 0x18);
const AT_AR: Field = Field::Indirect { at: 0, len: 2 };
const AT_AR_5: Field = Field::Indirect { at: 5, len: 2 };
const SHORT: Field = Field::Short;
const ADDR: Field = Field::Address;

/// Traits of an opcode, as a bit set.
pub type Traits = u8;

/// Followed by an extra word: an immediate or an address.
pub const EXTRA: Traits = 1 << 0;
/// The low nibble is a condition code.
pub const COND: Traits = 1 << 1;
/// Changes control flow: jumps, calls, returns, loops and halt.
pub const FLOW: Traits = 1 << 2;
/// Sets flags the way logic operations do.
pub const LOGIC: Traits = 1 << 3;
/// Accumulates into the product register.
pub const MADD: Traits = 1 << 4;
/// The low byte is a packed extension opcode.
pub const PACKED: Traits = 1 << 5;
/// Like [`PACKED`], but only the low seven bits are the extension.
pub const PACKED7: Traits = 1 << 6;

/// A row of the instruction set table.
#[derive(Debug, Clone, Copy)]
pub struct Def {
    pub pattern: Pattern,
    pub mnemonic: &'static str,
    pub traits: Traits,
    pub fields: &'static [Field],
}

impl Def {
    const ILLEGAL: Self = Self {
        pattern: Pattern::NEVER,
        mnemonic: "illegal",
        traits: 0,
        fields: &[],
    };

    #[inline(always)]
    pub fn has(&self, traits: Traits) -> bool {
        self.traits & traits != 0
    }

    /// The bits of the base word holding the packed extension opcode, if any.
    #[inline(always)]
    pub fn extension_mask(&self) -> Option<u16> {
        if self.has(PACKED7) {
            Some(0x7F)
        } else if self.has(PACKED) {
            Some(0xFF)
        } else {
            None
        }
    }
}

macro_rules! instruction_set {
    (
        $(#[$meta:meta])*
        enum $name:ident {
            $($variant:ident: $pattern:literal $mnemonic:literal $traits:expr, [$($field:expr),*];)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, VariantArray)]
        pub enum $name {
            $($variant,)*
            Illegal,
        }

        impl $name {
            /// One row per variant, in declaration order.
            pub const DEFS: &'static [Def] = &[
                $(
                    Def {
                        pattern: Pattern::new($pattern),
                        mnemonic: $mnemonic,
                        traits: $traits,
                        fields: &[$($field),*],
                    },
                )*
                Def::ILLEGAL,
            ];

            #[inline(always)]
            pub fn def(self) -> &'static Def {
                &Self::DEFS[self as usize]
            }

            pub fn mnemonic(self) -> &'static str {
                self.def().mnemonic
            }

            /// Scans the table for the row matching `word`. Decoding at runtime goes through
            /// the generated tables instead.
            pub fn find_match(word: u16) -> Self {
                Self::DEFS
                    .iter()
                    .position(|def| def.pattern.matches(word))
                    .map_or(Self::Illegal, |index| Self::VARIANTS[index])
            }
        }
    };
}

const FLOW_COND: Traits = FLOW | COND;
const FLOW_EXTRA: Traits = FLOW | EXTRA;
const FLOW_COND_EXTRA: Traits = FLOW | COND | EXTRA;
const LOGIC_EXTRA: Traits = LOGIC | EXTRA;
const LOGIC_PACKED: Traits = LOGIC | PACKED;
const LOGIC_PACKED7: Traits = LOGIC | PACKED7;
const MADD_PACKED: Traits = MADD | PACKED;

instruction_set! {
    /// Primary opcodes.
    enum Opcode {
        Nop:     "0000_0000_0000_0000" "nop"     0, [];
        Dar:     "0000_0000_0000_01xx" "dar"     0, [AR];
        Iar:     "0000_0000_0000_10xx" "iar"     0, [AR];
        Subarn:  "0000_0000_0000_11xx" "subarn"  0, [AR];
        Addarn:  "0000_0000_0001_xxxx" "addarn"  0, [AR, IX];
        Halt:    "0000_0000_0010_0001" "halt"    FLOW, [];
        Loop:    "0000_0000_010x_xxxx" "loop"    FLOW, [ANY];
        Bloop:   "0000_0000_011x_xxxx" "bloop"   FLOW_EXTRA, [ANY, ADDR];
        Lri:     "0000_0000_100x_xxxx" "lri"     EXTRA, [ANY, SHORT];
        Lr:      "0000_0000_110x_xxxx" "lr"      EXTRA, [ANY, ADDR];
        Sr:      "0000_0000_111x_xxxx" "sr"      EXTRA, [ADDR, ANY];

        If:      "0000_0010_0111_xxxx" "if"      FLOW_COND, [];
        Jmp:     "0000_0010_1001_xxxx" "j"       FLOW_COND_EXTRA, [ADDR];
        Call:    "0000_0010_1011_xxxx" "call"    FLOW_COND_EXTRA, [ADDR];
        Ret:     "0000_0010_1101_xxxx" "ret"     FLOW_COND, [];
        Rti:     "0000_0010_1111_xxxx" "rti"     FLOW_COND, [];

        Addi:    "0000_001x_0000_0000" "addi"    EXTRA, [ACC, Field::SignedShort];
        Xori:    "0000_001x_0010_0000" "xori"    LOGIC_EXTRA, [MID, SHORT];
        Andi:    "0000_001x_0100_0000" "andi"    LOGIC_EXTRA, [MID, SHORT];
        Ori:     "0000_001x_0110_0000" "ori"     LOGIC_EXTRA, [MID, SHORT];
        Cmpi:    "0000_001x_1000_0000" "cmpi"    EXTRA, [ACC, Field::SignedShort];
        Andf:    "0000_001x_1010_0000" "andf"    LOGIC_EXTRA, [MID, SHORT];
        Andcf:   "0000_001x_1100_0000" "andcf"   LOGIC_EXTRA, [MID, SHORT];
        Lsrn:    "0000_0010_1100_1010" "lsrn"    LOGIC, [];
        Asrn:    "0000_0010_1100_1011" "asrn"    LOGIC, [];

        Ilrr:    "0000_001x_0001_00xx" "ilrr"    0, [MID, AT_AR];
        Ilrrd:   "0000_001x_0001_01xx" "ilrrd"   0, [MID, AT_AR];
        Ilrri:   "0000_001x_0001_10xx" "ilrri"   0, [MID, AT_AR];
        Ilrrn:   "0000_001x_0001_11xx" "ilrrn"   0, [MID, AT_AR];

        Addis:   "0000_010x_xxxx_xxxx" "addis"   0, [ACC, Field::SignedByte];
        Cmpis:   "0000_011x_xxxx_xxxx" "cmpis"   0, [ACC, Field::SignedByte];
        Lris:    "0000_1xxx_xxxx_xxxx" "lris"    0, [AXL_3, Field::SignedByte];

        Loopi:   "0001_0000_xxxx_xxxx" "loopi"   FLOW, [Field::Byte];
        Bloopi:  "0001_0001_xxxx_xxxx" "bloopi"  FLOW_EXTRA, [Field::Byte, ADDR];
        Sbclr:   "0001_0010_xxxx_xxxx" "sbclr"   0, [Field::StatusBit];
        Sbset:   "0001_0011_xxxx_xxxx" "sbset"   0, [Field::StatusBit];

        Lsl:     "0001_010x_00xx_xxxx" "lsl"     LOGIC, [ACC, Field::Shift];
        Lsr:     "0001_010x_01xx_xxxx" "lsr"     LOGIC, [ACC, Field::Shift];
        Asl:     "0001_010x_10xx_xxxx" "asl"     LOGIC, [ACC, Field::Shift];
        Asr:     "0001_010x_11xx_xxxx" "asr"     LOGIC, [ACC, Field::Shift];
        Si:      "0001_0110_xxxx_xxxx" "si"      EXTRA, [Field::IoAddress, SHORT];
        Jr:      "0001_0111_xxx0_xxxx" "jr"      FLOW_COND, [reg(5, 3, 0x00)];
        Callr:   "0001_0111_xxx1_xxxx" "callr"   FLOW_COND, [reg(5, 3, 0x00)];

        Lrr:     "0001_1000_0xxx_xxxx" "lrr"     0, [ANY, AT_AR_5];
        Lrrd:    "0001_1000_1xxx_xxxx" "lrrd"    0, [ANY, AT_AR_5];
        Lrri:    "0001_1001_0xxx_xxxx" "lrri"    0, [ANY, AT_AR_5];
        Lrrn:    "0001_1001_1xxx_xxxx" "lrrn"    0, [ANY, AT_AR_5];
        Srr:     "0001_1010_0xxx_xxxx" "srr"     0, [AT_AR_5, ANY];
        Srrd:    "0001_1010_1xxx_xxxx" "srrd"    0, [AT_AR_5, ANY];
        Srri:    "0001_1011_0xxx_xxxx" "srri"    0, [AT_AR_5, ANY];
        Srrn:    "0001_1011_1xxx_xxxx" "srrn"    0, [AT_AR_5, ANY];
        Mrr:     "0001_11xx_xxxx_xxxx" "mrr"     0, [ANY_SRC, ANY];

        Lrs:     "0010_0xxx_xxxx_xxxx" "lrs"     0, [AXL_3, Field::Byte];
        Srsh:    "0010_100x_xxxx_xxxx" "srsh"    0, [Field::Byte, reg(8, 1, 0x10)];
        Srs:     "0010_11xx_xxxx_xxxx" "srs"     0, [Field::Byte, reg(8, 2, 0x1C)];

        Xorr:    "0011_00xx_0xxx_xxxx" "xorr"    LOGIC_PACKED, [MID, AXH_9];
        Andr:    "0011_01xx_0xxx_xxxx" "andr"    LOGIC_PACKED, [MID, AXH_9];
        Orr:     "0011_10xx_0xxx_xxxx" "orr"     LOGIC_PACKED, [MID, AXH_9];
        Andc:    "0011_110x_0xxx_xxxx" "andc"    LOGIC_PACKED, [MID, OTHER_MID];
        Orc:     "0011_111x_0xxx_xxxx" "orc"     LOGIC_PACKED, [MID, OTHER_MID];
        Xorc:    "0011_000x_1xxx_xxxx" "xorc"    LOGIC_PACKED, [MID, OTHER_MID];
        Not:     "0011_001x_1xxx_xxxx" "not"     LOGIC_PACKED, [MID];
        Lsrnrx:  "0011_01xx_1xxx_xxxx" "lsrnrx"  LOGIC_PACKED, [ACC, AXH_9];
        Asrnrx:  "0011_10xx_1xxx_xxxx" "asrnrx"  LOGIC_PACKED7, [ACC, AXH_9];
        Lsrnr:   "0011_110x_1xxx_xxxx" "lsrnr"   LOGIC_PACKED, [ACC, OTHER_MID];
        Asrnr:   "0011_111x_1xxx_xxxx" "asrnr"   LOGIC_PACKED7, [ACC, OTHER_MID];

        Addr:    "0100_0xxx_xxxx_xxxx" "addr"    PACKED, [ACC, reg(9, 2, 0x18)];
        Addax:   "0100_10xx_xxxx_xxxx" "addax"   PACKED, [ACC, AX];
        Add:     "0100_110x_xxxx_xxxx" "add"     PACKED, [ACC, Field::OtherAcc { at: 8 }];
        Addp:    "0100_111x_xxxx_xxxx" "addp"    PACKED, [ACC, Field::Prod];

        Subr:    "0101_0xxx_xxxx_xxxx" "subr"    PACKED, [ACC, reg(9, 2, 0x18)];
        Subax:   "0101_10xx_xxxx_xxxx" "subax"   PACKED, [ACC, AX];
        Sub:     "0101_110x_xxxx_xxxx" "sub"     PACKED, [ACC, Field::OtherAcc { at: 8 }];
        Subp:    "0101_111x_xxxx_xxxx" "subp"    PACKED, [ACC, Field::Prod];

        Movr:    "0110_0xxx_xxxx_xxxx" "movr"    PACKED, [ACC, reg(9, 2, 0x18)];
        Movax:   "0110_10xx_xxxx_xxxx" "movax"   PACKED, [ACC, AX];
        Mov:     "0110_110x_xxxx_xxxx" "mov"     PACKED, [ACC, Field::OtherAcc { at: 8 }];
        Movp:    "0110_111x_xxxx_xxxx" "movp"    PACKED, [ACC, Field::Prod];

        Addaxl:  "0111_00xx_xxxx_xxxx" "addaxl"  PACKED, [ACC, AX];
        Incm:    "0111_010x_xxxx_xxxx" "incm"    PACKED, [ACC];
        Inc:     "0111_011x_xxxx_xxxx" "inc"     PACKED, [ACC];
        Decm:    "0111_100x_xxxx_xxxx" "decm"    PACKED, [ACC];
        Dec:     "0111_101x_xxxx_xxxx" "dec"     PACKED, [ACC];
        Neg:     "0111_110x_xxxx_xxxx" "neg"     PACKED, [ACC];
        Movnp:   "0111_111x_xxxx_xxxx" "movnp"   PACKED, [ACC, Field::Prod];

        Nx:      "1000_x000_xxxx_xxxx" "nx"      PACKED, [];
        Clr:     "1000_x001_xxxx_xxxx" "clr"     PACKED, [ACC_HI];
        Cmp:     "1000_0010_xxxx_xxxx" "cmp"     PACKED, [];
        Mulaxh:  "1000_0011_xxxx_xxxx" "mulaxh"  PACKED, [];
        Clrp:    "1000_0100_xxxx_xxxx" "clrp"    PACKED, [];
        Tstprod: "1000_0101_xxxx_xxxx" "tstprod" PACKED, [];
        Tstaxh:  "1000_011x_xxxx_xxxx" "tstaxh"  PACKED, [reg(8, 1, 0x1A)];

        M2:      "1000_1010_xxxx_xxxx" "m2"      PACKED, [];
        M0:      "1000_1011_xxxx_xxxx" "m0"      PACKED, [];
        Clr15:   "1000_1100_xxxx_xxxx" "clr15"   PACKED, [];
        Set15:   "1000_1101_xxxx_xxxx" "set15"   PACKED, [];
        Set16:   "1000_1110_xxxx_xxxx" "set16"   PACKED, [];
        Set40:   "1000_1111_xxxx_xxxx" "set40"   PACKED, [];

        Mul:     "1001_x000_xxxx_xxxx" "mul"     PACKED, [AXL, AXH];
        Asr16:   "1001_x001_xxxx_xxxx" "asr16"   LOGIC_PACKED, [ACC_HI];
        Mulmvz:  "1001_x01x_xxxx_xxxx" "mulmvz"  PACKED, [AXL, AXH, ACC];
        Mulac:   "1001_x10x_xxxx_xxxx" "mulac"   MADD_PACKED, [AXL, AXH, ACC];
        Mulmv:   "1001_x11x_xxxx_xxxx" "mulmv"   PACKED, [AXL, AXH, ACC];

        Mulx:    "101x_x000_xxxx_xxxx" "mulx"    PACKED, [paired(12, 0x18), paired(11, 0x19)];
        Abs:     "1010_x001_xxxx_xxxx" "abs"     PACKED, [ACC_HI];
        Tst:     "1011_x001_xxxx_xxxx" "tst"     PACKED, [ACC_HI];
        Mulxmvz: "101x_x01x_xxxx_xxxx" "mulxmvz" PACKED, [paired(12, 0x18), paired(11, 0x19), ACC];
        Mulxac:  "101x_x10x_xxxx_xxxx" "mulxac"  MADD_PACKED, [paired(12, 0x18), paired(11, 0x19), ACC];
        Mulxmv:  "101x_x11x_xxxx_xxxx" "mulxmv"  PACKED, [paired(12, 0x18), paired(11, 0x19), ACC];

        Mulc:    "110x_x000_xxxx_xxxx" "mulc"    PACKED, [reg(12, 1, 0x1E), AXH];
        Cmpaxh:  "110x_x001_xxxx_xxxx" "cmpaxh"  PACKED, [ACC_HI, reg(12, 1, 0x1A)];
        Mulcmvz: "110x_x01x_xxxx_xxxx" "mulcmvz" PACKED, [reg(12, 1, 0x1E), AXH, ACC];
        Mulcac:  "110x_x10x_xxxx_xxxx" "mulcac"  MADD_PACKED, [reg(12, 1, 0x1E), AXH, ACC];
        Mulcmv:  "110x_x11x_xxxx_xxxx" "mulcmv"  PACKED, [reg(12, 1, 0x1E), AXH, ACC];

        Maddx:   "1110_00xx_xxxx_xxxx" "maddx"   MADD_PACKED, [paired(9, 0x18), paired(8, 0x19)];
        Msubx:   "1110_01xx_xxxx_xxxx" "msubx"   MADD_PACKED, [paired(9, 0x18), paired(8, 0x19)];
        Maddc:   "1110_10xx_xxxx_xxxx" "maddc"   MADD_PACKED, [reg(9, 1, 0x1E), reg(8, 1, 0x1A)];
        Msubc:   "1110_11xx_xxxx_xxxx" "msubc"   MADD_PACKED, [reg(9, 1, 0x1E), reg(8, 1, 0x1A)];

        Lsl16:   "1111_000x_xxxx_xxxx" "lsl16"   LOGIC_PACKED, [ACC];
        Madd:    "1111_001x_xxxx_xxxx" "madd"    MADD_PACKED, [reg(8, 1, 0x18), reg(8, 1, 0x1A)];
        Lsr16:   "1111_010x_xxxx_xxxx" "lsr16"   LOGIC_PACKED, [ACC];
        Msub:    "1111_011x_xxxx_xxxx" "msub"    MADD_PACKED, [reg(8, 1, 0x18), reg(8, 1, 0x1A)];
        Addpaxz: "1111_10xx_xxxx_xxxx" "addpaxz" PACKED, [ACC, AX];
        Clrl:    "1111_110x_xxxx_xxxx" "clrl"    PACKED, [ACC];
        Movpz:   "1111_111x_xxxx_xxxx" "movpz"   PACKED, [ACC, Field::Prod];
    }
}

const LS_PAIR: [Field; 2] = [reg(4, 2, 0x18), reg(0, 1, 0x1E)];
const SL_PAIR: [Field; 2] = [reg(0, 1, 0x1E), reg(4, 2, 0x18)];

instruction_set! {
    /// Extension opcodes packed in the low byte of the arithmetic groups. The `ld` family
    /// loads `$ax0.l`/`$ax1.l` style pairs; selecting `$ar3` turns it into `ldax`, see the
    /// decoder.
    enum ExtensionOpcode {
        Nop:  "xxxx_xxxx_0000_00xx" "nop"  0, [];
        Dr:   "xxxx_xxxx_0000_01xx" "dr"   0, [AR];
        Ir:   "xxxx_xxxx_0000_10xx" "ir"   0, [AR];
        Nr:   "xxxx_xxxx_0000_11xx" "nr"   0, [AR];
        Mv:   "xxxx_xxxx_0001_xxxx" "mv"   0, [reg(2, 2, 0x18), reg(0, 2, 0x1C)];
        S:    "xxxx_xxxx_001x_x0xx" "s"    0, [AT_AR, reg(3, 2, 0x1C)];
        Sn:   "xxxx_xxxx_001x_x1xx" "sn"   0, [AT_AR, reg(3, 2, 0x1C)];
        L:    "xxxx_xxxx_01xx_x0xx" "l"    0, [reg(3, 3, 0x18), AT_AR];
        Ln:   "xxxx_xxxx_01xx_x1xx" "ln"   0, [reg(3, 3, 0x18), AT_AR];

        Ls:   "xxxx_xxxx_10xx_000x" "ls"   0, [LS_PAIR[0], LS_PAIR[1]];
        Sl:   "xxxx_xxxx_10xx_001x" "sl"   0, [SL_PAIR[0], SL_PAIR[1]];
        Lsn:  "xxxx_xxxx_10xx_010x" "lsn"  0, [LS_PAIR[0], LS_PAIR[1]];
        Sln:  "xxxx_xxxx_10xx_011x" "sln"  0, [SL_PAIR[0], SL_PAIR[1]];
        Lsm:  "xxxx_xxxx_10xx_100x" "lsm"  0, [LS_PAIR[0], LS_PAIR[1]];
        Slm:  "xxxx_xxxx_10xx_101x" "slm"  0, [SL_PAIR[0], SL_PAIR[1]];
        Lsnm: "xxxx_xxxx_10xx_110x" "lsnm" 0, [LS_PAIR[0], LS_PAIR[1]];
        Slnm: "xxxx_xxxx_10xx_111x" "slnm" 0, [SL_PAIR[0], SL_PAIR[1]];

        Ld:   "xxxx_xxxx_11xx_00xx" "ld"   0, [paired(5, 0x18), paired(4, 0x19), AT_AR];
        Ldn:  "xxxx_xxxx_11xx_01xx" "ldn"  0, [paired(5, 0x18), paired(4, 0x19), AT_AR];
        Ldm:  "xxxx_xxxx_11xx_10xx" "ldm"  0, [paired(5, 0x18), paired(4, 0x19), AT_AR];
        Ldnm: "xxxx_xxxx_11xx_11xx" "ldnm" 0, [paired(5, 0x18), paired(4, 0x19), AT_AR];
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pattern_text() {
        let pattern = Pattern::new("0000_0010_1001_xxxx");
        assert_eq!(pattern.care, 0xFFF0);
        assert_eq!(pattern.value, 0x0290);
        assert!(pattern.matches(0x029F));
        assert!(!pattern.matches(0x02BF));
        assert!((0..=u16::MAX).all(|word| !Pattern::NEVER.matches(word)));
    }

    fn overlaps(defs: &[Def], word: u16) -> Vec<&'static str> {
        defs.iter()
            .filter(|def| def.pattern.matches(word))
            .map(|def| def.mnemonic)
            .collect()
    }

    #[test]
    fn rows_do_not_overlap() {
        for word in 0..=u16::MAX {
            let hits = overlaps(Opcode::DEFS, word);
            assert!(hits.len() <= 1, "{word:016b} matches {hits:?}");
        }

        for low in 0..=0xFFu16 {
            let hits = overlaps(ExtensionOpcode::DEFS, low);
            assert_eq!(hits.len(), 1, "{low:08b} matches {hits:?}");
        }
    }

    #[test]
    fn rows_line_up_with_variants() {
        assert_eq!(Opcode::DEFS.len(), Opcode::VARIANTS.len());
        assert_eq!(ExtensionOpcode::DEFS.len(), ExtensionOpcode::VARIANTS.len());
        assert_eq!(Opcode::Illegal.mnemonic(), "illegal");
        assert_eq!(Opcode::Mulxmvz.mnemonic(), "mulxmvz");
        assert_eq!(ExtensionOpcode::Lsnm.mnemonic(), "lsnm");
    }

    #[test]
    fn packed_rows_are_the_high_groups() {
        for word in 0..=u16::MAX {
            let opcode = Opcode::find_match(word);
            if opcode == Opcode::Illegal {
                continue;
            }

            let packed = opcode.def().extension_mask().is_some();
            assert_eq!(packed, word >= 0x3000, "{opcode:?} at {word:04X}");
        }
    }

    #[test]
    fn conditions() {
        assert_eq!(CondCode::new(0x5), CondCode::Zero);
        assert_eq!(CondCode::new(0xF).suffix(), "");
        assert_eq!(CondCode::new(0x1C).suffix(), "lnz");
    }
}
