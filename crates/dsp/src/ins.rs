//! Instruction words and the opcode decoding tables.

mod opcodes;

pub use opcodes::{
    COND, CondCode, Def, EXTRA, ExtensionOpcode, FLOW, Field, LOGIC, MADD, Opcode, PACKED,
    PACKED7, Pattern, Traits,
};

use strum::VariantArray;

include!(concat!(env!("OUT_DIR"), "/dsp_tables.rs"));

/// A fetched instruction: the base word and, for opcodes which need it, the extra word that
/// follows it.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ins {
    pub base: u16,
    pub extra: u16,
}

impl std::fmt::Debug for Ins {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let decoded = self.decoded();
        match decoded.extension {
            Some(extension) => write!(
                f,
                "{}'{} ({:04X}:{:04X})",
                decoded.opcode.mnemonic(),
                extension.mnemonic(),
                self.base,
                self.extra
            ),
            None => write!(
                f,
                "{} ({:04X}:{:04X})",
                decoded.opcode.mnemonic(),
                self.base,
                self.extra
            ),
        }
    }
}

/// The shape of a base word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decoded {
    pub opcode: Opcode,
    pub extension: Option<ExtensionOpcode>,
    pub needs_extra: bool,
}

impl Decoded {
    /// Length of the instruction in slots.
    #[inline(always)]
    pub fn len(self) -> u16 {
        if self.needs_extra { 2 } else { 1 }
    }
}

impl Ins {
    #[inline(always)]
    pub fn new(base: u16) -> Self {
        Self { base, extra: 0 }
    }

    #[inline(always)]
    pub fn with_extra(base: u16, extra: u16) -> Self {
        Self { base, extra }
    }

    #[inline(always)]
    pub fn decoded(self) -> Decoded {
        let opcode = Opcode::VARIANTS[OPCODE_LUT[self.base as usize] as usize];
        let def = opcode.def();

        Decoded {
            opcode,
            extension: def.extension_mask().map(|mask| {
                ExtensionOpcode::VARIANTS[EXTENSION_LUT[(self.base & mask) as usize] as usize]
            }),
            needs_extra: def.has(EXTRA),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn tables_match_scan() {
        for base in (0..=u16::MAX).step_by(7) {
            let decoded = Ins::new(base).decoded();
            let opcode = Opcode::find_match(base);
            assert_eq!(decoded.opcode, opcode);
            assert_eq!(decoded.needs_extra, opcode.def().has(EXTRA));
            assert_eq!(
                decoded.extension.is_some(),
                opcode.def().has(PACKED | PACKED7)
            );
        }

        for low in 0..=0xFFu16 {
            let decoded = Ins::new(0x4C00 | low).decoded();
            assert_eq!(decoded.extension, Some(ExtensionOpcode::find_match(low)));
        }
    }

    #[test]
    fn extension_respects_mask() {
        // asrnr only exposes seven bits to the extension
        let decoded = Ins::new(0x3EFF).decoded();
        assert_eq!(decoded.opcode, Opcode::Asrnr);
        assert_eq!(
            decoded.extension,
            Some(ExtensionOpcode::find_match(0x7F))
        );
        assert_eq!(decoded.extension, Some(ExtensionOpcode::Ln));
    }

    #[test]
    fn debug_names_both_halves() {
        assert_eq!(
            format!("{:?}", Ins::new(0x4C40)),
            "add'l (4C40:0000)"
        );
        assert_eq!(
            format!("{:?}", Ins::with_extra(0x0080, 0x1234)),
            "lri (0080:1234)"
        );
    }
}
