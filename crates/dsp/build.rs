//! Generates the decoding tables from the instruction set rows: the opcode index of every
//! base word, and the extension opcode index of every packed low byte.

#[path = "src/ins/opcodes.rs"]
#[allow(dead_code)]
mod opcodes;

use opcodes::{ExtensionOpcode, Opcode};
use std::{fmt::Write as _, path::PathBuf};

fn table(name: &str, entries: impl ExactSizeIterator<Item = u8>) -> String {
    let mut out = format!("static {name}: [u8; {}] = [", entries.len());
    for (i, entry) in entries.enumerate() {
        if i % 32 == 0 {
            out.push_str("\n    ");
        }

        write!(out, "{entry},").expect("writing to a string");
    }

    out.push_str("\n];\n");
    out
}

fn main() -> std::io::Result<()> {
    println!("cargo::rerun-if-changed=src/ins/opcodes.rs");

    let opcodes = table(
        "OPCODE_LUT",
        (0..=u16::MAX).map(|word| Opcode::find_match(word) as u8),
    );
    let extensions = table(
        "EXTENSION_LUT",
        (0..=0xFFu16).map(|low| ExtensionOpcode::find_match(low) as u8),
    );

    let out_dir = std::env::var_os("OUT_DIR").expect("cargo sets OUT_DIR");
    let path = PathBuf::from(out_dir).join("dsp_tables.rs");
    std::fs::write(path, opcodes + &extensions)
}
