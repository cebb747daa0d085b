use std::path::PathBuf;

/// DSP emulation settings.
#[derive(Debug, Clone)]
pub struct Config {
    /// Host ticks which must elapse for each DSP instruction.
    pub ticks_per_instruction: u32,
    /// How many DSP instructions an external interrupt stays pending before being taken.
    pub interrupt_delay: u32,
    /// Whether breakpoints pause execution.
    pub breakpoints_enabled: bool,
    /// If set, ucode uploaded to IMEM through DMA is saved in this directory.
    pub ucode_dump_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ticks_per_instruction: 5,
            interrupt_delay: 2,
            breakpoints_enabled: true,
            ucode_dump_dir: None,
        }
    }
}

/// Boot ROM images, as big endian words.
#[derive(Debug, Clone, Default)]
pub struct Roms {
    pub irom: Option<Vec<u8>>,
    pub drom: Option<Vec<u8>>,
}
