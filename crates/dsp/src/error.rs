use easyerr::Error;

/// A condition which stops emulation. Faults are detected mid instruction, recorded on the
/// core and reported once the instruction completes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Fault {
    #[error("unmapped DMEM read at 0x{addr:04X}")]
    UnmappedRead { addr: u16 },
    #[error("unmapped DMEM write of 0x{value:04X} at 0x{addr:04X}")]
    UnmappedWrite { addr: u16, value: u16 },
    #[error("unmapped IMEM fetch at 0x{addr:04X}")]
    UnmappedFetch { addr: u16 },
    #[error("unknown hardware register read at 0x{addr:04X}")]
    UnknownHwRead { addr: u16 },
    #[error("unknown hardware register write of 0x{value:04X} at 0x{addr:04X}")]
    UnknownHwWrite { addr: u16, value: u16 },
    #[error("invalid DMA address 0x{addr:04X} (length 0x{len:04X}, imem: {imem})")]
    InvalidDmaAddress { addr: u16, len: u16, imem: bool },
    #[error("write of 0x{value:04X} to mailbox register 0x{addr:04X} from the wrong side")]
    MailboxDirection { addr: u16, value: u16 },
}

/// A ROM image which could not be loaded. The region is left zero filled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("{region} image has 0x{actual:X} bytes, expected 0x{expected:X}")]
    SizeMismatch {
        region: &'static str,
        expected: usize,
        actual: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("instruction needs {needed} bytes but only {available} are available")]
    Truncated { needed: usize, available: usize },
    #[error("illegal instruction word 0x{word:04X}")]
    Illegal { word: u16 },
}

#[derive(Debug, Error)]
pub enum StepError {
    #[error("the DSP thread is running")]
    Running,
    #[error(transparent)]
    Fault { source: Fault },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DebugError {
    #[error("unknown register {name:?}")]
    UnknownRegister { name: String },
}
