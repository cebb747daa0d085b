//! An emulator of the GameCube DSP: its instruction set, memories, hardware register block
//! and an execution thread paced by the host.

mod exec;

pub mod config;
pub mod core;
pub mod debug;
pub mod decode;
pub mod error;
pub mod ifx;
pub mod ins;
pub mod mem;
pub mod regs;
pub mod sched;

pub use config::{Config, Roms};
pub use crate::core::{Core, Exception};
pub use debug::Debugger;
pub use decode::{DecodedInstruction, Operand, decode, disassemble};
pub use error::{DebugError, DecodeError, Fault, LoadError, StepError};
pub use ifx::{Ifx, MainMemory, Ram};
pub use ins::Ins;
pub use regs::{Reg, Registers};
pub use sched::{Clock, Dsp};
