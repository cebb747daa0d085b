//! One-message-deep mailboxes between the host CPU and the DSP.

use std::sync::Mutex;
use tracing::{debug, trace, warn};

/// Ready bit, in the high word.
pub const READY: u16 = 0x8000;

/// A mailbox register pair. The high word carries the ready bit. Each word has its own lock;
/// when both are needed, the low word lock is always taken first.
#[derive(Debug)]
pub struct Mailbox {
    name: &'static str,
    hi: Mutex<u16>,
    lo: Mutex<u16>,
}

impl Mailbox {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            hi: Mutex::new(0),
            lo: Mutex::new(0),
        }
    }

    /// Writes the high word. An unread message is discarded.
    pub fn write_hi(&self, value: u16) {
        let mut hi = self.hi.lock().unwrap();
        trace!("{} high word write 0x{value:04X}", self.name);

        if *hi & READY != 0 {
            warn!("{} message discarded", self.name);
        }

        *hi = value & !READY;
    }

    /// Writes the low word, which makes the message ready.
    pub fn write_lo(&self, value: u16) {
        let mut lo = self.lo.lock().unwrap();
        let mut hi = self.hi.lock().unwrap();

        *lo = value;
        *hi |= READY;

        debug!("{} message written: 0x{:04X}_{:04X}", self.name, *hi, *lo);
    }

    pub fn read_hi(&self) -> u16 {
        *self.hi.lock().unwrap()
    }

    /// Reads the low word. When read by the receiving side, the message is consumed and the
    /// ready bit cleared.
    pub fn read_lo(&self, by_receiver: bool) -> u16 {
        let lo = self.lo.lock().unwrap();
        if by_receiver {
            let mut hi = self.hi.lock().unwrap();
            if *hi & READY != 0 {
                debug!("{} message read: 0x{:04X}_{:04X}", self.name, *hi, *lo);
            }

            *hi &= !READY;
        }

        *lo
    }

    /// Whether an unread message is present.
    pub fn ready(&self) -> bool {
        self.read_hi() & READY != 0
    }

    /// The full message, without consuming it.
    pub fn peek(&self) -> u32 {
        let lo = self.lo.lock().unwrap();
        let hi = self.hi.lock().unwrap();
        ((*hi as u32) << 16) | *lo as u32
    }

    pub fn clear(&self) {
        let mut lo = self.lo.lock().unwrap();
        let mut hi = self.hi.lock().unwrap();
        *lo = 0;
        *hi = 0;
    }
}
