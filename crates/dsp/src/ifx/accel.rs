//! The streaming sample accelerator.

use super::MainMemory;
use crate::core::Exception;
use bitos::BitUtils;
use strum::{FromRepr, IntoStaticStr};
use tracing::{trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr, IntoStaticStr)]
#[repr(u16)]
pub enum AccelFormat {
    /// 4-bit ADPCM, addressed in nibbles.
    Adpcm = 0x00,
    /// Unscaled bytes.
    RawByte = 0x05,
    /// Unscaled 16-bit words.
    RawUInt16 = 0x06,
    /// Signed 16-bit samples, addressed in words.
    Pcm16 = 0x0A,
    /// Signed 8-bit samples, addressed in bytes.
    Pcm8 = 0x19,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Accelerator {
    /// Raw format register. Unknown formats are kept so they read back.
    pub format: u16,
    pub coefs: [u16; 16],
    pub pred_scale: u16,
    pub yn1: u16,
    pub yn2: u16,
    pub gain: u16,
    pub start: u32,
    pub end: u32,
    pub current: u32,
    pub pending_overflow: Option<Exception>,
}

fn clamp_i16(value: i32) -> i16 {
    value.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

impl Accelerator {
    pub fn format(&self) -> Option<AccelFormat> {
        AccelFormat::from_repr(self.format)
    }

    pub fn set_start_hi(&mut self, value: u16) {
        self.start = self.start.with_bits(16, 32, value as u32);
    }

    pub fn set_start_lo(&mut self, value: u16) {
        self.start = self.start.with_bits(0, 16, value as u32);
    }

    pub fn set_end_hi(&mut self, value: u16) {
        self.end = self.end.with_bits(16, 32, value as u32);
    }

    pub fn set_end_lo(&mut self, value: u16) {
        self.end = self.end.with_bits(0, 16, value as u32);
    }

    pub fn set_current_hi(&mut self, value: u16) {
        self.current = self.current.with_bits(16, 32, value as u32);
    }

    pub fn set_current_lo(&mut self, value: u16) {
        self.current = self.current.with_bits(0, 16, value as u32);
    }

    /// Moves the current address by one unit. Passing the end address wraps back to the
    /// start and queues `overflow`.
    fn advance(&mut self, overflow: Exception) {
        if self.current == self.end {
            trace!("accelerator reached end address 0x{:08X}", self.end);
            self.pending_overflow = Some(overflow);
            self.current = self.start;
        } else {
            self.current = self.current.wrapping_add(1);
        }
    }

    /// Byte address in main memory of the current unit, given the unit size as a shift.
    fn byte_addr(&self, shift: i32) -> u32 {
        let addr = self.current.with_bit(31, false);
        if shift >= 0 { addr << shift } else { addr >> -shift }
    }

    fn push_history(&mut self, sample: i16) {
        self.yn2 = self.yn1;
        self.yn1 = sample as u16;
    }

    fn apply_gain(&self, sample: i16) -> i16 {
        clamp_i16((sample as i32 * self.gain as i32) >> 11)
    }

    fn decode_adpcm(&mut self, mem: &dyn MainMemory) -> i16 {
        // frame header
        if self.current % 16 == 0 {
            self.pred_scale = mem.read_u8(self.byte_addr(-1)) as u16;
            self.advance(Exception::AdpcmOverflow);
            self.advance(Exception::AdpcmOverflow);
        }

        let byte = mem.read_u8(self.byte_addr(-1));
        let nibble = if self.current.bit(0) { byte & 0xF } else { byte >> 4 };
        let nibble = (((nibble << 4) as i8) >> 4) as i32;
        self.advance(Exception::AdpcmOverflow);

        let scale = 1i32 << (self.pred_scale & 0xF);
        let index = ((self.pred_scale >> 4) & 7) as usize;
        let c1 = self.coefs[index * 2] as i16 as i32;
        let c2 = self.coefs[index * 2 + 1] as i16 as i32;
        let yn1 = self.yn1 as i16 as i32;
        let yn2 = self.yn2 as i16 as i32;

        let prediction = (0x400 + c1 * yn1 + c2 * yn2) >> 11;
        let sample = clamp_i16(scale * nibble + prediction);
        self.push_history(sample);

        sample
    }

    /// Reads the next decoded sample (ACDAT).
    pub fn read_sample(&mut self, mem: &dyn MainMemory) -> u16 {
        let Some(format) = self.format() else {
            warn!("accelerator read with unknown format 0x{:04X}", self.format);
            return 0;
        };

        let overflow = Exception::AdpcmOverflow;
        match format {
            AccelFormat::Adpcm => self.decode_adpcm(mem) as u16,
            AccelFormat::Pcm16 => {
                let sample = mem.read_u16(self.byte_addr(1)) as i16;
                self.advance(overflow);
                let sample = self.apply_gain(sample);
                self.push_history(sample);
                sample as u16
            }
            AccelFormat::Pcm8 => {
                let sample = ((mem.read_u8(self.byte_addr(0)) as i8) as i16) << 8;
                self.advance(overflow);
                let sample = self.apply_gain(sample);
                self.push_history(sample);
                sample as u16
            }
            AccelFormat::RawByte => {
                let value = mem.read_u8(self.byte_addr(0)) as u16;
                self.advance(overflow);
                value
            }
            AccelFormat::RawUInt16 => {
                let value = mem.read_u16(self.byte_addr(1));
                self.advance(overflow);
                value
            }
        }
    }

    /// Reads the word at the current address (ACDAT2).
    pub fn read_raw(&mut self, mem: &dyn MainMemory) -> u16 {
        let value = mem.read_u16(self.byte_addr(1));
        self.advance(Exception::AccelRawReadOverflow);
        value
    }

    /// Writes the word at the current address (ACDAT2).
    pub fn write_raw(&mut self, mem: &dyn MainMemory, value: u16) {
        mem.write_u16(self.byte_addr(1), value);
        self.advance(Exception::AccelRawWriteOverflow);
    }

    pub fn take_overflow(&mut self) -> Option<Exception> {
        self.pending_overflow.take()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ifx::Ram;

    fn ram(bytes: &[u8]) -> Ram {
        let mut data = bytes.to_vec();
        data.resize(0x100, 0);
        Ram::from_bytes(data)
    }

    #[test]
    fn pcm16_unity_gain() {
        let mem = ram(&[0x12, 0x34, 0xFF, 0xFE]);
        let mut accel = Accelerator {
            format: AccelFormat::Pcm16 as u16,
            gain: 0x0800,
            end: 0x10,
            ..Default::default()
        };

        assert_eq!(accel.read_sample(&mem), 0x1234);
        assert_eq!(accel.read_sample(&mem), 0xFFFE);
        assert_eq!(accel.current, 2);
        assert_eq!(accel.yn1, 0xFFFE);
        assert_eq!(accel.yn2, 0x1234);
    }

    #[test]
    fn pcm8_half_gain() {
        let mem = ram(&[0x40, 0x80]);
        let mut accel = Accelerator {
            format: AccelFormat::Pcm8 as u16,
            gain: 0x0400,
            end: 0x10,
            ..Default::default()
        };

        assert_eq!(accel.read_sample(&mem), 0x2000);
        assert_eq!(accel.read_sample(&mem) as i16, -0x4000);
    }

    #[test]
    fn adpcm_frame() {
        // header: predictor 0, scale 2^1; nibbles 1, -1
        let mem = ram(&[0x01, 0x1F]);
        let mut accel = Accelerator {
            format: AccelFormat::Adpcm as u16,
            end: 0x100,
            ..Default::default()
        };
        accel.coefs[0] = 0x0800;

        assert_eq!(accel.read_sample(&mem), 2);
        assert_eq!(accel.pred_scale, 0x01);
        assert_eq!(accel.current, 3);

        // 2 * -1 + ((0x400 + 0x800 * 2) >> 11) = 0
        assert_eq!(accel.read_sample(&mem), 0);
        assert_eq!(accel.yn2, 2);
        assert_eq!(accel.current, 4);
    }

    #[test]
    fn end_wraps_and_queues_overflow() {
        let mem = ram(&[0, 1, 0, 2, 0, 3]);
        let mut accel = Accelerator {
            start: 0,
            end: 1,
            ..Default::default()
        };

        assert_eq!(accel.read_raw(&mem), 1);
        assert_eq!(accel.take_overflow(), None);
        assert_eq!(accel.read_raw(&mem), 2);
        assert_eq!(accel.current, 0);
        assert_eq!(accel.take_overflow(), Some(Exception::AccelRawReadOverflow));

        accel.write_raw(&mem, 0xBEEF);
        accel.write_raw(&mem, 0xCAFE);
        assert_eq!(accel.take_overflow(), Some(Exception::AccelRawWriteOverflow));
        assert_eq!(mem.read_u16(0), 0xBEEF);
        assert_eq!(mem.read_u16(2), 0xCAFE);
    }

    #[test]
    fn unknown_format_reads_zero() {
        let mem = ram(&[0xFF; 4]);
        let mut accel = Accelerator {
            format: 0x1234,
            ..Default::default()
        };

        assert_eq!(accel.read_sample(&mem), 0);
        assert_eq!(accel.current, 0);
    }
}
