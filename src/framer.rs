//! Bit/Byte Framer: protocol bits, bytes and commands on top of [`ControlLines`].
//!
//! DTR is the clock. A bit written by the host is the inverse of RTS while DTR
//! pulses low; a bit read from the console is the inverse of CTS sampled
//! while DTR is low. Bytes go most significant bit first.

use crate::error::{HardwareError, WeatherError};
use crate::memory_map::{self, Address};
use crate::serial_line::ControlLines;

/// Select an address; followed by the high and low address bytes.
pub const CMD_ADDRESS: u8 = 0xA0;

/// Start reading from the selected address.
pub const CMD_READ: u8 = 0xA1;

#[derive(Debug)]
pub struct Framer<L> {
    line: L,
}

impl<L: ControlLines> Framer<L> {
    pub fn new(line: L) -> Self {
        Self { line }
    }

    pub fn line(&self) -> &L {
        &self.line
    }

    pub fn line_mut(&mut self) -> &mut L {
        &mut self.line
    }

    pub fn into_inner(self) -> L {
        self.line
    }

    fn dtr(&mut self, level: bool) -> Result<(), HardwareError> {
        self.line.set_dtr(level)?;
        self.line.settle();
        Ok(())
    }

    fn rts(&mut self, level: bool) -> Result<(), HardwareError> {
        self.line.set_rts(level)?;
        self.line.settle();
        Ok(())
    }

    /// Sample CTS and let the level settle before the next transition.
    fn sample_cts(&mut self) -> Result<bool, HardwareError> {
        let level = self.line.cts()?;
        self.line.settle();
        Ok(level)
    }

    pub fn read_bit(&mut self) -> Result<u8, HardwareError> {
        self.dtr(false)?;
        let cts = self.sample_cts()?;
        self.dtr(true)?;
        Ok(u8::from(!cts))
    }

    pub fn write_bit(&mut self, bit: bool) -> Result<(), HardwareError> {
        self.rts(!bit)?;
        self.dtr(false)?;
        self.dtr(true)
    }

    pub fn read_byte(&mut self) -> Result<u8, HardwareError> {
        let mut value = 0u8;
        for _ in 0..8 {
            value = (value << 1) | self.read_bit()?;
        }
        log::trace!("Read byte 0x{:02X}", value);
        Ok(value)
    }

    /// Write one byte. With `verify`, returns whether the console acknowledged it.
    pub fn write_byte(&mut self, value: u8, verify: bool) -> Result<bool, HardwareError> {
        log::trace!("Write byte 0x{:02X}", value);
        for shift in (0..8).rev() {
            self.write_bit((value >> shift) & 1 == 1)?;
        }
        self.rts(false)?;

        if !verify {
            return Ok(true);
        }
        let ack = self.sample_cts()?;
        self.dtr(false)?;
        self.dtr(true)?;
        Ok(ack)
    }

    /// Select `address` for the next read or write.
    pub fn request(&mut self, address: Address) -> Result<bool, HardwareError> {
        Ok(self.send_command(CMD_ADDRESS, true)?
            && self.write_byte(address.high_byte(), true)?
            && self.write_byte(address.low_byte(), true)?)
    }

    /// Ask the console to present the following byte.
    pub fn request_next(&mut self) -> Result<(), HardwareError> {
        self.rts(true)?;
        self.dtr(false)?;
        self.dtr(true)?;
        self.rts(false)
    }

    pub fn start_sequence(&mut self) -> Result<(), HardwareError> {
        self.rts(false)?;
        self.dtr(false)
    }

    pub fn end_command(&mut self) -> Result<(), HardwareError> {
        self.rts(true)?;
        self.dtr(false)?;
        self.rts(false)
    }

    pub fn send_command(&mut self, command: u8, verify: bool) -> Result<bool, HardwareError> {
        self.dtr(false)?;
        self.rts(false)?;
        self.rts(true)?;
        self.dtr(true)?;
        self.rts(false)?;
        self.write_byte(command, verify)
    }

    /// Read `length` bytes starting at `address`.
    ///
    /// Returns an empty buffer when the console refuses the address or the
    /// read command. The range is checked before any line is touched.
    pub fn read_data(&mut self, address: Address, length: usize) -> Result<Vec<u8>, WeatherError> {
        memory_map::check_range(address.value().into(), length, memory_map::HISTORY_END)?;

        if !self.request(address)? || !self.send_command(CMD_READ, true)? {
            log::debug!("Console refused read request at {}", address);
            return Ok(Vec::new());
        }

        let mut data = Vec::with_capacity(length);
        data.push(self.read_byte()?);
        for _ in 1..length {
            self.request_next()?;
            data.push(self.read_byte()?);
        }
        self.end_command()?;

        Ok(data)
    }

    /// Write `data` starting at `address`. Returns the console's write-success flag.
    pub fn write_data(&mut self, address: Address, data: &[u8]) -> Result<bool, WeatherError> {
        memory_map::check_range(address.value().into(), data.len(), memory_map::HISTORY_END)?;

        self.start_sequence()?;
        if !self.request(address)? {
            log::debug!("Console refused write request at {}", address);
            return Ok(false);
        }
        for &byte in data {
            if !self.write_byte(byte, true)? {
                log::debug!("Console did not acknowledge byte 0x{:02X}", byte);
                return Ok(false);
            }
        }
        self.end_command()?;

        self.start_sequence()?;
        for _ in 0..3 {
            self.send_command(CMD_ADDRESS, false)?;
        }
        self.dtr(false)?;
        let written = self.line.cts()?;
        self.dtr(true)?;

        Ok(written)
    }
}
