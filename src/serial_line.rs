//! Line Controller: raw control of the modem-control signals of one serial port.
//!
//! The WS8610 does not talk over the UART. The host drives DTR and RTS and
//! the console answers on CTS and DSR; everything above this module is built
//! from those four lines plus a fixed settle delay.

use crate::config::LineConfig;
use crate::error::HardwareError;
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, SerialPortBuilder, StopBits};
use std::io::{self, Read, Write};
use std::thread;
use std::time::Duration;

/// The line-level primitives the protocol is built from.
///
/// Implemented by [`SerialLine`] for real hardware and by the simulator for
/// tests. Every transition issued through this trait must be followed by
/// [`ControlLines::settle`] before the next one is issued or observed.
pub trait ControlLines {
    fn set_dtr(&mut self, level: bool) -> Result<(), HardwareError>;

    fn set_rts(&mut self, level: bool) -> Result<(), HardwareError>;

    /// Sample Clear To Send.
    fn cts(&mut self) -> Result<bool, HardwareError>;

    /// Sample Data Set Ready.
    fn dsr(&mut self) -> Result<bool, HardwareError>;

    /// Block for the time the hardware needs to latch a transition.
    fn settle(&mut self);

    /// Read exactly `length` bytes from the UART. Kept as a pass-through; the
    /// handshake only writes.
    fn read_raw(&mut self, length: usize) -> Result<Vec<u8>, HardwareError>;

    /// Write bytes through the UART.
    fn write_raw(&mut self, data: &[u8]) -> Result<(), HardwareError>;

    /// Coarse sleep used while polling during the handshake.
    fn pause(&mut self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Exclusive handle on a physical serial port.
pub struct SerialLine {
    serial: Box<dyn SerialPort>,
    path: String,
    settle_delay: Duration,
}

impl SerialLine {
    /// Open and lock the serial device at `path`.
    pub fn open(path: &str, config: &LineConfig) -> Result<Self, HardwareError> {
        log::debug!("Opening serial device {} at {} baud", path, config.baud_rate);

        let builder = serialport::new(path, config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(config.read_timeout);

        let serial = Self::open_exclusive(builder, path)?;

        let mut line = Self {
            serial,
            path: path.to_string(),
            settle_delay: config.settle_delay,
        };
        line.flush()?;
        Ok(line)
    }

    /// serialport reports a device held by another session (TIOCEXCL, flock,
    /// busy COM port) as `NoDevice`; anything else is a failure to open.
    fn open_error(path: &str, source: serialport::Error) -> HardwareError {
        let path = path.to_string();
        match source.kind() {
            serialport::ErrorKind::NoDevice => HardwareError::Lock { path, source },
            _ => HardwareError::Open { path, source },
        }
    }

    // open_native takes TIOCEXCL and an exclusive flock on the descriptor
    #[cfg(unix)]
    fn open_exclusive(
        builder: SerialPortBuilder,
        path: &str,
    ) -> Result<Box<dyn SerialPort>, HardwareError> {
        let port = builder
            .open_native()
            .map_err(|source| Self::open_error(path, source))?;
        Ok(Box::new(port))
    }

    // COM ports cannot be opened twice on Windows
    #[cfg(not(unix))]
    fn open_exclusive(
        builder: SerialPortBuilder,
        path: &str,
    ) -> Result<Box<dyn SerialPort>, HardwareError> {
        builder
            .open()
            .map_err(|source| Self::open_error(path, source))
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Flush both serial buffers
    fn flush(&mut self) -> Result<(), HardwareError> {
        self.serial.clear(ClearBuffer::All)?;
        Ok(())
    }
}

impl ControlLines for SerialLine {
    fn set_dtr(&mut self, level: bool) -> Result<(), HardwareError> {
        self.serial.write_data_terminal_ready(level)?;
        Ok(())
    }

    fn set_rts(&mut self, level: bool) -> Result<(), HardwareError> {
        self.serial.write_request_to_send(level)?;
        Ok(())
    }

    fn cts(&mut self) -> Result<bool, HardwareError> {
        Ok(self.serial.read_clear_to_send()?)
    }

    fn dsr(&mut self) -> Result<bool, HardwareError> {
        Ok(self.serial.read_data_set_ready()?)
    }

    fn settle(&mut self) {
        thread::sleep(self.settle_delay);
    }

    fn read_raw(&mut self, length: usize) -> Result<Vec<u8>, HardwareError> {
        let mut data = vec![0u8; length];
        let mut filled = 0;

        while filled < length {
            match self.serial.read(&mut data[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::TimedOut => break,
                Err(e) => return Err(e.into()),
            }
        }

        if filled != length {
            return Err(HardwareError::ShortRead {
                expected: length,
                actual: filled,
            });
        }
        Ok(data)
    }

    fn write_raw(&mut self, data: &[u8]) -> Result<(), HardwareError> {
        self.serial.write_all(data)?;
        self.serial.flush()?;
        Ok(())
    }
}

impl Drop for SerialLine {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            log::warn!("Failed to flush {} on close: {}", self.path, e);
        }
    }
}

impl std::fmt::Debug for SerialLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialLine")
            .field("path", &self.path)
            .field("settle_delay", &self.settle_delay)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_device() {
        let err = SerialLine::open("/dev/nonexistent_ws8610_port", &LineConfig::default()).err();

        assert!(matches!(
            err,
            Some(HardwareError::Open { ref path, .. }) if path.contains("nonexistent")
        ));
    }

    #[cfg(unix)]
    fn pty_config() -> LineConfig {
        LineConfig {
            read_timeout: Duration::from_millis(100),
            ..LineConfig::default()
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_second_session_is_locked_out() {
        let (_master, slave) = serialport::TTYPort::pair().unwrap();
        let path = slave.name().unwrap();

        let first = SerialLine::open(&path, &pty_config()).unwrap();
        let err = SerialLine::open(&path, &pty_config()).err();
        assert!(matches!(
            err,
            Some(HardwareError::Lock { path: ref p, .. }) if *p == path
        ));

        drop(first);
        assert!(SerialLine::open(&path, &pty_config()).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn test_read_raw_through_pty() {
        let (mut master, slave) = serialport::TTYPort::pair().unwrap();
        let path = slave.name().unwrap();
        let mut line = SerialLine::open(&path, &pty_config()).unwrap();

        master.write_all(b"UUU").unwrap();
        master.flush().unwrap();
        assert_eq!(line.read_raw(3).unwrap(), b"UUU".to_vec());

        master.write_all(b"UU").unwrap();
        master.flush().unwrap();
        assert!(matches!(
            line.read_raw(4),
            Err(HardwareError::ShortRead {
                expected: 4,
                actual: 2
            })
        ));
    }
}
