//! A software model of the WS8610 console end of the line.
//!
//! [`SimulatedWs8610`] implements [`ControlLines`] and decodes the host's DTR
//! and RTS transitions the way the console firmware does: a rising RTS while
//! DTR is low opens a command, DTR rising edges clock bits, and answers come
//! back on CTS. It serves a full 32 KiB memory image, so every layer of the
//! crate can be exercised without hardware.

use crate::bcd;
use crate::error::{HardwareError, ProtocolError};
use crate::framer::{CMD_ADDRESS, CMD_READ};
use crate::memory_map::{self, HISTORY_START, MAX_ADDRESS, UNUSED_BYTE};
use crate::profile::StationProfile;
use crate::record::SensorReading;
use crate::serial_line::ControlLines;
use chrono::{Datelike, NaiveDateTime, Timelike};
use std::collections::BTreeSet;
use std::time::Duration;

const MEMORY_SIZE: usize = MAX_ADDRESS as usize + 1;

/// Bits flipped in every byte of a corrupted transfer.
const GLITCH_MASK: u8 = 0x01;

/// How the console drives DSR during the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DsrBehaviour {
    /// Asserted on the first poll, cleared afterwards.
    #[default]
    Normal,
    NeverSet,
    NeverClear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    Command,
    AddressHigh,
    AddressLow { high: u8 },
    Data { address: u16 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Next {
    Receive(Expect),
    Transmit,
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Idle,
    /// Command opened; waiting for RTS to drop with DTR high.
    Priming,
    Receiving { expect: Expect, bits: u8, value: u8 },
    /// A byte arrived; the host may sample CTS and clock once more.
    Acknowledging { ack: bool, next: Next },
    Transmitting { address: u16, bit: u8, advance: bool },
}

#[derive(Debug, Clone)]
pub struct SimulatedWs8610 {
    memory: Vec<u8>,
    dtr: bool,
    rts: bool,
    mode: Mode,
    pointer: u16,
    dsr_behaviour: DsrBehaviour,
    dsr_polls: usize,
    transfers: usize,
    corrupted: BTreeSet<usize>,
    refuse_writes: bool,
    wakeup_bytes: usize,
}

impl Default for SimulatedWs8610 {
    fn default() -> Self {
        let mut memory = vec![0u8; MEMORY_SIZE];
        memory[usize::from(HISTORY_START)..].fill(UNUSED_BYTE);

        Self {
            memory,
            dtr: false,
            rts: false,
            mode: Mode::Idle,
            pointer: 0,
            dsr_behaviour: DsrBehaviour::Normal,
            dsr_polls: 0,
            transfers: 0,
            corrupted: BTreeSet::new(),
            refuse_writes: false,
            wakeup_bytes: 0,
        }
    }
}

impl SimulatedWs8610 {
    /// A console with one external sensor and an empty history.
    pub fn new() -> Self {
        Self::default().with_sensor_count(1)
    }

    pub fn with_sensor_count(mut self, sensors: u8) -> Self {
        let index = usize::from(memory_map::SENSOR_COUNT);
        self.memory[index] = (self.memory[index] & 0xF0) | (sensors & 0x0F);
        self
    }

    pub fn with_dsr_behaviour(mut self, behaviour: DsrBehaviour) -> Self {
        self.dsr_behaviour = behaviour;
        self
    }

    /// Flip bits in the read transfers with these (1-based) sequence numbers.
    pub fn with_corrupted_transfers(mut self, transfers: impl IntoIterator<Item = usize>) -> Self {
        self.corrupted.extend(transfers);
        self
    }

    /// Refuse to acknowledge data bytes written to memory.
    pub fn refusing_writes(mut self) -> Self {
        self.refuse_writes = true;
        self
    }

    pub fn write_memory(&mut self, address: u16, data: &[u8]) {
        let start = usize::from(address & MAX_ADDRESS);
        let end = (start + data.len()).min(MEMORY_SIZE);
        self.memory[start..end].copy_from_slice(&data[..end - start]);
    }

    pub fn memory(&self) -> &[u8] {
        &self.memory
    }

    /// Store an encoded record at history slot `index`.
    pub fn write_record(&mut self, index: usize, record: &[u8]) -> Result<(), ProtocolError> {
        let profile = StationProfile::from_sensor_count(self.sensor_count())?;
        let address = profile.record_address(index)?;
        self.write_memory(address.value(), record);
        Ok(())
    }

    pub fn set_modtime(&mut self, timestamp: NaiveDateTime) {
        self.write_memory(memory_map::LAST_UPDATE.value(), &encode_modtime(timestamp));
    }

    pub fn set_history_count(&mut self, count: u16) {
        let count = u32::from(count);
        let bytes = [bcd::to_bcd(count % 100), bcd::to_bcd(count / 100)];
        self.write_memory(memory_map::HISTORY_COUNT.value(), &bytes);
    }

    pub fn sensor_count(&self) -> u8 {
        self.memory[usize::from(memory_map::SENSOR_COUNT)] & 0x0F
    }

    /// Read commands served so far.
    pub fn transfers(&self) -> usize {
        self.transfers
    }

    /// Bytes received through the UART.
    pub fn wakeup_bytes(&self) -> usize {
        self.wakeup_bytes
    }

    fn on_dtr(&mut self, level: bool) {
        if level == self.dtr {
            return;
        }
        self.dtr = level;
        if !level {
            return;
        }

        let mode = self.mode;
        self.mode = match mode {
            Mode::Receiving {
                expect,
                bits,
                value,
            } => {
                let value = (value << 1) | u8::from(!self.rts);
                if bits + 1 == 8 {
                    self.receive_byte(expect, value)
                } else {
                    Mode::Receiving {
                        expect,
                        bits: bits + 1,
                        value,
                    }
                }
            }
            Mode::Acknowledging { next, .. } => self.enter(next),
            Mode::Transmitting {
                address,
                advance: true,
                ..
            } => Mode::Transmitting {
                address: (address + 1) & MAX_ADDRESS,
                bit: 0,
                advance: true,
            },
            Mode::Transmitting {
                address,
                bit,
                advance: false,
            } => Mode::Transmitting {
                address,
                bit: (bit + 1).min(8),
                advance: false,
            },
            mode => mode,
        };
    }

    fn on_rts(&mut self, level: bool) {
        if level == self.rts {
            return;
        }
        self.rts = level;

        if level && !self.dtr {
            self.mode = Mode::Priming;
            return;
        }

        self.mode = match (self.mode, level) {
            (Mode::Priming, false) => Mode::Receiving {
                expect: Expect::Command,
                bits: 0,
                value: 0,
            },
            (Mode::Receiving { .. }, false) if !self.dtr => Mode::Idle,
            (Mode::Transmitting { .. }, false) if !self.dtr => Mode::Idle,
            (Mode::Transmitting { address, bit, .. }, advance) => Mode::Transmitting {
                address,
                bit,
                advance,
            },
            (mode, _) => mode,
        };
    }

    fn receive_byte(&mut self, expect: Expect, value: u8) -> Mode {
        let (ack, next) = match expect {
            Expect::Command => match value {
                CMD_ADDRESS => (true, Next::Receive(Expect::AddressHigh)),
                CMD_READ => (true, Next::Transmit),
                _ => (false, Next::Idle),
            },
            Expect::AddressHigh => (true, Next::Receive(Expect::AddressLow { high: value })),
            Expect::AddressLow { high } => {
                self.pointer = u16::from_be_bytes([high, value]) & MAX_ADDRESS;
                (
                    true,
                    Next::Receive(Expect::Data {
                        address: self.pointer,
                    }),
                )
            }
            Expect::Data { .. } if self.refuse_writes => (false, Next::Idle),
            Expect::Data { address } => {
                self.memory[usize::from(address)] = value;
                (
                    true,
                    Next::Receive(Expect::Data {
                        address: (address + 1) & MAX_ADDRESS,
                    }),
                )
            }
        };

        Mode::Acknowledging { ack, next }
    }

    fn enter(&mut self, next: Next) -> Mode {
        match next {
            Next::Receive(expect) => Mode::Receiving {
                expect,
                bits: 0,
                value: 0,
            },
            Next::Transmit => {
                self.transfers += 1;
                Mode::Transmitting {
                    address: self.pointer,
                    bit: 0,
                    advance: false,
                }
            }
            Next::Idle => Mode::Idle,
        }
    }

    fn transmitted_byte(&self, address: u16) -> u8 {
        let byte = self.memory[usize::from(address)];
        if self.corrupted.contains(&self.transfers) {
            byte ^ GLITCH_MASK
        } else {
            byte
        }
    }
}

impl ControlLines for SimulatedWs8610 {
    fn set_dtr(&mut self, level: bool) -> Result<(), HardwareError> {
        self.on_dtr(level);
        Ok(())
    }

    fn set_rts(&mut self, level: bool) -> Result<(), HardwareError> {
        self.on_rts(level);
        Ok(())
    }

    fn cts(&mut self) -> Result<bool, HardwareError> {
        Ok(match self.mode {
            Mode::Acknowledging { ack, .. } => ack,
            Mode::Transmitting { address, bit, .. } if bit < 8 => {
                let byte = self.transmitted_byte(address);
                (byte >> (7 - bit)) & 1 == 0
            }
            _ => true,
        })
    }

    fn dsr(&mut self) -> Result<bool, HardwareError> {
        self.dsr_polls += 1;
        Ok(match self.dsr_behaviour {
            DsrBehaviour::Normal => self.dsr_polls == 1,
            DsrBehaviour::NeverSet => false,
            DsrBehaviour::NeverClear => true,
        })
    }

    fn settle(&mut self) {}

    fn read_raw(&mut self, length: usize) -> Result<Vec<u8>, HardwareError> {
        // the console never transmits on the UART
        Err(HardwareError::ShortRead {
            expected: length,
            actual: 0,
        })
    }

    fn write_raw(&mut self, data: &[u8]) -> Result<(), HardwareError> {
        self.wakeup_bytes += data.len();
        Ok(())
    }

    fn pause(&mut self, _duration: Duration) {}
}

/// Encode a history record timestamp.
pub fn encode_timestamp(timestamp: NaiveDateTime) -> [u8; bcd::TIMESTAMP_LEN] {
    [
        bcd::to_bcd(timestamp.minute()),
        bcd::to_bcd(timestamp.hour()),
        bcd::to_bcd(timestamp.day()),
        bcd::to_bcd(timestamp.month()),
        bcd::to_bcd(timestamp.year().rem_euclid(100) as u32),
    ]
}

/// Encode the last-update timestamp with its nibble-shifted date digits.
pub fn encode_modtime(timestamp: NaiveDateTime) -> [u8; bcd::MODTIME_LEN] {
    let day = timestamp.day();
    let month = timestamp.month();
    let year = timestamp.year().rem_euclid(100) as u32;

    [
        bcd::to_bcd(timestamp.minute()),
        bcd::to_bcd(timestamp.hour()),
        ((day % 10) << 4) as u8,
        (((month % 10) << 4) | (day / 10)) as u8,
        (((year % 10) << 4) | (month / 10)) as u8,
        (year / 10) as u8,
    ]
}

/// Encode a complete history record; its size follows from the number of
/// external sensors.
pub fn encode_record(
    timestamp: NaiveDateTime,
    internal: SensorReading,
    external: &[SensorReading],
) -> Result<Vec<u8>, ProtocolError> {
    let sensors = u8::try_from(external.len()).unwrap_or(u8::MAX);
    let profile = StationProfile::from_sensor_count(sensors)?;

    let mut record = vec![0u8; profile.record_size];
    record[..bcd::TIMESTAMP_LEN].copy_from_slice(&encode_timestamp(timestamp));
    for (sensor, reading) in std::iter::once(&internal).chain(external).enumerate() {
        bcd::encode_temperature(&mut record, sensor, reading.temperature);
        bcd::encode_humidity(&mut record, sensor, reading.humidity);
    }
    Ok(record)
}
