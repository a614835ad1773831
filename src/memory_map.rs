//! Layout of the WS8610 linear memory.
//!
//! The console exposes a flat 15-bit address space. A few low addresses hold
//! station state; everything from [`HISTORY_START`] up to [`HISTORY_END`] is a
//! circular buffer of history records.

use crate::error::ProtocolError;
use std::fmt;

/// Highest addressable byte.
pub const MAX_ADDRESS: u16 = 0x7FFF;

/// 6-byte timestamp of the most recent history write.
pub const LAST_UPDATE: Address = Address(0x0000);

/// 2-byte BCD count of stored records. Writing zeros here resets the history.
pub const HISTORY_COUNT: Address = Address(0x0009);

/// Low nibble holds the number of external sensors.
pub const SENSOR_COUNT: Address = Address(0x000C);

/// First byte of the circular history buffer.
pub const HISTORY_START: Address = Address(0x0064);

/// Last byte of the circular history buffer.
pub const HISTORY_END: Address = Address(MAX_ADDRESS);

/// Size of the history buffer in bytes.
pub const HISTORY_BUFFER_SIZE: usize = (MAX_ADDRESS - HISTORY_START.0) as usize + 1;

/// Marks bytes of the history buffer that were never written.
pub const UNUSED_BYTE: u8 = 0xFF;

/// A 15-bit offset into device memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Address(u16);

impl Address {
    pub fn new(raw: u16) -> Result<Self, ProtocolError> {
        if raw > MAX_ADDRESS {
            return Err(ProtocolError::AddressOutOfRange {
                address: u32::from(raw),
                length: 1,
            });
        }
        Ok(Self(raw))
    }

    pub fn value(self) -> u16 {
        self.0
    }

    pub fn high_byte(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub fn low_byte(self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    /// The address `offset` bytes further on, if still addressable.
    pub fn offset(self, offset: usize) -> Result<Self, ProtocolError> {
        let target = usize::from(self.0) + offset;
        u16::try_from(target)
            .ok()
            .filter(|&a| a <= MAX_ADDRESS)
            .map(Self)
            .ok_or(ProtocolError::AddressOutOfRange {
                address: u32::from(self.0),
                length: offset + 1,
            })
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

impl From<Address> for usize {
    fn from(address: Address) -> Self {
        Self::from(address.0)
    }
}

/// Check that `length` bytes starting at `start` stay inside `[start, end]`
/// and the range is not empty.
pub fn check_range(start: u32, length: usize, end: Address) -> Result<Address, ProtocolError> {
    let out_of_range = ProtocolError::AddressOutOfRange {
        address: start,
        length,
    };
    if length == 0 {
        return Err(out_of_range);
    }
    match u64::from(start).checked_add(length as u64 - 1) {
        Some(last) if last <= u64::from(end.0) => {}
        _ => return Err(out_of_range),
    }
    // start <= last <= end <= MAX_ADDRESS, so this cannot truncate
    Ok(Address(start as u16))
}
