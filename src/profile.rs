use crate::error::ProtocolError;
use crate::memory_map::{Address, HISTORY_BUFFER_SIZE, HISTORY_START};

/// Capabilities of a console, fixed for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StationProfile {
    pub external_sensors: u8,
    /// Bytes per history record.
    pub record_size: usize,
    /// Records that fit in the circular history buffer.
    pub max_records: usize,
}

impl StationProfile {
    pub fn from_sensor_count(external_sensors: u8) -> Result<Self, ProtocolError> {
        let record_size = match external_sensors {
            1 => 10,
            2 => 13,
            3 => 15,
            n => return Err(ProtocolError::UnsupportedSensorCount(n)),
        };

        Ok(Self {
            external_sensors,
            record_size,
            max_records: HISTORY_BUFFER_SIZE / record_size,
        })
    }

    /// Wrap a record number into the circular buffer.
    pub fn normalize(&self, record_no: usize) -> usize {
        record_no % self.max_records
    }

    /// Address of the first byte of record `record_no` (wrapped).
    pub fn record_address(&self, record_no: usize) -> Result<Address, ProtocolError> {
        HISTORY_START.offset(self.normalize(record_no) * self.record_size)
    }
}
