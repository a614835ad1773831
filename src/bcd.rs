//! Decoding of the packed BCD fields found in WS8610 memory.
//!
//! Readings are stored as loose nibbles that do not respect byte boundaries,
//! so every field is described by the nibbles it is assembled from.

use crate::error::ProtocolError;
use chrono::{NaiveDate, NaiveDateTime};

/// Raw temperature (tenths of a degree, before the offset) meaning "no sensor".
const TEMPERATURE_ABSENT: u32 = 810;

/// Raw humidity meaning "no sensor".
const HUMIDITY_ABSENT: u32 = 110;

/// Stored temperatures are shifted up by 30.0 °C to stay positive.
const TEMPERATURE_OFFSET_TENTHS: i32 = 300;

pub const TIMESTAMP_LEN: usize = 5;
pub const MODTIME_LEN: usize = 6;
pub const COUNT_LEN: usize = 2;

/// Highest sensor index: 0 is the console itself, 1..=3 the external sensors.
pub const MAX_SENSOR: usize = 3;

#[derive(Debug, Clone, Copy)]
enum Nibble {
    Hi(usize),
    Lo(usize),
}

impl Nibble {
    fn get(self, data: &[u8]) -> Result<u32, ProtocolError> {
        let index = match self {
            Self::Hi(i) | Self::Lo(i) => i,
        };
        let byte = data.get(index).ok_or(ProtocolError::UnexpectedLength {
            expected: index + 1,
            actual: data.len(),
        })?;
        Ok(match self {
            Self::Hi(_) => u32::from(byte >> 4),
            Self::Lo(_) => u32::from(byte & 0x0F),
        })
    }

    fn set(self, data: &mut [u8], digit: u8) {
        match self {
            Self::Hi(i) => {
                if let Some(byte) = data.get_mut(i) {
                    *byte = (*byte & 0x0F) | (digit << 4);
                }
            }
            Self::Lo(i) => {
                if let Some(byte) = data.get_mut(i) {
                    *byte = (*byte & 0xF0) | (digit & 0x0F);
                }
            }
        }
    }
}

/// Tens, units and tenths of each sensor's temperature.
const TEMPERATURE_FIELDS: [[Nibble; 3]; MAX_SENSOR + 1] = [
    [Nibble::Lo(6), Nibble::Hi(5), Nibble::Lo(5)],
    [Nibble::Hi(7), Nibble::Lo(7), Nibble::Hi(6)],
    [Nibble::Lo(11), Nibble::Hi(10), Nibble::Lo(10)],
    [Nibble::Hi(13), Nibble::Lo(13), Nibble::Hi(12)],
];

/// Tens and units of each sensor's relative humidity.
const HUMIDITY_FIELDS: [[Nibble; 2]; MAX_SENSOR + 1] = [
    [Nibble::Hi(8), Nibble::Lo(8)],
    [Nibble::Hi(9), Nibble::Lo(9)],
    [Nibble::Lo(12), Nibble::Hi(11)],
    [Nibble::Hi(14), Nibble::Lo(14)],
];

fn digits(data: &[u8], nibbles: &[Nibble]) -> Result<u32, ProtocolError> {
    nibbles
        .iter()
        .try_fold(0, |acc, nibble| Ok(acc * 10 + nibble.get(data)?))
}

fn set_digits(data: &mut [u8], nibbles: &[Nibble], mut value: u32) {
    for nibble in nibbles.iter().rev() {
        nibble.set(data, (value % 10) as u8);
        value /= 10;
    }
}

/// Decode one byte holding two BCD digits.
pub fn bcd(byte: u8) -> u32 {
    u32::from(byte >> 4) * 10 + u32::from(byte & 0x0F)
}

fn require_len(data: &[u8], expected: usize) -> Result<(), ProtocolError> {
    if data.len() < expected {
        return Err(ProtocolError::UnexpectedLength {
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

fn datetime(
    year: i32,
    month: u32,
    day: u32,
    hour: u32,
    minute: u32,
) -> Result<NaiveDateTime, ProtocolError> {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|date| date.and_hms_opt(hour, minute, 0))
        .ok_or(ProtocolError::InvalidTimestamp {
            year,
            month,
            day,
            hour,
            minute,
        })
}

/// Timestamp at the head of a history record: minute, hour, day, month,
/// year since 2000, one BCD byte each.
pub fn decode_timestamp(data: &[u8]) -> Result<NaiveDateTime, ProtocolError> {
    require_len(data, TIMESTAMP_LEN)?;
    datetime(
        2000 + bcd(data[4]) as i32,
        bcd(data[3]),
        bcd(data[2]),
        bcd(data[1]),
        bcd(data[0]),
    )
}

/// Timestamp of the last history write. From the day onwards the digits are
/// shifted by one nibble, low digit first.
pub fn decode_modtime(data: &[u8]) -> Result<NaiveDateTime, ProtocolError> {
    require_len(data, MODTIME_LEN)?;
    let hi = |i: usize| u32::from(data[i] >> 4);
    let lo = |i: usize| u32::from(data[i] & 0x0F);

    datetime(
        2000 + (hi(4) + lo(5) * 10) as i32,
        hi(3) + lo(4) * 10,
        hi(2) + lo(3) * 10,
        bcd(data[1]),
        bcd(data[0]),
    )
}

/// Four-digit record count, low digit pair first.
pub fn decode_count(data: &[u8]) -> Result<u16, ProtocolError> {
    require_len(data, COUNT_LEN)?;
    // at most 165 * 100 + 165, well inside u16
    Ok((bcd(data[1]) * 100 + bcd(data[0])) as u16)
}

fn check_sensor(sensor: usize) -> Result<(), ProtocolError> {
    if sensor > MAX_SENSOR {
        return Err(ProtocolError::InvalidSensor(sensor));
    }
    Ok(())
}

/// Temperature in °C of `sensor`, or `None` when the console marks it absent.
pub fn decode_temperature(record: &[u8], sensor: usize) -> Result<Option<f64>, ProtocolError> {
    check_sensor(sensor)?;
    let raw = digits(record, &TEMPERATURE_FIELDS[sensor])?;
    if raw == TEMPERATURE_ABSENT {
        return Ok(None);
    }
    let tenths = raw as i32 - TEMPERATURE_OFFSET_TENTHS;
    Ok(Some(f64::from(tenths) / 10.0))
}

/// Relative humidity in % of `sensor`, or `None` when the console marks it absent.
pub fn decode_humidity(record: &[u8], sensor: usize) -> Result<Option<u8>, ProtocolError> {
    check_sensor(sensor)?;
    let raw = digits(record, &HUMIDITY_FIELDS[sensor])?;
    if raw == HUMIDITY_ABSENT {
        return Ok(None);
    }
    // two nibbles give at most 165
    Ok(Some(raw as u8))
}

/// Encode a value below 100 as two BCD digits.
pub(crate) fn to_bcd(value: u32) -> u8 {
    (((value / 10) % 10) << 4 | (value % 10)) as u8
}

/// Store a temperature the way the console does, clamped to what the
/// three digits can hold.
pub(crate) fn encode_temperature(record: &mut [u8], sensor: usize, value: Option<f64>) {
    let raw = value.map_or(TEMPERATURE_ABSENT, |t| {
        let tenths = (t * 10.0).round() as i32 + TEMPERATURE_OFFSET_TENTHS;
        tenths.clamp(0, 999) as u32
    });
    if let Some(fields) = TEMPERATURE_FIELDS.get(sensor) {
        set_digits(record, fields, raw);
    }
}

pub(crate) fn encode_humidity(record: &mut [u8], sensor: usize, value: Option<u8>) {
    let raw = value.map_or(HUMIDITY_ABSENT, |h| u32::from(h.min(99)));
    if let Some(fields) = HUMIDITY_FIELDS.get(sensor) {
        // the absent marker needs 11 in the tens nibble
        let [tens, units] = *fields;
        tens.set(record, (raw / 10) as u8);
        units.set(record, (raw % 10) as u8);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_bcd_byte() {
        assert_eq!(bcd(0x00), 0);
        assert_eq!(bcd(0x34), 34);
        assert_eq!(bcd(0x99), 99);
    }

    #[test]
    fn test_decode_timestamp() {
        let ts = decode_timestamp(&[0x34, 0x07, 0x15, 0x06, 0x23]).unwrap();
        assert_eq!(
            ts,
            NaiveDate::from_ymd_opt(2023, 6, 15)
                .unwrap()
                .and_hms_opt(7, 34, 0)
                .unwrap()
        );
    }

    #[test]
    fn test_decode_timestamp_rejects_invalid_date() {
        let err = decode_timestamp(&[0x00, 0x00, 0x31, 0x02, 0x23]).unwrap_err();
        assert!(matches!(
            err,
            ProtocolError::InvalidTimestamp { month: 2, day: 31, .. }
        ));

        // erased memory
        assert!(decode_timestamp(&[0xFF; 5]).is_err());
    }

    #[test]
    fn test_decode_timestamp_short_input() {
        assert_eq!(
            decode_timestamp(&[0x34, 0x07]).unwrap_err(),
            ProtocolError::UnexpectedLength {
                expected: 5,
                actual: 2
            }
        );
    }

    #[test]
    fn test_decode_modtime_nibble_layout() {
        // 2023-06-15 07:49: day digits 1,5 / month 0,6 / year 2,3 straddle bytes
        let data = [0x49, 0x07, 0x50, 0x61, 0x30, 0x02];
        let ts = decode_modtime(&data).unwrap();
        assert_eq!(ts.year(), 2023);
        assert_eq!(ts.month(), 6);
        assert_eq!(ts.day(), 15);
        assert_eq!(ts.hour(), 7);
        assert_eq!(ts.minute(), 49);
    }

    #[test]
    fn test_decode_count() {
        assert_eq!(decode_count(&[0x34, 0x12]).unwrap(), 1234);
        assert_eq!(decode_count(&[0x00, 0x00]).unwrap(), 0);
    }

    #[test]
    fn test_internal_sensor_values() {
        // internal 21.3 °C raw 51.3 -> digits 5,1,3 ; humidity 45
        let mut record = [0u8; 10];
        record[5] = 0x13;
        record[6] = 0x05;
        record[8] = 0x45;
        assert_eq!(decode_temperature(&record, 0).unwrap(), Some(21.3));
        assert_eq!(decode_humidity(&record, 0).unwrap(), Some(45));
    }

    #[test]
    fn test_external_sensor_values() {
        // sensor 1: -4.7 °C raw 25.3 -> tens hi(7)=2 units lo(7)=5 tenths hi(6)=3
        let mut record = [0u8; 15];
        record[6] = 0x30;
        record[7] = 0x25;
        record[9] = 0x80;
        // sensor 2: 0.0 °C raw 30.0 ; humidity 67 -> tens lo(12)=6 units hi(11)=7
        record[10] = 0x00;
        record[11] = 0x73;
        record[12] = 0x06;
        // sensor 3: 12.5 °C raw 42.5 -> tens hi(13)=4 units lo(13)=2 tenths hi(12)=5
        record[12] |= 0x50;
        record[13] = 0x42;
        record[14] = 0x99;

        assert_eq!(decode_temperature(&record, 1).unwrap(), Some(-4.7));
        assert_eq!(decode_humidity(&record, 1).unwrap(), Some(80));
        assert_eq!(decode_temperature(&record, 2).unwrap(), Some(0.0));
        assert_eq!(decode_humidity(&record, 2).unwrap(), Some(67));
        assert_eq!(decode_temperature(&record, 3).unwrap(), Some(12.5));
        assert_eq!(decode_humidity(&record, 3).unwrap(), Some(99));
    }

    #[test]
    fn test_sentinels_decode_to_absent() {
        // raw 81.0 in the internal temperature field, humidity nibbles 0xB,0x0
        let mut record = [0u8; 10];
        record[5] = 0x10;
        record[6] = 0x08;
        record[8] = 0xB0;
        assert_eq!(decode_temperature(&record, 0).unwrap(), None);
        assert_eq!(decode_humidity(&record, 0).unwrap(), None);

        // neighbouring values are literal
        record[5] = 0x11;
        record[8] = 0x99;
        assert_eq!(decode_temperature(&record, 0).unwrap(), Some(51.1));
        assert_eq!(decode_humidity(&record, 0).unwrap(), Some(99));
    }

    #[test]
    fn test_encoded_sensor_fields_decode_back() {
        let mut record = [0u8; 15];
        encode_temperature(&mut record, 2, Some(-12.4));
        encode_humidity(&mut record, 2, Some(38));
        encode_temperature(&mut record, 3, None);
        encode_humidity(&mut record, 3, None);

        assert_eq!(decode_temperature(&record, 2).unwrap(), Some(-12.4));
        assert_eq!(decode_humidity(&record, 2).unwrap(), Some(38));
        assert_eq!(decode_temperature(&record, 3).unwrap(), None);
        assert_eq!(decode_humidity(&record, 3).unwrap(), None);
    }

    #[test]
    fn test_invalid_sensor_index() {
        let record = [0u8; 15];
        assert_eq!(
            decode_temperature(&record, 4).unwrap_err(),
            ProtocolError::InvalidSensor(4)
        );
        assert_eq!(
            decode_humidity(&record, 7).unwrap_err(),
            ProtocolError::InvalidSensor(7)
        );
    }

    #[test]
    fn test_sensor_beyond_record_length() {
        let record = [0u8; 10];
        assert!(matches!(
            decode_temperature(&record, 2),
            Err(ProtocolError::UnexpectedLength { .. })
        ));
    }
}
