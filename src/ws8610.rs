//! Device semantics of the LaCrosse WS8610 console.
//!
//! ## Session lifecycle
//!
//! [`Ws8610::open`] locks the serial device, wakes the console with a block of
//! filler bytes, waits for it to pulse DSR and then reads the number of
//! external sensors. That number fixes the record size and therefore the
//! capacity of the circular history buffer for the rest of the session.
//!
//! ## Finding the newest record
//!
//! The console does not store a write pointer. [`WeatherStation::history_last`]
//! estimates it from the time between the oldest record and the last-update
//! timestamp, assuming one record every five minutes, then peeks one record
//! further to correct for rounding.

use crate::bcd;
use crate::config::StationConfig;
use crate::error::{ProtocolError, WeatherError};
use crate::framer::Framer;
use crate::memory_map::{self, Address, UNUSED_BYTE};
use crate::profile::StationProfile;
use crate::record::{HistoryRecord, SensorReading};
use crate::serial_line::{ControlLines, SerialLine};
use crate::station::WeatherStation;
use crate::transfer;
use chrono::NaiveDateTime;

/// The console writes one history record per interval.
const SAMPLING_INTERVAL_MINUTES: i64 = 5;

fn hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

#[derive(Debug)]
pub struct Ws8610<L: ControlLines = SerialLine> {
    framer: Framer<L>,
    profile: StationProfile,
    config: StationConfig,
}

impl Ws8610<SerialLine> {
    /// Connect to a console on the serial device at `path` with default timing.
    pub fn open(path: &str) -> Result<Self, WeatherError> {
        Self::open_with_config(path, StationConfig::default())
    }

    pub fn open_with_config(path: &str, config: StationConfig) -> Result<Self, WeatherError> {
        let line = SerialLine::open(path, &config.line)?;
        Self::with_line(line, config)
    }
}

impl<L: ControlLines> Ws8610<L> {
    /// Run the handshake and capability discovery over an already open line.
    pub fn with_line(line: L, config: StationConfig) -> Result<Self, WeatherError> {
        let mut framer = Framer::new(line);
        Self::handshake(framer.line_mut(), &config)?;

        let data = transfer::read_verified(
            &mut framer,
            memory_map::SENSOR_COUNT,
            1,
            config.max_read_attempts,
        )?;
        let sensors = data.first().map_or(0, |b| b & 0x0F);
        let profile = StationProfile::from_sensor_count(sensors)?;

        log::debug!(
            "{} external sensor(s), record length is {}, max record count is {}",
            profile.external_sensors,
            profile.record_size,
            profile.max_records
        );

        Ok(Self {
            framer,
            profile,
            config,
        })
    }

    fn handshake(line: &mut L, config: &StationConfig) -> Result<(), WeatherError> {
        let wakeup = vec![config.wakeup_byte; config.wakeup_len];

        log::debug!("Sending {} byte wake-up block", wakeup.len());
        line.write_raw(&wakeup)?;
        line.set_dtr(false)?;
        line.settle();
        line.set_rts(false)?;
        line.settle();

        if !Self::wait_for_dsr(line, config, true)? {
            return Err(ProtocolError::DsrNotSet.into());
        }
        if !Self::wait_for_dsr(line, config, false)? {
            return Err(ProtocolError::DsrNotCleared.into());
        }
        log::debug!("Console answered the handshake");

        line.set_rts(true)?;
        line.settle();
        line.set_dtr(true)?;
        line.settle();
        line.write_raw(&wakeup)?;
        Ok(())
    }

    /// Poll DSR until it reaches `level`. Returns false on timeout.
    fn wait_for_dsr(line: &mut L, config: &StationConfig, level: bool) -> Result<bool, WeatherError> {
        for _ in 0..config.dsr_poll_limit {
            line.pause(config.dsr_poll_interval);
            if line.dsr()? == level {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn profile(&self) -> &StationProfile {
        &self.profile
    }

    pub fn config(&self) -> &StationConfig {
        &self.config
    }

    pub fn line(&self) -> &L {
        self.framer.line()
    }

    fn read_safe(&mut self, address: Address, length: usize) -> Result<Vec<u8>, WeatherError> {
        transfer::read_verified(
            &mut self.framer,
            address,
            length,
            self.config.max_read_attempts,
        )
    }

    /// Verified dump of `length` bytes at `address`.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn memory(&mut self, address: u16, length: usize) -> Result<Vec<u8>, WeatherError> {
        let start = memory_map::check_range(address.into(), length, memory_map::HISTORY_END)?;
        self.read_safe(start, length)
    }

    fn decode_record(&self, data: &[u8]) -> Result<HistoryRecord, ProtocolError> {
        let reading = |sensor: usize| -> Result<SensorReading, ProtocolError> {
            Ok(SensorReading {
                temperature: bcd::decode_temperature(data, sensor)?,
                humidity: bcd::decode_humidity(data, sensor)?,
            })
        };

        let external = (1..=usize::from(self.profile.external_sensors))
            .map(reading)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(HistoryRecord {
            timestamp: bcd::decode_timestamp(data)?,
            internal: reading(0)?,
            external,
        })
    }
}

impl<L: ControlLines> WeatherStation for Ws8610<L> {
    fn external_sensors(&self) -> u8 {
        self.profile.external_sensors
    }

    #[tracing::instrument(level = "debug", skip(self))]
    fn history(&mut self, record_no: usize) -> Result<HistoryRecord, WeatherError> {
        let index = self.profile.normalize(record_no);
        let address = self.profile.record_address(index)?;
        let data = self.read_safe(address, self.profile.record_size)?;
        if data.len() != self.profile.record_size {
            return Err(ProtocolError::UnexpectedLength {
                expected: self.profile.record_size,
                actual: data.len(),
            }
            .into());
        }

        log::debug!("Reading record n. {} at {}: {}", index, address, hex(&data));
        Ok(self.decode_record(&data)?)
    }

    fn history_count(&mut self) -> Result<u16, WeatherError> {
        let data = self.read_safe(memory_map::HISTORY_COUNT, bcd::COUNT_LEN)?;
        Ok(bcd::decode_count(&data)?)
    }

    fn history_modtime(&mut self) -> Result<NaiveDateTime, WeatherError> {
        let data = self.read_safe(memory_map::LAST_UPDATE, bcd::MODTIME_LEN)?;
        Ok(bcd::decode_modtime(&data)?)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    fn history_last(&mut self) -> Result<HistoryRecord, WeatherError> {
        let first = self.history(0)?;
        let modtime = self.history_modtime()?;

        let elapsed = (modtime - first.timestamp).num_minutes().max(0);
        let mut total = 1 + usize::try_from(elapsed / SAMPLING_INTERVAL_MINUTES).unwrap_or(0);

        log::debug!("Tot history: {} records", total);
        log::debug!("Date first: {}", first.timestamp);
        log::debug!("Date last: {}", modtime);

        let probe_address = self.profile.record_address(total)?;
        let probe = self.read_safe(probe_address, 1)?;
        match probe.first() {
            Some(&byte) if byte != UNUSED_BYTE => {
                log::debug!("Next record starts with {:02x}, skipping to it", byte);
                total += 1;
            }
            _ => log::debug!("Next record is unused, sticking with current record"),
        }

        self.history(total - 1)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    fn history_reset(&mut self) -> Result<(), WeatherError> {
        if !self.framer.write_data(memory_map::HISTORY_COUNT, &[0x00, 0x00])? {
            return Err(ProtocolError::ResetNotAcknowledged.into());
        }
        log::debug!("History count reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::{encode_record, DsrBehaviour, SimulatedWs8610};
    use chrono::{Duration, NaiveDate};
    use pretty_assertions::assert_eq;

    fn start_time() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2023, 6, 15)
            .unwrap()
            .and_hms_opt(7, 34, 0)
            .unwrap()
    }

    fn reading(temperature: f64, humidity: u8) -> SensorReading {
        SensorReading {
            temperature: Some(temperature),
            humidity: Some(humidity),
        }
    }

    fn test_config() -> StationConfig {
        StationConfig::default().with_dsr_polling(std::time::Duration::ZERO, 5)
    }

    /// A one-sensor console holding `records` samples five minutes apart.
    fn console_with_records(records: usize) -> SimulatedWs8610 {
        let mut sim = SimulatedWs8610::new();
        for i in 0..records {
            let ts = start_time() + Duration::minutes(5 * i as i64);
            let record = encode_record(
                ts,
                reading(20.0 + i as f64 / 10.0, 40 + i as u8),
                &[reading(-5.5, 90)],
            )
            .unwrap();
            sim.write_record(i, &record).unwrap();
        }
        sim
    }

    fn connect(sim: SimulatedWs8610) -> Ws8610<SimulatedWs8610> {
        Ws8610::with_line(sim, test_config()).unwrap()
    }

    fn protocol_error(result: Result<Ws8610<SimulatedWs8610>, WeatherError>) -> Option<ProtocolError> {
        result.err().and_then(|e| e.as_protocol().cloned())
    }

    #[test]
    fn test_handshake_sends_wakeup_twice() {
        let station = connect(SimulatedWs8610::new());
        assert_eq!(station.line().wakeup_bytes(), 2 * 448);
    }

    #[test]
    fn test_profile_from_sensor_count() {
        for (sensors, size) in [(1, 10), (2, 13), (3, 15)] {
            let station = connect(SimulatedWs8610::new().with_sensor_count(sensors));
            assert_eq!(station.external_sensors(), sensors);
            assert_eq!(station.profile().record_size, size);
        }
    }

    #[test]
    fn test_unsupported_sensor_count_aborts() {
        for sensors in [0, 4] {
            let sim = SimulatedWs8610::new().with_sensor_count(sensors);
            assert_eq!(
                protocol_error(Ws8610::with_line(sim, test_config())),
                Some(ProtocolError::UnsupportedSensorCount(sensors))
            );
        }
    }

    #[test]
    fn test_handshake_timeouts() {
        let sim = SimulatedWs8610::new().with_dsr_behaviour(DsrBehaviour::NeverSet);
        assert_eq!(
            protocol_error(Ws8610::with_line(sim, test_config())),
            Some(ProtocolError::DsrNotSet)
        );

        let sim = SimulatedWs8610::new().with_dsr_behaviour(DsrBehaviour::NeverClear);
        assert_eq!(
            protocol_error(Ws8610::with_line(sim, test_config())),
            Some(ProtocolError::DsrNotCleared)
        );
    }

    #[test]
    fn test_history_decodes_record() {
        let mut station = connect(console_with_records(3));
        let record = station.history(2).unwrap();

        assert_eq!(
            record,
            HistoryRecord {
                timestamp: start_time() + Duration::minutes(10),
                internal: reading(20.2, 42),
                external: vec![reading(-5.5, 90)],
            }
        );
    }

    #[test]
    fn test_history_is_idempotent_and_wraps() {
        let mut station = connect(console_with_records(3));
        let max = station.profile().max_records;

        let first = station.history(1).unwrap();
        assert_eq!(station.history(1).unwrap(), first);
        assert_eq!(station.history(max + 1).unwrap(), first);
        assert_eq!(station.history(3 * max + 1).unwrap(), first);
        assert_eq!(station.history_first().unwrap(), station.history(0).unwrap());
    }

    #[test]
    fn test_history_with_three_sensors() {
        let mut sim = SimulatedWs8610::new().with_sensor_count(3);
        let absent = SensorReading {
            temperature: None,
            humidity: None,
        };
        let external = [reading(1.5, 70), absent, reading(35.9, 12)];
        let record = encode_record(start_time(), reading(22.0, 50), &external).unwrap();
        sim.write_record(0, &record).unwrap();

        let mut station = connect(sim);
        let decoded = station.history(0).unwrap();
        assert_eq!(decoded.external, external.to_vec());
        assert_eq!(decoded.internal, reading(22.0, 50));
    }

    #[test]
    fn test_history_last_without_valid_probe() {
        let mut sim = console_with_records(4);
        sim.set_modtime(start_time() + Duration::minutes(15));
        let mut station = connect(sim);

        let last = station.history_last().unwrap();
        assert_eq!(last.timestamp, start_time() + Duration::minutes(15));
        assert_eq!(last, station.history(3).unwrap());
    }

    #[test]
    fn test_history_last_with_valid_probe() {
        let mut sim = console_with_records(5);
        sim.set_modtime(start_time() + Duration::minutes(15));
        let mut station = connect(sim);

        let last = station.history_last().unwrap();
        assert_eq!(last.timestamp, start_time() + Duration::minutes(20));
        assert_eq!(last, station.history(4).unwrap());
    }

    #[test]
    fn test_history_last_lands_on_erased_slot() {
        // only record 0 stored, modtime three intervals later
        let mut sim = console_with_records(1);
        sim.set_modtime(start_time() + Duration::minutes(15));
        let mut station = connect(sim);

        let last = station.history_last().unwrap_err();
        let third = station.history(3).unwrap_err();
        assert!(matches!(
            last.as_protocol(),
            Some(ProtocolError::InvalidTimestamp {
                year: 2165,
                month: 165,
                ..
            })
        ));
        assert_eq!(last.as_protocol(), third.as_protocol());
    }

    #[test]
    fn test_history_last_modtime_before_first_record() {
        let mut sim = console_with_records(1);
        sim.set_modtime(start_time() - Duration::minutes(30));
        let mut station = connect(sim);

        assert_eq!(station.history_last().unwrap().timestamp, start_time());
    }

    #[test]
    fn test_history_count_and_modtime() {
        let mut sim = console_with_records(1);
        sim.set_history_count(1234);
        sim.set_modtime(start_time() + Duration::minutes(45));
        let mut station = connect(sim);

        assert_eq!(station.history_count().unwrap(), 1234);
        assert_eq!(
            station.history_modtime().unwrap(),
            start_time() + Duration::minutes(45)
        );
    }

    #[test]
    fn test_history_reset() {
        let mut sim = console_with_records(1);
        sim.set_history_count(57);
        let mut station = connect(sim);

        station.history_reset().unwrap();
        assert_eq!(station.history_count().unwrap(), 0);
    }

    #[test]
    fn test_history_reset_not_acknowledged() {
        let mut sim = console_with_records(1).refusing_writes();
        sim.set_history_count(57);
        let mut station = connect(sim);

        let err = station.history_reset().unwrap_err();
        assert_eq!(err.as_protocol(), Some(&ProtocolError::ResetNotAcknowledged));
        assert_eq!(station.history_count().unwrap(), 57);
    }

    #[test]
    fn test_memory_dump() {
        let mut sim = SimulatedWs8610::new();
        sim.write_memory(0x7FF0, &[0x5A; 16]);
        let mut station = connect(sim);

        assert_eq!(station.memory(0x7FF0, 16).unwrap(), vec![0x5A; 16]);
    }

    #[test]
    fn test_memory_range_rejected_without_io() {
        let mut station = connect(SimulatedWs8610::new());
        let transfers = station.line().transfers();

        for (address, length) in [(0x7FF0, 17), (0x8000, 1), (0x0000, 0)] {
            let err = station.memory(address, length).unwrap_err();
            assert!(matches!(
                err.as_protocol(),
                Some(ProtocolError::AddressOutOfRange { .. })
            ));
        }
        assert_eq!(station.line().transfers(), transfers);
    }

    #[test]
    fn test_transient_glitch_is_retried() {
        // transfers 1 and 2 read the sensor count, 3 and 4 are the first record pair
        let sim = console_with_records(1).with_corrupted_transfers([3]);
        let mut station = connect(sim);

        assert_eq!(station.history(0).unwrap().timestamp, start_time());
        assert_eq!(station.line().transfers(), 6);
    }

    #[test]
    fn test_persistent_glitches_fail_bounded() {
        let sim = console_with_records(1).with_corrupted_transfers((3..1000).step_by(2));
        let mut station =
            Ws8610::with_line(sim, test_config().with_max_read_attempts(4)).unwrap();

        let err = station.history(0).unwrap_err();
        assert!(matches!(
            err.as_protocol(),
            Some(ProtocolError::ReadFailed { attempts: 4, .. })
        ));
        assert_eq!(station.line().transfers(), 2 + 8);
    }
}
