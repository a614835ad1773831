use crate::error::WeatherError;
use crate::record::HistoryRecord;
use chrono::NaiveDateTime;

/// History access common to LaCrosse station models.
///
/// Each model implements this on its own; there is no shared state between
/// implementations.
pub trait WeatherStation {
    /// Number of external sensors the console reports.
    fn external_sensors(&self) -> u8;

    /// Record `record_no`, counted from the oldest. Numbers past the end of
    /// the circular buffer wrap around.
    fn history(&mut self, record_no: usize) -> Result<HistoryRecord, WeatherError>;

    /// Number of records the console claims to have stored.
    fn history_count(&mut self) -> Result<u16, WeatherError>;

    /// When the console last wrote a history record.
    fn history_modtime(&mut self) -> Result<NaiveDateTime, WeatherError>;

    fn history_first(&mut self) -> Result<HistoryRecord, WeatherError> {
        self.history(0)
    }

    fn history_last(&mut self) -> Result<HistoryRecord, WeatherError>;

    /// Make the console start recording from the beginning of its buffer.
    fn history_reset(&mut self) -> Result<(), WeatherError>;
}
