use chrono::NaiveDateTime;
use std::fmt;

/// One sensor's values from a history record. `None` means the console
/// reported the sensor as absent or faulty.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    /// Degrees Celsius.
    pub temperature: Option<f64>,
    /// Relative humidity in percent.
    pub humidity: Option<u8>,
}

/// A decoded history sample.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRecord {
    pub timestamp: NaiveDateTime,
    pub internal: SensorReading,
    /// Zero to three external sensors, in sensor order.
    pub external: Vec<SensorReading>,
}

impl fmt::Display for SensorReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.temperature {
            Some(t) => write!(f, "{:.1}°C", t)?,
            None => write!(f, "-°C")?,
        }
        match self.humidity {
            Some(h) => write!(f, " {}%", h),
            None => write!(f, " -%"),
        }
    }
}

impl fmt::Display for HistoryRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.internal)?;
        if !self.external.is_empty() {
            let external: Vec<String> = self.external.iter().map(ToString::to_string).collect();
            write!(f, " ({})", external.join(", "))?;
        }
        write!(f, " at {}", self.timestamp.format("%Y-%m-%d %H:%M"))
    }
}
