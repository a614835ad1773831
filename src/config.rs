use std::time::Duration;

/// Serial framing and line timing.
///
/// The UART data path only carries the wake-up block, so the framing is
/// incidental. What matters is that DTR/RTS stay under software control,
/// hence no flow control.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineConfig {
    pub baud_rate: u32,
    /// Wait after every line transition before the next one.
    pub settle_delay: Duration,
    pub read_timeout: Duration,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self {
            baud_rate: 300,
            settle_delay: Duration::from_micros(4),
            read_timeout: Duration::from_secs(1),
        }
    }
}

/// Session parameters for a WS8610 console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationConfig {
    pub line: LineConfig,
    /// Length of the filler block written to wake the receiver.
    pub wakeup_len: usize,
    pub wakeup_byte: u8,
    pub dsr_poll_interval: Duration,
    /// Polls per handshake phase before giving up.
    pub dsr_poll_limit: usize,
    /// Upper bound on verified-read attempts.
    pub max_read_attempts: usize,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            line: LineConfig::default(),
            wakeup_len: 448,
            wakeup_byte: b'U',
            dsr_poll_interval: Duration::from_millis(10),
            dsr_poll_limit: 500,
            max_read_attempts: 20,
        }
    }
}

impl StationConfig {
    pub fn with_max_read_attempts(mut self, attempts: usize) -> Self {
        self.max_read_attempts = attempts;
        self
    }

    pub fn with_dsr_polling(mut self, interval: Duration, limit: usize) -> Self {
        self.dsr_poll_interval = interval;
        self.dsr_poll_limit = limit;
        self
    }
}
