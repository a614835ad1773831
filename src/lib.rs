//! # LaCrosse WS8610
//!
//! A Rust library for reading the history memory of a LaCrosse WS8610 weather
//! station console over its bit-banged serial interface.
//!
//! The console does not speak a byte-oriented protocol on the UART. Instead the
//! host clocks single bits with the DTR line, sends them on RTS and receives
//! them on CTS. This crate layers a framer, a retrying transfer and the
//! console's memory layout on top of those four modem lines.
//!
//! ## Features
//!
//! - **Exclusive device access**: Uses `serialport` and locks the device for the session
//! - **Verified reads**: Every read is repeated until two transfers agree
//! - **History decoding**: BCD records, timestamps and absent-sensor markers into typed values
//! - **Simulated console**: A software model of the device for tests and demos
//! - **Type safety**: Strong typing and error handling throughout
//!
//! ## Examples
//!
//! ### Reading the newest record
//!
//! ```rust,no_run
//! use lacrosse_ws8610::{WeatherStation, Ws8610};
//!
//! let mut station = Ws8610::open("/dev/ttyUSB0")?;
//! println!("{} external sensor(s)", station.external_sensors());
//!
//! let record = station.history_last()?;
//! println!("{}", record);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ### Against the simulator
//!
//! ```rust
//! use lacrosse_ws8610::simulator::SimulatedWs8610;
//! use lacrosse_ws8610::{StationConfig, WeatherStation, Ws8610};
//! use std::time::Duration;
//!
//! let mut console = SimulatedWs8610::new().with_sensor_count(2);
//! console.set_history_count(12);
//!
//! let config = StationConfig::default().with_dsr_polling(Duration::ZERO, 10);
//! let mut station = Ws8610::with_line(console, config)?;
//! assert_eq!(station.external_sensors(), 2);
//! assert_eq!(station.history_count()?, 12);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod bcd;
pub mod config;
pub mod error;
pub mod framer;
pub mod memory_map;
pub mod profile;
pub mod record;
pub mod serial_line;
pub mod simulator;
pub mod station;
pub mod transfer;
pub mod ws8610;

// Re-export the main types for convenience
pub use config::{LineConfig, StationConfig};

pub use error::{HardwareError, ProtocolError, WeatherError};

pub use memory_map::Address;

pub use record::{HistoryRecord, SensorReading};

pub use serial_line::{ControlLines, SerialLine};

pub use station::WeatherStation;

pub use ws8610::Ws8610;
