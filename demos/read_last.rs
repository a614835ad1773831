// Read the newest history record from a WS8610 console
//
// This example connects to a console on a serial device, prints what it
// learned during the handshake and then the oldest and newest records.

use clap::Parser;
use lacrosse_ws8610::{StationConfig, WeatherStation, Ws8610};

#[derive(Parser)]
#[command(name = "read_last")]
#[command(version = "1.0")]
#[command(about = "Read the newest history record from a LaCrosse WS8610")]
struct Args {
    /// Serial device the console is attached to
    #[arg(default_value = "/dev/ttyUSB0")]
    device: String,

    /// Read attempts before a record is reported as unreadable
    #[arg(short, long, default_value_t = 20)]
    attempts: usize,

    /// Enable verbose logging
    #[arg(short, long, help = "Show protocol debug logs")]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    if args.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::init();
    }

    println!("LaCrosse WS8610 History Reader");
    println!("==============================");
    println!("Device: {}\n", args.device);

    let config = StationConfig::default().with_max_read_attempts(args.attempts);
    let mut station = Ws8610::open_with_config(&args.device, config)?;

    let profile = station.profile();
    println!(
        "{} external sensor(s), {} bytes per record, room for {} records",
        profile.external_sensors, profile.record_size, profile.max_records
    );
    println!("Stored records: {}", station.history_count()?);
    println!("Last update:    {}", station.history_modtime()?.format("%Y-%m-%d %H:%M"));
    println!();

    println!("First: {}", station.history_first()?);
    println!("Last:  {}", station.history_last()?);

    Ok(())
}
