// A complete session against the simulated console
//
// No hardware needed: the simulator decodes the same line transitions a real
// WS8610 would. The example fills the history with a day of samples, injects
// a few bit errors and reads everything back.

use chrono::{Duration, NaiveDate};
use clap::Parser;
use lacrosse_ws8610::simulator::{encode_record, SimulatedWs8610};
use lacrosse_ws8610::{SensorReading, StationConfig, WeatherStation, Ws8610};

#[derive(Parser)]
#[command(name = "simulated_session")]
#[command(version = "1.0")]
#[command(about = "Run the WS8610 protocol against a simulated console")]
struct Args {
    /// External sensors on the simulated console (1-3)
    #[arg(short, long, default_value_t = 2)]
    sensors: u8,

    /// Number of records to store
    #[arg(short, long, default_value_t = 288)]
    records: usize,

    /// Corrupt every n-th transfer (0 disables)
    #[arg(short, long, default_value_t = 7)]
    glitch_every: usize,

    /// Reset the history count after reading
    #[arg(long)]
    reset: bool,

    /// Enable verbose logging
    #[arg(short, long)]
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

    let start = NaiveDate::from_ymd_opt(2023, 6, 15)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or("invalid start date")?;

    let mut console = SimulatedWs8610::new().with_sensor_count(args.sensors);
    for i in 0..args.records {
        let hour = (i % 288) as f64 / 12.0;
        let internal = SensorReading {
            temperature: Some(21.0 + (hour / 4.0).sin()),
            humidity: Some(45),
        };
        let outside = SensorReading {
            temperature: Some(12.0 + 6.0 * (hour / 24.0 * std::f64::consts::TAU).sin()),
            humidity: Some(80 - (i % 20) as u8),
        };
        let external = vec![outside; usize::from(args.sensors)];
        let timestamp = start + Duration::minutes(5 * i as i64);
        console.write_record(i, &encode_record(timestamp, internal, &external)?)?;
    }
    let last = start + Duration::minutes(5 * args.records.saturating_sub(1) as i64);
    console.set_modtime(last);
    console.set_history_count(u16::try_from(args.records.min(9999))?);
    if args.glitch_every > 0 {
        console = console.with_corrupted_transfers((1..100_000).step_by(args.glitch_every));
    }

    let config = StationConfig::default().with_dsr_polling(std::time::Duration::ZERO, 10);
    let mut station = Ws8610::with_line(console, config)?;

    println!("Simulated WS8610 Session");
    println!("========================");
    println!("External sensors: {}", station.external_sensors());
    println!("History count:    {}", station.history_count()?);
    println!("Last update:      {}", station.history_modtime()?.format("%Y-%m-%d %H:%M"));
    println!("First record:     {}", station.history_first()?);
    println!("Last record:      {}", station.history_last()?);
    println!(
        "\n{} transfers served so far",
        station.line().transfers()
    );

    if args.reset {
        station.history_reset()?;
        println!("History count after reset: {}", station.history_count()?);
    }

    Ok(())
}
