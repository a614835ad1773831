// Hex dump of console memory
//
// Reads a range of the console's memory with verified reads and prints it
// sixteen bytes per row, e.g. to inspect the history buffer by hand.

use clap::Parser;
use lacrosse_ws8610::Ws8610;

const ROW: usize = 16;

fn parse_address(s: &str) -> Result<u16, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    u16::from_str_radix(digits, 16).map_err(|e| format!("invalid address '{}': {}", s, e))
}

#[derive(Parser)]
#[command(name = "dump_memory")]
#[command(version = "1.0")]
#[command(about = "Dump a memory range of a LaCrosse WS8610 as hex")]
struct Args {
    /// Serial device the console is attached to
    device: String,

    /// Start address in hex
    #[arg(short, long, default_value = "0x0000", value_parser = parse_address)]
    start: u16,

    /// Number of bytes to dump
    #[arg(short, long, default_value_t = 0x80)]
    length: usize,

    /// Bytes per verified read
    #[arg(short, long, default_value_t = 32)]
    chunk: usize,

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

    let mut station = Ws8610::open(&args.device)?;

    let mut data = Vec::with_capacity(args.length);
    let mut address = usize::from(args.start);
    let end = address + args.length;
    while address < end {
        let len = args.chunk.max(1).min(end - address);
        let start = u16::try_from(address)?;
        data.extend(station.memory(start, len)?);
        address += len;
    }

    for (row, bytes) in data.chunks(ROW).enumerate() {
        let hex: Vec<String> = bytes.iter().map(|b| format!("{:02x}", b)).collect();
        println!("{:04x}: {}", usize::from(args.start) + row * ROW, hex.join(" "));
    }

    Ok(())
}
