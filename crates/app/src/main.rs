mod run;

use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "iqrx")]
#[command(about = "RTL-SDR I/Q acquisition, power and spectrum monitor")]
struct Cli {
    /// List attached devices and exit
    #[arg(long)]
    list: bool,

    /// Device index
    #[arg(short = 'd', long, default_value = "0")]
    device: usize,

    /// Use the simulated tuner instead of hardware
    #[arg(long)]
    sim: bool,

    /// IQ file input (for offline playback)
    #[arg(short = 'f', long)]
    file: Option<PathBuf>,

    /// Sample format for file input: ci8, ci16, cf32
    #[arg(long, default_value = "ci8")]
    format: String,

    /// Center frequency in Hz
    #[arg(short = 'c', long, default_value = "88500000")]
    freq: u32,

    /// Sample rate in Hz
    #[arg(short = 'r', long, default_value = "2048000")]
    rate: u32,

    /// Tuner gain in tenths of a dB, or "auto"
    #[arg(short = 'g', long, default_value = "auto")]
    gain: String,

    /// Frequency correction in ppm
    #[arg(long, default_value = "0")]
    ppm: i32,

    /// How long to run, in seconds
    #[arg(short = 's', long, default_value = "2")]
    seconds: u64,

    /// Print spectrum peaks instead of average power
    #[arg(long)]
    spectrum: bool,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(e) = run::run(&cli) {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}
