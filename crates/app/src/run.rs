use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use iqrx_dsp::{PowerMeter, SpectrumAccumulator};
use iqrx_sdr::control::ConfigController;
use iqrx_sdr::file::{FileDriver, SampleFormat};
use iqrx_sdr::sim::SimDriver;
use iqrx_sdr::{
    DeviceSession, Gain, Receiver, ReceiverConfig, TunerDriver, TuningRequest, TuningState,
};

use crate::Cli;

pub fn run(cli: &Cli) -> Result<()> {
    if cli.list {
        return list_devices();
    }

    let driver = build_driver(cli)?;
    let session = DeviceSession::new(driver).context("failed to initialize device")?;
    let info = session.info()?;
    log::info!(
        "opened {} (serial {}, {} tuner)",
        info.name,
        info.serial,
        info.tuner.name()
    );

    let controller = ConfigController::new(session.clone());
    let tuning = controller
        .apply(&TuningRequest {
            frequency_hz: Some(cli.freq),
            sample_rate_hz: Some(cli.rate),
            gain: Some(parse_gain(&cli.gain)?),
            ppm_correction: Some(cli.ppm),
        })
        .context("initial tuning rejected")?;
    log::info!(
        "tuned to {} MHz at {} MS/s",
        tuning.frequency_hz as f64 / 1e6,
        tuning.sample_rate_hz as f64 / 1e6
    );

    let mut receiver = Receiver::new(session, ReceiverConfig::default());
    if cli.spectrum {
        run_spectrum(&mut receiver, tuning, cli.seconds)
    } else {
        run_power(&mut receiver, cli.seconds)
    }
}

fn run_power(receiver: &mut Receiver, seconds: u64) -> Result<()> {
    let mut meter = PowerMeter::new();
    let mut blocks = 0u64;
    receiver.start(move |block| {
        let avg = meter.update(&block.data);
        blocks += 1;
        if blocks % 32 == 0 {
            println!("power: {:6.1} dB ({} blocks)", avg, blocks);
        }
    })?;
    wait_and_report(receiver, seconds)
}

fn run_spectrum(receiver: &mut Receiver, tuning: TuningState, seconds: u64) -> Result<()> {
    let mut acc = SpectrumAccumulator::new(tuning.sample_rate_hz, tuning.frequency_hz);
    receiver.start(move |block| {
        if let Some(frame) = acc.feed(&block.data) {
            let mut peak = 0usize;
            for (i, p) in frame.power_db.iter().enumerate() {
                if *p > frame.power_db[peak] {
                    peak = i;
                }
            }
            println!(
                "spectrum: peak {:10.4} MHz at {:6.1} dB ({} bins)",
                frame.freqs_mhz[peak],
                frame.power_db[peak],
                frame.power_db.len()
            );
        }
    })?;
    wait_and_report(receiver, seconds)
}

fn wait_and_report(receiver: &mut Receiver, seconds: u64) -> Result<()> {
    thread::sleep(Duration::from_secs(seconds));
    receiver.stop();

    let mut failed = false;
    while let Ok(err) = receiver.errors().try_recv() {
        eprintln!("pipeline error: {}", err);
        failed = true;
    }
    receiver.close();
    if failed {
        bail!("acquisition reported errors");
    }
    Ok(())
}

fn build_driver(cli: &Cli) -> Result<Box<dyn TunerDriver>> {
    if let Some(path) = &cli.file {
        let format = parse_format(&cli.format)?;
        return Ok(Box::new(FileDriver::open(path, format)?));
    }
    if cli.sim {
        return Ok(Box::new(SimDriver::new()));
    }

    #[cfg(feature = "rtlsdr")]
    {
        let selector = iqrx_sdr::DeviceSelector::Index(cli.device);
        return Ok(Box::new(iqrx_sdr::rtl::RtlDriver::open(&selector)?));
    }
    #[cfg(not(feature = "rtlsdr"))]
    bail!("built without librtlsdr support; use --sim or --file");
}

fn list_devices() -> Result<()> {
    #[cfg(feature = "rtlsdr")]
    {
        let names = iqrx_sdr::rtl::catalog();
        if names.is_empty() {
            println!("no devices found");
        }
        for (i, name) in names.iter().enumerate() {
            println!("{}: {}", i, name);
        }
    }
    #[cfg(not(feature = "rtlsdr"))]
    println!("built without librtlsdr support; only --sim and --file inputs are available");
    Ok(())
}

fn parse_gain(text: &str) -> Result<Gain> {
    if text.eq_ignore_ascii_case("auto") {
        return Ok(Gain::Auto);
    }
    let tenths: i32 = text
        .parse()
        .with_context(|| format!("invalid gain '{}' (tenths of a dB, or 'auto')", text))?;
    Ok(Gain::Manual(tenths))
}

fn parse_format(text: &str) -> Result<SampleFormat> {
    match text {
        "ci8" => Ok(SampleFormat::Ci8),
        "ci16" => Ok(SampleFormat::Ci16),
        "cf32" => Ok(SampleFormat::Cf32),
        other => bail!("unknown sample format: {} (use ci8, ci16, or cf32)", other),
    }
}
