// Copyright 2025-2026 CEMAXECUTER LLC

use std::f32::consts::PI;
use std::thread;
use std::time::Duration;

use crate::device::{DeviceInfo, TunerDriver, TunerKind, DEFAULT_GAIN_TABLE};
use crate::SdrError;

/// Simulated tuner: a complex tone at a fixed offset from center over a
/// low dither floor, paced to the configured sample rate. Deterministic,
/// so tests and demos run without hardware.
pub struct SimDriver {
    freq: u32,
    rate: u32,
    gain: i32,
    agc: bool,
    ppm: i32,
    direct: bool,
    tone_offset_hz: f32,
    amplitude: f32,
    phase: f32,
    noise_state: u32,
}

impl SimDriver {
    pub fn new() -> Self {
        Self::with_tone(100_000.0, 0.5)
    }

    /// Tone `offset_hz` from the center frequency at `amplitude` (0..1).
    pub fn with_tone(offset_hz: f32, amplitude: f32) -> Self {
        Self {
            freq: 0,
            rate: 2_048_000,
            gain: 0,
            agc: false,
            ppm: 0,
            direct: false,
            tone_offset_hz: offset_hz,
            amplitude,
            phase: 0.0,
            noise_state: 0x2545_f491,
        }
    }

    /// xorshift32 dither so the floor is not exactly zero
    fn noise(&mut self) -> f32 {
        let mut x = self.noise_state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.noise_state = x;
        (x as f32 / u32::MAX as f32 - 0.5) * 0.02
    }
}

impl Default for SimDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl TunerDriver for SimDriver {
    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            name: "Simulated RTL2832U".into(),
            serial: "00000001".into(),
            tuner: TunerKind::R820t,
        }
    }

    fn tuner_gains(&self) -> Vec<i32> {
        DEFAULT_GAIN_TABLE.to_vec()
    }

    fn set_center_freq(&mut self, hz: u32) -> Result<(), SdrError> {
        self.freq = hz;
        Ok(())
    }

    fn set_sample_rate(&mut self, hz: u32) -> Result<(), SdrError> {
        self.rate = hz;
        Ok(())
    }

    fn set_tuner_gain(&mut self, tenths_db: i32) -> Result<(), SdrError> {
        self.gain = tenths_db;
        Ok(())
    }

    fn set_agc(&mut self, enable: bool) -> Result<(), SdrError> {
        self.agc = enable;
        Ok(())
    }

    fn set_ppm_correction(&mut self, ppm: i32) -> Result<(), SdrError> {
        self.ppm = ppm;
        Ok(())
    }

    fn set_direct_sampling(&mut self, enable: bool) -> Result<(), SdrError> {
        self.direct = enable;
        Ok(())
    }

    fn reset_buffer(&mut self) -> Result<(), SdrError> {
        self.phase = 0.0;
        Ok(())
    }

    fn read_sync(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize, SdrError> {
        let samples = buf.len() / 2;
        let step = 2.0 * PI * self.tone_offset_hz / self.rate as f32;
        for i in 0..samples {
            let re = self.phase.cos() * self.amplitude + self.noise();
            let im = self.phase.sin() * self.amplitude + self.noise();
            buf[i * 2] = (re * 127.0) as i8 as u8;
            buf[i * 2 + 1] = (im * 127.0) as i8 as u8;
            self.phase += step;
            if self.phase > PI {
                self.phase -= 2.0 * PI;
            }
        }
        // pace delivery like a real dongle
        thread::sleep(Duration::from_secs_f64(samples as f64 / self.rate as f64));
        Ok(samples * 2)
    }
}
