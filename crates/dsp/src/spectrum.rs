use num_complex::Complex32;

use crate::fft::ForwardFft;

/// One spectrum frame handed to the display sink.
#[derive(Debug, Clone)]
pub struct Spectrum {
    /// Bin center frequencies in MHz, ascending.
    pub freqs_mhz: Vec<f64>,
    /// Smoothed power per bin in dB.
    pub power_db: Vec<f32>,
}

const DEFAULT_FFT_SIZE: usize = 4096;
/// Emit one frame per this many FFT windows, keeping the display rate
/// bounded regardless of the sample rate.
const DEFAULT_EMIT_EVERY: u32 = 20;
/// One-tap smoothing of the displayed power.
const SMOOTHING: f32 = 0.1;
/// One-tap DC offset tracker.
const DC_ALPHA: f32 = 0.01;

/// Turns raw I/Q blocks into smoothed, rate-limited spectrum frames.
///
/// Per incoming block: track and remove the DC offset. Per FFT window:
/// transform, scale by 1/N, center with fftshift, keep the middle half
/// of the bins (the band edges are dominated by the anti-alias rolloff),
/// convert to dB and fold into a running average. Every `emit_every`
/// windows the averaged frame is returned together with its frequency
/// axis, computed here from the tuning this accumulator was given --
/// never as a side effect of retuning the device.
pub struct SpectrumAccumulator {
    fft: ForwardFft,
    fft_size: usize,
    emit_every: u32,
    sample_rate_hz: u32,
    center_freq_hz: u32,
    pending: Vec<Complex32>,
    window: Vec<Complex32>,
    pwr: Vec<f32>,
    dc: Complex32,
    frames: u32,
}

impl SpectrumAccumulator {
    pub fn new(sample_rate_hz: u32, center_freq_hz: u32) -> Self {
        Self::with_params(DEFAULT_FFT_SIZE, DEFAULT_EMIT_EVERY, sample_rate_hz, center_freq_hz)
    }

    pub fn with_params(
        fft_size: usize,
        emit_every: u32,
        sample_rate_hz: u32,
        center_freq_hz: u32,
    ) -> Self {
        assert!(fft_size >= 4 && fft_size % 4 == 0, "FFT size must be a multiple of 4");
        Self {
            fft: ForwardFft::new(fft_size),
            fft_size,
            emit_every,
            sample_rate_hz,
            center_freq_hz,
            pending: Vec::with_capacity(2 * fft_size),
            window: vec![Complex32::new(0.0, 0.0); fft_size],
            pwr: vec![0.0; fft_size / 2],
            dc: Complex32::new(0.0, 0.0),
            frames: 0,
        }
    }

    /// Retune the axis; the next emitted frame uses the new center.
    pub fn set_center_freq(&mut self, hz: u32) {
        self.center_freq_hz = hz;
    }

    /// Feed one block; returns a frame when one is due (the most recent
    /// if several windows completed in this call).
    pub fn feed(&mut self, iq: &[Complex32]) -> Option<Spectrum> {
        if iq.is_empty() {
            return None;
        }

        let mean = iq.iter().sum::<Complex32>() / iq.len() as f32;
        self.dc = self.dc * (1.0 - DC_ALPHA) + mean * DC_ALPHA;
        let dc = self.dc;
        self.pending.extend(iq.iter().map(|s| s - dc));

        let mut out = None;
        while self.pending.len() >= self.fft_size {
            self.window.clear();
            self.window.extend(self.pending.drain(..self.fft_size));
            self.fft.process(&mut self.window);

            let n = self.fft_size;
            let quarter = n / 4;
            let scale = 1.0 / n as f32;
            // fftshift then keep the middle half: shifted index i maps to
            // raw bin (i + n/2) % n, and the slice starts at quarter
            for (i, slot) in self.pwr.iter_mut().enumerate() {
                let raw = (i + quarter + n / 2) % n;
                let s = self.window[raw] * scale;
                let p = 10.0 * s.norm_sqr().max(1e-20).log10();
                *slot = *slot * (1.0 - SMOOTHING) + p * SMOOTHING;
            }

            self.frames += 1;
            if self.frames > self.emit_every {
                self.frames = 0;
                out = Some(Spectrum {
                    freqs_mhz: self.frequency_axis(),
                    power_db: self.pwr.clone(),
                });
            }
        }
        out
    }

    /// Bin centers in MHz for the displayed (middle) half of the band.
    pub fn frequency_axis(&self) -> Vec<f64> {
        let n = self.fft_size;
        let quarter = n / 4;
        let rate = self.sample_rate_hz as f64;
        let center = self.center_freq_hz as f64;
        (0..n / 2)
            .map(|i| {
                // shifted bin index relative to DC at the middle
                let k = (i + quarter) as f64 - (n / 2) as f64;
                (center + k * rate / n as f64) / 1e6
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn tone(n: usize, freq_hz: f32, rate_hz: f32, amp: f32) -> Vec<Complex32> {
        (0..n)
            .map(|i| {
                let phase = 2.0 * PI * freq_hz * i as f32 / rate_hz;
                Complex32::new(phase.cos() * amp, phase.sin() * amp)
            })
            .collect()
    }

    #[test]
    fn axis_is_centered_and_spans_half_the_rate() {
        let acc = SpectrumAccumulator::with_params(256, 1, 2_048_000, 100_000_000);
        let axis = acc.frequency_axis();
        assert_eq!(axis.len(), 128);
        // DC bin sits at the middle of the slice
        assert!((axis[64] - 100.0).abs() < 1e-9);
        // slice spans center +/- rate/4
        assert!((axis[0] - (100.0 - 2.048 / 4.0)).abs() < 1e-3);
        assert!(axis.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn tone_lands_in_the_right_bin() {
        let rate = 256_000u32;
        let acc_center = 100_000_000u32;
        let mut acc = SpectrumAccumulator::with_params(256, 1, rate, acc_center);

        // +32 kHz tone: well inside the displayed middle half
        let samples = tone(256 * 8, 32_000.0, rate as f32, 1.0);
        let mut last = None;
        for chunk in samples.chunks(256) {
            if let Some(frame) = acc.feed(chunk) {
                last = Some(frame);
            }
        }
        let frame = last.expect("no frame emitted");

        let peak = frame
            .power_db
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .unwrap()
            .0;
        let peak_mhz = frame.freqs_mhz[peak];
        assert!(
            (peak_mhz - 100.032).abs() < 0.002,
            "peak at {} MHz, expected ~100.032",
            peak_mhz
        );
    }

    #[test]
    fn emission_is_rate_limited() {
        let mut acc = SpectrumAccumulator::with_params(256, 20, 256_000, 100_000_000);
        let block = tone(256, 10_000.0, 256_000.0, 0.5);
        let mut emitted = 0;
        // 42 windows -> exactly 2 frames at one per 21 windows
        for _ in 0..42 {
            if acc.feed(&block).is_some() {
                emitted += 1;
            }
        }
        assert_eq!(emitted, 2);
    }

    #[test]
    fn dc_offset_is_tracked_out() {
        let rate = 128_000u32;
        let mut acc = SpectrumAccumulator::with_params(128, 1, rate, 50_000_000);
        let block = vec![Complex32::new(0.5, 0.25); 128];
        let mut last = None;
        for _ in 0..200 {
            if let Some(frame) = acc.feed(&block) {
                last = Some(frame);
            }
        }
        let frame = last.expect("no frame emitted");
        // DC bin is at the middle of the slice; the tracker has soaked
        // up most of the offset by now
        let dc_bin = frame.power_db[frame.power_db.len() / 2];
        assert!(dc_bin < -15.0, "DC bin still at {} dB", dc_bin);
    }

    #[test]
    fn retune_moves_the_axis() {
        let mut acc = SpectrumAccumulator::with_params(256, 1, 2_048_000, 100_000_000);
        acc.set_center_freq(88_500_000);
        let axis = acc.frequency_axis();
        assert!((axis[128] - 88.5).abs() < 1e-9);
    }
}
