use num_complex::Complex32;

/// One-tap running average weight, matching the spectrum smoothing.
const ALPHA: f32 = 0.1;

/// Running average of block power, plus a matching average of the raw
/// I/Q mean (a cheap DC balance indicator). The first block seeds the
/// averages so the readout does not spend seconds climbing from zero.
#[derive(Debug, Default)]
pub struct PowerMeter {
    power_db: f32,
    iq_mean: Complex32,
    primed: bool,
}

impl PowerMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one block; returns the updated running average in dB.
    pub fn update(&mut self, iq: &[Complex32]) -> f32 {
        if iq.is_empty() {
            return self.power_db;
        }

        let mean = iq.iter().sum::<Complex32>() / iq.len() as f32;
        let block_db = iq
            .iter()
            .map(|s| 10.0 * s.norm_sqr().max(1e-20).log10())
            .sum::<f32>()
            / iq.len() as f32;

        if self.primed {
            self.power_db = self.power_db * (1.0 - ALPHA) + block_db * ALPHA;
            self.iq_mean = self.iq_mean * (1.0 - ALPHA) + mean * ALPHA;
        } else {
            self.power_db = block_db;
            self.iq_mean = mean;
            self.primed = true;
        }
        self.power_db
    }

    pub fn power_db(&self) -> f32 {
        self.power_db
    }

    /// Averaged raw I/Q mean; a big value here means a DC imbalance.
    pub fn dc_offset(&self) -> Complex32 {
        self.iq_mean
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn tone(n: usize, amp: f32) -> Vec<Complex32> {
        (0..n)
            .map(|i| {
                let phase = 2.0 * PI * i as f32 / 16.0;
                Complex32::new(phase.cos() * amp, phase.sin() * amp)
            })
            .collect()
    }

    #[test]
    fn unit_tone_reads_zero_db() {
        let mut meter = PowerMeter::new();
        let db = meter.update(&tone(1024, 1.0));
        assert!(db.abs() < 0.1, "got {} dB", db);
    }

    #[test]
    fn half_amplitude_reads_minus_six_db() {
        let mut meter = PowerMeter::new();
        let db = meter.update(&tone(1024, 0.5));
        assert!((db - (-6.02)).abs() < 0.1, "got {} dB", db);
    }

    #[test]
    fn average_tracks_a_level_change() {
        let mut meter = PowerMeter::new();
        meter.update(&tone(1024, 1.0));
        let mut db = 0.0;
        for _ in 0..100 {
            db = meter.update(&tone(1024, 0.1));
        }
        // converged to the new -20 dB level
        assert!((db - (-20.0)).abs() < 0.5, "got {} dB", db);
    }

    #[test]
    fn dc_offset_is_reported() {
        let mut meter = PowerMeter::new();
        let block = vec![Complex32::new(0.25, 0.0); 512];
        meter.update(&block);
        assert!((meter.dc_offset().re - 0.25).abs() < 1e-6);
    }

    #[test]
    fn empty_block_is_ignored() {
        let mut meter = PowerMeter::new();
        meter.update(&tone(64, 1.0));
        let before = meter.power_db();
        assert_eq!(meter.update(&[]), before);
    }
}
