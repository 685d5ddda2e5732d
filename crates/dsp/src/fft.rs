use num_complex::Complex32;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// Forward FFT processor using rustfft.
///
/// Plans once and reuses scratch across calls; the spectrum accumulator
/// runs one of these per FFT window on the consumer thread.
pub struct ForwardFft {
    fft: Arc<dyn Fft<f32>>,
    size: usize,
    scratch: Vec<Complex32>,
}

impl ForwardFft {
    pub fn new(size: usize) -> Self {
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);
        let scratch_len = fft.get_inplace_scratch_len();
        Self {
            fft,
            size,
            scratch: vec![Complex32::new(0.0, 0.0); scratch_len],
        }
    }

    /// Perform an in-place FFT on a buffer of exactly `size` complex samples.
    pub fn process(&mut self, buffer: &mut [Complex32]) {
        assert_eq!(
            buffer.len(),
            self.size,
            "buffer length {} != FFT size {}",
            buffer.len(),
            self.size
        );
        self.fft.process_with_scratch(buffer, &mut self.scratch);
    }

    pub fn size(&self) -> usize {
        self.size
    }
}
