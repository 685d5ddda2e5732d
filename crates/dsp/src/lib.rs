pub mod fft;
pub mod power;
pub mod spectrum;

pub use power::PowerMeter;
pub use spectrum::{Spectrum, SpectrumAccumulator};
