pub mod acquire;
pub mod control;
pub mod device;
pub mod dispatch;
mod error;
pub mod file;
pub mod ring;
#[cfg(feature = "rtlsdr")]
pub mod rtl;
pub mod rx;
pub mod session;
pub mod sim;

use num_complex::Complex32;

pub use control::ConfigController;
pub use device::{
    DeviceInfo, DeviceSelector, Gain, TunerDriver, TunerKind, TuningRequest, TuningState,
};
pub use error::SdrError;
pub use ring::{PushOutcome, SampleRing};
pub use rx::{Receiver, ReceiverConfig};
pub use session::{DeviceSession, SessionState};

/// Sample block: one read chunk of complex I/Q samples.
///
/// Produced by the acquisition loop and handed through the ring buffer to
/// the consumer by value; never shared mutably between threads.
#[derive(Debug, Clone)]
pub struct SampleBlock {
    /// Complex samples scaled to roughly [-1.0, 1.0].
    pub data: Vec<Complex32>,
    /// Acquisition order, starting at 0 for each streaming run.
    pub seq: u64,
}
