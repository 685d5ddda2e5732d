use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use num_complex::Complex32;

use crate::device::{self, DeviceInfo, Gain, TunerDriver, TuningRequest, TuningState};
use crate::{SampleBlock, SdrError};

/// Lifecycle of a device session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    Open,
    Streaming,
}

/// Owns one receiver handle from open to close.
///
/// Clones share the same underlying session, so the acquisition loop can
/// read while a controller retunes. The driver sits behind one mutex: a
/// configure call issued mid-read waits for the in-flight USB transfer,
/// at most one read timeout. `stop()` and `close()` only flip the
/// streaming flag before touching the driver, so they are never stuck
/// behind the read path for longer than that either.
#[derive(Clone)]
pub struct DeviceSession {
    inner: Arc<Inner>,
}

struct Inner {
    driver: Mutex<Option<Box<dyn TunerDriver>>>,
    tuning: Mutex<TuningState>,
    streaming: AtomicBool,
    read_chunk: usize,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl DeviceSession {
    /// Wrap an opened driver and push the power-on defaults to it:
    /// 100 MHz, 2.048 MS/s, AGC off with the lowest table gain.
    pub fn new(mut driver: Box<dyn TunerDriver>) -> Result<Self, SdrError> {
        let gain = match driver.tuner_gains().first().copied() {
            Some(g) => {
                driver.set_agc(false)?;
                driver.set_tuner_gain(g)?;
                Gain::Manual(g)
            }
            None => {
                driver.set_agc(true)?;
                Gain::Auto
            }
        };
        apply_frequency(driver.as_mut(), device::DEFAULT_FREQUENCY_HZ)?;
        driver.set_sample_rate(device::DEFAULT_SAMPLE_RATE_HZ)?;

        let tuning = TuningState {
            frequency_hz: device::DEFAULT_FREQUENCY_HZ,
            sample_rate_hz: device::DEFAULT_SAMPLE_RATE_HZ,
            gain,
            ppm_correction: 0,
            streaming: false,
        };
        Ok(Self {
            inner: Arc::new(Inner {
                driver: Mutex::new(Some(driver)),
                tuning: Mutex::new(tuning),
                streaming: AtomicBool::new(false),
                read_chunk: device::READ_CHUNK_BYTES,
            }),
        })
    }

    /// Enumerate attached dongles and claim the first one matching the
    /// selector.
    #[cfg(feature = "rtlsdr")]
    pub fn open(selector: &crate::device::DeviceSelector) -> Result<Self, SdrError> {
        Self::new(Box::new(crate::rtl::RtlDriver::open(selector)?))
    }

    pub fn state(&self) -> SessionState {
        if lock(&self.inner.driver).is_none() {
            SessionState::Closed
        } else if self.inner.streaming.load(Ordering::SeqCst) {
            SessionState::Streaming
        } else {
            SessionState::Open
        }
    }

    /// Consistent snapshot of the current tuning; never a mix of an
    /// in-progress configure's old and new values.
    pub fn tuning(&self) -> TuningState {
        let mut t = *lock(&self.inner.tuning);
        t.streaming = self.inner.streaming.load(Ordering::SeqCst);
        t
    }

    pub fn info(&self) -> Result<DeviceInfo, SdrError> {
        let guard = lock(&self.inner.driver);
        let drv = guard.as_ref().ok_or(SdrError::Closed)?;
        Ok(drv.info())
    }

    pub fn tuner_gains(&self) -> Result<Vec<i32>, SdrError> {
        let guard = lock(&self.inner.driver);
        let drv = guard.as_ref().ok_or(SdrError::Closed)?;
        Ok(drv.tuner_gains())
    }

    /// Complex samples per block at the current configuration.
    pub fn block_samples(&self) -> usize {
        self.inner.read_chunk / 2
    }

    /// Validate and apply a tuning change.
    ///
    /// Frequency, gain and ppm changes are legal while streaming (the
    /// retune serializes with the in-flight read on the driver mutex).
    /// Sample-rate changes require streaming stopped and fail with
    /// `StateConflict` otherwise, since the rate fixes the block length
    /// the pipeline is sized for. A rejected request leaves the prior
    /// tuning state untouched; the published snapshot always reflects
    /// exactly what the driver accepted.
    pub fn configure(&self, req: &TuningRequest) -> Result<TuningState, SdrError> {
        if let Some(hz) = req.frequency_hz {
            if !device::valid_frequency(hz) {
                return Err(SdrError::InvalidParameter(format!(
                    "frequency {} Hz outside 1..={} Hz",
                    hz,
                    device::TUNER_FREQ_MAX_HZ
                )));
            }
        }
        if let Some(rate) = req.sample_rate_hz {
            if !device::valid_sample_rate(rate) {
                return Err(SdrError::InvalidParameter(format!(
                    "sample rate {} Hz unsupported (225001-300000 or 900001-3200000)",
                    rate
                )));
            }
        }

        let mut guard = lock(&self.inner.driver);
        let drv = guard.as_mut().ok_or(SdrError::Closed)?;

        if req.sample_rate_hz.is_some() && self.inner.streaming.load(Ordering::SeqCst) {
            return Err(SdrError::StateConflict(
                "sample rate can only change while streaming is stopped".into(),
            ));
        }
        if let Some(Gain::Manual(g)) = req.gain {
            if !drv.tuner_gains().contains(&g) {
                return Err(SdrError::InvalidParameter(format!(
                    "gain {} not in the tuner gain table",
                    g
                )));
            }
        }

        let mut next = *lock(&self.inner.tuning);
        let applied = apply(drv, req, &mut next);

        // Publish what actually reached the driver, even on a partial
        // failure, so snapshots track device truth.
        next.streaming = self.inner.streaming.load(Ordering::SeqCst);
        *lock(&self.inner.tuning) = next;
        applied.map(|_| next)
    }

    /// Begin streaming. No-op if already streaming.
    pub fn start(&self) -> Result<(), SdrError> {
        let mut guard = lock(&self.inner.driver);
        let drv = guard.as_mut().ok_or(SdrError::Closed)?;
        if self.inner.streaming.load(Ordering::SeqCst) {
            return Ok(());
        }
        drv.reset_buffer()?;
        self.inner.streaming.store(true, Ordering::SeqCst);
        log::info!("streaming started");
        Ok(())
    }

    /// Stop streaming. Idempotent, never fails; an acquisition loop
    /// blocked in a read observes the flag on its next call.
    pub fn stop(&self) -> Result<(), SdrError> {
        if self.inner.streaming.swap(false, Ordering::SeqCst) {
            log::info!("streaming stopped");
        }
        Ok(())
    }

    /// Blocking read of one sample block. Acquisition-loop internal.
    pub fn read_block(&self, timeout: Duration) -> Result<SampleBlock, SdrError> {
        let mut guard = lock(&self.inner.driver);
        let drv = guard.as_mut().ok_or(SdrError::Closed)?;
        if !self.inner.streaming.load(Ordering::SeqCst) {
            return Err(SdrError::NotStreaming);
        }

        let mut raw = vec![0u8; self.inner.read_chunk];
        let n = drv.read_sync(&mut raw, timeout)?;
        if n == 0 {
            return Err(SdrError::Timeout);
        }

        let n = n - (n % 2);
        let mut data = Vec::with_capacity(n / 2);
        for pair in raw[..n].chunks_exact(2) {
            // Device bytes are I/Q pairs; reinterpret as signed and scale.
            data.push(Complex32::new(
                (pair[0] as i8) as f32 / 127.0,
                (pair[1] as i8) as f32 / 127.0,
            ));
        }
        Ok(SampleBlock { data, seq: 0 })
    }

    /// Release the device handle. Idempotent, legal from any state; a
    /// streaming session is stopped first.
    pub fn close(&self) {
        self.inner.streaming.store(false, Ordering::SeqCst);
        let mut guard = lock(&self.inner.driver);
        if guard.take().is_some() {
            log::info!("device closed");
        }
    }
}

fn apply(
    drv: &mut Box<dyn TunerDriver>,
    req: &TuningRequest,
    next: &mut TuningState,
) -> Result<(), SdrError> {
    if let Some(rate) = req.sample_rate_hz {
        drv.set_sample_rate(rate)?;
        next.sample_rate_hz = rate;
    }
    if let Some(hz) = req.frequency_hz {
        apply_frequency(drv.as_mut(), hz)?;
        next.frequency_hz = hz;
    }
    if let Some(gain) = req.gain {
        match gain {
            Gain::Auto => drv.set_agc(true)?,
            Gain::Manual(g) => {
                drv.set_agc(false)?;
                drv.set_tuner_gain(g)?;
            }
        }
        next.gain = gain;
    }
    if let Some(ppm) = req.ppm_correction {
        drv.set_ppm_correction(ppm)?;
        next.ppm_correction = ppm;
    }
    Ok(())
}

/// Below the tuner range the RTL2832 samples the RF input directly.
fn apply_frequency(drv: &mut dyn TunerDriver, hz: u32) -> Result<(), SdrError> {
    drv.set_direct_sampling(hz < device::TUNER_FREQ_MIN_HZ)?;
    drv.set_center_freq(hz)
}
