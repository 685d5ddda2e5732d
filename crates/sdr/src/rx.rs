use std::time::Duration;

use crossbeam::channel::{unbounded, Receiver as ErrorReceiver, Sender};

use crate::acquire::{self, AcquisitionHandle};
use crate::dispatch::{self, DispatchHandle};
use crate::ring::SampleRing;
use crate::session::{DeviceSession, SessionState};
use crate::{SampleBlock, SdrError};

/// Pipeline sizing and timing.
#[derive(Debug, Clone, Copy)]
pub struct ReceiverConfig {
    /// Ring capacity in blocks; drop-oldest beyond this.
    pub ring_capacity: usize,
    /// Upper bound on one device read.
    pub read_timeout: Duration,
    /// How long the consumer waits on an empty ring before rechecking.
    pub pop_timeout: Duration,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            ring_capacity: 64,
            read_timeout: Duration::from_millis(250),
            pop_timeout: Duration::from_millis(100),
        }
    }
}

/// Owns the whole receive pipeline: session, ring, acquisition thread
/// and consumer thread, plus the error channel both report on.
///
/// `start(handler)` begins a streaming run delivering every block to
/// `handler`; `stop()` ends the run and joins both threads; `close()`
/// additionally releases the device. Each run gets a fresh ring, so a
/// session that was halted by a device fault can simply be started
/// again. Errors (fatal device faults, handler panics) arrive on
/// `errors()`, separate from the sample path, each surfaced once.
pub struct Receiver {
    session: DeviceSession,
    config: ReceiverConfig,
    errors_tx: Sender<SdrError>,
    errors_rx: ErrorReceiver<SdrError>,
    workers: Option<Workers>,
}

struct Workers {
    ring: SampleRing,
    acquire: AcquisitionHandle,
    dispatch: DispatchHandle,
}

impl Receiver {
    pub fn new(session: DeviceSession, config: ReceiverConfig) -> Self {
        let (errors_tx, errors_rx) = unbounded();
        Self {
            session,
            config,
            errors_tx,
            errors_rx,
            workers: None,
        }
    }

    /// Start streaming into `handler`. No-op if already running; a
    /// pipeline whose acquisition died from a device fault is reaped
    /// and restarted.
    pub fn start<F>(&mut self, handler: F) -> Result<(), SdrError>
    where
        F: FnMut(SampleBlock) + Send + 'static,
    {
        if self.workers.is_some() {
            if self.session.state() == SessionState::Streaming {
                return Ok(());
            }
            self.stop();
        }

        self.session.start()?;
        let ring = SampleRing::new(self.config.ring_capacity);
        let acquire = acquire::spawn(
            self.session.clone(),
            ring.clone(),
            self.errors_tx.clone(),
            self.config.read_timeout,
        );
        let dispatch = dispatch::spawn(
            ring.clone(),
            handler,
            self.errors_tx.clone(),
            self.config.pop_timeout,
        );
        self.workers = Some(Workers {
            ring,
            acquire,
            dispatch,
        });
        Ok(())
    }

    /// Stop streaming and join both worker threads. Queued blocks are
    /// drained to the handler before its thread exits. Idempotent.
    pub fn stop(&mut self) {
        let _ = self.session.stop();
        if let Some(workers) = self.workers.take() {
            workers.acquire.join();
            workers.ring.close();
            workers.dispatch.join();
        }
    }

    /// Stop and release the device handle. Idempotent, callable from
    /// any state.
    pub fn close(&mut self) {
        self.stop();
        self.session.close();
    }

    /// Error channel shared by the acquisition loop and dispatch.
    pub fn errors(&self) -> &ErrorReceiver<SdrError> {
        &self.errors_rx
    }

    pub fn session(&self) -> &DeviceSession {
        &self.session
    }
}

impl Drop for Receiver {
    fn drop(&mut self) {
        self.close();
    }
}
