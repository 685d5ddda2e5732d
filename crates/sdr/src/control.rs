use std::sync::{Arc, Mutex, TryLockError};

use crate::device::{TuningRequest, TuningState};
use crate::session::DeviceSession;
use crate::SdrError;

/// Serializes tuning changes onto a session.
///
/// At most one configuration change is in flight at a time; a request
/// arriving while another is running fails with `StateConflict` instead
/// of queueing, so radio state changes stay observable and debounced.
/// Callers are expected to commit whole requests (the edit-complete
/// event, not every keystroke). The acquisition and dispatch threads
/// never touch this gate, so tuning cannot stall the sample path beyond
/// the session's own configure-while-streaming semantics.
#[derive(Clone)]
pub struct ConfigController {
    session: DeviceSession,
    gate: Arc<Mutex<()>>,
}

impl ConfigController {
    pub fn new(session: DeviceSession) -> Self {
        Self {
            session,
            gate: Arc::new(Mutex::new(())),
        }
    }

    /// Apply one committed tuning request.
    pub fn apply(&self, req: &TuningRequest) -> Result<TuningState, SdrError> {
        let _guard = match self.gate.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                return Err(SdrError::StateConflict(
                    "another tuning change is in flight".into(),
                ))
            }
            Err(TryLockError::Poisoned(e)) => e.into_inner(),
        };
        self.session.configure(req)
    }

    pub fn tuning(&self) -> TuningState {
        self.session.tuning()
    }

    pub fn session(&self) -> &DeviceSession {
        &self.session
    }
}
