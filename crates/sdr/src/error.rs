use thiserror::Error;

/// Errors surfaced by the device session and the acquisition pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SdrError {
    /// No device matched the selector.
    #[error("no matching device found")]
    DeviceNotFound,

    /// The device exists but is claimed by another process.
    #[error("device busy")]
    DeviceBusy,

    /// A tuning value is outside what the device supports. The previous
    /// tuning state is left untouched.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// The request conflicts with the current session state, e.g. a
    /// sample-rate change while streaming or a second in-flight configure.
    #[error("state conflict: {0}")]
    StateConflict(String),

    /// A read produced no samples within the timeout. Transient.
    #[error("read timed out")]
    Timeout,

    /// A read was attempted while the session is not streaming.
    #[error("session is not streaming")]
    NotStreaming,

    /// The device failed. Fatal to the current streaming run; the session
    /// stays open so the caller may retry start().
    #[error("device error: {0}")]
    DeviceError(String),

    /// Operation attempted after close()/shutdown.
    #[error("closed")]
    Closed,

    /// A consumer handler panicked. Caught at the dispatch boundary and
    /// reported here; dispatch itself keeps running.
    #[error("consumer handler panicked: {0}")]
    HandlerPanic(String),
}
