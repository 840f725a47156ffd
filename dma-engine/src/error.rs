//! Error types for engine operations.

use core::fmt;

/// Engine result type.
pub type Result<T, E = Error> = core::result::Result<T, E>;

/// Engine error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Invalid channel index, element index, or edit size.
    InvalidArgument,
    /// Bus mastering is disabled; no transfer can be started.
    AccessDenied,
    /// The response queue has too few free slots right now. Carries the
    /// drain counter observed at refresh time; retry once it has moved.
    WouldBlock { drain_count: u32 },
    /// A blocking wait was interrupted by engine shutdown.
    Interrupted,
    /// A polled transfer did not leave the running state in time.
    Timeout,
    /// A chain fill produced a different element count than planned.
    ChainMismatch,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArgument => write!(f, "Invalid argument"),
            Error::AccessDenied => write!(f, "Bus mastering disabled"),
            Error::WouldBlock { drain_count } => {
                write!(f, "Response queue full (drain count {})", drain_count)
            }
            Error::Interrupted => write!(f, "Interrupted by shutdown"),
            Error::Timeout => write!(f, "Transfer poll timeout"),
            Error::ChainMismatch => write!(f, "Descriptor chain element count mismatch"),
        }
    }
}

impl std::error::Error for Error {}
