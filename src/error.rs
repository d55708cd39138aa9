//! # Error Module - Failure Kinds of the Guidance Core
//!
//! Every fallible operation in the library returns [`GuidanceError`]. The
//! variants mirror how failures are recovered: numeric failures unmount the
//! tracker model and drop back to idle, a missing frame is recovered locally
//! by skipping the tick, and state errors are logged and ignored.

use thiserror::Error;

/// Errors raised by the guidance core and its collaborators.
#[derive(Debug, Error)]
pub enum GuidanceError {
    /// A linear-algebra routine failed to converge or produced an
    /// inconsistent shape (SVD/QR non-convergence, NaN in particle state,
    /// zero-norm basis). Forces the tracker back to idle.
    #[error("numeric failure: {0}")]
    Numeric(String),

    /// The frame source had no frame available. Recovered locally by
    /// skipping the tracker tick.
    #[error("no frame available")]
    FrameUnavailable,

    /// An operation was invoked from an incompatible state, e.g. `init`
    /// without an initial box. Logged and ignored by the caller.
    #[error("invalid state: {0}")]
    State(String),

    /// A worker queue closed while the sending side was still running,
    /// i.e. the consuming worker is dead.
    #[error("channel closed: {0}")]
    ChannelClosed(&'static str),

    /// Failure on the datagram link to the simulator or controller.
    #[error("link failure: {0}")]
    Link(String),

    /// Configuration file could not be read or parsed.
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the library.
pub type Result<T> = std::result::Result<T, GuidanceError>;
