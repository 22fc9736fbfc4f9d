//! Bridge error types.
//!
//! All bridge subsystems surface errors through [`BridgeError`], which is the
//! single error type returned by every public API in this crate.  Only
//! [`BridgeError::GuestPanic`] and [`BridgeError::Trap`] end a session; the
//! memory and graphics variants are contained inside the host function that
//! raised them.

use crate::panic::PanicRecord;

/// Unified error type for the host/guest bridge.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Fetching, compiling or instantiating the module failed.
    #[error("module load failed: {reason}")]
    LoadFailure {
        /// Human-readable description of what went wrong.
        reason: String,
    },

    /// The module does not export a required entry point or memory.
    #[error("module is missing required export `{name}`")]
    MissingEntryPoint {
        /// Name of the absent export.
        name: String,
    },

    /// A byte range does not lie within the current linear memory.
    #[error("out of bounds: range {offset}+{len} exceeds memory size {size}")]
    OutOfBounds {
        /// Start offset requested by the guest.
        offset: u64,
        /// Length requested by the guest.
        len: u64,
        /// Current memory size in bytes.
        size: u64,
    },

    /// Linear memory could not be grown by the requested page count.
    #[error("memory growth by {requested} pages failed at {current} pages: {reason}")]
    MemoryGrowth {
        /// Pages requested.
        requested: u64,
        /// Page count before the request.
        current: u64,
        /// Reason reported by the runtime.
        reason: String,
    },

    /// The guest reported an unrecoverable fault through `js_panic`.
    #[error("guest panic: {0}")]
    GuestPanic(PanicRecord),

    /// The graphics context could not be created or has been lost.
    #[error("graphics context unavailable: {reason}")]
    GraphicsUnavailable {
        /// Human-readable description of what went wrong.
        reason: String,
    },

    /// The guest trapped for a reason other than a reported panic.
    #[error("wasm trap: {0}")]
    Trap(String),

    /// The configuration file could not be parsed.
    #[error("config error: {0}")]
    Config(String),

    /// An I/O error occurred (e.g. reading a `.wasm` file from disk).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Returns `true` if the error ends the session.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::GuestPanic(_) | Self::Trap(_))
    }
}

/// Convenience alias used throughout the bridge crate.
pub type Result<T> = std::result::Result<T, BridgeError>;
