// ── Error types ──
//
// Two layers, mirroring the backend/core split: `BackendError` is what the
// external collaborators (device backend, descriptor parser) return;
// `WatchError` is what consumers of the watcher see. Per-device backend
// failures never surface raw through the public API — they are reported
// through the report channel and the offending device is skipped.

use thiserror::Error;

/// Failures produced by the external device backend or descriptor parser.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Enumerating the attached device set failed as a whole.
    #[error("device enumeration failed: {0}")]
    Enumerate(String),

    /// Reading a single device failed (open, I/O, permission).
    #[error("I/O error on {path}: {reason}")]
    Io { path: String, reason: String },

    /// The raw report descriptor could not be parsed structurally.
    #[error("descriptor parse error: {0}")]
    Parse(String),

    /// The backend cannot deliver topology-change notifications.
    #[error("hot-plug notifications unavailable: {0}")]
    WatchUnavailable(String),
}

impl BackendError {
    /// Convenience constructor for per-device read failures.
    pub fn io(path: impl Into<String>, reason: impl ToString) -> Self {
        Self::Io {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Unified error type for the public watcher surface.
#[derive(Debug, Error)]
pub enum WatchError {
    /// The watcher has been torn down; every subsequent operation fails
    /// with this variant.
    #[error("device watcher has been torn down")]
    Disposed,

    /// A caller-supplied cancellation token fired while waiting.
    #[error("wait cancelled")]
    Cancelled,

    /// A whole-pass backend failure, surfaced on the report channel and
    /// wrapped here for internal propagation.
    #[error(transparent)]
    Backend(#[from] BackendError),
}
