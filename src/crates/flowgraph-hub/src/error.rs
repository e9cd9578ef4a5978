//! Error types for hub operations

use thiserror::Error;

/// Convenience result type using [`HubError`]
pub type Result<T> = std::result::Result<T, HubError>;

/// Errors surfaced by the pause protocol
///
/// Broadcast failures never appear here: a listener that panics is logged and
/// suppressed, and a `resume` miss is reported through the returned boolean
/// plus a `resumeFailed` event rather than an error value.
#[derive(Error, Debug)]
pub enum HubError {
    /// The pause this waiter was attached to was replaced by a later
    /// registration under the same id, so it can never be resumed.
    ///
    /// Re-using a held pause id is a warning condition that replaces the
    /// resolver; the displaced waiter surfaces here instead of hanging
    /// forever.
    #[error("pause '{pause_id}' was replaced before being resumed")]
    Orphaned {
        /// Id of the displaced pause
        pause_id: String,
    },
}
