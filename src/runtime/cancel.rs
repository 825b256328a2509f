//! Cancellation context attached to a script runtime.

use std::fmt;
use std::sync::{Arc, OnceLock};

/// Why a runtime was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The host (UI, controller, signal handler) asked the game to stop.
    Requested,
    /// The watchdog countdown reached zero.
    Timeout,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Requested => f.write_str("canceled by host"),
            CancelReason::Timeout => f.write_str("watchdog timeout"),
        }
    }
}

/// A cloneable, thread-safe cancellation flag.
///
/// The first call to [`CancelToken::cancel`] wins; later reasons are ignored.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    reason: Arc<OnceLock<CancelReason>>,
}

impl CancelToken {
    /// Create a token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel with the given reason. Returns `false` if already cancelled.
    pub fn cancel(&self, reason: CancelReason) -> bool {
        self.reason.set(reason).is_ok()
    }

    /// Whether the token has fired.
    pub fn is_cancelled(&self) -> bool {
        self.reason.get().is_some()
    }

    /// The reason of the first cancellation, if any.
    pub fn reason(&self) -> Option<CancelReason> {
        self.reason.get().copied()
    }
}
