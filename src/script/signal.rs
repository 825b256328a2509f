//! Host control-flow signals carried through the Lua error channel.
//!
//! Host functions abort the running script by returning a [`HostSignal`]
//! wrapped in `mlua::Error::external`. The signal keeps its type across
//! `CallbackError` layers, so the script-call boundary can classify the
//! outcome by downcasting instead of inspecting message text. Each signal
//! still renders as a fixed marker string; that text is matched only when
//! the typed payload was lost, e.g. after a script stringified the error
//! and re-raised it.

use mlua::Error as LuaError;

use crate::runtime::CancelReason;
use crate::{EraError, Result};

/// Marker text of [`HostSignal::Quit`].
pub const QUIT_MARKER: &str = "@@eraflow:quit@@";
/// Marker text of [`HostSignal::SceneNext`].
pub const SCENE_NEXT_MARKER: &str = "@@eraflow:scene-next@@";
/// Marker text of [`HostSignal::LongReturn`].
pub const LONG_RETURN_MARKER: &str = "@@eraflow:long-return@@";
/// Marker text of [`HostSignal::Cancelled`].
pub const CANCEL_MARKER: &str = "context canceled";

/// A host control-flow request raised from inside a script call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HostSignal {
    /// End the game.
    #[error("{}", QUIT_MARKER)]
    Quit,
    /// Leave the current scene for the pre-set next scene.
    #[error("{}", SCENE_NEXT_MARKER)]
    SceneNext,
    /// Unwind to the top-level script call, which then reports success.
    #[error("{}", LONG_RETURN_MARKER)]
    LongReturn,
    /// The runtime's cancellation context fired.
    #[error("context canceled: {0}")]
    Cancelled(CancelReason),
}

impl HostSignal {
    /// Recognize a signal from message text. First match wins.
    pub fn from_message(message: &str) -> Option<HostSignal> {
        if message.contains(QUIT_MARKER) {
            Some(HostSignal::Quit)
        } else if message.contains(SCENE_NEXT_MARKER) {
            Some(HostSignal::SceneNext)
        } else if message.contains(LONG_RETURN_MARKER) {
            Some(HostSignal::LongReturn)
        } else if message.contains(CANCEL_MARKER) {
            let reason = if message.contains(&CancelReason::Timeout.to_string()) {
                CancelReason::Timeout
            } else {
                CancelReason::Requested
            };
            Some(HostSignal::Cancelled(reason))
        } else {
            None
        }
    }
}

/// Find the typed signal inside an mlua error chain.
fn typed_signal(err: &LuaError) -> Option<HostSignal> {
    match err {
        LuaError::CallbackError { cause, .. } => typed_signal(cause),
        LuaError::ExternalError(inner) => inner.as_ref().downcast_ref::<HostSignal>().copied(),
        _ => None,
    }
}

/// Classify an error raised at the script boundary.
///
/// Returns `None` for ordinary script errors.
pub fn classify(err: &LuaError) -> Option<HostSignal> {
    typed_signal(err).or_else(|| HostSignal::from_message(&err.to_string()))
}

/// Find a host error (raised by an I/O collaborator or a task) in the chain.
fn host_error(err: &LuaError) -> Option<EraError> {
    match err {
        LuaError::CallbackError { cause, .. } => host_error(cause),
        LuaError::ExternalError(inner) => inner
            .as_ref()
            .downcast_ref::<EraError>()
            .map(duplicate),
        _ => None,
    }
}

/// `EraError` is not `Clone` because of `io::Error`; rebuild an equivalent value.
fn duplicate(err: &EraError) -> EraError {
    match err {
        EraError::Quit => EraError::Quit,
        EraError::SceneNext => EraError::SceneNext,
        EraError::Cancelled(reason) => EraError::Cancelled(*reason),
        EraError::SceneNotRegistered(name) => EraError::SceneNotRegistered(name.clone()),
        EraError::NextSceneNotSet => EraError::NextSceneNotSet,
        EraError::NoNextScene(name) => EraError::NoNextScene(name.clone()),
        EraError::FunctionNotFound(name) => EraError::FunctionNotFound(name.clone()),
        EraError::Script(msg) => EraError::Script(msg.clone()),
        EraError::Task(msg) => EraError::Task(msg.clone()),
        EraError::Io(e) => EraError::Io(std::io::Error::new(e.kind(), e.to_string())),
        EraError::InputClosed => EraError::InputClosed,
        EraError::Save(msg) => EraError::Save(msg.clone()),
        EraError::Config(msg) => EraError::Config(msg.clone()),
    }
}

/// Outcome of one top-level script call.
#[derive(Debug)]
pub enum CallOutcome<T> {
    Success(T),
    Quit,
    SceneNext,
    LongReturn,
    Cancelled(CancelReason),
    UserError(LuaError),
}

impl<T> CallOutcome<T> {
    pub fn from_result(result: mlua::Result<T>) -> Self {
        match result {
            Ok(value) => CallOutcome::Success(value),
            Err(err) => match classify(&err) {
                Some(HostSignal::Quit) => CallOutcome::Quit,
                Some(HostSignal::SceneNext) => CallOutcome::SceneNext,
                Some(HostSignal::LongReturn) => CallOutcome::LongReturn,
                Some(HostSignal::Cancelled(reason)) => CallOutcome::Cancelled(reason),
                None => CallOutcome::UserError(err),
            },
        }
    }

    /// Map to the typed errors consumed by the scene manager.
    ///
    /// A long return is swallowed and yields `Ok(None)`. Host errors raised
    /// inside the call come back as the original [`EraError`] variant.
    pub fn into_result(self) -> Result<Option<T>> {
        match self {
            CallOutcome::Success(value) => Ok(Some(value)),
            CallOutcome::Quit => Err(EraError::Quit),
            CallOutcome::SceneNext => Err(EraError::SceneNext),
            CallOutcome::LongReturn => Ok(None),
            CallOutcome::Cancelled(reason) => Err(EraError::Cancelled(reason)),
            CallOutcome::UserError(err) => {
                Err(host_error(&err).unwrap_or_else(|| EraError::Script(err.to_string())))
            }
        }
    }
}

/// Classify the result of a script call into host terms.
pub fn check_special_error<T>(result: mlua::Result<T>) -> Result<Option<T>> {
    CallOutcome::from_result(result).into_result()
}

/// Raise a host error inside a running script.
///
/// Flow signals travel as [`HostSignal`] so they stay recognizable; anything
/// else is wrapped as is.
impl From<EraError> for LuaError {
    fn from(err: EraError) -> Self {
        match err {
            EraError::Quit => LuaError::external(HostSignal::Quit),
            EraError::SceneNext => LuaError::external(HostSignal::SceneNext),
            EraError::Cancelled(reason) => LuaError::external(HostSignal::Cancelled(reason)),
            other => LuaError::external(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn callback_error(cause: LuaError) -> LuaError {
        LuaError::CallbackError {
            traceback: "stack traceback:".to_string(),
            cause: Arc::new(cause),
        }
    }

    #[test]
    fn test_ok_passes_through() {
        assert_eq!(check_special_error(Ok(5)).unwrap(), Some(5));
    }

    #[test]
    fn test_typed_signals() {
        let quit = LuaError::external(HostSignal::Quit);
        assert!(matches!(check_special_error::<()>(Err(quit)), Err(EraError::Quit)));

        let next = callback_error(LuaError::external(HostSignal::SceneNext));
        assert!(matches!(
            check_special_error::<()>(Err(next)),
            Err(EraError::SceneNext)
        ));

        let long = callback_error(callback_error(LuaError::external(HostSignal::LongReturn)));
        assert_eq!(check_special_error::<()>(Err(long)).unwrap(), None);

        let cancel = LuaError::external(HostSignal::Cancelled(CancelReason::Timeout));
        assert!(matches!(
            check_special_error::<()>(Err(cancel)),
            Err(EraError::Cancelled(CancelReason::Timeout))
        ));
    }

    #[test]
    fn test_marker_text_with_surrounding_text() {
        for (prefix, suffix) in [("", ""), ("main.lua:3: ", ""), ("boom ", " at line 9")] {
            let err = LuaError::RuntimeError(format!("{prefix}{QUIT_MARKER}{suffix}"));
            assert_eq!(classify(&err), Some(HostSignal::Quit));
        }
    }

    #[test]
    fn test_first_marker_wins() {
        let text = format!("{SCENE_NEXT_MARKER} then {QUIT_MARKER}");
        assert_eq!(HostSignal::from_message(&text), Some(HostSignal::Quit));
        let text = format!("{LONG_RETURN_MARKER} {CANCEL_MARKER}");
        assert_eq!(HostSignal::from_message(&text), Some(HostSignal::LongReturn));
    }

    #[test]
    fn test_cancel_marker() {
        assert!(HostSignal::Cancelled(CancelReason::Requested)
            .to_string()
            .starts_with(CANCEL_MARKER));
        let text = HostSignal::Cancelled(CancelReason::Timeout).to_string();
        assert_eq!(
            HostSignal::from_message(&text),
            Some(HostSignal::Cancelled(CancelReason::Timeout))
        );
        assert_eq!(
            HostSignal::from_message("context canceled"),
            Some(HostSignal::Cancelled(CancelReason::Requested))
        );
    }

    #[test]
    fn test_classification_is_idempotent() {
        let err = callback_error(LuaError::external(HostSignal::Quit));
        let first = classify(&err);
        let rendered = LuaError::RuntimeError(err.to_string());
        assert_eq!(first, classify(&rendered));
    }

    #[test]
    fn test_user_error_unchanged() {
        let err = LuaError::RuntimeError("attempt to index a nil value".to_string());
        match check_special_error::<()>(Err(err)) {
            Err(EraError::Script(msg)) => assert!(msg.contains("attempt to index a nil value")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_host_error_passes_through() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err = callback_error(LuaError::from(EraError::Io(io)));
        match check_special_error::<()>(Err(err)) {
            Err(EraError::Io(e)) => assert_eq!(e.kind(), std::io::ErrorKind::BrokenPipe),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_era_error_raises_typed_signal() {
        let err = LuaError::from(EraError::SceneNext);
        assert_eq!(typed_signal(&err), Some(HostSignal::SceneNext));
        let err = LuaError::from(EraError::NextSceneNotSet);
        assert_eq!(typed_signal(&err), None);
    }
}
