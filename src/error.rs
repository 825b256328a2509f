//! Error types for eraflow.

use thiserror::Error;

use crate::runtime::CancelReason;

/// Common error type for eraflow.
///
/// `Quit` and `SceneNext` are control-flow signals rather than failures: the
/// scene manager consumes them. Everything else either terminates the run
/// loop or is handed back to the caller unchanged.
#[derive(Error, Debug)]
pub enum EraError {
    /// The script or a scene asked to end the game.
    #[error("quit requested")]
    Quit,

    /// The script or a scene forced a transition to the pre-set next scene.
    #[error("forced scene transition")]
    SceneNext,

    /// The runtime's cancellation context fired.
    #[error("script execution canceled: {0}")]
    Cancelled(CancelReason),

    /// A scene name was looked up that was never registered.
    #[error("scene {0:?} is not registered")]
    SceneNotRegistered(String),

    /// A forced transition happened without a next scene set.
    #[error("next scene is not set")]
    NextSceneNotSet,

    /// A scene finished without naming its successor.
    #[error("scene {0:?} returned no next scene")]
    NoNextScene(String),

    /// A mandatory script function is not defined.
    #[error("script function {0:?} is not defined")]
    FunctionNotFound(String),

    /// Script compile or runtime error.
    #[error("script error: {0}")]
    Script(String),

    /// A deferred task reported a failure.
    #[error("task failed: {0}")]
    Task(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The input side of the I/O collaborator went away.
    #[error("input closed")]
    InputClosed,

    /// Save data could not be written or read.
    #[error("save error: {0}")]
    Save(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for EraError {
    fn from(e: serde_json::Error) -> Self {
        EraError::Save(e.to_string())
    }
}

/// Result type alias for eraflow operations.
pub type Result<T> = std::result::Result<T, EraError>;
