use workbg_core::error::CoreError;

/// Application-level error type.
///
/// Wraps [`CoreError`] for domain errors and adds variants for the
/// runtime around the controller.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `workbg_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// An environment variable held a value that could not be used.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// The controller task has exited and no longer accepts messages.
    #[error("Controller is no longer running")]
    ControllerClosed,
}

/// Convenience type alias for fallible application calls.
pub type AppResult<T> = Result<T, AppError>;
