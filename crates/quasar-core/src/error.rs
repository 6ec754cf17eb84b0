//! Error types for Quasar core operations.
//!
//! Library code returns [`QuasarError`]; binaries wrap it in `anyhow`.
//! Most failures inside a provider never reach this type at all: they are
//! logged and the provider simply produces fewer results. Only launch
//! failures are meant to be shown to the user.

use thiserror::Error;

/// Result type alias using QuasarError
pub type Result<T> = std::result::Result<T, QuasarError>;

/// Core error types for Quasar operations.
#[derive(Error, Debug)]
pub enum QuasarError {
    // === Selection Errors ===
    /// A provider failed to act on the selected item
    #[error("could not launch {target}: {reason}")]
    Launch { target: String, reason: String },

    /// The provider does not implement the requested operation
    #[error("provider {provider} does not support {operation}")]
    Unsupported {
        provider: String,
        operation: &'static str,
    },

    /// The provider that produced an item has been torn down
    #[error("the provider that produced this result is no longer available")]
    ProviderGone,

    // === Configuration Errors ===
    /// Configuration file parsing failed
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },

    // === Task Errors ===
    /// A worker task panicked before producing its result
    #[error("task {name} panicked")]
    TaskPanicked { name: String },

    // === I/O Errors ===
    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl QuasarError {
    /// Returns true if this error should be surfaced to the user.
    ///
    /// Everything else degrades to "fewer results" and is only logged.
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self,
            QuasarError::Launch { .. }
                | QuasarError::Unsupported { .. }
                | QuasarError::ProviderGone
        )
    }

    /// Create a launch error
    pub fn launch(target: impl Into<String>, reason: impl ToString) -> Self {
        QuasarError::Launch {
            target: target.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a config error
    pub fn config(reason: impl Into<String>) -> Self {
        QuasarError::ConfigError {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_visible() {
        let err = QuasarError::launch("firefox.desktop", "No such file or directory");
        assert!(err.is_user_visible());
        assert_eq!(
            err.to_string(),
            "could not launch firefox.desktop: No such file or directory"
        );

        assert!(QuasarError::ProviderGone.is_user_visible());

        let err = QuasarError::config("bad toml");
        assert!(!err.is_user_visible());

        let err = QuasarError::from(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        assert!(!err.is_user_visible());
    }
}
