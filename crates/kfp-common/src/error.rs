//! Error types for the KFP operator

use thiserror::Error;

/// Error raised by shared operator code
#[derive(Debug, Error)]
pub enum Error {
    /// Controller configuration could not be loaded
    #[error("configuration error: {message}")]
    Config {
        /// Description of what failed
        message: String,
    },
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }
}
