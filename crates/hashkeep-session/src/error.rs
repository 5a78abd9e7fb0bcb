//! Error types for session registry operations.

/// Error type for session registry operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The remote store rejected a command or could not be reached.
    #[error("Store error: {0}")]
    Store(String),

    /// Failed to read a config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadConfig {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse TOML.
    #[error("failed to parse config: {0}")]
    ParseConfig(#[from] toml::de::Error),

    /// A config value is out of range.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Build a store error from anything displayable.
    pub fn store(err: impl std::fmt::Display) -> Self {
        Self::Store(err.to_string())
    }
}

/// Result type for session registry operations.
pub type Result<T> = std::result::Result<T, Error>;
