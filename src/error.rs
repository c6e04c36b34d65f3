//! Error types and handling for postal-labels.

/// Result type alias for postal-labels operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for postal-labels operations.
///
/// Per-record strategy failures are never reported through this type; they
/// are plain `None` values that the reconciliation engine turns into the next
/// fallback. Only problems that stop a whole run end up here.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The geocoder API key is missing, malformed or rejected
    #[error("Failed to check entries: {message}")]
    InvalidApiKey {
        /// Description of what is wrong with the key
        message: String,
    },

    /// Invalid configuration or working directories
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Unusable input files
    #[error("Input error: {message}")]
    Input {
        /// Error message
        message: String,
    },

    /// Network errors outside the per-record strategies
    #[error("Network error: {message}")]
    Network {
        /// Error message
        message: String,
    },

    /// Label sheet could not be produced
    #[error("Render error: {message}")]
    Render {
        /// Error message
        message: String,
    },

    /// I/O errors
    #[error("I/O error: {source}")]
    Io {
        /// Source error
        #[from]
        source: std::io::Error,
    },

    /// CSV errors
    #[error("CSV error: {source}")]
    Csv {
        /// Source error
        #[from]
        source: csv::Error,
    },

    /// JSON errors
    #[error("JSON error: {source}")]
    Json {
        /// Source error
        #[from]
        source: serde_json::Error,
    },
}

impl Error {
    /// Create a new invalid API key error
    pub fn invalid_api_key(message: impl Into<String>) -> Self {
        Self::InvalidApiKey {
            message: message.into(),
        }
    }

    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new input error
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input {
            message: message.into(),
        }
    }

    /// Create a new network error
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Create a new render error
    pub fn render(message: impl Into<String>) -> Self {
        Self::Render {
            message: message.into(),
        }
    }

    /// Whether this error was raised while validating configuration, before
    /// any record was touched.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::InvalidApiKey { .. } | Self::Config { .. })
    }
}
