//! Error types for aspire-duck-sync.

use thiserror::Error;

/// Result type alias using the library's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for aspire-duck-sync operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
        /// Source error if any
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Token exchange with the Aspire API failed
    #[error("Authentication failed{}: {message}", fmt_status(.status))]
    Authentication {
        /// HTTP status, if a response was received
        status: Option<u16>,
        /// Error message
        message: String,
    },

    /// A page request for an entity failed
    #[error("Fetch failed for '{entity}'{}: {message}", fmt_status(.status))]
    Fetch {
        /// Entity (data feed) name
        entity: String,
        /// HTTP status, if a response was received
        status: Option<u16>,
        /// Error message
        message: String,
    },

    /// Transport-level HTTP error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// MotherDuck connection error
    #[error("MotherDuck connection error: {message}")]
    MotherDuckConnection {
        /// Error message
        message: String,
        /// Source error
        #[source]
        source: Option<duckdb::Error>,
    },

    /// MotherDuck query error
    #[error("MotherDuck query error on table '{table}': {message}")]
    MotherDuckQuery {
        /// Table name
        table: String,
        /// Error message
        message: String,
        /// Source error
        #[source]
        source: Option<duckdb::Error>,
    },

    /// Record shape error
    #[error("Schema error: {message}")]
    Schema {
        /// Error message
        message: String,
    },

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization error
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error message
        message: String,
        /// Source error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Retry exhausted
    #[error("Operation failed after {attempts} attempts: {message}")]
    RetryExhausted {
        /// Number of attempts made
        attempts: u32,
        /// Error message
        message: String,
        /// Last error encountered
        #[source]
        last_error: Option<Box<Error>>,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create a configuration error with source.
    pub fn config_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an authentication error.
    pub fn authentication(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Authentication {
            status,
            message: message.into(),
        }
    }

    /// Create a fetch error.
    pub fn fetch(entity: impl Into<String>, status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Fetch {
            entity: entity.into(),
            status,
            message: message.into(),
        }
    }

    /// Create a MotherDuck connection error.
    pub fn motherduck_connection(message: impl Into<String>, source: duckdb::Error) -> Self {
        Self::MotherDuckConnection {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create a MotherDuck query error.
    pub fn motherduck_query(
        table: impl Into<String>,
        message: impl Into<String>,
        source: duckdb::Error,
    ) -> Self {
        Self::MotherDuckQuery {
            table: table.into(),
            message: message.into(),
            source: Some(source),
        }
    }

    /// Create a schema error.
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a serialization error with source.
    pub fn serialization(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Serialization {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Error::Fetch {
                status: Some(s), ..
            }
            | Error::Authentication {
                status: Some(s), ..
            } => is_transient_status(*s),
            Error::MotherDuckConnection { .. } | Error::Io(_) => true,
            _ => false,
        }
    }

    /// Check if this error must abort the whole run rather than one entity.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Authentication { .. } | Error::Config { .. })
    }

    /// Get the error code for metrics/logging.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "CONFIG_ERROR",
            Error::Authentication { .. } => "AUTH_ERROR",
            Error::Fetch { .. } => "FETCH_ERROR",
            Error::Http(_) => "HTTP_ERROR",
            Error::MotherDuckConnection { .. } => "MD_CONNECTION_ERROR",
            Error::MotherDuckQuery { .. } => "MD_QUERY_ERROR",
            Error::Schema { .. } => "SCHEMA_ERROR",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::Serialization { .. } => "SERIALIZATION_ERROR",
            Error::RetryExhausted { .. } => "RETRY_EXHAUSTED",
            Error::Io(_) => "IO_ERROR",
        }
    }
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

/// HTTP statuses worth another attempt: rate limiting and server-side failures.
pub fn is_transient_status(status: u16) -> bool {
    status == 429 || (500..=599).contains(&status)
}

/// Error context extension trait.
pub trait ErrorContext<T> {
    /// Add context to an error.
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Add context with a closure (lazy evaluation).
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T, E: std::error::Error + Send + Sync + 'static> ErrorContext<T>
    for std::result::Result<T, E>
{
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::config_with_source(message, e))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| Error::config_with_source(f(), e))
    }
}
