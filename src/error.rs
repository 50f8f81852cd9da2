//! Error types for the session link.
//!
//! Errors live at the edges of the crate: configuration loading, the wire codec
//! and the transports. The [`SessionLink`](crate::SessionLink) handle itself never
//! returns them from `connect`/`disconnect`/`send`; the driver logs them and turns
//! them into [`ConnectionState`](crate::ConnectionState) changes instead.
//!
//! ## Error Categories
//!
//! - **Connect Errors**: the endpoint could not be reached or refused the upgrade
//! - **Transport Errors**: an open connection failed while sending or receiving
//! - **Decode / Encode Errors**: malformed JSON or frame payloads
//! - **Config Errors**: invalid endpoint, policy values or unreadable config files
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use sessionlink::LinkError;
//!
//! let error = LinkError::connect_failed("ws://localhost:8001", "connection refused");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for link operations.
pub type Result<T, E = LinkError> = std::result::Result<T, E>;

/// Main error type for link operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum LinkError {
    #[error("Failed to connect to {endpoint}: {reason}")]
    Connect {
        endpoint: String,
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Transport error: {reason}")]
    Transport {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Decode error in {context}: {details}")]
    Decode { context: String, details: String },

    #[error("Encode error: {details}")]
    Encode { details: String },

    #[error("Invalid configuration for '{field}': {reason}")]
    Config { field: String, reason: String },

    #[error("Config file error: {path}")]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Session link driver is no longer running")]
    LinkClosed,
}

impl LinkError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            LinkError::Connect { .. } => true,
            LinkError::Transport { .. } => true,
            LinkError::Decode { .. } => false,
            LinkError::Encode { .. } => false,
            LinkError::Config { .. } => false,
            LinkError::ConfigFile { .. } => false,
            LinkError::LinkClosed => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            LinkError::Connect { .. } => vec![
                "Ensure the exercise analysis service is running",
                "Check the endpoint host and port",
                "Verify the ws:// or wss:// scheme matches the deployment",
            ],
            LinkError::Transport { .. } => vec![
                "Check network connectivity",
                "Call connect() again once the service is reachable",
            ],
            LinkError::Decode { .. } => vec![
                "Check the backend speaks the JSON session protocol",
                "Verify frame payloads are valid base64",
            ],
            LinkError::Encode { .. } => vec!["Check the command payload is serializable"],
            LinkError::Config { .. } => vec![
                "Use a ws:// or wss:// endpoint",
                "Resolve the {exercise} placeholder with for_exercise()",
                "Use a non-zero reconnect interval",
            ],
            LinkError::ConfigFile { .. } => {
                vec!["Check the config file exists and is readable", "Check file permissions"]
            }
            LinkError::LinkClosed => {
                vec!["Create a new SessionLink inside a running tokio runtime"]
            }
        }
    }

    /// Helper constructor for connect errors.
    pub fn connect_failed(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        LinkError::Connect { endpoint: endpoint.into(), reason: reason.into(), source: None }
    }

    /// Helper constructor for connect errors with source.
    pub fn connect_failed_with_source(
        endpoint: impl Into<String>,
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        LinkError::Connect { endpoint: endpoint.into(), reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for transport errors.
    pub fn transport_failed(reason: impl Into<String>) -> Self {
        LinkError::Transport { reason: reason.into(), source: None }
    }

    /// Helper constructor for decode errors.
    pub fn decode_error(context: impl Into<String>, details: impl Into<String>) -> Self {
        LinkError::Decode { context: context.into(), details: details.into() }
    }

    /// Helper constructor for configuration errors.
    pub fn config_error(field: impl Into<String>, reason: impl Into<String>) -> Self {
        LinkError::Config { field: field.into(), reason: reason.into() }
    }

    /// Helper constructor for config file errors with path context.
    pub fn config_file_error(path: PathBuf, source: std::io::Error) -> Self {
        LinkError::ConfigFile { path, source }
    }
}

impl From<serde_json::Error> for LinkError {
    fn from(err: serde_json::Error) -> Self {
        LinkError::Decode { context: "JSON payload".to_string(), details: err.to_string() }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for LinkError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        LinkError::Transport { reason: err.to_string(), source: Some(Box::new(err)) }
    }
}
