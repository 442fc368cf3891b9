//! Error types for the DDNS system
//!
//! This module defines all error types used throughout the crate, and the
//! routing table that decides how far a failure propagates inside an update
//! pass (see [`Error::disposition`]).

use thiserror::Error;

use crate::config::RunMode;

/// Result type alias for DDNS operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the DDNS system
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IP discovery errors (router, online lookup, interface)
    #[error("IP source error: {0}")]
    IpSource(String),

    /// No IP address could be determined for this pass
    #[error("no current IP address available")]
    NoAddress,

    /// Authoritative DNS lookup errors
    #[error("DNS lookup error: {0}")]
    Lookup(#[from] LookupError),

    /// Provider-specific error
    #[error("Provider error ({provider}): {message}")]
    Provider {
        /// Provider name
        provider: String,
        /// Error message
        message: String,
    },

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(String),

    /// Authentication errors
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Record or zone not found at the provider
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Webhook delivery errors
    #[error("Webhook error: {0}")]
    Webhook(String),

    /// Notification delivery errors
    #[error("Notification error: {0}")]
    Notification(String),

    /// Operation not allowed in the manager's current lifecycle state
    #[error("Invalid manager state: {0}")]
    State(String),

    /// One or more domains failed during a run-once pass
    #[error("update failed for domain(s): {}", .0.join(", "))]
    DomainsFailed(Vec<String>),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Failures of the authoritative DNS lookup
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// The name does not exist (NXDOMAIN)
    #[error("{hostname}: no such domain")]
    NotFound { hostname: String },

    /// The name exists but has no record of the requested family
    #[error("{hostname}: no matching records")]
    Empty { hostname: String },

    /// The resolver could not be reached after all retries
    #[error("{hostname}: {message}")]
    Transport { hostname: String, message: String },

    /// The configured resolver address cannot be parsed
    #[error("invalid resolver address {0:?}")]
    InvalidResolver(String),
}

/// How far a failure propagates inside an update pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Log it and move on to the next subdomain.
    SkipSubdomain,
    /// Abandon the current pass for this domain; the next tick retries.
    AbortTick,
    /// Fatal for the process (run-once mode, startup).
    AbortProcess,
    /// Side effects only; never changes control flow.
    LogOnly,
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an IP source error
    pub fn ip_source(msg: impl Into<String>) -> Self {
        Self::IpSource(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a webhook error
    pub fn webhook(msg: impl Into<String>) -> Self {
        Self::Webhook(msg.into())
    }

    /// Create a notification error
    pub fn notification(msg: impl Into<String>) -> Self {
        Self::Notification(msg.into())
    }

    /// Create a provider-specific error
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Route this error to exactly one failure class for the given mode.
    pub fn disposition(&self, mode: RunMode) -> Disposition {
        let run_once = mode == RunMode::RunOnce;
        match self {
            Error::Lookup(LookupError::NotFound { .. } | LookupError::Empty { .. }) => {
                Disposition::SkipSubdomain
            }
            Error::Lookup(_) if run_once => Disposition::AbortProcess,
            Error::Lookup(_) => Disposition::SkipSubdomain,

            Error::NoAddress
            | Error::IpSource(_)
            | Error::Provider { .. }
            | Error::Http(_)
            | Error::Authentication(_)
            | Error::NotFound(_) => {
                if run_once {
                    Disposition::AbortProcess
                } else {
                    Disposition::AbortTick
                }
            }

            Error::Webhook(_) | Error::Notification(_) => Disposition::LogOnly,

            Error::Config(_)
            | Error::State(_)
            | Error::DomainsFailed(_)
            | Error::Io(_)
            | Error::Json(_)
            | Error::Other(_) => Disposition::AbortProcess,
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

impl From<::config::ConfigError> for Error {
    fn from(err: ::config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.to_string())
    }
}
