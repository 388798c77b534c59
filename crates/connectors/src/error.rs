//! Connector setup errors and transport error classification.

use clearline_core::clients::ClientError;
use thiserror::Error;

/// Failure to build a connector.
#[derive(Debug, Error)]
pub enum ConnectorError {
    /// No base URL configured for a required service.
    #[error("No URL configured for the {0} service")]
    MissingUrl(&'static str),

    /// The configured base URL does not parse.
    #[error("Invalid URL for the {service} service: {reason}")]
    InvalidUrl {
        /// Service name.
        service: &'static str,
        /// Parser message.
        reason: String,
    },

    /// The HTTP client could not be built.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Maps a transport error onto the client contract.
///
/// Only a failed connect proves the request never reached the service.
/// Anything after the connection is up leaves the outcome unknown.
pub(crate) fn classify(err: &reqwest::Error) -> ClientError {
    if err.is_timeout() {
        ClientError::Timeout
    } else if err.is_connect() {
        ClientError::Unavailable(err.to_string())
    } else {
        ClientError::Protocol(err.to_string())
    }
}
