//! Error types for the REST client.

use std::error::Error as StdError;

use http::Method;
use thiserror::Error;

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, self::Error>;

/// Type-erased error crossing the transport and codec boundaries.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Errors that can occur while building and executing requests.
#[derive(Debug, Error)]
pub enum Error {
    /// Request configuration is invalid.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The request content type matches neither the JSON nor the XML family.
    #[error("don't know how to marshal request body with content type {0:?}")]
    UnsupportedContentType(String),

    /// Marshaling the request body failed.
    #[error("failed to marshal request body: {source}")]
    Marshal {
        /// Codec failure.
        #[source]
        source: BoxError,
    },

    /// The transport failed before a response arrived.
    #[error("http request {method} {url} failed: {source}")]
    Transport {
        /// Request method.
        method: Method,
        /// Final request URL.
        url: String,
        /// Transport failure.
        #[source]
        source: BoxError,
    },

    /// Reading the response body failed.
    #[error("http request {method} {url} failed to read response body: {source}")]
    ReadBody {
        /// Request method.
        method: Method,
        /// Final request URL.
        url: String,
        /// Read failure.
        #[source]
        source: BoxError,
    },

    /// Unmarshaling the body of a successful response failed.
    #[error("http request {method} {url} failed to unmarshal response body: {source}")]
    Unmarshal {
        /// Request method.
        method: Method,
        /// Final request URL.
        url: String,
        /// Codec failure.
        #[source]
        source: BoxError,
    },

    /// No codec family matched a non-empty response body.
    #[error("response was not unmarshaled")]
    NotUnmarshaled,

    /// The response failed the success check.
    #[error("{message}")]
    Status {
        /// HTTP status code of the response.
        status: u16,
        /// Full failure message, including method, URL and status.
        message: String,
        /// Decoded error body, when the client owns the decoded value.
        #[source]
        source: Option<BoxError>,
    },

    /// Fetching a token from the token provider failed.
    #[error("failed to get token for {method} {url}: {source}")]
    Token {
        /// Request method.
        method: Method,
        /// Resolved request URL.
        url: String,
        /// Provider failure.
        #[source]
        source: Box<Error>,
    },

    /// The OAuth token endpoint call failed.
    #[error("failed to get new oauth token: {0}")]
    OAuthToken(#[source] Box<Error>),
}

impl Error {
    /// Check whether this error, at any depth of its source chain, reports
    /// that a response body was left unmarshaled.
    pub fn is_not_unmarshaled(&self) -> bool {
        if matches!(self, Self::NotUnmarshaled) {
            return true;
        }
        let mut source = StdError::source(self);
        while let Some(current) = source {
            if matches!(current.downcast_ref::<Self>(), Some(Self::NotUnmarshaled)) {
                return true;
            }
            source = current.source();
        }
        false
    }

    /// Check if this error came from token acquisition.
    pub fn is_token(&self) -> bool {
        matches!(self, Self::Token { .. } | Self::OAuthToken(_))
    }

    /// Check if this error was raised before the request reached the wire.
    pub fn is_invalid_request(&self) -> bool {
        matches!(
            self,
            Self::InvalidRequest(_) | Self::UnsupportedContentType(_) | Self::Marshal { .. }
        )
    }

    /// Get the HTTP status code, if the response failed the success check.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Downcast the decoded error body of a failed response.
    ///
    /// Returns `Some` only when the client declared an error type via
    /// [`Client::with_error_type`](crate::Client::with_error_type) and the
    /// failed response body decoded into it.
    pub fn api_error<E: StdError + 'static>(&self) -> Option<&E> {
        match self {
            Self::Status {
                source: Some(source),
                ..
            } => source.downcast_ref::<E>(),
            _ => None,
        }
    }
}
