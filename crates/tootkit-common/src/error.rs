//! Error types for API client operations

use bytes::Bytes;
use serde::Deserialize;

use crate::cursor::LinkError;

/// Client error type wrapping all possible error conditions of one API call
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum ClientError {
    /// HTTP transport error
    #[error("HTTP transport error: {0}")]
    Transport(
        #[from]
        #[diagnostic_source]
        TransportError,
    ),

    /// Response deserialization failed
    #[error("{0}")]
    Decode(
        #[from]
        #[diagnostic_source]
        DecodeError,
    ),

    /// HTTP error response without a usable error body
    #[error("HTTP {0}")]
    Http(
        #[from]
        #[diagnostic_source]
        HttpError,
    ),

    /// Error reported by the server in its response body
    #[error("{0}")]
    Api(
        #[from]
        #[diagnostic_source]
        ApiError,
    ),

    /// Pagination links in the response could not be parsed
    #[error("cannot decode header links: {0}")]
    #[diagnostic(code(tootkit::client::link))]
    Link(#[from] LinkError),
}

/// Transport-level errors that occur during HTTP communication
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum TransportError {
    /// Failed to establish connection to server
    #[error("Connection error: {0}")]
    Connect(String),

    /// Request timed out
    #[error("Request timeout")]
    Timeout,

    /// Request construction failed (malformed URI, headers, etc.)
    #[error("Invalid request: {0}")]
    #[diagnostic(code(tootkit::transport::invalid_request))]
    InvalidRequest(String),

    /// Other transport error
    #[error("Transport error: {0}")]
    Other(Box<dyn std::error::Error + Send + Sync>),
}

impl TransportError {
    /// Classify a failure reported by an [`HttpClient`](crate::http_client::HttpClient).
    ///
    /// reqwest errors keep their timeout/connect/request distinction, anything else is `Other`.
    pub fn from_client<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        let error: Box<dyn std::error::Error + Send + Sync> = Box::new(error);
        #[cfg(feature = "reqwest-client")]
        let error = match error.downcast::<reqwest::Error>() {
            Ok(e) => return Self::from(*e),
            Err(other) => other,
        };
        Self::Other(error)
    }
}

/// Response deserialization errors
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum DecodeError {
    /// JSON deserialization failed
    #[error("Failed to deserialize JSON: {0}")]
    #[diagnostic(code(tootkit::decode::json))]
    Json(
        #[from]
        #[source]
        serde_json::Error,
    ),
}

/// HTTP error response (non-2xx status whose body is not a server error object)
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub struct HttpError {
    /// HTTP status code
    pub status: http::StatusCode,
    /// Response body if available
    pub body: Option<Bytes>,
}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.status)?;
        if let Some(body) = &self.body {
            if let Ok(s) = std::str::from_utf8(body) {
                if !s.is_empty() {
                    write!(f, ":\n{}", s)?;
                }
            }
        }
        Ok(())
    }
}

/// Error object returned by the server, e.g. `{"error": "Record not found"}`
#[derive(Debug, Clone, thiserror::Error, miette::Diagnostic)]
#[error("bad server status code ({status}): {message}")]
#[diagnostic(code(tootkit::client::api))]
pub struct ApiError {
    /// HTTP status code
    pub status: http::StatusCode,
    /// Server-provided message
    pub message: String,
}

#[derive(Deserialize)]
pub(crate) struct ApiErrorBody {
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

impl ApiErrorBody {
    /// Parse the body as a server error object, `None` if it is not one.
    pub(crate) fn parse(body: &[u8]) -> Option<Self> {
        serde_json::from_slice::<Self>(body)
            .ok()
            .filter(|b| !b.error.is_empty())
    }

    pub(crate) fn into_api_error(self, status: http::StatusCode) -> ApiError {
        let message = match self.error_description {
            Some(desc) if !desc.is_empty() => format!("{}: {}", self.error, desc),
            _ => self.error,
        };
        ApiError { status, message }
    }
}

/// Result type for client operations
pub type ClientResult<T> = std::result::Result<T, ClientError>;

#[cfg(feature = "reqwest-client")]
impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout
        } else if e.is_connect() {
            Self::Connect(e.to_string())
        } else if e.is_builder() || e.is_request() {
            Self::InvalidRequest(e.to_string())
        } else {
            Self::Other(Box::new(e))
        }
    }
}
