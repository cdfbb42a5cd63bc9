//! In-band error type for streaming connections

use std::error::Error;
use std::fmt;

/// Boxed error type for streaming operations
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Error carried by [`Event::Error`](crate::streaming::Event::Error)
///
/// Streaming errors are reported on the event channel rather than returned, so one
/// misbehaving feed never forces the listener to choose between stopping and dropping data.
#[derive(Debug)]
pub struct StreamError {
    kind: StreamErrorKind,
    source: Option<BoxError>,
}

/// Categories of streaming errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamErrorKind {
    /// Network or I/O error while reading frames
    Transport,
    /// Connection ended without a close handshake
    Closed,
    /// Frame was well-formed JSON but violated the envelope contract
    Protocol,
    /// Frame or payload could not be decoded
    Decode,
    /// Envelope named an event this client does not know
    UnknownEvent,
}

impl StreamError {
    /// Create a new streaming error
    pub fn new(kind: StreamErrorKind, source: Option<BoxError>) -> Self {
        Self { kind, source }
    }

    /// Get the error kind
    pub fn kind(&self) -> StreamErrorKind {
        self.kind
    }

    /// Get the underlying error source
    pub fn source(&self) -> Option<&BoxError> {
        self.source.as_ref()
    }

    /// The connection ended without a close frame
    pub fn closed() -> Self {
        Self {
            kind: StreamErrorKind::Closed,
            source: None,
        }
    }

    /// Create a transport error with source
    pub fn transport(source: impl Error + Send + Sync + 'static) -> Self {
        Self {
            kind: StreamErrorKind::Transport,
            source: Some(Box::new(source)),
        }
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self {
            kind: StreamErrorKind::Protocol,
            source: Some(msg.into().into()),
        }
    }

    /// Create a decode error with source
    pub fn decode(source: impl Error + Send + Sync + 'static) -> Self {
        Self {
            kind: StreamErrorKind::Decode,
            source: Some(Box::new(source)),
        }
    }

    /// An event name outside the known set
    pub fn unknown_event(name: &str) -> Self {
        Self {
            kind: StreamErrorKind::UnknownEvent,
            source: Some(format!("unhandled event '{name}'").into()),
        }
    }

    /// Whether this error means the connection is gone
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind,
            StreamErrorKind::Transport | StreamErrorKind::Closed
        )
    }
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            StreamErrorKind::Transport => write!(f, "Transport error"),
            StreamErrorKind::Closed => write!(f, "Stream closed unexpectedly"),
            StreamErrorKind::Protocol => write!(f, "Protocol error"),
            StreamErrorKind::Decode => write!(f, "Decode error"),
            StreamErrorKind::UnknownEvent => write!(f, "Unknown event"),
        }?;

        if let Some(source) = &self.source {
            write!(f, ": {}", source)?;
        }

        Ok(())
    }
}

impl Error for StreamError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn Error + 'static))
    }
}
