//! WebSocket client abstraction
//!
//! The streaming listener only needs three things from a socket: a way to open one for a
//! URL, a stream of inbound frames and a sink for outbound frames. [`WebSocketClient`]
//! captures exactly that, so the listener can run against an in-memory fake in tests and
//! against [`tungstenite_client::TungsteniteClient`] in production.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::{Sink, Stream};
use smol_str::SmolStr;
use url::Url;

use crate::stream::StreamError;

/// WebSocket close code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CloseCode(pub u16);

impl CloseCode {
    /// Normal closure
    pub const NORMAL: CloseCode = CloseCode(1000);
    /// Endpoint going away
    pub const AWAY: CloseCode = CloseCode(1001);
    /// Protocol error
    pub const PROTOCOL: CloseCode = CloseCode(1002);
    /// Policy violation
    pub const POLICY: CloseCode = CloseCode(1008);
    /// Unexpected condition on the server
    pub const ERROR: CloseCode = CloseCode(1011);

    /// Whether this code reports an orderly shutdown, including a server going away.
    pub fn is_normal(self) -> bool {
        self == Self::NORMAL || self == Self::AWAY
    }
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> Self {
        Self(code)
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> u16 {
        code.0
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// WebSocket close frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    /// Close code
    pub code: CloseCode,
    /// Close reason text
    pub reason: SmolStr,
}

impl CloseFrame {
    /// Create a new close frame
    pub fn new(code: CloseCode, reason: impl Into<SmolStr>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// The frame a client sends when it stops listening.
    pub fn normal() -> Self {
        Self::new(CloseCode::NORMAL, "")
    }
}

impl fmt::Display for CloseFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reason.is_empty() {
            write!(f, "{}", self.code)
        } else {
            write!(f, "{} ({})", self.code, self.reason)
        }
    }
}

/// WebSocket message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WsMessage {
    /// Text message (UTF-8)
    Text(String),
    /// Binary message
    Binary(Bytes),
    /// Close frame
    Close(Option<CloseFrame>),
}

impl WsMessage {
    /// Check if this is a close message
    pub fn is_close(&self) -> bool {
        matches!(self, WsMessage::Close(_))
    }

    /// Get as text, if this is a text message
    pub fn as_text(&self) -> Option<&str> {
        match self {
            WsMessage::Text(t) => Some(t),
            _ => None,
        }
    }
}

impl From<String> for WsMessage {
    fn from(s: String) -> Self {
        WsMessage::Text(s)
    }
}

impl From<&str> for WsMessage {
    fn from(s: &str) -> Self {
        WsMessage::Text(s.to_owned())
    }
}

impl From<Vec<u8>> for WsMessage {
    fn from(vec: Vec<u8>) -> Self {
        WsMessage::Binary(Bytes::from(vec))
    }
}

#[cfg(not(target_arch = "wasm32"))]
type BoxedStream = Pin<Box<dyn Stream<Item = Result<WsMessage, StreamError>> + Send>>;
#[cfg(target_arch = "wasm32")]
type BoxedStream = Pin<Box<dyn Stream<Item = Result<WsMessage, StreamError>>>>;

#[cfg(not(target_arch = "wasm32"))]
type BoxedSink = Pin<Box<dyn Sink<WsMessage, Error = StreamError> + Send>>;
#[cfg(target_arch = "wasm32")]
type BoxedSink = Pin<Box<dyn Sink<WsMessage, Error = StreamError>>>;

/// Inbound half of a socket
pub struct WsStream(BoxedStream);

impl WsStream {
    /// Create a new message stream
    #[cfg(not(target_arch = "wasm32"))]
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<WsMessage, StreamError>> + Send + 'static,
    {
        Self(Box::pin(stream))
    }

    /// Create a new message stream
    #[cfg(target_arch = "wasm32")]
    pub fn new<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<WsMessage, StreamError>> + 'static,
    {
        Self(Box::pin(stream))
    }
}

impl Stream for WsStream {
    type Item = Result<WsMessage, StreamError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.0.as_mut().poll_next(cx)
    }
}

impl fmt::Debug for WsStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WsStream").finish_non_exhaustive()
    }
}

/// Outbound half of a socket
pub struct WsSink(BoxedSink);

impl WsSink {
    /// Create a new message sink
    #[cfg(not(target_arch = "wasm32"))]
    pub fn new<S>(sink: S) -> Self
    where
        S: Sink<WsMessage, Error = StreamError> + Send + 'static,
    {
        Self(Box::pin(sink))
    }

    /// Create a new message sink
    #[cfg(target_arch = "wasm32")]
    pub fn new<S>(sink: S) -> Self
    where
        S: Sink<WsMessage, Error = StreamError> + 'static,
    {
        Self(Box::pin(sink))
    }
}

impl Sink<WsMessage> for WsSink {
    type Error = StreamError;

    fn poll_ready(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.0.as_mut().poll_ready(cx)
    }

    fn start_send(mut self: Pin<&mut Self>, item: WsMessage) -> Result<(), Self::Error> {
        self.0.as_mut().start_send(item)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.0.as_mut().poll_flush(cx)
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.0.as_mut().poll_close(cx)
    }
}

impl fmt::Debug for WsSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WsSink").finish_non_exhaustive()
    }
}

/// WebSocket client trait
#[cfg_attr(not(target_arch = "wasm32"), trait_variant::make(Send))]
pub trait WebSocketClient {
    /// Error type for WebSocket operations
    type Error: std::error::Error + Send + Sync + 'static;

    /// Open a socket to `url`. Resolves once the handshake has completed.
    fn connect(&self, url: Url) -> impl Future<Output = Result<WebSocketConnection, Self::Error>>;
}

/// An open socket
pub struct WebSocketConnection {
    tx: WsSink,
    rx: WsStream,
}

impl WebSocketConnection {
    /// Create a new WebSocket connection
    pub fn new(tx: WsSink, rx: WsStream) -> Self {
        Self { tx, rx }
    }

    /// Split into sender and receiver
    pub fn split(self) -> (WsSink, WsStream) {
        (self.tx, self.rx)
    }
}

impl fmt::Debug for WebSocketConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketConnection").finish_non_exhaustive()
    }
}

/// WebSocket client backed by tokio-tungstenite-wasm
#[cfg(feature = "websocket")]
pub mod tungstenite_client {
    use super::*;
    use futures::{SinkExt, StreamExt};
    use tokio_tungstenite_wasm::Message;

    /// WebSocket client backed by tokio-tungstenite-wasm
    #[derive(Debug, Clone, Default)]
    pub struct TungsteniteClient;

    impl TungsteniteClient {
        /// Create a new tungstenite WebSocket client
        pub fn new() -> Self {
            Self
        }
    }

    impl WebSocketClient for TungsteniteClient {
        type Error = tokio_tungstenite_wasm::Error;

        async fn connect(&self, url: Url) -> Result<WebSocketConnection, Self::Error> {
            let socket = tokio_tungstenite_wasm::connect(url.as_str()).await?;
            let (sink, stream) = socket.split();

            let rx = WsStream::new(stream.map(|result| match result {
                Ok(msg) => Ok(from_tungstenite(msg)),
                Err(e) => Err(StreamError::transport(e)),
            }));

            let tx = WsSink::new(
                sink.with(|msg: WsMessage| async move {
                    Ok::<_, tokio_tungstenite_wasm::Error>(into_tungstenite(msg))
                })
                .sink_map_err(StreamError::transport),
            );

            Ok(WebSocketConnection::new(tx, rx))
        }
    }

    fn from_tungstenite(msg: Message) -> WsMessage {
        match msg {
            Message::Text(text) => WsMessage::Text(text),
            Message::Binary(bytes) => WsMessage::Binary(Bytes::from(bytes)),
            Message::Close(frame) => WsMessage::Close(frame.map(|f| {
                let raw: u16 = f.code.into();
                CloseFrame::new(CloseCode(raw), f.reason.as_ref())
            })),
        }
    }

    fn into_tungstenite(msg: WsMessage) -> Message {
        match msg {
            WsMessage::Text(text) => Message::Text(text),
            WsMessage::Binary(bytes) => Message::Binary(bytes.to_vec()),
            WsMessage::Close(frame) => Message::Close(frame.map(|f| {
                tokio_tungstenite_wasm::CloseFrame {
                    code: f.code.0.into(),
                    reason: f.reason.to_string().into(),
                }
            })),
        }
    }
}
