//! One streaming connection and its read task.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::event::{Event, decode_frame};
use super::feed::Feed;
use super::listener::{Done, DoneNotifier, ListenOptions};
use crate::stream::{StreamError, StreamErrorKind};
use crate::websocket::{CloseFrame, WebSocketClient, WsMessage, WsSink, WsStream};

/// Lifecycle of a connection.
///
/// `Connecting → Open → {Closing → Closed | Faulted}`. `Closed` and `Faulted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Waiting for the WebSocket handshake
    Connecting,
    /// Reading frames
    Open,
    /// Close handshake in progress
    Closing,
    /// Shut down in an orderly way
    Closed,
    /// Ended by a transport failure or an abnormal close
    Faulted,
}

impl ConnectionState {
    /// Whether no further transition can happen.
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Closed | ConnectionState::Faulted)
    }
}

/// Handle to one open stream.
///
/// The read task owns the socket; this handle owns the receiving end of the event
/// channel. Dropping the handle's receiver makes the read task close the socket.
#[derive(Debug)]
pub struct Connection {
    feed: Feed,
    events: mpsc::Receiver<Event>,
    state: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
    done: Done,
}

impl Connection {
    /// Feed this connection follows.
    pub fn feed(&self) -> &Feed {
        &self.feed
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Signal raised once the read task has ended.
    pub fn done(&self) -> Done {
        self.done.clone()
    }

    /// Cancel and wait for the connection to become terminal.
    pub async fn close(self) {
        self.cancel.cancel();
        self.done.wait().await;
    }

    pub(crate) fn into_parts(
        self,
    ) -> (
        Feed,
        mpsc::Receiver<Event>,
        watch::Receiver<ConnectionState>,
        Done,
    ) {
        (self.feed, self.events, self.state, self.done)
    }
}

/// Open a socket for `feed` and spawn its read task.
///
/// `cancel` is usually a child of the listener's root token.
pub(crate) async fn connect<W>(
    client: &W,
    feed: Feed,
    url: Url,
    cancel: CancellationToken,
    options: &ListenOptions,
) -> Result<Connection, W::Error>
where
    W: WebSocketClient,
{
    let (state_tx, state_rx) = watch::channel(ConnectionState::Connecting);
    tracing::debug!(%feed, "connecting stream");
    let socket = client.connect(url).await?;
    state_tx.send_replace(ConnectionState::Open);
    tracing::info!(%feed, "stream open");

    let (sink, stream) = socket.split();
    let (events_tx, events_rx) = mpsc::channel(options.channel_capacity.max(1));
    let (notifier, done) = DoneNotifier::new();

    let task = ReadTask {
        feed: feed.clone(),
        sink,
        stream,
        events: events_tx,
        cancel: cancel.clone(),
        state: state_tx,
        close_timeout: options.close_timeout,
    };
    tokio::spawn(task.run(notifier));

    Ok(Connection {
        feed,
        events: events_rx,
        state: state_rx,
        cancel,
        done,
    })
}

struct ReadTask {
    feed: Feed,
    sink: WsSink,
    stream: WsStream,
    events: mpsc::Sender<Event>,
    cancel: CancellationToken,
    state: watch::Sender<ConnectionState>,
    close_timeout: Duration,
}

/// Why the read loop stopped
enum Exit {
    Shutdown(&'static str),
    RemoteClose,
    Fault(StreamError),
}

impl ReadTask {
    async fn run(mut self, notifier: DoneNotifier) {
        // Raises `done` when this task ends, panics included
        let _notifier = notifier;

        let terminal = match self.read_loop().await {
            Exit::Shutdown(reason) => {
                tracing::debug!(feed = %self.feed, reason, "closing stream");
                self.state.send_replace(ConnectionState::Closing);
                self.close_handshake().await;
                ConnectionState::Closed
            }
            Exit::RemoteClose => {
                self.state.send_replace(ConnectionState::Closing);
                self.acknowledge_close().await;
                ConnectionState::Closed
            }
            Exit::Fault(error) => {
                tracing::warn!(feed = %self.feed, %error, "stream faulted");
                self.emit(Event::Error(error)).await;
                ConnectionState::Faulted
            }
        };

        self.state.send_replace(terminal);
        tracing::info!(feed = %self.feed, state = ?terminal, "stream ended");
        // Release the socket and the event sender before `done` is raised
        drop(self);
    }

    async fn read_loop(&mut self) -> Exit {
        loop {
            let frame = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Exit::Shutdown("cancelled"),
                _ = self.events.closed() => return Exit::Shutdown("receiver dropped"),
                frame = self.stream.next() => frame,
            };

            let event = match frame {
                Some(Ok(WsMessage::Text(text))) => decode_frame(&text),
                Some(Ok(WsMessage::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                    Ok(text) => decode_frame(text),
                    Err(e) => Err(StreamError::decode(e)),
                },
                Some(Ok(WsMessage::Close(frame))) => return self.remote_close(frame),
                Some(Err(error)) => return Exit::Fault(error),
                None => return Exit::Fault(StreamError::closed()),
            };

            let event = event.unwrap_or_else(|error| {
                tracing::debug!(feed = %self.feed, %error, "undecodable frame");
                Event::Error(error)
            });
            tracing::trace!(feed = %self.feed, event = event.name(), "frame");

            if !self.emit(event).await {
                return Exit::Shutdown("delivery stopped");
            }
        }
    }

    fn remote_close(&self, frame: Option<CloseFrame>) -> Exit {
        match frame {
            None => {
                tracing::info!(feed = %self.feed, "stream closed by server");
                Exit::RemoteClose
            }
            Some(frame) if frame.code.is_normal() => {
                tracing::info!(feed = %self.feed, "stream closed by server");
                Exit::RemoteClose
            }
            Some(frame) => Exit::Fault(StreamError::new(
                StreamErrorKind::Closed,
                Some(format!("closed by server with code {frame}").into()),
            )),
        }
    }

    /// Deliver one event. Returns false once delivery is no longer wanted.
    async fn emit(&mut self, event: Event) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            sent = self.events.send(event) => sent.is_ok(),
        }
    }

    /// Answer the peer's close frame, bounded by `close_timeout`.
    async fn acknowledge_close(&mut self) {
        let reply = self.sink.send(WsMessage::Close(Some(CloseFrame::normal())));
        if let Ok(Err(error)) = tokio::time::timeout(self.close_timeout, reply).await {
            tracing::debug!(feed = %self.feed, %error, "close reply failed");
        }
    }

    /// Send our close frame and wait for the peer's, bounded by `close_timeout`.
    async fn close_handshake(&mut self) {
        let feed = &self.feed;
        let handshake = close_socket(&mut self.sink, &mut self.stream);
        match tokio::time::timeout(self.close_timeout, handshake).await {
            Ok(Ok(())) => tracing::debug!(%feed, "close handshake complete"),
            Ok(Err(error)) => tracing::debug!(%feed, %error, "close handshake failed"),
            Err(_) => tracing::debug!(%feed, "close handshake timed out"),
        }
    }
}

async fn close_socket(sink: &mut WsSink, stream: &mut WsStream) -> Result<(), StreamError> {
    sink.send(WsMessage::Close(Some(CloseFrame::normal()))).await?;
    while let Some(frame) = stream.next().await {
        if frame?.is_close() {
            break;
        }
    }
    Ok(())
}
