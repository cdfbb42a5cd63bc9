//! Listening to one or more feeds through a single event channel.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::Stream;
use smol_str::SmolStr;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio_util::sync::{CancellationToken, DropGuard};
use url::Url;

use super::connection::{self, Connection, ConnectionState};
use super::event::Event;
use super::feed::{Feed, FeedError};
use crate::stream::BoxError;
use crate::websocket::WebSocketClient;

/// Default cap on simultaneously followed feeds
pub const DEFAULT_MAX_FEEDS: usize = 4;
/// Default capacity of every event channel
pub const DEFAULT_CHANNEL_CAPACITY: usize = 10;
/// Default bound on the close handshake
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Listener configuration
#[derive(Debug, Clone, PartialEq, Eq, bon::Builder)]
#[builder(start_fn = new)]
pub struct ListenOptions {
    /// Maximum number of feeds per listener
    #[builder(default = DEFAULT_MAX_FEEDS)]
    pub max_feeds: usize,
    /// Capacity of the per-connection and the merged event channels
    #[builder(default = DEFAULT_CHANNEL_CAPACITY)]
    pub channel_capacity: usize,
    /// How long to wait for the server's close frame after sending ours
    #[builder(default = DEFAULT_CLOSE_TIMEOUT)]
    pub close_timeout: Duration,
}

impl Default for ListenOptions {
    fn default() -> Self {
        Self::new().build()
    }
}

impl ListenOptions {
    /// Reject feed sets the listener will not open. Runs before any connection attempt.
    pub fn check(&self, feeds: &[Feed]) -> Result<(), ListenError> {
        if feeds.is_empty() {
            return Err(ListenError::NoFeeds);
        }
        if feeds.len() > self.max_feeds {
            return Err(ListenError::TooManyFeeds {
                requested: feeds.len(),
                max: self.max_feeds,
            });
        }
        Ok(())
    }
}

/// Signal raised once, when every connection behind it is terminal.
#[derive(Debug, Clone)]
pub struct Done(watch::Receiver<bool>);

impl Done {
    /// Whether the signal has been raised.
    pub fn is_done(&self) -> bool {
        *self.0.borrow()
    }

    /// Wait for the signal. Returns immediately if it was already raised.
    pub async fn wait(&self) {
        let mut rx = self.0.clone();
        // An error means the notifier is gone, which only happens after it raised the signal
        let _ = rx.wait_for(|done| *done).await;
    }
}

/// Raises its [`Done`] when dropped.
#[derive(Debug)]
pub(crate) struct DoneNotifier(watch::Sender<bool>);

impl DoneNotifier {
    pub(crate) fn new() -> (Self, Done) {
        let (tx, rx) = watch::channel(false);
        (Self(tx), Done(rx))
    }
}

impl Drop for DoneNotifier {
    fn drop(&mut self) {
        self.0.send_replace(true);
    }
}

/// Cloneable handle that stops a listener.
#[derive(Debug, Clone)]
pub struct CancelHandle(CancellationToken);

impl CancelHandle {
    /// Ask every connection to close. Idempotent.
    pub fn cancel(&self) {
        self.0.cancel();
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }
}

/// Events from one or more feeds, in arrival order.
///
/// Dropping the listener cancels every connection behind it.
#[derive(Debug)]
pub struct Listener {
    events: mpsc::Receiver<Event>,
    cancel: CancelHandle,
    done: Done,
    states: Vec<(Feed, watch::Receiver<ConnectionState>)>,
    guard: DropGuard,
}

impl Listener {
    /// Next event, or `None` once every connection has ended.
    pub async fn next_event(&mut self) -> Option<Event> {
        self.events.recv().await
    }

    /// Handle for cancelling from elsewhere.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Shorthand for `cancel_handle().cancel()`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Signal raised after every connection is terminal.
    pub fn done(&self) -> Done {
        self.done.clone()
    }

    /// Current state of each connection, in the order the feeds were given.
    pub fn states(&self) -> Vec<(Feed, ConnectionState)> {
        self.states
            .iter()
            .map(|(feed, state)| (feed.clone(), *state.borrow()))
            .collect()
    }

    /// Take the raw parts.
    ///
    /// The connections keep running until cancelled or until the receiver is dropped.
    pub fn into_parts(self) -> (mpsc::Receiver<Event>, CancelHandle, Done) {
        self.guard.disarm();
        (self.events, self.cancel, self.done)
    }
}

impl Stream for Listener {
    type Item = Event;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Event>> {
        self.events.poll_recv(cx)
    }
}

/// Listener setup failures
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum ListenError {
    /// Empty feed list
    #[error("no feeds to listen to")]
    #[diagnostic(code(tootkit::listen::no_feeds))]
    NoFeeds,
    /// More feeds than the listener allows
    #[error("too many feeds: {requested} requested, at most {max} allowed")]
    #[diagnostic(code(tootkit::listen::too_many_feeds))]
    TooManyFeeds {
        /// Number of feeds asked for
        requested: usize,
        /// Configured cap
        max: usize,
    },
    /// A feed argument could not be parsed
    #[error(transparent)]
    #[diagnostic(transparent)]
    Feed(#[from] FeedError),
    /// The streaming URL could not be built
    #[error("invalid streaming URL: {0}")]
    #[diagnostic(code(tootkit::listen::url))]
    Url(SmolStr),
    /// The WebSocket handshake failed
    #[error("cannot open {feed} stream: {source}")]
    #[diagnostic(code(tootkit::listen::connect))]
    Connect {
        /// Feed whose connection failed
        feed: Feed,
        /// Transport failure
        source: BoxError,
    },
}

/// Open one connection per target and merge them.
///
/// Connections are opened one after another. If any fails, those already open are closed
/// before the error is returned.
#[tracing::instrument(level = "debug", skip_all, fields(feeds = targets.len()))]
pub(crate) async fn listen<W>(
    client: &W,
    targets: Vec<(Feed, Url)>,
    options: ListenOptions,
) -> Result<Listener, ListenError>
where
    W: WebSocketClient,
{
    let feeds: Vec<Feed> = targets.iter().map(|(feed, _)| feed.clone()).collect();
    options.check(&feeds)?;

    let root = CancellationToken::new();
    // Also covers this future being dropped mid-setup
    let guard = root.clone().drop_guard();

    let mut opened: Vec<Connection> = Vec::with_capacity(targets.len());
    for (feed, url) in targets {
        match connection::connect(client, feed.clone(), url, root.child_token(), &options).await {
            Ok(conn) => opened.push(conn),
            Err(e) => {
                tracing::warn!(%feed, error = %e, opened = opened.len(), "stream setup failed");
                root.cancel();
                futures::future::join_all(opened.into_iter().map(Connection::close)).await;
                return Err(ListenError::Connect {
                    feed,
                    source: Box::new(e),
                });
            }
        }
    }

    let cancel = CancelHandle(root.clone());

    if opened.len() == 1 {
        if let Some(conn) = opened.pop() {
            let (feed, events, state, done) = conn.into_parts();
            return Ok(Listener {
                events,
                cancel,
                done,
                states: vec![(feed, state)],
                guard,
            });
        }
    }

    let (out_tx, out_rx) = mpsc::channel(options.channel_capacity.max(1));
    let (notifier, done) = DoneNotifier::new();
    let mut states = Vec::with_capacity(opened.len());
    let mut forwarders = JoinSet::new();
    for conn in opened {
        let (feed, events, state, conn_done) = conn.into_parts();
        states.push((feed.clone(), state));
        forwarders.spawn(forward(feed, events, conn_done, out_tx.clone(), root.clone()));
    }
    drop(out_tx);

    tokio::spawn(async move {
        let _notifier = notifier;
        while let Some(joined) = forwarders.join_next().await {
            if let Err(error) = joined {
                tracing::warn!(%error, "stream forwarder failed");
            }
        }
        tracing::debug!("all streams ended");
    });

    Ok(Listener {
        events: out_rx,
        cancel,
        done,
        states,
        guard,
    })
}

/// Copy one connection's events into the merged channel, then wait for it to finish.
async fn forward(
    feed: Feed,
    mut events: mpsc::Receiver<Event>,
    done: Done,
    out: mpsc::Sender<Event>,
    root: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = out.closed() => {
                tracing::debug!(%feed, "event consumer gone, cancelling");
                root.cancel();
                break;
            }
            event = events.recv() => event,
        };
        let Some(event) = event else {
            break;
        };
        tokio::select! {
            biased;
            sent = out.send(event) => {
                if sent.is_err() {
                    root.cancel();
                    break;
                }
            }
            _ = root.cancelled() => break,
        }
    }
    drop(events);
    done.wait().await;
}
