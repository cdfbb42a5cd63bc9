//! Live feeds over WebSocket.
//!
//! Each [`Feed`] gets its own socket and read task. [`Listener`] merges one or more of them
//! into a single channel of [`Event`]s, fanned in by per-connection forwarders. Shutdown is
//! cooperative: [`CancelHandle::cancel`] asks every connection to run its close handshake,
//! and [`Done`] is raised once all of them have ended.
//!
//! ```no_run
//! # use tootkit_common::api::ApiClient;
//! # use tootkit_common::streaming::{Feed, ListenOptions};
//! # use tootkit_common::websocket::tungstenite_client::TungsteniteClient;
//! # async fn example(client: ApiClient<TungsteniteClient>) -> miette::Result<()> {
//! let feeds = vec![Feed::User, Feed::parse(":rust")?];
//! let mut listener = client.listen(feeds, ListenOptions::default()).await?;
//! while let Some(event) = listener.next_event().await {
//!     println!("{}", event.name());
//! }
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod event;
pub mod feed;
pub mod listener;

pub use connection::{Connection, ConnectionState};
pub use event::{Event, decode_frame};
pub use feed::{Feed, FeedError};
pub use listener::{CancelHandle, Done, ListenError, ListenOptions, Listener};
