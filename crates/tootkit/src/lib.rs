//! # tootkit
//!
//! Client for Mastodon-compatible servers: paged timelines and lists that follow the
//! server's `Link` cursors, and live feeds merged from several WebSocket streams.
//!
//! The core lives in [`tootkit_common`] and is re-exported here. This crate adds the
//! default transport ([`client::DefaultTransport`]) and the `tootkit` command-line demo.
//!
//! ```no_run
//! use tootkit::api::{ClientOptions, Endpoint, Params};
//! use tootkit::client::basic_client;
//! use tootkit::paging::FetchPolicy;
//! use tootkit::types::Status;
//! # use miette::IntoDiagnostic;
//!
//! #[tokio::main]
//! async fn main() -> miette::Result<()> {
//!     let instance = "https://example.social".parse().into_diagnostic()?;
//!     let client = basic_client(instance, Some("token"), ClientOptions::default());
//!     let (endpoint, params) = tootkit::streaming::Feed::User.timeline();
//!     let statuses: Vec<Status> = client
//!         .fetch_paged(&endpoint, &params, &FetchPolicy::limited(20))
//!         .await?;
//!     println!("{} statuses", statuses.len());
//!     # let _ = (Endpoint::favourites(), Params::new());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

pub mod client;
pub mod output;

pub use tootkit_common::{
    ApiClient, ClientError, Cursor, EntityId, FetchPolicy, PagingError, Resource, api, cursor,
    error, http_client, paging, stream, streaming, types, websocket,
};
