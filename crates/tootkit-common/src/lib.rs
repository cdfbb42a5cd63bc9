//! Core of the tootkit client: cursor-based paging over `Link` headers and multiplexed
//! WebSocket streams with cooperative shutdown.
//!
//! Both halves run over injected transports ([`http_client::HttpClient`] and
//! [`websocket::WebSocketClient`]), so nothing here opens a socket on its own.
//!
//! ```no_run
//! # use tootkit_common::api::{ApiClient, Endpoint, Params};
//! # use tootkit_common::paging::FetchPolicy;
//! # use tootkit_common::types::Status;
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = ApiClient::new(reqwest::Client::new(), "https://example.social".parse()?)
//!     .with_token("secret");
//! let statuses: Vec<Status> = client
//!     .fetch_paged(&Endpoint::favourites(), &Params::new(), &FetchPolicy::limited(40))
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
pub use smol_str;
pub use url;

pub mod api;
/// Pagination cursors and the `Link` header grammar.
pub mod cursor;
pub mod error;
pub mod http_client;
/// Paged fetch loop.
pub mod paging;
pub mod stream;
#[cfg(not(target_arch = "wasm32"))]
pub mod streaming;
/// Identifiers and resource kinds.
pub mod types;
pub mod websocket;

pub use api::{ApiClient, ClientOptions, Endpoint, Params};
pub use cursor::{Cursor, PageLinks};
pub use error::{ClientError, ClientResult};
pub use paging::{FetchPolicy, PagingError};
pub use types::{EntityId, Resource};
