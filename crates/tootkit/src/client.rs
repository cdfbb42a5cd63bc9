//! Batteries-included transport and client.

use std::future::Future;

use tootkit_common::api::{ApiClient, ClientOptions};
use tootkit_common::http_client::HttpClient;
use tootkit_common::websocket::tungstenite_client::TungsteniteClient;
use tootkit_common::websocket::{WebSocketClient, WebSocketConnection};
use url::Url;

/// `reqwest` for REST calls, tokio-tungstenite for streams.
#[derive(Debug, Clone, Default)]
pub struct DefaultTransport {
    http: reqwest::Client,
    ws: TungsteniteClient,
}

impl DefaultTransport {
    /// Transport with default `reqwest` settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport over an existing `reqwest` client, to share its pool and proxy settings.
    pub fn with_http(http: reqwest::Client) -> Self {
        Self {
            http,
            ws: TungsteniteClient::new(),
        }
    }
}

impl HttpClient for DefaultTransport {
    type Error = reqwest::Error;

    fn send_http(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> impl Future<Output = Result<http::Response<Vec<u8>>, Self::Error>> + Send {
        self.http.send_http(request)
    }
}

impl WebSocketClient for DefaultTransport {
    type Error = <TungsteniteClient as WebSocketClient>::Error;

    fn connect(
        &self,
        url: Url,
    ) -> impl Future<Output = Result<WebSocketConnection, Self::Error>> + Send {
        self.ws.connect(url)
    }
}

/// API client over [`DefaultTransport`].
pub type BasicClient = ApiClient<DefaultTransport>;

/// Build a [`BasicClient`] for `instance`.
///
/// An empty `token` makes an anonymous client, which is enough for public timelines.
pub fn basic_client(instance: Url, token: Option<&str>, options: ClientOptions) -> BasicClient {
    let client = ApiClient::new(DefaultTransport::new(), instance).with_options(options);
    match token {
        Some(token) => client.with_token(token),
        None => client,
    }
}
