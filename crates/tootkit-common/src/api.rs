//! REST client bound to one instance.
//!
//! [`ApiClient`] turns an [`Endpoint`], fixed [`Params`] and a [`Cursor`] into an
//! `http::Request`, hands it to the injected transport, and turns the response back into
//! typed items plus pagination links. It is generic over the transport and holds no global
//! state, so every test can run its own fake in parallel.

use std::fmt;

use bytes::Bytes;
use http::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::de::DeserializeOwned;
use smol_str::SmolStr;
use url::Url;

use crate::cursor::{Cursor, PageLinks};
use crate::error::{ApiErrorBody, ClientResult, DecodeError, HttpError, TransportError};
use crate::http_client::HttpClient;
use crate::paging::{self, FetchPolicy, Page, PageSource, PagingError};
use crate::types::EntityId;

/// Default `User-Agent` header value
pub const DEFAULT_USER_AGENT: &str = concat!("tootkit/", env!("CARGO_PKG_VERSION"));

/// A REST endpoint, as a path below `/api/`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    segments: Vec<SmolStr>,
}

impl Endpoint {
    /// Endpoint from a `/`-separated path such as `v1/timelines/home`.
    pub fn new(path: &str) -> Self {
        Self::from_segments(path.split('/'))
    }

    /// Endpoint from individual path segments. Segments are percent-encoded when the URL is
    /// built, so identifiers may be passed through as-is.
    pub fn from_segments<'a>(segments: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            segments: segments
                .into_iter()
                .filter(|s| !s.is_empty())
                .map(SmolStr::new)
                .collect(),
        }
    }

    /// Notifications of the authenticated user.
    pub fn notifications() -> Self {
        Self::new("v1/notifications")
    }

    /// Statuses the authenticated user favourited.
    pub fn favourites() -> Self {
        Self::new("v1/favourites")
    }

    /// Statuses the authenticated user bookmarked.
    pub fn bookmarks() -> Self {
        Self::new("v1/bookmarks")
    }

    /// Accounts the authenticated user blocks.
    pub fn blocks() -> Self {
        Self::new("v1/blocks")
    }

    /// Accounts the authenticated user mutes.
    pub fn mutes() -> Self {
        Self::new("v1/mutes")
    }

    /// Statuses posted by an account.
    pub fn account_statuses(account: &EntityId) -> Self {
        Self::from_segments(["v1", "accounts", account.as_str(), "statuses"])
    }

    /// Followers of an account.
    pub fn followers(account: &EntityId) -> Self {
        Self::from_segments(["v1", "accounts", account.as_str(), "followers"])
    }

    /// Accounts followed by an account.
    pub fn following(account: &EntityId) -> Self {
        Self::from_segments(["v1", "accounts", account.as_str(), "following"])
    }

    /// Members of a list.
    pub fn list_accounts(list: &EntityId) -> Self {
        Self::from_segments(["v1", "lists", list.as_str(), "accounts"])
    }

    /// Path segments below `/api/`.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().map(SmolStr::as_str)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("/api")?;
        for segment in &self.segments {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

/// Fixed query parameters of a request.
///
/// Order is preserved and keys may repeat, which array parameters such as
/// `exclude_types[]` rely on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(Vec<(SmolStr, String)>);

impl Params {
    /// No parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a parameter.
    pub fn with(mut self, key: impl Into<SmolStr>, value: impl ToString) -> Self {
        self.push(key, value);
        self
    }

    /// Append `key=true` when `on` is set, nothing otherwise.
    pub fn flag(self, key: impl Into<SmolStr>, on: bool) -> Self {
        if on { self.with(key, "true") } else { self }
    }

    /// Append a parameter in place.
    pub fn push(&mut self, key: impl Into<SmolStr>, value: impl ToString) {
        self.0.push((key.into(), value.to_string()));
    }

    /// Append every pair of `other`.
    pub fn extend(&mut self, other: Params) {
        self.0.extend(other.0);
    }

    /// First value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }

    /// Pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Whether there are no parameters.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Client configuration
#[derive(Debug, Clone, PartialEq, Eq, bon::Builder)]
#[builder(start_fn = new)]
pub struct ClientOptions {
    /// `User-Agent` header value
    #[builder(into, default = SmolStr::new_static(DEFAULT_USER_AGENT))]
    pub user_agent: SmolStr,
    /// Streaming host, when the instance serves streams from a separate origin
    pub streaming_base: Option<Url>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self::new().build()
    }
}

/// Client for one instance over transport `C`.
#[derive(Debug, Clone)]
pub struct ApiClient<C> {
    transport: C,
    instance: Url,
    token: Option<SmolStr>,
    options: ClientOptions,
}

impl<C> ApiClient<C> {
    /// Client for the instance at `instance`, e.g. `https://example.social`.
    pub fn new(transport: C, instance: Url) -> Self {
        Self {
            transport,
            instance,
            token: None,
            options: ClientOptions::default(),
        }
    }

    /// Authenticate requests with a bearer token. Empty tokens are ignored.
    pub fn with_token(mut self, token: impl Into<SmolStr>) -> Self {
        let token = token.into();
        self.token = (!token.is_empty()).then_some(token);
        self
    }

    /// Replace the client options.
    pub fn with_options(mut self, options: ClientOptions) -> Self {
        self.options = options;
        self
    }

    /// The instance base URL.
    pub fn instance(&self) -> &Url {
        &self.instance
    }

    /// The underlying transport.
    pub fn transport(&self) -> &C {
        &self.transport
    }

    /// The client options.
    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Absolute URL of `endpoint`, without query.
    pub fn endpoint_url(&self, endpoint: &Endpoint) -> Result<Url, TransportError> {
        let mut url = self.instance.clone();
        url.set_query(None);
        url.set_fragment(None);
        url.path_segments_mut()
            .map_err(|_| {
                TransportError::InvalidRequest(format!("{} cannot be a base URL", self.instance))
            })?
            .pop_if_empty()
            .push("api")
            .extend(endpoint.segments());
        Ok(url)
    }

    /// Build a `GET` request for one page.
    ///
    /// The query holds the fixed `params` followed by the cursor's bounds and limit. A
    /// cursor field overrides a fixed parameter of the same name.
    pub fn build_request(
        &self,
        endpoint: &Endpoint,
        params: &Params,
        cursor: &Cursor,
    ) -> Result<http::Request<Vec<u8>>, TransportError> {
        let mut url = self.endpoint_url(endpoint)?;

        let cursor_pairs = cursor.query_pairs();
        let mut pairs: Vec<(&str, &str)> = params
            .iter()
            .filter(|(key, _)| !cursor_pairs.iter().any(|(k, _)| k == key))
            .collect();
        pairs.extend(cursor_pairs.iter().map(|(k, v)| (*k, v.as_str())));

        if !pairs.is_empty() {
            let query = serde_html_form::to_string(&pairs)
                .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
            url.set_query(Some(&query));
        }

        let mut builder = http::Request::get(url.as_str())
            .header(USER_AGENT, self.options.user_agent.as_str())
            .header(ACCEPT, "application/json");
        if let Some(token) = &self.token {
            builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        builder
            .body(Vec::new())
            .map_err(|e| TransportError::InvalidRequest(e.to_string()))
    }
}

/// Split a response into headers and body, turning error statuses and server error objects
/// into [`ClientError`](crate::error::ClientError)s.
pub fn process_response(
    response: http::Response<Vec<u8>>,
) -> ClientResult<(http::HeaderMap, Vec<u8>)> {
    let (parts, body) = response.into_parts();
    if let Some(error) = ApiErrorBody::parse(&body) {
        return Err(error.into_api_error(parts.status).into());
    }
    if !parts.status.is_success() {
        return Err(HttpError {
            status: parts.status,
            body: (!body.is_empty()).then(|| Bytes::from(body)),
        }
        .into());
    }
    Ok((parts.headers, body))
}

impl<C: HttpClient> ApiClient<C> {
    async fn send(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> ClientResult<(http::HeaderMap, Vec<u8>)> {
        let response = self
            .transport
            .send_http(request)
            .await
            .map_err(TransportError::from_client)?;
        process_response(response)
    }

    /// Fetch a single resource.
    pub async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &Endpoint,
        params: &Params,
    ) -> ClientResult<T> {
        let request = self.build_request(endpoint, params, &Cursor::default())?;
        let (_, body) = self.send(request).await?;
        Ok(serde_json::from_slice(&body).map_err(DecodeError::from)?)
    }

    /// Fetch one page of a list endpoint.
    pub async fn get_page<T: DeserializeOwned>(
        &self,
        endpoint: &Endpoint,
        params: &Params,
        cursor: &Cursor,
    ) -> ClientResult<Page<T>> {
        let request = self.build_request(endpoint, params, cursor)?;
        tracing::debug!(uri = %request.uri().path(), ?cursor, "requesting page");
        let (headers, body) = self.send(request).await?;
        let links = PageLinks::from_headers(&headers)?;
        let items = serde_json::from_slice(&body).map_err(DecodeError::from)?;
        Ok(Page { items, links })
    }
}

impl<C: HttpClient + Sync> ApiClient<C> {
    /// Fetch pages of `endpoint` as `policy` dictates and return the items in server order.
    ///
    /// See [`paging`](crate::paging) for the failure semantics.
    #[tracing::instrument(level = "debug", skip_all, fields(endpoint = %endpoint))]
    pub async fn fetch_paged<T>(
        &self,
        endpoint: &Endpoint,
        params: &Params,
        policy: &FetchPolicy,
    ) -> Result<Vec<T>, PagingError<T>>
    where
        T: DeserializeOwned + Send,
    {
        let source = EndpointPages {
            client: self,
            endpoint,
            params,
        };
        paging::fetch_pages(&source, policy).await
    }
}

/// One endpoint and its fixed parameters, as a [`PageSource`].
struct EndpointPages<'a, C> {
    client: &'a ApiClient<C>,
    endpoint: &'a Endpoint,
    params: &'a Params,
}

impl<C, T> PageSource<T> for EndpointPages<'_, C>
where
    C: HttpClient + Sync,
    T: DeserializeOwned + Send,
{
    async fn fetch_page(&self, cursor: &Cursor) -> ClientResult<Page<T>> {
        self.client.get_page(self.endpoint, self.params, cursor).await
    }
}

#[cfg(not(target_arch = "wasm32"))]
mod listen {
    use super::*;
    use crate::streaming::listener;
    use crate::streaming::{Feed, ListenError, ListenOptions, Listener};
    use crate::websocket::WebSocketClient;

    impl<C> ApiClient<C> {
        /// WebSocket URL following `feed`.
        ///
        /// The streaming base defaults to the instance URL with `https` mapped to `wss` and
        /// `http` to `ws`. The access token travels in the query because browsers and some
        /// proxies do not pass headers through the upgrade.
        pub fn streaming_url(&self, feed: &Feed) -> Result<Url, ListenError> {
            let mut url = self
                .options
                .streaming_base
                .clone()
                .unwrap_or_else(|| self.instance.clone());
            let scheme = match url.scheme() {
                "https" | "wss" => "wss",
                "http" | "ws" => "ws",
                other => {
                    return Err(ListenError::Url(
                        format!("unsupported scheme {other:?}").into(),
                    ));
                }
            };
            url.set_scheme(scheme)
                .map_err(|_| ListenError::Url(format!("cannot switch {url} to {scheme}").into()))?;
            url.set_query(None);
            url.set_fragment(None);
            url.path_segments_mut()
                .map_err(|_| ListenError::Url("streaming base cannot be a base URL".into()))?
                .pop_if_empty()
                .extend(["api", "v1", "streaming"]);
            {
                let mut query = url.query_pairs_mut();
                for (key, value) in feed.stream_params() {
                    query.append_pair(key, &value);
                }
                if let Some(token) = &self.token {
                    query.append_pair("access_token", token);
                }
            }
            Ok(url)
        }
    }

    impl<C: WebSocketClient> ApiClient<C> {
        /// Follow `feeds` until cancelled.
        ///
        /// The feed set is checked against `options` before anything touches the network.
        /// With one feed the listener is a thin wrapper over that connection; with several,
        /// their events are merged in arrival order.
        #[tracing::instrument(
            level = "debug",
            skip(self, options),
            fields(instance = %self.instance)
        )]
        pub async fn listen(
            &self,
            feeds: Vec<Feed>,
            options: ListenOptions,
        ) -> Result<Listener, ListenError> {
            options.check(&feeds)?;
            let targets = feeds
                .into_iter()
                .map(|feed| self.streaming_url(&feed).map(|url| (feed, url)))
                .collect::<Result<Vec<_>, _>>()?;
            listener::listen(&self.transport, targets, options).await
        }
    }
}
