use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::StreamExt;
use futures::channel::mpsc;
use tootkit_common::api::ApiClient;
use tootkit_common::stream::{StreamError, StreamErrorKind};
use tootkit_common::streaming::{
    ConnectionState, Event, Feed, ListenError, ListenOptions, Listener,
};
use tootkit_common::websocket::{
    CloseCode, CloseFrame, WebSocketClient, WebSocketConnection, WsMessage, WsSink, WsStream,
};
use url::Url;

type Inbound = mpsc::UnboundedSender<Result<WsMessage, StreamError>>;
type Outbound = mpsc::UnboundedSender<WsMessage>;

/// Server end of one fake socket
struct Server {
    url: Url,
    to_client: Inbound,
    from_client: mpsc::UnboundedReceiver<WsMessage>,
}

impl Server {
    fn send(&self, frame: String) {
        self.to_client
            .unbounded_send(Ok(WsMessage::Text(frame)))
            .unwrap();
    }

    fn close(&self, code: CloseCode) {
        self.to_client
            .unbounded_send(Ok(WsMessage::Close(Some(CloseFrame::new(code, "")))))
            .unwrap();
    }

    fn hang_up(&self) {
        self.to_client.close_channel();
    }

    async fn received(&mut self) -> Option<WsMessage> {
        tokio::time::timeout(Duration::from_secs(5), self.from_client.next())
            .await
            .expect("client never sent anything")
    }
}

#[derive(Clone, Default)]
struct MockSockets {
    servers: Arc<Mutex<Vec<Server>>>,
    attempts: Arc<AtomicUsize>,
    fail_at: Option<usize>,
    silent: bool,
}

impl MockSockets {
    fn failing_at(attempt: usize) -> Self {
        Self {
            fail_at: Some(attempt),
            ..Self::default()
        }
    }

    /// Peers that never answer the client's close frame.
    fn silent() -> Self {
        Self {
            silent: true,
            ..Self::default()
        }
    }

    fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn take_servers(&self) -> Vec<Server> {
        std::mem::take(&mut *self.servers.lock().unwrap())
    }

    fn open(&self, url: Url) -> WebSocketConnection {
        let (to_client, inbound) = mpsc::unbounded();
        let (outbound, from_client) = mpsc::unbounded();

        // Unless silent, answers the client's close frame the way a well-behaved server does
        let echo = (!self.silent).then(|| to_client.clone());
        let sink = futures::sink::unfold(
            (outbound, echo),
            |(outbound, echo): (Outbound, Option<Inbound>), msg: WsMessage| async move {
                if let (true, Some(echo)) = (msg.is_close(), &echo) {
                    let _ = echo.unbounded_send(Ok(WsMessage::Close(None)));
                }
                match outbound.unbounded_send(msg) {
                    Ok(()) => Ok((outbound, echo)),
                    Err(_) => Err(StreamError::closed()),
                }
            },
        );

        self.servers.lock().unwrap().push(Server {
            url,
            to_client,
            from_client,
        });
        WebSocketConnection::new(WsSink::new(sink), WsStream::new(inbound))
    }
}

impl WebSocketClient for MockSockets {
    type Error = std::io::Error;

    fn connect(
        &self,
        url: Url,
    ) -> impl core::future::Future<Output = Result<WebSocketConnection, Self::Error>> + Send {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        let result = if self.fail_at == Some(attempt) {
            Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "refused",
            ))
        } else {
            Ok(self.open(url))
        };
        async move { result }
    }
}

fn client(sockets: &MockSockets) -> ApiClient<MockSockets> {
    ApiClient::new(
        sockets.clone(),
        Url::parse("https://example.social").unwrap(),
    )
    .with_token("tkn")
}

fn update(id: &str) -> String {
    serde_json::json!({
        "stream": ["user"],
        "event": "update",
        "payload": serde_json::json!({ "id": id, "content": "hi" }).to_string(),
    })
    .to_string()
}

async fn next(listener: &mut Listener) -> Option<Event> {
    tokio::time::timeout(Duration::from_secs(5), listener.next_event())
        .await
        .expect("no event within 5s")
}

fn status_id(event: Event) -> String {
    match event {
        Event::Update(status) => status.id.to_string(),
        other => panic!("expected update, got {other:?}"),
    }
}

fn hashtags(n: usize) -> Vec<Feed> {
    (0..n)
        .map(|i| Feed::hashtag(&format!("tag{i}")).unwrap())
        .collect()
}

#[tokio::test]
async fn too_many_feeds_never_connects() {
    let sockets = MockSockets::default();
    let err = client(&sockets)
        .listen(hashtags(5), ListenOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ListenError::TooManyFeeds {
            requested: 5,
            max: 4
        }
    ));
    assert_eq!(sockets.attempts(), 0);
}

#[tokio::test]
async fn empty_feed_list_is_rejected() {
    let sockets = MockSockets::default();
    let err = client(&sockets)
        .listen(Vec::new(), ListenOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, ListenError::NoFeeds));
    assert_eq!(sockets.attempts(), 0);
}

#[tokio::test]
async fn single_feed_passes_events_through() {
    let sockets = MockSockets::default();
    let mut listener = client(&sockets)
        .listen(vec![Feed::User], ListenOptions::default())
        .await
        .unwrap();
    let mut server = sockets.take_servers().pop().unwrap();
    assert_eq!(
        server.url.as_str(),
        "wss://example.social/api/v1/streaming?stream=user&access_token=tkn"
    );

    server.send(update("1"));
    server.send(update("2"));
    assert_eq!(status_id(next(&mut listener).await.unwrap()), "1");
    assert_eq!(status_id(next(&mut listener).await.unwrap()), "2");

    listener.cancel();
    listener.done().wait().await;
    assert_eq!(listener.states(), vec![(Feed::User, ConnectionState::Closed)]);

    let Some(WsMessage::Close(Some(frame))) = server.received().await else {
        panic!("expected a close frame");
    };
    assert_eq!(frame.code, CloseCode::NORMAL);
}

#[tokio::test]
async fn bad_frame_yields_one_error_and_reading_continues() {
    let sockets = MockSockets::default();
    let mut listener = client(&sockets)
        .listen(vec![Feed::Public], ListenOptions::default())
        .await
        .unwrap();
    let server = sockets.take_servers().pop().unwrap();

    server.send("{not json".to_string());
    server.send(r#"{"event":"filters_changed"}"#.to_string());
    server.send(update("7"));

    let Some(Event::Error(first)) = next(&mut listener).await else {
        panic!("expected a decode error");
    };
    assert_eq!(first.kind(), StreamErrorKind::Decode);
    let Some(Event::Error(second)) = next(&mut listener).await else {
        panic!("expected an unknown event error");
    };
    assert_eq!(second.kind(), StreamErrorKind::UnknownEvent);
    assert_eq!(status_id(next(&mut listener).await.unwrap()), "7");
    assert_eq!(listener.states()[0].1, ConnectionState::Open);
}

#[tokio::test]
async fn cancel_waits_for_every_connection() {
    let sockets = MockSockets::default();
    let feeds = vec![Feed::User, Feed::Local, Feed::hashtag("rust").unwrap()];
    let listener = client(&sockets)
        .listen(feeds, ListenOptions::default())
        .await
        .unwrap();
    let mut servers = sockets.take_servers();
    assert_eq!(servers.len(), 3);

    let done = listener.done();
    tokio::task::yield_now().await;
    assert!(!done.is_done());

    let cancel = listener.cancel_handle();
    cancel.cancel();
    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), done.wait())
        .await
        .expect("done never raised");

    assert!(done.is_done());
    for (feed, state) in listener.states() {
        assert_eq!(state, ConnectionState::Closed, "{feed} not closed");
    }
    for server in &mut servers {
        assert!(server.received().await.unwrap().is_close());
    }
}

#[tokio::test]
async fn per_connection_order_survives_merging() {
    let sockets = MockSockets::default();
    let feeds = vec![Feed::hashtag("a").unwrap(), Feed::hashtag("b").unwrap()];
    let mut listener = client(&sockets)
        .listen(feeds, ListenOptions::default())
        .await
        .unwrap();
    let servers = sockets.take_servers();

    for i in 0..5 {
        servers[0].send(update(&format!("a{i}")));
        servers[1].send(update(&format!("b{i}")));
    }

    let mut seen: HashMap<char, Vec<String>> = HashMap::new();
    for _ in 0..10 {
        let id = status_id(next(&mut listener).await.unwrap());
        let origin = id.chars().next().unwrap();
        seen.entry(origin).or_default().push(id);
    }
    assert_eq!(seen[&'a'], vec!["a0", "a1", "a2", "a3", "a4"]);
    assert_eq!(seen[&'b'], vec!["b0", "b1", "b2", "b3", "b4"]);
}

#[tokio::test]
async fn failed_setup_closes_opened_connections() {
    let sockets = MockSockets::failing_at(2);
    let feeds = vec![Feed::User, Feed::Public, Feed::Direct];
    let err = client(&sockets)
        .listen(feeds, ListenOptions::default())
        .await
        .unwrap_err();

    let ListenError::Connect { feed, .. } = err else {
        panic!("expected a connect error, got {err:?}");
    };
    assert_eq!(feed, Feed::Direct);
    assert_eq!(sockets.attempts(), 3);

    let mut servers = sockets.take_servers();
    assert_eq!(servers.len(), 2);
    for server in &mut servers {
        assert!(server.received().await.unwrap().is_close());
    }
}

#[tokio::test]
async fn hang_up_is_one_error_then_end() {
    let sockets = MockSockets::default();
    let mut listener = client(&sockets)
        .listen(vec![Feed::User], ListenOptions::default())
        .await
        .unwrap();
    let server = sockets.take_servers().pop().unwrap();

    server.hang_up();
    let Some(Event::Error(err)) = next(&mut listener).await else {
        panic!("expected a stream error");
    };
    assert_eq!(err.kind(), StreamErrorKind::Closed);
    assert!(next(&mut listener).await.is_none());

    listener.done().wait().await;
    assert_eq!(listener.states()[0].1, ConnectionState::Faulted);
}

#[tokio::test]
async fn normal_remote_close_is_not_an_error() {
    let sockets = MockSockets::default();
    let mut listener = client(&sockets)
        .listen(vec![Feed::User], ListenOptions::default())
        .await
        .unwrap();
    let server = sockets.take_servers().pop().unwrap();

    server.send(update("1"));
    server.close(CloseCode::NORMAL);
    assert_eq!(status_id(next(&mut listener).await.unwrap()), "1");
    assert!(next(&mut listener).await.is_none());
    listener.done().wait().await;
    assert_eq!(listener.states()[0].1, ConnectionState::Closed);
}

#[tokio::test]
async fn server_going_away_is_not_an_error() {
    let sockets = MockSockets::default();
    let mut listener = client(&sockets)
        .listen(vec![Feed::Public], ListenOptions::default())
        .await
        .unwrap();
    let server = sockets.take_servers().pop().unwrap();

    server.close(CloseCode::AWAY);
    assert!(next(&mut listener).await.is_none());
    listener.done().wait().await;
    assert_eq!(listener.states()[0].1, ConnectionState::Closed);
}

#[tokio::test]
async fn done_is_raised_when_peers_never_answer_the_close() {
    let sockets = MockSockets::silent();
    let feeds = vec![Feed::User, Feed::Local, Feed::Direct];
    let options = ListenOptions::new()
        .close_timeout(Duration::from_millis(200))
        .build();
    let listener = client(&sockets).listen(feeds, options).await.unwrap();
    let mut servers = sockets.take_servers();

    let started = tokio::time::Instant::now();
    listener.cancel();
    tokio::time::timeout(Duration::from_secs(5), listener.done().wait())
        .await
        .expect("done never raised");

    assert!(started.elapsed() >= Duration::from_millis(200));
    for (feed, state) in listener.states() {
        assert_eq!(state, ConnectionState::Closed, "{feed} not closed");
    }
    for server in &mut servers {
        assert!(server.received().await.unwrap().is_close());
    }
}

#[tokio::test]
async fn one_fault_does_not_stop_siblings() {
    let sockets = MockSockets::default();
    let mut listener = client(&sockets)
        .listen(vec![Feed::User, Feed::Public], ListenOptions::default())
        .await
        .unwrap();
    let servers = sockets.take_servers();

    servers[0].close(CloseCode::POLICY);
    let Some(Event::Error(err)) = next(&mut listener).await else {
        panic!("expected a stream error");
    };
    assert_eq!(err.kind(), StreamErrorKind::Closed);
    assert!(err.to_string().contains("1008"));

    servers[1].send(update("9"));
    assert_eq!(status_id(next(&mut listener).await.unwrap()), "9");
    assert!(!listener.done().is_done());

    let states = listener.states();
    assert_eq!(states[0].1, ConnectionState::Faulted);
    assert_eq!(states[1].1, ConnectionState::Open);
}

#[tokio::test]
async fn dropping_the_listener_closes_sockets() {
    let sockets = MockSockets::default();
    let listener = client(&sockets)
        .listen(vec![Feed::User, Feed::Direct], ListenOptions::default())
        .await
        .unwrap();
    let done = listener.done();
    drop(listener);

    tokio::time::timeout(Duration::from_secs(5), done.wait())
        .await
        .expect("done never raised");
    for mut server in sockets.take_servers() {
        assert!(server.received().await.unwrap().is_close());
    }
}

#[tokio::test]
async fn dropping_the_raw_receiver_closes_the_socket() {
    let sockets = MockSockets::default();
    let listener = client(&sockets)
        .listen(vec![Feed::User], ListenOptions::default())
        .await
        .unwrap();
    let (events, cancel, done) = listener.into_parts();
    assert!(!cancel.is_cancelled());
    drop(events);

    tokio::time::timeout(Duration::from_secs(5), done.wait())
        .await
        .expect("done never raised");
    let mut server = sockets.take_servers().pop().unwrap();
    assert!(server.received().await.unwrap().is_close());
}
