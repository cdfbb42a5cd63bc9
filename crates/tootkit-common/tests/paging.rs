use std::collections::VecDeque;
use std::sync::Arc;

use http::StatusCode;
use http::header::LINK;
use tokio::sync::Mutex;
use tootkit_common::api::{ApiClient, Endpoint, Params};
use tootkit_common::error::ClientError;
use tootkit_common::http_client::HttpClient;
use tootkit_common::paging::{FetchPolicy, keep};
use tootkit_common::types::Status;
use tootkit_common::{Cursor, EntityId};
use url::Url;

#[derive(Clone, Default)]
struct MockClient {
    queue: Arc<Mutex<VecDeque<http::Response<Vec<u8>>>>>,
    log: Arc<Mutex<Vec<http::Request<Vec<u8>>>>>,
}

impl MockClient {
    async fn push(&self, resp: http::Response<Vec<u8>>) {
        self.queue.lock().await.push_back(resp);
    }

    async fn queries(&self) -> Vec<String> {
        self.log
            .lock()
            .await
            .iter()
            .map(|r| r.uri().query().unwrap_or("").to_string())
            .collect()
    }
}

impl HttpClient for MockClient {
    type Error = std::convert::Infallible;
    fn send_http(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> impl core::future::Future<
        Output = core::result::Result<http::Response<Vec<u8>>, Self::Error>,
    > + Send {
        let log = self.log.clone();
        let queue = self.queue.clone();
        async move {
            log.lock().await.push(request);
            Ok(queue.lock().await.pop_front().expect("no queued response"))
        }
    }
}

fn statuses(ids: std::ops::Range<u32>) -> Vec<u8> {
    let items: Vec<_> = ids
        .map(|id| serde_json::json!({ "id": id.to_string(), "content": format!("<p>{id}</p>") }))
        .collect();
    serde_json::to_vec(&items).unwrap()
}

fn page(ids: std::ops::Range<u32>, link: Option<&str>) -> http::Response<Vec<u8>> {
    let mut builder = http::Response::builder().status(StatusCode::OK);
    if let Some(link) = link {
        builder = builder.header(LINK, link);
    }
    builder.body(statuses(ids)).unwrap()
}

fn next_link(max_id: u32) -> String {
    format!(
        "<https://example.social/api/v1/favourites?max_id={max_id}>; rel=\"next\", \
         <https://example.social/api/v1/favourites?min_id=999>; rel=\"prev\""
    )
}

fn client(mock: &MockClient) -> ApiClient<MockClient> {
    ApiClient::new(mock.clone(), Url::parse("https://example.social").unwrap()).with_token("tkn")
}

#[tokio::test]
async fn fetch_all_follows_next_links() {
    let mock = MockClient::default();
    mock.push(page(0..20, Some(&next_link(80)))).await;
    mock.push(page(20..25, None)).await;

    let items: Vec<Status> = client(&mock)
        .fetch_paged(&Endpoint::favourites(), &Params::new(), &FetchPolicy::all())
        .await
        .unwrap();

    assert_eq!(items.len(), 25);
    assert_eq!(items[0].id.as_str(), "0");
    assert_eq!(items[24].id.as_str(), "24");
    assert_eq!(mock.queries().await, vec!["".to_string(), "max_id=80".to_string()]);
}

#[tokio::test]
async fn caller_bounds_go_on_the_first_request_only() {
    let mock = MockClient::default();
    mock.push(page(0..3, Some(&next_link(7)))).await;
    mock.push(page(3..5, None)).await;

    let policy = FetchPolicy::new()
        .fetch_all(true)
        .start(Cursor::new().since_id("2").limit(3).build())
        .build();
    let params = Params::new().with("local", "true");
    let items: Vec<Status> = client(&mock)
        .fetch_paged(&Endpoint::new("v1/timelines/public"), &params, &policy)
        .await
        .unwrap();

    assert_eq!(items.len(), 5);
    assert_eq!(
        mock.queries().await,
        vec![
            "local=true&limit=3&since_id=2".to_string(),
            "local=true&max_id=7".to_string(),
        ]
    );
}

#[tokio::test]
async fn quota_then_keep() {
    let mock = MockClient::default();
    mock.push(page(0..20, Some(&next_link(80)))).await;
    mock.push(page(20..40, Some(&next_link(60)))).await;

    let mut items: Vec<Status> = client(&mock)
        .fetch_paged(
            &Endpoint::favourites(),
            &Params::new(),
            &FetchPolicy::new().quota(30).build(),
        )
        .await
        .unwrap();
    assert_eq!(items.len(), 40);
    assert_eq!(mock.log.lock().await.len(), 2);

    keep(&mut items, Some(30));
    assert_eq!(items.len(), 30);
    assert_eq!(items.last().unwrap().id, EntityId::new("29"));
}

#[tokio::test]
async fn failure_after_first_page_keeps_items() {
    let mock = MockClient::default();
    mock.push(page(0..20, Some(&next_link(80)))).await;
    mock.push(
        http::Response::builder()
            .status(StatusCode::TOO_MANY_REQUESTS)
            .body(br#"{"error":"Too many requests"}"#.to_vec())
            .unwrap(),
    )
    .await;

    let err = client(&mock)
        .fetch_paged::<Status>(&Endpoint::favourites(), &Params::new(), &FetchPolicy::all())
        .await
        .unwrap_err();

    assert!(err.is_partial());
    assert_eq!(err.partial().len(), 20);
    let ClientError::Api(api) = err.error() else {
        panic!("expected api error, got {:?}", err.error());
    };
    assert_eq!(api.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(api.message, "Too many requests");
}

#[tokio::test]
async fn failure_on_first_page_returns_nothing() {
    let mock = MockClient::default();
    mock.push(
        http::Response::builder()
            .status(StatusCode::UNAUTHORIZED)
            .body(br#"{"error":"The access token is invalid"}"#.to_vec())
            .unwrap(),
    )
    .await;

    let err = client(&mock)
        .fetch_paged::<Status>(&Endpoint::bookmarks(), &Params::new(), &FetchPolicy::all())
        .await
        .unwrap_err();

    assert!(!err.is_partial());
    assert!(err.partial().is_empty());
    assert!(err.to_string().contains("The access token is invalid"));
}

#[tokio::test]
async fn malformed_link_header_is_an_error() {
    let mock = MockClient::default();
    mock.push(page(
        0..2,
        Some(r#"<https://example.social/api/v1/favourites?max_id=1&limit=x>; rel="next""#),
    ))
    .await;

    let err = client(&mock)
        .fetch_paged::<Status>(&Endpoint::favourites(), &Params::new(), &FetchPolicy::all())
        .await
        .unwrap_err();
    assert!(matches!(err.error(), ClientError::Link(_)));
}

#[tokio::test]
async fn undecodable_body_is_a_decode_error() {
    let mock = MockClient::default();
    mock.push(
        http::Response::builder()
            .status(StatusCode::OK)
            .body(b"{\"id\":".to_vec())
            .unwrap(),
    )
    .await;

    let err = client(&mock)
        .fetch_paged::<Status>(&Endpoint::favourites(), &Params::new(), &FetchPolicy::default())
        .await
        .unwrap_err();
    assert!(matches!(err.error(), ClientError::Decode(_)));
}
