//! Pagination cursors and the `Link` header grammar
//!
//! Servers page list endpoints by attaching a `Link` header to every response:
//!
//! ```text
//! Link: <https://example.social/api/v1/timelines/home?max_id=109>; rel="next",
//!       <https://example.social/api/v1/timelines/home?min_id=130>; rel="prev"
//! ```
//!
//! [`PageLinks::from_headers`] turns that header into typed [`Cursor`]s. The paging loop
//! follows these cursors verbatim and never derives a position from item identifiers.

use std::sync::LazyLock;

use http::HeaderMap;
use http::header::LINK;
use regex::Regex;
use url::Url;

use crate::types::EntityId;

static LINK_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"<([^>]+)>\s*;\s*rel="([^"]+)""#).unwrap());

/// A position in a server-side result set.
#[derive(Debug, Clone, Default, PartialEq, Eq, bon::Builder)]
#[builder(start_fn = new)]
pub struct Cursor {
    /// Return results newer than this identifier
    #[builder(into)]
    pub since_id: Option<EntityId>,
    /// Return results immediately newer than this identifier
    #[builder(into)]
    pub min_id: Option<EntityId>,
    /// Return results older than this identifier
    #[builder(into)]
    pub max_id: Option<EntityId>,
    /// Page size hint
    pub limit: Option<u32>,
}

fn set(id: &Option<EntityId>) -> Option<&EntityId> {
    id.as_ref().filter(|id| !id.is_empty())
}

impl Cursor {
    /// Whether any bound is set. A bounds-free cursor is not a usable paging position.
    pub fn is_bounded(&self) -> bool {
        set(&self.since_id).is_some() || set(&self.min_id).is_some() || set(&self.max_id).is_some()
    }

    /// Query parameters for this cursor.
    ///
    /// Unset or empty bounds and a zero limit are omitted entirely.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::with_capacity(4);
        if let Some(limit) = self.limit.filter(|l| *l > 0) {
            pairs.push(("limit", limit.to_string()));
        }
        if let Some(id) = set(&self.since_id) {
            pairs.push(("since_id", id.to_string()));
        }
        if let Some(id) = set(&self.min_id) {
            pairs.push(("min_id", id.to_string()));
        }
        if let Some(id) = set(&self.max_id) {
            pairs.push(("max_id", id.to_string()));
        }
        pairs
    }

    /// Read a cursor from a pagination URL.
    ///
    /// Returns `Ok(None)` when the URL carries no bound.
    pub fn from_url(url: &Url) -> Result<Option<Self>, LinkError> {
        let mut cursor = Cursor::default();
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "since_id" => cursor.since_id = EntityId::new(&value).non_empty(),
                "min_id" => cursor.min_id = EntityId::new(&value).non_empty(),
                "max_id" => cursor.max_id = EntityId::new(&value).non_empty(),
                "limit" if !value.is_empty() => {
                    let limit = value.parse::<u32>().map_err(|e| LinkError::Limit {
                        value: value.to_string(),
                        source: e,
                    })?;
                    cursor.limit = Some(limit);
                }
                _ => {}
            }
        }
        Ok(cursor.is_bounded().then_some(cursor))
    }
}

/// `next`/`prev` cursors of one response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageLinks {
    /// Cursor for the following (older) page
    pub next: Option<Cursor>,
    /// Cursor for the preceding (newer) page
    pub prev: Option<Cursor>,
}

impl PageLinks {
    /// Parse every `Link` header of a response.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, LinkError> {
        let values = headers
            .get_all(LINK)
            .iter()
            .map(|v| v.to_str().map_err(|_| LinkError::Encoding))
            .collect::<Result<Vec<_>, _>>()?;
        parse_link_values(values)
    }

    /// Whether the response advertised no usable cursor.
    pub fn is_empty(&self) -> bool {
        self.next.is_none() && self.prev.is_none()
    }
}

/// Parse raw `Link` header values into [`PageLinks`].
///
/// Each value may hold several comma-separated `<URL>; rel="REL"` entries. Relations
/// other than `next` and `prev` are ignored, as are entries without any bound.
pub fn parse_link_values<'a, I>(values: I) -> Result<PageLinks, LinkError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut links = PageLinks::default();
    for value in values {
        for caps in LINK_REGEX.captures_iter(value) {
            let (target, rel) = (&caps[1], &caps[2]);
            let url = Url::parse(target).map_err(|e| LinkError::Url {
                url: target.to_string(),
                source: e,
            })?;
            let Some(cursor) = Cursor::from_url(&url)? else {
                tracing::trace!(%url, rel, "ignoring bounds-free pagination link");
                continue;
            };
            match rel {
                "next" => links.next = Some(cursor),
                "prev" => links.prev = Some(cursor),
                _ => {}
            }
        }
    }
    Ok(links)
}

/// `Link` header parse failures
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum LinkError {
    /// The target of a link is not a valid absolute URL
    #[error("invalid link URL {url:?}: {source}")]
    #[diagnostic(code(tootkit::link::url))]
    Url {
        /// Offending URL text
        url: String,
        /// Parse failure
        source: url::ParseError,
    },
    /// The `limit` query parameter is not a non-negative integer
    #[error("invalid limit {value:?} in link: {source}")]
    #[diagnostic(code(tootkit::link::limit))]
    Limit {
        /// Offending value
        value: String,
        /// Parse failure
        source: std::num::ParseIntError,
    },
    /// The header value contains non-visible-ASCII bytes
    #[error("link header is not valid visible ASCII")]
    #[diagnostic(code(tootkit::link::encoding))]
    Encoding,
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    #[test]
    fn next_link_with_max_and_limit() {
        let links =
            parse_link_values([r#"<https://x/?max_id=50&limit=20>; rel="next""#]).unwrap();
        assert_eq!(
            links.next,
            Some(Cursor::new().max_id("50").limit(20).build())
        );
        assert_eq!(links.prev, None);
    }

    #[test]
    fn mastodon_style_pair_in_one_value() {
        let value = "<https://example.social/api/v1/timelines/home?max_id=109>; rel=\"next\", \
                     <https://example.social/api/v1/timelines/home?min_id=130>; rel=\"prev\"";
        let links = parse_link_values([value]).unwrap();
        assert_eq!(links.next.unwrap().max_id.unwrap().as_str(), "109");
        assert_eq!(links.prev.unwrap().min_id.unwrap().as_str(), "130");
    }

    #[test]
    fn since_id_prev_link() {
        let links =
            parse_link_values([r#"<https://x/api/v1/favourites?since_id=7>; rel="prev""#])
                .unwrap();
        assert_eq!(links.prev, Some(Cursor::new().since_id("7").build()));
    }

    #[test]
    fn bounds_free_links_are_skipped() {
        let links = parse_link_values([r#"<https://x/?limit=40>; rel="next""#]).unwrap();
        assert!(links.is_empty());
    }

    #[test]
    fn other_relations_are_ignored() {
        let links = parse_link_values([r#"<https://x/?max_id=3>; rel="last""#]).unwrap();
        assert!(links.is_empty());
    }

    #[test]
    fn malformed_url_is_an_error() {
        let err = parse_link_values([r#"<not a url>; rel="next""#]).unwrap_err();
        assert!(matches!(err, LinkError::Url { .. }));
    }

    #[test]
    fn non_numeric_limit_is_an_error() {
        let err = parse_link_values([r#"<https://x/?max_id=3&limit=ten>; rel="next""#])
            .unwrap_err();
        assert!(matches!(err, LinkError::Limit { .. }));
    }

    #[test]
    fn missing_header_yields_empty_links() {
        let links = PageLinks::from_headers(&HeaderMap::new()).unwrap();
        assert_eq!(links, PageLinks::default());
    }

    #[test]
    fn repeated_link_headers() {
        let mut headers = HeaderMap::new();
        headers.append(LINK, HeaderValue::from_static(r#"<https://x/?max_id=1>; rel="next""#));
        headers.append(LINK, HeaderValue::from_static(r#"<https://x/?min_id=9>; rel="prev""#));
        let links = PageLinks::from_headers(&headers).unwrap();
        assert!(links.next.is_some());
        assert!(links.prev.is_some());
    }

    #[test]
    fn unbounded_cursor_omits_bounds() {
        let cursor = Cursor::new().limit(20).build();
        assert!(!cursor.is_bounded());
        assert_eq!(cursor.query_pairs(), vec![("limit", "20".to_string())]);

        let empty = Cursor::new().since_id("").max_id("").limit(0).build();
        assert!(empty.query_pairs().is_empty());
    }

    #[test]
    fn bounded_cursor_serializes_every_set_field() {
        let cursor = Cursor::new().since_id("5").max_id("90").limit(10).build();
        assert_eq!(
            cursor.query_pairs(),
            vec![
                ("limit", "10".to_string()),
                ("since_id", "5".to_string()),
                ("max_id", "90".to_string()),
            ]
        );
    }
}
