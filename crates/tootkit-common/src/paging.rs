//! Cursor-driven pagination.
//!
//! [`fetch_pages`] drives repeated single-page requests against a [`PageSource`], following
//! the `next` cursor the server hands back until the [`FetchPolicy`] is satisfied or the
//! server runs out of pages. Pages are causally dependent through that cursor, so the loop
//! is strictly sequential.
//!
//! Failure is asymmetric on purpose: an error on the first page returns nothing, while an
//! error on a later page returns everything fetched so far inside [`PagingError`]. Callers
//! asking for "as many as possible" can print the partial result and still report the
//! failure.

use std::fmt;
use std::future::Future;

use crate::cursor::{Cursor, PageLinks};
use crate::error::{ClientError, ClientResult};

/// One page of results and the cursors the server attached to it
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// Items in server order
    pub items: Vec<T>,
    /// Cursors parsed from the response
    pub links: PageLinks,
}

/// Anything that can fetch one page for a cursor.
#[cfg_attr(not(target_arch = "wasm32"), trait_variant::make(Send))]
pub trait PageSource<T> {
    /// Fetch the page at `cursor`.
    fn fetch_page(&self, cursor: &Cursor) -> impl Future<Output = ClientResult<Page<T>>>;
}

/// How many requests the paging loop may issue.
///
/// `fetch_all` and `quota` are independent knobs: `fetch_all` keeps requesting until the
/// server stops sending a `next` cursor, regardless of `quota`. Trimming the result to an
/// exact count is done afterwards with [`keep`].
#[derive(Debug, Clone, Default, PartialEq, Eq, bon::Builder)]
#[builder(start_fn = new)]
pub struct FetchPolicy {
    /// Keep fetching until at least this many items are accumulated
    pub quota: Option<usize>,
    /// Fetch every page the server offers
    #[builder(default)]
    pub fetch_all: bool,
    /// Bounds and page size of the first request
    #[builder(default)]
    pub start: Cursor,
}

impl FetchPolicy {
    /// Exhaustive pagination.
    pub fn all() -> Self {
        Self {
            fetch_all: true,
            ..Self::default()
        }
    }

    /// Ask for `limit` items per page and keep going until `limit` items are in hand.
    pub fn limited(limit: u32) -> Self {
        Self {
            quota: Some(limit as usize),
            fetch_all: false,
            start: Cursor {
                limit: Some(limit),
                ..Cursor::default()
            },
        }
    }

    /// Whether another request is wanted with `have` items accumulated.
    pub fn wants_more(&self, have: usize) -> bool {
        self.fetch_all || self.quota.is_some_and(|quota| have < quota)
    }
}

/// Drive `source` according to `policy` and concatenate the pages in arrival order.
pub async fn fetch_pages<T, S>(source: &S, policy: &FetchPolicy) -> Result<Vec<T>, PagingError<T>>
where
    S: PageSource<T>,
{
    let first = match source.fetch_page(&policy.start).await {
        Ok(page) => page,
        Err(error) => {
            tracing::warn!(%error, "first page failed");
            return Err(PagingError::new(Vec::new(), 0, error));
        }
    };

    let mut pages = 1usize;
    let mut items = first.items;
    let mut next = first.links.next;
    tracing::debug!(page = pages, total = items.len(), more = next.is_some(), "fetched page");

    while policy.wants_more(items.len()) {
        let Some(cursor) = next.take() else {
            break;
        };
        match source.fetch_page(&cursor).await {
            Ok(page) => {
                pages += 1;
                items.extend(page.items);
                next = page.links.next;
                tracing::debug!(
                    page = pages,
                    total = items.len(),
                    more = next.is_some(),
                    "fetched page"
                );
            }
            Err(error) => {
                tracing::warn!(%error, pages, kept = items.len(), "pagination stopped early");
                return Err(PagingError::new(items, pages, error));
            }
        }
    }

    Ok(items)
}

/// Truncate `items` to at most `keep` entries.
pub fn keep<T>(items: &mut Vec<T>, keep: Option<usize>) {
    if let Some(keep) = keep {
        items.truncate(keep);
    }
}

/// A paging failure, with whatever was fetched before it.
pub struct PagingError<T> {
    partial: Vec<T>,
    pages: usize,
    source: ClientError,
}

impl<T> PagingError<T> {
    /// Build a paging error after `pages` successful pages.
    pub fn new(partial: Vec<T>, pages: usize, source: ClientError) -> Self {
        Self {
            partial,
            pages,
            source,
        }
    }

    /// Items fetched before the failure. Empty when the first page failed.
    pub fn partial(&self) -> &[T] {
        &self.partial
    }

    /// Number of pages that succeeded.
    pub fn pages(&self) -> usize {
        self.pages
    }

    /// Whether at least one page succeeded before the failure.
    pub fn is_partial(&self) -> bool {
        self.pages > 0
    }

    /// The error that ended pagination.
    pub fn error(&self) -> &ClientError {
        &self.source
    }

    /// Split into the partial result and the error.
    pub fn into_parts(self) -> (Vec<T>, ClientError) {
        (self.partial, self.source)
    }

    /// Map the items, keeping the failure.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PagingError<U> {
        PagingError {
            partial: self.partial.into_iter().map(f).collect(),
            pages: self.pages,
            source: self.source,
        }
    }
}

impl<T> From<ClientError> for PagingError<T> {
    fn from(source: ClientError) -> Self {
        Self::new(Vec::new(), 0, source)
    }
}

impl<T> fmt::Debug for PagingError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PagingError")
            .field("partial_len", &self.partial.len())
            .field("pages", &self.pages)
            .field("source", &self.source)
            .finish()
    }
}

impl<T> fmt::Display for PagingError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.pages == 0 {
            write!(f, "first page failed: {}", self.source)
        } else {
            write!(
                f,
                "page {} failed after {} item(s): {}",
                self.pages + 1,
                self.partial.len(),
                self.source
            )
        }
    }
}

impl<T> std::error::Error for PagingError<T> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

impl<T> miette::Diagnostic for PagingError<T> {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        Some(Box::new("tootkit::paging"))
    }

    fn diagnostic_source(&self) -> Option<&dyn miette::Diagnostic> {
        Some(&self.source)
    }
}
