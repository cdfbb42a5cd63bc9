//! Feed names, their validation and their stream and timeline forms.

use std::fmt;
use std::str::FromStr;

use smol_str::{SmolStr, format_smolstr};

use crate::api::{Endpoint, Params};
use crate::types::EntityId;

/// A server-side feed that can be paged as a timeline or followed as a stream.
///
/// Values are validated on construction, so an unknown name or an empty identifier never
/// reaches the network.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Feed {
    /// The authenticated user's home feed and notifications
    User,
    /// The federated public feed
    Public,
    /// The instance-local public feed
    Local,
    /// Direct messages
    Direct,
    /// Posts carrying a hashtag
    Hashtag {
        /// Tag without the leading `#`
        tag: SmolStr,
        /// Restrict to local posts
        local: bool,
    },
    /// A user-defined list
    List(EntityId),
}

impl Feed {
    /// Parse a command-line feed argument.
    ///
    /// Accepted forms: `user` (or `home`, or empty), `public`, `local`, `direct`, `:tag` or
    /// `#tag` for hashtags, `!id` for lists.
    pub fn parse(arg: &str) -> Result<Self, FeedError> {
        let arg = arg.trim();
        match arg {
            "" | "user" | "home" => Ok(Feed::User),
            "public" => Ok(Feed::Public),
            "local" | "public:local" => Ok(Feed::Local),
            "direct" => Ok(Feed::Direct),
            _ => {
                if let Some(tag) = arg.strip_prefix(':').or_else(|| arg.strip_prefix('#')) {
                    Feed::hashtag(tag)
                } else if let Some(id) = arg.strip_prefix('!') {
                    Feed::list(id)
                } else {
                    Err(FeedError::Unknown(arg.into()))
                }
            }
        }
    }

    /// A hashtag feed. The tag must be non-empty and may not contain whitespace or `/`.
    pub fn hashtag(tag: &str) -> Result<Self, FeedError> {
        let tag = tag.trim();
        let tag = tag.strip_prefix('#').unwrap_or(tag);
        if tag.is_empty() {
            return Err(FeedError::EmptyHashtag);
        }
        if tag.chars().any(|c| c.is_whitespace() || c == '/' || c == '#') {
            return Err(FeedError::InvalidHashtag(tag.into()));
        }
        Ok(Feed::Hashtag {
            tag: tag.into(),
            local: false,
        })
    }

    /// A list feed. List identifiers are alphanumeric.
    pub fn list(id: &str) -> Result<Self, FeedError> {
        let id = id.trim();
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(FeedError::InvalidListId(id.into()));
        }
        Ok(Feed::List(EntityId::new(id)))
    }

    /// Restrict the feed to local posts where the server supports it.
    ///
    /// `public` becomes `local`; hashtag feeds gain the local flag. Other feeds are
    /// returned unchanged.
    pub fn with_local(self, local: bool) -> Self {
        match self {
            Feed::Public if local => Feed::Local,
            Feed::Hashtag { tag, .. } => Feed::Hashtag { tag, local },
            other => other,
        }
    }

    /// Name of the server-side stream.
    pub fn stream_name(&self) -> &'static str {
        match self {
            Feed::User => "user",
            Feed::Public => "public",
            Feed::Local => "public:local",
            Feed::Direct => "direct",
            Feed::Hashtag { local: false, .. } => "hashtag",
            Feed::Hashtag { local: true, .. } => "hashtag:local",
            Feed::List(_) => "list",
        }
    }

    /// Query parameters selecting this feed on the streaming endpoint.
    pub fn stream_params(&self) -> Vec<(&'static str, SmolStr)> {
        let mut params = vec![("stream", SmolStr::new_static(self.stream_name()))];
        match self {
            Feed::Hashtag { tag, .. } => params.push(("tag", tag.clone())),
            Feed::List(id) => params.push(("list", SmolStr::new(id.as_str()))),
            _ => {}
        }
        params
    }

    /// REST endpoint and fixed parameters serving this feed as a paged timeline.
    pub fn timeline(&self) -> (Endpoint, Params) {
        match self {
            Feed::User => (Endpoint::new("v1/timelines/home"), Params::new()),
            Feed::Public => (Endpoint::new("v1/timelines/public"), Params::new()),
            Feed::Local => (
                Endpoint::new("v1/timelines/public"),
                Params::new().flag("local", true),
            ),
            Feed::Direct => (Endpoint::new("v1/timelines/direct"), Params::new()),
            Feed::Hashtag { tag, local } => (
                Endpoint::from_segments(["v1", "timelines", "tag", tag.as_str()]),
                Params::new().flag("local", *local),
            ),
            Feed::List(id) => (
                Endpoint::from_segments(["v1", "timelines", "list", id.as_str()]),
                Params::new(),
            ),
        }
    }

    /// Short human-readable label, in the same syntax [`Feed::parse`] accepts.
    pub fn label(&self) -> SmolStr {
        match self {
            Feed::User => SmolStr::new_static("user"),
            Feed::Public => SmolStr::new_static("public"),
            Feed::Local => SmolStr::new_static("local"),
            Feed::Direct => SmolStr::new_static("direct"),
            Feed::Hashtag { tag, .. } => format_smolstr!("#{tag}"),
            Feed::List(id) => format_smolstr!("!{id}"),
        }
    }
}

impl fmt::Display for Feed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl FromStr for Feed {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Feed::parse(s)
    }
}

/// Feed construction failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, miette::Diagnostic)]
pub enum FeedError {
    /// Not one of the known feed names or prefixes
    #[error("unknown feed {0:?}")]
    #[diagnostic(
        code(tootkit::feed::unknown),
        help("use user, public, local, direct, :tag or !list")
    )]
    Unknown(SmolStr),
    /// `:` or `#` with nothing after it
    #[error("empty hashtag")]
    #[diagnostic(code(tootkit::feed::empty_hashtag))]
    EmptyHashtag,
    /// Hashtag containing characters a tag cannot hold
    #[error("invalid hashtag {0:?}")]
    #[diagnostic(code(tootkit::feed::hashtag))]
    InvalidHashtag(SmolStr),
    /// Empty or non-alphanumeric list identifier
    #[error("invalid list id {0:?}")]
    #[diagnostic(code(tootkit::feed::list_id))]
    InvalidListId(SmolStr),
}
