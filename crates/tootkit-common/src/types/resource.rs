//! Thin typed views of the resources the core moves around.
//!
//! Only the fields the core and the printers branch on are modelled; everything else the
//! server sends is preserved in `extra` so nothing is lost on the way to the output layer.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use smol_str::SmolStr;

use super::id::EntityId;

/// An account (user profile)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    /// Account identifier
    pub id: EntityId,
    /// `user` for local accounts, `user@domain` for remote ones
    pub acct: SmolStr,
    /// Local part of the handle
    #[serde(default)]
    pub username: SmolStr,
    /// Display name, possibly empty
    #[serde(default)]
    pub display_name: String,
    /// Remaining fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A status (post)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    /// Status identifier
    pub id: EntityId,
    /// Author
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<Account>,
    /// HTML content
    #[serde(default)]
    pub content: String,
    /// Creation timestamp as sent by the server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<SmolStr>,
    /// Boosted status, if this is a reblog
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reblog: Option<Box<Status>>,
    /// Remaining fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Notification identifier
    pub id: EntityId,
    /// `mention`, `reblog`, `favourite`, `follow`, ...
    #[serde(rename = "type")]
    pub kind: SmolStr,
    /// Account that triggered the notification
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<Account>,
    /// Status the notification is about, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<Status>,
    /// Remaining fields
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Closed set of resource kinds handed to output layers.
///
/// Printers match on this instead of inspecting types at runtime; anything the core does
/// not model travels as [`Resource::Unknown`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Resource {
    /// A status
    Status(Status),
    /// A notification
    Notification(Notification),
    /// An account
    Account(Account),
    /// Anything else
    Unknown(Value),
}

impl Resource {
    /// Identifier of the resource, when it has one.
    pub fn id(&self) -> Option<&EntityId> {
        match self {
            Resource::Status(s) => Some(&s.id),
            Resource::Notification(n) => Some(&n.id),
            Resource::Account(a) => Some(&a.id),
            Resource::Unknown(_) => None,
        }
    }

    /// Short name of the kind, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Resource::Status(_) => "status",
            Resource::Notification(_) => "notification",
            Resource::Account(_) => "account",
            Resource::Unknown(_) => "unknown",
        }
    }
}

impl From<Status> for Resource {
    fn from(value: Status) -> Self {
        Resource::Status(value)
    }
}

impl From<Notification> for Resource {
    fn from(value: Notification) -> Self {
        Resource::Notification(value)
    }
}

impl From<Account> for Resource {
    fn from(value: Account) -> Self {
        Resource::Account(value)
    }
}

impl From<Value> for Resource {
    fn from(value: Value) -> Self {
        Resource::Unknown(value)
    }
}
