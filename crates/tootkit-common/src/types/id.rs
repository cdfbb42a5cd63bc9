use serde::{Deserialize, Deserializer, Serialize, de};
use smol_str::SmolStr;
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

/// A server-assigned entity identifier.
///
/// Identifiers are opaque tokens. Servers only promise that they compare consistently on
/// their side, so this type deliberately offers no arithmetic and no numeric ordering.
/// Older servers send integers; both forms deserialize into the same token.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct EntityId(SmolStr);

impl EntityId {
    /// Wrap any string as an identifier.
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(SmolStr::new(id.as_ref().trim()))
    }

    /// Identifier from a compile-time string.
    pub const fn new_static(id: &'static str) -> Self {
        Self(SmolStr::new_static(id))
    }

    /// Get as string slice
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// An empty identifier means "unset" everywhere it is accepted.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `None` for an empty identifier.
    pub fn non_empty(self) -> Option<Self> {
        if self.is_empty() { None } else { Some(self) }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Deref for EntityId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}

impl AsRef<str> for EntityId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl From<&str> for EntityId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for EntityId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<SmolStr> for EntityId {
    fn from(value: SmolStr) -> Self {
        Self::new(value)
    }
}

impl From<u64> for EntityId {
    fn from(value: u64) -> Self {
        Self(SmolStr::new(value.to_string()))
    }
}

impl FromStr for EntityId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl<'de> Deserialize<'de> for EntityId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct IdVisitor;

        impl de::Visitor<'_> for IdVisitor {
            type Value = EntityId;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("an identifier string or integer")
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
                Ok(EntityId::new(v))
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                Ok(EntityId::from(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                u64::try_from(v)
                    .map(EntityId::from)
                    .map_err(|_| E::invalid_value(de::Unexpected::Signed(v), &self))
            }
        }

        deserializer.deserialize_any(IdVisitor)
    }
}
