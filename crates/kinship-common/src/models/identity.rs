//! Identity references supplied by the world/session provider.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// An opaque per-person identifier plus the display name it was last seen with.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    pub id: Uuid,
    pub name: String,
}

impl Identity {
    pub fn new(id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

/// How a command refers to another player: by UUID or by display name.
///
/// Deserialized untagged, so a string that parses as a UUID becomes `Id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlayerRef {
    Id(Uuid),
    Name(String),
}

impl From<Uuid> for PlayerRef {
    fn from(id: Uuid) -> Self {
        Self::Id(id)
    }
}

impl From<&str> for PlayerRef {
    fn from(name: &str) -> Self {
        match Uuid::parse_str(name) {
            Ok(id) => Self::Id(id),
            Err(_) => Self::Name(name.to_string()),
        }
    }
}

impl fmt::Display for PlayerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

/// How a command refers to a group: by id or by (case-insensitive) name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum GroupRef {
    Id(Uuid),
    Name(String),
}

impl From<Uuid> for GroupRef {
    fn from(id: Uuid) -> Self {
        Self::Id(id)
    }
}

impl From<&str> for GroupRef {
    fn from(name: &str) -> Self {
        match Uuid::parse_str(name) {
            Ok(id) => Self::Id(id),
            Err(_) => Self::Name(name.to_string()),
        }
    }
}

impl fmt::Display for GroupRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}
