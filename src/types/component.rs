//! Component roles a value can play inside a topology

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The role of one column of instance data.
///
/// Ordering follows declaration order, which is also the order the
/// remote store enumerates them in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ComponentTag {
    Who,
    What,
    Where,
    When,
}

impl ComponentTag {
    pub const ALL: [ComponentTag; 4] = [Self::Who, Self::What, Self::Where, Self::When];

    /// Canonical wire name (`Who`, `What`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Who => "Who",
            Self::What => "What",
            Self::Where => "Where",
            Self::When => "When",
        }
    }
}

/// Unknown component name.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid component type: {0}")]
pub struct ComponentError(pub String);

impl fmt::Display for ComponentTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComponentTag {
    type Err = ComponentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|tag| tag.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ComponentError(s.to_string()))
    }
}

impl TryFrom<String> for ComponentTag {
    type Error = ComponentError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ComponentTag> for String {
    fn from(tag: ComponentTag) -> Self {
        tag.as_str().to_string()
    }
}
