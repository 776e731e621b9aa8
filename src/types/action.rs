//! Actions: the named event types instances are recorded against

use serde::{Deserialize, Serialize};
use std::fmt;

/// Store-assigned identity of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(pub u64);

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A named operation or event type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ActionId>,
    pub name: String,
    #[serde(rename = "actiontype")]
    pub action_type: String,
}

impl Action {
    pub fn new(name: impl Into<String>, action_type: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
            action_type: action_type.into(),
        }
    }

    pub fn with_id(mut self, id: ActionId) -> Self {
        self.id = Some(id);
        self
    }
}
