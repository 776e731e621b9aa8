//! Topologies: the ordered component shape of a kind of instance

use super::action::ActionId;
use super::component::ComponentTag;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Store-assigned identity of a topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopologyId(pub u64);

impl fmt::Display for TopologyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An ordered set of component roles, with one label per role.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Topology {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<TopologyId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub components: Vec<ComponentTag>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constraining_actions: Option<Vec<ActionId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applying_actions: Option<Vec<ActionId>>,
}

impl Topology {
    pub fn new(components: Vec<ComponentTag>, labels: Vec<String>) -> Self {
        Self {
            components,
            labels,
            ..Default::default()
        }
    }

    /// Body posted when linking to an action: everything but the components.
    pub fn link_payload(&self) -> Topology {
        Topology {
            components: Vec::new(),
            ..self.clone()
        }
    }
}
