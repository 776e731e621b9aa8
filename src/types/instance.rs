//! Instances: one concrete occurrence of an action over a topology

use super::action::ActionId;
use super::topology::TopologyId;
use super::value::{DataType, TypedValue, ValueError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One column of instance data as stored remotely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireElement", into = "WireElement")]
pub struct InstanceElement {
    pub value: TypedValue,
    pub descriptive_actions: Vec<ActionId>,
}

impl InstanceElement {
    pub fn new(value: TypedValue) -> Self {
        Self {
            value,
            descriptive_actions: Vec::new(),
        }
    }

    pub fn void() -> Self {
        Self::new(TypedValue::Void)
    }
}

impl From<TypedValue> for InstanceElement {
    fn from(value: TypedValue) -> Self {
        Self::new(value)
    }
}

#[derive(Serialize, Deserialize)]
struct WireElement {
    value: Value,
    datatype: DataType,
    #[serde(default)]
    descriptive_actions: Vec<ActionId>,
}

impl From<InstanceElement> for WireElement {
    fn from(element: InstanceElement) -> Self {
        Self {
            value: element.value.to_wire(),
            datatype: element.value.data_type(),
            descriptive_actions: element.descriptive_actions,
        }
    }
}

impl TryFrom<WireElement> for InstanceElement {
    type Error = ValueError;

    fn try_from(wire: WireElement) -> Result<Self, Self::Error> {
        Ok(Self {
            value: TypedValue::from_wire(wire.datatype, &wire.value)?,
            descriptive_actions: wire.descriptive_actions,
        })
    }
}

/// A recorded occurrence: action, topology and ordered data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    pub action_id: ActionId,
    pub topology_id: TopologyId,
    pub data: Vec<InstanceElement>,
}

impl Instance {
    pub fn new(action_id: ActionId, topology_id: TopologyId, data: Vec<InstanceElement>) -> Self {
        Self {
            id: None,
            status: None,
            action_id,
            topology_id,
            data,
        }
    }
}
