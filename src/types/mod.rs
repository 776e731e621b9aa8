//! Entity value types exchanged with the remote store

mod action;
mod component;
mod instance;
mod topology;
mod value;

pub use action::{Action, ActionId};
pub use component::{ComponentError, ComponentTag};
pub use instance::{Instance, InstanceElement};
pub use topology::{Topology, TopologyId};
pub use value::{DataType, TypedValue, ValueError};
