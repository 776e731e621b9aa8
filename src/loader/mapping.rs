//! Mapping: how one action's instances are read out of a source

use super::element::ExtractionElement;
use super::error::{LoaderError, LoaderResult};
use super::variable::{Combination, LoopVariable, TemplateError};
use crate::types::Action;

pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Rules for turning the records under `root` into instances of `action`.
#[derive(Debug, Clone)]
pub struct Mapping {
    pub name: String,
    pub action: Action,
    /// Root locator, possibly templated with `{v}` / `{v.s}` placeholders.
    pub root: String,
    pub loop_variables: Vec<LoopVariable>,
    pub elements: Vec<ExtractionElement>,
    /// Tried only when `elements` fails for a record.
    pub fallback: Vec<ExtractionElement>,
    pub batch_size: usize,
}

impl Mapping {
    /// The mapping takes its name from the action.
    pub fn new(action: Action, root: impl Into<String>) -> Self {
        Self {
            name: action.name.clone(),
            action,
            root: root.into(),
            loop_variables: Vec::new(),
            elements: Vec::new(),
            fallback: Vec::new(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_loop_variable(mut self, variable: LoopVariable) -> Self {
        self.loop_variables.push(variable);
        self
    }

    pub fn with_element(mut self, element: impl Into<ExtractionElement>) -> Self {
        self.elements.push(element.into());
        self
    }

    pub fn with_fallback(mut self, element: impl Into<ExtractionElement>) -> Self {
        self.fallback.push(element.into());
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Static checks, run before anything touches the store.
    pub fn validate(&self) -> LoaderResult<()> {
        if self.batch_size == 0 {
            return Err(LoaderError::Config(format!(
                "mapping '{}': batch_size must be at least 1",
                self.name
            )));
        }
        if self.elements.is_empty() {
            return Err(LoaderError::Config(format!(
                "mapping '{}': no extraction elements",
                self.name
            )));
        }

        // A combination of the declared shape, used to check slot references.
        let shape = Combination::new(
            self.loop_variables
                .iter()
                .map(|v| vec![String::new(); v.sub_paths.len()])
                .collect(),
        );

        for element in self.elements.iter().chain(&self.fallback) {
            if let ExtractionElement::Variable(v) = element {
                if shape.get(v.loop_index, v.variable_index).is_none() {
                    return Err(LoaderError::UnboundVariable {
                        mapping: self.name.clone(),
                        reason: format!(
                            "element '{}' reads slot {}.{} which no loop variable provides",
                            v.label, v.loop_index, v.variable_index
                        ),
                    });
                }
            }
        }

        match shape.instantiate(&self.root) {
            Ok(_) => Ok(()),
            Err(TemplateError::Unbound(key)) => Err(LoaderError::UnboundVariable {
                mapping: self.name.clone(),
                reason: format!("root placeholder '{{{}}}' has no loop variable", key),
            }),
            Err(e) => Err(LoaderError::Config(format!("mapping '{}': {}", self.name, e))),
        }
    }
}
