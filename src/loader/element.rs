//! Extraction elements
//!
//! An element pulls one field out of a record (or out of the current
//! loop-variable combination) and turns it into typed triples. Elements never
//! touch the shared triple-set directly: `extract` hands back the complete
//! contribution or a failure, and the caller appends.

use super::transform::{apply_all, Combinator, Transform};
use super::variable::Combination;
use crate::source::{Record, Selector, SourceError};
use crate::types::{ComponentTag, DataType, TypedValue, ValueError};
use std::fmt;

/// Values a path element treats as "not present" unless told otherwise.
pub const DEFAULT_NA_VALUES: [&str; 3] = ["", "n/a", "N/A"];

/// One extracted field: which role it fills, its value and its label.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionTriple {
    pub component: ComponentTag,
    pub value: TypedValue,
    pub label: String,
}

impl ExtractionTriple {
    pub fn new(component: ComponentTag, value: TypedValue, label: impl Into<String>) -> Self {
        Self {
            component,
            value,
            label: label.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Why an element could not contribute to the current record.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ExtractFailure {
    /// Required field absent, with no default and voids not allowed.
    Missing { label: String },
    /// Raw text did not coerce to the element's type.
    Coercion { label: String, error: ValueError },
    /// A combination element produced nothing and is not required.
    EmptyCombination { label: String },
}

impl fmt::Display for ExtractFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing { label } => write!(f, "required field '{}' is missing", label),
            Self::Coercion { label, error } => write!(f, "field '{}': {}", label, error),
            Self::EmptyCombination { label } => write!(f, "combined field '{}' is empty", label),
        }
    }
}

/// Result of running one element against one record.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Extraction {
    /// Zero or more triples to append (zero for an absent optional field).
    Contributed(Vec<ExtractionTriple>),
    Failed(ExtractFailure),
}

/// Conditions that abort the whole mapping rather than the record.
#[derive(Debug)]
pub(crate) enum ElementError {
    Unbound {
        label: String,
        loop_index: usize,
        variable_index: usize,
    },
    Source(SourceError),
}

// ---------------------------------------------------------------------------
// Variants
// ---------------------------------------------------------------------------

/// A constant triple emitted for every record.
#[derive(Debug, Clone, PartialEq)]
pub struct FixedElement {
    pub component: ComponentTag,
    pub value: TypedValue,
    pub label: String,
}

impl FixedElement {
    pub fn new(component: ComponentTag, value: TypedValue, label: impl Into<String>) -> Self {
        Self {
            component,
            value,
            label: label.into(),
        }
    }

    /// Coerce `raw` once, up front.
    pub fn parse(
        component: ComponentTag,
        data_type: DataType,
        raw: &str,
        label: impl Into<String>,
    ) -> Result<Self, ValueError> {
        Ok(Self::new(component, TypedValue::coerce(data_type, raw)?, label))
    }
}

/// Reads one sub-value of the current loop-variable combination.
#[derive(Debug, Clone)]
pub struct VariableElement {
    pub component: ComponentTag,
    pub data_type: DataType,
    pub label: String,
    pub loop_index: usize,
    pub variable_index: usize,
    pub transforms: Vec<Transform>,
}

impl VariableElement {
    pub fn new(
        component: ComponentTag,
        data_type: DataType,
        label: impl Into<String>,
        loop_index: usize,
        variable_index: usize,
    ) -> Self {
        Self {
            component,
            data_type,
            label: label.into(),
            loop_index,
            variable_index,
            transforms: Vec::new(),
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transforms.push(transform);
        self
    }
}

/// Resolves a selector against the current record.
#[derive(Debug, Clone)]
pub struct PathElement {
    pub selector: Selector,
    pub component: ComponentTag,
    pub data_type: DataType,
    pub label: String,
    pub required: bool,
    pub default: Option<TypedValue>,
    pub allow_void: bool,
    pub transforms: Vec<Transform>,
    pub na_values: Vec<String>,
}

impl PathElement {
    /// A required field with no default; a missing value becomes a void triple.
    pub fn new(
        selector: impl Into<Selector>,
        component: ComponentTag,
        data_type: DataType,
        label: impl Into<String>,
    ) -> Self {
        Self {
            selector: selector.into(),
            component,
            data_type,
            label: label.into(),
            required: true,
            default: None,
            allow_void: true,
            transforms: Vec::new(),
            na_values: DEFAULT_NA_VALUES.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    pub fn with_default(mut self, default: TypedValue) -> Self {
        self.default = Some(default);
        self
    }

    /// With voids disallowed, a required field that is missing fails the element.
    pub fn with_allow_void(mut self, allow_void: bool) -> Self {
        self.allow_void = allow_void;
        self
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transforms.push(transform);
        self
    }

    pub fn with_na_values(mut self, values: Vec<String>) -> Self {
        self.na_values = values;
        self
    }

    fn extract(&self, record: &impl Record) -> Result<Extraction, ElementError> {
        let matches: Vec<String> = record
            .lookup(&self.selector)
            .map_err(ElementError::Source)?
            .into_iter()
            .filter(|v| !self.na_values.iter().any(|na| na == v))
            .collect();

        if matches.is_empty() {
            return Ok(self.absent());
        }

        let mut triples = Vec::with_capacity(matches.len());
        for raw in &matches {
            let text = apply_all(&self.transforms, raw);
            match TypedValue::coerce(self.data_type, &text) {
                Ok(value) => triples.push(ExtractionTriple::new(self.component, value, &self.label)),
                Err(error) => {
                    return Ok(Extraction::Failed(ExtractFailure::Coercion {
                        label: self.label.clone(),
                        error,
                    }))
                }
            }
        }
        Ok(Extraction::Contributed(triples))
    }

    fn absent(&self) -> Extraction {
        if !self.required {
            return Extraction::Contributed(Vec::new());
        }
        if let Some(default) = &self.default {
            return Extraction::Contributed(vec![ExtractionTriple::new(
                self.component,
                default.clone(),
                &self.label,
            )]);
        }
        if self.allow_void {
            return Extraction::Contributed(vec![ExtractionTriple::new(
                self.component,
                TypedValue::Void,
                &self.label,
            )]);
        }
        Extraction::Failed(ExtractFailure::Missing {
            label: self.label.clone(),
        })
    }
}

/// Joins the first match of several selectors into one string triple.
#[derive(Debug, Clone)]
pub struct CombinationElement {
    pub selectors: Vec<Selector>,
    pub component: ComponentTag,
    pub label: String,
    pub combinator: Option<Combinator>,
    pub required: bool,
}

impl CombinationElement {
    pub fn new(selectors: Vec<Selector>, component: ComponentTag, label: impl Into<String>) -> Self {
        Self {
            selectors,
            component,
            label: label.into(),
            combinator: None,
            required: true,
        }
    }

    pub fn with_combinator(mut self, combinator: Combinator) -> Self {
        self.combinator = Some(combinator);
        self
    }

    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    fn extract(&self, record: &impl Record) -> Result<Extraction, ElementError> {
        let mut parts = Vec::with_capacity(self.selectors.len());
        for selector in &self.selectors {
            let first = record
                .lookup(selector)
                .map_err(ElementError::Source)?
                .into_iter()
                .next()
                .unwrap_or_default();
            parts.push(first);
        }

        let combined = match &self.combinator {
            Some(c) => c.combine(&parts),
            None => Combinator::default().combine(&parts),
        };

        if !combined.is_empty() {
            return Ok(Extraction::Contributed(vec![ExtractionTriple::new(
                self.component,
                TypedValue::String(combined),
                &self.label,
            )]));
        }
        if self.required {
            Ok(Extraction::Contributed(vec![ExtractionTriple::new(
                self.component,
                TypedValue::Void,
                &self.label,
            )]))
        } else {
            Ok(Extraction::Failed(ExtractFailure::EmptyCombination {
                label: self.label.clone(),
            }))
        }
    }
}

// ---------------------------------------------------------------------------
// Element
// ---------------------------------------------------------------------------

/// The closed set of element kinds a mapping can hold.
#[derive(Debug, Clone)]
pub enum ExtractionElement {
    Fixed(FixedElement),
    Variable(VariableElement),
    Path(PathElement),
    Combination(CombinationElement),
}

impl ExtractionElement {
    pub fn component(&self) -> ComponentTag {
        match self {
            Self::Fixed(e) => e.component,
            Self::Variable(e) => e.component,
            Self::Path(e) => e.component,
            Self::Combination(e) => e.component,
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::Fixed(e) => &e.label,
            Self::Variable(e) => &e.label,
            Self::Path(e) => &e.label,
            Self::Combination(e) => &e.label,
        }
    }

    /// Run the element against `record` under the given combination.
    pub(crate) fn extract<R: Record>(
        &self,
        record: &R,
        combination: &Combination,
    ) -> Result<Extraction, ElementError> {
        match self {
            Self::Fixed(e) => Ok(Extraction::Contributed(vec![ExtractionTriple::new(
                e.component,
                e.value.clone(),
                &e.label,
            )])),
            Self::Variable(e) => {
                let raw = combination
                    .get(e.loop_index, e.variable_index)
                    .ok_or_else(|| ElementError::Unbound {
                        label: e.label.clone(),
                        loop_index: e.loop_index,
                        variable_index: e.variable_index,
                    })?;
                let text = apply_all(&e.transforms, raw);
                Ok(match TypedValue::coerce(e.data_type, &text) {
                    Ok(value) => {
                        Extraction::Contributed(vec![ExtractionTriple::new(e.component, value, &e.label)])
                    }
                    Err(error) => Extraction::Failed(ExtractFailure::Coercion {
                        label: e.label.clone(),
                        error,
                    }),
                })
            }
            Self::Path(e) => e.extract(record),
            Self::Combination(e) => e.extract(record),
        }
    }
}

impl From<FixedElement> for ExtractionElement {
    fn from(e: FixedElement) -> Self {
        Self::Fixed(e)
    }
}

impl From<VariableElement> for ExtractionElement {
    fn from(e: VariableElement) -> Self {
        Self::Variable(e)
    }
}

impl From<PathElement> for ExtractionElement {
    fn from(e: PathElement) -> Self {
        Self::Path(e)
    }
}

impl From<CombinationElement> for ExtractionElement {
    fn from(e: CombinationElement) -> Self {
        Self::Combination(e)
    }
}
