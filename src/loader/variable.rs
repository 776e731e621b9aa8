//! Loop variables and the combination space they span
//!
//! A loop variable names a repeating scope (`path`) and the sub-values read
//! inside each occurrence of it (`sub_paths`). Every scope contributes the
//! Cartesian product of its sub-value lists; scopes are concatenated. The
//! run then walks the product of all variables, outermost slowest, and
//! instantiates the mapping's root template once per combination.

use crate::source::{Record, RecordSource, Selector, SourceError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One repeating scope and the sub-values read inside it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopVariable {
    pub path: String,
    pub sub_paths: Vec<Selector>,
}

impl LoopVariable {
    pub fn new(path: impl Into<String>, sub_paths: Vec<Selector>) -> Self {
        Self {
            path: path.into(),
            sub_paths,
        }
    }

    /// Every sub-value tuple this variable takes, in source order.
    pub fn bindings<S: RecordSource>(&self, source: &S) -> Result<Vec<Vec<String>>, SourceError> {
        let mut tuples = Vec::new();
        for scope in source.scopes(&self.path)? {
            let lists = self
                .sub_paths
                .iter()
                .map(|sub| scope.lookup(sub))
                .collect::<Result<Vec<_>, _>>()?;
            let sizes: Vec<usize> = lists.iter().map(Vec::len).collect();
            for indices in CartesianProduct::new(sizes) {
                tuples.push(
                    indices
                        .iter()
                        .zip(&lists)
                        .map(|(&i, list)| list[i].clone())
                        .collect(),
                );
            }
        }
        Ok(tuples)
    }
}

// ---------------------------------------------------------------------------
// Cartesian product
// ---------------------------------------------------------------------------

/// Odometer over index vectors `[i0, i1, ..]` with `ik < sizes[k]`.
///
/// The last position turns fastest. No dimensions yields one empty vector;
/// any empty dimension yields nothing.
#[derive(Debug, Clone)]
pub struct CartesianProduct {
    sizes: Vec<usize>,
    next: Option<Vec<usize>>,
}

impl CartesianProduct {
    pub fn new(sizes: Vec<usize>) -> Self {
        let mut product = Self { sizes, next: None };
        product.reset();
        product
    }

    /// Start over from the first index vector.
    pub fn reset(&mut self) {
        self.next = if self.sizes.iter().any(|&s| s == 0) {
            None
        } else {
            Some(vec![0; self.sizes.len()])
        };
    }

    /// Total number of index vectors.
    pub fn len(&self) -> usize {
        self.sizes.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Iterator for CartesianProduct {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Vec<usize>> {
        let current = self.next.take()?;

        let mut following = current.clone();
        let mut position = following.len();
        let advanced = loop {
            if position == 0 {
                break false;
            }
            position -= 1;
            following[position] += 1;
            if following[position] < self.sizes[position] {
                break true;
            }
            following[position] = 0;
        };
        if advanced {
            self.next = Some(following);
        }

        Some(current)
    }
}

// ---------------------------------------------------------------------------
// Combinations
// ---------------------------------------------------------------------------

/// One point of the combination space: a sub-value tuple per loop variable.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Combination {
    slots: Vec<Vec<String>>,
}

/// Root template problems.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TemplateError {
    #[error("unclosed placeholder in '{0}'")]
    Unclosed(String),

    #[error("unmatched '}}' in '{0}'")]
    UnmatchedClose(String),

    #[error("malformed placeholder '{{{0}}}'")]
    Malformed(String),

    #[error("placeholder '{{{0}}}' has no bound value")]
    Unbound(String),
}

impl Combination {
    pub fn new(slots: Vec<Vec<String>>) -> Self {
        Self { slots }
    }

    pub fn get(&self, loop_index: usize, variable_index: usize) -> Option<&str> {
        self.slots
            .get(loop_index)
            .and_then(|tuple| tuple.get(variable_index))
            .map(String::as_str)
    }

    pub fn slots(&self) -> &[Vec<String>] {
        &self.slots
    }

    /// Substitute `{v}` / `{v.s}` placeholders; `{{` and `}}` are literal braces.
    pub fn instantiate(&self, template: &str) -> Result<String, TemplateError> {
        let mut out = String::with_capacity(template.len());
        let mut chars = template.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    out.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    out.push('}');
                }
                '}' => return Err(TemplateError::UnmatchedClose(template.to_string())),
                '{' => {
                    let mut key = String::new();
                    let mut closed = false;
                    for k in chars.by_ref() {
                        if k == '}' {
                            closed = true;
                            break;
                        }
                        key.push(k);
                    }
                    if !closed {
                        return Err(TemplateError::Unclosed(template.to_string()));
                    }
                    let (v, s) = parse_placeholder(&key)?;
                    let value = self.get(v, s).ok_or(TemplateError::Unbound(key))?;
                    out.push_str(value);
                }
                c => out.push(c),
            }
        }
        Ok(out)
    }
}

fn parse_placeholder(key: &str) -> Result<(usize, usize), TemplateError> {
    let malformed = || TemplateError::Malformed(key.to_string());
    let (v, s) = match key.trim().split_once('.') {
        Some((v, s)) => (v, s),
        None => (key.trim(), "0"),
    };
    Ok((
        v.trim().parse().map_err(|_| malformed())?,
        s.trim().parse().map_err(|_| malformed())?,
    ))
}

/// The resolved combination space of a mapping's loop variables.
#[derive(Debug, Clone, Default)]
pub struct VariableExpander {
    bindings: Vec<Vec<Vec<String>>>,
}

impl VariableExpander {
    pub fn expand<S: RecordSource>(source: &S, variables: &[LoopVariable]) -> Result<Self, SourceError> {
        let bindings = variables
            .iter()
            .map(|v| v.bindings(source))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { bindings })
    }

    /// Number of combinations (1 when there are no loop variables).
    pub fn len(&self) -> usize {
        self.bindings.iter().map(Vec::len).product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lazily walk every combination in deterministic order.
    pub fn combinations(&self) -> Combinations<'_> {
        Combinations {
            bindings: &self.bindings,
            indices: CartesianProduct::new(self.bindings.iter().map(Vec::len).collect()),
        }
    }
}

/// Iterator returned by [`VariableExpander::combinations`].
pub struct Combinations<'a> {
    bindings: &'a [Vec<Vec<String>>],
    indices: CartesianProduct,
}

impl Iterator for Combinations<'_> {
    type Item = Combination;

    fn next(&mut self) -> Option<Combination> {
        let indices = self.indices.next()?;
        Some(Combination::new(
            indices
                .iter()
                .zip(self.bindings)
                .map(|(&i, tuples)| tuples[i].clone())
                .collect(),
        ))
    }
}
