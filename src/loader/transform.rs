//! Value transforms and string combinators
//!
//! Both are plain functions wrapped with a name so mappings stay `Debug`
//! and configuration files can refer to built-ins by name.

use std::fmt;
use std::sync::Arc;

type TransformFn = dyn Fn(&str) -> String + Send + Sync;
type CombinatorFn = dyn Fn(&[String]) -> String + Send + Sync;

/// A pure `text -> text` map applied to a raw value before typing.
#[derive(Clone)]
pub struct Transform {
    name: String,
    func: Arc<TransformFn>,
}

impl Transform {
    pub fn new(name: impl Into<String>, func: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn apply(&self, value: &str) -> String {
        (self.func)(value)
    }

    /// Look up a built-in transform by its `name[:arg]` spelling.
    ///
    /// `trim`, `lowercase`, `uppercase`, `collapse_whitespace`,
    /// `prefix:X`, `suffix:X`, `replace:FROM=>TO`.
    pub fn builtin(spec: &str) -> Result<Self, String> {
        let (name, arg) = match spec.split_once(':') {
            Some((n, a)) => (n.trim(), Some(a.to_string())),
            None => (spec.trim(), None),
        };

        let transform = match (name, arg) {
            ("trim", None) => Self::new(spec, |v| v.trim().to_string()),
            ("lowercase", None) => Self::new(spec, |v| v.to_lowercase()),
            ("uppercase", None) => Self::new(spec, |v| v.to_uppercase()),
            ("collapse_whitespace", None) => {
                Self::new(spec, |v| v.split_whitespace().collect::<Vec<_>>().join(" "))
            }
            ("prefix", Some(p)) => Self::new(spec, move |v| format!("{}{}", p, v)),
            ("suffix", Some(s)) => Self::new(spec, move |v| format!("{}{}", v, s)),
            ("replace", Some(arg)) => {
                let (from, to) = arg
                    .split_once("=>")
                    .map(|(f, t)| (f.to_string(), t.to_string()))
                    .ok_or_else(|| format!("replace transform needs FROM=>TO, got '{}'", arg))?;
                if from.is_empty() {
                    return Err("replace transform needs a non-empty FROM".to_string());
                }
                Self::new(spec, move |v| v.replace(&from, &to))
            }
            (name, _) => return Err(format!("unknown transform: {}", name)),
        };
        Ok(transform)
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Transform({})", self.name)
    }
}

/// Apply transforms in order.
pub(crate) fn apply_all(transforms: &[Transform], value: &str) -> String {
    transforms
        .iter()
        .fold(value.to_string(), |acc, t| t.apply(&acc))
}

/// Joins the parts collected by a string-combination element.
#[derive(Clone)]
pub struct Combinator {
    name: String,
    func: Arc<CombinatorFn>,
}

impl Combinator {
    pub fn new(name: impl Into<String>, func: impl Fn(&[String]) -> String + Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn combine(&self, parts: &[String]) -> String {
        (self.func)(parts)
    }

    /// Join the non-empty parts with `separator`.
    pub fn join(separator: impl Into<String>) -> Self {
        let separator = separator.into();
        Self::new(format!("join:{}", separator), move |parts| {
            parts
                .iter()
                .filter(|p| !p.is_empty())
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join(&separator)
        })
    }

    /// `join` (single space) or `join:SEP`.
    pub fn builtin(spec: &str) -> Result<Self, String> {
        match spec.split_once(':') {
            Some(("join", sep)) => Ok(Self::join(sep)),
            None if spec.trim() == "join" => Ok(Self::default()),
            _ => Err(format!("unknown combinator: {}", spec)),
        }
    }
}

impl Default for Combinator {
    /// Space-join of the non-empty parts.
    fn default() -> Self {
        Self::join(" ")
    }
}

impl fmt::Debug for Combinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Combinator({})", self.name)
    }
}
