//! Element path expressions for hierarchical sources
//!
//! A small, ElementTree-flavored subset:
//!
//! - `a/b/c`: child steps by tag name, `*` for any element
//! - `.` and `..`: current and parent element
//! - `a//b`: `b` at any depth below `a`
//! - `item[2]`: second `item` child of each parent (1-based)
//! - `item[@id]`, `item[@id='7']`: attribute presence / equality
//! - `a/@href`: final step selecting an attribute value
//! - `ns:tag`: prefix resolved through the source's namespace bindings

use super::traits::SourceError;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum NameTest {
    Any,
    Name(String),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Predicate {
    Position(usize),
    HasAttribute(String),
    AttributeEquals(String, String),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Step {
    Current,
    Parent,
    Child {
        name: NameTest,
        predicate: Option<Predicate>,
        /// Match at any depth, not only direct children.
        descendant: bool,
    },
    Attribute(String),
}

/// A parsed path.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ElementPath {
    pub steps: Vec<Step>,
}

impl ElementPath {
    /// True when the path ends on an attribute rather than an element.
    pub fn selects_attribute(&self) -> bool {
        matches!(self.steps.last(), Some(Step::Attribute(_)))
    }

    pub fn parse(path: &str, namespaces: &HashMap<String, String>) -> Result<Self, SourceError> {
        let trimmed = path.trim().trim_start_matches('/');
        let mut steps = Vec::new();
        let mut descendant = false;

        if trimmed.is_empty() {
            return Ok(Self {
                steps: vec![Step::Current],
            });
        }

        let segments = split_steps(trimmed, path)?;
        for (i, raw) in segments.iter().enumerate() {
            let segment = raw.trim();
            if segment.is_empty() {
                // `a//b`: the empty segment marks a descendant step
                if i + 1 == segments.len() {
                    return Err(SourceError::invalid_locator(path, "path ends with '/'"));
                }
                descendant = true;
                continue;
            }
            if matches!(steps.last(), Some(Step::Attribute(_))) {
                return Err(SourceError::invalid_locator(
                    path,
                    "attribute step must be the last step",
                ));
            }

            let step = match segment {
                "." => Step::Current,
                ".." => Step::Parent,
                s if s.starts_with('@') => {
                    Step::Attribute(s[1..].to_string())
                }
                s => {
                    let (name, predicate) = split_predicate(s, path)?;
                    let name = match name {
                        "*" => NameTest::Any,
                        n => NameTest::Name(expand_name(n, namespaces, path)?),
                    };
                    Step::Child {
                        name,
                        predicate,
                        descendant,
                    }
                }
            };
            if descendant && !matches!(step, Step::Child { .. }) {
                return Err(SourceError::invalid_locator(
                    path,
                    "'//' must be followed by an element step",
                ));
            }
            descendant = false;
            steps.push(step);
        }

        Ok(Self { steps })
    }
}

/// Split a path on the `/` separators that sit outside predicates,
/// quoted values and `{uri}` names.
fn split_steps<'s>(trimmed: &'s str, path: &str) -> Result<Vec<&'s str>, SourceError> {
    let mut segments = Vec::new();
    let mut start = 0;
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for (i, c) in trimmed.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') if depth > 0 => quote = Some(c),
            (None, '[' | '{') => depth += 1,
            (None, ']' | '}') => depth = depth.saturating_sub(1),
            (None, '/') if depth == 0 => {
                segments.push(&trimmed[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if quote.is_some() {
        return Err(SourceError::invalid_locator(path, "unterminated quoted value"));
    }
    segments.push(&trimmed[start..]);
    Ok(segments)
}

/// Split `tag[pred]` into its name and parsed predicate.
fn split_predicate<'s>(segment: &'s str, path: &str) -> Result<(&'s str, Option<Predicate>), SourceError> {
    let Some(open) = segment.find('[') else {
        return Ok((segment, None));
    };
    let Some(inner) = segment[open + 1..].strip_suffix(']') else {
        return Err(SourceError::invalid_locator(path, "unclosed '[' in step"));
    };
    let name = &segment[..open];
    let inner = inner.trim();

    if let Some(attr) = inner.strip_prefix('@') {
        let predicate = match attr.split_once('=') {
            Some((key, value)) => {
                let value = value.trim();
                let unquoted = value
                    .strip_prefix('\'')
                    .and_then(|v| v.strip_suffix('\''))
                    .or_else(|| value.strip_prefix('"').and_then(|v| v.strip_suffix('"')))
                    .ok_or_else(|| SourceError::invalid_locator(path, "attribute value must be quoted"))?;
                Predicate::AttributeEquals(key.trim().to_string(), unquoted.to_string())
            }
            None => Predicate::HasAttribute(attr.trim().to_string()),
        };
        return Ok((name, Some(predicate)));
    }

    match inner.parse::<usize>() {
        Ok(n) if n >= 1 => Ok((name, Some(Predicate::Position(n)))),
        _ => Err(SourceError::invalid_locator(
            path,
            format!("unsupported predicate '[{}]'", inner),
        )),
    }
}

/// Expand `prefix:local` into `{uri}local` using the bound namespaces.
fn expand_name(name: &str, namespaces: &HashMap<String, String>, path: &str) -> Result<String, SourceError> {
    if name.starts_with('{') {
        return Ok(name.to_string());
    }
    match name.split_once(':') {
        Some((prefix, local)) => namespaces
            .get(prefix)
            .map(|uri| format!("{{{}}}{}", uri, local))
            .ok_or_else(|| SourceError::invalid_locator(path, format!("unbound namespace prefix '{}'", prefix))),
        None => Ok(name.to_string()),
    }
}
