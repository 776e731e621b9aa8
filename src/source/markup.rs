//! Hierarchical records parsed with `quick-xml`
//!
//! The document is read once into an arena of elements in document order,
//! so node indices sort the same way the source does.

use super::path::{ElementPath, NameTest, Predicate, Step};
use super::traits::{Record, RecordSource, Selector, SourceError};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

#[derive(Debug, Clone)]
struct XmlNode {
    /// `local` or `{uri}local` when the element is in a namespace.
    name: String,
    /// Attribute values keyed by their name as written.
    attributes: Vec<(String, String)>,
    text: String,
    children: Vec<usize>,
    parent: Option<usize>,
}

impl XmlNode {
    fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// A parsed XML document.
#[derive(Debug, Clone)]
pub struct XmlSource {
    nodes: Vec<XmlNode>,
    /// Prefix bindings used when parsing paths, not the document's own.
    namespaces: HashMap<String, String>,
}

fn xml_error(reader: &Reader<&[u8]>, message: impl ToString) -> SourceError {
    SourceError::Xml {
        position: reader.buffer_position(),
        message: message.to_string(),
    }
}

/// Namespace declarations in effect for the element being read.
#[derive(Default)]
struct NamespaceScopes {
    /// Only elements that declare namespaces get a frame, tagged with their depth.
    frames: Vec<(usize, HashMap<String, String>)>,
    depth: usize,
}

impl NamespaceScopes {
    fn enter(&mut self, frame: HashMap<String, String>) {
        self.depth += 1;
        if !frame.is_empty() {
            self.frames.push((self.depth, frame));
        }
    }

    fn leave(&mut self) {
        if self.frames.last().is_some_and(|(depth, _)| *depth == self.depth) {
            self.frames.pop();
        }
        self.depth = self.depth.saturating_sub(1);
    }

    fn resolve(&self, prefix: &str) -> Option<&str> {
        self.frames
            .iter()
            .rev()
            .find_map(|(_, frame)| frame.get(prefix))
            .map(String::as_str)
            .filter(|uri| !uri.is_empty())
    }

    fn expand(&self, qname: &str) -> String {
        let (prefix, local) = qname.split_once(':').unwrap_or(("", qname));
        match self.resolve(prefix) {
            Some(uri) => format!("{{{}}}{}", uri, local),
            None => local.to_string(),
        }
    }
}

impl XmlSource {
    /// Parse a document from a string.
    pub fn parse(xml: &str) -> Result<Self, SourceError> {
        let mut reader = Reader::from_str(xml);
        let mut nodes: Vec<XmlNode> = Vec::new();
        let mut stack: Vec<usize> = Vec::new();
        let mut scopes = NamespaceScopes::default();

        loop {
            let event = reader.read_event().map_err(|e| xml_error(&reader, e))?;
            match event {
                Event::Start(start) => {
                    let index = Self::open_element(&reader, &start, &mut nodes, &stack, &mut scopes)?;
                    stack.push(index);
                }
                Event::Empty(start) => {
                    Self::open_element(&reader, &start, &mut nodes, &stack, &mut scopes)?;
                    scopes.leave();
                }
                Event::End(_) => {
                    if stack.pop().is_none() {
                        return Err(xml_error(&reader, "unbalanced end tag"));
                    }
                    scopes.leave();
                }
                Event::Text(text) => {
                    if let Some(&current) = stack.last() {
                        let unescaped = text.unescape().map_err(|e| xml_error(&reader, e))?;
                        nodes[current].text.push_str(&unescaped);
                    }
                }
                Event::CData(data) => {
                    if let Some(&current) = stack.last() {
                        let raw = data.into_inner();
                        nodes[current].text.push_str(&String::from_utf8_lossy(&raw));
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(xml_error(&reader, "unexpected end of document"));
        }
        if nodes.is_empty() {
            return Err(xml_error(&reader, "document has no root element"));
        }
        for node in &mut nodes {
            let trimmed = node.text.trim();
            if trimmed.len() != node.text.len() {
                node.text = trimmed.to_string();
            }
        }
        tracing::debug!(elements = nodes.len(), "parsed XML");

        Ok(Self {
            nodes,
            namespaces: HashMap::new(),
        })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let xml = std::fs::read_to_string(path)?;
        Self::parse(&xml)
    }

    /// Bind namespace prefixes for use in paths.
    pub fn with_namespaces(mut self, namespaces: HashMap<String, String>) -> Self {
        self.namespaces = namespaces;
        self
    }

    /// Push a new element and its namespace frame; returns its index.
    fn open_element(
        reader: &Reader<&[u8]>,
        start: &BytesStart<'_>,
        nodes: &mut Vec<XmlNode>,
        stack: &[usize],
        scopes: &mut NamespaceScopes,
    ) -> Result<usize, SourceError> {
        let parent = stack.last().copied();
        if parent.is_none() && !nodes.is_empty() {
            return Err(xml_error(reader, "multiple root elements"));
        }

        let mut frame = HashMap::new();
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| xml_error(reader, e))?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|e| xml_error(reader, e))?
                .into_owned();
            if key == "xmlns" {
                frame.insert(String::new(), value.clone());
            } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                frame.insert(prefix.to_string(), value.clone());
            }
            attributes.push((key, value));
        }
        scopes.enter(frame);

        let qname = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let index = nodes.len();
        nodes.push(XmlNode {
            name: scopes.expand(&qname),
            attributes,
            text: String::new(),
            children: Vec::new(),
            parent,
        });
        if let Some(p) = parent {
            nodes[p].children.push(index);
        }
        Ok(index)
    }

    fn compile(&self, path: &str) -> Result<ElementPath, SourceError> {
        ElementPath::parse(path, &self.namespaces)
    }

    /// Every element below `node`, in document order.
    fn descendants(&self, node: usize, out: &mut Vec<usize>) {
        let mut pending: Vec<usize> = self.nodes[node].children.iter().rev().copied().collect();
        while let Some(next) = pending.pop() {
            out.push(next);
            pending.extend(self.nodes[next].children.iter().rev());
        }
    }

    fn matches(&self, node: usize, name: &NameTest) -> bool {
        match name {
            NameTest::Any => true,
            NameTest::Name(n) => self.nodes[node].name == *n,
        }
    }

    fn satisfies(&self, node: usize, predicate: &Predicate) -> bool {
        let n = &self.nodes[node];
        match predicate {
            Predicate::HasAttribute(key) => n.attribute(key).is_some(),
            Predicate::AttributeEquals(key, value) => n.attribute(key) == Some(value.as_str()),
            // Positional predicates are applied per parent in `select_elements`.
            Predicate::Position(_) => true,
        }
    }

    /// Evaluate the element steps of `path` from `start`, in document order.
    fn select_elements(&self, start: usize, path: &ElementPath) -> Vec<usize> {
        let mut current = vec![start];

        for step in &path.steps {
            let mut next = BTreeSet::new();
            match step {
                Step::Current => next.extend(current.iter().copied()),
                Step::Parent => next.extend(current.iter().filter_map(|&n| self.nodes[n].parent)),
                Step::Attribute(_) => next.extend(current.iter().copied()),
                Step::Child {
                    name,
                    predicate,
                    descendant,
                } => {
                    for &node in &current {
                        let candidates = if *descendant {
                            let mut all = Vec::new();
                            self.descendants(node, &mut all);
                            all
                        } else {
                            self.nodes[node].children.clone()
                        };
                        let matched: Vec<usize> = candidates
                            .into_iter()
                            .filter(|&c| self.matches(c, name))
                            .filter(|&c| predicate.as_ref().map_or(true, |p| self.satisfies(c, p)))
                            .collect();
                        match predicate {
                            Some(Predicate::Position(pos)) => {
                                next.extend(matched.get(pos - 1).copied());
                            }
                            _ => next.extend(matched),
                        }
                    }
                }
            }
            current = next.into_iter().collect();
        }

        current
    }

    /// Values selected by `path` from `start`: element texts or attribute values.
    fn select_values(&self, start: usize, path: &ElementPath) -> Vec<String> {
        let elements = self.select_elements(start, path);
        match path.steps.last() {
            Some(Step::Attribute(key)) => elements
                .iter()
                .filter_map(|&n| self.nodes[n].attribute(key).map(str::to_string))
                .collect(),
            _ => elements
                .iter()
                .map(|&n| self.nodes[n].text.clone())
                .collect(),
        }
    }

    fn element_matches(&self, path: &str) -> Result<Vec<usize>, SourceError> {
        let compiled = self.compile(path)?;
        if compiled.selects_attribute() {
            return Err(SourceError::invalid_locator(path, "expected an element path, not an attribute"));
        }
        Ok(self.select_elements(0, &compiled))
    }

    fn entity(&self, node: usize) -> XmlEntity<'_> {
        XmlEntity { source: self, node }
    }
}

/// One element of an [`XmlSource`].
#[derive(Debug, Clone, Copy)]
pub struct XmlEntity<'a> {
    source: &'a XmlSource,
    node: usize,
}

impl<'a> XmlEntity<'a> {
    /// Tag name, expanded to `{uri}local` when namespaced.
    pub fn name(&self) -> &'a str {
        &self.source.nodes[self.node].name
    }

    pub fn text(&self) -> &'a str {
        &self.source.nodes[self.node].text
    }
}

impl Record for XmlEntity<'_> {
    fn lookup(&self, selector: &Selector) -> Result<Vec<String>, SourceError> {
        match selector {
            Selector::Index(i) => Ok(self.source.nodes[self.node]
                .children
                .get(*i)
                .map(|&c| self.source.nodes[c].text.clone())
                .into_iter()
                .collect()),
            Selector::Path(p) => {
                let compiled = self.source.compile(p)?;
                Ok(self.source.select_values(self.node, &compiled))
            }
        }
    }
}

impl RecordSource for XmlSource {
    type Record<'a> = XmlEntity<'a>;

    fn entities<'a>(&'a self, root: &str) -> Result<Vec<XmlEntity<'a>>, SourceError> {
        let matches = self.element_matches(root)?;
        let Some(&first) = matches.first() else {
            return Err(SourceError::invalid_locator(root, "no element matches the root path"));
        };
        Ok(self.nodes[first]
            .children
            .iter()
            .map(|&c| self.entity(c))
            .collect())
    }

    fn scopes<'a>(&'a self, path: &str) -> Result<Vec<XmlEntity<'a>>, SourceError> {
        Ok(self
            .element_matches(path)?
            .into_iter()
            .map(|n| self.entity(n))
            .collect())
    }
}
