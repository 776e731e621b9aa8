//! YAML loader configuration
//!
//! One file describes the source to read, the store to write to and the
//! mappings to apply. Transforms and combinators are referred to by their
//! built-in names (see [`Transform::builtin`] and [`Combinator::builtin`]).
//!
//! ```yaml
//! source:
//!   kind: csv
//!   path: sales.csv
//!   options: { header_count: 1 }
//! store:
//!   address: localhost
//!   port: 8080
//! mappings:
//!   - action: { name: sale, type: transaction }
//!     elements:
//!       - { kind: path, select: 0, component: Who, datatype: String, label: seller }
//!       - { kind: path, select: 2, component: What, datatype: Decimal, label: amount,
//!           transforms: ["replace:,=>."] }
//! ```

use crate::loader::{
    Combinator, CombinationElement, ExtractionElement, FixedElement, LoaderError, LoaderResult, LoopVariable, Mapping,
    PathElement, Transform, VariableElement, DEFAULT_BATCH_SIZE, DEFAULT_NA_VALUES,
};
use crate::source::{CsvOptions, CsvSource, Selector, SourceError, XmlSource};
use crate::store::HttpStoreConfig;
use crate::types::{Action, ComponentTag, DataType, TypedValue};
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoaderConfig {
    pub source: SourceConfig,
    #[serde(default)]
    pub store: Option<HttpStoreConfig>,
    pub mappings: Vec<MappingConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceConfig {
    Csv {
        path: PathBuf,
        #[serde(default)]
        options: CsvOptions,
    },
    Xml {
        path: PathBuf,
        /// Prefix -> namespace URI, for prefixed names in paths.
        #[serde(default)]
        namespaces: HashMap<String, String>,
    },
}

/// A parsed source, ready to be walked.
#[derive(Debug)]
pub enum OpenedSource {
    Csv(CsvSource),
    Xml(XmlSource),
}

impl SourceConfig {
    pub fn path(&self) -> &Path {
        match self {
            Self::Csv { path, .. } | Self::Xml { path, .. } => path,
        }
    }

    pub fn open(&self) -> LoaderResult<OpenedSource> {
        let source_error = |e: SourceError| LoaderError::Config(format!("source '{}': {}", self.path().display(), e));
        match self {
            Self::Csv { path, options } => CsvSource::open(path, options)
                .map(OpenedSource::Csv)
                .map_err(source_error),
            Self::Xml { path, namespaces } => XmlSource::open(path)
                .map(|s| OpenedSource::Xml(s.with_namespaces(namespaces.clone())))
                .map_err(source_error),
        }
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        let path = match self {
            Self::Csv { path, .. } | Self::Xml { path, .. } => path,
        };
        if path.is_relative() {
            *path = base.join(&*path);
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub action_type: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MappingConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub action: ActionConfig,
    #[serde(default = "default_root")]
    pub root: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub loop_variables: Vec<LoopVariable>,
    pub elements: Vec<ElementConfig>,
    #[serde(default)]
    pub fallback: Vec<ElementConfig>,
}

fn default_root() -> String {
    "/".to_string()
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase", deny_unknown_fields)]
pub enum ElementConfig {
    Fixed {
        component: ComponentTag,
        datatype: DataType,
        #[serde(deserialize_with = "scalar")]
        value: String,
        label: String,
    },
    Variable {
        #[serde(rename = "loop")]
        loop_index: usize,
        #[serde(default)]
        index: usize,
        component: ComponentTag,
        datatype: DataType,
        label: String,
        #[serde(default)]
        transforms: Vec<String>,
    },
    Path {
        select: Selector,
        component: ComponentTag,
        datatype: DataType,
        label: String,
        #[serde(default = "yes")]
        required: bool,
        #[serde(default, deserialize_with = "optional_scalar")]
        default: Option<String>,
        #[serde(default = "yes")]
        allow_void: bool,
        #[serde(default)]
        transforms: Vec<String>,
        #[serde(default)]
        na_values: Option<Vec<String>>,
    },
    Combine {
        select: Vec<Selector>,
        component: ComponentTag,
        label: String,
        #[serde(default)]
        combinator: Option<String>,
        #[serde(default = "yes")]
        required: bool,
    },
}

fn yes() -> bool {
    true
}

/// Accept any YAML scalar as text, so `value: 5` works as well as `value: "5"`.
fn scalar<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    use serde::de::Error;
    match serde_yaml::Value::deserialize(deserializer)? {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        other => Err(D::Error::custom(format!("expected a scalar, found {:?}", other))),
    }
}

fn optional_scalar<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    scalar(deserializer).map(Some)
}

impl LoaderConfig {
    pub fn from_yaml(text: &str) -> LoaderResult<Self> {
        serde_yaml::from_str(text).map_err(|e| LoaderError::Config(e.to_string()))
    }

    /// Read a config file; a relative source path is taken from the file's directory.
    pub fn load(path: impl AsRef<Path>) -> LoaderResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| LoaderError::Config(format!("{}: {}", path.display(), e)))?;
        let mut config = Self::from_yaml(&text)?;
        if let Some(dir) = path.parent() {
            config.source.resolve_relative_to(dir);
        }
        Ok(config)
    }

    /// Build and validate every mapping.
    pub fn mappings(&self) -> LoaderResult<Vec<Mapping>> {
        self.mappings.iter().map(MappingConfig::build).collect()
    }
}

impl MappingConfig {
    pub fn build(&self) -> LoaderResult<Mapping> {
        let name = self.name.clone().unwrap_or_else(|| self.action.name.clone());
        let build_all = |configs: &[ElementConfig], list: &str| {
            configs
                .iter()
                .enumerate()
                .map(|(i, e)| {
                    e.build().map_err(|reason| {
                        LoaderError::Config(format!("mapping '{}': {}[{}] '{}': {}", name, list, i, e.label(), reason))
                    })
                })
                .collect::<LoaderResult<Vec<_>>>()
        };

        let mapping = Mapping {
            name: name.clone(),
            action: Action::new(&self.action.name, &self.action.action_type),
            root: self.root.clone(),
            loop_variables: self.loop_variables.clone(),
            elements: build_all(&self.elements, "elements")?,
            fallback: build_all(&self.fallback, "fallback")?,
            batch_size: self.batch_size,
        };
        mapping.validate()?;
        Ok(mapping)
    }
}

fn transforms(names: &[String]) -> Result<Vec<Transform>, String> {
    names.iter().map(|n| Transform::builtin(n)).collect()
}

impl ElementConfig {
    pub fn label(&self) -> &str {
        match self {
            Self::Fixed { label, .. }
            | Self::Variable { label, .. }
            | Self::Path { label, .. }
            | Self::Combine { label, .. } => label,
        }
    }

    fn build(&self) -> Result<ExtractionElement, String> {
        let element: ExtractionElement = match self {
            Self::Fixed {
                component,
                datatype,
                value,
                label,
            } => FixedElement::parse(*component, *datatype, value, label)
                .map_err(|e| e.to_string())?
                .into(),
            Self::Variable {
                loop_index,
                index,
                component,
                datatype,
                label,
                transforms: names,
            } => {
                let mut element = VariableElement::new(*component, *datatype, label, *loop_index, *index);
                element.transforms = transforms(names)?;
                element.into()
            }
            Self::Path {
                select,
                component,
                datatype,
                label,
                required,
                default,
                allow_void,
                transforms: names,
                na_values,
            } => {
                let mut element = PathElement::new(select.clone(), *component, *datatype, label)
                    .with_required(*required)
                    .with_allow_void(*allow_void);
                element.transforms = transforms(names)?;
                element.na_values = na_values
                    .clone()
                    .unwrap_or_else(|| DEFAULT_NA_VALUES.iter().map(|s| s.to_string()).collect());
                if let Some(raw) = default {
                    element.default = Some(TypedValue::coerce(*datatype, raw).map_err(|e| e.to_string())?);
                }
                element.into()
            }
            Self::Combine {
                select,
                component,
                label,
                combinator,
                required,
            } => {
                let mut element = CombinationElement::new(select.clone(), *component, label).with_required(*required);
                if let Some(spec) = combinator {
                    element = element.with_combinator(Combinator::builtin(spec)?);
                }
                element.into()
            }
        };
        Ok(element)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::Loader;
    use crate::store::MemoryStore;
    use std::io::Write;

    const SALES: &str = r#"
source:
  kind: csv
  path: sales.csv
  options:
    header_count: 1
    delimiter: ";"
store:
  address: data.example.org
  https: true
mappings:
  - action: { name: sale, type: transaction }
    batch_size: 50
    elements:
      - { kind: path, select: 0, component: Who, datatype: String, label: seller, transforms: [trim] }
      - { kind: path, select: 1, component: What, datatype: Integer, label: qty, default: 1 }
      - { kind: fixed, component: Where, datatype: String, value: web, label: channel }
    fallback:
      - { kind: combine, select: [3, 4], component: Who, label: name, combinator: "join:_" }
      - { kind: fixed, component: What, datatype: Integer, value: 0, label: qty }
"#;

    #[test]
    fn parses_full_config() {
        let config = LoaderConfig::from_yaml(SALES).unwrap();
        match &config.source {
            SourceConfig::Csv { path, options } => {
                assert_eq!(path, Path::new("sales.csv"));
                assert_eq!(options.header_count, 1);
                assert_eq!(options.delimiter, ';');
            }
            other => panic!("unexpected source {:?}", other),
        }
        assert!(config.store.as_ref().unwrap().https);

        let mappings = config.mappings().unwrap();
        assert_eq!(mappings.len(), 1);
        let sale = &mappings[0];
        assert_eq!(sale.name, "sale");
        assert_eq!(sale.root, "/");
        assert_eq!(sale.batch_size, 50);
        assert_eq!(sale.elements.len(), 3);
        assert_eq!(sale.fallback.len(), 2);

        match &sale.elements[1] {
            ExtractionElement::Path(p) => {
                assert_eq!(p.selector, Selector::Index(1));
                assert_eq!(p.default, Some(TypedValue::Integer(1)));
                assert!(p.required);
            }
            other => panic!("unexpected element {:?}", other),
        }
    }

    #[test]
    fn batch_size_defaults_to_one_hundred() {
        let yaml = r#"
source: { kind: xml, path: feed.xml, namespaces: { dc: "http://purl.org/dc/" } }
mappings:
  - action: { name: post, type: publication }
    root: channel
    elements:
      - { kind: path, select: "dc:creator", component: Who, datatype: String, label: author }
      - { kind: path, select: pubDate, component: When, datatype: Timestamp, label: date }
"#;
        let config = LoaderConfig::from_yaml(yaml).unwrap();
        assert!(config.store.is_none());
        let mappings = config.mappings().unwrap();
        assert_eq!(mappings[0].batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(mappings[0].root, "channel");
    }

    #[test]
    fn loop_variables_and_variable_elements() {
        let yaml = r#"
source: { kind: xml, path: report.xml }
mappings:
  - action: { name: quarterly, type: summary }
    root: "data/year[@v='{0}']"
    loop_variables:
      - { path: regions/region, sub_paths: [year] }
    elements:
      - { kind: variable, loop: 0, component: When, datatype: Integer, label: year }
      - { kind: path, select: amount, component: What, datatype: Integer, label: amount }
"#;
        let mappings = LoaderConfig::from_yaml(yaml).unwrap().mappings().unwrap();
        assert_eq!(mappings[0].loop_variables[0].sub_paths, vec![Selector::Path("year".into())]);
        assert!(matches!(
            mappings[0].elements[0],
            ExtractionElement::Variable(VariableElement {
                loop_index: 0,
                variable_index: 0,
                ..
            })
        ));
    }

    #[test]
    fn bad_entries_are_config_errors_naming_the_element() {
        let bad_transform = SALES.replace("transforms: [trim]", "transforms: [reverse]");
        let err = LoaderConfig::from_yaml(&bad_transform).unwrap().mappings().unwrap_err();
        match err {
            LoaderError::Config(message) => {
                assert!(message.contains("elements[0]"), "{}", message);
                assert!(message.contains("seller"), "{}", message);
            }
            other => panic!("unexpected {:?}", other),
        }

        let bad_default = SALES.replace("default: 1", "default: lots");
        assert!(matches!(
            LoaderConfig::from_yaml(&bad_default).unwrap().mappings(),
            Err(LoaderError::Config(_))
        ));

        let bad_component = SALES.replace("component: Where", "component: Why");
        assert!(matches!(LoaderConfig::from_yaml(&bad_component), Err(LoaderError::Config(_))));
    }

    #[test]
    fn unbound_variable_is_rejected_at_build() {
        let yaml = r#"
source: { kind: csv, path: x.csv }
mappings:
  - action: { name: a, type: b }
    elements:
      - { kind: variable, loop: 1, component: When, datatype: String, label: year }
      - { kind: path, select: 0, component: Who, datatype: String, label: who }
"#;
        let err = LoaderConfig::from_yaml(yaml).unwrap().mappings().unwrap_err();
        assert!(matches!(err, LoaderError::UnboundVariable { .. }));
    }

    #[tokio::test]
    async fn missing_required_field_is_void_unless_disabled() {
        let yaml = r#"
source: { kind: csv, path: visits.csv }
mappings:
  - action: { name: visit, type: event }
    elements:
      - { kind: path, select: 0, component: Who, datatype: String, label: patient }
      - { kind: path, select: 1, component: Where, datatype: String, label: ward }
"#;
        let mappings = LoaderConfig::from_yaml(yaml).unwrap().mappings().unwrap();
        assert!(matches!(&mappings[0].elements[1], ExtractionElement::Path(p) if p.allow_void));

        let source = CsvSource::parse("ann,\n", &CsvOptions::default()).unwrap();
        let store = MemoryStore::new();
        let stats = Loader::new(mappings).run(&source, &store).await.unwrap();
        assert_eq!(stats[0].instances, 1);
        assert_eq!(store.instances()[0].data[1].value, TypedValue::Void);

        let strict = yaml.replace("label: ward }", "label: ward, allow_void: false }");
        let mappings = LoaderConfig::from_yaml(&strict).unwrap().mappings().unwrap();
        let store = MemoryStore::new();
        let stats = Loader::new(mappings).run(&source, &store).await.unwrap();
        assert_eq!(stats[0].instances, 0);
        assert_eq!(stats[0].skipped, 1);
    }

    #[test]
    fn misspelled_element_key_is_rejected() {
        let typo = SALES.replace("default: 1", "defualt: 1");
        match LoaderConfig::from_yaml(&typo) {
            Err(LoaderError::Config(message)) => assert!(message.contains("defualt"), "{}", message),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn load_resolves_source_next_to_config() {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("load.yaml");
        let mut file = std::fs::File::create(&config_path).unwrap();
        file.write_all(SALES.as_bytes()).unwrap();
        std::fs::write(dir.path().join("sales.csv"), "seller;qty\nann;3\n").unwrap();

        let config = LoaderConfig::load(&config_path).unwrap();
        assert_eq!(config.source.path(), dir.path().join("sales.csv"));
        match config.source.open().unwrap() {
            OpenedSource::Csv(csv) => assert_eq!(csv.len(), 1),
            other => panic!("unexpected {:?}", other),
        }
    }
}
