//! Tabular records read with the `csv` crate

use super::traits::{Record, RecordSource, Selector, SourceError};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;

/// Dialect settings for CSV input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CsvOptions {
    pub delimiter: char,
    pub quote: char,
    pub double_quote: bool,
    pub escape: Option<char>,
    /// Leading rows to skip (headers).
    pub header_count: usize,
    /// Strip whitespace around fields.
    pub trim: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: ',',
            quote: '"',
            double_quote: true,
            escape: None,
            header_count: 0,
            trim: false,
        }
    }
}

fn ascii_byte(name: &str, c: char) -> Result<u8, SourceError> {
    u8::try_from(c)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| SourceError::InvalidOption(format!("{} must be an ASCII character, got {:?}", name, c)))
}

/// Rows of a CSV document, header rows already removed.
#[derive(Debug, Clone, Default)]
pub struct CsvSource {
    rows: Vec<Vec<String>>,
}

impl CsvSource {
    pub fn from_rows(rows: Vec<Vec<String>>) -> Self {
        Self { rows }
    }

    pub fn from_reader<R: Read>(reader: R, options: &CsvOptions) -> Result<Self, SourceError> {
        let mut builder = csv::ReaderBuilder::new();
        builder
            .has_headers(false)
            .flexible(true)
            .delimiter(ascii_byte("delimiter", options.delimiter)?)
            .quote(ascii_byte("quote", options.quote)?)
            .double_quote(options.double_quote)
            .escape(options.escape.map(|c| ascii_byte("escape", c)).transpose()?)
            .trim(if options.trim { csv::Trim::All } else { csv::Trim::None });

        let mut rows = Vec::new();
        for (i, record) in builder.from_reader(reader).records().enumerate() {
            let record = record?;
            if i < options.header_count {
                continue;
            }
            rows.push(record.iter().map(str::to_string).collect());
        }
        tracing::debug!(rows = rows.len(), skipped = options.header_count, "parsed CSV");
        Ok(Self { rows })
    }

    pub fn parse(input: &str, options: &CsvOptions) -> Result<Self, SourceError> {
        Self::from_reader(input.as_bytes(), options)
    }

    pub fn open(path: impl AsRef<Path>, options: &CsvOptions) -> Result<Self, SourceError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file, options)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn all_rows(&self, locator: &str) -> Result<Vec<CsvRow<'_>>, SourceError> {
        match locator.trim() {
            "" | "." | "/" => Ok(self.rows.iter().map(|r| CsvRow { fields: r }).collect()),
            _ => Err(SourceError::invalid_locator(
                locator,
                "CSV sources only support the whole-file root ('', '.' or '/')",
            )),
        }
    }
}

/// One CSV row.
#[derive(Debug, Clone, Copy)]
pub struct CsvRow<'a> {
    fields: &'a [String],
}

impl<'a> CsvRow<'a> {
    pub fn new(fields: &'a [String]) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &'a [String] {
        self.fields
    }
}

impl Record for CsvRow<'_> {
    fn lookup(&self, selector: &Selector) -> Result<Vec<String>, SourceError> {
        let index = match selector {
            Selector::Index(i) => *i,
            Selector::Path(p) => p.trim().parse().map_err(|_| {
                SourceError::invalid_locator(p.as_str(), "CSV fields are addressed by column index")
            })?,
        };
        Ok(self.fields.get(index).cloned().into_iter().collect())
    }
}

impl RecordSource for CsvSource {
    type Record<'a> = CsvRow<'a>;

    fn entities<'a>(&'a self, root: &str) -> Result<Vec<CsvRow<'a>>, SourceError> {
        self.all_rows(root)
    }

    fn scopes<'a>(&'a self, path: &str) -> Result<Vec<CsvRow<'a>>, SourceError> {
        self.all_rows(path)
    }
}
