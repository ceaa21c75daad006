//! Physical record sources: the capability interface every source kind implements

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::schema::AttributeKind;

/// One raw field as produced by a source
#[derive(Debug, Clone, PartialEq)]
pub enum RawField {
    /// Textual token, classified by the encoder
    Text(String),

    /// Native numeric value (pixel intensity, numeric table column)
    Number(f64),

    /// Null or empty value
    Missing,
}

impl RawField {
    /// Wrap a text token; empty tokens become [`RawField::Missing`]
    pub fn from_token(token: &str) -> Self {
        if token.is_empty() {
            RawField::Missing
        } else {
            RawField::Text(token.to_string())
        }
    }

    /// Text of a header field
    pub fn as_text(&self) -> Option<&str> {
        match self {
            RawField::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl From<&str> for RawField {
    fn from(token: &str) -> Self {
        RawField::from_token(token)
    }
}

impl From<f64> for RawField {
    fn from(value: f64) -> Self {
        RawField::Number(value)
    }
}

/// One raw row of fields
pub type RawRow = Vec<RawField>;

/// Forward-only producer of raw rows for one source kind
///
/// No source is assumed to support native backward seeks; cursors simulate
/// them with [`PhysicalRecordSource::rewind`] and forward replay.
pub trait PhysicalRecordSource: Send {
    /// Path, directory or connection string, used in errors and logs
    fn origin(&self) -> &str;

    /// Acquire the underlying handle; no-op when already open
    fn open(&mut self) -> Result<()>;

    /// Release the underlying handle; no-op when already closed
    fn close(&mut self) -> Result<()>;

    /// Whether the handle is currently held
    fn is_open(&self) -> bool;

    /// Restart iteration from the origin
    fn rewind(&mut self) -> Result<()> {
        self.close()?;
        self.open()
    }

    /// Whether [`PhysicalRecordSource::peek_schema_row`] returns attribute names
    fn has_header(&self) -> bool {
        false
    }

    /// Kind assigned to recognized attributes
    fn attribute_kind(&self) -> AttributeKind {
        AttributeKind::Numerical
    }

    /// Row used for schema recognition, without consuming it
    ///
    /// Returns the header when the source declares one, otherwise the first
    /// data row. `None` means the source has no such row.
    fn peek_schema_row(&mut self) -> Result<Option<RawRow>>;

    /// Next raw row, or `None` once exhausted
    fn read_next(&mut self) -> Result<Option<RawRow>>;

    /// A closed source reading the same origin with the same settings
    fn duplicate(&self) -> Result<Box<dyn PhysicalRecordSource>>;
}

/// Source over rows already held in memory
#[derive(Debug, Clone)]
pub struct MemorySource {
    origin: String,
    header: Option<Vec<String>>,
    rows: Arc<Vec<RawRow>>,
    kind: AttributeKind,
    next: usize,
    open: bool,
}

impl MemorySource {
    /// Create a headerless source
    pub fn new(origin: impl Into<String>, rows: Vec<RawRow>) -> Self {
        Self {
            origin: origin.into(),
            header: None,
            rows: Arc::new(rows),
            kind: AttributeKind::Numerical,
            next: 0,
            open: false,
        }
    }

    /// Create a source with a header row
    pub fn with_header<S: Into<String>>(
        origin: impl Into<String>,
        header: impl IntoIterator<Item = S>,
        rows: Vec<RawRow>,
    ) -> Self {
        let mut source = Self::new(origin, rows);
        source.header = Some(header.into_iter().map(Into::into).collect());
        source
    }

    /// Create a source from text tokens
    pub fn from_tokens(origin: impl Into<String>, header: Option<&[&str]>, rows: &[&[&str]]) -> Self {
        let rows = rows
            .iter()
            .map(|row| row.iter().map(|token| RawField::from_token(token)).collect())
            .collect();

        match header {
            Some(header) => Self::with_header(origin, header.iter().copied(), rows),
            None => Self::new(origin, rows),
        }
    }

    /// Set the kind assigned to recognized attributes
    #[must_use]
    pub fn with_kind(mut self, kind: AttributeKind) -> Self {
        self.kind = kind;
        self
    }

    /// Number of rows held
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if no rows are held
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(Error::InvalidOperation(format!("{} is not open", self.origin)))
        }
    }
}

impl PhysicalRecordSource for MemorySource {
    fn origin(&self) -> &str {
        &self.origin
    }

    fn open(&mut self) -> Result<()> {
        if !self.open {
            self.open = true;
            self.next = 0;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.open = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn rewind(&mut self) -> Result<()> {
        self.open = true;
        self.next = 0;
        Ok(())
    }

    fn has_header(&self) -> bool {
        self.header.is_some()
    }

    fn attribute_kind(&self) -> AttributeKind {
        self.kind
    }

    fn peek_schema_row(&mut self) -> Result<Option<RawRow>> {
        self.ensure_open()?;
        match &self.header {
            Some(header) => Ok(Some(header.iter().map(|name| RawField::Text(name.clone())).collect())),
            None => Ok(self.rows.get(self.next).cloned()),
        }
    }

    fn read_next(&mut self) -> Result<Option<RawRow>> {
        self.ensure_open()?;
        let row = self.rows.get(self.next).cloned();
        if row.is_some() {
            self.next += 1;
        }
        Ok(row)
    }

    fn duplicate(&self) -> Result<Box<dyn PhysicalRecordSource>> {
        let mut copy = self.clone();
        copy.open = false;
        copy.next = 0;
        Ok(Box::new(copy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peek_does_not_consume() {
        let mut source = MemorySource::from_tokens("mem", None, &[&["1", "a"], &["2", "b"]]);
        source.open().unwrap();

        let peeked = source.peek_schema_row().unwrap().unwrap();
        let first = source.read_next().unwrap().unwrap();

        assert_eq!(peeked, first);
        assert_eq!(first, vec![RawField::Text("1".into()), RawField::Text("a".into())]);
    }

    #[test]
    fn test_header_peek() {
        let mut source = MemorySource::from_tokens("mem", Some(&["x", "y"]), &[&["1", ""]]);
        source.open().unwrap();

        let header = source.peek_schema_row().unwrap().unwrap();
        assert_eq!(header[1].as_text(), Some("y"));
        assert_eq!(source.read_next().unwrap().unwrap()[1], RawField::Missing);
        assert_eq!(source.read_next().unwrap(), None);
    }

    #[test]
    fn test_read_requires_open() {
        let mut source = MemorySource::new("mem", vec![vec![RawField::Number(1.0)]]);

        assert!(matches!(source.read_next(), Err(Error::InvalidOperation(_))));
        source.open().unwrap();
        source.open().unwrap();
        assert!(source.read_next().unwrap().is_some());
        source.close().unwrap();
        source.close().unwrap();
        assert!(!source.is_open());
    }

    #[test]
    fn test_duplicate_starts_closed() {
        let mut source = MemorySource::new("mem", vec![vec![RawField::Number(1.0)]]);
        source.open().unwrap();
        source.read_next().unwrap();

        let mut copy = source.duplicate().unwrap();
        assert!(!copy.is_open());
        copy.open().unwrap();
        assert_eq!(copy.read_next().unwrap(), Some(vec![RawField::Number(1.0)]));
    }
}
