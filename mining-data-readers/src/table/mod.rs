//! Relational table source
//!
//! A [`TableDriver`] opens a [`TableCursor`] over one table. The driver is
//! the only part that knows how to talk to a database; [`TableSource`]
//! adapts any driver to the record source interface, serving the column
//! names as the header row.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use mining_data_core::{Error, PhysicalRecordSource, RawField, RawRow, Result};

#[cfg(feature = "database")]
mod sql;

#[cfg(feature = "database")]
pub use sql::SqlTableDriver;

/// Connects to a table and opens cursors over its rows
pub trait TableDriver: Send + Sync {
    /// Human-readable name of the table, used in errors and logs
    fn describe(&self) -> String;

    /// Open a new cursor positioned before the first row
    fn connect(&self) -> Result<Box<dyn TableCursor>>;
}

/// Forward-only cursor over the rows of one table
pub trait TableCursor: Send {
    /// Column names in row order
    fn columns(&self) -> &[String];

    /// Fetch the next row, or `None` at the end of the table
    fn fetch_next(&mut self) -> Result<Option<RawRow>>;
}

/// Record source reading a table through a driver
pub struct TableSource {
    driver: Arc<dyn TableDriver>,
    origin: String,
    cursor: Option<Box<dyn TableCursor>>,
}

impl TableSource {
    /// Create a source over a driver
    pub fn new(driver: Arc<dyn TableDriver>) -> Self {
        Self {
            origin: driver.describe(),
            driver,
            cursor: None,
        }
    }

    fn cursor_mut(&mut self) -> Result<&mut Box<dyn TableCursor>> {
        let origin = &self.origin;
        self.cursor
            .as_mut()
            .ok_or_else(|| Error::InvalidOperation(format!("{origin} is not open")))
    }
}

impl PhysicalRecordSource for TableSource {
    fn origin(&self) -> &str {
        &self.origin
    }

    fn open(&mut self) -> Result<()> {
        if self.cursor.is_some() {
            return Ok(());
        }
        let cursor = self.driver.connect()?;
        debug!(origin = %self.origin, columns = cursor.columns().len(), "table source open");
        self.cursor = Some(cursor);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.cursor = None;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.cursor.is_some()
    }

    fn has_header(&self) -> bool {
        true
    }

    fn peek_schema_row(&mut self) -> Result<Option<RawRow>> {
        let cursor = self.cursor_mut()?;
        Ok(Some(
            cursor
                .columns()
                .iter()
                .map(|name| RawField::Text(name.clone()))
                .collect(),
        ))
    }

    fn read_next(&mut self) -> Result<Option<RawRow>> {
        self.cursor_mut()?.fetch_next()
    }

    fn duplicate(&self) -> Result<Box<dyn PhysicalRecordSource>> {
        Ok(Box::new(Self::new(Arc::clone(&self.driver))))
    }
}

impl fmt::Debug for TableSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableSource")
            .field("origin", &self.origin)
            .field("open", &self.cursor.is_some())
            .finish()
    }
}

/// Table held in memory, for pre-materialized query results and tests
#[derive(Debug, Clone)]
pub struct InMemoryTable {
    name: String,
    columns: Arc<Vec<String>>,
    rows: Arc<Vec<RawRow>>,
}

impl InMemoryTable {
    /// Create a table from column names and rows
    pub fn new<S: Into<String>>(
        name: impl Into<String>,
        columns: impl IntoIterator<Item = S>,
        rows: Vec<RawRow>,
    ) -> Self {
        Self {
            name: name.into(),
            columns: Arc::new(columns.into_iter().map(Into::into).collect()),
            rows: Arc::new(rows),
        }
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the table has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl TableDriver for InMemoryTable {
    fn describe(&self) -> String {
        format!("table {}", self.name)
    }

    fn connect(&self) -> Result<Box<dyn TableCursor>> {
        Ok(Box::new(InMemoryCursor {
            columns: Arc::clone(&self.columns),
            rows: Arc::clone(&self.rows),
            next: 0,
        }))
    }
}

struct InMemoryCursor {
    columns: Arc<Vec<String>>,
    rows: Arc<Vec<RawRow>>,
    next: usize,
}

impl TableCursor for InMemoryCursor {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn fetch_next(&mut self) -> Result<Option<RawRow>> {
        let row = self.rows.get(self.next).cloned();
        if row.is_some() {
            self.next += 1;
        }
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mining_data_core::{MiningStream, StreamCursor, VerticalComposer};

    fn people() -> InMemoryTable {
        InMemoryTable::new(
            "people",
            ["name", "age"],
            vec![
                vec![RawField::from("ann"), RawField::Number(31.0)],
                vec![RawField::from("bob"), RawField::Number(45.0)],
                vec![RawField::from("ann"), RawField::Missing],
            ],
        )
    }

    struct Offline;

    impl TableDriver for Offline {
        fn describe(&self) -> String {
            "table offline".into()
        }

        fn connect(&self) -> Result<Box<dyn TableCursor>> {
            Err(Error::unavailable("table offline", "connection refused"))
        }
    }

    #[test]
    fn test_columns_name_attributes() {
        let mut cursor = StreamCursor::new(Box::new(TableSource::new(Arc::new(people()))));

        let catalog = cursor.catalog().unwrap();
        assert_eq!(catalog.logical().index_of("age"), Some(1));

        let rows: Vec<Vec<f64>> = cursor
            .vectors()
            .map(|vector| vector.unwrap().values().to_vec())
            .collect();
        assert_eq!(rows, vec![vec![1.0, 31.0], vec![2.0, 45.0], vec![1.0, 0.0]]);
    }

    #[test]
    fn test_unreachable_table() {
        let mut cursor = StreamCursor::new(Box::new(TableSource::new(Arc::new(Offline))));

        assert!(matches!(cursor.open(), Err(Error::SourceUnavailable { .. })));
        assert!(!cursor.is_open());
    }

    #[test]
    fn test_read_requires_open() {
        let mut source = TableSource::new(Arc::new(people()));

        assert!(matches!(source.read_next(), Err(Error::InvalidOperation(_))));
    }

    #[test]
    fn test_table_beside_itself() {
        let table = Arc::new(people());
        let members = vec![
            StreamCursor::new(Box::new(TableSource::new(table.clone()))),
            StreamCursor::new(Box::new(TableSource::new(table))),
        ];
        let mut composed = VerticalComposer::new(members).unwrap();

        assert_eq!(composed.catalog().unwrap().len(), 4);
        assert_eq!(composed.record_at(2).unwrap().unwrap().values(), &[2.0, 45.0, 2.0, 45.0]);
        assert_eq!(composed.total_record_count().unwrap(), 3);
    }
}
