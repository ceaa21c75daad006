//! `sqlx`-backed table driver
//!
//! Rows are fetched in pages of `SELECT * FROM <table> LIMIT n OFFSET m`,
//! so at most one page is held in memory. Each cursor owns a single-threaded
//! runtime to drive the async driver from the blocking source interface.

use std::collections::VecDeque;

use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{AnyPool, Column, Row};
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, trace};

use mining_data_core::{Error, RawField, RawRow, Result};

use super::{TableCursor, TableDriver};

const DEFAULT_PAGE_SIZE: usize = 1024;

/// Driver reading one table of a database reachable through a connection URL
#[derive(Debug, Clone)]
pub struct SqlTableDriver {
    url: String,
    table: String,
    page_size: usize,
}

impl SqlTableDriver {
    /// Create a driver for `table` at `url`
    ///
    /// The table name must be a plain identifier, optionally schema-qualified.
    pub fn new(url: impl Into<String>, table: impl Into<String>) -> Result<Self> {
        let table = table.into();
        if !is_identifier(&table) {
            return Err(Error::InvalidArgument(format!("not a table identifier: {table}")));
        }
        Ok(Self {
            url: url.into(),
            table,
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    /// Set the number of rows fetched per query
    pub fn with_page_size(mut self, page_size: usize) -> Result<Self> {
        if page_size == 0 {
            return Err(Error::InvalidArgument("page size must be positive".into()));
        }
        self.page_size = page_size;
        Ok(self)
    }
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').all(|part| {
            let mut chars = part.chars();
            chars
                .next()
                .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

impl TableDriver for SqlTableDriver {
    fn describe(&self) -> String {
        format!("table {}", self.table)
    }

    fn connect(&self) -> Result<Box<dyn TableCursor>> {
        let origin = self.describe();
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| Error::unavailable(&origin, err))?;

        sqlx::any::install_default_drivers();
        let pool = runtime
            .block_on(AnyPoolOptions::new().max_connections(1).connect(&self.url))
            .map_err(|err| Error::unavailable(&origin, err))?;

        let mut cursor = SqlTableCursor {
            origin,
            runtime,
            pool,
            table: self.table.clone(),
            page_size: self.page_size,
            offset: 0,
            page: VecDeque::new(),
            columns: Vec::new(),
            exhausted: false,
        };
        cursor.fetch_page()?;
        debug!(origin = %cursor.origin, columns = cursor.columns.len(), "connected");
        Ok(Box::new(cursor))
    }
}

struct SqlTableCursor {
    origin: String,
    runtime: Runtime,
    pool: AnyPool,
    table: String,
    page_size: usize,
    offset: usize,
    page: VecDeque<RawRow>,
    columns: Vec<String>,
    exhausted: bool,
}

impl SqlTableCursor {
    fn fetch_page(&mut self) -> Result<()> {
        let query = format!(
            "SELECT * FROM {} LIMIT {} OFFSET {}",
            self.table, self.page_size, self.offset
        );
        let rows: Vec<AnyRow> = self
            .runtime
            .block_on(sqlx::query(&query).fetch_all(&self.pool))
            .map_err(|err| Error::read(&self.origin, err))?;

        if self.columns.is_empty() {
            if let Some(first) = rows.first() {
                self.columns = first
                    .columns()
                    .iter()
                    .map(|column| column.name().to_string())
                    .collect();
            }
        }

        trace!(origin = %self.origin, offset = self.offset, rows = rows.len(), "fetched page");
        self.exhausted = rows.len() < self.page_size;
        self.offset += rows.len();
        self.page.extend(rows.iter().map(raw_row));
        Ok(())
    }
}

fn raw_row(row: &AnyRow) -> RawRow {
    (0..row.len()).map(|column| raw_field(row, column)).collect()
}

fn raw_field(row: &AnyRow, column: usize) -> RawField {
    if let Ok(value) = row.try_get::<Option<f64>, _>(column) {
        return value.map_or(RawField::Missing, RawField::Number);
    }
    if let Ok(value) = row.try_get::<Option<i64>, _>(column) {
        #[allow(clippy::cast_precision_loss)]
        let value = value.map(|v| v as f64);
        return value.map_or(RawField::Missing, RawField::Number);
    }
    if let Ok(value) = row.try_get::<Option<String>, _>(column) {
        return value.map_or(RawField::Missing, |text| RawField::from_token(&text));
    }
    if let Ok(value) = row.try_get::<Option<bool>, _>(column) {
        return value.map_or(RawField::Missing, |flag| RawField::Number(f64::from(u8::from(flag))));
    }
    RawField::Missing
}

impl TableCursor for SqlTableCursor {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn fetch_next(&mut self) -> Result<Option<RawRow>> {
        if self.page.is_empty() && !self.exhausted {
            self.fetch_page()?;
        }
        Ok(self.page.pop_front())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_validation() {
        assert!(is_identifier("measurements"));
        assert!(is_identifier("lab.samples_2024"));
        assert!(!is_identifier("samples; DROP TABLE x"));
        assert!(!is_identifier("2fast"));
        assert!(!is_identifier("a..b"));
        assert!(SqlTableDriver::new("sqlite::memory:", "bad name").is_err());
    }

    #[test]
    fn test_page_size_must_be_positive() {
        let driver = SqlTableDriver::new("sqlite::memory:", "t").unwrap();
        assert!(driver.with_page_size(0).is_err());
    }
}
