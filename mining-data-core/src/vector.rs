//! Fixed-width numeric vectors produced by mining streams

use std::fmt;
use std::sync::Arc;

use crate::schema::LogicalSchema;

/// One encoded record
///
/// `index` is the 1-based ordinal of the record within its stream. The
/// values are shared, so cloning a vector is cheap.
#[derive(Debug, Clone, PartialEq)]
pub struct MiningVector {
    values: Arc<[f64]>,
    index: usize,
    schema: Arc<LogicalSchema>,
}

impl MiningVector {
    /// Create a vector
    pub fn new(values: Vec<f64>, index: usize, schema: Arc<LogicalSchema>) -> Self {
        Self {
            values: values.into(),
            index,
            schema,
        }
    }

    /// The same values under another index and schema
    pub fn renumbered(&self, index: usize, schema: Arc<LogicalSchema>) -> Self {
        Self {
            values: Arc::clone(&self.values),
            index,
            schema,
        }
    }

    /// All values in column order
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Value of one column
    pub fn value(&self, column: usize) -> Option<f64> {
        self.values.get(column).copied()
    }

    /// Value of the column with this attribute name
    pub fn value_by_name(&self, name: &str) -> Option<f64> {
        self.schema.index_of(name).and_then(|column| self.value(column))
    }

    /// Number of values
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the vector has no values
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// 1-based ordinal within the producing stream
    pub fn index(&self) -> usize {
        self.index
    }

    /// Logical schema the values follow
    pub fn schema(&self) -> &Arc<LogicalSchema> {
        &self.schema
    }
}

impl fmt::Display for MiningVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} [", self.index)?;
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{value}")?;
        }
        write!(f, "]")
    }
}
