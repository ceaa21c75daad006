//! Stable categorical-to-numeric encoding
//!
//! Every column owns a symbol table that assigns codes `1, 2, 3, ...` to
//! distinct non-numeric tokens in first-seen order. Codes are never
//! re-assigned or compacted, so repeated passes over a source produce the
//! same vectors. Tokens that parse as a number bypass the table entirely.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::source::RawField;

/// Symbol table of one column
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    /// Mapping from token to zero-based insertion position
    value_to_index: HashMap<String, usize>,

    /// Tokens in insertion order
    index_to_value: Vec<String>,
}

impl SymbolTable {
    /// Create an empty symbol table
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the code of a token, inserting it if unseen
    pub fn code_or_insert(&mut self, value: &str) -> usize {
        if let Some(&index) = self.value_to_index.get(value) {
            return index + 1;
        }

        let index = self.index_to_value.len();
        self.value_to_index.insert(value.to_string(), index);
        self.index_to_value.push(value.to_string());
        index + 1
    }

    /// Get the code of a token without inserting it
    pub fn code(&self, value: &str) -> Option<usize> {
        self.value_to_index.get(value).map(|index| index + 1)
    }

    /// Get the token behind a code
    pub fn value(&self, code: usize) -> Option<&str> {
        code.checked_sub(1)
            .and_then(|index| self.index_to_value.get(index))
            .map(String::as_str)
    }

    /// Number of distinct tokens seen
    pub fn len(&self) -> usize {
        self.index_to_value.len()
    }

    /// Check if no token has been seen
    pub fn is_empty(&self) -> bool {
        self.index_to_value.is_empty()
    }

    /// Tokens in code order
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.index_to_value.iter().map(String::as_str)
    }
}

/// Per-column symbol tables for one schema
#[derive(Debug, Clone, Default)]
pub struct CategoricalEncoder {
    columns: Vec<SymbolTable>,
}

impl CategoricalEncoder {
    /// Create an encoder without column slots
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an encoder with `columns` empty slots
    pub fn with_columns(columns: usize) -> Self {
        let mut encoder = Self::new();
        encoder.ensure_columns(columns);
        encoder
    }

    /// Grow to at least `columns` slots; existing tables are kept
    pub fn ensure_columns(&mut self, columns: usize) {
        if self.columns.len() < columns {
            self.columns.resize_with(columns, SymbolTable::new);
        }
    }

    /// Number of column slots
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Symbol table of a column, if allocated
    pub fn column(&self, column: usize) -> Option<&SymbolTable> {
        self.columns.get(column)
    }

    /// Encode one token of `column`
    ///
    /// Numeric tokens are returned unchanged. Any other token gets the code of
    /// its first-seen position in the column, starting at 1. Classification
    /// is done per token, so a column may mix numbers and codes.
    #[allow(clippy::cast_precision_loss)]
    pub fn encode(&mut self, column: usize, raw: &str) -> f64 {
        if let Some(number) = parse_number(raw) {
            return number;
        }

        self.ensure_columns(column + 1);
        self.columns[column].code_or_insert(raw) as f64
    }

    /// Encode one raw field; missing fields become `0.0`
    pub fn encode_field(&mut self, column: usize, field: &RawField) -> f64 {
        match field {
            RawField::Number(value) => *value,
            RawField::Text(text) => self.encode(column, text),
            RawField::Missing => 0.0,
        }
    }
}

/// Parse a token as a real number, ignoring surrounding whitespace
pub fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok()
}

/// Shared ownership handle to one encoder
///
/// Cursors hold a handle rather than an encoder so that composed streams can
/// share one table instance. Cloning the handle shares the table; use
/// [`EncoderHandle::detached`] for an independent copy.
#[derive(Debug, Clone, Default)]
pub struct EncoderHandle {
    inner: Arc<Mutex<CategoricalEncoder>>,
}

impl EncoderHandle {
    /// Create a handle to a fresh encoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap an existing encoder
    pub fn from_encoder(encoder: CategoricalEncoder) -> Self {
        Self {
            inner: Arc::new(Mutex::new(encoder)),
        }
    }

    /// Lock the encoder for a sequence of calls
    ///
    /// The tables are append-only, so a poisoned lock still guards a
    /// consistent state and is recovered.
    pub fn lock(&self) -> MutexGuard<'_, CategoricalEncoder> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Encode one token through the shared encoder
    pub fn encode(&self, column: usize, raw: &str) -> f64 {
        self.lock().encode(column, raw)
    }

    /// Copy the current tables into a new, unshared handle
    pub fn detached(&self) -> Self {
        Self::from_encoder(self.lock().clone())
    }

    /// Whether two handles refer to the same encoder
    pub fn shares_with(&self, other: &EncoderHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_first_seen_codes() {
        let mut encoder = CategoricalEncoder::with_columns(1);

        assert_eq!(encoder.encode(0, "red"), 1.0);
        assert_eq!(encoder.encode(0, "blue"), 2.0);
        assert_eq!(encoder.encode(0, "red"), 1.0);
        assert_eq!(encoder.encode(0, "green"), 3.0);

        let table = encoder.column(0).unwrap();
        assert_eq!(table.values().collect::<Vec<_>>(), vec!["red", "blue", "green"]);
        assert_eq!(table.value(2), Some("blue"));
        assert_eq!(table.value(0), None);
    }

    #[test]
    fn test_columns_are_independent() {
        let mut encoder = CategoricalEncoder::with_columns(2);

        assert_eq!(encoder.encode(0, "a"), 1.0);
        assert_eq!(encoder.encode(1, "b"), 1.0);
        assert_eq!(encoder.encode(1, "a"), 2.0);
        assert_eq!(encoder.encode(0, "b"), 2.0);
    }

    #[test]
    fn test_mixed_column_classifies_each_token() {
        let mut encoder = CategoricalEncoder::new();

        assert_eq!(encoder.encode(0, "7"), 7.0);
        assert_eq!(encoder.encode(0, "n/a"), 1.0);
        assert_eq!(encoder.encode(0, " 2.5 "), 2.5);
        assert_eq!(encoder.column(0).unwrap().len(), 1);
    }

    #[test]
    fn test_unallocated_column_grows() {
        let mut encoder = CategoricalEncoder::with_columns(1);

        assert_eq!(encoder.encode(4, "x"), 1.0);
        assert_eq!(encoder.column_count(), 5);
    }

    #[test]
    fn test_encode_field_missing_is_zero() {
        let mut encoder = CategoricalEncoder::new();

        assert_eq!(encoder.encode_field(0, &RawField::Missing), 0.0);
        assert_eq!(encoder.encode_field(0, &RawField::Number(-3.5)), -3.5);
        assert_eq!(encoder.encode_field(0, &RawField::Text("x".into())), 1.0);
    }

    #[test]
    fn test_shared_handle() {
        let shared = EncoderHandle::new();
        let other = shared.clone();
        let detached = shared.detached();

        assert_eq!(shared.encode(0, "x"), 1.0);
        assert_eq!(other.encode(0, "y"), 2.0);
        assert_eq!(shared.encode(0, "y"), 2.0);
        assert_eq!(detached.encode(0, "y"), 1.0);
        assert!(shared.shares_with(&other));
        assert!(!shared.shares_with(&detached));
    }

    proptest! {
        #[test]
        fn prop_numeric_passthrough(n in proptest::num::f64::NORMAL | proptest::num::f64::ZERO, noise in proptest::collection::vec("[b-h]{1,4}", 0..8)) {
            let mut encoder = CategoricalEncoder::new();
            for token in &noise {
                encoder.encode(0, token);
            }
            prop_assert_eq!(encoder.encode(0, &n.to_string()), n);
        }

        #[test]
        fn prop_codes_are_stable(tokens in proptest::collection::vec("[b-h]{1,3}", 1..40)) {
            let mut encoder = CategoricalEncoder::new();
            let first: Vec<f64> = tokens.iter().map(|t| encoder.encode(0, t)).collect();
            let second: Vec<f64> = tokens.iter().map(|t| encoder.encode(0, t)).collect();
            prop_assert_eq!(&first, &second);

            for (i, a) in tokens.iter().enumerate() {
                for (j, b) in tokens.iter().enumerate() {
                    let first_a = tokens.iter().position(|t| t == a).unwrap();
                    let first_b = tokens.iter().position(|t| t == b).unwrap();
                    if first_a < first_b {
                        prop_assert!(first[i] < first[j]);
                    }
                }
            }
        }
    }
}
