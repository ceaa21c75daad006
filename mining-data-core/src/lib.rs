//! Vector streaming and attribute encoding for data mining
//!
//! This crate turns the native records of heterogeneous sources into
//! fixed-width numeric vectors. A [`StreamCursor`] drives one
//! [`PhysicalRecordSource`] lazily, recognizing its schema on first use and
//! encoding non-numeric tokens through a [`CategoricalEncoder`]. Composers
//! merge several cursors into one stream while sharing a single encoder.

#![warn(missing_docs)]

pub mod compose;
pub mod cursor;
pub mod encoder;
pub mod error;
pub mod schema;
pub mod settings;
pub mod source;
pub mod stream;
pub mod vector;

// Re-export key types for convenience
pub use compose::{HorizontalComposer, VerticalComposer};
pub use cursor::{CursorState, StreamCursor};
pub use encoder::{CategoricalEncoder, EncoderHandle, SymbolTable};
pub use error::{Error, Result};
pub use schema::{
    AttributeAssignment, AttributeCatalog, AttributeKind, LogicalAttribute, LogicalSchema,
    PhysicalAttribute, StorageType,
};
pub use settings::ParsingSettings;
pub use source::{MemorySource, PhysicalRecordSource, RawField, RawRow};
pub use stream::{MiningStream, Vectors};
pub use vector::MiningVector;
