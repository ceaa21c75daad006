//! Record sources for mining streams
//!
//! This crate provides the concrete source kinds behind
//! [`mining_data_core::PhysicalRecordSource`]: delimited text files, image
//! directories and relational tables, plus a factory choosing between them.

#![warn(missing_docs)]

pub mod csv;
pub mod factory;
pub mod image;
pub mod table;

pub use crate::csv::{CsvSource, CsvSourceOptions};
pub use crate::image::{ImageDirectorySource, ImageFormat};
pub use factory::{horizontal_from_paths, vertical_from_paths, SourceFactory, SourceKind};
#[cfg(feature = "database")]
pub use table::SqlTableDriver;
pub use table::{InMemoryTable, TableCursor, TableDriver, TableSource};

// Re-export core types
pub use mining_data_core::{
    Error, MiningStream, MiningVector, ParsingSettings, PhysicalRecordSource, RawField, RawRow,
    Result, StreamCursor,
};
