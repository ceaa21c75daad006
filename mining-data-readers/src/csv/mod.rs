//! Delimited text source
//!
//! Files are read lazily through the `csv` crate, optionally over a memory
//! map, and every row is handed to the cursor as raw tokens.

mod reader;

pub use reader::{CsvSource, CsvSourceOptions};
