//! Consumer-facing stream interface shared by cursors and composers

use std::sync::Arc;

use crate::error::Result;
use crate::schema::AttributeCatalog;
use crate::vector::MiningVector;

/// A lazy, forward-only sequence of mining vectors with simulated random access
///
/// Consumers use this trait without knowing whether the vectors come from a
/// file, an image directory, a table or a composition of several sources.
pub trait MiningStream: Send {
    /// Open the stream; no-op when already open
    fn open(&mut self) -> Result<()>;

    /// Close the stream and release every underlying handle
    fn close(&mut self) -> Result<()>;

    /// Rewind to before the first record, opening the stream if needed
    fn reset(&mut self) -> Result<()>;

    /// Whether the stream is open
    fn is_open(&self) -> bool;

    /// Index of the last vector returned, 0 before the first one
    fn position(&self) -> usize;

    /// The vector at [`MiningStream::position`], if any
    fn current_vector(&self) -> Option<MiningVector>;

    /// The attribute catalog, recognizing the schema if needed
    fn catalog(&mut self) -> Result<Arc<AttributeCatalog>>;

    /// Next vector, or `None` once the stream is exhausted
    fn next_vector(&mut self) -> Result<Option<MiningVector>>;

    /// Count every record by a full pass, then return to the current position
    fn total_record_count(&mut self) -> Result<usize>;

    /// Vector with the 1-based index `target`, or `None` when out of range
    ///
    /// Backward targets reset the stream and replay forward, so the cost is
    /// O(target) for a backward seek and O(target - position) otherwise.
    fn record_at(&mut self, target: usize) -> Result<Option<MiningVector>> {
        if target == 0 {
            return Ok(None);
        }

        if target == self.position() {
            if let Some(vector) = self.current_vector() {
                return Ok(Some(vector));
            }
        }

        if target <= self.position() {
            self.reset()?;
        }

        while let Some(vector) = self.next_vector()? {
            if self.position() >= target {
                return Ok(Some(vector));
            }
        }

        Ok(None)
    }

    /// Iterate over the remaining vectors
    fn vectors(&mut self) -> Vectors<'_, Self>
    where
        Self: Sized,
    {
        Vectors { stream: self }
    }
}

/// Iterator over the remaining vectors of a stream
pub struct Vectors<'a, S: ?Sized> {
    stream: &'a mut S,
}

impl<'a, S: MiningStream + ?Sized> Vectors<'a, S> {
    /// Iterate over a stream, including trait objects
    pub fn new(stream: &'a mut S) -> Self {
        Self { stream }
    }
}

impl<S: MiningStream + ?Sized> Iterator for Vectors<'_, S> {
    type Item = Result<MiningVector>;

    fn next(&mut self) -> Option<Self::Item> {
        self.stream.next_vector().transpose()
    }
}
