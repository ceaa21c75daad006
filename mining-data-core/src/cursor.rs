//! Stream cursor: turns one physical record source into a lazy vector sequence
//!
//! Lifecycle:
//!
//! ```text
//! Closed --open--> Recognizing --schema built--> Open
//! Closed --open--> Open                (catalog already known)
//! Open   --reset--> Open               (position := 0, source rewound)
//! Open   --close--> Closed
//! ```
//!
//! Recognition runs once, lazily, on the first open. Its failures propagate
//! and leave the cursor closed.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::encoder::EncoderHandle;
use crate::error::{Error, Result};
use crate::schema::AttributeCatalog;
use crate::source::{PhysicalRecordSource, RawField};
use crate::stream::MiningStream;
use crate::vector::MiningVector;

/// Lifecycle state of a cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorState {
    /// No handle held
    Closed,
    /// Schema discovery in progress
    Recognizing,
    /// Ready to produce vectors
    Open,
}

/// Sequences one [`PhysicalRecordSource`] into [`MiningVector`]s
pub struct StreamCursor {
    source: Box<dyn PhysicalRecordSource>,
    state: CursorState,
    position: usize,
    current: Option<MiningVector>,
    catalog: Option<Arc<AttributeCatalog>>,
    encoder: EncoderHandle,
}

impl StreamCursor {
    /// Create a cursor that recognizes its schema on first open
    pub fn new(source: Box<dyn PhysicalRecordSource>) -> Self {
        Self {
            source,
            state: CursorState::Closed,
            position: 0,
            current: None,
            catalog: None,
            encoder: EncoderHandle::new(),
        }
    }

    /// Create a cursor over a source whose catalog is already known
    pub fn with_catalog(source: Box<dyn PhysicalRecordSource>, catalog: Arc<AttributeCatalog>) -> Self {
        let mut cursor = Self::new(source);
        cursor.encoder.lock().ensure_columns(catalog.len());
        cursor.catalog = Some(catalog);
        cursor
    }

    /// Current lifecycle state
    pub fn state(&self) -> CursorState {
        self.state
    }

    /// Origin of the underlying source
    pub fn origin(&self) -> &str {
        self.source.origin()
    }

    /// Handle to the encoder used by this cursor
    pub fn encoder(&self) -> &EncoderHandle {
        &self.encoder
    }

    /// Replace the encoder, typically with one shared by composed cursors
    pub fn set_encoder(&mut self, encoder: EncoderHandle) {
        if let Some(catalog) = &self.catalog {
            encoder.lock().ensure_columns(catalog.len());
        }
        self.encoder = encoder;
    }

    /// Catalog recognized so far, without triggering recognition
    pub fn known_catalog(&self) -> Option<&Arc<AttributeCatalog>> {
        self.catalog.as_ref()
    }

    /// Drop the catalog and encoder so the next open re-recognizes the source
    pub fn forget_schema(&mut self) -> Result<()> {
        if self.state != CursorState::Closed {
            return Err(Error::InvalidOperation(format!(
                "cannot forget the schema of open cursor over {}",
                self.source.origin()
            )));
        }
        self.catalog = None;
        self.encoder = EncoderHandle::new();
        Ok(())
    }

    /// A closed cursor over a duplicate of the source, reusing the catalog
    ///
    /// The copy starts before the first record and shares the encoder, so
    /// both cursors agree on every categorical code.
    pub fn duplicate(&self) -> Result<Self> {
        Ok(Self {
            source: self.source.duplicate()?,
            state: CursorState::Closed,
            position: 0,
            current: None,
            catalog: self.catalog.clone(),
            encoder: self.encoder.clone(),
        })
    }

    fn recognize(&mut self) -> Result<AttributeCatalog> {
        let row = self.source.peek_schema_row()?;
        let kind = self.source.attribute_kind();

        let catalog = if self.source.has_header() {
            let header = row.ok_or_else(|| {
                Error::Recognition(format!("{} declares a header but is empty", self.source.origin()))
            })?;
            let names: Vec<String> = header.iter().map(header_token).collect();
            AttributeCatalog::from_header(&names, kind)
        } else {
            AttributeCatalog::positional(row.map_or(0, |row| row.len()), kind)
        };

        self.encoder.lock().ensure_columns(catalog.len());
        debug!(
            origin = self.source.origin(),
            attributes = catalog.len(),
            header = self.source.has_header(),
            "recognized schema"
        );
        Ok(catalog)
    }

    fn count_raw_rows(&mut self) -> Result<usize> {
        let mut count = 0;
        while self.source.read_next()?.is_some() {
            count += 1;
        }
        Ok(count)
    }

    fn replay_to(&mut self, position: usize) -> Result<()> {
        self.reset()?;
        if position > 0 {
            self.record_at(position)?;
        }
        Ok(())
    }

    fn require_catalog(&self) -> Result<Arc<AttributeCatalog>> {
        self.catalog.clone().ok_or_else(|| {
            Error::InvalidOperation(format!("{} has no recognized schema", self.source.origin()))
        })
    }
}

fn header_token(field: &RawField) -> String {
    match field {
        RawField::Text(text) => text.clone(),
        RawField::Number(value) => value.to_string(),
        RawField::Missing => String::new(),
    }
}

impl MiningStream for StreamCursor {
    fn open(&mut self) -> Result<()> {
        if self.state == CursorState::Open {
            return Ok(());
        }

        self.source.open()?;

        if self.catalog.is_none() {
            self.state = CursorState::Recognizing;
            match self.recognize() {
                Ok(catalog) => self.catalog = Some(Arc::new(catalog)),
                Err(err) => {
                    if let Err(close_err) = self.source.close() {
                        warn!(origin = self.source.origin(), error = %close_err, "close after failed recognition");
                    }
                    self.state = CursorState::Closed;
                    return Err(err);
                }
            }
        }

        self.position = 0;
        self.current = None;
        self.state = CursorState::Open;
        debug!(origin = self.source.origin(), "cursor open");
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.state == CursorState::Closed {
            return Ok(());
        }

        self.state = CursorState::Closed;
        self.position = 0;
        self.current = None;
        debug!(origin = self.source.origin(), "cursor closed");
        self.source.close()
    }

    fn reset(&mut self) -> Result<()> {
        self.open()?;
        if let Err(err) = self.source.rewind() {
            self.state = CursorState::Closed;
            self.position = 0;
            self.current = None;
            return Err(err);
        }
        self.position = 0;
        self.current = None;
        trace!(origin = self.source.origin(), "cursor reset");
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state == CursorState::Open
    }

    fn position(&self) -> usize {
        self.position
    }

    fn current_vector(&self) -> Option<MiningVector> {
        self.current.clone()
    }

    fn catalog(&mut self) -> Result<Arc<AttributeCatalog>> {
        if self.catalog.is_none() {
            self.open()?;
        }
        self.require_catalog()
    }

    fn next_vector(&mut self) -> Result<Option<MiningVector>> {
        self.open()?;
        let catalog = self.require_catalog()?;

        let Some(row) = self.source.read_next()? else {
            trace!(origin = self.source.origin(), position = self.position, "source exhausted");
            return Ok(None);
        };

        if row.len() != catalog.source_width() {
            warn!(
                origin = self.source.origin(),
                record = self.position + 1,
                fields = row.len(),
                expected = catalog.source_width(),
                "record width differs from schema"
            );
        }

        let values = {
            let mut encoder = self.encoder.lock();
            catalog
                .assignments()
                .iter()
                .enumerate()
                .map(|(column, assignment)| {
                    row.get(assignment.field())
                        .map_or(0.0, |field| encoder.encode_field(column, field))
                })
                .collect()
        };

        self.position += 1;
        let vector = MiningVector::new(values, self.position, catalog.logical().clone());
        trace!(origin = self.source.origin(), index = self.position, "record produced");
        self.current = Some(vector.clone());
        Ok(Some(vector))
    }

    /// A read error during the count is returned only after the cursor is
    /// back at its previous position.
    fn total_record_count(&mut self) -> Result<usize> {
        let back_to = self.position;

        self.reset()?;
        let counted = self.count_raw_rows();
        let restored = self.replay_to(back_to);

        let count = counted?;
        restored?;
        debug!(origin = self.source.origin(), count, "counted records");
        Ok(count)
    }
}

impl Drop for StreamCursor {
    fn drop(&mut self) {
        if let Err(err) = self.source.close() {
            warn!(origin = self.source.origin(), error = %err, "close on drop");
        }
    }
}

impl fmt::Debug for StreamCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamCursor")
            .field("origin", &self.source.origin())
            .field("state", &self.state)
            .field("position", &self.position)
            .field("attributes", &self.catalog.as_ref().map(|c| c.len()))
            .finish()
    }
}
