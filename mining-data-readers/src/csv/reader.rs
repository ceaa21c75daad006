//! Delimited text source implementation

use std::fs::File;
use std::io::{BufReader, Cursor, Read};
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord};
use memmap2::Mmap;
use tracing::debug;

use mining_data_core::{
    Error, ParsingSettings, PhysicalRecordSource, RawField, RawRow, Result,
};

const BUFFER_SIZE: usize = 64 * 1024;

type Input = Box<dyn Read + Send>;

/// Options for opening a delimited text file
#[derive(Debug, Clone, Default)]
pub struct CsvSourceOptions {
    /// Delimiter, header and skip settings
    pub settings: ParsingSettings,

    /// Whether to memory-map the file instead of buffering reads
    pub memory_map: bool,
}

/// Delimited text file read one row at a time
///
/// A declared header row is consumed on open and served from
/// [`PhysicalRecordSource::peek_schema_row`]; `skip_lines` further rows are
/// discarded after it. Rows may have any width.
pub struct CsvSource {
    path: PathBuf,
    origin: String,
    options: CsvSourceOptions,
    reader: Option<csv::Reader<Input>>,
    header: Option<Vec<String>>,
    pending: Option<RawRow>,
    record: StringRecord,
}

impl CsvSource {
    /// Create a source over a file
    pub fn new<P: AsRef<Path>>(path: P, settings: ParsingSettings) -> Self {
        Self::with_options(
            path,
            CsvSourceOptions {
                settings,
                memory_map: false,
            },
        )
    }

    /// Create a source with explicit options
    pub fn with_options<P: AsRef<Path>>(path: P, options: CsvSourceOptions) -> Self {
        let path = path.as_ref().to_path_buf();
        Self {
            origin: path.display().to_string(),
            path,
            options,
            reader: None,
            header: None,
            pending: None,
            record: StringRecord::new(),
        }
    }

    /// Path of the file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parsing settings in effect
    pub fn settings(&self) -> &ParsingSettings {
        &self.options.settings
    }

    fn input(&self) -> Result<Input> {
        let file = File::open(&self.path).map_err(|err| Error::unavailable(&self.origin, err))?;

        if self.options.memory_map {
            let len = file
                .metadata()
                .map_err(|err| Error::unavailable(&self.origin, err))?
                .len();
            // Zero-length files cannot be mapped
            if len > 0 {
                // SAFETY: the map is read-only and dropped with the reader.
                #[allow(unsafe_code)]
                let mmap = unsafe { Mmap::map(&file) }
                    .map_err(|err| Error::unavailable(&self.origin, err))?;
                return Ok(Box::new(Cursor::new(mmap)));
            }
        }

        Ok(Box::new(BufReader::with_capacity(BUFFER_SIZE, file)))
    }

    fn read_row(&mut self) -> Result<Option<RawRow>> {
        let Some(reader) = self.reader.as_mut() else {
            return Err(Error::InvalidOperation(format!("{} is not open", self.origin)));
        };

        let more = reader
            .read_record(&mut self.record)
            .map_err(|err| Error::read(&self.origin, err))?;

        if !more {
            return Ok(None);
        }

        Ok(Some(self.record.iter().map(RawField::from_token).collect()))
    }
}

impl PhysicalRecordSource for CsvSource {
    fn origin(&self) -> &str {
        &self.origin
    }

    fn open(&mut self) -> Result<()> {
        if self.reader.is_some() {
            return Ok(());
        }

        let settings = &self.options.settings;
        let delimiter = settings.delimiter_byte()?;
        let mut reader = ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .from_reader(self.input()?);

        let mut record = StringRecord::new();
        let header = if settings.has_header {
            let found = reader
                .read_record(&mut record)
                .map_err(|err| Error::read(&self.origin, err))?;
            found.then(|| record.iter().map(str::to_string).collect())
        } else {
            None
        };

        let mut skipped = 0;
        while skipped < settings.skip_lines {
            let found = reader
                .read_record(&mut record)
                .map_err(|err| Error::read(&self.origin, err))?;
            if !found {
                break;
            }
            skipped += 1;
        }

        debug!(origin = %self.origin, memory_map = self.options.memory_map, skipped, "csv source open");
        self.reader = Some(reader);
        self.header = header;
        self.pending = None;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.reader = None;
        self.header = None;
        self.pending = None;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.reader.is_some()
    }

    fn has_header(&self) -> bool {
        self.options.settings.has_header
    }

    fn peek_schema_row(&mut self) -> Result<Option<RawRow>> {
        if self.reader.is_none() {
            return Err(Error::InvalidOperation(format!("{} is not open", self.origin)));
        }

        if self.has_header() {
            return Ok(self
                .header
                .as_ref()
                .map(|names| names.iter().map(|name| RawField::Text(name.clone())).collect()));
        }

        if self.pending.is_none() {
            self.pending = self.read_row()?;
        }
        Ok(self.pending.clone())
    }

    fn read_next(&mut self) -> Result<Option<RawRow>> {
        if let Some(row) = self.pending.take() {
            return Ok(Some(row));
        }
        self.read_row()
    }

    fn duplicate(&self) -> Result<Box<dyn PhysicalRecordSource>> {
        Ok(Box::new(Self::with_options(&self.path, self.options.clone())))
    }
}

impl std::fmt::Debug for CsvSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvSource")
            .field("path", &self.path)
            .field("options", &self.options)
            .field("open", &self.reader.is_some())
            .finish()
    }
}
