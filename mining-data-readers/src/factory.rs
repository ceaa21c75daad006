//! Factory selecting the source kind at construction time

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use mining_data_core::{
    EncoderHandle, Error, HorizontalComposer, ParsingSettings, PhysicalRecordSource, Result,
    StreamCursor, VerticalComposer,
};

use crate::csv::{CsvSource, CsvSourceOptions};
use crate::image::ImageDirectorySource;
use crate::table::{TableDriver, TableSource};

/// Kind of record source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Delimited text file
    DelimitedText,
    /// Directory of image files
    ImageDirectory,
    /// Relational table
    Table,
}

impl SourceKind {
    /// Detect the kind of a path: directories hold images, `.csv`, `.tsv`
    /// and `.txt` files hold delimited text
    pub fn detect(path: &Path) -> Option<Self> {
        if path.is_dir() {
            return Some(SourceKind::ImageDirectory);
        }

        let extension = path.extension()?.to_str()?.to_lowercase();
        match extension.as_str() {
            "csv" | "tsv" | "txt" => Some(SourceKind::DelimitedText),
            _ => None,
        }
    }
}

/// Creates fresh record sources of one configured kind
#[derive(Clone)]
pub enum SourceFactory {
    /// Delimited text file
    DelimitedText {
        /// File path
        path: PathBuf,
        /// Parsing and memory-map options
        options: CsvSourceOptions,
    },
    /// Directory of images
    ImageDirectory {
        /// Directory path
        dir: PathBuf,
    },
    /// Table behind a driver
    Table {
        /// Driver opening the table
        driver: Arc<dyn TableDriver>,
    },
}

impl SourceFactory {
    /// Select a source kind from the path
    ///
    /// `.tsv` files default to a tab delimiter when the settings still carry
    /// the default comma.
    pub fn detect<P: AsRef<Path>>(path: P, settings: &ParsingSettings) -> Result<Self> {
        let path = path.as_ref();
        let kind = SourceKind::detect(path).ok_or_else(|| {
            if path.exists() {
                Error::InvalidArgument(format!("unrecognized source kind: {}", path.display()))
            } else {
                Error::unavailable(path.display().to_string(), "no such file or directory")
            }
        })?;

        debug!(path = %path.display(), ?kind, "detected source kind");
        Ok(match kind {
            SourceKind::ImageDirectory => SourceFactory::ImageDirectory {
                dir: path.to_path_buf(),
            },
            _ => {
                let mut settings = settings.clone();
                let is_tsv = path
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("tsv"));
                if is_tsv && settings.delimiter == ',' {
                    settings.delimiter = '\t';
                }
                SourceFactory::DelimitedText {
                    path: path.to_path_buf(),
                    options: CsvSourceOptions {
                        settings,
                        memory_map: false,
                    },
                }
            }
        })
    }

    /// Factory for a table driver
    pub fn table(driver: Arc<dyn TableDriver>) -> Self {
        SourceFactory::Table { driver }
    }

    /// Memory-map delimited text files; no effect on other kinds
    #[must_use]
    pub fn memory_mapped(mut self, enabled: bool) -> Self {
        if let SourceFactory::DelimitedText { options, .. } = &mut self {
            options.memory_map = enabled;
        }
        self
    }

    /// Kind of source this factory creates
    pub fn kind(&self) -> SourceKind {
        match self {
            SourceFactory::DelimitedText { .. } => SourceKind::DelimitedText,
            SourceFactory::ImageDirectory { .. } => SourceKind::ImageDirectory,
            SourceFactory::Table { .. } => SourceKind::Table,
        }
    }

    /// Create a new closed source
    pub fn create_source(&self) -> Box<dyn PhysicalRecordSource> {
        match self {
            SourceFactory::DelimitedText { path, options } => {
                Box::new(CsvSource::with_options(path, options.clone()))
            }
            SourceFactory::ImageDirectory { dir } => Box::new(ImageDirectorySource::new(dir)),
            SourceFactory::Table { driver } => Box::new(TableSource::new(Arc::clone(driver))),
        }
    }

    /// Create a new closed cursor over a fresh source
    pub fn cursor(&self) -> StreamCursor {
        StreamCursor::new(self.create_source())
    }
}

impl fmt::Debug for SourceFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceFactory::DelimitedText { path, options } => f
                .debug_struct("DelimitedText")
                .field("path", path)
                .field("options", options)
                .finish(),
            SourceFactory::ImageDirectory { dir } => {
                f.debug_struct("ImageDirectory").field("dir", dir).finish()
            }
            SourceFactory::Table { driver } => {
                f.debug_struct("Table").field("driver", &driver.describe()).finish()
            }
        }
    }
}

fn cursors<P: AsRef<Path>>(paths: &[P], settings: &ParsingSettings) -> Result<Vec<StreamCursor>> {
    paths
        .iter()
        .map(|path| SourceFactory::detect(path, settings).map(|factory| factory.cursor()))
        .collect()
}

/// Place the files given by `paths` side by side, sharing one encoder
pub fn vertical_from_paths<P: AsRef<Path>>(
    paths: &[P],
    settings: &ParsingSettings,
) -> Result<VerticalComposer> {
    VerticalComposer::with_encoder(cursors(paths, settings)?, EncoderHandle::new())
}

/// Chain the files given by `paths` one after another, sharing one encoder
pub fn horizontal_from_paths<P: AsRef<Path>>(
    paths: &[P],
    settings: &ParsingSettings,
) -> Result<HorizontalComposer> {
    HorizontalComposer::with_encoder(cursors(paths, settings)?, EncoderHandle::new())
}
