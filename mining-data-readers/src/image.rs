//! Image directory source
//!
//! Every image file in a directory is one record; its fields are the
//! grayscale intensities of the pixels in row-major order.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use mining_data_core::{AttributeKind, Error, PhysicalRecordSource, RawField, RawRow, Result};

/// Image format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    /// JPEG format
    Jpeg,
    /// PNG format
    Png,
    /// BMP format
    Bmp,
    /// GIF format
    Gif,
    /// TIFF format
    Tiff,
    /// WebP format
    WebP,
    /// Unknown format
    Unknown,
}

impl ImageFormat {
    /// Detect image format from file extension
    pub fn from_extension(extension: &str) -> Self {
        match extension.to_lowercase().as_str() {
            "jpg" | "jpeg" => ImageFormat::Jpeg,
            "png" => ImageFormat::Png,
            "bmp" => ImageFormat::Bmp,
            "gif" => ImageFormat::Gif,
            "tiff" | "tif" => ImageFormat::Tiff,
            "webp" => ImageFormat::WebP,
            _ => ImageFormat::Unknown,
        }
    }

    /// Detect image format from a file path
    pub fn from_path(path: &Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map_or(ImageFormat::Unknown, Self::from_extension)
    }

    /// Whether images of this format can be decoded
    pub fn is_supported(self) -> bool {
        self != ImageFormat::Unknown
    }
}

/// Directory of images, one record per file in file-name order
#[derive(Debug)]
pub struct ImageDirectorySource {
    dir: PathBuf,
    origin: String,
    files: Option<Vec<PathBuf>>,
    next: usize,
}

impl ImageDirectorySource {
    /// Create a source over a directory
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref().to_path_buf();
        Self {
            origin: dir.display().to_string(),
            dir,
            files: None,
            next: 0,
        }
    }

    /// Directory being read
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Image files found on open
    pub fn files(&self) -> Option<&[PathBuf]> {
        self.files.as_deref()
    }

    fn list(&self) -> Result<Vec<PathBuf>> {
        let entries = fs::read_dir(&self.dir).map_err(|err| Error::unavailable(&self.origin, err))?;

        let mut files = Vec::new();
        for entry in entries {
            let path = entry.map_err(|err| Error::unavailable(&self.origin, err))?.path();
            if path.is_file() && ImageFormat::from_path(&path).is_supported() {
                files.push(path);
            }
        }
        files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        Ok(files)
    }

    fn decode(&self, path: &Path) -> Result<RawRow> {
        let image = image::open(path)
            .map_err(|err| Error::read(&self.origin, format!("{}: {err}", path.display())))?
            .to_luma8();

        trace!(file = %path.display(), width = image.width(), height = image.height(), "decoded image");
        Ok(image
            .pixels()
            .map(|pixel| RawField::Number(f64::from(pixel.0[0])))
            .collect())
    }

    fn file_at(&self, index: usize) -> Result<Option<&PathBuf>> {
        let files = self
            .files
            .as_ref()
            .ok_or_else(|| Error::InvalidOperation(format!("{} is not open", self.origin)))?;
        Ok(files.get(index))
    }
}

impl PhysicalRecordSource for ImageDirectorySource {
    fn origin(&self) -> &str {
        &self.origin
    }

    fn open(&mut self) -> Result<()> {
        if self.files.is_some() {
            return Ok(());
        }
        let files = self.list()?;
        debug!(origin = %self.origin, images = files.len(), "image source open");
        self.files = Some(files);
        self.next = 0;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.files = None;
        self.next = 0;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.files.is_some()
    }

    fn rewind(&mut self) -> Result<()> {
        if self.files.is_none() {
            return self.open();
        }
        self.next = 0;
        Ok(())
    }

    fn attribute_kind(&self) -> AttributeKind {
        AttributeKind::Image
    }

    fn peek_schema_row(&mut self) -> Result<Option<RawRow>> {
        match self.file_at(self.next)? {
            Some(path) => self.decode(path).map(Some),
            None => Ok(None),
        }
    }

    /// The file is consumed even when it fails to decode, so a caller can
    /// skip it and continue with the next image.
    ///
    /// A skipped file takes no record index. Images after it are therefore
    /// numbered one lower on a sequential pass than their position in the
    /// directory, and a seek that replays from the start stops with the same
    /// read error at that file instead of reaching them.
    fn read_next(&mut self) -> Result<Option<RawRow>> {
        let Some(path) = self.file_at(self.next)?.cloned() else {
            return Ok(None);
        };
        self.next += 1;
        self.decode(&path).map(Some)
    }

    fn duplicate(&self) -> Result<Box<dyn PhysicalRecordSource>> {
        Ok(Box::new(Self::new(&self.dir)))
    }
}
