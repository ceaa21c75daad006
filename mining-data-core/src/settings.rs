//! Parsing settings for delimited text sources

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Settings consumed by delimited text sources
///
/// Defaults: comma delimiter, no header, no skipped rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParsingSettings {
    /// Field delimiter
    pub delimiter: char,

    /// Whether the first row names the attributes
    pub has_header: bool,

    /// Rows to skip before the first data row (after the header, if any)
    pub skip_lines: usize,
}

impl Default for ParsingSettings {
    fn default() -> Self {
        Self {
            delimiter: ',',
            has_header: false,
            skip_lines: 0,
        }
    }
}

impl ParsingSettings {
    /// Settings with a header row and the default delimiter
    pub fn with_header() -> Self {
        Self {
            has_header: true,
            ..Self::default()
        }
    }

    /// Load settings from a JSON document; missing keys take their defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.delimiter_byte()?;
        Ok(settings)
    }

    /// Load settings from a JSON file
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// The delimiter as a single byte
    pub fn delimiter_byte(&self) -> Result<u8> {
        u8::try_from(self.delimiter)
            .ok()
            .filter(u8::is_ascii)
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "delimiter '{}' is not a single-byte character",
                    self.delimiter
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = ParsingSettings::default();

        assert_eq!(settings.delimiter, ',');
        assert!(!settings.has_header);
        assert_eq!(settings.skip_lines, 0);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let settings = ParsingSettings::from_json_str(r#"{"delimiter": ";", "has_header": true}"#).unwrap();

        assert_eq!(settings.delimiter_byte().unwrap(), b';');
        assert!(settings.has_header);
        assert_eq!(settings.skip_lines, 0);
    }

    #[test]
    fn test_rejects_wide_delimiter() {
        let result = ParsingSettings::from_json_str(r#"{"delimiter": "§"}"#);

        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"skip_lines": 2}}"#).unwrap();

        let settings = ParsingSettings::from_path(file.path()).unwrap();
        assert_eq!(settings.skip_lines, 2);
        assert_eq!(settings.delimiter, ',');
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(ParsingSettings::from_json_str("{"), Err(Error::Config(_))));
    }
}
