use regex::Regex;
use std::path::{Path, PathBuf};

use crate::error::DiscoveryError;

/// Glob matching JS config modules
pub const SOURCE_GLOB: &str = "s-*.js";
/// Glob matching JSON config files
pub const DATA_GLOB: &str = "s-*.json";

/// On-disk representation of a config file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigFormat {
    /// JS module exporting the config value
    Source,
    /// Plain JSON
    Data,
}

impl ConfigFormat {
    /// Detect the format from a file extension.
    ///
    /// Only `.json` is data; every other extension is read as a module.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ConfigFormat::Data,
            _ => ConfigFormat::Source,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ConfigFormat::Source => "js",
            ConfigFormat::Data => "json",
        }
    }

    pub fn complement(self) -> Self {
        match self {
            ConfigFormat::Source => ConfigFormat::Data,
            ConfigFormat::Data => ConfigFormat::Source,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ConfigFormat::Source => "JS",
            ConfigFormat::Data => "JSON",
        }
    }
}

/// A discovered config file, relative to the run root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFileRef {
    pub relative_path: PathBuf,
    pub format: ConfigFormat,
}

impl ConfigFileRef {
    pub fn new(relative_path: impl Into<PathBuf>) -> Self {
        let relative_path = relative_path.into();
        let format = ConfigFormat::from_path(&relative_path);
        Self {
            relative_path,
            format,
        }
    }

    /// Same directory and base name, extension swapped to the complement format.
    pub fn output_path(&self) -> PathBuf {
        self.relative_path
            .with_extension(self.format.complement().extension())
    }
}

/// File-name glob compiled to an anchored regex.
///
/// Supports `*` (any run of characters) and `?` (one character); everything
/// else matches literally.
#[derive(Debug, Clone)]
pub struct NamePattern {
    glob: String,
    regex: Regex,
}

impl NamePattern {
    pub fn new(glob: &str) -> Result<Self, DiscoveryError> {
        let mut pattern = String::with_capacity(glob.len() + 8);
        pattern.push('^');
        for c in glob.chars() {
            match c {
                '*' => pattern.push_str("[^/]*"),
                '?' => pattern.push_str("[^/]"),
                _ => pattern.push_str(&regex::escape(&c.to_string())),
            }
        }
        pattern.push('$');

        let regex = Regex::new(&pattern).map_err(|source| DiscoveryError::Pattern {
            pattern: glob.to_string(),
            source,
        })?;

        Ok(Self {
            glob: glob.to_string(),
            regex,
        })
    }

    pub fn matches(&self, file_name: &str) -> bool {
        self.regex.is_match(file_name)
    }

    pub fn as_str(&self) -> &str {
        &self.glob
    }
}
