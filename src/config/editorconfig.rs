//! .editorconfig indentation lookup, used as the lowest-priority default

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::file::find_file_upward;
use crate::writer::IndentSpec;

/// Indentation settings that apply to one file extension
#[derive(Debug, Default, PartialEq, Eq)]
pub struct EditorConfigSettings {
    pub indent_style: Option<String>,
    pub indent_size: Option<usize>,
}

impl EditorConfigSettings {
    /// Indentation implied by these settings, if any were given
    pub fn indent(&self) -> Option<IndentSpec> {
        match self.indent_style.as_deref() {
            Some("tab") => Some(IndentSpec::Tab),
            Some("space") => Some(IndentSpec::Spaces(self.indent_size.unwrap_or(2))),
            _ => self.indent_size.map(IndentSpec::Spaces),
        }
    }
}

/// Find .editorconfig by searching upward from the given directory.
pub fn find_editorconfig(start_dir: &Path) -> Option<PathBuf> {
    find_file_upward(start_dir, ".editorconfig", false)
}

/// Parse .editorconfig and collect the settings for files ending in `.{extension}`.
///
/// Only `[*]`, `[*.ext]` and `[*.{a,b}]` sections are understood; later
/// sections override earlier ones.
pub fn parse_editorconfig(path: &Path, extension: &str) -> io::Result<EditorConfigSettings> {
    let content = fs::read_to_string(path)?;
    let mut settings = EditorConfigSettings::default();
    let mut in_matching_section = false;

    for line in content.lines() {
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }

        if line.starts_with('[') && line.ends_with(']') {
            in_matching_section = section_matches(&line[1..line.len() - 1], extension);
            continue;
        }

        if !in_matching_section {
            continue;
        }

        if let Some((key, value)) = line.split_once('=') {
            let key = key.trim().to_lowercase();
            let value = value.trim().to_lowercase();

            match key.as_str() {
                "indent_style" => settings.indent_style = Some(value),
                "indent_size" => {
                    // `indent_size = tab` defers to indent_style
                    settings.indent_size = value.parse().ok();
                }
                _ => {}
            }
        }
    }

    Ok(settings)
}

fn section_matches(glob: &str, extension: &str) -> bool {
    if glob == "*" {
        return true;
    }
    let Some(rest) = glob.strip_prefix("*.") else {
        return false;
    };
    match rest.strip_prefix('{').and_then(|r| r.strip_suffix('}')) {
        Some(list) => list.split(',').any(|ext| ext.trim() == extension),
        None => rest == extension,
    }
}
