use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use crate::error::WriteError;
use crate::format::ConfigFormat;
use crate::value::GenericValue;

/// Widest indentation the serializer accepts, like `JSON.stringify`
pub const MAX_INDENT_SPACES: usize = 10;

/// Header written before the exported value in JS modules
const MODULE_PREFIX: &str = "\"use strict\";\n\nmodule.exports =\n";

/// Indentation unit used per nesting level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndentSpec {
    Spaces(usize),
    Tab,
}

impl Default for IndentSpec {
    fn default() -> Self {
        IndentSpec::Spaces(2)
    }
}

impl IndentSpec {
    /// Pick the indentation from CLI-style inputs; tabs win over spaces.
    pub fn from_options(spaces: Option<usize>, tabs: bool) -> Self {
        if tabs {
            IndentSpec::Tab
        } else {
            spaces.map_or_else(IndentSpec::default, IndentSpec::Spaces)
        }
    }

    fn unit(self) -> String {
        match self {
            IndentSpec::Spaces(n) => " ".repeat(n.min(MAX_INDENT_SPACES)),
            IndentSpec::Tab => "\t".to_string(),
        }
    }
}

/// Serialize `value` as JSON text using `indent`.
///
/// Zero spaces produces compact single-line output.
pub fn to_json_string(value: &GenericValue, indent: IndentSpec) -> serde_json::Result<String> {
    let unit = indent.unit();
    if unit.is_empty() {
        return serde_json::to_string(value);
    }

    let mut buf = Vec::new();
    let formatter = PrettyFormatter::with_indent(unit.as_bytes());
    let mut ser = Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;
    // serde_json only emits valid UTF-8
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Render the full file content for `format`.
pub fn render_config(
    value: &GenericValue,
    format: ConfigFormat,
    indent: IndentSpec,
) -> serde_json::Result<String> {
    let json = to_json_string(value, indent)?;
    Ok(match format {
        ConfigFormat::Data => json,
        ConfigFormat::Source => format!("{MODULE_PREFIX}{json};"),
    })
}

/// Serialize `value` into the format implied by `path` and write it atomically.
pub fn write_config(path: &Path, value: &GenericValue, indent: IndentSpec) -> Result<(), WriteError> {
    let content = render_config(value, ConfigFormat::from_path(path), indent).map_err(|source| {
        WriteError::Serialize {
            path: path.to_path_buf(),
            source,
        }
    })?;
    write_atomic(path, content.as_bytes())
}

/// Write to a temp file next to `path`, then rename it over `path`.
///
/// Permissions of an existing target are carried over.
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<(), WriteError> {
    let temp_name = format!(
        ".{}.{}.tmp",
        path.file_name()
            .map(|n| n.to_string_lossy())
            .unwrap_or_default(),
        std::process::id()
    );
    let temp_path = path.with_file_name(temp_name);

    let result = replace_via(&temp_path, path, content);
    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

fn replace_via(temp_path: &Path, path: &Path, content: &[u8]) -> Result<(), WriteError> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(temp_path)
        .map_err(|e| WriteError::io(temp_path, e))?;
    file.write_all(content)
        .map_err(|e| WriteError::io(temp_path, e))?;
    file.sync_all().map_err(|e| WriteError::io(temp_path, e))?;

    if let Ok(meta) = fs::metadata(path) {
        fs::set_permissions(temp_path, meta.permissions())
            .map_err(|e| WriteError::io(temp_path, e))?;
    }

    fs::rename(temp_path, path).map_err(|e| WriteError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_default_two_space_json() {
        let value = json!({"a": 1, "b": [1, 2]});
        let out = render_config(&value, ConfigFormat::Data, IndentSpec::default()).unwrap();
        assert_eq!(out, "{\n  \"a\": 1,\n  \"b\": [\n    1,\n    2\n  ]\n}");
    }

    #[test]
    fn test_tab_indentation() {
        let value = json!({"a": {"b": true}});
        let out = render_config(&value, ConfigFormat::Data, IndentSpec::Tab).unwrap();
        assert_eq!(out, "{\n\t\"a\": {\n\t\t\"b\": true\n\t}\n}");
    }

    #[test]
    fn test_four_spaces() {
        let value = json!({"a": null});
        let out = render_config(&value, ConfigFormat::Data, IndentSpec::Spaces(4)).unwrap();
        assert_eq!(out, "{\n    \"a\": null\n}");
    }

    #[test]
    fn test_zero_spaces_is_compact() {
        let value = json!({"a": [1, "x"]});
        let out = render_config(&value, ConfigFormat::Data, IndentSpec::Spaces(0)).unwrap();
        assert_eq!(out, r#"{"a":[1,"x"]}"#);
    }

    #[test]
    fn test_spaces_clamped() {
        let value = json!([1]);
        let out = render_config(&value, ConfigFormat::Data, IndentSpec::Spaces(40)).unwrap();
        assert_eq!(out, format!("[\n{}1\n]", " ".repeat(MAX_INDENT_SPACES)));
    }

    #[test]
    fn test_empty_containers_stay_inline() {
        let value = json!({"a": {}, "b": []});
        let out = render_config(&value, ConfigFormat::Data, IndentSpec::default()).unwrap();
        assert_eq!(out, "{\n  \"a\": {},\n  \"b\": []\n}");
    }

    #[test]
    fn test_module_rendering() {
        let value = json!({"c": true});
        let out = render_config(&value, ConfigFormat::Source, IndentSpec::default()).unwrap();
        assert_eq!(out, "\"use strict\";\n\nmodule.exports =\n{\n  \"c\": true\n};");
    }

    #[test]
    fn test_tabs_override_spaces() {
        assert_eq!(IndentSpec::from_options(Some(4), true), IndentSpec::Tab);
        assert_eq!(IndentSpec::from_options(Some(4), false), IndentSpec::Spaces(4));
        assert_eq!(IndentSpec::from_options(None, false), IndentSpec::Spaces(2));
    }

    #[test]
    fn test_write_config_by_extension() {
        let dir = TempDir::new().unwrap();
        let value = json!({"k": "v"});

        let json_path = dir.path().join("s-a.json");
        write_config(&json_path, &value, IndentSpec::default()).unwrap();
        assert_eq!(fs::read_to_string(&json_path).unwrap(), "{\n  \"k\": \"v\"\n}");

        let js_path = dir.path().join("s-a.js");
        write_config(&js_path, &value, IndentSpec::default()).unwrap();
        assert!(fs::read_to_string(&js_path)
            .unwrap()
            .starts_with("\"use strict\";\n\nmodule.exports =\n{"));
    }

    #[test]
    fn test_write_atomic_replaces_and_leaves_no_temp() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s-a.json");
        fs::write(&path, "old").unwrap();

        write_atomic(&path, b"new").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "new");
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_write_into_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("s-a.json");

        let err = write_atomic(&path, b"{}").unwrap_err();
        assert!(matches!(err, WriteError::Io { .. }));
    }
}
