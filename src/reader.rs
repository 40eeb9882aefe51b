use std::fs;
use std::path::Path;

use crate::engine::ModuleEngine;
use crate::error::ReadError;
use crate::format::ConfigFormat;
use crate::module::evaluate_module_at;
use crate::value::{canonicalize, GenericValue};

/// Load a config file and parse it according to its extension.
///
/// JS modules are evaluated statically, never executed: see
/// [`crate::module`] for the accepted subset.
pub fn read_config(path: &Path) -> Result<GenericValue, ReadError> {
    read_config_with(path, &ModuleEngine::Static)
}

/// Like [`read_config`], evaluating JS modules with `engine`.
pub fn read_config_with(path: &Path, engine: &ModuleEngine) -> Result<GenericValue, ReadError> {
    let content = fs::read_to_string(path).map_err(|source| ReadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    match ConfigFormat::from_path(path) {
        ConfigFormat::Source => {
            engine
                .evaluate(path, &content)
                .map_err(|cause| ReadError::ModuleLoadFailure {
                    path: path.to_path_buf(),
                    cause,
                })
        }
        format => parse_config(path, &content, format),
    }
}

/// Parse already-loaded file content.
///
/// `path` names the file in errors and is the base for `require` in JS
/// modules, which are evaluated statically.
pub fn parse_config(
    path: &Path,
    content: &str,
    format: ConfigFormat,
) -> Result<GenericValue, ReadError> {
    match format {
        ConfigFormat::Data => {
            let content = content.strip_prefix('\u{feff}').unwrap_or(content);
            serde_json::from_str(content)
                .map(canonicalize)
                .map_err(|e| ReadError::MalformedData {
                    path: path.to_path_buf(),
                    cause: e.to_string(),
                })
        }
        ConfigFormat::Source => {
            evaluate_module_at(path, content).map_err(|e| ReadError::ModuleLoadFailure {
                path: path.to_path_buf(),
                cause: e.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_read_json_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s-y.json");
        fs::write(&path, r#"{"c": true, "n": 1.0}"#).unwrap();

        assert_eq!(read_config(&path).unwrap(), json!({"c": true, "n": 1}));
    }

    #[test]
    fn test_read_json_with_bom() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s-y.json");
        fs::write(&path, "\u{feff}{\"c\": 1}").unwrap();

        assert_eq!(read_config(&path).unwrap(), json!({"c": 1}));
    }

    #[test]
    fn test_read_js_module() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s-x.js");
        fs::write(&path, "module.exports = {a: 1, b: [1, 2]};\n").unwrap();

        assert_eq!(read_config(&path).unwrap(), json!({"a": 1, "b": [1, 2]}));
    }

    #[test]
    fn test_malformed_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s-bad.json");
        fs::write(&path, "{\"a\": 1,}").unwrap();

        let err = read_config(&path).unwrap_err();
        assert!(matches!(err, ReadError::MalformedData { .. }));
        assert!(err.to_string().contains("s-bad.json"));
    }

    #[test]
    fn test_module_load_failure() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s-bad.js");
        fs::write(&path, "module.exports = build();").unwrap();

        let err = read_config(&path).unwrap_err();
        assert!(matches!(err, ReadError::ModuleLoadFailure { .. }));
        assert!(err.to_string().contains("build"));
    }

    #[test]
    fn test_read_js_module_with_require() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("common.json"), r#"{"runtime": "nodejs20.x"}"#).unwrap();
        let path = dir.path().join("s-x.js");
        fs::write(&path, "const common = require('./common.json');\nmodule.exports = { ...common, memory: 256 };\n").unwrap();

        assert_eq!(
            read_config(&path).unwrap(),
            json!({"runtime": "nodejs20.x", "memory": 256})
        );
    }

    #[test]
    fn test_json_beyond_double_range_is_malformed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("s-big.json");
        fs::write(&path, r#"{"n": 1e400}"#).unwrap();

        assert!(matches!(read_config(&path).unwrap_err(), ReadError::MalformedData { .. }));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = read_config(&dir.path().join("s-none.js")).unwrap_err();
        assert!(matches!(err, ReadError::Io { .. }));
    }
}
