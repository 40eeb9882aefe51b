//! How JS source modules are evaluated.
//!
//! With Node.js on PATH, modules run for real, so they may use anything a
//! config module can (`require` of packages, helper functions, computed
//! values). Without it, [`crate::module`] evaluates them statically.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::EngineError;
use crate::module::evaluate_module_at;
use crate::value::{canonicalize, GenericValue};

/// Imports the module named by the first argument and prints its default
/// export as JSON. `import()` loads CommonJS and ES modules alike.
const NODE_LOADER: &str = r#"
const { pathToFileURL } = require('url');
import(pathToFileURL(process.argv[1]).href)
  .then((m) => {
    const text = JSON.stringify(m.default);
    process.stdout.write(text === undefined ? 'null' : text);
  })
  .catch((e) => {
    process.stderr.write(e instanceof Error ? e.name + ': ' + e.message : String(e));
    process.exitCode = 1;
  });
"#;

/// Engine requested by the user
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EngineChoice {
    /// Node.js when it is on PATH, the static evaluator otherwise
    #[default]
    Auto,
    /// Always Node.js; fails when it cannot be found
    Node,
    /// Never execute modules
    Static,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleEngine {
    /// Run modules with the Node.js binary at this path
    Node(PathBuf),
    Static,
}

impl ModuleEngine {
    /// Node.js if it is on PATH, otherwise the static evaluator
    pub fn detect() -> Self {
        find_on_path("node").map_or(Self::Static, Self::Node)
    }

    /// Resolve a user choice, with an optional explicit node binary
    pub fn resolve(choice: EngineChoice, node: Option<&Path>) -> Result<Self, EngineError> {
        let engine = match (choice, node) {
            (EngineChoice::Static, _) => Self::Static,
            (_, Some(binary)) => Self::Node(locate_binary(binary)?),
            (EngineChoice::Node, None) => {
                Self::Node(find_on_path("node").ok_or(EngineError::NodeNotFound)?)
            }
            (EngineChoice::Auto, None) => Self::detect(),
        };
        tracing::debug!(engine = engine.name(), "selected module engine");
        Ok(engine)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Node(_) => "node",
            Self::Static => "static",
        }
    }

    /// Evaluate the module at `path`; `content` is its already-read source.
    pub fn evaluate(&self, path: &Path, content: &str) -> Result<GenericValue, String> {
        match self {
            Self::Node(binary) => run_node(binary, path).map_err(|e| e.to_string()),
            Self::Static => evaluate_module_at(path, content).map_err(|e| e.to_string()),
        }
    }
}

/// Run `node` on the module and parse what it prints
fn run_node(binary: &Path, path: &Path) -> Result<GenericValue, EngineError> {
    // Absolute, so node cannot take the argument for an option
    let module = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());

    let mut cmd = Command::new(binary);
    cmd.arg("-e")
        .arg(NODE_LOADER)
        .arg(&module)
        .stdin(Stdio::null());
    if let Some(dir) = module.parent() {
        cmd.current_dir(dir);
    }

    let output = cmd.output().map_err(|source| EngineError::Spawn {
        binary: binary.to_path_buf(),
        source,
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(EngineError::Script(if stderr.is_empty() {
            format!("node exited with {}", output.status)
        } else {
            stderr
        }));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(&stdout)
        .map(canonicalize)
        .map_err(|e| EngineError::Output(e.to_string()))
}

/// A bare name is looked up on PATH, anything else must exist
fn locate_binary(binary: &Path) -> Result<PathBuf, EngineError> {
    if binary.components().count() == 1 {
        if let Some(found) = binary.to_str().and_then(find_on_path) {
            return Ok(found);
        }
    }
    if binary.is_file() {
        Ok(binary.to_path_buf())
    } else {
        Err(EngineError::MissingBinary(binary.to_path_buf()))
    }
}

/// Search PATH for an executable, honoring PATHEXT on Windows
fn find_on_path(tool: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    let extensions: Vec<String> = if cfg!(windows) {
        std::env::var("PATHEXT")
            .unwrap_or_else(|_| ".COM;.EXE;.BAT;.CMD".to_string())
            .split(';')
            .map(|s| s.to_ascii_lowercase())
            .collect()
    } else {
        vec![String::new()]
    };

    std::env::split_paths(&path_var).find_map(|dir| {
        extensions.iter().find_map(|ext| {
            let candidate = dir.join(format!("{tool}{ext}"));
            candidate.is_file().then_some(candidate)
        })
    })
}
