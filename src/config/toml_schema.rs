//! TOML schema definitions for jsconfig.toml

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::engine::EngineChoice;

/// Root structure for jsconfig.toml
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JsconfigToml {
    #[serde(default)]
    pub output: OutputSection,

    #[serde(default)]
    pub discovery: DiscoverySection,

    #[serde(default)]
    pub modules: ModulesSection,
}

/// `[output]` section
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutputSection {
    /// Spaces per indentation level (default: 2)
    pub spaces: Option<usize>,

    /// Indent with tabs; wins over `spaces`
    pub tabs: Option<bool>,

    /// Replace output files that already exist (default: false)
    pub overwrite: Option<bool>,

    /// Take indentation from .editorconfig when nothing else sets it (default: false)
    pub use_editorconfig: Option<bool>,
}

/// `[discovery]` section
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiscoverySection {
    /// Directory names to skip in addition to the built-in ones
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Honour .gitignore files (default: false)
    pub respect_gitignore: Option<bool>,
}

/// `[modules]` section
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModulesSection {
    /// "auto", "node" or "static" (default: "auto")
    pub engine: Option<EngineChoice>,

    /// Node.js binary, either a name looked up on PATH or a path
    pub node: Option<PathBuf>,
}
