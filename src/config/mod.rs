//! Configuration file support.
//!
//! This module provides:
//! - Loading settings from `jsconfig.toml`
//! - Config file discovery (search upward from the run root)
//! - Merging CLI args, config file, `.editorconfig` and defaults
//! - Template generation with `jsconfig init`

mod editorconfig;
mod file;
mod init;
mod merge;
mod toml_schema;

pub use editorconfig::{find_editorconfig, parse_editorconfig, EditorConfigSettings};
pub use file::{find_config_file, find_file_upward, load_config, ConfigError, CONFIG_FILE_NAME};
pub use init::{generate_init_file, JSCONFIG_TOML_TEMPLATE};
pub use merge::{merge_settings, CliRunOptions, MergedSettings};
pub use toml_schema::{DiscoverySection, JsconfigToml, ModulesSection, OutputSection};
