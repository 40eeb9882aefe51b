//! Configuration merging logic
//!
//! Priority: CLI args > jsconfig.toml > .editorconfig (when enabled) > defaults

use std::path::PathBuf;

use crate::convert::{Mode, RunOptions};
use crate::engine::{EngineChoice, ModuleEngine};
use crate::error::EngineError;
use crate::walker::DiscoveryOptions;
use crate::writer::IndentSpec;

use super::toml_schema::JsconfigToml;

/// CLI options that can override config file settings.
///
/// Uses `Option<T>` to distinguish "not specified" from "explicitly set".
#[derive(Debug, Default)]
pub struct CliRunOptions {
    pub spaces: Option<usize>,
    pub tabs: Option<bool>,
    pub overwrite: Option<bool>,
    /// Appended to the config file's exclusions, never replacing them
    pub exclude: Vec<String>,
    pub use_editorconfig: Option<bool>,
    pub engine: Option<EngineChoice>,
    pub node: Option<PathBuf>,
}

/// Settings after every source has been applied
#[derive(Debug, Clone)]
pub struct MergedSettings {
    pub indent: IndentSpec,
    pub overwrite: bool,
    pub discovery: DiscoveryOptions,
    pub engine: EngineChoice,
    pub node: Option<PathBuf>,
}

impl MergedSettings {
    /// Fails when the chosen module engine is unavailable
    pub fn into_run_options(
        self,
        mode: Mode,
        dry_run: bool,
        paths: Vec<String>,
    ) -> Result<RunOptions, EngineError> {
        let engine = ModuleEngine::resolve(self.engine, self.node.as_deref())?;
        Ok(RunOptions {
            mode,
            dry_run,
            overwrite: self.overwrite,
            indent: self.indent,
            paths,
            discovery: self.discovery,
            engine,
        })
    }
}

/// Tabs beat spaces when both come from the same source
fn indent_at_level(spaces: Option<usize>, tabs: Option<bool>) -> Option<IndentSpec> {
    if tabs == Some(true) {
        Some(IndentSpec::Tab)
    } else {
        spaces.map(IndentSpec::Spaces)
    }
}

/// Merge CLI options, jsconfig.toml and the .editorconfig indentation.
///
/// The .editorconfig indentation only applies when `use_editorconfig` is
/// enabled on the command line or in jsconfig.toml.
pub fn merge_settings(
    cli: &CliRunOptions,
    toml: Option<&JsconfigToml>,
    editorconfig: Option<IndentSpec>,
) -> MergedSettings {
    let use_editorconfig = cli
        .use_editorconfig
        .or_else(|| toml.and_then(|t| t.output.use_editorconfig))
        .unwrap_or(false);

    let indent = indent_at_level(cli.spaces, cli.tabs)
        .or_else(|| toml.and_then(|t| indent_at_level(t.output.spaces, t.output.tabs)))
        .or(editorconfig.filter(|_| use_editorconfig))
        .unwrap_or_default();

    let overwrite = cli
        .overwrite
        .or_else(|| toml.and_then(|t| t.output.overwrite))
        .unwrap_or(false);

    let mut discovery = DiscoveryOptions::default();
    if let Some(t) = toml {
        discovery = discovery.with_excluded(t.discovery.exclude.iter().cloned());
        discovery.respect_gitignore = t.discovery.respect_gitignore.unwrap_or(false);
    }
    discovery = discovery.with_excluded(cli.exclude.iter().cloned());

    let engine = cli
        .engine
        .or_else(|| toml.and_then(|t| t.modules.engine))
        .unwrap_or_default();
    let node = cli
        .node
        .clone()
        .or_else(|| toml.and_then(|t| t.modules.node.clone()));

    MergedSettings {
        indent,
        overwrite,
        discovery,
        engine,
        node,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::toml_schema::{DiscoverySection, ModulesSection, OutputSection};

    fn toml_with(output: OutputSection) -> JsconfigToml {
        JsconfigToml {
            output,
            ..Default::default()
        }
    }

    #[test]
    fn test_merge_defaults_only() {
        let merged = merge_settings(&CliRunOptions::default(), None, None);

        assert_eq!(merged.indent, IndentSpec::Spaces(2));
        assert!(!merged.overwrite);
        assert!(merged.discovery.excluded_dirs.contains("node_modules"));
        assert!(!merged.discovery.respect_gitignore);
    }

    #[test]
    fn test_cli_tabs_beat_cli_spaces() {
        let cli = CliRunOptions {
            spaces: Some(4),
            tabs: Some(true),
            ..Default::default()
        };
        assert_eq!(merge_settings(&cli, None, None).indent, IndentSpec::Tab);
    }

    #[test]
    fn test_toml_overrides_editorconfig() {
        let toml = toml_with(OutputSection {
            spaces: Some(3),
            overwrite: Some(true),
            use_editorconfig: Some(true),
            ..Default::default()
        });

        let merged = merge_settings(&CliRunOptions::default(), Some(&toml), Some(IndentSpec::Tab));

        assert_eq!(merged.indent, IndentSpec::Spaces(3));
        assert!(merged.overwrite);
    }

    #[test]
    fn test_cli_overrides_toml() {
        let cli = CliRunOptions {
            spaces: Some(8),
            overwrite: Some(false),
            ..Default::default()
        };
        let toml = toml_with(OutputSection {
            tabs: Some(true),
            overwrite: Some(true),
            ..Default::default()
        });

        let merged = merge_settings(&cli, Some(&toml), None);

        assert_eq!(merged.indent, IndentSpec::Spaces(8));
        assert!(!merged.overwrite);
    }

    #[test]
    fn test_editorconfig_ignored_by_default() {
        let merged = merge_settings(&CliRunOptions::default(), None, Some(IndentSpec::Tab));
        assert_eq!(merged.indent, IndentSpec::Spaces(2));
    }

    #[test]
    fn test_editorconfig_used_when_enabled() {
        let toml = toml_with(OutputSection {
            use_editorconfig: Some(true),
            ..Default::default()
        });
        let merged = merge_settings(&CliRunOptions::default(), Some(&toml), Some(IndentSpec::Tab));
        assert_eq!(merged.indent, IndentSpec::Tab);

        let cli = CliRunOptions {
            use_editorconfig: Some(true),
            ..Default::default()
        };
        assert_eq!(merge_settings(&cli, None, Some(IndentSpec::Tab)).indent, IndentSpec::Tab);
    }

    #[test]
    fn test_cli_can_disable_editorconfig() {
        let cli = CliRunOptions {
            use_editorconfig: Some(false),
            ..Default::default()
        };
        let toml = toml_with(OutputSection {
            use_editorconfig: Some(true),
            ..Default::default()
        });
        let merged = merge_settings(&cli, Some(&toml), Some(IndentSpec::Tab));
        assert_eq!(merged.indent, IndentSpec::Spaces(2));
    }

    #[test]
    fn test_engine_from_toml_and_cli() {
        let toml = JsconfigToml {
            modules: ModulesSection {
                engine: Some(EngineChoice::Node),
                node: Some(PathBuf::from("/opt/node/bin/node")),
            },
            ..Default::default()
        };

        let merged = merge_settings(&CliRunOptions::default(), Some(&toml), None);
        assert_eq!(merged.engine, EngineChoice::Node);
        assert_eq!(merged.node, Some(PathBuf::from("/opt/node/bin/node")));

        let cli = CliRunOptions {
            engine: Some(EngineChoice::Static),
            ..Default::default()
        };
        assert_eq!(merge_settings(&cli, Some(&toml), None).engine, EngineChoice::Static);
        assert_eq!(merge_settings(&CliRunOptions::default(), None, None).engine, EngineChoice::Auto);
    }

    #[test]
    fn test_exclusions_accumulate() {
        let cli = CliRunOptions {
            exclude: vec!["build".into()],
            ..Default::default()
        };
        let toml = JsconfigToml {
            discovery: DiscoverySection {
                exclude: vec!["dist".into()],
                respect_gitignore: Some(true),
            },
            ..Default::default()
        };

        let merged = merge_settings(&cli, Some(&toml), None);
        let excluded = &merged.discovery.excluded_dirs;

        assert!(excluded.contains("build"));
        assert!(excluded.contains("dist"));
        assert!(excluded.contains(".git"));
        assert!(merged.discovery.respect_gitignore);
    }

    #[test]
    fn test_into_run_options() {
        let cli = CliRunOptions {
            engine: Some(EngineChoice::Static),
            ..Default::default()
        };
        let merged = merge_settings(&cli, None, None);
        let options = merged
            .into_run_options(Mode::Convert, true, vec!["a".into()])
            .unwrap();

        assert_eq!(options.mode, Mode::Convert);
        assert!(options.dry_run);
        assert_eq!(options.paths, vec!["a"]);
        assert_eq!(options.engine, ModuleEngine::Static);
    }

    #[test]
    fn test_into_run_options_rejects_missing_node() {
        let cli = CliRunOptions {
            engine: Some(EngineChoice::Node),
            node: Some(PathBuf::from("/nonexistent/bin/node")),
            ..Default::default()
        };
        let merged = merge_settings(&cli, None, None);
        assert!(merged.into_run_options(Mode::Build, false, Vec::new()).is_err());
    }
}
