pub mod colors;
pub mod config;
pub mod convert;
pub mod engine;
pub mod error;
pub mod format;
pub mod logging;
pub mod module;
mod output;
pub mod progress;
pub mod reader;
pub mod value;
pub mod walker;
pub mod writer;

pub use colors::{should_use_colors, Colors};
pub use config::{
    find_config_file, find_editorconfig, generate_init_file, load_config, merge_settings,
    parse_editorconfig, CliRunOptions, ConfigError, JsconfigToml, MergedSettings,
    JSCONFIG_TOML_TEMPLATE,
};
pub use convert::{
    convert_files, decide, run_conversion, ConversionObserver, ConversionTask, Mode, Outcome,
    RunOptions, RunReport, TaskReport,
};
pub use engine::{EngineChoice, ModuleEngine};
pub use error::{DiscoveryError, EngineError, ReadError, RunError, WriteError};
pub use format::{ConfigFileRef, ConfigFormat, NamePattern};
pub use module::{evaluate_module, evaluate_module_at, ModuleError};
pub use output::{display_path, print_diff, OutputContext, OutputMode};
pub use progress::ProgressReporter;
pub use reader::{parse_config, read_config, read_config_with};
pub use value::GenericValue;
pub use walker::{find_config_files, DiscoveryOptions, DEFAULT_EXCLUDED_DIRS};
pub use writer::{render_config, write_config, IndentSpec};

use std::path::Path;

/// Prints report lines as the run progresses
struct ConsoleObserver<'a> {
    options: &'a RunOptions,
    ctx: &'a OutputContext,
    progress: ProgressReporter,
}

impl ConversionObserver for ConsoleObserver<'_> {
    fn discovered(&mut self, files: &[ConfigFileRef]) {
        output::print_header(self.options.mode, self.options.dry_run, files.len(), self.ctx);
        self.progress = ProgressReporter::new(files.len(), self.ctx.show_progress);
    }

    fn started(&mut self, task: &ConversionTask) {
        if let Some(name) = task.input.relative_path.file_name() {
            self.progress.start_file(&name.to_string_lossy());
        }
        self.progress
            .suspend(|| output::print_started(self.options.mode, task, self.ctx));
    }

    fn finished(&mut self, entry: &TaskReport) {
        self.progress.suspend(|| output::print_outcome(entry, self.ctx));
        self.progress.finish_file();
    }
}

/// Main entry point: run a Build or Convert pass and print the report
pub fn run(root: &Path, options: &RunOptions, ctx: &OutputContext) -> Result<RunReport, RunError> {
    let mut observer = ConsoleObserver {
        options,
        ctx,
        progress: ProgressReporter::disabled(),
    };

    let report = run_conversion(root, options, &mut observer)?;
    observer.progress.finish();

    output::print_summary(&report, ctx);

    Ok(report)
}
