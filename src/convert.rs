//! Discovery → read → collision check → write, one file at a time.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::engine::ModuleEngine;
use crate::error::RunError;
use crate::format::{ConfigFileRef, ConfigFormat, NamePattern, DATA_GLOB, SOURCE_GLOB};
use crate::reader::read_config_with;
use crate::walker::{find_config_files, DiscoveryOptions};
use crate::writer::{render_config, write_atomic, IndentSpec};

/// Conversion direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// JS modules → JSON
    Build,
    /// JSON → JS modules
    Convert,
}

impl Mode {
    pub fn input_format(self) -> ConfigFormat {
        match self {
            Mode::Build => ConfigFormat::Source,
            Mode::Convert => ConfigFormat::Data,
        }
    }

    pub fn search_glob(self) -> &'static str {
        match self {
            Mode::Build => SOURCE_GLOB,
            Mode::Convert => DATA_GLOB,
        }
    }

    /// Verb used in progress lines
    pub fn verb(self) -> &'static str {
        match self {
            Mode::Build => "processing",
            Mode::Convert => "converting",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub mode: Mode,
    pub dry_run: bool,
    pub overwrite: bool,
    pub indent: IndentSpec,
    /// Paths (relative to the root) that limit discovery; empty means everything
    pub paths: Vec<String>,
    pub discovery: DiscoveryOptions,
    /// How Build evaluates JS modules
    pub engine: ModuleEngine,
}

impl RunOptions {
    pub fn new(mode: Mode) -> Self {
        Self {
            mode,
            dry_run: false,
            overwrite: false,
            indent: IndentSpec::default(),
            paths: Vec::new(),
            discovery: DiscoveryOptions::default(),
            engine: ModuleEngine::detect(),
        }
    }
}

/// One input file and where its converted form goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionTask {
    pub input: ConfigFileRef,
    pub output_path: PathBuf,
    pub output_format: ConfigFormat,
}

impl ConversionTask {
    pub fn new(input: ConfigFileRef) -> Self {
        let output_path = input.output_path();
        let output_format = input.format.complement();
        Self {
            input,
            output_path,
            output_format,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Created,
    Overwritten,
    Skipped,
    Failed { reason: String },
}

impl Outcome {
    /// Whether this outcome writes the output file (outside a dry run)
    pub fn writes(&self) -> bool {
        matches!(self, Outcome::Created | Outcome::Overwritten)
    }
}

/// Collision policy for an output path
pub fn decide(output_exists: bool, overwrite: bool) -> Outcome {
    match (output_exists, overwrite) {
        (false, _) => Outcome::Created,
        (true, false) => Outcome::Skipped,
        (true, true) => Outcome::Overwritten,
    }
}

/// Result for a single task
#[derive(Debug, Clone)]
pub struct TaskReport {
    pub task: ConversionTask,
    pub outcome: Outcome,
    /// Content written (or that would be written in a dry run)
    pub rendered: Option<String>,
    /// Content of the output file before an overwrite
    pub previous: Option<String>,
}

impl TaskReport {
    fn failed(task: ConversionTask, reason: impl ToString) -> Self {
        Self {
            task,
            outcome: Outcome::Failed {
                reason: reason.to_string(),
            },
            rendered: None,
            previous: None,
        }
    }
}

/// Per-file results in discovery order
#[derive(Debug, Clone)]
pub struct RunReport {
    pub mode: Mode,
    pub dry_run: bool,
    pub entries: Vec<TaskReport>,
}

impl RunReport {
    fn count(&self, f: impl Fn(&Outcome) -> bool) -> usize {
        self.entries.iter().filter(|e| f(&e.outcome)).count()
    }

    pub fn created(&self) -> usize {
        self.count(|o| *o == Outcome::Created)
    }

    pub fn overwritten(&self) -> usize {
        self.count(|o| *o == Outcome::Overwritten)
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| *o == Outcome::Skipped)
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Failed { .. }))
    }

    pub fn has_failures(&self) -> bool {
        self.failed() > 0
    }
}

/// Hooks called while a run progresses.
pub trait ConversionObserver {
    fn discovered(&mut self, _files: &[ConfigFileRef]) {}
    fn started(&mut self, _task: &ConversionTask) {}
    fn finished(&mut self, _entry: &TaskReport) {}
}

impl ConversionObserver for () {}

/// Run a Build or Convert pass rooted at `root`.
///
/// Per-file failures end up as [`Outcome::Failed`]; only discovery errors
/// abort the run.
pub fn run_conversion(
    root: &Path,
    options: &RunOptions,
    observer: &mut dyn ConversionObserver,
) -> Result<RunReport, RunError> {
    let pattern = NamePattern::new(options.mode.search_glob())?;
    let files = find_config_files(root, &options.paths, &pattern, &options.discovery)?;
    observer.discovered(&files);

    Ok(convert_files(root, files, options, observer))
}

/// Process already-discovered files in order.
///
/// The first file claiming an output path wins; later ones fail with
/// "duplicate output path".
pub fn convert_files(
    root: &Path,
    files: Vec<ConfigFileRef>,
    options: &RunOptions,
    observer: &mut dyn ConversionObserver,
) -> RunReport {
    let mut claimed = HashSet::new();
    let mut entries = Vec::with_capacity(files.len());

    for file in files {
        let task = ConversionTask::new(file);
        observer.started(&task);

        let entry = if claimed.insert(task.output_path.clone()) {
            process_task(root, task, options)
        } else {
            TaskReport::failed(task, "duplicate output path")
        };

        match &entry.outcome {
            Outcome::Failed { reason } => tracing::warn!(
                input = %entry.task.input.relative_path.display(),
                %reason,
                "conversion failed"
            ),
            outcome => tracing::debug!(
                output = %entry.task.output_path.display(),
                ?outcome,
                dry_run = options.dry_run,
                "conversion finished"
            ),
        }

        observer.finished(&entry);
        entries.push(entry);
    }

    RunReport {
        mode: options.mode,
        dry_run: options.dry_run,
        entries,
    }
}

fn process_task(root: &Path, task: ConversionTask, options: &RunOptions) -> TaskReport {
    let value = match read_config_with(&root.join(&task.input.relative_path), &options.engine) {
        Ok(value) => value,
        Err(e) => return TaskReport::failed(task, e),
    };

    let output = root.join(&task.output_path);
    let exists = output.exists();
    let outcome = decide(exists, options.overwrite);
    if outcome == Outcome::Skipped {
        return TaskReport {
            task,
            outcome,
            rendered: None,
            previous: None,
        };
    }

    let rendered = match render_config(&value, task.output_format, options.indent) {
        Ok(rendered) => rendered,
        Err(e) => return TaskReport::failed(task, e),
    };
    let previous = if exists {
        fs::read_to_string(&output).ok()
    } else {
        None
    };

    if !options.dry_run {
        if let Err(e) = write_atomic(&output, rendered.as_bytes()) {
            return TaskReport::failed(task, e);
        }
    }

    TaskReport {
        task,
        outcome,
        rendered: Some(rendered),
        previous,
    }
}
