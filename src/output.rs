use crate::colors::Colors;
use crate::convert::{ConversionTask, Mode, Outcome, RunReport, TaskReport};
use similar::{ChangeTag, TextDiff};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputMode {
    Normal,
    Quiet,
    Diff,
}

pub struct OutputContext {
    pub mode: OutputMode,
    pub colors: Colors,
    pub show_progress: bool,
}

impl OutputContext {
    pub fn new(mode: OutputMode, use_colors: bool, show_progress: bool) -> Self {
        Self {
            mode,
            colors: Colors::new(use_colors),
            show_progress,
        }
    }
}

/// `./`-prefixed, `/`-separated form of a root-relative path
pub fn display_path(path: &Path) -> String {
    let joined = path
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    format!("./{joined}")
}

pub fn print_header(mode: Mode, dry_run: bool, found: usize, ctx: &OutputContext) {
    if ctx.mode == OutputMode::Quiet {
        return;
    }
    if dry_run {
        println!(
            "{}Executing in dry run mode. No changes will be made.{}",
            ctx.colors.banner,
            ctx.colors.reset()
        );
    }
    println!(
        "Found {} {} config files:",
        found,
        mode.input_format().label()
    );
}

pub fn print_started(mode: Mode, task: &ConversionTask, ctx: &OutputContext) {
    if ctx.mode == OutputMode::Quiet {
        return;
    }
    let label = format!("Now {}:", mode.verb());
    println!(
        "{:<18} {}",
        label,
        display_path(&task.input.relative_path)
    );
}

pub fn print_outcome(entry: &TaskReport, ctx: &OutputContext) {
    let output = display_path(&entry.task.output_path);

    let (color, label) = match &entry.outcome {
        Outcome::Failed { reason } => {
            eprintln!(
                "{}Failed:{} {}: {}",
                ctx.colors.failed,
                ctx.colors.reset(),
                display_path(&entry.task.input.relative_path),
                reason
            );
            return;
        }
        outcome if ctx.mode == OutputMode::Quiet => {
            if outcome.writes() {
                println!("{output}");
            }
            return;
        }
        Outcome::Created => (ctx.colors.created, "Creating file:"),
        Outcome::Overwritten => (ctx.colors.overwritten, "Overwriting file:"),
        Outcome::Skipped => (ctx.colors.skipped, "Skipping existing:"),
    };
    println!("{color}{label:<18} {output}{}", ctx.colors.reset());

    if ctx.mode == OutputMode::Diff {
        if let Some(rendered) = &entry.rendered {
            let previous = entry.previous.as_deref().unwrap_or("");
            print_diff(&output, previous, rendered);
        }
    }
}

pub fn print_diff(label: &str, original: &str, content: &str) {
    let diff = TextDiff::from_lines(original, content);

    println!("--- {label}");
    println!("+++ {label}");

    for (idx, group) in diff.grouped_ops(3).iter().enumerate() {
        if idx > 0 {
            println!();
        }

        for op in group {
            for change in diff.iter_changes(op) {
                let sign = match change.tag() {
                    ChangeTag::Delete => '-',
                    ChangeTag::Insert => '+',
                    ChangeTag::Equal => ' ',
                };
                print!("{sign}{change}");
                if change.missing_newline() {
                    println!();
                }
            }
        }
    }
}

pub fn print_summary(report: &RunReport, ctx: &OutputContext) {
    if ctx.mode == OutputMode::Quiet || report.entries.is_empty() {
        return;
    }

    let mut parts = vec![];
    if report.created() > 0 {
        parts.push(format!(
            "{}{} created{}",
            ctx.colors.created,
            report.created(),
            ctx.colors.reset()
        ));
    }
    if report.overwritten() > 0 {
        parts.push(format!(
            "{}{} overwritten{}",
            ctx.colors.overwritten,
            report.overwritten(),
            ctx.colors.reset()
        ));
    }
    if report.skipped() > 0 {
        parts.push(format!(
            "{}{} skipped{}",
            ctx.colors.skipped,
            report.skipped(),
            ctx.colors.reset()
        ));
    }
    if report.failed() > 0 {
        parts.push(format!(
            "{}{} failed{}",
            ctx.colors.failed,
            report.failed(),
            ctx.colors.reset()
        ));
    }

    println!();
    if report.dry_run {
        println!("{} (dry run)", parts.join(", "));
    } else {
        println!("{}", parts.join(", "));
    }
}
