use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use jsconfig::{
    find_config_file, find_editorconfig, generate_init_file, load_config, logging,
    merge_settings, parse_editorconfig, run, should_use_colors, CliRunOptions, EngineChoice,
    IndentSpec, JsconfigToml, Mode, OutputContext, OutputMode,
};

#[derive(Parser)]
#[command(name = "jsconfig")]
#[command(version, about = "Build JSON config files from JS config modules, and back")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Builds all JS config files (s-*.js) into JSON config files
    Build(RunArgs),
    /// Creates JS config files from JSON config files (s-*.json)
    Convert(RunArgs),
    /// Generate a template jsconfig.toml configuration file
    Init {
        /// Directory to write jsconfig.toml into
        #[arg(short = 'C', long, value_name = "DIR", default_value = ".")]
        root: PathBuf,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Limit the search to these paths (relative to the root)
    paths: Vec<String>,

    /// Do a dry test run and do not write any files
    #[arg(short, long)]
    dryrun: bool,

    /// The number of spaces used for indentation (default: 2)
    #[arg(short, long, value_name = "N")]
    spaces: Option<usize>,

    /// Use tabs for indentation instead of spaces
    #[arg(short, long)]
    tabs: bool,

    /// Overwrite output files that already exist
    #[arg(short, long)]
    overwrite: bool,

    /// Show the content written for each file as a diff
    #[arg(long)]
    diff: bool,

    /// Output only the names of written files
    #[arg(short, long)]
    quiet: bool,

    /// Skip directories with this name (repeatable)
    #[arg(long, value_name = "NAME")]
    exclude: Vec<String>,

    /// Take indentation from .editorconfig when nothing else sets it
    #[arg(long)]
    editorconfig: bool,

    /// How JS modules are evaluated (default: auto)
    #[arg(long, value_enum, value_name = "ENGINE")]
    engine: Option<EngineChoice>,

    /// Node.js binary used to run JS modules
    #[arg(long, value_name = "PATH")]
    node: Option<PathBuf>,

    /// Directory to search from (default: current directory)
    #[arg(short = 'C', long, value_name = "DIR", default_value = ".")]
    root: PathBuf,

    /// Specify config file path (overrides auto-discovery)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Force colored output
    #[arg(long)]
    color: bool,

    /// Disable colored output
    #[arg(long, conflicts_with = "color")]
    no_color: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logging::init() {
        eprintln!("Warning: could not initialise logging: {e}");
    }

    match cli.command {
        Command::Build(args) => handle_run(Mode::Build, args),
        Command::Convert(args) => handle_run(Mode::Convert, args),
        Command::Init { root } => handle_init(&root),
    }
}

fn handle_init(root: &Path) -> ExitCode {
    match generate_init_file(root) {
        Ok(path) => {
            println!("Created {}", path.display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

fn handle_run(mode: Mode, args: RunArgs) -> ExitCode {
    let toml_config = load_configuration(&args.root, &args.config, args.quiet);
    let editorconfig = editorconfig_indent(&args.root, mode);

    let cli_options = build_cli_options(&args);
    let settings = merge_settings(&cli_options, toml_config.as_ref(), editorconfig);

    let output_mode = if args.quiet {
        OutputMode::Quiet
    } else if args.diff {
        OutputMode::Diff
    } else {
        OutputMode::Normal
    };
    let ctx = OutputContext::new(
        output_mode,
        should_use_colors(args.color, args.no_color),
        !args.quiet && std::io::stderr().is_terminal(),
    );

    let options = match settings.into_run_options(mode, args.dryrun, args.paths) {
        Ok(options) => options,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::from(1);
        }
    };

    match run(&args.root, &options, &ctx) {
        Ok(report) if report.has_failures() => ExitCode::from(1),
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

fn load_configuration(root: &Path, explicit_path: &Option<PathBuf>, quiet: bool) -> Option<JsconfigToml> {
    let config_path = explicit_path.clone().or_else(|| {
        root.canonicalize()
            .ok()
            .and_then(|d| find_config_file(&d))
    });

    config_path.and_then(|p| match load_config(&p) {
        Ok(config) => {
            if !quiet {
                eprintln!("Using config: {}", p.display());
            }
            Some(config)
        }
        Err(e) => {
            eprintln!("Warning: Failed to load {}: {}", p.display(), e);
            None
        }
    })
}

/// Indentation from .editorconfig for the files this mode writes
fn editorconfig_indent(root: &Path, mode: Mode) -> Option<IndentSpec> {
    let extension = mode.input_format().complement().extension();
    root.canonicalize()
        .ok()
        .and_then(|d| find_editorconfig(&d))
        .and_then(|path| parse_editorconfig(&path, extension).ok())
        .and_then(|settings| settings.indent())
}

fn build_cli_options(args: &RunArgs) -> CliRunOptions {
    // Boolean flags in clap are always present (default false), so we
    // treat false as "not set" for proper merging with config file.
    CliRunOptions {
        spaces: args.spaces,
        tabs: args.tabs.then_some(true),
        overwrite: args.overwrite.then_some(true),
        exclude: args.exclude.clone(),
        use_editorconfig: args.editorconfig.then_some(true),
        engine: args.engine,
        node: args.node.clone(),
    }
}
