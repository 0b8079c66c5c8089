use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

const HELP_TEMPLATE: &str = "\
{before-help}{name} {version}
{author-with-newline}{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}
";

#[derive(Parser, Debug)]
#[command(
    version,
    about = "rnaprep - preprocess RNA structure files per a manifest and dispatch annotation tools against the staged results.",
    help_template = HELP_TEMPLATE,
)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity level (-v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all log output except for errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Write logs to a specified file in addition to the console output
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the preprocessing pipeline: manifest, filtering, residual import.
    Run(RunArgs),
    /// Dispatch annotation tools against the staged output area.
    Annotate(AnnotateArgs),
    /// Tear down both execution environments behind the completion gate.
    Down(DownArgs),
}

/// Arguments for the `run` subcommand.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Shared run area containing the manifest and the structure files.
    /// Overrides the value from the config file.
    #[arg(short, long, value_name = "DIR")]
    pub shared_dir: Option<PathBuf>,

    /// Path to the configuration file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Do not bring the execution environments up before processing.
    /// Rows that need the bundle splitter will fail (row-scoped).
    #[arg(long)]
    pub no_environments: bool,

    /// Dispatch the enabled annotation tools after preprocessing.
    #[arg(long)]
    pub with_tools: bool,
}

/// Arguments for the `annotate` subcommand.
#[derive(Args, Debug)]
pub struct AnnotateArgs {
    /// Shared run area the tools' environments are bound to.
    #[arg(short, long, value_name = "DIR")]
    pub shared_dir: Option<PathBuf>,

    /// Path to the configuration file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Tool kind to dispatch; repeatable. Defaults to the configured set.
    #[arg(short, long = "tool", value_name = "KIND")]
    pub tools: Vec<String>,
}

/// Arguments for the `down` subcommand.
#[derive(Args, Debug)]
pub struct DownArgs {
    /// Shared run area the environments were created for.
    #[arg(short, long, value_name = "DIR")]
    pub shared_dir: Option<PathBuf>,

    /// Path to the configuration file in TOML format.
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Seconds to linger after both environments reach a terminal state.
    #[arg(long, value_name = "SECS")]
    pub grace_secs: Option<u64>,
}
