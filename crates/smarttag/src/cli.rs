//! Clap derive structures for the `smarttag` CLI.
//!
//! Defines the command tree, global flags, and shared types.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// smarttag -- follow your kids' school bus rides from the terminal
#[derive(Debug, Parser)]
#[command(
    name = "smarttag",
    version,
    about = "Track school bus rides reported by the SMART Tag parent portal",
    long_about = "Polls the SMART Tag parent portal for each tracked student and\n\
        reports whether they are on the bus, which bus they last rode,\n\
        and on which route.",
    propagate_version = true,
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Command,
}

// ── Global Options ───────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct GlobalOpts {
    /// Config file (defaults to the platform config dir)
    #[arg(long, env = "SMARTTAG_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "SMARTTAG_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Per-request timeout in seconds (overrides the config file)
    #[arg(long, env = "SMARTTAG_TIMEOUT", global = true)]
    pub timeout: Option<u64>,
}

// ── Output Enum ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// YAML
    Yaml,
    /// Plain text, one value per line (scripting)
    Plain,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sign in and choose which students to track
    Setup(SetupArgs),

    /// Manage tracked students
    #[command(alias = "s")]
    Students(StudentsArgs),

    /// Poll the portal once and show each student's bus status
    #[command(alias = "st")]
    Status(StatusArgs),

    /// Resume polling for a student
    Enable(ToggleArgs),

    /// Pause polling for a student
    Disable(ToggleArgs),

    /// Estimate pickup and drop-off windows from recent rides
    Routes(RoutesArgs),

    /// Poll continuously and stream entity updates
    ///
    /// `enable` and `disable` apply to a running loop at its next cycle.
    Run(RunArgs),

    /// Inspect or edit the configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Setup ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct SetupArgs {
    /// Portal account email
    #[arg(long, env = "SMARTTAG_EMAIL")]
    pub email: Option<String>,

    /// Track every student on the account without prompting
    #[arg(long)]
    pub all: bool,

    /// Save the password to the config file instead of the keyring
    #[arg(long)]
    pub plaintext: bool,
}

// ── Students ─────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct StudentsArgs {
    #[command(subcommand)]
    pub command: StudentsCommand,
}

#[derive(Debug, Subcommand)]
pub enum StudentsCommand {
    /// List tracked students
    #[command(alias = "ls")]
    List,

    /// List every student linked to the portal account
    Discover,

    /// Start tracking a student by portal id
    Add {
        /// Portal student id
        id: String,

        /// Display name (looked up on the portal when omitted)
        #[arg(long)]
        name: Option<String>,

        /// Add with polling paused
        #[arg(long)]
        disabled: bool,
    },

    /// Stop tracking a student
    #[command(alias = "rm")]
    Remove {
        /// Student id or name
        student: String,
    },
}

// ── Status / toggles / routes ────────────────────────────────────────

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Only show this student (id or name)
    pub student: Option<String>,
}

#[derive(Debug, Args)]
pub struct ToggleArgs {
    /// Student id or name
    pub student: String,
}

#[derive(Debug, Args)]
pub struct RoutesArgs {
    /// Student id or name
    pub student: String,
}

// ── Run ──────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct RunArgs {
    /// Seconds between poll cycles (overrides the config file)
    #[arg(long, short = 'i')]
    pub interval: Option<u64>,
}

// ── Config ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the config file location
    Path,

    /// Show the effective configuration
    Show,

    /// Store the portal password in the system keyring
    SetPassword,
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Target shell
    pub shell: clap_complete::Shell,
}
