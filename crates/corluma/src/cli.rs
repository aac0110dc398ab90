//! Clap derive structures for the `corluma` CLI.

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;

use corluma_core::ProtocolFamily;

// ── Top-Level CLI ────────────────────────────────────────────────────

/// corluma -- find and pair smart-light bridges on the local network
#[derive(Debug, Parser)]
#[command(
    name = "corluma",
    version,
    about = "Discover and pair Hue bridges and Nanoleaf controllers",
    long_about = "Discover Philips Hue bridges and Nanoleaf controllers on the local network.\n\n\
        Devices are found through SSDP broadcasts, the Hue cloud directory and\n\
        manually entered addresses. Paired devices are remembered between runs.",
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
    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "CORLUMA_OUTPUT",
        default_value = "table",
        global = true
    )]
    pub output: OutputFormat,

    /// When to use color output
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorMode,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Skip confirmation prompts
    #[arg(long, short = 'y', global = true)]
    pub yes: bool,
}

// ── Output & Color Enums ─────────────────────────────────────────────

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

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

/// Protocol family as a CLI value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FamilyArg {
    Hue,
    Nanoleaf,
}

impl From<FamilyArg> for ProtocolFamily {
    fn from(arg: FamilyArg) -> Self {
        match arg {
            FamilyArg::Hue => ProtocolFamily::Hue,
            FamilyArg::Nanoleaf => ProtocolFamily::Nanoleaf,
        }
    }
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Search the network and pair with devices
    #[command(alias = "disc")]
    Discover(DiscoverArgs),

    /// Inspect and edit remembered devices
    #[command(alias = "dev", alias = "d")]
    Devices(DevicesArgs),

    /// Manage the configuration file
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Discover ─────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct DiscoverArgs {
    /// Only look for Hue bridges
    #[arg(long)]
    pub hue: bool,

    /// Only look for Nanoleaf controllers
    #[arg(long)]
    pub nanoleaf: bool,

    /// Probe this address as well (repeatable, `host` or `host:port`)
    #[arg(long = "ip", value_name = "ADDR")]
    pub ips: Vec<String>,

    /// Stop after this many seconds (default: run until Ctrl-C)
    #[arg(long, short = 'd', value_name = "SECS")]
    pub duration: Option<u64>,

    /// Do not listen for SSDP broadcasts
    #[arg(long)]
    pub no_broadcast: bool,
}

impl DiscoverArgs {
    /// Families selected by the flags, or `None` when neither flag (or
    /// both) is given.
    pub fn families(&self) -> Option<Vec<ProtocolFamily>> {
        match (self.hue, self.nanoleaf) {
            (true, false) => Some(vec![ProtocolFamily::Hue]),
            (false, true) => Some(vec![ProtocolFamily::Nanoleaf]),
            _ => None,
        }
    }
}

// ── Devices ──────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct DevicesArgs {
    #[command(subcommand)]
    pub command: DevicesCommand,
}

#[derive(Debug, Subcommand)]
pub enum DevicesCommand {
    /// List remembered devices
    #[command(alias = "ls")]
    List {
        /// Only show one family
        #[arg(long, short = 'f')]
        family: Option<FamilyArg>,
    },

    /// Show one device
    Get {
        family: FamilyArg,
        /// Serial number, bridge id or IP address
        key: String,
    },

    /// Forget a device
    #[command(alias = "rm")]
    Remove {
        family: FamilyArg,
        /// Serial number, bridge id or IP address
        key: String,
    },

    /// Change the display name of a device
    Rename {
        family: FamilyArg,
        /// Serial number, bridge id or IP address
        key: String,
        name: String,
    },
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

    /// Write a config file with default values
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Target shell
    pub shell: Shell,
}
