//! Clap derive structures for the `nimbus` CLI.
//!
//! Defines the command tree, global flags, and shared value enums.

use clap::{Args, Parser, Subcommand, ValueEnum};

// ── Top-Level CLI ────────────────────────────────────────────────────

/// nimbus -- command-line control for ActronAir Nimbus air conditioners
#[derive(Debug, Parser)]
#[command(
    name = "nimbus",
    version,
    about = "Monitor and control ActronAir Nimbus air conditioners",
    long_about = "Talks to the Nimbus cloud service to list paired systems,\n\
        inspect their state, follow change events, and send commands.\n\n\
        `nimbus watch` keeps a local mirror of every system current and\n\
        reports new faults as they appear.",
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
    /// Account profile to use
    #[arg(long, short = 'p', env = "NIMBUS_PROFILE", global = true)]
    pub profile: Option<String>,

    /// Nimbus API root (overrides profile)
    #[arg(long, env = "NIMBUS_API_URL", global = true)]
    pub api_url: Option<String>,

    /// Pairing token (overrides profile and keyring)
    #[arg(long, env = "NIMBUS_PAIRING_TOKEN", global = true, hide_env = true)]
    pub pairing_token: Option<String>,

    /// Output format
    #[arg(
        long,
        short = 'o',
        env = "NIMBUS_OUTPUT",
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

    /// Per-request timeout in seconds (overrides profile)
    #[arg(long, env = "NIMBUS_TIMEOUT", global = true)]
    pub timeout: Option<u64>,

    /// Attempts per request, including the first (overrides profile)
    #[arg(long, env = "NIMBUS_MAX_ATTEMPTS", global = true)]
    pub max_attempts: Option<u32>,
}

// ── Output & Color Enums ─────────────────────────────────────────────

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    /// Pretty table (default, interactive)
    Table,
    /// Pretty-printed JSON
    Json,
    /// Compact single-line JSON
    JsonCompact,
    /// Plain text, one value per line (scripting)
    Plain,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ColorMode {
    /// Auto-detect (color if terminal is interactive)
    Auto,
    /// Always emit color codes
    Always,
    /// Never emit color codes
    Never,
}

// ── Top-Level Command Enum ───────────────────────────────────────────

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List air conditioning systems paired with the account
    #[command(alias = "ls")]
    Systems,

    /// Show the current state of one system
    Status(StatusArgs),

    /// List or follow change events for one system
    Events(EventsArgs),

    /// Send a settings command to one system
    Set(SetArgs),

    /// Keep a local mirror current and report changes and faults
    Watch(WatchArgs),

    /// Pair this client with a Nimbus account and obtain a pairing token
    Pair(PairArgs),

    /// Manage CLI configuration and profiles
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// ── Status ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// System serial number
    pub serial: String,
}

// ── Events ───────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct EventsArgs {
    /// System serial number
    pub serial: String,

    /// Page direction relative to --cursor
    #[arg(long, value_enum, default_value = "latest")]
    pub mode: EventDirection,

    /// Event id to page from (required for newer/older)
    #[arg(long)]
    pub cursor: Option<String>,

    /// Keep polling and print new events as they arrive
    #[arg(long, short = 'f', conflicts_with = "mode")]
    pub follow: bool,

    /// Seconds between polls when following
    #[arg(long, default_value = "15", requires = "follow")]
    pub poll_interval: u64,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum EventDirection {
    /// Most recent page
    Latest,
    /// Events newer than --cursor
    Newer,
    /// Events older than --cursor
    Older,
}

// ── Set ──────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct SetArgs {
    /// System serial number
    pub serial: String,

    #[command(subcommand)]
    pub command: SetCommand,
}

#[derive(Debug, Subcommand)]
pub enum SetCommand {
    /// Switch the system on or off
    Power {
        #[arg(value_enum)]
        state: PowerState,
    },

    /// Change the operating mode
    Mode {
        #[arg(value_enum)]
        mode: HvacMode,

        /// Also switch the system on
        #[arg(long)]
        on: bool,
    },

    /// Change the fan speed
    Fan {
        #[arg(value_enum)]
        speed: FanSpeed,

        /// Keep the fan running between compressor cycles
        #[arg(long)]
        continuous: bool,
    },

    /// Replace the per-zone enabled flags, e.g. `on off on`
    Zones {
        #[arg(value_enum, required = true, num_args = 1..)]
        states: Vec<PowerState>,
    },

    /// Change cooling and/or heating setpoints
    #[command(alias = "temperature")]
    Temp {
        /// Cooling setpoint in °C
        #[arg(long, required_unless_present = "heat")]
        cool: Option<f64>,

        /// Heating setpoint in °C
        #[arg(long)]
        heat: Option<f64>,

        /// Apply to one zone (0-based) instead of the whole system
        #[arg(long)]
        zone: Option<usize>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PowerState {
    On,
    Off,
}

impl PowerState {
    pub fn is_on(self) -> bool {
        self == Self::On
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum HvacMode {
    Cool,
    Heat,
    Auto,
    #[value(name = "fan", alias = "fan-only")]
    FanOnly,
}

impl HvacMode {
    /// The mode string the appliance expects.
    pub fn as_remote(self) -> &'static str {
        match self {
            Self::Cool => "COOL",
            Self::Heat => "HEAT",
            Self::Auto => "AUTO",
            Self::FanOnly => "FAN_ONLY",
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FanSpeed {
    Auto,
    Low,
    Medium,
    High,
}

impl FanSpeed {
    pub fn as_remote(self) -> &'static str {
        match self {
            Self::Auto => "AUTO",
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }
}

// ── Watch ────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Serials to mirror (default: profile serials, else every paired system)
    pub serials: Vec<String>,

    /// Sync strategy (overrides profile)
    #[arg(long, value_enum)]
    pub mode: Option<WatchMode>,

    /// Seconds between ticks (overrides profile)
    #[arg(long)]
    pub interval: Option<u64>,

    /// Seconds a single tick may take (overrides profile)
    #[arg(long)]
    pub tick_timeout: Option<u64>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum WatchMode {
    /// Fetch a full snapshot every tick
    Status,
    /// Apply change events from the last seen event
    Events,
}

// ── Pair ─────────────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct PairArgs {
    /// Nimbus account email
    #[arg(long, short = 'u', env = "NIMBUS_USERNAME")]
    pub username: String,

    /// Client type reported to the service
    #[arg(long, default_value = "ios")]
    pub client: String,

    /// Name this device is registered under
    #[arg(long, default_value = "nimbus-cli")]
    pub device_name: String,

    /// Identifier unique to this device
    #[arg(long, default_value = "nimbus-cli")]
    pub device_id: String,

    /// Store the token in the system keyring for the active profile
    #[arg(long)]
    pub save: bool,
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

    /// Show the resolved configuration (tokens redacted)
    Show,

    /// List configured profiles
    Profiles,

    /// Set the default profile
    Use {
        /// Profile name
        name: String,
    },

    /// Store a pairing token in the system keyring
    SetToken {
        /// Profile name (defaults to the active profile)
        #[arg(long)]
        profile: Option<String>,
    },
}

// ── Completions ──────────────────────────────────────────────────────

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,
}
