//! Clap argument types and validation.

use clap::{Args, Parser};
use std::path::PathBuf;

use layerconf::config::Settings;

/// Layered, periodically refreshed configuration.
#[derive(Parser, Debug)]
#[command(
    name = "layerconf",
    version = layerconf::constants::VERSION,
    about = super::ABOUT,
)]
pub struct Cli {
    /// Log debug details to stderr (RUST_LOG overrides).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Validate a database descriptor and print its fields.
    Parse(ParseArgs),

    /// Print the resolved value of one or more keys.
    Get(GetArgs),

    /// Print every key with precedence applied.
    Dump(DumpArgs),

    /// Print a key each time its value changes.
    Watch(WatchArgs),

    /// Resolve `${key}` placeholders in a file and print the result.
    Render(RenderArgs),
}

/// Where values come from. Shared by every command that builds a store.
#[derive(Args, Debug, Clone, Default)]
pub struct SourceArgs {
    /// Location to read (file path, file:, http(s): or classpath: URL).
    /// Repeat to layer; the first listed wins.
    #[arg(long = "location", short = 'l', value_name = "LOCATION")]
    pub locations: Vec<String>,

    /// Database descriptor (`dbURL#...||username#...||...`). Database values
    /// override every location.
    #[arg(long, value_name = "DESCRIPTOR")]
    pub db: Option<String>,

    /// Skip locations that cannot be found instead of failing.
    #[arg(long, default_value_t = false)]
    pub ignore_missing: bool,

    /// Keep keys that disappear from a source.
    #[arg(long, default_value_t = false)]
    pub ignore_deletes: bool,

    /// Milliseconds between refreshes.
    #[arg(long, value_name = "MILLIS")]
    pub delay_millis: Option<u64>,

    /// Milliseconds before the first scheduled refresh.
    #[arg(long, value_name = "MILLIS")]
    pub initial_delay_millis: Option<u64>,

    /// Directory searched for classpath: locations. Repeatable.
    #[arg(long = "resource-root", value_name = "DIR")]
    pub resource_roots: Vec<PathBuf>,
}

impl SourceArgs {
    /// At least one source is required.
    pub fn validate(&self) -> Result<(), String> {
        if self.locations.is_empty() && self.db.is_none() {
            return Err("no sources given: pass --location and/or --db".to_string());
        }
        Ok(())
    }

    /// Layer CLI flags over loaded settings.
    pub fn apply(&self, settings: &mut Settings) {
        if self.ignore_missing {
            settings.sources.ignore_missing = true;
        }
        if self.ignore_deletes {
            settings.polling.ignore_deletes = true;
        }
        if let Some(millis) = self.delay_millis {
            settings.polling.delay_millis = millis;
        }
        if let Some(millis) = self.initial_delay_millis {
            settings.polling.initial_delay_millis = millis;
        }
        if !self.resource_roots.is_empty() {
            settings.sources.resource_roots = self.resource_roots.clone();
        }
    }
}

/// Arguments for the `parse` subcommand.
#[derive(Parser, Debug)]
pub struct ParseArgs {
    /// The descriptor string.
    pub descriptor: String,

    /// Emit JSON instead of text.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

/// Arguments for the `get` subcommand.
#[derive(Parser, Debug)]
pub struct GetArgs {
    #[command(flatten)]
    pub sources: SourceArgs,

    /// Emit JSON instead of text.
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// Keys to look up.
    #[arg(required = true)]
    pub keys: Vec<String>,
}

/// Arguments for the `dump` subcommand.
#[derive(Parser, Debug)]
pub struct DumpArgs {
    #[command(flatten)]
    pub sources: SourceArgs,

    /// Emit JSON instead of text.
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

/// Arguments for the `watch` subcommand.
#[derive(Parser, Debug)]
pub struct WatchArgs {
    #[command(flatten)]
    pub sources: SourceArgs,

    /// Key to watch.
    pub key: String,

    /// Seconds between checks.
    #[arg(long, default_value_t = 1)]
    pub every: u64,

    /// Stop after this many changes.
    #[arg(long)]
    pub changes: Option<usize>,
}

/// Arguments for the `render` subcommand.
#[derive(Parser, Debug)]
pub struct RenderArgs {
    #[command(flatten)]
    pub sources: SourceArgs,

    /// Template file containing `${key}` placeholders.
    pub file: PathBuf,
}
