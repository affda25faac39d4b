//! App-wide constants.
//!
//! Centralises the tool name, config paths, environment variable names,
//! parameter bundle keys and polling defaults.

/// Display name of the tool (lowercase).
pub const APP_NAME: &str = "layerconf";

/// CLI version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Local config filename (e.g. `.layerconf.toml` in the working directory).
pub const CONFIG_FILENAME: &str = ".layerconf.toml";

/// Directory name under `~/.config/` for global config.
pub const CONFIG_DIR: &str = "layerconf";

/// Default initial delay and refresh interval, in milliseconds.
pub const DEFAULT_DELAY_MILLIS: u64 = 1000;

/// Default timeout for fetching `http(s)` locations, in seconds.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

/// Default `tracing` filter when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "layerconf=info";

/// Filter used with `--verbose`.
pub const VERBOSE_LOG_FILTER: &str = "layerconf=debug";

// ── Parameter bundle keys ───────────────────────────────────────────

pub const PARAM_INITIAL_DELAY_MILLIS: &str = "initialDelayMillis";
pub const PARAM_DELAY_MILLIS: &str = "delayMillis";
pub const PARAM_IGNORE_DELETES: &str = "ignoreDeletesFromSource";
pub const PARAM_IGNORE_MISSING: &str = "ignoreResourceNotFound";

// ── Environment variable names ──────────────────────────────────────

pub const ENV_INITIAL_DELAY_MILLIS: &str = "LAYERCONF_INITIAL_DELAY_MILLIS";
pub const ENV_DELAY_MILLIS: &str = "LAYERCONF_DELAY_MILLIS";
pub const ENV_IGNORE_DELETES: &str = "LAYERCONF_IGNORE_DELETES";
pub const ENV_IGNORE_MISSING: &str = "LAYERCONF_IGNORE_MISSING";
pub const ENV_HTTP_TIMEOUT_SECS: &str = "LAYERCONF_HTTP_TIMEOUT_SECS";
