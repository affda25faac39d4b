//! Settings for the `layerconf` tool itself.
//!
//! Handles `.layerconf.toml` loading, environment variable resolution,
//! and CLI flag merging with proper priority ordering.

pub mod loader;

pub use loader::{PollingSettings, Settings, SettingsError, SourceSettings};
