//! CLI command definitions and output formatting.
//!
//! Uses clap derive macros for ergonomic argument definitions.

pub mod args;

use colored::Colorize;
use serde_json::{Map, Value};

/// Text shown at the top of `--help`.
pub const ABOUT: &str =
    "Layered configuration from files, URLs and SQL queries, refreshed in the background";

/// `key = value` lines. Missing values are shown dimmed as `<unset>`.
pub fn format_text<'a>(entries: impl IntoIterator<Item = (&'a str, Option<&'a str>)>) -> String {
    let mut out = String::new();
    for (key, value) in entries {
        let value = match value {
            Some(v) => v.to_string(),
            None => "<unset>".dimmed().to_string(),
        };
        out.push_str(&format!("{} = {value}\n", key.bold()));
    }
    out
}

/// A JSON object; missing values become `null`.
pub fn format_json<'a>(entries: impl IntoIterator<Item = (&'a str, Option<&'a str>)>) -> String {
    let object: Map<String, Value> = entries
        .into_iter()
        .map(|(key, value)| {
            let value = value.map_or(Value::Null, |v| Value::String(v.to_string()));
            (key.to_string(), value)
        })
        .collect();
    serde_json::to_string_pretty(&Value::Object(object)).unwrap_or_default()
}
