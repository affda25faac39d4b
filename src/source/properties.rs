//! Content formats understood by location sources.
//!
//! `.properties` files follow the Java conventions: `key=value`,
//! `key: value` or `key value`, `#`/`!` comment lines, a trailing backslash
//! continues a value on the next line, and `\t`, `\n`, `\uXXXX` style
//! escapes. Locations ending in `.toml` are read as TOML and flattened into
//! dotted keys.

use super::{Snapshot, SourceError};

/// How the bytes at a location are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    Properties,
    Toml,
}

impl Format {
    /// Pick a format from a location's path (query strings ignored).
    pub fn for_location(location: &str) -> Self {
        let path = location.split(['?', '#']).next().unwrap_or(location);
        if path.to_ascii_lowercase().ends_with(".toml") {
            Format::Toml
        } else {
            Format::Properties
        }
    }

    /// Parse `content` read from `origin`.
    pub fn parse(self, origin: &str, content: &str) -> Result<Snapshot, SourceError> {
        match self {
            Format::Properties => Ok(parse_properties(content)),
            Format::Toml => parse_toml(content).map_err(|e| SourceError::format(origin, e)),
        }
    }
}

/// Parse Java-style properties. Later duplicates overwrite earlier ones.
pub fn parse_properties(content: &str) -> Snapshot {
    let mut snapshot = Snapshot::new();
    for line in logical_lines(content) {
        let (key, value) = split_entry(&line);
        snapshot.insert(unescape(key), unescape(value));
    }
    snapshot
}

/// Join continuation lines and drop comments and blanks.
fn logical_lines(content: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current: Option<String> = None;

    for raw in content.lines() {
        let part = match current {
            Some(_) => raw.trim_start(),
            None => {
                let trimmed = raw.trim_start();
                if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('!') {
                    continue;
                }
                trimmed
            }
        };

        let continues = trailing_backslashes(part) % 2 == 1;
        let body = if continues { &part[..part.len() - 1] } else { part };
        current.get_or_insert_with(String::new).push_str(body);

        if !continues {
            lines.extend(current.take());
        }
    }
    // a dangling continuation on the last line still counts
    lines.extend(current);
    lines
}

fn trailing_backslashes(s: &str) -> usize {
    s.chars().rev().take_while(|c| *c == '\\').count()
}

/// Split a logical line at the first unescaped `=`, `:` or whitespace.
fn split_entry(line: &str) -> (&str, &str) {
    let mut escaped = false;
    let mut key_end = line.len();
    for (i, c) in line.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' => escaped = true,
            '=' | ':' | ' ' | '\t' | '\u{c}' => {
                key_end = i;
                break;
            }
            _ => {}
        }
    }

    let key = &line[..key_end];
    let mut rest = line[key_end..].trim_start_matches([' ', '\t', '\u{c}']);
    if let Some(stripped) = rest.strip_prefix(['=', ':']) {
        rest = stripped.trim_start_matches([' ', '\t', '\u{c}']);
    }
    (key, rest)
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('f') => out.push('\u{c}'),
            Some('u') => {
                let hex: String = chars.clone().take(4).collect();
                match u32::from_str_radix(&hex, 16).ok().and_then(char::from_u32) {
                    Some(decoded) if hex.len() == 4 => {
                        out.push(decoded);
                        for _ in 0..4 {
                            chars.next();
                        }
                    }
                    _ => out.push('u'),
                }
            }
            Some(other) => out.push(other),
            None => {}
        }
    }
    out
}

/// Parse TOML and flatten nested tables into dotted keys.
///
/// Arrays become comma-separated lists; strings are taken verbatim.
pub fn parse_toml(content: &str) -> Result<Snapshot, toml::de::Error> {
    let table: toml::Table = toml::from_str(content)?;
    let mut snapshot = Snapshot::new();
    flatten_table("", &table, &mut snapshot);
    Ok(snapshot)
}

fn flatten_table(prefix: &str, table: &toml::Table, out: &mut Snapshot) {
    for (key, value) in table {
        let full = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            toml::Value::Table(inner) => flatten_table(&full, inner, out),
            other => {
                out.insert(full, scalar_text(other));
            }
        }
    }
}

fn scalar_text(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        toml::Value::Array(items) => items
            .iter()
            .map(scalar_text)
            .collect::<Vec<_>>()
            .join(","),
        other => other.to_string(),
    }
}
