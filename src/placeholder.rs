//! `${key}` placeholder resolution against a configuration.
//!
//! `${key}` is replaced by the value of `key`; `${key:default}` falls back
//! to `default` when the key is absent. Unresolvable placeholders stay in
//! the text untouched. Replacement values are themselves resolved, up to
//! [`MAX_DEPTH`] passes, which also bounds self-referencing values.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};

use crate::source::Snapshot;
use crate::store::ActiveConfiguration;

/// Maximum number of substitution passes.
pub const MAX_DEPTH: usize = 8;

static PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([^{}:]+)(?::([^{}]*))?\}").expect("placeholder pattern is valid")
});

/// Anything placeholders can be looked up in.
pub trait Lookup {
    fn lookup(&self, key: &str) -> Option<String>;
}

impl Lookup for ActiveConfiguration {
    fn lookup(&self, key: &str) -> Option<String> {
        self.get(key)
    }
}

impl Lookup for Snapshot {
    fn lookup(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

impl Lookup for HashMap<String, String> {
    fn lookup(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Replace every resolvable placeholder in `text`.
pub fn resolve(text: &str, source: &impl Lookup) -> String {
    let mut current = text.to_string();
    for _ in 0..MAX_DEPTH {
        let next = substitute(&current, source);
        if next == current {
            break;
        }
        current = next;
    }
    current
}

/// The value of `key` with placeholders inside it resolved.
pub fn resolve_key(key: &str, source: &impl Lookup) -> Option<String> {
    source.lookup(key).map(|value| resolve(&value, source))
}

fn substitute(text: &str, source: &impl Lookup) -> String {
    PLACEHOLDER_RE
        .replace_all(text, |caps: &Captures<'_>| {
            let key = caps[1].trim();
            source
                .lookup(key)
                .or_else(|| caps.get(2).map(|d| d.as_str().to_string()))
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn replaces_known_keys() {
        let v = values(&[("host", "db"), ("port", "5432")]);
        assert_eq!(resolve("jdbc://${host}:${port}/app", &v), "jdbc://db:5432/app");
    }

    #[test]
    fn default_used_only_when_absent() {
        let v = values(&[("present", "yes")]);
        assert_eq!(resolve("${present:no} ${absent:fallback}", &v), "yes fallback");
        assert_eq!(resolve("${absent:}", &v), "");
    }

    #[test]
    fn unresolved_placeholders_are_left_verbatim() {
        let v = values(&[]);
        assert_eq!(resolve("a ${missing} b", &v), "a ${missing} b");
        assert_eq!(resolve("$notaplaceholder {x}", &v), "$notaplaceholder {x}");
    }

    #[test]
    fn nested_values_resolve() {
        let v = values(&[("url", "http://${host}/"), ("host", "${name}.local"), ("name", "svc")]);
        assert_eq!(resolve("${url}", &v), "http://svc.local/");
        assert_eq!(resolve_key("url", &v).as_deref(), Some("http://svc.local/"));
        assert_eq!(resolve_key("nope", &v), None);
    }

    #[test]
    fn key_built_from_inner_placeholder() {
        let v = values(&[("env", "prod"), ("db.prod", "primary")]);
        assert_eq!(resolve("${db.${env}}", &v), "primary");
    }

    #[test]
    fn self_reference_terminates() {
        let v = values(&[("loop", "x${loop}")]);
        let out = resolve("${loop}", &v);
        assert!(out.starts_with("xxxxxxxx"));
        assert!(out.ends_with("${loop}"));
    }
}
