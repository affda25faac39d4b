//! Database connection descriptors.
//!
//! A descriptor is the compact `key#value||key#value||...` string that
//! carries everything needed to build a database-backed configuration
//! source: the connection URL, credentials, the query and the two columns
//! holding keys and values.

pub mod parser;

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};
use thiserror::Error;

pub use parser::parse;

/// Grammar echoed back to operators whenever a descriptor is rejected.
pub const DESCRIPTOR_GRAMMAR: &str = "dbURL#<jdbc:postgresql://localhost:5432/app>||username#<user>||\
password#<password>||sqlQuery#<select distinct property_key, property_value from site_properties>||\
keyColumnName#<property_key>||valueColumnName#<property_value>";

/// Separator between descriptor segments.
pub const SEGMENT_DELIMITER: &str = "||";

/// Separator between a segment's key and value.
pub const KEY_VALUE_DELIMITER: char = '#';

/// Number of segments a descriptor must contain.
pub const EXPECTED_SEGMENT_COUNT: usize = 6;

/// The six parameters every descriptor carries.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, AsRefStr, Display, EnumIter, EnumString,
)]
pub enum DescriptorKey {
    #[strum(serialize = "dbURL")]
    DbUrl,
    #[strum(serialize = "username")]
    Username,
    #[strum(serialize = "password")]
    Password,
    #[strum(serialize = "sqlQuery")]
    SqlQuery,
    #[strum(serialize = "keyColumnName")]
    KeyColumnName,
    #[strum(serialize = "valueColumnName")]
    ValueColumnName,
}

/// Reasons a descriptor is rejected. Every message repeats the grammar.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DescriptorError {
    #[error("connection descriptor is empty; expected format: {}", DESCRIPTOR_GRAMMAR)]
    Empty,

    #[error(
        "connection descriptor has {found} segments, expected {expected}; expected format: {}",
        DESCRIPTOR_GRAMMAR
    )]
    SegmentCount { found: usize, expected: usize },

    #[error(
        "descriptor segment {index} must be `key#value` with exactly one `#`; expected format: {}",
        DESCRIPTOR_GRAMMAR
    )]
    MalformedSegment { index: usize },

    #[error("unknown descriptor key `{key}`; expected format: {}", DESCRIPTOR_GRAMMAR)]
    UnknownKey { key: String },

    #[error("descriptor key `{key}` appears more than once; expected format: {}", DESCRIPTOR_GRAMMAR)]
    DuplicateKey { key: String },

    #[error("descriptor is missing `{key}`; expected format: {}", DESCRIPTOR_GRAMMAR)]
    MissingKey { key: String },
}

/// A validated set of connection parameters. All six keys are always present.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    entries: BTreeMap<DescriptorKey, String>,
}

impl ConnectionDescriptor {
    /// Build a descriptor from an already split mapping (e.g. one assembled
    /// by hand or read from a settings file).
    ///
    /// Rejects unknown keys and requires all six known keys.
    pub fn from_map(map: HashMap<String, String>) -> Result<Self, DescriptorError> {
        let mut entries = BTreeMap::new();
        for (name, value) in map {
            let key: DescriptorKey = name
                .parse()
                .map_err(|_| DescriptorError::UnknownKey { key: name.clone() })?;
            entries.insert(key, value);
        }
        Self::from_entries(entries)
    }

    pub(crate) fn from_entries(
        entries: BTreeMap<DescriptorKey, String>,
    ) -> Result<Self, DescriptorError> {
        if let Some(missing) = DescriptorKey::iter().find(|k| !entries.contains_key(k)) {
            return Err(DescriptorError::MissingKey {
                key: missing.to_string(),
            });
        }
        Ok(Self { entries })
    }

    /// Value of one parameter.
    pub fn get(&self, key: DescriptorKey) -> &str {
        // from_entries guarantees presence
        self.entries.get(&key).map(String::as_str).unwrap_or_default()
    }

    pub fn db_url(&self) -> &str {
        self.get(DescriptorKey::DbUrl)
    }

    pub fn username(&self) -> &str {
        self.get(DescriptorKey::Username)
    }

    pub fn password(&self) -> &str {
        self.get(DescriptorKey::Password)
    }

    pub fn sql_query(&self) -> &str {
        self.get(DescriptorKey::SqlQuery)
    }

    pub fn key_column(&self) -> &str {
        self.get(DescriptorKey::KeyColumnName)
    }

    pub fn value_column(&self) -> &str {
        self.get(DescriptorKey::ValueColumnName)
    }

    /// The descriptor as a plain name-to-value mapping.
    pub fn to_map(&self) -> HashMap<String, String> {
        self.entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    /// Number of parameters (always six).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate parameters in canonical order with the password masked.
    pub fn redacted(&self) -> impl Iterator<Item = (DescriptorKey, &str)> {
        self.entries.iter().map(|(k, v)| match k {
            DescriptorKey::Password if !v.is_empty() => (*k, "[REDACTED]"),
            _ => (*k, v.as_str()),
        })
    }
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.redacted().map(|(k, v)| (k.as_ref().to_string(), v)))
            .finish()
    }
}

impl std::str::FromStr for ConnectionDescriptor {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}
