//! Parser for the `key#value||key#value` descriptor format.

use std::collections::BTreeMap;

use super::{
    ConnectionDescriptor, DescriptorError, DescriptorKey, EXPECTED_SEGMENT_COUNT,
    KEY_VALUE_DELIMITER, SEGMENT_DELIMITER,
};

/// Parse a raw descriptor string.
///
/// Expected format (segments in any order, all six required):
/// ```text
/// dbURL#jdbc:x||username#u||password#p||sqlQuery#select k,v from t||keyColumnName#k||valueColumnName#v
/// ```
///
/// There is no partial success: any malformed segment rejects the whole
/// descriptor.
pub fn parse(raw: &str) -> Result<ConnectionDescriptor, DescriptorError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(DescriptorError::Empty);
    }

    let segments: Vec<&str> = raw.split(SEGMENT_DELIMITER).collect();
    if segments.len() != EXPECTED_SEGMENT_COUNT {
        return Err(DescriptorError::SegmentCount {
            found: segments.len(),
            expected: EXPECTED_SEGMENT_COUNT,
        });
    }

    let mut entries = BTreeMap::new();
    for (index, segment) in segments.into_iter().enumerate() {
        let (name, value) = split_segment(segment)
            .ok_or(DescriptorError::MalformedSegment { index: index + 1 })?;
        let key: DescriptorKey = name.parse().map_err(|_| DescriptorError::UnknownKey {
            key: name.to_string(),
        })?;
        if entries.insert(key, value.to_string()).is_some() {
            return Err(DescriptorError::DuplicateKey {
                key: key.to_string(),
            });
        }
    }

    ConnectionDescriptor::from_entries(entries)
}

/// Split `key#value`, rejecting segments with zero or several `#`.
fn split_segment(segment: &str) -> Option<(&str, &str)> {
    let (name, value) = segment.split_once(KEY_VALUE_DELIMITER)?;
    if value.contains(KEY_VALUE_DELIMITER) {
        return None;
    }
    Some((name.trim(), value))
}
