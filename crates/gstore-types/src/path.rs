//! Dotted-path access into nested records (`address.city`).

use crate::error::TypeError;
use crate::value::{Record, Value};

/// Look up the value at a dotted path.
pub fn get_path<'a>(record: &'a Record, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = record.get(first)?;
    for segment in segments {
        current = current.as_record()?.get(segment)?;
    }
    Some(current)
}

/// Mutable lookup of the value at a dotted path.
pub fn get_path_mut<'a>(record: &'a mut Record, path: &str) -> Option<&'a mut Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = record.get_mut(first)?;
    for segment in segments {
        current = current.as_record_mut()?.get_mut(segment)?;
    }
    Some(current)
}

/// The record that holds the last segment of `path`, together with that
/// segment. Returns `None` when any intermediate segment is missing or is
/// not an embedded record.
pub fn parent_record<'a, 'p>(record: &'a Record, path: &'p str) -> Option<(&'a Record, &'p str)> {
    match path.rsplit_once('.') {
        None => Some((record, path)),
        Some((parent, leaf)) => {
            let parent = get_path(record, parent)?.as_record()?;
            Some((parent, leaf))
        }
    }
}

/// Write `value` at a dotted path, creating missing or null intermediate
/// records.
///
/// Fails if an intermediate segment holds any other non-record value.
pub fn set_path(record: &mut Record, path: &str, value: Value) -> Result<(), TypeError> {
    let mut segments: Vec<&str> = path.split('.').collect();
    let leaf = segments.pop().unwrap_or(path);
    let mut current = record;
    for segment in segments {
        let slot = current
            .entry(segment.to_string())
            .or_insert_with(|| Value::Entity(Record::new()));
        if slot.is_null() {
            *slot = Value::Entity(Record::new());
        }
        current = slot.as_record_mut().ok_or_else(|| TypeError::InvalidPath {
            path: path.to_string(),
        })?;
    }
    current.insert(leaf.to_string(), value);
    Ok(())
}
