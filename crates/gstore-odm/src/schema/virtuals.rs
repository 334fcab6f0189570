use std::fmt;
use std::sync::Arc;

use gstore_types::{Record, Value};

type Getter = Arc<dyn Fn(&Record) -> Value + Send + Sync>;
type Setter = Arc<dyn Fn(&mut Record, Value) + Send + Sync>;

/// A computed, never persisted property.
///
/// The getter derives a value from the stored fields; the setter
/// decomposes an assigned value back into stored fields.
#[derive(Clone, Default)]
pub struct VirtualField {
    getter: Option<Getter>,
    setter: Option<Setter>,
}

impl VirtualField {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(mut self, getter: impl Fn(&Record) -> Value + Send + Sync + 'static) -> Self {
        self.getter = Some(Arc::new(getter));
        self
    }

    pub fn set(mut self, setter: impl Fn(&mut Record, Value) + Send + Sync + 'static) -> Self {
        self.setter = Some(Arc::new(setter));
        self
    }

    /// Compute the value. `None` when the field has no getter.
    pub fn apply_get(&self, record: &Record) -> Option<Value> {
        self.getter.as_ref().map(|getter| getter(record))
    }

    /// Assign the value. Returns `false` when the field has no setter.
    pub fn apply_set(&self, record: &mut Record, value: Value) -> bool {
        match &self.setter {
            Some(setter) => {
                setter(record, value);
                true
            }
            None => false,
        }
    }
}

impl fmt::Debug for VirtualField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VirtualField")
            .field("getter", &self.getter.is_some())
            .field("setter", &self.setter.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_name() -> VirtualField {
        VirtualField::new()
            .get(|r| {
                let first = r.get("firstname").and_then(Value::as_str).unwrap_or_default();
                let last = r.get("lastname").and_then(Value::as_str).unwrap_or_default();
                Value::from(format!("{first} {last}"))
            })
            .set(|r, v| {
                if let Some(text) = v.as_str() {
                    let mut parts = text.splitn(2, ' ');
                    r.insert("firstname".into(), Value::from(parts.next().unwrap_or_default()));
                    r.insert("lastname".into(), Value::from(parts.next().unwrap_or_default()));
                }
            })
    }

    #[test]
    fn getter_reads_stored_fields() {
        let mut record = Record::new();
        record.insert("firstname".into(), Value::from("John"));
        record.insert("lastname".into(), Value::from("Snow"));
        assert_eq!(full_name().apply_get(&record), Some(Value::from("John Snow")));
    }

    #[test]
    fn setter_splits_value() {
        let mut record = Record::new();
        assert!(full_name().apply_set(&mut record, Value::from("Arya Stark")));
        assert_eq!(record.get("firstname"), Some(&Value::from("Arya")));
        assert_eq!(record.get("lastname"), Some(&Value::from("Stark")));
    }

    #[test]
    fn missing_accessors() {
        let field = VirtualField::new();
        let mut record = Record::new();
        assert!(field.apply_get(&record).is_none());
        assert!(!field.apply_set(&mut record, Value::Null));
    }
}
