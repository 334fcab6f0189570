//! Key derivation: kind + id + ancestor path + namespace.

use gstore_types::{Ancestor, Key, KeyId, Value};

use crate::error::KeyError;
use crate::schema::KeyType;

/// Ancestor path and namespace a key is derived under.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeyPath {
    pub ancestors: Vec<Ancestor>,
    pub namespace: Option<String>,
}

impl KeyPath {
    /// The root of the default namespace.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an ancestor.
    pub fn ancestor(mut self, kind: impl Into<String>, id: impl Into<KeyId>) -> Self {
        self.ancestors.push(Ancestor::new(kind, id));
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// The namespace to use, falling back to `default`.
    pub fn resolve_namespace(&self, default: Option<&str>) -> Option<String> {
        self.namespace.clone().or_else(|| default.map(str::to_string))
    }

    /// The key of the innermost ancestor, used to scope queries.
    pub fn ancestor_key(&self, default_namespace: Option<&str>) -> Option<Key> {
        let (last, rest) = self.ancestors.split_last()?;
        Some(
            Key::new(last.kind.clone())
                .with_id(last.id.clone())
                .with_ancestors(rest.to_vec())
                .with_namespace(self.resolve_namespace(default_namespace)),
        )
    }
}

/// Coerce a user-supplied id into a key identifier.
pub fn coerce_id(value: &Value, key_type: KeyType) -> Result<KeyId, KeyError> {
    let invalid = |reason: &str| KeyError::InvalidId {
        value: format!("{value:?}"),
        reason: reason.to_string(),
    };

    let integer = match value {
        Value::Integer(n) => Some(*n),
        Value::Double(f) => {
            if f.is_finite() && f.fract() == 0.0 && *f >= i64::MIN as f64 && *f <= i64::MAX as f64 {
                Some(*f as i64)
            } else {
                return Err(invalid("not an integral number"));
            }
        }
        Value::Boxed(boxed) => Some(boxed.as_i64().ok_or_else(|| invalid("not an integral number"))?),
        Value::String(_) => None,
        _ => return Err(invalid("ids must be strings or numbers")),
    };

    if let Some(n) = integer {
        return Ok(match key_type {
            KeyType::Name => KeyId::Name(n.to_string()),
            KeyType::Auto | KeyType::Id => KeyId::Id(n),
        });
    }

    let text = value.as_str().unwrap_or_default();
    if text.is_empty() {
        return Err(invalid("empty id"));
    }
    match key_type {
        KeyType::Name => Ok(KeyId::Name(text.to_string())),
        KeyType::Id => text
            .trim()
            .parse::<i64>()
            .map(KeyId::Id)
            .map_err(|_| invalid("keyType 'id' requires a numeric id")),
        KeyType::Auto => {
            if is_integer_text(text) {
                if let Ok(n) = text.parse::<i64>() {
                    return Ok(KeyId::Id(n));
                }
            }
            Ok(KeyId::Name(text.to_string()))
        }
    }
}

fn is_integer_text(text: &str) -> bool {
    let digits = text.strip_prefix('-').unwrap_or(text);
    !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit())
}

/// Derive one key. Without an id the key is incomplete.
pub fn derive_key(
    kind: &str,
    id: Option<&Value>,
    path: &KeyPath,
    default_namespace: Option<&str>,
    key_type: KeyType,
) -> Result<Key, KeyError> {
    let mut key = Key::new(kind)
        .with_ancestors(path.ancestors.clone())
        .with_namespace(path.resolve_namespace(default_namespace));
    if let Some(id) = id {
        key.id = Some(coerce_id(id, key_type)?);
    }
    Ok(key)
}

/// Derive one key per id, sharing ancestors and namespace. Output order
/// matches input order.
pub fn derive_keys(
    kind: &str,
    ids: &[Value],
    path: &KeyPath,
    default_namespace: Option<&str>,
    key_type: KeyType,
) -> Result<Vec<Key>, KeyError> {
    ids.iter()
        .map(|id| derive_key(kind, Some(id), path, default_namespace, key_type))
        .collect()
}
