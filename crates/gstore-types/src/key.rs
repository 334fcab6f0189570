use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

// ---------------------------------------------------------------------------
// KeyId
// ---------------------------------------------------------------------------

/// The identifier segment of a key path.
///
/// The store distinguishes numeric ids from string names: `Id(123)` and
/// `Name("123")` address two different entities.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyId {
    /// Numeric identifier, usually allocated by the store.
    Id(i64),
    /// String identifier chosen by the application.
    Name(String),
}

impl KeyId {
    /// Returns the numeric id, if this is an `Id`.
    pub fn as_id(&self) -> Option<i64> {
        match self {
            Self::Id(id) => Some(*id),
            Self::Name(_) => None,
        }
    }

    /// Returns the string name, if this is a `Name`.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Self::Id(_) => None,
            Self::Name(name) => Some(name),
        }
    }
}

impl fmt::Debug for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Name(name) => write!(f, "{name:?}"),
        }
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Name(name) => write!(f, "{name}"),
        }
    }
}

impl From<i64> for KeyId {
    fn from(id: i64) -> Self {
        Self::Id(id)
    }
}

impl From<i32> for KeyId {
    fn from(id: i32) -> Self {
        Self::Id(i64::from(id))
    }
}

impl From<&str> for KeyId {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for KeyId {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

// ---------------------------------------------------------------------------
// Ancestor
// ---------------------------------------------------------------------------

/// One complete `(kind, id)` element of an ancestor path.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Ancestor {
    pub kind: String,
    pub id: KeyId,
}

impl Ancestor {
    pub fn new(kind: impl Into<String>, id: impl Into<KeyId>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }

    /// Parse the `Kind:id` notation used on the command line.
    ///
    /// Ids made only of digits are numeric; everything else is a name.
    pub fn parse(s: &str) -> Result<Self, TypeError> {
        let (kind, id) = s
            .split_once(':')
            .ok_or_else(|| TypeError::InvalidKey(format!("expected Kind:id, got '{s}'")))?;
        if kind.is_empty() || id.is_empty() {
            return Err(TypeError::InvalidKey(format!("expected Kind:id, got '{s}'")));
        }
        let id = match id.parse::<i64>() {
            Ok(n) => KeyId::Id(n),
            Err(_) => KeyId::Name(id.to_string()),
        };
        Ok(Self::new(kind, id))
    }
}

// ---------------------------------------------------------------------------
// Key
// ---------------------------------------------------------------------------

/// Hierarchical entity key.
///
/// A key is the full path `ancestors ++ [(kind, id)]` inside an optional
/// namespace. A key without an id is *incomplete*: the store assigns the id
/// on first save, after which it never changes.
///
/// Equality is structural over `(namespace, ancestors, kind, id)`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Key {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ancestors: Vec<Ancestor>,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<KeyId>,
}

impl Key {
    /// An incomplete key for `kind` with no ancestors and no namespace.
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            namespace: None,
            ancestors: Vec::new(),
            kind: kind.into(),
            id: None,
        }
    }

    /// Set the trailing identifier.
    pub fn with_id(mut self, id: impl Into<KeyId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the ancestor path.
    pub fn with_ancestors(mut self, ancestors: Vec<Ancestor>) -> Self {
        self.ancestors = ancestors;
        self
    }

    /// Set the namespace.
    pub fn with_namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace;
        self
    }

    /// Returns `true` once the key carries an identifier.
    pub fn is_complete(&self) -> bool {
        self.id.is_some()
    }

    /// Number of path elements, including this key's own element.
    pub fn depth(&self) -> usize {
        self.ancestors.len() + 1
    }

    /// The immediate parent key, if the key has ancestors.
    pub fn parent(&self) -> Option<Key> {
        let (last, rest) = self.ancestors.split_last()?;
        Some(Key {
            namespace: self.namespace.clone(),
            ancestors: rest.to_vec(),
            kind: last.kind.clone(),
            id: Some(last.id.clone()),
        })
    }

    /// This key expressed as an ancestor element. Incomplete keys cannot
    /// be ancestors.
    pub fn as_ancestor(&self) -> Result<Ancestor, TypeError> {
        let id = self
            .id
            .clone()
            .ok_or_else(|| TypeError::InvalidKey(format!("incomplete key {self} used as ancestor")))?;
        Ok(Ancestor {
            kind: self.kind.clone(),
            id,
        })
    }

    /// Returns `true` if `self` is a strict prefix of `other`'s path in the
    /// same namespace.
    pub fn is_ancestor_of(&self, other: &Key) -> bool {
        if self.namespace != other.namespace || self.ancestors.len() >= other.ancestors.len() {
            return false;
        }
        let Ok(own) = self.as_ancestor() else {
            return false;
        };
        other.ancestors[..self.ancestors.len()] == self.ancestors[..]
            && other.ancestors[self.ancestors.len()] == own
    }

    /// Canonical string form used as a map key by caches and loaders.
    ///
    /// Format: `namespace|Kind:id/Kind:"name"`. Names are quoted so that
    /// `Id(1)` and `Name("1")` never collide.
    pub fn canonical(&self) -> String {
        let mut out = String::new();
        if let Some(ns) = &self.namespace {
            out.push_str(ns);
        }
        out.push('|');
        for ancestor in &self.ancestors {
            out.push_str(&format!("{}:{:?}/", ancestor.kind, ancestor.id));
        }
        out.push_str(&self.kind);
        if let Some(id) = &self.id {
            out.push_str(&format!(":{id:?}"));
        }
        out
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", self.canonical())
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical())
    }
}
