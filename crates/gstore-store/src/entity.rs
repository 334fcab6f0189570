use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use gstore_types::{Key, Record};

/// An entity as held by the backing store: its key and raw data.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredEntity {
    pub key: Key,
    pub data: Record,
}

impl StoredEntity {
    pub fn new(key: Key, data: Record) -> Self {
        Self { key, data }
    }
}

/// How a write treats an existing entity under the same key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveMethod {
    /// Fail if the entity already exists.
    Insert,
    /// Fail if the entity does not exist.
    Update,
    /// Create or overwrite.
    #[default]
    Upsert,
}

impl fmt::Display for SaveMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Insert => write!(f, "insert"),
            Self::Update => write!(f, "update"),
            Self::Upsert => write!(f, "upsert"),
        }
    }
}

impl FromStr for SaveMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "insert" => Ok(Self::Insert),
            "update" => Ok(Self::Update),
            "upsert" => Ok(Self::Upsert),
            other => Err(format!("unknown save method '{other}'")),
        }
    }
}

/// One entity write in wire form.
#[derive(Clone, Debug, PartialEq)]
pub struct WriteSpec {
    pub key: Key,
    pub data: Record,
    pub method: SaveMethod,
    /// Dotted paths (`bio`, `tags[]`, `address.street`) the store must not
    /// index.
    pub exclude_from_indexes: Vec<String>,
    /// Ask the store to exclude any property too large to be indexed.
    pub exclude_large_properties: bool,
}

impl WriteSpec {
    /// An upsert with no index exclusions.
    pub fn upsert(key: Key, data: Record) -> Self {
        Self {
            key,
            data,
            method: SaveMethod::Upsert,
            exclude_from_indexes: Vec::new(),
            exclude_large_properties: false,
        }
    }
}

/// Acknowledgement of a save: the keys written, completed by the store
/// where the request carried incomplete keys. Same order as the request.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SaveAck {
    pub keys: Vec<Key>,
}

/// Acknowledgement of a delete.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeleteAck {
    /// Number of index rows the store touched. Zero means nothing existed
    /// under the requested keys.
    pub index_updates: u64,
}
