//! Reference population: replace key-valued fields with the entities they
//! point to.
//!
//! References are resolved level by level (`author` before
//! `author.company`), with one batched load per level across every root.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::debug;

use gstore_store::StoredEntity;
use gstore_types::{parent_record, set_path, Key, Record, Value};

use crate::entity::{Entity, PlainOptions};
use crate::error::{KeyError, OdmResult};
use crate::loader::Loader;
use crate::model::Model;
use crate::schema::Schema;
use crate::serializer::ID_FIELD;

/// Which fields of a referenced entity to splice in.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Select {
    /// Every readable field.
    #[default]
    All,
    /// Only these fields, plus `id`.
    Fields(Vec<String>),
}

/// One reference to resolve.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PopulateRef {
    /// Dotted path of the key-valued field.
    pub path: String,
    pub select: Select,
}

impl PopulateRef {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            select: Select::All,
        }
    }

    pub fn fields(path: impl Into<String>, fields: &[&str]) -> Self {
        Self {
            path: path.into(),
            select: Select::Fields(fields.iter().map(|f| f.to_string()).collect()),
        }
    }

    /// Nesting depth: `author` is 0, `author.company` is 1.
    pub fn level(&self) -> usize {
        self.path.matches('.').count()
    }
}

/// Resolve `refs` on every root in place. With no refs, the schema's
/// declared reference paths are used.
///
/// A reference whose parent record is missing is skipped. An absent or
/// null reference becomes `Null`. A non-key value fails the whole level
/// before anything at that level is written.
pub(crate) async fn populate_entities(
    roots: &mut [Entity],
    refs: Vec<PopulateRef>,
    loader: Option<Arc<dyn Loader>>,
) -> OdmResult<()> {
    let Some(first) = roots.first() else {
        return Ok(());
    };
    let model = first.model().clone();
    let refs = if refs.is_empty() {
        model
            .schema()
            .reference_paths()
            .into_iter()
            .map(PopulateRef::new)
            .collect()
    } else {
        refs
    };
    if refs.is_empty() {
        return Ok(());
    }
    let loader: Arc<dyn Loader> = loader.unwrap_or_else(|| Arc::new(model.shared().data_loader()));

    let mut levels: BTreeMap<usize, Vec<PopulateRef>> = BTreeMap::new();
    for reference in refs {
        levels.entry(reference.level()).or_default().push(reference);
    }

    let mut targets: HashMap<String, Model> = HashMap::new();
    for (level, refs) in levels {
        // Collect every slot at this level before writing any of them.
        let mut slots: Vec<(usize, &PopulateRef, Option<Key>)> = Vec::new();
        for (index, root) in roots.iter().enumerate() {
            for reference in &refs {
                let Some((parent, leaf)) = parent_record(root.data(), &reference.path) else {
                    continue;
                };
                match parent.get(leaf) {
                    None | Some(Value::Null) => slots.push((index, reference, None)),
                    Some(Value::Key(key)) => slots.push((index, reference, Some(key.clone()))),
                    Some(_) => {
                        return Err(KeyError::NotAKey {
                            path: reference.path.clone(),
                        }
                        .into())
                    }
                }
            }
        }

        let mut unique: Vec<Key> = Vec::new();
        let mut seen = std::collections::HashSet::new();
        for key in slots.iter().filter_map(|(_, _, key)| key.as_ref()) {
            if seen.insert(key.canonical()) {
                unique.push(key.clone());
            }
        }
        let loaded: HashMap<String, StoredEntity> = if unique.is_empty() {
            HashMap::new()
        } else {
            loader
                .load_many(&unique)
                .await?
                .into_iter()
                .flatten()
                .map(|entity| (entity.key.canonical(), entity))
                .collect()
        };
        debug!(level, slots = slots.len(), keys = unique.len(), found = loaded.len(), "populate level");

        for (index, reference, key) in slots {
            let value = match key.and_then(|key| loaded.get(&key.canonical())) {
                Some(stored) => {
                    let target = target_model(&model, &mut targets, &stored.key.kind)?;
                    Value::Entity(project(&target.hydrate(stored.clone()), &reference.select))
                }
                None => Value::Null,
            };
            set_path(roots[index].data_mut(), &reference.path, value).map_err(KeyError::from)?;
        }
    }

    for root in roots.iter_mut() {
        root.refresh_exclusions();
    }
    Ok(())
}

/// The model used to hydrate a referenced kind: one built on the
/// registered schema, or an ad-hoc model that admits any field when the
/// kind was never registered.
fn target_model(source: &Model, cache: &mut HashMap<String, Model>, kind: &str) -> OdmResult<Model> {
    if let Some(model) = cache.get(kind) {
        return Ok(model.clone());
    }
    let model = if kind == source.kind() {
        source.clone()
    } else {
        let schema = match source.shared().schema_of(kind) {
            Some(schema) => schema,
            None => open_schema()?,
        };
        Model::new(kind, schema, Arc::clone(source.shared()))
    };
    cache.insert(kind.to_string(), model.clone());
    Ok(model)
}

fn open_schema() -> OdmResult<Arc<Schema>> {
    Schema::builder().admit_unknown_fields().build()
}

fn project(entity: &Entity, select: &Select) -> Record {
    let plain = entity.plain(PlainOptions::default());
    match select {
        Select::All => plain,
        Select::Fields(fields) => plain
            .into_iter()
            .filter(|(field, _)| field == ID_FIELD || fields.contains(field))
            .collect(),
    }
}
