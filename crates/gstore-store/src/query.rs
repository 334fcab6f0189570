use std::cmp::Ordering;

use gstore_types::{get_path, Key, Record, Value};

use crate::entity::StoredEntity;

/// Pseudo-field naming the entity key in `select` and `order` clauses.
/// Selecting only this field makes the query keys-only.
pub const KEY_FIELD: &str = "__key__";

/// Comparison operator of a property filter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Lt,
    Lte,
    Gt,
    Gte,
}

/// A property filter (`age >= 18`).
#[derive(Clone, Debug, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

/// A sort clause.
#[derive(Clone, Debug, PartialEq)]
pub struct Order {
    pub field: String,
    pub descending: bool,
}

/// A query over one kind, as the backing store accepts it.
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    pub kind: String,
    pub namespace: Option<String>,
    pub ancestor: Option<Key>,
    pub filters: Vec<Filter>,
    pub orders: Vec<Order>,
    pub select: Vec<String>,
    pub limit: Option<usize>,
    pub offset: usize,
    pub start: Option<String>,
}

impl Query {
    /// A query returning every entity of `kind`.
    pub fn new(kind: impl Into<String>, namespace: Option<String>) -> Self {
        Self {
            kind: kind.into(),
            namespace,
            ancestor: None,
            filters: Vec::new(),
            orders: Vec::new(),
            select: Vec::new(),
            limit: None,
            offset: 0,
            start: None,
        }
    }

    pub fn filter(mut self, field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn order(mut self, field: impl Into<String>, descending: bool) -> Self {
        self.orders.push(Order {
            field: field.into(),
            descending,
        });
        self
    }

    pub fn has_ancestor(mut self, ancestor: Key) -> Self {
        self.ancestor = Some(ancestor);
        self
    }

    pub fn select(mut self, fields: &[&str]) -> Self {
        self.select = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    /// Shorthand for `select(&[KEY_FIELD])`.
    pub fn keys_only(self) -> Self {
        self.select(&[KEY_FIELD])
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Resume after a cursor returned in a previous [`QueryResponse`].
    pub fn start(mut self, cursor: impl Into<String>) -> Self {
        self.start = Some(cursor.into());
        self
    }

    pub fn is_keys_only(&self) -> bool {
        self.select.len() == 1 && self.select[0] == KEY_FIELD
    }

    /// Returns `true` if `entity` satisfies kind, namespace, ancestor and
    /// filter constraints.
    pub fn matches(&self, entity: &StoredEntity) -> bool {
        let key = &entity.key;
        if key.kind != self.kind || key.namespace != self.namespace {
            return false;
        }
        if let Some(ancestor) = &self.ancestor {
            if !ancestor.is_ancestor_of(key) {
                return false;
            }
        }
        self.filters.iter().all(|filter| {
            let Some(actual) = get_path(&entity.data, &filter.field) else {
                return false;
            };
            let Some(ordering) = compare_values(actual, &filter.value) else {
                return false;
            };
            match filter.op {
                FilterOp::Eq => ordering == Ordering::Equal,
                FilterOp::Lt => ordering == Ordering::Less,
                FilterOp::Lte => ordering != Ordering::Greater,
                FilterOp::Gt => ordering == Ordering::Greater,
                FilterOp::Gte => ordering != Ordering::Less,
            }
        })
    }

    /// Apply the `select` projection to a matching entity.
    pub fn project(&self, entity: &StoredEntity) -> StoredEntity {
        if self.select.is_empty() {
            return entity.clone();
        }
        let data: Record = self
            .select
            .iter()
            .filter(|field| field.as_str() != KEY_FIELD)
            .filter_map(|field| entity.data.get(field).map(|v| (field.clone(), v.clone())))
            .collect();
        StoredEntity::new(entity.key.clone(), data)
    }
}

/// A page of query results.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryResponse {
    pub entities: Vec<StoredEntity>,
    /// Cursor positioned after the last returned entity.
    pub end_cursor: Option<String>,
    /// `true` when entities beyond this page may exist.
    pub more_results: bool,
}

impl QueryResponse {
    pub fn keys(&self) -> Vec<Key> {
        self.entities.iter().map(|e| e.key.clone()).collect()
    }
}

/// Order two values of compatible types. Values of unrelated types are
/// incomparable.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Boolean(x), Value::Boolean(y)) => Some(x.cmp(y)),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Timestamp(x), Value::Timestamp(y)) => Some(x.cmp(y)),
        (Value::Key(x), Value::Key(y)) => Some(x.cmp(y)),
        (Value::Integer(x), Value::Integer(y)) => Some(x.cmp(y)),
        _ => {
            let x = a.as_f64()?;
            let y = b.as_f64()?;
            x.partial_cmp(&y)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: i64, age: i64, ancestor: Option<(&str, i64)>) -> StoredEntity {
        let mut key = Key::new("User").with_id(id);
        if let Some((kind, aid)) = ancestor {
            key = key.with_ancestors(vec![gstore_types::Ancestor::new(kind, aid)]);
        }
        let mut data = Record::new();
        data.insert("age".into(), Value::Integer(age));
        data.insert("name".into(), Value::from(format!("user-{id}")));
        StoredEntity::new(key, data)
    }

    #[test]
    fn kind_and_namespace_must_match() {
        let query = Query::new("User", None);
        assert!(query.matches(&user(1, 20, None)));
        assert!(!Query::new("Post", None).matches(&user(1, 20, None)));
        assert!(!Query::new("User", Some("ns".into())).matches(&user(1, 20, None)));
    }

    #[test]
    fn ancestor_scope() {
        let query = Query::new("User", None).has_ancestor(Key::new("Company").with_id(1));
        assert!(query.matches(&user(1, 20, Some(("Company", 1)))));
        assert!(!query.matches(&user(2, 20, Some(("Company", 2)))));
        assert!(!query.matches(&user(3, 20, None)));
    }

    #[test]
    fn filters() {
        let adults = Query::new("User", None).filter("age", FilterOp::Gte, 18);
        assert!(adults.matches(&user(1, 18, None)));
        assert!(!adults.matches(&user(2, 17, None)));

        let exact = Query::new("User", None).filter("name", FilterOp::Eq, "user-3");
        assert!(exact.matches(&user(3, 1, None)));
        assert!(!exact.matches(&user(4, 1, None)));

        let missing = Query::new("User", None).filter("email", FilterOp::Eq, "x");
        assert!(!missing.matches(&user(5, 1, None)));
    }

    #[test]
    fn keys_only_projection() {
        let query = Query::new("User", None).keys_only();
        assert!(query.is_keys_only());
        let projected = query.project(&user(1, 20, None));
        assert!(projected.data.is_empty());
        assert_eq!(projected.key, Key::new("User").with_id(1));
    }

    #[test]
    fn field_projection() {
        let query = Query::new("User", None).select(&["name"]);
        let projected = query.project(&user(1, 20, None));
        assert_eq!(projected.data.len(), 1);
        assert!(projected.data.contains_key("name"));
    }

    #[test]
    fn mixed_numeric_comparison() {
        assert_eq!(
            compare_values(&Value::Integer(2), &Value::Double(1.5)),
            Some(Ordering::Greater)
        );
        assert_eq!(compare_values(&Value::from("a"), &Value::Integer(1)), None);
    }
}
