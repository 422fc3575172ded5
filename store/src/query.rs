//! Field queries with ordering, offset and limit.
//!
//! Backends collect a collection's documents and hand them to
//! [`Query::evaluate`], so every backend answers queries identically.

use serde_json::Value;
use std::cmp::Ordering;

use crate::{DocKey, Document, Snapshot};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Filter {
    /// Top-level field name, or a dotted path into nested objects.
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    fn matches(&self, doc: &Document) -> bool {
        let Some(actual) = lookup(doc, &self.field) else {
            return false;
        };
        let Some(ordering) = compare(actual, &self.value) else {
            return false;
        };
        match self.op {
            FilterOp::Eq => ordering == Ordering::Equal,
            FilterOp::Lt => ordering == Ordering::Less,
            FilterOp::Le => ordering != Ordering::Greater,
            FilterOp::Gt => ordering == Ordering::Greater,
            FilterOp::Ge => ordering != Ordering::Less,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

/// A query over one collection. Results are ordered by the `order_by`
/// fields and then by document id, so pagination is stable.
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<Filter>,
    pub order_by: Vec<(String, Direction)>,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            filters: Vec::new(),
            order_by: Vec::new(),
            offset: 0,
            limit: None,
        }
    }

    pub fn filter(
        mut self,
        field: impl Into<String>,
        op: FilterOp,
        value: impl Into<Value>,
    ) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn where_eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(field, FilterOp::Eq, value)
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by.push((field.into(), direction));
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether a document passes every filter.
    pub fn matches(&self, doc: &Document) -> bool {
        self.filters.iter().all(|f| f.matches(doc))
    }

    /// Filter, sort and page a collection's documents.
    pub fn evaluate<'a, I>(&self, docs: I) -> Vec<Snapshot>
    where
        I: IntoIterator<Item = (&'a DocKey, &'a Document)>,
    {
        let mut hits: Vec<(&DocKey, &Document)> = docs
            .into_iter()
            .filter(|(key, doc)| key.collection == self.collection && self.matches(doc))
            .collect();

        hits.sort_by(|(ka, da), (kb, db)| {
            for (field, direction) in &self.order_by {
                let ordering = order_values(lookup(da, field), lookup(db, field));
                let ordering = match direction {
                    Direction::Asc => ordering,
                    Direction::Desc => ordering.reverse(),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            ka.id.cmp(&kb.id)
        });

        hits.into_iter()
            .skip(self.offset)
            .take(self.limit.unwrap_or(usize::MAX))
            .map(|(key, doc)| Snapshot {
                key: key.clone(),
                data: doc.clone(),
            })
            .collect()
    }
}

fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Compare two JSON scalars of the same kind.
fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
                Some(x.cmp(&y))
            } else {
                x.as_f64()?.partial_cmp(&y.as_f64()?)
            }
        }
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

/// Total order for sorting: missing and null first, then by value.
fn order_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(x), Some(y)) => compare(x, y).unwrap_or(Ordering::Equal),
    }
}
