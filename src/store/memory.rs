// In-process document store. Backs the test suite and small embedded uses;
// anything durable lives behind its own DocumentStore implementation.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::document::{Document, DocumentId, ID_FIELD};
use crate::error::{DocweaveError, Result};

use super::{DocumentStore, Filter, SortDirection, SortSpec, StoreCursor};

#[derive(Clone, Default)]
pub struct MemoryStore {
    collections: Arc<Mutex<HashMap<String, Vec<Document>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    fn matching(&self, collection: &str, filter: &Filter) -> Vec<Document> {
        let guard = self.collections.lock().unwrap();
        guard
            .get(collection)
            .map(|docs| docs.iter().filter(|doc| filter.matches(doc)).cloned().collect())
            .unwrap_or_default()
    }

    fn store_new(&self, collection: &str, mut document: Document) -> Document {
        if !document.contains_key(ID_FIELD) {
            document.insert(
                ID_FIELD.to_string(),
                Value::String(DocumentId::generate().to_hex()),
            );
        }
        let mut guard = self.collections.lock().unwrap();
        guard
            .entry(collection.to_string())
            .or_default()
            .push(document.clone());
        document
    }
}

/// Merge an update into a document. A `$set` document merges its keys;
/// anything else replaces the document's fields, keeping the identity.
fn apply_update(doc: &mut Document, update: &Document) {
    if let Some(Value::Object(fields)) = update.get("$set") {
        for (key, value) in fields {
            doc.insert(key.clone(), value.clone());
        }
        return;
    }

    let id = doc.get(ID_FIELD).cloned();
    doc.clear();
    if let Some(id) = id {
        doc.insert(ID_FIELD.to_string(), id);
    }
    for (key, value) in update {
        if key != ID_FIELD {
            doc.insert(key.clone(), value.clone());
        }
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

pub struct MemoryCursor {
    store: MemoryStore,
    collection: String,
    filter: Filter,
    skip: Option<usize>,
    limit: Option<usize>,
    sort: Option<SortSpec>,
    comment: Option<String>,
    flags: Vec<(String, bool)>,
    closed: bool,
}

#[async_trait]
impl StoreCursor for MemoryCursor {
    fn skip(mut self: Box<Self>, count: usize) -> Box<dyn StoreCursor> {
        self.skip = Some(count);
        self
    }

    fn limit(mut self: Box<Self>, count: usize) -> Box<dyn StoreCursor> {
        self.limit = Some(count);
        self
    }

    fn sort(mut self: Box<Self>, spec: SortSpec) -> Box<dyn StoreCursor> {
        self.sort = Some(spec);
        self
    }

    fn filter(mut self: Box<Self>, filter: Filter) -> Box<dyn StoreCursor> {
        self.filter = Filter::And(vec![self.filter.clone(), filter]);
        self
    }

    fn comment(mut self: Box<Self>, comment: &str) -> Box<dyn StoreCursor> {
        self.comment = Some(comment.to_string());
        self
    }

    fn add_cursor_flag(mut self: Box<Self>, flag: &str, value: bool) -> Box<dyn StoreCursor> {
        self.flags.push((flag.to_string(), value));
        self
    }

    async fn to_array(&mut self) -> Result<Vec<Document>> {
        let mut docs = self.store.matching(&self.collection, &self.filter);

        if let Some(spec) = &self.sort {
            docs.sort_by(|a, b| {
                for (property, direction) in spec {
                    let left = a.get(property).unwrap_or(&Value::Null);
                    let right = b.get(property).unwrap_or(&Value::Null);
                    let ordering = match direction {
                        SortDirection::Ascending => compare_values(left, right),
                        SortDirection::Descending => compare_values(right, left),
                    };
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                Ordering::Equal
            });
        }

        let skip = self.skip.unwrap_or(0);
        let mut docs: Vec<Document> = docs.into_iter().skip(skip).collect();
        if let Some(limit) = self.limit {
            docs.truncate(limit);
        }

        self.closed = true;
        Ok(docs)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.store.matching(&self.collection, &self.filter).len())
    }

    async fn explain(&self) -> Result<Value> {
        let flags: Vec<&str> = self
            .flags
            .iter()
            .filter(|(_, enabled)| *enabled)
            .map(|(flag, _)| flag.as_str())
            .collect();
        Ok(json!({
            "collection": self.collection,
            "filter": format!("{:?}", self.filter),
            "skip": self.skip,
            "limit": self.limit,
            "comment": self.comment,
            "flags": flags,
        }))
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Document>> {
        Ok(self.matching(collection, filter).into_iter().next())
    }

    fn find(&self, collection: &str, filter: Filter) -> Box<dyn StoreCursor> {
        Box::new(MemoryCursor {
            store: self.clone(),
            collection: collection.to_string(),
            filter,
            skip: None,
            limit: None,
            sort: None,
            comment: None,
            flags: Vec::new(),
            closed: false,
        })
    }

    async fn insert_one(&self, collection: &str, document: Document) -> Result<Document> {
        Ok(self.store_new(collection, document))
    }

    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<Vec<Document>> {
        Ok(documents
            .into_iter()
            .map(|document| self.store_new(collection, document))
            .collect())
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: Document,
    ) -> Result<u64> {
        let mut guard = self.collections.lock().unwrap();
        if let Some(docs) = guard.get_mut(collection) {
            if let Some(doc) = docs.iter_mut().find(|doc| filter.matches(doc)) {
                apply_update(doc, &update);
                return Ok(1);
            }
        }
        Ok(0)
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        update: Document,
    ) -> Result<u64> {
        let mut guard = self.collections.lock().unwrap();
        let mut modified = 0;
        if let Some(docs) = guard.get_mut(collection) {
            for doc in docs.iter_mut().filter(|doc| filter.matches(doc)) {
                apply_update(doc, &update);
                modified += 1;
            }
        }
        Ok(modified)
    }

    async fn delete_one(&self, collection: &str, filter: &Filter) -> Result<u64> {
        let mut guard = self.collections.lock().unwrap();
        if let Some(docs) = guard.get_mut(collection) {
            if let Some(index) = docs.iter().position(|doc| filter.matches(doc)) {
                docs.remove(index);
                return Ok(1);
            }
        }
        Ok(0)
    }

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64> {
        let mut guard = self.collections.lock().unwrap();
        let mut deleted = 0;
        if let Some(docs) = guard.get_mut(collection) {
            let before = docs.len();
            docs.retain(|doc| !filter.matches(doc));
            deleted = (before - docs.len()) as u64;
        }
        Ok(deleted)
    }

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> Result<Vec<Document>> {
        let mut docs = self.matching(collection, &Filter::All);

        for stage in &pipeline {
            match stage.get("$match") {
                Some(Value::Object(criteria)) => {
                    docs.retain(|doc| {
                        criteria
                            .iter()
                            .all(|(property, value)| doc.get(property) == Some(value))
                    });
                }
                _ => {
                    let names: Vec<&String> = stage.keys().collect();
                    return Err(DocweaveError::Store(format!(
                        "Unsupported aggregation stage: {names:?}"
                    )));
                }
            }
        }

        Ok(docs)
    }
}
