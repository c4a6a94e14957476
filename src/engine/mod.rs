mod cursor;

pub use cursor::EngineCursor;

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex};

use futures::future::{try_join_all, BoxFuture};
use serde_json::{Map, Value};

use crate::document::{self, Document, DocumentId, ID_FIELD};
use crate::error::{DocweaveError, Result};
use crate::schema::{FieldKind, ResolvedField, Schema};
use crate::store::{DocumentStore, Filter};

/// Accumulator for one read: collection name mapped to the ordered list of
/// resolved documents visited while walking the reference graph.
///
/// Cheap to clone; all clones share the same state. Lists are append-only
/// and keep visit order. Keys are created the first time a field references
/// the collection, even when no document ends up in the list.
#[derive(Clone, Default)]
pub struct ResultSet {
    inner: Arc<Mutex<Map<String, Value>>>,
}

impl ResultSet {
    pub fn new() -> Self {
        ResultSet::default()
    }

    /// Create the collection's key if this is the first reference to it.
    pub fn ensure_collection(&self, name: &str) {
        let mut guard = self.inner.lock().unwrap();
        guard
            .entry(name.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
    }

    /// Reserve the next position in a collection's list. The slot is filled
    /// once the document's fields have been resolved, so list order is visit
    /// order even while sub-traversals run concurrently.
    fn reserve_slot(&self, name: &str) -> usize {
        let mut guard = self.inner.lock().unwrap();
        let entry = guard
            .entry(name.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        match entry {
            Value::Array(items) => {
                items.push(Value::Null);
                items.len() - 1
            }
            other => {
                *other = Value::Array(vec![Value::Null]);
                0
            }
        }
    }

    fn place(&self, name: &str, slot: usize, doc: Document) {
        let mut guard = self.inner.lock().unwrap();
        if let Some(Value::Array(items)) = guard.get_mut(name) {
            if let Some(entry) = items.get_mut(slot) {
                *entry = Value::Object(doc);
            }
        }
    }

    /// Snapshot the accumulated collections as one JSON object.
    pub fn to_value(&self) -> Value {
        Value::Object(self.inner.lock().unwrap().clone())
    }

    /// The resolved documents of one collection, if its key exists.
    pub fn collection(&self, name: &str) -> Option<Vec<Value>> {
        self.inner
            .lock()
            .unwrap()
            .get(name)
            .and_then(Value::as_array)
            .cloned()
    }
}

impl fmt::Debug for ResultSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ResultSet({})", self.to_value())
    }
}

/// Identities already resolved during one read call. Shared by every
/// recursive step and every parallel branch of that call, so a document is
/// walked at most once no matter how many reference paths lead to it.
#[derive(Clone, Default)]
pub struct OperationContext {
    processed: Arc<Mutex<HashSet<String>>>,
}

impl OperationContext {
    pub fn new() -> Self {
        OperationContext::default()
    }

    /// Atomically claim an identity. Returns false when it was already
    /// claimed by this or another branch.
    fn claim(&self, id: &DocumentId) -> bool {
        self.processed.lock().unwrap().insert(id.to_hex())
    }
}

/// Walks records against their schema, resolving every reachable reference
/// and folding each visited document into the shared result set.
#[derive(Clone)]
pub struct Engine {
    store: Arc<dyn DocumentStore>,
}

impl Engine {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Engine { store }
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Cursor over every root document matching the filter. Materializing it
    /// resolves each record into the shared result set.
    pub fn find(
        &self,
        schema: &Arc<Schema>,
        result_set: &ResultSet,
        filter: Filter,
        ctx: Option<OperationContext>,
    ) -> Result<EngineCursor> {
        let cursor = self.store.find(schema.collection_name()?, filter);
        Ok(EngineCursor::new(
            self.clone(),
            schema.clone(),
            result_set.clone(),
            ctx.unwrap_or_default(),
            cursor,
        ))
    }

    /// Resolve at most one root document. An absent record returns `None`
    /// and leaves the result set untouched.
    pub async fn find_one(
        &self,
        schema: &Arc<Schema>,
        result_set: &ResultSet,
        filter: Filter,
        ctx: Option<OperationContext>,
    ) -> Result<Option<ResultSet>> {
        let ctx = ctx.unwrap_or_default();
        let record = self.store.find_one(schema.collection_name()?, &filter).await?;
        let Some(record) = record else {
            return Ok(None);
        };
        self.transform(schema, result_set, &record, &ctx).await?;
        Ok(Some(result_set.clone()))
    }

    /// Resolve one record against its schema and return its output shape.
    /// Every persistence-backed document touched along the way, the record
    /// itself included, is registered in the result set exactly once per
    /// operation context.
    pub fn transform<'a>(
        &'a self,
        schema: &'a Schema,
        result_set: &'a ResultSet,
        record: &'a Document,
        ctx: &'a OperationContext,
    ) -> BoxFuture<'a, Result<Document>> {
        Box::pin(async move {
            let mut slot = None;

            if !schema.is_virtual() {
                let name = schema.collection_name()?;
                let id = document::document_id(record).ok_or_else(|| {
                    DocweaveError::MissingId {
                        collection: name.to_string(),
                    }
                })?;
                // Already processed documents are skipped entirely. This is
                // what keeps cyclic reference graphs finite.
                if !ctx.claim(&id) {
                    return Ok(Document::new());
                }
                slot = Some((name, result_set.reserve_slot(name)));
            }

            let mut out = Document::new();
            if slot.is_some() {
                if let Some(id) = record.get(ID_FIELD) {
                    out.insert(ID_FIELD.to_string(), id.clone());
                }
            }

            for (property, field) in schema.fields() {
                self.apply_field(property, field, record, &mut out, result_set, ctx)
                    .await?;
            }

            if let Some((name, index)) = slot {
                result_set.place(name, index, out.clone());
            }

            Ok(out)
        })
    }

    async fn apply_field(
        &self,
        property: &str,
        field: &ResolvedField,
        record: &Document,
        out: &mut Document,
        result_set: &ResultSet,
        ctx: &OperationContext,
    ) -> Result<()> {
        let raw = record.get(property);

        match &field.kind {
            FieldKind::Embedded(nested) if nested.is_virtual() => {
                if let Some(Value::Object(sub)) = raw {
                    let resolved = self.transform(nested, result_set, sub, ctx).await?;
                    out.insert(property.to_string(), Value::Object(resolved));
                }
            }

            FieldKind::Embedded(nested) => {
                // A full document of a persistence-backed schema is stored
                // inline. The visible value is kept as written, and the
                // current version of the referenced document is captured
                // under its own collection.
                let Some(value) = raw else { return Ok(()) };
                if value.is_null() {
                    return Ok(());
                }
                out.insert(property.to_string(), value.clone());
                match value.as_object().and_then(document::document_id) {
                    Some(id) => {
                        self.resolve_many(nested, result_set, Filter::Id(id), ctx)
                            .await?;
                    }
                    None => log::warn!(
                        "embedded value in '{property}' has no usable identity, skipping resolution"
                    ),
                }
            }

            FieldKind::Conditional(selector) => {
                let chosen = selector(record).ok_or_else(|| {
                    DocweaveError::ConditionalDispatch {
                        property: property.to_string(),
                    }
                })?;
                let resolved = match raw.and_then(Value::as_object) {
                    Some(sub) => self.transform(&chosen, result_set, sub, ctx).await?,
                    None => Document::new(),
                };
                out.insert(property.to_string(), Value::Object(resolved));
            }

            FieldKind::Binary => {
                if let Some(value) = raw {
                    match document::binary::read(value) {
                        Some(payload) => {
                            out.insert(property.to_string(), Value::String(payload));
                        }
                        None => log::warn!("'{property}' does not hold a readable binary value"),
                    }
                }
            }

            FieldKind::ArrayOfEmbedded(nested) => {
                let Some(Value::Array(items)) = raw else {
                    // Absent arrays resolve to an empty list, unlike plain
                    // fields which are omitted. Callers rely on the
                    // distinction between "never set" and "empty".
                    out.insert(property.to_string(), Value::Array(Vec::new()));
                    return Ok(());
                };

                let transforms = items.iter().map(|item| {
                    let element = item.as_object();
                    async move {
                        match element {
                            Some(element) => {
                                self.transform(nested, result_set, element, ctx).await
                            }
                            None => Ok(Document::new()),
                        }
                    }
                });
                let resolved = try_join_all(transforms).await?;
                out.insert(
                    property.to_string(),
                    Value::Array(resolved.into_iter().map(Value::Object).collect()),
                );
            }

            FieldKind::InverseReference {
                reference,
                property: child_property,
            } => {
                let reference = reference.resolve(property)?;
                result_set.ensure_collection(reference.collection_name()?);
                // The children hold the identity; the parent field stores
                // nothing and is not written to the output.
                let Some(parent_id) = document::document_id(record) else {
                    return Ok(());
                };
                let filter = Filter::Eq(
                    child_property.clone(),
                    Value::String(parent_id.to_hex()),
                );
                self.resolve_many(reference, result_set, filter, ctx).await?;
            }

            FieldKind::ArrayReference(reference) => {
                let reference = reference.resolve(property)?;
                result_set.ensure_collection(reference.collection_name()?);

                let items = match raw {
                    Some(Value::Array(items)) => items,
                    None => {
                        out.insert(property.to_string(), Value::Array(Vec::new()));
                        return Ok(());
                    }
                    Some(other) => {
                        log::warn!(
                            "'{property}' should hold an identifier array, got {other}"
                        );
                        out.insert(property.to_string(), Value::Array(Vec::new()));
                        return Ok(());
                    }
                };

                let mut ids = Vec::with_capacity(items.len());
                for item in items {
                    match item.as_str().and_then(|s| DocumentId::parse(s).ok()) {
                        Some(id) => ids.push(id),
                        None => log::warn!(
                            "dropping unparsable identifier {item} in '{property}'"
                        ),
                    }
                }
                self.resolve_many(reference, result_set, Filter::Ids(ids), ctx)
                    .await?;
                out.insert(property.to_string(), Value::Array(items.clone()));
            }

            FieldKind::SingleReference(reference) => {
                let Some(value) = raw else { return Ok(()) };
                if value.is_null() {
                    return Ok(());
                }
                let reference = reference.resolve(property)?;
                match value.as_str().and_then(|s| DocumentId::parse(s).ok()) {
                    Some(id) => {
                        self.resolve_one(reference, result_set, Filter::Id(id), ctx)
                            .await?;
                    }
                    None => log::warn!(
                        "'{property}' holds an unparsable identifier, skipping resolution"
                    ),
                }
                // The scalar value is kept whether or not the reference
                // resolved to a document.
                out.insert(property.to_string(), value.clone());
            }

            FieldKind::Scalar(_) => {
                if let Some(value) = raw {
                    out.insert(property.to_string(), value.clone());
                }
            }
        }

        Ok(())
    }

    async fn resolve_one(
        &self,
        schema: &Arc<Schema>,
        result_set: &ResultSet,
        filter: Filter,
        ctx: &OperationContext,
    ) -> Result<()> {
        let record = self.store.find_one(schema.collection_name()?, &filter).await?;
        if let Some(record) = record {
            self.transform(schema, result_set, &record, ctx).await?;
        }
        Ok(())
    }

    async fn resolve_many(
        &self,
        schema: &Arc<Schema>,
        result_set: &ResultSet,
        filter: Filter,
        ctx: &OperationContext,
    ) -> Result<()> {
        let mut cursor = self.store.find(schema.collection_name()?, filter);
        let records = cursor.to_array().await?;
        for record in &records {
            self.transform(schema, result_set, record, ctx).await?;
        }
        Ok(())
    }
}
