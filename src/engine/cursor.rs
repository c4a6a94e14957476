use std::sync::Arc;

use serde_json::Value;

use crate::error::Result;
use crate::schema::{FieldKind, Schema};
use crate::store::{Filter, SortSpec, StoreCursor};

use super::{Engine, OperationContext, ResultSet};

/// Lazy cursor over one find operation. Pagination, sorting, and filtering
/// forward to the store's native cursor; materializing with `to_array`
/// transforms every fetched record into the shared result set.
pub struct EngineCursor {
    engine: Engine,
    schema: Arc<Schema>,
    result_set: ResultSet,
    ctx: OperationContext,
    cursor: Box<dyn StoreCursor>,
}

impl EngineCursor {
    pub(crate) fn new(
        engine: Engine,
        schema: Arc<Schema>,
        result_set: ResultSet,
        ctx: OperationContext,
        cursor: Box<dyn StoreCursor>,
    ) -> Self {
        EngineCursor {
            engine,
            schema,
            result_set,
            ctx,
            cursor,
        }
    }

    pub fn skip(mut self, count: usize) -> Self {
        self.cursor = self.cursor.skip(count);
        self
    }

    pub fn limit(mut self, count: usize) -> Self {
        self.cursor = self.cursor.limit(count);
        self
    }

    pub fn sort(mut self, spec: SortSpec) -> Self {
        self.cursor = self.cursor.sort(spec);
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.cursor = self.cursor.filter(filter);
        self
    }

    pub fn comment(mut self, comment: &str) -> Self {
        self.cursor = self.cursor.comment(comment);
        self
    }

    pub fn add_cursor_flag(mut self, flag: &str, value: bool) -> Self {
        self.cursor = self.cursor.add_cursor_flag(flag, value);
        self
    }

    /// Number of matching root documents, without transforming anything.
    pub async fn count(&self) -> Result<usize> {
        self.cursor.count().await
    }

    pub async fn explain(&self) -> Result<Value> {
        self.cursor.explain().await
    }

    pub fn is_closed(&self) -> bool {
        self.cursor.is_closed()
    }

    /// Fetch every matching record and resolve it into the shared result
    /// set, which is returned once all records are transformed.
    pub async fn to_array(mut self) -> Result<ResultSet> {
        self.prepare_keys()?;
        let records = self.cursor.to_array().await?;
        for record in &records {
            self.engine
                .transform(&self.schema, &self.result_set, record, &self.ctx)
                .await?;
        }
        Ok(self.result_set)
    }

    /// The result shape always carries the root collection's key and the
    /// keys of its array-reference fields, matching records or not.
    fn prepare_keys(&self) -> Result<()> {
        self.result_set
            .ensure_collection(self.schema.collection_name()?);
        for (_, field) in self.schema.fields() {
            match &field.kind {
                FieldKind::ArrayReference(reference)
                | FieldKind::InverseReference { reference, .. } => {
                    if let Some(target) = reference.get() {
                        self.result_set.ensure_collection(target.collection_name()?);
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }
}
