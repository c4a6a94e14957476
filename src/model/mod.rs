// Per-schema facade over the engine: validated writes, graph-resolving
// reads, and passthrough update/delete/aggregate.

use std::sync::Arc;

use crate::document::Document;
use crate::engine::{Engine, EngineCursor, OperationContext, ResultSet};
use crate::error::{DocweaveError, Result};
use crate::schema::Schema;
use crate::store::Filter;
use crate::validation::{SchemaValidator, ValidationError};

pub struct Model {
    engine: Engine,
    validator: SchemaValidator,
    schema: Arc<Schema>,
}

impl Model {
    pub fn new(engine: Engine, schema: Arc<Schema>) -> Self {
        let validator = SchemaValidator::new(engine.store().clone());
        Model {
            engine,
            validator,
            schema,
        }
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    pub fn collection_name(&self) -> Result<&str> {
        self.schema.collection_name()
    }

    /// Validate, then insert. Every field error is reported in one failure
    /// and a failing document is never written.
    pub async fn insert_one(&self, document: Document) -> Result<Document> {
        let errors = self.validator.validate_all(&self.schema, &document).await?;
        if !errors.is_empty() {
            return Err(DocweaveError::Validation(errors));
        }
        self.engine
            .store()
            .insert_one(self.collection_name()?, document)
            .await
    }

    /// Validate and insert a batch. Error paths are prefixed with each
    /// document's position in the input. An empty batch is a no-op.
    pub async fn insert_many(&self, documents: Vec<Document>) -> Result<Vec<Document>> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let mut errors: Vec<ValidationError> = Vec::new();
        for (index, document) in documents.iter().enumerate() {
            for mut error in self.validator.validate_all(&self.schema, document).await? {
                error.path.insert(0, index.to_string());
                errors.push(error);
            }
        }
        if !errors.is_empty() {
            return Err(DocweaveError::Validation(errors));
        }

        self.engine
            .store()
            .insert_many(self.collection_name()?, documents)
            .await
    }

    /// Resolve at most one document and everything it references, into a
    /// fresh result set.
    pub async fn find_one(&self, filter: Filter) -> Result<Option<ResultSet>> {
        self.engine
            .find_one(&self.schema, &ResultSet::new(), filter, None)
            .await
    }

    /// Cursor over every matching document, resolving on materialization
    /// into a fresh result set.
    pub fn find(&self, filter: Filter) -> Result<EngineCursor> {
        self.engine.find(
            &self.schema,
            &ResultSet::new(),
            filter,
            Some(OperationContext::new()),
        )
    }

    pub async fn update_one(&self, filter: &Filter, update: Document) -> Result<u64> {
        self.engine
            .store()
            .update_one(self.collection_name()?, filter, update)
            .await
    }

    pub async fn update_many(&self, filter: &Filter, update: Document) -> Result<u64> {
        self.engine
            .store()
            .update_many(self.collection_name()?, filter, update)
            .await
    }

    pub async fn delete_one(&self, filter: &Filter) -> Result<u64> {
        self.engine
            .store()
            .delete_one(self.collection_name()?, filter)
            .await
    }

    pub async fn delete_many(&self, filter: &Filter) -> Result<u64> {
        self.engine
            .store()
            .delete_many(self.collection_name()?, filter)
            .await
    }

    pub async fn aggregate(&self, pipeline: Vec<Document>) -> Result<Vec<Document>> {
        self.engine
            .store()
            .aggregate(self.collection_name()?, pipeline)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ID_FIELD;
    use crate::schema::{FieldType, SchemaField};
    use crate::store::{DocumentStore, MemoryStore};
    use crate::validation::{Validator, ValidatorKind};
    use serde_json::{json, Value};

    fn doc(value: Value) -> Document {
        match value {
            Value::Object(map) => map,
            _ => Document::new(),
        }
    }

    fn post_model(store: Arc<MemoryStore>) -> Model {
        let schema = Schema::builder()
            .collection("posts")
            .field(
                "title",
                SchemaField::new(FieldType::STRING)
                    .validation(vec![Validator::Required, Validator::Min(4.0)]),
            )
            .build()
            .unwrap();
        Model::new(Engine::new(store), schema)
    }

    #[tokio::test]
    async fn test_insert_rejects_missing_required_field() {
        let model = post_model(Arc::new(MemoryStore::new()));
        let err = model.insert_one(Document::new()).await.unwrap_err();

        match err {
            DocweaveError::Validation(errors) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].path, vec!["title"]);
                assert_eq!(errors[0].validator, ValidatorKind::Required);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_insert_rejects_short_title_with_min() {
        let model = post_model(Arc::new(MemoryStore::new()));
        let err = model
            .insert_one(doc(json!({ "title": "ab" })))
            .await
            .unwrap_err();

        match err {
            DocweaveError::Validation(errors) => {
                assert_eq!(errors[0].validator, ValidatorKind::Min);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_failed_validation_prevents_the_write() {
        let store = Arc::new(MemoryStore::new());
        let model = post_model(store.clone());

        let _ = model.insert_one(doc(json!({ "title": "ab" }))).await;
        assert_eq!(
            store.find("posts", Filter::All).count().await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_insert_aggregates_all_field_errors() {
        let schema = Schema::builder()
            .collection("users")
            .field(
                "name",
                SchemaField::new(FieldType::STRING).validation(vec![Validator::Required]),
            )
            .field(
                "email",
                SchemaField::new(FieldType::STRING).validation(vec![Validator::Required]),
            )
            .build()
            .unwrap();
        let model = Model::new(Engine::new(Arc::new(MemoryStore::new())), schema);

        let err = model.insert_one(Document::new()).await.unwrap_err();
        match err {
            DocweaveError::Validation(errors) => {
                assert_eq!(errors.len(), 2);
                assert_eq!(errors[0].path, vec!["name"]);
                assert_eq!(errors[1].path, vec!["email"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_empty_insert_many_skips_the_store() {
        let model = post_model(Arc::new(MemoryStore::new()));
        let inserted = model.insert_many(Vec::new()).await.unwrap();
        assert!(inserted.is_empty());
    }

    #[tokio::test]
    async fn test_insert_many_prefixes_paths_with_position() {
        let model = post_model(Arc::new(MemoryStore::new()));
        let err = model
            .insert_many(vec![
                doc(json!({ "title": "long enough" })),
                doc(json!({ "title": "ab" })),
            ])
            .await
            .unwrap_err();

        match err {
            DocweaveError::Validation(errors) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors[0].path, vec!["1", "title"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_insert_and_find_one_round_trip() {
        let model = post_model(Arc::new(MemoryStore::new()));
        let inserted = model
            .insert_one(doc(json!({ "title": "First post" })))
            .await
            .unwrap();

        let result = model
            .find_one(Filter::Eq("title".into(), json!("First post")))
            .await
            .unwrap()
            .unwrap();
        let posts = result.collection("posts").unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0]["_id"], inserted[ID_FIELD]);
    }

    #[tokio::test]
    async fn test_unique_validator_through_insert() {
        let store = Arc::new(MemoryStore::new());
        let schema = Schema::builder()
            .collection("users")
            .field(
                "email",
                SchemaField::new(FieldType::STRING)
                    .validation(vec![Validator::unique("users", "email")]),
            )
            .build()
            .unwrap();
        let model = Model::new(Engine::new(store), schema);

        model
            .insert_one(doc(json!({ "email": "alice@test.com" })))
            .await
            .unwrap();
        let err = model
            .insert_one(doc(json!({ "email": "alice@test.com" })))
            .await
            .unwrap_err();
        match err {
            DocweaveError::Validation(errors) => {
                assert_eq!(errors[0].validator, ValidatorKind::Unique);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_update_and_delete_passthrough() {
        let store = Arc::new(MemoryStore::new());
        let model = post_model(store.clone());
        let inserted = model
            .insert_one(doc(json!({ "title": "First post" })))
            .await
            .unwrap();
        let id = crate::document::document_id(&inserted).unwrap();

        let modified = model
            .update_one(
                &Filter::Id(id),
                doc(json!({ "$set": { "title": "Renamed post" } })),
            )
            .await
            .unwrap();
        assert_eq!(modified, 1);

        let deleted = model.delete_one(&Filter::Id(id)).await.unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(
            store.find("posts", Filter::All).count().await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_aggregate_passthrough() {
        let model = post_model(Arc::new(MemoryStore::new()));
        model
            .insert_one(doc(json!({ "title": "First post" })))
            .await
            .unwrap();
        model
            .insert_one(doc(json!({ "title": "Second post" })))
            .await
            .unwrap();

        let rows = model
            .aggregate(vec![doc(json!({ "$match": { "title": "First post" } }))])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }
}
