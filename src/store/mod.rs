pub mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use serde_json::Value;

use crate::document::{self, Document, DocumentId};
use crate::error::Result;

/// The filter vocabulary the access layer needs from its store. Deliberately
/// closed; this is not a query language.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Match every document.
    All,
    /// Match one document by identity.
    Id(DocumentId),
    /// Match any document whose identity is in the set.
    Ids(Vec<DocumentId>),
    /// Exact match on a property value.
    Eq(String, Value),
    /// Every inner filter matches.
    And(Vec<Filter>),
}

impl Filter {
    /// Evaluate the filter against a document. Store implementations may use
    /// this directly or translate the filter to their native form.
    pub fn matches(&self, doc: &Document) -> bool {
        match self {
            Filter::All => true,
            Filter::Id(id) => document::document_id(doc) == Some(*id),
            Filter::Ids(ids) => document::document_id(doc)
                .map(|id| ids.contains(&id))
                .unwrap_or(false),
            Filter::Eq(property, value) => doc.get(property) == Some(value),
            Filter::And(filters) => filters.iter().all(|filter| filter.matches(doc)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// Ordered list of (property, direction) pairs.
pub type SortSpec = Vec<(String, SortDirection)>;

/// A store's native cursor over one find operation. Pagination calls chain;
/// `to_array` materializes and closes the cursor.
#[async_trait]
pub trait StoreCursor: Send {
    fn skip(self: Box<Self>, count: usize) -> Box<dyn StoreCursor>;
    fn limit(self: Box<Self>, count: usize) -> Box<dyn StoreCursor>;
    fn sort(self: Box<Self>, spec: SortSpec) -> Box<dyn StoreCursor>;
    fn filter(self: Box<Self>, filter: Filter) -> Box<dyn StoreCursor>;
    fn comment(self: Box<Self>, comment: &str) -> Box<dyn StoreCursor>;
    fn add_cursor_flag(self: Box<Self>, flag: &str, value: bool) -> Box<dyn StoreCursor>;

    async fn to_array(&mut self) -> Result<Vec<Document>>;
    async fn count(&self) -> Result<usize>;
    async fn explain(&self) -> Result<Value>;
    fn is_closed(&self) -> bool;
}

/// The document store consumed by the engine and facade. Connection
/// management, query execution, and durability live behind this boundary.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find_one(&self, collection: &str, filter: &Filter) -> Result<Option<Document>>;

    fn find(&self, collection: &str, filter: Filter) -> Box<dyn StoreCursor>;

    /// Insert one document, generating its identity. Returns the stored
    /// document.
    async fn insert_one(&self, collection: &str, document: Document) -> Result<Document>;

    async fn insert_many(
        &self,
        collection: &str,
        documents: Vec<Document>,
    ) -> Result<Vec<Document>>;

    async fn update_one(
        &self,
        collection: &str,
        filter: &Filter,
        update: Document,
    ) -> Result<u64>;

    async fn update_many(
        &self,
        collection: &str,
        filter: &Filter,
        update: Document,
    ) -> Result<u64>;

    async fn delete_one(&self, collection: &str, filter: &Filter) -> Result<u64>;

    async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64>;

    async fn aggregate(
        &self,
        collection: &str,
        pipeline: Vec<Document>,
    ) -> Result<Vec<Document>>;
}
