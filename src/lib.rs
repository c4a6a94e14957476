pub mod schema;
pub mod document;
pub mod store;
pub mod validation;
pub mod engine;
pub mod model;
pub mod error;

pub use document::{Document, DocumentId};
pub use engine::{Engine, EngineCursor, OperationContext, ResultSet};
pub use error::{DocweaveError, Result};
pub use model::Model;
pub use schema::{FieldKind, FieldType, Schema, SchemaField, SchemaHandle};
pub use store::{DocumentStore, Filter, MemoryStore, SortDirection, StoreCursor};
pub use validation::{SchemaValidator, ValidationError, Validator, ValidatorKind};
