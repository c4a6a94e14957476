use thiserror::Error;

use crate::schema::FieldType;
use crate::validation::ValidationError;

#[derive(Error, Debug)]
pub enum DocweaveError {
    #[error("Invalid field flags \"{flags}\" for property '{property}' in schema '{schema}'")]
    InvalidFieldType {
        schema: String,
        flags: FieldType,
        property: String,
    },

    #[error("No collection name to return: schema is virtual")]
    VirtualSchema,

    #[error("Schema reference for property '{property}' was never bound")]
    UnboundReference { property: String },

    #[error("No schema matched conditional property '{property}'")]
    ConditionalDispatch { property: String },

    #[error("Invalid document id: {0}")]
    InvalidId(String),

    #[error("Document in collection '{collection}' has no _id")]
    MissingId { collection: String },

    #[error("Document validation failed: {}", crate::validation::format_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error("Store error: {0}")]
    Store(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, DocweaveError>;
