// Document shape and identity shared by every layer.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;
use uuid::Uuid;

use crate::error::{DocweaveError, Result};

/// A raw or resolved record: an ordered map of field name to JSON value.
pub type Document = serde_json::Map<String, Value>;

/// Key under which the store keeps a document's identity.
pub const ID_FIELD: &str = "_id";

/// Store-generated document identity. Opaque, order-stable, and coercible
/// to/from its hex form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocumentId(Uuid);

impl DocumentId {
    pub fn generate() -> Self {
        DocumentId(Uuid::new_v4())
    }

    /// Parse a hex identity. The hyphenated form is accepted as well.
    pub fn parse(raw: &str) -> Result<Self> {
        Uuid::parse_str(raw)
            .map(DocumentId)
            .map_err(|_| DocweaveError::InvalidId(raw.to_string()))
    }

    pub fn is_valid(raw: &str) -> bool {
        Uuid::parse_str(raw).is_ok()
    }

    /// Hex form without separators, as stored inside documents.
    pub fn to_hex(&self) -> String {
        self.0.simple().to_string()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

impl FromStr for DocumentId {
    type Err = DocweaveError;

    fn from_str(raw: &str) -> Result<Self> {
        DocumentId::parse(raw)
    }
}

/// Read a document's identity, if present and well formed.
pub fn document_id(doc: &Document) -> Option<DocumentId> {
    doc.get(ID_FIELD)
        .and_then(Value::as_str)
        .and_then(|raw| DocumentId::parse(raw).ok())
}

/// Helpers for the store's binary value wrapper.
///
/// JSON has no binary type, so stores wrap payloads as
/// `{"$binary": "<base64>"}`. The transform reads the payload back out of the
/// wrapper when producing output records.
pub mod binary {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine as _;
    use serde_json::{json, Value};

    /// Key of the wrapper object.
    pub const BINARY_FIELD: &str = "$binary";

    /// Wrap raw bytes into the store's binary value.
    pub fn wrap(bytes: &[u8]) -> Value {
        json!({ BINARY_FIELD: STANDARD.encode(bytes) })
    }

    /// Read the base64 payload out of a binary value, from the start of the
    /// buffer. Bare strings are accepted as already-unwrapped payloads.
    pub fn read(value: &Value) -> Option<String> {
        match value {
            Value::Object(map) => map
                .get(BINARY_FIELD)
                .and_then(Value::as_str)
                .map(str::to_string),
            Value::String(payload) => Some(payload.clone()),
            _ => None,
        }
    }

    /// Decode a binary value to its raw bytes.
    pub fn decode(value: &Value) -> Option<Vec<u8>> {
        read(value).and_then(|payload| STANDARD.decode(payload).ok())
    }
}
