use std::fmt;
use std::ops::BitOr;
use std::sync::Arc;

use crate::document::Document;
use crate::validation::Validator;

use super::{Schema, SchemaHandle};

/// Bit flags describing a field's storage kind and reference semantics.
/// Flags combine with `|`; a field's effective type is the union.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FieldType(pub u16);

impl FieldType {
    pub const OBJECT_ID: FieldType = FieldType(1);
    pub const ARRAY_OF: FieldType = FieldType(2);
    pub const STRING: FieldType = FieldType(4);
    pub const OBJECT: FieldType = FieldType(8);
    pub const BOOLEAN: FieldType = FieldType(16);
    pub const SCHEMA_REFERENCE: FieldType = FieldType(32);
    pub const NUMBER: FieldType = FieldType(64);
    pub const ARRAY: FieldType = FieldType(128);
    pub const FOREIGNER_REFERENCE: FieldType = FieldType(256);
    pub const BUFFER: FieldType = FieldType(512);
    pub const SCHEMA: FieldType = FieldType(1024);
    pub const CONDITIONAL_SCHEMA: FieldType = FieldType(2048);
    pub const DATE: FieldType = FieldType(4096);

    pub fn contains(self, other: FieldType) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for FieldType {
    type Output = FieldType;

    fn bitor(self, rhs: FieldType) -> FieldType {
        FieldType(self.0 | rhs.0)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Chooses the schema interpreting a conditional field, from the parent
/// record's content. Returning `None` fails the read.
pub type SchemaSelector = Arc<dyn Fn(&Document) -> Option<Arc<Schema>> + Send + Sync>;

/// Scalar storage kinds a field can resolve to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Id,
    String,
    Number,
    Boolean,
    Object,
    Array,
    Date,
}

/// A field's unambiguous interpretation, resolved from its declared flags
/// when the schema is built.
#[derive(Clone)]
pub enum FieldKind {
    /// Copied through verbatim, no resolution.
    Scalar(ScalarKind),
    /// Holds the identity of exactly one document in the referenced collection.
    SingleReference(SchemaHandle),
    /// Holds an array of identities, resolved as one batch query.
    ArrayReference(SchemaHandle),
    /// The referenced collection's documents hold this document's identity
    /// under `property`; the parent field itself stores nothing.
    InverseReference {
        reference: SchemaHandle,
        property: String,
    },
    /// Embedded record following a nested schema.
    Embedded(Arc<Schema>),
    /// Array of embedded records, each transformed independently.
    ArrayOfEmbedded(Arc<Schema>),
    /// Interpreting schema chosen at traversal time from the parent record.
    Conditional(SchemaSelector),
    /// Binary payload behind the store's wrapper.
    Binary,
}

impl fmt::Debug for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Scalar(kind) => write!(f, "Scalar({kind:?})"),
            FieldKind::SingleReference(reference) => {
                write!(f, "SingleReference({})", reference.label())
            }
            FieldKind::ArrayReference(reference) => {
                write!(f, "ArrayReference({})", reference.label())
            }
            FieldKind::InverseReference {
                reference,
                property,
            } => write!(
                f,
                "InverseReference({} by '{}')",
                reference.label(),
                property
            ),
            FieldKind::Embedded(schema) => write!(f, "Embedded({})", schema.label()),
            FieldKind::ArrayOfEmbedded(schema) => {
                write!(f, "ArrayOfEmbedded({})", schema.label())
            }
            FieldKind::Conditional(_) => write!(f, "Conditional"),
            FieldKind::Binary => write!(f, "Binary"),
        }
    }
}

/// Declared shape of a schema field, before resolution.
#[derive(Clone, Default)]
pub struct SchemaField {
    pub field_type: FieldType,
    pub reference: Option<SchemaHandle>,
    pub schema: Option<Arc<Schema>>,
    pub property: Option<String>,
    pub get_schema: Option<SchemaSelector>,
    pub validation: Vec<Validator>,
}

impl SchemaField {
    pub fn new(field_type: FieldType) -> Self {
        SchemaField {
            field_type,
            ..SchemaField::default()
        }
    }

    /// Target schema for reference fields.
    pub fn reference(mut self, reference: impl Into<SchemaHandle>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    /// Nested schema for embedded fields.
    pub fn schema(mut self, schema: Arc<Schema>) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Child-side property name for inverse references.
    pub fn property(mut self, property: impl Into<String>) -> Self {
        self.property = Some(property.into());
        self
    }

    /// Selector for conditional fields.
    pub fn get_schema(
        mut self,
        selector: impl Fn(&Document) -> Option<Arc<Schema>> + Send + Sync + 'static,
    ) -> Self {
        self.get_schema = Some(Arc::new(selector));
        self
    }

    /// Validators run in declaration order on write.
    pub fn validation(mut self, validators: Vec<Validator>) -> Self {
        self.validation = validators;
        self
    }
}

impl From<FieldType> for SchemaField {
    fn from(field_type: FieldType) -> Self {
        SchemaField::new(field_type)
    }
}

impl From<Arc<Schema>> for SchemaField {
    fn from(schema: Arc<Schema>) -> Self {
        SchemaField::new(FieldType::SCHEMA).schema(schema)
    }
}

impl From<&Arc<Schema>> for SchemaField {
    fn from(schema: &Arc<Schema>) -> Self {
        SchemaField::from(schema.clone())
    }
}

/// A named field after flag resolution.
#[derive(Debug, Clone)]
pub struct ResolvedField {
    pub declared: FieldType,
    pub kind: FieldKind,
    pub validation: Vec<Validator>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_combine_and_test() {
        let flags = FieldType::ARRAY_OF | FieldType::OBJECT_ID | FieldType::SCHEMA_REFERENCE;
        assert!(flags.contains(FieldType::ARRAY_OF));
        assert!(flags.contains(FieldType::OBJECT_ID | FieldType::SCHEMA_REFERENCE));
        assert!(!flags.contains(FieldType::FOREIGNER_REFERENCE));
        assert_eq!(flags.to_string(), "35");
    }

    #[test]
    fn test_bare_field_type_is_sugar() {
        let field = SchemaField::from(FieldType::STRING);
        assert_eq!(field.field_type, FieldType::STRING);
        assert!(field.reference.is_none());
        assert!(field.validation.is_empty());
    }
}
