mod types;

pub use types::{FieldKind, FieldType, ResolvedField, ScalarKind, SchemaField, SchemaSelector};

use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::error::{DocweaveError, Result};

/// Immutable description of one collection's documents, or of an embedded
/// group of fields when no collection is set (a virtual schema).
///
/// Schemas are built once and shared by identity (`Arc`) from any number of
/// referencing schemas.
#[derive(Debug)]
pub struct Schema {
    collection: Option<String>,
    fields: Vec<(String, ResolvedField)>,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder {
            collection: None,
            fields: Vec::new(),
        }
    }

    /// Fields in declaration order. Order drives traversal, validation, and
    /// the shape of output records.
    pub fn fields(&self) -> &[(String, ResolvedField)] {
        &self.fields
    }

    /// A virtual schema groups fields for reuse and nesting; it never owns a
    /// collection and never appears as its own key in a result set.
    pub fn is_virtual(&self) -> bool {
        self.collection.is_none()
    }

    pub fn collection_name(&self) -> Result<&str> {
        self.collection.as_deref().ok_or(DocweaveError::VirtualSchema)
    }

    pub(crate) fn label(&self) -> &str {
        self.collection.as_deref().unwrap_or("(virtual)")
    }
}

/// Deferred, shareable reference to a schema. Handles let schemas reference
/// each other cyclically (or themselves) while staying immutable once built:
/// create the handle first, bind it when the target schema exists.
#[derive(Clone)]
pub struct SchemaHandle {
    inner: Arc<OnceCell<Arc<Schema>>>,
}

impl SchemaHandle {
    /// An unbound handle. Reading it before `bind` is a configuration error.
    pub fn deferred() -> Self {
        SchemaHandle {
            inner: Arc::new(OnceCell::new()),
        }
    }

    /// Bind the handle to its target. A handle binds at most once.
    pub fn bind(&self, schema: Arc<Schema>) -> Result<()> {
        self.inner
            .set(schema)
            .map_err(|_| DocweaveError::Other("Schema handle already bound".into()))
    }

    pub fn get(&self) -> Option<&Arc<Schema>> {
        self.inner.get()
    }

    pub(crate) fn resolve(&self, property: &str) -> Result<&Arc<Schema>> {
        self.get().ok_or_else(|| DocweaveError::UnboundReference {
            property: property.to_string(),
        })
    }

    pub(crate) fn label(&self) -> &str {
        self.get().map(|schema| schema.label()).unwrap_or("(unbound)")
    }
}

impl From<Arc<Schema>> for SchemaHandle {
    fn from(schema: Arc<Schema>) -> Self {
        SchemaHandle {
            inner: Arc::new(OnceCell::with_value(schema)),
        }
    }
}

impl From<&Arc<Schema>> for SchemaHandle {
    fn from(schema: &Arc<Schema>) -> Self {
        SchemaHandle::from(schema.clone())
    }
}

impl fmt::Debug for SchemaHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SchemaHandle({})", self.label())
    }
}

/// Builds a schema, resolving every field's declared flags into its
/// interpretation. Invalid flag combinations fail here, not at read time.
pub struct SchemaBuilder {
    collection: Option<String>,
    fields: Vec<(String, SchemaField)>,
}

impl SchemaBuilder {
    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.collection = Some(name.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, spec: impl Into<SchemaField>) -> Self {
        self.fields.push((name.into(), spec.into()));
        self
    }

    pub fn build(self) -> Result<Arc<Schema>> {
        let label = self.collection.clone().unwrap_or_else(|| "(virtual)".into());
        let mut fields = Vec::with_capacity(self.fields.len());

        for (name, declared) in self.fields {
            let kind = resolve_field(&label, &name, &declared)?;
            fields.push((
                name,
                ResolvedField {
                    declared: declared.field_type,
                    kind,
                    validation: declared.validation,
                },
            ));
        }

        Ok(Arc::new(Schema {
            collection: self.collection,
            fields,
        }))
    }
}

fn resolve_field(schema: &str, property: &str, field: &SchemaField) -> Result<FieldKind> {
    let flags = field.field_type;
    let invalid = || DocweaveError::InvalidFieldType {
        schema: schema.to_string(),
        flags,
        property: property.to_string(),
    };

    // The bare Schema flag is an embedded field; combined with anything else
    // it falls through to the branches below.
    if flags == FieldType::SCHEMA {
        let schema = field.schema.clone().ok_or_else(invalid)?;
        return Ok(FieldKind::Embedded(schema));
    }

    if flags.contains(FieldType::CONDITIONAL_SCHEMA) {
        let selector = field.get_schema.clone().ok_or_else(invalid)?;
        return Ok(FieldKind::Conditional(selector));
    }

    if flags.contains(FieldType::BUFFER) {
        return Ok(FieldKind::Binary);
    }

    if flags.contains(FieldType::ARRAY_OF) {
        if flags.contains(FieldType::SCHEMA) {
            let schema = field.schema.clone().ok_or_else(invalid)?;
            return Ok(FieldKind::ArrayOfEmbedded(schema));
        }
        if flags.contains(FieldType::OBJECT_ID) {
            if flags.contains(FieldType::FOREIGNER_REFERENCE) {
                let reference = field.reference.clone().ok_or_else(invalid)?;
                let property = field.property.clone().ok_or_else(invalid)?;
                return Ok(FieldKind::InverseReference {
                    reference,
                    property,
                });
            }
            if flags.contains(FieldType::SCHEMA_REFERENCE) {
                let reference = field.reference.clone().ok_or_else(invalid)?;
                return Ok(FieldKind::ArrayReference(reference));
            }
        }
        // ArrayOf must modify a reference or an embedded schema.
        return Err(invalid());
    }

    if flags.contains(FieldType::SCHEMA_REFERENCE) {
        let reference = field.reference.clone().ok_or_else(invalid)?;
        return Ok(FieldKind::SingleReference(reference));
    }

    let kind = if flags.contains(FieldType::DATE) {
        ScalarKind::Date
    } else if flags.contains(FieldType::OBJECT) {
        ScalarKind::Object
    } else if flags.contains(FieldType::STRING) {
        ScalarKind::String
    } else if flags.contains(FieldType::NUMBER) {
        ScalarKind::Number
    } else if flags.contains(FieldType::ARRAY) {
        ScalarKind::Array
    } else if flags.contains(FieldType::BOOLEAN) {
        ScalarKind::Boolean
    } else if flags.contains(FieldType::OBJECT_ID) {
        ScalarKind::Id
    } else {
        return Err(invalid());
    };

    Ok(FieldKind::Scalar(kind))
}
