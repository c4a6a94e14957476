use std::fmt;
use std::sync::Arc;

use chrono::DateTime;
use futures::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;

use crate::document::{self, Document, DocumentId};
use crate::error::Result;
use crate::schema::{FieldKind, ResolvedField, ScalarKind, Schema};
use crate::store::{DocumentStore, Filter};

/// Signature of a user-supplied validation predicate. Receives the field's
/// value (if present) and the whole candidate record.
pub type CustomCheck = Arc<dyn Fn(Option<&Value>, &Document) -> bool + Send + Sync>;

/// Identifies which validator produced an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ValidatorKind {
    Required,
    FieldType,
    Min,
    Max,
    Unique,
    Custom(String),
}

impl ValidatorKind {
    /// Stable name used in error payloads.
    pub fn name(&self) -> &str {
        match self {
            ValidatorKind::Required => "required",
            ValidatorKind::FieldType => "checkFieldType",
            ValidatorKind::Min => "min",
            ValidatorKind::Max => "max",
            ValidatorKind::Unique => "unique",
            ValidatorKind::Custom(name) => name,
        }
    }
}

/// A single field-path validation failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationError {
    pub path: Vec<String>,
    pub validator: ValidatorKind,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.join("."), self.validator.name())
    }
}

pub(crate) fn format_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// A declarable validator. The field type check is synthetic: the pipeline
/// inserts it right after a declared `Required`, or at the front when none
/// is declared.
#[derive(Clone)]
pub enum Validator {
    /// The key must be present in the record.
    Required,
    /// Lower bound on length, byte length, or numeric value.
    Min(f64),
    /// Upper bound on length, byte length, or numeric value.
    Max(f64),
    /// No other document in `collection` may hold this value under
    /// `property`. Probes the store.
    Unique {
        collection: String,
        property: String,
    },
    /// User-supplied predicate, tagged with a stable name.
    Custom { name: String, check: CustomCheck },
}

impl Validator {
    pub fn unique(collection: impl Into<String>, property: impl Into<String>) -> Self {
        Validator::Unique {
            collection: collection.into(),
            property: property.into(),
        }
    }

    pub fn custom(
        name: impl Into<String>,
        check: impl Fn(Option<&Value>, &Document) -> bool + Send + Sync + 'static,
    ) -> Self {
        Validator::Custom {
            name: name.into(),
            check: Arc::new(check),
        }
    }

    pub fn kind(&self) -> ValidatorKind {
        match self {
            Validator::Required => ValidatorKind::Required,
            Validator::Min(_) => ValidatorKind::Min,
            Validator::Max(_) => ValidatorKind::Max,
            Validator::Unique { .. } => ValidatorKind::Unique,
            Validator::Custom { name, .. } => ValidatorKind::Custom(name.clone()),
        }
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Validator::{:?}", self.kind())
    }
}

/// Mutable state of one validate call: the field path stack and the errors
/// recorded so far.
#[derive(Debug, Default)]
pub struct ValidationContext {
    path: Vec<String>,
    errors: Vec<ValidationError>,
}

impl ValidationContext {
    pub fn new() -> Self {
        ValidationContext::default()
    }
}

/// One pipeline step: either the synthetic type check or a declared
/// validator.
enum Step<'a> {
    TypeCheck,
    Declared(&'a Validator),
}

impl Step<'_> {
    fn kind(&self) -> ValidatorKind {
        match self {
            Step::TypeCheck => ValidatorKind::FieldType,
            Step::Declared(validator) => validator.kind(),
        }
    }
}

/// Runs a schema's validators against a candidate record, walking embedded
/// schemas depth-first with path tracking.
pub struct SchemaValidator {
    store: Arc<dyn DocumentStore>,
}

impl SchemaValidator {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        SchemaValidator { store }
    }

    /// Validate with the whole-document short circuit: once any field has
    /// recorded an error, no further validators run in this call.
    pub async fn validate(
        &self,
        schema: &Schema,
        record: &Document,
    ) -> Result<Vec<ValidationError>> {
        let mut ctx = ValidationContext::new();
        self.walk(schema, record, &mut ctx, true).await?;
        Ok(ctx.errors)
    }

    /// Validate without the short circuit, collecting one error per failing
    /// field. This is the write precondition used by the facade.
    pub async fn validate_all(
        &self,
        schema: &Schema,
        record: &Document,
    ) -> Result<Vec<ValidationError>> {
        let mut ctx = ValidationContext::new();
        self.walk(schema, record, &mut ctx, false).await?;
        Ok(ctx.errors)
    }

    fn walk<'a>(
        &'a self,
        schema: &'a Schema,
        record: &'a Document,
        ctx: &'a mut ValidationContext,
        short_circuit: bool,
    ) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            for (property, field) in schema.fields() {
                if short_circuit && !ctx.errors.is_empty() {
                    break;
                }
                ctx.path.push(property.clone());

                if let FieldKind::Embedded(nested) = &field.kind {
                    match record.get(property).and_then(Value::as_object) {
                        Some(sub) => {
                            self.walk(nested, sub, &mut *ctx, short_circuit).await?;
                        }
                        None => {
                            let empty = Document::new();
                            self.walk(nested, &empty, &mut *ctx, short_circuit).await?;
                        }
                    }
                    ctx.path.pop();
                    continue;
                }

                self.run_field(property, field, record, &mut *ctx, short_circuit)
                    .await?;
                ctx.path.pop();
            }
            Ok(())
        })
    }

    async fn run_field(
        &self,
        property: &str,
        field: &ResolvedField,
        record: &Document,
        ctx: &mut ValidationContext,
        short_circuit: bool,
    ) -> Result<()> {
        let declared = &field.validation;
        let required_at = declared
            .iter()
            .position(|validator| matches!(validator, Validator::Required));
        let value = record.get(property);

        // A field that was never supplied and is not required cannot fail.
        if required_at.is_none() && value.is_none() {
            return Ok(());
        }

        let mut steps: Vec<Step> = declared.iter().map(Step::Declared).collect();
        match required_at {
            Some(index) => steps.insert(index + 1, Step::TypeCheck),
            None => steps.insert(0, Step::TypeCheck),
        }

        let errors_before = ctx.errors.len();
        for step in steps {
            if short_circuit && !ctx.errors.is_empty() {
                break;
            }
            if ctx.errors.len() > errors_before {
                break;
            }
            if self.run_step(&step, field, property, value, record).await? {
                continue;
            }
            ctx.errors.push(ValidationError {
                path: ctx.path.clone(),
                validator: step.kind(),
            });
        }

        Ok(())
    }

    async fn run_step(
        &self,
        step: &Step<'_>,
        field: &ResolvedField,
        property: &str,
        value: Option<&Value>,
        record: &Document,
    ) -> Result<bool> {
        match step {
            Step::TypeCheck => Ok(check_field_type(field, value)),
            Step::Declared(Validator::Required) => Ok(record.contains_key(property)),
            Step::Declared(Validator::Min(bound)) => {
                Ok(measure(field, value).map(|m| m >= *bound).unwrap_or(false))
            }
            Step::Declared(Validator::Max(bound)) => {
                Ok(measure(field, value).map(|m| m <= *bound).unwrap_or(false))
            }
            Step::Declared(Validator::Unique {
                collection,
                property,
            }) => {
                let filter = Filter::Eq(
                    property.clone(),
                    value.cloned().unwrap_or(Value::Null),
                );
                Ok(self.store.find_one(collection, &filter).await?.is_none())
            }
            Step::Declared(Validator::Custom { check, .. }) => Ok(check(value, record)),
        }
    }
}

/// Confirm the runtime value's shape matches the field's resolved kind.
/// Inverse references and conditional fields carry no directly checkable
/// scalar and always pass.
fn check_field_type(field: &ResolvedField, value: Option<&Value>) -> bool {
    if matches!(
        field.kind,
        FieldKind::InverseReference { .. } | FieldKind::Conditional(_)
    ) {
        return true;
    }
    let value = match value {
        Some(value) => value,
        None => return false,
    };

    match &field.kind {
        // Unreachable behind the early return above, kept for exhaustiveness.
        FieldKind::InverseReference { .. } | FieldKind::Conditional(_) => true,
        FieldKind::Scalar(ScalarKind::Date) => value
            .as_str()
            .map(|s| DateTime::parse_from_rfc3339(s).is_ok())
            .unwrap_or(false),
        FieldKind::Scalar(ScalarKind::Object) => value.is_object(),
        FieldKind::Scalar(ScalarKind::String) => value.is_string(),
        FieldKind::Scalar(ScalarKind::Number) => value.is_number(),
        FieldKind::Scalar(ScalarKind::Array) => value.is_array(),
        FieldKind::Scalar(ScalarKind::Boolean) => value.is_boolean(),
        FieldKind::Scalar(ScalarKind::Id) => {
            value.as_str().map(DocumentId::is_valid).unwrap_or(false)
        }
        FieldKind::SingleReference(_) => {
            value.as_str().map(DocumentId::is_valid).unwrap_or(false)
        }
        FieldKind::ArrayReference(_) => value
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .all(|item| item.as_str().map(DocumentId::is_valid).unwrap_or(false))
            })
            .unwrap_or(false),
        FieldKind::ArrayOfEmbedded(_) => value.is_array(),
        FieldKind::Embedded(_) => value.is_object(),
        FieldKind::Binary => document::binary::decode(value).is_some(),
    }
}

/// The quantity min/max bound, depending on the field's kind: character
/// length for strings, element count for arrays, byte length for binary
/// values, the value itself for numbers.
fn measure(field: &ResolvedField, value: Option<&Value>) -> Option<f64> {
    let value = value?;
    match &field.kind {
        FieldKind::Scalar(ScalarKind::String) => value.as_str().map(|s| s.len() as f64),
        FieldKind::Scalar(ScalarKind::Array) | FieldKind::ArrayOfEmbedded(_) => {
            value.as_array().map(|items| items.len() as f64)
        }
        FieldKind::Scalar(ScalarKind::Number) => value.as_f64(),
        FieldKind::Binary => document::binary::decode(value).map(|bytes| bytes.len() as f64),
        _ => None,
    }
}
