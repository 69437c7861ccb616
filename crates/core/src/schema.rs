//! Schemas, schema fields and two-way reference pairs.
//!
//! Schemas come from an external [`SchemaProvider`]. This module owns field
//! validation, coercion of caller input into stored [`FieldValue`]s, and the
//! bookkeeping that keeps both ends of a reference pair in sync.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, RwLock};

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::field::{FieldInput, FieldType, FieldValue, ReferenceSpec};
use crate::types::{FieldId, ModelId, ProjectId, SchemaId};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Maximum length of a field key.
pub const MAX_FIELD_KEY_LENGTH: usize = 64;

static FIELD_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid regex"));

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaField {
    pub id: FieldId,
    pub key: String,
    pub name: String,
    pub field_type: FieldType,
    pub required: bool,
    pub multiple: bool,
}

impl SchemaField {
    pub fn new(key: impl Into<String>, field_type: FieldType) -> Self {
        let key = key.into();
        Self {
            id: FieldId::new(),
            name: key.clone(),
            key,
            field_type,
            required: false,
            multiple: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn multiple(mut self) -> Self {
        self.multiple = true;
        self
    }

    /// The reference spec when this field is one end of a two-way pair.
    pub fn paired_reference(&self) -> Option<(&ReferenceSpec, FieldId)> {
        let spec = self.field_type.reference()?;
        spec.corresponding_field_id.map(|corr| (spec, corr))
    }

    /// Coerce caller input into a stored value for this field.
    pub fn coerce(&self, json: &serde_json::Value) -> Result<FieldValue, CoreError> {
        let invalid = |detail: String| {
            CoreError::Validation(format!("Field '{}': {detail}", self.key))
        };

        let values = match json {
            serde_json::Value::Array(elements) => {
                if !self.multiple {
                    return Err(invalid("does not accept multiple values".to_string()));
                }
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    if let Some(value) = self.field_type.coerce(element).map_err(invalid)? {
                        values.push(value);
                    }
                }
                values
            }
            scalar => self
                .field_type
                .coerce(scalar)
                .map_err(invalid)?
                .into_iter()
                .collect(),
        };

        Ok(FieldValue::new(self.id, self.field_type.kind(), values))
    }
}

/// A declared 1:1 link between `field_a` on `model_a` and `field_b` on
/// `model_b`. Both ends are single-valued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceFieldPair {
    pub model_a: ModelId,
    pub field_a: FieldId,
    pub model_b: ModelId,
    pub field_b: FieldId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub id: SchemaId,
    pub project_id: ProjectId,
    pub model_id: ModelId,
    pub fields: Vec<SchemaField>,
}

impl Schema {
    pub fn new(project_id: ProjectId, model_id: ModelId) -> Self {
        Self {
            id: SchemaId::new(),
            project_id,
            model_id,
            fields: Vec::new(),
        }
    }

    pub fn field(&self, id: FieldId) -> Option<&SchemaField> {
        self.fields.iter().find(|f| f.id == id)
    }

    pub fn field_by_key(&self, key: &str) -> Option<&SchemaField> {
        self.fields.iter().find(|f| f.key == key)
    }

    /// Add a field, rejecting invalid or duplicate keys.
    pub fn add_field(&mut self, field: SchemaField) -> Result<FieldId, CoreError> {
        validate_field_key(&field.key)?;
        if self.field_by_key(&field.key).is_some() {
            return Err(CoreError::Validation(format!(
                "Field key '{}' already exists in schema",
                field.key
            )));
        }
        if field.paired_reference().is_some() && field.multiple {
            return Err(CoreError::Validation(
                "Two-way reference fields must be single-valued".to_string(),
            ));
        }
        let id = field.id;
        self.fields.push(field);
        Ok(id)
    }

    /// Remove a field. Paired reference fields must go through
    /// [`remove_reference_pair`] so the other end is removed too.
    pub fn remove_field(&mut self, id: FieldId) -> Result<SchemaField, CoreError> {
        let index = self
            .fields
            .iter()
            .position(|f| f.id == id)
            .ok_or_else(|| CoreError::not_found("Field", id))?;
        if self.fields[index].paired_reference().is_some() {
            return Err(CoreError::Validation(format!(
                "Field '{}' is part of a two-way reference; remove the pair instead",
                self.fields[index].key
            )));
        }
        Ok(self.fields.remove(index))
    }

    /// Every two-way pair with one end on this schema, seen from this side.
    pub fn reference_pairs(&self) -> Vec<ReferenceFieldPair> {
        self.fields
            .iter()
            .filter_map(|f| {
                let (spec, corr) = f.paired_reference()?;
                Some(ReferenceFieldPair {
                    model_a: self.model_id,
                    field_a: f.id,
                    model_b: spec.model_id,
                    field_b: corr,
                })
            })
            .collect()
    }

    /// Coerce caller input into stored values. Unknown fields and duplicate
    /// entries are rejected; required-ness is checked separately on the
    /// merged result by [`Schema::check_required`].
    pub fn coerce_fields(&self, inputs: &[FieldInput]) -> Result<Vec<FieldValue>, CoreError> {
        let mut out: Vec<FieldValue> = Vec::with_capacity(inputs.len());
        for input in inputs {
            let field = self.field(input.field_id).ok_or_else(|| {
                CoreError::Validation(format!("Unknown field {} for schema", input.field_id))
            })?;
            if out.iter().any(|v| v.field_id == field.id) {
                return Err(CoreError::Validation(format!(
                    "Field '{}' supplied more than once",
                    field.key
                )));
            }
            out.push(field.coerce(&input.value)?);
        }
        Ok(out)
    }

    /// Fail when any required field is missing or null.
    pub fn check_required(&self, values: &[FieldValue]) -> Result<(), CoreError> {
        for field in self.fields.iter().filter(|f| f.required) {
            let present = values
                .iter()
                .any(|v| v.field_id == field.id && !v.is_null());
            if !present {
                return Err(CoreError::Validation(format!(
                    "Required field '{}' is missing",
                    field.key
                )));
            }
        }
        Ok(())
    }

    /// Overlay `patch` on `current`, keep only fields the schema still
    /// declares, and order the result by schema field order.
    pub fn merge_fields(&self, current: &[FieldValue], patch: Vec<FieldValue>) -> Vec<FieldValue> {
        let mut merged: Vec<FieldValue> = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            let value = patch
                .iter()
                .find(|v| v.field_id == field.id)
                .or_else(|| current.iter().find(|v| v.field_id == field.id));
            if let Some(value) = value {
                merged.push(value.clone());
            }
        }
        merged
    }
}

/// Validate a field key: non-empty, at most [`MAX_FIELD_KEY_LENGTH`] and
/// limited to ASCII letters, digits, `_` and `-`.
pub fn validate_field_key(key: &str) -> Result<(), CoreError> {
    if key.is_empty() {
        return Err(CoreError::Validation(
            "Field key must not be empty".to_string(),
        ));
    }
    if key.len() > MAX_FIELD_KEY_LENGTH {
        return Err(CoreError::Validation(format!(
            "Field key must not exceed {MAX_FIELD_KEY_LENGTH} characters, got {}",
            key.len()
        )));
    }
    if !FIELD_KEY_RE.is_match(key) {
        return Err(CoreError::Validation(format!(
            "Invalid field key '{key}'. Use letters, digits, '_' or '-'"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Reference pairs
// ---------------------------------------------------------------------------

/// Add a two-way reference: field `key_a` on `x` pointing at `y`'s model,
/// plus a generated corresponding field `key_b` on `y` pointing back.
///
/// Pairs within one schema go through [`create_self_reference_pair`].
pub fn create_reference_pair(
    x: &mut Schema,
    y: &mut Schema,
    key_a: &str,
    key_b: &str,
) -> Result<ReferenceFieldPair, CoreError> {
    if x.id == y.id {
        return Err(CoreError::Validation(
            "Use a self-reference pair for fields on the same schema".to_string(),
        ));
    }
    validate_field_key(key_a)?;
    validate_field_key(key_b)?;
    if x.field_by_key(key_a).is_some() {
        return Err(CoreError::Validation(format!(
            "Field key '{key_a}' already exists in schema"
        )));
    }
    if y.field_by_key(key_b).is_some() {
        return Err(CoreError::Validation(format!(
            "Field key '{key_b}' already exists in schema"
        )));
    }

    let id_a = FieldId::new();
    let id_b = FieldId::new();
    x.fields.push(paired_field(id_a, key_a, y, id_b));
    y.fields.push(paired_field(id_b, key_b, x, id_a));

    Ok(ReferenceFieldPair {
        model_a: x.model_id,
        field_a: id_a,
        model_b: y.model_id,
        field_b: id_b,
    })
}

/// Add a two-way reference between two distinct fields of one schema.
pub fn create_self_reference_pair(
    schema: &mut Schema,
    key_a: &str,
    key_b: &str,
) -> Result<ReferenceFieldPair, CoreError> {
    if key_a == key_b {
        return Err(CoreError::Validation(
            "A reference field cannot correspond to itself".to_string(),
        ));
    }
    validate_field_key(key_a)?;
    validate_field_key(key_b)?;
    for key in [key_a, key_b] {
        if schema.field_by_key(key).is_some() {
            return Err(CoreError::Validation(format!(
                "Field key '{key}' already exists in schema"
            )));
        }
    }

    let id_a = FieldId::new();
    let id_b = FieldId::new();
    let field_a = paired_field(id_a, key_a, schema, id_b);
    let field_b = paired_field(id_b, key_b, schema, id_a);
    schema.fields.push(field_a);
    schema.fields.push(field_b);

    Ok(ReferenceFieldPair {
        model_a: schema.model_id,
        field_a: id_a,
        model_b: schema.model_id,
        field_b: id_b,
    })
}

/// Remove both ends of a pair. `y` is the schema holding the corresponding
/// field, or `None` when both ends live on `x`.
pub fn remove_reference_pair(
    x: &mut Schema,
    y: Option<&mut Schema>,
    field_a: FieldId,
) -> Result<(), CoreError> {
    let (spec, field_b) = x
        .field(field_a)
        .and_then(|f| f.paired_reference().map(|(s, c)| (s.clone(), c)))
        .ok_or_else(|| CoreError::not_found("Reference pair", field_a))?;

    match y {
        Some(y) => {
            if y.id != spec.schema_id {
                return Err(CoreError::Validation(
                    "Schema does not hold the corresponding field".to_string(),
                ));
            }
            y.fields.retain(|f| f.id != field_b);
        }
        None if spec.schema_id == x.id => x.fields.retain(|f| f.id != field_b),
        None => {
            return Err(CoreError::Validation(
                "The corresponding schema is required to remove this pair".to_string(),
            ))
        }
    }
    x.fields.retain(|f| f.id != field_a);
    Ok(())
}

fn paired_field(id: FieldId, key: &str, target: &Schema, corresponding: FieldId) -> SchemaField {
    SchemaField {
        id,
        key: key.to_string(),
        name: key.to_string(),
        field_type: FieldType::Reference(ReferenceSpec {
            model_id: target.model_id,
            schema_id: target.id,
            corresponding_field_id: Some(corresponding),
        }),
        required: false,
        multiple: false,
    }
}

// ---------------------------------------------------------------------------
// Schema provider
// ---------------------------------------------------------------------------

/// Source of schemas for the item store.
#[async_trait]
pub trait SchemaProvider: Send + Sync {
    /// Fetch a schema by id. Fails with [`CoreError::NotFound`] when unknown.
    async fn schema(&self, id: SchemaId) -> Result<Schema, CoreError>;
}

#[async_trait]
impl<T: SchemaProvider + ?Sized> SchemaProvider for Arc<T> {
    async fn schema(&self, id: SchemaId) -> Result<Schema, CoreError> {
        (**self).schema(id).await
    }
}

/// Process-local schema registry.
#[derive(Debug, Default, Clone)]
pub struct InMemorySchemas {
    schemas: Arc<RwLock<HashMap<SchemaId, Schema>>>,
}

impl InMemorySchemas {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a schema.
    pub fn put(&self, schema: Schema) {
        self.schemas
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(schema.id, schema);
    }
}

#[async_trait]
impl SchemaProvider for InMemorySchemas {
    async fn schema(&self, id: SchemaId) -> Result<Schema, CoreError> {
        self.schemas
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&id)
            .cloned()
            .ok_or_else(|| CoreError::not_found("Schema", id))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
