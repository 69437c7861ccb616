//! Field types and typed field values.
//!
//! A schema field declares a [`FieldType`]; incoming JSON values are coerced
//! into [`Value`]s by matching on it. Stored versions carry the fieldless
//! [`FieldKind`] next to each value list so snapshots stay readable after the
//! schema changes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{FieldId, ItemId, ModelId, SchemaId, Timestamp};

// ---------------------------------------------------------------------------
// Field kinds and types
// ---------------------------------------------------------------------------

/// Discriminant of [`FieldType`], stored with every [`FieldValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Text,
    TextArea,
    RichText,
    Markdown,
    Integer,
    Number,
    Bool,
    Date,
    Url,
    Select,
    Tag,
    Asset,
    Reference,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::TextArea => "text_area",
            Self::RichText => "rich_text",
            Self::Markdown => "markdown",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Bool => "bool",
            Self::Date => "date",
            Self::Url => "url",
            Self::Select => "select",
            Self::Tag => "tag",
            Self::Asset => "asset",
            Self::Reference => "reference",
        }
    }
}

impl std::fmt::Display for FieldKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target of a `Reference` field.
///
/// When `corresponding_field_id` is set the field is one end of a
/// two-way pair and the named field lives on the target schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceSpec {
    pub model_id: ModelId,
    pub schema_id: SchemaId,
    pub corresponding_field_id: Option<FieldId>,
}

/// Declared type of a schema field, including its type-specific settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldType {
    Text { max_length: Option<usize> },
    TextArea { max_length: Option<usize> },
    RichText,
    Markdown,
    Integer { min: Option<i64>, max: Option<i64> },
    Number { min: Option<f64>, max: Option<f64> },
    Bool,
    Date,
    Url,
    Select { options: Vec<String> },
    Tag { tags: Vec<String> },
    Asset,
    Reference(ReferenceSpec),
}

impl FieldType {
    pub fn kind(&self) -> FieldKind {
        match self {
            Self::Text { .. } => FieldKind::Text,
            Self::TextArea { .. } => FieldKind::TextArea,
            Self::RichText => FieldKind::RichText,
            Self::Markdown => FieldKind::Markdown,
            Self::Integer { .. } => FieldKind::Integer,
            Self::Number { .. } => FieldKind::Number,
            Self::Bool => FieldKind::Bool,
            Self::Date => FieldKind::Date,
            Self::Url => FieldKind::Url,
            Self::Select { .. } => FieldKind::Select,
            Self::Tag { .. } => FieldKind::Tag,
            Self::Asset => FieldKind::Asset,
            Self::Reference(_) => FieldKind::Reference,
        }
    }

    pub fn reference(&self) -> Option<&ReferenceSpec> {
        match self {
            Self::Reference(spec) => Some(spec),
            _ => None,
        }
    }

    /// Coerce one JSON scalar into a typed value.
    ///
    /// Returns `Ok(None)` for JSON `null`, and for an empty string on types
    /// where an empty string cannot be a meaningful value.
    pub fn coerce(&self, json: &serde_json::Value) -> Result<Option<Value>, String> {
        use serde_json::Value as J;

        if json.is_null() {
            return Ok(None);
        }

        match self {
            Self::Text { max_length } | Self::TextArea { max_length } => {
                let text = expect_str(json, "a string")?;
                if let Some(max) = max_length {
                    let len = text.chars().count();
                    if len > *max {
                        return Err(format!(
                            "text exceeds maximum length of {max} characters (got {len})"
                        ));
                    }
                }
                Ok(Some(Value::String(text.to_string())))
            }
            Self::RichText | Self::Markdown => {
                Ok(Some(Value::String(expect_str(json, "a string")?.to_string())))
            }
            Self::Integer { min, max } => {
                let n = match json {
                    J::Number(n) => n.as_i64().ok_or("expected an integer")?,
                    _ => return Err("expected an integer".to_string()),
                };
                check_range(n, *min, *max)?;
                Ok(Some(Value::Integer(n)))
            }
            Self::Number { min, max } => {
                let n = match json {
                    J::Number(n) => n.as_f64().ok_or("expected a number")?,
                    _ => return Err("expected a number".to_string()),
                };
                check_range(n, *min, *max)?;
                Ok(Some(Value::Number(n)))
            }
            Self::Bool => match json {
                J::Bool(b) => Ok(Some(Value::Bool(*b))),
                _ => Err("expected a boolean".to_string()),
            },
            Self::Date => {
                let Some(text) = non_empty_str(json, "an RFC 3339 date string")? else {
                    return Ok(None);
                };
                let parsed = DateTime::parse_from_rfc3339(text)
                    .map_err(|e| format!("invalid date '{text}': {e}"))?;
                Ok(Some(Value::Date(parsed.with_timezone(&Utc))))
            }
            Self::Url => {
                let Some(text) = non_empty_str(json, "a URL string")? else {
                    return Ok(None);
                };
                let has_scheme = text.starts_with("http://") || text.starts_with("https://");
                if !has_scheme || text.chars().any(char::is_whitespace) {
                    return Err(format!("invalid URL '{text}'"));
                }
                Ok(Some(Value::String(text.to_string())))
            }
            Self::Select { options } => {
                let Some(text) = non_empty_str(json, "a string")? else {
                    return Ok(None);
                };
                if !options.iter().any(|o| o == text) {
                    return Err(format!(
                        "'{text}' is not one of: {}",
                        options.join(", ")
                    ));
                }
                Ok(Some(Value::String(text.to_string())))
            }
            Self::Tag { tags } => {
                let Some(text) = non_empty_str(json, "a string")? else {
                    return Ok(None);
                };
                if !tags.iter().any(|t| t == text) {
                    return Err(format!("unknown tag '{text}'"));
                }
                Ok(Some(Value::String(text.to_string())))
            }
            Self::Asset => {
                let Some(text) = non_empty_str(json, "an asset id")? else {
                    return Ok(None);
                };
                Ok(Some(Value::String(text.to_string())))
            }
            Self::Reference(_) => {
                let Some(text) = non_empty_str(json, "an item id")? else {
                    return Ok(None);
                };
                let id = text
                    .parse::<ItemId>()
                    .map_err(|_| format!("invalid item id '{text}'"))?;
                Ok(Some(Value::Reference(id)))
            }
        }
    }
}

fn expect_str<'a>(json: &'a serde_json::Value, expected: &str) -> Result<&'a str, String> {
    json.as_str().ok_or_else(|| format!("expected {expected}"))
}

fn non_empty_str<'a>(
    json: &'a serde_json::Value,
    expected: &str,
) -> Result<Option<&'a str>, String> {
    let text = expect_str(json, expected)?;
    Ok((!text.is_empty()).then_some(text))
}

fn check_range<T>(n: T, min: Option<T>, max: Option<T>) -> Result<(), String>
where
    T: PartialOrd + std::fmt::Display + Copy,
{
    if let Some(min) = min {
        if n < min {
            return Err(format!("value {n} is below the minimum of {min}"));
        }
    }
    if let Some(max) = max {
        if n > max {
            return Err(format!("value {n} exceeds the maximum of {max}"));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// A single typed scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    String(String),
    Integer(i64),
    Number(f64),
    Bool(bool),
    Date(Timestamp),
    Reference(ItemId),
}

impl Value {
    pub fn as_reference(&self) -> Option<ItemId> {
        match self {
            Self::Reference(id) => Some(*id),
            _ => None,
        }
    }

    /// Plain JSON rendering, the inverse of [`FieldType::coerce`].
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Integer(n) => serde_json::Value::from(*n),
            Self::Number(n) => serde_json::Value::from(*n),
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Date(d) => serde_json::Value::String(d.to_rfc3339()),
            Self::Reference(id) => serde_json::Value::String(id.to_string()),
        }
    }
}

/// The stored value of one schema field. An empty `values` list is null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValue {
    pub field_id: FieldId,
    pub kind: FieldKind,
    pub values: Vec<Value>,
}

impl FieldValue {
    pub fn new(field_id: FieldId, kind: FieldKind, values: Vec<Value>) -> Self {
        Self {
            field_id,
            kind,
            values,
        }
    }

    /// A single-valued reference field, null when `target` is `None`.
    pub fn reference(field_id: FieldId, target: Option<ItemId>) -> Self {
        Self::new(
            field_id,
            FieldKind::Reference,
            target.map(Value::Reference).into_iter().collect(),
        )
    }

    pub fn is_null(&self) -> bool {
        self.values.is_empty()
    }

    pub fn first(&self) -> Option<&Value> {
        self.values.first()
    }

    pub fn as_reference(&self) -> Option<ItemId> {
        self.first().and_then(Value::as_reference)
    }
}

/// Caller-supplied value for one field, before schema coercion.
///
/// `value` may be a scalar, an array (for `multiple` fields) or `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldInput {
    pub field_id: FieldId,
    pub value: serde_json::Value,
}

impl FieldInput {
    pub fn new(field_id: FieldId, value: serde_json::Value) -> Self {
        Self { field_id, value }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
