//! Schema documents and their typed view
//!
//! A [`Schema`] keeps the JSON document exactly as it was read or supplied,
//! so saving and loading it again is lossless, and alongside it a typed view
//! of the parts the store actually reasons about: the top-level kind and, for
//! records, the ordered field list.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Result, SchemaError};

/// The `type` value that marks a record schema
pub const RECORD_TYPE: &str = "record";

/// A field type expression
#[derive(Debug, Clone, PartialEq)]
pub enum TypeExpr {
    /// A named primitive or a reference to a named type (e.g. "string", "long")
    Primitive(String),
    /// A nested record definition
    Record(RecordType),
    /// A union of alternatives, in declaration order
    Union(Vec<TypeExpr>),
    /// Any other nested type object (array, map, enum, fixed), kept as written
    Complex(Value),
}

impl TypeExpr {
    /// Build a type expression from its JSON form
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::String(name) => TypeExpr::Primitive(name.clone()),
            Value::Array(alternatives) => {
                TypeExpr::Union(alternatives.iter().map(TypeExpr::from_json).collect())
            }
            Value::Object(map) if map.get("type").and_then(Value::as_str) == Some(RECORD_TYPE) => {
                match RecordType::from_json(value) {
                    Some(record) => TypeExpr::Record(record),
                    None => TypeExpr::Complex(value.clone()),
                }
            }
            other => TypeExpr::Complex(other.clone()),
        }
    }

    /// Whether data written with `other` can be read as `self`.
    ///
    /// Types are compatible when structurally equal; two unions are
    /// compatible when they share at least one alternative.
    pub fn is_compatible_with(&self, other: &TypeExpr) -> bool {
        match (self, other) {
            (TypeExpr::Union(ours), TypeExpr::Union(theirs)) => {
                ours.iter().any(|alt| theirs.contains(alt))
            }
            _ => self == other,
        }
    }
}

/// A single record field
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub ty: TypeExpr,
    /// Declared default; `Some(Value::Null)` is an explicit `"default": null`
    pub default: Option<Value>,
}

impl Field {
    /// Build a field from its JSON declaration.
    ///
    /// Returns `None` for entries that are not objects with a string `name`.
    pub fn from_json(value: &Value) -> Option<Self> {
        let name = value.get("name")?.as_str()?.to_string();
        let ty = value
            .get("type")
            .map(TypeExpr::from_json)
            .unwrap_or(TypeExpr::Complex(Value::Null));
        Some(Self {
            name,
            ty,
            default: value.get("default").cloned(),
        })
    }

    /// Whether the field declares a default value
    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }
}

/// A record definition: its name and ordered fields
#[derive(Debug, Clone, PartialEq)]
pub struct RecordType {
    pub name: String,
    pub fields: Vec<Field>,
}

impl RecordType {
    /// Build a record from a `{"type": "record", ...}` object.
    ///
    /// Returns `None` if the name is missing or empty or `fields` is not an array.
    pub fn from_json(value: &Value) -> Option<Self> {
        let name = value.get("name")?.as_str().filter(|n| !n.is_empty())?;
        let fields = value.get("fields")?.as_array()?;
        Some(Self {
            name: name.to_string(),
            fields: fields.iter().filter_map(Field::from_json).collect(),
        })
    }

    /// Look up a field by name
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Fields without a default value
    pub fn required_fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.iter().filter(|f| !f.has_default())
    }
}

/// Top-level kind of a schema document
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaKind {
    Record(RecordType),
    /// Any non-record kind; holds the `type` value as text
    Other(String),
}

/// Check that a JSON document is structurally a schema.
///
/// Every document needs a `type`. Records additionally need a non-empty
/// `name` and a `fields` array; other kinds are accepted as they are.
pub fn validate_structure(value: &Value) -> Result<()> {
    let object = value
        .as_object()
        .ok_or_else(|| SchemaError::validation("schema document must be a JSON object"))?;

    let ty = object
        .get("type")
        .ok_or_else(|| SchemaError::validation("schema is missing required 'type' field"))?;

    if ty.as_str() != Some(RECORD_TYPE) {
        return Ok(());
    }

    match object.get("name").and_then(Value::as_str) {
        Some(name) if !name.is_empty() => {}
        _ => return Err(SchemaError::validation("record schema requires a non-empty 'name'")),
    }

    if !object.get("fields").map(Value::is_array).unwrap_or(false) {
        return Err(SchemaError::validation("record schema requires a 'fields' array"));
    }

    Ok(())
}

/// A validated schema document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Schema {
    document: Value,
    kind: SchemaKind,
}

impl Schema {
    /// Validate a JSON document and wrap it
    pub fn from_json(document: Value) -> Result<Self> {
        validate_structure(&document)?;

        let kind = match document.get("type") {
            Some(Value::String(ty)) if ty == RECORD_TYPE => {
                let record = RecordType::from_json(&document)
                    .ok_or_else(|| SchemaError::validation("malformed record schema"))?;
                SchemaKind::Record(record)
            }
            Some(Value::String(ty)) => SchemaKind::Other(ty.clone()),
            Some(other) => SchemaKind::Other(other.to_string()),
            None => return Err(SchemaError::validation("schema is missing required 'type' field")),
        };

        Ok(Self { document, kind })
    }

    /// Parse and validate a schema from JSON text
    pub fn parse(text: &str) -> Result<Self> {
        let document: Value = serde_json::from_str(text)
            .map_err(|e| SchemaError::validation_caused_by("schema is not valid JSON", e))?;
        Self::from_json(document)
    }

    /// The document exactly as stored
    pub fn document(&self) -> &Value {
        &self.document
    }

    pub fn into_document(self) -> Value {
        self.document
    }

    pub fn kind(&self) -> &SchemaKind {
        &self.kind
    }

    /// The top-level `type` value as text
    pub fn type_name(&self) -> &str {
        match &self.kind {
            SchemaKind::Record(_) => RECORD_TYPE,
            SchemaKind::Other(ty) => ty,
        }
    }

    /// The record view, if this is a record schema
    pub fn as_record(&self) -> Option<&RecordType> {
        match &self.kind {
            SchemaKind::Record(record) => Some(record),
            SchemaKind::Other(_) => None,
        }
    }

    /// The schema's declared name, if any
    pub fn name(&self) -> Option<&str> {
        self.document.get("name").and_then(Value::as_str)
    }

    /// Serialize for writing to disk
    pub fn to_pretty_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.document)?)
    }
}

impl TryFrom<Value> for Schema {
    type Error = SchemaError;

    fn try_from(value: Value) -> Result<Self> {
        Schema::from_json(value)
    }
}

impl From<Schema> for Value {
    fn from(schema: Schema) -> Self {
        schema.document
    }
}
