//! Argument schemas and the validator that checks call arguments against them.
//!
//! A [`Schema`] is a plain value tree. [`validate`] walks it in declaration
//! order and stops at the first violation, so the reported error for a given
//! (schema, arguments) pair is always the same one.

use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value};
use thiserror::Error;

// =============================================================================
// Schema tree
// =============================================================================

/// Type tag of a schema node.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaType {
    String,
    Number,
    Integer,
    Boolean,
    Object(Vec<Property>),
    Array(Box<Schema>),
    Enum(Vec<String>),
}

/// A named child of an object schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: String,
    pub schema: Schema,
    pub required: bool,
}

/// A schema node: type tag plus optional constraints.
#[derive(Debug, Clone, PartialEq)]
pub struct Schema {
    pub kind: SchemaType,
    pub description: Option<String>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub default: Option<Value>,
}

impl Schema {
    fn of(kind: SchemaType) -> Self {
        Self {
            kind,
            description: None,
            minimum: None,
            maximum: None,
            default: None,
        }
    }

    pub fn string() -> Self {
        Self::of(SchemaType::String)
    }

    pub fn number() -> Self {
        Self::of(SchemaType::Number)
    }

    pub fn integer() -> Self {
        Self::of(SchemaType::Integer)
    }

    pub fn boolean() -> Self {
        Self::of(SchemaType::Boolean)
    }

    /// Empty object schema; add children with [`Schema::required`] and
    /// [`Schema::optional`].
    pub fn object() -> Self {
        Self::of(SchemaType::Object(Vec::new()))
    }

    pub fn array(items: Schema) -> Self {
        Self::of(SchemaType::Array(Box::new(items)))
    }

    pub fn enumeration<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::of(SchemaType::Enum(values.into_iter().map(Into::into).collect()))
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn min(mut self, minimum: f64) -> Self {
        self.minimum = Some(minimum);
        self
    }

    pub fn max(mut self, maximum: f64) -> Self {
        self.maximum = Some(maximum);
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Append a required property. No-op on non-object schemas.
    pub fn required(self, name: impl Into<String>, schema: Schema) -> Self {
        self.property(name.into(), schema, true)
    }

    /// Append an optional property. No-op on non-object schemas.
    pub fn optional(self, name: impl Into<String>, schema: Schema) -> Self {
        self.property(name.into(), schema, false)
    }

    fn property(mut self, name: String, schema: Schema, required: bool) -> Self {
        if let SchemaType::Object(props) = &mut self.kind {
            props.push(Property {
                name,
                schema,
                required,
            });
        }
        self
    }

    pub fn is_object(&self) -> bool {
        matches!(self.kind, SchemaType::Object(_))
    }

    /// Object properties in declaration order (empty for non-objects).
    pub fn properties(&self) -> &[Property] {
        match &self.kind {
            SchemaType::Object(props) => props,
            _ => &[],
        }
    }

    /// Human-readable type name, also used in mismatch errors.
    pub fn type_name(&self) -> &'static str {
        match self.kind {
            SchemaType::String => "string",
            SchemaType::Number => "number",
            SchemaType::Integer => "integer",
            SchemaType::Boolean => "boolean",
            SchemaType::Object(_) => "object",
            SchemaType::Array(_) => "array",
            SchemaType::Enum(_) => "enum",
        }
    }

    /// Render as a JSON Schema document for discovery listings.
    pub fn to_json_schema(&self) -> Value {
        let mut out = Map::new();
        match &self.kind {
            SchemaType::Enum(values) => {
                out.insert("type".into(), Value::from("string"));
                out.insert("enum".into(), Value::from(values.clone()));
            }
            SchemaType::Object(props) => {
                out.insert("type".into(), Value::from("object"));
                let properties: Map<String, Value> = props
                    .iter()
                    .map(|p| (p.name.clone(), p.schema.to_json_schema()))
                    .collect();
                let required: Vec<Value> = props
                    .iter()
                    .filter(|p| p.required)
                    .map(|p| Value::from(p.name.clone()))
                    .collect();
                out.insert("properties".into(), Value::Object(properties));
                out.insert("required".into(), Value::Array(required));
            }
            SchemaType::Array(items) => {
                out.insert("type".into(), Value::from("array"));
                out.insert("items".into(), items.to_json_schema());
            }
            _ => {
                out.insert("type".into(), Value::from(self.type_name()));
            }
        }
        if let Some(desc) = &self.description {
            out.insert("description".into(), Value::from(desc.clone()));
        }
        if let Some(min) = self.minimum {
            out.insert("minimum".into(), Value::from(min));
        }
        if let Some(max) = self.maximum {
            out.insert("maximum".into(), Value::from(max));
        }
        if let Some(default) = &self.default {
            out.insert("default".into(), default.clone());
        }
        Value::Object(out)
    }
}

// =============================================================================
// Validation errors
// =============================================================================

/// First schema violation found in an argument tree.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("missing required field '{field}'")]
    MissingField { field: String },

    #[error("field '{field}': expected {expected}, got {actual}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("field '{field}': invalid value, expected one of: {}", .allowed.join(", "))]
    InvalidEnumValue { field: String, allowed: Vec<String> },

    #[error("field '{field}': value {value} out of range [{}, {}]",
        fmt_bound(.minimum, "-inf"), fmt_bound(.maximum, "inf"))]
    OutOfRange {
        field: String,
        value: f64,
        minimum: Option<f64>,
        maximum: Option<f64>,
    },
}

fn fmt_bound(bound: &Option<f64>, unbounded: &str) -> String {
    bound.map_or_else(|| unbounded.to_string(), |b| b.to_string())
}

impl ValidationError {
    /// Subtype name used on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::MissingField { .. } => "MissingField",
            ValidationError::TypeMismatch { .. } => "TypeMismatch",
            ValidationError::InvalidEnumValue { .. } => "InvalidEnumValue",
            ValidationError::OutOfRange { .. } => "OutOfRange",
        }
    }

    /// Dotted path of the offending field.
    pub fn field(&self) -> &str {
        match self {
            ValidationError::MissingField { field }
            | ValidationError::TypeMismatch { field, .. }
            | ValidationError::InvalidEnumValue { field, .. }
            | ValidationError::OutOfRange { field, .. } => field,
        }
    }
}

// =============================================================================
// Validated arguments
// =============================================================================

/// Argument object that passed schema validation, with defaults filled in.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ValidatedArguments(Map<String, Value>);

impl ValidatedArguments {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    pub fn f64(&self, name: &str) -> Option<f64> {
        self.0.get(name).and_then(Value::as_f64)
    }

    pub fn i64(&self, name: &str) -> Option<i64> {
        self.0.get(name).and_then(Value::as_i64)
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.0.get(name).and_then(Value::as_bool)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// Deserialize into a tool's typed argument struct.
    pub fn parse<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(Value::Object(self.0.clone()))
    }
}

// =============================================================================
// Validator
// =============================================================================

/// Field name reported when the argument root itself has the wrong shape.
const ROOT_FIELD: &str = "<arguments>";

/// Validate `arguments` against an object `schema`.
///
/// `null` arguments are treated as an empty object. Fields not declared by
/// the schema are passed through unchanged.
pub fn validate(schema: &Schema, arguments: &Value) -> Result<ValidatedArguments, ValidationError> {
    let empty = Value::Object(Map::new());
    let arguments = if arguments.is_null() { &empty } else { arguments };

    match check(schema, arguments, "")? {
        Value::Object(map) => Ok(ValidatedArguments(map)),
        other => Err(ValidationError::TypeMismatch {
            field: ROOT_FIELD.to_string(),
            expected: "object",
            actual: value_type_name(&other),
        }),
    }
}

fn child_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}.{name}")
    }
}

fn display_path(path: &str) -> String {
    if path.is_empty() {
        ROOT_FIELD.to_string()
    } else {
        path.to_string()
    }
}

fn check(schema: &Schema, value: &Value, path: &str) -> Result<Value, ValidationError> {
    let mismatch = || ValidationError::TypeMismatch {
        field: display_path(path),
        expected: schema.type_name(),
        actual: value_type_name(value),
    };

    match &schema.kind {
        SchemaType::String => value.is_string().then(|| value.clone()).ok_or_else(mismatch),
        SchemaType::Boolean => value.is_boolean().then(|| value.clone()).ok_or_else(mismatch),
        SchemaType::Number => {
            let n = coerce_number(value).ok_or_else(mismatch)?;
            check_bounds(schema, n, path)?;
            Ok(number_value(n, value))
        }
        SchemaType::Integer => {
            let n = coerce_integer(value).ok_or_else(mismatch)?;
            check_bounds(schema, n as f64, path)?;
            Ok(Value::from(n))
        }
        SchemaType::Enum(allowed) => match value.as_str() {
            Some(s) if allowed.iter().any(|a| a == s) => Ok(value.clone()),
            _ => Err(ValidationError::InvalidEnumValue {
                field: display_path(path),
                allowed: allowed.clone(),
            }),
        },
        SchemaType::Array(items) => {
            let arr = value.as_array().ok_or_else(mismatch)?;
            arr.iter()
                .enumerate()
                .map(|(i, item)| check(items, item, &format!("{}[{}]", path, i)))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array)
        }
        SchemaType::Object(props) => {
            let map = value.as_object().ok_or_else(mismatch)?;
            let mut out = map.clone();
            for prop in props {
                let field = child_path(path, &prop.name);
                match map.get(&prop.name) {
                    None | Some(Value::Null) => {
                        if prop.required {
                            return Err(ValidationError::MissingField { field });
                        }
                        match &prop.schema.default {
                            Some(default) => {
                                out.insert(prop.name.clone(), default.clone());
                            }
                            None => {
                                out.remove(&prop.name);
                            }
                        }
                    }
                    Some(v) => {
                        let checked = check(&prop.schema, v, &field)?;
                        out.insert(prop.name.clone(), checked);
                    }
                }
            }
            Ok(Value::Object(out))
        }
    }
}

/// Numbers pass through; numeric strings are parsed. Nothing else coerces.
fn coerce_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
        _ => None,
    }
}

fn coerce_integer(value: &Value) -> Option<i64> {
    if let Some(i) = value.as_i64() {
        return Some(i);
    }
    let n = coerce_number(value)?;
    if n.fract() == 0.0 && n >= i64::MIN as f64 && n <= i64::MAX as f64 {
        Some(n as i64)
    } else {
        None
    }
}

/// Keep the caller's integer representation when the input already was one.
fn number_value(n: f64, original: &Value) -> Value {
    if let Value::Number(num) = original {
        return Value::Number(num.clone());
    }
    Number::from_f64(n).map(Value::Number).unwrap_or(Value::Null)
}

fn check_bounds(schema: &Schema, n: f64, path: &str) -> Result<(), ValidationError> {
    let below = schema.minimum.is_some_and(|min| n < min);
    let above = schema.maximum.is_some_and(|max| n > max);
    if below || above {
        return Err(ValidationError::OutOfRange {
            field: display_path(path),
            value: n,
            minimum: schema.minimum,
            maximum: schema.maximum,
        });
    }
    Ok(())
}

fn value_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// =============================================================================
// Tests
// =============================================================================
