use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::fmt;

use super::record::Record;

/// Validation and column-selection capability of an output schema.
///
/// `column_fields` lists the scalar fields that map to table columns; nested
/// object and list fields are excluded.
pub trait Schema: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;

    fn column_fields(&self) -> Vec<String>;

    /// Names of object/list fields, which hold nested join data
    fn nested_fields(&self) -> Vec<String> {
        Vec::new()
    }

    fn validate(&self, record: &Record) -> Result<Record, ValidationError>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub schema: String,
    pub errors: Vec<FieldError>,
}

impl ValidationError {
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            errors: Vec::new(),
        }
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(FieldError {
            field: field.into(),
            message: message.into(),
        });
    }

    pub fn detail(&self) -> String {
        self.errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} validation failed: {}", self.schema, self.detail())
    }
}

impl std::error::Error for ValidationError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Integer,
    Float,
    String,
    Boolean,
    Timestamp,
    Any,
    Object,
    List,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(default)]
    pub nullable: bool,
    /// Element schema of object and list fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Box<ModelSchema>>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            max_length: None,
            required: true,
            nullable: false,
            schema: None,
        }
    }

    /// Optional and nullable, defaulting to null when absent
    pub fn optional(mut self) -> Self {
        self.required = false;
        self.nullable = true;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    pub fn of(mut self, schema: ModelSchema) -> Self {
        self.schema = Some(Box::new(schema));
        self
    }

    fn is_nested(&self) -> bool {
        matches!(self.kind, FieldKind::Object | FieldKind::List)
    }
}

/// Declarative schema, usable from code or from the config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSchema {
    pub name: String,
    pub fields: Vec<FieldDef>,
    #[serde(default)]
    pub forbid_extra: bool,
}

impl ModelSchema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            forbid_extra: false,
        }
    }

    pub fn field(mut self, field: FieldDef) -> Self {
        self.fields.push(field);
        self
    }

    pub fn forbid_extra(mut self) -> Self {
        self.forbid_extra = true;
        self
    }

    /// Copy of this schema with every field optional, for partial updates
    pub fn partial(&self) -> ModelSchema {
        ModelSchema {
            name: self.name.clone(),
            fields: self
                .fields
                .iter()
                .map(|f| FieldDef {
                    required: false,
                    ..f.clone()
                })
                .collect(),
            forbid_extra: self.forbid_extra,
        }
    }

    fn check(&self, record: &Record, path: &str, errors: &mut ValidationError) -> Record {
        let mut output = Map::new();
        for field in &self.fields {
            let location = format!("{}{}", path, field.name);
            match record.get(&field.name) {
                None if field.required => errors.push(location, "field required"),
                None => {
                    output.insert(field.name.clone(), Value::Null);
                }
                Some(Value::Null) if field.nullable => {
                    output.insert(field.name.clone(), Value::Null);
                }
                Some(Value::Null) => errors.push(location, "none is not an allowed value"),
                Some(value) => {
                    if let Some(coerced) = self.check_value(field, value, &location, errors) {
                        output.insert(field.name.clone(), coerced);
                    }
                }
            }
        }

        if self.forbid_extra {
            for key in record.keys() {
                if !self.fields.iter().any(|f| &f.name == key) {
                    errors.push(format!("{}{}", path, key), "extra fields not permitted");
                }
            }
        }
        output
    }

    fn check_value(
        &self,
        field: &FieldDef,
        value: &Value,
        location: &str,
        errors: &mut ValidationError,
    ) -> Option<Value> {
        let coerced = match field.kind {
            FieldKind::Any => Some(value.clone()),
            FieldKind::Integer => coerce_integer(value),
            FieldKind::Float => coerce_float(value),
            FieldKind::Boolean => coerce_boolean(value),
            FieldKind::String => match value {
                Value::String(s) => match field.max_length {
                    Some(max) if s.chars().count() > max => {
                        errors.push(
                            location,
                            format!("ensure this value has at most {} characters", max),
                        );
                        return None;
                    }
                    _ => Some(value.clone()),
                },
                _ => None,
            },
            FieldKind::Timestamp => match value {
                Value::String(s) if is_timestamp(s) => Some(value.clone()),
                _ => None,
            },
            FieldKind::Object => match (value, field.schema.as_deref()) {
                (Value::Object(inner), Some(schema)) => Some(Value::Object(schema.check(
                    inner,
                    &format!("{}.", location),
                    errors,
                ))),
                (Value::Object(_), None) => Some(value.clone()),
                _ => None,
            },
            FieldKind::List => match (value, field.schema.as_deref()) {
                (Value::Array(items), Some(schema)) => {
                    let mut checked = Vec::with_capacity(items.len());
                    for (i, item) in items.iter().enumerate() {
                        let item_location = format!("{}.{}", location, i);
                        match item {
                            Value::Object(inner) => checked.push(Value::Object(schema.check(
                                inner,
                                &format!("{}.", item_location),
                                errors,
                            ))),
                            _ => errors.push(item_location, "value is not a valid object"),
                        }
                    }
                    Some(Value::Array(checked))
                }
                (Value::Array(_), None) => Some(value.clone()),
                _ => None,
            },
        };

        if coerced.is_none() {
            errors.push(location, format!("value is not a valid {}", kind_name(field.kind)));
        }
        coerced
    }
}

impl Schema for ModelSchema {
    fn name(&self) -> &str {
        &self.name
    }

    fn column_fields(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| !f.is_nested())
            .map(|f| f.name.clone())
            .collect()
    }

    fn nested_fields(&self) -> Vec<String> {
        self.fields
            .iter()
            .filter(|f| f.is_nested())
            .map(|f| f.name.clone())
            .collect()
    }

    fn validate(&self, record: &Record) -> Result<Record, ValidationError> {
        let mut errors = ValidationError::new(&self.name);
        let output = self.check(record, "", &mut errors);
        if errors.errors.is_empty() {
            Ok(output)
        } else {
            Err(errors)
        }
    }
}

fn kind_name(kind: FieldKind) -> &'static str {
    match kind {
        FieldKind::Integer => "integer",
        FieldKind::Float => "float",
        FieldKind::String => "string",
        FieldKind::Boolean => "boolean",
        FieldKind::Timestamp => "datetime",
        FieldKind::Any => "value",
        FieldKind::Object => "object",
        FieldKind::List => "list",
    }
}

fn coerce_integer(value: &Value) -> Option<Value> {
    match value {
        Value::Number(n) if n.is_i64() || n.is_u64() => Some(value.clone()),
        Value::Number(n) => n
            .as_f64()
            .filter(|f| f.fract() == 0.0)
            .map(|f| Value::from(f as i64)),
        Value::Bool(b) => Some(Value::from(*b as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok().map(Value::from),
        _ => None,
    }
}

fn coerce_float(value: &Value) -> Option<Value> {
    match value {
        Value::Number(n) => n.as_f64().and_then(Number::from_f64).map(Value::Number),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number),
        _ => None,
    }
}

fn coerce_boolean(value: &Value) -> Option<Value> {
    match value {
        Value::Bool(_) => Some(value.clone()),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Some(Value::Bool(false)),
            Some(1) => Some(Value::Bool(true)),
            _ => None,
        },
        Value::String(s) => match s.to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(Value::Bool(true)),
            "false" | "0" | "no" | "off" => Some(Value::Bool(false)),
            _ => None,
        },
        _ => None,
    }
}

fn is_timestamp(raw: &str) -> bool {
    DateTime::parse_from_rfc3339(raw).is_ok()
        || NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").is_ok()
        || NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
        || NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f").is_ok()
}
