use serde_json::Value;
use std::sync::Arc;

use crate::error::{CrudError, Result};
use crate::model::{JoinSpec, QueryRequest, Record, Schema, ValidationError};

impl From<ValidationError> for CrudError {
    fn from(err: ValidationError) -> Self {
        CrudError::DataValidation {
            detail: err.detail(),
            schema: err.schema,
        }
    }
}

/// Validates shaped records against a base schema and, first, the nested
/// data of selected joins against their own schemas.
#[derive(Debug, Clone)]
pub struct ResultValidator {
    schema: Arc<dyn Schema>,
    nested: Vec<(String, Arc<dyn Schema>)>,
}

impl ResultValidator {
    pub fn new(schema: Arc<dyn Schema>) -> Self {
        Self {
            schema,
            nested: Vec::new(),
        }
    }

    /// Validate the value under `key` (object or list of objects) with `schema`
    pub fn nested(mut self, key: impl Into<String>, schema: Arc<dyn Schema>) -> Self {
        self.nested.push((key.into(), schema));
        self
    }

    /// Validator for a read request, or `None` when it does not ask for models
    pub fn from_request(request: &QueryRequest, joins: &[JoinSpec]) -> Result<Option<Self>> {
        if !request.return_as_model {
            return Ok(None);
        }
        let schema = request.schema.clone().ok_or_else(|| {
            CrudError::config("schema_to_select must be provided when return_as_model is True")
        })?;

        let mut validator = Self::new(schema);
        for (prefix, nested_schema) in &request.nested_schemas {
            let join = joins
                .iter()
                .find(|j| j.prefix.as_deref() == Some(prefix.as_str()) || j.nested_key() == *prefix)
                .ok_or_else(|| {
                    CrudError::config(format!(
                        "Nested schema registered for prefix '{}' which no join uses",
                        prefix
                    ))
                })?;
            validator = validator.nested(join.nested_key(), Arc::clone(nested_schema));
        }
        Ok(Some(validator))
    }

    pub fn validate_one(&self, mut record: Record) -> Result<Record> {
        for (key, schema) in &self.nested {
            match record.get_mut(key) {
                Some(Value::Object(inner)) => {
                    *inner = schema.validate(inner)?;
                }
                Some(Value::Array(items)) => {
                    for item in items.iter_mut() {
                        if let Value::Object(inner) = item {
                            *inner = schema.validate(inner)?;
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(self.schema.validate(&record)?)
    }

    pub fn validate(&self, records: Vec<Record>) -> Result<Vec<Record>> {
        records
            .into_iter()
            .map(|record| self.validate_one(record))
            .collect()
    }
}
