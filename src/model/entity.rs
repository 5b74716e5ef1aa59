use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{CrudError, Result};

/// Storage type of a column. Drives parameter casts and value normalisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    Integer,
    Real,
    Text,
    Boolean,
    Timestamp,
    Json,
}

impl ColumnType {
    /// Reads a path or query string value, `None` when it does not fit the type
    pub fn parse_raw(&self, raw: &str) -> Option<Value> {
        match self {
            ColumnType::Integer => raw.parse::<i64>().ok().map(Value::from),
            ColumnType::Real => raw.parse::<f64>().ok().map(Value::from),
            ColumnType::Boolean => match raw {
                "true" | "1" => Some(Value::Bool(true)),
                "false" | "0" => Some(Value::Bool(false)),
                _ => None,
            },
            ColumnType::Json => serde_json::from_str(raw).ok(),
            ColumnType::Text | ColumnType::Timestamp => Some(Value::String(raw.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub table: String,
    pub column: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: ColumnType,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<ForeignKey>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, data_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: false,
            unique: false,
            primary_key: false,
            references: None,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.references = Some(ForeignKey {
            table: table.into(),
            column: column.into(),
        });
        self
    }
}

/// Serializable table description, as written in the config file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityDef {
    pub table: String,
    pub columns: Vec<ColumnDef>,
}

/// Registered table metadata.
///
/// The name → column index is built once here; every filter, sort and schema
/// field name is checked against it before any SQL is produced.
#[derive(Debug, Clone)]
pub struct Entity {
    table: String,
    columns: Vec<ColumnDef>,
    index: HashMap<String, usize>,
    primary_key: Vec<String>,
}

impl Entity {
    pub fn new(table: impl Into<String>, columns: Vec<ColumnDef>) -> Result<Self> {
        let table = table.into();
        if columns.is_empty() {
            return Err(CrudError::config(format!(
                "Entity '{}' must declare at least one column",
                table
            )));
        }

        let mut index = HashMap::with_capacity(columns.len());
        for (position, column) in columns.iter().enumerate() {
            if index.insert(column.name.clone(), position).is_some() {
                return Err(CrudError::config(format!(
                    "Column '{}' declared twice on entity '{}'",
                    column.name, table
                )));
            }
        }

        let primary_key: Vec<String> = columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.clone())
            .collect();
        if primary_key.is_empty() {
            return Err(CrudError::config(format!(
                "Entity '{}' has no primary key column",
                table
            )));
        }

        Ok(Self {
            table,
            columns,
            index,
            primary_key,
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.index.get(name).map(|&position| &self.columns[position])
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Like [`Entity::column`] but reports unknown names as caller misuse
    pub fn require_column(&self, name: &str) -> Result<&ColumnDef> {
        self.column(name).ok_or_else(|| {
            CrudError::config(format!(
                "Invalid column name: '{}' not found in '{}'",
                name, self.table
            ))
        })
    }

    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    pub fn unique_columns(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns.iter().filter(|c| c.unique)
    }

    /// First column of this entity holding a foreign key into `table`
    pub fn foreign_key_to(&self, table: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| {
            c.references
                .as_ref()
                .map(|fk| fk.table == table)
                .unwrap_or(false)
        })
    }
}

impl TryFrom<EntityDef> for Entity {
    type Error = CrudError;

    fn try_from(def: EntityDef) -> Result<Self> {
        Entity::new(def.table, def.columns)
    }
}

/// Entities known to the application, keyed by table name
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    entities: HashMap<String, Arc<Entity>>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, entity: Entity) -> Result<Arc<Entity>> {
        if self.entities.contains_key(entity.table()) {
            return Err(CrudError::config(format!(
                "Entity '{}' is already registered",
                entity.table()
            )));
        }
        let entity = Arc::new(entity);
        self.entities
            .insert(entity.table().to_string(), Arc::clone(&entity));
        Ok(entity)
    }

    pub fn get(&self, table: &str) -> Option<Arc<Entity>> {
        self.entities.get(table).cloned()
    }

    pub fn require(&self, table: &str) -> Result<Arc<Entity>> {
        self.get(table)
            .ok_or_else(|| CrudError::config(format!("Unknown entity '{}'", table)))
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_entity() -> Entity {
        Entity::new(
            "test",
            vec![
                ColumnDef::new("id", ColumnType::Integer).primary_key(),
                ColumnDef::new("name", ColumnType::Text),
                ColumnDef::new("tier_id", ColumnType::Integer).references("tier", "id"),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_parse_raw_by_type() {
        assert_eq!(ColumnType::Integer.parse_raw("42"), Some(Value::from(42)));
        assert_eq!(ColumnType::Integer.parse_raw("4.2"), None);
        assert_eq!(ColumnType::Boolean.parse_raw("0"), Some(Value::Bool(false)));
        assert_eq!(ColumnType::Text.parse_raw("abc"), Some(Value::from("abc")));
        assert_eq!(ColumnType::Json.parse_raw("{"), None);
    }

    #[test]
    fn test_column_lookup() {
        let entity = test_entity();
        assert_eq!(entity.column("name").unwrap().data_type, ColumnType::Text);
        assert!(entity.column("missing").is_none());
        assert_eq!(entity.primary_key(), &["id".to_string()]);

        let err = entity.require_column("missing").unwrap_err();
        assert!(matches!(err, CrudError::Config(_)));
        assert!(err.to_string().contains("'missing' not found in 'test'"));
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let result = Entity::new(
            "dup",
            vec![
                ColumnDef::new("id", ColumnType::Integer).primary_key(),
                ColumnDef::new("id", ColumnType::Text),
            ],
        );
        assert!(matches!(result, Err(CrudError::Config(_))));
    }

    #[test]
    fn test_primary_key_required() {
        let result = Entity::new("nokey", vec![ColumnDef::new("name", ColumnType::Text)]);
        assert!(result.unwrap_err().to_string().contains("no primary key"));
    }

    #[test]
    fn test_foreign_key_lookup() {
        let entity = test_entity();
        assert_eq!(entity.foreign_key_to("tier").unwrap().name, "tier_id");
        assert!(entity.foreign_key_to("category").is_none());
    }

    #[test]
    fn test_entity_def_deserializes() {
        let def: EntityDef = serde_json::from_value(serde_json::json!({
            "table": "tier",
            "columns": [
                {"name": "id", "type": "integer", "primary_key": true},
                {"name": "name", "type": "text", "unique": true}
            ]
        }))
        .unwrap();
        let entity = Entity::try_from(def).unwrap();
        assert_eq!(entity.unique_columns().count(), 1);
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let mut registry = EntityRegistry::new();
        registry.register(test_entity()).unwrap();
        assert!(registry.register(test_entity()).is_err());
        assert!(registry.get("test").is_some());
        assert!(registry.require("tier").is_err());
    }
}
