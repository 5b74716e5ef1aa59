use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

use crate::api::{CrudMethod, EndpointCreator, FilterConfig};
use crate::error::Result;
use crate::logic::Crud;
use crate::model::{
    Cardinality, Entity, EntityDef, EntityRegistry, JoinKind, JoinSpec, ModelSchema, Predicate,
    Schema,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    /// Tables only reachable through joins
    #[serde(default)]
    pub entities: Vec<EntityDef>,
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub connection_string: Option<String>,
    pub max_connections: Option<u32>,
}

/// One table exposed over HTTP
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Route prefix, `/<table>` when absent
    #[serde(default)]
    pub path: Option<String>,
    pub entity: EntityDef,
    pub create_schema: ModelSchema,
    /// Defaults to the create schema with every field optional
    #[serde(default)]
    pub update_schema: Option<ModelSchema>,
    #[serde(default)]
    pub read_schema: Option<ModelSchema>,
    #[serde(default)]
    pub db_delete: bool,
    #[serde(default)]
    pub endpoint_names: HashMap<CrudMethod, String>,
    #[serde(default)]
    pub included_methods: Option<Vec<String>>,
    #[serde(default)]
    pub deleted_methods: Option<Vec<String>>,
    #[serde(default)]
    pub joins: Vec<JoinConfig>,
    #[serde(default)]
    pub nest_joins: bool,
    /// Query parameters the list endpoints filter on, mapped to their defaults
    #[serde(default)]
    pub filters: Map<String, Value>,
    #[serde(default)]
    pub is_deleted_column: Option<String>,
    #[serde(default)]
    pub deleted_at_column: Option<String>,
    #[serde(default)]
    pub updated_at_column: Option<String>,
}

fn default_join_kind() -> String {
    "left".to_string()
}

/// Join used by a resource's read endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinConfig {
    pub table: String,
    #[serde(default)]
    pub alias: Option<String>,
    #[serde(default)]
    pub prefix: Option<String>,
    /// Column pairs compared for equality, e.g. `[["test.tier_id", "tier.id"]]`
    pub on: Vec<[String; 2]>,
    #[serde(default = "default_join_kind")]
    pub kind: String,
    #[serde(default)]
    pub relationship: Cardinality,
    #[serde(default)]
    pub schema: Option<ModelSchema>,
    #[serde(default)]
    pub filters: Map<String, Value>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            entities: Vec::new(),
            resources: Vec::new(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            connection_string: None,
            max_connections: Some(20),
        }
    }
}

impl JoinConfig {
    pub fn to_spec(&self, registry: &EntityRegistry) -> Result<JoinSpec> {
        let target = registry.require(&self.table)?;
        let mut spec = JoinSpec::new(target, Predicate::from_pairs(self.on.as_slice())?)
            .kind(self.kind.parse::<JoinKind>()?)
            .filters(self.filters.clone().into());
        spec.alias = self.alias.clone();
        spec.prefix = self.prefix.clone();
        spec.cardinality = self.relationship;
        if let Some(schema) = &self.schema {
            spec.schema = Some(Arc::new(schema.clone()));
        }
        Ok(spec)
    }
}

impl ResourceConfig {
    pub fn endpoint_creator(&self, registry: &EntityRegistry) -> Result<EndpointCreator> {
        let entity = registry.require(&self.entity.table)?;

        let mut crud = Crud::new(Arc::clone(&entity));
        if let Some(column) = &self.is_deleted_column {
            crud = crud.is_deleted_column(column);
        }
        if let Some(column) = &self.deleted_at_column {
            crud = crud.deleted_at_column(column);
        }
        if let Some(column) = &self.updated_at_column {
            crud = crud.updated_at_column(column);
        }

        let update_schema = self
            .update_schema
            .clone()
            .unwrap_or_else(|| self.create_schema.partial());
        let mut creator = EndpointCreator::new(
            crud,
            Arc::new(self.create_schema.clone()),
            Arc::new(update_schema),
        );

        if let Some(path) = &self.path {
            creator = creator.path(path);
        }
        if let Some(schema) = &self.read_schema {
            creator = creator.read_schema(Arc::new(schema.clone()) as Arc<dyn Schema>);
        }
        if self.db_delete {
            creator = creator.with_db_delete();
        }
        for (method, name) in &self.endpoint_names {
            creator = creator.endpoint_name(*method, name);
        }
        if let Some(methods) = &self.included_methods {
            creator = creator.included_methods(methods.iter().cloned());
        }
        if let Some(methods) = &self.deleted_methods {
            creator = creator.deleted_methods(methods.iter().cloned());
        }
        if !self.joins.is_empty() {
            let joins = self
                .joins
                .iter()
                .map(|join| join.to_spec(registry))
                .collect::<Result<Vec<_>>>()?;
            creator = creator.with_joins(joins, self.nest_joins);
        }
        if !self.filters.is_empty() {
            let filter_config = FilterConfig::new(self.filters.clone())?;
            filter_config.check(&entity)?;
            creator = creator.filter_config(filter_config);
        }
        Ok(creator)
    }
}

impl AppConfig {
    /// Load configuration from environment variables and config file
    pub fn load() -> anyhow::Result<Self> {
        let mut config = config::Config::builder();

        // Add default configuration
        config = config.add_source(config::Config::try_from(&AppConfig::default())?);

        // Add config file if it exists
        config = config.add_source(config::File::with_name("config").required(false));

        // Environment overrides, e.g. AUTOCRUD_SERVER__PORT=8080
        config = config.add_source(
            config::Environment::with_prefix("AUTOCRUD")
                .separator("__")
                .prefix_separator("_"),
        );

        let config = config.build()?;
        let app_config: AppConfig = config.try_deserialize()?;

        Ok(app_config)
    }

    /// Get the database URL from config or environment
    pub fn database_url(&self) -> String {
        if let Some(connection_string) = &self.database.connection_string {
            return connection_string.clone();
        }

        // Fall back to environment variable
        if let Ok(url) = std::env::var("DATABASE_URL") {
            return url;
        }

        // Default for local development
        "sqlite://autocrud.db?mode=rwc".to_string()
    }

    pub fn max_connections(&self) -> u32 {
        self.database.max_connections.unwrap_or(20)
    }

    /// Get the server bind address
    pub fn server_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// All declared tables, resources first
    pub fn registry(&self) -> Result<EntityRegistry> {
        let mut registry = EntityRegistry::new();
        for def in self
            .resources
            .iter()
            .map(|r| &r.entity)
            .chain(self.entities.iter())
        {
            if registry.get(&def.table).is_none() {
                registry.register(Entity::try_from(def.clone())?)?;
            }
        }
        Ok(registry)
    }
}
