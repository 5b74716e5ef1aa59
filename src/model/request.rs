use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use super::entity::Entity;
use super::filter::Filters;
use super::join::{ColumnRef, JoinKind, JoinSpec, Predicate};
use super::schema::Schema;
use crate::error::{CrudError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

impl FromStr for SortOrder {
    type Err = CrudError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            _ => Err(CrudError::config(format!(
                "Invalid sort order: {}. Only 'asc' or 'desc' are allowed.",
                s
            ))),
        }
    }
}

/// Single-join shorthand: one target with an optional explicit condition
#[derive(Debug, Clone)]
pub struct SingleJoin {
    pub target: Arc<Entity>,
    pub on: Option<Predicate>,
    pub prefix: Option<String>,
    pub schema: Option<Arc<dyn Schema>>,
    pub kind: JoinKind,
    pub filters: Filters,
}

impl SingleJoin {
    pub fn new(target: Arc<Entity>) -> Self {
        Self {
            target,
            on: None,
            prefix: None,
            schema: None,
            kind: JoinKind::default(),
            filters: Filters::new(),
        }
    }

    pub fn on(mut self, on: Predicate) -> Self {
        self.on = Some(on);
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn schema(mut self, schema: Arc<dyn Schema>) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn kind(mut self, kind: JoinKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn filters(mut self, filters: Filters) -> Self {
        self.filters = filters;
        self
    }

    /// Expands into a one-to-one [`JoinSpec`]. Without an explicit condition
    /// the join follows a foreign key between `base` and the target, in
    /// either direction.
    pub fn into_spec(self, base: &Entity) -> Result<JoinSpec> {
        let on = match self.on {
            Some(on) => on,
            None => auto_detect_condition(base, &self.target)?,
        };
        let mut spec = JoinSpec::new(self.target, on)
            .kind(self.kind)
            .filters(self.filters);
        spec.prefix = self.prefix;
        spec.schema = self.schema;
        Ok(spec)
    }
}

fn auto_detect_condition(base: &Entity, target: &Entity) -> Result<Predicate> {
    if let Some(column) = base.foreign_key_to(target.table()) {
        if let Some(fk) = &column.references {
            return Ok(ColumnRef::new(base.table(), &column.name)
                .equals(ColumnRef::new(target.table(), &fk.column)));
        }
    }
    if let Some(column) = target.foreign_key_to(base.table()) {
        if let Some(fk) = &column.references {
            return Ok(ColumnRef::new(base.table(), &fk.column)
                .equals(ColumnRef::new(target.table(), &column.name)));
        }
    }
    Err(CrudError::config(format!(
        "Could not automatically determine a join condition between '{}' and '{}'. \
         Please provide join_on explicitly.",
        base.table(),
        target.table()
    )))
}

/// Everything one read call asks for
#[derive(Debug, Clone, Default)]
pub struct QueryRequest {
    pub schema: Option<Arc<dyn Schema>>,
    pub join: Option<SingleJoin>,
    pub joins: Option<Vec<JoinSpec>>,
    pub filters: Filters,
    pub sort_columns: Vec<String>,
    /// Parallel to `sort_columns`; empty means ascending everywhere
    pub sort_orders: Vec<SortOrder>,
    pub offset: i64,
    pub limit: Option<i64>,
    pub nest_joins: bool,
    pub return_as_model: bool,
    /// Prefix → schema used to validate that join's nested data
    pub nested_schemas: HashMap<String, Arc<dyn Schema>>,
}

impl QueryRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schema(mut self, schema: Arc<dyn Schema>) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn join(mut self, join: SingleJoin) -> Self {
        self.join = Some(join);
        self
    }

    pub fn joins(mut self, joins: Vec<JoinSpec>) -> Self {
        self.joins = Some(joins);
        self
    }

    pub fn filters(mut self, filters: Filters) -> Self {
        self.filters = filters;
        self
    }

    pub fn filter(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.filters.insert(key, value);
        self
    }

    pub fn sort(mut self, column: impl Into<String>, order: SortOrder) -> Self {
        self.sort_columns.push(column.into());
        self.sort_orders.push(order);
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn nest(mut self) -> Self {
        self.nest_joins = true;
        self
    }

    pub fn as_model(mut self) -> Self {
        self.return_as_model = true;
        self
    }

    pub fn nested_schema(mut self, prefix: impl Into<String>, schema: Arc<dyn Schema>) -> Self {
        self.nested_schemas.insert(prefix.into(), schema);
        self
    }

    /// Whether the request carries any join configuration
    pub fn has_joins(&self) -> bool {
        self.join.is_some() || self.joins.is_some()
    }
}
