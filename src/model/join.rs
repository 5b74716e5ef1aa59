use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::entity::Entity;
use super::filter::{FilterOp, Filters};
use super::schema::Schema;
use crate::error::{CrudError, Result};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinKind {
    Inner,
    #[default]
    Left,
}

impl JoinKind {
    pub fn sql(&self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
        }
    }
}

impl FromStr for JoinKind {
    type Err = CrudError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "inner" => Ok(JoinKind::Inner),
            "left" => Ok(JoinKind::Left),
            _ => Err(CrudError::config(format!("Unsupported join type: {}", s))),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Cardinality {
    #[default]
    OneToOne,
    OneToMany,
}

/// Qualified column reference, `qualifier.column`. The qualifier is a table
/// name or a join alias.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnRef {
    pub qualifier: String,
    pub column: String,
}

impl ColumnRef {
    pub fn new(qualifier: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            qualifier: qualifier.into(),
            column: column.into(),
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        match raw.split_once('.') {
            Some((qualifier, column)) if !qualifier.is_empty() && !column.is_empty() => {
                Ok(Self::new(qualifier, column))
            }
            _ => Err(CrudError::config(format!(
                "Invalid column reference '{}', expected 'table.column'",
                raw
            ))),
        }
    }

    pub fn equals(self, other: ColumnRef) -> Predicate {
        Predicate::Columns(self, other)
    }

    pub fn compare(self, op: FilterOp, value: impl Into<Value>) -> Predicate {
        Predicate::Value(self, op, value.into())
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.qualifier, self.column)
    }
}

/// Join condition: a conjunction of column equalities and literal comparisons
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Columns(ColumnRef, ColumnRef),
    Value(ColumnRef, FilterOp, Value),
    And(Vec<Predicate>),
}

impl Predicate {
    pub fn and(self, other: Predicate) -> Predicate {
        match self {
            Predicate::And(mut parts) => {
                parts.push(other);
                Predicate::And(parts)
            }
            first => Predicate::And(vec![first, other]),
        }
    }

    /// Builds `a.x = b.y AND ...` from `[["a.x", "b.y"], ...]` pairs
    pub fn from_pairs<S: AsRef<str>>(pairs: &[[S; 2]]) -> Result<Predicate> {
        let mut parts = pairs
            .iter()
            .map(|[left, right]| {
                Ok(ColumnRef::parse(left.as_ref())?.equals(ColumnRef::parse(right.as_ref())?))
            })
            .collect::<Result<Vec<_>>>()?;
        match parts.len() {
            0 => Err(CrudError::config("Join condition must not be empty")),
            1 => Ok(parts.remove(0)),
            _ => Ok(Predicate::And(parts)),
        }
    }
}

/// One join of a multi-join query
#[derive(Debug, Clone)]
pub struct JoinSpec {
    pub target: Arc<Entity>,
    pub alias: Option<String>,
    pub on: Predicate,
    pub kind: JoinKind,
    pub schema: Option<Arc<dyn Schema>>,
    pub prefix: Option<String>,
    pub cardinality: Cardinality,
    pub filters: Filters,
}

impl JoinSpec {
    pub fn new(target: Arc<Entity>, on: Predicate) -> Self {
        Self {
            target,
            alias: None,
            on,
            kind: JoinKind::default(),
            schema: None,
            prefix: None,
            cardinality: Cardinality::default(),
            filters: Filters::new(),
        }
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn kind(mut self, kind: JoinKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn schema(mut self, schema: Arc<dyn Schema>) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    pub fn one_to_many(mut self) -> Self {
        self.cardinality = Cardinality::OneToMany;
        self
    }

    pub fn filters(mut self, filters: Filters) -> Self {
        self.filters = filters;
        self
    }

    /// Name the join is referred to by in SQL: alias if given, else the table
    pub fn identity(&self) -> &str {
        self.alias.as_deref().unwrap_or_else(|| self.target.table())
    }

    /// Key holding this join's data in nested output
    pub fn nested_key(&self) -> String {
        match self.prefix.as_deref() {
            Some(prefix) if !prefix.trim_end_matches('_').is_empty() => {
                prefix.trim_end_matches('_').to_string()
            }
            _ => self.identity().to_string(),
        }
    }
}
