use itertools::Itertools;
use serde_json::Value;
use std::collections::{HashMap, HashSet};

use crate::error::{CrudError, Result};
use crate::logic::projector::{project, Owner, Projection};
use crate::model::{
    Cardinality, ColumnDef, ColumnRef, Entity, FilterOp, Filters, JoinSpec, Predicate,
    QueryRequest,
};
use crate::store::dialect::{Dialect, SqlWriter, Statement};

/// Offset/limit applied to shaped records instead of joined rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordWindow {
    pub offset: usize,
    pub limit: Option<usize>,
}

impl RecordWindow {
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        let rest = items.into_iter().skip(self.offset);
        match self.limit {
            Some(limit) => rest.take(limit).collect(),
            None => rest.collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AssembledQuery {
    pub select: Statement,
    /// Same joins and filters, no ordering or paging
    pub count: Statement,
    pub projection: Projection,
    /// Resolved joins, in SQL order
    pub joins: Vec<JoinSpec>,
    pub nest: bool,
    pub record_window: Option<RecordWindow>,
}

/// Turns a [`QueryRequest`] into SQL for one base entity.
///
/// All misuse is reported as [`CrudError::Config`] before any SQL is
/// produced.
pub struct QueryAssembler<'a> {
    entity: &'a Entity,
    dialect: Dialect,
    require_join: bool,
}

impl<'a> QueryAssembler<'a> {
    pub fn new(entity: &'a Entity, dialect: Dialect) -> Self {
        Self {
            entity,
            dialect,
            require_join: false,
        }
    }

    /// Reject requests without join configuration
    pub fn require_join(mut self, require: bool) -> Self {
        self.require_join = require;
        self
    }

    pub fn assemble(&self, request: &QueryRequest) -> Result<AssembledQuery> {
        if request.offset < 0 || request.limit.is_some_and(|l| l < 0) {
            return Err(CrudError::config("Offset/limit must be non-negative"));
        }

        let joins = self.resolve_joins(request)?;

        if request.return_as_model && request.schema.is_none() {
            return Err(CrudError::config(
                "schema_to_select must be provided when return_as_model is True",
            ));
        }

        self.check_join_identities(&joins)?;

        let nest = request.nest_joins && !joins.is_empty();
        if !nest {
            if let Some(join) = joins
                .iter()
                .find(|j| j.cardinality == Cardinality::OneToMany)
            {
                return Err(CrudError::config(format!(
                    "Join '{}' is one-to-many and requires nest_joins",
                    join.identity()
                )));
            }
        }

        for prefix in request.nested_schemas.keys() {
            let used = joins.iter().any(|j| {
                j.prefix.as_deref() == Some(prefix.as_str()) || j.nested_key() == *prefix
            });
            if !used {
                return Err(CrudError::config(format!(
                    "Nested schema registered for prefix '{}' which no join uses",
                    prefix
                )));
            }
        }

        self.check_sorting(request)?;

        let projection = project(self.entity, request.schema.as_deref(), &joins, nest)?;
        if nest {
            self.check_nested_keys(&joins, &projection)?;
        }

        let windowed = nest && joins.iter().any(|j| j.cardinality == Cardinality::OneToMany);
        let record_window = windowed.then(|| RecordWindow {
            offset: request.offset as usize,
            limit: request.limit.map(|l| l as usize),
        });

        let select = self.select_statement(request, &joins, &projection, windowed)?;
        let count = self.count_statement(request, &joins, nest)?;

        log::debug!(
            "assembled {} query: {} join(s), nest={}, windowed={}",
            self.entity.table(),
            joins.len(),
            nest,
            windowed
        );

        Ok(AssembledQuery {
            select,
            count,
            projection,
            joins,
            nest,
            record_window,
        })
    }

    fn resolve_joins(&self, request: &QueryRequest) -> Result<Vec<JoinSpec>> {
        match (&request.join, &request.joins) {
            (Some(_), Some(_)) => Err(CrudError::config(
                "Cannot use both single join parameters and joins_config simultaneously",
            )),
            (Some(single), None) => Ok(vec![single.clone().into_spec(self.entity)?]),
            (None, Some(joins)) if !joins.is_empty() || !self.require_join => Ok(joins.clone()),
            _ if self.require_join => Err(CrudError::config(
                "You need one of join_model or joins_config",
            )),
            _ => Ok(Vec::new()),
        }
    }

    fn check_join_identities(&self, joins: &[JoinSpec]) -> Result<()> {
        let mut identities: HashSet<&str> = HashSet::new();
        let mut prefixes: HashSet<&str> = HashSet::new();
        identities.insert(self.entity.table());

        for join in joins {
            if !identities.insert(join.identity()) {
                return Err(CrudError::config(format!(
                    "Join identity '{}' is used more than once; give repeated joins of '{}' distinct aliases",
                    join.identity(),
                    join.target.table()
                )));
            }
            if let Some(prefix) = join.prefix.as_deref() {
                if !prefixes.insert(prefix) {
                    return Err(CrudError::config(format!(
                        "Join prefix '{}' is used more than once",
                        prefix
                    )));
                }
            }
        }
        Ok(())
    }

    /// Every join must land under its own key, clear of the base columns
    fn check_nested_keys(&self, joins: &[JoinSpec], projection: &Projection) -> Result<()> {
        let mut keys: HashMap<String, &str> = HashMap::new();
        for join in joins {
            let key = join.nested_key();
            if projection
                .owned_by(Owner::Base)
                .any(|c| !c.hidden && c.column == key)
            {
                return Err(CrudError::config(format!(
                    "Nested key '{}' of join '{}' collides with a column of '{}'",
                    key,
                    join.identity(),
                    self.entity.table()
                )));
            }
            if let Some(other) = keys.insert(key.clone(), join.identity()) {
                return Err(CrudError::config(format!(
                    "Joins '{}' and '{}' both nest under '{}'",
                    other,
                    join.identity(),
                    key
                )));
            }
        }
        Ok(())
    }

    fn check_sorting(&self, request: &QueryRequest) -> Result<()> {
        if !request.sort_orders.is_empty()
            && request.sort_orders.len() != request.sort_columns.len()
        {
            return Err(CrudError::config(
                "The length of sort_columns and sort_orders must match.",
            ));
        }
        for column in &request.sort_columns {
            self.entity.require_column(column)?;
        }
        Ok(())
    }

    fn select_statement(
        &self,
        request: &QueryRequest,
        joins: &[JoinSpec],
        projection: &Projection,
        windowed: bool,
    ) -> Result<Statement> {
        let mut w = SqlWriter::new(self.dialect);
        let select_list = projection
            .columns()
            .iter()
            .map(|c| {
                format!(
                    "{}.{} AS {}",
                    self.dialect.quote(&c.qualifier),
                    self.dialect.quote(&c.column),
                    self.dialect.quote(&c.label)
                )
            })
            .join(", ");
        w.push("SELECT ").push(&select_list);
        self.write_from(&mut w, request, joins)?;

        if !request.sort_columns.is_empty() {
            let order_by = request
                .sort_columns
                .iter()
                .enumerate()
                .map(|(i, column)| {
                    let order = request.sort_orders.get(i).copied().unwrap_or_default();
                    format!(
                        "{}.{} {}",
                        self.dialect.quote(self.entity.table()),
                        self.dialect.quote(column),
                        order.sql()
                    )
                })
                .join(", ");
            w.push(" ORDER BY ").push(&order_by);
        }

        if !windowed {
            if let Some(paging) = self.dialect.limit_offset(request.limit, request.offset) {
                w.push(" ").push(&paging);
            }
        }

        let statement = w.finish();
        log::debug!("select: {}", statement.sql);
        Ok(statement)
    }

    fn count_statement(
        &self,
        request: &QueryRequest,
        joins: &[JoinSpec],
        nest: bool,
    ) -> Result<Statement> {
        let mut w = SqlWriter::new(self.dialect);
        if nest {
            let keys = self
                .entity
                .primary_key()
                .iter()
                .map(|key| {
                    format!(
                        "{}.{}",
                        self.dialect.quote(self.entity.table()),
                        self.dialect.quote(key)
                    )
                })
                .join(", ");
            w.push("SELECT COUNT(*) FROM (SELECT DISTINCT ").push(&keys);
            self.write_from(&mut w, request, joins)?;
            w.push(") AS ").push_ident("base_keys");
        } else {
            w.push("SELECT COUNT(*)");
            self.write_from(&mut w, request, joins)?;
        }
        Ok(w.finish())
    }

    /// ` FROM base [JOIN ...] [WHERE ...]`
    fn write_from(
        &self,
        w: &mut SqlWriter,
        request: &QueryRequest,
        joins: &[JoinSpec],
    ) -> Result<()> {
        w.push(" FROM ").push_ident(self.entity.table());

        for (index, join) in joins.iter().enumerate() {
            let scope = Scope {
                base: self.entity,
                joins: &joins[..=index],
            };
            w.push(" ").push(join.kind.sql()).push(" ").push_ident(join.target.table());
            if let Some(alias) = join.alias.as_deref() {
                w.push(" AS ").push_ident(alias);
            }
            w.push(" ON ");
            write_predicate(w, &join.on, &scope)?;
            for (key, value) in join.filters.parsed() {
                let column = join.target.require_column(&key.field)?;
                w.push(" AND ");
                write_comparison(w, join.identity(), column, key.op, value)?;
            }
        }

        write_where(w, self.entity, &request.filters)
    }
}

struct Scope<'a> {
    base: &'a Entity,
    joins: &'a [JoinSpec],
}

impl Scope<'_> {
    fn resolve(&self, reference: &ColumnRef) -> Result<&ColumnDef> {
        let entity = if reference.qualifier == self.base.table()
            && !self.joins.iter().any(|j| j.identity() == self.base.table())
        {
            Some(self.base)
        } else {
            self.joins
                .iter()
                .find(|j| j.identity() == reference.qualifier)
                .map(|j| j.target.as_ref())
        };
        entity
            .and_then(|e| e.column(&reference.column))
            .ok_or_else(|| {
                CrudError::config(format!(
                    "Unknown column reference '{}' in join condition",
                    reference
                ))
            })
    }
}

fn write_predicate(w: &mut SqlWriter, predicate: &Predicate, scope: &Scope<'_>) -> Result<()> {
    match predicate {
        Predicate::Columns(left, right) => {
            scope.resolve(left)?;
            scope.resolve(right)?;
            w.push_column(&left.qualifier, &left.column)
                .push(" = ")
                .push_column(&right.qualifier, &right.column);
        }
        Predicate::Value(reference, op, value) => {
            let column = scope.resolve(reference)?;
            write_comparison(w, &reference.qualifier, column, *op, value)?;
        }
        Predicate::And(parts) => {
            for (i, part) in parts.iter().enumerate() {
                if i > 0 {
                    w.push(" AND ");
                }
                write_predicate(w, part, scope)?;
            }
        }
    }
    Ok(())
}

/// `"qualifier"."column" <op> <param>`, with NULL turned into IS [NOT] NULL
pub fn write_comparison(
    w: &mut SqlWriter,
    qualifier: &str,
    column: &ColumnDef,
    op: FilterOp,
    value: &Value,
) -> Result<()> {
    w.push_column(qualifier, &column.name);
    match (op, value) {
        (FilterOp::Eq, Value::Null) => {
            w.push(" IS NULL");
        }
        (FilterOp::Ne, Value::Null) => {
            w.push(" IS NOT NULL");
        }
        (_, Value::Null) => {
            return Err(CrudError::config(format!(
                "Cannot compare '{}' against null with '{}'",
                column.name,
                op.sql()
            )))
        }
        (op, value) => {
            w.push(" ").push(op.sql()).push(" ");
            w.bind(value.clone(), Some(column.data_type));
        }
    }
    Ok(())
}

/// ` WHERE a AND b ...` over columns of `entity`; nothing for empty filters
pub fn write_where(w: &mut SqlWriter, entity: &Entity, filters: &Filters) -> Result<()> {
    for (i, (key, value)) in filters.parsed().enumerate() {
        let column = entity.require_column(&key.field)?;
        w.push(if i == 0 { " WHERE " } else { " AND " });
        write_comparison(w, entity.table(), column, key.op, value)?;
    }
    Ok(())
}
