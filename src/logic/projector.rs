use std::collections::HashSet;

use crate::error::{CrudError, Result};
use crate::model::{ColumnType, Entity, JoinSpec, Schema};

/// Which side of the query a projected column belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Owner {
    Base,
    /// Index into the query's join list
    Join(usize),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedColumn {
    /// Result column label, unique within the query
    pub label: String,
    pub owner: Owner,
    /// Table name or alias the column is selected through
    pub qualifier: String,
    pub column: String,
    pub data_type: ColumnType,
    pub primary_key: bool,
    /// Selected only for grouping; never part of the output
    pub hidden: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection {
    columns: Vec<ProjectedColumn>,
}

impl Projection {
    pub fn columns(&self) -> &[ProjectedColumn] {
        &self.columns
    }

    pub fn visible(&self) -> impl Iterator<Item = &ProjectedColumn> {
        self.columns.iter().filter(|c| !c.hidden)
    }

    pub fn owned_by(&self, owner: Owner) -> impl Iterator<Item = &ProjectedColumn> {
        self.columns.iter().filter(move |c| c.owner == owner)
    }
}

struct Labeler {
    used: HashSet<String>,
}

impl Labeler {
    /// First occurrence keeps `wanted`, later ones get `_1`, `_2`, ...
    fn assign(&mut self, wanted: String) -> String {
        if self.used.insert(wanted.clone()) {
            return wanted;
        }
        let mut n = 1;
        loop {
            let candidate = format!("{}_{}", wanted, n);
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }
}

fn selected_columns<'a>(
    entity: &'a Entity,
    schema: Option<&dyn Schema>,
    allowed_elsewhere: impl Fn(&str) -> bool,
) -> Result<Vec<&'a crate::model::ColumnDef>> {
    let Some(schema) = schema else {
        return Ok(entity.columns().iter().collect());
    };

    let mut selected = Vec::new();
    for field in schema.column_fields() {
        match entity.column(&field) {
            Some(column) => selected.push(column),
            None if allowed_elsewhere(&field) => {}
            None => {
                return Err(CrudError::config(format!(
                    "Invalid column name: '{}' of schema {} not found in '{}'",
                    field,
                    schema.name(),
                    entity.table()
                )))
            }
        }
    }
    Ok(selected)
}

/// Computes the select list of a (possibly joined) query.
///
/// With `include_base_keys`, base primary-key columns the schema left out are
/// added as hidden columns so rows can be grouped per base record.
pub fn project(
    base: &Entity,
    base_schema: Option<&dyn Schema>,
    joins: &[JoinSpec],
    include_base_keys: bool,
) -> Result<Projection> {
    let mut labeler = Labeler {
        used: HashSet::new(),
    };
    let mut columns = Vec::new();

    let belongs_to_join = |field: &str| {
        joins.iter().any(|join| {
            join.nested_key() == field
                || join.prefix.as_deref().is_some_and(|prefix| {
                    field
                        .strip_prefix(prefix)
                        .is_some_and(|column| join.target.has_column(column))
                })
        })
    };

    for column in selected_columns(base, base_schema, belongs_to_join)? {
        columns.push(ProjectedColumn {
            label: labeler.assign(column.name.clone()),
            owner: Owner::Base,
            qualifier: base.table().to_string(),
            column: column.name.clone(),
            data_type: column.data_type,
            primary_key: column.primary_key,
            hidden: false,
        });
    }

    if include_base_keys {
        for key in base.primary_key() {
            if columns.iter().any(|c| c.owner == Owner::Base && &c.column == key) {
                continue;
            }
            let column = base.require_column(key)?;
            columns.push(ProjectedColumn {
                label: labeler.assign(column.name.clone()),
                owner: Owner::Base,
                qualifier: base.table().to_string(),
                column: column.name.clone(),
                data_type: column.data_type,
                primary_key: true,
                hidden: true,
            });
        }
    }

    for (index, join) in joins.iter().enumerate() {
        let prefix = join.prefix.as_deref().unwrap_or("");
        for column in selected_columns(&join.target, join.schema.as_deref(), |_| false)? {
            columns.push(ProjectedColumn {
                label: labeler.assign(format!("{}{}", prefix, column.name)),
                owner: Owner::Join(index),
                qualifier: join.identity().to_string(),
                column: column.name.clone(),
                data_type: column.data_type,
                primary_key: column.primary_key,
                hidden: false,
            });
        }
    }

    Ok(Projection { columns })
}
