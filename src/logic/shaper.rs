use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

use crate::error::{CrudError, Result};
use crate::logic::projector::{Owner, ProjectedColumn, Projection};
use crate::model::{Cardinality, ColumnType, JoinSpec, Record, Row};

/// Brings driver values in line with the declared column type
pub fn normalize_value(data_type: ColumnType, value: Value) -> Value {
    match (data_type, value) {
        (ColumnType::Boolean, Value::Number(n)) => match n.as_i64() {
            Some(i) => Value::Bool(i != 0),
            None => Value::Number(n),
        },
        (ColumnType::Json, Value::String(s)) => {
            serde_json::from_str(&s).unwrap_or(Value::String(s))
        }
        (_, value) => value,
    }
}

fn take(row: &mut Row, column: &ProjectedColumn) -> Value {
    normalize_value(column.data_type, row.remove(&column.label).unwrap_or(Value::Null))
}

/// Reshapes flat result rows into output records.
///
/// Flat mode yields one record per row keyed by label. Nested mode yields one
/// record per distinct base primary key in first-seen order, with each join's
/// columns under its nested key.
pub fn shape(
    rows: Vec<Row>,
    projection: &Projection,
    joins: &[JoinSpec],
    nest: bool,
) -> Result<Vec<Record>> {
    if nest {
        return shape_nested(rows, projection, joins);
    }

    if let Some(join) = joins
        .iter()
        .find(|j| j.cardinality == Cardinality::OneToMany)
    {
        return Err(CrudError::config(format!(
            "Join '{}' is one-to-many and requires nest_joins",
            join.identity()
        )));
    }

    Ok(rows
        .into_iter()
        .map(|mut row| {
            projection
                .visible()
                .map(|column| (column.label.clone(), take(&mut row, column)))
                .collect()
        })
        .collect())
}

struct Group {
    record: Record,
    /// Per join, identities of children already attached
    seen: Vec<HashSet<String>>,
}

fn shape_nested(
    rows: Vec<Row>,
    projection: &Projection,
    joins: &[JoinSpec],
) -> Result<Vec<Record>> {
    let base_keys: Vec<&ProjectedColumn> = projection
        .owned_by(Owner::Base)
        .filter(|c| c.primary_key)
        .collect();
    if base_keys.is_empty() {
        return Err(CrudError::config(
            "Nested results need the base primary key in the projection",
        ));
    }

    let join_columns: Vec<Vec<&ProjectedColumn>> = (0..joins.len())
        .map(|i| projection.owned_by(Owner::Join(i)).collect())
        .collect();

    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<Group> = Vec::new();

    for mut row in rows {
        let key_values: Vec<&Value> = base_keys
            .iter()
            .map(|c| row.get(&c.label).unwrap_or(&Value::Null))
            .collect();
        let group_key = serde_json::to_string(&key_values)
            .map_err(|e| CrudError::Storage(e.into()))?;

        let position = match positions.get(&group_key) {
            Some(&position) => position,
            None => {
                let mut record = Map::new();
                for column in projection.owned_by(Owner::Base).filter(|c| !c.hidden) {
                    let value = normalize_value(
                        column.data_type,
                        row.get(&column.label).cloned().unwrap_or(Value::Null),
                    );
                    record.insert(column.column.clone(), value);
                }
                for join in joins {
                    let empty = match join.cardinality {
                        Cardinality::OneToOne => Value::Null,
                        Cardinality::OneToMany => Value::Array(Vec::new()),
                    };
                    record.insert(join.nested_key(), empty);
                }
                groups.push(Group {
                    record,
                    seen: vec![HashSet::new(); joins.len()],
                });
                positions.insert(group_key, groups.len() - 1);
                groups.len() - 1
            }
        };
        let group = &mut groups[position];

        for (index, join) in joins.iter().enumerate() {
            let columns = &join_columns[index];
            let child: Map<String, Value> = columns
                .iter()
                .map(|c| (c.column.clone(), take(&mut row, c)))
                .collect();
            if child.values().all(Value::is_null) {
                continue;
            }

            let key = join.nested_key();
            match join.cardinality {
                Cardinality::OneToOne => {
                    if group.record.get(&key).map_or(true, Value::is_null) {
                        group.record.insert(key, Value::Object(child));
                    }
                }
                Cardinality::OneToMany => {
                    let identity_columns: Vec<&Value> = columns
                        .iter()
                        .filter(|c| c.primary_key)
                        .filter_map(|c| child.get(&c.column))
                        .collect();
                    let identity = if identity_columns.is_empty() {
                        Value::Object(child.clone()).to_string()
                    } else {
                        serde_json::to_string(&identity_columns)
                            .map_err(|e| CrudError::Storage(e.into()))?
                    };
                    if group.seen[index].insert(identity) {
                        if let Some(Value::Array(children)) = group.record.get_mut(&key) {
                            children.push(Value::Object(child));
                        }
                    }
                }
            }
        }
    }

    Ok(groups.into_iter().map(|g| g.record).collect())
}
