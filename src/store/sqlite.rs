use anyhow::{Context, Result};
use serde_json::{Map, Number, Value};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row as _, Sqlite, SqlitePool, TypeInfo, ValueRef};

use crate::model::Row;
use crate::store::dialect::{Dialect, Statement};
use crate::store::traits::RowStore;

/// SQLite-backed store, used for local runs and the test suites
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to create SQLite connection pool")?;

        Ok(Self { pool })
    }

    /// Private in-memory database. A single connection that never expires,
    /// since every new connection would open an empty database.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory SQLite database")?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn bind_params<'q>(statement: &'q Statement) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    let mut query = sqlx::query(&statement.sql);
    for value in &statement.params {
        query = match value {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => query.bind(i),
                None => query.bind(n.as_f64()),
            },
            Value::String(s) => query.bind(s.as_str()),
            Value::Array(_) | Value::Object(_) => query.bind(value.to_string()),
        };
    }
    query
}

/// Decodes by the storage class of each value. Booleans and timestamps come
/// back as integers and text; the shaper normalises them by column type.
fn decode_row(row: &SqliteRow) -> Result<Row> {
    let mut record = Map::new();
    for column in row.columns() {
        let i = column.ordinal();
        let raw = row.try_get_raw(i)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            let type_name = raw.type_info().name().to_string();
            match type_name.as_str() {
                "INTEGER" | "BOOLEAN" => Value::from(row.try_get_unchecked::<i64, _>(i)?),
                "REAL" | "NUMERIC" => row
                    .try_get_unchecked::<f64, _>(i)
                    .ok()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
                "BLOB" => {
                    let bytes = row.try_get_unchecked::<Vec<u8>, _>(i)?;
                    Value::String(String::from_utf8_lossy(&bytes).into_owned())
                }
                _ => Value::String(row.try_get_unchecked::<String, _>(i)?),
            }
        };
        record.insert(column.name().to_string(), value);
    }
    Ok(record)
}

#[async_trait::async_trait]
impl RowStore for SqliteStore {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    async fn fetch_all(&self, statement: &Statement) -> Result<Vec<Row>> {
        log::debug!("{} {:?}", statement.sql, statement.params);
        let rows = bind_params(statement)
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch rows")?;

        rows.iter().map(decode_row).collect()
    }

    async fn fetch_count(&self, statement: &Statement) -> Result<u64> {
        log::debug!("{} {:?}", statement.sql, statement.params);
        let row = bind_params(statement)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count rows")?;

        let count: i64 = row.try_get(0)?;
        Ok(count.max(0) as u64)
    }

    async fn execute(&self, statement: &Statement) -> Result<u64> {
        log::debug!("{} {:?}", statement.sql, statement.params);
        let result = bind_params(statement)
            .execute(&self.pool)
            .await
            .context("Failed to execute statement")?;

        Ok(result.rows_affected())
    }
}
