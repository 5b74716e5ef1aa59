use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Number, Value};
use sqlx::postgres::{PgArguments, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Column, PgPool, Postgres, Row as _, TypeInfo};

use crate::model::Row;
use crate::store::dialect::{Dialect, Statement};
use crate::store::traits::RowStore;

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new PostgreSQL store with the given database URL
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to create PostgreSQL connection pool")?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn bind_params<'q>(statement: &'q Statement) -> Query<'q, Postgres, PgArguments> {
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
            Value::Array(_) | Value::Object(_) => query.bind(sqlx::types::Json(value.clone())),
        };
    }
    query
}

fn decode_row(row: &PgRow) -> Result<Row> {
    let mut record = Map::new();
    for column in row.columns() {
        let i = column.ordinal();
        let value = match column.type_info().name() {
            "BOOL" => row.try_get::<Option<bool>, _>(i)?.map(Value::Bool),
            "INT2" => row.try_get::<Option<i16>, _>(i)?.map(Value::from),
            "INT4" => row.try_get::<Option<i32>, _>(i)?.map(Value::from),
            "INT8" => row.try_get::<Option<i64>, _>(i)?.map(Value::from),
            "FLOAT4" => row
                .try_get::<Option<f32>, _>(i)?
                .and_then(|f| Number::from_f64(f as f64))
                .map(Value::Number),
            "FLOAT8" => row
                .try_get::<Option<f64>, _>(i)?
                .and_then(Number::from_f64)
                .map(Value::Number),
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CHAR" => {
                row.try_get::<Option<String>, _>(i)?.map(Value::String)
            }
            "UUID" => row
                .try_get::<Option<uuid::Uuid>, _>(i)?
                .map(|u| Value::String(u.to_string())),
            "TIMESTAMPTZ" => row
                .try_get::<Option<DateTime<Utc>>, _>(i)?
                .map(|t| Value::String(t.to_rfc3339())),
            "TIMESTAMP" => row
                .try_get::<Option<NaiveDateTime>, _>(i)?
                .map(|t| Value::String(t.format("%Y-%m-%dT%H:%M:%S%.f").to_string())),
            "DATE" => row
                .try_get::<Option<NaiveDate>, _>(i)?
                .map(|d| Value::String(d.to_string())),
            "JSON" | "JSONB" => row.try_get::<Option<Value>, _>(i)?,
            other => bail!(
                "Unsupported PostgreSQL type {} for column {}",
                other,
                column.name()
            ),
        };
        record.insert(column.name().to_string(), value.unwrap_or(Value::Null));
    }
    Ok(record)
}

#[async_trait::async_trait]
impl RowStore for PostgresStore {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
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
