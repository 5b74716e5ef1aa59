use anyhow::anyhow;
use itertools::Itertools;
use serde_json::Value;
use std::sync::Arc;

use crate::error::{CrudError, Result};
use crate::logic::assembler::{write_where, AssembledQuery, QueryAssembler};
use crate::logic::shaper::{normalize_value, shape};
use crate::logic::validator::ResultValidator;
use crate::model::{CursorPage, Entity, Filters, Page, QueryRequest, Record, Row, SortOrder};
use crate::store::dialect::SqlWriter;
use crate::store::traits::RowStore;

/// Create/read/update/delete operations for one entity.
///
/// Soft deletion kicks in when the entity has the configured is-deleted
/// column; updates stamp the updated-at column when present.
#[derive(Debug, Clone)]
pub struct Crud {
    entity: Arc<Entity>,
    is_deleted_column: String,
    deleted_at_column: String,
    updated_at_column: String,
}

impl Crud {
    pub fn new(entity: Arc<Entity>) -> Self {
        Self {
            entity,
            is_deleted_column: "is_deleted".to_string(),
            deleted_at_column: "deleted_at".to_string(),
            updated_at_column: "updated_at".to_string(),
        }
    }

    pub fn is_deleted_column(mut self, name: impl Into<String>) -> Self {
        self.is_deleted_column = name.into();
        self
    }

    pub fn deleted_at_column(mut self, name: impl Into<String>) -> Self {
        self.deleted_at_column = name.into();
        self
    }

    pub fn updated_at_column(mut self, name: impl Into<String>) -> Self {
        self.updated_at_column = name.into();
        self
    }

    pub fn entity(&self) -> &Arc<Entity> {
        &self.entity
    }

    fn check_columns(&self, record: &Record) -> Result<()> {
        if record.is_empty() {
            return Err(CrudError::config(format!(
                "No values given for '{}'",
                self.entity.table()
            )));
        }
        let extra: Vec<&str> = record
            .keys()
            .filter(|key| !self.entity.has_column(key))
            .map(String::as_str)
            .collect();
        if !extra.is_empty() {
            return Err(CrudError::config(format!(
                "Extra fields provided: {}",
                extra.join(", ")
            )));
        }
        Ok(())
    }

    fn normalize_row(&self, mut row: Row) -> Record {
        for column in self.entity.columns() {
            if let Some(value) = row.remove(&column.name) {
                row.insert(column.name.clone(), normalize_value(column.data_type, value));
            }
        }
        row
    }

    fn insert_statement(&self, writer: &mut SqlWriter, record: &Record) -> Result<()> {
        let columns = record
            .keys()
            .map(|key| writer.dialect().quote(key))
            .join(", ");
        writer
            .push("INSERT INTO ")
            .push_ident(self.entity.table())
            .push(" (")
            .push(&columns)
            .push(") VALUES (");
        for (i, (key, value)) in record.iter().enumerate() {
            if i > 0 {
                writer.push(", ");
            }
            let column = self.entity.require_column(key)?;
            writer.bind(value.clone(), Some(column.data_type));
        }
        writer.push(")");
        Ok(())
    }

    /// Inserts one row and returns it as stored
    pub async fn create<S: RowStore + ?Sized>(&self, store: &S, record: Record) -> Result<Record> {
        self.check_columns(&record)?;
        let mut writer = SqlWriter::new(store.dialect());
        self.insert_statement(&mut writer, &record)?;
        writer.push(" RETURNING *");

        let row = store
            .fetch_optional(&writer.finish())
            .await?
            .ok_or_else(|| anyhow!("Insert into '{}' returned no row", self.entity.table()))?;
        Ok(self.normalize_row(row))
    }

    /// Inserts, or updates the non-key columns when the primary key exists
    pub async fn upsert<S: RowStore + ?Sized>(&self, store: &S, record: Record) -> Result<Record> {
        self.check_columns(&record)?;
        let keys = self.entity.primary_key();
        if let Some(missing) = keys.iter().find(|k| !record.contains_key(*k)) {
            return Err(CrudError::config(format!(
                "Upsert requires the primary key column '{}'",
                missing
            )));
        }

        let mut writer = SqlWriter::new(store.dialect());
        self.insert_statement(&mut writer, &record)?;
        let dialect = store.dialect();
        let conflict = keys.iter().map(|k| dialect.quote(k)).join(", ");
        let updates = record
            .keys()
            .filter(|k| !keys.contains(k))
            .map(|k| format!("{} = excluded.{}", dialect.quote(k), dialect.quote(k)))
            .join(", ");
        if updates.is_empty() {
            writer
                .push(" ON CONFLICT (")
                .push(&conflict)
                .push(") DO NOTHING");
        } else {
            writer
                .push(" ON CONFLICT (")
                .push(&conflict)
                .push(") DO UPDATE SET ")
                .push(&updates);
        }
        writer.push(" RETURNING *");

        match store.fetch_optional(&writer.finish()).await? {
            Some(row) => Ok(self.normalize_row(row)),
            // DO NOTHING returns no row for an existing key
            None => {
                let filters: Filters = keys
                    .iter()
                    .filter_map(|k| record.get(k).map(|v| (k.clone(), v.clone())))
                    .collect();
                self.get(store, QueryRequest::new().filters(filters))
                    .await?
                    .ok_or_else(|| CrudError::NotFound("Item not found".to_string()))
            }
        }
    }

    async fn read<S: RowStore + ?Sized>(
        &self,
        store: &S,
        request: &QueryRequest,
        require_join: bool,
    ) -> Result<(Vec<Record>, AssembledQuery)> {
        let query = QueryAssembler::new(&self.entity, store.dialect())
            .require_join(require_join)
            .assemble(request)?;
        let validator = ResultValidator::from_request(request, &query.joins)?;

        let rows = store.fetch_all(&query.select).await?;
        let mut records = shape(rows, &query.projection, &query.joins, query.nest)?;
        if let Some(window) = query.record_window {
            records = window.apply(records);
        }
        if let Some(validator) = validator {
            records = validator.validate(records)?;
        }
        Ok((records, query))
    }

    async fn read_page<S: RowStore + ?Sized>(
        &self,
        store: &S,
        request: &QueryRequest,
        require_join: bool,
    ) -> Result<Page> {
        let (data, query) = self.read(store, request, require_join).await?;
        let total_count = store.fetch_count(&query.count).await?;
        Ok(Page { data, total_count })
    }

    async fn read_one<S: RowStore + ?Sized>(
        &self,
        store: &S,
        mut request: QueryRequest,
        require_join: bool,
    ) -> Result<Option<Record>> {
        request.limit = Some(1);
        let (records, _) = self.read(store, &request, require_join).await?;
        Ok(records.into_iter().next())
    }

    pub async fn get<S: RowStore + ?Sized>(
        &self,
        store: &S,
        request: QueryRequest,
    ) -> Result<Option<Record>> {
        self.read_one(store, request, false).await
    }

    pub async fn get_multi<S: RowStore + ?Sized>(
        &self,
        store: &S,
        request: QueryRequest,
    ) -> Result<Page> {
        self.read_page(store, &request, false).await
    }

    /// First joined record; with a nested one-to-many join it carries all
    /// children of that base row.
    pub async fn get_joined<S: RowStore + ?Sized>(
        &self,
        store: &S,
        request: QueryRequest,
    ) -> Result<Option<Record>> {
        self.read_one(store, request, true).await
    }

    pub async fn get_multi_joined<S: RowStore + ?Sized>(
        &self,
        store: &S,
        request: QueryRequest,
    ) -> Result<Page> {
        self.read_page(store, &request, true).await
    }

    pub async fn count<S: RowStore + ?Sized>(&self, store: &S, filters: &Filters) -> Result<u64> {
        let query = QueryAssembler::new(&self.entity, store.dialect())
            .assemble(&QueryRequest::new().filters(filters.clone()))?;
        Ok(store.fetch_count(&query.count).await?)
    }

    pub async fn exists<S: RowStore + ?Sized>(&self, store: &S, filters: &Filters) -> Result<bool> {
        Ok(self.count(store, filters).await? > 0)
    }

    async fn check_matches<S: RowStore + ?Sized>(
        &self,
        store: &S,
        filters: &Filters,
        allow_multiple: bool,
        action: &str,
    ) -> Result<()> {
        let matched = self.count(store, filters).await?;
        if matched == 0 {
            return Err(CrudError::NotFound(format!("No record found to {}.", action)));
        }
        if matched > 1 && !allow_multiple {
            return Err(CrudError::MultipleResults(format!(
                "Expected exactly one record to {}, found {}.",
                action, matched
            )));
        }
        Ok(())
    }

    /// Updates matching rows, returning how many changed
    pub async fn update<S: RowStore + ?Sized>(
        &self,
        store: &S,
        values: Record,
        filters: &Filters,
        allow_multiple: bool,
    ) -> Result<u64> {
        self.check_columns(&values)?;
        self.check_matches(store, filters, allow_multiple, "update")
            .await?;

        let dialect = store.dialect();
        let mut writer = SqlWriter::new(dialect);
        writer.push("UPDATE ").push_ident(self.entity.table()).push(" SET ");
        for (i, (key, value)) in values.iter().enumerate() {
            if i > 0 {
                writer.push(", ");
            }
            let column = self.entity.require_column(key)?;
            writer.push_ident(key).push(" = ");
            writer.bind(value.clone(), Some(column.data_type));
        }
        if self.entity.has_column(&self.updated_at_column)
            && !values.contains_key(&self.updated_at_column)
        {
            writer
                .push(", ")
                .push_ident(&self.updated_at_column)
                .push(" = ")
                .push(dialect.current_timestamp());
        }
        write_where(&mut writer, &self.entity, filters)?;

        Ok(store.execute(&writer.finish()).await?)
    }

    /// Soft-deletes matching rows when the entity supports it, else removes them
    pub async fn delete<S: RowStore + ?Sized>(
        &self,
        store: &S,
        filters: &Filters,
        allow_multiple: bool,
    ) -> Result<u64> {
        if !self.entity.has_column(&self.is_deleted_column) {
            return self.db_delete(store, filters, allow_multiple).await;
        }
        self.check_matches(store, filters, allow_multiple, "delete")
            .await?;

        let dialect = store.dialect();
        let mut writer = SqlWriter::new(dialect);
        writer
            .push("UPDATE ")
            .push_ident(self.entity.table())
            .push(" SET ")
            .push_ident(&self.is_deleted_column)
            .push(" = ");
        writer.bind(Value::Bool(true), self.entity.column(&self.is_deleted_column).map(|c| c.data_type));
        if self.entity.has_column(&self.deleted_at_column) {
            writer
                .push(", ")
                .push_ident(&self.deleted_at_column)
                .push(" = ")
                .push(dialect.current_timestamp());
        }
        write_where(&mut writer, &self.entity, filters)?;

        Ok(store.execute(&writer.finish()).await?)
    }

    /// Removes matching rows from the database
    pub async fn db_delete<S: RowStore + ?Sized>(
        &self,
        store: &S,
        filters: &Filters,
        allow_multiple: bool,
    ) -> Result<u64> {
        self.check_matches(store, filters, allow_multiple, "delete")
            .await?;

        let mut writer = SqlWriter::new(store.dialect());
        writer.push("DELETE FROM ").push_ident(self.entity.table());
        write_where(&mut writer, &self.entity, filters)?;

        Ok(store.execute(&writer.finish()).await?)
    }

    /// Keyset pagination over `sort_column`.
    ///
    /// Records strictly after `cursor` in `sort_order` are returned; the next
    /// cursor is only set when the page came back full.
    pub async fn get_multi_by_cursor<S: RowStore + ?Sized>(
        &self,
        store: &S,
        cursor: Option<Value>,
        limit: i64,
        sort_column: &str,
        sort_order: SortOrder,
        mut filters: Filters,
    ) -> Result<CursorPage> {
        self.entity.require_column(sort_column)?;
        if limit == 0 {
            return Ok(CursorPage::default());
        }

        if let Some(cursor) = cursor.filter(|c| !c.is_null()) {
            let op = match sort_order {
                SortOrder::Asc => "gt",
                SortOrder::Desc => "lt",
            };
            filters.insert(format!("{}__{}", sort_column, op), cursor);
        }

        let request = QueryRequest::new()
            .filters(filters)
            .sort(sort_column, sort_order)
            .limit(limit);
        let (data, _) = self.read(store, &request, false).await?;

        let next_cursor = if data.len() as i64 == limit {
            data.last().and_then(|r| r.get(sort_column)).cloned()
        } else {
            None
        };
        Ok(CursorPage { data, next_cursor })
    }
}
