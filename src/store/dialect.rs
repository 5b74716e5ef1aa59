use serde_json::Value;

use crate::model::ColumnType;

/// SQL flavour of a backing store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    Postgres,
    Sqlite,
}

impl Dialect {
    /// Double-quotes an identifier, escaping embedded quotes
    pub fn quote(&self, identifier: &str) -> String {
        format!("\"{}\"", identifier.replace('"', "\"\""))
    }

    /// Placeholder for the `index`-th (1-based) parameter. PostgreSQL gets an
    /// explicit cast so untyped JSON values compare against typed columns.
    pub fn placeholder(&self, index: usize, data_type: Option<ColumnType>) -> String {
        match self {
            Dialect::Sqlite => format!("?{}", index),
            Dialect::Postgres => match data_type {
                Some(data_type) => format!("CAST(${} AS {})", index, postgres_type(data_type)),
                None => format!("${}", index),
            },
        }
    }

    pub fn limit_offset(&self, limit: Option<i64>, offset: i64) -> Option<String> {
        match (limit, offset) {
            (None, 0) => None,
            (Some(limit), 0) => Some(format!("LIMIT {}", limit)),
            (Some(limit), offset) => Some(format!("LIMIT {} OFFSET {}", limit, offset)),
            (None, offset) => match self {
                // SQLite only accepts OFFSET after a LIMIT
                Dialect::Sqlite => Some(format!("LIMIT -1 OFFSET {}", offset)),
                Dialect::Postgres => Some(format!("OFFSET {}", offset)),
            },
        }
    }

    pub fn current_timestamp(&self) -> &'static str {
        match self {
            Dialect::Postgres => "NOW()",
            Dialect::Sqlite => "CURRENT_TIMESTAMP",
        }
    }
}

fn postgres_type(data_type: ColumnType) -> &'static str {
    match data_type {
        ColumnType::Integer => "BIGINT",
        ColumnType::Real => "DOUBLE PRECISION",
        ColumnType::Text => "TEXT",
        ColumnType::Boolean => "BOOLEAN",
        ColumnType::Timestamp => "TIMESTAMPTZ",
        ColumnType::Json => "JSONB",
    }
}

/// SQL text plus its positional parameters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    pub fn raw(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }
}

/// Incremental statement builder that numbers placeholders for its dialect
#[derive(Debug, Clone)]
pub struct SqlWriter {
    dialect: Dialect,
    sql: String,
    params: Vec<Value>,
}

impl SqlWriter {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            sql: String::new(),
            params: Vec::new(),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn push(&mut self, sql: &str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    pub fn push_ident(&mut self, identifier: &str) -> &mut Self {
        let quoted = self.dialect.quote(identifier);
        self.sql.push_str(&quoted);
        self
    }

    /// `"qualifier"."column"`
    pub fn push_column(&mut self, qualifier: &str, column: &str) -> &mut Self {
        self.push_ident(qualifier).push(".").push_ident(column)
    }

    pub fn bind(&mut self, value: Value, data_type: Option<ColumnType>) -> &mut Self {
        self.params.push(value);
        let placeholder = self.dialect.placeholder(self.params.len(), data_type);
        self.sql.push_str(&placeholder);
        self
    }

    pub fn finish(self) -> Statement {
        Statement {
            sql: self.sql,
            params: self.params,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_quote_escapes() {
        assert_eq!(Dialect::Sqlite.quote("tier"), "\"tier\"");
        assert_eq!(Dialect::Postgres.quote("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(Dialect::Sqlite.placeholder(3, Some(ColumnType::Integer)), "?3");
        assert_eq!(
            Dialect::Postgres.placeholder(1, Some(ColumnType::Timestamp)),
            "CAST($1 AS TIMESTAMPTZ)"
        );
        assert_eq!(Dialect::Postgres.placeholder(2, None), "$2");
    }

    #[test]
    fn test_limit_offset() {
        assert_eq!(Dialect::Sqlite.limit_offset(None, 0), None);
        assert_eq!(
            Dialect::Sqlite.limit_offset(None, 5).as_deref(),
            Some("LIMIT -1 OFFSET 5")
        );
        assert_eq!(
            Dialect::Postgres.limit_offset(None, 5).as_deref(),
            Some("OFFSET 5")
        );
        assert_eq!(
            Dialect::Postgres.limit_offset(Some(10), 20).as_deref(),
            Some("LIMIT 10 OFFSET 20")
        );
    }

    #[test]
    fn test_writer_numbers_parameters() {
        let mut writer = SqlWriter::new(Dialect::Sqlite);
        writer
            .push("SELECT * FROM ")
            .push_ident("test")
            .push(" WHERE ")
            .push_column("test", "id")
            .push(" > ")
            .bind(json!(1), Some(ColumnType::Integer))
            .push(" AND ")
            .push_column("test", "name")
            .push(" = ")
            .bind(json!("Bob"), Some(ColumnType::Text));
        let statement = writer.finish();
        assert_eq!(
            statement.sql,
            "SELECT * FROM \"test\" WHERE \"test\".\"id\" > ?1 AND \"test\".\"name\" = ?2"
        );
        assert_eq!(statement.params, vec![json!(1), json!("Bob")]);
    }
}
