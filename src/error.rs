use thiserror::Error;

/// Errors raised by the query builder, the CRUD facade and the endpoints.
#[derive(Debug, Error)]
pub enum CrudError {
    /// Caller misuse. Always detected before the database is touched.
    #[error("{0}")]
    Config(String),

    /// A record (or nested sub-record) does not conform to the requested schema
    #[error("Data validation error for schema {schema}: {detail}")]
    DataValidation { schema: String, detail: String },

    /// Write targeted a row that does not exist
    #[error("{0}")]
    NotFound(String),

    /// Unique column already holds the value
    #[error("{0}")]
    Duplicate(String),

    /// Write matched several rows without `allow_multiple`
    #[error("{0}")]
    MultipleResults(String),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl CrudError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}

pub type Result<T> = std::result::Result<T, CrudError>;
