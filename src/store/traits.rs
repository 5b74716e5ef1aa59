use anyhow::Result;

use crate::model::Row;
use crate::store::dialect::{Dialect, Statement};

/// Minimal row-level storage capability used by the query pipeline.
///
/// Rows come back keyed by their result column label with values decoded
/// dynamically into JSON.
#[async_trait::async_trait]
pub trait RowStore: Send + Sync {
    fn dialect(&self) -> Dialect;

    async fn fetch_all(&self, statement: &Statement) -> Result<Vec<Row>>;

    /// Runs a statement whose first column is a single integer count
    async fn fetch_count(&self, statement: &Statement) -> Result<u64>;

    /// Returns the number of affected rows
    async fn execute(&self, statement: &Statement) -> Result<u64>;

    async fn fetch_optional(&self, statement: &Statement) -> Result<Option<Row>> {
        Ok(self.fetch_all(statement).await?.into_iter().next())
    }
}
