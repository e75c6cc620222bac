//! Target-side abstraction: transactional chunk writes.

use async_trait::async_trait;

use crate::config::TableRef;
use crate::error::Result;
use crate::value::SourceRow;

/// Write side of a migration.
///
/// `write_chunk` is the primary path: one parameterized multi-row insert
/// committed atomically, so a failing chunk leaves no partial rows behind.
/// `write_row` is the per-row fallback, each call its own transaction.
#[async_trait]
pub trait ChunkWriter: Send + Sync {
    /// Verify the handle can actually reach the database.
    async fn probe(&self) -> Result<()>;

    /// Insert a whole chunk in one transaction. Returns the number of rows
    /// committed (always the full chunk on success).
    async fn write_chunk(
        &self,
        table: &TableRef,
        columns: &[String],
        rows: &[SourceRow],
    ) -> Result<u64>;

    /// Insert a single row in its own transaction.
    async fn write_row(&self, table: &TableRef, columns: &[String], row: &SourceRow) -> Result<()>;
}
