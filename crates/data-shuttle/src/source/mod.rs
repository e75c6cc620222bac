//! Source-side abstractions: schema introspection and chunked extraction.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use crate::config::TableRef;
use crate::error::{Result, ShuttleError};
use crate::value::RowBatch;

/// Options for streaming rows out of one source table.
#[derive(Debug, Clone)]
pub struct ReadRequest {
    /// Table to scan.
    pub table: TableRef,

    /// Resolved column set; drives the projection in scan order.
    pub columns: Vec<String>,

    /// Raw predicate without a leading keyword, inserted verbatim.
    pub where_clause: Option<String>,

    /// Maximum rows per emitted batch.
    pub chunk_size: usize,
}

/// Read side of a migration: introspection plus streaming extraction.
///
/// `read_table` returns a channel receiver fed by a background task so the
/// full result set is never buffered client-side; the channel bound applies
/// read-ahead backpressure.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Verify the handle can actually reach the database.
    async fn probe(&self) -> Result<()>;

    /// Count source rows matching the predicate.
    async fn count_rows(&self, table: &TableRef, where_clause: Option<&str>) -> Result<u64>;

    /// Column names from catalog metadata, in declaration order.
    async fn catalog_columns(&self, table: &TableRef) -> Result<Vec<String>>;

    /// Column labels from a bounded one-row probe query; the fallback path
    /// when catalog metadata comes back empty.
    async fn probe_columns(&self, table: &TableRef) -> Result<Vec<String>>;

    /// Start streaming row batches. The receiver yields batches until the
    /// scan is exhausted or an error is delivered; the sequence is not
    /// resumable.
    fn read_table(&self, request: ReadRequest) -> mpsc::Receiver<Result<RowBatch>>;
}

/// Lower-case, de-duplicate, and drop empty names while preserving order.
fn normalize_columns(raw: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    raw.into_iter()
        .map(|c| c.trim().to_lowercase())
        .filter(|c| !c.is_empty() && seen.insert(c.clone()))
        .collect()
}

/// Resolve the ordered column set for one table.
///
/// Catalog metadata first; if that yields nothing, a bounded one-row probe.
/// Both paths empty is a `Schema` error — fatal for the table pair only.
pub async fn resolve_columns(source: &dyn SourceReader, table: &TableRef) -> Result<Vec<String>> {
    let mut columns = source.catalog_columns(table).await.unwrap_or_else(|e| {
        debug!("catalog lookup failed for {}: {}", table, e);
        Vec::new()
    });

    if columns.is_empty() {
        match source.probe_columns(table).await {
            Ok(probed) => columns = probed,
            Err(e) => debug!("column probe failed for {}: {}", table, e),
        }
    }

    let columns = normalize_columns(columns);
    if columns.is_empty() {
        return Err(ShuttleError::Schema {
            table: table.to_string(),
        });
    }
    Ok(columns)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_lowercases_and_dedupes() {
        let cols = normalize_columns(vec![
            "ID".into(),
            "Name".into(),
            "id".into(),
            " ".into(),
            "name".into(),
        ]);
        assert_eq!(cols, vec!["id".to_string(), "name".to_string()]);
    }

    #[test]
    fn test_normalize_preserves_declaration_order() {
        let cols = normalize_columns(vec!["B".into(), "A".into(), "C".into()]);
        assert_eq!(
            cols,
            vec!["b".to_string(), "a".to_string(), "c".to_string()]
        );
    }
}
