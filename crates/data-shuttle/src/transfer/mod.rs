//! Chunk loading: atomic insert with a per-row retry fallback.

use tracing::debug;

use crate::config::TableRef;
use crate::error::Result;
use crate::target::ChunkWriter;
use crate::value::{RowError, SourceRow};

/// What happened to one chunk.
#[derive(Debug, Default)]
pub struct ChunkOutcome {
    /// Rows committed to the destination.
    pub inserted: u64,

    /// Rows that failed their individual insert, located by scan index.
    pub errors: Vec<RowError>,

    /// Whether the atomic path failed and rows were retried one by one.
    pub fell_back: bool,
}

/// Load one chunk.
///
/// The chunk insert either commits every row or none. When it fails, the
/// whole chunk is retried row by row so one poisoned row costs only itself:
/// every other row still lands, and the failure is reported with its exact
/// scan index.
pub async fn load_chunk(
    target: &dyn ChunkWriter,
    table: &TableRef,
    columns: &[String],
    rows: &[SourceRow],
) -> Result<ChunkOutcome> {
    if rows.is_empty() {
        return Ok(ChunkOutcome::default());
    }

    match target.write_chunk(table, columns, rows).await {
        Ok(inserted) => Ok(ChunkOutcome {
            inserted,
            errors: Vec::new(),
            fell_back: false,
        }),
        Err(e) => {
            debug!("chunk insert into {} failed ({}), retrying row by row", table, e);
            let mut outcome = ChunkOutcome {
                fell_back: true,
                ..ChunkOutcome::default()
            };
            for row in rows {
                match target.write_row(table, columns, row).await {
                    Ok(()) => outcome.inserted += 1,
                    Err(e) => outcome.errors.push(RowError {
                        index: row.index,
                        message: e.to_string(),
                    }),
                }
            }
            Ok(outcome)
        }
    }
}
