//! Chunked table-to-table migration between Oracle and PostgreSQL.
//!
//! A validated [`MigrationJob`] names a source and destination connection,
//! an ordered list of table pairs, and a chunk size. [`Orchestrator`] runs
//! the job sequentially: for each pair it counts the filtered source rows,
//! resolves the column set (catalog first, one-row probe as fallback),
//! streams the table in bounded chunks, and loads each chunk atomically
//! with a per-row retry when the chunk insert fails. Progress, row errors,
//! and the final totals flow to the caller through an ordered
//! [`MigrationEvent`] stream.
//!
//! ```no_run
//! use data_shuttle::{Config, MigrationEvent, Orchestrator};
//!
//! # async fn run() -> data_shuttle::Result<()> {
//! let job = Config::load("shuttle.yaml")?.into_job()?;
//! let (mut events, _cancel, handle) = Orchestrator::new(job)?.spawn();
//! while let Some(event) = events.recv().await {
//!     if let MigrationEvent::Done { inserted_total, .. } = event {
//!         println!("inserted {} rows", inserted_total);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dialect;
pub mod drivers;
pub mod error;
pub mod event;
pub mod orchestrator;
pub mod probe;
pub mod source;
pub mod target;
pub mod transfer;
pub mod value;

pub use config::{Config, ConnectionProfile, Dialect, JobRequest, MigrationJob, TablePair, TableRef};
pub use error::{Result, ShuttleError};
pub use event::{EventSink, MigrationEvent};
pub use orchestrator::{MigrationResult, Orchestrator, RunStatus, TableOutcome, TableSummary};
pub use probe::test_connection;
pub use source::{ReadRequest, SourceReader};
pub use target::ChunkWriter;
pub use transfer::{load_chunk, ChunkOutcome};
pub use value::{RowBatch, RowError, SourceRow, SqlValue};
