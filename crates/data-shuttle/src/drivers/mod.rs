//! Dialect-aware connection factory.
//!
//! Handles are cheap to build: no network traffic happens until first use,
//! and every checkout is liveness-checked before it is handed out.

mod oracle;
mod postgres;

pub use oracle::OracleHandle;
pub use postgres::PgHandle;

use std::sync::Arc;

use crate::config::{ConnectionProfile, Dialect};
use crate::error::Result;
use crate::source::SourceReader;
use crate::target::ChunkWriter;

/// Build the read-side handle for a connection profile.
pub fn source_handle(profile: &ConnectionProfile) -> Result<Arc<dyn SourceReader>> {
    profile.validate()?;
    Ok(match profile.dialect {
        Dialect::Oracle => Arc::new(OracleHandle::new(profile.clone())),
        Dialect::Postgres => Arc::new(PgHandle::new(profile.clone())?),
    })
}

/// Build the write-side handle for a connection profile.
pub fn target_handle(profile: &ConnectionProfile) -> Result<Arc<dyn ChunkWriter>> {
    profile.validate()?;
    Ok(match profile.dialect {
        Dialect::Oracle => Arc::new(OracleHandle::new(profile.clone())),
        Dialect::Postgres => Arc::new(PgHandle::new(profile.clone())?),
    })
}
