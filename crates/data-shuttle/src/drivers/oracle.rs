//! Oracle driver: a blocking client bridged onto the async runtime.
//!
//! The underlying driver is synchronous, so every database call runs on the
//! blocking thread pool. One connection is cached per handle and pinged on
//! each checkout; a dead connection is replaced transparently.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use oracle::sql_type::OracleType;
use rust_decimal::Decimal;
use tokio::sync::{mpsc, Mutex};
use tokio::task::spawn_blocking;
use tracing::debug;

use crate::config::{ConnectionProfile, Dialect, TableRef};
use crate::dialect;
use crate::error::{Result, ShuttleError};
use crate::source::{ReadRequest, SourceReader};
use crate::target::ChunkWriter;
use crate::value::{to_oracle_param, RowBatch, RowError, SourceRow, SqlValue};

/// Upper bound on the driver-side fetch array, independent of chunk size.
const MAX_FETCH_ARRAY: usize = 10_000;

/// Oracle handle usable as either side of a migration.
#[derive(Clone)]
pub struct OracleHandle {
    inner: Arc<OracleInner>,
}

struct OracleInner {
    profile: ConnectionProfile,
    conn: Mutex<Option<Arc<oracle::Connection>>>,
}

fn connect(profile: &ConnectionProfile) -> Result<oracle::Connection> {
    let connect_string = format!(
        "//{}:{}/{}",
        profile.host,
        profile.effective_port(),
        profile.service_or_db
    );
    Ok(oracle::Connection::connect(
        &profile.user,
        &profile.password,
        connect_string,
    )?)
}

fn join_error(e: tokio::task::JoinError) -> ShuttleError {
    ShuttleError::connectivity(format!("blocking database task failed: {}", e))
}

impl OracleHandle {
    pub fn new(profile: ConnectionProfile) -> Self {
        Self {
            inner: Arc::new(OracleInner {
                profile,
                conn: Mutex::new(None),
            }),
        }
    }

    /// Hand out the cached connection after a liveness ping, reconnecting
    /// if the ping fails.
    async fn checkout(&self) -> Result<Arc<oracle::Connection>> {
        let mut guard = self.inner.conn.lock().await;

        if let Some(conn) = guard.clone() {
            let probe = conn.clone();
            let alive = spawn_blocking(move || probe.ping().is_ok())
                .await
                .unwrap_or(false);
            if alive {
                return Ok(conn);
            }
            debug!("cached Oracle connection went stale, reconnecting");
            *guard = None;
        }

        let profile = self.inner.profile.clone();
        let conn = spawn_blocking(move || connect(&profile))
            .await
            .map_err(join_error)??;
        let conn = Arc::new(conn);
        *guard = Some(conn.clone());
        Ok(conn)
    }

    /// Run a blocking closure against a live connection.
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&oracle::Connection) -> Result<T> + Send + 'static,
    {
        let conn = self.checkout().await?;
        spawn_blocking(move || f(&conn)).await.map_err(join_error)?
    }
}

#[async_trait]
impl SourceReader for OracleHandle {
    async fn probe(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.query_row_as::<i64>(Dialect::Oracle.probe_sql(), &[])?;
            Ok(())
        })
        .await
    }

    async fn count_rows(&self, table: &TableRef, where_clause: Option<&str>) -> Result<u64> {
        let sql = dialect::count_sql(table, where_clause);
        self.with_conn(move |conn| {
            let count = conn.query_row_as::<i64>(&sql, &[])?;
            Ok(count.max(0) as u64)
        })
        .await
    }

    async fn catalog_columns(&self, table: &TableRef) -> Result<Vec<String>> {
        let owner = table.schema.clone();
        let name = table.name.clone();
        self.with_conn(move |conn| {
            let sql = "SELECT column_name FROM all_tab_columns \
                       WHERE owner = UPPER(:1) AND table_name = UPPER(:2) \
                       ORDER BY column_id";
            let rows = conn.query_as::<String>(sql, &[&owner, &name])?;
            let mut columns = Vec::new();
            for row in rows {
                columns.push(row?.to_lowercase());
            }
            Ok(columns)
        })
        .await
    }

    async fn probe_columns(&self, table: &TableRef) -> Result<Vec<String>> {
        let sql = dialect::probe_row_sql(table);
        self.with_conn(move |conn| {
            let mut stmt = conn.statement(&sql).build()?;
            let rows = stmt.query(&[])?;
            Ok(rows
                .column_info()
                .iter()
                .map(|ci| ci.name().to_lowercase())
                .collect())
        })
        .await
    }

    fn read_table(&self, request: ReadRequest) -> mpsc::Receiver<Result<RowBatch>> {
        let (tx, rx) = mpsc::channel(4);
        let handle = self.clone();

        tokio::spawn(async move {
            let conn = match handle.checkout().await {
                Ok(conn) => conn,
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            };

            let blocking_tx = tx.clone();
            let join = spawn_blocking(move || blocking_read(&conn, &request, &blocking_tx));
            if let Err(e) = join.await {
                let _ = tx.send(Err(join_error(e))).await;
            }
        });

        rx
    }
}

/// Synchronous scan loop; runs entirely on the blocking pool and feeds the
/// async consumer through `blocking_send`.
fn blocking_read(
    conn: &oracle::Connection,
    request: &ReadRequest,
    tx: &mpsc::Sender<Result<RowBatch>>,
) {
    let sql = dialect::select_sql(
        Dialect::Oracle,
        &request.table,
        &request.columns,
        request.where_clause.as_deref(),
    );
    debug!("streaming extraction: {}", sql);

    let array_size = request.chunk_size.clamp(1, MAX_FETCH_ARRAY) as u32;
    let mut stmt = match conn.statement(&sql).fetch_array_size(array_size).build() {
        Ok(stmt) => stmt,
        Err(e) => {
            let _ = tx.blocking_send(Err(e.into()));
            return;
        }
    };
    let rows = match stmt.query(&[]) {
        Ok(rows) => rows,
        Err(e) => {
            let _ = tx.blocking_send(Err(e.into()));
            return;
        }
    };

    let kinds: Vec<OracleKind> = rows
        .column_info()
        .iter()
        .map(|ci| OracleKind::classify(ci.oracle_type()))
        .collect();

    let mut batch = RowBatch::default();
    let mut index: u64 = 0;

    for row_result in rows {
        let row = match row_result {
            Ok(row) => row,
            Err(e) => {
                // Transport failure mid-scan is fatal for the table pair.
                if !batch.is_empty() {
                    let _ = tx.blocking_send(Ok(std::mem::take(&mut batch)));
                }
                let _ = tx.blocking_send(Err(e.into()));
                return;
            }
        };

        index += 1;
        match decode_oracle_row(&row, &kinds) {
            Ok(values) => batch.rows.push(SourceRow { index, values }),
            Err(message) => batch.decode_errors.push(RowError { index, message }),
        }

        if batch.scanned() >= request.chunk_size
            && tx.blocking_send(Ok(std::mem::take(&mut batch))).is_err()
        {
            // Consumer went away (cancellation); stop scanning.
            return;
        }
    }

    if !batch.is_empty() {
        let _ = tx.blocking_send(Ok(batch));
    }
}

/// Decode strategy for one projected column, fixed once per scan.
#[derive(Debug, Clone, Copy)]
enum OracleKind {
    Int,
    Number,
    Float,
    Timestamp,
    TimestampTz,
    Bytes,
    Text,
}

impl OracleKind {
    fn classify(ty: &OracleType) -> Self {
        match ty {
            // NUMBER(p, 0) with a bounded precision fits i64; everything
            // else numeric travels as an exact decimal.
            OracleType::Number(precision, 0) if *precision > 0 && *precision <= 18 => {
                OracleKind::Int
            }
            OracleType::Number(_, _) | OracleType::Float(_) => OracleKind::Number,
            OracleType::Int64 | OracleType::UInt64 => OracleKind::Int,
            OracleType::BinaryFloat | OracleType::BinaryDouble => OracleKind::Float,
            OracleType::Date | OracleType::Timestamp(_) => OracleKind::Timestamp,
            OracleType::TimestampTZ(_) | OracleType::TimestampLTZ(_) => OracleKind::TimestampTz,
            OracleType::Raw(_) | OracleType::BLOB | OracleType::LongRaw => OracleKind::Bytes,
            _ => OracleKind::Text,
        }
    }
}

fn decode_oracle_row(
    row: &oracle::Row,
    kinds: &[OracleKind],
) -> std::result::Result<Vec<SqlValue>, String> {
    let mut values = Vec::with_capacity(kinds.len());
    for (idx, kind) in kinds.iter().enumerate() {
        values.push(decode_oracle_value(row, idx, *kind)?);
    }
    Ok(values)
}

fn decode_oracle_value(
    row: &oracle::Row,
    idx: usize,
    kind: OracleKind,
) -> std::result::Result<SqlValue, String> {
    let context = |e: &dyn std::fmt::Display| format!("column {}: {}", idx + 1, e);

    let value = match kind {
        OracleKind::Int => row
            .get::<_, Option<i64>>(idx)
            .map(|v| v.map(SqlValue::I64))
            .map_err(|e| context(&e))?,
        OracleKind::Number => {
            // Wide NUMBER values exceed i64/f64; fetch as text and parse
            // into an exact decimal.
            let text = row
                .get::<_, Option<String>>(idx)
                .map_err(|e| context(&e))?;
            match text {
                Some(text) => Some(SqlValue::Decimal(
                    Decimal::from_str(&text).map_err(|e| context(&e))?,
                )),
                None => None,
            }
        }
        OracleKind::Float => row
            .get::<_, Option<f64>>(idx)
            .map(|v| v.map(SqlValue::F64))
            .map_err(|e| context(&e))?,
        OracleKind::Timestamp => row
            .get::<_, Option<chrono::NaiveDateTime>>(idx)
            .map(|v| v.map(SqlValue::Timestamp))
            .map_err(|e| context(&e))?,
        OracleKind::TimestampTz => row
            .get::<_, Option<chrono::DateTime<chrono::FixedOffset>>>(idx)
            .map(|v| v.map(SqlValue::TimestampTz))
            .map_err(|e| context(&e))?,
        OracleKind::Bytes => row
            .get::<_, Option<Vec<u8>>>(idx)
            .map(|v| v.map(SqlValue::Bytes))
            .map_err(|e| context(&e))?,
        OracleKind::Text => row
            .get::<_, Option<String>>(idx)
            .map(|v| v.map(SqlValue::Text))
            .map_err(|e| context(&e))?,
    };

    Ok(value.unwrap_or(SqlValue::Null))
}

#[async_trait]
impl ChunkWriter for OracleHandle {
    async fn probe(&self) -> Result<()> {
        SourceReader::probe(self).await
    }

    async fn write_chunk(
        &self,
        table: &TableRef,
        columns: &[String],
        rows: &[SourceRow],
    ) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }

        let sql = dialect::insert_row_sql(Dialect::Oracle, table, columns);
        let rows = rows.to_vec();
        self.with_conn(move |conn| {
            let outcome = append_and_execute(conn, &sql, &rows);
            if outcome.is_err() {
                let _ = conn.rollback();
            }
            outcome
        })
        .await
    }

    async fn write_row(&self, table: &TableRef, columns: &[String], row: &SourceRow) -> Result<()> {
        let sql = dialect::insert_row_sql(Dialect::Oracle, table, columns);
        let row = row.clone();
        self.with_conn(move |conn| {
            let params: Vec<Box<dyn oracle::sql_type::ToSql>> =
                row.values.iter().map(to_oracle_param).collect();
            let refs: Vec<&dyn oracle::sql_type::ToSql> =
                params.iter().map(|p| p.as_ref()).collect();
            let outcome = conn
                .execute(&sql, &refs)
                .map_err(ShuttleError::from)
                .and_then(|_| conn.commit().map_err(ShuttleError::from));
            if outcome.is_err() {
                let _ = conn.rollback();
            }
            outcome
        })
        .await
    }
}

/// Buffered array insert of a whole chunk, committed as one transaction.
fn append_and_execute(
    conn: &oracle::Connection,
    sql: &str,
    rows: &[SourceRow],
) -> Result<u64> {
    let mut batch = conn.batch(sql, rows.len()).build()?;
    for row in rows {
        let params: Vec<Box<dyn oracle::sql_type::ToSql>> =
            row.values.iter().map(to_oracle_param).collect();
        let refs: Vec<&dyn oracle::sql_type::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        batch.append_row(&refs)?;
    }
    batch.execute()?;
    conn.commit()?;
    Ok(rows.len() as u64)
}
