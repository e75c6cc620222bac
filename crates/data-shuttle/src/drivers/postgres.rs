//! PostgreSQL driver: pooled connections, catalog introspection, streaming
//! extraction, and transactional chunk loading.

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_postgres::types::ToSql;
use tokio_postgres::NoTls;
use tracing::debug;

use crate::config::{ConnectionProfile, Dialect, TableRef};
use crate::dialect;
use crate::error::{Result, ShuttleError};
use crate::source::{ReadRequest, SourceReader};
use crate::target::ChunkWriter;
use crate::value::{RowBatch, RowError, SourceRow, SqlValue};

/// The extended-query protocol carries bind counts as a signed 16-bit
/// integer; multi-row inserts are split to stay under it.
const MAX_BIND_PARAMS: usize = 30_000;

/// Connections a single job can hold against one side.
const POOL_SIZE: usize = 4;

/// PostgreSQL handle usable as either side of a migration.
#[derive(Clone)]
pub struct PgHandle {
    pool: Pool,
}

impl PgHandle {
    /// Build a lazily connecting pool from a profile.
    ///
    /// `RecyclingMethod::Verified` pings every checkout before handing the
    /// connection out.
    pub fn new(profile: ConnectionProfile) -> Result<Self> {
        let mut pg_config = tokio_postgres::Config::new();
        pg_config.host(&profile.host);
        pg_config.port(profile.effective_port());
        pg_config.dbname(&profile.service_or_db);
        pg_config.user(&profile.user);
        pg_config.password(&profile.password);

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Verified,
        };
        let mgr = Manager::from_config(pg_config, NoTls, mgr_config);
        let pool = Pool::builder(mgr)
            .max_size(POOL_SIZE)
            .build()
            .map_err(|e| ShuttleError::pool(e, "creating PostgreSQL pool"))?;

        Ok(Self { pool })
    }

    async fn client(&self, context: &'static str) -> Result<deadpool_postgres::Object> {
        self.pool
            .get()
            .await
            .map_err(|e| ShuttleError::pool(e, context))
    }
}

#[async_trait]
impl SourceReader for PgHandle {
    async fn probe(&self) -> Result<()> {
        let client = self.client("probing PostgreSQL connection").await?;
        client.simple_query(Dialect::Postgres.probe_sql()).await?;
        Ok(())
    }

    async fn count_rows(&self, table: &TableRef, where_clause: Option<&str>) -> Result<u64> {
        let client = self.client("getting connection for count_rows").await?;
        let sql = dialect::count_sql(table, where_clause);
        let row = client.query_one(&sql, &[]).await?;
        Ok(row.get::<_, i64>(0).max(0) as u64)
    }

    async fn catalog_columns(&self, table: &TableRef) -> Result<Vec<String>> {
        let client = self.client("getting connection for catalog_columns").await?;
        let sql = "SELECT lower(column_name) FROM information_schema.columns \
                   WHERE table_schema = $1 AND table_name = $2 \
                   ORDER BY ordinal_position";
        let rows = client.query(sql, &[&table.schema, &table.name]).await?;
        Ok(rows.iter().map(|r| r.get::<_, String>(0)).collect())
    }

    async fn probe_columns(&self, table: &TableRef) -> Result<Vec<String>> {
        let client = self.client("getting connection for probe_columns").await?;
        let stmt = client.prepare(&dialect::probe_row_sql(table)).await?;
        Ok(stmt
            .columns()
            .iter()
            .map(|c| c.name().to_lowercase())
            .collect())
    }

    fn read_table(&self, request: ReadRequest) -> mpsc::Receiver<Result<RowBatch>> {
        let (tx, rx) = mpsc::channel(4);
        let pool = self.pool.clone();

        tokio::spawn(async move {
            if let Err(e) = read_table_internal(pool, request, tx.clone()).await {
                let _ = tx.send(Err(e)).await;
            }
        });

        rx
    }
}

async fn read_table_internal(
    pool: Pool,
    request: ReadRequest,
    tx: mpsc::Sender<Result<RowBatch>>,
) -> Result<()> {
    let client = pool
        .get()
        .await
        .map_err(|e| ShuttleError::pool(e, "getting connection for read_table"))?;

    let sql = dialect::select_sql(
        Dialect::Postgres,
        &request.table,
        &request.columns,
        request.where_clause.as_deref(),
    );
    debug!("streaming extraction: {}", sql);

    // Server-side streaming: rows are pulled as the consumer drains the
    // channel, never materialized in full.
    let params: Vec<&(dyn ToSql + Sync)> = Vec::new();
    let stream = client.query_raw(&sql, params).await?;
    futures::pin_mut!(stream);

    let mut batch = RowBatch::default();
    let mut index: u64 = 0;

    while let Some(row_result) = stream.next().await {
        let row = match row_result {
            Ok(row) => row,
            Err(e) => {
                // Transport failure mid-scan is fatal for the table pair.
                if !batch.is_empty() {
                    let _ = tx.send(Ok(std::mem::take(&mut batch))).await;
                }
                let _ = tx.send(Err(e.into())).await;
                return Ok(());
            }
        };

        index += 1;
        match decode_pg_row(&row, request.columns.len()) {
            Ok(values) => batch.rows.push(SourceRow { index, values }),
            Err(message) => batch.decode_errors.push(RowError { index, message }),
        }

        if batch.scanned() >= request.chunk_size
            && tx.send(Ok(std::mem::take(&mut batch))).await.is_err()
        {
            // Consumer went away (cancellation); stop scanning.
            return Ok(());
        }
    }

    if !batch.is_empty() {
        let _ = tx.send(Ok(batch)).await;
    }
    Ok(())
}

fn decode_pg_row(
    row: &tokio_postgres::Row,
    column_count: usize,
) -> std::result::Result<Vec<SqlValue>, String> {
    let mut values = Vec::with_capacity(column_count);
    for idx in 0..column_count {
        values.push(decode_pg_value(row, idx)?);
    }
    Ok(values)
}

fn decode_pg_value(
    row: &tokio_postgres::Row,
    idx: usize,
) -> std::result::Result<SqlValue, String> {
    let column = &row.columns()[idx];
    let type_name = column.type_().name();

    let decoded = match type_name {
        "bool" => row
            .try_get::<_, Option<bool>>(idx)
            .map(|v| v.map(SqlValue::Bool)),
        "int2" => row
            .try_get::<_, Option<i16>>(idx)
            .map(|v| v.map(|n| SqlValue::I64(n as i64))),
        "int4" => row
            .try_get::<_, Option<i32>>(idx)
            .map(|v| v.map(|n| SqlValue::I64(n as i64))),
        "int8" => row
            .try_get::<_, Option<i64>>(idx)
            .map(|v| v.map(SqlValue::I64)),
        "float4" => row
            .try_get::<_, Option<f32>>(idx)
            .map(|v| v.map(|n| SqlValue::F64(n as f64))),
        "float8" => row
            .try_get::<_, Option<f64>>(idx)
            .map(|v| v.map(SqlValue::F64)),
        "numeric" => row
            .try_get::<_, Option<rust_decimal::Decimal>>(idx)
            .map(|v| v.map(SqlValue::Decimal)),
        "uuid" => row
            .try_get::<_, Option<uuid::Uuid>>(idx)
            .map(|v| v.map(SqlValue::Uuid)),
        "bytea" => row
            .try_get::<_, Option<Vec<u8>>>(idx)
            .map(|v| v.map(SqlValue::Bytes)),
        "timestamp" => row
            .try_get::<_, Option<chrono::NaiveDateTime>>(idx)
            .map(|v| v.map(SqlValue::Timestamp)),
        "timestamptz" => row
            .try_get::<_, Option<chrono::DateTime<chrono::FixedOffset>>>(idx)
            .map(|v| v.map(SqlValue::TimestampTz)),
        "date" => row
            .try_get::<_, Option<chrono::NaiveDate>>(idx)
            .map(|v| v.map(SqlValue::Date)),
        "time" => row
            .try_get::<_, Option<chrono::NaiveTime>>(idx)
            .map(|v| v.map(SqlValue::Time)),
        // text, varchar, bpchar, name, and anything else textual
        _ => row
            .try_get::<_, Option<String>>(idx)
            .map(|v| v.map(SqlValue::Text)),
    };

    decoded
        .map(|v| v.unwrap_or(SqlValue::Null))
        .map_err(|e| format!("column `{}` ({}): {}", column.name(), type_name, e))
}

#[async_trait]
impl ChunkWriter for PgHandle {
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

        let mut client = self.client("getting connection for write_chunk").await?;
        let tx = client.transaction().await?;

        let rows_per_stmt = (MAX_BIND_PARAMS / columns.len().max(1)).max(1);
        for group in rows.chunks(rows_per_stmt) {
            let sql = multi_insert_sql(table, columns, group.len());
            let params: Vec<&(dyn ToSql + Sync)> = group
                .iter()
                .flat_map(|r| r.values.iter().map(|v| v as &(dyn ToSql + Sync)))
                .collect();
            tx.execute(&sql, &params).await?;
        }

        tx.commit().await?;
        Ok(rows.len() as u64)
    }

    async fn write_row(
        &self,
        table: &TableRef,
        columns: &[String],
        row: &SourceRow,
    ) -> Result<()> {
        let client = self.client("getting connection for write_row").await?;
        let sql = dialect::insert_row_sql(Dialect::Postgres, table, columns);
        let params: Vec<&(dyn ToSql + Sync)> = row
            .values
            .iter()
            .map(|v| v as &(dyn ToSql + Sync))
            .collect();
        client.execute(&sql, &params).await?;
        Ok(())
    }
}

/// Multi-row parameterized INSERT for one statement.
fn multi_insert_sql(table: &TableRef, columns: &[String], row_count: usize) -> String {
    let mut groups = Vec::with_capacity(row_count);
    let mut placeholder = 1;
    for _ in 0..row_count {
        let binds: Vec<String> = (0..columns.len())
            .map(|_| {
                let bind = format!("${}", placeholder);
                placeholder += 1;
                bind
            })
            .collect();
        groups.push(format!("({})", binds.join(", ")));
    }
    format!(
        "INSERT INTO {} ({}) VALUES {}",
        table,
        columns.join(", "),
        groups.join(", ")
    )
}
