//! SQL value types for database-agnostic row transfer.

use bytes::BytesMut;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};
use uuid::Uuid;

/// Owned dynamic cell value carried between the extractor and the loader.
///
/// Covers the types both supported dialects can round-trip through bind
/// parameters. Anything a driver cannot map is surfaced as a per-row
/// extraction error rather than silently coerced.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    I64(i64),
    F64(f64),
    Text(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Decimal(Decimal),
    /// Timestamp without timezone.
    Timestamp(NaiveDateTime),
    /// Timestamp with timezone offset.
    TimestampTz(DateTime<FixedOffset>),
    Date(NaiveDate),
    Time(NaiveTime),
}

impl SqlValue {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::F64(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

// Delegating ToSql bridge into the PostgreSQL wire encoding. The target
// column type decides the narrow integer/float encodings.
impl ToSql for SqlValue {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> std::result::Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Bool(v) => v.to_sql(ty, out),
            SqlValue::I64(v) => {
                if *ty == Type::INT2 {
                    (*v as i16).to_sql(ty, out)
                } else if *ty == Type::INT4 {
                    (*v as i32).to_sql(ty, out)
                } else if *ty == Type::NUMERIC {
                    Decimal::from(*v).to_sql(ty, out)
                } else {
                    v.to_sql(ty, out)
                }
            }
            SqlValue::F64(v) => {
                if *ty == Type::FLOAT4 {
                    (*v as f32).to_sql(ty, out)
                } else {
                    v.to_sql(ty, out)
                }
            }
            SqlValue::Text(v) => v.to_sql(ty, out),
            SqlValue::Bytes(v) => v.to_sql(ty, out),
            SqlValue::Uuid(v) => {
                if *ty == Type::UUID {
                    v.to_sql(ty, out)
                } else {
                    v.to_string().to_sql(ty, out)
                }
            }
            SqlValue::Decimal(v) => v.to_sql(ty, out),
            SqlValue::Timestamp(v) => v.to_sql(ty, out),
            SqlValue::TimestampTz(v) => v.to_sql(ty, out),
            SqlValue::Date(v) => v.to_sql(ty, out),
            SqlValue::Time(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        // Acceptance is decided per variant at encode time; a genuine
        // mismatch fails the chunk and flows into the row-level fallback.
        true
    }

    to_sql_checked!();
}

/// Bind-parameter bridge into the Oracle driver.
///
/// Oracle applies implicit conversions on bind, so decimals and UUIDs
/// travel as text.
pub(crate) fn to_oracle_param(value: &SqlValue) -> Box<dyn oracle::sql_type::ToSql> {
    match value {
        SqlValue::Null => Box::new(None::<String>),
        SqlValue::Bool(v) => Box::new(if *v { 1i64 } else { 0i64 }),
        SqlValue::I64(v) => Box::new(*v),
        SqlValue::F64(v) => Box::new(*v),
        SqlValue::Text(v) => Box::new(v.clone()),
        SqlValue::Bytes(v) => Box::new(v.clone()),
        SqlValue::Uuid(v) => Box::new(v.to_string()),
        SqlValue::Decimal(v) => Box::new(v.to_string()),
        SqlValue::Timestamp(v) => Box::new(*v),
        SqlValue::TimestampTz(v) => Box::new(*v),
        SqlValue::Date(v) => Box::new(*v),
        SqlValue::Time(v) => Box::new(v.to_string()),
    }
}

/// One successfully decoded source row.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRow {
    /// 1-based position in the unbounded source scan, counted continuously
    /// across the whole table regardless of chunk boundaries.
    pub index: u64,

    /// Values aligned to the resolved column set.
    pub values: Vec<SqlValue>,
}

/// A row that failed to decode or to load, located by its scan index.
#[derive(Debug, Clone, PartialEq)]
pub struct RowError {
    pub index: u64,
    pub message: String,
}

/// One bounded extraction chunk.
///
/// Rows that failed to decode are excluded from `rows` and reported
/// individually through `decode_errors`; their indices are still consumed,
/// so `rows` may be shorter than the configured chunk size.
#[derive(Debug, Default)]
pub struct RowBatch {
    pub rows: Vec<SourceRow>,
    pub decode_errors: Vec<RowError>,
}

impl RowBatch {
    /// Number of source rows this batch accounts for, decode failures
    /// included.
    #[must_use]
    pub fn scanned(&self) -> usize {
        self.rows.len() + self.decode_errors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty() && self.decode_errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_null() {
        assert!(SqlValue::Null.is_null());
        assert!(!SqlValue::I64(42).is_null());
    }

    #[test]
    fn test_option_conversion() {
        let v: SqlValue = Option::<i64>::None.into();
        assert_eq!(v, SqlValue::Null);
        let v: SqlValue = Some("x").into();
        assert_eq!(v, SqlValue::Text("x".into()));
    }

    #[test]
    fn test_batch_scanned_counts_failures() {
        let batch = RowBatch {
            rows: vec![SourceRow {
                index: 1,
                values: vec![SqlValue::I64(1)],
            }],
            decode_errors: vec![RowError {
                index: 2,
                message: "bad".into(),
            }],
        };
        assert_eq!(batch.scanned(), 2);
        assert!(!batch.is_empty());
    }
}
