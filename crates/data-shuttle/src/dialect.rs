//! Per-dialect SQL texture: projections, placeholders, shared query builders.
//!
//! Source projections must follow the dialect's identifier conventions
//! (Oracle reads upper-cased identifiers and aliases them back to
//! lower-case), while destination column lists are always emitted unquoted
//! and lower-cased so the same column set drives both sides of a pair.

use crate::config::{Dialect, TableRef};

impl Dialect {
    /// SELECT-list projection for one lower-cased column name.
    pub fn projection(self, column: &str) -> String {
        match self {
            Dialect::Oracle => format!("{} AS \"{}\"", column.to_uppercase(), column),
            Dialect::Postgres => format!("\"{c}\" AS \"{c}\"", c = column),
        }
    }

    /// Bind placeholder for the given 1-based index.
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Oracle => format!(":{}", index),
            Dialect::Postgres => format!("${}", index),
        }
    }
}

/// Append the raw predicate, if any, as a WHERE clause.
///
/// The predicate is inserted verbatim: callers own its trustworthiness.
fn where_sql(where_clause: Option<&str>) -> String {
    match where_clause.map(str::trim) {
        Some(text) if !text.is_empty() => format!(" WHERE {}", text),
        _ => String::new(),
    }
}

/// COUNT(*) over the filtered source table.
pub fn count_sql(table: &TableRef, where_clause: Option<&str>) -> String {
    format!("SELECT COUNT(*) FROM {}{}", table, where_sql(where_clause))
}

/// Streaming extraction query over the resolved column set.
pub fn select_sql(
    dialect: Dialect,
    table: &TableRef,
    columns: &[String],
    where_clause: Option<&str>,
) -> String {
    let projection = columns
        .iter()
        .map(|c| dialect.projection(c))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "SELECT {} FROM {}{}",
        projection,
        table,
        where_sql(where_clause)
    )
}

/// Bounded one-row probe used as the introspection fallback.
///
/// `FETCH FIRST 1 ROWS ONLY` is understood by both supported dialects.
pub fn probe_row_sql(table: &TableRef) -> String {
    format!("SELECT * FROM {} FETCH FIRST 1 ROWS ONLY", table)
}

/// Single-row INSERT with dialect-appropriate placeholders.
///
/// Destination columns are unquoted and lower-cased on both dialects.
pub fn insert_row_sql(dialect: Dialect, table: &TableRef, columns: &[String]) -> String {
    let binds = (1..=columns.len())
        .map(|i| dialect.placeholder(i))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        columns.join(", "),
        binds
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orders() -> TableRef {
        TableRef::new("app", "orders")
    }

    #[test]
    fn test_projection_follows_dialect_casing() {
        assert_eq!(
            Dialect::Oracle.projection("order_id"),
            "ORDER_ID AS \"order_id\""
        );
        assert_eq!(
            Dialect::Postgres.projection("order_id"),
            "\"order_id\" AS \"order_id\""
        );
    }

    #[test]
    fn test_count_sql_with_and_without_predicate() {
        assert_eq!(
            count_sql(&orders(), None),
            "SELECT COUNT(*) FROM app.orders"
        );
        assert_eq!(
            count_sql(&orders(), Some("status = 'OPEN'")),
            "SELECT COUNT(*) FROM app.orders WHERE status = 'OPEN'"
        );
        assert_eq!(
            count_sql(&orders(), Some("   ")),
            "SELECT COUNT(*) FROM app.orders"
        );
    }

    #[test]
    fn test_select_sql_oracle() {
        let cols = vec!["id".to_string(), "name".to_string()];
        assert_eq!(
            select_sql(Dialect::Oracle, &orders(), &cols, Some("id > 10")),
            "SELECT ID AS \"id\", NAME AS \"name\" FROM app.orders WHERE id > 10"
        );
    }

    #[test]
    fn test_insert_row_sql_placeholders() {
        let cols = vec!["id".to_string(), "name".to_string()];
        assert_eq!(
            insert_row_sql(Dialect::Oracle, &orders(), &cols),
            "INSERT INTO app.orders (id, name) VALUES (:1, :2)"
        );
        assert_eq!(
            insert_row_sql(Dialect::Postgres, &orders(), &cols),
            "INSERT INTO app.orders (id, name) VALUES ($1, $2)"
        );
    }
}
