//! Row mapping traits and utilities

use crate::error::PageResult;
use tokio_postgres::Row;

/// Trait for converting a database row into a Rust struct.
///
/// Mapping is by column name, so the synthetic ordering columns a paged query
/// may carry at the end of each row do not disturb it.
///
/// # Example
///
/// ```ignore
/// use pgkeyset::{FromRow, PageResult, RowExt};
///
/// struct User {
///     id: i64,
///     username: String,
/// }
///
/// impl FromRow for User {
///     fn from_row(row: &tokio_postgres::Row) -> PageResult<Self> {
///         Ok(Self {
///             id: row.try_get_column("id")?,
///             username: row.try_get_column("username")?,
///         })
///     }
/// }
/// ```
pub trait FromRow: Sized {
    /// Convert a database row into Self
    fn from_row(row: &Row) -> PageResult<Self>;
}

/// Extension trait for Row to provide typed access
pub trait RowExt {
    /// Try to get a column value, returning [`crate::PageError::Decode`] on failure
    fn try_get_column<T>(&self, column: &str) -> PageResult<T>
    where
        T: for<'a> tokio_postgres::types::FromSql<'a>;
}

impl RowExt for Row {
    fn try_get_column<T>(&self, column: &str) -> PageResult<T>
    where
        T: for<'a> tokio_postgres::types::FromSql<'a>,
    {
        self.try_get(column)
            .map_err(|e| crate::error::PageError::decode(column, e.to_string()))
    }
}
