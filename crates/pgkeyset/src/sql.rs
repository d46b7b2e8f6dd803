//! Parameter-safe dynamic SQL assembly.
//!
//! `Sql` stores SQL pieces and parameters separately and generates
//! `$1, $2, ...` placeholders automatically in the final SQL string, so
//! fragments (boundary predicates, filters, sub-selects) can be composed in
//! any order without manually tracking placeholder indices.
//!
//! # Example
//!
//! ```ignore
//! use pgkeyset::sql;
//!
//! let mut q = sql("SELECT id, username FROM users WHERE status = ");
//! q.push_bind("active");
//! q.push(" ORDER BY id ASC");
//! q.limit(11);
//! let rows = q.fetch_all(&client).await?;
//! ```

use crate::client::GenericClient;
use crate::error::{PageError, PageResult};
use crate::ident::Ident;
use std::sync::Arc;
use tokio_postgres::Row;
use tokio_postgres::types::ToSql;

#[derive(Clone, Debug)]
enum SqlPart {
    Raw(String),
    Param,
}

/// A SQL-first, parameter-safe dynamic SQL builder.
///
/// Cloning is cheap: parameters are stored behind `Arc`, so a selectable
/// carrying `Sql` filter fragments can be cloned once per pagination call.
#[derive(Clone)]
pub struct Sql {
    parts: Vec<SqlPart>,
    params: Vec<Arc<dyn ToSql + Sync + Send>>,
}

/// Start building a SQL statement.
pub fn sql(initial_sql: impl Into<String>) -> Sql {
    Sql::new(initial_sql)
}

impl Sql {
    /// Create a new builder with an initial SQL fragment.
    pub fn new(initial_sql: impl Into<String>) -> Self {
        Self {
            parts: vec![SqlPart::Raw(initial_sql.into())],
            params: Vec::new(),
        }
    }

    /// Create an empty builder.
    pub fn empty() -> Self {
        Self {
            parts: Vec::new(),
            params: Vec::new(),
        }
    }

    /// Append raw SQL (no parameters).
    pub fn push(&mut self, sql: &str) -> &mut Self {
        if sql.is_empty() {
            return self;
        }

        match self.parts.last_mut() {
            Some(SqlPart::Raw(last)) => last.push_str(sql),
            _ => self.parts.push(SqlPart::Raw(sql.to_string())),
        }
        self
    }

    /// Append a parameter placeholder and bind its value.
    pub fn push_bind<T>(&mut self, value: T) -> &mut Self
    where
        T: ToSql + Sync + Send + 'static,
    {
        self.parts.push(SqlPart::Param);
        self.params.push(Arc::new(value));
        self
    }

    pub(crate) fn push_bind_value(&mut self, value: Arc<dyn ToSql + Sync + Send>) -> &mut Self {
        self.parts.push(SqlPart::Param);
        self.params.push(value);
        self
    }

    /// Append another `Sql` fragment, consuming it.
    pub fn push_sql(&mut self, mut other: Sql) -> &mut Self {
        self.parts.append(&mut other.parts);
        self.params.append(&mut other.params);
        self
    }

    /// Append a SQL identifier (schema/table/column) safely.
    ///
    /// Identifiers cannot be parameterized in Postgres, so the string is
    /// validated through [`Ident::parse`] before being appended.
    pub fn push_ident(&mut self, ident: &str) -> PageResult<&mut Self> {
        let parsed = Ident::parse(ident)?;
        Ok(self.push_ident_ref(&parsed))
    }

    /// Append an already-validated [`Ident`].
    pub fn push_ident_ref(&mut self, ident: &Ident) -> &mut Self {
        let mut out = String::new();
        ident.write_sql(&mut out);
        self.push(&out)
    }

    /// Render SQL with `$1, $2, ...` placeholders.
    pub fn to_sql(&self) -> String {
        let mut out = String::new();
        let mut idx: usize = 0;

        for part in &self.parts {
            match part {
                SqlPart::Raw(s) => out.push_str(s),
                SqlPart::Param => {
                    idx += 1;
                    use std::fmt::Write;
                    let _ = write!(&mut out, "${}", idx);
                }
            }
        }
        out
    }

    /// Parameter refs compatible with `tokio-postgres`.
    pub fn params_ref(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect()
    }

    fn validate(&self) -> PageResult<()> {
        let placeholder_count = self
            .parts
            .iter()
            .filter(|p| matches!(p, SqlPart::Param))
            .count();

        if placeholder_count != self.params.len() {
            return Err(PageError::invalid_page(format!(
                "Sql: {} placeholders but {} params",
                placeholder_count,
                self.params.len()
            )));
        }
        Ok(())
    }

    /// Execute the built SQL and return all rows.
    pub async fn fetch_all(&self, conn: &impl GenericClient) -> PageResult<Vec<Row>> {
        self.validate()?;
        let sql = self.to_sql();
        let params = self.params_ref();
        conn.query(&sql, &params).await
    }

    /// Append `LIMIT $n` to the query with a bound parameter.
    pub fn limit(&mut self, n: i64) -> &mut Self {
        self.push(" LIMIT ").push_bind(n)
    }
}

impl std::fmt::Debug for Sql {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sql")
            .field("sql", &self.to_sql())
            .field("params", &self.params.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_placeholders_in_order() {
        let mut q = sql("SELECT * FROM users WHERE a = ");
        q.push_bind(1).push(" AND b = ").push_bind("x");

        assert_eq!(q.to_sql(), "SELECT * FROM users WHERE a = $1 AND b = $2");
        assert_eq!(q.params_ref().len(), 2);
    }

    #[test]
    fn can_compose_fragments() {
        let mut w = Sql::empty();
        w.push(" WHERE id = ").push_bind(42);

        let mut q = sql("SELECT * FROM users");
        q.push_sql(w);

        assert_eq!(q.to_sql(), "SELECT * FROM users WHERE id = $1");
        assert_eq!(q.params_ref().len(), 1);
    }

    #[test]
    fn cloned_fragment_keeps_params() {
        let mut w = Sql::empty();
        w.push("id > ").push_bind(7_i64);
        let copy = w.clone();

        assert_eq!(copy.to_sql(), "id > $1");
        assert_eq!(copy.params_ref().len(), 1);
    }

    #[test]
    fn composed_fragments_renumber_globally() {
        let mut a = Sql::empty();
        a.push("a = ").push_bind(1_i32);
        let mut b = Sql::empty();
        b.push("b = ").push_bind(2_i32);

        let mut q = sql("SELECT * FROM t WHERE ");
        q.push_sql(a);
        q.push(" AND ");
        q.push_sql(b);

        assert_eq!(q.to_sql(), "SELECT * FROM t WHERE a = $1 AND b = $2");
    }

    #[test]
    fn push_ident_accepts_simple_and_dotted() {
        let mut q = Sql::empty();
        q.push_ident("users").unwrap();
        q.push(", ");
        q.push_ident("public.users").unwrap();
        assert_eq!(q.to_sql(), "users, public.users");
    }

    #[test]
    fn push_ident_rejects_unsafe() {
        let mut q = Sql::empty();
        assert!(q.push_ident("users; drop table users; --").is_err());
        assert!(q.push_ident("1users").is_err());
        assert!(q.push_ident("users..name").is_err());
        assert!(q.push_ident("users name").is_err());
    }

    #[test]
    fn limit_appends_with_param() {
        let mut q = sql("SELECT * FROM users ORDER BY id ASC");
        q.limit(11);
        assert_eq!(q.to_sql(), "SELECT * FROM users ORDER BY id ASC LIMIT $1");
        assert_eq!(q.params_ref().len(), 1);
    }
}
