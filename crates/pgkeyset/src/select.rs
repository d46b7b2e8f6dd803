//! Selectable model and the host-query capability seam.
//!
//! The paginator works against [`KeysetQuery`], a small capability interface
//! (introspect ORDER BY and GROUP BY, add output columns, add a filter or
//! having condition, set a limit, build the statement). Host query layers
//! implement it for their own query types; [`SelectQuery`] is the reference
//! implementation shipped with this crate.

use crate::error::{PageError, PageResult};
use crate::order::OrderColumn;
use crate::sql::Sql;
use tokio_postgres::types::ToSql;

/// One sub-column of a [`SelectColumn::Bundle`].
#[derive(Debug, Clone, PartialEq)]
pub struct BundleColumn {
    pub key: String,
    pub sql: String,
}

impl BundleColumn {
    pub fn new(key: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            sql: sql.into(),
        }
    }
}

/// One mapped column of a [`SelectColumn::Entity`].
#[derive(Debug, Clone, PartialEq)]
pub struct EntityColumn {
    /// Column name in the table.
    pub name: String,
    /// Property name on the mapped row struct (defaults to the column name).
    pub property: String,
    pub nullable: bool,
}

impl EntityColumn {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            property: name.clone(),
            name,
            nullable: false,
        }
    }

    /// Use a different property name than the column name.
    pub fn property(mut self, property: impl Into<String>) -> Self {
        self.property = property.into();
        self
    }

    /// Mark the column nullable. Ordering by it draws a warning, because
    /// keyset comparisons silently drop NULL rows.
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}

/// Descriptor for one selected output column, bundle, or entity.
///
/// Descriptors carry what the query's select list already exposes, so
/// order-key resolution can decide whether an ordering value is retrievable
/// from a result row or must be injected as an extra column. Each descriptor
/// occupies a contiguous range of output columns, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectColumn {
    /// A bare column expression, optionally labeled.
    Expr {
        sql: String,
        label: Option<String>,
        nullable: bool,
    },
    /// A named composite of sub-columns, read back member by member.
    Bundle {
        name: String,
        columns: Vec<BundleColumn>,
    },
    /// A whole mapped entity: every mapped column of a table (or alias).
    Entity {
        table: String,
        alias: Option<String>,
        columns: Vec<EntityColumn>,
    },
    /// A single mapped attribute of an entity.
    Attribute {
        table: String,
        column: String,
        label: Option<String>,
        nullable: bool,
    },
}

impl SelectColumn {
    /// A plain column expression.
    pub fn expr(sql: impl Into<String>) -> Self {
        SelectColumn::Expr {
            sql: sql.into(),
            label: None,
            nullable: false,
        }
    }

    /// A labeled column expression (`sql AS label`).
    pub fn expr_as(sql: impl Into<String>, label: impl Into<String>) -> Self {
        SelectColumn::Expr {
            sql: sql.into(),
            label: Some(label.into()),
            nullable: false,
        }
    }

    /// A plain column expression backed by a nullable column.
    pub fn nullable_expr(sql: impl Into<String>) -> Self {
        SelectColumn::Expr {
            sql: sql.into(),
            label: None,
            nullable: true,
        }
    }

    /// A named bundle of sub-columns.
    pub fn bundle(name: impl Into<String>, columns: Vec<BundleColumn>) -> Self {
        SelectColumn::Bundle {
            name: name.into(),
            columns,
        }
    }

    /// A whole mapped entity.
    pub fn entity(table: impl Into<String>, columns: Vec<EntityColumn>) -> Self {
        SelectColumn::Entity {
            table: table.into(),
            alias: None,
            columns,
        }
    }

    /// A whole mapped entity selected under an alias.
    pub fn entity_aliased(
        table: impl Into<String>,
        alias: impl Into<String>,
        columns: Vec<EntityColumn>,
    ) -> Self {
        SelectColumn::Entity {
            table: table.into(),
            alias: Some(alias.into()),
            columns,
        }
    }

    /// A single mapped attribute (`table.column`).
    pub fn attribute(table: impl Into<String>, column: impl Into<String>) -> Self {
        SelectColumn::Attribute {
            table: table.into(),
            column: column.into(),
            label: None,
            nullable: false,
        }
    }

    /// Number of output columns this descriptor occupies.
    pub fn width(&self) -> usize {
        match self {
            SelectColumn::Expr { .. } | SelectColumn::Attribute { .. } => 1,
            SelectColumn::Bundle { columns, .. } => columns.len(),
            SelectColumn::Entity { columns, .. } => columns.len(),
        }
    }

    /// The output column names this descriptor contributes, in order.
    pub fn output_names(&self) -> Vec<String> {
        match self {
            SelectColumn::Expr { sql, label, .. } => {
                vec![label.clone().unwrap_or_else(|| sql.clone())]
            }
            SelectColumn::Bundle { columns, .. } => {
                columns.iter().map(|c| c.key.clone()).collect()
            }
            SelectColumn::Entity { columns, .. } => {
                columns.iter().map(|c| c.name.clone()).collect()
            }
            SelectColumn::Attribute { column, label, .. } => {
                vec![label.clone().unwrap_or_else(|| column.clone())]
            }
        }
    }

    fn render_into(&self, select_list: &mut Vec<String>) {
        match self {
            SelectColumn::Expr { sql, label, .. } => match label {
                Some(label) => select_list.push(format!("{sql} AS {label}")),
                None => select_list.push(sql.clone()),
            },
            SelectColumn::Bundle { columns, .. } => {
                for c in columns {
                    if c.sql == c.key {
                        select_list.push(c.sql.clone());
                    } else {
                        select_list.push(format!("{} AS {}", c.sql, c.key));
                    }
                }
            }
            SelectColumn::Entity {
                table,
                alias,
                columns,
            } => {
                let scope = alias.as_deref().unwrap_or(table);
                for c in columns {
                    select_list.push(format!("{scope}.{}", c.name));
                }
            }
            SelectColumn::Attribute {
                table,
                column,
                label,
                ..
            } => match label {
                Some(label) => select_list.push(format!("{table}.{column} AS {label}")),
                None => select_list.push(format!("{table}.{column}")),
            },
        }
    }
}

/// The names a row set built from these descriptors exposes to the caller.
pub fn output_names(columns: &[SelectColumn]) -> Vec<String> {
    columns.iter().flat_map(|c| c.output_names()).collect()
}

/// A synthetic output column injected to recover an ordering value.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtraColumn {
    pub sql: String,
    pub alias: String,
}

impl ExtraColumn {
    pub fn new(sql: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            alias: alias.into(),
        }
    }
}

/// Capability interface the paginator needs from a host query object.
///
/// Everything else about the host query layer (joins, CTEs, locking, ...) is
/// out of this crate's scope; mutations are expressed on a per-call clone.
pub trait KeysetQuery: Clone + Send + Sync {
    /// The query's current ORDER BY, parsed into ordering columns.
    fn order_by_columns(&self) -> PageResult<Vec<OrderColumn>>;

    /// Descriptors for every column/entity the query selects, in order.
    fn select_columns(&self) -> &[SelectColumn];

    /// Whether the query aggregates rows (has a GROUP BY).
    fn has_group_by(&self) -> bool;

    /// Replace the ORDER BY with the given rendered items.
    fn replace_order_by(&mut self, items: Vec<String>);

    /// Append synthetic output columns after all user-selected columns.
    fn add_output_columns(&mut self, extra: &[ExtraColumn]);

    /// AND a condition into the pre-aggregation filter (WHERE).
    fn add_filter(&mut self, cond: Sql);

    /// AND a condition into the post-aggregation filter (HAVING).
    fn add_having(&mut self, cond: Sql);

    /// Set the row limit.
    fn set_limit(&mut self, n: i64);

    /// Render the full statement.
    fn build(&self) -> PageResult<Sql>;
}

/// Reference [`KeysetQuery`] implementation: a plain SELECT statement model.
///
/// # Example
/// ```ignore
/// use pgkeyset::{SelectQuery, SelectColumn};
///
/// let q = SelectQuery::new("users")
///     .column("id")
///     .column("name")
///     .eq("status", "active")
///     .order_by("created_at DESC, id DESC");
/// ```
#[derive(Debug, Clone)]
pub struct SelectQuery {
    from_expr: String,
    columns: Vec<SelectColumn>,
    joins: Vec<String>,
    filters: Vec<Sql>,
    group_by: Option<String>,
    having: Vec<Sql>,
    order_items: Vec<String>,
    extra_columns: Vec<ExtraColumn>,
    limit: Option<i64>,
}

impl SelectQuery {
    /// Create a new SELECT model over a table.
    pub fn new(table: &str) -> Self {
        Self {
            from_expr: table.to_string(),
            columns: Vec::new(),
            joins: Vec::new(),
            filters: Vec::new(),
            group_by: None,
            having: Vec::new(),
            order_items: Vec::new(),
            extra_columns: Vec::new(),
            limit: None,
        }
    }

    /// Create a SELECT model with a custom FROM expression (aliases,
    /// subqueries).
    pub fn from_expr(from_expr: &str) -> Self {
        Self::new(from_expr)
    }

    /// Select a plain column expression.
    pub fn column(mut self, sql: &str) -> Self {
        self.columns.push(SelectColumn::expr(sql));
        self
    }

    /// Select a labeled column expression.
    pub fn column_as(mut self, sql: &str, label: &str) -> Self {
        self.columns.push(SelectColumn::expr_as(sql, label));
        self
    }

    /// Select a nullable column expression.
    pub fn nullable_column(mut self, sql: &str) -> Self {
        self.columns.push(SelectColumn::nullable_expr(sql));
        self
    }

    /// Select with a full descriptor (bundles, entities, attributes).
    pub fn select_column(mut self, column: SelectColumn) -> Self {
        self.columns.push(column);
        self
    }

    /// Add INNER JOIN.
    pub fn inner_join(mut self, table: &str, on: &str) -> Self {
        self.joins.push(format!("INNER JOIN {table} ON {on}"));
        self
    }

    /// Add LEFT JOIN.
    pub fn left_join(mut self, table: &str, on: &str) -> Self {
        self.joins.push(format!("LEFT JOIN {table} ON {on}"));
        self
    }

    /// AND a self-contained condition fragment into the WHERE clause.
    pub fn filter(mut self, cond: Sql) -> Self {
        self.filters.push(cond);
        self
    }

    /// AND `column = value` into the WHERE clause.
    pub fn eq<T: ToSql + Send + Sync + 'static>(mut self, column: &str, value: T) -> Self {
        let mut cond = Sql::empty();
        cond.push(column).push(" = ").push_bind(value);
        self.filters.push(cond);
        self
    }

    /// Set the GROUP BY clause.
    pub fn group_by(mut self, clause: &str) -> Self {
        self.group_by = Some(clause.to_string());
        self
    }

    /// AND a self-contained condition fragment into the HAVING clause.
    pub fn having(mut self, cond: Sql) -> Self {
        self.having.push(cond);
        self
    }

    /// Append an ORDER BY item (may itself be a comma-separated list).
    pub fn order_by(mut self, item: &str) -> Self {
        self.order_items.push(item.to_string());
        self
    }

    /// Set LIMIT.
    pub fn limit(mut self, n: i64) -> Self {
        self.limit = Some(n);
        self
    }

    /// Render the statement (for debugging and tests).
    pub fn to_sql(&self) -> PageResult<String> {
        Ok(KeysetQuery::build(self)?.to_sql())
    }
}

impl KeysetQuery for SelectQuery {
    fn order_by_columns(&self) -> PageResult<Vec<OrderColumn>> {
        let mut out = Vec::new();
        for item in &self.order_items {
            out.extend(OrderColumn::parse_clause(item)?);
        }
        Ok(out)
    }

    fn select_columns(&self) -> &[SelectColumn] {
        &self.columns
    }

    fn has_group_by(&self) -> bool {
        self.group_by.is_some()
    }

    fn replace_order_by(&mut self, items: Vec<String>) {
        self.order_items = items;
    }

    fn add_output_columns(&mut self, extra: &[ExtraColumn]) {
        self.extra_columns.extend_from_slice(extra);
    }

    fn add_filter(&mut self, cond: Sql) {
        self.filters.push(cond);
    }

    fn add_having(&mut self, cond: Sql) {
        self.having.push(cond);
    }

    fn set_limit(&mut self, n: i64) {
        self.limit = Some(n);
    }

    fn build(&self) -> PageResult<Sql> {
        if self.columns.is_empty() {
            return Err(PageError::invalid_page(
                "query selects no columns; declare its output with SelectQuery::column and friends",
            ));
        }

        let mut select_list = Vec::new();
        for col in &self.columns {
            col.render_into(&mut select_list);
        }
        for extra in &self.extra_columns {
            select_list.push(format!("{} AS {}", extra.sql, extra.alias));
        }

        let mut q = Sql::new(format!(
            "SELECT {} FROM {}",
            select_list.join(", "),
            self.from_expr
        ));

        for join in &self.joins {
            q.push(" ");
            q.push(join);
        }

        for (i, cond) in self.filters.iter().enumerate() {
            q.push(if i == 0 { " WHERE " } else { " AND " });
            q.push_sql(cond.clone());
        }

        if let Some(group) = &self.group_by {
            q.push(" GROUP BY ");
            q.push(group);
        }

        for (i, cond) in self.having.iter().enumerate() {
            q.push(if i == 0 { " HAVING " } else { " AND " });
            q.push_sql(cond.clone());
        }

        if !self.order_items.is_empty() {
            q.push(" ORDER BY ");
            q.push(&self.order_items.join(", "));
        }

        if let Some(limit) = self.limit {
            q.limit(limit);
        }

        Ok(q)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_simple_select() {
        let q = SelectQuery::new("users").column("id").column("name");
        assert_eq!(q.to_sql().unwrap(), "SELECT id, name FROM users");
    }

    #[test]
    fn builds_where_and_order() {
        let q = SelectQuery::new("users")
            .column("id")
            .eq("status", "active")
            .order_by("created_at DESC, id DESC")
            .limit(11);
        assert_eq!(
            q.to_sql().unwrap(),
            "SELECT id FROM users WHERE status = $1 ORDER BY created_at DESC, id DESC LIMIT $2"
        );
    }

    #[test]
    fn multiple_filters_join_with_and() {
        let mut cond = Sql::empty();
        cond.push("age > ").push_bind(18_i32);
        let q = SelectQuery::new("users")
            .column("id")
            .eq("status", "active")
            .filter(cond);
        assert_eq!(
            q.to_sql().unwrap(),
            "SELECT id FROM users WHERE status = $1 AND age > $2"
        );
    }

    #[test]
    fn renders_group_by_and_having() {
        let mut cond = Sql::empty();
        cond.push("count(*) > ").push_bind(5_i64);
        let q = SelectQuery::new("orders")
            .column("user_id")
            .column_as("count(*)", "order_count")
            .group_by("user_id")
            .having(cond);
        assert_eq!(
            q.to_sql().unwrap(),
            "SELECT user_id, count(*) AS order_count FROM orders GROUP BY user_id HAVING count(*) > $1"
        );
    }

    #[test]
    fn renders_joins() {
        let q = SelectQuery::new("users u")
            .column("u.id")
            .inner_join("orders o", "u.id = o.user_id");
        assert_eq!(
            q.to_sql().unwrap(),
            "SELECT u.id FROM users u INNER JOIN orders o ON u.id = o.user_id"
        );
    }

    #[test]
    fn renders_entities_and_bundles() {
        let q = SelectQuery::new("users")
            .select_column(SelectColumn::entity(
                "users",
                vec![EntityColumn::new("id"), EntityColumn::new("name")],
            ))
            .select_column(SelectColumn::bundle(
                "stats",
                vec![
                    BundleColumn::new("total", "count(*) OVER ()"),
                    BundleColumn::new("email", "email"),
                ],
            ));
        assert_eq!(
            q.to_sql().unwrap(),
            "SELECT users.id, users.name, count(*) OVER () AS total, email FROM users"
        );
    }

    #[test]
    fn extra_columns_render_after_user_columns() {
        let mut q = SelectQuery::new("users").column("id");
        q.add_output_columns(&[ExtraColumn::new("lower(email)", "_pgkeyset_oc_1")]);
        assert_eq!(
            q.to_sql().unwrap(),
            "SELECT id, lower(email) AS _pgkeyset_oc_1 FROM users"
        );
    }

    #[test]
    fn replace_order_by_swaps_items() {
        let mut q = SelectQuery::new("users").column("id").order_by("id DESC");
        q.replace_order_by(vec!["id ASC".to_string(), "name DESC".to_string()]);
        assert_eq!(
            q.to_sql().unwrap(),
            "SELECT id FROM users ORDER BY id ASC, name DESC"
        );
    }

    #[test]
    fn order_by_columns_parses_items() {
        let q = SelectQuery::new("users")
            .column("id")
            .order_by("created_at DESC")
            .order_by("id");
        let ocs = q.order_by_columns().unwrap();
        assert_eq!(ocs.len(), 2);
        assert!(!ocs[0].is_ascending());
        assert!(ocs[1].is_ascending());
    }

    #[test]
    fn no_columns_is_an_error() {
        let q = SelectQuery::new("users");
        assert!(q.to_sql().is_err());
    }

    #[test]
    fn output_names_cover_all_descriptors() {
        let cols = vec![
            SelectColumn::expr("id"),
            SelectColumn::expr_as("lower(email)", "email_lower"),
            SelectColumn::entity("users", vec![EntityColumn::new("a"), EntityColumn::new("b")]),
            SelectColumn::attribute("users", "name"),
        ];
        assert_eq!(output_names(&cols), vec!["id", "email_lower", "a", "b", "name"]);
    }
}
