//! Ordering-column model.
//!
//! [`OrderColumn`] wraps a single ORDER BY expression and always carries an
//! explicit direction: an item with no modifier is normalized to ascending at
//! construction. Reversing produces a new value, never mutates in place.

use crate::error::{PageError, PageResult};
use crate::ident::{Ident, IntoIdent};

/// Sort direction for ORDER BY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDir {
    #[default]
    Asc,
    Desc,
}

impl SortDir {
    pub fn to_sql(self) -> &'static str {
        match self {
            SortDir::Asc => "ASC",
            SortDir::Desc => "DESC",
        }
    }

    pub fn reversed(self) -> Self {
        match self {
            SortDir::Asc => SortDir::Desc,
            SortDir::Desc => SortDir::Asc,
        }
    }
}

/// The expression underlying an ordering column.
#[derive(Debug, Clone, PartialEq)]
pub enum OrderExpr {
    /// A plain (possibly qualified) column reference.
    Column(Ident),
    /// An arbitrary SQL expression, optionally selected under a result label.
    Expression { sql: String, label: Option<String> },
}

/// One ordering expression plus its explicit direction.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderColumn {
    expr: OrderExpr,
    dir: SortDir,
}

impl OrderColumn {
    /// An ascending ordering column over a column reference.
    pub fn asc(column: impl IntoIdent) -> PageResult<Self> {
        Ok(Self {
            expr: OrderExpr::Column(column.into_ident()?),
            dir: SortDir::Asc,
        })
    }

    /// A descending ordering column over a column reference.
    pub fn desc(column: impl IntoIdent) -> PageResult<Self> {
        Ok(Self {
            expr: OrderExpr::Column(column.into_ident()?),
            dir: SortDir::Desc,
        })
    }

    /// An ordering column over an arbitrary SQL expression.
    pub fn expression(sql: impl Into<String>, dir: SortDir) -> Self {
        Self {
            expr: OrderExpr::Expression {
                sql: sql.into(),
                label: None,
            },
            dir,
        }
    }

    /// An ordering column over an expression that the query selects under a
    /// result label. The label is what appears in the rewritten ORDER BY;
    /// the expression is what appears in boundary comparisons.
    pub fn labeled(sql: impl Into<String>, label: impl Into<String>, dir: SortDir) -> Self {
        Self {
            expr: OrderExpr::Expression {
                sql: sql.into(),
                label: Some(label.into()),
            },
            dir,
        }
    }

    /// Parse a single textual ORDER BY item, e.g. `users.created_at DESC`.
    ///
    /// A missing direction modifier means ascending. `NULLS FIRST` /
    /// `NULLS LAST` are not supported: they are stripped with a warning and
    /// the paged results may be wrong.
    pub fn parse(item: &str) -> PageResult<Self> {
        let mut rest = item.trim();
        if rest.is_empty() {
            return Err(PageError::invalid_page("empty ORDER BY item"));
        }

        if let Some(stripped) = strip_suffix_keywords(rest, &["NULLS", "FIRST"])
            .or_else(|| strip_suffix_keywords(rest, &["NULLS", "LAST"]))
        {
            tracing::warn!(
                item,
                "ordering column has a NULLS FIRST or NULLS LAST modifier, which keyset \
                 pagination does not support; results will be wrong"
            );
            rest = stripped;
        }

        let dir = if let Some(stripped) = strip_suffix_keywords(rest, &["ASC"]) {
            rest = stripped;
            SortDir::Asc
        } else if let Some(stripped) = strip_suffix_keywords(rest, &["DESC"]) {
            rest = stripped;
            SortDir::Desc
        } else {
            SortDir::Asc
        };

        if rest.is_empty() {
            return Err(PageError::invalid_page(format!(
                "ORDER BY item has no expression: {item}"
            )));
        }

        let expr = match Ident::parse(rest) {
            Ok(ident) => OrderExpr::Column(ident),
            Err(_) => OrderExpr::Expression {
                sql: rest.to_string(),
                label: None,
            },
        };
        Ok(Self { expr, dir })
    }

    /// Parse a comma-separated ORDER BY clause into its items.
    ///
    /// Commas inside parentheses and quotes do not split.
    pub fn parse_clause(clause: &str) -> PageResult<Vec<Self>> {
        split_top_level(clause)
            .into_iter()
            .map(|item| Self::parse(&item))
            .collect()
    }

    /// `true` for ascending, `false` for descending.
    pub fn is_ascending(&self) -> bool {
        self.dir == SortDir::Asc
    }

    /// The direction of this ordering column.
    pub fn dir(&self) -> SortDir {
        self.dir
    }

    /// The same ordering column with only the direction flipped.
    pub fn reversed(&self) -> Self {
        Self {
            expr: self.expr.clone(),
            dir: self.dir.reversed(),
        }
    }

    /// The underlying expression.
    pub fn expr(&self) -> &OrderExpr {
        &self.expr
    }

    /// The expression with the direction modifier stripped, as rendered in an
    /// ORDER BY list (a result label stands in for its expression here).
    pub fn element_sql(&self) -> String {
        match &self.expr {
            OrderExpr::Column(ident) => ident.to_sql(),
            OrderExpr::Expression { sql, label } => {
                label.clone().unwrap_or_else(|| sql.clone())
            }
        }
    }

    /// The expression with direction modifier and result label stripped —
    /// the form that appears in boundary comparisons against marker values.
    pub fn comparable_sql(&self) -> String {
        match &self.expr {
            OrderExpr::Column(ident) => ident.to_sql(),
            OrderExpr::Expression { sql, .. } => sql.clone(),
        }
    }

    /// This column rendered as an ORDER BY item.
    pub fn order_clause_sql(&self) -> String {
        format!("{} {}", self.element_sql(), self.dir.to_sql())
    }

    /// The qualifying scope (table or alias) of a column reference, if any.
    pub fn table_name(&self) -> Option<String> {
        match &self.expr {
            OrderExpr::Column(ident) => ident.qualifier(),
            OrderExpr::Expression { .. } => None,
        }
    }

    /// The local name of this ordering column.
    pub fn name(&self) -> String {
        match &self.expr {
            OrderExpr::Column(ident) => ident.name().to_string(),
            OrderExpr::Expression { sql, label } => label.clone().unwrap_or_else(|| sql.clone()),
        }
    }

    /// The fully-qualified rendered name used for textual label matching.
    pub fn quoted_full_name(&self) -> String {
        match &self.expr {
            OrderExpr::Column(ident) => ident.to_sql(),
            OrderExpr::Expression { sql, label } => {
                label.clone().unwrap_or_else(|| sql.clone())
            }
        }
    }
}

/// Strip a trailing keyword sequence (case-insensitive, whitespace-separated).
fn strip_suffix_keywords<'a>(s: &'a str, keywords: &[&str]) -> Option<&'a str> {
    let mut rest = s.trim_end();
    for kw in keywords.iter().rev() {
        let lower = rest.to_ascii_lowercase();
        let stripped = lower.strip_suffix(&kw.to_ascii_lowercase())?;
        // Keyword must stand alone, not end another word.
        if !stripped.is_empty() && !stripped.ends_with(char::is_whitespace) {
            return None;
        }
        rest = rest[..stripped.len()].trim_end();
    }
    if rest.is_empty() { None } else { Some(rest) }
}

/// Split on commas that are not nested inside parentheses or quotes.
fn split_top_level(clause: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut depth = 0_usize;
    let mut in_quote: Option<char> = None;

    for ch in clause.chars() {
        match in_quote {
            Some(q) => {
                current.push(ch);
                if ch == q {
                    in_quote = None;
                }
            }
            None => match ch {
                '\'' | '"' => {
                    in_quote = Some(ch);
                    current.push(ch);
                }
                '(' => {
                    depth += 1;
                    current.push(ch);
                }
                ')' => {
                    depth = depth.saturating_sub(1);
                    current.push(ch);
                }
                ',' if depth == 0 => {
                    items.push(std::mem::take(&mut current));
                }
                _ => current.push(ch),
            },
        }
    }
    if !current.trim().is_empty() {
        items.push(current);
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_direction_defaults_to_ascending() {
        let oc = OrderColumn::parse("a").unwrap();
        assert!(oc.is_ascending());
        assert_eq!(oc.order_clause_sql(), "a ASC");
    }

    #[test]
    fn parses_explicit_directions() {
        assert!(OrderColumn::parse("a asc").unwrap().is_ascending());
        assert!(!OrderColumn::parse("a DESC").unwrap().is_ascending());
        assert!(!OrderColumn::parse("users.created_at desc").unwrap().is_ascending());
    }

    #[test]
    fn reversed_twice_is_identity() {
        let oc = OrderColumn::parse("users.created_at DESC").unwrap();
        let rr = oc.reversed().reversed();
        assert_eq!(rr, oc);
        assert_eq!(rr.order_clause_sql(), oc.order_clause_sql());
    }

    #[test]
    fn reversed_does_not_mutate() {
        let oc = OrderColumn::parse("a DESC").unwrap();
        let rev = oc.reversed();
        assert!(rev.is_ascending());
        assert!(!oc.is_ascending());
    }

    #[test]
    fn nulls_modifier_is_stripped() {
        let oc = OrderColumn::parse("a DESC NULLS LAST").unwrap();
        assert!(!oc.is_ascending());
        assert_eq!(oc.order_clause_sql(), "a DESC");
        let oc = OrderColumn::parse("a NULLS FIRST").unwrap();
        assert!(oc.is_ascending());
        assert_eq!(oc.order_clause_sql(), "a ASC");
    }

    #[test]
    fn expression_items_are_kept_verbatim() {
        let oc = OrderColumn::parse("lower(email) DESC").unwrap();
        assert_eq!(oc.comparable_sql(), "lower(email)");
        assert_eq!(oc.order_clause_sql(), "lower(email) DESC");
        assert_eq!(oc.table_name(), None);
    }

    #[test]
    fn labeled_expression_splits_element_and_comparable() {
        let oc = OrderColumn::labeled("count(*)", "total", SortDir::Desc);
        assert_eq!(oc.element_sql(), "total");
        assert_eq!(oc.comparable_sql(), "count(*)");
        assert_eq!(oc.order_clause_sql(), "total DESC");
    }

    #[test]
    fn qualified_column_names() {
        let oc = OrderColumn::parse("users.created_at DESC").unwrap();
        assert_eq!(oc.table_name().as_deref(), Some("users"));
        assert_eq!(oc.name(), "created_at");
        assert_eq!(oc.quoted_full_name(), "users.created_at");
    }

    #[test]
    fn clause_splits_on_top_level_commas_only() {
        let ocs = OrderColumn::parse_clause("coalesce(a, b) DESC, id").unwrap();
        assert_eq!(ocs.len(), 2);
        assert_eq!(ocs[0].comparable_sql(), "coalesce(a, b)");
        assert!(ocs[1].is_ascending());
    }

    #[test]
    fn empty_item_is_rejected() {
        assert!(OrderColumn::parse("  ").is_err());
    }
}
