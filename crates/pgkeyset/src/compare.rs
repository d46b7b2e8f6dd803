//! Page-boundary comparator.
//!
//! Builds the SQL predicate restricting a query to rows strictly past a
//! marker. Per-column operand swapping turns every ordering into an
//! ascending-style strict lexicographic tuple comparison: for ascending
//! columns the row expression sits on the left, for descending columns the
//! marker value does.

use crate::codec::{BookmarkCodec, KeyValue};
use crate::error::{PageError, PageResult};
use crate::order::OrderColumn;
use crate::sql::Sql;

/// Strategy for multi-column boundary predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TupleComparison {
    /// `(a, b) > ($1, $2)` — row-wise comparison with the database's native
    /// lexicographic semantics. Reliable on PostgreSQL.
    #[default]
    Native,
    /// The explicit `OR`/`AND` prefix expansion. Semantically equivalent to
    /// [`TupleComparison::Native`], only slower; always correct, and used
    /// whenever marker values carry types the native path cannot be trusted
    /// to coerce (user-registered types bound through driver-level casts).
    Expanded,
}

enum Side<'a> {
    Col(String),
    Value(&'a KeyValue),
}

fn push_side(sql: &mut Sql, side: &Side<'_>, codec: &BookmarkCodec) {
    match side {
        Side::Col(s) => {
            sql.push(s);
        }
        Side::Value(v) => {
            sql.push_bind((*v).clone());
            if let Some(cast) = codec.cast_for(v) {
                sql.push("::");
                sql.push(cast);
            }
        }
    }
}

/// Build the condition for rows strictly past `place` in the order given by
/// `ocols`.
///
/// The caller applies the result as a WHERE condition, or as HAVING when the
/// query aggregates.
pub fn page_filter(
    ocols: &[OrderColumn],
    place: &[KeyValue],
    strategy: TupleComparison,
    codec: &BookmarkCodec,
) -> PageResult<Sql> {
    if ocols.len() != place.len() {
        return Err(PageError::invalid_page(
            "Page marker has different column count to query's order clause",
        ));
    }
    if ocols.is_empty() {
        return Err(PageError::invalid_page(
            "cannot build a page filter with no ordering columns",
        ));
    }

    // A custom-typed value inside a native row constructor is exactly where
    // driver-level coercion breaks down; fall back to the expansion.
    let strategy = if place.iter().any(|v| matches!(v, KeyValue::Custom { .. })) {
        TupleComparison::Expanded
    } else {
        strategy
    };

    let pairs: Vec<(Side<'_>, Side<'_>)> = ocols
        .iter()
        .zip(place.iter())
        .map(|(oc, value)| {
            let col = Side::Col(oc.comparable_sql());
            let val = Side::Value(value);
            if oc.is_ascending() {
                (col, val)
            } else {
                (val, col)
            }
        })
        .collect();

    let mut sql = Sql::empty();

    if pairs.len() == 1 {
        let (lhs, rhs) = &pairs[0];
        push_side(&mut sql, lhs, codec);
        sql.push(" > ");
        push_side(&mut sql, rhs, codec);
        return Ok(sql);
    }

    match strategy {
        TupleComparison::Native => {
            sql.push("(");
            for (i, (lhs, _)) in pairs.iter().enumerate() {
                if i > 0 {
                    sql.push(", ");
                }
                push_side(&mut sql, lhs, codec);
            }
            sql.push(") > (");
            for (i, (_, rhs)) in pairs.iter().enumerate() {
                if i > 0 {
                    sql.push(", ");
                }
                push_side(&mut sql, rhs, codec);
            }
            sql.push(")");
        }
        TupleComparison::Expanded => {
            sql.push("(");
            for k in 0..pairs.len() {
                if k > 0 {
                    sql.push(" OR ");
                }
                let compound = k > 0;
                if compound {
                    sql.push("(");
                }
                for (j, (lhs, rhs)) in pairs.iter().take(k).enumerate() {
                    if j > 0 {
                        sql.push(" AND ");
                    }
                    push_side(&mut sql, lhs, codec);
                    sql.push(" = ");
                    push_side(&mut sql, rhs, codec);
                }
                if k > 0 {
                    sql.push(" AND ");
                }
                let (lhs, rhs) = &pairs[k];
                push_side(&mut sql, lhs, codec);
                sql.push(" > ");
                push_side(&mut sql, rhs, codec);
                if compound {
                    sql.push(")");
                }
            }
            sql.push(")");
        }
    }

    Ok(sql)
}
