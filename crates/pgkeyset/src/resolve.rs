//! Order-key resolution.
//!
//! Given an ordering column and the descriptors for everything a query
//! already selects, decide how to read that ordering value off a result row:
//! directly by position, as a member of a bundle/entity, or — when no
//! selected column carries the value — by injecting a synthetic labeled
//! output column. Resolution is deterministic and always terminates in the
//! appended fallback; it has no error path of its own.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio_postgres::Row;

use crate::codec::{BookmarkCodec, KeyValue};
use crate::error::{PageError, PageResult};
use crate::order::OrderColumn;
use crate::select::{ExtraColumn, SelectColumn};

// Aliases are never reused across calls, so bookmarks built against one
// statement can't silently read a different statement's synthetic column.
static APPENDED_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_appended_alias() -> String {
    let n = APPENDED_COUNTER.fetch_add(1, Ordering::Relaxed) + 1;
    format!("_pgkeyset_oc_{n}")
}

/// How to read one ordering column's value off a result row.
#[derive(Debug, Clone)]
pub enum ResolvedKey {
    /// The value sits at a fixed position in the row.
    Direct { oc: OrderColumn, index: usize },
    /// The value is a named member of a bundle or entity at a fixed
    /// position.
    Attribute {
        oc: OrderColumn,
        index: usize,
        attr: String,
    },
    /// No selected column carries the value; an extra output column with a
    /// generated alias is injected into the query.
    Appended { oc: OrderColumn, alias: String },
}

impl ResolvedKey {
    /// The ordering column this key resolves.
    pub fn oc(&self) -> &OrderColumn {
        match self {
            ResolvedKey::Direct { oc, .. }
            | ResolvedKey::Attribute { oc, .. }
            | ResolvedKey::Appended { oc, .. } => oc,
        }
    }

    /// The same resolution with the ordering direction flipped.
    pub fn reversed(&self) -> Self {
        match self {
            ResolvedKey::Direct { oc, index } => ResolvedKey::Direct {
                oc: oc.reversed(),
                index: *index,
            },
            ResolvedKey::Attribute { oc, index, attr } => ResolvedKey::Attribute {
                oc: oc.reversed(),
                index: *index,
                attr: attr.clone(),
            },
            ResolvedKey::Appended { oc, alias } => ResolvedKey::Appended {
                oc: oc.reversed(),
                alias: alias.clone(),
            },
        }
    }

    /// The synthetic output column this key needs, if any.
    pub fn extra_column(&self) -> Option<ExtraColumn> {
        match self {
            ResolvedKey::Appended { oc, alias } => {
                Some(ExtraColumn::new(oc.comparable_sql(), alias.clone()))
            }
            _ => None,
        }
    }

    /// This key rendered as an ORDER BY item for the rewritten query.
    pub fn order_clause_sql(&self) -> String {
        match self {
            ResolvedKey::Appended { oc, alias } => {
                format!("{alias} {}", oc.dir().to_sql())
            }
            other => other.oc().order_clause_sql(),
        }
    }

    /// Read this ordering column's value off a result row.
    pub fn get_from_row(&self, codec: &BookmarkCodec, row: &Row) -> PageResult<KeyValue> {
        match self {
            ResolvedKey::Direct { index, .. } | ResolvedKey::Attribute { index, .. } => {
                codec.value_from_row(row, *index)
            }
            ResolvedKey::Appended { alias, .. } => {
                let idx = row
                    .columns()
                    .iter()
                    .position(|c| c.name() == alias)
                    .ok_or_else(|| {
                        PageError::decode(alias.clone(), "synthetic ordering column missing from row")
                    })?;
                codec.value_from_row(row, idx)
            }
        }
    }
}

fn warn_nullable(name: &str) {
    tracing::warn!(
        column = name,
        "ordering by a nullable column can cause rows to be incorrectly omitted from the results"
    );
}

/// Try to derive the value of `oc` from one descriptor at flat position
/// `start`. Returns `None` when this descriptor cannot supply it.
fn derive_order_key(oc: &OrderColumn, desc: &SelectColumn, start: usize) -> Option<ResolvedKey> {
    match desc {
        SelectColumn::Expr {
            sql,
            label,
            nullable,
        } => {
            // A bare column expression matching the label-stripped ordering
            // value, or a label the ORDER BY references by name.
            if *sql == oc.comparable_sql() {
                if *nullable {
                    warn_nullable(sql);
                }
                return Some(ResolvedKey::Direct {
                    oc: oc.clone(),
                    index: start,
                });
            }
            if label.as_deref() == Some(oc.quoted_full_name().as_str()) {
                return Some(ResolvedKey::Direct {
                    oc: oc.clone(),
                    index: start,
                });
            }
            None
        }
        SelectColumn::Bundle { columns, .. } => {
            for (offset, sub) in columns.iter().enumerate() {
                if sub.sql == oc.comparable_sql() {
                    return Some(ResolvedKey::Attribute {
                        oc: oc.clone(),
                        index: start + offset,
                        attr: sub.key.clone(),
                    });
                }
            }
            None
        }
        SelectColumn::Entity {
            table,
            alias,
            columns,
        } => {
            let scope = alias.as_deref().unwrap_or(table);
            let scope_matches = match oc.table_name() {
                Some(t) => t == scope,
                // An unqualified column name is looked up on the entity.
                None => true,
            };
            if !scope_matches {
                return None;
            }
            for (offset, col) in columns.iter().enumerate() {
                if col.name == oc.name() {
                    if col.nullable {
                        warn_nullable(&col.name);
                    }
                    return Some(ResolvedKey::Attribute {
                        oc: oc.clone(),
                        index: start + offset,
                        attr: col.property.clone(),
                    });
                }
            }
            None
        }
        SelectColumn::Attribute {
            table,
            column,
            label,
            nullable,
        } => {
            if oc.table_name().as_deref() == Some(table.as_str()) && oc.name() == *column {
                if *nullable {
                    warn_nullable(column);
                }
                return Some(ResolvedKey::Direct {
                    oc: oc.clone(),
                    index: start,
                });
            }
            if label.as_deref() == Some(oc.quoted_full_name().as_str()) {
                return Some(ResolvedKey::Direct {
                    oc: oc.clone(),
                    index: start,
                });
            }
            None
        }
    }
}

/// Shared appended-alias state for one pagination call.
///
/// The same comparable expression resolves to one injected column even when
/// it appears in several ordering columns or several batched sub-requests.
#[derive(Debug, Default)]
pub(crate) struct AppendedAliases {
    by_comparable: HashMap<String, String>,
}

impl AppendedAliases {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn alias_for(&mut self, comparable: &str) -> String {
        self.by_comparable
            .entry(comparable.to_string())
            .or_insert_with(next_appended_alias)
            .clone()
    }
}

/// Resolve one ordering column against the query's selected columns.
///
/// Descriptors are tried in order; the first that can supply the value wins.
/// When none can, the fallback appends a synthetic column.
pub fn find_order_key(oc: &OrderColumn, columns: &[SelectColumn]) -> ResolvedKey {
    let mut aliases = AppendedAliases::new();
    find_order_key_with(oc, columns, &mut aliases)
}

pub(crate) fn find_order_key_with(
    oc: &OrderColumn,
    columns: &[SelectColumn],
    aliases: &mut AppendedAliases,
) -> ResolvedKey {
    let mut start = 0;
    for desc in columns {
        if let Some(found) = derive_order_key(oc, desc, start) {
            return found;
        }
        start += desc.width();
    }

    ResolvedKey::Appended {
        oc: oc.clone(),
        alias: aliases.alias_for(&oc.comparable_sql()),
    }
}

/// Resolve every ordering column of one pagination call, sharing appended
/// columns between ordering columns with the same comparable expression.
pub(crate) fn resolve_order_keys(
    ocols: &[OrderColumn],
    columns: &[SelectColumn],
    aliases: &mut AppendedAliases,
) -> Vec<ResolvedKey> {
    ocols
        .iter()
        .map(|oc| find_order_key_with(oc, columns, aliases))
        .collect()
}
