//! Pagination orchestrator.
//!
//! [`Paginator`] owns the bookmark codec and drives the per-call pipeline:
//! validate the paging arguments, rewrite the query's ORDER BY, inject the
//! synthetic columns order-key resolution asks for, apply the boundary
//! predicate and a `limit + 1` cutoff, execute once, and fold the fetched
//! rows into a [`Page`] with its [`crate::Paging`] metadata.

use std::collections::HashSet;
use std::sync::Arc;

use tokio_postgres::Row;

use crate::client::GenericClient;
use crate::codec::BookmarkCodec;
use crate::compare::{TupleComparison, page_filter};
use crate::error::{PageError, PageResult};
use crate::marker::{Keyset, Marker};
use crate::order::OrderColumn;
use crate::page::Page;
use crate::resolve::{AppendedAliases, ResolvedKey, resolve_order_keys};
use crate::select::{ExtraColumn, KeysetQuery, output_names};
use crate::sql::Sql;

const REQ_ALIAS: &str = "_pgkeyset_req";
const RN_ALIAS: &str = "_pgkeyset_rn";

/// Arguments for one page fetch.
///
/// At most one of `bookmark`, `marker`, `after`, `before` may be given;
/// giving none means "first page, forward".
#[derive(Debug, Clone, Default)]
pub struct PageOptions {
    per_page: usize,
    bookmark: Option<String>,
    marker: Option<Marker>,
    after: Option<Keyset>,
    before: Option<Keyset>,
}

impl PageOptions {
    /// Request pages of `per_page` rows.
    pub fn new(per_page: usize) -> Self {
        Self {
            per_page,
            ..Self::default()
        }
    }

    /// Start from a serialized bookmark string.
    pub fn bookmark(mut self, bookmark: impl Into<String>) -> Self {
        self.bookmark = Some(bookmark.into());
        self
    }

    /// Start from an explicit page marker.
    pub fn marker(mut self, marker: Marker) -> Self {
        self.marker = Some(marker);
        self
    }

    /// Fetch the page after this keyset (forward).
    pub fn after(mut self, keyset: Keyset) -> Self {
        self.after = Some(keyset);
        self
    }

    /// Fetch the page before this keyset (backward).
    pub fn before(mut self, keyset: Keyset) -> Self {
        self.before = Some(keyset);
        self
    }

    /// The requested page size.
    pub fn per_page(&self) -> usize {
        self.per_page
    }

    fn resolve_marker(&self, codec: &BookmarkCodec) -> PageResult<Marker> {
        let given = [
            self.bookmark.is_some(),
            self.marker.is_some(),
            self.after.is_some(),
            self.before.is_some(),
        ]
        .iter()
        .filter(|g| **g)
        .count();
        if given > 1 {
            return Err(PageError::invalid_page(
                "page, after and before are mutually exclusive",
            ));
        }

        if let Some(bookmark) = &self.bookmark {
            return codec.unserialize_marker(bookmark);
        }
        if let Some(marker) = &self.marker {
            return Ok(marker.clone());
        }
        if let Some(after) = &self.after {
            return Ok(Marker::new(Some(after.clone()), false));
        }
        if let Some(before) = &self.before {
            return Ok(Marker::new(Some(before.clone()), true));
        }
        Ok(Marker::start())
    }
}

/// One resolved page request, ready to be rewritten into a statement.
struct ResolvedRequest {
    marker: Marker,
    ocols: Vec<OrderColumn>,
    keys: Vec<ResolvedKey>,
    per_page: usize,
}

/// The top-level pagination entry point.
///
/// Owns the [`BookmarkCodec`] (register custom types on the codec before
/// constructing the paginator) and the tuple-comparison strategy. One
/// `Paginator` serves any number of concurrent calls; it holds no per-call
/// state.
#[derive(Debug, Clone, Default)]
pub struct Paginator {
    codec: Arc<BookmarkCodec>,
    comparison: TupleComparison,
}

impl Paginator {
    /// A paginator with the built-in bookmark types and native tuple
    /// comparison.
    pub fn new() -> Self {
        Self::default()
    }

    /// A paginator over a configured codec.
    pub fn with_codec(codec: BookmarkCodec) -> Self {
        Self {
            codec: Arc::new(codec),
            comparison: TupleComparison::default(),
        }
    }

    /// Choose the boundary-predicate strategy.
    pub fn comparison(mut self, comparison: TupleComparison) -> Self {
        self.comparison = comparison;
        self
    }

    /// The codec bookmarks are rendered with.
    pub fn codec(&self) -> &Arc<BookmarkCodec> {
        &self.codec
    }

    /// Serialize a place marker to a bookmark string.
    pub fn serialize_bookmark(&self, marker: &Marker) -> PageResult<String> {
        self.codec.serialize_marker(marker)
    }

    /// Parse a bookmark string back to a place marker.
    pub fn unserialize_bookmark(&self, bookmark: &str) -> PageResult<Marker> {
        self.codec.unserialize_marker(bookmark)
    }

    /// Fetch one page of `query` in a single database round trip.
    pub async fn get_page<C, Q>(
        &self,
        conn: &C,
        query: &Q,
        options: &PageOptions,
    ) -> PageResult<Page<Row>>
    where
        C: GenericClient,
        Q: KeysetQuery,
    {
        let marker = options.resolve_marker(&self.codec)?;
        let mut aliases = AppendedAliases::new();
        let resolved = self.resolve_request(query, options.per_page, marker, &mut aliases)?;

        let mut rewritten = query.clone();
        let extras = distinct_extras(&resolved.keys);
        self.apply_rewrite(&mut rewritten, &resolved, &extras)?;

        let stmt = rewritten.build()?;
        let rows = conn.query(&stmt.to_sql(), &stmt.params_ref()).await?;

        self.build_page(query, resolved, rows)
    }

    /// Fetch N independent pages with identical output column shapes in one
    /// round trip.
    ///
    /// Each request becomes a parenthesized sub-select tagged with its
    /// request index and a window row number, combined with `UNION ALL`;
    /// synthetic ordering columns are shared across requests by structural
    /// identity.
    pub async fn get_homogeneous_pages<C, Q>(
        &self,
        conn: &C,
        requests: &[(Q, PageOptions)],
    ) -> PageResult<Vec<Page<Row>>>
    where
        C: GenericClient,
        Q: KeysetQuery,
    {
        if requests.is_empty() {
            return Ok(Vec::new());
        }

        let shape = output_names(requests[0].0.select_columns());
        for (query, _) in &requests[1..] {
            if output_names(query.select_columns()) != shape {
                return Err(PageError::invalid_page(
                    "homogeneous page requests must share an identical output column shape",
                ));
            }
        }

        // Resolve every request first so appended columns with the same
        // expression collapse onto one shared alias.
        let mut aliases = AppendedAliases::new();
        let mut resolved = Vec::with_capacity(requests.len());
        for (query, options) in requests {
            let marker = options.resolve_marker(&self.codec)?;
            resolved.push(self.resolve_request(query, options.per_page, marker, &mut aliases)?);
        }

        let shared_extras = distinct_extras(resolved.iter().flat_map(|r| &r.keys));

        let mut combined = Sql::empty();
        for (i, ((query, _), request)) in requests.iter().zip(&resolved).enumerate() {
            let mut sub = query.clone();
            self.apply_rewrite(&mut sub, request, &shared_extras)?;
            sub.add_output_columns(&[
                ExtraColumn::new(i.to_string(), REQ_ALIAS),
                ExtraColumn::new(window_row_number(&request.ocols), RN_ALIAS),
            ]);

            if i > 0 {
                combined.push(" UNION ALL ");
            }
            combined.push("(");
            combined.push_sql(sub.build()?);
            combined.push(")");
        }

        let rows = conn.query(&combined.to_sql(), &combined.params_ref()).await?;

        // Redistribute by request tag, restoring each sub-query's own order.
        let mut buckets: Vec<Vec<(i64, Row)>> = (0..requests.len()).map(|_| Vec::new()).collect();
        for row in rows {
            let req: i32 = row
                .try_get(REQ_ALIAS)
                .map_err(|e| PageError::decode(REQ_ALIAS, e.to_string()))?;
            let rn: i64 = row
                .try_get(RN_ALIAS)
                .map_err(|e| PageError::decode(RN_ALIAS, e.to_string()))?;
            let bucket = buckets.get_mut(req as usize).ok_or_else(|| {
                PageError::decode(REQ_ALIAS, format!("unexpected request index {req}"))
            })?;
            bucket.push((rn, row));
        }

        let mut pages = Vec::with_capacity(requests.len());
        for (((query, _), request), mut bucket) in
            requests.iter().zip(resolved).zip(buckets)
        {
            bucket.sort_by_key(|(rn, _)| *rn);
            let rows: Vec<Row> = bucket.into_iter().map(|(_, row)| row).collect();
            pages.push(self.build_page(query, request, rows)?);
        }
        Ok(pages)
    }

    /// Steps 1–3 of the pipeline: validate, parse the ordering, resolve
    /// every ordering column against the selected columns.
    fn resolve_request<Q: KeysetQuery>(
        &self,
        query: &Q,
        per_page: usize,
        marker: Marker,
        aliases: &mut AppendedAliases,
    ) -> PageResult<ResolvedRequest> {
        if per_page < 1 {
            return Err(PageError::invalid_page(format!(
                "per_page must be >= 1, got {per_page}"
            )));
        }

        let mut ocols = query.order_by_columns()?;
        if ocols.is_empty() {
            return Err(PageError::invalid_page(
                "query must have an ORDER BY clause to paginate",
            ));
        }
        if marker.is_backwards() {
            ocols = ocols.iter().map(OrderColumn::reversed).collect();
        }

        let keys = resolve_order_keys(&ocols, query.select_columns(), aliases);

        Ok(ResolvedRequest {
            marker,
            ocols,
            keys,
            per_page,
        })
    }

    /// Step 4: rewrite the query — new ORDER BY, injected columns, boundary
    /// predicate (WHERE, or HAVING for aggregating queries), `limit + 1`.
    fn apply_rewrite<Q: KeysetQuery>(
        &self,
        query: &mut Q,
        request: &ResolvedRequest,
        extras: &[ExtraColumn],
    ) -> PageResult<()> {
        query.replace_order_by(request.keys.iter().map(ResolvedKey::order_clause_sql).collect());
        query.add_output_columns(extras);

        if let Some(place) = request.marker.place() {
            let condition = page_filter(&request.ocols, place, self.comparison, &self.codec)?;
            if query.has_group_by() {
                query.add_having(condition);
            } else {
                query.add_filter(condition);
            }
        }

        query.set_limit(request.per_page as i64 + 1);
        Ok(())
    }

    /// Steps 6–7: project each fetched row into its keyset and assemble the
    /// page.
    fn build_page<Q: KeysetQuery>(
        &self,
        query: &Q,
        request: ResolvedRequest,
        rows: Vec<Row>,
    ) -> PageResult<Page<Row>> {
        let places = rows
            .iter()
            .map(|row| {
                request
                    .keys
                    .iter()
                    .map(|key| key.get_from_row(&self.codec, row))
                    .collect::<PageResult<Keyset>>()
            })
            .collect::<PageResult<Vec<Keyset>>>()?;

        let keys = output_names(query.select_columns());
        Page::build(
            rows,
            request.per_page,
            request.marker.is_backwards(),
            request.marker.into_place(),
            places,
            keys,
            self.codec.clone(),
        )
    }
}

/// The distinct synthetic columns a set of resolved keys needs, in
/// first-seen order.
fn distinct_extras<'a>(keys: impl IntoIterator<Item = &'a ResolvedKey>) -> Vec<ExtraColumn> {
    let mut seen = HashSet::new();
    let mut extras = Vec::new();
    for key in keys {
        if let Some(extra) = key.extra_column() {
            if seen.insert(extra.alias.clone()) {
                extras.push(extra);
            }
        }
    }
    extras
}

/// A window ORDER BY mirroring the request's own ordering.
///
/// Window clauses cannot reference select-list aliases, so appended columns
/// appear here as their underlying expressions.
fn window_row_number(ocols: &[OrderColumn]) -> String {
    let items: Vec<String> = ocols
        .iter()
        .map(|oc| format!("{} {}", oc.comparable_sql(), oc.dir().to_sql()))
        .collect();
    format!("row_number() OVER (ORDER BY {})", items.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::KeyValue;
    use crate::select::SelectQuery;

    fn paginator() -> Paginator {
        Paginator::new()
    }

    fn users_query() -> SelectQuery {
        SelectQuery::new("users")
            .column("id")
            .column("name")
            .order_by("id")
    }

    fn rewrite_sql(
        p: &Paginator,
        query: &SelectQuery,
        options: &PageOptions,
    ) -> PageResult<String> {
        let marker = options.resolve_marker(p.codec())?;
        let mut aliases = AppendedAliases::new();
        let resolved = p.resolve_request(query, options.per_page, marker, &mut aliases)?;
        let mut rewritten = query.clone();
        let extras = distinct_extras(&resolved.keys);
        p.apply_rewrite(&mut rewritten, &resolved, &extras)?;
        Ok(rewritten.build()?.to_sql())
    }

    #[test]
    fn first_page_rewrites_order_and_limit() {
        let sql = rewrite_sql(&paginator(), &users_query(), &PageOptions::new(10)).unwrap();
        assert_eq!(sql, "SELECT id, name FROM users ORDER BY id ASC LIMIT $1");
    }

    #[test]
    fn after_marker_applies_boundary_predicate() {
        let options = PageOptions::new(10).after(vec![KeyValue::Int(7)]);
        let sql = rewrite_sql(&paginator(), &users_query(), &options).unwrap();
        assert_eq!(
            sql,
            "SELECT id, name FROM users WHERE id > $1 ORDER BY id ASC LIMIT $2"
        );
    }

    #[test]
    fn backwards_marker_reverses_ordering_and_swaps_operands() {
        let options = PageOptions::new(10).before(vec![KeyValue::Int(7)]);
        let sql = rewrite_sql(&paginator(), &users_query(), &options).unwrap();
        assert_eq!(
            sql,
            "SELECT id, name FROM users WHERE $1 > id ORDER BY id DESC LIMIT $2"
        );
    }

    #[test]
    fn multi_column_marker_uses_tuple_comparison() {
        let query = SelectQuery::new("users")
            .column("id")
            .column("name")
            .order_by("name DESC, id");
        let options = PageOptions::new(5).after(vec![
            KeyValue::Text("bob".into()),
            KeyValue::Int(3),
        ]);
        let sql = rewrite_sql(&paginator(), &query, &options).unwrap();
        assert_eq!(
            sql,
            "SELECT id, name FROM users WHERE ($1, id) > (name, $2) \
             ORDER BY name DESC, id ASC LIMIT $3"
        );
    }

    #[test]
    fn expanded_comparison_is_available() {
        let p = paginator().comparison(TupleComparison::Expanded);
        let query = SelectQuery::new("users")
            .column("a")
            .column("b")
            .order_by("a, b");
        let options = PageOptions::new(5).after(vec![KeyValue::Int(1), KeyValue::Int(2)]);
        let sql = rewrite_sql(&p, &query, &options).unwrap();
        assert_eq!(
            sql,
            "SELECT a, b FROM users WHERE (a > $1 OR (a = $2 AND b > $3)) \
             ORDER BY a ASC, b ASC LIMIT $4"
        );
    }

    #[test]
    fn aggregating_query_routes_predicate_to_having() {
        let query = SelectQuery::new("orders")
            .column("user_id")
            .column_as("count(*)", "order_count")
            .group_by("user_id")
            .order_by("user_id");
        let options = PageOptions::new(10).after(vec![KeyValue::Int(42)]);
        let sql = rewrite_sql(&paginator(), &query, &options).unwrap();
        assert_eq!(
            sql,
            "SELECT user_id, count(*) AS order_count FROM orders GROUP BY user_id \
             HAVING user_id > $1 ORDER BY user_id ASC LIMIT $2"
        );
    }

    #[test]
    fn unretrievable_ordering_value_injects_one_extra_column() {
        let query = SelectQuery::new("users")
            .column("id")
            .order_by("lower(email) DESC, lower(email)");
        let p = paginator();
        let marker = PageOptions::new(10).resolve_marker(p.codec()).unwrap();
        let mut aliases = AppendedAliases::new();
        let resolved = p.resolve_request(&query, 10, marker, &mut aliases).unwrap();
        let extras = distinct_extras(&resolved.keys);
        assert_eq!(extras.len(), 1);
        let alias = &extras[0].alias;

        let mut rewritten = query.clone();
        p.apply_rewrite(&mut rewritten, &resolved, &extras).unwrap();
        assert_eq!(
            rewritten.build().unwrap().to_sql(),
            format!(
                "SELECT id, lower(email) AS {alias} FROM users \
                 ORDER BY {alias} DESC, {alias} ASC LIMIT $1"
            )
        );
    }

    #[test]
    fn conflicting_arguments_fail() {
        let p = paginator();
        let both = PageOptions::new(10)
            .after(vec![KeyValue::Int(1)])
            .before(vec![KeyValue::Int(2)]);
        assert!(both.resolve_marker(p.codec()).unwrap_err().is_invalid_page());

        let page_and_after = PageOptions::new(10)
            .bookmark(">i:1")
            .after(vec![KeyValue::Int(1)]);
        assert!(
            page_and_after
                .resolve_marker(p.codec())
                .unwrap_err()
                .is_invalid_page()
        );
    }

    #[test]
    fn bookmark_argument_is_decoded() {
        let p = paginator();
        let options = PageOptions::new(10).bookmark("<i:3~s:bob");
        let marker = options.resolve_marker(p.codec()).unwrap();
        assert!(marker.is_backwards());
        assert_eq!(
            marker.place().unwrap(),
            &vec![KeyValue::Int(3), KeyValue::Text("bob".into())]
        );
    }

    #[test]
    fn marker_arity_mismatch_fails() {
        let options = PageOptions::new(10).after(vec![KeyValue::Int(1), KeyValue::Int(2)]);
        let err = rewrite_sql(&paginator(), &users_query(), &options).unwrap_err();
        assert!(err.is_invalid_page());
    }

    #[test]
    fn per_page_must_be_positive() {
        let err = rewrite_sql(&paginator(), &users_query(), &PageOptions::new(0)).unwrap_err();
        assert!(err.is_invalid_page());
    }

    #[test]
    fn unordered_query_cannot_be_paginated() {
        let query = SelectQuery::new("users").column("id");
        let err = rewrite_sql(&paginator(), &query, &PageOptions::new(10)).unwrap_err();
        assert!(err.is_invalid_page());
    }

    #[test]
    fn bookmark_roundtrip_through_paginator() {
        let p = paginator();
        for marker in [
            Marker::start(),
            Marker::end(),
            Marker::new(Some(vec![KeyValue::Int(3), KeyValue::Null]), false),
            Marker::new(Some(vec![KeyValue::Text("a~b".into())]), true),
        ] {
            let bookmark = p.serialize_bookmark(&marker).unwrap();
            assert_eq!(p.unserialize_bookmark(&bookmark).unwrap(), marker);
        }
    }

    // The shape check runs before any I/O, so a client that panics on use
    // is enough to drive the batched entry point.
    struct NeverClient;

    impl GenericClient for NeverClient {
        async fn query(
            &self,
            _sql: &str,
            _params: &[&(dyn tokio_postgres::types::ToSql + Sync)],
        ) -> PageResult<Vec<Row>> {
            panic!("unexpected query execution");
        }

        async fn execute(
            &self,
            _sql: &str,
            _params: &[&(dyn tokio_postgres::types::ToSql + Sync)],
        ) -> PageResult<u64> {
            panic!("unexpected statement execution");
        }
    }

    #[tokio::test]
    async fn homogeneous_requests_must_share_shape() {
        let a = SelectQuery::new("users").column("id").order_by("id");
        let b = SelectQuery::new("users").column("name").order_by("name");
        let requests = vec![(a, PageOptions::new(5)), (b, PageOptions::new(5))];

        let err = paginator()
            .get_homogeneous_pages(&NeverClient, &requests)
            .await
            .unwrap_err();
        assert!(err.is_invalid_page());
    }

    #[tokio::test]
    async fn empty_batch_is_no_round_trip() {
        let pages = paginator()
            .get_homogeneous_pages::<NeverClient, SelectQuery>(&NeverClient, &[])
            .await
            .unwrap();
        assert!(pages.is_empty());
    }

    #[test]
    fn batched_subqueries_share_appended_columns_and_tags() {
        let p = paginator();
        let base = SelectQuery::new("users").column("id");
        let forward = base.clone().order_by("lower(email)");
        let backward = base.clone().order_by("lower(email) DESC");

        let mut aliases = AppendedAliases::new();
        let first = p
            .resolve_request(&forward, 3, Marker::start(), &mut aliases)
            .unwrap();
        let second = p
            .resolve_request(&backward, 3, Marker::start(), &mut aliases)
            .unwrap();

        let shared = distinct_extras(first.keys.iter().chain(&second.keys));
        assert_eq!(shared.len(), 1);
        let alias = &shared[0].alias;

        let mut sub = forward.clone();
        p.apply_rewrite(&mut sub, &first, &shared).unwrap();
        sub.add_output_columns(&[
            ExtraColumn::new("0".to_string(), REQ_ALIAS),
            ExtraColumn::new(window_row_number(&first.ocols), RN_ALIAS),
        ]);
        assert_eq!(
            sub.build().unwrap().to_sql(),
            format!(
                "SELECT id, lower(email) AS {alias}, 0 AS {REQ_ALIAS}, \
                 row_number() OVER (ORDER BY lower(email) ASC) AS {RN_ALIAS} \
                 FROM users ORDER BY {alias} ASC LIMIT $1"
            )
        );

        // The opposite-direction request reuses the same injected column.
        let mut sub2 = backward.clone();
        p.apply_rewrite(&mut sub2, &second, &shared).unwrap();
        let sql2 = sub2.build().unwrap().to_sql();
        assert!(sql2.contains(&format!("lower(email) AS {alias}")));
        assert!(sql2.contains(&format!("ORDER BY {alias} DESC")));
    }
}
