//! Compile-only tests for core API patterns.
//!
//! These tests verify that key API surfaces compile correctly.
//! They do NOT execute against a database — they only check types and
//! signatures.

#![allow(dead_code)]

use pgkeyset::prelude::*;
use pgkeyset::{BundleColumn, PageResult};

// ── Row mapping ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct User {
    id: i64,
    name: String,
    email: Option<String>,
}

impl FromRow for User {
    fn from_row(row: &tokio_postgres::Row) -> PageResult<Self> {
        Ok(Self {
            id: row.try_get_column("id")?,
            name: row.try_get_column("name")?,
            email: row.try_get_column("email")?,
        })
    }
}

// ── Paging calls compile against clients, transactions, and pools ────────────

async fn page_with_any_client<C: GenericClient>(conn: &C) -> PageResult<Vec<User>> {
    let paginator = Paginator::new();
    let query = SelectQuery::new("users")
        .column("id")
        .column("name")
        .nullable_column("email")
        .eq("status", "active")
        .order_by("created_at DESC, id DESC");

    let page = paginator
        .get_page(conn, &query, &PageOptions::new(20))
        .await?;

    let _keys: &[String] = page.keys();
    let _bookmark: String = page.paging.bookmark_next()?;
    let _has_more: bool = page.paging.has_further();
    page.rows_as::<User>()
}

async fn page_within_transaction(tx: &tokio_postgres::Transaction<'_>) -> PageResult<()> {
    let paginator = Paginator::new();
    let query = SelectQuery::new("events").column("id").order_by("id");
    let _page = paginator
        .get_page(tx, &query, &PageOptions::new(1))
        .await?;
    Ok(())
}

async fn batched_pages<C: GenericClient>(conn: &C) -> PageResult<()> {
    let paginator = Paginator::new();
    let base = SelectQuery::new("posts")
        .column("id")
        .column("title")
        .order_by("published_at DESC, id DESC");

    let requests = vec![
        (base.clone().eq("author_id", 1_i64), PageOptions::new(5)),
        (base.clone().eq("author_id", 2_i64), PageOptions::new(5)),
    ];
    let pages = paginator.get_homogeneous_pages(conn, &requests).await?;
    for page in &pages {
        let _ = page.paging.bookmark_further()?;
    }
    Ok(())
}

// ── Descriptor construction ──────────────────────────────────────────────────

fn descriptor_surface() -> SelectQuery {
    SelectQuery::new("users u")
        .select_column(SelectColumn::entity_aliased(
            "users",
            "u",
            vec![
                EntityColumn::new("id"),
                EntityColumn::new("created_at").property("created"),
                EntityColumn::new("email").nullable(),
            ],
        ))
        .select_column(SelectColumn::bundle(
            "stats",
            vec![BundleColumn::new("total", "count(*) OVER ()")],
        ))
        .select_column(SelectColumn::attribute("users", "name"))
        .order_by("u.created_at DESC")
}

// ── Codec configuration ──────────────────────────────────────────────────────

fn configured_paginator() -> PageResult<Paginator> {
    let mut codec = BookmarkCodec::new().encoding(BookmarkEncoding::Base64);
    codec.register_type(
        CustomType::new("m", "mood")
            .cast("mood")
            .with_serializer(|s| Ok(s.to_string()))
            .with_deserializer(|s| Ok(s.to_string())),
    )?;
    Ok(Paginator::with_codec(codec).comparison(TupleComparison::Expanded))
}

// ── Marker construction from caller-held values ──────────────────────────────

fn explicit_markers() -> (PageOptions, PageOptions, PageOptions) {
    let after = PageOptions::new(10).after(vec![KeyValue::Int(7), KeyValue::Text("x".into())]);
    let before = PageOptions::new(10).before(vec![KeyValue::Null]);
    let resumed = PageOptions::new(10).marker(Marker::end());
    (after, before, resumed)
}

#[test]
fn configured_surfaces_construct() {
    let paginator = configured_paginator().unwrap();
    let marker = Marker::new(Some(vec![KeyValue::Int(1)]), false);
    let bookmark = paginator.serialize_bookmark(&marker).unwrap();
    assert_eq!(paginator.unserialize_bookmark(&bookmark).unwrap(), marker);

    let (after, before, resumed) = explicit_markers();
    assert_eq!(after.per_page(), 10);
    assert_eq!(before.per_page(), 10);
    assert_eq!(resumed.per_page(), 10);

    let query = descriptor_surface();
    assert!(query.to_sql().is_ok());
}
