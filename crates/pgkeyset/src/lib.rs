//! # pgkeyset
//!
//! Keyset ("seek method") pagination for PostgreSQL.
//!
//! ## Features
//!
//! - **Arbitrary ORDER BY**: multi-column orderings with per-column
//!   ASC/DESC, expressions, and result labels
//! - **Opaque bookmarks**: typed, reversible, single-line bookmark strings
//!   (`>i:3~s:bob`), optionally base64-wrapped for URL transport
//! - **Stable under writes**: pages are bounded by row values, not offsets,
//!   so inserts and deletes between fetches never duplicate or skip rows
//! - **One round trip per page**: a `limit + 1` cutoff detects further pages
//!   without a second query; a batched variant fetches N pages in one trip
//! - **Host-agnostic core**: the paginator consumes a small [`KeysetQuery`]
//!   capability trait; [`SelectQuery`] is the built-in implementation
//! - **Transaction-friendly**: pass a transaction anywhere a
//!   [`GenericClient`] is expected; the caller owns the connection
//!
//! ## Usage
//!
//! ```ignore
//! use pgkeyset::{PageOptions, Paginator, SelectQuery};
//!
//! let paginator = Paginator::new();
//! let query = SelectQuery::new("users")
//!     .column("id")
//!     .column("name")
//!     .eq("status", "active")
//!     .order_by("created_at DESC, id DESC");
//!
//! // First page.
//! let page = paginator
//!     .get_page(&client, &query, &PageOptions::new(20))
//!     .await?;
//!
//! // Hand the bookmark to the client; fetch the next page with it later.
//! let bookmark = page.paging.bookmark_next()?;
//! let next = paginator
//!     .get_page(&client, &query, &PageOptions::new(20).bookmark(bookmark))
//!     .await?;
//! ```
//!
//! Ordering by nullable columns is not supported (rows with NULL keys would
//! be silently dropped by the boundary comparison) and draws a warning, as
//! does the `NULLS FIRST` / `NULLS LAST` modifier.

pub mod client;
pub mod codec;
pub mod compare;
pub mod error;
pub mod ident;
pub mod marker;
pub mod order;
pub mod page;
pub mod paging;
pub mod prelude;
pub mod resolve;
pub mod row;
pub mod select;
pub mod sql;

pub use client::GenericClient;
pub use codec::{BookmarkCodec, BookmarkEncoding, CustomType, KeyValue, escape, unescape};
pub use compare::{TupleComparison, page_filter};
pub use error::{PageError, PageResult};
pub use ident::{Ident, IntoIdent};
pub use marker::{Keyset, Marker};
pub use order::{OrderColumn, OrderExpr, SortDir};
pub use page::{Page, Paging};
pub use paging::{PageOptions, Paginator};
pub use resolve::{ResolvedKey, find_order_key};
pub use row::{FromRow, RowExt};
pub use select::{
    BundleColumn, EntityColumn, ExtraColumn, KeysetQuery, SelectColumn, SelectQuery, output_names,
};
pub use sql::{Sql, sql};

#[cfg(feature = "pool")]
pub mod pool;

#[cfg(feature = "pool")]
pub use pool::{create_pool, create_pool_with_config};
