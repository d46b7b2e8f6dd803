//! Convenience re-exports for common usage.
//!
//! ```ignore
//! use pgkeyset::prelude::*;
//! ```

pub use crate::client::GenericClient;
pub use crate::codec::{BookmarkCodec, BookmarkEncoding, CustomType, KeyValue};
pub use crate::compare::TupleComparison;
pub use crate::error::{PageError, PageResult};
pub use crate::marker::{Keyset, Marker};
pub use crate::order::{OrderColumn, SortDir};
pub use crate::page::{Page, Paging};
pub use crate::paging::{PageOptions, Paginator};
pub use crate::row::{FromRow, RowExt};
pub use crate::select::{EntityColumn, KeysetQuery, SelectColumn, SelectQuery};
pub use crate::sql::{Sql, sql};
