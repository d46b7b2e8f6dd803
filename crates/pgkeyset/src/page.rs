//! Page and paging metadata.
//!
//! [`Paging`] describes how one fetched page relates to the whole resultset:
//! the places immediately before it, at its first and last rows, and beyond
//! it, from which every next/previous/current marker and bookmark is derived.
//! [`Page`] couples the trimmed rows with that metadata.

use std::ops::Deref;
use std::sync::Arc;

use tokio_postgres::Row;

use crate::codec::BookmarkCodec;
use crate::error::{PageError, PageResult};
use crate::marker::{Keyset, Marker};
use crate::row::FromRow;

/// Metadata describing the position of a page in a collection.
///
/// Most accessors return a page [`Marker`]; the `bookmark_*` twins return the
/// serialized form. Acquire one through [`crate::Paginator::get_page`] rather
/// than constructing it directly.
#[derive(Debug, Clone)]
pub struct Paging {
    per_page: usize,
    backwards: bool,
    row_count: usize,
    before: Option<Keyset>,
    first: Option<Keyset>,
    last: Option<Keyset>,
    beyond: Option<Keyset>,
    places: Vec<Keyset>,
    codec: Arc<BookmarkCodec>,
}

impl Paging {
    /// Whether there are more rows after this page, in the original
    /// (forward) query order.
    pub fn has_next(&self) -> bool {
        self.beyond.is_some()
    }

    /// Whether there are more rows before this page, in the original
    /// (forward) query order.
    pub fn has_previous(&self) -> bool {
        self.before.is_some()
    }

    /// Marker for the next page (in the original query order).
    pub fn next(&self) -> Marker {
        Marker::new(self.last.clone().or_else(|| self.before.clone()), false)
    }

    /// Marker for the previous page (in the original query order).
    pub fn previous(&self) -> Marker {
        Marker::new(self.first.clone().or_else(|| self.beyond.clone()), true)
    }

    /// Marker for the current page in forwards direction.
    pub fn current_forwards(&self) -> Marker {
        Marker::new(self.before.clone(), false)
    }

    /// Marker for the current page in backwards direction.
    pub fn current_backwards(&self) -> Marker {
        Marker::new(self.beyond.clone(), true)
    }

    /// Marker for the current page in the current paging direction.
    pub fn current(&self) -> Marker {
        if self.backwards {
            self.current_backwards()
        } else {
            self.current_forwards()
        }
    }

    /// Marker for the current page in the opposite of the current paging
    /// direction.
    pub fn current_opposite(&self) -> Marker {
        if self.backwards {
            self.current_forwards()
        } else {
            self.current_backwards()
        }
    }

    /// Marker for the following page in the current paging direction.
    pub fn further(&self) -> Marker {
        if self.backwards {
            self.previous()
        } else {
            self.next()
        }
    }

    /// Whether there are more rows past this page in the current paging
    /// direction.
    pub fn has_further(&self) -> bool {
        if self.backwards {
            self.has_previous()
        } else {
            self.has_next()
        }
    }

    /// Whether this page contains as many rows as were requested.
    pub fn is_full(&self) -> bool {
        self.row_count == self.per_page
    }

    /// The paging direction this page was fetched in.
    pub fn is_backwards(&self) -> bool {
        self.backwards
    }

    /// The requested page size.
    pub fn per_page(&self) -> usize {
        self.per_page
    }

    /// Marker for the row at the given index of this page.
    pub fn marker_at(&self, i: usize) -> Option<Marker> {
        self.places
            .get(i)
            .map(|p| Marker::new(Some(p.clone()), self.backwards))
    }

    /// Bookmark for the row at the given index of this page.
    pub fn bookmark_at(&self, i: usize) -> PageResult<String> {
        let marker = self
            .marker_at(i)
            .ok_or_else(|| PageError::invalid_page(format!("row index {i} out of range")))?;
        self.codec.serialize_marker(&marker)
    }

    /// Bookmark for the next page (in the original query order).
    pub fn bookmark_next(&self) -> PageResult<String> {
        self.codec.serialize_marker(&self.next())
    }

    /// Bookmark for the previous page (in the original query order).
    pub fn bookmark_previous(&self) -> PageResult<String> {
        self.codec.serialize_marker(&self.previous())
    }

    /// Bookmark for the current page in forwards direction.
    pub fn bookmark_current_forwards(&self) -> PageResult<String> {
        self.codec.serialize_marker(&self.current_forwards())
    }

    /// Bookmark for the current page in backwards direction.
    pub fn bookmark_current_backwards(&self) -> PageResult<String> {
        self.codec.serialize_marker(&self.current_backwards())
    }

    /// Bookmark for the current page in the current paging direction.
    pub fn bookmark_current(&self) -> PageResult<String> {
        self.codec.serialize_marker(&self.current())
    }

    /// Bookmark for the current page in the opposite paging direction.
    pub fn bookmark_current_opposite(&self) -> PageResult<String> {
        self.codec.serialize_marker(&self.current_opposite())
    }

    /// Bookmark for the following page in the current paging direction.
    pub fn bookmark_further(&self) -> PageResult<String> {
        self.codec.serialize_marker(&self.further())
    }
}

/// A list of result rows with access to paging information.
///
/// Generic over the row type: the paginator produces
/// `Page<tokio_postgres::Row>`, while callers mapping to their own structs
/// (or tests) can carry anything.
#[derive(Debug, Clone)]
pub struct Page<R> {
    rows: Vec<R>,
    keys: Vec<String>,
    /// How this page relates to the whole resultset.
    pub paging: Paging,
}

impl<R> Page<R> {
    /// Assemble a page from fetched rows (possibly one more than
    /// `per_page`), the parallel per-row keysets, and the marker place that
    /// was used to reach it.
    ///
    /// Unless you are extending pgkeyset you should not be calling this
    /// directly — use [`crate::Paginator::get_page`] and read `page.paging`.
    pub fn build(
        mut rows: Vec<R>,
        per_page: usize,
        backwards: bool,
        current_place: Option<Keyset>,
        mut places: Vec<Keyset>,
        keys: Vec<String>,
        codec: Arc<BookmarkCodec>,
    ) -> PageResult<Self> {
        if rows.len() != places.len() {
            return Err(PageError::invalid_page(
                "fetched rows and keysets are not parallel",
            ));
        }

        let has_excess = rows.len() > per_page;
        rows.truncate(per_page);

        let place_0 = current_place;
        let (place_1, place_n) = if rows.is_empty() {
            (None, None)
        } else {
            (
                Some(places[0].clone()),
                Some(places[rows.len() - 1].clone()),
            )
        };
        let place_nplus1 = if has_excess {
            Some(places[rows.len()].clone())
        } else {
            None
        };

        // Trim the places list to align with the rows list, so per-row
        // markers stay correct after the backwards reversal.
        places.truncate(per_page);

        let mut four = [place_0, place_1, place_n, place_nplus1];
        if backwards {
            rows.reverse();
            places.reverse();
            four.reverse();
        }
        let [before, first, last, beyond] = four;

        Ok(Self {
            keys,
            paging: Paging {
                per_page,
                backwards,
                row_count: rows.len(),
                before,
                first,
                last,
                beyond,
                places,
                codec,
            },
            rows,
        })
    }

    /// The rows of this page, in natural forward display order.
    pub fn rows(&self) -> &[R] {
        &self.rows
    }

    /// Consume the page, returning its rows.
    pub fn into_rows(self) -> Vec<R> {
        self.rows
    }

    /// The output column names of the caller's query. Synthetic ordering
    /// columns are excluded.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// The single row of this page.
    ///
    /// Fails unless the page holds exactly one row.
    pub fn one(&self) -> PageResult<&R> {
        match self.rows.len() {
            0 => Err(PageError::NoRows(
                "tried to select one but zero rows returned".to_string(),
            )),
            1 => Ok(&self.rows[0]),
            got => Err(PageError::TooManyRows { expected: 1, got }),
        }
    }

    /// Iterate over `(marker, row)` pairs.
    pub fn items(&self) -> impl Iterator<Item = (Marker, &R)> {
        self.rows
            .iter()
            .enumerate()
            .map(|(i, row)| (self.paging.marker_at(i).expect("places align with rows"), row))
    }

    /// Collect `(bookmark, row)` pairs.
    pub fn bookmark_items(&self) -> PageResult<Vec<(String, &R)>> {
        self.rows
            .iter()
            .enumerate()
            .map(|(i, row)| Ok((self.paging.bookmark_at(i)?, row)))
            .collect()
    }
}

impl Page<Row> {
    /// Assuming a single-column query paged with `per_page = 1`, return the
    /// single value.
    pub fn scalar<'a, T>(&'a self) -> PageResult<T>
    where
        T: tokio_postgres::types::FromSql<'a>,
    {
        let row = self.one()?;
        row.try_get(0)
            .map_err(|e| PageError::decode("0", e.to_string()))
    }

    /// Map every row of this page to a caller struct by column name.
    pub fn rows_as<T: FromRow>(&self) -> PageResult<Vec<T>> {
        self.rows.iter().map(T::from_row).collect()
    }
}

impl<R> Deref for Page<R> {
    type Target = [R];

    fn deref(&self) -> &Self::Target {
        &self.rows
    }
}

impl<R> IntoIterator for Page<R> {
    type Item = R;
    type IntoIter = std::vec::IntoIter<R>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a, R> IntoIterator for &'a Page<R> {
    type Item = &'a R;
    type IntoIter = std::slice::Iter<'a, R>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}
