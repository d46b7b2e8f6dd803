//! Error types for pgkeyset

use thiserror::Error;

/// Result type alias for pgkeyset operations
pub type PageResult<T> = Result<T, PageError>;

/// Error types for pagination operations
#[derive(Debug, Error)]
pub enum PageError {
    /// An invalid page marker (in tuple or bookmark form) or an invalid
    /// combination of paging arguments was provided.
    #[error("Invalid page: {0}")]
    InvalidPage(String),

    /// A bookmark string failed to parse.
    ///
    /// This is a refinement of [`PageError::InvalidPage`];
    /// [`PageError::is_invalid_page`] returns `true` for both.
    #[error("Bad bookmark: {0}")]
    BadBookmark(String),

    /// A row value was encountered whose Postgres type has no built-in or
    /// registered bookmark mapping.
    #[error("Unregistered type: {0}")]
    UnregisteredType(String),

    /// A registered custom serializer failed while rendering a bookmark.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Bookmark type configuration error (duplicate code or type).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Query execution error
    #[error("Query error: {0}")]
    Query(#[from] tokio_postgres::Error),

    /// Row decode/mapping error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// Zero rows where exactly one was required
    #[error("No rows: {0}")]
    NoRows(String),

    /// More rows than expected where exactly one was required
    #[error("Too many rows: expected {expected}, got {got}")]
    TooManyRows { expected: usize, got: usize },

    /// Pool error
    #[cfg(feature = "pool")]
    #[error("Pool error: {0}")]
    Pool(String),
}

impl PageError {
    /// Create an invalid-page error
    pub fn invalid_page(message: impl Into<String>) -> Self {
        Self::InvalidPage(message.into())
    }

    /// Create a bad-bookmark error
    pub fn bad_bookmark(message: impl Into<String>) -> Self {
        Self::BadBookmark(message.into())
    }

    /// Create an unregistered-type error
    pub fn unregistered_type(message: impl Into<String>) -> Self {
        Self::UnregisteredType(message.into())
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization(message.into())
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Check if this is an invalid-page error (including bad bookmarks)
    pub fn is_invalid_page(&self) -> bool {
        matches!(self, Self::InvalidPage(_) | Self::BadBookmark(_))
    }

    /// Check if this is a bad-bookmark error
    pub fn is_bad_bookmark(&self) -> bool {
        matches!(self, Self::BadBookmark(_))
    }

    /// Check if this is a configuration error
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

#[cfg(feature = "pool")]
impl From<deadpool_postgres::PoolError> for PageError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        Self::Pool(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_bookmark_is_invalid_page() {
        let err = PageError::bad_bookmark("unrecognized value q:1");
        assert!(err.is_invalid_page());
        assert!(err.is_bad_bookmark());
    }

    #[test]
    fn invalid_page_is_not_bad_bookmark() {
        let err = PageError::invalid_page("after and before are mutually exclusive");
        assert!(err.is_invalid_page());
        assert!(!err.is_bad_bookmark());
    }

    #[test]
    fn configuration_is_not_invalid_page() {
        let err = PageError::configuration("type code s is already in use");
        assert!(err.is_configuration());
        assert!(!err.is_invalid_page());
    }
}
