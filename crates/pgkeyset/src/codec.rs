//! Bookmark value (de)serialization.
//!
//! A bookmark is one line of text: a direction character followed by the
//! marker's values, each rendered as a short tagged token (`<code>:<payload>`,
//! or a bare keyword for null/true/false) and joined with a field delimiter.
//! [`BookmarkCodec`] owns the type registry that maps row values to tokens and
//! back; it is constructed explicitly and handed to the paginator, so there is
//! no process-wide mutable registry.

use std::collections::HashMap;
use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::{STANDARD as BASE64, URL_SAFE_NO_PAD as BASE64_URL};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use rust_decimal::Decimal;
use tokio_postgres::Row;
use tokio_postgres::types::{IsNull, ToSql, Type};
use uuid::Uuid;

use crate::error::{PageError, PageResult};
use crate::marker::Marker;

// Type codes. null/true/false serialize to bare keywords with no code.
const NONE: &str = "x";
const TRUE: &str = "true";
const FALSE: &str = "false";
const STRING: &str = "s";
const BINARY: &str = "b";
const INTEGER: &str = "i";
const FLOAT: &str = "f";
const DECIMAL: &str = "n";
const DATE: &str = "d";
const DATETIME: &str = "dt";
const TIME: &str = "t";
const UUID_CODE: &str = "uuid";

const BUILTIN_CODES: &[&str] = &[
    NONE, TRUE, FALSE, STRING, BINARY, INTEGER, FLOAT, DECIMAL, DATE, DATETIME, TIME, UUID_CODE,
];

const BUILTIN_PG_TYPES: &[&str] = &[
    "bool",
    "int2",
    "int4",
    "int8",
    "float4",
    "float8",
    "numeric",
    "text",
    "varchar",
    "bpchar",
    "name",
    "bytea",
    "date",
    "timestamp",
    "timestamptz",
    "time",
    "uuid",
];

const NAIVE_DATETIME_FMT: &str = "%Y-%m-%dT%H:%M:%S%.f";
const DATE_FMT: &str = "%Y-%m-%d";
const TIME_FMT: &str = "%H:%M:%S%.f";

/// One scalar component of a keyset.
///
/// A marker is a tuple of these, one per ordering column, kept as native
/// typed values until a bookmark string is explicitly requested.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(Decimal),
    Text(String),
    Bytes(Vec<u8>),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<FixedOffset>),
    Time(NaiveTime),
    Uuid(Uuid),
    /// A user-registered type: its registered code plus a string
    /// representation chosen by the registration.
    Custom { code: String, repr: String },
}

impl ToSql for KeyValue {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut bytes::BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            KeyValue::Null => Ok(IsNull::Yes),
            KeyValue::Bool(v) => v.to_sql(ty, out),
            // Keyset values always travel as i64/f64; narrow to the width the
            // statement's inferred parameter type expects.
            KeyValue::Int(v) => {
                if *ty == Type::INT2 {
                    (*v as i16).to_sql(ty, out)
                } else if *ty == Type::INT4 {
                    (*v as i32).to_sql(ty, out)
                } else if *ty == Type::FLOAT8 {
                    (*v as f64).to_sql(ty, out)
                } else if *ty == Type::NUMERIC {
                    Decimal::from(*v).to_sql(ty, out)
                } else {
                    v.to_sql(ty, out)
                }
            }
            KeyValue::Float(v) => {
                if *ty == Type::FLOAT4 {
                    (*v as f32).to_sql(ty, out)
                } else {
                    v.to_sql(ty, out)
                }
            }
            KeyValue::Decimal(v) => v.to_sql(ty, out),
            KeyValue::Text(v) => v.to_sql(ty, out),
            KeyValue::Bytes(v) => v.to_sql(ty, out),
            KeyValue::Date(v) => v.to_sql(ty, out),
            KeyValue::Timestamp(v) => v.to_sql(ty, out),
            KeyValue::TimestampTz(v) => v.to_sql(ty, out),
            KeyValue::Time(v) => v.to_sql(ty, out),
            KeyValue::Uuid(v) => v.to_sql(ty, out),
            KeyValue::Custom { repr, .. } => repr.to_sql(ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        // The concrete variant is only known at runtime; the statement's
        // parameter type drives the encoding in `to_sql`.
        true
    }

    tokio_postgres::types::to_sql_checked!();
}

/// Escape literal newlines so a serialized value stays on one line.
///
/// The transformation is its own exact inverse under [`unescape`], including
/// for inputs that already contain the escape sequence.
pub fn escape(x: &str) -> String {
    x.split('\n')
        .map(|part| part.replace("\\n", "\\\\n"))
        .collect::<Vec<_>>()
        .join("\\n")
}

/// Inverse of [`escape`].
pub fn unescape(x: &str) -> String {
    x.split("\\\\n")
        .map(|part| part.replace("\\n", "\n"))
        .collect::<Vec<_>>()
        .join("\\n")
}

type PayloadFn = Arc<dyn Fn(&str) -> PageResult<String> + Send + Sync>;
type ExtractFn = Arc<dyn Fn(&Row, usize) -> PageResult<String> + Send + Sync>;

/// Registration for a user-defined bookmark value type.
///
/// Ties a short alphabetic code to a Postgres type name, with optional hooks
/// for payload encoding, row extraction, and marker-side bind casting.
#[derive(Clone)]
pub struct CustomType {
    code: String,
    pg_type: String,
    cast: Option<String>,
    serialize: Option<PayloadFn>,
    deserialize: Option<PayloadFn>,
    extract: Option<ExtractFn>,
}

impl CustomType {
    /// Register `pg_type` values under the bookmark code `code`.
    pub fn new(code: impl Into<String>, pg_type: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            pg_type: pg_type.into(),
            cast: None,
            serialize: None,
            deserialize: None,
            extract: None,
        }
    }

    /// SQL cast applied to marker-side bind parameters of this type,
    /// e.g. `"mood"` renders `$1::mood` in boundary predicates.
    pub fn cast(mut self, pg_type: impl Into<String>) -> Self {
        self.cast = Some(pg_type.into());
        self
    }

    /// Map the value's string representation to the bookmark payload.
    /// Defaults to identity.
    pub fn with_serializer<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> PageResult<String> + Send + Sync + 'static,
    {
        self.serialize = Some(Arc::new(f));
        self
    }

    /// Inverse of the serializer. Defaults to identity.
    pub fn with_deserializer<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> PageResult<String> + Send + Sync + 'static,
    {
        self.deserialize = Some(Arc::new(f));
        self
    }

    /// Read the value's string representation off a result row.
    ///
    /// Defaults to fetching the column as text, which works for textual
    /// types; non-textual custom types (enums, domains over binary types)
    /// should supply their own extractor.
    pub fn with_extract<F>(mut self, f: F) -> Self
    where
        F: Fn(&Row, usize) -> PageResult<String> + Send + Sync + 'static,
    {
        self.extract = Some(Arc::new(f));
        self
    }
}

impl std::fmt::Debug for CustomType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomType")
            .field("code", &self.code)
            .field("pg_type", &self.pg_type)
            .field("cast", &self.cast)
            .finish()
    }
}

/// External representation of a bookmark string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BookmarkEncoding {
    /// The raw delimited line, e.g. `>i:3~s:abc`.
    #[default]
    Plain,
    /// The raw line wrapped in URL-safe base64. A codec produces and parses
    /// only its configured form.
    Base64,
}

/// Value registry plus bookmark line encoding.
///
/// Construct one, register any custom types before serving traffic, and hand
/// it to [`crate::Paginator`]. Registration is register-once: reusing a code
/// or a Postgres type is a [`PageError::Configuration`] error.
#[derive(Debug, Clone)]
pub struct BookmarkCodec {
    delimiter: char,
    escape_char: char,
    encoding: BookmarkEncoding,
    custom_by_code: HashMap<String, CustomType>,
    code_by_pg_type: HashMap<String, String>,
}

impl Default for BookmarkCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl BookmarkCodec {
    /// A codec with the built-in types and the default `~` delimiter,
    /// `\` escape character, and plain encoding.
    pub fn new() -> Self {
        Self {
            delimiter: '~',
            escape_char: '\\',
            encoding: BookmarkEncoding::Plain,
            custom_by_code: HashMap::new(),
            code_by_pg_type: HashMap::new(),
        }
    }

    /// Use a different field delimiter. The delimiter must not collide with
    /// the escape character.
    pub fn delimiter(mut self, delimiter: char) -> PageResult<Self> {
        if delimiter == self.escape_char || delimiter == '\n' {
            return Err(PageError::configuration(format!(
                "invalid bookmark delimiter {delimiter:?}"
            )));
        }
        self.delimiter = delimiter;
        Ok(self)
    }

    /// Choose the external bookmark representation.
    pub fn encoding(mut self, encoding: BookmarkEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Register a custom value type.
    ///
    /// Fails with [`PageError::Configuration`] if the code or the Postgres
    /// type is already registered (built-ins included).
    pub fn register_type(&mut self, custom: CustomType) -> PageResult<()> {
        if BUILTIN_CODES.contains(&custom.code.as_str())
            || self.custom_by_code.contains_key(&custom.code)
        {
            return Err(PageError::configuration(format!(
                "Type code {} is already in use.",
                custom.code
            )));
        }
        if custom.code.is_empty() || !custom.code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(PageError::configuration(format!(
                "Type code {} must be a short alphabetic string.",
                custom.code
            )));
        }
        if BUILTIN_PG_TYPES.contains(&custom.pg_type.as_str())
            || self.code_by_pg_type.contains_key(&custom.pg_type)
        {
            return Err(PageError::configuration(format!(
                "Type {} already has a serializer registered.",
                custom.pg_type
            )));
        }
        self.code_by_pg_type
            .insert(custom.pg_type.clone(), custom.code.clone());
        self.custom_by_code.insert(custom.code.clone(), custom);
        Ok(())
    }

    /// The SQL cast registered for a marker value, if any.
    pub(crate) fn cast_for(&self, value: &KeyValue) -> Option<&str> {
        match value {
            KeyValue::Custom { code, .. } => self
                .custom_by_code
                .get(code)
                .and_then(|c| c.cast.as_deref()),
            _ => None,
        }
    }

    // ==================== Single values ====================

    /// Serialize one value to its tagged token.
    pub fn serialize_value(&self, value: &KeyValue) -> PageResult<String> {
        let (code, payload) = match value {
            KeyValue::Null => return Ok(NONE.to_string()),
            KeyValue::Bool(true) => return Ok(TRUE.to_string()),
            KeyValue::Bool(false) => return Ok(FALSE.to_string()),
            KeyValue::Text(v) => (STRING, escape(v)),
            KeyValue::Bytes(v) => (BINARY, BASE64.encode(v)),
            KeyValue::Int(v) => (INTEGER, v.to_string()),
            KeyValue::Float(v) => (FLOAT, v.to_string()),
            KeyValue::Decimal(v) => (DECIMAL, v.to_string()),
            KeyValue::Date(v) => (DATE, v.format(DATE_FMT).to_string()),
            KeyValue::Timestamp(v) => (DATETIME, v.format(NAIVE_DATETIME_FMT).to_string()),
            KeyValue::TimestampTz(v) => (DATETIME, v.to_rfc3339()),
            KeyValue::Time(v) => {
                let payload = if v.nanosecond() == 0 {
                    v.format("%H:%M:%S").to_string()
                } else {
                    v.format(TIME_FMT).to_string()
                };
                (TIME, payload)
            }
            KeyValue::Uuid(v) => (UUID_CODE, v.to_string()),
            KeyValue::Custom { code, repr } => {
                let custom = self.custom_by_code.get(code).ok_or_else(|| {
                    PageError::unregistered_type(format!(
                        "Don't know how to serialize value of type code {code}. \
                         Use BookmarkCodec::register_type to register it."
                    ))
                })?;
                let payload = match &custom.serialize {
                    Some(f) => f(repr).map_err(|e| {
                        PageError::serialization(format!(
                            "Custom bookmark serializer encountered error: {e}"
                        ))
                    })?,
                    None => repr.clone(),
                };
                return Ok(format!("{code}:{payload}"));
            }
        };
        Ok(format!("{code}:{payload}"))
    }

    /// Parse one tagged token back into a value.
    pub fn unserialize_value(&self, token: &str) -> PageResult<KeyValue> {
        let Some((code, payload)) = token.split_once(':') else {
            // Must be a bare keyword.
            return match token {
                NONE => Ok(KeyValue::Null),
                TRUE => Ok(KeyValue::Bool(true)),
                FALSE => Ok(KeyValue::Bool(false)),
                _ => Err(PageError::bad_bookmark(format!(
                    "unrecognized value {token}"
                ))),
            };
        };

        match code {
            STRING => Ok(KeyValue::Text(unescape(payload))),
            BINARY => BASE64
                .decode(payload)
                .map(KeyValue::Bytes)
                .map_err(|e| PageError::bad_bookmark(format!("invalid base64 payload: {e}"))),
            INTEGER => payload
                .parse::<i64>()
                .map(KeyValue::Int)
                .map_err(|e| PageError::bad_bookmark(format!("invalid integer payload: {e}"))),
            FLOAT => payload
                .parse::<f64>()
                .map(KeyValue::Float)
                .map_err(|e| PageError::bad_bookmark(format!("invalid float payload: {e}"))),
            DECIMAL => payload
                .parse::<Decimal>()
                .map(KeyValue::Decimal)
                .map_err(|e| PageError::bad_bookmark(format!("invalid decimal payload: {e}"))),
            DATE => NaiveDate::parse_from_str(payload, DATE_FMT)
                .map(KeyValue::Date)
                .map_err(|e| PageError::bad_bookmark(format!("invalid date payload: {e}"))),
            DATETIME => parse_datetime(payload),
            TIME => NaiveTime::parse_from_str(payload, TIME_FMT)
                .map(KeyValue::Time)
                .map_err(|e| PageError::bad_bookmark(format!("invalid time payload: {e}"))),
            UUID_CODE => payload
                .parse::<Uuid>()
                .map(KeyValue::Uuid)
                .map_err(|e| PageError::bad_bookmark(format!("invalid uuid payload: {e}"))),
            other => {
                let custom = self.custom_by_code.get(other).ok_or_else(|| {
                    PageError::bad_bookmark(format!("unrecognized value {token}"))
                })?;
                let repr = match &custom.deserialize {
                    Some(f) => f(payload).map_err(|e| {
                        PageError::bad_bookmark(format!(
                            "Custom bookmark deserializer encountered error: {e}"
                        ))
                    })?,
                    None => payload.to_string(),
                };
                Ok(KeyValue::Custom {
                    code: other.to_string(),
                    repr,
                })
            }
        }
    }

    // ==================== Whole tuples ====================

    /// Serialize a keyset to one delimited line. `None` (and the empty
    /// tuple) serialize to the empty string.
    pub fn serialize_values(&self, values: Option<&[KeyValue]>) -> PageResult<String> {
        let Some(values) = values else {
            return Ok(String::new());
        };
        let tokens = values
            .iter()
            .map(|v| self.serialize_value(v))
            .collect::<PageResult<Vec<_>>>()?;
        Ok(self.join_fields(&tokens))
    }

    /// Parse a delimited line back into a keyset; the empty string parses to
    /// `None`.
    pub fn unserialize_values(&self, line: &str) -> PageResult<Option<Vec<KeyValue>>> {
        if line.is_empty() {
            return Ok(None);
        }
        self.split_fields(line)?
            .iter()
            .map(|token| self.unserialize_value(token))
            .collect::<PageResult<Vec<_>>>()
            .map(Some)
    }

    fn join_fields(&self, fields: &[String]) -> String {
        let mut out = String::new();
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                out.push(self.delimiter);
            }
            for ch in field.chars() {
                if ch == self.delimiter || ch == self.escape_char {
                    out.push(self.escape_char);
                }
                out.push(ch);
            }
        }
        out
    }

    fn split_fields(&self, line: &str) -> PageResult<Vec<String>> {
        let mut fields = Vec::new();
        let mut current = String::new();
        let mut chars = line.chars();
        while let Some(ch) = chars.next() {
            if ch == self.escape_char {
                match chars.next() {
                    Some(next) => current.push(next),
                    None => {
                        return Err(PageError::bad_bookmark(
                            "bookmark ends with a dangling escape character",
                        ));
                    }
                }
            } else if ch == self.delimiter {
                fields.push(std::mem::take(&mut current));
            } else {
                current.push(ch);
            }
        }
        fields.push(current);
        Ok(fields)
    }

    // ==================== Markers ====================

    /// Serialize a place marker to a bookmark string.
    pub fn serialize_marker(&self, marker: &Marker) -> PageResult<String> {
        let values = self.serialize_values(marker.place().map(|p| p.as_slice()))?;
        let direction = if marker.is_backwards() { '<' } else { '>' };
        let line = format!("{direction}{values}");
        Ok(match self.encoding {
            BookmarkEncoding::Plain => line,
            BookmarkEncoding::Base64 => BASE64_URL.encode(line.as_bytes()),
        })
    }

    /// Parse a bookmark string back to a place marker.
    ///
    /// The empty string is the start-of-resultset marker.
    pub fn unserialize_marker(&self, bookmark: &str) -> PageResult<Marker> {
        if bookmark.is_empty() {
            return Ok(Marker::default());
        }

        let line = match self.encoding {
            BookmarkEncoding::Plain => bookmark.to_string(),
            BookmarkEncoding::Base64 => {
                let bytes = BASE64_URL.decode(bookmark.as_bytes()).map_err(|e| {
                    PageError::bad_bookmark(format!("invalid base64 bookmark: {e}"))
                })?;
                String::from_utf8(bytes)
                    .map_err(|e| PageError::bad_bookmark(format!("invalid bookmark: {e}")))?
            }
        };

        let Some(direction) = line.chars().next() else {
            return Ok(Marker::default());
        };
        let backwards = match direction {
            '>' => false,
            '<' => true,
            _ => {
                return Err(PageError::bad_bookmark(
                    "Malformed bookmark string: doesn't start with a direction marker",
                ));
            }
        };
        let place = self.unserialize_values(&line[direction.len_utf8()..])?;
        Ok(Marker::new(place, backwards))
    }

    // ==================== Row extraction ====================

    /// Read the value at column `idx` off a result row as a [`KeyValue`],
    /// driven by the column's Postgres type.
    pub(crate) fn value_from_row(&self, row: &Row, idx: usize) -> PageResult<KeyValue> {
        let column = row.columns().get(idx).ok_or_else(|| {
            PageError::decode(idx.to_string(), "row has no column at this position")
        })?;
        let ty_name = column.type_().name().to_string();
        let col_name = column.name().to_string();

        macro_rules! get {
            ($t:ty, $variant:expr) => {
                row.try_get::<_, Option<$t>>(idx)
                    .map(|v| v.map($variant).unwrap_or(KeyValue::Null))
                    .map_err(|e| PageError::decode(col_name.as_str(), e.to_string()))
            };
        }

        match ty_name.as_str() {
            "bool" => get!(bool, KeyValue::Bool),
            "int2" => get!(i16, |v: i16| KeyValue::Int(v as i64)),
            "int4" => get!(i32, |v: i32| KeyValue::Int(v as i64)),
            "int8" => get!(i64, KeyValue::Int),
            "float4" => get!(f32, |v: f32| KeyValue::Float(v as f64)),
            "float8" => get!(f64, KeyValue::Float),
            "numeric" => get!(Decimal, KeyValue::Decimal),
            "text" | "varchar" | "bpchar" | "name" => get!(String, KeyValue::Text),
            "bytea" => get!(Vec<u8>, KeyValue::Bytes),
            "date" => get!(NaiveDate, KeyValue::Date),
            "timestamp" => get!(NaiveDateTime, KeyValue::Timestamp),
            "timestamptz" => get!(DateTime<FixedOffset>, KeyValue::TimestampTz),
            "time" => get!(NaiveTime, KeyValue::Time),
            "uuid" => get!(Uuid, KeyValue::Uuid),
            other => {
                let code = self.code_by_pg_type.get(other).ok_or_else(|| {
                    PageError::unregistered_type(format!(
                        "Don't know how to serialize column {col_name} of type {other}. \
                         Use BookmarkCodec::register_type to register it."
                    ))
                })?;
                let custom = &self.custom_by_code[code];
                let repr = match &custom.extract {
                    Some(f) => f(row, idx)?,
                    None => {
                        match row
                            .try_get::<_, Option<String>>(idx)
                            .map_err(|e| PageError::decode(col_name.as_str(), e.to_string()))?
                        {
                            Some(v) => v,
                            None => return Ok(KeyValue::Null),
                        }
                    }
                };
                Ok(KeyValue::Custom {
                    code: code.clone(),
                    repr,
                })
            }
        }
    }
}

fn parse_datetime(payload: &str) -> PageResult<KeyValue> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(payload) {
        return Ok(KeyValue::TimestampTz(dt));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(payload, NAIVE_DATETIME_FMT) {
        return Ok(KeyValue::Timestamp(dt));
    }
    // Space-separated fallback, as produced by Postgres text output.
    NaiveDateTime::parse_from_str(payload, "%Y-%m-%d %H:%M:%S%.f")
        .map(KeyValue::Timestamp)
        .map_err(|e| PageError::bad_bookmark(format!("invalid datetime payload: {e}")))
}
