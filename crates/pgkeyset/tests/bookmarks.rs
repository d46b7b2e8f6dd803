//! Bookmark round-trip properties at the public API surface.

use chrono::{FixedOffset, NaiveDate, NaiveTime, TimeZone};
use pgkeyset::{
    BookmarkCodec, BookmarkEncoding, CustomType, KeyValue, Marker, PageError, Paginator,
};
use uuid::Uuid;

fn sample_keysets() -> Vec<Vec<KeyValue>> {
    vec![
        vec![KeyValue::Int(1)],
        vec![KeyValue::Null, KeyValue::Bool(true), KeyValue::Bool(false)],
        vec![
            KeyValue::Text("plain".into()),
            KeyValue::Text("with~delimiter".into()),
            KeyValue::Text("with\\escape".into()),
            KeyValue::Text("with\nnewline".into()),
        ],
        vec![
            KeyValue::Float(2.5),
            KeyValue::Decimal("123.456".parse().unwrap()),
            KeyValue::Bytes(vec![0, 159, 146, 150]),
        ],
        vec![
            KeyValue::Date(NaiveDate::from_ymd_opt(2007, 12, 5).unwrap()),
            KeyValue::Timestamp(
                NaiveDate::from_ymd_opt(2007, 12, 5)
                    .unwrap()
                    .and_hms_opt(12, 30, 30)
                    .unwrap(),
            ),
            KeyValue::TimestampTz(
                FixedOffset::east_opt(-18_000)
                    .unwrap()
                    .with_ymd_and_hms(2007, 12, 5, 12, 30, 30)
                    .unwrap(),
            ),
            KeyValue::Time(NaiveTime::from_hms_opt(23, 59, 59).unwrap()),
            KeyValue::Uuid(Uuid::from_u128(0x1234_5678_9abc_def0_1234_5678_9abc_def0)),
        ],
    ]
}

fn representable_markers() -> Vec<Marker> {
    let mut markers = vec![Marker::start(), Marker::end()];
    for keyset in sample_keysets() {
        markers.push(Marker::new(Some(keyset.clone()), false));
        markers.push(Marker::new(Some(keyset), true));
    }
    markers
}

#[test]
fn every_representable_marker_roundtrips() {
    let paginator = Paginator::new();
    for marker in representable_markers() {
        let bookmark = paginator.serialize_bookmark(&marker).unwrap();
        assert!(!bookmark.contains('\n'), "bookmark must stay on one line");
        assert_eq!(paginator.unserialize_bookmark(&bookmark).unwrap(), marker);
    }
}

#[test]
fn base64_encoding_roundtrips_and_is_url_safe() {
    let codec = BookmarkCodec::new().encoding(BookmarkEncoding::Base64);
    let paginator = Paginator::with_codec(codec);
    for marker in representable_markers() {
        let bookmark = paginator.serialize_bookmark(&marker).unwrap();
        assert!(
            bookmark
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
            "base64 bookmark {bookmark:?} must be URL-safe"
        );
        assert_eq!(paginator.unserialize_bookmark(&bookmark).unwrap(), marker);
    }
}

#[test]
fn direction_prefix_is_mandatory() {
    let paginator = Paginator::new();
    let err = paginator.unserialize_bookmark("i:3").unwrap_err();
    assert!(err.is_bad_bookmark());
    assert!(err.to_string().contains("direction marker"));
}

#[test]
fn empty_bookmark_is_the_start_marker() {
    let paginator = Paginator::new();
    assert_eq!(paginator.unserialize_bookmark("").unwrap(), Marker::start());
    assert_eq!(paginator.unserialize_bookmark(">").unwrap(), Marker::start());
    assert_eq!(paginator.unserialize_bookmark("<").unwrap(), Marker::end());
}

#[test]
fn unknown_type_code_is_bad_bookmark() {
    let paginator = Paginator::new();
    let err = paginator.unserialize_bookmark(">zz:boom").unwrap_err();
    assert!(err.is_bad_bookmark());
}

#[test]
fn registered_custom_type_roundtrips_through_bookmarks() {
    let mut codec = BookmarkCodec::new();
    codec
        .register_type(
            CustomType::new("m", "mood")
                .cast("mood")
                .with_serializer(|s| Ok(s.chars().rev().collect()))
                .with_deserializer(|s| Ok(s.chars().rev().collect())),
        )
        .unwrap();
    let paginator = Paginator::with_codec(codec);

    let marker = Marker::new(
        Some(vec![
            KeyValue::Custom {
                code: "m".into(),
                repr: "grumpy".into(),
            },
            KeyValue::Int(9),
        ]),
        false,
    );
    let bookmark = paginator.serialize_bookmark(&marker).unwrap();
    assert_eq!(paginator.unserialize_bookmark(&bookmark).unwrap(), marker);
}

#[test]
fn duplicate_registration_is_a_configuration_error() {
    let mut codec = BookmarkCodec::new();
    codec.register_type(CustomType::new("m", "mood")).unwrap();
    assert!(matches!(
        codec.register_type(CustomType::new("m", "weather")),
        Err(PageError::Configuration(_))
    ));
    assert!(matches!(
        codec.register_type(CustomType::new("w", "mood")),
        Err(PageError::Configuration(_))
    ));
}

#[test]
fn plain_codec_rejects_base64_input_shape() {
    // A plain-configured build treats base64 text as a malformed raw line.
    let paginator = Paginator::new();
    let base64_bookmark = Paginator::with_codec(
        BookmarkCodec::new().encoding(BookmarkEncoding::Base64),
    )
    .serialize_bookmark(&Marker::new(Some(vec![KeyValue::Int(1)]), false))
    .unwrap();
    assert!(paginator.unserialize_bookmark(&base64_bookmark).is_err());
}
